// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Item serialization.
//!
//! A [`Codec`] turns items (and ordered item sequences) into durable bytes
//! and back. Engines that persist the queue as a single value use the
//! sequence methods; engines that persist one record/row per item use the
//! item methods. The codec is selected at construction time and must stay
//! the same for the lifetime of a durable location.

use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

/// Serialization format for queue items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    /// Compact binary encoding. The default.
    #[default]
    Bincode,
    /// Human-readable JSON, useful when the data file is inspected by hand.
    Json,
}

impl Codec {
    /// Encode a whole ordered sequence as one value.
    pub(crate) fn encode_seq<T: Serialize>(self, items: &[T]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Bincode => {
                bincode::serde::encode_to_vec(items, bincode::config::standard())
                    .context(EncodeSnafu)
            }
            Self::Json => serde_json::to_vec(items).context(JsonSnafu),
        }
    }

    /// Decode a whole ordered sequence from one value.
    pub(crate) fn decode_seq<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<Vec<T>, CodecError> {
        match self {
            Self::Bincode => {
                bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                    .map(|(items, _)| items)
                    .context(DecodeSnafu)
            }
            Self::Json => serde_json::from_slice(bytes).context(JsonSnafu),
        }
    }

    /// Encode a single item.
    pub(crate) fn encode_item<T: Serialize>(self, item: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Bincode => {
                bincode::serde::encode_to_vec(item, bincode::config::standard())
                    .context(EncodeSnafu)
            }
            Self::Json => serde_json::to_vec(item).context(JsonSnafu),
        }
    }

    /// Decode a single item.
    pub(crate) fn decode_item<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Self::Bincode => {
                bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                    .map(|(item, _)| item)
                    .context(DecodeSnafu)
            }
            Self::Json => serde_json::from_slice(bytes).context(JsonSnafu),
        }
    }
}

/// Codec failures, carrying the underlying serde error.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    #[snafu(display("JSON codec failed"))]
    Json {
        source: serde_json::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("bincode encoding failed"))]
    Encode {
        source: bincode::error::EncodeError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("bincode decoding failed"))]
    Decode {
        source: bincode::error::DecodeError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}
