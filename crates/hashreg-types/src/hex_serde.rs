//! Shared serde plumbing for 32-byte identifiers.
//!
//! Human-readable formats (JSON, TOML) carry a 64-char hex string; binary
//! formats (bincode) carry the raw bytes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.serialize_str(&hex::encode(bytes))
    } else {
        serde::Serialize::serialize(bytes, serializer)
    }
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<[u8; 32], D::Error> {
    if deserializer.is_human_readable() {
        let s = String::deserialize(deserializer)?;
        crate::error::decode_32(&s).map_err(D::Error::custom)
    } else {
        <[u8; 32]>::deserialize(deserializer)
    }
}
