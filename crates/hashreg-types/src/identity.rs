use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{decode_32, TypeError};

/// Identity of an actor that calls into the registry.
///
/// The registry never interprets the bytes; it only compares identities and
/// records who stored what. The all-zero identity is reserved and can never
/// hold administrative control.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId([u8; 32]);

impl ActorId {
    /// Derive an identity from a human label (e.g. a service account name).
    ///
    /// The same label always produces the same identity.
    pub fn derive(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"hashreg-actor-v1:");
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Fresh random identity that no label derives to.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The reserved zero identity.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (`actor:` + first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("actor:{}", hex::encode(&self.0[..4]))
    }

    /// Parse from 64 hex characters, optionally prefixed with `0x`.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_32(s).map(Self)
    }
}

/// Accepts either 64 hex characters or `@label`, which derives the identity
/// from the label.
impl FromStr for ActorId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('@') {
            Some(label) => Ok(Self::derive(label)),
            None => Self::from_hex(s),
        }
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.short_id())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for ActorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::hex_serde::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        crate::hex_serde::deserialize(deserializer).map(Self)
    }
}
