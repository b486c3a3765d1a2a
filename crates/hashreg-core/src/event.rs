use std::fmt;

use serde::{Deserialize, Serialize};

use hashreg_types::{ActorId, Fingerprint, TemporalAnchor};

/// Classification of registry events, used for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Genesis,
    HashStored,
    HashVerified,
    OwnershipTransferred,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Genesis => "Genesis",
            Self::HashStored => "HashStored",
            Self::HashVerified => "HashVerified",
            Self::OwnershipTransferred => "OwnershipTransferred",
        };
        write!(f, "{s}")
    }
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventBody {
    /// The registry was deployed with its first administrator.
    Genesis { administrator: ActorId },
    HashStored {
        fingerprint: Fingerprint,
        storer: ActorId,
    },
    /// A verification happened. `present` is the answer the verifier got.
    HashVerified {
        fingerprint: Fingerprint,
        verifier: ActorId,
        present: bool,
    },
    OwnershipTransferred { previous: ActorId, new: ActorId },
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Genesis { .. } => EventKind::Genesis,
            Self::HashStored { .. } => EventKind::HashStored,
            Self::HashVerified { .. } => EventKind::HashVerified,
            Self::OwnershipTransferred { .. } => EventKind::OwnershipTransferred,
        }
    }

    /// The fingerprint this event concerns, if any.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Self::HashStored { fingerprint, .. } | Self::HashVerified { fingerprint, .. } => {
                Some(fingerprint)
            }
            Self::Genesis { .. } | Self::OwnershipTransferred { .. } => None,
        }
    }
}

/// A single committed audit event.
///
/// Events form a gap-free sequence starting at 1 (the genesis event) with
/// strictly increasing timestamps. Replaying the sequence reproduces the
/// registry exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub seq: u64,
    pub timestamp: TemporalAnchor,
    pub body: EventBody,
}

impl RegistryEvent {
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ", self.seq, self.kind())?;
        match &self.body {
            EventBody::Genesis { administrator } => write!(f, "administrator={administrator}"),
            EventBody::HashStored {
                fingerprint,
                storer,
            } => write!(f, "{} storer={storer}", fingerprint.short_hex()),
            EventBody::HashVerified {
                fingerprint,
                verifier,
                present,
            } => write!(
                f,
                "{} verifier={verifier} present={present}",
                fingerprint.short_hex()
            ),
            EventBody::OwnershipTransferred { previous, new } => {
                write!(f, "{previous} -> {new}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> RegistryEvent {
        RegistryEvent {
            seq: 2,
            timestamp: TemporalAnchor::new(1000, 0, 0),
            body: EventBody::HashStored {
                fingerprint: Fingerprint::from_hash([0xab; 32]),
                storer: ActorId::from_raw([1; 32]),
            },
        }
    }

    #[test]
    fn kind_matches_body() {
        assert_eq!(stored().kind(), EventKind::HashStored);
        let genesis = EventBody::Genesis {
            administrator: ActorId::from_raw([1; 32]),
        };
        assert_eq!(genesis.kind(), EventKind::Genesis);
        assert!(genesis.fingerprint().is_none());
    }

    #[test]
    fn fingerprint_accessor() {
        assert_eq!(
            stored().body.fingerprint(),
            Some(&Fingerprint::from_hash([0xab; 32]))
        );
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(
            stored().to_string(),
            "#2 HashStored abababab storer=actor:01010101"
        );
    }

    #[test]
    fn bincode_roundtrip() {
        let event = stored();
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: RegistryEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn json_uses_hex_identifiers() {
        let json = serde_json::to_value(stored()).unwrap();
        assert_eq!(
            json["body"]["HashStored"]["fingerprint"],
            serde_json::Value::String("ab".repeat(32))
        );
    }
}
