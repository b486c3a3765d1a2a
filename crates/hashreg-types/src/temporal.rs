use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Hybrid Logical Clock timestamp.
///
/// Combines a wall-clock component with a logical counter and a node
/// identifier so that records created within the same millisecond still
/// get distinct, ordered timestamps.
///
/// Ordering: `physical_ms` → `logical` → `node_id` (total order).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalAnchor {
    /// Wall-clock milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Logical counter for events at the same physical time.
    pub logical: u32,
    /// Node identifier to break ties between nodes.
    pub node_id: u16,
}

impl TemporalAnchor {
    pub fn new(physical_ms: u64, logical: u32, node_id: u16) -> Self {
        Self {
            physical_ms,
            logical,
            node_id,
        }
    }

    /// Anchor for the current wall-clock time.
    pub fn now(node_id: u16) -> Self {
        Self {
            physical_ms: wall_clock_ms(),
            logical: 0,
            node_id,
        }
    }

    /// The zero anchor, used for records that were never created.
    pub const fn zero() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
            node_id: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// The earliest anchor at or after wall-clock now that is strictly
    /// after `self`.
    pub fn successor(&self, node_id: u16) -> Self {
        let now_ms = wall_clock_ms();
        if now_ms > self.physical_ms {
            Self::new(now_ms, 0, node_id)
        } else {
            Self::new(self.physical_ms, self.logical.saturating_add(1), node_id)
        }
    }

    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl PartialOrd for TemporalAnchor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TemporalAnchor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
            .then(self.node_id.cmp(&other.node_id))
    }
}

impl fmt::Debug for TemporalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TemporalAnchor({}ms.{}.n{})",
            self.physical_ms, self.logical, self.node_id
        )
    }
}

impl fmt::Display for TemporalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.n{}", self.physical_ms, self.logical, self.node_id)
    }
}
