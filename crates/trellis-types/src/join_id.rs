use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Stable identifier for any coordination point: a request, a fork, or a
/// call return.
///
/// The guid alone carries identity. The creation timestamp travels with the
/// id so operators can read rough age off a log line; ordering by timestamp
/// is informational only and never authoritative (two schedulers' clocks may
/// drift).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinId {
    pub guid: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl JoinId {
    /// Allocate a fresh id stamped with the current wall clock.
    pub fn fresh() -> Self {
        Self {
            guid: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    /// Construct from known parts, for stores rehydrating persisted entries.
    pub fn from_parts(guid: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self { guid, timestamp }
    }
}

impl PartialOrd for JoinId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JoinId {
    /// Timestamp-major ordering, guid as tiebreaker. Informational only.
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.guid.cmp(&other.guid))
    }
}

impl fmt::Display for JoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.guid.simple().to_string();
        write!(f, "join({}@{})", &hex[..8], self.timestamp.timestamp_millis())
    }
}
