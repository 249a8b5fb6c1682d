//! Point-in-time snapshots of a machine for diagnostics.
//!
//! A snapshot records what a machine looked like when it was taken. It
//! carries no actions and cannot be used to restore a machine.

use crate::core::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

/// Version identifier for snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Dispatch strategy of the snapshotted machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Serial,
    Concurrent,
}

/// Serializable view of a machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    /// Format version, checked by [`from_json`](Self::from_json).
    pub version: u32,

    /// Unique id of this snapshot.
    pub id: Uuid,

    /// Name the machine was configured with.
    pub name: String,

    pub strategy: Strategy,

    /// Committed state at the time of the snapshot.
    pub state: State,

    /// Requests accepted but not yet picked up; serial machines only.
    pub queue_depth: Option<u64>,

    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl MachineSnapshot {
    pub(crate) fn new(
        name: &str,
        strategy: Strategy,
        state: State,
        queue_depth: Option<u64>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            name: name.to_string(),
            strategy,
            state,
            queue_depth,
            taken_at: Utc::now(),
        }
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    /// Decode JSON, rejecting snapshots of another format version.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let snapshot = MachineSnapshot::new(
            "door",
            Strategy::Serial,
            State::from_static("open"),
            Some(3),
        );

        let json = snapshot.to_json().unwrap();
        assert!(json.contains(r#""state": "open""#));
        assert!(json.contains(r#""strategy": "serial""#));

        let restored = MachineSnapshot::from_json(&json).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn rejects_other_versions() {
        let mut snapshot =
            MachineSnapshot::new("door", Strategy::Concurrent, State::UNKNOWN, None);
        snapshot.version = SNAPSHOT_VERSION + 1;
        let json = serde_json::to_string(&snapshot).unwrap();

        let result = MachineSnapshot::from_json(&json);
        assert!(matches!(
            result,
            Err(SnapshotError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            MachineSnapshot::from_json("not json"),
            Err(SnapshotError::DeserializationFailed(_))
        ));
    }
}
