use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::path::PathState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventType {
    Created,
    Started,
    Ended,
    Restarted,
}

impl fmt::Display for LifecycleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Ended => "ended",
            Self::Restarted => "restarted",
        };
        f.write_str(s)
    }
}

/// Path status transition observed by the reconciler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleEvent {
    /// Assigned by the event bus on publish; gaps mean events were dropped
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: LifecycleEventType,
    pub path_id: String,
    pub snapshot: PathState,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(event_type: LifecycleEventType, snapshot: &PathState) -> Self {
        Self {
            sequence: 0,
            event_type,
            path_id: snapshot.id.clone(),
            snapshot: snapshot.clone(),
            timestamp: Utc::now(),
        }
    }
}
