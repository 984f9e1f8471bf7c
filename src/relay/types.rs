//! Minimal JSON shapes of the media-relay control API.
//!
//! Only the fields the reconciler needs are modelled; everything else the
//! relay sends is ignored.

use serde::{Deserialize, Serialize};

/// `GET /paths/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPathList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
    pub items: Vec<RelayPathSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayPathSummary {
    pub name: String,
    #[serde(default)]
    pub source: Option<RelaySource>,
    #[serde(default)]
    pub readers: Vec<serde_json::Value>,
}

/// `GET /paths/get/{name}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPathDetail {
    pub name: String,
    /// `ready` / `notReady` on relays that report a state string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Boolean readiness on relays that report a flag instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_time: Option<String>,
    #[serde(default)]
    pub source: Option<RelaySource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishers: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub readers: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelaySource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl RelayPathDetail {
    pub fn is_ready(&self) -> bool {
        match (&self.state, self.ready) {
            (Some(state), _) => state == "ready",
            (None, Some(ready)) => ready,
            (None, None) => false,
        }
    }

    /// Explicit publisher list when present, otherwise one for a ready source
    pub fn publisher_count(&self) -> u32 {
        match &self.publishers {
            Some(publishers) => publishers.len() as u32,
            None if self.source.is_some() && self.is_ready() => 1,
            None => 0,
        }
    }

    pub fn reader_count(&self) -> u32 {
        self.readers.len() as u32
    }
}

/// Body for `POST /config/paths/add/{name}` and `PATCH /config/paths/patch/{name}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathConfigBody {
    pub name: String,
    pub source: String,
}

impl PathConfigBody {
    pub fn publisher(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: "publisher".to_string(),
        }
    }
}
