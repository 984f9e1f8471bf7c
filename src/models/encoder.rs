use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::path::SourceType;

/// Declarative description of what an encoder should capture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    File {
        path: PathBuf,
        #[serde(rename = "loop", default)]
        looping: bool,
    },
    Camera,
    Screen,
}

impl SourceSpec {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::File { .. } => SourceType::File,
            Self::Camera => SourceType::Camera,
            Self::Screen => SourceType::Screen,
        }
    }
}

/// Lifecycle of one encoder process
///
/// `Starting -> Running -> Exited`, `Starting -> Exited`, `Running -> Killed`
/// and `Running -> Exited`. A process that is still starting when it is
/// force-killed also ends up `Killed`. Terminal states never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Starting,
    Running,
    Exited,
    Killed,
}

impl EncoderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Killed)
    }

    pub fn can_transition_to(&self, next: EncoderState) -> bool {
        use EncoderState::*;
        matches!(
            (self, next),
            (Starting, Running) | (Starting, Exited) | (Starting, Killed) | (Running, Exited) | (Running, Killed)
        )
    }
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// Snapshot of a supervised encoder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderProcessInfo {
    pub path_id: String,
    pub pid: Option<u32>,
    pub command: Vec<String>,
    pub state: EncoderState,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl EncoderProcessInfo {
    pub fn starting(path_id: impl Into<String>, pid: Option<u32>, command: Vec<String>) -> Self {
        Self {
            path_id: path_id.into(),
            pid,
            command,
            state: EncoderState::Starting,
            exit_code: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Apply a transition; returns false and leaves the snapshot untouched when it is not allowed
    pub fn transition(&mut self, next: EncoderState, exit_code: Option<i32>) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        if next.is_terminal() {
            self.exit_code = exit_code;
            self.ended_at = Some(Utc::now());
        }
        true
    }

    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }
}
