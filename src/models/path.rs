use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::encoder::SourceSpec;

/// Where a path's media comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Pushed by an external publisher (RTMP/RTSP/WebRTC client)
    Publisher,
    Camera,
    Screen,
    File,
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Camera => "camera",
            Self::Screen => "screen",
            Self::File => "file",
            Self::Unknown => "unknown",
        }
    }

    /// Sources we feed ourselves through a local encoder process
    pub fn is_encoder_backed(&self) -> bool {
        matches!(self, Self::Camera | Self::Screen | Self::File)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "publisher" => Ok(Self::Publisher),
            "camera" => Ok(Self::Camera),
            "screen" => Ok(Self::Screen),
            "file" => Ok(Self::File),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PathStatus {
    Inactive,
    Active,
}

impl PathStatus {
    pub fn from_publishers(publisher_count: u32) -> Self {
        if publisher_count > 0 {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown path status '{other}'")),
        }
    }
}

/// Derives the playback and ingest URLs of a path from its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUrls {
    rtsp_base: String,
    hls_base: String,
    ingest_base: String,
}

impl StreamUrls {
    pub fn new(
        rtsp_base: impl Into<String>,
        hls_base: impl Into<String>,
        ingest_base: impl Into<String>,
    ) -> Self {
        Self {
            rtsp_base: rtsp_base.into().trim_end_matches('/').to_string(),
            hls_base: hls_base.into().trim_end_matches('/').to_string(),
            ingest_base: ingest_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn rtsp_url(&self, path_id: &str) -> String {
        format!("{}/{}", self.rtsp_base, path_id)
    }

    pub fn hls_url(&self, path_id: &str) -> String {
        format!("{}/{}/index.m3u8", self.hls_base, path_id)
    }

    /// Ingest endpoint an encoder pushes to, on the same relay path the
    /// playback URLs read from
    pub fn ingest_url(&self, path_id: &str) -> String {
        format!("{}/{}", self.ingest_base, path_id)
    }
}

impl Default for StreamUrls {
    fn default() -> Self {
        use crate::config::defaults::*;
        Self::new(DEFAULT_RTSP_BASE_URL, DEFAULT_HLS_BASE_URL, DEFAULT_INGEST_BASE_URL)
    }
}

/// Liveness state of one path on the media relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathState {
    pub id: String,
    pub source_type: SourceType,
    pub publisher_count: u32,
    pub reader_count: u32,
    pub status: PathStatus,
    pub rtsp_url: String,
    pub hls_url: String,
    /// First time the path was seen active; never cleared
    pub start_time: Option<DateTime<Utc>>,
    /// Last successful poll that included this path
    pub last_seen: Option<DateTime<Utc>>,
    /// Upstream `readyTime`, used to spot publisher restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_time: Option<String>,
    /// Upstream id of the publishing connection, the restart signal when
    /// the relay reports no `readyTime`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl PathState {
    pub fn new(id: impl Into<String>, source_type: SourceType, urls: &StreamUrls) -> Self {
        let id = id.into();
        Self {
            rtsp_url: urls.rtsp_url(&id),
            hls_url: urls.hls_url(&id),
            id,
            source_type,
            publisher_count: 0,
            reader_count: 0,
            status: PathStatus::Inactive,
            start_time: None,
            last_seen: None,
            ready_time: None,
            source_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PathStatus::Active
    }
}

/// Explicit registration request from the API layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathRegistration {
    pub source_type: SourceType,
    /// Encoder to launch for the path, if we feed it ourselves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,
}

impl PathRegistration {
    pub fn publisher() -> Self {
        Self {
            source_type: SourceType::Publisher,
            source: None,
        }
    }

    pub fn with_encoder(source: SourceSpec) -> Self {
        Self {
            source_type: source.source_type(),
            source: Some(source),
        }
    }
}

/// Durable row for a path, upserted whenever its static fields change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroneRecord {
    pub id: String,
    pub rtmp_url: String,
    pub rtsp_url: String,
    pub hls_url: String,
    pub source_type: SourceType,
    pub status: PathStatus,
    pub file_path: Option<String>,
    pub loop_file: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DroneRecord {
    pub fn from_state(state: &PathState, urls: &StreamUrls, source: Option<&SourceSpec>) -> Self {
        let now = Utc::now();
        let (file_path, loop_file) = match source {
            Some(SourceSpec::File { path, looping }) => {
                (Some(path.to_string_lossy().into_owned()), *looping)
            }
            _ => (None, false),
        };
        Self {
            id: state.id.clone(),
            rtmp_url: urls.ingest_url(&state.id),
            rtsp_url: state.rtsp_url.clone(),
            hls_url: state.hls_url.clone(),
            source_type: state.source_type,
            status: state.status,
            file_path,
            loop_file,
            created_at: now,
            updated_at: now,
        }
    }

    /// Encoder source to relaunch on restore, if any
    pub fn source_spec(&self) -> Option<SourceSpec> {
        match self.source_type {
            SourceType::Camera => Some(SourceSpec::Camera),
            SourceType::Screen => Some(SourceSpec::Screen),
            SourceType::File => self.file_path.as_ref().map(|path| SourceSpec::File {
                path: path.into(),
                looping: self.loop_file,
            }),
            SourceType::Publisher | SourceType::Unknown => None,
        }
    }
}
