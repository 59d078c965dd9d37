use std::fmt;

use anyhow::bail;
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "blob_len::serialize")]
    pub image_data: Option<Vec<u8>>,
    pub image_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "blob_len::serialize")]
    pub audio_data: Option<Vec<u8>>,
    pub audio_description: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub timer: Option<i64>,
}

impl Task {
    pub fn created_local(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.created_at).single()
    }

    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_data.is_some()
    }
}

/// Blobs are reported by size in JSON output rather than dumped.
mod blob_len {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => s.serialize_some(&bytes.len()),
            None => s.serialize_none(),
        }
    }
}

/// A task as entered by the user, before the store assigns an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub text_content: Option<String>,
    pub image_data: Option<Vec<u8>>,
    pub image_description: Option<String>,
    pub audio_data: Option<Vec<u8>>,
    pub audio_description: Option<String>,
    pub timer: Option<i64>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = non_blank(text.into());
        self
    }

    pub fn with_image(mut self, data: Vec<u8>, description: Option<String>) -> Self {
        self.image_data = Some(data);
        self.image_description = description.and_then(non_blank);
        self
    }

    pub fn with_audio(mut self, data: Vec<u8>, description: Option<String>) -> Self {
        self.audio_data = Some(data);
        self.audio_description = description.and_then(non_blank);
        self
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Rating {
    Bad,
    Average,
    #[default]
    Good,
    Excellent,
    Outstanding,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Self::Bad,
        Self::Average,
        Self::Good,
        Self::Excellent,
        Self::Outstanding,
    ];

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bad" => Ok(Self::Bad),
            "average" => Ok(Self::Average),
            "good" => Ok(Self::Good),
            "excellent" => Ok(Self::Excellent),
            "outstanding" => Ok(Self::Outstanding),
            _ => bail!("invalid rating '{s}': must be bad, average, good, excellent, or outstanding"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bad => "Bad",
            Self::Average => "Average",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
            Self::Outstanding => "Outstanding",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_first_time")]
    pub is_first_time: bool,
    #[serde(default)]
    pub user_name: String,
}

fn default_first_time() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            is_first_time: true,
            user_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    /// Claimed by one scheduler and being delivered.
    Firing,
    Fired,
    Replaced,
    PermissionDenied,
    Failed,
}

impl JobStatus {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "firing" => Ok(Self::Firing),
            "fired" => Ok(Self::Fired),
            "replaced" => Ok(Self::Replaced),
            "permission_denied" => Ok(Self::PermissionDenied),
            "failed" => Ok(Self::Failed),
            _ => bail!("invalid job status '{s}'"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Firing => "firing",
            Self::Fired => "fired",
            Self::Replaced => "replaced",
            Self::PermissionDenied => "permission_denied",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Firing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deferred-job payload as persisted in `scheduled_jobs.payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "MESSAGE", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJob {
    pub id: i64,
    pub name: String,
    /// Epoch milliseconds.
    pub fire_at: i64,
    pub message: Option<String>,
    pub status: JobStatus,
}

impl ScheduledJob {
    pub fn fire_local(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.fire_at).single()
    }
}
