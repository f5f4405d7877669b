use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PersonId = i64;
pub type TagId = i64;
pub type SessionId = Uuid;
pub type FaceImageId = i64;

/// A many-to-many label grouping people.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A person on the roster (the backend calls them "users").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Legacy single free-text tag, still returned by older backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create/update payload for a person.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersonInput {
    pub name: String,
    pub email: String,
    pub tag_ids: Vec<TagId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Create/update payload for a tag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Capture source a session (or the operator) is using.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraMode {
    #[default]
    #[serde(rename = "WEBCAM")]
    Webcam,
    #[serde(rename = "ESP32")]
    Esp32,
}

impl CameraMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraMode::Webcam => "WEBCAM",
            CameraMode::Esp32 => "ESP32",
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown camera mode: {0} (expected WEBCAM or ESP32)")]
pub struct ParseCameraModeError(String);

impl FromStr for CameraMode {
    type Err = ParseCameraModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEBCAM" => Ok(CameraMode::Webcam),
            "ESP32" | "ESP32-CAM" => Ok(CameraMode::Esp32),
            _ => Err(ParseCameraModeError(s.to_string())),
        }
    }
}

/// One person's attendance within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub session: SessionId,
    pub user: PersonId,
    #[serde(default)]
    pub user_details: Option<Person>,
    pub timestamp: DateTime<Utc>,
    pub is_present: bool,
}

/// A bounded attendance-taking event.
///
/// `target_users` is fixed when the session is created and never sent again
/// on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub session_date: NaiveDate,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_finished: bool,
    #[serde(default)]
    pub camera_mode: CameraMode,
    #[serde(default)]
    pub esp32_ip: Option<String>,
    #[serde(default)]
    pub target_users: Vec<PersonId>,
    #[serde(default)]
    pub target_users_details: Vec<Person>,
    #[serde(default)]
    pub attendances: Vec<AttendanceRecord>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Headline numbers for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    /// Rounded presence percentage, 0 for an empty target list.
    pub percentage: u32,
}

impl Session {
    /// Target details for `id`, if the backend included them.
    pub fn target(&self, id: PersonId) -> Option<&Person> {
        self.target_users_details.iter().find(|p| p.id == id)
    }

    pub fn is_target(&self, id: PersonId) -> bool {
        self.target_users.contains(&id)
    }

    /// Records with `is_present = true`, in backend order.
    pub fn present_records(&self) -> impl Iterator<Item = &AttendanceRecord> {
        self.attendances.iter().filter(|a| a.is_present)
    }

    pub fn stats(&self) -> SessionStats {
        let total = self.target_users.len();
        let present = self.present_records().count();
        let absent = total.saturating_sub(present);
        let percentage = if total > 0 {
            ((present as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };
        SessionStats {
            total,
            present,
            absent,
            percentage,
        }
    }
}

/// Create/update payload for a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub session_date: NaiveDate,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub camera_mode: CameraMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub esp32_ip: Option<String>,
    /// Only honoured on create; the target list is frozen afterwards.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_users: Vec<PersonId>,
}

/// A person recognized during the current recognition screen. Client-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedUser {
    pub id: PersonId,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

impl RecognizedUser {
    /// Rebuild an entry from a present attendance record.
    pub fn from_record(record: &AttendanceRecord, session: &Session) -> Self {
        let details = record
            .user_details
            .as_ref()
            .or_else(|| session.target(record.user));
        Self {
            id: record.user,
            name: details
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("#{}", record.user)),
            timestamp: record.timestamp,
            tags: details.map(|p| p.tags.clone()).unwrap_or_default(),
        }
    }
}

/// A registered face image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceImage {
    pub id: FaceImageId,
    #[serde(default)]
    pub user: Option<PersonId>,
    #[serde(default, alias = "path")]
    pub image_path: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A networked camera the backend has successfully talked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub is_active: bool,
    #[serde(default)]
    pub last_connected: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
