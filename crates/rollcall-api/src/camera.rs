//! Camera configuration and face-recognition endpoints.

use rollcall_core::{CameraConfig, CameraMode, FaceImageId, PersonId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{ApiClient, ApiError};

/// Where the backend should get the image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceSource {
    /// A `data:image/jpeg;base64,...` URL captured locally.
    Image(String),
    /// The backend pulls a frame from the networked camera itself.
    Esp32 { ip: String },
}

impl FaceSource {
    pub fn mode(&self) -> CameraMode {
        match self {
            FaceSource::Image(_) => CameraMode::Webcam,
            FaceSource::Esp32 { .. } => CameraMode::Esp32,
        }
    }
}

#[derive(Serialize)]
struct FacePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<PersonId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<SessionId>,
    camera_mode: CameraMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    esp32_ip: Option<&'a str>,
}

impl<'a> FacePayload<'a> {
    fn new(source: &'a FaceSource) -> Self {
        let (image_data, esp32_ip) = match source {
            FaceSource::Image(data) => (Some(data.as_str()), None),
            FaceSource::Esp32 { ip } => (None, Some(ip.as_str())),
        };
        Self {
            user_id: None,
            session_id: None,
            camera_mode: source.mode(),
            image_data,
            esp32_ip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognitionMatch {
    pub user_id: PersonId,
    pub name: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub attendance_marked: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub matches: Vec<RecognitionMatch>,
}

impl RecognitionResponse {
    /// Matches the backend recorded attendance for, in response order.
    pub fn marked(&self) -> impl Iterator<Item = &RecognitionMatch> {
        self.matches.iter().filter(|m| m.attendance_marked)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionTest {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub config: Option<CameraConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisteredFace {
    pub id: FaceImageId,
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// The person whose existing face a new registration collided with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DuplicateOf {
    pub id: PersonId,
    pub name: String,
}

/// Result of a face registration. Only transport/server failures are errors;
/// everything the operator can act on is an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered(RegisteredFace),
    NoFaceDetected {
        message: String,
    },
    DuplicateFace {
        existing: DuplicateOf,
        confidence: f64,
        message: String,
    },
    Rejected {
        message: String,
    },
}

#[derive(Deserialize)]
struct RegistrationBody {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    face_image: Option<RegisteredFace>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    existing_user: Option<DuplicateOf>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl From<RegistrationBody> for RegistrationOutcome {
    fn from(body: RegistrationBody) -> Self {
        let message = body.message.unwrap_or_default();
        if body.success {
            return match body.face_image {
                Some(face) => RegistrationOutcome::Registered(face),
                None => RegistrationOutcome::Rejected {
                    message: "backend reported success without a face image".into(),
                },
            };
        }

        let kind = body.error_type.as_deref().unwrap_or_default();
        if let Some(existing) = body.existing_user {
            return RegistrationOutcome::DuplicateFace {
                existing,
                confidence: body.confidence.unwrap_or_default(),
                message,
            };
        }
        if matches!(kind, "no_face_detected" | "no_face")
            || message.to_ascii_lowercase().contains("no face detected")
        {
            return RegistrationOutcome::NoFaceDetected { message };
        }
        RegistrationOutcome::Rejected { message }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Retrained,
    InsufficientUsers,
    InsufficientImages,
    Unchanged,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaceDeletion {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub remaining_images: u32,
    #[serde(default)]
    pub user_recognizable: bool,
    #[serde(default)]
    pub model_status: Option<ModelStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingDetails {
    pub total_users: u32,
    pub total_images: u32,
    pub used_images: u32,
    pub accuracy: f64,
    pub validation_accuracy: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingSummary {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<TrainingDetails>,
}

#[derive(Serialize)]
struct IpBody<'a> {
    ip_address: &'a str,
}

#[derive(Serialize)]
struct ImageIdBody {
    image_id: FaceImageId,
}

impl ApiClient {
    pub async fn camera_configs(&self) -> Result<Vec<CameraConfig>, ApiError> {
        self.get("/camera/configs/", &[]).await
    }

    /// Ask the backend to reach the networked camera at `ip`.
    pub async fn test_connection(&self, ip: &str) -> Result<ConnectionTest, ApiError> {
        self.send_outcome("/camera/configs/test_connection/", &IpBody { ip_address: ip })
            .await
    }

    pub async fn register_face(
        &self,
        person: PersonId,
        source: &FaceSource,
    ) -> Result<RegistrationOutcome, ApiError> {
        let mut payload = FacePayload::new(source);
        payload.user_id = Some(person);
        let body: RegistrationBody = self
            .send_outcome("/face-recognition/register_face/", &payload)
            .await?;
        Ok(body.into())
    }

    pub async fn recognize_face(
        &self,
        session: SessionId,
        source: &FaceSource,
    ) -> Result<RecognitionResponse, ApiError> {
        let mut payload = FacePayload::new(source);
        payload.session_id = Some(session);
        self.send_outcome("/face-recognition/recognize_face/", &payload)
            .await
    }

    /// Delete one face image; the backend may retrain as a side effect.
    pub async fn delete_face_image(&self, image_id: FaceImageId) -> Result<FaceDeletion, ApiError> {
        self.send_outcome("/face-recognition/delete_face_image/", &ImageIdBody { image_id })
            .await
    }

    pub async fn train_model(&self) -> Result<TrainingSummary, ApiError> {
        self.send_outcome::<serde_json::Value, _>(
            "/face-recognition/train_model/",
            &serde_json::json!({}),
        )
        .await
    }
}
