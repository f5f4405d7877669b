//! In-memory fakes for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rollcall_api::{
    ApiError, ConnectionTest, FaceSource, FinishResponse, MarkAttendanceResponse,
    RecognitionMatch, RecognitionResponse,
};
use rollcall_core::{
    AttendanceRecord, CameraMode, Person, PersonId, Session, SessionId, SessionInput, Tag,
};
use rollcall_hw::{Snapshot, Webcam, WebcamError};

use crate::backend::Backend;
use crate::notify::{Level, Notifier};

pub(crate) fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 3, 0).unwrap()
}

pub(crate) fn session_id() -> SessionId {
    "6f1c2f4e-8f38-4c1e-9d3b-2b1d7f0a5c11".parse().unwrap()
}

pub(crate) fn person(id: PersonId, name: &str, tags: &[(i64, &str)]) -> Person {
    Person {
        id,
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        tags: tags
            .iter()
            .map(|(id, name)| Tag {
                id: *id,
                name: (*name).into(),
                description: None,
            })
            .collect(),
        tag: None,
        created_at: None,
        updated_at: None,
    }
}

/// Targets 1..=3, person 1 already present at [`t1`].
pub(crate) fn sample_session() -> Session {
    Session {
        id: session_id(),
        name: "Morning lecture".into(),
        description: None,
        session_date: t1().date_naive(),
        start_time: t1(),
        end_time: None,
        is_active: true,
        is_finished: false,
        camera_mode: CameraMode::Webcam,
        esp32_ip: None,
        target_users: vec![1, 2, 3],
        target_users_details: vec![
            person(1, "Ana", &[(10, "cs101")]),
            person(2, "Ben", &[(10, "cs101"), (11, "lab")]),
            person(3, "Caro", &[]),
        ],
        attendances: vec![AttendanceRecord {
            id: "0d7d6a52-6c3f-4a57-8b59-1f2a3b4c5d6e".parse().unwrap(),
            session: session_id(),
            user: 1,
            user_details: None,
            timestamp: t1(),
            is_present: true,
        }],
        created_at: None,
        updated_at: None,
    }
}

pub(crate) fn matched(ids: &[(PersonId, &str)]) -> RecognitionResponse {
    RecognitionResponse {
        success: true,
        message: Some("Face(s) recognized successfully".into()),
        matches: ids
            .iter()
            .map(|(id, name)| RecognitionMatch {
                user_id: *id,
                name: (*name).into(),
                confidence: 0.9,
                attendance_marked: true,
            })
            .collect(),
    }
}

pub(crate) fn no_match() -> RecognitionResponse {
    RecognitionResponse {
        success: false,
        message: Some("No matching faces found in the system".into()),
        matches: vec![],
    }
}

pub(crate) fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        message: "backend unavailable".into(),
    }
}

/// Scripted backend with call counters.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub session: Mutex<Option<Session>>,
    pub recognitions: Mutex<VecDeque<Result<RecognitionResponse, ApiError>>>,
    pub recognize_delay: Mutex<Duration>,
    pub mark_delay: Mutex<Duration>,
    /// Per-IP probe behaviour: (delay, reachable).
    pub probes: Mutex<HashMap<String, (Duration, bool)>>,
    pub fail_mark: Mutex<bool>,
    pub recognize_calls: AtomicUsize,
    pub mark_calls: AtomicUsize,
    pub finish_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeBackend {
    pub fn with_session(session: Session) -> Self {
        let backend = Self::default();
        *backend.session.lock().unwrap() = Some(session);
        backend
    }

    pub fn push_recognition(&self, result: Result<RecognitionResponse, ApiError>) {
        self.recognitions.lock().unwrap().push_back(result);
    }

    pub fn set_recognize_delay(&self, delay: Duration) {
        *self.recognize_delay.lock().unwrap() = delay;
    }

    pub fn set_mark_delay(&self, delay: Duration) {
        *self.mark_delay.lock().unwrap() = delay;
    }

    pub fn set_probe(&self, ip: &str, delay: Duration, reachable: bool) {
        self.probes
            .lock()
            .unwrap()
            .insert(ip.to_string(), (delay, reachable));
    }

    pub fn recognize_calls(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_session(&self, _id: SessionId) -> Result<Session, ApiError> {
        self.session.lock().unwrap().clone().ok_or(ApiError::Status {
            status: 404,
            message: "Not found.".into(),
        })
    }

    async fn create_session(&self, input: &SessionInput) -> Result<Session, ApiError> {
        let mut session = sample_session();
        session.name = input.name.clone();
        session.target_users = input.target_users.clone();
        session.attendances.clear();
        Ok(session)
    }

    async fn mark_attendance(
        &self,
        _id: SessionId,
        _person: PersonId,
        _is_present: bool,
    ) -> Result<MarkAttendanceResponse, ApiError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.mark_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_mark.lock().unwrap() {
            return Err(unavailable());
        }
        Ok(MarkAttendanceResponse {
            success: true,
            message: Some("Attendance marked successfully".into()),
            attendance: None,
        })
    }

    async fn finish_session(&self, _id: SessionId) -> Result<FinishResponse, ApiError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FinishResponse {
            success: true,
            message: Some("Session marked as finished".into()),
            session: None,
        })
    }

    async fn recognize_face(
        &self,
        _session: SessionId,
        _source: &FaceSource,
    ) -> Result<RecognitionResponse, ApiError> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.recognize_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.recognitions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(no_match()))
    }

    async fn test_connection(&self, ip: &str) -> Result<ConnectionTest, ApiError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, reachable) = self
            .probes
            .lock()
            .unwrap()
            .get(ip)
            .copied()
            .unwrap_or((Duration::ZERO, false));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(ConnectionTest {
            success: reachable,
            message: Some(if reachable {
                "Connection successful".into()
            } else {
                format!("Connection failed: {ip} unreachable")
            }),
            config: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<(Level, String)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: Level, message: &str) {
        self.events.lock().unwrap().push((level, message.to_string()));
    }
}

/// Webcam returning a fixed two-byte "JPEG", or failing.
pub(crate) struct FakeWebcam {
    pub fail: bool,
}

impl Webcam for FakeWebcam {
    fn snapshot(&self) -> Result<Snapshot, WebcamError> {
        if self.fail {
            return Err(WebcamError::CaptureFailed("sensor unplugged".into()));
        }
        Ok(Snapshot {
            jpeg: vec![0xFF, 0xD8],
            width: 1,
            height: 1,
        })
    }

    fn describe(&self) -> String {
        "fake webcam".into()
    }
}
