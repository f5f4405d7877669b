//! The current session and who has been recognized against it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rollcall_api::{ApiError, RecognitionMatch};
use rollcall_core::{
    remaining, tag_breakdown, Person, PersonId, RecognizedUser, Session, SessionId, SessionInput,
    SessionStats, TagBreakdown,
};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::notify::{Level, Notifier};

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("no session loaded")]
    NoSession,
    #[error("session is already finished")]
    SessionFinished,
    #[error("person {0} is not a target of this session")]
    NotTargeted(PersonId),
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AttendanceError {
    pub fn user_message(&self) -> String {
        match self {
            AttendanceError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    recognized: Vec<RecognizedUser>,
}

impl Inner {
    /// Append unless the person is already listed. Returns whether it was added.
    fn push_recognized(&mut self, entry: RecognizedUser) -> bool {
        if self.recognized.iter().any(|r| r.id == entry.id) {
            return false;
        }
        self.recognized.push(entry);
        true
    }
}

/// Snapshot of the current session with its derived projections.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: Session,
    pub recognized: Vec<RecognizedUser>,
}

impl SessionView {
    pub fn recognized_ids(&self) -> HashSet<PersonId> {
        self.recognized.iter().map(|r| r.id).collect()
    }

    pub fn remaining(&self) -> Vec<&Person> {
        remaining(&self.session.target_users_details, &self.recognized_ids())
    }

    pub fn tag_breakdown(&self) -> TagBreakdown<'_> {
        tag_breakdown(&self.session.target_users_details, &self.recognized_ids())
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }
}

/// Process-wide owner of the session being worked on.
///
/// Backend calls are made without holding the lock; results are applied only
/// if the same session is still current when they return.
pub struct AttendanceState {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<Inner>,
    recognition_active: AtomicBool,
}

impl AttendanceState {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            inner: Mutex::new(Inner::default()),
            recognition_active: AtomicBool::new(false),
        }
    }

    /// Create a session on the backend and make it current.
    pub async fn start_session(&self, input: &SessionInput) -> Result<Session, AttendanceError> {
        let session = self
            .backend
            .create_session(input)
            .await
            .map_err(|e| self.failed("create session", e.into()))?;
        tracing::info!(session = %session.id, name = %session.name, targets = session.target_users.len(), "session created");

        let mut inner = self.inner.lock().await;
        inner.session = Some(session.clone());
        inner.recognized.clear();
        self.recognition_active.store(false, Ordering::SeqCst);
        Ok(session)
    }

    /// Fetch a session and rebuild the recognized list from its present records.
    ///
    /// On failure the current session is left as it was.
    pub async fn load_session(&self, id: SessionId) -> Result<Session, AttendanceError> {
        let session = self
            .backend
            .get_session(id)
            .await
            .map_err(|e| self.failed("load session", e.into()))?;

        let mut recognized: Vec<RecognizedUser> = Vec::new();
        for record in session.present_records() {
            if recognized.iter().all(|r| r.id != record.user) {
                recognized.push(RecognizedUser::from_record(record, &session));
            }
        }

        tracing::info!(session = %id, present = recognized.len(), finished = session.is_finished, "session loaded");
        if session.is_finished {
            self.notifier
                .notify(Level::Info, "This session has already been finished");
        }

        let mut inner = self.inner.lock().await;
        inner.session = Some(session.clone());
        inner.recognized = recognized;
        self.recognition_active.store(false, Ordering::SeqCst);
        Ok(session)
    }

    /// Mark `person` present. Returns whether a new recognized entry was added.
    pub async fn mark_attendance(&self, person: PersonId) -> Result<bool, AttendanceError> {
        self.mark(person)
            .await
            .map_err(|e| self.failed("mark attendance", e))
    }

    async fn mark(&self, person: PersonId) -> Result<bool, AttendanceError> {
        let (session_id, details) = {
            let inner = self.inner.lock().await;
            let session = inner.session.as_ref().ok_or(AttendanceError::NoSession)?;
            if session.is_finished {
                return Err(AttendanceError::SessionFinished);
            }
            if !session.is_target(person) {
                return Err(AttendanceError::NotTargeted(person));
            }
            (session.id, session.target(person).cloned())
        };

        let res = self
            .backend
            .mark_attendance(session_id, person, true)
            .await?;
        if !res.success {
            let message = res
                .message
                .unwrap_or_else(|| "attendance was not recorded".into());
            return Err(AttendanceError::Rejected(message));
        }

        let mut inner = self.inner.lock().await;
        match inner.session.as_ref() {
            Some(s) if s.id != session_id => {
                tracing::debug!(session = %session_id, person, "session changed while marking; not recording locally");
                return Ok(false);
            }
            Some(s) if s.is_finished => return Err(AttendanceError::SessionFinished),
            Some(_) => {}
            None => return Err(AttendanceError::NoSession),
        }
        let name = details
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("#{person}"));
        let entry = RecognizedUser {
            id: person,
            name: name.clone(),
            timestamp: Utc::now(),
            tags: details.map(|p| p.tags).unwrap_or_default(),
        };
        let added = inner.push_recognized(entry);
        tracing::info!(session = %session_id, person, added, "attendance marked");
        if added {
            self.notifier
                .notify(Level::Success, &format!("Attendance marked for {name}"));
        }
        Ok(added)
    }

    /// Finish the current session. One-way: the session cannot be resumed.
    pub async fn finish_session(&self) -> Result<Session, AttendanceError> {
        self.finish()
            .await
            .map_err(|e| self.failed("finish session", e))
    }

    async fn finish(&self) -> Result<Session, AttendanceError> {
        let session_id = {
            let inner = self.inner.lock().await;
            let session = inner.session.as_ref().ok_or(AttendanceError::NoSession)?;
            if session.is_finished {
                return Err(AttendanceError::SessionFinished);
            }
            session.id
        };

        let res = self.backend.finish_session(session_id).await?;
        if !res.success {
            let message = res
                .message
                .unwrap_or_else(|| "session was not finished".into());
            return Err(AttendanceError::Rejected(message));
        }

        self.recognition_active.store(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.session.as_mut().filter(|s| s.id == session_id) else {
            return res.session.ok_or(AttendanceError::NoSession);
        };
        session.is_active = false;
        session.is_finished = true;
        session.end_time = Some(Utc::now());
        tracing::info!(session = %session_id, "session finished");
        self.notifier.notify(Level::Success, "Session finished");
        Ok(session.clone())
    }

    /// Record backend-reported matches for `session_id`. Returns the entries
    /// that were newly added, in response order.
    ///
    /// Fails if `session_id` is no longer current or was finished while the
    /// recognition call was in flight; nothing is recorded then.
    pub async fn apply_matches(
        &self,
        session_id: SessionId,
        matches: &[RecognitionMatch],
    ) -> Result<Vec<RecognizedUser>, AttendanceError> {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.session.as_ref().filter(|s| s.id == session_id) else {
            return Err(AttendanceError::NoSession);
        };
        if session.is_finished {
            tracing::debug!(session = %session_id, matches = matches.len(), "session finished while recognizing; dropping matches");
            return Err(AttendanceError::SessionFinished);
        }

        let now = Utc::now();
        let entries: Vec<RecognizedUser> = matches
            .iter()
            .filter(|m| m.attendance_marked)
            .map(|m| RecognizedUser {
                id: m.user_id,
                name: m.name.clone(),
                timestamp: now,
                tags: session
                    .target(m.user_id)
                    .map(|p| p.tags.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(entries
            .into_iter()
            .filter(|entry| inner.push_recognized(entry.clone()))
            .collect())
    }

    /// Re-read `session_id` from the backend and adopt its finished state.
    /// Returns whether the session turned out to be finished.
    pub async fn refresh_finished(&self, session_id: SessionId) -> bool {
        let fetched = match self.backend.get_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(session = %session_id, error = %e, "could not re-read session");
                return false;
            }
        };
        if !fetched.is_finished {
            return false;
        }

        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.session.as_mut().filter(|s| s.id == session_id) {
            session.is_active = false;
            session.is_finished = true;
            session.end_time = fetched.end_time.or(session.end_time);
            self.recognition_active.store(false, Ordering::SeqCst);
            tracing::info!(session = %session_id, "session was finished elsewhere");
        }
        true
    }

    /// Report a failed operation once and hand the error back.
    fn failed(&self, action: &str, err: AttendanceError) -> AttendanceError {
        tracing::warn!(action, error = %err, "attendance operation failed");
        self.notifier.notify(
            Level::Error,
            &format!("Failed to {action}: {}", err.user_message()),
        );
        err
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    pub async fn recognized_users(&self) -> Vec<RecognizedUser> {
        self.inner.lock().await.recognized.clone()
    }

    pub async fn view(&self) -> Option<SessionView> {
        let inner = self.inner.lock().await;
        inner.session.as_ref().map(|session| SessionView {
            session: session.clone(),
            recognized: inner.recognized.clone(),
        })
    }

    pub fn recognition_active(&self) -> bool {
        self.recognition_active.load(Ordering::SeqCst)
    }

    pub fn set_recognition_active(&self, active: bool) {
        self.recognition_active.store(active, Ordering::SeqCst);
    }

    /// Forget the current session.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.session = None;
        inner.recognized.clear();
        self.recognition_active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_session, session_id, t1, FakeBackend, RecordingNotifier};

    fn state(backend: FakeBackend) -> (Arc<FakeBackend>, Arc<RecordingNotifier>, AttendanceState) {
        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AttendanceState::new(backend.clone(), notifier.clone());
        (backend, notifier, state)
    }

    fn rec(id: PersonId, name: &str) -> RecognitionMatch {
        RecognitionMatch {
            user_id: id,
            name: name.into(),
            confidence: 0.9,
            attendance_marked: true,
        }
    }

    #[tokio::test]
    async fn test_load_rebuilds_recognized_and_breakdown() {
        let (_, notifier, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();

        let recognized = state.recognized_users().await;
        assert_eq!(recognized.len(), 1);
        assert_eq!(recognized[0].id, 1);
        assert_eq!(recognized[0].timestamp, t1());

        let view = state.view().await.unwrap();
        let ids: Vec<_> = view.remaining().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3]);

        let breakdown = view.tag_breakdown();
        let labels: Vec<_> = breakdown.buckets.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["cs101", "lab", "No tag"]);
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn test_load_dedups_present_records() {
        let mut session = sample_session();
        let mut again = session.attendances[0].clone();
        again.timestamp = t1() + chrono::Duration::minutes(5);
        session.attendances.push(again);
        let (_, _, state) = state(FakeBackend::with_session(session));

        state.load_session(session_id()).await.unwrap();
        let recognized = state.recognized_users().await;
        assert_eq!(recognized.len(), 1);
        assert_eq!(recognized[0].timestamp, t1());
    }

    #[tokio::test]
    async fn test_load_failure_keeps_current_session() {
        let (backend, notifier, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();

        *backend.session.lock().unwrap() = None;
        let err = state.load_session(session_id()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Api(ApiError::Status { status: 404, .. })));
        assert_eq!(notifier.count(Level::Error), 1);
        assert!(state.current_session().await.is_some());
        assert_eq!(state.recognized_users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_finished_session_informs() {
        let mut session = sample_session();
        session.is_finished = true;
        session.is_active = false;
        let (_, notifier, state) = state(FakeBackend::with_session(session));

        state.load_session(session_id()).await.unwrap();
        assert_eq!(notifier.count(Level::Info), 1);
    }

    #[tokio::test]
    async fn test_mark_attendance_is_idempotent() {
        let (backend, notifier, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();

        assert!(state.mark_attendance(2).await.unwrap());
        assert!(!state.mark_attendance(2).await.unwrap());
        assert!(!state.mark_attendance(1).await.unwrap());

        let ids: Vec<_> = state.recognized_users().await.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 3);
        assert_eq!(notifier.count(Level::Success), 1);
    }

    #[tokio::test]
    async fn test_mark_preconditions() {
        let (backend, notifier, state) = state(FakeBackend::with_session(sample_session()));
        assert!(matches!(
            state.mark_attendance(2).await,
            Err(AttendanceError::NoSession)
        ));

        state.load_session(session_id()).await.unwrap();
        assert!(matches!(
            state.mark_attendance(99).await,
            Err(AttendanceError::NotTargeted(99))
        ));
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 0);

        *backend.fail_mark.lock().unwrap() = true;
        assert!(matches!(
            state.mark_attendance(2).await,
            Err(AttendanceError::Api(_))
        ));
        assert_eq!(state.recognized_users().await.len(), 1);
        // one notification per failed attempt
        assert_eq!(notifier.count(Level::Error), 3);
    }

    #[tokio::test]
    async fn test_finish_is_terminal() {
        let (backend, _, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();
        state.set_recognition_active(true);

        let finished = state.finish_session().await.unwrap();
        assert!(finished.is_finished);
        assert!(!finished.is_active);
        assert!(finished.end_time.is_some());
        assert!(!state.recognition_active());

        assert!(matches!(
            state.finish_session().await,
            Err(AttendanceError::SessionFinished)
        ));
        assert!(matches!(
            state.mark_attendance(2).await,
            Err(AttendanceError::SessionFinished)
        ));
        assert_eq!(backend.finish_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.recognized_users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_matches_only_marked_and_new() {
        let (_, _, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();

        let mut unmarked = rec(3, "Caro");
        unmarked.attendance_marked = false;
        let added = state
            .apply_matches(session_id(), &[rec(1, "Ana"), rec(2, "Ben"), unmarked, rec(2, "Ben")])
            .await
            .unwrap();

        let ids: Vec<_> = added.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(added[0].tags.len(), 2);

        let other: SessionId = "00000000-0000-4000-8000-000000000000".parse().unwrap();
        assert!(matches!(
            state.apply_matches(other, &[rec(3, "Caro")]).await,
            Err(AttendanceError::NoSession)
        ));
        assert_eq!(state.recognized_users().await.len(), 2);
    }

    #[tokio::test]
    async fn test_apply_matches_after_finish_changes_nothing() {
        let (_, _, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();
        state.finish_session().await.unwrap();

        assert!(matches!(
            state.apply_matches(session_id(), &[rec(2, "Ben")]).await,
            Err(AttendanceError::SessionFinished)
        ));
        let ids: Vec<_> = state.recognized_users().await.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_in_flight_when_finished_records_nothing() {
        let backend = Arc::new(FakeBackend::with_session(sample_session()));
        backend.set_mark_delay(std::time::Duration::from_secs(3));
        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(AttendanceState::new(backend.clone(), notifier.clone()));
        state.load_session(session_id()).await.unwrap();

        let marking = tokio::spawn({
            let state = state.clone();
            async move { state.mark_attendance(2).await }
        });
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        state.finish_session().await.unwrap();

        let res = marking.await.unwrap();
        assert!(matches!(res, Err(AttendanceError::SessionFinished)));
        let ids: Vec<_> = state.recognized_users().await.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(notifier.count(Level::Error), 1);
    }

    #[tokio::test]
    async fn test_refresh_adopts_remote_finish() {
        let (backend, _, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();
        state.set_recognition_active(true);

        assert!(!state.refresh_finished(session_id()).await);
        assert!(state.recognition_active());

        backend.session.lock().unwrap().as_mut().unwrap().is_finished = true;
        assert!(state.refresh_finished(session_id()).await);
        assert!(state.current_session().await.unwrap().is_finished);
        assert!(!state.recognition_active());
    }

    #[tokio::test]
    async fn test_start_session_resets_recognized() {
        let (_, _, state) = state(FakeBackend::with_session(sample_session()));
        state.load_session(session_id()).await.unwrap();

        let input = SessionInput {
            name: "Afternoon lab".into(),
            description: None,
            session_date: t1().date_naive(),
            start_time: t1(),
            end_time: None,
            camera_mode: rollcall_core::CameraMode::Webcam,
            esp32_ip: None,
            target_users: vec![2, 3],
        };
        let created = state.start_session(&input).await.unwrap();
        assert_eq!(created.name, "Afternoon lab");
        assert!(state.recognized_users().await.is_empty());
        assert_eq!(state.view().await.unwrap().stats().total, 2);
    }
}
