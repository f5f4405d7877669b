//! Timed and manual recognition captures against the current session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rollcall_api::ApiError;
use rollcall_core::RecognizedUser;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::attendance::{AttendanceError, AttendanceState};
use crate::backend::Backend;
use crate::camera::{CameraState, CaptureError};
use crate::notify::{Level, Notifier};

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("a recognition request is already in flight")]
    Busy,
    #[error("no session loaded")]
    NoSession,
    #[error("session is already finished")]
    SessionFinished,
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    /// Delay before the first capture, shown to the operator in whole seconds.
    pub countdown: Duration,
    /// Cadence of captures after the first one.
    pub interval: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(5),
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Countdown { remaining: u64 },
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Unattended tick of the loop.
    Auto,
    /// Operator-requested single shot.
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// At least one match was marked. Holds the entries that were new.
    Recognized(Vec<RecognizedUser>),
    /// Nothing marked; carries the backend's message if it sent one.
    NoMatch(Option<String>),
}

/// Holds the busy flag for the duration of one round-trip.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Recognizer {
    attendance: Arc<AttendanceState>,
    camera: Arc<CameraState>,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    busy: AtomicBool,
}

impl Recognizer {
    async fn run(&self, trigger: Trigger) -> Result<CycleOutcome, RecognitionError> {
        let result = self.cycle().await;
        self.report(trigger, &result);
        result
    }

    async fn cycle(&self) -> Result<CycleOutcome, RecognitionError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(RecognitionError::Busy)?;

        let session = self
            .attendance
            .current_session()
            .await
            .ok_or(RecognitionError::NoSession)?;
        if session.is_finished {
            return Err(RecognitionError::SessionFinished);
        }

        let source = self.camera.capture_image().await?;
        let res = match self.backend.recognize_face(session.id, &source).await {
            Ok(res) => res,
            Err(e) => {
                // The backend refuses finished sessions with a 400.
                if e.status() == Some(400) && self.attendance.refresh_finished(session.id).await {
                    return Err(RecognitionError::SessionFinished);
                }
                return Err(e.into());
            }
        };

        if res.marked().next().is_none() {
            return Ok(CycleOutcome::NoMatch(res.message));
        }
        match self.attendance.apply_matches(session.id, &res.matches).await {
            Ok(added) => Ok(CycleOutcome::Recognized(added)),
            Err(AttendanceError::SessionFinished) => Err(RecognitionError::SessionFinished),
            Err(_) => Err(RecognitionError::NoSession),
        }
    }

    /// Unattended cycles stay quiet unless the backend call itself failed.
    fn report(&self, trigger: Trigger, result: &Result<CycleOutcome, RecognitionError>) {
        let manual = trigger == Trigger::Manual;
        match result {
            Ok(CycleOutcome::Recognized(added)) => {
                tracing::info!(?trigger, added = added.len(), "recognition matched");
                if manual {
                    if added.is_empty() {
                        self.notifier
                            .notify(Level::Info, "Already recognized in this session");
                    }
                    for user in added {
                        self.notifier
                            .notify(Level::Success, &format!("Recognized: {}", user.name));
                    }
                }
            }
            Ok(CycleOutcome::NoMatch(message)) => {
                tracing::debug!(?trigger, ?message, "no match");
                if manual {
                    let message = message.as_deref().unwrap_or("No matching faces found");
                    self.notifier.notify(Level::Info, message);
                }
            }
            Err(RecognitionError::Busy) => {
                tracing::debug!(?trigger, "recognition busy, skipping");
                if manual {
                    self.notifier
                        .notify(Level::Warning, "Recognition already in progress");
                }
            }
            // the camera already told the operator
            Err(RecognitionError::Capture(e)) => {
                tracing::warn!(?trigger, error = %e, "capture failed, skipping cycle");
            }
            Err(e @ (RecognitionError::NoSession | RecognitionError::SessionFinished)) => {
                tracing::debug!(?trigger, error = %e, "recognition not possible");
                if manual {
                    self.notifier.notify(Level::Error, &e.to_string());
                }
            }
            Err(RecognitionError::Api(e)) => {
                tracing::warn!(?trigger, error = %e, "recognition request failed");
                self.notifier.notify(
                    Level::Error,
                    &format!("Recognition failed: {}", e.user_message()),
                );
            }
        }
    }
}

struct Active {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

/// Auto-recognition: a countdown, one capture, then one capture per interval.
///
/// Owns its task. `stop` and `Drop` cancel it synchronously, so no capture
/// starts afterwards.
pub struct RecognitionLoop {
    recognizer: Arc<Recognizer>,
    timing: LoopTiming,
    phase: Arc<watch::Sender<LoopPhase>>,
    active: Mutex<Option<Active>>,
}

impl RecognitionLoop {
    pub fn new(
        attendance: Arc<AttendanceState>,
        camera: Arc<CameraState>,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        timing: LoopTiming,
    ) -> Self {
        let (phase, _) = watch::channel(LoopPhase::Idle);
        Self {
            recognizer: Arc::new(Recognizer {
                attendance,
                camera,
                backend,
                notifier,
                busy: AtomicBool::new(false),
            }),
            timing,
            phase: Arc::new(phase),
            active: Mutex::new(None),
        }
    }

    /// Begin the countdown. A no-op if the loop is already running.
    pub async fn start(&self) -> Result<(), RecognitionError> {
        let session = match self.recognizer.attendance.current_session().await {
            Some(session) if !session.is_finished => session,
            other => {
                let err = match other {
                    Some(_) => RecognitionError::SessionFinished,
                    None => RecognitionError::NoSession,
                };
                self.recognizer
                    .notifier
                    .notify(Level::Error, &format!("Cannot start recognition: {err}"));
                return Err(err);
            }
        };

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active
            .as_ref()
            .is_some_and(|a| a.running.load(Ordering::SeqCst) && !a.handle.is_finished())
        {
            return Ok(());
        }

        tracing::info!(
            session = %session.id,
            countdown = ?self.timing.countdown,
            interval = ?self.timing.interval,
            "starting auto-recognition"
        );
        self.recognizer.attendance.set_recognition_active(true);
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_loop(
            self.recognizer.clone(),
            self.timing,
            running.clone(),
            self.phase.clone(),
        ));
        *active = Some(Active { handle, running });
        Ok(())
    }

    /// Cancel the countdown or the interval.
    pub fn stop(&self) {
        let taken = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(active) = taken {
            active.running.store(false, Ordering::SeqCst);
            active.handle.abort();
            tracing::info!("auto-recognition stopped");
        }
        self.recognizer.attendance.set_recognition_active(false);
        self.phase.send_replace(LoopPhase::Idle);
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|a| a.running.load(Ordering::SeqCst) && !a.handle.is_finished())
    }

    pub fn phase(&self) -> LoopPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoopPhase> {
        self.phase.subscribe()
    }

    /// One operator-triggered capture. Always reports its outcome.
    pub async fn capture_once(&self) -> Result<CycleOutcome, RecognitionError> {
        self.recognizer.run(Trigger::Manual).await
    }
}

impl Drop for RecognitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    recognizer: Arc<Recognizer>,
    timing: LoopTiming,
    running: Arc<AtomicBool>,
    phase: Arc<watch::Sender<LoopPhase>>,
) {
    let mut left = timing.countdown;
    while !left.is_zero() {
        let whole = left.as_secs() + u64::from(left.subsec_nanos() > 0);
        phase.send_replace(LoopPhase::Countdown { remaining: whole });
        let step = left.min(Duration::from_secs(1));
        tokio::time::sleep(step).await;
        left -= step;
        if !running.load(Ordering::SeqCst) {
            return;
        }
    }

    phase.send_replace(LoopPhase::Running);
    let period = timing.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) || !recognizer.attendance.recognition_active() {
            break;
        }

        let started = Instant::now();
        match recognizer.run(Trigger::Auto).await {
            Err(RecognitionError::NoSession | RecognitionError::SessionFinished) => break,
            _ => {}
        }
        // A slow round-trip pushes the next capture a full interval out.
        if started.elapsed() >= period {
            ticker.reset();
        }
    }

    if running.swap(false, Ordering::SeqCst) {
        tracing::info!("auto-recognition ended");
        recognizer.attendance.set_recognition_active(false);
        phase.send_replace(LoopPhase::Idle);
    }
}
