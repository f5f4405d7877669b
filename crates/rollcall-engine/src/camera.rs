//! Capture source selection and networked-camera connection state.

use std::sync::Arc;
use std::time::Duration;

use rollcall_api::FaceSource;
use rollcall_core::CameraMode;
use rollcall_hw::{Webcam, WebcamError};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex, MutexGuard};

use crate::backend::Backend;
use crate::notify::{Level, Notifier};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("webcam not initialized")]
    NotInitialized,
    #[error("ESP32-CAM not connected")]
    NotConnected,
    #[error("webcam error: {0}")]
    Webcam(#[from] WebcamError),
    #[error("capture task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy)]
pub struct CameraSettings {
    /// Upper bound on a connectivity probe before it counts as a failure.
    pub probe_timeout: Duration,
    /// Pause between a disconnect and the next connect attempt.
    pub settle_delay: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// An outstanding connectivity probe. Dropping `cancel` aborts it.
struct Probe {
    id: u64,
    ip: String,
    cancel: oneshot::Sender<()>,
}

struct Inner {
    mode: CameraMode,
    esp32_ip: Option<String>,
    status: ConnectionStatus,
    webcam: Option<Arc<dyn Webcam>>,
    stream_url: Option<String>,
    probe: Option<Probe>,
    next_probe_id: u64,
}

impl Inner {
    /// Back to `Disconnected`, aborting any probe and dropping the stream.
    fn release(&mut self) {
        if let Some(probe) = self.probe.take() {
            tracing::debug!(probe = probe.id, ip = %probe.ip, "aborting connectivity probe");
            drop(probe.cancel);
        }
        self.status = ConnectionStatus::Disconnected;
        self.esp32_ip = None;
        self.stream_url = None;
    }

    /// A probe whose caller stopped polling it leaves its receiver dropped.
    fn reap_abandoned_probe(&mut self) {
        if self.probe.as_ref().is_some_and(|p| p.cancel.is_closed()) {
            tracing::debug!("connectivity probe abandoned by its caller");
            self.release();
        }
    }
}

/// The single active capture source and the networked camera's connection.
pub struct CameraState {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    settings: CameraSettings,
    inner: Mutex<Inner>,
}

impl CameraState {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>, settings: CameraSettings) -> Self {
        Self {
            backend,
            notifier,
            settings,
            inner: Mutex::new(Inner {
                mode: CameraMode::Webcam,
                esp32_ip: None,
                status: ConnectionStatus::Disconnected,
                webcam: None,
                stream_url: None,
                probe: None,
                next_probe_id: 0,
            }),
        }
    }

    async fn lock(&self) -> MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().await;
        inner.reap_abandoned_probe();
        inner
    }

    pub fn settings(&self) -> CameraSettings {
        self.settings
    }

    pub async fn mode(&self) -> CameraMode {
        self.lock().await.mode
    }

    /// Switch the capture source. Does not touch hardware or connections.
    pub async fn set_mode(&self, mode: CameraMode) {
        let mut inner = self.lock().await;
        if inner.mode != mode {
            tracing::info!(from = %inner.mode, to = %mode, "camera mode changed");
            inner.mode = mode;
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.lock().await.status
    }

    pub async fn esp32_ip(&self) -> Option<String> {
        self.lock().await.esp32_ip.clone()
    }

    pub async fn attach_webcam(&self, webcam: Arc<dyn Webcam>) {
        tracing::info!(source = %webcam.describe(), "webcam attached");
        self.lock().await.webcam = Some(webcam);
    }

    pub async fn detach_webcam(&self) {
        self.lock().await.webcam = None;
    }

    /// Probe the networked camera at `ip` through the backend.
    ///
    /// Any probe already in flight is aborted first and its result is never
    /// applied. Returns whether the camera ended up connected.
    pub async fn test_connection(&self, ip: &str) -> bool {
        let ip = ip.trim();
        if ip.is_empty() {
            self.notifier.notify(Level::Error, "IP address is required");
            return false;
        }

        let (probe_id, mut cancelled) = {
            let mut inner = self.lock().await;
            inner.release();
            inner.next_probe_id += 1;
            let id = inner.next_probe_id;
            let (tx, rx) = oneshot::channel();
            inner.probe = Some(Probe {
                id,
                ip: ip.to_string(),
                cancel: tx,
            });
            inner.status = ConnectionStatus::Connecting;
            (id, rx)
        };

        tracing::info!(ip, probe = probe_id, "probing networked camera");

        let outcome = tokio::select! {
            _ = &mut cancelled => {
                tracing::debug!(ip, probe = probe_id, "probe superseded");
                return false;
            }
            res = tokio::time::timeout(self.settings.probe_timeout, self.backend.test_connection(ip)) => res,
        };

        // `cancelled` stays alive until here so the probe is not reaped early.
        let mut inner = self.lock().await;
        drop(cancelled);
        if inner.probe.as_ref().map(|p| p.id) != Some(probe_id) {
            tracing::debug!(ip, probe = probe_id, "discarding stale probe result");
            return false;
        }
        inner.probe = None;

        match outcome {
            Ok(Ok(test)) if test.success => {
                inner.status = ConnectionStatus::Connected;
                inner.esp32_ip = Some(ip.to_string());
                tracing::info!(ip, "networked camera connected");
                self.notifier
                    .notify(Level::Success, "ESP32-CAM connected successfully");
                true
            }
            Ok(Ok(test)) => {
                inner.status = ConnectionStatus::Disconnected;
                let message = test.message.unwrap_or_else(|| "Connection failed".into());
                tracing::warn!(ip, %message, "networked camera unreachable");
                self.notifier.notify(Level::Error, &message);
                false
            }
            Ok(Err(e)) => {
                inner.status = ConnectionStatus::Disconnected;
                tracing::warn!(ip, error = %e, "connectivity probe failed");
                self.notifier
                    .notify(Level::Error, &format!("Connection failed: {}", e.user_message()));
                false
            }
            Err(_) => {
                inner.status = ConnectionStatus::Disconnected;
                tracing::warn!(ip, timeout = ?self.settings.probe_timeout, "connectivity probe timed out");
                self.notifier.notify(
                    Level::Error,
                    &format!(
                        "Connection to {ip} timed out after {}s",
                        self.settings.probe_timeout.as_secs_f32()
                    ),
                );
                false
            }
        }
    }

    /// Drop the networked camera: status, IP, stream and any in-flight probe.
    pub async fn disconnect(&self) {
        let mut inner = self.lock().await;
        if inner.status != ConnectionStatus::Disconnected || inner.probe.is_some() {
            tracing::info!(ip = ?inner.esp32_ip, "networked camera disconnected");
        }
        inner.release();
    }

    /// Disconnect, wait for the connection to be released, then probe `ip`.
    pub async fn reconnect(&self, ip: &str) -> bool {
        self.disconnect().await;
        tokio::time::sleep(self.settings.settle_delay).await;
        self.test_connection(ip).await
    }

    /// Select a source in one step. ESP32 mode is only adopted once the probe
    /// succeeds.
    pub async fn initialize(&self, mode: CameraMode, ip: Option<&str>) -> bool {
        match mode {
            CameraMode::Webcam => {
                let mut inner = self.lock().await;
                inner.release();
                inner.mode = CameraMode::Webcam;
                true
            }
            CameraMode::Esp32 => {
                let Some(ip) = ip.filter(|ip| !ip.trim().is_empty()) else {
                    self.notifier
                        .notify(Level::Error, "ESP32-CAM IP address is required");
                    return false;
                };
                if !self.test_connection(ip).await {
                    return false;
                }
                self.set_mode(CameraMode::Esp32).await;
                true
            }
        }
    }

    /// Open the networked camera's MJPEG stream. Requires a live connection.
    pub async fn start_stream(&self) -> Result<String, CaptureError> {
        let mut inner = self.lock().await;
        match (&inner.esp32_ip, inner.status) {
            (Some(ip), ConnectionStatus::Connected) => {
                let url = format!("http://{ip}/stream");
                inner.stream_url = Some(url.clone());
                Ok(url)
            }
            _ => {
                drop(inner);
                self.notifier.notify(Level::Error, "ESP32-CAM not connected");
                Err(CaptureError::NotConnected)
            }
        }
    }

    pub async fn stop_stream(&self) {
        self.lock().await.stream_url = None;
    }

    pub async fn stream_url(&self) -> Option<String> {
        self.lock().await.stream_url.clone()
    }

    /// Acquire an image from the active source.
    ///
    /// Webcam mode returns a JPEG data URL. ESP32 mode returns the camera IP;
    /// the backend pulls the frame itself.
    pub async fn capture_image(&self) -> Result<FaceSource, CaptureError> {
        let (mode, webcam, ip, status) = {
            let inner = self.lock().await;
            (
                inner.mode,
                inner.webcam.clone(),
                inner.esp32_ip.clone(),
                inner.status,
            )
        };

        match mode {
            CameraMode::Webcam => {
                let Some(webcam) = webcam else {
                    self.notifier.notify(Level::Error, "Webcam not initialized");
                    return Err(CaptureError::NotInitialized);
                };
                let snapshot = tokio::task::spawn_blocking(move || webcam.snapshot()).await;
                match snapshot {
                    Ok(Ok(snapshot)) => Ok(FaceSource::Image(snapshot.to_data_url())),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "webcam capture failed");
                        self.notifier.notify(Level::Error, "Error capturing image");
                        Err(CaptureError::Webcam(e))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "webcam capture task failed");
                        self.notifier.notify(Level::Error, "Error capturing image");
                        Err(CaptureError::Task(e.to_string()))
                    }
                }
            }
            CameraMode::Esp32 => match (ip, status) {
                (Some(ip), ConnectionStatus::Connected) => Ok(FaceSource::Esp32 { ip }),
                _ => {
                    self.notifier.notify(Level::Error, "ESP32-CAM not connected");
                    Err(CaptureError::NotConnected)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeWebcam, RecordingNotifier};

    fn state(backend: &Arc<FakeBackend>, notifier: &Arc<RecordingNotifier>) -> CameraState {
        CameraState::new(backend.clone(), notifier.clone(), CameraSettings::default())
    }

    #[tokio::test]
    async fn test_webcam_capture_requires_handle() {
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);

        let err = camera.capture_image().await.unwrap_err();
        assert!(matches!(err, CaptureError::NotInitialized));
        assert_eq!(notifier.count(Level::Error), 1);

        camera.attach_webcam(Arc::new(FakeWebcam { fail: false })).await;
        match camera.capture_image().await.unwrap() {
            FaceSource::Image(url) => assert!(url.starts_with("data:image/jpeg;base64,")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_webcam_failure_notifies_once() {
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);
        camera.attach_webcam(Arc::new(FakeWebcam { fail: true })).await;

        assert!(matches!(
            camera.capture_image().await,
            Err(CaptureError::Webcam(_))
        ));
        assert_eq!(notifier.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_esp32_capture_needs_connection() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_probe("10.0.0.7", Duration::from_millis(50), true);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);
        camera.set_mode(CameraMode::Esp32).await;

        assert!(matches!(
            camera.capture_image().await,
            Err(CaptureError::NotConnected)
        ));

        assert!(camera.test_connection("10.0.0.7").await);
        assert_eq!(camera.status().await, ConnectionStatus::Connected);
        assert_eq!(
            camera.capture_image().await.unwrap(),
            FaceSource::Esp32 {
                ip: "10.0.0.7".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_and_timeout_disconnect() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_probe("10.0.0.8", Duration::from_millis(10), false);
        backend.set_probe("10.0.0.9", Duration::from_secs(30), true);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);

        assert!(!camera.test_connection("10.0.0.8").await);
        assert_eq!(camera.status().await, ConnectionStatus::Disconnected);

        let started = tokio::time::Instant::now();
        assert!(!camera.test_connection("10.0.0.9").await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(camera.status().await, ConnectionStatus::Disconnected);
        assert_eq!(camera.esp32_ip().await, None);

        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert!(events[1].1.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_probe_does_not_overwrite() {
        let backend = Arc::new(FakeBackend::default());
        // A resolves later than B and would succeed if it were applied.
        backend.set_probe("10.0.0.1", Duration::from_secs(2), true);
        backend.set_probe("10.0.0.2", Duration::from_millis(100), false);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = Arc::new(state(&backend, &notifier));

        let first = {
            let camera = camera.clone();
            tokio::spawn(async move { camera.test_connection("10.0.0.1").await })
        };
        tokio::task::yield_now().await;
        assert_eq!(camera.status().await, ConnectionStatus::Connecting);

        assert!(!camera.test_connection("10.0.0.2").await);
        assert!(!first.await.unwrap());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(camera.status().await, ConnectionStatus::Disconnected);
        assert_eq!(camera.esp32_ip().await, None);
        // only B's failure is reported
        assert_eq!(notifier.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_does_not_stay_connecting() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_probe("10.0.0.5", Duration::from_secs(3), true);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);

        let gave_up =
            tokio::time::timeout(Duration::from_secs(1), camera.test_connection("10.0.0.5")).await;
        assert!(gave_up.is_err());

        assert_eq!(camera.status().await, ConnectionStatus::Disconnected);
        assert_eq!(camera.esp32_ip().await, None);
        assert!(notifier.events().is_empty());

        // the next probe starts from a clean state
        backend.set_probe("10.0.0.5", Duration::ZERO, true);
        assert!(camera.test_connection("10.0.0.5").await);
        assert_eq!(camera.status().await, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_aborts_probe_and_clears_stream() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_probe("10.0.0.3", Duration::from_millis(10), true);
        backend.set_probe("10.0.0.4", Duration::from_secs(3), true);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = Arc::new(state(&backend, &notifier));

        assert!(camera.test_connection("10.0.0.3").await);
        let url = camera.start_stream().await.unwrap();
        assert_eq!(url, "http://10.0.0.3/stream");

        camera.disconnect().await;
        assert_eq!(camera.stream_url().await, None);
        assert_eq!(camera.esp32_ip().await, None);

        let pending = {
            let camera = camera.clone();
            tokio::spawn(async move { camera.test_connection("10.0.0.4").await })
        };
        tokio::task::yield_now().await;
        camera.disconnect().await;
        assert!(!pending.await.unwrap());
        assert_eq!(camera.status().await, ConnectionStatus::Disconnected);
        assert!(camera.start_stream().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_only_switches_on_success() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_probe("10.0.0.5", Duration::ZERO, false);
        backend.set_probe("10.0.0.6", Duration::ZERO, true);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);

        assert!(!camera.initialize(CameraMode::Esp32, None).await);
        assert!(!camera.initialize(CameraMode::Esp32, Some("10.0.0.5")).await);
        assert_eq!(camera.mode().await, CameraMode::Webcam);

        assert!(camera.initialize(CameraMode::Esp32, Some("10.0.0.6")).await);
        assert_eq!(camera.mode().await, CameraMode::Esp32);

        assert!(camera.initialize(CameraMode::Webcam, None).await);
        assert_eq!(camera.mode().await, CameraMode::Webcam);
        assert_eq!(camera.status().await, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_settle_delay() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_probe("10.0.0.7", Duration::ZERO, true);
        let notifier = Arc::new(RecordingNotifier::default());
        let camera = state(&backend, &notifier);

        let started = tokio::time::Instant::now();
        assert!(camera.reconnect("10.0.0.7").await);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
