use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rollcall_engine::{CameraSettings, LoopTiming};
use serde::Deserialize;

/// Client configuration: defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend API root (default: http://localhost:8000/api).
    pub api_url: String,
    /// V4L2 device used in webcam mode.
    pub webcam_device: String,
    pub webcam_width: u32,
    pub webcam_height: u32,
    /// Frames discarded after the webcam stream starts.
    pub warmup_frames: usize,
    /// Per-request timeout for backend calls, in seconds.
    pub request_timeout_secs: u64,
    /// Networked-camera connectivity probe timeout, in seconds.
    pub probe_timeout_secs: u64,
    /// Pause between a disconnect and a reconnect, in milliseconds.
    pub settle_ms: u64,
    /// Countdown before the first auto capture, in seconds.
    pub countdown_secs: u64,
    /// Interval between auto captures, in seconds.
    pub interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: rollcall_api::DEFAULT_BASE_URL.to_string(),
            webcam_device: "/dev/video0".to_string(),
            webcam_width: 640,
            webcam_height: 480,
            warmup_frames: 2,
            request_timeout_secs: 30,
            probe_timeout_secs: 5,
            settle_ms: 500,
            countdown_secs: 5,
            interval_secs: 5,
        }
    }
}

/// Shape of the optional config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    webcam_device: Option<String>,
    webcam_width: Option<u32>,
    webcam_height: Option<u32>,
    warmup_frames: Option<usize>,
    request_timeout_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    settle_ms: Option<u64>,
    countdown_secs: Option<u64>,
    interval_secs: Option<u64>,
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Some(read_file(Path::new(&path))?),
            Err(_) => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    fn from_sources(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(text) = file {
            let overlay: FileConfig = toml::from_str(text).context("invalid config file")?;
            config.apply(overlay);
        }

        if let Some(url) = env("ROLLCALL_API_URL") {
            config.api_url = url;
        }
        if let Some(device) = env("ROLLCALL_WEBCAM_DEVICE") {
            config.webcam_device = device;
        }
        config.request_timeout_secs = env_parse(
            env("ROLLCALL_REQUEST_TIMEOUT_SECS"),
            config.request_timeout_secs,
        );
        config.probe_timeout_secs =
            env_parse(env("ROLLCALL_PROBE_TIMEOUT_SECS"), config.probe_timeout_secs);
        config.settle_ms = env_parse(env("ROLLCALL_SETTLE_MS"), config.settle_ms);
        config.countdown_secs = env_parse(env("ROLLCALL_COUNTDOWN_SECS"), config.countdown_secs);
        config.interval_secs = env_parse(env("ROLLCALL_INTERVAL_SECS"), config.interval_secs);

        if config.interval_secs == 0 {
            anyhow::bail!("interval_secs must be at least 1");
        }
        Ok(config)
    }

    fn apply(&mut self, file: FileConfig) {
        let FileConfig {
            api_url,
            webcam_device,
            webcam_width,
            webcam_height,
            warmup_frames,
            request_timeout_secs,
            probe_timeout_secs,
            settle_ms,
            countdown_secs,
            interval_secs,
        } = file;
        if let Some(url) = api_url {
            self.api_url = url;
        }
        if let Some(device) = webcam_device {
            self.webcam_device = device;
        }
        self.webcam_width = webcam_width.unwrap_or(self.webcam_width);
        self.webcam_height = webcam_height.unwrap_or(self.webcam_height);
        self.warmup_frames = warmup_frames.unwrap_or(self.warmup_frames);
        self.request_timeout_secs = request_timeout_secs.unwrap_or(self.request_timeout_secs);
        self.probe_timeout_secs = probe_timeout_secs.unwrap_or(self.probe_timeout_secs);
        self.settle_ms = settle_ms.unwrap_or(self.settle_ms);
        self.countdown_secs = countdown_secs.unwrap_or(self.countdown_secs);
        self.interval_secs = interval_secs.unwrap_or(self.interval_secs);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_ms),
        }
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            countdown: Duration::from_secs(self.countdown_secs),
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))
}

/// Unparseable values fall back to the default, as unset ones do.
fn env_parse<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
