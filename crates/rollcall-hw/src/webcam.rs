//! Local webcam snapshots via the `v4l` crate.

use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame::{self, Frame, Pixels, Snapshot};

const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum WebcamError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    StreamingNotSupported,
    #[error(transparent)]
    Frame(#[from] frame::FrameError),
}

/// Anything that can produce a still frame on demand.
///
/// Implementations block; async callers should go through `spawn_blocking`.
pub trait Webcam: Send + Sync {
    fn snapshot(&self) -> Result<Snapshot, WebcamError>;

    /// Human-readable source name for logs.
    fn describe(&self) -> String;
}

/// Negotiated pixel format for the webcam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion-JPEG: each buffer is already a JPEG image.
    Mjpg,
    /// YUYV 4:2:2 packed, converted to RGB.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 webcam handle.
pub struct V4lWebcam {
    device: Mutex<Device>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
    /// Frames dropped after the stream starts while exposure settles.
    warmup_frames: usize,
}

impl V4lWebcam {
    /// Open a webcam by path (e.g., "/dev/video0") at the requested resolution.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, WebcamError> {
        if !Path::new(device_path).exists() {
            return Err(WebcamError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                WebcamError::DeviceBusy
            } else {
                WebcamError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            WebcamError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(WebcamError::StreamingNotSupported);
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened webcam"
        );

        // Prefer MJPG so frames pass through without re-encoding; drivers
        // fall back to YUYV or GREY on their own.
        let mut fmt = device.format().map_err(|e| {
            WebcamError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"MJPG");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            WebcamError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpg
        } else if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(WebcamError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need MJPG, YUYV, or GREY)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated webcam format"
        );

        Ok(Self {
            device: Mutex::new(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
            warmup_frames: 2,
        })
    }

    pub fn with_warmup_frames(mut self, frames: usize) -> Self {
        self.warmup_frames = frames;
        self
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn decode(&self, buf: &[u8], sequence: u32) -> Result<Frame, WebcamError> {
        let pixels = self.width as usize * self.height as usize;
        match self.pixel_format {
            PixelFormat::Yuyv => Ok(Frame {
                data: frame::yuyv_to_rgb(buf, self.width, self.height)?,
                width: self.width,
                height: self.height,
                pixels: Pixels::Rgb8,
                sequence,
            }),
            PixelFormat::Grey => {
                if buf.len() < pixels {
                    return Err(WebcamError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(Frame {
                    data: buf[..pixels].to_vec(),
                    width: self.width,
                    height: self.height,
                    pixels: Pixels::Luma8,
                    sequence,
                })
            }
            PixelFormat::Mjpg => Err(WebcamError::CaptureFailed(
                "MJPG frames are passed through, not decoded".into(),
            )),
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl Webcam for V4lWebcam {
    fn snapshot(&self) -> Result<Snapshot, WebcamError> {
        let device = self
            .device
            .lock()
            .map_err(|_| WebcamError::CaptureFailed("webcam lock poisoned".into()))?;

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, 4).map_err(|e| {
            WebcamError::CaptureFailed(format!("failed to create mmap stream: {e}"))
        })?;

        for _ in 0..self.warmup_frames {
            stream
                .next()
                .map_err(|e| WebcamError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|e| WebcamError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let buf = &buf[..used];

        let jpeg = match self.pixel_format {
            PixelFormat::Mjpg => {
                if buf.len() < 2 || buf[..2] != [0xFF, 0xD8] {
                    return Err(WebcamError::CaptureFailed(
                        "MJPG buffer does not start with a JPEG marker".into(),
                    ));
                }
                buf.to_vec()
            }
            _ => {
                let frame = self.decode(buf, meta.sequence)?;
                if frame.is_dark(0.95) {
                    tracing::warn!(
                        device = %self.device_path,
                        seq = meta.sequence,
                        brightness = frame.avg_brightness(),
                        "webcam frame is very dark"
                    );
                }
                frame.to_jpeg(JPEG_QUALITY)?
            }
        };

        tracing::debug!(
            device = %self.device_path,
            seq = meta.sequence,
            bytes = jpeg.len(),
            "webcam snapshot captured"
        );

        Ok(Snapshot {
            jpeg,
            width: self.width,
            height: self.height,
        })
    }

    fn describe(&self) -> String {
        format!("webcam {}", self.device_path)
    }
}
