//! rollcall-hw: Local webcam access for operator-side capture.
//!
//! Provides V4L2 webcam snapshots encoded as JPEG, plus the `Webcam`
//! trait the coordination layer captures through.

pub mod frame;
pub mod webcam;

pub use frame::{Frame, Pixels, Snapshot};
pub use webcam::{DeviceInfo, PixelFormat, V4lWebcam, Webcam, WebcamError};
