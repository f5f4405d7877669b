//! rollcall-engine: Client-side coordination for live attendance.
//!
//! Two explicitly constructed state objects replace the dashboard's global
//! stores: [`CameraState`] owns the capture source, [`AttendanceState`] owns
//! the session being worked on. [`RecognitionLoop`] drives timed captures
//! against both.

pub mod attendance;
pub mod backend;
pub mod camera;
pub mod notify;
pub mod recognition;

#[cfg(test)]
pub(crate) mod testing;

pub use attendance::{AttendanceError, AttendanceState, SessionView};
pub use backend::Backend;
pub use camera::{CameraSettings, CameraState, CaptureError, ConnectionStatus};
pub use notify::{Level, Notifier, TracingNotifier};
pub use recognition::{CycleOutcome, LoopPhase, LoopTiming, RecognitionError, RecognitionLoop, Trigger};
