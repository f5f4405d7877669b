//! rollcall-core: Attendance data model and pure derived views.
//!
//! Holds the shapes exchanged with the recognition backend, the per-tag
//! breakdown of people still expected in a session, dashboard figures and
//! report export.

pub mod breakdown;
pub mod overview;
pub mod report;
pub mod types;

pub use breakdown::{remaining, tag_breakdown, TagBreakdown, TagBucket};
pub use overview::{dashboard_stats, search_sessions, DashboardStats};
pub use report::{AttendanceReport, OverallStats, ReportError, SessionSummary};
pub use types::{
    AttendanceRecord, CameraConfig, CameraMode, FaceImage, FaceImageId, Person, PersonId,
    PersonInput, RecognizedUser, Session, SessionId, SessionInput, SessionStats, Tag, TagId,
    TagInput,
};
