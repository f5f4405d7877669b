//! Aggregate attendance reports and CSV export.

use std::io::Write;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SessionId;

pub const CSV_HEADER: [&str; 7] = [
    "Session Name",
    "Date",
    "Status",
    "Total Users",
    "Present",
    "Absent",
    "Attendance Rate (%)",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("no sessions to export")]
    NoData,
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-session line of the backend's report endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub date: NaiveDate,
    pub is_finished: bool,
    pub total_users: u32,
    pub present_users: u32,
    pub absent_users: u32,
}

impl SessionSummary {
    pub fn status(&self) -> &'static str {
        if self.is_finished {
            "Finished"
        } else {
            "Active"
        }
    }

    pub fn rate(&self) -> f64 {
        attendance_rate(self.present_users, self.total_users)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

/// Totals across every session in a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverallStats {
    pub sessions: usize,
    pub total_users: u64,
    pub total_present: u64,
    pub total_absent: u64,
    /// Rounded percentage of present over total targets.
    pub average_rate: u32,
}

impl AttendanceReport {
    pub fn overall(&self) -> OverallStats {
        overall_stats(&self.sessions)
    }
}

/// Presence percentage. Zero when there are no targets.
pub fn attendance_rate(present: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    present as f64 / total as f64 * 100.0
}

pub fn overall_stats(sessions: &[SessionSummary]) -> OverallStats {
    let total_users: u64 = sessions.iter().map(|s| s.total_users as u64).sum();
    let total_present: u64 = sessions.iter().map(|s| s.present_users as u64).sum();
    let total_absent: u64 = sessions.iter().map(|s| s.absent_users as u64).sum();
    let average_rate = if total_users > 0 {
        (total_present as f64 / total_users as f64 * 100.0).round() as u32
    } else {
        0
    };
    OverallStats {
        sessions: sessions.len(),
        total_users,
        total_present,
        total_absent,
        average_rate,
    }
}

/// Write one CSV row per session, preceded by [`CSV_HEADER`].
pub fn write_csv<W: Write>(sessions: &[SessionSummary], out: W) -> Result<(), ReportError> {
    if sessions.is_empty() {
        return Err(ReportError::NoData);
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(CSV_HEADER)?;
    for session in sessions {
        writer.write_record([
            session.name.clone(),
            session.date.format("%m/%d/%Y").to_string(),
            session.status().to_string(),
            session.total_users.to_string(),
            session.present_users.to_string(),
            session.absent_users.to_string(),
            format!("{:.1}", session.rate()),
        ])?;
    }
    writer.flush()?;

    tracing::debug!(rows = sessions.len(), "report exported as csv");
    Ok(())
}

pub fn to_csv(sessions: &[SessionSummary]) -> Result<String, ReportError> {
    let mut buf = Vec::new();
    write_csv(sessions, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// `attendance_report_YYYY-MM-DD.csv`
pub fn default_export_name(today: NaiveDate) -> String {
    format!("attendance_report_{}.csv", today.format("%Y-%m-%d"))
}
