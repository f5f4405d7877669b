use chrono::NaiveDate;
use reqwest::Method;
use rollcall_core::{AttendanceRecord, AttendanceReport, PersonId, Session, SessionId, SessionInput};
use serde::{Deserialize, Serialize};

use crate::{ApiClient, ApiError};

#[derive(Debug, Clone, Deserialize)]
pub struct MarkAttendanceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attendance: Option<AttendanceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinishResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session: Option<Session>,
}

#[derive(Serialize)]
struct MarkAttendanceBody {
    user_id: PersonId,
    is_present: bool,
}

pub(crate) fn report_query(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(start) = start {
        query.push(("start_date", start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = end {
        query.push(("end_date", end.format("%Y-%m-%d").to_string()));
    }
    query
}

impl ApiClient {
    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.get("/attendance/sessions/", &[]).await
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Session, ApiError> {
        self.get(&format!("/attendance/sessions/{id}/"), &[]).await
    }

    pub async fn create_session(&self, input: &SessionInput) -> Result<Session, ApiError> {
        self.send(Method::POST, "/attendance/sessions/", Some(input)).await
    }

    /// Update session metadata. The target list is never resent.
    pub async fn update_session(&self, id: SessionId, input: &SessionInput) -> Result<Session, ApiError> {
        let mut body = input.clone();
        body.target_users.clear();
        self.send(Method::PATCH, &format!("/attendance/sessions/{id}/"), Some(&body))
            .await
    }

    pub async fn delete_session(&self, id: SessionId) -> Result<(), ApiError> {
        self.delete(&format!("/attendance/sessions/{id}/")).await
    }

    pub async fn mark_attendance(
        &self,
        id: SessionId,
        person: PersonId,
        is_present: bool,
    ) -> Result<MarkAttendanceResponse, ApiError> {
        let body = MarkAttendanceBody {
            user_id: person,
            is_present,
        };
        self.send(
            Method::POST,
            &format!("/attendance/sessions/{id}/mark_attendance/"),
            Some(&body),
        )
        .await
    }

    /// Close a session. The backend back-fills absence for unrecorded targets.
    pub async fn finish_session(&self, id: SessionId) -> Result<FinishResponse, ApiError> {
        self.send::<(), _>(
            Method::POST,
            &format!("/attendance/sessions/{id}/finish_session/"),
            None,
        )
        .await
    }

    /// Aggregate report. Missing bounds default server-side to the last 30 days.
    pub async fn attendance_report(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<AttendanceReport, ApiError> {
        self.get("/attendance/sessions/report/", &report_query(start, end))
            .await
    }
}
