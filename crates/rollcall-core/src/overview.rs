//! Dashboard figures and session search over already-fetched lists.

use chrono::{Days, NaiveDate};

use crate::types::Session;

/// How far back `recent_present` looks.
pub const RECENT_DAYS: u64 = 7;

/// Headline numbers for the overview screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_people: usize,
    /// Sessions still taking attendance.
    pub active_sessions: usize,
    pub total_sessions: usize,
    /// Present records across sessions dated within the last [`RECENT_DAYS`].
    pub recent_present: usize,
}

pub fn dashboard_stats(total_people: usize, sessions: &[Session], today: NaiveDate) -> DashboardStats {
    let cutoff = today.checked_sub_days(Days::new(RECENT_DAYS)).unwrap_or(NaiveDate::MIN);
    DashboardStats {
        total_people,
        active_sessions: sessions
            .iter()
            .filter(|s| s.is_active && !s.is_finished)
            .count(),
        total_sessions: sessions.len(),
        recent_present: sessions
            .iter()
            .filter(|s| s.session_date >= cutoff)
            .map(|s| s.present_records().count())
            .sum(),
    }
}

/// Case-insensitive substring match on name or description. A blank query
/// matches everything.
pub fn session_matches(session: &Session, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    session.name.to_lowercase().contains(&query)
        || session
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&query))
}

pub fn search_sessions<'a>(sessions: &'a [Session], query: &str) -> Vec<&'a Session> {
    sessions.iter().filter(|s| session_matches(s, query)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttendanceRecord, CameraMode};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn session(name: &str, description: Option<&str>, date: NaiveDate, present: &[bool]) -> Session {
        let id = Uuid::new_v4();
        let start = Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap());
        Session {
            id,
            name: name.into(),
            description: description.map(Into::into),
            session_date: date,
            start_time: start,
            end_time: None,
            is_active: true,
            is_finished: false,
            camera_mode: CameraMode::Webcam,
            esp32_ip: None,
            target_users: (1..=present.len() as i64).collect(),
            target_users_details: vec![],
            attendances: present
                .iter()
                .enumerate()
                .map(|(i, &is_present)| AttendanceRecord {
                    id: Uuid::new_v4(),
                    session: id,
                    user: i as i64 + 1,
                    user_details: None,
                    timestamp: start,
                    is_present,
                })
                .collect(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_dashboard_counts() {
        let mut finished = session("Lab", None, day(14), &[true, true]);
        finished.is_active = false;
        finished.is_finished = true;
        let mut paused = session("Seminar", None, day(13), &[true]);
        paused.is_active = false;
        let sessions = vec![
            session("Lecture", None, day(15), &[true, false, true]),
            finished,
            paused,
            // the cutoff day itself still counts
            session("Old lecture", None, day(8), &[true]),
            session("Older lecture", None, day(7), &[true, true]),
        ];

        let stats = dashboard_stats(42, &sessions, day(15));
        assert_eq!(
            stats,
            DashboardStats {
                total_people: 42,
                active_sessions: 3,
                total_sessions: 5,
                recent_present: 6,
            }
        );
        assert_eq!(dashboard_stats(0, &[], day(15)), DashboardStats::default());
    }

    #[test]
    fn test_search_name_or_description() {
        let sessions = vec![
            session("Morning Lecture", None, day(3), &[]),
            session("Lab", Some("Chemistry LECTURE follow-up"), day(4), &[]),
            session("Seminar", Some("guest talk"), day(5), &[]),
        ];

        let names = |query: &str| -> Vec<String> {
            search_sessions(&sessions, query)
                .iter()
                .map(|s| s.name.clone())
                .collect()
        };
        assert_eq!(names("lecture"), vec!["Morning Lecture", "Lab"]);
        assert_eq!(names("TALK"), vec!["Seminar"]);
        assert_eq!(names("  "), vec!["Morning Lecture", "Lab", "Seminar"]);
        assert!(names("physics").is_empty());
    }
}
