use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DutySession {
    pub duty_on_at: Option<DateTime<Utc>>,
    pub duty_off_at: Option<DateTime<Utc>>,
    pub working_hours: Option<f64>,
}

impl DutySession {
    pub fn open_at(at: DateTime<Utc>) -> Self {
        Self {
            duty_on_at: Some(at),
            duty_off_at: None,
            working_hours: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.duty_on_at.is_some() && self.duty_off_at.is_none()
    }
}

/// Append-only duty ledger for one courier: calendar day -> session list.
/// At most one session is open at any time, across all days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyRecord {
    pub courier: String,
    pub daily_logs: BTreeMap<NaiveDate, Vec<DutySession>>,
}

impl DutyRecord {
    pub fn new(courier: &str) -> Self {
        Self {
            courier: courier.to_string(),
            daily_logs: BTreeMap::new(),
        }
    }

    pub fn open_session(&self) -> Option<(NaiveDate, &DutySession)> {
        self.daily_logs.iter().find_map(|(date, sessions)| {
            sessions
                .iter()
                .find(|session| session.is_open())
                .map(|session| (*date, session))
        })
    }

    pub fn has_open_session_on(&self, date: NaiveDate) -> bool {
        self.daily_logs
            .get(&date)
            .is_some_and(|sessions| sessions.iter().any(DutySession::is_open))
    }

    /// Sum of closed-session hours recorded under `date`.
    pub fn hours_on(&self, date: NaiveDate) -> f64 {
        self.daily_logs
            .get(&date)
            .map(|sessions| {
                sessions
                    .iter()
                    .filter_map(|session| session.working_hours)
                    .sum()
            })
            .unwrap_or(0.0)
    }
}
