use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-courier, per-day snapshot. Always recomputed from order history and
/// the duty ledger; stored only as a cache of the last recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub courier: String,
    pub date: NaiveDate,
    pub working_hours: Option<f64>,
    pub completed_orders: u32,
    pub rejected_orders: u32,
    pub earnings: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSummary {
    pub courier: String,
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_working_hours: f64,
    pub total_completed_orders: u32,
    pub total_rejected_orders: u32,
    pub total_earnings: f64,
    pub days_worked: u32,
}
