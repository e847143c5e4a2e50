use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub courier: String,
    pub amount: f64,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub remarks: Option<String>,
}

impl Withdrawal {
    pub fn new(courier: &str, amount: f64, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            courier: courier.to_string(),
            amount,
            status: WithdrawalStatus::Pending,
            requested_at,
            processed_at: None,
            processed_by: None,
            remarks: None,
        }
    }
}

/// Live balance derivation: everything requested-or-paid counts against
/// earnings except REJECTED requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub courier: String,
    pub total_earnings: f64,
    pub withdrawn_total: f64,
    pub approved_amount: f64,
    pub pending_amount: f64,
    pub available: f64,
}
