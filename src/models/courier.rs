use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Minimal courier identity record. Duty and order actions resolve couriers
/// against this registry; duty actions additionally require approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierProfile {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub approval: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

impl CourierProfile {
    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }
}
