use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor recorded on history entries written by background sweeps and retry,
/// as opposed to a courier identity.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
    Delivered,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductLine {
    pub title: String,
    pub quantity: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub area: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub courier: String,
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub products: Vec<ProductLine>,
    pub address: Address,
    pub customer_email: String,
    /// Cached status for listing/filtering. Protocol decisions go through
    /// `derived_status`, which replays `status_history`.
    pub status: OrderStatus,
    pub status_history: Vec<StatusEntry>,
    pub rejected_by: Vec<String>,
    /// Offer deadline for PENDING orders, polled by the expiry sweep.
    /// None once accepted or in a terminal state.
    pub offer_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        products: Vec<ProductLine>,
        address: Address,
        customer_email: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            products,
            address,
            customer_email,
            status: OrderStatus::Pending,
            status_history: Vec::new(),
            rejected_by: Vec::new(),
            offer_expires_at: None,
            created_at,
        }
    }

    /// The courier holding the most recent CONFIRMED entry that the same
    /// courier has not superseded with a later CANCELLED entry. Exclusive
    /// assignment means this is the only live assignee.
    pub fn assigned_courier(&self) -> Option<&str> {
        let mut assigned: Option<&str> = None;
        for entry in &self.status_history {
            match entry.status {
                OrderStatus::Confirmed => assigned = Some(entry.courier.as_str()),
                OrderStatus::Cancelled if assigned == Some(entry.courier.as_str()) => {
                    assigned = None;
                }
                _ => {}
            }
        }
        assigned
    }

    /// Effective status, derived from history: DELIVERED beats CONFIRMED
    /// beats the stored base status.
    pub fn derived_status(&self) -> OrderStatus {
        if self
            .status_history
            .iter()
            .any(|entry| entry.status == OrderStatus::Delivered)
        {
            return OrderStatus::Delivered;
        }
        if self.assigned_courier().is_some() {
            return OrderStatus::Confirmed;
        }
        self.status
    }

    /// Whether `courier` rejected during the current offer round. Reads the
    /// denormalized set, which retry resets; the history keeps every round.
    pub fn has_rejected(&self, courier: &str) -> bool {
        self.rejected_by.iter().any(|c| c == courier)
    }

    pub fn push_entry(&mut self, courier: &str, status: OrderStatus, at: DateTime<Utc>) {
        self.status_history.push(StatusEntry {
            courier: courier.to_string(),
            status,
            at,
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Address, Order, OrderStatus, ProductLine};

    fn order() -> Order {
        Order::new(
            vec![ProductLine {
                title: "Tomatoes".to_string(),
                quantity: "1kg".to_string(),
                count: 2,
            }],
            Address {
                name: "Asha".to_string(),
                phone: "555-0101".to_string(),
                street: "12 Harbour Rd".to_string(),
                area: "Old Town".to_string(),
            },
            "asha@example.com".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn empty_history_derives_stored_base_status() {
        let mut o = order();
        assert_eq!(o.derived_status(), OrderStatus::Pending);
        assert_eq!(o.assigned_courier(), None);

        o.status = OrderStatus::Timeout;
        assert_eq!(o.derived_status(), OrderStatus::Timeout);
    }

    #[test]
    fn confirmed_entry_assigns_the_courier() {
        let mut o = order();
        o.push_entry("rui@example.com", OrderStatus::Confirmed, Utc::now());
        o.status = OrderStatus::Confirmed;

        assert_eq!(o.assigned_courier(), Some("rui@example.com"));
        assert_eq!(o.derived_status(), OrderStatus::Confirmed);
    }

    #[test]
    fn self_cancel_supersedes_the_confirmation() {
        let mut o = order();
        o.push_entry("rui@example.com", OrderStatus::Confirmed, Utc::now());
        o.push_entry("rui@example.com", OrderStatus::Cancelled, Utc::now());

        assert_eq!(o.assigned_courier(), None);
        assert_eq!(o.derived_status(), OrderStatus::Pending);
    }

    #[test]
    fn another_couriers_rejection_does_not_unseat_the_assignee() {
        let mut o = order();
        o.push_entry("mira@example.com", OrderStatus::Cancelled, Utc::now());
        o.push_entry("rui@example.com", OrderStatus::Confirmed, Utc::now());
        o.push_entry("noor@example.com", OrderStatus::Cancelled, Utc::now());

        assert_eq!(o.assigned_courier(), Some("rui@example.com"));
    }

    #[test]
    fn reassignment_after_self_cancel_tracks_latest_holder() {
        let mut o = order();
        o.push_entry("rui@example.com", OrderStatus::Confirmed, Utc::now());
        o.push_entry("rui@example.com", OrderStatus::Cancelled, Utc::now());
        o.push_entry("mira@example.com", OrderStatus::Confirmed, Utc::now());

        assert_eq!(o.assigned_courier(), Some("mira@example.com"));
        assert_eq!(o.derived_status(), OrderStatus::Confirmed);
    }

    #[test]
    fn delivered_wins_over_everything() {
        let mut o = order();
        o.push_entry("rui@example.com", OrderStatus::Confirmed, Utc::now());
        o.push_entry("rui@example.com", OrderStatus::Delivered, Utc::now());
        o.status = OrderStatus::Delivered;

        assert_eq!(o.derived_status(), OrderStatus::Delivered);
    }

    #[test]
    fn has_rejected_is_scoped_to_the_current_offer_round() {
        let mut o = order();
        o.push_entry("rui@example.com", OrderStatus::Cancelled, Utc::now());
        o.rejected_by.push("rui@example.com".to_string());
        assert!(o.has_rejected("rui@example.com"));
        assert!(!o.has_rejected("mira@example.com"));

        // A retry clears the set; the history entry stays behind.
        o.rejected_by.clear();
        assert!(!o.has_rejected("rui@example.com"));
        assert_eq!(o.status_history.len(), 1);
    }
}
