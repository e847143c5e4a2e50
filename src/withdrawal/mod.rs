use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::OrderStatus;
use crate::models::withdrawal::{BalanceBreakdown, Withdrawal, WithdrawalStatus};
use crate::state::AppState;

/// File a withdrawal request. One PENDING request per courier at a time, and
/// the amount must fit inside the available balance: earnings minus paid-out,
/// approved-but-unpaid and already-pending amounts. The per-courier
/// `withdrawn_totals` entry guard serializes concurrent requests so two
/// requests cannot both pass the balance check.
pub fn request(
    state: &AppState,
    courier: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<Withdrawal, AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(
            "withdrawal amount must be positive".to_string(),
        ));
    }
    if !state.couriers.contains_key(courier) {
        return Err(AppError::NotFound(format!("courier {courier} not found")));
    }

    let withdrawal = {
        let paid_out = state
            .withdrawn_totals
            .entry(courier.to_string())
            .or_insert(0.0);

        let (pending, approved) = outstanding_amounts(state, courier);
        if pending > 0.0 {
            return Err(AppError::Conflict(
                "a pending withdrawal request already exists".to_string(),
            ));
        }

        let available = total_earnings(state, courier) - *paid_out - approved - pending;
        if amount > available {
            return Err(AppError::Validation(format!(
                "requested {amount:.2} exceeds available balance {available:.2}"
            )));
        }

        let withdrawal = Withdrawal::new(courier, amount, now);
        state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        withdrawal
    };

    info!(
        withdrawal_id = %withdrawal.id,
        courier = %courier,
        amount,
        "withdrawal requested"
    );
    Ok(withdrawal)
}

/// Admin decision on a request. Allowed transitions are
/// PENDING -> APPROVED | REJECTED and APPROVED -> COMPLETED; completion is
/// when the money actually moves, so that is when `withdrawn_totals` grows.
pub fn set_status(
    state: &AppState,
    id: Uuid,
    new_status: WithdrawalStatus,
    processed_by: &str,
    remarks: Option<String>,
    now: DateTime<Utc>,
) -> Result<Withdrawal, AppError> {
    let snapshot = {
        let mut entry = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("withdrawal {id} not found")))?;
        let withdrawal = entry.value_mut();

        let allowed = matches!(
            (withdrawal.status, new_status),
            (WithdrawalStatus::Pending, WithdrawalStatus::Approved)
                | (WithdrawalStatus::Pending, WithdrawalStatus::Rejected)
                | (WithdrawalStatus::Approved, WithdrawalStatus::Completed)
        );
        if !allowed {
            return Err(AppError::InvalidTransition(format!(
                "withdrawal cannot move from {:?} to {new_status:?}",
                withdrawal.status
            )));
        }

        withdrawal.status = new_status;
        withdrawal.processed_at = Some(now);
        withdrawal.processed_by = Some(processed_by.to_string());
        withdrawal.remarks = remarks;
        withdrawal.clone()
    };

    if snapshot.status == WithdrawalStatus::Completed {
        *state
            .withdrawn_totals
            .entry(snapshot.courier.clone())
            .or_insert(0.0) += snapshot.amount;
    }

    info!(
        withdrawal_id = %id,
        courier = %snapshot.courier,
        status = ?snapshot.status,
        "withdrawal status updated"
    );
    Ok(snapshot)
}

/// Everything a courier (or the admin screen) needs to reason about payout
/// headroom. `available` is clamped at zero for display.
pub fn balance(state: &AppState, courier: &str) -> Result<BalanceBreakdown, AppError> {
    if !state.couriers.contains_key(courier) {
        return Err(AppError::NotFound(format!("courier {courier} not found")));
    }

    let earnings = total_earnings(state, courier);
    let paid_out = state
        .withdrawn_totals
        .get(courier)
        .map(|total| *total.value())
        .unwrap_or(0.0);
    let (pending, approved) = outstanding_amounts(state, courier);

    Ok(BalanceBreakdown {
        courier: courier.to_string(),
        total_earnings: earnings,
        withdrawn_total: paid_out,
        approved_amount: approved,
        pending_amount: pending,
        available: (earnings - paid_out - approved - pending).max(0.0),
    })
}

pub fn for_courier(state: &AppState, courier: &str) -> Vec<Withdrawal> {
    let mut requests: Vec<Withdrawal> = state
        .withdrawals
        .iter()
        .filter(|entry| entry.value().courier == courier)
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
    requests
}

pub fn list_all(state: &AppState, status: Option<WithdrawalStatus>) -> Vec<Withdrawal> {
    let mut requests: Vec<Withdrawal> = state
        .withdrawals
        .iter()
        .filter(|entry| status.is_none_or(|wanted| entry.value().status == wanted))
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
    requests
}

/// Lifetime earnings: delivered orders times the per-order rate.
fn total_earnings(state: &AppState, courier: &str) -> f64 {
    let delivered = state
        .orders
        .iter()
        .filter(|entry| {
            entry
                .value()
                .status_history
                .iter()
                .any(|e| e.status == OrderStatus::Delivered && e.courier == courier)
        })
        .count();
    delivered as f64 * state.config.earnings_per_order
}

fn outstanding_amounts(state: &AppState, courier: &str) -> (f64, f64) {
    let mut pending = 0.0;
    let mut approved = 0.0;
    for entry in state.withdrawals.iter() {
        let withdrawal = entry.value();
        if withdrawal.courier != courier {
            continue;
        }
        match withdrawal.status {
            WithdrawalStatus::Pending => pending += withdrawal.amount,
            WithdrawalStatus::Approved => approved += withdrawal.amount,
            WithdrawalStatus::Rejected | WithdrawalStatus::Completed => {}
        }
    }
    (pending, approved)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{balance, for_courier, list_all, request, set_status};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::courier::{ApprovalStatus, CourierProfile};
    use crate::models::order::{Address, Order, OrderStatus, ProductLine};
    use crate::models::withdrawal::WithdrawalStatus;
    use crate::state::AppState;

    const RUI: &str = "rui@example.com";
    const ADMIN: &str = "admin@example.com";

    fn state_with_deliveries(delivered: usize) -> AppState {
        let state = AppState::new(Config::default());
        state.couriers.insert(
            RUI.to_string(),
            CourierProfile {
                email: RUI.to_string(),
                name: "Rui".to_string(),
                phone: "555-0100".to_string(),
                approval: ApprovalStatus::Approved,
                created_at: Utc::now(),
            },
        );
        for _ in 0..delivered {
            let mut order = Order::new(
                vec![ProductLine {
                    title: "Rice".to_string(),
                    quantity: "5kg".to_string(),
                    count: 1,
                }],
                Address {
                    name: "Asha".to_string(),
                    phone: "555-0101".to_string(),
                    street: "12 Harbour Rd".to_string(),
                    area: "Old Town".to_string(),
                },
                "asha@example.com".to_string(),
                Utc::now(),
            );
            order.push_entry(RUI, OrderStatus::Confirmed, Utc::now());
            order.push_entry(RUI, OrderStatus::Delivered, Utc::now());
            order.status = OrderStatus::Delivered;
            state.orders.insert(order.id, order);
        }
        state
    }

    #[test]
    fn request_validates_amount_and_balance() {
        let state = state_with_deliveries(2); // 60 earned

        assert!(matches!(
            request(&state, RUI, 0.0, Utc::now()).unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            request(&state, RUI, -5.0, Utc::now()).unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            request(&state, RUI, 90.0, Utc::now()).unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            request(&state, "ghost@example.com", 10.0, Utc::now()).unwrap_err(),
            AppError::NotFound(_)
        ));

        let accepted = request(&state, RUI, 60.0, Utc::now()).unwrap();
        assert_eq!(accepted.status, WithdrawalStatus::Pending);
    }

    #[test]
    fn only_one_pending_request_at_a_time() {
        let state = state_with_deliveries(3); // 90 earned
        request(&state, RUI, 10.0, Utc::now()).unwrap();

        let err = request(&state, RUI, 10.0, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn rejection_frees_the_pending_slot_and_the_amount() {
        let state = state_with_deliveries(1); // 30 earned
        let first = request(&state, RUI, 30.0, Utc::now()).unwrap();
        set_status(
            &state,
            first.id,
            WithdrawalStatus::Rejected,
            ADMIN,
            Some("card details invalid".to_string()),
            Utc::now(),
        )
        .unwrap();

        // The rejected amount no longer counts against the balance.
        let second = request(&state, RUI, 30.0, Utc::now()).unwrap();
        assert_eq!(second.status, WithdrawalStatus::Pending);
    }

    #[test]
    fn approval_then_completion_moves_the_money() {
        let state = state_with_deliveries(3); // 90 earned
        let withdrawal = request(&state, RUI, 30.0, Utc::now()).unwrap();

        let approved = set_status(
            &state,
            withdrawal.id,
            WithdrawalStatus::Approved,
            ADMIN,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(approved.status, WithdrawalStatus::Approved);
        assert_eq!(approved.processed_by.as_deref(), Some(ADMIN));

        // Approved but unpaid still counts against the balance.
        let mid = balance(&state, RUI).unwrap();
        assert_eq!(mid.approved_amount, 30.0);
        assert_eq!(mid.withdrawn_total, 0.0);
        assert_eq!(mid.available, 60.0);

        set_status(
            &state,
            withdrawal.id,
            WithdrawalStatus::Completed,
            ADMIN,
            None,
            Utc::now(),
        )
        .unwrap();

        let after = balance(&state, RUI).unwrap();
        assert_eq!(after.withdrawn_total, 30.0);
        assert_eq!(after.approved_amount, 0.0);
        assert_eq!(after.available, 60.0);
    }

    #[test]
    fn transition_table_is_enforced() {
        let state = state_with_deliveries(2);
        let withdrawal = request(&state, RUI, 10.0, Utc::now()).unwrap();

        assert!(matches!(
            set_status(
                &state,
                withdrawal.id,
                WithdrawalStatus::Completed,
                ADMIN,
                None,
                Utc::now()
            )
            .unwrap_err(),
            AppError::InvalidTransition(_)
        ));

        set_status(
            &state,
            withdrawal.id,
            WithdrawalStatus::Rejected,
            ADMIN,
            None,
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(
            set_status(
                &state,
                withdrawal.id,
                WithdrawalStatus::Approved,
                ADMIN,
                None,
                Utc::now()
            )
            .unwrap_err(),
            AppError::InvalidTransition(_)
        ));

        assert!(matches!(
            set_status(
                &state,
                Uuid::new_v4(),
                WithdrawalStatus::Approved,
                ADMIN,
                None,
                Utc::now()
            )
            .unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn listings_filter_and_order_by_recency() {
        let state = state_with_deliveries(3); // 90 earned
        let first = request(&state, RUI, 10.0, Utc::now()).unwrap();
        set_status(
            &state,
            first.id,
            WithdrawalStatus::Rejected,
            ADMIN,
            None,
            Utc::now(),
        )
        .unwrap();
        let second = request(
            &state,
            RUI,
            20.0,
            Utc::now() + chrono::Duration::seconds(1),
        )
        .unwrap();

        let mine = for_courier(&state, RUI);
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.id);

        let pending_only = list_all(&state, Some(WithdrawalStatus::Pending));
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].id, second.id);
        assert_eq!(list_all(&state, None).len(), 2);
    }
}
