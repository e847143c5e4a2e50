use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::duty;
use crate::models::order::{Order, OrderStatus, SYSTEM_ACTOR};
use crate::notify::Notification;
use crate::state::AppState;

/// Interval task that times out stale offers. The sweep is stateless: it is
/// keyed solely on the `offer_expires_at` timestamps stored on the orders, so
/// it picks up overdue offers after a restart instead of forgetting them.
pub async fn run_offer_timeout_sweep(state: Arc<AppState>) {
    info!(interval = ?state.config.offer_sweep_interval, "offer timeout sweep started");
    let mut ticker = tokio::time::interval(state.config.offer_sweep_interval);
    loop {
        ticker.tick().await;
        let expired = expire_pending_offers(&state, Utc::now());
        if expired > 0 {
            info!(expired, "offer timeout sweep pass finished");
        }
    }
}

/// Interval task that force-closes duty sessions whose courier stopped
/// heartbeating.
pub async fn run_duty_liveness_sweep(state: Arc<AppState>) {
    info!(interval = ?state.config.duty_sweep_interval, "duty liveness sweep started");
    let mut ticker = tokio::time::interval(state.config.duty_sweep_interval);
    loop {
        ticker.tick().await;
        let closed = duty::close_stale_sessions(&state, Utc::now());
        if closed > 0 {
            info!(closed, "duty liveness sweep pass finished");
        }
    }
}

/// One sweep pass: transition every order still PENDING past its offer
/// deadline to TIMEOUT. Each candidate is re-checked under its own order
/// guard, so an accept or reject racing the scan turns the expiry into a
/// no-op. One order's expiry never blocks the rest of the pass.
pub fn expire_pending_offers(state: &AppState, now: DateTime<Utc>) -> usize {
    let due: Vec<Uuid> = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.status == OrderStatus::Pending
                && order.offer_expires_at.is_some_and(|at| at <= now)
        })
        .map(|entry| *entry.key())
        .collect();

    let mut expired = 0;
    for order_id in due {
        let Some(order) = expire_one(state, order_id, now) else {
            continue;
        };
        expired += 1;

        state.metrics.orders_total.with_label_values(&["timeout"]).inc();
        warn!(order_id = %order_id, "order offer timed out");

        let customer_email = order.customer_email.clone();
        state.notifier.notify(&customer_email, Notification::OrderTimeout {
            message: "No courier accepted the order in time".to_string(),
            order,
            support_contact: state.config.support_contact.clone(),
        });
    }
    expired
}

fn expire_one(state: &AppState, order_id: Uuid, now: DateTime<Utc>) -> Option<Order> {
    let mut entry = state.orders.get_mut(&order_id)?;
    let order = entry.value_mut();

    if order.derived_status() != OrderStatus::Pending {
        return None;
    }
    match order.offer_expires_at {
        Some(at) if at <= now => {}
        _ => return None,
    }

    order.push_entry(SYSTEM_ACTOR, OrderStatus::Timeout, now);
    order.status = OrderStatus::Timeout;
    order.offer_expires_at = None;
    Some(order.clone())
}
