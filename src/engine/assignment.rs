use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::duty;
use crate::error::AppError;
use crate::models::order::{Address, Order, OrderStatus, ProductLine, SYSTEM_ACTOR};
use crate::notify::Notification;
use crate::state::AppState;
use crate::stats;

/// Validate and persist a new order, then offer it to every courier currently
/// on duty. Refused outright when nobody is on duty.
pub fn create_order(
    state: &AppState,
    products: Vec<ProductLine>,
    address: Address,
    customer_email: String,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    if products.is_empty() {
        return Err(AppError::Validation(
            "order needs at least one product line".to_string(),
        ));
    }
    if products
        .iter()
        .any(|line| line.title.trim().is_empty() || line.count == 0)
    {
        return Err(AppError::Validation(
            "every product line needs a title and a positive count".to_string(),
        ));
    }
    if [
        &address.name,
        &address.phone,
        &address.street,
        &address.area,
    ]
    .iter()
    .any(|field| field.trim().is_empty())
    {
        return Err(AppError::Validation(
            "delivery address is incomplete".to_string(),
        ));
    }
    if customer_email.trim().is_empty() || !customer_email.contains('@') {
        return Err(AppError::Validation(
            "a valid customer email is required".to_string(),
        ));
    }

    let audience = duty::active_couriers(state, now.date_naive());
    if audience.is_empty() {
        return Err(AppError::NoAvailableCouriers);
    }

    let mut order = Order::new(products, address, customer_email, now);
    order.offer_expires_at = Some(now + state.config.offer_timeout);
    let snapshot = order.clone();
    state.orders.insert(order.id, order);

    state.metrics.orders_total.with_label_values(&["created"]).inc();
    info!(
        order_id = %snapshot.id,
        couriers = audience.len(),
        "order created and offered"
    );

    state.notifier.broadcast(&audience, &Notification::NewOrder {
        message: "New order received".to_string(),
        order: snapshot.clone(),
    });

    Ok(snapshot)
}

/// The accept critical section. Every check and mutation runs under one
/// per-order write guard, so of N concurrent accepts exactly one can observe
/// PENDING-and-unassigned and win; the rest fail without touching the order.
pub fn accept_order(
    state: &AppState,
    order_id: Uuid,
    courier: &str,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    require_known_courier(state, courier)?;

    // Fan-out audience, snapshotted before taking the order guard.
    let audience = duty::active_couriers(state, now.date_naive());

    let snapshot = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        match order.derived_status() {
            OrderStatus::Pending => {}
            OrderStatus::Confirmed => {
                state
                    .metrics
                    .accept_attempts_total
                    .with_label_values(&["lost_race"])
                    .inc();
                return Err(AppError::Conflict(
                    "order was already accepted by another courier".to_string(),
                ));
            }
            status => {
                state
                    .metrics
                    .accept_attempts_total
                    .with_label_values(&["invalid_state"])
                    .inc();
                return Err(AppError::InvalidTransition(format!(
                    "order is {status:?} and can no longer be accepted"
                )));
            }
        }

        if state.config.block_accept_after_reject && order.has_rejected(courier) {
            state
                .metrics
                .accept_attempts_total
                .with_label_values(&["rejected_earlier"])
                .inc();
            return Err(AppError::Conflict(
                "courier already rejected this order".to_string(),
            ));
        }

        order.push_entry(courier, OrderStatus::Confirmed, now);
        order.status = OrderStatus::Confirmed;
        order.offer_expires_at = None;

        state
            .metrics
            .accept_attempts_total
            .with_label_values(&["won"])
            .inc();
        state
            .metrics
            .time_to_accept_seconds
            .observe((now - order.created_at).num_milliseconds().max(0) as f64 / 1000.0);

        order.clone()
    };

    info!(order_id = %order_id, courier = %courier, "order accepted");

    let losers: Vec<String> = audience
        .into_iter()
        .filter(|candidate| candidate != courier)
        .collect();
    state
        .notifier
        .broadcast(&losers, &Notification::OrderNoLongerAvailable {
            order_id,
            assigned_to: courier.to_string(),
        });
    state.notifier.notify(&snapshot.customer_email, Notification::OrderConfirmed {
        message: "Your order has been confirmed".to_string(),
        order: snapshot.clone(),
    });
    state.notifier.notify(courier, Notification::OrderConfirmed {
        message: "Order assigned to you".to_string(),
        order: snapshot.clone(),
    });

    Ok(snapshot)
}

enum RejectOutcome {
    /// The assigned courier backed out; the order is offered again.
    Reopened,
    /// Every active courier has now rejected; the order is dead.
    CancelledByAll,
    /// Still waiting on the remaining couriers.
    StillPending,
}

/// Record a courier's rejection. Three things can follow, decided inside the
/// same guard that records the entry: a self-cancel by the assignee reopens
/// the order, a rejection completing the full active set cancels it, and
/// anything else leaves it pending.
pub fn reject_order(
    state: &AppState,
    order_id: Uuid,
    courier: &str,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    require_known_courier(state, courier)?;

    // Active set snapshotted before the guard; the all-rejected test below
    // compares against this coherent snapshot, not a set that may shift
    // mid-decision.
    let active = duty::active_couriers(state, now.date_naive());

    let (snapshot, outcome) = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        match order.derived_status() {
            OrderStatus::Pending | OrderStatus::Confirmed => {}
            status => {
                return Err(AppError::InvalidTransition(format!(
                    "order is {status:?} and can no longer be rejected"
                )));
            }
        }
        if order.has_rejected(courier) {
            return Err(AppError::Conflict(
                "courier already rejected this order".to_string(),
            ));
        }

        let was_assignee = order.assigned_courier() == Some(courier);
        order.push_entry(courier, OrderStatus::Cancelled, now);
        order.rejected_by.push(courier.to_string());

        let outcome = if was_assignee {
            order.status = OrderStatus::Pending;
            order.offer_expires_at = Some(now + state.config.offer_timeout);
            RejectOutcome::Reopened
        } else if !active.is_empty()
            && active.iter().all(|candidate| order.has_rejected(candidate))
        {
            order.status = OrderStatus::Cancelled;
            order.offer_expires_at = None;
            RejectOutcome::CancelledByAll
        } else {
            RejectOutcome::StillPending
        };

        (order.clone(), outcome)
    };

    match outcome {
        RejectOutcome::Reopened => {
            state.metrics.orders_total.with_label_values(&["reopened"]).inc();
            info!(order_id = %order_id, courier = %courier, "assignee backed out; order reopened");

            let eligible: Vec<String> = active
                .into_iter()
                .filter(|candidate| !snapshot.has_rejected(candidate))
                .collect();
            state
                .notifier
                .broadcast(&eligible, &Notification::OrderAvailableAgain {
                    message: "Order available again".to_string(),
                    order: snapshot.clone(),
                });
        }
        RejectOutcome::CancelledByAll => {
            state.metrics.orders_total.with_label_values(&["cancelled"]).inc();
            warn!(order_id = %order_id, "every active courier rejected; order cancelled");
        }
        RejectOutcome::StillPending => {
            info!(order_id = %order_id, courier = %courier, "order rejected");
        }
    }

    state.metrics.orders_total.with_label_values(&["rejected"]).inc();
    state.notifier.notify(&snapshot.customer_email, Notification::OrderStatusUpdated {
        message: "Order status updated".to_string(),
        order: snapshot.clone(),
    });

    Ok(snapshot)
}

/// Mark a confirmed order delivered. Only the assigned courier may do this;
/// DELIVERED is terminal.
pub fn deliver_order(
    state: &AppState,
    order_id: Uuid,
    courier: &str,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    require_known_courier(state, courier)?;

    let snapshot = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        match order.derived_status() {
            OrderStatus::Confirmed => {}
            status => {
                return Err(AppError::InvalidTransition(format!(
                    "order is {status:?}; only a confirmed order can be delivered"
                )));
            }
        }
        if order.assigned_courier() != Some(courier) {
            return Err(AppError::Conflict(
                "order is assigned to a different courier".to_string(),
            ));
        }

        order.push_entry(courier, OrderStatus::Delivered, now);
        order.status = OrderStatus::Delivered;
        order.offer_expires_at = None;
        order.clone()
    };

    state.metrics.orders_total.with_label_values(&["delivered"]).inc();
    info!(order_id = %order_id, courier = %courier, "order delivered");

    // Pick up the new delivery in today's snapshot straight away.
    stats::recompute(state, courier, now.date_naive(), now);

    let update = Notification::OrderStatusUpdated {
        message: "Order status updated".to_string(),
        order: snapshot.clone(),
    };
    state.notifier.notify(&snapshot.customer_email, update.clone());
    state.notifier.notify(courier, update);

    Ok(snapshot)
}

/// Put a timed-out order back into play: the rejection set resets so earlier
/// rejectors become eligible again, and the offer deadline is re-armed. An
/// empty audience is allowed; the order will simply time out again.
pub fn retry_order(state: &AppState, order_id: Uuid, now: DateTime<Utc>) -> Result<Order, AppError> {
    let audience = duty::active_couriers(state, now.date_naive());

    let snapshot = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        match order.derived_status() {
            OrderStatus::Timeout => {}
            status => {
                return Err(AppError::InvalidTransition(format!(
                    "order is {status:?}; only a timed-out order can be retried"
                )));
            }
        }

        order.rejected_by.clear();
        order.status = OrderStatus::Pending;
        order.push_entry(SYSTEM_ACTOR, OrderStatus::Pending, now);
        order.offer_expires_at = Some(now + state.config.offer_timeout);
        order.clone()
    };

    state.metrics.orders_total.with_label_values(&["retried"]).inc();
    info!(
        order_id = %order_id,
        couriers = audience.len(),
        "timed-out order offered again"
    );

    state.notifier.broadcast(&audience, &Notification::NewOrder {
        message: "New order received".to_string(),
        order: snapshot.clone(),
    });
    state.notifier.notify(&snapshot.customer_email, Notification::OrderStatusUpdated {
        message: "Order status updated".to_string(),
        order: snapshot.clone(),
    });

    Ok(snapshot)
}

pub fn get_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

pub fn list_orders(state: &AppState) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

pub fn orders_for_customer(state: &AppState, email: &str) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| entry.value().customer_email == email)
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

/// Orders the courier is currently on the hook for.
pub fn active_orders_for_courier(state: &AppState, courier: &str) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.derived_status() == OrderStatus::Confirmed
                && order.assigned_courier() == Some(courier)
        })
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

fn require_known_courier(state: &AppState, courier: &str) -> Result<(), AppError> {
    if state.couriers.contains_key(courier) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("courier {courier} not found")))
    }
}
