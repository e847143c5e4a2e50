use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::debug;

use crate::error::AppError;
use crate::models::order::OrderStatus;
use crate::models::stats::{DailyStats, StatsSummary};
use crate::state::AppState;

/// Rolling window a summary covers, ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Week,
    Month,
    Year,
}

impl StatsPeriod {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(AppError::Validation(format!(
                "unknown period {other:?}; expected week, month or year"
            ))),
        }
    }

    fn days(self) -> u64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Year => 365,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// Rebuild the (courier, date) snapshot from source history: closed-session
/// hours from the duty ledger, completed and rejected counts from order
/// status history, earnings from the per-order rate. Nothing increments, so
/// recomputing any number of times yields the same snapshot.
pub fn recompute(
    state: &AppState,
    courier: &str,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> DailyStats {
    let hours: f64 = state
        .duty
        .get(courier)
        .map(|record| record.value().hours_on(date))
        .unwrap_or(0.0);

    let mut completed = 0u32;
    let mut rejected = 0u32;
    for entry in state.orders.iter() {
        let order = entry.value();
        let delivered_on = order.status_history.iter().any(|e| {
            e.status == OrderStatus::Delivered && e.courier == courier && e.at.date_naive() == date
        });
        let rejected_on = order.status_history.iter().any(|e| {
            e.status == OrderStatus::Cancelled && e.courier == courier && e.at.date_naive() == date
        });
        if delivered_on {
            completed += 1;
        }
        if rejected_on {
            rejected += 1;
        }
    }

    let snapshot = DailyStats {
        courier: courier.to_string(),
        date,
        working_hours: (hours > 0.0).then_some(round2(hours)),
        completed_orders: completed,
        rejected_orders: rejected,
        earnings: completed as f64 * state.config.earnings_per_order,
        updated_at: now,
    };

    debug!(courier = %courier, %date, completed, rejected, "daily stats recomputed");
    state
        .daily_stats
        .insert((courier.to_string(), date), snapshot.clone());
    snapshot
}

/// Fold the per-day snapshots over a rolling window into period totals.
/// Every day in the window is recomputed first, so the summary never trusts
/// stale snapshots.
pub fn summary(
    state: &AppState,
    courier: &str,
    period: StatsPeriod,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> StatsSummary {
    let start = today
        .checked_sub_days(Days::new(period.days() - 1))
        .unwrap_or(today);

    let mut total_hours = 0.0;
    let mut total_completed = 0u32;
    let mut total_rejected = 0u32;
    let mut days_worked = 0u32;

    let mut date = start;
    while date <= today {
        let day = recompute(state, courier, date, now);
        let hours = day.working_hours.unwrap_or(0.0);
        total_hours += hours;
        total_completed += day.completed_orders;
        total_rejected += day.rejected_orders;
        if hours > 0.0 || day.completed_orders > 0 {
            days_worked += 1;
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    StatsSummary {
        courier: courier.to_string(),
        period: period.label().to_string(),
        start_date: start,
        end_date: today,
        total_working_hours: round2(total_hours),
        total_completed_orders: total_completed,
        total_rejected_orders: total_rejected,
        total_earnings: total_completed as f64 * state.config.earnings_per_order,
        days_worked,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
