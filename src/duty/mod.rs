use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::duty::{DutyRecord, DutySession};
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Toggle a courier on or off duty.
///
/// Off-duty is refused while the courier is the assigned courier on a live
/// order. A session closed on a later calendar day than it was opened is
/// split at the day boundary so hours land on the right dates.
pub fn set_duty(
    state: &AppState,
    courier: &str,
    on_duty: bool,
    now: DateTime<Utc>,
) -> Result<DutyRecord, AppError> {
    require_approved(state, courier)?;

    if !on_duty && has_live_order(state, courier) {
        return Err(AppError::Conflict(
            "courier has a confirmed order in progress; complete it before going off duty"
                .to_string(),
        ));
    }

    let snapshot = {
        let mut record = state
            .duty
            .entry(courier.to_string())
            .or_insert_with(|| DutyRecord::new(courier));

        if on_duty {
            go_on_duty(&mut record, now);
        } else if close_open_session(&mut record, now) {
            info!(courier = %courier, "courier went off duty");
        }

        record.clone()
    };

    refresh_on_duty_gauge(state, now.date_naive());
    Ok(snapshot)
}

/// Keep-alive ping. Advances the open session's start to `now`, resetting
/// the staleness clock. Not a new session; a courier without an open session
/// is left untouched.
pub fn heartbeat(
    state: &AppState,
    courier: &str,
    now: DateTime<Utc>,
) -> Result<DutyRecord, AppError> {
    require_approved(state, courier)?;

    let mut record = state
        .duty
        .entry(courier.to_string())
        .or_insert_with(|| DutyRecord::new(courier));

    let mut touched = false;
    'days: for sessions in record.daily_logs.values_mut() {
        for session in sessions.iter_mut() {
            if session.is_open() {
                session.duty_on_at = Some(now);
                touched = true;
                break 'days;
            }
        }
    }
    if touched {
        debug!(courier = %courier, "duty heartbeat");
    }

    Ok(record.clone())
}

pub fn duty_record(state: &AppState, courier: &str) -> Result<DutyRecord, AppError> {
    state
        .duty
        .get(courier)
        .map(|record| record.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("no duty record for {courier}")))
}

/// Couriers with an open session recorded under `date`. This is the fan-out
/// audience for new orders.
pub fn active_couriers(state: &AppState, date: NaiveDate) -> Vec<String> {
    let mut active: Vec<String> = state
        .duty
        .iter()
        .filter(|entry| entry.value().has_open_session_on(date))
        .map(|entry| entry.key().clone())
        .collect();
    active.sort();
    active
}

/// Force-close open sessions whose start (i.e. last heartbeat) is older than
/// the staleness threshold. Couriers still holding a live order are skipped:
/// the system never takes a courier off duty mid-delivery. Returns how many
/// sessions were closed.
pub fn close_stale_sessions(state: &AppState, now: DateTime<Utc>) -> usize {
    let stale: Vec<String> = state
        .duty
        .iter()
        .filter(|entry| is_stale(state, entry.value(), now))
        .map(|entry| entry.key().clone())
        .collect();

    let mut closed = 0;
    for courier in stale {
        if has_live_order(state, &courier) {
            debug!(courier = %courier, "stale duty session kept: live order in progress");
            continue;
        }

        // Re-check under the record guard; a manual toggle or heartbeat may
        // have raced the scan.
        if let Some(mut record) = state.duty.get_mut(&courier) {
            if is_stale(state, &record, now) && close_open_session(&mut record, now) {
                warn!(courier = %courier, "force-closed stale duty session");
                closed += 1;
            }
        }
    }

    refresh_on_duty_gauge(state, now.date_naive());
    closed
}

fn is_stale(state: &AppState, record: &DutyRecord, now: DateTime<Utc>) -> bool {
    record
        .open_session()
        .and_then(|(_, session)| session.duty_on_at)
        .is_some_and(|on| {
            (now - on)
                .to_std()
                .is_ok_and(|idle| idle >= state.config.duty_stale_after)
        })
}

fn go_on_duty(record: &mut DutyRecord, now: DateTime<Utc>) {
    if record.open_session().is_some() {
        // Already on duty; never open a second session.
        return;
    }

    let sessions = record.daily_logs.entry(now.date_naive()).or_default();
    match sessions.last_mut() {
        Some(last) if last.duty_on_at.is_none() && last.duty_off_at.is_none() => {
            last.duty_on_at = Some(now);
        }
        _ => sessions.push(DutySession::open_at(now)),
    }
    info!(courier = %record.courier, "courier went on duty");
}

/// Close the open session, splitting across midnight when the close falls on
/// a later day than the open: the first half ends at 23:59:59.999 of the
/// start day, the second half runs from 00:00 of the close day to `now`.
fn close_open_session(record: &mut DutyRecord, now: DateTime<Utc>) -> bool {
    let Some((open_date, _)) = record.open_session() else {
        return false;
    };
    let Some(sessions) = record.daily_logs.get_mut(&open_date) else {
        return false;
    };
    let Some(session) = sessions.iter_mut().find(|session| session.is_open()) else {
        return false;
    };
    let Some(on) = session.duty_on_at else {
        return false;
    };

    if on.date_naive() == now.date_naive() {
        session.duty_off_at = Some(now);
        session.working_hours = Some(round_hours(hours_between(on, now)));
    } else {
        let boundary = end_of_day(on.date_naive());
        session.duty_off_at = Some(boundary);
        session.working_hours = Some(round_hours(hours_between(on, boundary)));

        let day_start = start_of_day(now.date_naive());
        record
            .daily_logs
            .entry(now.date_naive())
            .or_default()
            .push(DutySession {
                duty_on_at: Some(day_start),
                duty_off_at: Some(now),
                working_hours: Some(round_hours(hours_between(day_start, now))),
            });
    }

    true
}

fn has_live_order(state: &AppState, courier: &str) -> bool {
    state.orders.iter().any(|entry| {
        let order = entry.value();
        order.derived_status() == OrderStatus::Confirmed
            && order.assigned_courier() == Some(courier)
    })
}

fn require_approved(state: &AppState, courier: &str) -> Result<(), AppError> {
    let profile = state
        .couriers
        .get(courier)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier} not found")))?;

    if !profile.is_approved() {
        return Err(AppError::Forbidden(format!(
            "courier {courier} is not approved"
        )));
    }
    Ok(())
}

fn refresh_on_duty_gauge(state: &AppState, today: NaiveDate) {
    let on_duty = state
        .duty
        .iter()
        .filter(|entry| entry.value().has_open_session_on(today))
        .count();
    state.metrics.couriers_on_duty.set(on_duty as i64);
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).expect("valid end-of-day time");
    date.and_time(end).and_utc()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{active_couriers, close_stale_sessions, heartbeat, set_duty};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::courier::{ApprovalStatus, CourierProfile};
    use crate::models::order::{Address, Order, OrderStatus, ProductLine};
    use crate::state::AppState;

    const RUI: &str = "rui@example.com";

    fn state() -> AppState {
        let state = AppState::new(Config::default());
        register(&state, RUI, ApprovalStatus::Approved);
        state
    }

    fn register(state: &AppState, email: &str, approval: ApprovalStatus) {
        state.couriers.insert(
            email.to_string(),
            CourierProfile {
                email: email.to_string(),
                name: "Rui".to_string(),
                phone: "555-0102".to_string(),
                approval,
                created_at: Utc::now(),
            },
        );
    }

    fn confirmed_order(courier: &str) -> Order {
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
        order.push_entry(courier, OrderStatus::Confirmed, Utc::now());
        order.status = OrderStatus::Confirmed;
        order
    }

    #[test]
    fn on_then_off_same_day_records_hours() {
        let state = state();
        let on = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let off = Utc.with_ymd_and_hms(2025, 3, 3, 11, 30, 0).unwrap();

        set_duty(&state, RUI, true, on).unwrap();
        let record = set_duty(&state, RUI, false, off).unwrap();

        let sessions = &record.daily_logs[&on.date_naive()];
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].working_hours, Some(2.5));
        assert_eq!(sessions[0].duty_off_at, Some(off));
    }

    #[test]
    fn session_spanning_midnight_is_split_at_the_day_boundary() {
        let state = state();
        let on = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        let off = Utc.with_ymd_and_hms(2025, 3, 2, 0, 30, 0).unwrap();

        set_duty(&state, RUI, true, on).unwrap();
        let record = set_duty(&state, RUI, false, off).unwrap();

        let first_day = &record.daily_logs[&on.date_naive()];
        let second_day = &record.daily_logs[&off.date_naive()];
        assert_eq!(first_day.len(), 1);
        assert_eq!(second_day.len(), 1);

        let h1 = first_day[0].working_hours.unwrap();
        let h2 = second_day[0].working_hours.unwrap();
        assert_eq!(h1, 0.5);
        assert_eq!(h2, 0.5);
        assert!((h1 + h2 - 1.0).abs() < 0.02);
        assert!(record.open_session().is_none());
    }

    #[test]
    fn double_on_duty_keeps_a_single_open_session() {
        let state = state();
        let first = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 3, 3, 9, 5, 0).unwrap();

        set_duty(&state, RUI, true, first).unwrap();
        let record = set_duty(&state, RUI, true, second).unwrap();

        let sessions = &record.daily_logs[&first.date_naive()];
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duty_on_at, Some(first));
    }

    #[test]
    fn off_duty_without_open_session_is_a_noop() {
        let state = state();
        let record = set_duty(&state, RUI, false, Utc::now()).unwrap();
        assert!(record.daily_logs.values().all(|sessions| sessions.is_empty()));
    }

    #[test]
    fn off_duty_with_live_order_is_refused() {
        let state = state();
        let now = Utc::now();
        set_duty(&state, RUI, true, now).unwrap();

        let order = confirmed_order(RUI);
        state.orders.insert(order.id, order);

        let err = set_duty(&state, RUI, false, now).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn unapproved_courier_cannot_toggle_duty() {
        let state = state();
        register(&state, "new@example.com", ApprovalStatus::Pending);

        let err = set_duty(&state, "new@example.com", true, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = set_duty(&state, "ghost@example.com", true, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn heartbeat_advances_the_open_session_start() {
        let state = state();
        let on = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ping = Utc.with_ymd_and_hms(2025, 3, 3, 9, 10, 0).unwrap();

        set_duty(&state, RUI, true, on).unwrap();
        let record = heartbeat(&state, RUI, ping).unwrap();

        let (_, session) = record.open_session().unwrap();
        assert_eq!(session.duty_on_at, Some(ping));
    }

    #[test]
    fn liveness_sweep_closes_only_stale_sessions() {
        let state = state();
        register(&state, "mira@example.com", ApprovalStatus::Approved);

        let stale_on = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let fresh_on = Utc.with_ymd_and_hms(2025, 3, 3, 9, 55, 0).unwrap();
        let sweep_at = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();

        set_duty(&state, RUI, true, stale_on).unwrap();
        set_duty(&state, "mira@example.com", true, fresh_on).unwrap();

        let closed = close_stale_sessions(&state, sweep_at);
        assert_eq!(closed, 1);

        assert!(state.duty.get(RUI).unwrap().open_session().is_none());
        assert!(
            state
                .duty
                .get("mira@example.com")
                .unwrap()
                .open_session()
                .is_some()
        );
        assert_eq!(active_couriers(&state, sweep_at.date_naive()), vec![
            "mira@example.com".to_string()
        ]);
    }

    #[test]
    fn liveness_sweep_skips_couriers_holding_a_live_order() {
        let state = state();
        let stale_on = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let sweep_at = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();

        set_duty(&state, RUI, true, stale_on).unwrap();
        let order = confirmed_order(RUI);
        state.orders.insert(order.id, order);

        let closed = close_stale_sessions(&state, sweep_at);
        assert_eq!(closed, 0);
        assert!(state.duty.get(RUI).unwrap().open_session().is_some());
    }

    #[test]
    fn heartbeat_keeps_a_session_alive_through_the_sweep() {
        let state = state();
        let on = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ping = Utc.with_ymd_and_hms(2025, 3, 3, 9, 50, 0).unwrap();
        let sweep_at = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();

        set_duty(&state, RUI, true, on).unwrap();
        heartbeat(&state, RUI, ping).unwrap();

        assert_eq!(close_stale_sessions(&state, sweep_at), 0);
        assert!(state.duty.get(RUI).unwrap().open_session().is_some());
    }
}
