use chrono::NaiveDate;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::models::courier::CourierProfile;
use crate::models::duty::DutyRecord;
use crate::models::order::Order;
use crate::models::stats::DailyStats;
use crate::models::withdrawal::Withdrawal;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;

/// Shared service state. The DashMaps stand in for the document store: every
/// conditional mutation happens under a single per-key write guard, which is
/// what makes the accept path race-free.
pub struct AppState {
    pub config: Config,
    pub couriers: DashMap<String, CourierProfile>,
    pub orders: DashMap<Uuid, Order>,
    pub duty: DashMap<String, DutyRecord>,
    pub daily_stats: DashMap<(String, NaiveDate), DailyStats>,
    pub withdrawals: DashMap<Uuid, Withdrawal>,
    pub withdrawn_totals: DashMap<String, f64>,
    pub notifier: Notifier,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let notifier = Notifier::new(config.event_buffer_size);

        Self {
            config,
            couriers: DashMap::new(),
            orders: DashMap::new(),
            duty: DashMap::new(),
            daily_stats: DashMap::new(),
            withdrawals: DashMap::new(),
            withdrawn_totals: DashMap::new(),
            notifier,
            metrics: Metrics::new(),
        }
    }
}
