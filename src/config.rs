use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// How long an offered order may sit unaccepted before it times out.
    pub offer_timeout: Duration,
    pub offer_sweep_interval: Duration,
    /// Open duty sessions without a heartbeat for this long get force-closed.
    pub duty_stale_after: Duration,
    pub duty_sweep_interval: Duration,
    pub earnings_per_order: f64,
    pub support_contact: String,
    /// When true, a courier who rejected an order can never accept it later.
    pub block_accept_after_reject: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_timeout: Duration::from_secs(parse_or_default("ORDER_OFFER_TIMEOUT_SECS", 120)?),
            offer_sweep_interval: Duration::from_secs(parse_or_default(
                "ORDER_SWEEP_INTERVAL_SECS",
                10,
            )?),
            duty_stale_after: Duration::from_secs(parse_or_default("DUTY_STALE_AFTER_SECS", 1200)?),
            duty_sweep_interval: Duration::from_secs(parse_or_default(
                "DUTY_SWEEP_INTERVAL_SECS",
                300,
            )?),
            earnings_per_order: parse_or_default("EARNINGS_PER_ORDER", 30.0)?,
            support_contact: env::var("SUPPORT_CONTACT")
                .unwrap_or_else(|_| "support@dispatch-broker.local".to_string()),
            block_accept_after_reject: parse_or_default("BLOCK_ACCEPT_AFTER_REJECT", true)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            offer_timeout: Duration::from_secs(120),
            offer_sweep_interval: Duration::from_secs(10),
            duty_stale_after: Duration::from_secs(1200),
            duty_sweep_interval: Duration::from_secs(300),
            earnings_per_order: 30.0,
            support_contact: "support@dispatch-broker.local".to_string(),
            block_accept_after_reject: true,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
