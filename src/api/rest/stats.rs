use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::stats::{DailyStats, StatsSummary};
use crate::state::AppState;
use crate::stats::{self, StatsPeriod};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats/:email", get(daily))
        .route("/stats/:email/summary", get(summary))
}

#[derive(Deserialize)]
pub struct DailyQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub period: Option<String>,
}

async fn daily(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<DailyStats>, AppError> {
    require_known_courier(&state, &email)?;
    let now = Utc::now();
    let date = query.date.unwrap_or_else(|| now.date_naive());
    Ok(Json(stats::recompute(&state, &email, date, now)))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<StatsSummary>, AppError> {
    require_known_courier(&state, &email)?;
    let period = StatsPeriod::parse(query.period.as_deref().unwrap_or("week"))?;
    let now = Utc::now();
    Ok(Json(stats::summary(
        &state,
        &email,
        period,
        now.date_naive(),
        now,
    )))
}

fn require_known_courier(state: &AppState, email: &str) -> Result<(), AppError> {
    if state.couriers.contains_key(email) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("courier {email} not found")))
    }
}
