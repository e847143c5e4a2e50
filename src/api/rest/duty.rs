use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::duty;
use crate::error::AppError;
use crate::models::duty::DutyRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/duty/update", post(update_duty))
        .route("/duty/heartbeat", post(heartbeat))
        .route("/duty/active", get(active))
        .route("/duty/:email", get(record))
}

#[derive(Deserialize)]
pub struct UpdateDutyRequest {
    pub courier: String,
    pub on_duty: bool,
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub courier: String,
}

async fn update_duty(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateDutyRequest>,
) -> Result<Json<DutyRecord>, AppError> {
    let record = duty::set_duty(&state, &payload.courier, payload.on_duty, Utc::now())?;
    Ok(Json(record))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<DutyRecord>, AppError> {
    let record = duty::heartbeat(&state, &payload.courier, Utc::now())?;
    Ok(Json(record))
}

async fn active(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(duty::active_couriers(&state, Utc::now().date_naive()))
}

async fn record(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<DutyRecord>, AppError> {
    Ok(Json(duty::duty_record(&state, &email)?))
}
