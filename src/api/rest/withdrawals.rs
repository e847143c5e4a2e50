use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::withdrawal::{BalanceBreakdown, Withdrawal, WithdrawalStatus};
use crate::state::AppState;
use crate::withdrawal;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/withdrawals", post(request_withdrawal))
        .route("/withdrawals/courier/:email", get(for_courier))
        .route("/withdrawals/balance/:email", get(balance))
        .route("/withdrawals/admin/all", get(admin_list))
        .route("/withdrawals/:id/status", patch(set_status))
}

#[derive(Deserialize)]
pub struct WithdrawalRequest {
    pub courier: String,
    pub amount: f64,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: WithdrawalStatus,
    pub processed_by: String,
    pub remarks: Option<String>,
}

#[derive(Deserialize)]
pub struct AdminListQuery {
    pub status: Option<WithdrawalStatus>,
}

async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    Ok(Json(withdrawal::request(
        &state,
        &payload.courier,
        payload.amount,
        Utc::now(),
    )?))
}

async fn for_courier(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    if !state.couriers.contains_key(&email) {
        return Err(AppError::NotFound(format!("courier {email} not found")));
    }
    Ok(Json(withdrawal::for_courier(&state, &email)))
}

async fn balance(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<BalanceBreakdown>, AppError> {
    Ok(Json(withdrawal::balance(&state, &email)?))
}

async fn admin_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> Json<Vec<Withdrawal>> {
    Json(withdrawal::list_all(&state, query.status))
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    Ok(Json(withdrawal::set_status(
        &state,
        id,
        payload.status,
        &payload.processed_by,
        payload.remarks,
        Utc::now(),
    )?))
}
