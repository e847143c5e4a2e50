use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::courier::{ApprovalStatus, CourierProfile};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(register_courier).get(list_couriers))
        .route("/couriers/:email/approval", patch(set_approval))
}

#[derive(Deserialize)]
pub struct RegisterCourierRequest {
    pub email: String,
    pub name: String,
    pub phone: String,
}

#[derive(Deserialize)]
pub struct SetApprovalRequest {
    pub approval: ApprovalStatus,
}

async fn register_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCourierRequest>,
) -> Result<Json<CourierProfile>, AppError> {
    if payload.name.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(AppError::Validation(
            "name and phone cannot be empty".to_string(),
        ));
    }
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }
    if state.couriers.contains_key(&payload.email) {
        return Err(AppError::Conflict(format!(
            "courier {} is already registered",
            payload.email
        )));
    }

    let profile = CourierProfile {
        email: payload.email,
        name: payload.name,
        phone: payload.phone,
        approval: ApprovalStatus::Pending,
        created_at: Utc::now(),
    };
    state
        .couriers
        .insert(profile.email.clone(), profile.clone());

    info!(courier = %profile.email, "courier registered, awaiting approval");
    Ok(Json(profile))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<CourierProfile>> {
    let mut couriers: Vec<CourierProfile> = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    couriers.sort_by(|a, b| a.email.cmp(&b.email));
    Json(couriers)
}

async fn set_approval(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Json(payload): Json<SetApprovalRequest>,
) -> Result<Json<CourierProfile>, AppError> {
    let mut profile = state
        .couriers
        .get_mut(&email)
        .ok_or_else(|| AppError::NotFound(format!("courier {email} not found")))?;

    profile.approval = payload.approval;
    info!(courier = %email, approval = ?payload.approval, "courier approval updated");

    Ok(Json(profile.clone()))
}
