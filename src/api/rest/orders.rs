use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::assignment;
use crate::error::AppError;
use crate::models::order::{Address, Order, ProductLine};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/customer/:email", get(orders_for_customer))
        .route("/orders/active/:email", get(active_orders))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/reject", post(reject_order))
        .route("/orders/:id/deliver", post(deliver_order))
        .route("/orders/:id/retry", post(retry_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub products: Vec<ProductLine>,
    pub address: Address,
    pub customer_email: String,
}

#[derive(Deserialize)]
pub struct CourierActionRequest {
    pub courier: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let order = assignment::create_order(
        &state,
        payload.products,
        payload.address,
        payload.customer_email,
        Utc::now(),
    )?;
    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(assignment::list_orders(&state))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(assignment::get_order(&state, id)?))
}

async fn orders_for_customer(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Json<Vec<Order>> {
    Json(assignment::orders_for_customer(&state, &email))
}

async fn active_orders(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Json<Vec<Order>> {
    Json(assignment::active_orders_for_courier(&state, &email))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierActionRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(assignment::accept_order(
        &state,
        id,
        &payload.courier,
        Utc::now(),
    )?))
}

async fn reject_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierActionRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(assignment::reject_order(
        &state,
        id,
        &payload.courier,
        Utc::now(),
    )?))
}

async fn deliver_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierActionRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(assignment::deliver_order(
        &state,
        id,
        &payload.courier,
        Utc::now(),
    )?))
}

async fn retry_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(assignment::retry_order(&state, id, Utc::now())?))
}
