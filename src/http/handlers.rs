//! One handler per operation: validate the body, run the service call,
//! serialize a projection.

use axum::{body::Bytes, extract::{Path, State}, http::StatusCode, Json};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;
use crate::service::{Actor, LoyaltyBalance, OrderService};
use crate::store::OrderStore;
use crate::Result;
use super::body::{self, JsonBody};
use super::dto::{CancelRequest, CreateOrderRequest, OrderDetail, OrderSummary, TokenView, UpdateStatusRequest, UpdateTrackingRequest};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "localretail-commerce"}))
}

pub async fn create_order<S: OrderStore>(
    State(svc): State<OrderService<S>>, actor: Actor, JsonBody(body): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetail>)> {
    body.validate()?;
    let order = svc.create_order(&actor, body.into()).await?;
    Ok((StatusCode::CREATED, Json(OrderDetail::from(&order))))
}

pub async fn get_order<S: OrderStore>(State(svc): State<OrderService<S>>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    let order = svc.get_order(&actor, id).await?;
    Ok(Json(OrderDetail::from(&order)))
}

pub async fn my_orders<S: OrderStore>(State(svc): State<OrderService<S>>, actor: Actor) -> Result<Json<Vec<OrderSummary>>> {
    let orders = svc.my_orders(&actor).await?;
    Ok(Json(orders.iter().map(OrderSummary::from).collect()))
}

pub async fn merchant_orders<S: OrderStore>(State(svc): State<OrderService<S>>, actor: Actor) -> Result<Json<Vec<OrderSummary>>> {
    let orders = svc.merchant_orders(&actor).await?;
    Ok(Json(orders.iter().map(OrderSummary::from).collect()))
}

pub async fn update_status<S: OrderStore>(
    State(svc): State<OrderService<S>>, actor: Actor, Path(id): Path<Uuid>, JsonBody(body): JsonBody<UpdateStatusRequest>,
) -> Result<Json<OrderDetail>> {
    body.validate()?;
    let status = body.parsed_status()?;
    let order = svc.transition_status(&actor, id, status, body.notes.as_deref()).await?;
    Ok(Json(OrderDetail::from(&order)))
}

pub async fn update_tracking<S: OrderStore>(
    State(svc): State<OrderService<S>>, actor: Actor, Path(id): Path<Uuid>, JsonBody(body): JsonBody<UpdateTrackingRequest>,
) -> Result<Json<OrderDetail>> {
    body.validate()?;
    let order = svc.update_tracking(&actor, id, &body.tracking_number, body.tracking_url.as_deref()).await?;
    Ok(Json(OrderDetail::from(&order)))
}

/// The body is optional; an empty request cancels without a reason.
pub async fn cancel<S: OrderStore>(
    State(svc): State<OrderService<S>>, actor: Actor, Path(id): Path<Uuid>, bytes: Bytes,
) -> Result<Json<OrderDetail>> {
    let body: CancelRequest = body::optional(&bytes)?;
    body.validate()?;
    let order = svc.cancel(&actor, id, body.reason.as_deref()).await?;
    Ok(Json(OrderDetail::from(&order)))
}

pub async fn loyalty_balance<S: OrderStore>(State(svc): State<OrderService<S>>, actor: Actor) -> Result<Json<LoyaltyBalance>> {
    Ok(Json(svc.loyalty_balance(&actor).await?))
}

pub async fn loyalty_transactions<S: OrderStore>(State(svc): State<OrderService<S>>, actor: Actor) -> Result<Json<Vec<TokenView>>> {
    let rows = svc.loyalty_history(&actor).await?;
    Ok(Json(rows.iter().rev().map(TokenView::from).collect()))
}
