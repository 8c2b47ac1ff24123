//! Order lifecycle: placement, mutation, deletion and station tickets.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tavola_core::order::{NewOrderItem, OrderItemOp};
use tavola_core::{OrderStatus, PaymentMethod};
use tavola_db::OrderContext;

use super::{body, Envelope};
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /orders body: the placement plus the lines.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    #[serde(flatten)]
    pub context: OrderContext,
    pub items: Vec<NewOrderItem>,
}

/// PATCH /orders/{id} body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderBody {
    #[serde(default)]
    pub items: Vec<OrderItemOp>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderBody>, JsonRejection>,
) -> ApiResult<Response> {
    let CreateOrderBody { context, items } = body(payload)?;
    let detail = state.services.orders.create_order(context, items).await?;
    Ok((StatusCode::CREATED, Envelope::data(detail, "Order created")).into_response())
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let detail = state.services.orders.get_order(&id).await?;
    Ok(Envelope::data(detail, "Order").into_response())
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrderBody>, JsonRejection>,
) -> ApiResult<Response> {
    let UpdateOrderBody {
        items,
        status,
        payment_method,
    } = body(payload)?;
    let detail = state
        .services
        .orders
        .update_order_items(&id, items, status, payment_method)
        .await?;
    Ok(Envelope::data(detail, "Order updated").into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    state.services.orders.delete_order(&id).await?;
    Ok(Envelope::message("Order deleted").into_response())
}

pub async fn tickets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let tickets = state.services.orders.kitchen_tickets(&id).await?;
    Ok(Envelope::data(tickets, "Tickets").into_response())
}
