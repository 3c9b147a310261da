//! Order saga endpoints of the order service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use inventory::StockLedger;
use orders::{Order, OrderItem, OrderLedger, OrderStatus};
use saga::{OrderLine, OrderSaga, PricingLookup};
use serde::{Deserialize, Serialize};

use crate::auth::{Caller, Role};
use crate::error::ApiError;

/// Shared saga handle used as router state.
pub type SharedSaga<S, P, O> = Arc<OrderSaga<S, P, O>>;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLine>,
    pub payment_success: bool,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub payment_success: bool,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub price_cents: i64,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            price_cents: item.price.cents(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().as_i64(),
            status: order.status(),
            total_cents: order.total_amount().cents(),
            payment_success: order.payment_success(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

fn to_responses(orders: &[Order]) -> Vec<OrderResponse> {
    orders.iter().map(OrderResponse::from).collect()
}

// -- Handlers --

/// POST /api/orders: runs the placement saga for the caller.
///
/// 201 with the order when it was paid, 422 with the order when payment was
/// declined and the order recorded as `FAILED`.
#[tracing::instrument(skip(saga, caller, req), fields(items = req.items.len()))]
pub async fn place<S, P, O>(
    State(saga): State<SharedSaga<S, P, O>>,
    caller: Caller,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: StockLedger + 'static,
    P: PricingLookup + 'static,
    O: OrderLedger + 'static,
{
    caller.require_any(&[Role::User, Role::Admin])?;
    let user_id = caller.user_id()?;

    let order = saga
        .place_order(user_id, req.items, req.payment_success)
        .await?;

    let status = match order.status() {
        OrderStatus::Paid => StatusCode::CREATED,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(OrderResponse::from(&order))))
}

/// GET /api/orders/my-orders
pub async fn my_orders<S, P, O>(
    State(saga): State<SharedSaga<S, P, O>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: StockLedger + 'static,
    P: PricingLookup + 'static,
    O: OrderLedger + 'static,
{
    caller.require_any(&[Role::User, Role::Admin])?;
    let orders = saga.get_user_orders(caller.user_id()?).await?;
    Ok(Json(to_responses(&orders)))
}

/// GET /api/orders: every order.
pub async fn all_orders<S, P, O>(
    State(saga): State<SharedSaga<S, P, O>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: StockLedger + 'static,
    P: PricingLookup + 'static,
    O: OrderLedger + 'static,
{
    caller.require_any(&[Role::Admin])?;
    let orders = saga.get_all_orders().await?;
    Ok(Json(to_responses(&orders)))
}

/// PUT /api/orders/{id}/cancel
#[tracing::instrument(skip(saga, caller))]
pub async fn cancel<S, P, O>(
    State(saga): State<SharedSaga<S, P, O>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: StockLedger + 'static,
    P: PricingLookup + 'static,
    O: OrderLedger + 'static,
{
    caller.require_any(&[Role::Admin])?;
    let order_id: OrderId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;

    let order = saga.cancel_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}
