//! Stock ledger endpoints of the inventory service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use inventory::{AvailableUpdate, NewStockRecord, StockAdjustment, StockAdmin, StockRecord};

use crate::auth::{Caller, Role};
use crate::error::ApiError;

/// GET /api/inventory/{product_id}: public.
pub async fn get_record<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    Path(product_id): Path<String>,
) -> Result<Json<StockRecord>, ApiError> {
    let record = ledger.get(&ProductId::new(product_id)).await?;
    Ok(Json(record))
}

/// GET /api/inventory: every record, by product id.
pub async fn list_records<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    caller: Caller,
) -> Result<Json<Vec<StockRecord>>, ApiError> {
    caller.require_any(&[Role::Admin])?;
    Ok(Json(ledger.list().await?))
}

/// POST /api/inventory: creates a record with nothing reserved.
#[tracing::instrument(skip(ledger, caller, req), fields(product_id = %req.product_id))]
pub async fn create_record<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    caller: Caller,
    Json(req): Json<NewStockRecord>,
) -> Result<(StatusCode, Json<StockRecord>), ApiError> {
    caller.require_any(&[Role::Admin])?;
    let record = ledger.create(req.product_id, req.available_quantity).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/inventory/{product_id}: overwrites the available counter.
#[tracing::instrument(skip(ledger, caller, req))]
pub async fn update_available<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    caller: Caller,
    Path(product_id): Path<String>,
    Json(req): Json<AvailableUpdate>,
) -> Result<Json<StockRecord>, ApiError> {
    caller.require_any(&[Role::Admin])?;
    let record = ledger
        .set_available(&ProductId::new(product_id), req.available_quantity)
        .await?;
    Ok(Json(record))
}

/// POST /api/inventory/reserve
pub async fn reserve<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    caller: Caller,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<StockRecord>, ApiError> {
    caller.require_any(&[Role::Internal])?;
    Ok(Json(ledger.reserve(&req.product_id, req.quantity).await?))
}

/// POST /api/inventory/release
pub async fn release<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    caller: Caller,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<StockRecord>, ApiError> {
    caller.require_any(&[Role::Internal])?;
    Ok(Json(ledger.release(&req.product_id, req.quantity).await?))
}

/// POST /api/inventory/confirm
pub async fn confirm<L: StockAdmin + 'static>(
    State(ledger): State<Arc<L>>,
    caller: Caller,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<StockRecord>, ApiError> {
    caller.require_any(&[Role::Internal])?;
    Ok(Json(ledger.confirm(&req.product_id, req.quantity).await?))
}
