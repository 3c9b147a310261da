//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::{StockError, StockErrorBody};
use orders::OrderError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
///
/// Every error body is `{"error": <message>, "code": <MACHINE_CODE>}`.
/// Stock errors add the product and counters involved, so a remote client
/// can rebuild the typed error.
#[derive(Debug)]
pub enum ApiError {
    /// No caller identity was forwarded.
    Unauthorized(String),
    /// The caller lacks the required role.
    Forbidden(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Stock ledger error.
    Stock(StockError),
    /// Order saga error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, plain(msg, "UNAUTHORIZED")),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, plain(msg, "FORBIDDEN")),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, plain(msg, "BAD_REQUEST")),
            ApiError::Stock(err) => (stock_status(&err), StockErrorBody::from(&err)),
            ApiError::Saga(SagaError::Stock(err)) => {
                (stock_status(&err), StockErrorBody::from(&err))
            }
            ApiError::Saga(err) => (saga_status(&err), plain(err.to_string(), err.code())),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                plain(msg, "INTERNAL_ERROR"),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%status, code = %body.code, error = %body.error, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

fn plain(error: impl Into<String>, code: &str) -> StockErrorBody {
    StockErrorBody {
        error: error.into(),
        code: code.to_string(),
        ..Default::default()
    }
}

fn stock_status(err: &StockError) -> StatusCode {
    match err {
        StockError::InvalidQuantity(_) | StockError::CapacityExceeded { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StockError::NotFound(_) => StatusCode::NOT_FOUND,
        StockError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        StockError::AlreadyExists(_) | StockError::InsufficientReservation { .. } => {
            StatusCode::CONFLICT
        }
        StockError::Unavailable(_) | StockError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        StockError::Rejected { .. } => StatusCode::BAD_GATEWAY,
        StockError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::InvalidOrder(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SagaError::ProductNotFound(_) | SagaError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        SagaError::StockConfirmationFailed { .. }
        | SagaError::AlreadyCancelled(_)
        | SagaError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SagaError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::Stock(err) => stock_status(err),
        SagaError::CompensationIncomplete { .. } | SagaError::Ledger(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError::Stock(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Saga(err.into())
    }
}
