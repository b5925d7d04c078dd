//! REST API server example for the point ledger.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `GET /point/{id}` - Current balance of a user
//! - `GET /point/{id}/histories` - Charge/use history of a user
//! - `PATCH /point/{id}/charge` - Charge points (body: bare JSON integer)
//! - `PATCH /point/{id}/use` - Use points (body: bare JSON integer)
//!
//! ## Example Usage
//!
//! ```bash
//! # Charge
//! curl -X PATCH http://localhost:3000/point/1/charge \
//!   -H "Content-Type: application/json" -d '4500'
//!
//! # Use
//! curl -X PATCH http://localhost:3000/point/1/use \
//!   -H "Content-Type: application/json" -d '1000'
//!
//! # Balance and history
//! curl http://localhost:3000/point/1
//! curl http://localhost:3000/point/1/histories
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use point_ledger::{Ledger, LedgerError, Point, PointHistory, UserBalance, UserId};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// === Response DTOs ===

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LedgerError::InvalidUser => (StatusCode::BAD_REQUEST, "INVALID_USER"),
            LedgerError::InvalidAmount { .. } => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            LedgerError::InsufficientBalance => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE")
            }
            LedgerError::BalanceOverflow => (StatusCode::CONFLICT, "BALANCE_OVERFLOW"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// GET /point/{id} - Current balance.
async fn point(State(state): State<AppState>, Path(id): Path<i64>) -> Json<UserBalance> {
    Json(state.ledger.balance(UserId(id)))
}

/// GET /point/{id}/histories - History in insertion order.
async fn histories(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<Vec<PointHistory>> {
    Json(state.ledger.history(UserId(id)))
}

/// PATCH /point/{id}/charge - Charge points.
async fn charge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(amount): Json<Point>,
) -> Result<Json<UserBalance>, AppError> {
    // The guard blocks, so keep it off the async workers.
    let balance = tokio::task::spawn_blocking(move || state.ledger.charge(UserId(id), amount))
        .await
        .expect("charge task panicked")?;
    Ok(Json(balance))
}

/// PATCH /point/{id}/use - Use points.
async fn use_points(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(amount): Json<Point>,
) -> Result<Json<UserBalance>, AppError> {
    let balance = tokio::task::spawn_blocking(move || state.ledger.use_points(UserId(id), amount))
        .await
        .expect("use task panicked")?;
    Ok(Json(balance))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/point/{id}", get(point))
        .route("/point/{id}/histories", get(histories))
        .route("/point/{id}/charge", patch(charge))
        .route("/point/{id}/use", patch(use_points))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let state = AppState {
        ledger: Arc::new(Ledger::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    tracing::info!("Point ledger API server running on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}
