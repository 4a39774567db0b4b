//! Axum REST API handlers.

use std::sync::Arc;

use alloy_primitives::Address;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::dashboard::{Dashboard, PreparedTx};
use crate::errors::DashboardError;
use crate::lifecycle::TxAction;
use crate::notify::{Notification, Toasts};
use crate::view::ViewState;

#[derive(Clone)]
pub struct ApiState {
    pub dashboard: Arc<Dashboard>,
    pub toasts: Arc<Toasts>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route("/account", post(set_account))
        .route("/refresh", post(refresh))
        .route("/fund", post(fund))
        .route("/withdraw", post(withdraw))
        .route("/notifications", get(get_notifications))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AccountRequest {
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct FundRequest {
    pub amount: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub view: ViewState,
    pub can_withdraw: bool,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub action: TxAction,
    pub correlation_id: Uuid,
}

#[derive(Serialize)]
pub struct NotificationsResponse {
    pub count: usize,
    pub notifications: Vec<Notification>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: DashboardError) -> Response {
    let status = match e {
        DashboardError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DashboardError::NotOwner => StatusCode::FORBIDDEN,
        DashboardError::Busy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /state`
///
/// Current view of the contract for the active account.
pub async fn get_state(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let view = state.dashboard.snapshot();
    let can_withdraw = view.can_withdraw();
    Json(StateResponse { view, can_withdraw })
}

/// `POST /account`
///
/// Switch the active account (`null` disconnects). The reads for the new
/// account run in the background.
pub async fn set_account(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<AccountRequest>,
) -> Response {
    let account = match req.address.as_deref().map(str::parse::<Address>) {
        None => None,
        Some(Ok(address)) => Some(address),
        Some(Err(e)) => {
            return error_response(DashboardError::InvalidInput(format!(
                "Invalid address: {e}"
            )))
        }
    };

    let dashboard = Arc::clone(&state.dashboard);
    tokio::spawn(async move { dashboard.set_account(account).await });
    StatusCode::ACCEPTED.into_response()
}

/// `POST /refresh`
pub async fn refresh(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = Arc::clone(&state.dashboard);
    tokio::spawn(async move { dashboard.refresh().await });
    StatusCode::ACCEPTED
}

/// `POST /fund`
///
/// The amount is validated before anything is sent. The transaction itself
/// is tracked through `/state` and `/notifications`.
pub async fn fund(State(state): State<Arc<ApiState>>, Json(req): Json<FundRequest>) -> Response {
    match state.dashboard.prepare_fund(&req.amount) {
        Ok(tx) => accepted(&state, tx),
        Err(e) => {
            warn!("Rejected fund request: {e}");
            error_response(e)
        }
    }
}

/// `POST /withdraw`
pub async fn withdraw(State(state): State<Arc<ApiState>>) -> Response {
    match state.dashboard.prepare_withdraw() {
        Ok(tx) => accepted(&state, tx),
        Err(e) => {
            warn!("Rejected withdraw request: {e}");
            error_response(e)
        }
    }
}

fn accepted(state: &ApiState, tx: PreparedTx) -> Response {
    let action = tx.action();
    let correlation_id = state.dashboard.spawn(tx);
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            action,
            correlation_id,
        }),
    )
        .into_response()
}

/// `GET /notifications`
pub async fn get_notifications(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let notifications = state.toasts.recent().await;
    Json(NotificationsResponse {
        count: notifications.len(),
        notifications,
    })
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
