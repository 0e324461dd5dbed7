use crate::application::engine::{ReconciliationEngine, RedirectOutcome};
use crate::domain::i18n::{Lang, Message};
use crate::domain::ledger::Ledger;
use crate::error::PaymentError;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub const WEBHOOK_PATH: &str = "/payment/novalnet/webhook";
pub const RETURN_PATH: &str = "/payment/novalnet/return";
pub const STATUS_PATH: &str = "/payment/status";

type AppState = Arc<ReconciliationEngine>;

/// JSON error body for the API routes.
pub struct ApiError(PaymentError);

impl From<PaymentError> for ApiError {
    fn from(error: PaymentError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let PaymentError::UnauthorizedSource(reason) = &self.0 {
            tracing::warn!(%reason, "Webhook source rejected");
            return (StatusCode::FORBIDDEN, Json(json!({"error": reason}))).into_response();
        }
        if self.0.is_client_error() {
            tracing::info!(error = %self.0, "Request rejected");
            (StatusCode::BAD_REQUEST, Json(json!({"error": self.0.to_string()}))).into_response()
        } else {
            tracing::error!(error = %self.0, "Request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
                .into_response()
        }
    }
}

pub fn router(engine: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(webhook))
        .route(RETURN_PATH, get(redirect_return))
        .route(STATUS_PATH, get(status))
        .with_state(engine)
}

pub async fn serve(engine: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(
        listener,
        router(engine).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn webhook(
    State(engine): State<AppState>,
    ConnectInfo(source): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    engine.verify_webhook_source(source.ip()).await?;
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| PaymentError::malformed(format!("webhook body is not JSON: {e}")))?;
    let receipt = engine.receive_webhook(&body).await?;
    tracing::debug!(?receipt, "Webhook accepted");
    Ok(StatusCode::OK)
}

fn status_location(reference: &str) -> String {
    match serde_urlencoded::to_string([("reference", reference)]) {
        Ok(query) => format!("{STATUS_PATH}?{query}"),
        Err(e) => {
            tracing::warn!(%reference, error = %e, "Status link could not be encoded");
            STATUS_PATH.to_string()
        }
    }
}

/// Browser return. Anything that cannot be resolved renders a generic message.
async fn redirect_return(
    State(engine): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match engine.handle_redirect(&params).await {
        Ok(RedirectOutcome::Completed { reference }) => {
            Redirect::to(&status_location(&reference)).into_response()
        }
        Ok(RedirectOutcome::Failed { message }) => (StatusCode::OK, message).into_response(),
        Err(PaymentError::LedgerNotFound(what)) => {
            tracing::warn!(%what, "Redirect for unknown transaction");
            (
                StatusCode::NOT_FOUND,
                Message::TransactionNotFound.render(Lang::En),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redirect could not be processed");
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, Message::RedirectUnknownError.render(Lang::En)).into_response()
        }
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    reference: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChildView {
    pub reference: String,
    pub state: String,
    pub provider_reference: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusView {
    pub reference: String,
    pub state: String,
    pub state_message: Option<String>,
    pub provider_reference: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub paid_amount: i64,
    pub refund_amount: i64,
    pub due_date: Option<String>,
    pub children: Vec<ChildView>,
}

impl StatusView {
    fn new(ledger: Ledger, children: Vec<Ledger>) -> Self {
        Self {
            reference: ledger.reference,
            state: ledger.state.to_string(),
            state_message: ledger.state_message,
            provider_reference: ledger.provider_reference,
            amount: ledger.amount.value(),
            currency: ledger.currency,
            paid_amount: ledger.paid_amount.value(),
            refund_amount: ledger.refund_amount.value(),
            due_date: ledger.details.due_date,
            children: children
                .into_iter()
                .map(|child| ChildView {
                    reference: child.reference,
                    state: child.state.to_string(),
                    provider_reference: child.provider_reference,
                    amount: child.amount.value(),
                })
                .collect(),
        }
    }
}

async fn status(
    State(engine): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusView>, ApiError> {
    let ledger = engine.finalize(&query.reference).await?;
    let children = engine.children(&ledger).await?;
    Ok(Json(StatusView::new(ledger, children)))
}
