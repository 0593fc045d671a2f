//! HTTP inference API
//!
//! `GET /health`, `GET /symbols` and
//! `GET /infer?symbol=&backtest_days=&lookback_hist_plot=`.

use crate::batch::{infer_symbol, BatchSettings};
use crate::data::MarketTable;
use crate::error::{ErrorKind, ForecastError};
use crate::model::ModelBundle;
use crate::types::ResultBundle;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared, read-only server state
pub struct AppState {
    pub bundle: Arc<ModelBundle>,
    pub table: Arc<MarketTable>,
    pub settings: BatchSettings,
}

impl AppState {
    pub fn new(bundle: Arc<ModelBundle>, table: Arc<MarketTable>, settings: BatchSettings) -> Self {
        Self {
            bundle,
            table,
            settings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InferParams {
    pub symbol: String,
    pub backtest_days: Option<usize>,
    pub lookback_hist_plot: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

/// Error response with a status code derived from the error kind
#[derive(Debug)]
pub struct ApiError(pub ForecastError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::UnknownSymbol => StatusCode::NOT_FOUND,
            ErrorKind::InsufficientHistory | ErrorKind::NoValidPredictions => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::InferenceTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check
async fn health_check() -> &'static str {
    "ok"
}

/// Symbols in table order
async fn list_symbols(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.table.symbols().to_vec())
}

/// Backtest, forecast and metrics for one symbol
async fn infer(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InferParams>,
) -> Result<Json<ResultBundle>, ApiError> {
    let mut settings = state.settings.clone();
    if let Some(days) = params.backtest_days {
        settings.backtest_days = days;
    }
    if let Some(lookback) = params.lookback_hist_plot {
        settings.lookback_display = lookback;
    }

    let symbol = params.symbol.trim().to_uppercase();
    info!("infer {} (backtest {}d)", symbol, settings.backtest_days);

    match infer_symbol(
        Arc::clone(&state.bundle),
        Arc::clone(&state.table),
        symbol,
        settings,
    )
    .await
    {
        Ok(bundle) => Ok(Json(bundle)),
        Err(e) => {
            warn!("infer failed: {}", e);
            Err(ApiError(e))
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/symbols", get(list_symbols))
        .route("/infer", get(infer))
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    info!("Forecast API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
