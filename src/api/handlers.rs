//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DepthError;
use crate::orderbook::{
    BookStatus, DepthKey, DepthSnapshot, PoolStats, Registry, Side, SimulationResult,
};

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Books served by the API.
    pub registry: Arc<Registry>,
    /// Whether the initial replay has finished.
    pub ready: Arc<AtomicBool>,
    /// Prometheus recorder handle, when installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state over a registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            ready: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Error body returned by depth endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error.
    pub error: String,
}

/// Depth error mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError(pub DepthError);

impl From<DepthError> for ApiError {
    fn from(err: DepthError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match self.0 {
            DepthError::DepthNotFound { .. } => StatusCode::NOT_FOUND,
            DepthError::Invalidated { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Number of books in the registry.
    pub books: usize,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Every book with its pipeline state.
    pub books: Vec<BookStatus>,
    /// Shared node pool counters.
    pub pool: PoolStats,
}

/// Depth response: the book plus top-of-book figures.
#[derive(Debug, Serialize)]
pub struct DepthResponse {
    /// Book copy.
    #[serde(flatten)]
    pub depth: DepthSnapshot,
    /// Mid price.
    pub mid_price: Option<Decimal>,
    /// Best ask minus best bid.
    pub spread: Option<Decimal>,
}

impl From<DepthSnapshot> for DepthResponse {
    fn from(depth: DepthSnapshot) -> Self {
        let top = depth.best_bid().zip(depth.best_ask());
        Self {
            mid_price: top.map(|(bid, ask)| (bid + ask) / Decimal::TWO),
            spread: top.map(|(bid, ask)| ask - bid),
            depth,
        }
    }
}

/// Query for the simulation endpoint.
#[derive(Debug, Deserialize)]
pub struct SimulateQuery {
    /// Order amount in base units.
    pub amount: Decimal,
    /// `buy` or `sell`.
    pub side: String,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        books: state.registry.len(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns every book's pipeline state.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        books: state.registry.statuses(),
        pool: state.registry.pool().stats(),
    })
}

/// Depth handler - returns the book for a key.
pub async fn depth(
    State(state): State<AppState>,
    Path((exchange, pair, asset)): Path<(String, String, String)>,
) -> Result<Json<DepthResponse>, ApiError> {
    let key = DepthKey::parse(&exchange, &pair, &asset)?;
    Ok(Json(state.registry.get(&key)?.into()))
}

/// Simulation handler - walks the book for a hypothetical market order.
pub async fn simulate(
    State(state): State<AppState>,
    Path((exchange, pair, asset)): Path<(String, String, String)>,
    Query(query): Query<SimulateQuery>,
) -> Result<Json<SimulationResult>, ApiError> {
    let key = DepthKey::parse(&exchange, &pair, &asset)?;
    let is_buy = Side::parse(&query.side)? == Side::Bid;
    let handle = state.registry.depth(&key)?;

    Ok(Json(handle.simulate_order(query.amount, is_buy)?))
}

/// Metrics handler - renders Prometheus text.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::AssetClass;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new(Arc::new(Registry::default()));
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let key = DepthKey::new("x", "A-B".parse().unwrap(), AssetClass::Spot);

        assert_eq!(
            ApiError(DepthError::DepthNotFound { key: key.clone() }).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(DepthError::Invalidated {
                key,
                reason: "gap".to_string()
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(DepthError::UnsupportedSide("up".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
