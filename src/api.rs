//! REST API for controlling and observing the simulation.
//!
//! Control routes answer with the runner state after the call; read routes
//! return JSON snapshots. Bad start parameters map to `400 {"error": ...}`.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::error::SimulationError;
use crate::runner::SimulationHandle;
use crate::types::{ArrivalRate, OrderId, PauseMode, SimulatedOrder, SimulationConfig};

/// Shared app state: one simulation per process.
#[derive(Clone)]
pub struct AppState {
    pub(crate) simulation: SimulationHandle,
}

/// Builds the REST router over a running simulation driver.
pub fn create_router(simulation: SimulationHandle) -> Router<()> {
    let state = AppState { simulation };
    Router::new()
        .route("/health", get(health))
        .route("/simulation/start", post(start))
        .route("/simulation/pause", post(pause))
        .route("/simulation/resume", post(resume))
        .route("/simulation/stop", post(stop))
        .route("/simulation/reset", post(reset))
        .route("/simulation/orders", get(orders))
        .route("/simulation/orders/:id", get(order))
        .route("/simulation/stats", get(stats))
        .route("/simulation/transitions", get(transitions))
        .route("/simulation/state", get(state_view))
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Body of `POST /simulation/start`. Omitted fields take their defaults.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub speed: Option<f64>,
    pub arrival_rate: Option<String>,
    pub pause_mode: Option<String>,
    pub max_order_count: Option<u64>,
    pub max_duration_minutes: Option<u64>,
    pub randomized_dwell: bool,
    pub kitchen_capacity: Option<usize>,
}

impl StartRequest {
    pub fn into_config(self) -> Result<SimulationConfig, SimulationError> {
        let defaults = SimulationConfig::default();
        let arrival_rate = match self.arrival_rate {
            Some(tier) => tier.parse::<ArrivalRate>()?,
            None => defaults.arrival_rate,
        };
        let pause_mode = match self.pause_mode {
            Some(mode) => mode.parse::<PauseMode>()?,
            None => defaults.pause_mode,
        };
        Ok(SimulationConfig {
            speed: self.speed.unwrap_or(defaults.speed),
            arrival_rate,
            max_order_count: self.max_order_count,
            max_duration_minutes: self.max_duration_minutes,
            pause_mode,
            randomized_dwell: self.randomized_dwell,
            kitchen_capacity: self.kitchen_capacity,
        })
    }
}

fn bad_request(e: SimulationError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

fn state_response(state: &AppState) -> Response {
    (StatusCode::OK, Json(state.simulation.state())).into_response()
}

async fn start(Extension(state): Extension<AppState>, Json(body): Json<StartRequest>) -> Response {
    let config = match body.into_config() {
        Ok(config) => config,
        Err(e) => return bad_request(e),
    };
    match state.simulation.start(config) {
        Ok(()) => state_response(&state),
        Err(e) => bad_request(e),
    }
}

async fn pause(Extension(state): Extension<AppState>) -> Response {
    state.simulation.pause();
    state_response(&state)
}

async fn resume(Extension(state): Extension<AppState>) -> Response {
    state.simulation.resume();
    state_response(&state)
}

async fn stop(Extension(state): Extension<AppState>) -> Response {
    state.simulation.stop();
    state_response(&state)
}

async fn reset(Extension(state): Extension<AppState>) -> Response {
    state.simulation.reset();
    state_response(&state)
}

async fn orders(Extension(state): Extension<AppState>) -> Response {
    (StatusCode::OK, Json(state.simulation.active_orders())).into_response()
}

async fn order(Extension(state): Extension<AppState>, Path(id): Path<u64>) -> Response {
    let id = OrderId(id);
    let Some(order) = state.simulation.order(id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("order {} is not in flight", id) })),
        )
            .into_response();
    };
    #[derive(serde::Serialize)]
    struct Out {
        #[serde(flatten)]
        order: SimulatedOrder,
        wait_estimate_ms: Option<u64>,
    }
    let wait_estimate_ms = state.simulation.wait_estimate(id);
    (StatusCode::OK, Json(Out { order, wait_estimate_ms })).into_response()
}

async fn stats(Extension(state): Extension<AppState>) -> Response {
    (StatusCode::OK, Json(state.simulation.stats())).into_response()
}

async fn transitions(Extension(state): Extension<AppState>) -> Response {
    (StatusCode::OK, Json(state.simulation.recent_transitions())).into_response()
}

async fn state_view(Extension(state): Extension<AppState>) -> Response {
    state_response(&state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_start_request_uses_defaults() {
        let config = StartRequest::default().into_config().unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn start_request_parses_tiers_and_modes() {
        let body: StartRequest =
            serde_json::from_str(r#"{"speed":5,"arrival_rate":"rush","pause_mode":"preserve","kitchen_capacity":6}"#)
                .unwrap();
        let config = body.into_config().unwrap();
        assert_eq!(config.speed, 5.0);
        assert_eq!(config.arrival_rate, ArrivalRate::Rush);
        assert_eq!(config.pause_mode, PauseMode::Preserve);
        assert_eq!(config.kitchen_capacity, Some(6));
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let body = StartRequest {
            arrival_rate: Some("lunchtime".into()),
            ..Default::default()
        };
        assert_eq!(
            body.into_config().unwrap_err(),
            SimulationError::UnknownArrivalRate("lunchtime".into())
        );
    }
}
