//! HTTP host for the order lifecycle simulator.
//!
//! Serves the control and read endpoints from [`api`] over an in-memory order
//! store and the default menu. Configured from the environment.

use std::sync::Arc;

use log::{info, warn};
use order_lifecycle_sim::api;
use order_lifecycle_sim::{
    ArrivalRate, Clock, Engine, InMemoryOrderStore, LogDeadLetterSink, MirrorConfig, SimulationConfig,
    SimulationHandle, StaticMenu, SystemClock,
};
use tokio::net::TcpListener;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparsable {}={}", name, raw);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let port: u16 = env_parse("PORT").unwrap_or(8080);
    let speed: f64 = env_parse("SIM_SPEED").unwrap_or(1.0);
    let arrival_rate: ArrivalRate = env_parse("SIM_ARRIVAL_RATE").unwrap_or_default();
    let autostart: bool = env_parse("SIM_AUTOSTART").unwrap_or(false);
    let max_order_count: Option<u64> = env_parse("SIM_MAX_ORDERS");
    let defaults = MirrorConfig::default();
    let mirror_config = MirrorConfig {
        queue_capacity: env_parse("MIRROR_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
        max_in_flight: env_parse("MIRROR_MAX_IN_FLIGHT").unwrap_or(defaults.max_in_flight),
        ..defaults
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = Arc::new(StaticMenu::default_menu());
    let engine = match env_parse::<u64>("SIM_SEED") {
        Some(seed) => Engine::with_seed(catalog, Arc::clone(&clock), seed),
        None => Engine::new(catalog, Arc::clone(&clock)),
    };
    let simulation = SimulationHandle::spawn(
        engine,
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(LogDeadLetterSink),
        mirror_config,
        clock,
    );

    if autostart {
        let config = SimulationConfig {
            max_order_count,
            ..SimulationConfig::new(speed, arrival_rate)
        };
        if let Err(e) = simulation.start(config) {
            warn!("autostart failed error={}", e);
        }
    }

    let app = api::create_router(simulation.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    info!("listening on http://{} autostart={}", addr, autostart);
    axum::serve(listener, app.into_make_service())
        .await
        .expect("serve");
    simulation.shutdown();
}
