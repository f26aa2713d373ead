//! Waiting-room admission control for high-traffic public forms.
//!
//! When a popular form opens, thousands of clients hit it at once. This
//! service decides, per form, which clients may submit right now (at most
//! `maxConcurrent` at a time), keeps the rest in a deterministic queue with
//! a wait estimate, and lets administrators lock a form outright.
//!
//!
//!
//! # Architecture
//!
//! Request handlers are stateless; every cross-request decision round-trips
//! Redis. That means any number of worker instances can sit behind a load
//! balancer and the capacity bound still holds, because the one operation
//! that needs mutual exclusion — compare the held-slot count against
//! capacity and insert — runs as a single atomic Lua script.
//!
//! ```text
//! client poll ──► StatusResponder ──► lock check ──► AdmissionGate
//!                                                        │
//!                                          TicketTracker │ Redis (atomic admit,
//!                                          (queue rank,  │  tickets, queues)
//!                                           wait est.)   ▼
//!                       {waitSeconds, targetFormId, maxWaitMinutes}
//! ```
//!
//! - Tickets expire lazily: expiry is a pure function of the stored
//!   last-seen timestamp, so no background sweeper exists anywhere.
//! - Clients that stop polling just age out; a completed submission calls
//!   release to free its slot immediately.
//! - If Redis is unreachable the gate fails open and admits everyone,
//!   logging the degraded mode. A broken waiting room must never become a
//!   broken form.
//!
//!
//!
//! # Routes
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET    | `/forms/{form_id}/waitroom`         | poll status (client id in `X-Client-Id`) |
//! | POST   | `/forms/{form_id}/waitroom/release` | free a slot after submission |
//! | PUT    | `/forms/{form_id}/waitroom/policy`  | enable/update protection |
//! | DELETE | `/forms/{form_id}/waitroom/policy`  | disable protection |
//! | PUT    | `/forms/{form_id}/waitroom/lock`    | administrative lock |
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post, put},
};

use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod gate;
pub mod lock;
pub mod memory;
pub mod policy;
pub mod routes;
pub mod state;
pub mod status;
pub mod store;
pub mod ticket;
pub mod tracker;
pub mod utils;

use routes::{
    lock_handler, policy_delete_handler, policy_upsert_handler, release_handler, status_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/forms/{form_id}/waitroom", get(status_handler))
        .route("/forms/{form_id}/waitroom/release", post(release_handler))
        .route(
            "/forms/{form_id}/waitroom/policy",
            put(policy_upsert_handler).delete(policy_delete_handler),
        )
        .route("/forms/{form_id}/waitroom/lock", put(lock_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
