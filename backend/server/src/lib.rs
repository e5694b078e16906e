//! Backend of the Yugantar savings and loan cooperative.
//!
//!
//!
//! # General Infrastructure
//! - Single axum service, SQLite file for all state
//! - Optional Redis only for revoked token ids, in-process map otherwise
//! - Outgoing mail goes through an HTTP relay, or is only logged when none is set
//! - Receipt OCR runs on blocking workers, clients poll the job for the result
//!
//!
//!
//! # Policies
//!
//! Deposit, loan, interest, investment and penalty policies are versioned JSON
//! documents. Every change bumps the version by one and writes one immutable row
//! to `policy_change_logs` in the same transaction: full snapshot before and
//! after, field level diff, actor, reason, client IP and user agent.
//!
//! Replaying the log of a policy from its `created` entry must give back the
//! stored document exactly. `GET /api/v1/policies/{kind}/{id}/replay` and
//! `process audit` check that.
//!
//! ```text
//! draft --submit--> finalized --approve--> active --deactivate/expire--> expired
//!                       +--reject/deactivate--> void
//! ```
//!
//! Approving a policy expires the previously active policy of that kind. A
//! background task expires active policies once `effective_to` has passed.
//!
//!
//!
//! # Notes
//!
//! ## Money
//! Stored as whole paisa. Rates and fines are `rust_decimal` percentages and
//! only rounded when turned back into paisa.
//!
//! ## Timestamps
//! UTC, truncated to whole seconds before they are stored so that snapshots
//! compare equal after a round trip.
//!
//!
//!
//! # Setup
//!
//! Run locally with an on disk database.
//! ```sh
//! DATABASE_PATH=yugantar.db RUST_LOG=info cargo run -p yugantar
//! ```
//!
//! Create the first admin without starting the server.
//! ```sh
//! cargo run -p process -- create-admin --email admin@example.com
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use secrecy::ExposeSecret;
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal, time::interval};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod guards;
pub mod mailer;
pub mod models;
pub mod ocr;
pub mod routes;
pub mod services;
pub mod sessions;
pub mod state;
pub mod utils;

use config::Config;
use state::State;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    bootstrap_superuser(&state).await?;
    spawn_policy_sweep(state.clone());

    info!("Starting server...");

    let app = build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutting down...");

    Ok(())
}

/// Routes with CORS and request tracing, ready to serve.
pub fn build_router(state: Arc<State>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    routes::api()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn bootstrap_superuser(state: &Arc<State>) -> Result<()> {
    let (Some(email), Some(password)) = (
        state.config.first_superuser.clone(),
        state.config.first_superuser_password.clone(),
    ) else {
        return Ok(());
    };

    let database = state.database.clone();
    let rounds = state.config.password_hash_rounds;
    routes::blocking(move || {
        services::users::ensure_superuser(&database, &email, password.expose_secret(), rounds)
    })
    .await?;

    Ok(())
}

/// Expires policies whose effective window has closed.
fn spawn_policy_sweep(state: Arc<State>) {
    let period = Duration::from_secs(state.config.policy_sweep_seconds.max(1));

    tokio::spawn(async move {
        let mut ticker = interval(period);

        loop {
            ticker.tick().await;

            let policies = state.policies.clone();
            match routes::blocking(move || policies.expire_due(ledger::now())).await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "Policy sweep expired policies"),
                Err(e) => error!("Policy sweep failed: {e}"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!("Failed to install Ctrl+C handler: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
