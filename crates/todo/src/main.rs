//! `docshard-todo`: serves the task API.
//!
//! Listens on `DOCSHARD_TODO_ADDR` (default `127.0.0.1:8080`), also read
//! from a `.env` file when present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::{net::SocketAddr, process::ExitCode};

use chrono::Utc;
use docshard_todo::{ADDR_VAR, AppState, DEFAULT_ADDR, router};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::FAILURE
        },
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::env::var(ADDR_VAR).unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let addr: SocketAddr = raw.parse().map_err(|err| format!("invalid {ADDR_VAR} `{raw}`: {err}"))?;

    let app = router(AppState::seeded(Utc::now())).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("todo api listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
