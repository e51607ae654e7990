//! HTTP endpoints for liveness, readiness and metrics.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{Reporter, Status};

const STATUS_UP: &str = "UP";
const STATUS_DOWN: &str = "DOWN";

/// Errors from the health HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind health endpoint on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("health endpoint failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Representation of the health status presented to the invoker, following
/// the Microprofile Health 2.1 specification.
#[derive(Serialize)]
struct Report {
    status: &'static str,
    checks: Vec<StatusCheck>,
}

#[derive(Serialize)]
struct StatusCheck {
    name: &'static str,
    status: &'static str,
    data: CheckData,
}

#[derive(Serialize)]
struct CheckData {
    host: String,
}

/// Serve the health and metrics endpoints until cancellation
pub async fn serve(
    port: u16,
    reporter: Arc<Reporter>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let router = Router::new()
        .route("/health", get(ready))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(reporter);

    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { port, source })?;

    tracing::info!(%addr, "health endpoints listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("health endpoints stopped");
    Ok(())
}

async fn live(State(reporter): State<Arc<Reporter>>) -> impl IntoResponse {
    status_response(reporter.status() != Status::Error)
}

async fn ready(State(reporter): State<Arc<Reporter>>) -> impl IntoResponse {
    status_response(reporter.status() == Status::Ready)
}

fn status_response(up: bool) -> (StatusCode, Json<Report>) {
    let (status, code) = if up {
        (STATUS_UP, StatusCode::OK)
    } else {
        (STATUS_DOWN, StatusCode::SERVICE_UNAVAILABLE)
    };
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let report = Report {
        status,
        checks: vec![StatusCheck {
            name: "flows",
            status,
            data: CheckData { host },
        }],
    };
    (code, Json(report))
}

async fn metrics(State(reporter): State<Arc<Reporter>>) -> impl IntoResponse {
    match reporter.metrics().gather_text() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
