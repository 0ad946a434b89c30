// src/web/mod.rs - Keep-alive HTTP endpoint for hosts that probe the process

use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use log::info;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::bot::ledger::WarningLedger;

pub const DEFAULT_PORT: u16 = 3000;
pub const ALIVE_BODY: &str = "Bot is alive!";

/// Port from `PORT`, falling back to 3000 when unset or unparsable
pub fn port_from_env() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[derive(Clone)]
pub struct KeepAliveState {
    pub ledger: Arc<WarningLedger>,
}

pub struct KeepAliveServer {
    state: KeepAliveState,
}

impl KeepAliveServer {
    pub fn new(ledger: Arc<WarningLedger>) -> Self {
        Self {
            state: KeepAliveState { ledger },
        }
    }

    pub async fn start_server(&self, port: u16) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Keep-alive server listening on port {}", port);

        axum::serve(listener, self.routes()).await?;
        Ok(())
    }

    pub fn routes(&self) -> Router {
        Router::new()
            .route("/", get(alive))
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }
}

async fn alive() -> &'static str {
    ALIVE_BODY
}

async fn health(State(state): State<KeepAliveState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "warned_users": state.ledger.len().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_root_reports_alive() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("warnings.json")));
        let app = KeepAliveServer::new(ledger).routes();

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], ALIVE_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_health_counts_warned_users() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("warnings.json")));
        ledger.add("u1", 2).await;
        let app = KeepAliveServer::new(ledger).routes();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["warned_users"], 1);
    }
}
