//! Read-only HTTP surface over the store: batcher listings and revenue
//! aggregates. Thin by design; everything here is a straight projection of
//! persisted rows.

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace};
use tracing::Level;

use crate::prelude::Error;
use crate::store::Store;

mod routes;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub permissive_cors: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8000".parse().unwrap(),
            permissive_cors: Some(true),
        }
    }
}

pub struct State {
    pub store: Store,
}

pub type SharedState = Arc<State>;

pub async fn serve(cfg: Config, store: Store, exit: CancellationToken) -> Result<(), Error> {
    let app = Router::new()
        .route("/", get(routes::root))
        .route("/batchers", get(routes::batchers))
        .route("/stats", get(routes::batcher_stats))
        .route("/all-stats", get(routes::all_batcher_stats))
        .route("/transactions", get(routes::batcher_transactions))
        .with_state(SharedState::new(State { store }))
        .layer(
            trace::TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(if cfg.permissive_cors.unwrap_or_default() {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        });

    let listener = tokio::net::TcpListener::bind(cfg.listen_address)
        .await
        .map_err(|_| Error::ServerError("failed to bind TCP listener".to_string()))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { exit.cancelled().await })
        .await
        .map_err(Error::server)?;

    Ok(())
}
