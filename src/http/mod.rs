//! HTTP surface for the catalog.
//!
//! Requires the `http` feature. Uses axum for routing; store calls run on the
//! blocking pool.
//!
//! ## Routes
//!
//! - `GET /` health check, `"API is working"`.
//! - `POST /Products` create, 201 with the canonical record.
//! - `GET /Products` listing; the snapshot sequence is in `x-catalog-sequence`.
//! - `GET /Products/:id` single record.
//! - `PUT /Products/:id` partial update, `{message, product}`.
//! - `DELETE /Products/:id` delete, `{message, id}`.
//! - `GET /events?since=N` change stream as server-sent events.
//!
//! ## Example
//!
//! ```ignore
//! let channel = Arc::new(FanoutChannel::new());
//! let service = MutationService::new(MemoryStore::new(), channel);
//! let state = Arc::new(AppState::new(service, ObserverConfig::default()));
//!
//! http::serve(state, "0.0.0.0:4000").await?;
//! ```

mod error;
mod events;

pub use error::ApiError;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::channel::{ChannelConfig, FanoutChannel, ObserverConfig};
use crate::service::MutationService;
use crate::store::{RecordStore, StoreConfig};
use crate::types::ProductDraft;

/// Response header carrying the snapshot sequence of a listing.
pub const SEQUENCE_HEADER: &str = "x-catalog-sequence";

/// Configuration for the `catalogd` server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to listen on.
    /// Default: 0.0.0.0:4000
    pub bind_addr: String,

    /// Keep the catalog in memory only instead of opening `store.path`.
    /// Default: false
    pub in_memory: bool,

    pub store: StoreConfig,
    pub channel: ChannelConfig,
    pub observer: ObserverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".to_string(),
            in_memory: false,
            store: StoreConfig::default(),
            channel: ChannelConfig::default(),
            observer: ObserverConfig::default(),
        }
    }
}

/// Shared handler state.
pub struct AppState<S> {
    pub service: MutationService<S, Arc<FanoutChannel>>,
    /// Queue settings for event stream observers.
    pub observer: ObserverConfig,
}

impl<S: RecordStore> AppState<S> {
    pub fn new(service: MutationService<S, Arc<FanoutChannel>>, observer: ObserverConfig) -> Self {
        Self { service, observer }
    }
}

/// Build the axum `Router` for the catalog.
pub fn router<S: RecordStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/Products", get(list_handler::<S>).post(create_handler::<S>))
        .route(
            "/Products/:id",
            get(get_handler::<S>)
                .put(update_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .route("/events", get(events::events_handler::<S>))
        .with_state(state)
}

/// Serve the catalog over HTTP at the given address (e.g. `"0.0.0.0:4000"`).
pub async fn serve<S: RecordStore + 'static>(
    state: Arc<AppState<S>>,
    addr: &str,
) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "catalog listening");
    axum::serve(listener, app).await
}

async fn health_handler() -> &'static str {
    "API is working"
}

async fn create_handler<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<ProductDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(draft) = body?;
    let product = tokio::task::spawn_blocking(move || state.service.create(draft)).await??;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_handler<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = tokio::task::spawn_blocking(move || state.service.list()).await??;
    Ok((
        [(HeaderName::from_static(SEQUENCE_HEADER), snapshot.as_of.to_string())],
        Json(snapshot.records),
    ))
}

async fn get_handler<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = tokio::task::spawn_blocking(move || state.service.get(&id)).await??;
    Ok(Json(product))
}

async fn update_handler<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<ProductDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(draft) = body?;
    let product = tokio::task::spawn_blocking(move || state.service.update(&id, draft)).await??;
    Ok(Json(json!({
        "message": "Product updated",
        "product": product,
    })))
}

async fn delete_handler<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = tokio::task::spawn_blocking(move || state.service.delete(&id)).await??;
    Ok(Json(json!({
        "message": "Product deleted",
        "id": id,
    })))
}
