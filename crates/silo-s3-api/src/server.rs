//! S3 server wiring
//!
//! Builds the shared state, the router, and runs the plain-HTTP listener.
//! Paths are `/` (service), `/{bucket}` (bucket scope), and
//! `/{bucket}/{*key}` (object scope, keys may contain slashes).

use axum::{
    middleware,
    routing::{delete, get, head, options, post, put},
    Router,
};
use silo_core::types::Owner;
use silo_core::{Result, SiloConfig};
use silo_metadata::MetadataStore;
use silo_storage::{BlobStore, FsStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

use crate::middleware::verify_request;
use crate::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SiloConfig>,
    pub storage: Arc<dyn Storage>,
}

/// S3 Server
pub struct S3Server {
    config: SiloConfig,
}

impl S3Server {
    pub fn new(config: SiloConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let blobs = Arc::new(BlobStore::new(&self.config.storage.data_dir));
        blobs.init().await?;

        let meta = Arc::new(
            MetadataStore::connect(
                &self.config.database.url,
                self.config.database.max_connections,
                Duration::from_secs(self.config.database.busy_timeout_secs),
            )
            .await?,
        );

        let owner = Owner::new(self.config.auth.access_key.clone());
        let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(meta.clone(), blobs, owner));

        let state = AppState {
            config: Arc::new(self.config.clone()),
            storage,
        };

        let app = create_router(state);
        let addr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        );

        let listener = TcpListener::bind(&addr).await?;
        info!("Silo S3 server listening on http://{}", addr);
        info!("Access key: {}", self.config.auth.access_key);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        meta.close().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Service operations
        .route("/", get(routes::list_buckets))
        // Bucket operations
        .route("/{bucket}", head(routes::head_bucket))
        .route("/{bucket}", get(routes::bucket_get_handler))
        .route("/{bucket}", put(routes::bucket_put_handler))
        .route("/{bucket}", delete(routes::bucket_delete_handler))
        .route("/{bucket}", post(routes::bucket_post_handler))
        .route("/{bucket}", options(routes::cors_preflight_bucket))
        // Object operations
        .route("/{bucket}/{*key}", head(routes::head_object_handler))
        .route("/{bucket}/{*key}", get(routes::object_get_handler))
        .route("/{bucket}/{*key}", put(routes::object_put_handler))
        .route("/{bucket}/{*key}", delete(routes::object_delete_handler))
        .route("/{bucket}/{*key}", post(routes::object_post_handler))
        .route("/{bucket}/{*key}", options(routes::cors_preflight_object))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            verify_request,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .with_state(state)
}
