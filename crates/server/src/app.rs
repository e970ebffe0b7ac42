use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::routing::{get, post};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use waymark_core::{BatchLimits, Processor, RemoteClassifier};

use crate::config::{ClassifierSettings, ServerConfig};
use crate::routes::{bulk_snapshots, health_handler, stream_snapshots};

const USER_AGENT: &str = concat!("waymark-server/", env!("CARGO_PKG_VERSION"));

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<Processor>,
    pub limits: BatchLimits,
    pub classifier: ClassifierSettings,
    /// Client shared by every remote classifier the server builds.
    pub classifier_client: Client,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> waymark_core::Result<Self> {
        Ok(Self {
            processor: Arc::new(Processor::new(config.processor.clone())?),
            limits: config.limits,
            classifier: config.classifier.clone(),
            classifier_client: Client::builder().user_agent(USER_AGENT).build()?,
        })
    }

    /// Remote tier for one request: its own credential, else the server default.
    pub fn remote_classifier(&self, credential: Option<&str>) -> Option<RemoteClassifier> {
        credential
            .map(str::to_string)
            .or_else(|| self.classifier.default_key.clone())
            .map(|key| {
                RemoteClassifier::new(key)
                    .with_client(self.classifier_client.clone())
                    .with_base_url(&self.classifier.base_url)
                    .with_model(&self.classifier.model)
            })
    }
}

/// Builds the router with CORS and request tracing.
pub fn build_app(config: &ServerConfig) -> anyhow::Result<Router> {
    let state = AppState::new(config)?;

    // Any origin; the API carries no cookies.
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/snapshots", post(bulk_snapshots))
        .route("/api/snapshots/stream", post(stream_snapshots))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}
