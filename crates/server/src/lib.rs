//! HTTP front end for the snapshot pipeline.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;

pub use app::{AppState, build_app};
pub use config::{ClassifierSettings, ServerConfig};
pub use error::ApiError;
