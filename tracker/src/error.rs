use thiserror::Error;

use crate::{
    config::ConfigError, gpx_export::GpxError, planner::PlannerError, runner::RunnerError,
    session::TrackingError, storage::StoreError,
};

/// Everything the `stride` binary can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("GPX error: {0}")]
    Gpx(#[from] GpxError),
    #[error("session error: {0}")]
    Session(#[from] RunnerError),
    #[error("tracking error: {0}")]
    Tracking(#[from] TrackingError),
    #[error("route planning error: {0}")]
    Planner(#[from] PlannerError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
