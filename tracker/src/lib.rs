pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod gpx_export;
pub mod models;
pub mod planner;
pub mod position;
pub mod providers;
pub mod recording;
pub mod runner;
pub mod session;
pub mod storage;

pub use api::{create_router, AppState};
