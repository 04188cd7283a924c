pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod logging;
pub mod ml;

pub use config::AppConfig;
pub use domain::{ModelKind, RequestSchema};
pub use error::{AgriError, Result};
pub use ml::{InferenceBackend, ModelHandle};
