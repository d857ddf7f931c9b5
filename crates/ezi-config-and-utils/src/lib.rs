//! Core types, configuration, and utilities for the ezi session tooling.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_BACKEND_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
