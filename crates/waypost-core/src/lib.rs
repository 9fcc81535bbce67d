//! Configuration, paths, and logging setup shared by the Waypost crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_ENDPOINT, DEFAULT_LOG_LEVEL, DEFAULT_RETRY_DELAY_SECS};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
