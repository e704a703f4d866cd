//! # Bus Telemetry
//!
//! Structured logging for services built on `typed-bus`.
//!
//! The bus crates only emit `tracing` events; this crate installs the
//! global subscriber that formats and filters them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bus_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BUS_SERVICE_NAME` | `typed-bus` | Service name attached to the startup log |
//! | `BUS_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directives |
//! | `BUS_JSON_LOGS` | `false` | Emit JSON lines instead of plain text |
//! | `BUS_LOG_TARGET` | `true` | Include the event target in output |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}
