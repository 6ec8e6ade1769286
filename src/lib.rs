//! # babbler
//!
//! Bidirectional network traffic generator and throughput measurement tool.
//!
//! The binary (`src/main.rs`) is a thin wrapper: it parses arguments, wires up
//! logging, and hands off to a [`supervisor::Supervisor`] running in either
//! client mode (open `N` connections and drive request/response exchanges) or
//! server mode (listen and echo). Everything else lives in this library so it
//! can be exercised from integration tests without going through the CLI.

pub mod cancel;
pub mod cli;
pub mod comsettings;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod protocol;
pub mod report;
pub mod requestor;
pub mod responder;
pub mod stats;
pub mod supervisor;
pub mod sync;
pub mod transport;
pub mod worker;

pub use cli::{Args, Descriptor};
pub use config::AppConfig;
pub use error::{ConfigError, ProtocolError, TransportError, WorkerExit};
pub use supervisor::Supervisor;

/// The current version of babbler.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
