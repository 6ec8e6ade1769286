//! # Error Types
//!
//! Typed error enums for the three failure categories the core distinguishes:
//! transport failures, protocol (framing/payload) failures, and user/configuration
//! failures. Each is a `thiserror`-derived enum so call sites can match on variants;
//! `main.rs` matches on the top-level `ConfigError` directly rather than widening to
//! a boxed error type, since there is only the one entry point to report to the user.
//!
//! Cancellation is deliberately *not* a variant of any of these enums: it is not an
//! error, it is a cooperative shutdown signal. Operations that can be cancelled
//! return `WorkerResult<T> = Result<T, WorkerExit>`, where `WorkerExit::Cancelled` is
//! a sibling of `WorkerExit::Failed(...)` rather than nested inside it.

use std::io;

/// Failures from the transport layer (socket creation, connect, bind, I/O).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not connect to any candidate address for {host}:{port}")]
    NotConnected { host: String, port: u16 },

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("operation timed out")]
    Timeout,

    #[error("address resolution failed for {host}: {source}")]
    AddressResolution { host: String, source: io::Error },

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

/// Failures from the wire protocol codec (framing, checksum, payload pattern).
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame header checksum mismatch")]
    WrongChecksum,

    #[error("unknown frame type")]
    UnknownType,

    #[error("unexpected frame type (expected the other direction)")]
    UnexpectedType,

    #[error("unexpected sequence number")]
    UnexpectedSequence,

    #[error("corrupted payload")]
    CorruptedPayload,

    #[error("frame shorter than the minimum header size")]
    FrameTooShort,
}

/// User/configuration errors: bad CLI arguments, descriptor grammar, proto-settings.
///
/// These are reported on stderr and cause the process to exit with code `-2`; they
/// are never raised from inside a running worker.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid connection descriptor '{0}': {1}")]
    InvalidDescriptor(String, String),

    #[error("invalid port range '{0}'")]
    InvalidPortRange(String),

    #[error("invalid proto-settings '{0}': {1}")]
    InvalidProtoSettings(String, String),

    #[error("communication size {0} is below the minimum frame size of {1} bytes")]
    SizeBelowMinimum(u32, u32),

    #[error("request/response size range is inverted (min {0} > max {1})")]
    InvertedRange(u32, u32),

    #[error("interval must not be sub-microsecond: {0}")]
    SubMicrosecondInterval(f64),

    #[error("unknown transport protocol '{0}'")]
    UnknownProtocol(String),

    #[error("buffer size {0} is below the minimum of {1} bytes")]
    BufferTooSmall(usize, usize),
}

/// Outcome of one unit of worker-level work: either it failed for a real reason, or
/// the process is shutting down and the worker is unwinding cooperatively.
///
/// `Cancelled` unwinds silently (no log line beyond debug); `Failed` is logged as a
/// warning/error by the worker before it exits.
#[derive(Debug)]
pub enum WorkerExit {
    Cancelled,
    Transport(TransportError),
    Protocol(ProtocolError),
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::Cancelled => write!(f, "cancelled"),
            WorkerExit::Transport(e) => write!(f, "{e}"),
            WorkerExit::Protocol(e) => write!(f, "{e}"),
        }
    }
}

impl From<TransportError> for WorkerExit {
    fn from(e: TransportError) -> Self {
        WorkerExit::Transport(e)
    }
}

impl From<ProtocolError> for WorkerExit {
    fn from(e: ProtocolError) -> Self {
        WorkerExit::Protocol(e)
    }
}

/// Result alias used throughout the worker/transport/protocol layers.
pub type WorkerResult<T> = Result<T, WorkerExit>;
