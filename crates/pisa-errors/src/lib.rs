//! The tower's error kinds (spec.md §7). This is a thin aggregating enum in
//! the shape of `reth-errors`' `RethError`: one variant per error *kind*,
//! not per call site, so every crate in the workspace can convert its own
//! local error type into a single customer-facing/log-facing vocabulary.
//!
//! Policy (spec.md §7): `PublicValidationError` and `PublicInspectionError`
//! are safe to expose to the customer; every other variant is logged with
//! context and never rendered to a caller.

use std::fmt;
use thiserror::Error;

/// One of the error kinds named in spec.md §7.
#[derive(Debug, Error)]
pub enum PisaError {
    /// Structural or time-window admission validation failed. Safe to
    /// expose as a 4xx.
    #[error("validation failed: {0}")]
    PublicValidationError(String),

    /// Protocol-specific chain-state validation failed (wrong nonce, closed
    /// channel, bad signatures). Safe to expose as a 4xx.
    #[error("chain-state inspection failed: {0}")]
    PublicInspectionError(String),

    /// A construction-time invariant was violated. Fatal at startup, never
    /// raised during steady state.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The `GasQueue` invariants detected an impossible state. The
    /// offending operation is aborted; head processing continues.
    #[error("gas queue consistency error: {0}")]
    QueueConsistencyError(String),

    /// A programmer mistake at an API boundary.
    #[error("argument error: {0}")]
    ArgumentError(String),

    /// An RPC or persistence call failed. Retried on the next head tick;
    /// not surfaced to the customer until the admission timeout triggers.
    #[error("transient I/O error: {0}")]
    TransientIoError(String),
}

impl PisaError {
    /// Errors that may be rendered back to the customer verbatim
    /// (spec.md §7: "public errors are the only ones whose messages reach
    /// the customer").
    pub const fn is_public(&self) -> bool {
        matches!(self, Self::PublicValidationError(_) | Self::PublicInspectionError(_))
    }

    /// The message to hand back at the admission boundary, or `None` if
    /// this error must be collapsed into a generic 5xx instead.
    pub fn public_message(&self) -> Option<&str> {
        match self {
            Self::PublicValidationError(msg) | Self::PublicInspectionError(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn validation(msg: impl fmt::Display) -> Self {
        Self::PublicValidationError(msg.to_string())
    }

    pub fn inspection(msg: impl fmt::Display) -> Self {
        Self::PublicInspectionError(msg.to_string())
    }

    pub fn configuration(msg: impl fmt::Display) -> Self {
        Self::ConfigurationError(msg.to_string())
    }

    pub fn queue_consistency(msg: impl fmt::Display) -> Self {
        Self::QueueConsistencyError(msg.to_string())
    }

    pub fn argument(msg: impl fmt::Display) -> Self {
        Self::ArgumentError(msg.to_string())
    }

    pub fn transient_io(msg: impl fmt::Display) -> Self {
        Self::TransientIoError(msg.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type PisaResult<T> = Result<T, PisaError>;
