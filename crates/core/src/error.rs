// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for RouteKit.
//!
//! The variants map onto the failure classes the control surface needs to
//! distinguish: fatal startup problems, SDK handle allocation failures,
//! missing entities, and malformed requests. Frame-level losses inside the
//! routing loop are not errors; they are retried on the next tick and never
//! propagate.

use thiserror::Error;

/// Main error type for RouteKit operations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// SDK init, finder creation, or network bind failed. Fatal at startup;
    /// the process exits non-zero.
    #[error("Initialization error: {0}")]
    Init(String),

    /// A sender or receiver handle came back null from the SDK. Logged and
    /// surfaced as an operation failure, never a crash.
    #[error("Resource creation error: {0}")]
    ResourceCreate(String),

    /// A referenced slot, destination, or source does not exist. The
    /// operation does not mutate state.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or semantically invalid request (missing field, duplicate
    /// destination name, out-of-range slot).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The router actor is gone. Mutations are applied whole inside the
    /// actor, so a closed channel never leaves partial state behind.
    #[error("Router unavailable: channel closed")]
    ChannelClosed,
}

/// Convenience type alias for Results using [`RouterError`].
pub type Result<T> = std::result::Result<T, RouterError>;
