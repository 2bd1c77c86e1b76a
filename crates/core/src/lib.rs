// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! RouteKit Core - matrix routing engine over a pluggable media SDK.
//!
//! This crate implements the routing engine independently of any control
//! surface:
//!
//! ## Core Modules
//!
//! - [`sdk`]: The SDK port - the only surface the engine depends on
//! - [`loopback`]: In-memory SDK backend for tests and SDK-less deployments
//! - [`discovery`]: Source discovery filter policy
//! - [`matrix`]: Slots, destinations, routes, and their mutations
//! - [`pool`]: Shared, reference-reconciled receiver pool
//! - [`router`]: The router actor - routing loop, keepalive, control/query surface
//! - [`keepalive`]: Idle black-frame generator
//! - [`preview`]: Best-effort RGB preview sampler
//! - [`types`]: Wire-facing data model
//! - [`error`]: Error types and handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use routekit_core::loopback::LoopbackSdk;
//! use routekit_core::preview::PreviewMonitor;
//! use routekit_core::router::{Router, RouterConfig};
//! use routekit_core::sdk::SdkSession;
//!
//! let session = Arc::new(SdkSession::open(Arc::new(LoopbackSdk::new())).unwrap());
//! let preview = Arc::new(Mutex::new(PreviewMonitor::new(Arc::clone(&session))));
//! let router = Router::spawn(session, RouterConfig::default(), preview).await?;
//! router.assign_slot(1, "CAM1", "Main").await?;
//! router.create_route(1, 2).await?;
//! ```

// Module declarations
pub mod discovery;
pub mod error;
pub mod keepalive;
pub mod loopback;
pub mod matrix;
pub mod pool;
pub mod preview;
pub mod router;
pub mod sdk;
pub mod types;

// Convenience re-exports for the most frequently used types

// Error handling
pub use error::{Result, RouterError};

// The SDK port
pub use sdk::{Bandwidth, CapturedFrame, MediaSdk, SdkSession};

// Engine surface
pub use router::{Router, RouterConfig, RouterHandle};

// Preview pipeline
pub use preview::PreviewMonitor;

// Data model
pub use types::{Destination, Route, Source, SourceSlot, SOURCE_SLOT_COUNT};
