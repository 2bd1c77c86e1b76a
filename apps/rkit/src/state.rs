// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use tokio::sync::Mutex;

use routekit_core::{PreviewMonitor, RouterHandle};

/// Shared state of the HTTP control surface.
///
/// Lock discipline: handlers must never call into `router` while holding the
/// `preview` lock. The router actor itself takes the preview lock when a
/// slot unassign clears the preview, so the reverse order would deadlock.
#[derive(Clone)]
pub struct AppState {
    pub router: RouterHandle,
    pub preview: Arc<Mutex<PreviewMonitor>>,
}
