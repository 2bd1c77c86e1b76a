// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared receiver pool for the routing loop.
//!
//! One live receiver exists per actively-used source name, shared across all
//! destinations fed from that source. Entries are created lazily on first
//! use and reconciled against the set of source names active routes actually
//! reference, so an orphaned receiver never outlives the last route that
//! needed it. The preview sampler is deliberately not pooled here; it owns
//! its own receiver.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, warn};

use crate::sdk::{Bandwidth, CapturedFrame, FrameReceiver, ReceiverConfig, SdkSession};

/// Prefix of the logical receiver name registered with the SDK.
const RECEIVER_NAME_PREFIX: &str = "Router_Recv_";

/// Name-keyed cache of live receivers.
pub struct ReceiverPool {
    receivers: HashMap<String, Box<dyn FrameReceiver>>,
    bandwidth: Bandwidth,
}

impl ReceiverPool {
    #[must_use]
    pub fn new(bandwidth: Bandwidth) -> Self {
        Self { receivers: HashMap::new(), bandwidth }
    }

    /// Captures one frame from the pooled receiver for `source_name`,
    /// creating the receiver if absent. A failed create is logged and
    /// reported as no-frame; the next tick retries.
    pub fn capture(
        &mut self,
        session: &SdkSession,
        source_name: &str,
        timeout: Duration,
    ) -> CapturedFrame {
        if !self.receivers.contains_key(source_name) {
            let config = ReceiverConfig {
                source_name: source_name.to_string(),
                receiver_name: Some(format!("{RECEIVER_NAME_PREFIX}{source_name}")),
                bandwidth: self.bandwidth,
            };
            match session.create_receiver(&config) {
                Some(receiver) => {
                    debug!(source = %source_name, "Created pooled receiver");
                    self.receivers.insert(source_name.to_string(), receiver);
                },
                None => {
                    warn!(source = %source_name, "Failed to create receiver");
                    return CapturedFrame::None;
                },
            }
        }
        match self.receivers.get_mut(source_name) {
            Some(receiver) => receiver.capture(timeout),
            None => CapturedFrame::None,
        }
    }

    /// Destroys every pooled receiver whose source is no longer referenced
    /// by an active route.
    pub fn reconcile(&mut self, used_sources: &HashSet<String>) {
        let before = self.receivers.len();
        self.receivers.retain(|name, _| {
            let keep = used_sources.contains(name);
            if !keep {
                debug!(source = %name, "Destroying unused pooled receiver");
            }
            keep
        });
        let dropped = before - self.receivers.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.receivers.len(), "Receiver pool reconciled");
        }
    }

    /// Source names currently held in the pool, sorted.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.receivers.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackSdk;
    use std::sync::Arc;

    fn session(sdk: LoopbackSdk) -> SdkSession {
        SdkSession::open(Arc::new(sdk)).unwrap()
    }

    #[test]
    fn capture_creates_receiver_lazily() {
        let session = session(LoopbackSdk::with_sources(["CAM1"]));
        let mut pool = ReceiverPool::new(Bandwidth::Highest);
        assert!(pool.is_empty());

        let frame = pool.capture(&session, "CAM1", Duration::from_millis(1));
        assert!(matches!(frame, CapturedFrame::Video(_)));
        assert_eq!(pool.source_names(), ["CAM1"]);

        // Second call reuses the pooled receiver.
        pool.capture(&session, "CAM1", Duration::from_millis(1));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn failed_create_leaves_pool_unchanged() {
        let sdk = LoopbackSdk::with_sources(["CAM1"]);
        sdk.set_fail_receiver_creates(true);
        let session = session(sdk);
        let mut pool = ReceiverPool::new(Bandwidth::Highest);

        assert!(matches!(pool.capture(&session, "CAM1", Duration::from_millis(1)), CapturedFrame::None));
        assert!(pool.is_empty());
    }

    #[test]
    fn reconcile_matches_pool_to_active_sources() {
        let session = session(LoopbackSdk::with_sources(["CAM1", "CAM2"]));
        let mut pool = ReceiverPool::new(Bandwidth::Highest);
        pool.capture(&session, "CAM1", Duration::from_millis(1));
        pool.capture(&session, "CAM2", Duration::from_millis(1));
        assert_eq!(pool.len(), 2);

        let used: HashSet<String> = ["CAM2".to_string()].into_iter().collect();
        pool.reconcile(&used);
        assert_eq!(pool.source_names(), ["CAM2"]);

        pool.reconcile(&HashSet::new());
        assert!(pool.is_empty());
    }
}
