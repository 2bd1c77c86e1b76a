// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The router actor: single owner of the matrix, the receiver pool, and the
//! finder.
//!
//! All mutations and reads arrive as messages; the routing loop is the
//! actor's tick. Because one task owns every SDK handle the loop touches,
//! mutations are serialized with frame forwarding by construction: no
//! receiver or sender can be torn down while a capture or send is in flight,
//! and a route change takes effect no later than the next tick after its
//! message is handled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::discovery::{filter_sources, filter_studio_monitors};
use crate::error::{Result, RouterError};
use crate::keepalive::Keepalive;
use crate::matrix::MatrixState;
use crate::pool::ReceiverPool;
use crate::preview::PreviewMonitor;
use crate::sdk::{Bandwidth, CapturedFrame, SdkSession, SenderConfig, SourceFinder};
use crate::types::{Destination, Route, Source, SourceSlot, DEFAULT_DESTINATION_COUNT};

const CONTROL_CAPACITY: usize = 32;
const QUERY_CAPACITY: usize = 32;

/// Loop cadence; balances forwarding latency against CPU.
const TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Status line (and idle keepalive) cadence.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic receiver-pool reconcile cadence.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Capture timeout; bounds shutdown latency to one tick plus one capture.
const CAPTURE_TIMEOUT: Duration = Duration::from_millis(1);

/// Pacing between default-destination sender creations, avoiding SDK
/// resource contention at startup.
const DESTINATION_CREATE_PACING: Duration = Duration::from_millis(100);

/// Router tuning. The routing bandwidth is configurable because `Highest`
/// can saturate links on wide fan-out.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub bandwidth: Bandwidth,
}

/// Mutations, each answered through a oneshot.
enum RouterControl {
    AssignSlot {
        slot: u32,
        source_name: String,
        display_name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UnassignSlot {
        slot: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    CreateDestination {
        name: String,
        description: String,
        reply: oneshot::Sender<Result<u32>>,
    },
    RemoveDestination {
        slot: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    UnassignDestination {
        slot: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    CreateRoute {
        source_slot: u32,
        destination_slot: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveRoute {
        source_slot: u32,
        destination_slot: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    CreateRoutes {
        source_slot: u32,
        destination_slots: Vec<u32>,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveRoutesFromSource {
        source_slot: u32,
        reply: oneshot::Sender<Result<usize>>,
    },
    Shutdown,
}

/// Reads; none of these modify state.
enum RouterQuery {
    SourceSlots { reply: oneshot::Sender<Vec<SourceSlot>> },
    Destinations { reply: oneshot::Sender<Vec<Destination>> },
    Routes { reply: oneshot::Sender<Vec<Route>> },
    DestinationsForSource { source_slot: u32, reply: oneshot::Sender<Vec<u32>> },
    DiscoverSources { reply: oneshot::Sender<Vec<Source>> },
    DiscoverStudioMonitors { reply: oneshot::Sender<Vec<Source>> },
    PooledSources { reply: oneshot::Sender<Vec<String>> },
}

/// The actor state. Fields are declared in teardown order: the pool and the
/// matrix (with its senders) release their handles before the finder, and
/// the session `Arc` goes last.
pub struct Router {
    pool: ReceiverPool,
    matrix: MatrixState,
    finder: Box<dyn SourceFinder>,
    keepalive: Keepalive,
    preview: Arc<Mutex<PreviewMonitor>>,
    session: Arc<SdkSession>,
    control_rx: mpsc::Receiver<RouterControl>,
    query_rx: mpsc::Receiver<RouterQuery>,
    last_status: Instant,
    last_reconcile: Instant,
}

impl Router {
    /// Creates the finder, builds the default matrix layout (16 empty slots,
    /// 4 destinations named "NDI Output 1".."NDI Output 4"), and starts the
    /// actor. A failed default sender is logged and skipped; a missing
    /// finder is fatal.
    pub async fn spawn(
        session: Arc<SdkSession>,
        config: RouterConfig,
        preview: Arc<Mutex<PreviewMonitor>>,
    ) -> Result<RouterHandle> {
        let finder = session
            .create_finder(true)
            .ok_or_else(|| RouterError::Init("failed to create source finder".to_string()))?;

        let mut matrix = MatrixState::new();
        for i in 1..=DEFAULT_DESTINATION_COUNT {
            let name = format!("NDI Output {i}");
            match session.create_sender(&SenderConfig::unclocked(&name)) {
                Some(sender) => {
                    matrix.push_destination(&name, format!("Matrix destination {i}"), sender);
                },
                None => {
                    warn!(name = %name, "Failed to create default destination sender, continuing");
                },
            }
            tokio::time::sleep(DESTINATION_CREATE_PACING).await;
        }
        info!(
            slots = matrix.slots().len(),
            destinations = matrix.destination_count(),
            "Initialized default matrix"
        );

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (query_tx, query_rx) = mpsc::channel(QUERY_CAPACITY);

        let router = Self {
            pool: ReceiverPool::new(config.bandwidth),
            matrix,
            finder,
            keepalive: Keepalive::new(),
            preview,
            session,
            control_rx,
            query_rx,
            last_status: Instant::now(),
            last_reconcile: Instant::now(),
        };
        let task = tokio::spawn(router.run());

        Ok(RouterHandle {
            control_tx,
            query_tx,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    async fn run(mut self) {
        info!("Router actor started");
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(msg) = self.control_rx.recv() => {
                    if !self.handle_control(msg).await {
                        break;
                    }
                },
                Some(query) = self.query_rx.recv() => {
                    self.handle_query(query);
                },
                _ = tick.tick() => {
                    self.tick();
                },
                else => break,
            }
        }
        info!("Router actor shutting down");
    }

    /// Returns false when a shutdown was requested.
    async fn handle_control(&mut self, msg: RouterControl) -> bool {
        match msg {
            RouterControl::AssignSlot { slot, source_name, display_name, reply } => {
                let _ = reply.send(self.matrix.assign_slot(slot, source_name, display_name));
            },
            RouterControl::UnassignSlot { slot, reply } => {
                let _ = reply.send(self.unassign_slot(slot).await);
            },
            RouterControl::CreateDestination { name, description, reply } => {
                let _ = reply.send(self.create_destination(name, description));
            },
            RouterControl::RemoveDestination { slot, reply } => {
                let result = self.matrix.remove_destination(slot).map(|_| ());
                self.reconcile_pool();
                let _ = reply.send(result);
            },
            RouterControl::UnassignDestination { slot, reply } => {
                let result = self.matrix.unassign_destination(slot).map(|_| ());
                self.reconcile_pool();
                let _ = reply.send(result);
            },
            RouterControl::CreateRoute { source_slot, destination_slot, reply } => {
                let result = self.matrix.create_route(source_slot, destination_slot).map(|_| ());
                // Replacing a route can orphan the previous source.
                self.reconcile_pool();
                let _ = reply.send(result);
            },
            RouterControl::RemoveRoute { source_slot, destination_slot, reply } => {
                let result = self.matrix.remove_route(source_slot, destination_slot);
                self.reconcile_pool();
                let _ = reply.send(result);
            },
            RouterControl::CreateRoutes { source_slot, destination_slots, reply } => {
                let _ = reply.send(self.create_routes(source_slot, &destination_slots));
            },
            RouterControl::RemoveRoutesFromSource { source_slot, reply } => {
                let removed = self.matrix.remove_all_routes_from_source(source_slot);
                self.reconcile_pool();
                let result = if removed > 0 {
                    Ok(removed)
                } else {
                    Err(RouterError::NotFound(format!(
                        "no routes from source slot {source_slot}"
                    )))
                };
                let _ = reply.send(result);
            },
            RouterControl::Shutdown => return false,
        }
        true
    }

    fn handle_query(&mut self, query: RouterQuery) {
        match query {
            RouterQuery::SourceSlots { reply } => {
                let _ = reply.send(self.matrix.slots());
            },
            RouterQuery::Destinations { reply } => {
                let _ = reply.send(self.matrix.destinations());
            },
            RouterQuery::Routes { reply } => {
                let _ = reply.send(self.matrix.routes());
            },
            RouterQuery::DestinationsForSource { source_slot, reply } => {
                let _ = reply.send(self.matrix.destinations_for_source(source_slot));
            },
            RouterQuery::DiscoverSources { reply } => {
                let snapshot = self.finder.current_sources();
                let _ = reply.send(filter_sources(snapshot, &self.matrix.destination_names()));
            },
            RouterQuery::DiscoverStudioMonitors { reply } => {
                let _ = reply.send(filter_studio_monitors(self.finder.current_sources()));
            },
            RouterQuery::PooledSources { reply } => {
                let _ = reply.send(self.pool.source_names());
            },
        }
    }

    /// One iteration of the routing loop.
    fn tick(&mut self) {
        if self.last_status.elapsed() >= STATUS_INTERVAL {
            info!(
                routes = self.matrix.route_count(),
                destinations = self.matrix.destination_count(),
                "Routing status"
            );
            if self.matrix.route_count() == 0 {
                let frame = self.keepalive.next_frame(self.matrix.destination_count());
                self.matrix.broadcast_video(&frame);
            }
            self.last_status = Instant::now();
        }

        for (source_name, destination_slots) in self.matrix.routing_groups() {
            match self.pool.capture(&self.session, &source_name, CAPTURE_TIMEOUT) {
                CapturedFrame::Video(frame) => {
                    self.matrix.send_video_to(&destination_slots, &frame);
                },
                CapturedFrame::Audio(frame) => {
                    self.matrix.send_audio_to(&destination_slots, &frame);
                },
                // Nothing this tick, or a frame type the router ignores.
                _ => {},
            }
        }

        if self.last_reconcile.elapsed() >= RECONCILE_INTERVAL {
            self.reconcile_pool();
            self.last_reconcile = Instant::now();
        }
    }

    async fn unassign_slot(&mut self, slot: u32) -> Result<()> {
        let freed = self.matrix.unassign_slot(slot)?;
        if let Some(source_name) = freed {
            let mut preview = self.preview.lock().await;
            if preview.source().as_deref() == Some(source_name.as_str()) {
                info!(source = %source_name, "Clearing preview of unassigned source");
                preview.clear().await;
            }
            drop(preview);
            self.reconcile_pool();
        }
        Ok(())
    }

    fn create_destination(&mut self, name: String, description: String) -> Result<u32> {
        if name.trim().is_empty() {
            return Err(RouterError::InvalidRequest("destination name must not be empty".into()));
        }
        if self.matrix.has_destination_name(&name) {
            return Err(RouterError::InvalidRequest(format!(
                "destination name '{name}' already exists"
            )));
        }
        let sender = self.session.create_sender(&SenderConfig::unclocked(&name)).ok_or_else(|| {
            warn!(name = %name, "Failed to create sender for destination");
            RouterError::ResourceCreate(format!("sender for destination '{name}'"))
        })?;
        Ok(self.matrix.push_destination(name, description, sender))
    }

    /// Iterative bulk create. Successful routes stay applied even when later
    /// ones fail; the operation succeeds only if all did.
    fn create_routes(&mut self, source_slot: u32, destination_slots: &[u32]) -> Result<()> {
        let mut failed = 0usize;
        for &destination_slot in destination_slots {
            if let Err(e) = self.matrix.create_route(source_slot, destination_slot) {
                warn!(source_slot, destination_slot, error = %e, "Failed to create route");
                failed += 1;
            }
        }
        self.reconcile_pool();
        if failed == 0 {
            Ok(())
        } else {
            Err(RouterError::NotFound(format!(
                "failed to create {failed} of {} routes from source slot {source_slot}",
                destination_slots.len()
            )))
        }
    }

    fn reconcile_pool(&mut self) {
        self.pool.reconcile(&self.matrix.active_source_names());
    }
}

/// Clonable handle to a running router actor.
#[derive(Clone)]
pub struct RouterHandle {
    control_tx: mpsc::Sender<RouterControl>,
    query_tx: mpsc::Sender<RouterQuery>,
    task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl RouterHandle {
    pub async fn assign_slot(
        &self,
        slot: u32,
        source_name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<()> {
        let (source_name, display_name) = (source_name.into(), display_name.into());
        self.control(|reply| RouterControl::AssignSlot { slot, source_name, display_name, reply })
            .await
    }

    pub async fn unassign_slot(&self, slot: u32) -> Result<()> {
        self.control(|reply| RouterControl::UnassignSlot { slot, reply }).await
    }

    /// Creates a destination and returns its slot number.
    pub async fn create_destination(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<u32> {
        let (name, description) = (name.into(), description.into());
        self.control(|reply| RouterControl::CreateDestination { name, description, reply }).await
    }

    pub async fn remove_destination(&self, slot: u32) -> Result<()> {
        self.control(|reply| RouterControl::RemoveDestination { slot, reply }).await
    }

    pub async fn unassign_destination(&self, slot: u32) -> Result<()> {
        self.control(|reply| RouterControl::UnassignDestination { slot, reply }).await
    }

    pub async fn create_route(&self, source_slot: u32, destination_slot: u32) -> Result<()> {
        self.control(|reply| RouterControl::CreateRoute { source_slot, destination_slot, reply })
            .await
    }

    pub async fn remove_route(&self, source_slot: u32, destination_slot: u32) -> Result<()> {
        self.control(|reply| RouterControl::RemoveRoute { source_slot, destination_slot, reply })
            .await
    }

    pub async fn create_routes(
        &self,
        source_slot: u32,
        destination_slots: Vec<u32>,
    ) -> Result<()> {
        self.control(|reply| RouterControl::CreateRoutes { source_slot, destination_slots, reply })
            .await
    }

    /// Removes every route from a source slot; fails with `NotFound` when
    /// there was none.
    pub async fn remove_routes_from_source(&self, source_slot: u32) -> Result<usize> {
        self.control(|reply| RouterControl::RemoveRoutesFromSource { source_slot, reply }).await
    }

    pub async fn source_slots(&self) -> Result<Vec<SourceSlot>> {
        self.query(|reply| RouterQuery::SourceSlots { reply }).await
    }

    pub async fn destinations(&self) -> Result<Vec<Destination>> {
        self.query(|reply| RouterQuery::Destinations { reply }).await
    }

    pub async fn routes(&self) -> Result<Vec<Route>> {
        self.query(|reply| RouterQuery::Routes { reply }).await
    }

    pub async fn destinations_for_source(&self, source_slot: u32) -> Result<Vec<u32>> {
        self.query(|reply| RouterQuery::DestinationsForSource { source_slot, reply }).await
    }

    pub async fn discover_sources(&self) -> Result<Vec<Source>> {
        self.query(|reply| RouterQuery::DiscoverSources { reply }).await
    }

    pub async fn discover_studio_monitors(&self) -> Result<Vec<Source>> {
        self.query(|reply| RouterQuery::DiscoverStudioMonitors { reply }).await
    }

    /// Source names currently held by the receiver pool.
    pub async fn pooled_sources(&self) -> Result<Vec<String>> {
        self.query(|reply| RouterQuery::PooledSources { reply }).await
    }

    /// Stops the actor and waits for it to finish. Subsequent calls are
    /// no-ops.
    pub async fn shutdown_and_wait(&self) {
        let _ = self.control_tx.send(RouterControl::Shutdown).await;
        let task = {
            let mut guard = self.task.lock().await;
            guard.take()
        };
        if let Some(task) = task {
            match tokio::time::timeout(Duration::from_secs(10), task).await {
                Ok(Ok(())) => info!("Router shut down gracefully"),
                Ok(Err(e)) => warn!(error = %e, "Router task panicked during shutdown"),
                Err(_) => warn!("Router did not shut down within 10s"),
            }
        }
    }

    async fn control<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> RouterControl,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.control_tx.send(build(reply)).await.map_err(|_| RouterError::ChannelClosed)?;
        rx.await.map_err(|_| RouterError::ChannelClosed)?
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RouterQuery,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.query_tx.send(build(reply)).await.map_err(|_| RouterError::ChannelClosed)?;
        rx.await.map_err(|_| RouterError::ChannelClosed)
    }
}
