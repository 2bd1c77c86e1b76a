// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Matrix state: slots, destinations, routes, and their mutation operations.
//!
//! `MatrixState` is plain data plus owned sender handles. It is exclusively
//! owned by the router actor; everything here is synchronous and infallible
//! with respect to the SDK (sender handles are created by the caller and
//! handed in). The invariants it maintains between operations:
//!
//! 1. each destination has at most one incoming route;
//! 2. `destination.current_source_slot == s` iff route `(s, d)` exists;
//! 3. every route references an assigned slot and an existing destination,
//!    or is cascaded away by the mutation that broke it.

use std::collections::{BTreeMap, HashSet};

use tracing::info;

use crate::error::{Result, RouterError};
use crate::sdk::{AudioFrame, FrameSender, VideoFrame};
use crate::types::{generate_route_id, Destination, Route, SourceSlot, SOURCE_SLOT_COUNT};

/// A destination record paired with its owned sender handle.
///
/// `sender` is declared first so it drops before the serializable record
/// when an entry is destroyed.
struct DestinationEntry {
    sender: Box<dyn FrameSender>,
    info: Destination,
}

/// The in-memory routing matrix. Reinitialized on every startup; there is no
/// persistence.
pub struct MatrixState {
    slots: Vec<SourceSlot>,
    destinations: Vec<DestinationEntry>,
    routes: Vec<Route>,
}

impl MatrixState {
    /// A matrix with the 16 fixed, unassigned source slots and no
    /// destinations yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: (1..=SOURCE_SLOT_COUNT).map(SourceSlot::empty).collect(),
            destinations: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn slots(&self) -> Vec<SourceSlot> {
        self.slots.clone()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.destinations.iter().map(|e| e.info.clone()).collect()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.clone()
    }

    pub fn destination_names(&self) -> Vec<String> {
        self.destinations.iter().map(|e| e.info.name.clone()).collect()
    }

    pub fn has_destination_name(&self, name: &str) -> bool {
        self.destinations.iter().any(|e| e.info.name == name)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Next destination slot number: `max(existing) + 1`, starting at 1.
    #[must_use]
    pub fn next_destination_slot(&self) -> u32 {
        self.destinations.iter().map(|e| e.info.slot_number).max().unwrap_or(0) + 1
    }

    /// Adds a destination with an already-created sender and returns its
    /// slot number. Name uniqueness is the caller's contract; the router
    /// rejects duplicates before allocating the sender.
    pub fn push_destination(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        sender: Box<dyn FrameSender>,
    ) -> u32 {
        let slot_number = self.next_destination_slot();
        let info = Destination {
            slot_number,
            name: name.into(),
            description: description.into(),
            enabled: true,
            current_source_slot: 0,
        };
        info!(name = %info.name, slot = slot_number, "Created destination, now visible on network");
        self.destinations.push(DestinationEntry { sender, info });
        slot_number
    }

    /// Removes a destination: cascades its routes, then destroys the sender
    /// with the entry. Returns the number of routes removed.
    pub fn remove_destination(&mut self, slot_number: u32) -> Result<usize> {
        let idx = self
            .destinations
            .iter()
            .position(|e| e.info.slot_number == slot_number)
            .ok_or_else(|| RouterError::NotFound(format!("destination slot {slot_number}")))?;

        let removed = self.retain_routes(|r| r.destination_slot != slot_number);
        let DestinationEntry { sender, info } = self.destinations.remove(idx);
        drop(sender);
        info!(name = %info.name, slot = slot_number, "Removed destination, no longer visible on network");
        Ok(removed)
    }

    /// Upserts slot `slot_number` with a source binding.
    pub fn assign_slot(
        &mut self,
        slot_number: u32,
        source_name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.slot_number == slot_number)
            .ok_or_else(|| RouterError::InvalidRequest(format!(
                "source slot {slot_number} out of range 1..={SOURCE_SLOT_COUNT}"
            )))?;
        slot.assigned_ndi_source = source_name.into();
        slot.display_name = display_name.into();
        slot.is_assigned = true;
        info!(source = %slot.assigned_ndi_source, slot = slot_number, "Assigned source to slot");
        Ok(())
    }

    /// Clears slot `slot_number`, cascading every route from it and the
    /// back-reference of every destination it fed. Idempotent: an already
    /// unassigned slot returns `Ok(None)` without side effects. The freed
    /// source name is returned so the caller can reconcile the receiver pool
    /// and the preview sampler.
    pub fn unassign_slot(&mut self, slot_number: u32) -> Result<Option<String>> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.slot_number == slot_number)
            .ok_or_else(|| RouterError::NotFound(format!("source slot {slot_number}")))?;

        if !slot.is_assigned {
            return Ok(None);
        }

        let freed = std::mem::take(&mut slot.assigned_ndi_source);
        slot.display_name = format!("Slot {slot_number}");
        slot.is_assigned = false;

        let removed = self.retain_routes(|r| r.source_slot != slot_number);
        for entry in &mut self.destinations {
            if entry.info.current_source_slot == slot_number {
                entry.info.current_source_slot = 0;
            }
        }
        info!(slot = slot_number, source = %freed, routes_removed = removed, "Unassigned source slot");
        Ok(Some(freed))
    }

    /// Creates route `(source_slot, destination_slot)`. Idempotent: an
    /// existing identical route returns `Ok(false)`. Any other route into
    /// the destination is replaced atomically, keeping at most one incoming
    /// route per destination. Returns `Ok(true)` when a route was appended.
    pub fn create_route(&mut self, source_slot: u32, destination_slot: u32) -> Result<bool> {
        let assigned = self
            .slots
            .iter()
            .find(|s| s.slot_number == source_slot)
            .is_some_and(|s| s.is_assigned);
        if !assigned {
            return Err(RouterError::NotFound(format!(
                "source slot {source_slot} not found or not assigned"
            )));
        }
        if !self.destinations.iter().any(|e| e.info.slot_number == destination_slot) {
            return Err(RouterError::NotFound(format!("destination slot {destination_slot}")));
        }

        if self
            .routes
            .iter()
            .any(|r| r.source_slot == source_slot && r.destination_slot == destination_slot)
        {
            return Ok(false);
        }

        self.routes.retain(|r| r.destination_slot != destination_slot);
        self.routes.push(Route {
            id: generate_route_id(),
            source_slot,
            destination_slot,
            active: true,
        });
        if let Some(entry) =
            self.destinations.iter_mut().find(|e| e.info.slot_number == destination_slot)
        {
            entry.info.current_source_slot = source_slot;
        }
        info!(source_slot, destination_slot, "Created route");
        Ok(true)
    }

    /// Removes route `(source_slot, destination_slot)` and clears the
    /// destination's back-reference.
    pub fn remove_route(&mut self, source_slot: u32, destination_slot: u32) -> Result<()> {
        let idx = self
            .routes
            .iter()
            .position(|r| r.source_slot == source_slot && r.destination_slot == destination_slot)
            .ok_or_else(|| {
                RouterError::NotFound(format!("route {source_slot} -> {destination_slot}"))
            })?;
        self.routes.remove(idx);
        if let Some(entry) =
            self.destinations.iter_mut().find(|e| e.info.slot_number == destination_slot)
        {
            entry.info.current_source_slot = 0;
        }
        info!(source_slot, destination_slot, "Removed route");
        Ok(())
    }

    /// Clears every incoming route of a destination. Succeeds even when the
    /// destination had no routes; returns how many were removed.
    pub fn unassign_destination(&mut self, destination_slot: u32) -> Result<usize> {
        if !self.destinations.iter().any(|e| e.info.slot_number == destination_slot) {
            return Err(RouterError::NotFound(format!("destination slot {destination_slot}")));
        }
        let removed = self.retain_routes(|r| r.destination_slot != destination_slot);
        if let Some(entry) =
            self.destinations.iter_mut().find(|e| e.info.slot_number == destination_slot)
        {
            entry.info.current_source_slot = 0;
        }
        info!(destination_slot, routes_removed = removed, "Unassigned destination");
        Ok(removed)
    }

    /// Removes every route from `source_slot`, clearing the back-reference
    /// of each affected destination. Returns how many routes were removed.
    pub fn remove_all_routes_from_source(&mut self, source_slot: u32) -> usize {
        let affected: Vec<u32> = self
            .routes
            .iter()
            .filter(|r| r.source_slot == source_slot)
            .map(|r| r.destination_slot)
            .collect();
        let removed = self.retain_routes(|r| r.source_slot != source_slot);
        for entry in &mut self.destinations {
            if affected.contains(&entry.info.slot_number) {
                entry.info.current_source_slot = 0;
            }
        }
        if removed > 0 {
            info!(source_slot, routes_removed = removed, "Removed all routes from source");
        }
        removed
    }

    /// Destination slots fed by `source_slot` via active routes.
    pub fn destinations_for_source(&self, source_slot: u32) -> Vec<u32> {
        self.routes
            .iter()
            .filter(|r| r.source_slot == source_slot && r.active)
            .map(|r| r.destination_slot)
            .collect()
    }

    /// Source names referenced by at least one active route through an
    /// assigned slot. This is the set the receiver pool reconciles against.
    pub fn active_source_names(&self) -> HashSet<String> {
        self.routes
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| {
                self.slots
                    .iter()
                    .find(|s| s.slot_number == r.source_slot && s.is_assigned)
                    .map(|s| s.assigned_ndi_source.clone())
            })
            .collect()
    }

    /// Builds the per-tick fan-out plan: source name -> destination slots,
    /// resolving each active route through its assigned slot. Routes whose
    /// slot is unassigned or whose destination is gone are skipped for this
    /// tick. Deterministic iteration order (sorted by source name).
    pub fn routing_groups(&self) -> Vec<(String, Vec<u32>)> {
        let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for route in self.routes.iter().filter(|r| r.active) {
            let Some(slot) = self
                .slots
                .iter()
                .find(|s| s.slot_number == route.source_slot && s.is_assigned)
            else {
                continue;
            };
            if !self.destinations.iter().any(|e| e.info.slot_number == route.destination_slot) {
                continue;
            }
            groups
                .entry(slot.assigned_ndi_source.clone())
                .or_default()
                .push(route.destination_slot);
        }
        groups.into_iter().collect()
    }

    /// Forwards one video frame to each of the given destinations. The send
    /// does not consume the frame, so a single instance fans out copy-free.
    pub fn send_video_to(&mut self, destination_slots: &[u32], frame: &VideoFrame) {
        for entry in &mut self.destinations {
            if destination_slots.contains(&entry.info.slot_number) {
                entry.sender.send_video(frame);
            }
        }
    }

    /// Forwards one audio frame to each of the given destinations.
    pub fn send_audio_to(&mut self, destination_slots: &[u32], frame: &AudioFrame) {
        for entry in &mut self.destinations {
            if destination_slots.contains(&entry.info.slot_number) {
                entry.sender.send_audio(frame);
            }
        }
    }

    /// Sends one video frame to every destination (keepalive path).
    pub fn broadcast_video(&mut self, frame: &VideoFrame) {
        for entry in &mut self.destinations {
            entry.sender.send_video(frame);
        }
    }

    fn retain_routes(&mut self, keep: impl Fn(&Route) -> bool) -> usize {
        let before = self.routes.len();
        self.routes.retain(|r| keep(r));
        before - self.routes.len()
    }
}

impl Default for MatrixState {
    fn default() -> Self {
        Self::new()
    }
}
