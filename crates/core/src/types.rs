// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core data types of the routing matrix.
//!
//! This module defines the structures the control surface serializes and the
//! router mutates:
//! - [`Source`]: a network-discoverable live media stream
//! - [`SourceSlot`]: one of the 16 fixed assignment cells
//! - [`Destination`]: a network-visible output owned by this process
//! - [`Route`]: a directed edge from a source slot to a destination slot
//!
//! Wire field names follow the control API exactly (camelCase, with the
//! legacy `assignedNdiSource`/`isAssigned` spellings on source slots).

use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of source slots created at startup. Slots are numbered 1..=16 and
/// live for the whole process.
pub const SOURCE_SLOT_COUNT: u32 = 16;

/// Number of destinations created by the default matrix layout.
pub const DEFAULT_DESTINATION_COUNT: u32 = 4;

/// A network-discoverable live media stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Stable unique identifier on the network.
    pub name: String,
    /// Transport address; may be empty depending on the discovery backend.
    pub url: String,
    /// Always true in the current snapshot model: the finder only reports
    /// sources it can currently see.
    pub connected: bool,
    /// Reserved.
    #[serde(skip)]
    pub group: String,
}

/// An addressable assignment cell binding a source name for use in routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceSlot {
    pub slot_number: u32,
    /// Empty when unassigned.
    pub assigned_ndi_source: String,
    pub display_name: String,
    pub is_assigned: bool,
}

impl SourceSlot {
    /// An unassigned slot with the default display name.
    #[must_use]
    pub fn empty(slot_number: u32) -> Self {
        Self {
            slot_number,
            assigned_ndi_source: String::new(),
            display_name: format!("Slot {slot_number}"),
            is_assigned: false,
        }
    }
}

/// A live network output. The SDK sender handle lives beside this struct in
/// the matrix (it is not serializable); removal destroys the sender before
/// the destination record is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub slot_number: u32,
    /// Network-visible identifier, unique within the process.
    pub name: String,
    pub description: String,
    /// Reserved.
    pub enabled: bool,
    /// Source slot currently routed here; 0 means none. Denormalized from
    /// the route set and updated transactionally with it.
    pub current_source_slot: u32,
}

/// A directed edge from a source slot to a destination slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Opaque process-local label, see [`generate_route_id`].
    pub id: String,
    pub source_slot: u32,
    pub destination_slot: u32,
    pub active: bool,
}

/// Generates an opaque route id: 8 hex digits with a `-` after the 4th.
///
/// Collisions are acceptable; the id is a process-local label, not a key.
#[must_use]
pub fn generate_route_id() -> String {
    let mut rng = rand::rng();
    format!("{:04x}-{:04x}", rng.random_range(0..=0xffffu32), rng.random_range(0..=0xffffu32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_has_default_display_name() {
        let slot = SourceSlot::empty(7);
        assert_eq!(slot.display_name, "Slot 7");
        assert!(!slot.is_assigned);
        assert!(slot.assigned_ndi_source.is_empty());
    }

    #[test]
    fn route_id_format() {
        for _ in 0..64 {
            let id = generate_route_id();
            assert_eq!(id.len(), 9);
            assert_eq!(id.as_bytes()[4], b'-');
            assert!(id
                .chars()
                .enumerate()
                .all(|(i, c)| if i == 4 { c == '-' } else { c.is_ascii_hexdigit() }));
        }
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let slot = SourceSlot::empty(1);
        let json = serde_json::to_value(&slot).unwrap();
        assert!(json.get("slotNumber").is_some());
        assert!(json.get("assignedNdiSource").is_some());
        assert!(json.get("displayName").is_some());
        assert!(json.get("isAssigned").is_some());

        let dest = Destination {
            slot_number: 1,
            name: "NDI Output 1".to_string(),
            description: String::new(),
            enabled: true,
            current_source_slot: 0,
        };
        let json = serde_json::to_value(&dest).unwrap();
        assert!(json.get("currentSourceSlot").is_some());
        assert!(json.get("enabled").is_some());
    }
}
