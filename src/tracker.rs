//! Per-node liveness and bookkeeping.
//!
//! One [`NodeSlot`] exists per configured node for the whole process lifetime.
//! Absence is represented by the `online` flag, never by removing an entry,
//! and "offline" is orthogonal to "faulty": a node can answer every poll while
//! reporting a hard fault.

use heapless::Vec;
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{NodeStatus, NodeStatusCode};

/// Upper bound on chain length the tracker can hold.
pub const MAX_NODES: usize = 16;

#[derive(Debug, Clone, Serialize)]
pub struct NodeSlot {
    pub node_id: u8,
    /// Latest accepted telemetry; `None` until the node is first heard from.
    pub status: Option<NodeStatus>,
    /// Master-local wall clock of the last accepted frame, in milliseconds.
    pub last_update_ms: u64,
    pub online: bool,
    /// Setpoint most recently assigned to this node.
    pub voltage_setpoint: f32,
    /// Cycles in a row this node has missed its liveness window.
    pub consecutive_errors: u16,
    pub last_status: NodeStatusCode,
    /// Frames rejected because their node-local timestamp went backwards.
    pub stale_drops: u32,
    last_node_timestamp: u32,
}

impl NodeSlot {
    fn new(node_id: u8, voltage_setpoint: f32) -> Self {
        Self {
            node_id,
            status: None,
            last_update_ms: 0,
            online: false,
            voltage_setpoint,
            consecutive_errors: 0,
            last_status: NodeStatusCode::Normal,
            stale_drops: 0,
            last_node_timestamp: 0,
        }
    }
}

#[derive(Debug)]
pub struct NodeTracker {
    slots: Vec<NodeSlot, MAX_NODES>,
    any_status_received: bool,
}

impl NodeTracker {
    /// Build a tracker for node ids `1..=node_count`, all starting offline
    /// with the given initial setpoint.
    pub fn new(node_count: u8, initial_setpoint: f32) -> Self {
        let mut slots = Vec::new();
        for id in 1..=node_count {
            // Capacity is validated against MAX_NODES by MasterConfig.
            let _ = slots.push(NodeSlot::new(id, initial_setpoint));
        }
        Self {
            slots,
            any_status_received: false,
        }
    }

    /// Accept a status frame from the reception path.
    ///
    /// Rejects ids outside the chain and frames whose node-local timestamp is
    /// older than the last accepted one: the wireless transport can reorder
    /// or duplicate deliveries, and stale telemetry must not overwrite fresh.
    /// An equal timestamp is accepted so a duplicated frame stays harmless.
    pub fn record_status(&mut self, status: NodeStatus, now_ms: u64) -> Result<(), TrackerError> {
        let slot = self
            .slot_mut(status.node_id)
            .ok_or(TrackerError::UnknownNode(status.node_id))?;

        if status.timestamp < slot.last_node_timestamp {
            slot.stale_drops = slot.stale_drops.saturating_add(1);
            return Err(TrackerError::StaleFrame {
                node_id: status.node_id,
                frame_ts: status.timestamp,
                last_ts: slot.last_node_timestamp,
            });
        }

        slot.last_node_timestamp = status.timestamp;
        slot.last_status = status.status;
        slot.status = Some(status);
        slot.last_update_ms = now_ms;
        slot.online = true;
        slot.consecutive_errors = 0;
        self.any_status_received = true;
        Ok(())
    }

    /// Re-evaluate every node's online flag against the liveness timeout.
    /// Run once per control cycle so a silent node is excluded from the very
    /// next aggregation pass.
    pub fn refresh_liveness(&mut self, now_ms: u64, timeout_ms: u64) {
        for slot in &mut self.slots {
            let alive = slot.status.is_some()
                && now_ms.saturating_sub(slot.last_update_ms) < timeout_ms;
            if alive {
                slot.online = true;
            } else {
                slot.online = false;
                slot.consecutive_errors = slot.consecutive_errors.saturating_add(1);
            }
        }
    }

    /// Record the setpoint the master just commanded for every node.
    pub fn assign_setpoint(&mut self, setpoint: f32) {
        for slot in &mut self.slots {
            slot.voltage_setpoint = setpoint;
        }
    }

    /// Flag a node whose panel has collapsed, mirroring what the node itself
    /// would report if its own supervisor were still powered.
    pub fn mark_hard_fault(&mut self, node_id: u8) {
        if let Some(slot) = self.slot_mut(node_id) {
            slot.last_status = NodeStatusCode::HardFault;
        }
    }

    pub fn slot(&self, node_id: u8) -> Option<&NodeSlot> {
        self.slots.iter().find(|s| s.node_id == node_id)
    }

    fn slot_mut(&mut self, node_id: u8) -> Option<&mut NodeSlot> {
        self.slots.iter_mut().find(|s| s.node_id == node_id)
    }

    pub fn slots(&self) -> &[NodeSlot] {
        &self.slots
    }

    pub fn online_slots(&self) -> impl Iterator<Item = &NodeSlot> {
        self.slots.iter().filter(|s| s.online)
    }

    pub fn online_count(&self) -> u8 {
        self.online_slots().count() as u8
    }

    pub fn node_count(&self) -> u8 {
        self.slots.len() as u8
    }

    /// True once any node has ever been heard from. Compensation and the
    /// all-nodes-down trip are held off until then, so a freshly booted
    /// master does not treat a still-silent chain as a mass failure.
    pub fn any_status_received(&self) -> bool {
        self.any_status_received
    }

    /// Max minus min output voltage across online nodes; zero when fewer
    /// than two nodes are online.
    pub fn output_voltage_spread(&self) -> f32 {
        let mut min_v = f32::INFINITY;
        let mut max_v = f32::NEG_INFINITY;
        let mut seen = 0u8;
        for slot in self.online_slots() {
            if let Some(status) = &slot.status {
                min_v = min_v.min(status.output_voltage);
                max_v = max_v.max(status.output_voltage);
                seen += 1;
            }
        }
        if seen < 2 {
            0.0
        } else {
            max_v - min_v
        }
    }

    /// Total stale-frame drops across the chain, for the operator report.
    pub fn total_stale_drops(&self) -> u32 {
        self.slots.iter().map(|s| s.stale_drops).sum()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    #[error("status from unknown node id {0}")]
    UnknownNode(u8),
    #[error("stale frame from node {node_id}: ts {frame_ts} behind {last_ts}")]
    StaleFrame {
        node_id: u8,
        frame_ts: u32,
        last_ts: u32,
    },
}
