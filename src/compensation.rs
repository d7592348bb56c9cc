//! Failure compensation: redistribute the chain voltage target across the
//! nodes that are still producing.
//!
//! A node can be online (answering polls) while delivering nothing: a broken
//! panel, a shorted string, an open circuit. Those count as failed here even
//! though the liveness tracker still shows them green.

use serde::Serialize;

use crate::tracker::{NodeSlot, NodeTracker};

/// Why a node was classified as non-productive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureCause {
    /// Not heard from within the liveness window.
    Offline,
    /// Input power below the minimum-power floor.
    NoPower,
    /// Input voltage below the collapse floor (panel broken or shorted).
    VoltageCollapse,
    /// Input current below the collapse floor (open circuit).
    OpenCircuit,
}

impl FailureCause {
    pub const fn label(self) -> &'static str {
        match self {
            FailureCause::Offline => "OFFLINE (no response)",
            FailureCause::NoPower => "FAULTY (no power)",
            FailureCause::VoltageCollapse => "FAULTY (voltage collapsed)",
            FailureCause::OpenCircuit => "FAULTY (open circuit)",
        }
    }
}

/// What the master should do this cycle about node failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompensationOutcome {
    /// Every node is producing; leave the optimizer in charge.
    Nominal,
    /// Enough survivors: command the redistributed per-node setpoint now,
    /// without waiting for the scheduled broadcast.
    Redistributed {
        working: u8,
        faulty: u8,
        setpoint: f32,
    },
    /// One survivor cannot reach the system target. Keep commanding the full
    /// target rather than silently degrading, and surface the shortfall.
    SingleSurvivor { node_id: u8, setpoint: f32 },
    /// Nothing left to redistribute across.
    AllNodesDown,
}

#[derive(Debug)]
pub struct CompensationEngine {
    target_system_voltage: f32,
    min_power_floor: f32,
    voltage_collapse_floor: f32,
    current_collapse_floor: f32,
    max_compensation_voltage: f32,
    min_nodes_for_compensation: u8,
}

impl CompensationEngine {
    pub fn new(
        target_system_voltage: f32,
        min_power_floor: f32,
        voltage_collapse_floor: f32,
        current_collapse_floor: f32,
        max_compensation_voltage: f32,
        min_nodes_for_compensation: u8,
    ) -> Self {
        Self {
            target_system_voltage,
            min_power_floor,
            voltage_collapse_floor,
            current_collapse_floor,
            max_compensation_voltage,
            min_nodes_for_compensation,
        }
    }

    /// Classify one node. `None` means the node is working.
    pub fn classify(&self, slot: &NodeSlot) -> Option<FailureCause> {
        if !slot.online {
            return Some(FailureCause::Offline);
        }
        let Some(status) = &slot.status else {
            return Some(FailureCause::Offline);
        };
        if status.input_power < self.min_power_floor {
            return Some(FailureCause::NoPower);
        }
        if status.input_voltage < self.voltage_collapse_floor {
            return Some(FailureCause::VoltageCollapse);
        }
        if status.input_current < self.current_collapse_floor {
            return Some(FailureCause::OpenCircuit);
        }
        None
    }

    /// Count survivors and decide the compensation action.
    pub fn evaluate(&self, tracker: &NodeTracker) -> CompensationOutcome {
        let mut working = 0u8;
        let mut faulty = 0u8;
        let mut last_working_id = 0u8;

        for slot in tracker.slots() {
            if self.classify(slot).is_none() {
                working += 1;
                last_working_id = slot.node_id;
            } else {
                faulty += 1;
            }
        }

        if faulty == 0 {
            return CompensationOutcome::Nominal;
        }

        if working >= self.min_nodes_for_compensation {
            let setpoint = (self.target_system_voltage / f32::from(working))
                .min(self.max_compensation_voltage);
            CompensationOutcome::Redistributed {
                working,
                faulty,
                setpoint,
            }
        } else if working == 1 {
            CompensationOutcome::SingleSurvivor {
                node_id: last_working_id,
                setpoint: self.target_system_voltage,
            }
        } else {
            CompensationOutcome::AllNodesDown
        }
    }
}
