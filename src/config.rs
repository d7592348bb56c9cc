use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracker::MAX_NODES;

/// Master controller configuration.
///
/// Defaults mirror the reference installation: four 250 Wp panels feeding
/// series-connected buck converters into a 48 V battery bus. Every threshold
/// the control core consults lives here so a deployment can be retuned
/// without touching control logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Number of converter nodes in the series chain (ids 1..=node_count).
    pub node_count: u8,
    /// Desired total chain voltage in volts.
    pub target_system_voltage: f32,
    /// Lower safe bound for the chain voltage.
    pub min_system_voltage: f32,
    /// Upper safe bound for the chain voltage.
    pub max_system_voltage: f32,

    /// Per-cycle setpoint adjustment in volts.
    pub ramp_step: f32,
    /// Headroom kept below `max_system_voltage` before ramping stops.
    pub ramp_headroom: f32,
    /// Max allowed spread between node output voltages before balancing kicks in.
    pub balance_tolerance: f32,

    /// Per-node output voltage ceiling for fault detection.
    pub overvoltage_threshold: f32,
    /// System current ceiling; also broadcast to nodes as their current limit.
    pub overcurrent_threshold: f32,
    /// Efficiency (percent) below which the system is considered degraded.
    pub efficiency_warning: f32,
    /// Input power (watts) below which low-efficiency detection is suppressed.
    pub low_efficiency_min_power: f32,
    /// Input power (watts) below which efficiency is reported as zero.
    pub power_noise_floor: f32,

    /// Input power floor: an online node producing less is considered failed.
    pub min_power_floor: f32,
    /// Input voltage floor: below this the panel has collapsed or shorted.
    pub voltage_collapse_floor: f32,
    /// Input current floor: below this the panel circuit is open.
    pub current_collapse_floor: f32,
    /// Hardware ceiling for a compensated per-node setpoint. Compensation
    /// intentionally pushes surviving nodes past the normal per-node maximum.
    pub max_compensation_voltage: f32,
    /// Surviving-node count needed before redistribution is attempted.
    pub min_nodes_for_compensation: u8,

    /// Command broadcast period in milliseconds.
    pub broadcast_interval_ms: u64,
    /// Optimization + fault-check period in milliseconds.
    pub optimize_interval_ms: u64,
    /// Operator status report period in milliseconds.
    pub report_interval_ms: u64,
    /// Silence duration after which a node is considered offline.
    pub liveness_timeout_ms: u64,
    /// Fault-free time required before FAULT drops back to NORMAL.
    pub fault_recovery_hold_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            node_count: 4,
            target_system_voltage: 48.0,
            min_system_voltage: 36.0,
            max_system_voltage: 60.0,

            ramp_step: 0.1,
            ramp_headroom: 2.0,
            balance_tolerance: 1.0,

            overvoltage_threshold: 14.0,
            overcurrent_threshold: 35.0,
            efficiency_warning: 80.0,
            low_efficiency_min_power: 10.0,
            power_noise_floor: 0.1,

            min_power_floor: 1.0,
            voltage_collapse_floor: 5.0,
            current_collapse_floor: 0.5,
            max_compensation_voltage: 18.0,
            min_nodes_for_compensation: 2,

            broadcast_interval_ms: 2000,
            optimize_interval_ms: 2000,
            report_interval_ms: 1000,
            liveness_timeout_ms: 5000,
            fault_recovery_hold_ms: 5000,
        }
    }
}

impl MasterConfig {
    /// Nominal per-node setpoint: the system target split evenly.
    pub fn target_node_voltage(&self) -> f32 {
        self.target_system_voltage / f32::from(self.node_count)
    }

    /// Lowest per-node setpoint the optimizer may command.
    pub fn min_node_voltage(&self) -> f32 {
        self.min_system_voltage / f32::from(self.node_count)
    }

    /// Highest per-node setpoint the optimizer may command.
    pub fn max_node_voltage(&self) -> f32 {
        self.max_system_voltage / f32::from(self.node_count)
    }

    /// Clamp a per-node setpoint into the optimizer's safe band.
    pub fn clamp_node_voltage(&self, setpoint: f32) -> f32 {
        setpoint.clamp(self.min_node_voltage(), self.max_node_voltage())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 || usize::from(self.node_count) > MAX_NODES {
            return Err(ConfigError::NodeCount(self.node_count));
        }
        if self.min_system_voltage >= self.max_system_voltage {
            return Err(ConfigError::VoltageBounds {
                min: self.min_system_voltage,
                max: self.max_system_voltage,
            });
        }
        if self.target_system_voltage < self.min_system_voltage
            || self.target_system_voltage > self.max_system_voltage
        {
            return Err(ConfigError::TargetOutOfBounds(self.target_system_voltage));
        }
        if self.ramp_step <= 0.0 {
            return Err(ConfigError::RampStep(self.ramp_step));
        }
        if self.broadcast_interval_ms == 0
            || self.optimize_interval_ms == 0
            || self.liveness_timeout_ms == 0
        {
            return Err(ConfigError::ZeroInterval);
        }
        if self.min_nodes_for_compensation < 2 {
            return Err(ConfigError::CompensationFloor(self.min_nodes_for_compensation));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("node count {0} outside 1..={MAX_NODES}")]
    NodeCount(u8),
    #[error("min system voltage {min} not below max {max}")]
    VoltageBounds { min: f32, max: f32 },
    #[error("target system voltage {0} outside the safe band")]
    TargetOutOfBounds(f32),
    #[error("ramp step {0} must be positive")]
    RampStep(f32),
    #[error("timing intervals must be non-zero")]
    ZeroInterval,
    #[error("compensation requires at least 2 surviving nodes, got {0}")]
    CompensationFloor(u8),
}
