//! Fault classification.
//!
//! Each condition is detected independently every cycle; no bit suppresses
//! another, and the same inputs always produce the same set.

use serde::{Deserialize, Serialize};

use crate::aggregator::SystemState;
use crate::tracker::NodeTracker;

/// Independently detectable system conditions. Several can hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemFault {
    NodeOffline,
    NodeOvervoltage,
    SystemOvercurrent,
    LowEfficiency,
    VoltageImbalance,
    /// Informational only; never drives a control action by itself.
    ShadingDetected,
}

impl SystemFault {
    pub const ALL: [SystemFault; 6] = [
        SystemFault::NodeOffline,
        SystemFault::NodeOvervoltage,
        SystemFault::SystemOvercurrent,
        SystemFault::LowEfficiency,
        SystemFault::VoltageImbalance,
        SystemFault::ShadingDetected,
    ];

    /// Legacy wire/report bit for this condition.
    pub const fn bit(self) -> u8 {
        match self {
            SystemFault::NodeOffline => 0x01,
            SystemFault::NodeOvervoltage => 0x02,
            SystemFault::SystemOvercurrent => 0x04,
            SystemFault::LowEfficiency => 0x08,
            SystemFault::VoltageImbalance => 0x10,
            SystemFault::ShadingDetected => 0x20,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SystemFault::NodeOffline => "OFFLINE",
            SystemFault::NodeOvervoltage => "OV",
            SystemFault::SystemOvercurrent => "OC",
            SystemFault::LowEfficiency => "LOW_EFF",
            SystemFault::VoltageImbalance => "IMBALANCE",
            SystemFault::ShadingDetected => "SHADING",
        }
    }
}

/// Set of currently active faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultSet {
    mask: u8,
}

impl FaultSet {
    pub const fn empty() -> Self {
        Self { mask: 0 }
    }

    pub fn insert(&mut self, fault: SystemFault) {
        self.mask |= fault.bit();
    }

    pub const fn contains(self, fault: SystemFault) -> bool {
        self.mask & fault.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.mask == 0
    }

    pub const fn bits(self) -> u8 {
        self.mask
    }

    pub fn len(self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = SystemFault> {
        SystemFault::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    pub fn labels(self) -> impl Iterator<Item = &'static str> {
        self.iter().map(SystemFault::label)
    }
}

impl FromIterator<SystemFault> for FaultSet {
    fn from_iter<I: IntoIterator<Item = SystemFault>>(iter: I) -> Self {
        let mut set = FaultSet::empty();
        for fault in iter {
            set.insert(fault);
        }
        set
    }
}

#[derive(Debug)]
pub struct FaultDetector {
    overvoltage_threshold: f32,
    overcurrent_threshold: f32,
    efficiency_warning: f32,
    low_efficiency_min_power: f32,
    balance_tolerance: f32,
}

impl FaultDetector {
    pub fn new(
        overvoltage_threshold: f32,
        overcurrent_threshold: f32,
        efficiency_warning: f32,
        low_efficiency_min_power: f32,
        balance_tolerance: f32,
    ) -> Self {
        Self {
            overvoltage_threshold,
            overcurrent_threshold,
            efficiency_warning,
            low_efficiency_min_power,
            balance_tolerance,
        }
    }

    /// Evaluate every condition against the current cycle's state.
    pub fn detect(&self, state: &SystemState, tracker: &NodeTracker) -> FaultSet {
        let mut faults = FaultSet::empty();

        if tracker.slots().iter().any(|s| !s.online) {
            faults.insert(SystemFault::NodeOffline);
        }

        let overvolted = tracker.online_slots().any(|s| {
            s.status
                .as_ref()
                .is_some_and(|st| st.output_voltage > self.overvoltage_threshold)
        });
        if overvolted {
            faults.insert(SystemFault::NodeOvervoltage);
        }

        if state.system_current > self.overcurrent_threshold {
            faults.insert(SystemFault::SystemOvercurrent);
        }

        // Near-zero generation makes the ratio meaningless, not a fault.
        if state.efficiency_percent < self.efficiency_warning
            && state.total_input_power > self.low_efficiency_min_power
        {
            faults.insert(SystemFault::LowEfficiency);
        }

        if tracker.output_voltage_spread() > self.balance_tolerance {
            faults.insert(SystemFault::VoltageImbalance);
        }

        if state.nodes_shaded > 0 {
            faults.insert(SystemFault::ShadingDetected);
        }

        faults
    }
}
