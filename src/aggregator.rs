//! System-wide totals derived from the node tracker.

use serde::Serialize;

use crate::protocol::NodeStatusCode;
use crate::tracker::NodeTracker;

/// Aggregate view of the chain, recomputed from scratch every control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemState {
    pub nodes_online: u8,
    pub nodes_shaded: u8,
    pub total_input_power: f32,
    pub total_output_power: f32,
    /// Sum of online node output voltages (series topology: voltages add).
    pub system_voltage: f32,
    /// Shared series current, taken from an online node rather than summed.
    pub system_current: f32,
    /// Output/input ratio in percent; zero below the input noise floor.
    pub efficiency_percent: f32,
}

#[derive(Debug)]
pub struct StatusAggregator {
    /// Input power below this is treated as "nothing generating" and the
    /// efficiency ratio is not reported.
    power_noise_floor: f32,
}

impl StatusAggregator {
    pub fn new(power_noise_floor: f32) -> Self {
        Self { power_noise_floor }
    }

    pub fn aggregate(&self, tracker: &NodeTracker) -> SystemState {
        let mut state = SystemState::default();

        for slot in tracker.online_slots() {
            let Some(status) = &slot.status else { continue };
            state.nodes_online += 1;
            state.total_input_power += status.input_power;
            state.total_output_power += status.output_power;
            state.system_voltage += status.output_voltage;
            // Series chain: every node carries the same current.
            state.system_current = status.output_current;
            if status.status == NodeStatusCode::Shading {
                state.nodes_shaded += 1;
            }
        }

        state.efficiency_percent = if state.total_input_power > self.power_noise_floor {
            (state.total_output_power / state.total_input_power) * 100.0
        } else {
            0.0
        };

        state
    }
}
