//! Shared setpoint optimization.
//!
//! The master cannot observe each node's MPPT response directly, only the next
//! status report, so optimization is a greedy hill-climb with bounded,
//! reversible steps. Rules are an explicit ordered list evaluated top to
//! bottom; the first whose guard holds decides the cycle and nothing below it
//! runs.

use serde::Serialize;

use crate::aggregator::SystemState;

/// Which rule decided a cycle. Exposed so priority order is testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleKind {
    /// Fewer than two nodes online: not enough data to move safely.
    Hold,
    /// Imbalance above tolerance: back off at half speed while nodes re-converge.
    BalanceCorrect,
    /// Efficiency below the warning line: back off one full step.
    EfficiencyBackoff,
    /// Room below the ceiling: probe upward one step.
    RampUp,
    /// Target above the ceiling: step back down.
    RampDown,
    /// Inside the headroom band: leave the setpoint alone.
    Steady,
}

/// Inputs for one optimization pass.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerInput {
    pub state: SystemState,
    /// Max minus min online node output voltage.
    pub voltage_spread: f32,
    /// Per-node setpoint going into this cycle.
    pub setpoint: f32,
}

/// Outcome of one optimization pass. The setpoint is already clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerDecision {
    pub rule: RuleKind,
    pub setpoint: f32,
}

struct Rule {
    guard: fn(&VoltageOptimizer, &OptimizerInput) -> bool,
    apply: fn(&VoltageOptimizer, &OptimizerInput) -> (RuleKind, f32),
}

/// Priority order is the array order. See each rule's guard for the trigger.
const RULES: [Rule; 4] = [
    Rule {
        guard: |opt, input| input.state.nodes_online < opt.min_nodes_to_optimize,
        apply: |_, input| (RuleKind::Hold, input.setpoint),
    },
    Rule {
        guard: |opt, input| input.voltage_spread > opt.balance_tolerance,
        apply: |opt, input| (RuleKind::BalanceCorrect, input.setpoint - opt.ramp_step * 0.5),
    },
    Rule {
        guard: |opt, input| input.state.efficiency_percent < opt.efficiency_warning,
        apply: |opt, input| (RuleKind::EfficiencyBackoff, input.setpoint - opt.ramp_step),
    },
    Rule {
        guard: |_, _| true,
        apply: |opt, input| {
            let system_target = input.setpoint * f32::from(opt.node_count);
            if system_target < opt.max_system_voltage - opt.ramp_headroom {
                (RuleKind::RampUp, input.setpoint + opt.ramp_step)
            } else if system_target > opt.max_system_voltage {
                (RuleKind::RampDown, input.setpoint - opt.ramp_step)
            } else {
                (RuleKind::Steady, input.setpoint)
            }
        },
    },
];

#[derive(Debug)]
pub struct VoltageOptimizer {
    node_count: u8,
    min_nodes_to_optimize: u8,
    ramp_step: f32,
    ramp_headroom: f32,
    balance_tolerance: f32,
    efficiency_warning: f32,
    min_system_voltage: f32,
    max_system_voltage: f32,
}

impl VoltageOptimizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_count: u8,
        ramp_step: f32,
        ramp_headroom: f32,
        balance_tolerance: f32,
        efficiency_warning: f32,
        min_system_voltage: f32,
        max_system_voltage: f32,
    ) -> Self {
        Self {
            node_count,
            min_nodes_to_optimize: 2,
            ramp_step,
            ramp_headroom,
            balance_tolerance,
            efficiency_warning,
            min_system_voltage,
            max_system_voltage,
        }
    }

    /// Run one pass of the rule list and clamp the result into the per-node
    /// safe band. The clamp applies to every rule, including Hold, so the
    /// returned setpoint is in bounds regardless of input.
    pub fn evaluate(&self, input: &OptimizerInput) -> OptimizerDecision {
        for rule in &RULES {
            if (rule.guard)(self, input) {
                let (kind, setpoint) = (rule.apply)(self, input);
                return OptimizerDecision {
                    rule: kind,
                    setpoint: self.clamp(setpoint),
                };
            }
        }
        // The ramp rule's guard is unconditional.
        unreachable!("rule list always matches");
    }

    fn clamp(&self, setpoint: f32) -> f32 {
        let n = f32::from(self.node_count);
        setpoint.clamp(self.min_system_voltage / n, self.max_system_voltage / n)
    }
}
