//! Operator-facing status rendering.
//!
//! Pure string builders so the binaries decide where the text goes (terminal,
//! TCP feed, log file). The node table mirrors what a field tech expects to
//! see on the service console.

use std::fmt::Write as _;

use arrayvec::ArrayString;

use crate::aggregator::SystemState;
use crate::config::MasterConfig;
use crate::emergency::ControlState;
use crate::faults::FaultSet;
use crate::tracker::NodeTracker;

const RULE: &str = "═══════════════════════════════════════════════════════════";

pub fn render_system_status(
    state: &SystemState,
    faults: FaultSet,
    setpoint: f32,
    control: ControlState,
    config: &MasterConfig,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "           MASTER CONTROLLER - SYSTEM STATUS");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Nodes Online: {}/{}",
        state.nodes_online, config.node_count
    );
    let _ = writeln!(
        out,
        "System Voltage: {:.2}V (Target: {:.1}V)",
        state.system_voltage, config.target_system_voltage
    );
    let _ = writeln!(
        out,
        "System Current: {:.2}A (Max: {:.1}A)",
        state.system_current, config.overcurrent_threshold
    );
    let _ = writeln!(
        out,
        "Input Power: {:.1}W | Output Power: {:.1}W | Efficiency: {:.1}%",
        state.total_input_power, state.total_output_power, state.efficiency_percent
    );
    let _ = writeln!(
        out,
        "Voltage Setpoint: {:.2}V/node | Shaded: {} node(s)",
        setpoint, state.nodes_shaded
    );

    let _ = write!(out, "Status: ");
    match control {
        ControlState::EmergencyShutdown => {
            let _ = writeln!(out, "EMERGENCY SHUTDOWN");
        }
        _ if faults.is_empty() => {
            let _ = writeln!(out, "NORMAL");
        }
        _ => {
            let _ = write!(out, "FAULT [");
            for label in faults.labels() {
                let _ = write!(out, "{label} ");
            }
            let _ = writeln!(out, "]");
        }
    }
    let _ = writeln!(out, "{RULE}");

    out
}

pub fn render_node_table(tracker: &NodeTracker) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Node Details:");
    let _ = writeln!(
        out,
        "┌─────┬───────────┬────────┬─────────┬────────┬────────┬──────────┐"
    );
    let _ = writeln!(
        out,
        "│Node │ Input V/A │ Out V  │ Out P   │ Duty%  │ Eff%   │ Status   │"
    );
    let _ = writeln!(
        out,
        "├─────┼───────────┼────────┼─────────┼────────┼────────┼──────────┤"
    );

    for slot in tracker.slots() {
        let mut row: ArrayString<160> = ArrayString::new();
        match (&slot.status, slot.online) {
            (Some(status), true) => {
                let _ = write!(
                    row,
                    "│ {:<3} │ {:>4.1}/{:<4.1} │ {:>6.2} │ {:>6.1}W │ {:>5.1}% │ {:>5.1}% │ {:<8} │",
                    slot.node_id,
                    status.input_voltage,
                    status.input_current,
                    status.output_voltage,
                    status.output_power,
                    status.duty_cycle_percent,
                    status.efficiency,
                    slot.last_status.label(),
                );
            }
            _ => {
                let _ = write!(
                    row,
                    "│ {:<3} │  OFFLINE  │        │         │        │        │ OFFLINE  │",
                    slot.node_id,
                );
            }
        }
        let _ = writeln!(out, "{row}");
    }

    let _ = writeln!(
        out,
        "└─────┴───────────┴────────┴─────────┴────────┴────────┴──────────┘"
    );
    out
}
