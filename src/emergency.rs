//! Terminal safety state machine.
//!
//! `Normal ↔ Fault` moves with the fault set (with a debounce on the way
//! back), but `EmergencyShutdown` is one-way: an all-nodes-down chain that
//! silently restarted itself is exactly the hazard this state exists to
//! prevent, so recovery requires an external restart of the master.

use serde::Serialize;

use crate::faults::FaultSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlState {
    Normal,
    Fault,
    EmergencyShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownReason {
    AllNodesDown,
    OperatorStop,
}

impl ShutdownReason {
    pub const fn label(self) -> &'static str {
        match self {
            ShutdownReason::AllNodesDown => "all nodes down",
            ShutdownReason::OperatorStop => "operator stop",
        }
    }
}

#[derive(Debug)]
pub struct EmergencyController {
    state: ControlState,
    shutdown_reason: Option<ShutdownReason>,
    /// Instant the fault set last became empty; cleared while faults persist.
    fault_clear_since: Option<u64>,
    recovery_hold_ms: u64,
}

impl EmergencyController {
    pub fn new(recovery_hold_ms: u64) -> Self {
        Self {
            state: ControlState::Normal,
            shutdown_reason: None,
            fault_clear_since: None,
            recovery_hold_ms,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn is_shutdown(&self) -> bool {
        self.state == ControlState::EmergencyShutdown
    }

    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.shutdown_reason
    }

    /// Advance the Normal/Fault side of the machine. Once shut down, the
    /// fault set is ignored entirely.
    ///
    /// Fault → Normal requires the set to stay empty for the recovery hold
    /// window: one clean cycle after a flapping node is not a recovery.
    pub fn observe_faults(&mut self, faults: FaultSet, now_ms: u64) {
        if self.state == ControlState::EmergencyShutdown {
            return;
        }

        if !faults.is_empty() {
            self.state = ControlState::Fault;
            self.fault_clear_since = None;
            return;
        }

        if self.state == ControlState::Fault {
            let since = *self.fault_clear_since.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= self.recovery_hold_ms {
                self.state = ControlState::Normal;
                self.fault_clear_since = None;
            }
        }
    }

    /// Enter the terminal state. Idempotent; the first reason wins.
    pub fn trigger_shutdown(&mut self, reason: ShutdownReason) {
        if self.state != ControlState::EmergencyShutdown {
            self.state = ControlState::EmergencyShutdown;
            self.shutdown_reason = Some(reason);
            self.fault_clear_since = None;
        }
    }
}
