//! Main orchestrator: owns every component and drives the cooperative
//! polling loop.
//!
//! The reception path and the control path share nothing but a bounded SPSC
//! queue: the transport callback enqueues validated status frames, and the
//! control cycle drains them at its own cadence. A frame is therefore either
//! fully visible to an optimization pass or not yet visible, never torn.

use heapless::spsc::Queue;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::aggregator::{StatusAggregator, SystemState};
use crate::broadcaster::{CommandBroadcaster, CommandSink};
use crate::compensation::{CompensationEngine, CompensationOutcome, FailureCause};
use crate::config::{ConfigError, MasterConfig};
use crate::emergency::{ControlState, EmergencyController, ShutdownReason};
use crate::faults::{FaultDetector, FaultSet, SystemFault};
use crate::optimizer::{OptimizerInput, RuleKind, VoltageOptimizer};
use crate::protocol::{CommandCode, NodeStatus, ProtocolError};
use crate::report;
use crate::tracker::{NodeTracker, TrackerError};

const INGRESS_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MasterStats {
    pub statuses_accepted: u32,
    pub stale_drops: u32,
    pub unknown_node_drops: u32,
    pub ingress_overflows: u32,
    pub compensation_events: u32,
    pub optimize_cycles: u32,
}

pub struct MasterController {
    config: MasterConfig,
    tracker: NodeTracker,
    aggregator: StatusAggregator,
    detector: FaultDetector,
    optimizer: VoltageOptimizer,
    compensation: CompensationEngine,
    emergency: EmergencyController,
    broadcaster: CommandBroadcaster,

    ingress: Queue<NodeStatus, INGRESS_QUEUE_DEPTH>,

    state: SystemState,
    faults: FaultSet,
    setpoint: f32,
    last_rule: Option<RuleKind>,
    stats: MasterStats,

    last_optimize_ms: Option<u64>,
    last_report_ms: Option<u64>,
}

impl MasterController {
    pub fn new(config: MasterConfig) -> Result<Self, MasterError> {
        config.validate()?;

        let setpoint = config.target_node_voltage();
        let tracker = NodeTracker::new(config.node_count, setpoint);
        let aggregator = StatusAggregator::new(config.power_noise_floor);
        let detector = FaultDetector::new(
            config.overvoltage_threshold,
            config.overcurrent_threshold,
            config.efficiency_warning,
            config.low_efficiency_min_power,
            config.balance_tolerance,
        );
        let optimizer = VoltageOptimizer::new(
            config.node_count,
            config.ramp_step,
            config.ramp_headroom,
            config.balance_tolerance,
            config.efficiency_warning,
            config.min_system_voltage,
            config.max_system_voltage,
        );
        let compensation = CompensationEngine::new(
            config.target_system_voltage,
            config.min_power_floor,
            config.voltage_collapse_floor,
            config.current_collapse_floor,
            config.max_compensation_voltage,
            config.min_nodes_for_compensation,
        );
        let emergency = EmergencyController::new(config.fault_recovery_hold_ms);
        let broadcaster =
            CommandBroadcaster::new(config.broadcast_interval_ms, config.overcurrent_threshold);

        Ok(Self {
            config,
            tracker,
            aggregator,
            detector,
            optimizer,
            compensation,
            emergency,
            broadcaster,
            ingress: Queue::new(),
            state: SystemState::default(),
            faults: FaultSet::empty(),
            setpoint,
            last_rule: None,
            stats: MasterStats::default(),
            last_optimize_ms: None,
            last_report_ms: None,
        })
    }

    /// Ingress entry point for the reception path. Cheap and lock-free; the
    /// heavy lifting happens when the control cycle drains the queue.
    pub fn submit_status(&mut self, status: NodeStatus) -> Result<(), MasterError> {
        if status.node_id == 0 || status.node_id > self.config.node_count {
            self.stats.unknown_node_drops = self.stats.unknown_node_drops.saturating_add(1);
            return Err(MasterError::Protocol(ProtocolError::InvalidNodeId(
                status.node_id,
            )));
        }
        self.ingress.enqueue(status).map_err(|_| {
            self.stats.ingress_overflows = self.stats.ingress_overflows.saturating_add(1);
            MasterError::IngressOverflow
        })
    }

    /// Decode a raw status frame and enqueue it.
    pub fn submit_frame(&mut self, frame: &[u8]) -> Result<(), MasterError> {
        let status = NodeStatus::decode(frame)?;
        self.submit_status(status)
    }

    /// One pass of the cooperative polling loop. `now_ms` is the master-local
    /// wall clock; each periodic task compares elapsed time against its own
    /// interval, so tasks never block each other.
    pub fn update(&mut self, now_ms: u64, sink: &mut dyn CommandSink) -> Result<(), MasterError> {
        self.drain_ingress(now_ms);

        if self.emergency.is_shutdown() {
            // Terminal: keep repeating the shutdown command, nothing else.
            if self.broadcaster.due(now_ms) {
                self.broadcaster
                    .broadcast(sink, 0.0, CommandCode::Shutdown, now_ms);
            }
            self.report_if_due(now_ms);
            return Ok(());
        }

        if self.optimize_due(now_ms) {
            self.run_control_cycle(now_ms, sink);
            self.last_optimize_ms = Some(now_ms);
        }

        // The control cycle can end in shutdown; re-check before the
        // periodic broadcast so a Run command never follows the Shutdown.
        if !self.emergency.is_shutdown() && self.broadcaster.due(now_ms) {
            self.broadcaster
                .broadcast(sink, self.setpoint, CommandCode::Run, now_ms);
            self.tracker.assign_setpoint(self.setpoint);
        }

        self.report_if_due(now_ms);
        Ok(())
    }

    /// External emergency stop (operator control). Terminal like any other
    /// path into shutdown.
    pub fn emergency_stop(&mut self, sink: &mut dyn CommandSink) {
        self.enter_shutdown(ShutdownReason::OperatorStop, sink);
    }

    pub fn system_state(&self) -> SystemState {
        self.state
    }

    pub fn active_faults(&self) -> FaultSet {
        self.faults
    }

    pub fn control_state(&self) -> ControlState {
        self.emergency.state()
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn last_optimizer_rule(&self) -> Option<RuleKind> {
        self.last_rule
    }

    pub fn tracker(&self) -> &NodeTracker {
        &self.tracker
    }

    pub fn stats(&self) -> MasterStats {
        self.stats
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Render the operator status report for external consumers.
    pub fn render_report(&self) -> String {
        report::render_system_status(
            &self.state,
            self.faults,
            self.setpoint,
            self.emergency.state(),
            &self.config,
        )
    }

    fn drain_ingress(&mut self, now_ms: u64) {
        while let Some(status) = self.ingress.dequeue() {
            match self.tracker.record_status(status, now_ms) {
                Ok(()) => {
                    self.stats.statuses_accepted = self.stats.statuses_accepted.saturating_add(1);
                }
                Err(TrackerError::StaleFrame {
                    node_id,
                    frame_ts,
                    last_ts,
                }) => {
                    self.stats.stale_drops = self.stats.stale_drops.saturating_add(1);
                    debug!(node_id, frame_ts, last_ts, "dropped stale status frame");
                }
                Err(TrackerError::UnknownNode(node_id)) => {
                    self.stats.unknown_node_drops =
                        self.stats.unknown_node_drops.saturating_add(1);
                    debug!(node_id, "dropped status from unknown node");
                }
            }
        }
    }

    fn optimize_due(&self, now_ms: u64) -> bool {
        match self.last_optimize_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.optimize_interval_ms,
        }
    }

    /// Aggregate → detect → optimize → compensate → state machine, in the
    /// order the data flows.
    fn run_control_cycle(&mut self, now_ms: u64, sink: &mut dyn CommandSink) {
        self.stats.optimize_cycles = self.stats.optimize_cycles.saturating_add(1);

        self.tracker
            .refresh_liveness(now_ms, self.config.liveness_timeout_ms);
        self.state = self.aggregator.aggregate(&self.tracker);
        self.faults = self.detector.detect(&self.state, &self.tracker);

        let decision = self.optimizer.evaluate(&OptimizerInput {
            state: self.state,
            voltage_spread: self.tracker.output_voltage_spread(),
            setpoint: self.setpoint,
        });
        trace!(rule = ?decision.rule, setpoint = decision.setpoint, "optimizer decision");
        self.last_rule = Some(decision.rule);
        self.setpoint = decision.setpoint;

        self.react_to_faults();
        self.run_compensation(sink);

        self.emergency.observe_faults(self.faults, now_ms);
    }

    /// Per-bit fault reactions, additive on top of the optimizer's decision.
    fn react_to_faults(&mut self) {
        let faults = self.faults;
        if faults.is_empty() {
            return;
        }

        if faults.contains(SystemFault::NodeOvervoltage) {
            warn!(setpoint = self.setpoint, "node overvoltage, stepping down hard");
            self.setpoint -= self.config.ramp_step * 2.0;
        }
        if faults.contains(SystemFault::SystemOvercurrent) {
            warn!(
                current = self.state.system_current,
                "system overcurrent, stepping down"
            );
            self.setpoint -= self.config.ramp_step;
        }
        if faults.contains(SystemFault::VoltageImbalance) {
            warn!(
                spread = self.tracker.output_voltage_spread(),
                "voltage imbalance across chain"
            );
        }
        if faults.contains(SystemFault::ShadingDetected) {
            info!(shaded = self.state.nodes_shaded, "shading detected on chain");
        }
        if faults.contains(SystemFault::NodeOffline) {
            warn!(online = self.state.nodes_online, "one or more nodes offline");
        }

        self.setpoint = self.config.clamp_node_voltage(self.setpoint);
    }

    fn run_compensation(&mut self, sink: &mut dyn CommandSink) {
        // Hold off until the chain has spoken at least once, so a freshly
        // booted master does not mistake a still-silent chain for a mass
        // failure.
        if !self.tracker.any_status_received() {
            return;
        }

        match self.compensation.evaluate(&self.tracker) {
            CompensationOutcome::Nominal => {}
            CompensationOutcome::Redistributed {
                working,
                faulty,
                setpoint,
            } => {
                self.mark_collapsed_nodes();
                self.log_failure_analysis();
                warn!(
                    working,
                    faulty,
                    setpoint,
                    target = self.config.target_system_voltage,
                    "node failure: redistributing voltage target across survivors"
                );
                self.setpoint = setpoint;
                self.tracker.assign_setpoint(setpoint);
                self.stats.compensation_events =
                    self.stats.compensation_events.saturating_add(1);
                // Latency here decides whether the battery keeps charging, so
                // this does not wait for the scheduled broadcast.
                self.broadcaster
                    .broadcast_immediate(sink, setpoint, CommandCode::Run);
            }
            CompensationOutcome::SingleSurvivor { node_id, setpoint } => {
                self.mark_collapsed_nodes();
                self.log_failure_analysis();
                error!(
                    node_id,
                    target = self.config.target_system_voltage,
                    "CRITICAL: single node left, system target unreachable; \
                     holding full target as best effort"
                );
                self.setpoint = setpoint;
                self.tracker.assign_setpoint(setpoint);
            }
            CompensationOutcome::AllNodesDown => {
                self.log_failure_analysis();
                self.enter_shutdown(ShutdownReason::AllNodesDown, sink);
            }
        }
    }

    /// Nodes that collapsed by power/voltage/current floors get their tracked
    /// status forced to hard-fault, mirroring what a live node supervisor
    /// would have reported.
    fn mark_collapsed_nodes(&mut self) {
        let mut collapsed = [0u8; crate::tracker::MAX_NODES];
        let mut count = 0usize;
        for slot in self.tracker.slots() {
            match self.compensation.classify(slot) {
                Some(FailureCause::Offline) | None => {}
                Some(_) => {
                    collapsed[count] = slot.node_id;
                    count += 1;
                }
            }
        }
        for &node_id in &collapsed[..count] {
            self.tracker.mark_hard_fault(node_id);
        }
    }

    fn log_failure_analysis(&self) {
        for slot in self.tracker.slots() {
            match self.compensation.classify(slot) {
                None => {
                    let power = slot.status.as_ref().map_or(0.0, |s| s.input_power);
                    info!(node_id = slot.node_id, power, "node working");
                }
                Some(cause) => {
                    warn!(node_id = slot.node_id, cause = cause.label(), "node failed");
                }
            }
        }
    }

    fn enter_shutdown(&mut self, reason: ShutdownReason, sink: &mut dyn CommandSink) {
        if self.emergency.is_shutdown() {
            return;
        }
        self.emergency.trigger_shutdown(reason);
        self.setpoint = 0.0;
        self.tracker.assign_setpoint(0.0);
        error!(reason = reason.label(), "EMERGENCY SHUTDOWN: all nodes commanded off");
        self.broadcaster
            .broadcast_immediate(sink, 0.0, CommandCode::Shutdown);
    }

    fn report_if_due(&mut self, now_ms: u64) {
        let due = match self.last_report_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.report_interval_ms,
        };
        if !due {
            return;
        }
        self.last_report_ms = Some(now_ms);

        if !self.tracker.any_status_received() {
            info!("waiting for node status (check node pairing)");
            return;
        }
        info!(
            online = self.state.nodes_online,
            system_voltage = self.state.system_voltage,
            current = self.state.system_current,
            input_w = self.state.total_input_power,
            output_w = self.state.total_output_power,
            efficiency = self.state.efficiency_percent,
            setpoint = self.setpoint,
            faults = self.faults.bits(),
            state = ?self.emergency.state(),
            "system status"
        );
    }
}

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("status ingress queue full, frame dropped")]
    IngressOverflow,
}
