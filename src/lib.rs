//! # Multi-Node MPPT Master Coordination Core
//!
//! Coordination library for a series-string photovoltaic system: N independent
//! DC converter nodes (each running its own local MPPT) are wired output-in-series,
//! and this master keeps the sum of their output voltages on a system target while
//! detecting and compensating individual node failures.
//!
//! ## Features
//!
//! - **Status aggregation**: per-node telemetry summed into a system-wide view
//! - **Fault detection**: independent fault conditions, reported additively
//! - **Three-tier voltage optimization**: balance, efficiency, then bounded ramp
//! - **Failure compensation**: voltage target redistributed across surviving nodes
//! - **Terminal emergency state**: all-nodes-down or operator stop, no auto-recovery
//! - **Embedded-friendly core**: bounded queues and buffers, no unbounded growth
//!
//! ## Quick Start
//!
//! ```rust
//! use pvchain::{MasterConfig, MasterController, NullSink};
//!
//! let mut master = MasterController::new(MasterConfig::default()).unwrap();
//! let mut sink = NullSink;
//!
//! // Feed node status frames as the transport delivers them:
//! // master.submit_frame(&frame_bytes)?;
//!
//! // Drive the control cycle from the main loop:
//! master.update(0, &mut sink).unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`master`] - Main orchestrator and public API
//! - [`protocol`] - Binary status/command frames
//! - [`tracker`] - Per-node liveness and bookkeeping
//! - [`aggregator`] - System-wide totals
//! - [`faults`] - Fault classification
//! - [`optimizer`] - Setpoint optimization rules
//! - [`compensation`] - Failure compensation
//! - [`emergency`] - Terminal safety state machine
//! - [`broadcaster`] - Outbound command scheduling

#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod aggregator;
pub mod broadcaster;
pub mod compensation;
pub mod config;
pub mod emergency;
pub mod faults;
pub mod master;
pub mod optimizer;
pub mod protocol;
pub mod report;
pub mod tracker;

// Re-export main public types for convenience
pub use broadcaster::{CommandSink, NullSink};
pub use config::MasterConfig;
pub use emergency::ControlState;
pub use faults::{FaultSet, SystemFault};
pub use master::MasterController;
pub use aggregator::SystemState;
pub use protocol::{MasterCommand, NodeStatus};
