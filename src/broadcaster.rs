//! Outbound command scheduling.
//!
//! Commands are fire-and-forget: no acknowledgment is awaited and a send
//! failure is only counted, because the next periodic broadcast is the
//! implicit retry on this transport.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::protocol::{CommandCode, MasterCommand, COMMAND_FRAME_LEN};

/// Transport seam: whatever actually pushes a command frame onto the air.
pub trait CommandSink {
    fn send(&mut self, frame: &[u8; COMMAND_FRAME_LEN]) -> Result<(), SinkError>;
}

/// Sink that discards every frame. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl CommandSink for NullSink {
    fn send(&mut self, _frame: &[u8; COMMAND_FRAME_LEN]) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BroadcastStats {
    pub sent: u32,
    pub failed: u32,
}

#[derive(Debug)]
pub struct CommandBroadcaster {
    interval_ms: u64,
    max_current: f32,
    last_broadcast_ms: Option<u64>,
    stats: BroadcastStats,
}

impl CommandBroadcaster {
    pub fn new(interval_ms: u64, max_current: f32) -> Self {
        Self {
            interval_ms,
            max_current,
            last_broadcast_ms: None,
            stats: BroadcastStats::default(),
        }
    }

    /// True when the periodic broadcast window has elapsed.
    pub fn due(&self, now_ms: u64) -> bool {
        match self.last_broadcast_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Send the current setpoint to every node and restart the interval.
    pub fn broadcast(
        &mut self,
        sink: &mut dyn CommandSink,
        setpoint: f32,
        command: CommandCode,
        now_ms: u64,
    ) -> MasterCommand {
        let cmd = MasterCommand::broadcast(setpoint, self.max_current, command);
        match sink.send(&cmd.encode()) {
            Ok(()) => self.stats.sent = self.stats.sent.saturating_add(1),
            Err(e) => {
                self.stats.failed = self.stats.failed.saturating_add(1);
                warn!(error = %e, "command broadcast failed, next interval retries");
            }
        }
        self.last_broadcast_ms = Some(now_ms);
        cmd
    }

    /// Send outside the schedule without resetting it, for compensation and
    /// emergency paths where latency matters.
    pub fn broadcast_immediate(
        &mut self,
        sink: &mut dyn CommandSink,
        setpoint: f32,
        command: CommandCode,
    ) -> MasterCommand {
        let cmd = MasterCommand::broadcast(setpoint, self.max_current, command);
        match sink.send(&cmd.encode()) {
            Ok(()) => self.stats.sent = self.stats.sent.saturating_add(1),
            Err(e) => {
                self.stats.failed = self.stats.failed.saturating_add(1);
                warn!(error = %e, "immediate broadcast failed");
            }
        }
        cmd
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats
    }
}
