//! Binary wire frames exchanged with converter nodes.
//!
//! The transport is an unreliable one-to-many wireless channel, so both frame
//! types are fixed-layout little-endian structs: no framing negotiation, no
//! acknowledgment, and a frame either parses completely or is discarded.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use thiserror::Error;

/// Destination id that addresses every node at once.
pub const BROADCAST_NODE_ID: u8 = 0xFF;

/// Wire size of a node status frame.
pub const STATUS_FRAME_LEN: usize = 38;
/// Wire size of a master command frame.
pub const COMMAND_FRAME_LEN: usize = 10;

// Layout: id(1) + 8 floats(32) + status(1) + timestamp(4)
const_assert_eq!(STATUS_FRAME_LEN, 1 + 8 * 4 + 1 + 4);
// Layout: id(1) + 2 floats(8) + command(1)
const_assert_eq!(COMMAND_FRAME_LEN, 1 + 2 * 4 + 1);

/// Condition a node reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatusCode {
    Normal,
    Shading,
    Overvoltage,
    Overcurrent,
    /// Severe degradation, node still responding.
    SoftFault,
    /// Complete failure, typically assigned by the master on collapse.
    HardFault,
}

impl NodeStatusCode {
    pub const fn as_u8(self) -> u8 {
        match self {
            NodeStatusCode::Normal => 0,
            NodeStatusCode::Shading => 1,
            NodeStatusCode::Overvoltage => 2,
            NodeStatusCode::Overcurrent => 3,
            NodeStatusCode::SoftFault => 254,
            NodeStatusCode::HardFault => 255,
        }
    }

    pub fn from_u8(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(NodeStatusCode::Normal),
            1 => Ok(NodeStatusCode::Shading),
            2 => Ok(NodeStatusCode::Overvoltage),
            3 => Ok(NodeStatusCode::Overcurrent),
            254 => Ok(NodeStatusCode::SoftFault),
            255 => Ok(NodeStatusCode::HardFault),
            other => Err(ProtocolError::InvalidStatusCode(other)),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            NodeStatusCode::Normal => "NORMAL",
            NodeStatusCode::Shading => "SHADE",
            NodeStatusCode::Overvoltage => "OVERVOLT",
            NodeStatusCode::Overcurrent => "OVERCUR",
            NodeStatusCode::SoftFault => "SOFT_FLT",
            NodeStatusCode::HardFault => "HARD_FLT",
        }
    }
}

/// Operating command carried in a [`MasterCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandCode {
    Run,
    Shutdown,
    Reset,
}

impl CommandCode {
    pub const fn as_u8(self) -> u8 {
        match self {
            CommandCode::Run => 0,
            CommandCode::Shutdown => 1,
            CommandCode::Reset => 2,
        }
    }

    pub fn from_u8(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(CommandCode::Run),
            1 => Ok(CommandCode::Shutdown),
            2 => Ok(CommandCode::Reset),
            other => Err(ProtocolError::InvalidCommandCode(other)),
        }
    }
}

/// Telemetry snapshot a node broadcasts about itself.
///
/// `timestamp` is node-local milliseconds and is used by the master to drop
/// reordered or duplicated deliveries; it is never compared across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: u8,
    pub input_voltage: f32,
    pub input_current: f32,
    pub input_power: f32,
    pub output_voltage: f32,
    pub output_current: f32,
    pub output_power: f32,
    pub duty_cycle_percent: f32,
    pub efficiency: f32,
    pub status: NodeStatusCode,
    pub timestamp: u32,
}

impl NodeStatus {
    pub fn encode(&self) -> [u8; STATUS_FRAME_LEN] {
        let mut frame = [0u8; STATUS_FRAME_LEN];
        frame[0] = self.node_id;
        frame[1..5].copy_from_slice(&self.input_voltage.to_le_bytes());
        frame[5..9].copy_from_slice(&self.input_current.to_le_bytes());
        frame[9..13].copy_from_slice(&self.input_power.to_le_bytes());
        frame[13..17].copy_from_slice(&self.output_voltage.to_le_bytes());
        frame[17..21].copy_from_slice(&self.output_current.to_le_bytes());
        frame[21..25].copy_from_slice(&self.output_power.to_le_bytes());
        frame[25..29].copy_from_slice(&self.duty_cycle_percent.to_le_bytes());
        frame[29..33].copy_from_slice(&self.efficiency.to_le_bytes());
        frame[33] = self.status.as_u8();
        frame[34..38].copy_from_slice(&self.timestamp.to_le_bytes());
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() != STATUS_FRAME_LEN {
            return Err(ProtocolError::FrameLength {
                expected: STATUS_FRAME_LEN,
                actual: frame.len(),
            });
        }
        Ok(Self {
            node_id: frame[0],
            input_voltage: read_f32(frame, 1),
            input_current: read_f32(frame, 5),
            input_power: read_f32(frame, 9),
            output_voltage: read_f32(frame, 13),
            output_current: read_f32(frame, 17),
            output_power: read_f32(frame, 21),
            duty_cycle_percent: read_f32(frame, 25),
            efficiency: read_f32(frame, 29),
            status: NodeStatusCode::from_u8(frame[33])?,
            timestamp: u32::from_le_bytes([frame[34], frame[35], frame[36], frame[37]]),
        })
    }
}

/// Setpoint broadcast from the master to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterCommand {
    /// `0xFF` for broadcast, otherwise a specific node id.
    pub node_id: u8,
    /// Commanded output voltage per node.
    pub target_voltage: f32,
    /// Current limit the node must enforce.
    pub max_current: f32,
    pub command: CommandCode,
}

impl MasterCommand {
    pub fn broadcast(target_voltage: f32, max_current: f32, command: CommandCode) -> Self {
        Self {
            node_id: BROADCAST_NODE_ID,
            target_voltage,
            max_current,
            command,
        }
    }

    pub fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        let mut frame = [0u8; COMMAND_FRAME_LEN];
        frame[0] = self.node_id;
        frame[1..5].copy_from_slice(&self.target_voltage.to_le_bytes());
        frame[5..9].copy_from_slice(&self.max_current.to_le_bytes());
        frame[9] = self.command.as_u8();
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() != COMMAND_FRAME_LEN {
            return Err(ProtocolError::FrameLength {
                expected: COMMAND_FRAME_LEN,
                actual: frame.len(),
            });
        }
        Ok(Self {
            node_id: frame[0],
            target_voltage: read_f32(frame, 1),
            max_current: read_f32(frame, 5),
            command: CommandCode::from_u8(frame[9])?,
        })
    }
}

fn read_f32(frame: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame length {actual}, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
    #[error("unknown node status code {0}")]
    InvalidStatusCode(u8),
    #[error("unknown command code {0}")]
    InvalidCommandCode(u8),
    #[error("node id {0} outside the configured chain")]
    InvalidNodeId(u8),
}
