//! In-process chain simulator: one master plus N simulated converter nodes,
//! with a line-delimited JSON control socket for the `pvchain` CLI.
//!
//! Node behavior is deterministic (no RNG) so scripted fault scenarios are
//! reproducible: fail a node and the compensation broadcast shows up on the
//! very next control cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pvchain::broadcaster::{CommandSink, SinkError};
use pvchain::protocol::{
    CommandCode, MasterCommand, NodeStatus, NodeStatusCode, COMMAND_FRAME_LEN,
};
use pvchain::report;
use pvchain::{MasterConfig, MasterController};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, warn};

const CONTROL_PORT: u16 = 7878;
const TICK_MS: u64 = 200;

/// Commands accepted on the control socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum SimRequest {
    Status,
    Nodes,
    Faults,
    Stop,
    Fail { node: u8 },
    Restore { node: u8 },
    Shade { node: u8 },
    Unshade { node: u8 },
}

/// Sink that parks broadcast frames until the simulation tick applies them
/// to the nodes, standing in for the wireless hop.
#[derive(Debug, Default)]
struct AirGap {
    pending: Vec<MasterCommand>,
}

impl CommandSink for AirGap {
    fn send(&mut self, frame: &[u8; COMMAND_FRAME_LEN]) -> Result<(), SinkError> {
        match MasterCommand::decode(frame) {
            Ok(cmd) => {
                self.pending.push(cmd);
                Ok(())
            }
            Err(_) => Err(SinkError::Closed),
        }
    }
}

/// One simulated panel + converter.
struct SimNode {
    id: u8,
    panel_voltage: f32,
    panel_power: f32,
    commanded_voltage: f32,
    output_voltage: f32,
    shutdown: bool,
    failed: bool,
    shaded: bool,
    clock_ms: u32,
}

impl SimNode {
    fn new(id: u8, initial_setpoint: f32) -> Self {
        Self {
            id,
            panel_voltage: 35.0,
            panel_power: 250.0,
            commanded_voltage: initial_setpoint,
            output_voltage: initial_setpoint,
            shutdown: false,
            failed: false,
            shaded: false,
            clock_ms: 0,
        }
    }

    fn apply(&mut self, cmd: &MasterCommand) {
        if cmd.node_id != 0xFF && cmd.node_id != self.id {
            return;
        }
        match cmd.command {
            CommandCode::Run => {
                self.shutdown = false;
                self.commanded_voltage = cmd.target_voltage;
            }
            CommandCode::Shutdown => self.shutdown = true,
            CommandCode::Reset => {
                self.shutdown = false;
                self.clock_ms = 0;
            }
        }
    }

    fn tick(&mut self, dt_ms: u64) -> NodeStatus {
        self.clock_ms = self.clock_ms.wrapping_add(dt_ms as u32);

        // First-order approach to the commanded voltage, like a real
        // converter's control loop settling.
        let target = if self.shutdown { 0.0 } else { self.commanded_voltage };
        self.output_voltage += (target - self.output_voltage) * 0.3;

        if self.failed {
            return NodeStatus {
                node_id: self.id,
                input_voltage: 0.2,
                input_current: 0.0,
                input_power: 0.0,
                output_voltage: 0.0,
                output_current: 0.0,
                output_power: 0.0,
                duty_cycle_percent: 0.0,
                efficiency: 0.0,
                status: NodeStatusCode::HardFault,
                timestamp: self.clock_ms,
            };
        }

        let insolation = if self.shaded { 0.35 } else { 1.0 };
        let input_power = self.panel_power * insolation;
        let input_current = input_power / self.panel_voltage;
        let efficiency = 96.0;
        let output_power = input_power * efficiency / 100.0;
        let output_current = if self.output_voltage > 0.5 {
            output_power / self.output_voltage
        } else {
            0.0
        };

        NodeStatus {
            node_id: self.id,
            input_voltage: self.panel_voltage,
            input_current,
            input_power,
            output_voltage: self.output_voltage,
            output_current,
            output_power,
            duty_cycle_percent: (self.output_voltage / self.panel_voltage * 100.0).min(100.0),
            efficiency,
            status: if self.shaded {
                NodeStatusCode::Shading
            } else {
                NodeStatusCode::Normal
            },
            timestamp: self.clock_ms,
        }
    }
}

struct Simulation {
    master: MasterController,
    nodes: Vec<SimNode>,
    air: AirGap,
    epoch: Instant,
}

impl Simulation {
    fn new(config: MasterConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let setpoint = config.target_node_voltage();
        let nodes = (1..=config.node_count)
            .map(|id| SimNode::new(id, setpoint))
            .collect();
        Ok(Self {
            master: MasterController::new(config)?,
            nodes,
            air: AirGap::default(),
            epoch: Instant::now(),
        })
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn tick(&mut self) {
        let now = self.now_ms();

        for node in &mut self.nodes {
            let status = node.tick(TICK_MS);
            // A commanded-off node powers down its radio too, so the master
            // sees it drop offline rather than report zeros forever.
            if node.shutdown {
                continue;
            }
            if let Err(e) = self.master.submit_status(status) {
                warn!(node = node.id, error = %e, "status frame dropped");
            }
        }

        if let Err(e) = self.master.update(now, &mut self.air) {
            error!(error = %e, "master update failed");
        }

        for cmd in self.air.pending.drain(..) {
            for node in &mut self.nodes {
                node.apply(&cmd);
            }
        }
    }

    fn handle(&mut self, request: SimRequest) -> serde_json::Value {
        match request {
            SimRequest::Status => json!({
                "ok": true,
                "state": self.master.system_state(),
                "control": self.master.control_state(),
                "setpoint": self.master.setpoint(),
                "fault_bits": self.master.active_faults().bits(),
                "stats": self.master.stats(),
                "text": self.master.render_report(),
            }),
            SimRequest::Nodes => json!({
                "ok": true,
                "text": report::render_node_table(self.master.tracker()),
            }),
            SimRequest::Faults => json!({
                "ok": true,
                "fault_bits": self.master.active_faults().bits(),
                "faults": self.master.active_faults().labels().collect::<Vec<_>>(),
                "control": self.master.control_state(),
            }),
            SimRequest::Stop => {
                self.master.emergency_stop(&mut self.air);
                json!({ "ok": true, "control": self.master.control_state() })
            }
            SimRequest::Fail { node } => self.set_node(node, |n| n.failed = true),
            SimRequest::Restore { node } => self.set_node(node, |n| {
                n.failed = false;
                n.shaded = false;
            }),
            SimRequest::Shade { node } => self.set_node(node, |n| n.shaded = true),
            SimRequest::Unshade { node } => self.set_node(node, |n| n.shaded = false),
        }
    }

    fn set_node(&mut self, id: u8, f: impl FnOnce(&mut SimNode)) -> serde_json::Value {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                f(node);
                json!({ "ok": true, "node": id })
            }
            None => json!({ "ok": false, "message": format!("no node {id}") }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = MasterConfig::default();
    println!("☀️  Multi-Node MPPT Chain Simulator");
    println!("===================================");
    println!(
        "   {} nodes, {:.0}V system target, control socket on port {}",
        config.node_count, config.target_system_voltage, CONTROL_PORT
    );

    let sim = Arc::new(Mutex::new(Simulation::new(config)?));

    let tick_sim = Arc::clone(&sim);
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut sim_guard = tick_sim.lock().await;
            sim_guard.tick();
        }
    });

    run_control_socket(sim).await
}

async fn run_control_socket(
    sim: Arc<Mutex<Simulation>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(("127.0.0.1", CONTROL_PORT)).await?;
    info!("control socket listening on port {CONTROL_PORT}");

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("client connected: {addr}");
        let client_sim = Arc::clone(&sim);
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, client_sim).await {
                warn!("client {addr} error: {e}");
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    sim: Arc<Mutex<Simulation>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<SimRequest>(trimmed) {
            Ok(request) => {
                let mut sim_guard = sim.lock().await;
                sim_guard.handle(request)
            }
            Err(e) => json!({ "ok": false, "message": format!("bad request: {e}") }),
        };

        writer.write_all(reply.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}
