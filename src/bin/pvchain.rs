use clap::{App, Arg, SubCommand};
use colored::*;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "7878";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("pvchain")
        .version("0.1.0")
        .author("Power Electronics Team")
        .about("☀️  Multi-node MPPT chain - master controller console")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator control port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .subcommand(SubCommand::with_name("status").about("📊 System status overview"))
        .subcommand(SubCommand::with_name("nodes").about("🔋 Per-node detail table"))
        .subcommand(SubCommand::with_name("faults").about("⚠️  Active fault conditions"))
        .subcommand(
            SubCommand::with_name("stop")
                .about("🛑 Emergency stop - terminal, requires master restart"),
        )
        .subcommand(
            SubCommand::with_name("fail")
                .about("Simulate a panel failure on a node")
                .arg(Arg::with_name("node").help("Node id").required(true)),
        )
        .subcommand(
            SubCommand::with_name("restore")
                .about("Restore a previously failed node")
                .arg(Arg::with_name("node").help("Node id").required(true)),
        )
        .subcommand(
            SubCommand::with_name("shade")
                .about("Simulate partial shading on a node")
                .arg(Arg::with_name("node").help("Node id").required(true)),
        )
        .subcommand(
            SubCommand::with_name("unshade")
                .about("Clear simulated shading on a node")
                .arg(Arg::with_name("node").help("Node id").required(true)),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT);

    let request = match matches.subcommand() {
        ("status", _) => r#"{"op":"status"}"#.to_string(),
        ("nodes", _) => r#"{"op":"nodes"}"#.to_string(),
        ("faults", _) => r#"{"op":"faults"}"#.to_string(),
        ("stop", _) => r#"{"op":"stop"}"#.to_string(),
        ("fail", Some(sub)) => node_request("fail", sub.value_of("node"))?,
        ("restore", Some(sub)) => node_request("restore", sub.value_of("node"))?,
        ("shade", Some(sub)) => node_request("shade", sub.value_of("node"))?,
        ("unshade", Some(sub)) => node_request("unshade", sub.value_of("node"))?,
        _ => {
            eprintln!("{}", "No command given. Try `pvchain status`.".yellow());
            std::process::exit(2);
        }
    };

    let reply = roundtrip(host, port, &request).await?;
    render(&reply);
    Ok(())
}

fn node_request(op: &str, node: Option<&str>) -> Result<String, Box<dyn std::error::Error>> {
    let node: u8 = node.unwrap_or("0").parse()?;
    Ok(format!(r#"{{"op":"{op}","node":{node}}}"#))
}

async fn roundtrip(
    host: &str,
    port: &str,
    request: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(format!("{host}:{port}")).await.map_err(|e| {
        format!("cannot reach simulator at {host}:{port} ({e}) - is pvchain-simulator running?")
    })?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(request.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    Ok(serde_json::from_str(&line)?)
}

fn render(reply: &Value) {
    if !reply["ok"].as_bool().unwrap_or(false) {
        let message = reply["message"].as_str().unwrap_or("request failed");
        eprintln!("{} {}", "error:".red().bold(), message);
        std::process::exit(1);
    }

    if let Some(text) = reply["text"].as_str() {
        println!("{text}");
    }

    if let Some(control) = reply["control"].as_str() {
        let styled = match control {
            "Normal" => control.green().bold(),
            "Fault" => control.yellow().bold(),
            _ => control.red().bold(),
        };
        println!("Control state: {styled}");
    }

    if let Some(faults) = reply["faults"].as_array() {
        if faults.is_empty() {
            println!("Faults: {}", "none".green());
        } else {
            let labels: Vec<&str> = faults.iter().filter_map(Value::as_str).collect();
            println!("Faults: {}", labels.join(" ").red().bold());
        }
    }

    if let Some(node) = reply["node"].as_u64() {
        println!("{} node {}", "ok:".green().bold(), node);
    }
}
