//! enocean-bridge: command line front end for an EnOcean gateway.
//!
//! Monitors radio traffic of configured devices, or sends single commands
//! (raw packets, cover moves, thermostat set points) through the gateway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Parser, Subcommand};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use enocean_bridge::config::{self, ConfigFile, DeviceConfig, DeviceKind, DEFAULT_CONFIG_FILE};
use enocean_bridge::devices::{self, Cover, Device, DeviceEvent};
use enocean_bridge::{
    drain_packets, logging, run_monitor, Communicator, CommunicatorConfig, Dispatched, Dispatcher,
};
use enocean_protocol::{DeviceId, Packet, PacketType, Registry};

/// enocean-bridge - EnOcean ESP3 gateway bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Serial port of the gateway (overrides the config file)
    #[arg(long, conflicts_with = "tcp")]
    serial: Option<String>,

    /// host:port of a network gateway (overrides the config file)
    #[arg(long)]
    tcp: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,

    /// Response timeout for gateway commands in milliseconds
    #[arg(long, default_value = "500")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print received telegrams and device events until interrupted
    Monitor {
        /// One JSON object per line instead of text
        #[arg(long)]
        json: bool,
    },
    /// Send a raw packet
    Send {
        /// ESP3 packet type (1 = radio, 5 = common command)
        #[arg(long, default_value = "1")]
        packet_type: u8,

        /// Data section in hex, e.g. "F6 30"
        #[arg(long, default_value = "D5 00")]
        data: String,

        /// Optional data section in hex
        #[arg(long, default_value = "")]
        optional: String,

        /// Sender ID appended to radio data
        #[arg(long, default_value = "FF:FF:FF:FF")]
        sender: DeviceId,

        /// Status byte appended to radio data
        #[arg(long, default_value = "0")]
        status: u8,

        /// Send the data section as given, without sender and status
        #[arg(long)]
        raw: bool,
    },
    /// Move, stop or query a cover
    #[command(group(ArgGroup::new("action").required(true).args(["position", "open", "close", "stop", "query"])))]
    Cover {
        /// Device ID or name from the config file
        device: String,

        /// Target position in percent (100 = open)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        position: Option<u8>,

        #[arg(long)]
        open: bool,

        #[arg(long)]
        close: bool,

        #[arg(long)]
        stop: bool,

        /// Ask for the current position and wait for the reply
        #[arg(long)]
        query: bool,
    },
    /// Send a thermostat set point
    Setpoint {
        /// Device ID or name from the config file
        device: String,

        /// Temperature in degrees Celsius
        temperature: f64,
    },
    /// Print the gateway base ID
    BaseId,
}

/// Parse hex bytes: "F6 30", "f630", "0xF6,0x30" and "F6:30" are accepted.
fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ',' || c == ':') {
        if token.is_empty() {
            continue;
        }
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.len() % 2 != 0 {
            return Err(format!("odd number of hex digits in {:?}", token));
        }
        for i in (0..digits.len()).step_by(2) {
            let pair = digits
                .get(i..i + 2)
                .ok_or_else(|| format!("invalid hex {:?}", token))?;
            let byte =
                u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex {:?}", token))?;
            bytes.push(byte);
        }
    }
    Ok(bytes)
}

/// Radio data is sent as data, sender ID and status.
fn radio_data(mut data: Vec<u8>, sender: DeviceId, status: u8) -> Vec<u8> {
    data.extend_from_slice(&sender.to_bytes());
    data.push(status);
    data
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_event(event: &DeviceEvent) -> String {
    match event {
        DeviceEvent::Button(button) => match (button.pressed, button.which, button.onoff) {
            (Some(true), Some(which), Some(onoff)) => format!(
                "button {} {} pressed",
                match which {
                    0 => "A",
                    1 => "B",
                    _ => "A+B",
                },
                if onoff == 0 { "on" } else { "off" }
            ),
            (Some(false), _, _) => "button released".to_string(),
            _ => format!("action {:02X}", button.action),
        },
        DeviceEvent::CoverPosition { position: Some(p) } => format!("position {}%", p),
        DeviceEvent::CoverPosition { position: None } => "position unknown".to_string(),
        DeviceEvent::Climate {
            set_point,
            temperature,
        } => format!("set point {:.1}, temperature {:.1}", set_point, temperature),
        DeviceEvent::Sensor(decoded) => decoded
            .fields
            .iter()
            .map(|(name, field)| match &field.unit {
                Some(unit) => format!("{}={} {}", name, field.value, unit),
                None => format!("{}={}", name, field.value),
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn format_packet(packet: &Packet, dispatched: Option<&Dispatched>) -> String {
    let mut line = match packet {
        Packet::Radio(radio) => {
            let mut line = format!(
                "{} {} [{}] status {:02X}",
                radio.sender(),
                radio.rorg(),
                format_hex(radio.payload()),
                radio.status()
            );
            if let Some(dbm) = radio.dbm() {
                line.push_str(&format!(" {} dBm", dbm));
            }
            if radio.is_learn() {
                line.push_str(" learn");
            }
            line
        }
        Packet::Response(response) => format!(
            "response {:?} [{}]",
            response.return_code,
            format_hex(&response.data)
        ),
        Packet::Event(event) => format!("event {:?} [{}]", event.event, format_hex(&event.data)),
        other => {
            let (data, optional) = other.to_sections();
            format!(
                "{:?} [{}] [{}]",
                other.packet_type(),
                format_hex(&data),
                format_hex(&optional)
            )
        }
    };
    if let Some(dispatched) = dispatched {
        line.push_str(&format!(
            " -> {}: {}",
            dispatched.name,
            format_event(&dispatched.event)
        ));
    }
    line
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    packet: &'a Packet,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'a Dispatched>,
}

fn find_device<'a>(
    config: &'a ConfigFile,
    key: &str,
    kind: DeviceKind,
) -> Result<&'a DeviceConfig, Box<dyn std::error::Error>> {
    let device = config
        .device(key)
        .ok_or_else(|| format!("device {:?} not found in config", key))?;
    if device.kind != kind {
        return Err(format!("device {} is a {:?}, not a {:?}", key, device.kind, kind).into());
    }
    Ok(device)
}

async fn sender_id(
    communicator: &Communicator,
    configured: Option<DeviceId>,
) -> Result<DeviceId, Box<dyn std::error::Error>> {
    match configured {
        Some(id) => Ok(id),
        None => Ok(communicator.base_id().await?),
    }
}

/// Wait for a cover's position reply.
async fn wait_for_position(
    cover: &mut Cover,
    registry: &Registry,
    packets: &mut mpsc::UnboundedReceiver<Packet>,
    timeout: Duration,
) -> Option<Option<u8>> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            packet = packets.recv() => {
                let packet = packet?;
                let Some(radio) = packet.as_radio() else { continue };
                if radio.sender() != cover.id() {
                    continue;
                }
                match cover.handle(radio, registry) {
                    Ok(Some(DeviceEvent::CoverPosition { position })) => return Some(position),
                    Ok(_) => {}
                    Err(e) => warn!("{}: {}", cover.name(), e),
                }
            }
            _ = &mut deadline => return None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = if let Some(config_path) = &config_path {
        match config::load_config(config_path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", config_path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        }
    } else {
        ConfigFile::default()
    };

    // Merge logging configs (command line takes precedence)
    let log_dir = if args.log_dir.to_string_lossy() != "logs" {
        args.log_dir.clone()
    } else {
        PathBuf::from(file_config.logging.log_dir.as_deref().unwrap_or("logs"))
    };
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };
    let log_level = file_config.logging.level.as_deref();
    logging::init_logging(&log_dir, log_retention_days, args.verbose, log_level)?;

    let settings = file_config.transport_settings(args.serial.as_deref(), args.tcp.as_deref())?;
    let registry = Arc::new(Registry::builtin()?);
    let request_timeout = Duration::from_millis(args.timeout_ms);
    let communicator_config = CommunicatorConfig {
        request_timeout,
        ..CommunicatorConfig::default()
    };

    let command = args.command.unwrap_or(Command::Monitor { json: false });
    if let Command::Monitor { json } = command {
        let mut dispatcher = Dispatcher::new(Arc::clone(&registry));
        for device in &file_config.devices {
            dispatcher.register(devices::from_config(device, &registry)?);
        }
        info!("enocean-bridge starting with {} devices", dispatcher.len());

        run_monitor(
            &settings,
            communicator_config,
            &mut dispatcher,
            |packet, dispatched| {
                if json {
                    let line = JsonLine {
                        timestamp: chrono::Local::now().to_rfc3339(),
                        packet,
                        device: dispatched,
                    };
                    match serde_json::to_string(&line) {
                        Ok(text) => println!("{}", text),
                        Err(e) => error!("Failed to serialize packet: {}", e),
                    }
                } else {
                    println!("{}", format_packet(packet, dispatched));
                }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            },
        )
        .await;
        return Ok(());
    }

    let (communicator, packets) = Communicator::start(settings.build(), communicator_config)?;

    // Only cover queries read packets; the rest are dropped so the read loop
    // never stalls behind a full channel.
    let watched = match &command {
        Command::Cover { device, query: true, .. } => file_config.device(device).map(|d| d.id),
        _ => None,
    };
    let mut packets = drain_packets(packets, move |packet| {
        watched.is_some() && packet.as_radio().map(|radio| radio.sender()) == watched
    });

    let result = async {
        match command {
            Command::Monitor { .. } => {}
            Command::Send {
                packet_type,
                data,
                optional,
                sender,
                status,
                raw,
            } => {
                let packet_type = PacketType::from(packet_type);
                let mut data = parse_hex(&data)?;
                let optional = parse_hex(&optional)?;
                if packet_type == PacketType::RadioErp1 && !raw {
                    data = radio_data(data, sender, status);
                }
                let packet = Packet::from_parts(packet_type, data, optional)?;
                if packet_type == PacketType::CommonCommand {
                    let response = communicator.request(&packet, request_timeout).await?;
                    println!(
                        "{:?} [{}]",
                        response.return_code,
                        format_hex(&response.data)
                    );
                } else {
                    communicator.send(&packet)?;
                    info!("Sent {}", format_packet(&packet, None));
                }
            }
            Command::Cover {
                device,
                position,
                open,
                close,
                stop,
                query,
            } => {
                let device = find_device(&file_config, &device, DeviceKind::Cover)?;
                let mut cover = Cover::new(device.id, device.display_name(), device.sender);
                let sender = sender_id(&communicator, cover.sender()).await?;

                let packet = if let Some(position) = position {
                    cover.set_position(&registry, position, sender)?
                } else if open {
                    cover.open(&registry, sender)?
                } else if close {
                    cover.close(&registry, sender)?
                } else if stop {
                    cover.stop(&registry, sender)?
                } else {
                    cover.query(&registry, sender)?
                };
                communicator.send(&packet.into())?;

                if query {
                    match wait_for_position(&mut cover, &registry, &mut packets, request_timeout)
                        .await
                    {
                        Some(Some(position)) => println!("{}: {}%", cover.name(), position),
                        Some(None) => println!("{}: position unknown", cover.name()),
                        None => return Err(format!("{}: no reply", cover.name()).into()),
                    }
                }
            }
            Command::Setpoint {
                device,
                temperature,
            } => {
                let device = find_device(&file_config, &device, DeviceKind::Climate)?;
                let mut thermostat = devices::thermostat(device, device.display_name());
                let sender = sender_id(&communicator, thermostat.sender()).await?;
                let (packet, setpoint) = thermostat.set_temperature(temperature, sender)?;
                if setpoint.clamped {
                    warn!("{}: {} is out of range", thermostat.name(), temperature);
                }
                communicator.send(&packet.into())?;
                println!("{}: set point raw {}", thermostat.name(), setpoint.raw);
            }
            Command::BaseId => {
                println!("{}", communicator.base_id().await?);
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .await;

    if let Err(e) = communicator.shutdown() {
        warn!("Gateway connection ended with: {}", e);
    }
    result
}
