use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use motor_bus::{
    Brand, BusKind, DefaultMotorService, DiscoveryService, ModelCatalog, MotorBus, MotorId, MotorService,
    SystemTransports, TransportEnumerator,
};
use motor_telemetry::{MetricsHub, SessionEvent, SessionTarget, TelemetrySession};
use robot_manager::{DefinitionCatalog, Robot, RobotManager, RobotMotorBusConnection, RobotStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

mod config;
use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "hwctl",
    version,
    about = "Motor bus and robot registry tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// Configuration file; written with defaults when missing
    #[arg(long, global = true, default_value = "hwctl.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List USB serial ports and CAN adapters
    Ports,
    /// Probe every port for motor buses
    Discover {
        /// Restrict attempts to BUS:BAUD pairs, e.g. feetech:1000000
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(BusKind, u32)>,
    },
    /// Scan one bus for motors
    Scan {
        /// Bus class or alias (dynamixel, feetech, damiao, can, ...)
        #[arg(long)]
        bus: String,
        /// Serial port or CAN adapter
        #[arg(long)]
        interface: String,
        #[arg(long)]
        baud: Option<u32>,
        /// First id to probe
        #[arg(long)]
        from: Option<u32>,
        /// Last id to probe
        #[arg(long)]
        to: Option<u32>,
    },
    /// Resolve a firmware model number
    Model {
        #[arg(long)]
        brand: Brand,
        #[arg(long)]
        id: u32,
    },
    /// Robot registry
    Robots {
        #[command(subcommand)]
        command: RobotCommands,
    },
    /// Stream live telemetry for a registered robot (Ctrl-C to stop)
    Monitor {
        robot: String,
        /// Motor bus name; defaults to the robot's first bus
        #[arg(long)]
        bus: Option<String>,
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop after this many telemetry snapshots
        #[arg(long)]
        count: Option<usize>,
        /// Print Prometheus counters on exit
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RobotCommands {
    /// Registered robots
    List,
    /// Built-in and configured robot definitions
    Definitions,
    /// Discovered buses not yet claimed by a robot
    Pending,
    /// Register a robot: a pending candidate by id, or a definition bound to an interface
    Add {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Definition id (see `robots definitions`)
        #[arg(long, requires = "interface")]
        definition: Option<String>,
        #[arg(long)]
        interface: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        #[arg(long)]
        serial: Option<String>,
    },
    /// Re-verify one robot, or all, against a discovery pass
    Refresh { id: Option<String> },
    /// Verify a robot against its own connection
    Verify { id: String },
    Remove { id: String },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Ports => ports(&config),
        Commands::Discover { filters } => discover(&config, filters),
        Commands::Scan {
            bus,
            interface,
            baud,
            from,
            to,
        } => scan(&config, &bus, &interface, baud, from, to),
        Commands::Model { brand, id } => model(&config, brand, id),
        Commands::Robots { command } => robots(&config, command),
        Commands::Monitor {
            robot,
            bus,
            interval_ms,
            count,
            metrics,
        } => {
            let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            rt.block_on(monitor(&config, &robot, bus.as_deref(), interval_ms, count, metrics))
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn parse_filter(s: &str) -> Result<(BusKind, u32), String> {
    let (bus, baud) = s
        .split_once(':')
        .ok_or_else(|| format!("expected BUS:BAUD, got {s}"))?;
    let kind = BusKind::resolve(bus).map_err(|e| e.to_string())?;
    let baud = baud.parse().map_err(|_| format!("invalid baudrate: {baud}"))?;
    Ok((kind, baud))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn catalog(config: &Config) -> Arc<ModelCatalog> {
    Arc::new(match &config.models_dir {
        Some(dir) => ModelCatalog::load_dir(dir),
        None => ModelCatalog::builtin(),
    })
}

fn open_manager(config: &Config) -> Result<RobotManager> {
    let definitions = match &config.definitions_dir {
        Some(dir) => DefinitionCatalog::load_dir(dir).with_context(|| format!("loading definitions from {dir}"))?,
        None => DefinitionCatalog::builtin(),
    };
    let discovery = DiscoveryService::system(config.discovery.clone(), catalog(config));
    RobotManager::open(
        config.manager(),
        RobotStore::new(&config.robots_file),
        discovery,
        definitions,
    )
    .with_context(|| format!("opening robot registry {}", config.robots_file))
}

fn ports(config: &Config) -> Result<()> {
    let transports = SystemTransports::new(config.discovery.clone());
    let serial = transports.discover_serial_ports();
    let can = transports.discover_can_interfaces();
    if serial.is_empty() && can.is_empty() {
        println!("no USB serial ports or CAN adapters found");
        return Ok(());
    }
    for p in serial {
        println!(
            "serial  {:<20} {:04x}:{:04x}  sn={}  {}",
            p.port,
            p.vid.unwrap_or_default(),
            p.pid.unwrap_or_default(),
            p.serial_number.as_deref().unwrap_or("-"),
            p.description.as_deref().unwrap_or(""),
        );
    }
    for c in can {
        println!(
            "can     {:<20} sn={}  {}",
            c.interface,
            c.serial_number.as_deref().unwrap_or("-"),
            c.manufacturer.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct BusSummary {
    bus: BusKind,
    interface: String,
    baudrate: u32,
    serial_number: Option<String>,
    manufacturer: Option<String>,
    motors: Vec<MotorSummary>,
}

#[derive(Serialize)]
struct MotorSummary {
    id: MotorId,
    model: String,
}

fn summarize(bus: &MotorBus, serial_number: Option<String>, manufacturer: Option<String>) -> BusSummary {
    BusSummary {
        bus: bus.kind(),
        interface: bus.interface().to_string(),
        baudrate: bus.baudrate(),
        serial_number,
        manufacturer,
        motors: bus
            .motors()
            .iter()
            .map(|(id, m)| MotorSummary {
                id: *id,
                model: m.model.full_name(),
            })
            .collect(),
    }
}

fn discover(config: &Config, filters: Vec<(BusKind, u32)>) -> Result<()> {
    let discovery = DiscoveryService::system(config.discovery.clone(), catalog(config));
    let filters = if filters.is_empty() {
        config.discovery_filters.clone()
    } else {
        Some(filters)
    };
    let found = discovery.discover_motor_buses(filters.as_deref());
    info!(buses = found.len(), "discovery finished");
    let summary: Vec<BusSummary> = found
        .into_iter()
        .map(|d| summarize(&d.bus, d.serial_number, d.manufacturer))
        .collect();
    print_json(&summary)
}

fn scan(config: &Config, bus: &str, interface: &str, baud: Option<u32>, from: Option<u32>, to: Option<u32>) -> Result<()> {
    let mut bus = MotorBus::create_with(bus, interface, baud, catalog(config))?;
    if !bus.connect() {
        bail!("cannot open {} bus on {interface}", bus.kind());
    }
    let range = match (from, to) {
        (None, None) => None,
        (from, to) => Some(from.unwrap_or(0)..=to.unwrap_or(u32::from(u8::MAX))),
    };
    let scanned = bus.scan_motors(range);
    bus.disconnect();
    scanned?;
    print_json(&summarize(&bus, None, None))
}

fn model(config: &Config, brand: Brand, id: u32) -> Result<()> {
    let service = DefaultMotorService::new(catalog(config));
    match service.get_spec_by_model_id(brand, id) {
        Ok((model, params)) => print_json(&serde_json::json!({ "model": model, "protection": params }))?,
        Err(e) => warn!(error = %e, "no unique protection spec"),
    }
    let info = service
        .get_model_info_by_model_id(brand, id)
        .ok_or_else(|| anyhow!("no unique {brand} model with id {id}"))?;
    print_json(&info)
}

fn robots(config: &Config, command: RobotCommands) -> Result<()> {
    let mut manager = open_manager(config)?;
    match command {
        RobotCommands::List => {
            let robots: Vec<&Robot> = manager.list_robots().collect();
            print_json(&robots)
        }
        RobotCommands::Definitions => {
            for def in manager.definitions().list() {
                let motors: usize = def.motor_buses.values().map(|b| b.motors.len()).sum();
                println!("{:<16} {:<24} {:?} motors={motors}", def.id, def.display_name, def.category());
            }
            Ok(())
        }
        RobotCommands::Pending => print_json(&manager.get_pending_devices()?),
        RobotCommands::Add {
            id,
            name,
            definition,
            interface,
            baud,
            serial,
        } => {
            let mut robot = Robot::new(id.clone(), name.clone().unwrap_or_else(|| id.clone()));
            match definition {
                Some(def_id) => {
                    let def = manager
                        .definitions()
                        .get(&def_id)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown definition {def_id}"))?;
                    let (bus_name, bus_def) = def
                        .motor_buses
                        .iter()
                        .next()
                        .ok_or_else(|| anyhow!("definition {def_id} declares no motor bus"))?;
                    robot.motor_bus_connections.insert(
                        bus_name.clone(),
                        RobotMotorBusConnection {
                            motor_bus_type: bus_def.bus_type.clone(),
                            interface,
                            baudrate: baud.or(bus_def.baud_rate),
                            serial_number: serial,
                        },
                    );
                    if name.is_none() {
                        robot.name = def.display_name.clone();
                    }
                    robot.definition = Some(def);
                }
                None => {
                    // Pending candidates only live for one discovery pass.
                    let pending = manager.get_pending_devices()?;
                    if !pending.iter().any(|r| r.id == id) {
                        bail!("{id} is not a pending device; run `hwctl robots pending`");
                    }
                }
            }
            print_json(&manager.add_robot(robot)?)
        }
        RobotCommands::Refresh { id } => print_json(&manager.refresh_status(id.as_deref())?),
        RobotCommands::Verify { id } => print_json(&manager.verify_registered(&id)?),
        RobotCommands::Remove { id } => {
            let removed = manager.remove_robot(&id)?;
            println!("removed {} ({})", removed.id, removed.name);
            Ok(())
        }
    }
}

async fn monitor(
    config: &Config,
    robot_id: &str,
    bus: Option<&str>,
    interval_ms: Option<u64>,
    count: Option<usize>,
    with_metrics: bool,
) -> Result<()> {
    let manager = open_manager(config)?;
    let robot = manager.get_robot(robot_id)?;
    let target = SessionTarget::from_robot(robot, bus)?;
    let service = Arc::new(DefaultMotorService::new(catalog(config)));
    let hub = MetricsHub::new().map_err(|e| anyhow!(e))?;

    let mut session_config = config.session();
    if let Some(ms) = interval_ms {
        session_config.poll_interval_ms = ms;
    }
    let mut session = TelemetrySession::new(target, service, session_config).with_metrics(hub.session.clone());
    let mut events = session.subscribe();
    session.start().await?;
    info!(robot = robot_id, "monitoring; Ctrl-C to stop");

    let mut snapshots = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    if matches!(event, SessionEvent::Telemetry { .. }) {
                        snapshots += 1;
                    }
                    println!("{}", serde_json::to_string(&event)?);
                    if count.is_some_and(|n| snapshots >= n) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.stop().await?;
    if with_metrics {
        print!("{}", hub.encode_text());
    }
    Ok(())
}
