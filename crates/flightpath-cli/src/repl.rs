//! REPL – Read-Eval-Print Loop for the flightpath ground-station shell.
//!
//! Supported slash-commands:
//!   /help                         – show this list
//!   /drones                       – list the drone registry
//!   /connect <id> [timeout_ms]    – open a link and wait for a heartbeat
//!   /disconnect                   – close the active link
//!   /status                       – link state
//!   /telemetry [json]             – one telemetry report
//!   /watch <seconds>              – stream telemetry for a while
//!   /arm  /disarm
//!   /mode <name>                  – switch PX4 flight mode
//!   /takeoff <alt>  /land  /rtl
//!   /goto <lat> <lon> <alt>       – position setpoint
//!   /mission upload <file.toml>
//!   /mission clear|start|pause|resume|progress
//!   /quit | /exit                 – close the link and exit

use colored::Colorize;
use futures_util::StreamExt;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

use flightpath_mavlink::{Client, ClientConfig, TelemetryReport};
use flightpath_types::{FlightMode, Waypoint};
use serde::Deserialize;

use crate::config::{self, Config, DroneRegistry};

/// The client the REPL is currently talking to.  Shared with the Ctrl-C
/// handler so it can close the link on the way out.
pub type ActiveClient = Arc<Mutex<Option<Arc<Client>>>>;

/// Take the active client out of `slot`, leaving it empty.
pub fn take_active(slot: &ActiveClient) -> Option<Arc<Client>> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

fn current(slot: &ActiveClient) -> Option<Arc<Client>> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Drones,
    Connect { id: String, timeout_ms: Option<u64> },
    Disconnect,
    Status,
    Telemetry { json: bool },
    Watch { seconds: u64 },
    Arm,
    Disarm,
    Mode(FlightMode),
    Takeoff { altitude: f32 },
    Land,
    ReturnToLaunch,
    GoTo { latitude: f64, longitude: f64, altitude: f32 },
    MissionUpload { path: String },
    MissionClear,
    MissionStart,
    MissionPause,
    MissionResume,
    MissionProgress,
    Quit,
}

/// Parse one input line.  The error is a user-facing usage message.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let cmd = match (head, args.as_slice()) {
        ("/help", []) => Command::Help,
        ("/drones", []) => Command::Drones,
        ("/connect", [id]) => Command::Connect {
            id: id.to_string(),
            timeout_ms: None,
        },
        ("/connect", [id, ms]) => Command::Connect {
            id: id.to_string(),
            timeout_ms: Some(parse_arg(ms, "timeout_ms")?),
        },
        ("/connect", _) => return Err("usage: /connect <drone-id> [timeout_ms]".into()),
        ("/disconnect", []) => Command::Disconnect,
        ("/status", []) => Command::Status,
        ("/telemetry", []) => Command::Telemetry { json: false },
        ("/telemetry", ["json"]) => Command::Telemetry { json: true },
        ("/watch", [secs]) => Command::Watch {
            seconds: parse_arg(secs, "seconds")?,
        },
        ("/watch", _) => return Err("usage: /watch <seconds>".into()),
        ("/arm", []) => Command::Arm,
        ("/disarm", []) => Command::Disarm,
        ("/mode", [name]) => Command::Mode(name.parse()?),
        ("/mode", _) => return Err("usage: /mode <name>".into()),
        ("/takeoff", [alt]) => Command::Takeoff {
            altitude: parse_arg(alt, "altitude")?,
        },
        ("/takeoff", _) => return Err("usage: /takeoff <altitude_m>".into()),
        ("/land", []) => Command::Land,
        ("/rtl", []) => Command::ReturnToLaunch,
        ("/goto", [lat, lon, alt]) => Command::GoTo {
            latitude: parse_arg(lat, "latitude")?,
            longitude: parse_arg(lon, "longitude")?,
            altitude: parse_arg(alt, "altitude")?,
        },
        ("/goto", _) => return Err("usage: /goto <lat> <lon> <alt_m>".into()),
        ("/mission", ["upload", path]) => Command::MissionUpload {
            path: path.to_string(),
        },
        ("/mission", ["clear"]) => Command::MissionClear,
        ("/mission", ["start"]) => Command::MissionStart,
        ("/mission", ["pause"]) => Command::MissionPause,
        ("/mission", ["resume"]) => Command::MissionResume,
        ("/mission", ["progress"]) => Command::MissionProgress,
        ("/mission", _) => {
            return Err(
                "usage: /mission upload <file.toml> | clear | start | pause | resume | progress"
                    .into(),
            );
        }
        ("/quit" | "/exit", []) => Command::Quit,
        _ => return Err(format!("Unknown command: '{}'", line.trim())),
    };
    Ok(cmd)
}

fn parse_arg<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("invalid {name}: '{raw}'"))
}

#[derive(Debug, Deserialize)]
struct MissionFile {
    waypoints: Vec<Waypoint>,
}

/// Read a mission file made of `[[waypoints]]` tables.
pub fn load_mission(path: &Path) -> Result<Vec<Waypoint>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read mission at {}: {}", path.display(), e))?;
    let file: MissionFile =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse mission: {}", e))?;
    Ok(file.waypoints)
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shutdown: Arc<AtomicBool>, runtime: Handle, active: ActiveClient) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "flightpath>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
                continue;
            }
        };

        match cmd {
            Command::Help => cmd_help(),
            Command::Drones => cmd_drones(),
            Command::Connect { id, timeout_ms } => {
                runtime.block_on(cmd_connect(&active, &id, timeout_ms))
            }
            Command::Disconnect => runtime.block_on(cmd_disconnect(&active)),
            Command::Status => cmd_status(&active),
            Command::Telemetry { json } => {
                if let Some(client) = require_client(&active) {
                    let report = client.telemetry_report();
                    if json {
                        match serde_json::to_string_pretty(&report) {
                            Ok(s) => println!("{s}"),
                            Err(e) => println!("{}: {}", "Encode error".red(), e),
                        }
                    } else {
                        print_report(&report);
                    }
                }
            }
            Command::Watch { seconds } => {
                runtime.block_on(cmd_watch(&active, seconds, &shutdown))
            }
            Command::Quit => {
                runtime.block_on(cmd_disconnect(&active));
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                if let Some(client) = require_client(&active) {
                    runtime.block_on(cmd_vehicle(&client, other));
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "flightpath Commands".bold().underline());
    println!("  {}        – list the drone registry", "/drones".bold().cyan());
    println!("  {} – connect and wait for a heartbeat", "/connect <id> [ms]".bold().cyan());
    println!("  {}    – close the active link", "/disconnect".bold().cyan());
    println!("  {}        – link state", "/status".bold().cyan());
    println!("  {} – one telemetry report", "/telemetry [json]".bold().cyan());
    println!("  {}   – stream telemetry", "/watch <secs>".bold().cyan());
    println!("  {}  – arm / disarm motors", "/arm  /disarm".bold().cyan());
    println!(
        "  {}   – switch flight mode ({})",
        "/mode <name>".bold().cyan(),
        FlightMode::ALL.map(|m| m.to_string()).join(", ")
    );
    println!("  {}  – takeoff to altitude (m)", "/takeoff <alt>".bold().cyan());
    println!("  {}    – land / return to launch", "/land  /rtl".bold().cyan());
    println!("  {} – position setpoint (GUIDED)", "/goto <lat> <lon> <alt>".bold().cyan());
    println!("  {} – upload [[waypoints]]", "/mission upload <file.toml>".bold().cyan());
    println!("  {} – mission control", "/mission clear|start|pause|resume|progress".bold().cyan());
    println!("  {}  – close the link and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_drones() {
    let cfg = load_config_or_default();
    let registry = match DroneRegistry::load(Path::new(&cfg.drone_registry)) {
        Ok(r) => r,
        Err(e) => {
            println!("{}: {}", "Registry error".red(), e);
            return;
        }
    };
    if registry.drones.is_empty() {
        println!("  No drones registered in {}", cfg.drone_registry.bold());
        return;
    }
    println!("{}", "Registered drones".bold().underline());
    for drone in &registry.drones {
        let endpoint = match drone.descriptor(&cfg) {
            Ok(d) => d.to_string(),
            Err(e) => e.to_string(),
        };
        println!(
            "  {:<16} {:<24} {:<8} {}",
            drone.id.bold(),
            drone.name,
            drone.protocol.yellow(),
            endpoint.dimmed()
        );
        if !drone.description.is_empty() {
            println!("  {:<16} {}", "", drone.description.dimmed());
        }
    }
}

async fn cmd_connect(active: &ActiveClient, id: &str, timeout_ms: Option<u64>) {
    if let Some(existing) = current(active) {
        if existing.is_connected() {
            println!("{}", "Already connected. Disconnect first.".yellow());
            return;
        }
        if let Some(stale) = take_active(active) {
            let _ = stale.close().await;
        }
    }

    let cfg = load_config_or_default();
    let registry = match DroneRegistry::load(Path::new(&cfg.drone_registry)) {
        Ok(r) => r,
        Err(e) => {
            println!("{}: {}", "Registry error".red(), e);
            return;
        }
    };
    let descriptor = match registry.find(id).and_then(|d| d.descriptor(&cfg).map_err(|e| e.to_string())) {
        Ok(d) => d,
        Err(e) => {
            println!("{}: {}", "Cannot connect".red(), e);
            return;
        }
    };

    let timeout = Duration::from_millis(timeout_ms.unwrap_or(cfg.connect_timeout_ms));
    println!("  Connecting to {} via {} …", id.bold(), descriptor.to_string().dimmed());

    let client = match Client::connect(ClientConfig::new(descriptor)).await {
        Ok(c) => Arc::new(c),
        Err(e) => {
            println!("{}: {}", "Transport error".red(), e);
            return;
        }
    };

    match client.wait_for_connection(timeout).await {
        Ok(()) => {
            println!(
                "  {} Connected to system {}",
                "✓".green().bold(),
                client.system_id().to_string().bold()
            );
            *active.lock().unwrap_or_else(|e| e.into_inner()) = Some(client);
        }
        Err(e) => {
            println!("{}: {}", "Connection failed".red(), e);
            let _ = client.close().await;
        }
    }
}

async fn cmd_disconnect(active: &ActiveClient) {
    match take_active(active) {
        Some(client) => match client.close().await {
            Ok(()) => println!("  {} Disconnected.", "✓".green().bold()),
            Err(e) => println!("{}: {}", "Close error".red(), e),
        },
        None => println!("  Not connected."),
    }
}

fn cmd_status(active: &ActiveClient) {
    let Some(client) = current(active) else {
        println!("  {}", "No active connection.".dimmed());
        return;
    };
    let info = client.connection_info();
    let link = if info.connected { "connected".green() } else { "disconnected".red() };
    let armed = if info.armed { "ARMED".red().bold() } else { "disarmed".green() };
    println!("  Link       : {} ({})", link, info.connection.to_string().dimmed());
    println!("  System id  : {}", info.system_id);
    println!("  Motors     : {}", armed);
    match info.since_last_heartbeat {
        Some(age) => println!("  Heartbeat  : {:.1}s ago", age.as_secs_f32()),
        None => println!("  Heartbeat  : never"),
    }
    if client.mission_upload_pending() {
        println!("  Mission    : {}", "upload in progress".yellow());
    }
}

async fn cmd_watch(active: &ActiveClient, seconds: u64, shutdown: &AtomicBool) {
    let Some(client) = require_client(active) else {
        return;
    };
    let cfg = load_config_or_default();
    let period = Duration::from_secs_f64(1.0 / f64::from(cfg.telemetry_rate_hz.max(1)));
    let deadline = Instant::now() + Duration::from_secs(seconds);

    let mut feed = client.telemetry_feed(period);
    while !shutdown.load(Ordering::SeqCst) {
        match tokio::time::timeout_at(deadline, feed.next()).await {
            Ok(Some(report)) => print_report(&report),
            // Feed ended (client closed) or time is up.
            Ok(None) | Err(_) => break,
        }
    }
}

async fn cmd_vehicle(client: &Client, cmd: Command) {
    let result = match cmd {
        Command::Arm => client.arm().await,
        Command::Disarm => client.disarm().await,
        Command::Mode(mode) => client.set_flight_mode(mode).await,
        Command::Takeoff { altitude } => client.takeoff(altitude).await,
        Command::Land => client.land().await,
        Command::ReturnToLaunch => client.return_to_launch().await,
        Command::GoTo {
            latitude,
            longitude,
            altitude,
        } => client.go_to_position(latitude, longitude, altitude).await,
        Command::MissionUpload { path } => {
            let waypoints = match load_mission(Path::new(&path)) {
                Ok(w) => w,
                Err(e) => {
                    println!("{}: {}", "Mission error".red(), e);
                    return;
                }
            };
            println!("  Uploading {} waypoint(s) …", waypoints.len());
            client.upload_mission(waypoints).await
        }
        Command::MissionClear => client.clear_mission().await,
        Command::MissionStart => match client.set_flight_mode(FlightMode::Auto).await {
            Ok(()) => client.start_mission(0).await,
            Err(e) => Err(e),
        },
        Command::MissionPause => client.pause_mission().await,
        Command::MissionResume => client.resume_mission().await,
        Command::MissionProgress => {
            let p = client.mission_progress();
            println!(
                "  Mission    : {:?}  item {}/{}{}",
                p.status(),
                p.current,
                p.total,
                p.last_reached
                    .map(|s| format!("  (last reached {s})"))
                    .unwrap_or_default()
            );
            return;
        }
        _ => return,
    };
    match result {
        Ok(()) => println!("  {} sent", "✓".green().bold()),
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn require_client(active: &ActiveClient) -> Option<Arc<Client>> {
    let client = current(active);
    if client.is_none() {
        println!("  Not connected. Use {} first.", "/connect <id>".bold());
    }
    client
}

fn print_report(r: &TelemetryReport) {
    let s = &r.snapshot;
    println!(
        "  {} {} mode={} pos=({:.6}, {:.6}) alt={:.1}m hdg={:.0} gs={:.1}m/s vs={:.1}m/s bat={:.2}V {}% gps={}({} sats) sensors={}",
        if r.connected { "●".green() } else { "●".red() },
        if r.armed { "ARMED".red().bold() } else { "disarmed".normal() },
        r.flight_mode.to_string().bold(),
        s.latitude,
        s.longitude,
        s.altitude,
        s.heading,
        s.ground_speed,
        s.vertical_speed,
        s.battery_voltage,
        s.battery_remaining,
        if r.gps_ok { "ok" } else { "poor" },
        s.satellite_count,
        if r.sensors_ok { "ok" } else { "FAULT" },
    );
}

fn load_config_or_default() -> Config {
    match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightpath_types::WaypointAction;

    #[test]
    fn parses_connect_with_and_without_timeout() {
        assert_eq!(
            parse_command("/connect px4-sitl").unwrap(),
            Command::Connect {
                id: "px4-sitl".into(),
                timeout_ms: None
            }
        );
        assert_eq!(
            parse_command("  /connect px4-sitl 8000 ").unwrap(),
            Command::Connect {
                id: "px4-sitl".into(),
                timeout_ms: Some(8000)
            }
        );
        assert!(parse_command("/connect").is_err());
        assert!(parse_command("/connect a soon").is_err());
    }

    #[test]
    fn parses_mode_names_through_flight_mode() {
        assert_eq!(parse_command("/mode rtl").unwrap(), Command::Mode(FlightMode::ReturnHome));
        assert_eq!(parse_command("/mode position-hold").unwrap(), Command::Mode(FlightMode::PositionHold));
        assert!(parse_command("/mode warp").is_err());
    }

    #[test]
    fn parses_goto_coordinates() {
        assert_eq!(
            parse_command("/goto 47.397742 8.545594 20").unwrap(),
            Command::GoTo {
                latitude: 47.397742,
                longitude: 8.545594,
                altitude: 20.0
            }
        );
        let err = parse_command("/goto 47.3 east 20").unwrap_err();
        assert!(err.contains("longitude"));
    }

    #[test]
    fn parses_mission_subcommands() {
        assert_eq!(
            parse_command("/mission upload survey.toml").unwrap(),
            Command::MissionUpload {
                path: "survey.toml".into()
            }
        );
        assert_eq!(parse_command("/mission start").unwrap(), Command::MissionStart);
        assert_eq!(parse_command("/mission progress").unwrap(), Command::MissionProgress);
        assert!(parse_command("/mission").is_err());
        assert!(parse_command("/mission fly").is_err());
    }

    #[test]
    fn rejects_unknown_commands_and_stray_arguments() {
        assert!(parse_command("/teleport").unwrap_err().contains("Unknown command"));
        assert!(parse_command("/arm now").is_err());
        assert_eq!(parse_command("/exit").unwrap(), Command::Quit);
        assert_eq!(
            parse_command("/telemetry json").unwrap(),
            Command::Telemetry { json: true }
        );
    }

    #[test]
    fn loads_mission_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("survey.toml");
        std::fs::write(
            &path,
            r#"
            [[waypoints]]
            sequence = 0
            action = "takeoff"
            latitude = 47.3977
            longitude = 8.5456
            altitude = 10.0

            [[waypoints]]
            sequence = 1
            latitude = 47.3980
            longitude = 8.5460
            altitude = 15.0
            hold_time_sec = 5.0
            "#,
        )
        .unwrap();

        let waypoints = load_mission(&path).expect("mission");
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].action, WaypointAction::Takeoff);
        assert_eq!(waypoints[1].action, WaypointAction::Waypoint);
        assert_eq!(waypoints[1].hold_time_sec, Some(5.0));
    }

    #[test]
    fn missing_mission_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(load_mission(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn empty_slot_yields_nothing() {
        let slot: ActiveClient = Arc::new(Mutex::new(None));
        assert!(take_active(&slot).is_none());
        assert!(current(&slot).is_none());
    }
}
