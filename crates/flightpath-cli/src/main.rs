//! `flightpath-cli` – flightpath ground-station shell
//!
//! This binary is the operator-facing entry point for the drone gateway.  It:
//!
//! 1. Checks for `~/.flightpath/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Reports which drones the registry knows about.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/connect`, `/telemetry`, `/mission`, `/help`, ...).
//! 4. Intercepts **Ctrl-C** to close the active vehicle link and exit.

mod config;
mod observability;
mod repl;

use colored::Colorize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

fn main() {
    let _tracing_guard = observability::init_tracing("flightpath");

    print_banner();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let active: repl::ActiveClient = Arc::new(Mutex::new(None));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // The REPL thread is usually parked in read_line, so the handler closes
    // the link itself and exits.
    let shutdown_clone = shutdown.clone();
    let active_clone = active.clone();
    let handle = runtime.handle().clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing vehicle link …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);

        if let Some(client) = repl::take_active(&active_clone) {
            match handle.block_on(client.close()) {
                Ok(()) => println!("{}", "  ✓ Link closed.".green()),
                Err(e) => println!("{}: {}", "  Close error".red(), e),
            }
        }
        println!("{}", "  ✓ Exiting flightpath.".green());
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the link will not be closed on Ctrl-C");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Registry summary ──────────────────────────────────────────────────
    print!("\n  Drone registry {} … ", cfg.drone_registry.dimmed());
    match config::DroneRegistry::load(Path::new(&cfg.drone_registry)) {
        Ok(registry) => {
            println!("{} ({} drone(s))", "found".green(), registry.drones.len());
            for id in registry.ids() {
                println!("    • {}", id.bold());
            }
        }
        Err(_) => {
            println!("{}", "missing".yellow());
            println!(
                "  {}  Set {} or edit {}.",
                "No drones registered.".dimmed(),
                "FLIGHTPATH_DRONE_REGISTRY".bold(),
                config::config_path().display().to_string().bold()
            );
        }
    }

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(shutdown, runtime.handle().clone(), active.clone());

    if let Some(client) = repl::take_active(&active) {
        let _ = runtime.block_on(client.close());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     flightpath First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up flightpath.\n");

    let mut cfg = config::Config::default();

    cfg.drone_registry = prompt_line(
        &format!("  Drone registry file [{}]: ", cfg.drone_registry),
        &cfg.drone_registry,
    );

    cfg.default_port = prompt_line(
        &format!("  Default serial port [{}]: ", cfg.default_port),
        &cfg.default_port,
    );

    let baud = prompt_line(
        &format!("  Default baud rate [{}]: ", cfg.default_baud_rate),
        &cfg.default_baud_rate.to_string(),
    );
    match baud.trim().parse::<u32>() {
        Ok(b) if b > 0 => cfg.default_baud_rate = b,
        _ => println!("  {} keeping {}", "Invalid baud rate,".yellow(), cfg.default_baud_rate),
    }

    let timeout = prompt_line(
        &format!("  Connect timeout in ms [{}]: ", cfg.connect_timeout_ms),
        &cfg.connect_timeout_ms.to_string(),
    );
    match timeout.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => cfg.connect_timeout_ms = ms,
        _ => println!("  {} keeping {}", "Invalid timeout,".yellow(), cfg.connect_timeout_ms),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ______ _ _       _     _               _   _     "#.bold().cyan());
    println!("{}", r#"  |  ____| (_)     | |   | |             | | | |    "#.bold().cyan());
    println!("{}", r#"  | |__  | |_  __ _| |__ | |_ _ __   __ _| |_| |__  "#.bold().cyan());
    println!("{}", r#"  |  __| | | |/ _` | '_ \| __| '_ \ / _` | __| '_ \ "#.bold().cyan());
    println!("{}", r#"  | |    | | | (_| | | | | |_| |_) | (_| | |_| | | |"#.bold().cyan());
    println!("{}", r#"  |_|    |_|_|\__, |_| |_|\__| .__/ \__,_|\__|_| |_|"#.bold().cyan());
    println!("{}", r#"               __/ |         | |                    "#.bold().cyan());
    println!("{}", r#"              |___/          |_|                    "#.bold().cyan());
    println!();
    println!("  {} {}",
        "flightpath".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  MAVLink drone gateway");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
