//! `scopebridge` – oscilloscope command bridge.
//!
//! This binary wires the bridge together and stands in for the registry
//! runtime.  It:
//!
//! 1. Loads `~/.scopebridge/config.toml`, running a **First-Run Wizard**
//!    when the file is absent.
//! 2. Binds the ZeroMQ `ROUTER` socket and connects the `SUB` socket; a
//!    failure here is fatal.
//! 3. Registers every command and publishes every service.
//! 4. Drops the user into an **interactive REPL** that issues commands and
//!    reads published values.
//! 5. Intercepts **Ctrl-C**, stops both loops and exits.

mod config;
mod repl;
mod telemetry;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use scopebridge_middleware::{Bridge, ServiceSet, TracingNotifier};
use scopebridge_registry::CommandRegistry;

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("scopebridge");

    print_banner();

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

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the bridge …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to exit");
    }

    // The runtime is built after tracing so the OTel exporter never needs one.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(serve(cfg, shutdown));
    // The REPL thread may still be blocked on stdin after Ctrl-C.
    runtime.shutdown_timeout(Duration::from_millis(200));
    code
}

async fn serve(cfg: config::Config, shutdown: Arc<AtomicBool>) -> ExitCode {
    let services = Arc::new(ServiceSet::new(&cfg.service_config(), Arc::new(TracingNotifier)));

    let bridge = match Bridge::connect(&cfg.bridge_config(), Arc::clone(&services)) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "bridge failed to start");
            println!("{}: {}", "Fatal".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    let registry = CommandRegistry::bootstrap(bridge.outbound().clone(), &cfg.service_prefix);
    info!(
        server = %cfg.server_name,
        commands = registry.len(),
        services = services.iter().count(),
        "serving"
    );

    println!(
        "  {} {} on {} – backend state from {}",
        "✓".green().bold(),
        cfg.server_name.bold(),
        cfg.router_endpoint.yellow(),
        cfg.sub_endpoint.yellow()
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let console = repl::Console {
        registry,
        services,
        running: Arc::clone(bridge.running()),
    };
    let repl_shutdown = Arc::clone(&shutdown);
    let repl_task = tokio::task::spawn_blocking(move || repl::run(console, repl_shutdown));

    while !shutdown.load(Ordering::SeqCst) && !repl_task.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    bridge.shutdown().await;
    println!("{}", "  ✓ Bridge stopped.".green());
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     ScopeBridge First-Run Wizard     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the bridge.\n");

    let mut cfg = config::Config::default();

    cfg.router_endpoint = prompt_line(
        &format!("  Command endpoint to bind [{}]: ", cfg.router_endpoint),
        &cfg.router_endpoint,
    );
    cfg.sub_endpoint = prompt_line(
        &format!("  Backend state endpoint [{}]: ", cfg.sub_endpoint),
        &cfg.sub_endpoint,
    );
    let channels = prompt_line(
        &format!("  Oscilloscope channels [{}]: ", cfg.channel_count),
        &cfg.channel_count.to_string(),
    );
    match channels.parse::<usize>() {
        Ok(n) if n > 0 => cfg.channel_count = n,
        _ => println!(
            "  {} '{}' is not a valid channel count, keeping {}",
            "Warning:".yellow(),
            channels,
            cfg.channel_count
        ),
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
    println!("{}", r#"  ___                    ___      _    _          "#.bold().cyan());
    println!("{}", r#" / __| __ ___ _ __  ___ | _ )_ _(_)__| |__ _ ___ "#.bold().cyan());
    println!("{}", r#" \__ \/ _/ _ \ '_ \/ -_)| _ \ '_| / _` / _` / -_)"#.bold().cyan());
    println!("{}", r#" |___/\__\___/ .__/\___||___/_| |_\__,_\__, \___|"#.bold().cyan());
    println!("{}", r#"             |_|                       |___/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "ScopeBridge".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Instrument registry ↔ ZeroMQ backend bridge");
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
