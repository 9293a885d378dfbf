//! REPL – interactive stand-in for registry clients.
//!
//! Supported commands:
//!   /help            – show this list
//!   /commands        – list registered commands with their shapes
//!   /services        – list published values with size and age
//!   /status          – backend peer and loop state
//!   /get <SERVICE>   – print a published value
//!   /quit | /exit    – shut the bridge down
//!   <COMMAND> <args> – issue a command, e.g. `SCOPE/TRIGGER/SET_LEVEL 0.5`

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use scopebridge_middleware::{PublishedSlot, ServiceSet};
use scopebridge_registry::CommandRegistry;

/// Longest value `/get` prints before eliding the rest.
const PREVIEW_BYTES: usize = 512;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Help,
    Commands,
    Services,
    Status,
    Get(&'a str),
    Quit,
    Issue { name: &'a str, args: &'a str },
    Unknown(&'a str),
}

/// Split a line into an [`Input`].  Command arguments keep their inner
/// spacing.
pub fn parse_line(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/help" => Input::Help,
        "/commands" => Input::Commands,
        "/services" => Input::Services,
        "/status" => Input::Status,
        "/get" if !rest.is_empty() => Input::Get(rest),
        "/quit" | "/exit" => Input::Quit,
        other if other.starts_with('/') => Input::Unknown(line),
        name => Input::Issue { name, args: rest },
    }
}

/// Everything the REPL reads from or writes to.
pub struct Console {
    pub registry: CommandRegistry,
    pub services: Arc<ServiceSet>,
    /// Loop running flag of the bridge.
    pub running: Arc<AtomicBool>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(console: Console, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "scope>".bold().cyan());
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

        match parse_line(&line) {
            Input::Empty => {}
            Input::Help => cmd_help(),
            Input::Commands => cmd_commands(&console),
            Input::Services => cmd_services(&console),
            Input::Status => cmd_status(&console),
            Input::Get(name) => cmd_get(&console, name),
            Input::Quit => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Input::Issue { name, args } => cmd_issue(&console, name, args),
            Input::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
    shutdown.store(true, Ordering::SeqCst);
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Bridge Commands".bold().underline());
    println!("  {}         – list registered commands", "/commands".bold().cyan());
    println!("  {}         – list published values", "/services".bold().cyan());
    println!("  {}           – backend connection and loops", "/status".bold().cyan());
    println!("  {}    – print a published value", "/get <SERVICE>".bold().cyan());
    println!("  {}     – stop the bridge and exit", "/quit  /exit".bold().cyan());
    println!("  {}  – issue a command", "<COMMAND> <args>".bold().cyan());
    println!();
}

fn cmd_commands(console: &Console) {
    println!("{}", "Registered Commands".bold().underline());
    for d in console.registry.iter() {
        let descriptor = d.descriptor();
        println!(
            "  {:<36} {:<8} {}",
            d.name().bold(),
            descriptor.shape().format().yellow(),
            descriptor.verb().unwrap_or("raw_query | raw_write").dimmed()
        );
    }
}

fn cmd_services(console: &Console) {
    println!("{}", "Published Values".bold().underline());
    for slot in console.services.iter() {
        println!(
            "  {:<28} {:>7} / {:<7} {}",
            slot.name().bold(),
            slot.len(),
            slot.capacity(),
            age(slot).dimmed()
        );
    }
}

fn cmd_status(console: &Console) {
    let channel = console.registry.channel();
    println!("{}", "Bridge Status".bold().underline());
    match channel.session().current() {
        Some(peer) => println!("  Backend : {} ({})", "connected".green(), peer.to_string().dimmed()),
        None => println!("  Backend : {}", "waiting for handshake".yellow()),
    }
    let loops = if console.running.load(Ordering::Acquire) {
        "running".green()
    } else {
        "stopped".red()
    };
    println!("  Loops   : {loops}");
    println!("  Reply   : {}", channel.reply().text());
}

fn cmd_get(console: &Console, name: &str) {
    let Some(slot) = console.services.find(name) else {
        println!("{} '{}'", "Unknown service:".red(), name.yellow());
        return;
    };
    let value = slot.snapshot();
    let shown = &value[..value.len().min(PREVIEW_BYTES)];
    println!("{}", String::from_utf8_lossy(shown));
    if shown.len() < value.len() {
        println!("  {}", format!("… {} more bytes", value.len() - shown.len()).dimmed());
    }
}

fn cmd_issue(console: &Console, name: &str, args: &str) {
    match console.registry.invoke_text(name, args) {
        Ok(()) => println!(
            "  {} {} – reply will appear on {}",
            "✓".green(),
            name.bold(),
            console.services.reply().name().cyan()
        ),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn age(slot: &PublishedSlot) -> String {
    match slot.last_updated() {
        Some(at) => {
            let ms = (Utc::now() - at).num_milliseconds();
            format!("updated {ms} ms ago")
        }
        None => "never updated".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_line("/help"), Input::Help);
        assert_eq!(parse_line("  /status  "), Input::Status);
        assert_eq!(parse_line("/exit"), Input::Quit);
        assert_eq!(parse_line("/get SCOPE/REPLY"), Input::Get("SCOPE/REPLY"));
        assert_eq!(parse_line(""), Input::Empty);
    }

    #[test]
    fn get_without_name_is_unknown() {
        assert_eq!(parse_line("/get"), Input::Unknown("/get"));
        assert_eq!(parse_line("/settings"), Input::Unknown("/settings"));
    }

    #[test]
    fn command_arguments_keep_inner_spaces() {
        assert_eq!(
            parse_line("SCOPE/RAW CH1:SCALE 1.0\n"),
            Input::Issue { name: "SCOPE/RAW", args: "CH1:SCALE 1.0" }
        );
        assert_eq!(
            parse_line("SCOPE/CHANNEL/SET_SCALE 2 0.5"),
            Input::Issue { name: "SCOPE/CHANNEL/SET_SCALE", args: "2 0.5" }
        );
    }

    #[test]
    fn command_without_arguments() {
        assert_eq!(
            parse_line("SCOPE/TRIGGER/SET_SLOPE"),
            Input::Issue { name: "SCOPE/TRIGGER/SET_SLOPE", args: "" }
        );
    }
}
