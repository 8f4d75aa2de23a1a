mod console;

use clap::Parser;
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use env_logger::Env;
use log::{LevelFilter, error, info, warn};
use servo_rig::{
    AppConfig, Command, Controller, LivePosition, PositionSource, config_file, list_ports,
    load_config,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::console::{ConsoleCommand, HELP, parse_line};

/// Servo Rig Console
#[derive(Parser, Debug)]
#[command(name = "servo-rig")]
#[command(about = "Stream, record and replay servo positions over a serial link", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Connect to this port at startup
    #[arg(short, long, value_name = "PORT")]
    port: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // Logging depends on the loaded verbosity, so the outcome is reported after init
    let loaded = load_config(args.config.as_deref());
    let config = loaded.as_ref().cloned().unwrap_or_default();

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.console.verbosity.clone());
    initialize_logging(&log_level)?;
    match (&loaded, config_file(args.config.as_deref())) {
        (Err(e), _) => warn!("Failed to load config ({e}), using defaults"),
        (Ok(_), Some(file)) => info!("Config file: {}", file.display()),
        (Ok(_), None) => info!("No config file, using defaults"),
    }
    log_startup_info(&config);

    let live = Arc::new(LivePosition::new(config.servo.home_position()));
    let controller = Arc::new(
        Controller::builder(live.clone())
            .with_config(config.clone())
            .build()?,
    );

    if let Some(port) = args.port.or(config.link.port.clone()) {
        report(&controller, Command::Connect { port });
    }

    let interrupts = setup_shutdown_handler()?;
    let lines = spawn_stdin_reader();
    println!("{HELP}");

    let playbacks = run_console(&controller, &live, &lines, &interrupts);

    info!("Cleaning up and shutting down...");
    controller.shutdown();
    // The closed link ends an unfinished playback at its next step
    for handle in playbacks {
        if handle.join().is_err() {
            warn!("Playback worker panicked");
        }
    }
    info!("Cleanup complete");
    Ok(())
}

/// Handle operator input until quit, Ctrl+C or end of input.
/// Returns the playback workers still to be joined.
fn run_console(
    controller: &Arc<Controller>,
    live: &Arc<LivePosition>,
    lines: &Receiver<String>,
    interrupts: &Receiver<()>,
) -> Vec<JoinHandle<()>> {
    let mut playbacks: Vec<JoinHandle<()>> = Vec::new();
    prompt();

    loop {
        select! {
            recv(interrupts) -> _ => {
                info!("Ctrl+C received - initiating graceful shutdown...");
                break;
            }
            recv(lines) -> line => {
                let Ok(line) = line else {
                    info!("Input closed");
                    break;
                };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(ConsoleCommand::Rig(Command::Play))) => {
                        // A play issued while another is in flight is rejected by the engine
                        playbacks.retain(|handle| !handle.is_finished());
                        playbacks.push(spawn_playback(controller.clone()));
                    }
                    // Shutdown itself runs once the console loop has exited
                    Ok(Some(ConsoleCommand::Rig(Command::Shutdown))) => break,
                    Ok(Some(command)) => handle_command(controller, live, command),
                    Err(message) => println!("{message}"),
                }
                prompt();
            }
        }
    }
    playbacks
}

fn handle_command(controller: &Controller, live: &LivePosition, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Rig(command) => report(controller, command),
        ConsoleCommand::SetAxis { axis, angle } => {
            let position = live.set_axis(axis, angle);
            println!("Live position: {position}");
        }
        ConsoleCommand::Pose(position) => {
            live.set(position);
            println!("Live position: {}", live.current());
        }
        ConsoleCommand::List => {
            let listing = controller.listing();
            if listing.is_empty() {
                println!("No positions recorded");
            }
            for line in listing {
                println!("{line}");
            }
        }
        ConsoleCommand::Ports => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
        }
        ConsoleCommand::Status => {
            let status = controller.status();
            match &status.port {
                Some(port) => println!("Status: Connected to {port}"),
                None => println!("Status: Not Connected"),
            }
            println!(
                "Recorded: {}  Playing: {}  Frames sent: {}  Write failures: {}",
                status.recorded,
                status.playing,
                status.link.frames_sent,
                status.link.write_failures
            );
            println!("Live position: {}", live.current());
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
}

fn report(controller: &Controller, command: Command) {
    let outcome = controller.execute(command);
    if outcome.success {
        println!("{}", outcome.message);
    } else {
        println!("Error: {}", outcome.message);
    }
}

/// Playback blocks for the whole sequence, so it runs off the input thread
fn spawn_playback(controller: Arc<Controller>) -> JoinHandle<()> {
    thread::spawn(move || {
        report(&controller, Command::Play);
        prompt();
    })
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read input: {e}");
                    break;
                }
            }
        }
    });
    rx
}

/// Setup Ctrl+C handler for graceful shutdown
fn setup_shutdown_handler() -> Result<Receiver<()>, ctrlc::Error> {
    let (tx, rx): (Sender<()>, Receiver<()>) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    Ok(rx)
}

fn prompt() {
    print!("> ");
    if let Err(e) = io::stdout().flush() {
        error!("Failed to flush stdout: {e}");
    }
}

/// Log startup information
fn log_startup_info(config: &AppConfig) {
    info!("=== Servo Rig Console ===");
    info!(
        "Link: {} baud, {} ms settle delay",
        config.link.baud_rate, config.link.settle_delay_ms
    );
    if config.streaming.enabled {
        info!(
            "Streaming every {} ms (yield to playback: {})",
            config.streaming.period_ms, config.streaming.yield_to_playback
        );
    } else {
        info!("Streaming disabled");
    }
    info!("Playback step delay: {} ms", config.playback.step_delay_ms);
    info!("Home position: {}", config.servo.home_position());
}

/// Initialize logging; `RUST_LOG` directives still refine the chosen level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = log_level.parse::<LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Warning: Invalid log level '{log_level}', using 'info'");
        LevelFilter::Info
    });

    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(Env::default())
        .format_timestamp_millis()
        .init();

    Ok(())
}
