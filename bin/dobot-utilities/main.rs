use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use dobot_utilities::app::{ensure_console_allocated, initialize_logging, setup_shutdown_handler};
use dobot_utilities::config::{AppConfig, Backend, load_config};
use dobot_utilities::{Console, DobotInterface, SessionReport, SimulatedDobot, run_session};

/// Dobot Magician utilities: home the arm, collect poses by hand-hold
/// teaching, report and clear alarms
#[derive(Parser, Debug)]
#[command(name = "dobot-utilities")]
#[command(about = "Home a Dobot Magician and collect hand-taught poses", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Use the simulated arm instead of the Dobot library
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    ensure_console_allocated("Dobot Magician Utilities");

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.console.verbosity.clone());
    initialize_logging(&log_level);

    let shutdown = setup_shutdown_handler()?;
    let backend = if args.simulate {
        Backend::Simulated
    } else {
        config.connection.backend
    };
    info!("Backend: {:?}", backend);

    print_banner(&config);

    match backend {
        Backend::Simulated => run(SimulatedDobot::new(), &config, &shutdown),
        #[cfg(feature = "dobot-dll")]
        Backend::Dll => run(dobot_utilities::DobotDll::new(), &config, &shutdown),
        #[cfg(not(feature = "dobot-dll"))]
        Backend::Dll => Err(
            "this build has no DobotDll support; rebuild with `--features dobot-dll` or pass --simulate"
                .into(),
        ),
    }
}

fn run<D: DobotInterface>(
    driver: D,
    config: &AppConfig,
    shutdown: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut console = Console::stdio();
    match run_session(
        driver,
        &config.connection,
        &config.session,
        &mut console,
        Some(shutdown),
    ) {
        Ok(report) => {
            log_report(&report);
            Ok(())
        }
        Err(e) => {
            error!("Session failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_banner(config: &AppConfig) {
    println!();
    println!("========================");
    println!();
    println!("Hello! This program will:");
    println!();
    println!(" 1. Home the dobot magician robot");
    println!(" 2. Collect poses using Hand Hold Teaching mode (HHT)");
    println!(" 3. Print and clear dobot magician alarms");
    println!();
    println!(
        " The settings for this program are currently: verbose = {}, probe_tcp = {}, trigger_mode = {:?}. The default for verbose and probe_tcp is 'false'",
        config.session.verbose, config.session.probe_tcp, config.session.trigger_mode
    );
    println!(
        " Poses are saved under: {}",
        config.session.output_base_path.display()
    );
    println!();
    println!(" Let's begin...");
    println!();
    println!("========================");
    println!();
}

fn log_report(report: &SessionReport) {
    info!("Homed: {}", report.homed);
    info!("Poses collected: {}", report.poses.len());
    if let Some(dir) = &report.output_dir {
        info!("Output directory: {}", dir.display());
    }
    if let Some(alarms) = &report.alarms {
        info!("Alarms: {}", alarms);
    }
    info!("Alarms cleared: {}", report.alarms_cleared);
}
