use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use dobot_utilities::app::{ensure_console_allocated, initialize_logging, setup_shutdown_handler};
use dobot_utilities::config::{AppConfig, Backend, load_config};
use dobot_utilities::{Console, DobotConnection, DobotInterface, SimulatedDobot, move_to_work_frame};

/// Move a Dobot Magician to the origin of the experiment work frame
#[derive(Parser, Debug)]
#[command(name = "move-to-pose")]
#[command(about = "Move a Dobot Magician to a fixed starting pose", long_about = None)]
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
    ensure_console_allocated("Dobot Magician Move To Pose");

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
    info!("Work frame: {:?}", config.work_frame.work_frame());

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
    let mut connection =
        DobotConnection::open(driver, &config.connection.port, config.connection.baud_rate)?;
    let mut console = Console::stdio();

    match move_to_work_frame(&mut connection, &config.work_frame, &mut console, Some(shutdown)) {
        Ok(pose) => {
            info!("Arm at work frame origin: {}", pose);
            connection.close()?;
            Ok(())
        }
        Err(e) => {
            error!("Move to work frame failed: {}", e);
            Err(e.into())
        }
    }
}
