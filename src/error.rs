use std::path::PathBuf;

use thiserror::Error;

use crate::types::ConnectStatus;

#[derive(Error, Debug)]
pub enum DobotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection failed: {0}")]
    Connect(ConnectStatus),
    #[error("Not connected to a Dobot")]
    NotConnected,
    #[error("Command {command} failed with driver code {code}")]
    Communication { command: &'static str, code: i32 },
    #[error("Timed out waiting for the device")]
    Timeout,
    #[error("Interrupted by user")]
    Interrupted,
    #[error("Invalid coordinate frame: {0}")]
    InvalidFrame(String),
    #[error("Output directory already exists: {}", .0.display())]
    OutputExists(PathBuf),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
