use chrono::{DateTime, TimeZone};
use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::DobotError;
use crate::types::{EndEffectorOffset, Pose};

/// Sub-folder of the output base path holding one directory per capture session
pub const SESSION_FOLDER: &str = "HHT_Poses";
pub const POSES_FILE: &str = "poses.csv";
pub const TCP_FILE: &str = "TCP.csv";

pub const POSE_COLUMNS: [&str; 8] = [
    "x", "y", "z", "r", "joint1", "joint2", "joint3", "joint4",
];
pub const TCP_COLUMNS: [&str; 3] = ["x", "y", "z"];

/// `<base>/HHT_Poses/<MMDDHHMM>` for a session started at `started`
pub fn session_dir<Tz: TimeZone>(base: &Path, started: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    base.join(SESSION_FOLDER)
        .join(started.format("%m%d%H%M").to_string())
}

/// Create the session directory
///
/// Missing parents are created, but the session directory itself must be
/// new: an existing one is reported as [`DobotError::OutputExists`].
pub fn create_session_dir<Tz: TimeZone>(
    base: &Path,
    started: &DateTime<Tz>,
) -> Result<PathBuf, DobotError>
where
    Tz::Offset: std::fmt::Display,
{
    let dir = session_dir(base, started);
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(&dir) {
        Ok(()) => Ok(dir),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(DobotError::OutputExists(dir)),
        Err(e) => Err(e.into()),
    }
}

fn table_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<fs::File>, DobotError> {
    // Header written by hand so an empty table still has one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    Ok(writer)
}

/// Write captured poses as `x,y,z,r,joint1,joint2,joint3,joint4` rows
pub fn write_pose_table(path: &Path, poses: &[Pose]) -> Result<(), DobotError> {
    let mut writer = table_writer(path, &POSE_COLUMNS)?;
    for pose in poses {
        writer.serialize(pose)?;
    }
    writer.flush()?;
    info!("Wrote {} poses to {}", poses.len(), path.display());
    Ok(())
}

/// Write the probed tool center point offset as a single `x,y,z` row
pub fn write_tcp_table(path: &Path, offset: &EndEffectorOffset) -> Result<(), DobotError> {
    let mut writer = table_writer(path, &TCP_COLUMNS)?;
    writer.serialize(offset)?;
    writer.flush()?;
    info!("Wrote TCP offset to {}", path.display());
    Ok(())
}

/// Write a session's tables into a fresh session directory and return it
pub fn save_session<Tz: TimeZone>(
    base: &Path,
    started: &DateTime<Tz>,
    poses: &[Pose],
    tcp: Option<&EndEffectorOffset>,
) -> Result<PathBuf, DobotError>
where
    Tz::Offset: std::fmt::Display,
{
    let dir = create_session_dir(base, started)?;
    write_pose_table(&dir.join(POSES_FILE), poses)?;
    if let Some(offset) = tcp {
        write_tcp_table(&dir.join(TCP_FILE), offset)?;
    }
    Ok(dir)
}
