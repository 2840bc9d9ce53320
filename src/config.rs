use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{
    CartesianPose, CoordFrame, HomeParams, PtpCommonParams, PtpJointParams, TriggerMode,
};

/// Environment variable that overrides `session.output_base_path`
pub const DATAPATH_ENV: &str = "DATAPATH";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub console: ConsoleConfig,
    pub session: SessionConfig,
    pub work_frame: WorkFrameConfig,
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.session.validate()?;
        self.work_frame.validate()?;
        Ok(())
    }
}

/// Which driver talks to the arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Vendor DobotDll (needs the `dobot-dll` feature)
    #[default]
    Dll,
    /// In-process simulator, no hardware
    Simulated,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port search filter; empty searches every port
    pub port: String,
    pub baud_rate: u32,
    pub backend: Backend,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            backend: Backend::Dll,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Message(
                "connection.baud_rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

/// Settings for the homing and teach-capture session
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Print queue indices and HHT trigger settings along the way
    pub verbose: bool,
    /// Read, zero and re-read the end-effector offset. Off by default:
    /// the Magician firmware mishandles a non-zero tool center point.
    pub probe_tcp: bool,
    /// Captured poses go to `<output_base_path>/HHT_Poses/<MMDDHHMM>`
    pub output_base_path: PathBuf,
    pub trigger_mode: TriggerMode,
    /// Delay between queue-index polls while homing (ms)
    pub poll_interval_ms: u64,
    /// Delay between trigger polls while capturing (ms)
    pub capture_poll_interval_ms: u64,
    /// Give up waiting for homing after this many seconds (unbounded if unset)
    pub homing_timeout_secs: Option<u64>,
    /// Home position `[x, y, z, r]`
    pub home: [f32; 4],
    pub joint_params: PtpJointParams,
    pub common_params: PtpCommonParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            probe_tcp: false,
            output_base_path: PathBuf::from("./data"),
            trigger_mode: TriggerMode::Level,
            poll_interval_ms: 100,
            capture_poll_interval_ms: 10,
            homing_timeout_secs: None,
            home: [180.0, 0.0, 80.0, 0.0],
            joint_params: PtpJointParams::default(),
            common_params: PtpCommonParams::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "session.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.output_base_path.as_os_str().is_empty() {
            return Err(ConfigError::Message(
                "session.output_base_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn home_params(&self) -> HomeParams {
        CartesianPose::from(self.home).into()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn capture_poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture_poll_interval_ms)
    }

    pub fn homing_timeout(&self) -> Option<Duration> {
        self.homing_timeout_secs.map(Duration::from_secs)
    }
}

/// Settings for moving to the origin of the work frame
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct WorkFrameConfig {
    /// Frame the home position is stored in `[x, y, z, rx, ry, rz]`
    pub base_frame: [f32; 6],
    /// Frame whose origin the arm moves to `[x, y, z, rx, ry, rz]`.
    /// `[129, -8, 33, 0, 0, 0]` suits sliding, `[132, -8, 37, 0, 0, 0]` tapping.
    pub work_frame: [f32; 6],
    /// Safe home position in the base frame `[x, y, z, r]`
    pub home: [f32; 4],
    /// Intermediate pose in the work frame, approached before the origin
    pub safe_pose: [f32; 4],
    /// Linear speed (mm/s)
    pub linear_speed: f32,
    /// Angular speed (deg/s)
    pub angular_speed: f32,
    pub poll_interval_ms: u64,
    /// Give up on a single move after this many seconds (unbounded if unset)
    pub move_timeout_secs: Option<u64>,
}

impl Default for WorkFrameConfig {
    fn default() -> Self {
        Self {
            base_frame: [0.0; 6],
            work_frame: [132.0, -8.0, 37.0, 0.0, 0.0, 0.0],
            home: [200.0, 0.0, 80.0, 0.0],
            safe_pose: [0.0, 0.0, 30.0, 0.0],
            linear_speed: 100.0,
            angular_speed: 100.0,
            poll_interval_ms: 100,
            move_timeout_secs: Some(60),
        }
    }
}

impl WorkFrameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, frame) in [("base_frame", self.base_frame), ("work_frame", self.work_frame)] {
            CoordFrame::from(frame)
                .validate()
                .map_err(|e| ConfigError::Message(format!("work_frame.{}: {}", name, e)))?;
        }
        if self.linear_speed <= 0.0 || self.angular_speed <= 0.0 {
            return Err(ConfigError::Message(format!(
                "work_frame speeds must be positive (got linear {}, angular {})",
                self.linear_speed, self.angular_speed
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "work_frame.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_frame(&self) -> CoordFrame {
        self.base_frame.into()
    }

    pub fn work_frame(&self) -> CoordFrame {
        self.work_frame.into()
    }

    pub fn home(&self) -> CartesianPose {
        self.home.into()
    }

    pub fn safe_pose(&self) -> CartesianPose {
        self.safe_pose.into()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn move_timeout(&self) -> Option<Duration> {
        self.move_timeout_secs.map(Duration::from_secs)
    }
}

/// Load configuration from file with layered fallbacks
///
/// Layers, lowest first: built-in defaults, the config file (the given
/// path, or the first of `config.toml` / `dobot_config.toml` found in the
/// working directory), `DOBOT__SECTION__KEY` environment variables, and
/// finally `DATAPATH` for the output base path.
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        let possible_paths = ["config.toml", "dobot_config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    builder = builder
        .add_source(
            Environment::with_prefix("DOBOT")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option(
            "session.output_base_path",
            std::env::var(DATAPATH_ENV).ok(),
        )?;

    let config = builder.build()?;
    let app_config = config.try_deserialize::<AppConfig>()?;

    app_config.validate()?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Tests that read or change process environment variables hold this
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    fn set_env(key: &str, value: &str) {
        // SAFETY: every test touching the environment holds ENV_LOCK
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        // SAFETY: as in set_env
        unsafe { std::env::remove_var(key) }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert!(!config.session.verbose);
        assert!(!config.session.probe_tcp);
        assert_eq!(config.session.trigger_mode, TriggerMode::Level);
        assert_eq!(config.connection.baud_rate, 115200);
        assert_eq!(config.work_frame.work_frame(), CoordFrame::new(132.0, -8.0, 37.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[session]\nverbose = true\ntrigger_mode = \"rising-edge\"\nhoming_timeout_secs = 30\n\n[work_frame]\nwork_frame = [129.0, -8.0, 33.0, 0.0, 0.0, 0.0]"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert!(config.session.verbose);
        assert_eq!(config.session.trigger_mode, TriggerMode::RisingEdge);
        assert_eq!(config.session.homing_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.session.poll_interval_ms, 100);
        assert_eq!(config.work_frame.work_frame[0], 129.0);
        assert_eq!(config.work_frame.linear_speed, 100.0);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_config(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_layers_override_defaults() {
        let _env = ENV_LOCK.lock();
        set_env(DATAPATH_ENV, "/tmp/dobot_data");
        set_env("DOBOT__SESSION__VERBOSE", "true");
        set_env("DOBOT__CONNECTION__BAUD_RATE", "9600");

        let loaded = load_config(None);

        set_env(DATAPATH_ENV, "");
        let empty_datapath = load_config(None);

        remove_env(DATAPATH_ENV);
        remove_env("DOBOT__SESSION__VERBOSE");
        remove_env("DOBOT__CONNECTION__BAUD_RATE");

        let config = loaded.unwrap();
        assert_eq!(config.session.output_base_path, PathBuf::from("/tmp/dobot_data"));
        assert!(config.session.verbose);
        assert_eq!(config.connection.baud_rate, 9600);

        let err = empty_datapath.unwrap_err();
        assert!(err.to_string().contains("output_base_path must not be empty"));
    }

    #[test]
    fn test_datapath_beats_config_file() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[session]\noutput_base_path = \"/from/file\"").unwrap();

        remove_env(DATAPATH_ENV);
        let from_file = load_config(Some(file.path()));
        set_env(DATAPATH_ENV, "/from/env");
        let from_env = load_config(Some(file.path()));
        remove_env(DATAPATH_ENV);

        assert_eq!(
            from_file.unwrap().session.output_base_path,
            PathBuf::from("/from/file")
        );
        assert_eq!(
            from_env.unwrap().session.output_base_path,
            PathBuf::from("/from/env")
        );
    }

    #[test]
    fn test_tilted_work_frame_rejected() {
        let config = WorkFrameConfig {
            work_frame: [132.0, -8.0, 37.0, 0.0, 15.0, 0.0],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = SessionConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
