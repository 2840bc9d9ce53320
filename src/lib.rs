pub mod app;
pub mod capture;
pub mod config;
pub mod dobot;
pub mod error;
pub mod pose_log;
pub mod prompt;
pub mod teach_session;
pub mod types;
pub mod utils;
pub mod work_frame;

pub use capture::{CaptureSettings, capture_poses};
pub use crate::config::{AppConfig, Backend, ConnectionConfig, SessionConfig, WorkFrameConfig, load_config};
pub use dobot::{DobotConnection, DobotInterface, SimulatedDobot, WaitSettings};
#[cfg(feature = "dobot-dll")]
pub use dobot::DobotDll;
pub use error::DobotError;
pub use prompt::Console;
pub use teach_session::{SessionReport, TcpProbe, run_session};
pub use types::{
    AlarmState, CartesianPose, ConnectStatus, CoordFrame, EndEffectorOffset, HhtTrigMode,
    HomeParams, Pose, PtpCommonParams, PtpCoordinateParams, PtpJointParams, QueuedCmdIndex,
    TriggerMode,
};
pub use work_frame::{FramedArm, move_to_work_frame};
