use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DobotError;

/// Number of alarm bytes reported by the Magician firmware
pub const ALARM_BYTES: usize = 16;

/// Result of a connection attempt, as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    NoError = 0,
    NotFound = 1,
    Occupied = 2,
}

impl ConnectStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ConnectStatus::NoError),
            1 => Some(ConnectStatus::NotFound),
            2 => Some(ConnectStatus::Occupied),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectStatus::NoError => "DobotConnect_NoError",
            ConnectStatus::NotFound => "DobotConnect_NotFound",
            ConnectStatus::Occupied => "DobotConnect_Occupied",
        };
        write!(f, "{} ({})", name, *self as i32)
    }
}

/// Index of a command in the device's command queue
///
/// Indices grow monotonically; a queued command has finished once the
/// device's current index has reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueuedCmdIndex(pub u64);

impl QueuedCmdIndex {
    /// True once `current` (reported by the device) has reached this command
    pub fn is_reached_by(&self, current: QueuedCmdIndex) -> bool {
        current >= *self
    }
}

impl fmt::Display for QueuedCmdIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full arm pose: cartesian position (mm), end rotation (deg) and the
/// four joint angles (deg)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub joint1: f32,
    pub joint2: f32,
    pub joint3: f32,
    pub joint4: f32,
}

impl Pose {
    pub fn cartesian(&self) -> CartesianPose {
        CartesianPose {
            x: self.x,
            y: self.y,
            z: self.z,
            r: self.r,
        }
    }

    pub fn as_array(&self) -> [f32; 8] {
        [
            self.x,
            self.y,
            self.z,
            self.r,
            self.joint1,
            self.joint2,
            self.joint3,
            self.joint4,
        ]
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.as_array().iter().map(|v| format!("{:.2}", v)).collect();
        write!(f, "[{}]", values.join(", "))
    }
}

/// Cartesian target for a linear move (mm, deg)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CartesianPose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
}

impl CartesianPose {
    pub fn new(x: f32, y: f32, z: f32, r: f32) -> Self {
        Self { x, y, z, r }
    }
}

impl From<[f32; 4]> for CartesianPose {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl fmt::Display for CartesianPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}, {:.2}, {:.2}]",
            self.x, self.y, self.z, self.r
        )
    }
}

/// Coordinate frame `(x, y, z, rx, ry, rz)` against which linear moves
/// are interpreted. Angles in degrees.
///
/// The Magician only rotates about z, so `rx` and `ry` must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordFrame {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
}

impl CoordFrame {
    pub const BASE: CoordFrame = CoordFrame {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        rx: 0.0,
        ry: 0.0,
        rz: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32, rx: f32, ry: f32, rz: f32) -> Self {
        Self { x, y, z, rx, ry, rz }
    }

    pub fn validate(&self) -> Result<(), DobotError> {
        if self.rx != 0.0 || self.ry != 0.0 {
            return Err(DobotError::InvalidFrame(format!(
                "rx and ry must be zero for a 4-axis arm (got rx={}, ry={})",
                self.rx, self.ry
            )));
        }
        Ok(())
    }

    /// Express a pose given in this frame in base coordinates
    pub fn to_base(&self, pose: CartesianPose) -> CartesianPose {
        let (s, c) = self.rz.to_radians().sin_cos();
        CartesianPose {
            x: self.x + c * pose.x - s * pose.y,
            y: self.y + s * pose.x + c * pose.y,
            z: self.z + pose.z,
            r: pose.r + self.rz,
        }
    }

    /// Express a base-frame pose in this frame
    pub fn from_base(&self, pose: CartesianPose) -> CartesianPose {
        let (s, c) = self.rz.to_radians().sin_cos();
        let dx = pose.x - self.x;
        let dy = pose.y - self.y;
        CartesianPose {
            x: c * dx + s * dy,
            y: -s * dx + c * dy,
            z: pose.z - self.z,
            r: pose.r - self.rz,
        }
    }
}

impl From<[f32; 6]> for CoordFrame {
    fn from(v: [f32; 6]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}

/// Raw alarm bitset. Bit meanings are firmware defined and not decoded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmState {
    pub bytes: [u8; ALARM_BYTES],
    pub len: u32,
}

impl AlarmState {
    pub fn is_clear(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: Vec<String> = self.bytes.iter().map(|b| b.to_string()).collect();
        write!(f, "{}", bytes.join(" | "))
    }
}

/// Tool center point offset from the end effector flange (mm)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EndEffectorOffset {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EndEffectorOffset {
    pub const ZERO: EndEffectorOffset = EndEffectorOffset {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

/// Position the arm returns to when homing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HomeParams {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
}

impl From<CartesianPose> for HomeParams {
    fn from(p: CartesianPose) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            r: p.r,
        }
    }
}

/// Per-joint velocity and acceleration limits for point-to-point moves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtpJointParams {
    pub velocity: [f32; 4],
    pub acceleration: [f32; 4],
}

impl Default for PtpJointParams {
    fn default() -> Self {
        Self {
            velocity: [200.0; 4],
            acceleration: [200.0; 4],
        }
    }
}

/// Velocity and acceleration ratios (percent) applied to every PTP move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtpCommonParams {
    pub velocity_ratio: f32,
    pub acceleration_ratio: f32,
}

impl Default for PtpCommonParams {
    fn default() -> Self {
        Self {
            velocity_ratio: 100.0,
            acceleration_ratio: 100.0,
        }
    }
}

/// Cartesian speed limits for PTP moves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtpCoordinateParams {
    pub xyz_velocity: f32,
    pub r_velocity: f32,
    pub xyz_acceleration: f32,
    pub r_acceleration: f32,
}

impl PtpCoordinateParams {
    /// Linear and angular speed with matching accelerations
    pub fn from_speeds(linear_speed: f32, angular_speed: f32) -> Self {
        Self {
            xyz_velocity: linear_speed,
            r_velocity: angular_speed,
            xyz_acceleration: linear_speed,
            r_acceleration: angular_speed,
        }
    }
}

/// How the hand-hold-teach button raises its trigger flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HhtTrigMode {
    TriggeredOnKeyReleased = 0,
    TriggeredOnPeriodicInterval = 1,
}

impl HhtTrigMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HhtTrigMode::TriggeredOnKeyReleased),
            1 => Some(HhtTrigMode::TriggeredOnPeriodicInterval),
            _ => None,
        }
    }
}

/// How the capture loop turns trigger readings into pose captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerMode {
    /// Every poll that reads the flag as set records a pose, so a
    /// sustained reading records on consecutive polls
    #[default]
    Level,
    /// Only a not-set to set transition records a pose
    RisingEdge,
}
