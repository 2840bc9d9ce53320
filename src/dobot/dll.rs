//! Bindings to the vendor `DobotDll` shared library
//!
//! The library owns the serial protocol to the arm. Structs mirror
//! `DobotType.h`, which packs every struct to one byte.
#![allow(non_snake_case)]

use log::{debug, info, trace};
use std::ffi::{CStr, CString, c_char, c_int};
use std::time::Duration;

use super::interface::DobotInterface;
use crate::error::DobotError;
use crate::types::{
    ALARM_BYTES, AlarmState, CartesianPose, ConnectStatus, EndEffectorOffset, HhtTrigMode,
    HomeParams, Pose, PtpCommonParams, PtpCoordinateParams, PtpJointParams, QueuedCmdIndex,
};

/// `DobotCommunicate` return codes
const COMMUNICATE_NO_ERROR: c_int = 0;
const COMMUNICATE_BUFFER_FULL: c_int = 1;

/// `PTPMode::PTPMOVLXYZMode`: straight line in cartesian space
const PTP_MOVL_XYZ_MODE: u8 = 2;

/// Wait before resubmitting a command the device queue had no room for
const BUFFER_FULL_RETRY: Duration = Duration::from_millis(5);

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawPose {
    x: f32,
    y: f32,
    z: f32,
    r: f32,
    joint_angle: [f32; 4],
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawHomeParams {
    x: f32,
    y: f32,
    z: f32,
    r: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawHomeCmd {
    reserved: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawPtpJointParams {
    velocity: [f32; 4],
    acceleration: [f32; 4],
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawPtpCommonParams {
    velocity_ratio: f32,
    acceleration_ratio: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawPtpCoordinateParams {
    xyz_velocity: f32,
    r_velocity: f32,
    xyz_acceleration: f32,
    r_acceleration: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawEndEffectorParams {
    x_bias: f32,
    y_bias: f32,
    z_bias: f32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct RawPtpCmd {
    ptp_mode: u8,
    x: f32,
    y: f32,
    z: f32,
    r: f32,
}

#[link(name = "DobotDll")]
unsafe extern "C" {
    fn ConnectDobot(
        portName: *const c_char,
        baudrate: u32,
        fwType: *mut c_char,
        version: *mut c_char,
    ) -> c_int;
    fn DisconnectDobot() -> c_int;

    fn SetQueuedCmdStartExec() -> c_int;
    fn SetQueuedCmdStopExec() -> c_int;
    fn SetQueuedCmdClear() -> c_int;
    fn GetQueuedCmdCurrentIndex(queuedCmdCurrentIndex: *mut u64) -> c_int;

    fn GetPose(pose: *mut RawPose) -> c_int;

    fn SetHOMEParams(homeParams: *mut RawHomeParams, isQueued: bool, queuedCmdIndex: *mut u64)
    -> c_int;
    fn SetHOMECmd(homeCmd: *mut RawHomeCmd, isQueued: bool, queuedCmdIndex: *mut u64) -> c_int;
    fn SetPTPJointParams(
        ptpJointParams: *mut RawPtpJointParams,
        isQueued: bool,
        queuedCmdIndex: *mut u64,
    ) -> c_int;
    fn SetPTPCommonParams(
        ptpCommonParams: *mut RawPtpCommonParams,
        isQueued: bool,
        queuedCmdIndex: *mut u64,
    ) -> c_int;
    fn SetPTPCoordinateParams(
        ptpCoordinateParams: *mut RawPtpCoordinateParams,
        isQueued: bool,
        queuedCmdIndex: *mut u64,
    ) -> c_int;
    fn SetPTPCmd(ptpCmd: *mut RawPtpCmd, isQueued: bool, queuedCmdIndex: *mut u64) -> c_int;
    fn SetEndEffectorParams(
        endEffectorParams: *mut RawEndEffectorParams,
        isQueued: bool,
        queuedCmdIndex: *mut u64,
    ) -> c_int;
    fn GetEndEffectorParams(endEffectorParams: *mut RawEndEffectorParams) -> c_int;

    fn GetHHTTrigOutput(isTriggered: *mut bool) -> c_int;
    fn GetHHTTrigMode(hhtTrigMode: *mut c_int) -> c_int;
    fn GetHHTTrigOutputEnabled(isEnabled: *mut bool) -> c_int;

    fn GetAlarmsState(alarmsState: *mut u8, len: *mut u32, maxLen: u32) -> c_int;
    fn ClearAllAlarmsState() -> c_int;
}

fn check(command: &'static str, code: c_int) -> Result<(), DobotError> {
    trace!("{} -> {}", command, code);
    if code == COMMUNICATE_NO_ERROR {
        Ok(())
    } else {
        Err(DobotError::Communication { command, code })
    }
}

/// Submit a command, resubmitting while the device queue is full
fn submit<F>(command: &'static str, mut call: F) -> Result<(), DobotError>
where
    F: FnMut() -> c_int,
{
    loop {
        let code = call();
        if code != COMMUNICATE_BUFFER_FULL {
            return check(command, code);
        }
        debug!("{}: device queue full, retrying", command);
        std::thread::sleep(BUFFER_FULL_RETRY);
    }
}

fn queued_index(queued: bool, index: u64) -> Option<QueuedCmdIndex> {
    queued.then_some(QueuedCmdIndex(index))
}

/// Magician reached through the vendor library
///
/// The library keeps a single global connection, so only one `DobotDll`
/// should be connected per process.
#[derive(Debug, Default)]
pub struct DobotDll;

impl DobotDll {
    pub fn new() -> Self {
        Self
    }
}

impl DobotInterface for DobotDll {
    fn connect(&mut self, port_filter: &str, baud_rate: u32) -> Result<ConnectStatus, DobotError> {
        let port = CString::new(port_filter).map_err(|e| {
            DobotError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let mut fw_type = [0 as c_char; 100];
        let mut version = [0 as c_char; 100];

        let code = unsafe {
            ConnectDobot(
                port.as_ptr(),
                baud_rate,
                fw_type.as_mut_ptr(),
                version.as_mut_ptr(),
            )
        };
        let status = ConnectStatus::from_code(code).ok_or(DobotError::Communication {
            command: "ConnectDobot",
            code,
        })?;

        if status == ConnectStatus::NoError {
            // Both buffers are NUL terminated by the library
            let (kind, version) = unsafe {
                (
                    CStr::from_ptr(fw_type.as_ptr()).to_string_lossy().into_owned(),
                    CStr::from_ptr(version.as_ptr()).to_string_lossy().into_owned(),
                )
            };
            info!("Firmware: {} {}", kind, version);
        }
        Ok(status)
    }

    fn disconnect(&mut self) -> Result<(), DobotError> {
        check("DisconnectDobot", unsafe { DisconnectDobot() })
    }

    fn queued_cmd_start_exec(&mut self) -> Result<(), DobotError> {
        check("SetQueuedCmdStartExec", unsafe { SetQueuedCmdStartExec() })
    }

    fn queued_cmd_stop_exec(&mut self) -> Result<(), DobotError> {
        check("SetQueuedCmdStopExec", unsafe { SetQueuedCmdStopExec() })
    }

    fn queued_cmd_clear(&mut self) -> Result<(), DobotError> {
        check("SetQueuedCmdClear", unsafe { SetQueuedCmdClear() })
    }

    fn queued_cmd_current_index(&mut self) -> Result<QueuedCmdIndex, DobotError> {
        let mut index = 0u64;
        check("GetQueuedCmdCurrentIndex", unsafe {
            GetQueuedCmdCurrentIndex(&mut index)
        })?;
        Ok(QueuedCmdIndex(index))
    }

    fn get_pose(&mut self) -> Result<Pose, DobotError> {
        let mut raw = RawPose::default();
        check("GetPose", unsafe { GetPose(&mut raw) })?;
        let joints = raw.joint_angle;
        Ok(Pose {
            x: raw.x,
            y: raw.y,
            z: raw.z,
            r: raw.r,
            joint1: joints[0],
            joint2: joints[1],
            joint3: joints[2],
            joint4: joints[3],
        })
    }

    fn set_home_params(
        &mut self,
        params: HomeParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        let mut raw = RawHomeParams {
            x: params.x,
            y: params.y,
            z: params.z,
            r: params.r,
        };
        let mut index = 0u64;
        submit("SetHOMEParams", || unsafe {
            SetHOMEParams(&mut raw, queued, &mut index)
        })?;
        Ok(queued_index(queued, index))
    }

    fn set_ptp_joint_params(
        &mut self,
        params: PtpJointParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        let mut raw = RawPtpJointParams {
            velocity: params.velocity,
            acceleration: params.acceleration,
        };
        let mut index = 0u64;
        submit("SetPTPJointParams", || unsafe {
            SetPTPJointParams(&mut raw, queued, &mut index)
        })?;
        Ok(queued_index(queued, index))
    }

    fn set_ptp_common_params(
        &mut self,
        params: PtpCommonParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        let mut raw = RawPtpCommonParams {
            velocity_ratio: params.velocity_ratio,
            acceleration_ratio: params.acceleration_ratio,
        };
        let mut index = 0u64;
        submit("SetPTPCommonParams", || unsafe {
            SetPTPCommonParams(&mut raw, queued, &mut index)
        })?;
        Ok(queued_index(queued, index))
    }

    fn set_ptp_coordinate_params(
        &mut self,
        params: PtpCoordinateParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        let mut raw = RawPtpCoordinateParams {
            xyz_velocity: params.xyz_velocity,
            r_velocity: params.r_velocity,
            xyz_acceleration: params.xyz_acceleration,
            r_acceleration: params.r_acceleration,
        };
        let mut index = 0u64;
        submit("SetPTPCoordinateParams", || unsafe {
            SetPTPCoordinateParams(&mut raw, queued, &mut index)
        })?;
        Ok(queued_index(queued, index))
    }

    fn get_end_effector_params(&mut self) -> Result<EndEffectorOffset, DobotError> {
        let mut raw = RawEndEffectorParams::default();
        check("GetEndEffectorParams", unsafe {
            GetEndEffectorParams(&mut raw)
        })?;
        Ok(EndEffectorOffset {
            x: raw.x_bias,
            y: raw.y_bias,
            z: raw.z_bias,
        })
    }

    fn set_end_effector_params(
        &mut self,
        offset: EndEffectorOffset,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        let mut raw = RawEndEffectorParams {
            x_bias: offset.x,
            y_bias: offset.y,
            z_bias: offset.z,
        };
        let mut index = 0u64;
        submit("SetEndEffectorParams", || unsafe {
            SetEndEffectorParams(&mut raw, queued, &mut index)
        })?;
        Ok(queued_index(queued, index))
    }

    fn move_linear(&mut self, target: CartesianPose) -> Result<QueuedCmdIndex, DobotError> {
        let mut raw = RawPtpCmd {
            ptp_mode: PTP_MOVL_XYZ_MODE,
            x: target.x,
            y: target.y,
            z: target.z,
            r: target.r,
        };
        let mut index = 0u64;
        submit("SetPTPCmd", || unsafe { SetPTPCmd(&mut raw, true, &mut index) })?;
        Ok(QueuedCmdIndex(index))
    }

    fn home(&mut self) -> Result<QueuedCmdIndex, DobotError> {
        let mut raw = RawHomeCmd::default();
        let mut index = 0u64;
        submit("SetHOMECmd", || unsafe { SetHOMECmd(&mut raw, true, &mut index) })?;
        Ok(QueuedCmdIndex(index))
    }

    fn hht_trig_output(&mut self) -> Result<bool, DobotError> {
        let mut triggered = false;
        check("GetHHTTrigOutput", unsafe { GetHHTTrigOutput(&mut triggered) })?;
        Ok(triggered)
    }

    fn hht_trig_mode(&mut self) -> Result<HhtTrigMode, DobotError> {
        let mut mode: c_int = 0;
        check("GetHHTTrigMode", unsafe { GetHHTTrigMode(&mut mode) })?;
        u8::try_from(mode)
            .ok()
            .and_then(HhtTrigMode::from_code)
            .ok_or(DobotError::Communication {
                command: "GetHHTTrigMode",
                code: mode,
            })
    }

    fn hht_trig_output_enabled(&mut self) -> Result<bool, DobotError> {
        let mut enabled = false;
        check("GetHHTTrigOutputEnabled", unsafe {
            GetHHTTrigOutputEnabled(&mut enabled)
        })?;
        Ok(enabled)
    }

    fn alarms_state(&mut self) -> Result<AlarmState, DobotError> {
        let mut bytes = [0u8; ALARM_BYTES];
        let mut len = 0u32;
        check("GetAlarmsState", unsafe {
            GetAlarmsState(bytes.as_mut_ptr(), &mut len, ALARM_BYTES as u32)
        })?;
        Ok(AlarmState { bytes, len })
    }

    fn clear_all_alarms(&mut self) -> Result<(), DobotError> {
        check("ClearAllAlarmsState", unsafe { ClearAllAlarmsState() })
    }
}
