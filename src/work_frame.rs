use log::info;
use std::io::{BufRead, Write};
use std::sync::atomic::AtomicBool;

use crate::config::WorkFrameConfig;
use crate::dobot::{DobotConnection, DobotInterface, WaitSettings};
use crate::error::DobotError;
use crate::prompt::Console;
use crate::types::{CartesianPose, CoordFrame, EndEffectorOffset, PtpCoordinateParams};
use crate::utils::check_shutdown;

/// Arm that interprets moves and pose reads in an active coordinate frame
pub struct FramedArm<'c, 's, D: DobotInterface> {
    connection: &'c mut DobotConnection<D>,
    frame: CoordFrame,
    wait: WaitSettings<'s>,
}

impl<'c, 's, D: DobotInterface> FramedArm<'c, 's, D> {
    /// Start out in the base frame
    pub fn new(connection: &'c mut DobotConnection<D>, wait: WaitSettings<'s>) -> Self {
        Self {
            connection,
            frame: CoordFrame::BASE,
            wait,
        }
    }

    pub fn set_coord_frame(&mut self, frame: CoordFrame) -> Result<(), DobotError> {
        frame.validate()?;
        info!(
            "Coordinate frame: [{}, {}, {}, {}, {}, {}]",
            frame.x, frame.y, frame.z, frame.rx, frame.ry, frame.rz
        );
        self.frame = frame;
        Ok(())
    }

    /// Set the tool center point offset and wait for it to apply
    pub fn set_tcp(&mut self, offset: EndEffectorOffset) -> Result<(), DobotError> {
        if let Some(index) = self.connection.set_end_effector_params(offset, true)? {
            self.connection.wait_for(index, &self.wait)?;
        }
        Ok(())
    }

    /// Set linear (mm/s) and angular (deg/s) speed for subsequent moves
    pub fn set_speed(&mut self, linear: f32, angular: f32) -> Result<(), DobotError> {
        let params = PtpCoordinateParams::from_speeds(linear, angular);
        if let Some(index) = self.connection.set_ptp_coordinate_params(params, true)? {
            self.connection.wait_for(index, &self.wait)?;
        }
        Ok(())
    }

    /// Store `home` (given in the active frame) as the device's home position
    pub fn set_home(&mut self, home: CartesianPose) -> Result<(), DobotError> {
        let base = self.frame.to_base(home);
        info!("Home position (base frame): {}", base);
        if let Some(index) = self.connection.set_home_params(base.into(), true)? {
            self.connection.wait_for(index, &self.wait)?;
        }
        Ok(())
    }

    /// Linear move to `target` in the active frame; returns once the device
    /// has finished the move
    pub fn move_linear(&mut self, target: CartesianPose) -> Result<(), DobotError> {
        check_shutdown(self.wait.shutdown)?;
        let base = self.frame.to_base(target);
        let index = self.connection.move_linear(base)?;
        info!("Linear move to {} (base {}) queued as {}", target, base, index);
        self.connection.wait_for(index, &self.wait)?;
        Ok(())
    }

    /// Current pose in the active frame
    pub fn pose(&mut self) -> Result<CartesianPose, DobotError> {
        let pose = self.connection.get_pose()?;
        Ok(self.frame.from_base(pose.cartesian()))
    }
}

/// Move the arm to the origin of the configured work frame
///
/// Zeroes the TCP, sets the speeds, stores the safe home position in the
/// base frame (overwriting the device's home parameter), then approaches
/// the work-frame origin through the safe pose. Returns the final pose in
/// the work frame.
pub fn move_to_work_frame<D, R, W>(
    connection: &mut DobotConnection<D>,
    config: &WorkFrameConfig,
    console: &mut Console<R, W>,
    shutdown: Option<&AtomicBool>,
) -> Result<CartesianPose, DobotError>
where
    D: DobotInterface,
    R: BufRead,
    W: Write,
{
    // Start from an empty, running queue so nothing stale executes first
    connection.queued_cmd_stop_exec()?;
    connection.queued_cmd_clear()?;
    connection.queued_cmd_start_exec()?;

    let wait = WaitSettings {
        poll_interval: config.poll_interval(),
        timeout: config.move_timeout(),
        shutdown,
    };
    let mut arm = FramedArm::new(connection, wait);

    // A non-zero TCP is unreliable on the Magician firmware
    arm.set_tcp(EndEffectorOffset::ZERO)?;
    arm.set_speed(config.linear_speed, config.angular_speed)?;

    arm.set_coord_frame(config.base_frame())?;
    console.say("Setting home position")?;
    arm.set_home(config.home())?;

    arm.set_coord_frame(config.work_frame())?;

    console.say("Moving to safe position ...")?;
    arm.move_linear(config.safe_pose())?;

    console.say("Moving to origin of work frame ...")?;
    arm.move_linear(CartesianPose::default())?;

    let pose = arm.pose()?;
    console.say(format!("Final pose in work frame: {}", pose))?;
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dobot::{SimCommand, SimulatedDobot};
    use crate::types::HomeParams;
    use std::io::Cursor;

    fn quick_config() -> WorkFrameConfig {
        WorkFrameConfig {
            poll_interval_ms: 1,
            move_timeout_secs: Some(5),
            ..Default::default()
        }
    }

    fn console() -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(Vec::new()), Vec::new())
    }

    #[test]
    fn test_moves_to_work_frame_origin() {
        let sim = SimulatedDobot::new().with_end_effector(EndEffectorOffset {
            x: 59.7,
            y: 0.0,
            z: 0.0,
        });
        let handle = sim.handle();
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();
        let mut console = console();

        let pose = move_to_work_frame(&mut conn, &quick_config(), &mut console, None).unwrap();
        assert_eq!(pose, CartesianPose::new(0.0, 0.0, 0.0, 0.0));

        let state = handle.lock();
        assert_eq!(state.end_effector, EndEffectorOffset::ZERO);
        assert_eq!(
            state.home,
            HomeParams {
                x: 200.0,
                y: 0.0,
                z: 80.0,
                r: 0.0
            }
        );
        let moves: Vec<CartesianPose> = state
            .history
            .iter()
            .filter_map(|c| match c {
                SimCommand::MoveLinear(target) => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(
            moves,
            vec![
                CartesianPose::new(132.0, -8.0, 67.0, 0.0),
                CartesianPose::new(132.0, -8.0, 37.0, 0.0),
            ]
        );
        drop(state);

        let printed = String::from_utf8_lossy(console.output()).into_owned();
        assert!(printed.contains("Moving to safe position ..."));
        assert!(printed.contains("Final pose in work frame: [0.00, 0.00, 0.00, 0.00]"));
    }

    #[test]
    fn test_home_stored_in_base_frame_even_with_offset_base() {
        let sim = SimulatedDobot::new();
        let handle = sim.handle();
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();
        let config = WorkFrameConfig {
            base_frame: [10.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ..quick_config()
        };

        move_to_work_frame(&mut conn, &config, &mut console(), None).unwrap();
        assert_eq!(handle.lock().home.x, 210.0);
    }

    #[test]
    fn test_failed_move_still_disconnects() {
        let sim = SimulatedDobot::new().failing_on("move_linear");
        let handle = sim.handle();
        {
            let mut conn = DobotConnection::open(sim, "", 115200).unwrap();
            let result = move_to_work_frame(&mut conn, &quick_config(), &mut console(), None);
            assert!(matches!(result, Err(DobotError::Communication { .. })));
        }
        assert!(!handle.lock().connected);
    }

    #[test]
    fn test_frame_arm_reports_pose_in_active_frame() {
        let sim = SimulatedDobot::new();
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();
        conn.queued_cmd_start_exec().unwrap();
        let mut arm = FramedArm::new(
            &mut conn,
            WaitSettings {
                poll_interval: std::time::Duration::from_millis(1),
                ..Default::default()
            },
        );
        arm.set_coord_frame(CoordFrame::new(100.0, 0.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        arm.move_linear(CartesianPose::new(50.0, 5.0, 10.0, 0.0))
            .unwrap();
        assert_eq!(arm.pose().unwrap(), CartesianPose::new(50.0, 5.0, 10.0, 0.0));
    }
}
