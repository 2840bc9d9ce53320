use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::interface::DobotInterface;
use crate::error::DobotError;
use crate::types::{
    AlarmState, CartesianPose, ConnectStatus, EndEffectorOffset, HhtTrigMode, HomeParams, Pose,
    PtpCommonParams, PtpCoordinateParams, PtpJointParams, QueuedCmdIndex,
};

/// Driver code the simulator reports for injected failures (communication timeout)
const INJECTED_FAILURE_CODE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    SetHome(HomeParams),
    JointParams(PtpJointParams),
    CommonParams(PtpCommonParams),
    CoordinateParams(PtpCoordinateParams),
    EndEffector(EndEffectorOffset),
    MoveLinear(CartesianPose),
    Home,
}

/// Observable state of a [`SimulatedDobot`]
#[derive(Debug)]
pub struct SimState {
    pub connect_status: ConnectStatus,
    pub connected: bool,
    pub executing: bool,
    pub pose: Pose,
    pub home: HomeParams,
    pub end_effector: EndEffectorOffset,
    pub joint_params: PtpJointParams,
    pub common_params: PtpCommonParams,
    pub coordinate_params: PtpCoordinateParams,
    pub trig_mode: HhtTrigMode,
    pub alarms: AlarmState,
    /// Index handed to the most recently queued command
    pub last_queued: u64,
    /// Index of the last command the simulated device executed
    pub executed: u64,
    pub queue: VecDeque<(u64, SimCommand)>,
    /// Commands in execution order
    pub history: Vec<SimCommand>,
    /// Scripted replies for the current-index query, consumed front first
    pub index_script: VecDeque<u64>,
    /// Scripted trigger readings, consumed front first; `false` once empty
    pub trigger_script: VecDeque<bool>,
    /// Poses the operator's hand moves the arm through, one per trigger poll
    pub hand_path: VecDeque<Pose>,
    /// Name of a driver call that fails every time it is made
    pub fail_on: Option<&'static str>,
    /// Every driver call in order
    pub calls: Vec<&'static str>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            connect_status: ConnectStatus::NoError,
            connected: false,
            executing: false,
            pose: pose_at(CartesianPose::new(200.0, 0.0, 80.0, 0.0)),
            home: HomeParams {
                x: 200.0,
                y: 0.0,
                z: 80.0,
                r: 0.0,
            },
            end_effector: EndEffectorOffset::ZERO,
            joint_params: PtpJointParams::default(),
            common_params: PtpCommonParams::default(),
            coordinate_params: PtpCoordinateParams::from_speeds(100.0, 100.0),
            trig_mode: HhtTrigMode::TriggeredOnKeyReleased,
            alarms: AlarmState {
                bytes: [0; crate::types::ALARM_BYTES],
                len: crate::types::ALARM_BYTES as u32,
            },
            last_queued: 0,
            executed: 0,
            queue: VecDeque::new(),
            history: Vec::new(),
            index_script: VecDeque::new(),
            trigger_script: VecDeque::new(),
            hand_path: VecDeque::new(),
            fail_on: None,
            calls: Vec::new(),
        }
    }
}

impl SimState {
    /// Run every pending command if the queue is executing
    fn run_queue(&mut self) {
        if !self.executing {
            return;
        }
        while let Some((index, command)) = self.queue.pop_front() {
            match command {
                SimCommand::SetHome(params) => self.home = params,
                SimCommand::JointParams(params) => self.joint_params = params,
                SimCommand::CommonParams(params) => self.common_params = params,
                SimCommand::CoordinateParams(params) => self.coordinate_params = params,
                SimCommand::EndEffector(offset) => self.end_effector = offset,
                SimCommand::MoveLinear(target) => self.pose = pose_at(target),
                SimCommand::Home => {
                    let home = self.home;
                    self.pose = pose_at(CartesianPose::new(home.x, home.y, home.z, home.r));
                }
            }
            debug!("Simulated Dobot executed command {}: {:?}", index, command);
            self.history.push(command);
            self.executed = index;
        }
    }

    fn enqueue(&mut self, command: SimCommand) -> QueuedCmdIndex {
        self.last_queued += 1;
        self.queue.push_back((self.last_queued, command));
        QueuedCmdIndex(self.last_queued)
    }
}

/// Pose for a cartesian target
///
/// Only the base rotation (joint1) and the end rotation (joint4) follow
/// directly from the target; the arm joints are left at zero.
fn pose_at(target: CartesianPose) -> Pose {
    let joint1 = target.y.atan2(target.x).to_degrees();
    Pose {
        x: target.x,
        y: target.y,
        z: target.z,
        r: target.r,
        joint1,
        joint2: 0.0,
        joint3: 0.0,
        joint4: target.r - joint1,
    }
}

/// In-process stand-in for a Magician
///
/// Queued commands execute instantly once queue execution is started.
/// Replies can be scripted for deterministic tests, and the shared
/// [`handle`](SimulatedDobot::handle) keeps the state observable after
/// the simulator has been moved into a connection.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDobot {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDobot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<Mutex<SimState>> {
        self.state.clone()
    }

    pub fn with_connect_status(self, status: ConnectStatus) -> Self {
        self.state.lock().connect_status = status;
        self
    }

    pub fn with_pose(self, pose: Pose) -> Self {
        self.state.lock().pose = pose;
        self
    }

    pub fn with_index_sequence(self, indices: Vec<u64>) -> Self {
        self.state.lock().index_script = indices.into();
        self
    }

    pub fn with_trigger_sequence(self, triggers: Vec<bool>) -> Self {
        self.state.lock().trigger_script = triggers.into();
        self
    }

    pub fn with_hand_guided_path(self, poses: Vec<Pose>) -> Self {
        self.state.lock().hand_path = poses.into();
        self
    }

    pub fn with_end_effector(self, offset: EndEffectorOffset) -> Self {
        self.state.lock().end_effector = offset;
        self
    }

    pub fn with_alarms(self, bytes: [u8; crate::types::ALARM_BYTES]) -> Self {
        self.state.lock().alarms.bytes = bytes;
        self
    }

    pub fn failing_on(self, call: &'static str) -> Self {
        self.state.lock().fail_on = Some(call);
        self
    }

    /// Record a call and apply injected failures
    fn call(&self, name: &'static str) -> Result<parking_lot::MutexGuard<'_, SimState>, DobotError> {
        let mut state = self.state.lock();
        state.calls.push(name);
        if state.fail_on == Some(name) {
            return Err(DobotError::Communication {
                command: name,
                code: INJECTED_FAILURE_CODE,
            });
        }
        if name != "connect" && !state.connected {
            return Err(DobotError::NotConnected);
        }
        Ok(state)
    }

    fn set(
        &self,
        name: &'static str,
        command: SimCommand,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        let mut state = self.call(name)?;
        if queued {
            let index = state.enqueue(command);
            state.run_queue();
            Ok(Some(index))
        } else {
            // Immediate commands bypass the queue
            let executing = state.executing;
            let executed = state.executed;
            let pending = std::mem::take(&mut state.queue);
            state.executing = true;
            state.queue.push_back((executed, command));
            state.run_queue();
            state.queue = pending;
            state.executing = executing;
            Ok(None)
        }
    }
}

impl DobotInterface for SimulatedDobot {
    fn connect(&mut self, port_filter: &str, baud_rate: u32) -> Result<ConnectStatus, DobotError> {
        let mut state = self.call("connect")?;
        debug!(
            "Simulated Dobot connect (filter {:?}, {} baud)",
            port_filter, baud_rate
        );
        state.connected = state.connect_status == ConnectStatus::NoError;
        Ok(state.connect_status)
    }

    fn disconnect(&mut self) -> Result<(), DobotError> {
        let mut state = self.call("disconnect")?;
        state.connected = false;
        state.executing = false;
        Ok(())
    }

    fn queued_cmd_start_exec(&mut self) -> Result<(), DobotError> {
        let mut state = self.call("queued_cmd_start_exec")?;
        state.executing = true;
        state.run_queue();
        Ok(())
    }

    fn queued_cmd_stop_exec(&mut self) -> Result<(), DobotError> {
        let mut state = self.call("queued_cmd_stop_exec")?;
        state.executing = false;
        Ok(())
    }

    fn queued_cmd_clear(&mut self) -> Result<(), DobotError> {
        let mut state = self.call("queued_cmd_clear")?;
        state.queue.clear();
        Ok(())
    }

    fn queued_cmd_current_index(&mut self) -> Result<QueuedCmdIndex, DobotError> {
        let mut state = self.call("queued_cmd_current_index")?;
        if let Some(index) = state.index_script.pop_front() {
            return Ok(QueuedCmdIndex(index));
        }
        state.run_queue();
        Ok(QueuedCmdIndex(state.executed))
    }

    fn get_pose(&mut self) -> Result<Pose, DobotError> {
        let mut state = self.call("get_pose")?;
        state.run_queue();
        Ok(state.pose)
    }

    fn set_home_params(
        &mut self,
        params: HomeParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        self.set("set_home_params", SimCommand::SetHome(params), queued)
    }

    fn set_ptp_joint_params(
        &mut self,
        params: PtpJointParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        self.set("set_ptp_joint_params", SimCommand::JointParams(params), queued)
    }

    fn set_ptp_common_params(
        &mut self,
        params: PtpCommonParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        self.set("set_ptp_common_params", SimCommand::CommonParams(params), queued)
    }

    fn set_ptp_coordinate_params(
        &mut self,
        params: PtpCoordinateParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        self.set(
            "set_ptp_coordinate_params",
            SimCommand::CoordinateParams(params),
            queued,
        )
    }

    fn get_end_effector_params(&mut self) -> Result<EndEffectorOffset, DobotError> {
        let state = self.call("get_end_effector_params")?;
        Ok(state.end_effector)
    }

    fn set_end_effector_params(
        &mut self,
        offset: EndEffectorOffset,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError> {
        self.set("set_end_effector_params", SimCommand::EndEffector(offset), queued)
    }

    fn move_linear(&mut self, target: CartesianPose) -> Result<QueuedCmdIndex, DobotError> {
        let mut state = self.call("move_linear")?;
        let index = state.enqueue(SimCommand::MoveLinear(target));
        state.run_queue();
        Ok(index)
    }

    fn home(&mut self) -> Result<QueuedCmdIndex, DobotError> {
        let mut state = self.call("home")?;
        let index = state.enqueue(SimCommand::Home);
        state.run_queue();
        Ok(index)
    }

    fn hht_trig_output(&mut self) -> Result<bool, DobotError> {
        let mut state = self.call("hht_trig_output")?;
        if let Some(pose) = state.hand_path.pop_front() {
            state.pose = pose;
        }
        Ok(state.trigger_script.pop_front().unwrap_or(false))
    }

    fn hht_trig_mode(&mut self) -> Result<HhtTrigMode, DobotError> {
        let state = self.call("hht_trig_mode")?;
        Ok(state.trig_mode)
    }

    fn hht_trig_output_enabled(&mut self) -> Result<bool, DobotError> {
        let _state = self.call("hht_trig_output_enabled")?;
        Ok(true)
    }

    fn alarms_state(&mut self) -> Result<AlarmState, DobotError> {
        let state = self.call("alarms_state")?;
        Ok(state.alarms)
    }

    fn clear_all_alarms(&mut self) -> Result<(), DobotError> {
        let mut state = self.call("clear_all_alarms")?;
        state.alarms.bytes = [0; crate::types::ALARM_BYTES];
        Ok(())
    }
}
