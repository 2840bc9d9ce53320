use crate::error::DobotError;
use crate::types::{
    AlarmState, CartesianPose, ConnectStatus, EndEffectorOffset, HhtTrigMode, HomeParams, Pose,
    PtpCommonParams, PtpCoordinateParams, PtpJointParams, QueuedCmdIndex,
};

/// Driver facade for a Dobot Magician
///
/// Mirrors the calls exposed by the vendor motion-control library. Motion
/// and parameter commands can be queued: a queued command returns its
/// [`QueuedCmdIndex`] and runs asynchronously on the device once queue
/// execution is started. Callers detect completion by polling
/// [`queued_cmd_current_index`](DobotInterface::queued_cmd_current_index)
/// until it reaches the returned index.
///
/// Setters take a `queued` flag. When `queued` is false the command is
/// applied immediately and no index is returned.
pub trait DobotInterface: Send {
    // === Connection ===

    /// Connect to the first device matching `port_filter` (empty string
    /// searches all ports)
    fn connect(&mut self, port_filter: &str, baud_rate: u32) -> Result<ConnectStatus, DobotError>;

    fn disconnect(&mut self) -> Result<(), DobotError>;

    // === Command queue ===

    /// Start executing queued commands
    fn queued_cmd_start_exec(&mut self) -> Result<(), DobotError>;

    /// Stop executing queued commands; pending commands stay queued
    fn queued_cmd_stop_exec(&mut self) -> Result<(), DobotError>;

    /// Drop every pending command
    fn queued_cmd_clear(&mut self) -> Result<(), DobotError>;

    /// Index of the last command the device has executed
    fn queued_cmd_current_index(&mut self) -> Result<QueuedCmdIndex, DobotError>;

    // === Pose ===

    fn get_pose(&mut self) -> Result<Pose, DobotError>;

    // === Parameters ===

    fn set_home_params(
        &mut self,
        params: HomeParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError>;

    fn set_ptp_joint_params(
        &mut self,
        params: PtpJointParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError>;

    fn set_ptp_common_params(
        &mut self,
        params: PtpCommonParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError>;

    fn set_ptp_coordinate_params(
        &mut self,
        params: PtpCoordinateParams,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError>;

    fn get_end_effector_params(&mut self) -> Result<EndEffectorOffset, DobotError>;

    fn set_end_effector_params(
        &mut self,
        offset: EndEffectorOffset,
        queued: bool,
    ) -> Result<Option<QueuedCmdIndex>, DobotError>;

    // === Motion ===

    /// Queue a straight-line move to `target` in base coordinates
    fn move_linear(&mut self, target: CartesianPose) -> Result<QueuedCmdIndex, DobotError>;

    /// Queue the homing routine
    fn home(&mut self) -> Result<QueuedCmdIndex, DobotError>;

    // === Hand-hold teaching ===

    /// Current state of the hand-hold-teach trigger flag
    fn hht_trig_output(&mut self) -> Result<bool, DobotError>;

    fn hht_trig_mode(&mut self) -> Result<HhtTrigMode, DobotError>;

    fn hht_trig_output_enabled(&mut self) -> Result<bool, DobotError>;

    // === Alarms ===

    fn alarms_state(&mut self) -> Result<AlarmState, DobotError>;

    fn clear_all_alarms(&mut self) -> Result<(), DobotError>;
}
