use chrono::Local;
use log::{info, warn};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::capture::{CaptureSettings, capture_poses};
use crate::config::{ConnectionConfig, SessionConfig};
use crate::dobot::{DobotConnection, DobotInterface, WaitSettings};
use crate::error::DobotError;
use crate::pose_log;
use crate::prompt::Console;
use crate::types::{AlarmState, ConnectStatus, EndEffectorOffset, Pose};
use crate::utils::check_shutdown;

/// End-effector offset read before and after zeroing it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpProbe {
    pub before: EndEffectorOffset,
    pub after: EndEffectorOffset,
}

/// What a session did
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub homed: bool,
    pub poses: Vec<Pose>,
    /// Session directory the poses were written to, if poses were collected
    pub output_dir: Option<PathBuf>,
    pub tcp_probe: Option<TcpProbe>,
    pub alarms: Option<AlarmState>,
    pub alarms_cleared: bool,
}

/// Connect, then home, collect hand-taught poses, report and clear alarms
/// as the operator chooses
///
/// A refused connection fails with [`DobotError::Connect`] before any
/// other driver call. Once connected the device is disconnected on every
/// exit path.
pub fn run_session<D, R, W>(
    driver: D,
    connection: &ConnectionConfig,
    config: &SessionConfig,
    console: &mut Console<R, W>,
    shutdown: Option<&AtomicBool>,
) -> Result<SessionReport, DobotError>
where
    D: DobotInterface,
    R: BufRead,
    W: Write,
{
    let mut conn = match DobotConnection::open(driver, &connection.port, connection.baud_rate) {
        Ok(conn) => conn,
        Err(DobotError::Connect(status)) => {
            report_connect_status(console, status)?;
            return Err(DobotError::Connect(status));
        }
        Err(e) => return Err(e),
    };
    report_connect_status(console, conn.status())?;

    let report = run_connected(&mut conn, config, console, shutdown)?;

    conn.close()?;
    console.say("Dobot disconnected !")?;
    Ok(report)
}

fn report_connect_status<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    status: ConnectStatus,
) -> Result<(), DobotError> {
    console.say(format!(
        "Returned value from ConnectDobot command: {}",
        status as i32
    ))?;
    console.say(format!("Connect status meaning: {}", status))
}

fn run_connected<D, R, W>(
    conn: &mut DobotConnection<D>,
    config: &SessionConfig,
    console: &mut Console<R, W>,
    shutdown: Option<&AtomicBool>,
) -> Result<SessionReport, DobotError>
where
    D: DobotInterface,
    R: BufRead,
    W: Write,
{
    let mut report = SessionReport::default();

    initialize(conn, config, console)?;

    console.blank()?;
    let home_robot = console.yes_or_no("Do you want to home the robot?")?;
    check_shutdown(shutdown)?;

    if config.probe_tcp {
        let probe = probe_tcp(conn)?;
        if config.verbose {
            console.say(format!(
                "TCP before: x: {}, y: {}, z: {} / after: x: {}, y: {}, z: {}",
                probe.before.x,
                probe.before.y,
                probe.before.z,
                probe.after.x,
                probe.after.y,
                probe.after.z
            ))?;
        }
        report.tcp_probe = Some(probe);
    }

    conn.queued_cmd_start_exec()?;

    if home_robot {
        home(conn, config, console, shutdown)?;
        report.homed = true;
    }

    console.blank()?;
    if console.yes_or_no("Do you want to collect robot poses?")? {
        check_shutdown(shutdown)?;
        let poses = collect_poses(conn, config, console, shutdown)?;
        let tcp = report.tcp_probe.map(|probe| probe.after);
        report.output_dir = Some(save_poses(config, console, &poses, tcp.as_ref())?);
        report.poses = poses;
    }
    check_shutdown(shutdown)?;

    console.blank()?;
    if console.yes_or_no("Do you want to print any dobot magician alarms to the terminal?")? {
        let alarms = conn.alarms_state()?;
        console.say(format!("alarms Length = {} items", alarms.len))?;
        console.say(format!("alarmsState: {}", alarms))?;
        if !alarms.is_clear() {
            warn!("Device reports active alarms");
        }
        report.alarms = Some(alarms);
    }
    check_shutdown(shutdown)?;

    console.blank()?;
    if console.yes_or_no("Do you want to clear any dobot magician alarms?")? {
        conn.clear_all_alarms()?;
        info!("Alarms cleared");
        if config.verbose {
            console.say("All alarms cleared")?;
        }
        report.alarms_cleared = true;
    }

    Ok(report)
}

/// Stop and clear the queue, then queue home and motion parameters
fn initialize<D, R, W>(
    conn: &mut DobotConnection<D>,
    config: &SessionConfig,
    console: &mut Console<R, W>,
) -> Result<(), DobotError>
where
    D: DobotInterface,
    R: BufRead,
    W: Write,
{
    conn.queued_cmd_stop_exec()?;

    let pose = conn.get_pose()?;
    console.say(format!(
        "Current Robot Pose: {} in format [x(mm),y(mm),z(mm),r(deg),joint1(deg),joint2(deg),joint3(deg),joint4(deg)]",
        pose
    ))?;

    conn.queued_cmd_clear()?;
    let current = conn.queued_cmd_current_index()?;
    if config.verbose {
        console.say(format!("CurrentCommandIndex: {}", current))?;
    }

    conn.set_home_params(config.home_params(), true)?;
    conn.set_ptp_joint_params(config.joint_params, true)?;
    conn.set_ptp_common_params(config.common_params, true)?;
    Ok(())
}

fn probe_tcp<D: DobotInterface>(conn: &mut DobotConnection<D>) -> Result<TcpProbe, DobotError> {
    let before = conn.get_end_effector_params()?;
    conn.set_end_effector_params(EndEffectorOffset::ZERO, false)?;
    let after = conn.get_end_effector_params()?;
    info!(
        "TCP offset probed: before ({}, {}, {}), after ({}, {}, {})",
        before.x, before.y, before.z, after.x, after.y, after.z
    );
    Ok(TcpProbe { before, after })
}

fn home<D, R, W>(
    conn: &mut DobotConnection<D>,
    config: &SessionConfig,
    console: &mut Console<R, W>,
    shutdown: Option<&AtomicBool>,
) -> Result<(), DobotError>
where
    D: DobotInterface,
    R: BufRead,
    W: Write,
{
    let index = conn.home()?;
    if config.verbose {
        console.say(format!("retVal for homing command: {}", index))?;
    }
    console.say("Homing ...")?;

    let wait = WaitSettings {
        poll_interval: config.poll_interval(),
        timeout: config.homing_timeout(),
        shutdown,
    };
    let polls = conn.wait_for(index, &wait)?;
    info!("Homing finished after {} index polls", polls);
    console.say("Homing complete")?;
    Ok(())
}

/// Ask for the capture length until a positive number of seconds is given
pub fn ask_capture_duration<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
) -> Result<Duration, DobotError> {
    loop {
        let seconds = console.input_number("Please input duration for pose capture in seconds ")?;
        match u64::try_from(seconds) {
            Ok(secs) if secs > 0 => return Ok(Duration::from_secs(secs)),
            _ => console.say("The duration must be a positive number of seconds")?,
        }
    }
}

fn collect_poses<D, R, W>(
    conn: &mut DobotConnection<D>,
    config: &SessionConfig,
    console: &mut Console<R, W>,
    shutdown: Option<&AtomicBool>,
) -> Result<Vec<Pose>, DobotError>
where
    D: DobotInterface,
    R: BufRead,
    W: Write,
{
    if config.verbose {
        console.say(format!("HHT trigger mode: {:?}", conn.hht_trig_mode()?))?;
        console.say(format!(
            "HHT trigger output enabled: {}",
            conn.hht_trig_output_enabled()?
        ))?;
        console.say(format!("HHT trigger output: {}", conn.hht_trig_output()?))?;
    }

    let duration = ask_capture_duration(console)?;
    console.say(format!("Duration of pose capture = {}", duration.as_secs()))?;
    console.say("Start collecting arm poses now using HHT mode...")?;
    console.say(
        "A pose is captured each time you release the dobot arm padlock button on link 2...",
    )?;

    let settings = CaptureSettings {
        duration,
        poll_interval: config.capture_poll_interval(),
        trigger_mode: config.trigger_mode,
    };
    let poses = capture_poses(conn.driver(), &settings, shutdown, |count, _| {
        console.say(format!("Successfully collected pose {}", count))
    })?;

    console.say("Arm poses collection using HHT mode finished ...")?;
    for (i, pose) in poses.iter().enumerate() {
        console.say(format!("  {}: {}", i + 1, pose))?;
    }
    Ok(poses)
}

fn save_poses<R: BufRead, W: Write>(
    config: &SessionConfig,
    console: &mut Console<R, W>,
    poses: &[Pose],
    tcp: Option<&EndEffectorOffset>,
) -> Result<PathBuf, DobotError> {
    console.blank()?;
    console.say("Collected poses will be saved to a .csv file at the following datapath:")?;
    console.say(format!(
        "Datapath = {}",
        config.output_base_path.display()
    ))?;

    let dir = pose_log::save_session(&config.output_base_path, &Local::now(), poses, tcp)?;
    console.say(format!("Saved to {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dobot::SimulatedDobot;
    use crate::types::TriggerMode;
    use std::io::Cursor;
    use std::path::Path;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn printed(console: &Console<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8_lossy(console.output()).into_owned()
    }

    fn session_config(base: &Path) -> SessionConfig {
        SessionConfig {
            output_base_path: base.to_path_buf(),
            poll_interval_ms: 1,
            capture_poll_interval_ms: 1,
            homing_timeout_secs: Some(5),
            ..Default::default()
        }
    }

    fn pose(x: f32) -> Pose {
        Pose {
            x,
            y: -x,
            z: 50.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_refused_connection_stops_before_any_other_call() {
        for status in [ConnectStatus::NotFound, ConnectStatus::Occupied] {
            let sim = SimulatedDobot::new().with_connect_status(status);
            let handle = sim.handle();
            let mut console = console("y\ny\n");

            let result = run_session(
                sim,
                &ConnectionConfig::default(),
                &SessionConfig::default(),
                &mut console,
                None,
            );

            assert!(matches!(result, Err(DobotError::Connect(s)) if s == status));
            assert_eq!(handle.lock().calls, vec!["connect"]);
            let out = printed(&console);
            assert!(out.contains(&format!(
                "Returned value from ConnectDobot command: {}",
                status as i32
            )));
            assert!(out.contains(&format!("Connect status meaning: {}", status)));
            assert!(!out.contains("(y/n)"));
        }
    }

    #[test]
    fn test_full_session() {
        let tmp = tempfile::tempdir().unwrap();
        let path: Vec<Pose> = (1..=6).map(|i| pose(i as f32)).collect();
        let mut alarm_bytes = [0u8; 16];
        alarm_bytes[0] = 0x10;
        let sim = SimulatedDobot::new()
            .with_trigger_sequence(vec![false, true, false, false, true])
            .with_hand_guided_path(path.clone())
            .with_alarms(alarm_bytes);
        let handle = sim.handle();
        let mut console = console("y\ny\n1\ny\ny\n");

        let report = run_session(
            sim,
            &ConnectionConfig::default(),
            &session_config(tmp.path()),
            &mut console,
            None,
        )
        .unwrap();

        assert!(report.homed);
        assert_eq!(report.poses, vec![path[1], path[4]]);
        assert_eq!(report.alarms.map(|a| a.bytes[0]), Some(0x10));
        assert!(report.alarms_cleared);
        assert!(report.tcp_probe.is_none());

        let dir = report.output_dir.unwrap();
        assert!(dir.starts_with(tmp.path().join("HHT_Poses")));
        let table = std::fs::read_to_string(dir.join("poses.csv")).unwrap();
        assert_eq!(table.lines().count(), 3);
        assert_eq!(
            table.lines().next(),
            Some("x,y,z,r,joint1,joint2,joint3,joint4")
        );
        assert!(!dir.join("TCP.csv").exists());

        let state = handle.lock();
        assert!(!state.connected);
        assert!(state.alarms.bytes.iter().all(|b| *b == 0));
        assert_eq!(state.home.x, 180.0);
        assert_eq!(state.calls[1], "queued_cmd_stop_exec");
        assert_eq!(state.calls.last(), Some(&"disconnect"));
        drop(state);

        let out = printed(&console);
        assert!(out.contains("Returned value from ConnectDobot command: 0"));
        assert!(out.contains("Connect status meaning: DobotConnect_NoError (0)"));
        assert!(out.contains("Successfully collected pose 1"));
        assert!(out.contains("Successfully collected pose 2"));
        assert!(out.contains("alarmsState: 16 | 0 | 0"));
        assert!(out.contains("Dobot disconnected !"));
    }

    #[test]
    fn test_declining_everything_only_initializes() {
        let tmp = tempfile::tempdir().unwrap();
        let sim = SimulatedDobot::new();
        let handle = sim.handle();
        let mut console = console("n\nn\nn\nn\n");

        let report = run_session(
            sim,
            &ConnectionConfig::default(),
            &session_config(tmp.path()),
            &mut console,
            None,
        )
        .unwrap();

        assert!(!report.homed);
        assert!(report.output_dir.is_none());
        assert!(report.alarms.is_none());
        assert!(!report.alarms_cleared);
        assert!(!tmp.path().join("HHT_Poses").exists());

        let state = handle.lock();
        assert!(!state.calls.contains(&"home"));
        assert!(!state.calls.contains(&"hht_trig_output"));
        assert!(!state.calls.contains(&"get_end_effector_params"));
        assert!(!state.connected);
    }

    #[test]
    fn test_tcp_probe_writes_tcp_table() {
        let tmp = tempfile::tempdir().unwrap();
        let sim = SimulatedDobot::new().with_end_effector(EndEffectorOffset {
            x: 59.7,
            y: 0.0,
            z: 0.0,
        });
        let mut console = console("n\ny\n1\nn\nn\n");
        let config = SessionConfig {
            probe_tcp: true,
            ..session_config(tmp.path())
        };

        let report = run_session(sim, &ConnectionConfig::default(), &config, &mut console, None)
            .unwrap();

        let probe = report.tcp_probe.unwrap();
        assert_eq!(probe.before.x, 59.7);
        assert_eq!(probe.after, EndEffectorOffset::ZERO);
        let tcp = std::fs::read_to_string(report.output_dir.unwrap().join("TCP.csv")).unwrap();
        assert_eq!(tcp.lines().collect::<Vec<_>>(), vec!["x,y,z", "0.0,0.0,0.0"]);
    }

    #[test]
    fn test_driver_failure_still_disconnects() {
        let tmp = tempfile::tempdir().unwrap();
        let sim = SimulatedDobot::new().failing_on("home");
        let handle = sim.handle();
        let mut console = console("y\n");

        let result = run_session(
            sim,
            &ConnectionConfig::default(),
            &session_config(tmp.path()),
            &mut console,
            None,
        );

        assert!(matches!(
            result,
            Err(DobotError::Communication { command: "home", .. })
        ));
        let state = handle.lock();
        assert!(!state.connected);
        assert_eq!(state.calls.last(), Some(&"disconnect"));
    }

    #[test]
    fn test_existing_output_directory_is_fatal_and_disconnects() {
        let tmp = tempfile::tempdir().unwrap();
        let config = session_config(tmp.path());
        let sim = SimulatedDobot::new();
        let handle = sim.handle();

        // Occupy this minute's session directory; retried once in case the
        // minute rolls over between the two calls
        let mut result = None;
        for _ in 0..2 {
            let _ = pose_log::create_session_dir(tmp.path(), &Local::now());
            let mut console = console("n\ny\n1\n");
            let sim = sim.clone();
            let r = run_session(sim, &ConnectionConfig::default(), &config, &mut console, None);
            if matches!(r, Err(DobotError::OutputExists(_))) {
                result = Some(r);
                break;
            }
        }

        assert!(matches!(result, Some(Err(DobotError::OutputExists(_)))));
        assert!(!handle.lock().connected);
    }

    #[test]
    fn test_rising_edge_session() {
        let tmp = tempfile::tempdir().unwrap();
        let sim = SimulatedDobot::new().with_trigger_sequence(vec![true, true, true, false]);
        let mut console = console("n\ny\n1\nn\nn\n");
        let config = SessionConfig {
            trigger_mode: TriggerMode::RisingEdge,
            ..session_config(tmp.path())
        };

        let report = run_session(sim, &ConnectionConfig::default(), &config, &mut console, None)
            .unwrap();
        assert_eq!(report.poses.len(), 1);
    }

    #[test]
    fn test_verbose_session_prints_diagnostics() {
        let tmp = tempfile::tempdir().unwrap();
        let path: Vec<Pose> = (1..=3).map(|i| pose(i as f32)).collect();
        // The trigger read for the verbose printout takes the first reading
        // and hand-path pose before the capture window opens
        let sim = SimulatedDobot::new()
            .with_trigger_sequence(vec![true, false, true])
            .with_hand_guided_path(path.clone());
        let mut console = console("y\ny\n1\nn\ny\n");
        let config = SessionConfig {
            verbose: true,
            ..session_config(tmp.path())
        };

        let report = run_session(sim, &ConnectionConfig::default(), &config, &mut console, None)
            .unwrap();
        assert_eq!(report.poses, vec![path[2]]);
        assert!(report.alarms_cleared);

        let out = printed(&console);
        assert!(out.contains("CurrentCommandIndex: 0"));
        assert!(out.contains("retVal for homing command: "));
        assert!(out.contains("HHT trigger mode: TriggeredOnKeyReleased"));
        assert!(out.contains("HHT trigger output enabled: true"));
        assert!(out.contains("HHT trigger output: true"));
        assert!(out.contains("All alarms cleared"));
        assert_eq!(out.matches("Successfully collected pose").count(), 1);
    }

    #[test]
    fn test_capture_duration_prompt() {
        let mut console = console("abc\n-5\n10\n");
        let duration = ask_capture_duration(&mut console).unwrap();
        assert_eq!(duration, Duration::from_secs(10));

        let out = printed(&console);
        assert_eq!(out.matches("Not an integer! Try again.").count(), 1);
        assert_eq!(out.matches("positive number of seconds").count(), 1);
    }

    #[test]
    fn test_shutdown_before_capture_disconnects() {
        let tmp = tempfile::tempdir().unwrap();
        let sim = SimulatedDobot::new();
        let handle = sim.handle();
        let flag = AtomicBool::new(true);
        let mut console = console("n\ny\n1\n");

        let result = run_session(
            sim,
            &ConnectionConfig::default(),
            &session_config(tmp.path()),
            &mut console,
            Some(&flag),
        );
        assert!(matches!(result, Err(DobotError::Interrupted)));
        assert!(!handle.lock().connected);
    }
}
