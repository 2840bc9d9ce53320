use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::dobot::DobotInterface;
use crate::error::DobotError;
use crate::types::{Pose, TriggerMode};

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    /// Wall-clock length of the capture window
    pub duration: Duration,
    /// Sleep between trigger polls
    pub poll_interval: Duration,
    pub trigger_mode: TriggerMode,
}

/// Decides which trigger readings record a pose
#[derive(Debug, Clone, Copy)]
struct TriggerDetector {
    mode: TriggerMode,
    previous: bool,
}

impl TriggerDetector {
    fn new(mode: TriggerMode) -> Self {
        Self {
            mode,
            previous: false,
        }
    }

    fn fires(&mut self, triggered: bool) -> bool {
        let fires = match self.mode {
            TriggerMode::Level => triggered,
            TriggerMode::RisingEdge => triggered && !self.previous,
        };
        self.previous = triggered;
        fires
    }
}

/// Record poses taught by hand for the length of the capture window
///
/// Each poll reads the hand-hold-teach trigger flag and, when the trigger
/// mode says so, reads and records the current pose. `on_capture` is
/// called with the running count and the pose after every capture. The
/// loop ends on elapsed time only, or early when `shutdown` is raised.
pub fn capture_poses<D, F>(
    driver: &mut D,
    settings: &CaptureSettings,
    shutdown: Option<&AtomicBool>,
    mut on_capture: F,
) -> Result<Vec<Pose>, DobotError>
where
    D: DobotInterface + ?Sized,
    F: FnMut(usize, &Pose) -> Result<(), DobotError>,
{
    let mut detector = TriggerDetector::new(settings.trigger_mode);
    let mut poses = Vec::new();
    let mut polls = 0usize;
    let start = Instant::now();

    loop {
        if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            info!("Pose capture stopped early by user");
            break;
        }

        polls += 1;
        let triggered = driver.hht_trig_output()?;
        if detector.fires(triggered) {
            let pose = driver.get_pose()?;
            poses.push(pose);
            debug!("Poll {}: captured pose {}", polls, pose);
            on_capture(poses.len(), &pose)?;
        }

        if start.elapsed() >= settings.duration {
            break;
        }
        std::thread::sleep(settings.poll_interval);
    }

    info!(
        "Pose capture finished: {} poses in {} polls",
        poses.len(),
        polls
    );
    Ok(poses)
}
