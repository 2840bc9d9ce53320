use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::DobotError;

/// Why [`poll_until`] gave up
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("gave up waiting after the timeout")]
    Timeout,
    #[error("poll failed: {0}")]
    Condition(#[source] E),
}

impl From<PollError<DobotError>> for DobotError {
    fn from(err: PollError<DobotError>) -> Self {
        match err {
            PollError::Timeout => DobotError::Timeout,
            PollError::Condition(e) => e,
        }
    }
}

/// Poll a condition at a fixed interval
///
/// Repeatedly calls `condition` until it returns `Ok(true)`, sleeping
/// `poll_interval` between calls. With `timeout` set to `None` the wait is
/// unbounded.
///
/// # Returns
/// * `Ok(polls)` with the number of condition calls once it returns `Ok(true)`
/// * `Err(PollError::Timeout)` when the timeout is reached
/// * `Err(PollError::Condition(e))` when the condition returns an error
///
/// # Example
/// ```
/// use std::time::Duration;
/// use dobot_utilities::utils::poll_until;
///
/// let mut current = 3;
/// let polls = poll_until(
///     || {
///         current += 1;
///         Ok::<bool, &str>(current >= 5)
///     },
///     Some(Duration::from_secs(1)),
///     Duration::from_millis(1),
/// )
/// .unwrap();
/// assert_eq!(polls, 2);
/// ```
pub fn poll_until<F, E>(
    mut condition: F,
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> Result<usize, PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();
    let mut polls = 0;

    loop {
        if let Some(timeout) = timeout {
            if start.elapsed() >= timeout {
                return Err(PollError::Timeout);
            }
        }

        polls += 1;
        match condition() {
            Ok(true) => return Ok(polls),
            Ok(false) => {
                std::thread::sleep(poll_interval);
            }
            Err(e) => return Err(PollError::Condition(e)),
        }
    }
}

/// Fail with `Interrupted` once the shutdown flag has been raised
pub fn check_shutdown(shutdown: Option<&AtomicBool>) -> Result<(), DobotError> {
    match shutdown {
        Some(flag) if flag.load(Ordering::SeqCst) => Err(DobotError::Interrupted),
        _ => Ok(()),
    }
}
