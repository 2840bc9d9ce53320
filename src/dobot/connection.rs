use log::{debug, info, warn};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use super::interface::DobotInterface;
use crate::error::DobotError;
use crate::types::{ConnectStatus, QueuedCmdIndex};
use crate::utils::{check_shutdown, poll_until};

/// How to wait for a queued command to finish
#[derive(Debug, Clone, Copy)]
pub struct WaitSettings<'a> {
    pub poll_interval: Duration,
    /// `None` waits as long as the device takes
    pub timeout: Option<Duration>,
    pub shutdown: Option<&'a AtomicBool>,
}

impl Default for WaitSettings<'_> {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: None,
            shutdown: None,
        }
    }
}

/// A connected Dobot
///
/// Only constructed from a successful connection, and disconnects when
/// dropped, so every exit path after connecting releases the device.
/// Derefs to the underlying driver for direct calls.
pub struct DobotConnection<D: DobotInterface> {
    driver: D,
    status: ConnectStatus,
    connected: bool,
}

impl<D: DobotInterface> DobotConnection<D> {
    /// Connect `driver` to a device
    ///
    /// Any status other than [`ConnectStatus::NoError`] is returned as
    /// [`DobotError::Connect`] and no further driver calls are made.
    pub fn open(mut driver: D, port_filter: &str, baud_rate: u32) -> Result<Self, DobotError> {
        let status = driver.connect(port_filter, baud_rate)?;
        info!("Connect status: {}", status);

        if status != ConnectStatus::NoError {
            return Err(DobotError::Connect(status));
        }

        Ok(Self {
            driver,
            status,
            connected: true,
        })
    }

    /// Status the driver reported when connecting
    pub fn status(&self) -> ConnectStatus {
        self.status
    }

    /// Block until the device has executed the command at `index`
    ///
    /// Returns the number of index polls it took.
    pub fn wait_for(
        &mut self,
        index: QueuedCmdIndex,
        settings: &WaitSettings<'_>,
    ) -> Result<usize, DobotError> {
        let driver = &mut self.driver;
        let polls = poll_until(
            || {
                check_shutdown(settings.shutdown)?;
                let current = driver.queued_cmd_current_index()?;
                debug!("Waiting for command {}: device at {}", index, current);
                Ok::<bool, DobotError>(index.is_reached_by(current))
            },
            settings.timeout,
            settings.poll_interval,
        )?;
        Ok(polls)
    }

    /// Disconnect now and report the driver's result
    pub fn close(mut self) -> Result<(), DobotError> {
        self.connected = false;
        self.driver.disconnect()?;
        info!("Dobot disconnected");
        Ok(())
    }

    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: DobotInterface> Deref for DobotConnection<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.driver
    }
}

impl<D: DobotInterface> DerefMut for DobotConnection<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: DobotInterface> Drop for DobotConnection<D> {
    fn drop(&mut self) {
        if self.connected {
            match self.driver.disconnect() {
                Ok(()) => info!("Dobot disconnected"),
                Err(e) => warn!("Failed to disconnect Dobot: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dobot::SimulatedDobot;
    use std::sync::atomic::Ordering;

    fn fast_wait() -> WaitSettings<'static> {
        WaitSettings {
            poll_interval: Duration::from_millis(1),
            timeout: Some(Duration::from_secs(5)),
            shutdown: None,
        }
    }

    #[test]
    fn test_refused_connection_makes_no_further_calls() {
        for status in [ConnectStatus::NotFound, ConnectStatus::Occupied] {
            let sim = SimulatedDobot::new().with_connect_status(status);
            let handle = sim.handle();

            let result = DobotConnection::open(sim, "", 115200);
            assert!(matches!(result, Err(DobotError::Connect(s)) if s == status));
            assert_eq!(handle.lock().calls, vec!["connect"]);
        }
    }

    #[test]
    fn test_disconnects_on_drop() {
        let sim = SimulatedDobot::new();
        let handle = sim.handle();
        {
            let _conn = DobotConnection::open(sim, "", 115200).unwrap();
            assert!(handle.lock().connected);
        }
        let state = handle.lock();
        assert!(!state.connected);
        assert_eq!(state.calls.last(), Some(&"disconnect"));
    }

    #[test]
    fn test_close_disconnects_once() {
        let sim = SimulatedDobot::new();
        let handle = sim.handle();
        let conn = DobotConnection::open(sim, "", 115200).unwrap();
        conn.close().unwrap();
        let disconnects = handle
            .lock()
            .calls
            .iter()
            .filter(|c| **c == "disconnect")
            .count();
        assert_eq!(disconnects, 1);
    }

    #[test]
    fn test_wait_stops_at_first_index_reaching_command() {
        let sim = SimulatedDobot::new().with_index_sequence(vec![3, 4, 5, 6]);
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();

        let polls = conn.wait_for(QueuedCmdIndex(5), &fast_wait()).unwrap();
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_wait_for_later_index_polls_whole_sequence() {
        let sim = SimulatedDobot::new().with_index_sequence(vec![3, 4, 5, 6]);
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();

        let polls = conn.wait_for(QueuedCmdIndex(6), &fast_wait()).unwrap();
        assert_eq!(polls, 4);
    }

    #[test]
    fn test_wait_interrupted_by_shutdown() {
        let sim = SimulatedDobot::new().with_index_sequence(vec![0; 100]);
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();
        let flag = AtomicBool::new(true);
        let settings = WaitSettings {
            shutdown: Some(&flag),
            ..fast_wait()
        };

        let result = conn.wait_for(QueuedCmdIndex(5), &settings);
        assert!(matches!(result, Err(DobotError::Interrupted)));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_times_out() {
        let sim = SimulatedDobot::new().with_index_sequence(vec![0; 10_000]);
        let mut conn = DobotConnection::open(sim, "", 115200).unwrap();
        let settings = WaitSettings {
            timeout: Some(Duration::from_millis(20)),
            ..fast_wait()
        };

        let result = conn.wait_for(QueuedCmdIndex(5), &settings);
        assert!(matches!(result, Err(DobotError::Timeout)));
    }
}
