pub mod connection;
#[cfg(feature = "dobot-dll")]
pub mod dll;
pub mod interface;
pub mod simulated;

pub use connection::{DobotConnection, WaitSettings};
#[cfg(feature = "dobot-dll")]
pub use dll::DobotDll;
pub use interface::DobotInterface;
pub use simulated::{SimCommand, SimState, SimulatedDobot};
