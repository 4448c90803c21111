//! `strider-hal` – hardware abstraction for the strider control core.
//!
//! # Modules
//!
//! - [`robot`] – [`RobotInterface`][robot::RobotInterface]: the
//!   `read_state` / `write_command` contract every backend implements.
//! - [`pd`] – [`JointPd`][pd::JointPd]: the per-joint PD torque law shared
//!   by the simulator and the runtime.
//! - [`sim`] – [`SimRobot`][sim::SimRobot]: an in-process simulated robot
//!   for headless runs and tests.

pub mod pd;
pub mod robot;
pub mod sim;

pub use pd::JointPd;
pub use robot::RobotInterface;
pub use sim::{SimRobot, SimRobotBuilder};
