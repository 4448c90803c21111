//! `strider-kernel` – safety checks around the control loop.
//!
//! It does not decide what the robot does; it decides what is allowed to
//! reach the controller and the actuators.
//!
//! # Modules
//!
//! - [`config_verifier`] – [`ConfigVerifier`][config_verifier::ConfigVerifier]:
//!   a rule engine that rejects inconsistent
//!   [`ModelParams`][strider_types::ModelParams] before a controller exists.
//! - [`state_verifier`] – [`StateVerifier`][state_verifier::StateVerifier]:
//!   per-tick sensing checks (joint count, finiteness, orientation norm).
//! - [`fault_monitor`] – [`FaultMonitor`][fault_monitor::FaultMonitor]:
//!   counts consecutive sensing faults and trips at a threshold.
//! - [`command_gate`] – [`CommandGate`][command_gate::CommandGate]:
//!   the single check every outgoing
//!   [`RobotCommand`][strider_types::RobotCommand] passes before
//!   `write_command`.

pub mod command_gate;
pub mod config_verifier;
pub mod fault_monitor;
pub mod state_verifier;

pub use command_gate::{CommandGate, CommandRejected};
pub use config_verifier::{ConfigRule, ConfigVerifier, verify_model_params};
pub use fault_monitor::{FaultMonitor, FaultStatus};
pub use state_verifier::{SensingFault, StateVerifier};
