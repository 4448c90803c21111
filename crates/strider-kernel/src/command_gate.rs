//! [`CommandGate`] – last check before a command reaches the actuators.
//!
//! Every [`RobotCommand`] the controller produces passes through
//! [`CommandGate::admit`] on its way to
//! `RobotInterface::write_command`.  A command is admitted only when every
//! array addresses exactly the configured joints, every value is finite,
//! gains are non-negative and feed-forward torques respect the per-joint
//! limits.  Otherwise the caller receives a [`CommandRejected`] and must send
//! a fallback command instead; a partial or unset command never leaves the
//! core.
//!
//! # Example
//!
//! ```
//! use strider_kernel::command_gate::CommandGate;
//! use strider_types::RobotCommand;
//!
//! let gate = CommandGate::new(vec![10.0, 10.0]);
//! assert!(gate.admit(&RobotCommand::zeroed(2)).is_ok());
//!
//! let mut cmd = RobotCommand::zeroed(2);
//! cmd.tau[1] = 25.0;
//! assert!(gate.admit(&cmd).is_err());
//! ```

use strider_types::RobotCommand;
use thiserror::Error;

/// Why a command was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandRejected {
    #[error("{field} has {got} entries, expected {expected}")]
    Incomplete {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{field}[{joint}] is not finite")]
    NonFinite { field: &'static str, joint: usize },

    #[error("{field}[{joint}] is negative")]
    NegativeGain { field: &'static str, joint: usize },

    #[error("tau[{joint}] = {tau} exceeds limit {limit}")]
    TorqueLimit { joint: usize, tau: f64, limit: f64 },
}

/// Validates outgoing commands against the configured joint count and
/// torque limits.
#[derive(Debug, Clone)]
pub struct CommandGate {
    torque_limits: Vec<f64>,
}

impl CommandGate {
    /// Create a gate; the joint count is `torque_limits.len()`.
    pub fn new(torque_limits: Vec<f64>) -> Self {
        Self { torque_limits }
    }

    pub fn num_dofs(&self) -> usize {
        self.torque_limits.len()
    }

    /// Admit `command` or explain why it must not be sent.
    pub fn admit(&self, command: &RobotCommand) -> Result<(), CommandRejected> {
        let n = self.num_dofs();
        let fields: [(&'static str, &[f64]); 5] = [
            ("q", command.q.as_slice()),
            ("dq", command.dq.as_slice()),
            ("tau", command.tau.as_slice()),
            ("kp", command.kp.as_slice()),
            ("kd", command.kd.as_slice()),
        ];
        for (field, values) in fields {
            if values.len() != n {
                return Err(CommandRejected::Incomplete {
                    field,
                    expected: n,
                    got: values.len(),
                });
            }
            if let Some(joint) = values.iter().position(|v| !v.is_finite()) {
                return Err(CommandRejected::NonFinite { field, joint });
            }
        }
        for (field, gains) in [("kp", &command.kp), ("kd", &command.kd)] {
            if let Some(joint) = gains.iter().position(|g| *g < 0.0) {
                return Err(CommandRejected::NegativeGain { field, joint });
            }
        }
        for (joint, (tau, limit)) in command.tau.iter().zip(&self.torque_limits).enumerate() {
            if tau.abs() > limit.abs() {
                return Err(CommandRejected::TorqueLimit {
                    joint,
                    tau: *tau,
                    limit: *limit,
                });
            }
        }
        Ok(())
    }
}
