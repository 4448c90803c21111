//! Joint-level PD law.
//!
//! Every actuator command carries a position target, a velocity target, a
//! feed-forward torque and a P/D gain pair.  [`JointPd`] evaluates the torque
//! an actuator would apply for that command:
//!
//! ```text
//! tau_j = tau_ff_j + kp_j * (q_target_j - q_j) + kd_j * (dq_target_j - dq_j)
//! ```
//!
//! clamped to `±torque_limits[j]`.  The simulator uses it as its actuator
//! model; the runtime uses it for `pd_torque` actuation and to report the
//! effective torque in telemetry.
//!
//! # Example
//!
//! ```rust
//! use strider_hal::pd::JointPd;
//! use strider_types::{RobotCommand, RobotState};
//!
//! let pd = JointPd::new(vec![10.0]);
//! let mut cmd = RobotCommand::zeroed(1);
//! cmd.q[0] = 1.0;
//! cmd.kp[0] = 100.0;
//!
//! let state = RobotState::new(1);
//! // 100 * (1.0 - 0.0) = 100, clamped to the 10 N·m limit.
//! assert_eq!(pd.torques(&cmd, &state), vec![10.0]);
//! ```

use strider_types::{RobotCommand, RobotState};

/// Torque for a single joint, unclamped.
pub fn pd_torque(kp: f64, kd: f64, q_target: f64, q: f64, dq_target: f64, dq: f64, tau_ff: f64) -> f64 {
    tau_ff + kp * (q_target - q) + kd * (dq_target - dq)
}

/// Per-joint PD evaluation with symmetric torque limits.
#[derive(Debug, Clone, PartialEq)]
pub struct JointPd {
    torque_limits: Vec<f64>,
}

impl JointPd {
    /// Create an evaluator; `torque_limits[j]` bounds joint `j` to
    /// `[-limit, limit]`.
    pub fn new(torque_limits: Vec<f64>) -> Self {
        Self { torque_limits }
    }

    pub fn torque_limits(&self) -> &[f64] {
        &self.torque_limits
    }

    /// Clamp `tau` for joint `j`.  Joints without a configured limit are
    /// left unclamped.
    pub fn clamp(&self, j: usize, tau: f64) -> f64 {
        match self.torque_limits.get(j) {
            Some(limit) => tau.clamp(-limit.abs(), limit.abs()),
            None => tau,
        }
    }

    /// Torque every joint would receive for `command` given `state`.
    ///
    /// Joints beyond the shorter of the two inputs are not evaluated.
    pub fn torques(&self, command: &RobotCommand, state: &RobotState) -> Vec<f64> {
        let n = command.num_dofs().min(state.num_dofs());
        (0..n)
            .map(|j| {
                let tau = pd_torque(
                    command.kp[j],
                    command.kd[j],
                    command.q[j],
                    state.q[j],
                    command.dq[j],
                    state.dq[j],
                    command.tau[j],
                );
                self.clamp(j, tau)
            })
            .collect()
    }
}
