//! [`StateVerifier`] – per-tick sensing sanity checks.
//!
//! Every [`RobotState`] read from hardware passes through
//! [`StateVerifier::verify`] before it feeds the observation builder.  A
//! reading is rejected when it carries the wrong joint count, a non-finite
//! value, or an orientation quaternion too far from unit length to be
//! trusted.  A rejection is a [`SensingFault`]; the controller treats single
//! faults as recoverable and counts consecutive ones (see
//! [`FaultMonitor`][crate::fault_monitor::FaultMonitor]).

use strider_types::{ControlError, RobotState};
use thiserror::Error;

/// Largest accepted deviation of `|quaternion|` from 1.
pub const DEFAULT_QUATERNION_TOLERANCE: f64 = 0.1;

/// Why a sensing reading was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensingFault {
    #[error("state carries {got} joints, expected {expected}")]
    JointCount { expected: usize, got: usize },

    #[error("{field}[{index}] is not finite")]
    NonFinite { field: &'static str, index: usize },

    #[error("orientation quaternion norm {norm} is not close to 1")]
    DegenerateOrientation { norm: f64 },
}

impl From<SensingFault> for ControlError {
    fn from(fault: SensingFault) -> Self {
        ControlError::Sensing(fault.to_string())
    }
}

/// Validates sensing readings for a robot with a fixed joint count.
///
/// # Example
///
/// ```
/// use strider_kernel::state_verifier::{SensingFault, StateVerifier};
/// use strider_types::RobotState;
///
/// let verifier = StateVerifier::new(12);
/// assert!(verifier.verify(&RobotState::new(12)).is_ok());
///
/// let mut bad = RobotState::new(12);
/// bad.quaternion = [0.0; 4];
/// assert!(matches!(
///     verifier.verify(&bad),
///     Err(SensingFault::DegenerateOrientation { .. })
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct StateVerifier {
    num_dofs: usize,
    quaternion_tolerance: f64,
}

impl StateVerifier {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            num_dofs,
            quaternion_tolerance: DEFAULT_QUATERNION_TOLERANCE,
        }
    }

    /// Override the accepted quaternion norm deviation.
    pub fn with_quaternion_tolerance(mut self, tolerance: f64) -> Self {
        self.quaternion_tolerance = tolerance;
        self
    }

    /// Check `state`; the first problem found is returned.
    pub fn verify(&self, state: &RobotState) -> Result<(), SensingFault> {
        for (field, len) in [("q", state.q.len()), ("dq", state.dq.len())] {
            if len != self.num_dofs {
                tracing::trace!(field, len, "joint count mismatch");
                return Err(SensingFault::JointCount {
                    expected: self.num_dofs,
                    got: len,
                });
            }
        }

        let arrays: [(&'static str, &[f64]); 7] = [
            ("quaternion", &state.quaternion[..]),
            ("gyroscope", &state.gyroscope[..]),
            ("accelerometer", &state.accelerometer[..]),
            ("base_lin_vel", &state.base_lin_vel[..]),
            ("q", state.q.as_slice()),
            ("dq", state.dq.as_slice()),
            ("tau_est", state.tau_est.as_slice()),
        ];
        for (field, values) in arrays {
            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                return Err(SensingFault::NonFinite { field, index });
            }
        }

        let q = state.quaternion;
        let norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        if (norm - 1.0).abs() > self.quaternion_tolerance {
            return Err(SensingFault::DegenerateOrientation { norm });
        }
        Ok(())
    }
}
