//! `strider-types` – shared data model for the strider control core.
//!
//! Every per-joint vector in this crate is indexed by the canonical joint
//! ordering defined by [`ModelParams::joint_names`].  Vectors are sized to the
//! configured degree-of-freedom count, never to [`MAX_DOFS`], which is only a
//! capacity cap checked at startup.

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod params;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use params::{ActuationMode, ModelParams, ObservationChannel, PolicySpec, StandDownTarget};

/// Largest joint count the runtime accepts.
pub const MAX_DOFS: usize = 32;

/// World-frame "down" direction used for the projected-gravity observation.
pub const GRAVITY_DIRECTION: [f64; 3] = [0.0, 0.0, -1.0];

// ────────────────────────────────────────────────────────────────────────────
// Hardware sensing
// ────────────────────────────────────────────────────────────────────────────

/// One tick of hardware sensing, produced by a
/// `RobotInterface` implementation and read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    /// Base orientation as a unit quaternion `(w, x, y, z)`.
    pub quaternion: [f64; 4],
    /// Body-frame angular velocity (rad/s).
    pub gyroscope: [f64; 3],
    /// Body-frame linear acceleration (m/s²).
    pub accelerometer: [f64; 3],
    /// Body-frame linear velocity (m/s).  Zero when the source has no
    /// estimator for it.
    pub base_lin_vel: [f64; 3],
    /// Joint positions (rad).
    pub q: Vec<f64>,
    /// Joint velocities (rad/s).
    pub dq: Vec<f64>,
    /// Joint accelerations (rad/s²).
    pub ddq: Vec<f64>,
    /// Estimated joint torques (N·m).
    pub tau_est: Vec<f64>,
    /// Motor currents (A).
    pub current: Vec<f64>,
}

impl RobotState {
    /// A robot at rest: identity orientation, every joint at zero.
    pub fn new(num_dofs: usize) -> Self {
        Self {
            quaternion: [1.0, 0.0, 0.0, 0.0],
            gyroscope: [0.0; 3],
            accelerometer: [0.0; 3],
            base_lin_vel: [0.0; 3],
            q: vec![0.0; num_dofs],
            dq: vec![0.0; num_dofs],
            ddq: vec![0.0; num_dofs],
            tau_est: vec![0.0; num_dofs],
            current: vec![0.0; num_dofs],
        }
    }

    /// Number of joints carried by the joint-position array.
    pub fn num_dofs(&self) -> usize {
        self.q.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actuator commands
// ────────────────────────────────────────────────────────────────────────────

/// Per-joint actuator targets for one tick.
///
/// The actuator is expected to apply
/// `tau + kp * (q - q_measured) + kd * (dq - dq_measured)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotCommand {
    pub q: Vec<f64>,
    pub dq: Vec<f64>,
    pub tau: Vec<f64>,
    pub kp: Vec<f64>,
    pub kd: Vec<f64>,
}

impl RobotCommand {
    /// A command with every array sized to `num_dofs` and zero-filled.
    ///
    /// Zero gains make this a passive command; synthesizers overwrite every
    /// field before a command leaves the core.
    pub fn zeroed(num_dofs: usize) -> Self {
        Self {
            q: vec![0.0; num_dofs],
            dq: vec![0.0; num_dofs],
            tau: vec![0.0; num_dofs],
            kp: vec![0.0; num_dofs],
            kd: vec![0.0; num_dofs],
        }
    }

    /// Number of joints addressed by this command.
    pub fn num_dofs(&self) -> usize {
        self.q.len()
    }

    /// `true` when every array has exactly `num_dofs` finite entries.
    pub fn is_complete(&self, num_dofs: usize) -> bool {
        [&self.q, &self.dq, &self.tau, &self.kp, &self.kd]
            .iter()
            .all(|v| v.len() == num_dofs && v.iter().all(|x| x.is_finite()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Phases and operator input
// ────────────────────────────────────────────────────────────────────────────

/// Operating mode of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Passive damping; waiting for the operator.
    #[default]
    Idle,
    /// Interpolating from the captured pose to the default standing pose.
    StandingUp,
    /// One tick that primes observation history before the first inference.
    PolicyWarmup,
    /// Closed-loop policy control.
    PolicyRunning,
    /// Interpolating from the captured pose to the stand-down target.
    StandingDown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::StandingUp => "standing_up",
            Phase::PolicyWarmup => "policy_warmup",
            Phase::PolicyRunning => "policy_running",
            Phase::StandingDown => "standing_down",
        };
        f.write_str(name)
    }
}

/// Discrete phase-change request issued by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRequest {
    /// Stand up from Idle.
    Start,
    /// Leave policy control and stand down.
    Stop,
    /// Drop straight to Idle from any phase.
    Emergency,
}

/// Continuous locomotion intent: desired forward / lateral speed and yaw rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatorIntent {
    /// Forward speed (m/s).
    pub x: f64,
    /// Lateral speed (m/s).
    pub y: f64,
    /// Yaw rate (rad/s).
    pub yaw: f64,
}

impl OperatorIntent {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.yaw]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Diagnostic record emitted once per completed policy-running tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Control tick counter since the loop started.
    pub tick: u64,
    /// Seconds since the loop started.
    pub time: f64,
    /// Commanded (or PD-equivalent) joint torque.
    pub tau: Vec<f64>,
    /// Joint torque estimated by the hardware.
    pub tau_est: Vec<f64>,
    /// Measured joint position.
    pub q: Vec<f64>,
    /// Commanded joint position.
    pub q_target: Vec<f64>,
    /// Measured joint velocity.
    pub dq: Vec<f64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type spanning configuration, sensing, inference, hardware and
/// telemetry failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlError {
    /// Unrecoverable; raised before the control loop starts.
    #[error("Configuration error in {field}: {details}")]
    Config { field: String, details: String },

    #[error("Sensing fault: {0}")]
    Sensing(String),

    #[error("Inference fault: {0}")]
    Inference(String),

    #[error("Hardware fault on {component}: {details}")]
    Hardware { component: String, details: String },

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl ControlError {
    /// Shorthand for a [`ControlError::Config`] on `field`.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            details: details.into(),
        }
    }

    /// `true` for faults the control loop may recover from on the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Sensing(_) | Self::Inference(_) | Self::Telemetry(_))
    }
}
