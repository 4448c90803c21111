//! In-process simulated robot for headless runs and tests.
//!
//! [`SimRobot`] models each joint as an independent rigid link driven by the
//! commanded PD law ([`JointPd`]) and integrated with semi-implicit Euler at
//! the control period.  There is no contact or gravity model; the base
//! orientation stays where it was set.  That is enough to exercise the full
//! stand-up / policy / stand-down cycle without hardware.
//!
//! # Example
//!
//! ```rust
//! use strider_hal::robot::RobotInterface;
//! use strider_hal::sim::SimRobot;
//! use strider_types::RobotCommand;
//!
//! let mut robot = SimRobot::builder(2)
//!     .with_initial_pose(vec![0.0, 0.0])
//!     .with_torque_limits(vec![50.0, 50.0])
//!     .build();
//!
//! let mut cmd = RobotCommand::zeroed(2);
//! cmd.q = vec![0.5, -0.5];
//! cmd.kp = vec![40.0, 40.0];
//! cmd.kd = vec![2.0, 2.0];
//! for _ in 0..2000 {
//!     robot.write_command(&cmd).unwrap();
//! }
//! let state = robot.read_state().unwrap();
//! assert!((state.q[0] - 0.5).abs() < 1e-3);
//! ```

use strider_types::{ControlError, RobotCommand, RobotState};
use tracing::trace;

use crate::pd::JointPd;
use crate::robot::{RobotInterface, joint_count_error};

const DEFAULT_DT: f64 = 0.005;
const DEFAULT_INERTIA: f64 = 0.05;
const DEFAULT_TORQUE_LIMIT: f64 = 50.0;

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// A simulated legged robot.  Always succeeds for well-formed commands.
#[derive(Debug, Clone)]
pub struct SimRobot {
    id: String,
    dt: f64,
    inertia: f64,
    pd: JointPd,
    state: RobotState,
    last_command: Option<RobotCommand>,
    commands_written: u64,
}

impl SimRobot {
    /// Start building a simulated robot with `num_dofs` joints.
    pub fn builder(num_dofs: usize) -> SimRobotBuilder {
        SimRobotBuilder::new(num_dofs)
    }

    /// The most recently applied command, if any.
    pub fn last_command(&self) -> Option<&RobotCommand> {
        self.last_command.as_ref()
    }

    /// Number of commands applied since construction.
    pub fn commands_written(&self) -> u64 {
        self.commands_written
    }

    /// Overwrite the base orientation reported by subsequent reads.  Tests use
    /// this to inject degenerate IMU readings.
    pub fn set_orientation(&mut self, quaternion: [f64; 4]) {
        self.state.quaternion = quaternion;
    }

    /// Overwrite the base linear / angular velocity reported by subsequent
    /// reads.
    pub fn set_base_velocity(&mut self, lin_vel: [f64; 3], ang_vel: [f64; 3]) {
        self.state.base_lin_vel = lin_vel;
        self.state.gyroscope = ang_vel;
    }

    /// Place every joint at `q` with zero velocity.
    pub fn set_pose(&mut self, q: &[f64]) {
        for (j, v) in q.iter().enumerate().take(self.state.num_dofs()) {
            self.state.q[j] = *v;
            self.state.dq[j] = 0.0;
            self.state.ddq[j] = 0.0;
        }
    }

    fn step(&mut self, command: &RobotCommand) {
        let tau = self.pd.torques(command, &self.state);
        for (j, t) in tau.into_iter().enumerate() {
            let ddq = t / self.inertia;
            self.state.ddq[j] = ddq;
            self.state.dq[j] += ddq * self.dt;
            self.state.q[j] += self.state.dq[j] * self.dt;
            self.state.tau_est[j] = t;
            // Rough current estimate for a motor constant of 1 N·m/A.
            self.state.current[j] = t;
        }
    }
}

impl RobotInterface for SimRobot {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_state(&mut self) -> Result<RobotState, ControlError> {
        Ok(self.state.clone())
    }

    fn write_command(&mut self, command: &RobotCommand) -> Result<(), ControlError> {
        let n = self.state.num_dofs();
        if !command.is_complete(n) {
            return Err(joint_count_error(&self.id, n, command));
        }
        self.step(command);
        self.commands_written += 1;
        self.last_command = Some(command.clone());
        trace!(robot = %self.id, tick = self.commands_written, "sim step");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobotBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimRobot`].
///
/// Defaults: identity orientation, every joint at zero, `dt` of 5 ms, link
/// inertia of 0.05 kg·m² and a 50 N·m torque limit per joint.
#[derive(Debug, Clone)]
pub struct SimRobotBuilder {
    id: String,
    num_dofs: usize,
    dt: f64,
    inertia: f64,
    initial_pose: Option<Vec<f64>>,
    torque_limits: Option<Vec<f64>>,
    orientation: [f64; 4],
}

impl SimRobotBuilder {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            id: "sim".to_string(),
            num_dofs,
            dt: DEFAULT_DT,
            inertia: DEFAULT_INERTIA,
            initial_pose: None,
            torque_limits: None,
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Integration step; should match the control period.
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Rotational inertia of every link.
    pub fn with_inertia(mut self, inertia: f64) -> Self {
        self.inertia = inertia;
        self
    }

    /// Joint positions at construction.  Extra entries are ignored.
    pub fn with_initial_pose(mut self, q: Vec<f64>) -> Self {
        self.initial_pose = Some(q);
        self
    }

    pub fn with_torque_limits(mut self, limits: Vec<f64>) -> Self {
        self.torque_limits = Some(limits);
        self
    }

    pub fn with_orientation(mut self, quaternion: [f64; 4]) -> Self {
        self.orientation = quaternion;
        self
    }

    /// Consume the builder and return the configured [`SimRobot`].
    pub fn build(self) -> SimRobot {
        let mut state = RobotState::new(self.num_dofs);
        state.quaternion = self.orientation;
        if let Some(pose) = &self.initial_pose {
            for (j, q) in pose.iter().enumerate().take(self.num_dofs) {
                state.q[j] = *q;
            }
        }
        let limits = self
            .torque_limits
            .unwrap_or_else(|| vec![DEFAULT_TORQUE_LIMIT; self.num_dofs]);
        SimRobot {
            id: self.id,
            dt: self.dt,
            inertia: self.inertia,
            pd: JointPd::new(limits),
            state,
            last_command: None,
            commands_written: 0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(q: Vec<f64>, kp: f64, kd: f64) -> RobotCommand {
        let n = q.len();
        RobotCommand {
            q,
            dq: vec![0.0; n],
            tau: vec![0.0; n],
            kp: vec![kp; n],
            kd: vec![kd; n],
        }
    }

    #[test]
    fn builder_applies_initial_pose_and_orientation() {
        let mut robot = SimRobot::builder(3)
            .with_id("bench")
            .with_initial_pose(vec![0.1, 0.2, 0.3, 9.9])
            .with_orientation([0.0, 1.0, 0.0, 0.0])
            .build();
        let state = robot.read_state().unwrap();
        assert_eq!(robot.id(), "bench");
        assert_eq!(state.q, vec![0.1, 0.2, 0.3]);
        assert_eq!(state.quaternion, [0.0, 1.0, 0.0, 0.0]);
        assert!(robot.last_command().is_none());
    }

    #[test]
    fn pd_command_converges_to_target() {
        let mut robot = SimRobot::builder(2).build();
        let cmd = hold(vec![0.8, -1.2], 40.0, 2.0);
        for _ in 0..2000 {
            robot.write_command(&cmd).unwrap();
        }
        let state = robot.read_state().unwrap();
        assert!((state.q[0] - 0.8).abs() < 1e-3);
        assert!((state.q[1] + 1.2).abs() < 1e-3);
        assert!(state.dq.iter().all(|v| v.abs() < 1e-2));
        assert_eq!(robot.commands_written(), 2000);
    }

    #[test]
    fn passive_damping_keeps_resting_robot_still() {
        let mut robot = SimRobot::builder(2)
            .with_initial_pose(vec![0.4, 0.4])
            .build();
        let cmd = hold(vec![0.4, 0.4], 0.0, 1.0);
        for _ in 0..100 {
            robot.write_command(&cmd).unwrap();
        }
        assert_eq!(robot.read_state().unwrap().q, vec![0.4, 0.4]);
    }

    #[test]
    fn estimated_torque_respects_limits() {
        let mut robot = SimRobot::builder(1)
            .with_torque_limits(vec![3.0])
            .build();
        robot.write_command(&hold(vec![10.0], 100.0, 0.0)).unwrap();
        assert_eq!(robot.read_state().unwrap().tau_est, vec![3.0]);
    }

    #[test]
    fn incomplete_command_is_a_hardware_fault() {
        let mut robot = SimRobot::builder(4).build();
        let err = robot.write_command(&RobotCommand::zeroed(3)).unwrap_err();
        assert!(matches!(err, ControlError::Hardware { .. }));

        let mut cmd = RobotCommand::zeroed(4);
        cmd.q[2] = f64::NAN;
        assert!(robot.write_command(&cmd).is_err());
        assert_eq!(robot.commands_written(), 0);
    }

    #[test]
    fn set_pose_and_orientation_are_visible_to_reads() {
        let mut robot = SimRobot::builder(2).build();
        robot.set_pose(&[1.0, 2.0]);
        robot.set_orientation([0.0; 4]);
        robot.set_base_velocity([0.5, 0.0, 0.0], [0.0, 0.0, 0.1]);
        let state = robot.read_state().unwrap();
        assert_eq!(state.q, vec![1.0, 2.0]);
        assert_eq!(state.quaternion, [0.0; 4]);
        assert_eq!(state.base_lin_vel, [0.5, 0.0, 0.0]);
        assert_eq!(state.gyroscope, [0.0, 0.0, 0.1]);
    }
}
