//! [`CommandSynthesizer`] – policy actions and phase poses to actuator
//! commands.
//!
//! Every command produced here is complete: all joints in canonical order,
//! every array sized to the joint count.  Joints the policy does not drive
//! hold their default position with the policy gains.
//!
//! Policy actions are first clipped to `±clip_actions` and scaled per joint
//! by `action_scale` (times `hip_scale_reduction` for hip joints).  Then, by
//! [`ActuationMode`]:
//!
//! | Mode | `q` | `tau` | `kp` / `kd` |
//! |---|---|---|---|
//! | `position` | `default + offset` | 0 | `p_gains` / `d_gains` |
//! | `torque` | measured `q` | `offset * torque_scale`, clamped | `p_gains` / `d_gains` |
//! | `pd_torque` | `default + offset` | `p*(q_t - q) - d*dq`, clamped | 0 / 0 |
//!
//! The last command synthesized from a valid action vector is the holding
//! command.  An action vector of the wrong length or containing non-finite
//! values yields the holding command unchanged.

use strider_hal::pd::{JointPd, pd_torque};
use strider_types::{ActuationMode, ModelParams, RobotCommand, RobotState};
use tracing::warn;

/// Builds [`RobotCommand`]s for every phase.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    mode: ActuationMode,
    clip_actions: f64,
    /// Joint driven by each action index.
    action_joints: Vec<usize>,
    /// Per-joint action multiplier (hip reduction folded in).
    joint_scale: Vec<f64>,
    torque_scale: Vec<f64>,
    default_pose: Vec<f64>,
    p_gains: Vec<f64>,
    d_gains: Vec<f64>,
    standing_kp: Vec<f64>,
    standing_kd: Vec<f64>,
    damping: f64,
    pd: JointPd,
    holding: RobotCommand,
    last_actions: Option<Vec<f64>>,
}

impl CommandSynthesizer {
    /// Create a synthesizer for already-verified `params`.  The initial
    /// holding command is the default pose with the policy gains.
    pub fn new(params: &ModelParams) -> Self {
        let n = params.num_of_dofs;
        let mut s = Self {
            mode: params.actuation,
            clip_actions: params.clip_actions,
            action_joints: params.action_joints(),
            joint_scale: (0..n).map(|j| params.joint_action_scale(j)).collect(),
            torque_scale: (0..n).map(|j| params.torque_scale(j)).collect(),
            default_pose: params.default_dof_pos.clone(),
            p_gains: params.p_gains.clone(),
            d_gains: params.d_gains.clone(),
            standing_kp: params.standing_kp(),
            standing_kd: params.standing_kd(),
            damping: params.damping,
            pd: JointPd::new(params.torque_limits.clone()),
            holding: RobotCommand::zeroed(n),
            last_actions: None,
        };
        s.holding = s.default_hold();
        s
    }

    pub fn num_dofs(&self) -> usize {
        self.default_pose.len()
    }

    pub fn mode(&self) -> ActuationMode {
        self.mode
    }

    /// The last known-good policy command.
    pub fn holding(&self) -> &RobotCommand {
        &self.holding
    }

    /// Drop remembered actions and return the holding command to the default
    /// pose.  Called on policy warmup.
    pub fn reset(&mut self) {
        self.last_actions = None;
        self.holding = self.default_hold();
    }

    /// Default pose with policy gains, no feed-forward torque.
    fn default_hold(&self) -> RobotCommand {
        RobotCommand {
            q: self.default_pose.clone(),
            dq: vec![0.0; self.num_dofs()],
            tau: vec![0.0; self.num_dofs()],
            kp: self.p_gains.clone(),
            kd: self.d_gains.clone(),
        }
    }

    /// Scaled, clipped offset of action `i` for joint `j`.
    fn offset(&self, i: usize, j: usize, actions: &[f64]) -> f64 {
        actions[i].clamp(-self.clip_actions, self.clip_actions) * self.joint_scale[j]
    }

    /// Turn a policy action vector into a command and make it the holding
    /// command.  Invalid actions return the holding command unchanged.
    pub fn synthesize(&mut self, actions: &[f64], state: &RobotState) -> RobotCommand {
        if actions.len() != self.action_joints.len() {
            warn!(
                got = actions.len(),
                expected = self.action_joints.len(),
                "action vector has the wrong length; sending holding command"
            );
            return self.holding.clone();
        }
        if actions.iter().any(|a| !a.is_finite()) {
            warn!("action vector is not finite; sending holding command");
            return self.holding.clone();
        }
        if state.num_dofs() != self.num_dofs() {
            warn!(
                got = state.num_dofs(),
                expected = self.num_dofs(),
                "state joint count mismatch; sending holding command"
            );
            return self.holding.clone();
        }

        let mut cmd = self.default_hold();
        for (i, &j) in self.action_joints.iter().enumerate() {
            let offset = self.offset(i, j, actions);
            match self.mode {
                ActuationMode::Position => {
                    cmd.q[j] = self.default_pose[j] + offset;
                }
                ActuationMode::Torque => {
                    cmd.q[j] = state.q[j];
                    cmd.tau[j] = self.pd.clamp(j, offset * self.torque_scale[j]);
                }
                ActuationMode::PdTorque => {
                    let target = self.default_pose[j] + offset;
                    let tau = pd_torque(
                        self.p_gains[j],
                        self.d_gains[j],
                        target,
                        state.q[j],
                        0.0,
                        state.dq[j],
                        0.0,
                    );
                    cmd.q[j] = target;
                    cmd.tau[j] = self.pd.clamp(j, tau);
                    cmd.kp[j] = 0.0;
                    cmd.kd[j] = 0.0;
                }
            }
        }
        self.last_actions = Some(actions.to_vec());
        self.holding = cmd.clone();
        cmd
    }

    /// Re-synthesize from the last valid actions against a fresh state.
    /// Used on control ticks between policy ticks; returns the holding
    /// command when no actions have been accepted yet.
    pub fn resynthesize(&mut self, state: &RobotState) -> RobotCommand {
        match self.last_actions.clone() {
            Some(actions) => self.synthesize(&actions, state),
            None => self.holding.clone(),
        }
    }

    /// Stand-up / stand-down command: hold `pose` with the standing gains.
    pub fn standing_command(&self, pose: &[f64]) -> RobotCommand {
        RobotCommand {
            q: pose.to_vec(),
            dq: vec![0.0; pose.len()],
            tau: vec![0.0; pose.len()],
            kp: self.standing_kp.clone(),
            kd: self.standing_kd.clone(),
        }
    }

    /// Idle command: pure damping around `pose` (the measured joint
    /// positions when sensing is valid).
    pub fn idle_command(&self, pose: &[f64]) -> RobotCommand {
        RobotCommand {
            q: pose.to_vec(),
            dq: vec![0.0; pose.len()],
            tau: vec![0.0; pose.len()],
            kp: vec![0.0; pose.len()],
            kd: vec![self.damping; pose.len()],
        }
    }

    /// Torque the actuators apply for `command` at `state`; what telemetry
    /// reports as `tau`.
    pub fn effective_torques(&self, command: &RobotCommand, state: &RobotState) -> Vec<f64> {
        self.pd.torques(command, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strider_types::fixtures::quadruped;

    fn at_default(params: &ModelParams) -> RobotState {
        let mut s = RobotState::new(params.num_of_dofs);
        s.q = params.default_dof_pos.clone();
        s
    }

    #[test]
    fn initial_holding_is_default_pose_with_policy_gains() {
        let p = quadruped();
        let s = CommandSynthesizer::new(&p);
        assert_eq!(s.holding().q, p.default_dof_pos);
        assert_eq!(s.holding().kp, p.p_gains);
        assert!(s.holding().is_complete(12));
    }

    #[test]
    fn position_mode_adds_scaled_offset() {
        let p = quadruped();
        let mut s = CommandSynthesizer::new(&p);
        let cmd = s.synthesize(&[1.0; 12], &at_default(&p));
        // joint 1 is not a hip: 0.25 offset
        assert!((cmd.q[1] - (p.default_dof_pos[1] + 0.25)).abs() < 1e-12);
        // joint 0 is a hip: 0.25 * 0.5
        assert!((cmd.q[0] - (p.default_dof_pos[0] + 0.125)).abs() < 1e-12);
        assert_eq!(cmd.kp, p.p_gains);
        assert_eq!(cmd.kd, p.d_gains);
        assert!(cmd.tau.iter().all(|t| *t == 0.0));
    }

    #[test]
    fn hip_reduction_halves_offset_exactly() {
        let mut p = quadruped();
        p.action_scale = 1.0;
        p.hip_scale_reduction = 0.5;
        p.hip_scale_reduction_indices = vec![0, 3];
        p.default_dof_pos = vec![0.0; 12];
        let mut s = CommandSynthesizer::new(&p);
        let cmd = s.synthesize(&[0.8; 12], &RobotState::new(12));
        assert_eq!(cmd.q[0], 0.4);
        assert_eq!(cmd.q[3], 0.4);
        assert_eq!(cmd.q[1], 0.8);
        assert_eq!(cmd.q[0] * 2.0, cmd.q[1]);
    }

    #[test]
    fn actions_are_clipped() {
        let mut p = quadruped();
        p.clip_actions = 2.0;
        let mut s = CommandSynthesizer::new(&p);
        let cmd = s.synthesize(&[1000.0; 12], &at_default(&p));
        assert!((cmd.q[1] - (p.default_dof_pos[1] + 2.0 * 0.25)).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn any_action_vector_respects_torque_limits(
            actions in prop::collection::vec(-1e6..1e6f64, 12),
            q in prop::collection::vec(-10.0..10.0f64, 12),
            dq in prop::collection::vec(-100.0..100.0f64, 12),
            host_pd in any::<bool>(),
        ) {
            let mut p = quadruped();
            p.actuation = if host_pd { ActuationMode::PdTorque } else { ActuationMode::Torque };
            p.action_scale = 50.0;
            let mut s = CommandSynthesizer::new(&p);
            let mut state = RobotState::new(12);
            state.q = q;
            state.dq = dq;
            let cmd = s.synthesize(&actions, &state);
            for (j, tau) in cmd.tau.iter().enumerate() {
                prop_assert!(tau.abs() <= p.torque_limits[j], "joint {}: {}", j, tau);
            }
        }
    }

    #[test]
    fn torque_mode_applies_scale_and_hip_reduction() {
        let mut p = quadruped();
        p.actuation = ActuationMode::Torque;
        p.action_scale = 2.0;
        let mut scales = vec![1.0; 12];
        scales[4] = 0.5;
        p.torque_scales = Some(scales);
        let mut s = CommandSynthesizer::new(&p);
        let cmd = s.synthesize(&[1.0; 12], &at_default(&p));
        assert!((cmd.tau[4] - 1.0).abs() < 1e-12); // 1 * 2 * 0.5
        assert!((cmd.tau[0] - 1.0).abs() < 1e-12); // 1 * 2 * hip 0.5
        assert!((cmd.tau[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn pd_torque_mode_computes_torque_on_host() {
        let mut p = quadruped();
        p.actuation = ActuationMode::PdTorque;
        let mut s = CommandSynthesizer::new(&p);
        let mut state = at_default(&p);
        state.q[1] -= 0.1;
        state.dq[1] = 1.0;
        let cmd = s.synthesize(&[0.0; 12], &state);
        // 20 * 0.1 - 0.5 * 1.0
        assert!((cmd.tau[1] - 1.5).abs() < 1e-9);
        assert_eq!(cmd.kp, vec![0.0; 12]);
        assert_eq!(cmd.kd, vec![0.0; 12]);
        assert_eq!(cmd.q, p.default_dof_pos);
    }

    #[test]
    fn wrong_length_actions_yield_previous_holding_command() {
        let p = quadruped();
        let mut s = CommandSynthesizer::new(&p);
        let state = at_default(&p);
        let good = s.synthesize(&[0.3; 12], &state);
        let fallback = s.synthesize(&[0.9; 11], &state);
        assert_eq!(fallback, good);
        assert_eq!(s.holding(), &good);
    }

    #[test]
    fn nan_actions_yield_previous_holding_command() {
        let p = quadruped();
        let mut s = CommandSynthesizer::new(&p);
        let state = at_default(&p);
        let good = s.synthesize(&[0.3; 12], &state);
        let mut bad = vec![0.0; 12];
        bad[5] = f64::NAN;
        assert_eq!(s.synthesize(&bad, &state), good);
    }

    #[test]
    fn undriven_joints_hold_default_with_policy_gains() {
        let mut p = quadruped();
        p.action_joint_indices = Some(vec![1, 2]);
        let mut s = CommandSynthesizer::new(&p);
        let cmd = s.synthesize(&[1.0, 1.0], &at_default(&p));
        assert!(cmd.is_complete(12));
        assert_eq!(cmd.q[0], p.default_dof_pos[0]);
        assert_eq!(cmd.q[11], p.default_dof_pos[11]);
        assert_eq!(cmd.kp[11], p.p_gains[11]);
        assert!((cmd.q[2] - (p.default_dof_pos[2] + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn resynthesize_reuses_last_actions() {
        let mut p = quadruped();
        p.actuation = ActuationMode::PdTorque;
        let mut s = CommandSynthesizer::new(&p);
        let state = at_default(&p);
        assert_eq!(s.resynthesize(&state), *s.holding());
        s.synthesize(&[0.4; 12], &state);
        let mut moved = state.clone();
        moved.q[2] += 0.05;
        let again = s.resynthesize(&moved);
        // same target, torque recomputed against the new position
        assert!((again.q[2] - (p.default_dof_pos[2] + 0.1)).abs() < 1e-12);
        assert!((again.tau[2] - 20.0 * 0.05).abs() < 1e-9);
    }

    #[test]
    fn idle_command_is_pure_damping() {
        let p = quadruped();
        let s = CommandSynthesizer::new(&p);
        let pose = vec![0.2; 12];
        let cmd = s.idle_command(&pose);
        assert_eq!(cmd.q, pose);
        assert_eq!(cmd.kp, vec![0.0; 12]);
        assert_eq!(cmd.kd, vec![p.damping; 12]);
        assert!(cmd.is_complete(12));
    }

    #[test]
    fn standing_command_uses_standing_gains() {
        let p = quadruped();
        let s = CommandSynthesizer::new(&p);
        let cmd = s.standing_command(&p.default_dof_pos);
        assert_eq!(cmd.kp, vec![80.0; 12]);
        assert_eq!(cmd.kd, vec![3.0; 12]);
    }
}
