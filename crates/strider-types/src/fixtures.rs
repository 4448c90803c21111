//! Ready-made configurations for tests and simulation demos.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `test-fixtures` feature.

use crate::params::{ActuationMode, ModelParams, ObservationChannel, PolicySpec, StandDownTarget};

const QUAD_JOINTS: [&str; 12] = [
    "FL_hip", "FL_thigh", "FL_calf", "FR_hip", "FR_thigh", "FR_calf", "RL_hip", "RL_thigh",
    "RL_calf", "RR_hip", "RR_thigh", "RR_calf",
];

/// A 12-joint quadruped in position mode with the default observation
/// layout (48 elements) and a zero policy.
pub fn quadruped() -> ModelParams {
    ModelParams {
        model_name: "quad_walk.json".to_string(),
        num_observations: 48,
        dt: 0.005,
        decimation: 4,
        damping: 0.5,
        stiffness: 20.0,
        action_scale: 0.25,
        hip_scale_reduction: 0.5,
        hip_scale_reduction_indices: vec![0, 3, 6, 9],
        num_of_dofs: 12,
        lin_vel_scale: 2.0,
        ang_vel_scale: 0.25,
        dof_pos_scale: 1.0,
        dof_vel_scale: 0.05,
        clip_obs: 100.0,
        clip_actions: 100.0,
        torque_limits: vec![33.5; 12],
        p_gains: vec![20.0; 12],
        d_gains: vec![0.5; 12],
        fixed_kp: Some(vec![80.0; 12]),
        fixed_kd: Some(vec![3.0; 12]),
        torque_scales: None,
        commands_scale: vec![2.0, 2.0, 0.25],
        default_dof_pos: vec![
            0.1, 0.8, -1.5, -0.1, 0.8, -1.5, 0.1, 1.0, -1.5, -0.1, 1.0, -1.5,
        ],
        joint_names: QUAD_JOINTS.iter().map(|s| s.to_string()).collect(),
        actuation: ActuationMode::Position,
        observations: vec![
            ObservationChannel::LinVel,
            ObservationChannel::AngVel,
            ObservationChannel::GravityVec,
            ObservationChannel::Commands,
            ObservationChannel::DofPos,
            ObservationChannel::DofVel,
            ObservationChannel::Actions,
        ],
        action_joint_indices: None,
        stand_up_duration: 0.1,
        stand_down_duration: 0.1,
        stand_down_target: StandDownTarget::DefaultPose,
        max_sensing_faults: 10,
        policy: PolicySpec::Zero,
    }
}

/// Lying pose used as the starting configuration in stand-up scenarios.
pub fn quadruped_lying_pose() -> Vec<f64> {
    vec![0.0, 1.3, -2.7, 0.0, 1.3, -2.7, 0.0, 1.3, -2.7, 0.0, 1.3, -2.7]
}
