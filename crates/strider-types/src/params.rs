//! [`ModelParams`] – static, loaded-once robot and policy configuration.
//!
//! Deserialized from one `[robots.<name>]` table of the robot configuration
//! file.  Optional fields fall back to the defaults documented on each field.
//! Structural consistency (vector lengths, index ranges, positive limits) is
//! not checked here; `strider-kernel` verifies a loaded value before any
//! controller is built from it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Enumerations
// ────────────────────────────────────────────────────────────────────────────

/// How policy actions are turned into actuator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationMode {
    /// Actions are position offsets around the default pose.
    #[default]
    Position,
    /// Actions are scaled directly into feed-forward torques.
    Torque,
    /// Actions are position offsets converted to torques with the policy
    /// P/D gains on the control thread.
    PdTorque,
}

/// One block of the observation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationChannel {
    LinVel,
    AngVel,
    GravityVec,
    Commands,
    BaseQuat,
    DofPos,
    DofVel,
    Actions,
}

impl ObservationChannel {
    /// Number of elements this channel contributes.
    pub fn len(&self, num_dofs: usize, num_actions: usize) -> usize {
        match self {
            Self::LinVel | Self::AngVel | Self::GravityVec | Self::Commands => 3,
            Self::BaseQuat => 4,
            Self::DofPos | Self::DofVel => num_dofs,
            Self::Actions => num_actions,
        }
    }
}

/// Pose the stand-down interpolation ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandDownTarget {
    /// `default_dof_pos`.
    #[default]
    DefaultPose,
    /// The pose captured when the robot last left Idle.
    RestPose,
}

/// Which in-tree inference backend to instantiate at startup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySpec {
    /// Always outputs zero actions.
    #[default]
    Zero,
    /// Affine policy `a = W·o + b`; `path` points at a JSON weights file,
    /// relative to the configuration file when not absolute.
    Linear { path: PathBuf },
}

// ────────────────────────────────────────────────────────────────────────────
// ModelParams
// ────────────────────────────────────────────────────────────────────────────

fn default_dt() -> f64 {
    0.005
}
fn default_decimation() -> u32 {
    4
}
fn default_hip_scale_reduction() -> f64 {
    1.0
}
fn default_stand_duration() -> f64 {
    2.0
}
fn default_max_sensing_faults() -> u32 {
    10
}
fn default_observations() -> Vec<ObservationChannel> {
    vec![
        ObservationChannel::LinVel,
        ObservationChannel::AngVel,
        ObservationChannel::GravityVec,
        ObservationChannel::Commands,
        ObservationChannel::DofPos,
        ObservationChannel::DofVel,
        ObservationChannel::Actions,
    ]
}

/// Robot and policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Policy identifier, e.g. the exported model file name.
    pub model_name: String,
    /// Length of the observation vector the policy expects.
    pub num_observations: usize,
    /// Control period in seconds.
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// The policy runs once every `decimation` control ticks.
    #[serde(default = "default_decimation")]
    pub decimation: u32,
    /// Uniform damping used for Idle and for standing gains when
    /// `fixed_kd` is absent.
    pub damping: f64,
    /// Uniform stiffness used for standing gains when `fixed_kp` is absent.
    pub stiffness: f64,
    pub action_scale: f64,
    /// Extra factor on the action offsets of hip-type joints.
    #[serde(default = "default_hip_scale_reduction")]
    pub hip_scale_reduction: f64,
    /// Joint indices the hip reduction applies to.
    #[serde(default)]
    pub hip_scale_reduction_indices: Vec<usize>,
    pub num_of_dofs: usize,
    pub lin_vel_scale: f64,
    pub ang_vel_scale: f64,
    pub dof_pos_scale: f64,
    pub dof_vel_scale: f64,
    pub clip_obs: f64,
    pub clip_actions: f64,
    pub torque_limits: Vec<f64>,
    pub p_gains: Vec<f64>,
    pub d_gains: Vec<f64>,
    /// Standing P gains; defaults to `stiffness` on every joint.
    #[serde(default)]
    pub fixed_kp: Option<Vec<f64>>,
    /// Standing D gains; defaults to `damping` on every joint.
    #[serde(default)]
    pub fixed_kd: Option<Vec<f64>>,
    /// Per-joint torque scale for [`ActuationMode::Torque`]; defaults to 1.
    #[serde(default)]
    pub torque_scales: Option<Vec<f64>>,
    /// Scale applied to the operator intent `(x, y, yaw)`.
    pub commands_scale: Vec<f64>,
    pub default_dof_pos: Vec<f64>,
    /// Canonical joint ordering shared by every per-joint vector.
    pub joint_names: Vec<String>,
    #[serde(default)]
    pub actuation: ActuationMode,
    /// Observation channels in the order the policy consumes them.
    #[serde(default = "default_observations")]
    pub observations: Vec<ObservationChannel>,
    /// Joints driven by the action vector, in action order.  Defaults to
    /// every joint in canonical order.
    #[serde(default)]
    pub action_joint_indices: Option<Vec<usize>>,
    #[serde(default = "default_stand_duration")]
    pub stand_up_duration: f64,
    #[serde(default = "default_stand_duration")]
    pub stand_down_duration: f64,
    #[serde(default)]
    pub stand_down_target: StandDownTarget,
    /// Consecutive invalid sensing ticks tolerated during policy control.
    #[serde(default = "default_max_sensing_faults")]
    pub max_sensing_faults: u32,
    #[serde(default)]
    pub policy: PolicySpec,
}

impl ModelParams {
    /// Joints driven by the action vector, in action order.
    pub fn action_joints(&self) -> Vec<usize> {
        match &self.action_joint_indices {
            Some(indices) => indices.clone(),
            None => (0..self.num_of_dofs).collect(),
        }
    }

    /// Length of the policy action vector.
    pub fn num_actions(&self) -> usize {
        self.action_joint_indices
            .as_ref()
            .map_or(self.num_of_dofs, Vec::len)
    }

    /// Observation length implied by [`ModelParams::observations`].
    pub fn observation_len(&self) -> usize {
        let actions = self.num_actions();
        self.observations
            .iter()
            .map(|c| c.len(self.num_of_dofs, actions))
            .sum()
    }

    /// `true` when joint `index` receives the hip scale reduction.
    pub fn is_hip(&self, index: usize) -> bool {
        self.hip_scale_reduction_indices.contains(&index)
    }

    /// Multiplier applied to joint `index`'s action offset.
    pub fn joint_action_scale(&self, index: usize) -> f64 {
        if self.is_hip(index) {
            self.action_scale * self.hip_scale_reduction
        } else {
            self.action_scale
        }
    }

    /// Per-joint P gains used while standing up or down.
    pub fn standing_kp(&self) -> Vec<f64> {
        self.fixed_kp
            .clone()
            .unwrap_or_else(|| vec![self.stiffness; self.num_of_dofs])
    }

    /// Per-joint D gains used while standing up or down.
    pub fn standing_kd(&self) -> Vec<f64> {
        self.fixed_kd
            .clone()
            .unwrap_or_else(|| vec![self.damping; self.num_of_dofs])
    }

    /// Torque scale for joint `index` (1.0 when unconfigured).
    pub fn torque_scale(&self, index: usize) -> f64 {
        self.torque_scales
            .as_ref()
            .and_then(|s| s.get(index).copied())
            .unwrap_or(1.0)
    }
}
