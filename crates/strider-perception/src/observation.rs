//! Observation Builder.
//!
//! Converts a [`RobotState`] snapshot into the fixed-layout, scaled and
//! clipped observation vector a policy consumes.  Channel order comes from
//! [`ModelParams::observations`]; per-channel transforms are:
//!
//! | Channel | Value |
//! |---|---|
//! | `lin_vel` | `base_lin_vel * lin_vel_scale` |
//! | `ang_vel` | `gyroscope * ang_vel_scale` |
//! | `gravity_vec` | world down rotated into the body frame |
//! | `commands` | `intent ⊙ commands_scale` |
//! | `base_quat` | normalized orientation `(w, x, y, z)` |
//! | `dof_pos` | `(q - default_dof_pos) * dof_pos_scale` |
//! | `dof_vel` | `dq * dof_vel_scale` |
//! | `actions` | previous policy action |
//!
//! Every element is clipped to `[-clip_obs, clip_obs]`; non-finite results
//! are replaced by zero first so a bad reading never reaches the policy as
//! NaN.  A degenerate orientation quaternion is replaced by the last valid
//! one.
//!
//! # Example
//!
//! ```rust
//! use strider_perception::observation::ObservationBuilder;
//! use strider_types::{OperatorIntent, RobotState};
//! # let params = strider_types::fixtures::quadruped();
//!
//! let mut builder = ObservationBuilder::new(&params).unwrap();
//! let state = RobotState::new(params.num_of_dofs);
//! let prev = vec![0.0; params.num_actions()];
//! let obs = builder.build(&state, &prev, &OperatorIntent::default()).unwrap();
//! assert_eq!(obs.len(), params.num_observations);
//! ```

use strider_types::{
    ControlError, GRAVITY_DIRECTION, ModelParams, ObservationChannel, OperatorIntent, RobotState,
};
use thiserror::Error;
use tracing::{trace, warn};

use crate::quaternion::{Quaternion, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Shape mismatch between an input and the configured joint / action count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObservationError {
    #[error("{field} has {got} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("layout produces {layout} elements but num_observations is {configured}")]
    LayoutMismatch { layout: usize, configured: usize },
}

impl From<ObservationError> for ControlError {
    fn from(e: ObservationError) -> Self {
        let field = match &e {
            ObservationError::LengthMismatch { field, .. } => (*field).to_string(),
            ObservationError::LayoutMismatch { .. } => "observations".to_string(),
        };
        ControlError::config(field, e.to_string())
    }
}

fn check_len(field: &'static str, expected: usize, got: usize) -> Result<(), ObservationError> {
    if expected == got {
        Ok(())
    } else {
        Err(ObservationError::LengthMismatch {
            field,
            expected,
            got,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observations
// ────────────────────────────────────────────────────────────────────────────

/// Per-tick observation buffers, already scaled.  Overwritten on every
/// [`ObservationBuilder::build`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    pub lin_vel: [f64; 3],
    pub ang_vel: [f64; 3],
    pub gravity_vec: [f64; 3],
    pub commands: [f64; 3],
    pub base_quat: [f64; 4],
    pub dof_pos: Vec<f64>,
    pub dof_vel: Vec<f64>,
    pub actions: Vec<f64>,
}

impl Observations {
    /// Zeroed buffers with an upright orientation.
    pub fn new(num_dofs: usize, num_actions: usize) -> Self {
        Self {
            lin_vel: [0.0; 3],
            ang_vel: [0.0; 3],
            gravity_vec: GRAVITY_DIRECTION,
            commands: [0.0; 3],
            base_quat: Quaternion::identity().to_array(),
            dof_pos: vec![0.0; num_dofs],
            dof_vel: vec![0.0; num_dofs],
            actions: vec![0.0; num_actions],
        }
    }

    fn channel(&self, channel: ObservationChannel) -> &[f64] {
        match channel {
            ObservationChannel::LinVel => &self.lin_vel,
            ObservationChannel::AngVel => &self.ang_vel,
            ObservationChannel::GravityVec => &self.gravity_vec,
            ObservationChannel::Commands => &self.commands,
            ObservationChannel::BaseQuat => &self.base_quat,
            ObservationChannel::DofPos => &self.dof_pos,
            ObservationChannel::DofVel => &self.dof_vel,
            ObservationChannel::Actions => &self.actions,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObservationBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Builds policy observations from raw sensing.
///
/// Construct once per controller with [`ObservationBuilder::new`], which
/// rejects any configuration whose per-joint vectors disagree with
/// `num_of_dofs` or whose channel layout does not add up to
/// `num_observations`.
#[derive(Debug, Clone)]
pub struct ObservationBuilder {
    layout: Vec<ObservationChannel>,
    num_dofs: usize,
    num_actions: usize,
    lin_vel_scale: f64,
    ang_vel_scale: f64,
    dof_pos_scale: f64,
    dof_vel_scale: f64,
    clip_obs: f64,
    commands_scale: [f64; 3],
    default_dof_pos: Vec<f64>,
    last_orientation: Quaternion,
    obs: Observations,
    buffer: Vec<f32>,
}

impl ObservationBuilder {
    /// Create a builder for `params`.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError`] when `default_dof_pos` or
    /// `commands_scale` have the wrong length, or when the channel layout
    /// disagrees with `num_observations`.
    pub fn new(params: &ModelParams) -> Result<Self, ObservationError> {
        let num_dofs = params.num_of_dofs;
        let num_actions = params.num_actions();
        check_len("default_dof_pos", num_dofs, params.default_dof_pos.len())?;
        check_len("commands_scale", 3, params.commands_scale.len())?;
        let layout_len = params.observation_len();
        if layout_len != params.num_observations {
            return Err(ObservationError::LayoutMismatch {
                layout: layout_len,
                configured: params.num_observations,
            });
        }

        Ok(Self {
            layout: params.observations.clone(),
            num_dofs,
            num_actions,
            lin_vel_scale: params.lin_vel_scale,
            ang_vel_scale: params.ang_vel_scale,
            dof_pos_scale: params.dof_pos_scale,
            dof_vel_scale: params.dof_vel_scale,
            clip_obs: params.clip_obs,
            commands_scale: [
                params.commands_scale[0],
                params.commands_scale[1],
                params.commands_scale[2],
            ],
            default_dof_pos: params.default_dof_pos.clone(),
            last_orientation: Quaternion::identity(),
            obs: Observations::new(num_dofs, num_actions),
            buffer: Vec::with_capacity(params.num_observations),
        })
    }

    /// Clear history-dependent state (previous actions, last orientation).
    pub fn reset(&mut self) {
        self.obs = Observations::new(self.num_dofs, self.num_actions);
        self.last_orientation = Quaternion::identity();
        self.buffer.clear();
    }

    /// The scaled buffers from the most recent build.
    pub fn observations(&self) -> &Observations {
        &self.obs
    }

    /// Length of every vector this builder produces.
    pub fn len(&self) -> usize {
        self.layout
            .iter()
            .map(|c| c.len(self.num_dofs, self.num_actions))
            .sum()
    }

    /// `true` only for an empty channel layout.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Fill the observation buffers from `state` and return the flattened,
    /// clipped observation vector.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::LengthMismatch`] when `state` or
    /// `prev_actions` disagree with the configured joint / action count.
    /// Nothing is truncated or padded.
    pub fn build(
        &mut self,
        state: &RobotState,
        prev_actions: &[f64],
        intent: &OperatorIntent,
    ) -> Result<&[f32], ObservationError> {
        check_len("state.q", self.num_dofs, state.q.len())?;
        check_len("state.dq", self.num_dofs, state.dq.len())?;
        check_len("prev_actions", self.num_actions, prev_actions.len())?;

        let orientation = match Quaternion::from_array(state.quaternion).normalized() {
            Some(q) => {
                self.last_orientation = q;
                q
            }
            None => {
                warn!(quaternion = ?state.quaternion, "degenerate orientation; reusing last valid quaternion");
                self.last_orientation
            }
        };

        let obs = &mut self.obs;
        obs.lin_vel = state.base_lin_vel.map(|v| v * self.lin_vel_scale);
        obs.ang_vel = state.gyroscope.map(|w| w * self.ang_vel_scale);
        obs.gravity_vec = orientation
            .rotate_inverse(Vec3::from_array(GRAVITY_DIRECTION))
            .to_array();
        let cmd = intent.as_array();
        obs.commands = [
            cmd[0] * self.commands_scale[0],
            cmd[1] * self.commands_scale[1],
            cmd[2] * self.commands_scale[2],
        ];
        obs.base_quat = orientation.to_array();
        for (j, pos) in obs.dof_pos.iter_mut().enumerate() {
            *pos = (state.q[j] - self.default_dof_pos[j]) * self.dof_pos_scale;
        }
        for (j, vel) in obs.dof_vel.iter_mut().enumerate() {
            *vel = state.dq[j] * self.dof_vel_scale;
        }
        obs.actions.copy_from_slice(prev_actions);

        self.buffer.clear();
        for channel in &self.layout {
            for &value in self.obs.channel(*channel) {
                let value = if value.is_finite() { value } else { 0.0 };
                self.buffer
                    .push(value.clamp(-self.clip_obs, self.clip_obs) as f32);
            }
        }
        trace!(len = self.buffer.len(), "observation built");
        Ok(&self.buffer)
    }
}
