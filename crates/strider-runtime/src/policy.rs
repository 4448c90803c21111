//! Policy invocation.
//!
//! A [`Policy`] maps one observation vector to one action vector.  It is
//! called synchronously on the control thread once per policy tick, so an
//! implementation must be bounded in time and must not block on I/O.
//!
//! [`PolicyInvoker`] wraps the backend and enforces the output contract:
//! exactly `num_actions` finite values.  Anything else is an inference fault;
//! the previous action buffer is kept so the next observation still carries
//! the last valid action, and the caller falls back to its holding command.
//! Accepted actions are buffered clipped to `±clip_actions`, which is what
//! the next observation feeds back to the policy.
//!
//! Two in-tree backends are provided and selected by
//! [`PolicySpec`][strider_types::PolicySpec] through [`build_policy`]:
//!
//! * [`ZeroPolicy`] – always zero; holds the default pose in position mode.
//! * [`LinearPolicy`] – `a = W·o + b` loaded from a JSON weights file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strider_types::{ControlError, ModelParams, PolicySpec};
use thiserror::Error;
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Policy trait
// ────────────────────────────────────────────────────────────────────────────

/// A learned (or scripted) control policy.
pub trait Policy: Send {
    /// Short identifier used in logs, e.g. the model file name.
    fn id(&self) -> &str;

    /// Run one inference.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Inference`] when the backend itself fails.
    fn forward(&mut self, observation: &[f32]) -> Result<Vec<f32>, ControlError>;

    /// Clear any internal recurrent state.  Called on policy warmup.
    fn reset(&mut self) {}
}

/// Outputs zeros of a fixed length.
#[derive(Debug, Clone)]
pub struct ZeroPolicy {
    num_actions: usize,
}

impl ZeroPolicy {
    pub fn new(num_actions: usize) -> Self {
        Self { num_actions }
    }
}

impl Policy for ZeroPolicy {
    fn id(&self) -> &str {
        "zero"
    }

    fn forward(&mut self, _observation: &[f32]) -> Result<Vec<f32>, ControlError> {
        Ok(vec![0.0; self.num_actions])
    }
}

/// Serialized form of a [`LinearPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    /// `num_actions` rows of `num_observations` columns.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

/// Affine policy `a = W·o + b`.
#[derive(Debug, Clone)]
pub struct LinearPolicy {
    id: String,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    inputs: usize,
}

impl LinearPolicy {
    /// Build from weights, checking that the matrix is rectangular and the
    /// bias matches the row count.
    pub fn new(id: impl Into<String>, w: LinearWeights) -> Result<Self, ControlError> {
        let inputs = w.weights.first().map_or(0, Vec::len);
        if w.weights.is_empty() || inputs == 0 {
            return Err(ControlError::config("policy", "weight matrix is empty"));
        }
        if let Some(row) = w.weights.iter().position(|r| r.len() != inputs) {
            return Err(ControlError::config(
                "policy",
                format!("weight row {row} has a different width than row 0"),
            ));
        }
        if w.bias.len() != w.weights.len() {
            return Err(ControlError::config(
                "policy",
                format!(
                    "bias has {} entries for {} weight rows",
                    w.bias.len(),
                    w.weights.len()
                ),
            ));
        }
        Ok(Self {
            id: id.into(),
            weights: w.weights,
            bias: w.bias,
            inputs,
        })
    }

    /// Load a JSON weights file.
    pub fn load(path: &Path) -> Result<Self, ControlError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ControlError::config("policy.path", format!("cannot read {}: {e}", path.display()))
        })?;
        let w: LinearWeights = serde_json::from_str(&raw).map_err(|e| {
            ControlError::config("policy.path", format!("invalid weights in {}: {e}", path.display()))
        })?;
        let id = path
            .file_name()
            .map_or_else(|| "linear".to_string(), |n| n.to_string_lossy().into_owned());
        Self::new(id, w)
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.weights.len()
    }
}

impl Policy for LinearPolicy {
    fn id(&self) -> &str {
        &self.id
    }

    fn forward(&mut self, observation: &[f32]) -> Result<Vec<f32>, ControlError> {
        if observation.len() != self.inputs {
            return Err(ControlError::Inference(format!(
                "observation has {} elements, policy expects {}",
                observation.len(),
                self.inputs
            )));
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(observation).map(|(w, o)| w * o).sum::<f32>() + b)
            .collect())
    }
}

/// Instantiate the backend named by `params.policy`.  Relative weight paths
/// resolve against `base_dir` (the configuration file's directory).
///
/// # Errors
///
/// [`ControlError::Config`] when the weights cannot be loaded or their
/// shape disagrees with `num_observations` / the action count.
pub fn build_policy(params: &ModelParams, base_dir: &Path) -> Result<Box<dyn Policy>, ControlError> {
    let num_actions = params.num_actions();
    match &params.policy {
        PolicySpec::Zero => {
            info!(num_actions, "using zero policy");
            Ok(Box::new(ZeroPolicy::new(num_actions)))
        }
        PolicySpec::Linear { path } => {
            let full = if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            };
            let policy = LinearPolicy::load(&full)?;
            if policy.num_inputs() != params.num_observations {
                return Err(ControlError::config(
                    "policy",
                    format!(
                        "weights take {} inputs, num_observations is {}",
                        policy.num_inputs(),
                        params.num_observations
                    ),
                ));
            }
            if policy.num_outputs() != num_actions {
                return Err(ControlError::config(
                    "policy",
                    format!(
                        "weights produce {} actions, {num_actions} joints are driven",
                        policy.num_outputs()
                    ),
                ));
            }
            info!(path = %full.display(), "loaded linear policy");
            Ok(Box::new(policy))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PolicyInvoker
// ────────────────────────────────────────────────────────────────────────────

/// Why an inference result was discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceFault {
    #[error("policy backend failed: {0}")]
    Backend(String),

    #[error("policy returned {got} actions, expected {expected}")]
    WrongLength { expected: usize, got: usize },

    #[error("policy returned a non-finite action at index {0}")]
    NonFinite(usize),
}

impl From<InferenceFault> for ControlError {
    fn from(fault: InferenceFault) -> Self {
        ControlError::Inference(fault.to_string())
    }
}

/// Calls a [`Policy`] and buffers the last valid action vector.
pub struct PolicyInvoker {
    policy: Box<dyn Policy>,
    last_actions: Vec<f64>,
    clip_actions: f64,
}

impl PolicyInvoker {
    pub fn new(policy: Box<dyn Policy>, num_actions: usize, clip_actions: f64) -> Self {
        Self {
            policy,
            last_actions: vec![0.0; num_actions],
            clip_actions,
        }
    }

    pub fn policy_id(&self) -> &str {
        self.policy.id()
    }

    /// The most recent valid action vector, clipped (zeros after
    /// [`reset`][Self::reset]).
    pub fn last_actions(&self) -> &[f64] {
        &self.last_actions
    }

    /// Zero the action buffer and the backend's internal state.
    pub fn reset(&mut self) {
        self.last_actions.iter_mut().for_each(|a| *a = 0.0);
        self.policy.reset();
    }

    /// Run the policy on `observation`.  On success the action buffer is
    /// replaced by the clipped output and returned; on failure it is left
    /// untouched.
    pub fn invoke(&mut self, observation: &[f32]) -> Result<&[f64], InferenceFault> {
        let raw = self
            .policy
            .forward(observation)
            .map_err(|e| InferenceFault::Backend(e.to_string()))?;
        if raw.len() != self.last_actions.len() {
            warn!(got = raw.len(), expected = self.last_actions.len(), "policy output length mismatch");
            return Err(InferenceFault::WrongLength {
                expected: self.last_actions.len(),
                got: raw.len(),
            });
        }
        if let Some(i) = raw.iter().position(|a| !a.is_finite()) {
            warn!(index = i, "policy output is not finite");
            return Err(InferenceFault::NonFinite(i));
        }
        for (dst, src) in self.last_actions.iter_mut().zip(&raw) {
            *dst = f64::from(*src).clamp(-self.clip_actions, self.clip_actions);
        }
        Ok(&self.last_actions)
    }
}
