//! [`ConfigVerifier`] – startup rule engine over [`ModelParams`].
//!
//! A loaded configuration must pass [`ConfigVerifier::verify`] before any
//! controller is built from it.  Every registered [`ConfigRule`] is evaluated
//! in order; the first violation returns a [`ControlError::Config`] naming
//! the offending field, and the robot never leaves Idle.
//!
//! [`ConfigVerifier::with_default_rules`] registers the built-in rules:
//!
//! | Rule | Invariant |
//! |---|---|
//! | [`DofCountRule`] | `1 <= num_of_dofs <= MAX_DOFS` |
//! | [`JointVectorRule`] | every per-joint vector has `num_of_dofs` entries |
//! | [`JointNamesRule`] | joint names are non-empty and unique |
//! | [`IndexRule`] | hip and action indices are in range and unique |
//! | [`PositiveLimitsRule`] | clip bounds, `dt`, durations and torque limits are positive |
//! | [`NonNegativeGainsRule`] | damping, stiffness and every gain vector are `>= 0` |
//! | [`FiniteValuesRule`] | no NaN or infinity anywhere |
//! | [`ObservationLayoutRule`] | channel layout adds up to `num_observations` |

use std::collections::HashSet;

use strider_types::{ControlError, MAX_DOFS, ModelParams};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single structural invariant a configuration must satisfy.
pub trait ConfigRule: Send + Sync {
    /// Human-readable name used in log output.
    fn name(&self) -> &str;

    /// Return `Ok(())` when `params` satisfies the invariant, or
    /// [`ControlError::Config`] when it is violated.
    fn check(&self, params: &ModelParams) -> Result<(), ControlError>;
}

// ────────────────────────────────────────────────────────────────────────────
// ConfigVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine that validates a [`ModelParams`] value.
///
/// # Example
///
/// ```
/// use strider_kernel::config_verifier::ConfigVerifier;
/// # let mut params = strider_types::fixtures::quadruped();
///
/// let verifier = ConfigVerifier::with_default_rules();
/// assert!(verifier.verify(&params).is_ok());
///
/// params.p_gains.pop();
/// assert!(verifier.verify(&params).is_err());
/// ```
#[derive(Default)]
pub struct ConfigVerifier {
    rules: Vec<Box<dyn ConfigRule>>,
}

impl ConfigVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier carrying every built-in rule.
    pub fn with_default_rules() -> Self {
        let mut v = Self::new();
        v.add_rule(Box::new(DofCountRule));
        v.add_rule(Box::new(JointVectorRule));
        v.add_rule(Box::new(JointNamesRule));
        v.add_rule(Box::new(IndexRule));
        v.add_rule(Box::new(PositiveLimitsRule));
        v.add_rule(Box::new(NonNegativeGainsRule));
        v.add_rule(Box::new(FiniteValuesRule));
        v.add_rule(Box::new(ObservationLayoutRule));
        v
    }

    /// Register a new [`ConfigRule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn ConfigRule>) {
        self.rules.push(rule);
    }

    /// Validate `params` against every registered rule.
    ///
    /// Returns the first [`ControlError::Config`] encountered.
    pub fn verify(&self, params: &ModelParams) -> Result<(), ControlError> {
        for rule in &self.rules {
            rule.check(params)?;
        }
        Ok(())
    }
}

/// Validate `params` against [`ConfigVerifier::with_default_rules`].
pub fn verify_model_params(params: &ModelParams) -> Result<(), ControlError> {
    ConfigVerifier::with_default_rules().verify(params)
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects a joint count of zero or above [`MAX_DOFS`].
pub struct DofCountRule;

impl ConfigRule for DofCountRule {
    fn name(&self) -> &str {
        "dof_count"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        if params.num_of_dofs == 0 || params.num_of_dofs > MAX_DOFS {
            return Err(ControlError::config(
                "num_of_dofs",
                format!("{} is outside 1..={MAX_DOFS}", params.num_of_dofs),
            ));
        }
        Ok(())
    }
}

/// Rejects any per-joint vector whose length differs from `num_of_dofs`.
pub struct JointVectorRule;

impl ConfigRule for JointVectorRule {
    fn name(&self) -> &str {
        "joint_vectors"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        let n = params.num_of_dofs;
        let mut vectors: Vec<(&str, usize)> = vec![
            ("joint_names", params.joint_names.len()),
            ("default_dof_pos", params.default_dof_pos.len()),
            ("torque_limits", params.torque_limits.len()),
            ("p_gains", params.p_gains.len()),
            ("d_gains", params.d_gains.len()),
        ];
        if let Some(v) = &params.fixed_kp {
            vectors.push(("fixed_kp", v.len()));
        }
        if let Some(v) = &params.fixed_kd {
            vectors.push(("fixed_kd", v.len()));
        }
        if let Some(v) = &params.torque_scales {
            vectors.push(("torque_scales", v.len()));
        }
        for (field, len) in vectors {
            if len != n {
                return Err(ControlError::config(
                    field,
                    format!("expected {n} entries, got {len}"),
                ));
            }
        }
        if params.commands_scale.len() != 3 {
            return Err(ControlError::config(
                "commands_scale",
                format!("expected 3 entries, got {}", params.commands_scale.len()),
            ));
        }
        Ok(())
    }
}

/// Rejects empty or duplicated joint names.
pub struct JointNamesRule;

impl ConfigRule for JointNamesRule {
    fn name(&self) -> &str {
        "joint_names"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        let mut seen = HashSet::new();
        for (j, name) in params.joint_names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ControlError::config(
                    "joint_names",
                    format!("joint {j} has an empty name"),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ControlError::config(
                    "joint_names",
                    format!("duplicate joint name {name:?}"),
                ));
            }
        }
        Ok(())
    }
}

/// Rejects out-of-range or duplicated hip / action joint indices.
pub struct IndexRule;

fn check_indices(field: &str, indices: &[usize], n: usize) -> Result<(), ControlError> {
    let mut seen = HashSet::new();
    for &i in indices {
        if i >= n {
            return Err(ControlError::config(
                field,
                format!("joint index {i} out of range for {n} joints"),
            ));
        }
        if !seen.insert(i) {
            return Err(ControlError::config(
                field,
                format!("joint index {i} listed twice"),
            ));
        }
    }
    Ok(())
}

impl ConfigRule for IndexRule {
    fn name(&self) -> &str {
        "joint_indices"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        let n = params.num_of_dofs;
        check_indices(
            "hip_scale_reduction_indices",
            &params.hip_scale_reduction_indices,
            n,
        )?;
        if let Some(actions) = &params.action_joint_indices {
            if actions.is_empty() {
                return Err(ControlError::config(
                    "action_joint_indices",
                    "at least one joint must be driven by the policy",
                ));
            }
            check_indices("action_joint_indices", actions, n)?;
        }
        Ok(())
    }
}

/// Rejects non-positive clip bounds, periods, durations and torque limits.
pub struct PositiveLimitsRule;

// NaN is not positive.
fn is_positive(v: f64) -> bool {
    v > 0.0
}

impl ConfigRule for PositiveLimitsRule {
    fn name(&self) -> &str {
        "positive_limits"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        let scalars = [
            ("clip_obs", params.clip_obs),
            ("clip_actions", params.clip_actions),
            ("dt", params.dt),
            ("stand_up_duration", params.stand_up_duration),
            ("stand_down_duration", params.stand_down_duration),
        ];
        for (field, value) in scalars {
            if !is_positive(value) {
                return Err(ControlError::config(field, format!("{value} must be > 0")));
            }
        }
        if params.decimation == 0 {
            return Err(ControlError::config("decimation", "must be >= 1"));
        }
        if let Some((j, limit)) = params
            .torque_limits
            .iter()
            .enumerate()
            .find(|(_, l)| !is_positive(**l))
        {
            return Err(ControlError::config(
                "torque_limits",
                format!("joint {j} limit {limit} must be > 0"),
            ));
        }
        Ok(())
    }
}

/// Rejects negative stiffness, damping and PD gains.  The command gate
/// refuses negative gains, so a configuration carrying one could never send
/// a valid command.
pub struct NonNegativeGainsRule;

impl ConfigRule for NonNegativeGainsRule {
    fn name(&self) -> &str {
        "non_negative_gains"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        for (field, value) in [("damping", params.damping), ("stiffness", params.stiffness)] {
            if value < 0.0 {
                return Err(ControlError::config(field, format!("{value} must be >= 0")));
            }
        }
        let mut vectors: Vec<(&str, &[f64])> = vec![
            ("p_gains", params.p_gains.as_slice()),
            ("d_gains", params.d_gains.as_slice()),
        ];
        for (field, v) in [("fixed_kp", &params.fixed_kp), ("fixed_kd", &params.fixed_kd)] {
            if let Some(v) = v {
                vectors.push((field, v.as_slice()));
            }
        }
        for (field, v) in vectors {
            if let Some((j, g)) = v.iter().enumerate().find(|(_, g)| **g < 0.0) {
                return Err(ControlError::config(
                    field,
                    format!("joint {j} gain {g} must be >= 0"),
                ));
            }
        }
        Ok(())
    }
}

/// Rejects NaN or infinite values in any scale, gain, limit or pose.
pub struct FiniteValuesRule;

impl ConfigRule for FiniteValuesRule {
    fn name(&self) -> &str {
        "finite_values"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        let scalars = [
            ("damping", params.damping),
            ("stiffness", params.stiffness),
            ("action_scale", params.action_scale),
            ("hip_scale_reduction", params.hip_scale_reduction),
            ("lin_vel_scale", params.lin_vel_scale),
            ("ang_vel_scale", params.ang_vel_scale),
            ("dof_pos_scale", params.dof_pos_scale),
            ("dof_vel_scale", params.dof_vel_scale),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ControlError::config(field, format!("{value} is not finite")));
            }
        }
        let mut vectors: Vec<(&str, &[f64])> = vec![
            ("default_dof_pos", params.default_dof_pos.as_slice()),
            ("torque_limits", params.torque_limits.as_slice()),
            ("p_gains", params.p_gains.as_slice()),
            ("d_gains", params.d_gains.as_slice()),
            ("commands_scale", params.commands_scale.as_slice()),
        ];
        for (field, v) in [
            ("fixed_kp", &params.fixed_kp),
            ("fixed_kd", &params.fixed_kd),
            ("torque_scales", &params.torque_scales),
        ] {
            if let Some(v) = v {
                vectors.push((field, v.as_slice()));
            }
        }
        for (field, v) in vectors {
            if let Some(j) = v.iter().position(|x| !x.is_finite()) {
                return Err(ControlError::config(
                    field,
                    format!("entry {j} is not finite"),
                ));
            }
        }
        Ok(())
    }
}

/// Rejects a channel layout whose total length differs from
/// `num_observations`.
pub struct ObservationLayoutRule;

impl ConfigRule for ObservationLayoutRule {
    fn name(&self) -> &str {
        "observation_layout"
    }

    fn check(&self, params: &ModelParams) -> Result<(), ControlError> {
        if params.observations.is_empty() {
            return Err(ControlError::config("observations", "no channels configured"));
        }
        let layout = params.observation_len();
        if layout != params.num_observations {
            return Err(ControlError::config(
                "num_observations",
                format!(
                    "{} does not match the {layout} elements produced by the channel layout",
                    params.num_observations
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_types::ObservationChannel;
    use strider_types::fixtures::quadruped;

    fn field_of(err: ControlError) -> String {
        match err {
            ControlError::Config { field, .. } => field,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn fixture_passes_every_default_rule() {
        assert!(verify_model_params(&quadruped()).is_ok());
    }

    #[test]
    fn zero_and_oversized_dof_counts_rejected() {
        let mut p = quadruped();
        p.num_of_dofs = 0;
        assert_eq!(field_of(DofCountRule.check(&p).unwrap_err()), "num_of_dofs");
        p.num_of_dofs = MAX_DOFS + 1;
        assert_eq!(field_of(DofCountRule.check(&p).unwrap_err()), "num_of_dofs");
    }

    #[test]
    fn short_per_joint_vector_names_the_field() {
        let mut p = quadruped();
        p.torque_limits.pop();
        let err = verify_model_params(&p).unwrap_err();
        assert!(err.to_string().contains("expected 12 entries, got 11"));
        assert_eq!(field_of(err), "torque_limits");
    }

    #[test]
    fn optional_vectors_checked_when_present() {
        let mut p = quadruped();
        p.fixed_kd = Some(vec![1.0; 4]);
        assert_eq!(field_of(verify_model_params(&p).unwrap_err()), "fixed_kd");
        p.fixed_kd = None;
        p.torque_scales = Some(vec![1.0; 13]);
        assert_eq!(field_of(verify_model_params(&p).unwrap_err()), "torque_scales");
    }

    #[test]
    fn commands_scale_must_have_three_entries() {
        let mut p = quadruped();
        p.commands_scale = vec![1.0, 1.0];
        assert_eq!(field_of(verify_model_params(&p).unwrap_err()), "commands_scale");
    }

    #[test]
    fn duplicate_joint_name_rejected() {
        let mut p = quadruped();
        p.joint_names[4] = "FL_hip".to_string();
        let err = verify_model_params(&p).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn hip_index_out_of_range_rejected() {
        let mut p = quadruped();
        p.hip_scale_reduction_indices.push(12);
        assert_eq!(
            field_of(verify_model_params(&p).unwrap_err()),
            "hip_scale_reduction_indices"
        );
    }

    #[test]
    fn duplicate_action_index_rejected() {
        let mut p = quadruped();
        p.action_joint_indices = Some(vec![0, 1, 1]);
        assert_eq!(
            field_of(IndexRule.check(&p).unwrap_err()),
            "action_joint_indices"
        );
    }

    #[test]
    fn non_positive_limits_rejected() {
        let mut p = quadruped();
        p.clip_actions = 0.0;
        assert_eq!(field_of(PositiveLimitsRule.check(&p).unwrap_err()), "clip_actions");

        let mut p = quadruped();
        p.torque_limits[3] = -1.0;
        assert_eq!(field_of(PositiveLimitsRule.check(&p).unwrap_err()), "torque_limits");

        let mut p = quadruped();
        p.dt = f64::NAN;
        assert_eq!(field_of(PositiveLimitsRule.check(&p).unwrap_err()), "dt");

        let mut p = quadruped();
        p.decimation = 0;
        assert_eq!(field_of(PositiveLimitsRule.check(&p).unwrap_err()), "decimation");
    }

    #[test]
    fn negative_gains_rejected() {
        let mut p = quadruped();
        p.damping = -0.5;
        assert_eq!(field_of(verify_model_params(&p).unwrap_err()), "damping");

        let mut p = quadruped();
        p.d_gains[2] = -0.1;
        assert_eq!(field_of(NonNegativeGainsRule.check(&p).unwrap_err()), "d_gains");

        let mut p = quadruped();
        p.fixed_kp = Some(vec![-80.0; 12]);
        assert_eq!(field_of(verify_model_params(&p).unwrap_err()), "fixed_kp");

        let mut p = quadruped();
        p.p_gains = vec![0.0; 12];
        assert!(NonNegativeGainsRule.check(&p).is_ok());
    }

    #[test]
    fn nan_gain_rejected() {
        let mut p = quadruped();
        p.p_gains[7] = f64::NAN;
        let err = FiniteValuesRule.check(&p).unwrap_err();
        assert!(err.to_string().contains("entry 7"));
    }

    #[test]
    fn layout_length_must_match_num_observations() {
        let mut p = quadruped();
        p.observations.push(ObservationChannel::BaseQuat);
        assert_eq!(
            field_of(verify_model_params(&p).unwrap_err()),
            "num_observations"
        );
    }

    #[test]
    fn first_failing_rule_short_circuits() {
        let mut p = quadruped();
        p.num_of_dofs = 0;
        p.clip_obs = -1.0;
        // dof_count runs before positive_limits
        assert_eq!(field_of(verify_model_params(&p).unwrap_err()), "num_of_dofs");
    }

    #[test]
    fn empty_verifier_always_passes() {
        let mut p = quadruped();
        p.num_of_dofs = 0;
        assert!(ConfigVerifier::new().verify(&p).is_ok());
    }
}
