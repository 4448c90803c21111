//! Runtime options (`~/.strider/config.toml`) and the robot table file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strider_kernel::verify_model_params;
use strider_types::{ControlError, ModelParams};

/// Persisted runtime options stored in `~/.strider/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name of the `[robots.<name>]` table to run.
    #[serde(default = "default_robot")]
    pub robot: String,

    /// Robot table file.  Relative policy paths resolve against its
    /// directory.
    #[serde(default = "default_robots_file")]
    pub robots_file: PathBuf,

    /// Directory for telemetry CSV files.
    #[serde(default = "default_telemetry_dir")]
    pub telemetry_dir: PathBuf,

    /// Write telemetry CSV files at all.
    #[serde(default = "default_telemetry")]
    pub telemetry: bool,

    /// Control loop rate override.  Unset runs one tick per `dt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_rate_hz: Option<f64>,
}

fn default_robot() -> String {
    "quadruped".to_string()
}
fn default_robots_file() -> PathBuf {
    PathBuf::from("config").join("robots.toml")
}
fn default_telemetry_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_telemetry() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            robot: default_robot(),
            robots_file: default_robots_file(),
            telemetry_dir: default_telemetry_dir(),
            telemetry: default_telemetry(),
            loop_rate_hz: None,
        }
    }
}

impl RuntimeConfig {
    /// Control period from `loop_rate_hz`, if set and positive.
    pub fn loop_period(&self) -> Option<Duration> {
        self.loop_rate_hz
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .and_then(|hz| Duration::try_from_secs_f64(1.0 / hz).ok())
    }
}

/// Return the path to `~/.strider/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".strider").join("config.toml")
}

/// Load the runtime options.  A missing file yields the defaults.  `STRIDER_*`
/// overrides are applied in both cases.
pub fn load() -> Result<RuntimeConfig, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the options from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<RuntimeConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: RuntimeConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `STRIDER_*` environment variable overrides to `cfg`.
///
/// | Variable | Field |
/// |---|---|
/// | `STRIDER_ROBOT` | `robot` |
/// | `STRIDER_CONFIG` | `robots_file` |
/// | `STRIDER_TELEMETRY_DIR` | `telemetry_dir` |
/// | `STRIDER_LOOP_RATE_HZ` | `loop_rate_hz` |
pub fn apply_env_overrides(cfg: &mut RuntimeConfig) {
    if let Ok(v) = std::env::var("STRIDER_ROBOT") {
        cfg.robot = v;
    }
    if let Ok(v) = std::env::var("STRIDER_CONFIG") {
        cfg.robots_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("STRIDER_TELEMETRY_DIR") {
        cfg.telemetry_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("STRIDER_LOOP_RATE_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.loop_rate_hz = Some(hz);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Robot tables
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RobotsFile {
    #[serde(default)]
    robots: BTreeMap<String, ModelParams>,
}

/// Parse a robot table file and return the verified parameters of `name`.
///
/// # Errors
///
/// [`ControlError::Config`] when the file does not parse, has no table for
/// `name`, or the table fails verification.
pub fn parse_robot(raw: &str, name: &str) -> Result<ModelParams, ControlError> {
    let file: RobotsFile =
        toml::from_str(raw).map_err(|e| ControlError::config("robots", e.to_string()))?;
    let params = file.robots.get(name).cloned().ok_or_else(|| {
        let known: Vec<&str> = file.robots.keys().map(String::as_str).collect();
        ControlError::config(
            "robots",
            format!("no robot named '{name}' (available: {})", known.join(", ")),
        )
    })?;
    verify_model_params(&params)?;
    Ok(params)
}

/// Read `path` and return the verified parameters of robot `name`.
pub fn load_robot(path: &Path, name: &str) -> Result<ModelParams, ControlError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ControlError::config("robots", format!("cannot read {}: {e}", path.display()))
    })?;
    parse_robot(&raw, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_middleware::{NullSink, operator_channel};
    use strider_runtime::{Controller, build_policy};
    use strider_types::Phase;

    const ROBOTS: &str = r#"
        [robots.mini]
        model_name = "mini.json"
        num_observations = 22
        damping = 0.5
        stiffness = 20.0
        action_scale = 0.25
        num_of_dofs = 2
        lin_vel_scale = 2.0
        ang_vel_scale = 0.25
        dof_pos_scale = 1.0
        dof_vel_scale = 0.05
        clip_obs = 100.0
        clip_actions = 100.0
        torque_limits = [10.0, 10.0]
        p_gains = [20.0, 20.0]
        d_gains = [0.5, 0.5]
        commands_scale = [2.0, 2.0, 0.25]
        default_dof_pos = [0.1, -0.1]
        joint_names = ["hip", "knee"]
        observations = ["lin_vel", "ang_vel", "gravity_vec", "commands", "base_quat", "dof_pos", "dof_vel", "actions"]
    "#;

    fn save_to(cfg: &RuntimeConfig, path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, toml::to_string_pretty(cfg).unwrap()).unwrap();
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&RuntimeConfig::default(), &path);

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, RuntimeConfig::default());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "robot = \"go1\"\nloop_rate_hz = 500.0\n").unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.robot, "go1");
        assert_eq!(cfg.telemetry_dir, PathBuf::from("logs"));
        assert_eq!(cfg.loop_period(), Some(Duration::from_millis(2)));
    }

    #[test]
    fn config_path_points_to_strider_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.strider/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn bad_loop_rate_is_ignored() {
        let mut cfg = RuntimeConfig::default();
        assert_eq!(cfg.loop_period(), None);
        cfg.loop_rate_hz = Some(0.0);
        assert_eq!(cfg.loop_period(), None);
        cfg.loop_rate_hz = Some(f64::NAN);
        assert_eq!(cfg.loop_period(), None);
    }

    #[test]
    fn apply_env_overrides_changes_robot_and_paths() {
        // SAFETY: only this test touches these variables.
        unsafe {
            std::env::set_var("STRIDER_ROBOT", "go2");
            std::env::set_var("STRIDER_TELEMETRY_DIR", "/var/log/strider");
            std::env::set_var("STRIDER_LOOP_RATE_HZ", "not-a-rate");
        }
        let mut cfg = RuntimeConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot, "go2");
        assert_eq!(cfg.telemetry_dir, PathBuf::from("/var/log/strider"));
        assert_eq!(cfg.loop_rate_hz, None);
        unsafe {
            std::env::remove_var("STRIDER_ROBOT");
            std::env::remove_var("STRIDER_TELEMETRY_DIR");
            std::env::remove_var("STRIDER_LOOP_RATE_HZ");
        }
    }

    #[test]
    fn parse_robot_selects_table_by_name() {
        let p = parse_robot(ROBOTS, "mini").unwrap();
        assert_eq!(p.num_of_dofs, 2);
        assert_eq!(p.joint_names, vec!["hip", "knee"]);
    }

    #[test]
    fn unknown_robot_lists_available_tables() {
        let err = parse_robot(ROBOTS, "atlas").unwrap_err();
        assert!(err.to_string().contains("mini"));
    }

    #[test]
    fn inconsistent_robot_is_rejected() {
        let broken = ROBOTS.replace("d_gains = [0.5, 0.5]", "d_gains = [0.5]");
        let err = parse_robot(&broken, "mini").unwrap_err();
        assert!(matches!(err, ControlError::Config { .. }));
    }

    #[test]
    fn verified_robot_builds_a_controller() {
        let params = parse_robot(ROBOTS, "mini").unwrap();
        let policy = build_policy(&params, Path::new(".")).unwrap();
        let (_operator, rx) = operator_channel();
        let controller = Controller::new(params, policy, rx, Box::new(NullSink)).unwrap();
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[test]
    fn negative_gain_robot_stops_before_a_controller_exists() {
        let broken = ROBOTS.replace("damping = 0.5", "damping = -0.5");
        let err = parse_robot(&broken, "mini").unwrap_err();
        assert!(matches!(err, ControlError::Config { ref field, .. } if field == "damping"));

        let broken = ROBOTS.replace("p_gains = [20.0, 20.0]", "p_gains = [20.0, -20.0]");
        let err = parse_robot(&broken, "mini").unwrap_err();
        assert!(matches!(err, ControlError::Config { ref field, .. } if field == "p_gains"));
    }

    #[test]
    fn shipped_robot_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/robots.toml");
        let p = load_robot(&path, "quadruped").unwrap();
        assert_eq!(p.num_of_dofs, 12);
        let torque = load_robot(&path, "quadruped_torque").unwrap();
        assert_eq!(torque.observation_len(), 45);
    }
}
