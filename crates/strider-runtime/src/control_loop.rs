//! [`ControlLoop`] – the dedicated fixed-rate control thread.
//!
//! The loop owns the [`Controller`] and the robot interface.  It ticks once
//! per period, sleeping until the next deadline; an overrun starts the next
//! tick immediately and, when a whole period has been lost, re-anchors the
//! schedule instead of bursting to catch up.
//!
//! The loop stops when the shutdown flag is raised, after an optional tick
//! budget, or after too many consecutive hardware faults.  In every case it
//! drops the robot to Idle damping with [`Controller::halt`] before the
//! thread exits.
//!
//! # Example
//!
//! ```rust,no_run
//! use strider_hal::SimRobot;
//! use strider_middleware::{NullSink, operator_channel};
//! use strider_runtime::control_loop::{ControlLoop, LoopConfig};
//! use strider_runtime::{Controller, ZeroPolicy};
//! # fn params() -> strider_types::ModelParams { unimplemented!() }
//!
//! let params = params();
//! let (operator, rx) = operator_channel();
//! let config = LoopConfig::from_params(&params);
//! let robot = SimRobot::builder(params.num_of_dofs).build();
//! let controller = Controller::new(
//!     params,
//!     Box::new(ZeroPolicy::new(12)),
//!     rx,
//!     Box::new(NullSink),
//! )?;
//!
//! let control = ControlLoop::spawn(controller, robot, config)?;
//! operator.request(strider_types::PhaseRequest::Start);
//! // ...
//! control.stop();
//! let summary = control.join()?;
//! # Ok::<(), strider_types::ControlError>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strider_hal::RobotInterface;
use strider_types::{ControlError, ModelParams, Phase};
use tracing::{debug, error, info, warn};

use crate::controller::{Controller, ControllerStats};

/// Consecutive failed command writes tolerated before the loop gives up.
pub const DEFAULT_MAX_HARDWARE_FAULTS: u32 = 50;

const FALLBACK_PERIOD: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Control period.
    pub period: Duration,
    pub max_hardware_faults: u32,
    /// Stop after this many ticks.  `None` runs until shut down.
    pub max_ticks: Option<u64>,
}

impl LoopConfig {
    /// One tick per `params.dt`.
    pub fn from_params(params: &ModelParams) -> Self {
        Self {
            period: Duration::try_from_secs_f64(params.dt).unwrap_or(FALLBACK_PERIOD),
            max_hardware_faults: DEFAULT_MAX_HARDWARE_FAULTS,
            max_ticks: None,
        }
    }

    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }
}

/// What the loop did before it exited.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub stats: ControllerStats,
    /// Phase at exit, before the final halt.
    pub final_phase: Phase,
    /// Ticks that finished after their deadline.
    pub overruns: u64,
    pub telemetry_dropped: u64,
}

/// Handle to a running control thread.
#[derive(Debug)]
pub struct ControlLoop {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<Result<LoopSummary, ControlError>>,
}

impl ControlLoop {
    /// Start the control thread (`strider-control`).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Hardware`] when the thread cannot be spawned.
    pub fn spawn<R>(controller: Controller, robot: R, config: LoopConfig) -> Result<Self, ControlError>
    where
        R: RobotInterface + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("strider-control".to_string())
            .spawn(move || run(controller, robot, config, &flag))
            .map_err(|e| ControlError::Hardware {
                component: "control-thread".to_string(),
                details: e.to_string(),
            })?;
        Ok(Self { shutdown, handle })
    }

    /// Shared shutdown flag, e.g. for a signal handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Ask the loop to halt the robot and exit.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the control thread to exit.
    ///
    /// # Errors
    ///
    /// Returns the hardware fault that ended the loop, or
    /// [`ControlError::Hardware`] if the thread panicked.
    pub fn join(self) -> Result<LoopSummary, ControlError> {
        self.handle.join().map_err(|_| ControlError::Hardware {
            component: "control-thread".to_string(),
            details: "control thread panicked".to_string(),
        })?
    }
}

/// Body of the control thread.
pub fn run<R: RobotInterface>(
    mut controller: Controller,
    mut robot: R,
    config: LoopConfig,
    shutdown: &AtomicBool,
) -> Result<LoopSummary, ControlError> {
    info!(
        robot = robot.id(),
        period_us = config.period.as_micros() as u64,
        "control loop started"
    );
    let mut deadline = Instant::now();
    let mut hardware_faults = 0u32;
    let mut overruns = 0u64;
    let mut ticks = 0u64;

    while !shutdown.load(Ordering::Acquire) {
        if config.max_ticks.is_some_and(|max| ticks >= max) {
            debug!(ticks, "tick budget exhausted");
            break;
        }
        ticks += 1;

        match controller.tick(&mut robot) {
            Ok(_) => hardware_faults = 0,
            Err(e) => {
                hardware_faults += 1;
                warn!(error = %e, consecutive = hardware_faults, "command write failed");
                if hardware_faults >= config.max_hardware_faults.max(1) {
                    error!(error = %e, "too many hardware faults; stopping control loop");
                    if let Err(halt) = controller.halt(&mut robot) {
                        error!(error = %halt, "halt command failed");
                    }
                    return Err(e);
                }
            }
        }

        deadline += config.period;
        let now = Instant::now();
        if let Some(wait) = deadline.checked_duration_since(now) {
            thread::sleep(wait);
        } else {
            overruns += 1;
            let late = now.duration_since(deadline);
            if late > config.period {
                debug!(late_us = late.as_micros() as u64, "tick overrun; re-anchoring schedule");
                deadline = now;
            }
        }
    }

    let summary = LoopSummary {
        stats: controller.stats(),
        final_phase: controller.phase(),
        overruns,
        telemetry_dropped: controller.telemetry_dropped(),
    };
    if let Err(e) = controller.halt(&mut robot) {
        warn!(error = %e, "halt command failed");
    }
    info!(
        ticks = summary.stats.ticks,
        policy_steps = summary.stats.policy_steps,
        overruns,
        "control loop stopped"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    use strider_hal::SimRobot;
    use strider_middleware::{NullSink, operator_channel};
    use strider_types::fixtures::quadruped;
    use strider_types::{PhaseRequest, RobotCommand, RobotState};

    use crate::policy::ZeroPolicy;

    fn fast_config(params: &ModelParams) -> LoopConfig {
        LoopConfig {
            period: Duration::from_micros(100),
            ..LoopConfig::from_params(params)
        }
    }

    #[test]
    fn config_period_follows_dt() {
        let p = quadruped();
        let c = LoopConfig::from_params(&p);
        assert_eq!(c.period, Duration::from_millis(5));
        assert_eq!(c.max_hardware_faults, DEFAULT_MAX_HARDWARE_FAULTS);

        let mut bad = quadruped();
        bad.dt = -1.0;
        assert_eq!(LoopConfig::from_params(&bad).period, FALLBACK_PERIOD);
    }

    #[test]
    fn tick_budget_runs_start_to_policy() {
        let p = quadruped();
        let (operator, rx) = operator_channel();
        let robot = SimRobot::builder(12)
            .with_initial_pose(p.default_dof_pos.clone())
            .build();
        let controller =
            Controller::new(p.clone(), Box::new(ZeroPolicy::new(12)), rx, Box::new(NullSink)).unwrap();
        operator.request(PhaseRequest::Start);

        let control = ControlLoop::spawn(controller, robot, fast_config(&p).with_max_ticks(60)).unwrap();
        let summary = control.join().unwrap();
        // 20 stand-up ticks, 1 warmup, 39 running ticks at decimation 4
        assert_eq!(summary.stats.ticks, 60);
        assert_eq!(summary.final_phase, Phase::PolicyRunning);
        assert_eq!(summary.stats.policy_steps, 10);
    }

    #[test]
    fn stop_flag_ends_the_loop() {
        let p = quadruped();
        let (_operator, rx) = operator_channel();
        let robot = SimRobot::builder(12).build();
        let controller =
            Controller::new(p.clone(), Box::new(ZeroPolicy::new(12)), rx, Box::new(NullSink)).unwrap();
        let control = ControlLoop::spawn(controller, robot, fast_config(&p)).unwrap();
        thread::sleep(Duration::from_millis(20));
        control.shutdown_flag().store(true, Ordering::Release);
        let summary = control.join().unwrap();
        assert_eq!(summary.final_phase, Phase::Idle);
        assert!(summary.stats.ticks > 0);
    }

    struct BrokenBus {
        writes: u32,
    }

    impl RobotInterface for BrokenBus {
        fn id(&self) -> &str {
            "broken"
        }

        fn read_state(&mut self) -> Result<RobotState, ControlError> {
            Ok(RobotState::new(12))
        }

        fn write_command(&mut self, _command: &RobotCommand) -> Result<(), ControlError> {
            self.writes += 1;
            Err(ControlError::Hardware {
                component: "bus".to_string(),
                details: "timeout".to_string(),
            })
        }
    }

    #[test]
    fn persistent_hardware_faults_abort() {
        let p = quadruped();
        let (_operator, rx) = operator_channel();
        let controller =
            Controller::new(p.clone(), Box::new(ZeroPolicy::new(12)), rx, Box::new(NullSink)).unwrap();
        let config = LoopConfig {
            max_hardware_faults: 3,
            ..fast_config(&p)
        };
        let shutdown = AtomicBool::new(false);
        let err = run(controller, BrokenBus { writes: 0 }, config, &shutdown).unwrap_err();
        assert!(matches!(err, ControlError::Hardware { .. }));
    }
}
