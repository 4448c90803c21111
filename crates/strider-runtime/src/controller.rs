//! [`Controller`] – one control tick, end to end.
//!
//! Each call to [`Controller::tick`]:
//!
//! 1. **Sense** – read a [`RobotState`] and check it with the
//!    [`StateVerifier`].  A failed read or a rejected state is a sensing
//!    fault; consecutive faults are counted by a [`FaultMonitor`] and, once it
//!    trips, push the phase machine toward Idle.
//! 2. **Operator** – take the latched [`PhaseRequest`], if any, and offer it
//!    to the [`PhaseMachine`].  `Start` is dropped on a tick without a valid
//!    state.
//! 3. **Decide** – advance the phase machine one tick.
//! 4. **Command** – build the actuator command for the tick's
//!    [`PhaseAction`].  While the policy runs, every `decimation`-th tick goes
//!    through observation → inference → synthesis; ticks in between reapply
//!    the last actions.  Sensing or inference faults fall back to the holding
//!    command.
//! 5. **Gate** – the [`CommandGate`] has the last word.  A rejected command is
//!    replaced by the holding command while the policy runs and by the
//!    damping command in every other phase.
//! 6. **Act** – write the command.  Write failures are hardware faults and
//!    are returned to the caller.
//! 7. **Record** – policy-running ticks emit one [`TelemetryRecord`].
//!
//! The controller never blocks: operator input is latched, telemetry is
//! fire-and-forget.

use strider_hal::RobotInterface;
use strider_kernel::{CommandGate, FaultMonitor, FaultStatus, StateVerifier, verify_model_params};
use strider_middleware::{OperatorReceiver, TelemetrySink};
use strider_perception::ObservationBuilder;
use strider_types::{
    ControlError, ModelParams, Phase, PhaseRequest, RobotCommand, RobotState, TelemetryRecord,
};
use tracing::{debug, error, info, trace, warn};

use crate::command::CommandSynthesizer;
use crate::phase::{PhaseAction, PhaseChange, PhaseMachine};
use crate::policy::{Policy, PolicyInvoker};

/// Outcome of one [`Controller::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Zero-based tick counter.
    pub tick: u64,
    /// Phase the tick's command was built for.
    pub phase: Phase,
    /// Last transition taken during the tick.
    pub transition: Option<PhaseChange>,
    pub sensing_ok: bool,
    /// `true` when the policy was invoked this tick.
    pub policy_step: bool,
    /// `true` when the command gate replaced the command.
    pub command_rejected: bool,
}

/// Running fault and activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub ticks: u64,
    pub policy_steps: u64,
    pub sensing_faults: u64,
    pub inference_faults: u64,
    pub rejected_commands: u64,
    pub fault_trips: u64,
}

pub struct Controller {
    params: ModelParams,
    machine: PhaseMachine,
    observations: ObservationBuilder,
    invoker: PolicyInvoker,
    synth: CommandSynthesizer,
    state_verifier: StateVerifier,
    faults: FaultMonitor,
    gate: CommandGate,
    operator: OperatorReceiver,
    telemetry: Box<dyn TelemetrySink>,
    /// Ticks since the policy started running.
    policy_ticks: u64,
    /// Last state that passed verification.
    last_good: Option<RobotState>,
    stats: ControllerStats,
}

impl Controller {
    /// Verify `params` and assemble a controller in the Idle phase.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when `params` is inconsistent or the
    /// observation layout cannot be built.
    pub fn new(
        params: ModelParams,
        policy: Box<dyn Policy>,
        operator: OperatorReceiver,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Result<Self, ControlError> {
        verify_model_params(&params)?;
        let observations = ObservationBuilder::new(&params)?;
        let invoker = PolicyInvoker::new(policy, params.num_actions(), params.clip_actions);
        info!(
            robot = %params.model_name,
            dofs = params.num_of_dofs,
            observations = observations.len(),
            policy = invoker.policy_id(),
            "controller ready"
        );
        Ok(Self {
            machine: PhaseMachine::new(&params),
            synth: CommandSynthesizer::new(&params),
            state_verifier: StateVerifier::new(params.num_of_dofs),
            faults: FaultMonitor::new(params.max_sensing_faults),
            gate: CommandGate::new(params.torque_limits.clone()),
            observations,
            invoker,
            operator,
            telemetry,
            policy_ticks: 0,
            last_good: None,
            stats: ControllerStats::default(),
            params,
        })
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Stand-up / stand-down completion in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.machine.progress()
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Telemetry records the sink has discarded so far.
    pub fn telemetry_dropped(&self) -> u64 {
        self.telemetry.dropped()
    }

    /// Best known joint positions: the current state when valid, else the
    /// last valid state, else the default pose.
    fn current_pose(&self, state: Option<&RobotState>) -> Vec<f64> {
        state
            .or(self.last_good.as_ref())
            .map(|s| s.q.clone())
            .unwrap_or_else(|| self.params.default_dof_pos.clone())
    }

    fn sense(&mut self, robot: &mut dyn RobotInterface) -> Option<RobotState> {
        let state = match robot.read_state() {
            Ok(state) => state,
            Err(e) => {
                warn!(robot = robot.id(), error = %e, "state read failed");
                return None;
            }
        };
        match self.state_verifier.verify(&state) {
            Ok(()) => Some(state),
            Err(fault) => {
                warn!(robot = robot.id(), %fault, "invalid robot state");
                None
            }
        }
    }

    /// Run one control tick against `robot`.
    ///
    /// # Errors
    ///
    /// Only hardware faults from [`RobotInterface::write_command`] are
    /// returned; sensing and inference faults are handled inside the tick.
    pub fn tick(&mut self, robot: &mut dyn RobotInterface) -> Result<TickReport, ControlError> {
        let tick = self.stats.ticks;
        self.stats.ticks += 1;
        let mut transition = None;

        // ── Sense ────────────────────────────────────────────────────────────
        let state = self.sense(robot);
        match &state {
            Some(s) => {
                self.faults.record_ok();
                self.last_good = Some(s.clone());
            }
            None => {
                self.stats.sensing_faults += 1;
                if self.faults.record_fault() == FaultStatus::Tripped {
                    self.faults.reset();
                    self.stats.fault_trips += 1;
                    let pose = self.current_pose(None);
                    if let Some(change) = self.machine.fault_trip(&pose) {
                        error!(from = %change.from, to = %change.to, "sustained sensing fault");
                        transition = Some(change);
                    }
                }
            }
        }

        // ── Operator ─────────────────────────────────────────────────────────
        if let Some(request) = self.operator.take_request() {
            if request == PhaseRequest::Start && state.is_none() {
                // the stand-up start pose must be measured
                debug!(?request, "start ignored while sensing is invalid");
            } else {
                let pose = self.current_pose(state.as_ref());
                if let Some(change) = self.machine.request(request, &pose) {
                    transition = Some(change);
                }
            }
        }

        // ── Decide / command ─────────────────────────────────────────────────
        let phase = self.machine.phase();
        let step = self.machine.step();
        if step.transition.is_some() {
            transition = step.transition;
        }

        let mut policy_step = false;
        let command = match step.action {
            PhaseAction::Damp => self.synth.idle_command(&self.current_pose(state.as_ref())),
            PhaseAction::Interpolate(pose) => self.synth.standing_command(&pose),
            PhaseAction::Warmup => {
                self.warmup(state.as_ref());
                self.synth.standing_command(&self.params.default_dof_pos)
            }
            PhaseAction::RunPolicy => match &state {
                Some(s) => {
                    let (command, stepped) = self.run_policy(s);
                    policy_step = stepped;
                    command
                }
                None => self.synth.holding().clone(),
            },
        };

        // ── Gate / act ───────────────────────────────────────────────────────
        let (command, command_rejected) = match self.gate.admit(&command) {
            Ok(()) => (command, false),
            Err(reason) => {
                self.stats.rejected_commands += 1;
                if phase == Phase::PolicyRunning {
                    error!(%reason, %phase, "command rejected; sending holding command");
                    (self.synth.holding().clone(), true)
                } else {
                    error!(%reason, %phase, "command rejected; damping");
                    (self.synth.idle_command(&self.current_pose(state.as_ref())), true)
                }
            }
        };
        robot.write_command(&command)?;

        // ── Record ───────────────────────────────────────────────────────────
        if phase == Phase::PolicyRunning {
            if let Some(s) = &state {
                self.record(tick, &command, s);
            }
        }

        trace!(tick, %phase, policy_step, "tick complete");
        Ok(TickReport {
            tick,
            phase,
            transition,
            sensing_ok: state.is_some(),
            policy_step,
            command_rejected,
        })
    }

    /// Prime observation history before the first inference.
    fn warmup(&mut self, state: Option<&RobotState>) {
        self.observations.reset();
        self.invoker.reset();
        self.synth.reset();
        self.policy_ticks = 0;
        if let Some(s) = state {
            let intent = self.operator.intent();
            if let Err(e) = self
                .observations
                .build(s, self.invoker.last_actions(), &intent)
            {
                warn!(error = %e, "observation warmup failed");
            }
        }
        debug!(policy = self.invoker.policy_id(), "policy warmup");
    }

    /// Build the command for a policy-running tick.  Returns the command and
    /// whether the policy was invoked.
    fn run_policy(&mut self, state: &RobotState) -> (RobotCommand, bool) {
        let decimation = u64::from(self.params.decimation.max(1));
        let policy_tick = self.policy_ticks % decimation == 0;
        self.policy_ticks += 1;
        if !policy_tick {
            return (self.synth.resynthesize(state), false);
        }

        let intent = self.operator.intent();
        let observation = match self
            .observations
            .build(state, self.invoker.last_actions(), &intent)
        {
            Ok(obs) => obs,
            Err(e) => {
                warn!(error = %e, "observation failed; sending holding command");
                self.stats.sensing_faults += 1;
                return (self.synth.holding().clone(), false);
            }
        };
        self.stats.policy_steps += 1;
        match self.invoker.invoke(observation) {
            Ok(actions) => (self.synth.synthesize(actions, state), true),
            Err(fault) => {
                self.stats.inference_faults += 1;
                warn!(%fault, "inference failed; sending holding command");
                (self.synth.holding().clone(), true)
            }
        }
    }

    fn record(&self, tick: u64, command: &RobotCommand, state: &RobotState) {
        self.telemetry.record(TelemetryRecord {
            tick,
            time: tick as f64 * self.params.dt,
            tau: self.synth.effective_torques(command, state),
            tau_est: state.tau_est.clone(),
            q: state.q.clone(),
            q_target: command.q.clone(),
            dq: state.dq.clone(),
        });
    }

    /// Drop to Idle and send one damping command.  Used on shutdown.
    pub fn halt(&mut self, robot: &mut dyn RobotInterface) -> Result<(), ControlError> {
        let state = self.sense(robot);
        let pose = self.current_pose(state.as_ref());
        if let Some(change) = self.machine.request(PhaseRequest::Emergency, &pose) {
            info!(from = %change.from, "halting");
        }
        robot.write_command(&self.synth.idle_command(&pose))
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("robot", &self.params.model_name)
            .field("phase", &self.machine.phase())
            .field("policy", &self.invoker.policy_id())
            .field("stats", &self.stats)
            .finish()
    }
}
