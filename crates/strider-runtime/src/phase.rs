//! [`PhaseMachine`] – operating-mode state machine.
//!
//! ```text
//!          start                 done               1 tick
//!   Idle ───────▶ StandingUp ─────────▶ PolicyWarmup ──────▶ PolicyRunning
//!    ▲                                                            │
//!    │              done                       stop / fault trip  │
//!    └─────────────────────── StandingDown ◀──────────────────────┘
//!
//!   emergency:           any phase                  ──▶ Idle
//!   sustained bad sensing: StandingUp / PolicyWarmup ──▶ Idle
//!                          PolicyRunning              ──▶ StandingDown
//! ```
//!
//! The machine decides *what* each tick should do ([`PhaseAction`]); turning
//! that into an actuator command belongs to the controller.
//!
//! Accepted requests:
//!
//! | Request | Accepted in | Effect |
//! |---|---|---|
//! | `Start` | `Idle` | capture pose, enter `StandingUp` |
//! | `Stop` | `PolicyRunning` | capture pose, enter `StandingDown` |
//! | `Emergency` | every phase but `Idle` | enter `Idle` immediately |
//!
//! Every other request is ignored, so a repeated `Start` during a stand-up
//! (or `Stop` during a stand-down) never restarts the interpolation.
//!
//! Interpolation runs over `max(1, round(duration / dt))` ticks.  Progress
//! after tick `k` is `k / total`, and the emitted pose is
//! `(1 - progress) * from + progress * to`, clamped per joint to the range
//! spanned by `from` and `to`, so the final tick lands on the target exactly
//! and no tick leaves that range.

use strider_types::{ModelParams, Phase, PhaseRequest, StandDownTarget};
use tracing::{debug, info};

/// What the controller should do on this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseAction {
    /// Passive damping.
    Damp,
    /// Hold this interpolated pose with the standing gains.
    Interpolate(Vec<f64>),
    /// Prime observation history and hold the default pose.
    Warmup,
    /// Run the observation → policy → command pipeline.
    RunPolicy,
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    Operator(PhaseRequest),
    /// An interpolation or the warmup tick finished.
    Completed,
    /// Sustained invalid sensing.
    SensingFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
    pub cause: TransitionCause,
}

/// Result of [`PhaseMachine::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseStep {
    /// Action for the current tick, decided by the phase the tick began in.
    pub action: PhaseAction,
    /// Transition taken at the end of the tick, if any.
    pub transition: Option<PhaseChange>,
}

/// Linear blend of two poses.  `alpha` is clamped to `[0, 1]`; both
/// endpoints are reproduced exactly and every joint stays between its two
/// endpoints, rounding included.
pub fn interpolate(from: &[f64], to: &[f64], alpha: f64) -> Vec<f64> {
    let alpha = alpha.clamp(0.0, 1.0);
    from.iter()
        .zip(to)
        .map(|(a, b)| ((1.0 - alpha) * a + alpha * b).clamp(a.min(*b), a.max(*b)))
        .collect()
}

fn interpolation_ticks(duration: f64, dt: f64) -> u64 {
    let ticks = (duration / dt).round();
    if ticks.is_finite() && ticks >= 1.0 {
        ticks as u64
    } else {
        1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PhaseMachine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
    default_pose: Vec<f64>,
    stand_down_target: StandDownTarget,
    stand_up_ticks: u64,
    stand_down_ticks: u64,
    /// Ticks completed in the current interpolation.
    elapsed: u64,
    /// Interpolation start pose.
    from_pose: Vec<f64>,
    /// Interpolation end pose.
    to_pose: Vec<f64>,
    /// Pose captured on the last `Start`.
    rest_pose: Vec<f64>,
}

impl PhaseMachine {
    pub fn new(params: &ModelParams) -> Self {
        Self {
            phase: Phase::Idle,
            default_pose: params.default_dof_pos.clone(),
            stand_down_target: params.stand_down_target,
            stand_up_ticks: interpolation_ticks(params.stand_up_duration, params.dt),
            stand_down_ticks: interpolation_ticks(params.stand_down_duration, params.dt),
            elapsed: 0,
            from_pose: params.default_dof_pos.clone(),
            to_pose: params.default_dof_pos.clone(),
            rest_pose: params.default_dof_pos.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completion of the current interpolation in `[0, 1]`.  Zero outside
    /// `StandingUp` and `StandingDown`.
    pub fn progress(&self) -> f64 {
        match self.phase {
            Phase::StandingUp => self.elapsed as f64 / self.stand_up_ticks as f64,
            Phase::StandingDown => self.elapsed as f64 / self.stand_down_ticks as f64,
            _ => 0.0,
        }
    }

    /// Ticks a full stand-up takes.
    pub fn stand_up_ticks(&self) -> u64 {
        self.stand_up_ticks
    }

    /// Ticks a full stand-down takes.
    pub fn stand_down_ticks(&self) -> u64 {
        self.stand_down_ticks
    }

    fn transition(&mut self, to: Phase, cause: TransitionCause) -> PhaseChange {
        let change = PhaseChange {
            from: self.phase,
            to,
            cause,
        };
        self.phase = to;
        self.elapsed = 0;
        info!(from = %change.from, to = %change.to, ?cause, "phase transition");
        change
    }

    fn begin_stand_down(&mut self, pose: &[f64], cause: TransitionCause) -> PhaseChange {
        self.from_pose = pose.to_vec();
        self.to_pose = match self.stand_down_target {
            StandDownTarget::DefaultPose => self.default_pose.clone(),
            StandDownTarget::RestPose => self.rest_pose.clone(),
        };
        self.transition(Phase::StandingDown, cause)
    }

    /// Apply an operator request.  `pose` is the current joint position,
    /// captured as the interpolation start when the request is accepted.
    /// Returns the transition taken, or `None` when the request does not
    /// apply to the current phase.
    pub fn request(&mut self, request: PhaseRequest, pose: &[f64]) -> Option<PhaseChange> {
        let cause = TransitionCause::Operator(request);
        match (request, self.phase) {
            (PhaseRequest::Start, Phase::Idle) => {
                self.from_pose = pose.to_vec();
                self.rest_pose = pose.to_vec();
                self.to_pose = self.default_pose.clone();
                Some(self.transition(Phase::StandingUp, cause))
            }
            (PhaseRequest::Stop, Phase::PolicyRunning) => Some(self.begin_stand_down(pose, cause)),
            (PhaseRequest::Emergency, phase) if phase != Phase::Idle => {
                Some(self.transition(Phase::Idle, cause))
            }
            (request, phase) => {
                debug!(?request, %phase, "phase request ignored");
                None
            }
        }
    }

    /// React to a tripped sensing-fault monitor.  Policy control stands down
    /// from `pose`; a stand-up or warmup in progress is abandoned to Idle.
    pub fn fault_trip(&mut self, pose: &[f64]) -> Option<PhaseChange> {
        match self.phase {
            Phase::PolicyRunning => Some(self.begin_stand_down(pose, TransitionCause::SensingFault)),
            Phase::StandingUp | Phase::PolicyWarmup => {
                Some(self.transition(Phase::Idle, TransitionCause::SensingFault))
            }
            Phase::Idle | Phase::StandingDown => None,
        }
    }

    /// Advance one control tick.
    pub fn step(&mut self) -> PhaseStep {
        match self.phase {
            Phase::Idle => PhaseStep {
                action: PhaseAction::Damp,
                transition: None,
            },
            Phase::StandingUp | Phase::StandingDown => {
                let (total, next) = if self.phase == Phase::StandingUp {
                    (self.stand_up_ticks, Phase::PolicyWarmup)
                } else {
                    (self.stand_down_ticks, Phase::Idle)
                };
                self.elapsed = (self.elapsed + 1).min(total);
                let alpha = self.elapsed as f64 / total as f64;
                let pose = interpolate(&self.from_pose, &self.to_pose, alpha);
                let transition = (self.elapsed >= total)
                    .then(|| self.transition(next, TransitionCause::Completed));
                PhaseStep {
                    action: PhaseAction::Interpolate(pose),
                    transition,
                }
            }
            Phase::PolicyWarmup => PhaseStep {
                action: PhaseAction::Warmup,
                transition: Some(self.transition(Phase::PolicyRunning, TransitionCause::Completed)),
            },
            Phase::PolicyRunning => PhaseStep {
                action: PhaseAction::RunPolicy,
                transition: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strider_types::fixtures::{quadruped, quadruped_lying_pose};

    fn machine() -> PhaseMachine {
        // 0.1 s at 5 ms: 20 ticks each way
        PhaseMachine::new(&quadruped())
    }

    /// Run `step` until the phase changes; returns the interpolated poses.
    fn run_interpolation(m: &mut PhaseMachine) -> Vec<Vec<f64>> {
        let start = m.phase();
        let mut poses = Vec::new();
        while m.phase() == start {
            if let PhaseAction::Interpolate(p) = m.step().action {
                poses.push(p);
            }
        }
        poses
    }

    #[test]
    fn starts_idle_and_damps() {
        let mut m = machine();
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.step().action, PhaseAction::Damp);
        assert_eq!(m.progress(), 0.0);
    }

    #[test]
    fn interpolate_endpoints_are_exact() {
        let from = [0.3, -1.7, 2.9, 1e-3];
        let to = [0.1, 0.8, -1.5, -0.1];
        assert_eq!(interpolate(&from, &to, 0.0), from.to_vec());
        assert_eq!(interpolate(&from, &to, 1.0), to.to_vec());
        assert_eq!(interpolate(&from, &to, 7.0), to.to_vec());
    }

    #[test]
    fn equal_endpoints_hold_exactly() {
        let pose = [-1.5, 0.8, 0.1];
        for k in 0..=20 {
            assert_eq!(interpolate(&pose, &pose, k as f64 / 20.0), pose.to_vec());
        }
    }

    #[test]
    fn interpolation_tick_count() {
        assert_eq!(interpolation_ticks(0.1, 0.005), 20);
        assert_eq!(interpolation_ticks(0.0, 0.005), 1);
        assert_eq!(interpolation_ticks(f64::NAN, 0.005), 1);
    }

    #[test]
    fn full_cycle() {
        let p = quadruped();
        let lying = quadruped_lying_pose();
        let mut m = machine();

        let t = m.request(PhaseRequest::Start, &lying).unwrap();
        assert_eq!((t.from, t.to), (Phase::Idle, Phase::StandingUp));

        let poses = run_interpolation(&mut m);
        assert_eq!(poses.len(), 20);
        assert_eq!(poses.last().unwrap(), &p.default_dof_pos);
        assert_eq!(m.phase(), Phase::PolicyWarmup);

        let step = m.step();
        assert_eq!(step.action, PhaseAction::Warmup);
        assert_eq!(step.transition.unwrap().to, Phase::PolicyRunning);
        assert_eq!(m.step().action, PhaseAction::RunPolicy);

        let t = m.request(PhaseRequest::Stop, &p.default_dof_pos).unwrap();
        assert_eq!(t.to, Phase::StandingDown);
        let poses = run_interpolation(&mut m);
        assert_eq!(poses.len(), 20);
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn stand_up_poses_stay_between_start_and_default() {
        let p = quadruped();
        let lying = quadruped_lying_pose();
        let mut m = machine();
        m.request(PhaseRequest::Start, &lying);
        for pose in run_interpolation(&mut m) {
            for j in 0..12 {
                let lo = lying[j].min(p.default_dof_pos[j]);
                let hi = lying[j].max(p.default_dof_pos[j]);
                assert!(pose[j] >= lo && pose[j] <= hi);
            }
        }
    }

    #[test]
    fn progress_advances_monotonically_to_one() {
        let mut m = machine();
        m.request(PhaseRequest::Start, &quadruped_lying_pose());
        let mut last = 0.0;
        for _ in 0..19 {
            m.step();
            assert!(m.progress() > last);
            last = m.progress();
        }
        assert!((last - 0.95).abs() < 1e-12);
        m.step();
        assert_eq!(m.phase(), Phase::PolicyWarmup);
    }

    #[test]
    fn repeated_start_during_stand_up_is_ignored() {
        let mut m = machine();
        let lying = quadruped_lying_pose();
        m.request(PhaseRequest::Start, &lying);
        for _ in 0..5 {
            m.step();
        }
        let progress = m.progress();
        assert!(m.request(PhaseRequest::Start, &[9.0; 12]).is_none());
        assert_eq!(m.progress(), progress);
        assert_eq!(m.phase(), Phase::StandingUp);
    }

    #[test]
    fn repeated_stop_during_stand_down_is_ignored() {
        let p = quadruped();
        let mut m = machine();
        m.request(PhaseRequest::Start, &p.default_dof_pos);
        run_interpolation(&mut m);
        m.step();
        m.request(PhaseRequest::Stop, &p.default_dof_pos);
        m.step();
        assert!(m.request(PhaseRequest::Stop, &p.default_dof_pos).is_none());
        assert_eq!(m.phase(), Phase::StandingDown);
    }

    #[test]
    fn emergency_from_every_active_phase() {
        let p = quadruped();
        for steps in [1usize, 20, 21, 25] {
            let mut m = machine();
            m.request(PhaseRequest::Start, &p.default_dof_pos);
            for _ in 0..steps {
                m.step();
            }
            assert_ne!(m.phase(), Phase::Idle);
            let t = m.request(PhaseRequest::Emergency, &p.default_dof_pos).unwrap();
            assert_eq!(t.to, Phase::Idle);
            assert_eq!(m.phase(), Phase::Idle);
        }
        assert!(machine()
            .request(PhaseRequest::Emergency, &p.default_dof_pos)
            .is_none());
    }

    #[test]
    fn stand_down_to_rest_pose() {
        let mut p = quadruped();
        p.stand_down_target = StandDownTarget::RestPose;
        let lying = quadruped_lying_pose();
        let mut m = PhaseMachine::new(&p);
        m.request(PhaseRequest::Start, &lying);
        run_interpolation(&mut m);
        m.step();
        m.request(PhaseRequest::Stop, &p.default_dof_pos);
        let poses = run_interpolation(&mut m);
        assert_eq!(poses.last().unwrap(), &lying);
    }

    #[test]
    fn fault_trip_routes_toward_idle() {
        let p = quadruped();
        let mut m = machine();
        assert!(m.fault_trip(&p.default_dof_pos).is_none());

        m.request(PhaseRequest::Start, &p.default_dof_pos);
        m.step();
        let t = m.fault_trip(&p.default_dof_pos).unwrap();
        assert_eq!(t.to, Phase::Idle);
        assert_eq!(t.cause, TransitionCause::SensingFault);

        m.request(PhaseRequest::Start, &p.default_dof_pos);
        run_interpolation(&mut m);
        m.step();
        let t = m.fault_trip(&p.default_dof_pos).unwrap();
        assert_eq!((t.from, t.to), (Phase::PolicyRunning, Phase::StandingDown));
        assert!(m.fault_trip(&p.default_dof_pos).is_none());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Start,
        Stop,
        Emergency,
        FaultTrip,
        Step,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            2 => Just(Op::Start),
            2 => Just(Op::Stop),
            1 => Just(Op::Emergency),
            1 => Just(Op::FaultTrip),
            30 => Just(Op::Step),
        ]
    }

    /// Cycle edges, plus the emergency and sensing-fault drops to Idle.
    fn edge_allowed(change: &PhaseChange) -> bool {
        let cycle = [
            (Phase::Idle, Phase::StandingUp),
            (Phase::StandingUp, Phase::PolicyWarmup),
            (Phase::PolicyWarmup, Phase::PolicyRunning),
            (Phase::PolicyRunning, Phase::StandingDown),
            (Phase::StandingDown, Phase::Idle),
        ];
        if cycle.contains(&(change.from, change.to)) {
            return true;
        }
        match change.cause {
            TransitionCause::Operator(PhaseRequest::Emergency) => change.to == Phase::Idle,
            TransitionCause::SensingFault => {
                change.to == Phase::Idle
                    && matches!(change.from, Phase::StandingUp | Phase::PolicyWarmup)
            }
            _ => false,
        }
    }

    proptest! {
        #[test]
        fn any_request_sequence_stays_on_allowed_edges(ops in prop::collection::vec(op(), 1..600)) {
            let pose = quadruped().default_dof_pos;
            let mut m = machine();
            for op in ops {
                let change = match op {
                    Op::Start => m.request(PhaseRequest::Start, &pose),
                    Op::Stop => m.request(PhaseRequest::Stop, &pose),
                    Op::Emergency => m.request(PhaseRequest::Emergency, &pose),
                    Op::FaultTrip => m.fault_trip(&pose),
                    Op::Step => m.step().transition,
                };
                if let Some(c) = change {
                    prop_assert!(edge_allowed(&c), "unexpected edge {:?}", c);
                    prop_assert_eq!(m.phase(), c.to);
                }
            }
        }

        #[test]
        fn stand_up_from_any_pose_is_bounded_and_ends_on_default(
            start in prop::collection::vec(-3.0..3.0f64, 12),
        ) {
            let p = quadruped();
            let mut m = machine();
            m.request(PhaseRequest::Start, &start);
            let poses = run_interpolation(&mut m);
            prop_assert_eq!(poses.len(), 20);
            prop_assert_eq!(poses.last().unwrap(), &p.default_dof_pos);
            prop_assert_eq!(interpolate(&start, &p.default_dof_pos, 0.0), start.clone());
            for pose in &poses {
                for j in 0..12 {
                    let lo = start[j].min(p.default_dof_pos[j]);
                    let hi = start[j].max(p.default_dof_pos[j]);
                    prop_assert!(pose[j] >= lo && pose[j] <= hi);
                }
            }
        }
    }
}
