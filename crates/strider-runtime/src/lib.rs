//! `strider-runtime` – the control core.
//!
//! Everything that runs on the control thread lives here.
//!
//! # Modules
//!
//! - [`controller`] – [`Controller`]: one tick of
//!   sense → operator → phase → command → gate → act → record.
//! - [`phase`] – [`PhaseMachine`]: the Idle / StandingUp / PolicyWarmup /
//!   PolicyRunning / StandingDown cycle plus the emergency edge.
//! - [`command`] – [`CommandSynthesizer`]: policy actions and phase poses to
//!   complete [`RobotCommand`][strider_types::RobotCommand]s in position,
//!   torque or on-host PD-torque mode.
//! - [`policy`] – the [`Policy`] backend trait, the in-tree
//!   [`ZeroPolicy`] and [`LinearPolicy`], and the [`PolicyInvoker`] that
//!   checks every action vector before it is used.
//! - [`control_loop`] – [`ControlLoop`]: the fixed-rate `strider-control`
//!   thread.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod command;
pub mod control_loop;
pub mod controller;
pub mod phase;
pub mod policy;
pub mod telemetry;

pub use command::CommandSynthesizer;
pub use control_loop::{ControlLoop, LoopConfig, LoopSummary};
pub use controller::{Controller, ControllerStats, TickReport};
pub use phase::{PhaseAction, PhaseChange, PhaseMachine, PhaseStep, TransitionCause, interpolate};
pub use policy::{
    InferenceFault, LinearPolicy, LinearWeights, Policy, PolicyInvoker, ZeroPolicy, build_policy,
};
pub use telemetry::{TracerProviderGuard, init_tracing};
