//! `strider-middleware` – the threads around the control loop.
//!
//! Moves data between the control thread and its slower neighbours without
//! ever letting them block a tick.
//!
//! # Modules
//!
//! - [`operator`] – latched operator input: a last-write-wins
//!   [`OperatorIntent`][strider_types::OperatorIntent] and a single-slot
//!   [`PhaseRequest`][strider_types::PhaseRequest].
//! - [`keymap`] – keyboard keys to operator actions.
//! - [`telemetry_sink`] – fire-and-forget telemetry: bounded `try_send`
//!   channels and a background CSV writer.

pub mod keymap;
pub mod operator;
pub mod telemetry_sink;

pub use keymap::{KeyAction, key_action, line_actions};
pub use operator::{OperatorHandle, OperatorReceiver, operator_channel};
pub use telemetry_sink::{ChannelSink, CsvTelemetryWriter, NullSink, TelemetrySink, channel_sink};
