//! `strider-perception` – turns raw sensing into policy observations.
//!
//! # Modules
//!
//! - [`quaternion`] – [`Quaternion`][quaternion::Quaternion] and
//!   [`Vec3`][quaternion::Vec3]: body-frame projections of world-frame
//!   vectors, used for the projected-gravity observation.
//! - [`observation`] – [`ObservationBuilder`][observation::ObservationBuilder]:
//!   assembles the scaled, clipped, fixed-layout observation vector from a
//!   [`RobotState`][strider_types::RobotState] snapshot.

pub mod observation;
pub mod quaternion;

pub use observation::{ObservationBuilder, ObservationError, Observations};
