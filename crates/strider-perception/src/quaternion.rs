//! Quaternion helpers for body-frame projections.
//!
//! Quaternions use the `(w, x, y, z)` convention throughout, matching
//! [`RobotState::quaternion`][strider_types::RobotState::quaternion].
//!
//! # Example
//!
//! ```rust
//! use strider_perception::quaternion::{Quaternion, Vec3};
//!
//! // Rolled 90° about +X: world "down" lies along body -Y.
//! let half = std::f64::consts::FRAC_PI_4;
//! let q = Quaternion::new(half.cos(), half.sin(), 0.0, 0.0);
//! let g = q.rotate_inverse(Vec3::new(0.0, 0.0, -1.0));
//! assert!((g.norm() - 1.0).abs() < 1e-12);
//! assert!((g.y - (-1.0)).abs() < 1e-12);
//! ```

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// Norms below this are treated as a degenerate orientation reading.
const MIN_NORM: f64 = 1e-6;

/// A rotation quaternion `(w, x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  Call [`Quaternion::normalized`] before rotating
    /// with values read from hardware.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn from_array(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit-length copy, or `None` when the quaternion has a non-finite
    /// component or is too close to zero to carry an orientation.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if !n.is_finite() || n < MIN_NORM {
            return None;
        }
        Some(Self::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    fn vector(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Rotate `v` by this unit quaternion:
    /// `v' = v + 2w(u × v) + 2(u × (u × v))` with `u = (x, y, z)`.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = self.vector();
        let uv = u.cross(v);
        let uuv = u.cross(uv);
        v.add(uv.scale(2.0 * self.w)).add(uuv.scale(2.0))
    }

    /// Rotate `v` by the inverse of this unit quaternion, i.e. express a
    /// world-frame vector in the body frame.
    pub fn rotate_inverse(self, v: Vec3) -> Vec3 {
        self.conjugate().rotate(v)
    }
}

/// Array form of [`Quaternion::rotate_inverse`] for `(w, x, y, z)` input.
pub fn quat_rotate_inverse(q: [f64; 4], v: [f64; 3]) -> [f64; 3] {
    Quaternion::from_array(q)
        .rotate_inverse(Vec3::from_array(v))
        .to_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9 && (a.z - b.z).abs() < 1e-9
    }

    fn axis_angle(axis: Vec3, angle: f64) -> Quaternion {
        let n = axis.norm();
        let s = (angle / 2.0).sin() / n;
        Quaternion::new((angle / 2.0).cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    #[test]
    fn identity_rotation_is_noop() {
        let v = Vec3::new(0.3, -1.2, 4.0);
        assert!(approx(Quaternion::identity().rotate_inverse(v), v));
        assert_eq!(quat_rotate_inverse([1.0, 0.0, 0.0, 0.0], [0.0, 0.0, -1.0]), [0.0, 0.0, -1.0]);
    }

    proptest! {
        #[test]
        fn any_unit_quaternion_preserves_gravity_norm(
            w in -1.0..1.0f64,
            x in -1.0..1.0f64,
            y in -1.0..1.0f64,
            z in -1.0..1.0f64,
        ) {
            let raw = Quaternion::new(w, x, y, z);
            prop_assume!(raw.norm() > 0.1);
            let q = raw.normalized().unwrap();
            let g = q.rotate_inverse(Vec3::new(0.0, 0.0, -1.0));
            prop_assert!((g.norm() - 1.0).abs() < 1e-12, "norm drifted for {:?}", q);
        }

        #[test]
        fn identity_leaves_any_vector_unchanged(v in prop::array::uniform3(-1e3..1e3f64)) {
            let v = Vec3::from_array(v);
            prop_assert!(approx(Quaternion::identity().rotate_inverse(v), v));
        }
    }

    #[test]
    fn rotate_then_rotate_inverse_round_trips() {
        let q = axis_angle(Vec3::new(0.2, 0.9, -0.4), 1.1);
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!(approx(q.rotate_inverse(q.rotate(v)), v));
    }

    #[test]
    fn pitch_forward_moves_gravity_onto_x() {
        // Pitched 90° about +Y: world "down" lies along body +X.
        let q = axis_angle(Vec3::new(0.0, 1.0, 0.0), FRAC_PI_2);
        let g = q.rotate_inverse(Vec3::new(0.0, 0.0, -1.0));
        assert!(approx(g, Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn matches_hamilton_product_rotation() {
        let q = axis_angle(Vec3::new(1.0, 1.0, 0.0), FRAC_PI_4);
        let v = Vec3::new(0.5, -0.25, 2.0);
        // p' = q* p q
        let p = Quaternion::new(0.0, v.x, v.y, v.z);
        let c = q.conjugate();
        let mul = |a: Quaternion, b: Quaternion| {
            Quaternion::new(
                a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
                a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
                a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
                a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            )
        };
        let r = mul(mul(c, p), q);
        assert!(approx(q.rotate_inverse(v), Vec3::new(r.x, r.y, r.z)));
    }

    #[test]
    fn normalized_rejects_degenerate_input() {
        assert!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized().is_none());
        assert!(Quaternion::new(f64::NAN, 0.0, 0.0, 0.0).normalized().is_none());
        assert!(Quaternion::new(f64::INFINITY, 0.0, 0.0, 0.0).normalized().is_none());
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalized().unwrap();
        assert!((q.norm() - 1.0).abs() < 1e-12);
    }
}
