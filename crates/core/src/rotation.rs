//! Unit-vector encoded 2D rotations.

use std::cmp::Ordering;
use std::ops::Mul;

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// How far a "unit" input may stray from length one before debug builds object.
const UNIT_TOLERANCE: f64 = 1e-6;

/// A 2D rotation stored as `(cos θ, sin θ)`.
///
/// Built only from an angle or a unit vector, so `cos² + sin² = 1` holds.
/// Composition is rotation-matrix multiplication; the angle is never stored.
/// There is no `PartialOrd`: rotations are compared by
/// magnitude through [`Rotation::cmp_magnitude`], not by signed angle.
///
/// Deserialized `(cos, sin)` pairs are renormalized; a zero or non-finite
/// pair becomes the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CosSin")]
pub struct Rotation {
    cos: f64,
    sin: f64,
}

#[derive(Deserialize)]
struct CosSin {
    cos: f64,
    sin: f64,
}

impl From<CosSin> for Rotation {
    fn from(raw: CosSin) -> Self {
        Rotation::normalized(DVec2::new(raw.cos, raw.sin))
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rotation {
    /// No turn.
    pub const IDENTITY: Rotation = Rotation { cos: 1.0, sin: 0.0 };

    /// A turn by π.
    pub const HALF_TURN: Rotation = Rotation {
        cos: -1.0,
        sin: 0.0,
    };

    /// Rotation by `theta` radians.
    pub fn from_angle(theta: f64) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self { cos, sin }
    }

    /// Rotation whose `(cos, sin)` is `v`.
    ///
    /// `v` must have unit length. Debug builds assert it; release builds
    /// renormalize, and map a zero or non-finite vector to the identity.
    pub fn from_unit_vector(v: DVec2) -> Self {
        debug_assert!(
            (v.length() - 1.0).abs() < UNIT_TOLERANCE,
            "rotation built from non-unit vector {v:?}"
        );
        if (v.length_squared() - 1.0).abs() < UNIT_TOLERANCE {
            return Self { cos: v.x, sin: v.y };
        }
        Self::normalized(v)
    }

    /// The rotation taking direction `from` onto direction `to`.
    ///
    /// Returns the identity if either vector is neutral.
    pub fn from_between(from: DVec2, to: DVec2) -> Self {
        let (a, b) = (from.normalize_or_zero(), to.normalize_or_zero());
        if a == DVec2::ZERO || b == DVec2::ZERO {
            return Self::IDENTITY;
        }
        Self::normalized(DVec2::new(a.dot(b), a.perp_dot(b)))
    }

    fn normalized(v: DVec2) -> Self {
        let len = v.length();
        if len == 0.0 || !len.is_finite() {
            return Self::IDENTITY;
        }
        Self {
            cos: v.x / len,
            sin: v.y / len,
        }
    }

    pub fn cos(self) -> f64 {
        self.cos
    }

    pub fn sin(self) -> f64 {
        self.sin
    }

    /// Signed angle in `(-π, π]`.
    pub fn angle(self) -> f64 {
        self.sin.atan2(self.cos)
    }

    /// `(cos, sin)` as a vector.
    pub fn as_vec(self) -> DVec2 {
        DVec2::new(self.cos, self.sin)
    }

    /// Rotates `v`.
    pub fn apply(self, v: DVec2) -> DVec2 {
        DVec2::new(
            self.cos * v.x - self.sin * v.y,
            self.sin * v.x + self.cos * v.y,
        )
    }

    /// The same turn in the other direction (the transposed matrix).
    pub fn opposite(self) -> Self {
        Self {
            cos: self.cos,
            sin: -self.sin,
        }
    }

    /// Alias of [`Rotation::opposite`].
    pub fn inverse(self) -> Self {
        self.opposite()
    }

    /// The same magnitude with a non-negative sine.
    pub fn abs(self) -> Self {
        Self {
            cos: self.cos,
            sin: self.sin.abs(),
        }
    }

    /// Whether the turn is in the negative-angle sense.
    pub fn is_negative(self) -> bool {
        self.sin < 0.0
    }

    /// Orders by turn magnitude, smallest first: a larger cosine is a
    /// smaller rotation. Direction is ignored.
    pub fn cmp_magnitude(&self, other: &Rotation) -> Ordering {
        other.cos.total_cmp(&self.cos)
    }

    /// Whether this turn is strictly larger than `limit`.
    pub fn exceeds(&self, limit: &Rotation) -> bool {
        self.cmp_magnitude(limit) == Ordering::Greater
    }

    /// Linear interpolation of the `(cos, sin)` vectors, renormalized.
    ///
    /// Fast but not constant-speed. Between exactly opposite rotations the
    /// midpoint is undefined and falls back to [`Rotation::slerp`].
    pub fn nlerp(self, other: Rotation, t: f64) -> Self {
        let v = self.as_vec().lerp(other.as_vec(), t);
        if v.length_squared() < UNIT_TOLERANCE * UNIT_TOLERANCE {
            return self.slerp(other, t);
        }
        Self::normalized(v)
    }

    /// Constant-speed interpolation along the shorter arc.
    pub fn slerp(self, other: Rotation, t: f64) -> Self {
        let delta = other * self.inverse();
        self * Self::from_angle(delta.angle() * t)
    }
}

impl Mul for Rotation {
    type Output = Rotation;

    fn mul(self, rhs: Rotation) -> Rotation {
        Rotation {
            cos: self.cos * rhs.cos - self.sin * rhs.sin,
            sin: self.sin * rhs.cos + self.cos * rhs.sin,
        }
    }
}

impl Mul<DVec2> for Rotation {
    type Output = DVec2;

    fn mul(self, rhs: DVec2) -> DVec2 {
        self.apply(rhs)
    }
}
