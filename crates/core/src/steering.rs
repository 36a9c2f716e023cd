//! Turning a desired direction into a turn-rate limited heading change.
//!
//! Agents read a direction from a flow map once per step. They may only turn
//! by a bounded angle per step, so the desired direction is clamped against
//! the current heading. An undecided (neutral) desire becomes a random wander
//! within the same bound.

use glam::DVec2;
use rand::Rng;

use crate::rotation::Rotation;

/// Picks the next heading.
///
/// - No current heading: `desired` is taken verbatim.
/// - Neutral `desired`: `current` turned by a random rotation between
///   `-max_turn` and `+max_turn`.
/// - Turn to `desired` larger than `max_turn`: `current` turned by exactly
///   `max_turn`, in the direction of `desired`.
/// - Otherwise `desired` unchanged.
///
/// The sign of `max_turn` is ignored. `rng` is only drawn from in the wander
/// case.
pub fn constrain_turn<R: Rng + ?Sized>(
    current: DVec2,
    desired: DVec2,
    max_turn: Rotation,
    rng: &mut R,
) -> DVec2 {
    if is_neutral(current) {
        return desired;
    }
    let max_turn = max_turn.abs();
    if is_neutral(desired) {
        return wander(max_turn, rng).apply(current);
    }
    let turn = Rotation::from_between(current, desired);
    if !turn.exceeds(&max_turn) {
        return desired;
    }
    let bounded = if turn.is_negative() {
        max_turn.opposite()
    } else {
        max_turn
    };
    bounded.apply(current)
}

// Uniform in t over [-max, +max], interpolated through the identity so the
// sample stays on the short arc.
fn wander<R: Rng + ?Sized>(max_turn: Rotation, rng: &mut R) -> Rotation {
    let t: f64 = rng.gen();
    if t < 0.5 {
        max_turn.opposite().nlerp(Rotation::IDENTITY, t * 2.0)
    } else {
        Rotation::IDENTITY.nlerp(max_turn, t * 2.0 - 1.0)
    }
}

fn is_neutral(v: DVec2) -> bool {
    v.length_squared() == 0.0
}

/// A per-agent turn-rate limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnLimiter {
    max_turn: Rotation,
}

impl TurnLimiter {
    /// Limits turns to `max_angle` radians per step.
    pub fn new(max_angle: f64) -> Self {
        Self::from_rotation(Rotation::from_angle(max_angle))
    }

    pub fn from_rotation(max_turn: Rotation) -> Self {
        Self {
            max_turn: max_turn.abs(),
        }
    }

    pub fn max_turn(&self) -> Rotation {
        self.max_turn
    }

    /// See [`constrain_turn`].
    pub fn steer<R: Rng + ?Sized>(&self, current: DVec2, desired: DVec2, rng: &mut R) -> DVec2 {
        constrain_turn(current, desired, self.max_turn, rng)
    }
}
