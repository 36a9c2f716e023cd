//! Procedural potential patterns for seeding raw sources.
//!
//! Every pattern is deterministic: the same pattern over the same domain
//! renders the same grid. Patterns are sampled at integer cell coordinates.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::FieldError;
use crate::field::Grid;

/// Distances or radii below this are treated as zero.
const SINGULARITY_EPS: f64 = 1e-10;

/// A scalar field described by a handful of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PotentialPattern {
    /// The same value everywhere.
    Uniform { value: f64 },
    /// Linear ramp `dx·x + dy·y`.
    Gradient { dx: f64, dy: f64 },
    /// Peak of `strength` at `(x, y)`, falling off as `strength / (1 + d / radius)`.
    Attractor {
        x: f64,
        y: f64,
        strength: f64,
        radius: f64,
    },
    /// Perlin noise scaled by `strength`. `scale` is the sampling frequency
    /// per cell; integer multiples of 1 land on lattice points where Perlin
    /// noise is zero.
    Noise { scale: f64, strength: f64, seed: u32 },
    /// Sum of several patterns.
    Layers { layers: Vec<PotentialPattern> },
}

impl Default for PotentialPattern {
    fn default() -> Self {
        PotentialPattern::Uniform { value: 0.0 }
    }
}

impl PotentialPattern {
    /// Parses a pattern from JSON such as `{"kind": "gradient", "dx": 0, "dy": 1}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FieldError> {
        serde_json::from_value(value.clone())
            .map_err(|e| FieldError::InvalidConfig(format!("pattern: {e}")))
    }

    /// Renders the pattern over `domain`.
    pub fn render(&self, domain: Domain) -> Grid<f64> {
        let sample = self.sampler();
        let mut grid = Grid::filled(domain, 0.0);
        for (x, y) in domain.cells() {
            grid.set(x, y, sample(x as f64, y as f64));
        }
        grid
    }

    /// Value at one point.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        self.sampler()(x, y)
    }

    // Noise generators are built once per render, not once per cell.
    fn sampler(&self) -> Box<dyn Fn(f64, f64) -> f64> {
        match *self {
            PotentialPattern::Uniform { value } => Box::new(move |_, _| value),
            PotentialPattern::Gradient { dx, dy } => Box::new(move |x, y| dx * x + dy * y),
            PotentialPattern::Attractor {
                x: ax,
                y: ay,
                strength,
                radius,
            } => Box::new(move |x, y| attraction(ax, ay, x, y, strength, radius)),
            PotentialPattern::Noise {
                scale,
                strength,
                seed,
            } => {
                let noise = Perlin::new(seed);
                Box::new(move |x, y| noise.get([x * scale, y * scale]) * strength)
            }
            PotentialPattern::Layers { ref layers } => {
                let parts: Vec<_> = layers.iter().map(Self::sampler).collect();
                Box::new(move |x, y| parts.iter().map(|f| f(x, y)).sum())
            }
        }
    }
}

fn attraction(ax: f64, ay: f64, px: f64, py: f64, strength: f64, radius: f64) -> f64 {
    if radius.abs() < SINGULARITY_EPS {
        return 0.0;
    }
    let dist = (ax - px).hypot(ay - py);
    strength / (1.0 + dist / radius)
}
