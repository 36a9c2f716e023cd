//! Convolution kernels for filtered potential maps.

use crate::dirty::Extend;
use crate::domain::{Domain, GridDomain};
use crate::error::FieldError;
use crate::field::Grid;

/// A rectangular weight stencil of odd size `(2·rx + 1) × (2·ry + 1)`,
/// centred on the cell being filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    rx: usize,
    ry: usize,
    weights: Grid<f64>,
}

impl Kernel {
    /// Builds a kernel from row-major weights, top row first.
    ///
    /// Returns `FieldError::InvalidKernel` if the weight count does not match
    /// the radii or a weight is not finite.
    pub fn new(rx: usize, ry: usize, weights: Vec<f64>) -> Result<Self, FieldError> {
        let (w, h) = (side(rx)?, side(ry)?);
        if weights.len() != w * h {
            return Err(FieldError::InvalidKernel(format!(
                "{w}x{h} kernel needs {} weights, got {}",
                w * h,
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|v| !v.is_finite()) {
            return Err(FieldError::InvalidKernel(format!(
                "kernel weight {bad} is not finite"
            )));
        }
        let weights = Grid::from_data(w, h, weights)?;
        Ok(Self { rx, ry, weights })
    }

    /// The 1×1 pass-through kernel.
    pub fn identity() -> Self {
        Self {
            rx: 0,
            ry: 0,
            weights: Grid::filled(Domain::unit(), 1.0),
        }
    }

    /// Uniform average over a `(2r + 1)²` square.
    pub fn box_blur(radius: usize) -> Result<Self, FieldError> {
        let n = side(radius)?;
        let cells = n * n;
        Self::new(radius, radius, vec![1.0 / cells as f64; cells])
    }

    /// Normalized Gaussian over a `(2r + 1)²` square.
    ///
    /// Returns `FieldError::InvalidKernel` unless `sigma` is finite and positive.
    pub fn gaussian(radius: usize, sigma: f64) -> Result<Self, FieldError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(FieldError::InvalidKernel(format!(
                "gaussian sigma must be positive, got {sigma}"
            )));
        }
        let n = side(radius)?;
        let r = radius as f64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut weights: Vec<f64> = (0..n * n)
            .map(|i| {
                let dx = (i % n) as f64 - r;
                let dy = (i / n) as f64 - r;
                (-(dx * dx + dy * dy) / two_sigma_sq).exp()
            })
            .collect();
        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);
        Self::new(radius, radius, weights)
    }

    /// Radii `(rx, ry)`.
    pub fn radius(&self) -> (usize, usize) {
        (self.rx, self.ry)
    }

    /// How far one source change reaches through this kernel.
    pub fn extend(&self) -> Extend {
        Extend::new(self.rx, self.ry)
    }

    /// Weight at offset `(dx, dy)` from the centre; zero outside the stencil.
    pub fn weight(&self, dx: isize, dy: isize) -> f64 {
        let (kx, ky) = (dx + self.rx as isize, dy + self.ry as isize);
        if kx < 0 || ky < 0 || kx as usize >= self.weights.width() {
            return 0.0;
        }
        if ky as usize >= self.weights.height() {
            return 0.0;
        }
        self.weights.get(kx as usize, ky as usize)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights.data().iter().sum()
    }

    /// `Σ weight(dx, dy) × read(x + dx, y + dy)` over the stencil.
    ///
    /// `read` receives signed coordinates and is responsible for anything
    /// that falls outside the domain.
    pub fn apply(&self, x: usize, y: usize, read: impl Fn(isize, isize) -> f64) -> f64 {
        let (ox, oy) = (x as isize - self.rx as isize, y as isize - self.ry as isize);
        self.weights
            .iter()
            .filter(|&(_, _, w)| w != 0.0)
            .map(|(kx, ky, w)| w * read(ox + kx as isize, oy + ky as isize))
            .sum()
    }
}

/// Largest accepted radius on either axis.
pub const MAX_RADIUS: usize = 512;

fn side(radius: usize) -> Result<usize, FieldError> {
    if radius > MAX_RADIUS {
        return Err(FieldError::InvalidKernel(format!(
            "radius {radius} exceeds the maximum of {MAX_RADIUS}"
        )));
    }
    Ok(2 * radius + 1)
}
