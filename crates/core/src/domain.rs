//! Grid domains and out-of-bounds edge handling.
//!
//! Every map in a composition shares one fixed `width × height` domain.
//! [`ensure_same_domain`] is the single check used at registration time.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Anything laid out over a fixed rectangular grid.
pub trait GridDomain {
    /// Grid width in cells.
    fn width(&self) -> usize;

    /// Grid height in cells.
    fn height(&self) -> usize;

    /// The `(width, height)` pair as a [`Domain`].
    fn domain(&self) -> Domain {
        Domain {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Whether signed coordinates `(x, y)` lie inside the grid.
    fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }
}

/// A validated grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Domain {
    width: usize,
    height: usize,
}

impl Domain {
    /// Creates a domain.
    ///
    /// Returns `FieldError::InvalidDimensions` if either side is zero or the
    /// cell count overflows `usize`.
    pub fn new(width: usize, height: usize) -> Result<Self, FieldError> {
        if width == 0 || height == 0 {
            return Err(FieldError::InvalidDimensions);
        }
        width
            .checked_mul(height)
            .ok_or(FieldError::InvalidDimensions)?;
        Ok(Self { width, height })
    }

    /// The 1×1 domain.
    pub const fn unit() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Always false; a validated domain has at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Row-major flat index of `(x, y)`.
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(
            x < self.width && y < self.height,
            "cell ({x}, {y}) outside {}x{} domain",
            self.width,
            self.height
        );
        y * self.width + x
    }

    /// Iterates every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let width = self.width;
        (0..self.len()).map(move |i| (i % width, i / width))
    }

    /// The rectangle `[x-ex, x+ex] × [y-ey, y+ey]` clipped to the domain,
    /// as inclusive column and row ranges. No wraparound.
    pub fn clip_rect(
        &self,
        x: usize,
        y: usize,
        ex: usize,
        ey: usize,
    ) -> (RangeInclusive<usize>, RangeInclusive<usize>) {
        let x0 = x.saturating_sub(ex);
        let y0 = y.saturating_sub(ey);
        let x1 = x.saturating_add(ex).min(self.width - 1);
        let y1 = y.saturating_add(ey).min(self.height - 1);
        (x0..=x1, y0..=y1)
    }
}

impl GridDomain for Domain {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn domain(&self) -> Domain {
        *self
    }
}

/// Rejects `candidate` unless it has exactly the `expected` size.
pub fn ensure_same_domain(expected: Domain, candidate: Domain) -> Result<(), FieldError> {
    if expected == candidate {
        return Ok(());
    }
    tracing::warn!(
        expected_w = expected.width,
        expected_h = expected.height,
        got_w = candidate.width,
        got_h = candidate.height,
        "rejected map with mismatched domain"
    );
    Err(FieldError::InvalidDomain {
        expected_w: expected.width,
        expected_h: expected.height,
        got_w: candidate.width,
        got_h: candidate.height,
    })
}

/// How reads outside the domain are answered.
///
/// Every policy resolves an out-of-domain read to a cell within one extend
/// radius of the reader (or to a constant), so clipped dirty rectangles stay
/// exact. There is deliberately no toroidal variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Out-of-bounds reads take the nearest edge cell.
    #[default]
    Clamp,
    /// Reflect about the edge cell without repeating it (`-1 → 1`).
    Mirror,
    /// Out-of-bounds reads return a fixed virtual value.
    Constant(f64),
}

impl EdgePolicy {
    /// Resolves one axis coordinate. `None` means "use the constant".
    pub fn resolve_axis(self, v: isize, len: usize) -> Option<usize> {
        let n = len as isize;
        if (0..n).contains(&v) {
            return Some(v as usize);
        }
        match self {
            EdgePolicy::Clamp => Some(v.clamp(0, n - 1) as usize),
            EdgePolicy::Mirror => Some(mirror(v, len)),
            EdgePolicy::Constant(_) => None,
        }
    }

    /// Resolves a signed cell to an in-domain cell, or `None` for `Constant`.
    pub fn resolve(self, x: isize, y: isize, domain: Domain) -> Option<(usize, usize)> {
        let rx = self.resolve_axis(x, domain.width)?;
        let ry = self.resolve_axis(y, domain.height)?;
        Some((rx, ry))
    }

    /// Reads a scalar at signed `(x, y)` through `read`, applying this policy
    /// for out-of-domain coordinates.
    pub fn sample(
        self,
        domain: Domain,
        x: isize,
        y: isize,
        read: impl Fn(usize, usize) -> f64,
    ) -> f64 {
        match self.resolve(x, y, domain) {
            Some((rx, ry)) => read(rx, ry),
            None => match self {
                EdgePolicy::Constant(v) => v,
                _ => unreachable!("only Constant leaves coordinates unresolved"),
            },
        }
    }
}

fn mirror(v: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    let period = 2 * (n - 1);
    let m = v.rem_euclid(period);
    (if m < n { m } else { period - m }) as usize
}
