//! Canonical grid coordinates and a growable coordinate table.
//!
//! [`GridCoord`] is a plain `Copy` value, so it can key hash maps without any
//! allocation. [`CoordCache`] keeps the "one canonical coordinate per cell"
//! table that callers can hand out by reference. It is owned by whoever needs
//! it rather than shared process-wide, and grows from a single maintenance
//! point via [`CoordCache::ensure_capacity`].

use serde::{Deserialize, Serialize};

/// Integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: usize,
    pub y: usize,
}

impl GridCoord {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl From<(usize, usize)> for GridCoord {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

/// Table of canonical coordinates covering the largest domain requested so far.
///
/// The table never shrinks. Lookups outside the current bound return `None`
/// until [`ensure_capacity`](Self::ensure_capacity) has grown it.
#[derive(Debug, Clone, Default)]
pub struct CoordCache {
    width: usize,
    height: usize,
    coords: Vec<GridCoord>,
}

impl CoordCache {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-grown to `width × height`.
    pub fn with_capacity(width: usize, height: usize) -> Self {
        let mut cache = Self::new();
        cache.ensure_capacity(width, height);
        cache
    }

    /// Current covered width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Current covered height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Grows the table to cover at least `width × height`.
    ///
    /// Each axis only ever grows. Existing entries are carried over and the
    /// new cells are filled with fresh coordinates. Returns `true` if the
    /// table changed size.
    pub fn ensure_capacity(&mut self, width: usize, height: usize) -> bool {
        let new_w = self.width.max(width);
        let new_h = self.height.max(height);
        if new_w == self.width && new_h == self.height {
            return false;
        }

        let mut coords = Vec::with_capacity(new_w * new_h);
        for y in 0..new_h {
            for x in 0..new_w {
                if x < self.width && y < self.height {
                    coords.push(self.coords[y * self.width + x]);
                } else {
                    coords.push(GridCoord::new(x, y));
                }
            }
        }

        tracing::debug!(
            from_w = self.width,
            from_h = self.height,
            to_w = new_w,
            to_h = new_h,
            "grew coordinate cache"
        );
        self.width = new_w;
        self.height = new_h;
        self.coords = coords;
        true
    }

    /// The canonical coordinate for `(x, y)`, or `None` outside the covered bound.
    pub fn get(&self, x: usize, y: usize) -> Option<&GridCoord> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.coords.get(y * self.width + x)
    }

    /// Iterates the canonical coordinates of the `width × height` sub-rectangle
    /// anchored at the origin, in row-major order. Cells outside the covered
    /// bound are skipped.
    pub fn iter_rect(&self, width: usize, height: usize) -> impl Iterator<Item = &GridCoord> {
        let w = width.min(self.width);
        let h = height.min(self.height);
        (0..h).flat_map(move |y| self.coords[y * self.width..y * self.width + w].iter())
    }
}
