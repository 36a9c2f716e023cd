//! Fixed-size row-major grid storage.
//!
//! A `Grid<T>` stores `width * height` values of a `Copy` type. Raw potential
//! and flow sources, kernel weights, and derived-map caches are all grids.
//! Unlike reads through a map, direct grid access uses unsigned in-domain
//! coordinates; signed reads go through [`Grid::sample`] and an [`EdgePolicy`].

use crate::domain::{Domain, EdgePolicy, GridDomain};
use crate::error::FieldError;

/// A 2D grid of `T` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    domain: Domain,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Creates a grid filled with `value`.
    ///
    /// Returns `FieldError::InvalidDimensions` if either dimension is zero
    /// or if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize, value: T) -> Result<Self, FieldError> {
        let domain = Domain::new(width, height)?;
        Ok(Self::filled(domain, value))
    }

    /// Creates a grid over an already validated domain.
    pub fn filled(domain: Domain, value: T) -> Self {
        Self {
            domain,
            data: vec![value; domain.len()],
        }
    }

    /// Creates a grid from a pre-built row-major buffer.
    ///
    /// Returns `FieldError::DataLength` if `data.len() != width * height`.
    pub fn from_data(width: usize, height: usize, data: Vec<T>) -> Result<Self, FieldError> {
        let domain = Domain::new(width, height)?;
        if data.len() != domain.len() {
            return Err(FieldError::DataLength {
                expected: domain.len(),
                got: data.len(),
            });
        }
        Ok(Self { domain, data })
    }

    /// Value at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.domain.index(x, y)]
    }

    /// Overwrites the value at `(x, y)`.
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.domain.index(x, y);
        self.data[idx] = value;
    }

    /// Overwrites every cell with `value`.
    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Read-only access to the underlying row-major data.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying row-major data.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Iterates over all cells yielding `(x, y, value)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.domain.width();
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % width, i / width, v))
    }
}

impl Grid<f64> {
    /// Reads signed `(x, y)`, resolving out-of-domain coordinates with `edge`.
    pub fn sample(&self, x: isize, y: isize, edge: EdgePolicy) -> f64 {
        edge.sample(self.domain, x, y, |cx, cy| self.get(cx, cy))
    }
}

impl<T> GridDomain for Grid<T> {
    fn width(&self) -> usize {
        self.domain.width()
    }

    fn height(&self) -> usize {
        self.domain.height()
    }

    fn domain(&self) -> Domain {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Constructor tests --

    #[test]
    fn new_creates_filled_grid() {
        let grid = Grid::new(4, 3, 0.25).unwrap();
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.data().len(), 12);
        assert!(grid.data().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn new_with_zero_dimension_returns_error() {
        assert_eq!(Grid::new(0, 5, 0.0), Err(FieldError::InvalidDimensions));
        assert_eq!(Grid::new(5, 0, 0.0), Err(FieldError::InvalidDimensions));
    }

    #[test]
    fn new_with_overflow_dimensions_returns_error() {
        assert!(Grid::new(usize::MAX, 2, 0_u8).is_err());
    }

    #[test]
    fn potentials_are_not_clamped() {
        let mut grid = Grid::new(2, 2, 0.0).unwrap();
        grid.set(1, 1, -3.5);
        grid.set(0, 0, 42.0);
        assert_eq!(grid.get(1, 1), -3.5);
        assert_eq!(grid.get(0, 0), 42.0);
    }

    // -- from_data --

    #[test]
    fn from_data_creates_grid_from_vec() {
        let grid = Grid::from_data(3, 2, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        assert_eq!(grid.get(0, 0), 0.1);
        assert_eq!(grid.get(2, 1), 0.6);
    }

    #[test]
    fn from_data_rejects_wrong_length() {
        assert_eq!(
            Grid::from_data(2, 2, vec![1.0, 2.0, 3.0]),
            Err(FieldError::DataLength {
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn from_data_rejects_zero_dimensions() {
        assert!(Grid::<f64>::from_data(0, 5, vec![]).is_err());
    }

    // -- Mutation --

    #[test]
    fn fill_overwrites_every_cell() {
        let mut grid = Grid::new(3, 3, 1.0).unwrap();
        grid.fill(-2.0);
        assert!(grid.data().iter().all(|&v| v == -2.0));
    }

    #[test]
    fn data_mut_allows_direct_write() {
        let mut grid = Grid::new(2, 2, 0.0).unwrap();
        grid.data_mut()[3] = 0.42;
        assert_eq!(grid.get(1, 1), 0.42);
    }

    #[test]
    fn clone_produces_independent_copy() {
        let mut original = Grid::new(3, 3, 0.0).unwrap();
        original.set(1, 1, 0.5);
        let copy = original.clone();
        original.set(1, 1, 0.9);
        assert_eq!(copy.get(1, 1), 0.5);
    }

    // -- Iterator --

    #[test]
    fn iter_yields_all_triples_in_row_major_order() {
        let grid = Grid::from_data(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let triples: Vec<_> = grid.iter().collect();
        assert_eq!(
            triples,
            vec![(0, 0, 1), (1, 0, 2), (2, 0, 3), (0, 1, 4), (1, 1, 5), (2, 1, 6)]
        );
    }

    // -- Edge sampling --

    #[test]
    fn sample_inside_reads_directly() {
        let grid = Grid::from_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(grid.sample(1, 0, EdgePolicy::Constant(9.0)), 2.0);
    }

    #[test]
    fn sample_outside_follows_policy() {
        let grid = Grid::from_data(3, 1, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(grid.sample(-1, 0, EdgePolicy::Clamp), 1.0);
        assert_eq!(grid.sample(-1, 0, EdgePolicy::Mirror), 2.0);
        assert_eq!(grid.sample(-1, 0, EdgePolicy::Constant(0.5)), 0.5);
        assert_eq!(grid.sample(1, 4, EdgePolicy::Clamp), 2.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn get_after_set_returns_value(
                w in 1_usize..=32,
                h in 1_usize..=32,
                x in 0_usize..32,
                y in 0_usize..32,
                v in -1.0e6_f64..1.0e6,
            ) {
                let (x, y) = (x % w, y % h);
                let mut grid = Grid::new(w, h, 0.0).unwrap();
                grid.set(x, y, v);
                prop_assert_eq!(grid.get(x, y), v);
                prop_assert_eq!(grid.sample(x as isize, y as isize, EdgePolicy::Clamp), v);
            }

            #[test]
            fn clamp_sampling_matches_nearest_cell(
                w in 1_usize..=16,
                h in 1_usize..=16,
                x in -64_isize..64,
                y in -64_isize..64,
            ) {
                let data: Vec<f64> = (0..w * h).map(|i| i as f64).collect();
                let grid = Grid::from_data(w, h, data).unwrap();
                let cx = x.clamp(0, w as isize - 1) as usize;
                let cy = y.clamp(0, h as isize - 1) as usize;
                prop_assert_eq!(grid.sample(x, y, EdgePolicy::Clamp), grid.get(cx, cy));
            }
        }
    }
}
