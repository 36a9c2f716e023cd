//! Raw potential and flow sources.
//!
//! These are the leaves of a composition: externally supplied fields wrapped
//! as maps. [`GridPotential`] and [`GridFlow`] are mutable and announce every
//! edit through their own [`Notifier`]; the constant sources and a bare
//! [`Grid<f64>`] never change and so have no notifier.

use std::cell::RefCell;
use std::rc::Rc;

use glam::DVec2;

use crate::domain::{Domain, GridDomain};
use crate::field::Grid;
use crate::map::{ChangeSource, FlowMap, PotentialMap};
use crate::notify::{Notifier, UpdateMode};

/// A mutable scalar field that notifies listeners of each change.
///
/// Constructors hand out `Rc`s because sources are registered by identity
/// and usually shared between several derived maps.
#[derive(Debug)]
pub struct GridPotential {
    grid: RefCell<Grid<f64>>,
    notifier: Notifier,
}

impl GridPotential {
    pub fn new(grid: Grid<f64>, mode: UpdateMode) -> Rc<Self> {
        Rc::new(Self {
            grid: RefCell::new(grid),
            notifier: Notifier::new(mode),
        })
    }

    /// Fills a new field from `f(x, y)`.
    pub fn from_fn(domain: Domain, mode: UpdateMode, f: impl Fn(usize, usize) -> f64) -> Rc<Self> {
        let mut grid = Grid::filled(domain, 0.0);
        for (x, y) in domain.cells() {
            grid.set(x, y, f(x, y));
        }
        Self::new(grid, mode)
    }

    /// Writes one cell and announces it.
    pub fn set(&self, x: usize, y: usize, value: f64) {
        self.grid.borrow_mut().set(x, y, value);
        self.notifier.notify_cell(x, y);
    }

    /// Applies a bulk edit, then asks every listener for a full recompute.
    pub fn modify(&self, edit: impl FnOnce(&mut Grid<f64>)) {
        edit(&mut self.grid.borrow_mut());
        tracing::trace!("potential source rewritten");
        self.notifier.notify_all();
    }

    /// A copy of the current values.
    pub fn snapshot(&self) -> Grid<f64> {
        self.grid.borrow().clone()
    }
}

impl GridDomain for GridPotential {
    fn width(&self) -> usize {
        self.grid.borrow().width()
    }

    fn height(&self) -> usize {
        self.grid.borrow().height()
    }
}

impl ChangeSource for GridPotential {
    fn notifier(&self) -> Option<&Notifier> {
        Some(&self.notifier)
    }
}

impl PotentialMap for GridPotential {
    fn potential(&self, x: usize, y: usize) -> f64 {
        self.grid.borrow().get(x, y)
    }
}

/// A mutable direction field that notifies listeners of each change.
///
/// Every stored vector is a unit vector or neutral: writes are normalized,
/// and zero (or non-finite) input is stored as neutral.
#[derive(Debug)]
pub struct GridFlow {
    grid: RefCell<Grid<DVec2>>,
    notifier: Notifier,
}

impl GridFlow {
    /// A field that is neutral everywhere.
    pub fn new(domain: Domain, mode: UpdateMode) -> Rc<Self> {
        Rc::new(Self {
            grid: RefCell::new(Grid::filled(domain, DVec2::ZERO)),
            notifier: Notifier::new(mode),
        })
    }

    pub fn from_fn(domain: Domain, mode: UpdateMode, f: impl Fn(usize, usize) -> DVec2) -> Rc<Self> {
        let mut grid = Grid::filled(domain, DVec2::ZERO);
        for (x, y) in domain.cells() {
            grid.set(x, y, f(x, y).normalize_or_zero());
        }
        Rc::new(Self {
            grid: RefCell::new(grid),
            notifier: Notifier::new(mode),
        })
    }

    /// Writes one cell (normalized) and announces it.
    pub fn set(&self, x: usize, y: usize, direction: DVec2) {
        self.grid
            .borrow_mut()
            .set(x, y, direction.normalize_or_zero());
        self.notifier.notify_cell(x, y);
    }

    /// Applies a bulk edit, renormalizes, then asks for a full recompute.
    pub fn modify(&self, edit: impl FnOnce(&mut Grid<DVec2>)) {
        {
            let mut grid = self.grid.borrow_mut();
            edit(&mut grid);
            grid.data_mut()
                .iter_mut()
                .for_each(|v| *v = v.normalize_or_zero());
        }
        tracing::trace!("flow source rewritten");
        self.notifier.notify_all();
    }
}

impl GridDomain for GridFlow {
    fn width(&self) -> usize {
        self.grid.borrow().width()
    }

    fn height(&self) -> usize {
        self.grid.borrow().height()
    }
}

impl ChangeSource for GridFlow {
    fn notifier(&self) -> Option<&Notifier> {
        Some(&self.notifier)
    }
}

impl FlowMap for GridFlow {
    fn direction(&self, x: usize, y: usize) -> DVec2 {
        self.grid.borrow().get(x, y)
    }
}

/// The same potential at every cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantPotential {
    domain: Domain,
    value: f64,
}

impl ConstantPotential {
    pub fn new(domain: Domain, value: f64) -> Self {
        Self { domain, value }
    }
}

impl GridDomain for ConstantPotential {
    fn width(&self) -> usize {
        self.domain.width()
    }

    fn height(&self) -> usize {
        self.domain.height()
    }
}

impl ChangeSource for ConstantPotential {}

impl PotentialMap for ConstantPotential {
    fn potential(&self, _x: usize, _y: usize) -> f64 {
        self.value
    }
}

/// The same direction at every cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantFlow {
    domain: Domain,
    direction: DVec2,
}

impl ConstantFlow {
    /// `direction` is normalized; a zero vector gives a neutral field.
    pub fn new(domain: Domain, direction: DVec2) -> Self {
        Self {
            domain,
            direction: direction.normalize_or_zero(),
        }
    }
}

impl GridDomain for ConstantFlow {
    fn width(&self) -> usize {
        self.domain.width()
    }

    fn height(&self) -> usize {
        self.domain.height()
    }
}

impl ChangeSource for ConstantFlow {}

impl FlowMap for ConstantFlow {
    fn direction(&self, _x: usize, _y: usize) -> DVec2 {
        self.direction
    }
}

// A plain grid is a static potential source.
impl ChangeSource for Grid<f64> {}

impl PotentialMap for Grid<f64> {
    fn potential(&self, x: usize, y: usize) -> f64 {
        self.get(x, y)
    }
}
