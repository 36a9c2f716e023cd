//! Dirty-region tracking and the pull/push update engine shared by every
//! derived map.
//!
//! A derived map owns a [`CellCache`]: one cached value and one dirty bit per
//! cell, an [`Extend`] radius saying how far a single upstream change reaches,
//! and the [`Notifier`] its own listeners subscribe to. The map supplies only
//! the per-cell recomputation through [`Derived::compute`]; marking, clearing,
//! lazy pulls, forced refreshes and downstream fan-out are all handled here,
//! generically over the cached value type.
//!
//! Invariant: a value returned by [`Derived::value_at`] was computed after the
//! most recent invalidation of that cell.

use std::cell::{Cell, RefCell};

use crate::domain::{Domain, GridDomain};
use crate::field::Grid;
use crate::notify::{Notifiable, Notifier, UpdateMode};

/// How far (in cells, per axis) one upstream change can affect cached output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extend {
    pub x: usize,
    pub y: usize,
}

impl Extend {
    /// Pointwise dependency: only the changed cell itself.
    pub const NONE: Extend = Extend { x: 0, y: 0 };

    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// The same radius on both axes.
    pub const fn uniform(r: usize) -> Self {
        Self { x: r, y: r }
    }
}

/// One dirty bit per cell.
#[derive(Debug, Clone)]
pub struct DirtyMap {
    bits: Grid<bool>,
    extend: Extend,
    dirty: usize,
}

impl DirtyMap {
    /// A bitmap with every cell dirty, so nothing is read before it is computed.
    pub fn new(domain: Domain, extend: Extend) -> Self {
        Self {
            bits: Grid::filled(domain, true),
            extend,
            dirty: domain.len(),
        }
    }

    pub fn extend(&self) -> Extend {
        self.extend
    }

    pub fn is_dirty(&self, x: usize, y: usize) -> bool {
        self.bits.get(x, y)
    }

    /// Number of dirty cells.
    pub fn dirty_count(&self) -> usize {
        self.dirty
    }

    /// Dirties the extend rectangle around `(x, y)`, clipped to the domain,
    /// and calls `on_new` for every cell that was clean before.
    pub fn mark(&mut self, x: usize, y: usize, mut on_new: impl FnMut(usize, usize)) {
        let (xs, ys) = self
            .bits
            .domain()
            .clip_rect(x, y, self.extend.x, self.extend.y);
        for cy in ys {
            for cx in xs.clone() {
                if !self.bits.get(cx, cy) {
                    self.bits.set(cx, cy, true);
                    self.dirty += 1;
                    on_new(cx, cy);
                }
            }
        }
    }

    /// Dirties every cell, calling `on_new` for each cell that was clean.
    pub fn mark_all(&mut self, mut on_new: impl FnMut(usize, usize)) {
        let domain = self.bits.domain();
        for (x, y) in domain.cells() {
            if !self.bits.get(x, y) {
                self.bits.set(x, y, true);
                on_new(x, y);
            }
        }
        self.dirty = domain.len();
    }

    /// Clears one cell. Returns whether it was dirty.
    pub fn clear(&mut self, x: usize, y: usize) -> bool {
        let was = self.bits.get(x, y);
        if was {
            self.bits.set(x, y, false);
            self.dirty -= 1;
        }
        was
    }

    pub fn clear_all(&mut self) {
        self.bits.fill(false);
        self.dirty = 0;
    }

    /// Cells in the extend rectangle around `(x, y)`, row-major.
    pub fn reach(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let (xs, ys) = self
            .bits
            .domain()
            .clip_rect(x, y, self.extend.x, self.extend.y);
        ys.flat_map(|cy| xs.clone().map(move |cx| (cx, cy)))
            .collect()
    }
}

/// Cached values, dirty bits and downstream notifier of one derived map.
///
/// All methods take `&self`: reads recompute lazily, so the cache lives
/// behind interior mutability. No borrow is held while `compute` runs or while
/// listeners are notified, so upstream reads and downstream fan-out may
/// re-enter other caches freely.
#[derive(Debug)]
pub struct CellCache<T> {
    values: RefCell<Grid<T>>,
    dirty: RefCell<DirtyMap>,
    notifier: Notifier,
    recomputed: Cell<u64>,
}

impl<T: Copy + Default> CellCache<T> {
    /// A fully dirty cache whose notifier fans out with `mode`.
    pub fn new(domain: Domain, extend: Extend, mode: UpdateMode) -> Self {
        Self {
            values: RefCell::new(Grid::filled(domain, T::default())),
            dirty: RefCell::new(DirtyMap::new(domain, extend)),
            notifier: Notifier::new(mode),
            recomputed: Cell::new(0),
        }
    }

    pub fn domain(&self) -> Domain {
        self.values.borrow().domain()
    }

    pub fn extend(&self) -> Extend {
        self.dirty.borrow().extend()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_dirty(&self, x: usize, y: usize) -> bool {
        self.dirty.borrow().is_dirty(x, y)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.borrow().dirty_count()
    }

    /// Total per-cell recomputations performed so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputed.get()
    }

    /// Cached value without any update, stale or not.
    pub fn cached(&self, x: usize, y: usize) -> T {
        self.values.borrow().get(x, y)
    }

    /// Pull path: brings `(x, y)` up to date if needed, then returns it.
    pub fn read(&self, x: usize, y: usize, compute: impl Fn(usize, usize) -> T) -> T {
        self.update_if_dirty(x, y, compute);
        self.cached(x, y)
    }

    /// Recomputes `(x, y)` only if it is dirty. Returns whether it did.
    pub fn update_if_dirty(&self, x: usize, y: usize, compute: impl Fn(usize, usize) -> T) -> bool {
        if !self.is_dirty(x, y) {
            return false;
        }
        self.recompute(x, y, &compute);
        true
    }

    /// Sweeps the grid, recomputing every dirty cell. Returns how many were.
    pub fn update_if_dirty_all(&self, compute: impl Fn(usize, usize) -> T) -> usize {
        if self.dirty_count() == 0 {
            return 0;
        }
        let mut updated = 0;
        for (x, y) in self.domain().cells() {
            if self.update_if_dirty(x, y, &compute) {
                updated += 1;
            }
        }
        tracing::trace!(updated, "refreshed dirty cells");
        updated
    }

    /// Marks the reach of an upstream change at `(x, y)` dirty and passes
    /// newly dirtied cells on to listeners.
    ///
    /// Cells that were already dirty are not forwarded: their dependents were
    /// invalidated when they first went stale and cannot have been refreshed
    /// since without pulling (and so cleaning) them.
    pub fn mark_dirty(&self, x: usize, y: usize) {
        if self.notifier.listener_count() == 0 {
            self.dirty.borrow_mut().mark(x, y, |_, _| {});
            return;
        }
        let mut fresh = Vec::new();
        self.dirty
            .borrow_mut()
            .mark(x, y, |cx, cy| fresh.push((cx, cy)));
        for (cx, cy) in fresh {
            self.notifier.notify_cell(cx, cy);
        }
    }

    /// Marks every cell dirty, forwarding newly dirtied cells.
    pub fn mark_all_dirty(&self) {
        let mut fresh = Vec::new();
        self.dirty
            .borrow_mut()
            .mark_all(|cx, cy| fresh.push((cx, cy)));
        for (cx, cy) in fresh {
            self.notifier.notify_cell(cx, cy);
        }
    }

    /// Recomputes exactly `(x, y)` regardless of its dirty bit.
    pub fn force_update_cell(&self, x: usize, y: usize, compute: impl Fn(usize, usize) -> T) {
        self.recompute(x, y, &compute);
    }

    /// Recomputes the reach of an upstream change at `(x, y)` now, then
    /// announces each recomputed cell downstream.
    pub fn force_update(&self, x: usize, y: usize, compute: impl Fn(usize, usize) -> T) {
        let reach = self.dirty.borrow().reach(x, y);
        for &(cx, cy) in &reach {
            self.recompute(cx, cy, &compute);
        }
        for (cx, cy) in reach {
            self.notifier.notify_cell(cx, cy);
        }
    }

    /// Recomputes the whole grid now, then asks every listener to do the same.
    pub fn force_update_all(&self, compute: impl Fn(usize, usize) -> T) {
        let domain = self.domain();
        for (x, y) in domain.cells() {
            self.recompute(x, y, &compute);
        }
        tracing::trace!(
            width = domain.width(),
            height = domain.height(),
            "recomputed all cells"
        );
        self.notifier.notify_all();
    }

    fn recompute(&self, x: usize, y: usize, compute: &impl Fn(usize, usize) -> T) {
        let value = compute(x, y);
        self.values.borrow_mut().set(x, y, value);
        self.dirty.borrow_mut().clear(x, y);
        self.recomputed.set(self.recomputed.get() + 1);
    }
}

/// A map whose cells are cached results of a per-cell computation over
/// upstream maps.
///
/// Implementors provide the cache and the `compute` hook; the rest of the
/// update engine, including the [`Notifiable`] implementation, comes for free.
pub trait Derived {
    type Value: Copy + Default;

    fn cache(&self) -> &CellCache<Self::Value>;

    /// Recomputes the value of one cell from the current upstream state.
    fn compute(&self, x: usize, y: usize) -> Self::Value;

    /// Overrides how incoming notifications are treated. `None` honours the
    /// upstream notifier's mode; `Some(Eager)` turns every incoming mark into
    /// an immediate recompute; `Some(Lazy)` turns forced updates into marks.
    fn incoming_mode(&self) -> Option<UpdateMode> {
        None
    }

    /// Current value at `(x, y)`, recomputed first if dirty.
    fn value_at(&self, x: usize, y: usize) -> Self::Value {
        self.cache().read(x, y, |cx, cy| self.compute(cx, cy))
    }

    /// Recomputes `(x, y)` if dirty. Returns whether it did.
    fn update_if_dirty(&self, x: usize, y: usize) -> bool {
        self.cache()
            .update_if_dirty(x, y, |cx, cy| self.compute(cx, cy))
    }

    /// Recomputes every dirty cell. Returns how many were.
    fn update_if_dirty_all(&self) -> usize {
        self.cache()
            .update_if_dirty_all(|cx, cy| self.compute(cx, cy))
    }

    /// Recomputes exactly `(x, y)`, ignoring its dirty bit.
    fn force_update_cell(&self, x: usize, y: usize) {
        self.cache()
            .force_update_cell(x, y, |cx, cy| self.compute(cx, cy));
    }

    fn mark_all_dirty(&self) {
        self.cache().mark_all_dirty();
    }

    fn is_dirty(&self, x: usize, y: usize) -> bool {
        self.cache().is_dirty(x, y)
    }

    fn dirty_count(&self) -> usize {
        self.cache().dirty_count()
    }

    fn recompute_count(&self) -> u64 {
        self.cache().recompute_count()
    }
}

impl<D: Derived> Notifiable for D {
    fn mark_dirty(&self, x: usize, y: usize) {
        match self.incoming_mode() {
            Some(UpdateMode::Eager) => self
                .cache()
                .force_update(x, y, |cx, cy| self.compute(cx, cy)),
            _ => self.cache().mark_dirty(x, y),
        }
    }

    fn force_update(&self, x: usize, y: usize) {
        match self.incoming_mode() {
            Some(UpdateMode::Lazy) => self.cache().mark_dirty(x, y),
            _ => self
                .cache()
                .force_update(x, y, |cx, cy| self.compute(cx, cy)),
        }
    }

    fn force_update_all(&self) {
        match self.incoming_mode() {
            Some(UpdateMode::Lazy) => self.cache().mark_all_dirty(),
            _ => self
                .cache()
                .force_update_all(|cx, cy| self.compute(cx, cy)),
        }
    }
}
