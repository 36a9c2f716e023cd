//! Derived maps that combine several weighted sources into one.
//!
//! Every combinator keeps its sources in a [`SourceSet`], caches its output in
//! a [`CellCache`], and subscribes to any source that announces changes. Any
//! change to the source set (add, remove, re-weight) recomputes the whole grid
//! because it alters every cell's contribution set.

use std::f64::consts::FRAC_1_SQRT_2;
use std::rc::{Rc, Weak};

use glam::DVec2;

use crate::dirty::{CellCache, Derived, Extend};
use crate::domain::{Domain, EdgePolicy, GridDomain};
use crate::error::FieldError;
use crate::map::{same_map, ChangeSource, FlowMap, PotentialMap, SourceMap, SourceSet};
use crate::notify::{Notifiable, Notifier, UpdateMode};

/// Relative size below which a summed direction counts as cancelled out.
const CANCEL_EPS: f64 = 1e-12;

/// Moore neighbourhood offsets with the unit vector from the centre toward
/// each neighbour, clockwise from north. The centre contributes nothing.
const MOORE: [(isize, isize, DVec2); 8] = [
    (0, -1, DVec2::new(0.0, -1.0)),
    (1, -1, DVec2::new(FRAC_1_SQRT_2, -FRAC_1_SQRT_2)),
    (1, 0, DVec2::new(1.0, 0.0)),
    (1, 1, DVec2::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2)),
    (0, 1, DVec2::new(0.0, 1.0)),
    (-1, 1, DVec2::new(-FRAC_1_SQRT_2, FRAC_1_SQRT_2)),
    (-1, 0, DVec2::new(-1.0, 0.0)),
    (-1, -1, DVec2::new(-FRAC_1_SQRT_2, -FRAC_1_SQRT_2)),
];

/// Normalizes `sum`, or returns the neutral vector when it is negligible
/// next to `scale`, the total magnitude of the terms that produced it.
fn normalize_or_neutral(sum: DVec2, scale: f64) -> DVec2 {
    let len = sum.length();
    if len <= CANCEL_EPS * scale || !len.is_finite() {
        return DVec2::ZERO;
    }
    sum / len
}

// ---------------------------------------------------------------------------
// Potential summation
// ---------------------------------------------------------------------------

/// Weighted sum of potential maps: `Σ weight × potential(x, y)`.
pub struct SummedPotentialMap {
    this: Weak<Self>,
    domain: Domain,
    sources: SourceSet<dyn PotentialMap>,
    cache: CellCache<f64>,
}

impl SummedPotentialMap {
    pub fn new(domain: Domain, mode: UpdateMode) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            domain,
            sources: SourceSet::new(),
            cache: CellCache::new(domain, Extend::NONE, mode),
        })
    }

    /// Registers `map` with `weight`, or re-weights it if already registered.
    ///
    /// Fails with `InvalidDomain` or `SelfReference`; the source set is then
    /// left unchanged.
    pub fn add_map(&self, map: Rc<dyn PotentialMap>, weight: f64) -> Result<(), FieldError> {
        self.sources.attach(&self.this, self.domain, map, weight)?;
        self.force_update_all();
        Ok(())
    }

    /// Returns `false` if `map` was never registered.
    pub fn remove_map<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        let removed = self.sources.detach(&self.this, map);
        if removed {
            self.force_update_all();
        }
        removed
    }

    /// Returns `false` if `map` was never registered.
    pub fn set_weight<N: ?Sized>(&self, map: &Rc<N>, weight: f64) -> bool {
        let changed = self.sources.set_weight(map, weight);
        if changed {
            self.force_update_all();
        }
        changed
    }

    pub fn source_count(&self) -> usize {
        self.sources.registry().len()
    }

    pub fn weight_of<N: ?Sized>(&self, map: &Rc<N>) -> Option<f64> {
        self.sources.registry().weight_of(map)
    }
}

impl Derived for SummedPotentialMap {
    type Value = f64;

    fn cache(&self) -> &CellCache<f64> {
        &self.cache
    }

    fn compute(&self, x: usize, y: usize) -> f64 {
        self.sources
            .registry()
            .entries()
            .iter()
            .map(|e| e.weight * e.map.potential(x, y))
            .sum()
    }
}

impl GridDomain for SummedPotentialMap {
    fn width(&self) -> usize {
        self.domain.width()
    }

    fn height(&self) -> usize {
        self.domain.height()
    }
}

impl ChangeSource for SummedPotentialMap {
    fn notifier(&self) -> Option<&Notifier> {
        Some(self.cache.notifier())
    }
}

impl PotentialMap for SummedPotentialMap {
    fn potential(&self, x: usize, y: usize) -> f64 {
        self.value_at(x, y)
    }
}

// ---------------------------------------------------------------------------
// Flow from potentials
// ---------------------------------------------------------------------------

/// Direction toward higher combined potential, taken from the 8-connected
/// neighbourhood of each cell.
///
/// The combined potential `P(n) = Σ weight × potential(n)` is read at every
/// neighbour `n`; the direction is `normalize(Σ P(n) × unit(centre → n))`.
/// A single raised neighbour pulls the flow straight toward it, and equal
/// potentials on opposite sides cancel to neutral. Neighbours outside the
/// domain are resolved through the map's [`EdgePolicy`]; with
/// `EdgePolicy::Constant(v)`, `v` stands in for the combined potential.
pub struct FlowFromPotentialsMap {
    this: Weak<Self>,
    domain: Domain,
    edge: EdgePolicy,
    sources: SourceSet<dyn PotentialMap>,
    cache: CellCache<DVec2>,
}

impl FlowFromPotentialsMap {
    pub fn new(domain: Domain, mode: UpdateMode, edge: EdgePolicy) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            domain,
            edge,
            sources: SourceSet::new(),
            cache: CellCache::new(domain, Extend::uniform(1), mode),
        })
    }

    /// Registers `map` with `weight`, or re-weights it if already registered.
    pub fn add_map(&self, map: Rc<dyn PotentialMap>, weight: f64) -> Result<(), FieldError> {
        self.sources.attach(&self.this, self.domain, map, weight)?;
        self.force_update_all();
        Ok(())
    }

    pub fn remove_map<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        let removed = self.sources.detach(&self.this, map);
        if removed {
            self.force_update_all();
        }
        removed
    }

    pub fn set_weight<N: ?Sized>(&self, map: &Rc<N>, weight: f64) -> bool {
        let changed = self.sources.set_weight(map, weight);
        if changed {
            self.force_update_all();
        }
        changed
    }

    pub fn source_count(&self) -> usize {
        self.sources.registry().len()
    }

    pub fn weight_of<N: ?Sized>(&self, map: &Rc<N>) -> Option<f64> {
        self.sources.registry().weight_of(map)
    }

    /// Sum of all source weights.
    pub fn total_weight(&self) -> f64 {
        self.sources.registry().total_weight()
    }

    /// Sum of the magnitudes of all source weights.
    pub fn total_abs_weight(&self) -> f64 {
        self.sources.registry().total_abs_weight()
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge
    }

    /// Weighted potential at signed `(x, y)`, edge policy applied.
    pub fn combined_potential(&self, x: isize, y: isize) -> f64 {
        let registry = self.sources.registry();
        self.edge.sample(self.domain, x, y, |cx, cy| {
            registry
                .entries()
                .iter()
                .map(|e| e.weight * e.map.potential(cx, cy))
                .sum()
        })
    }
}

impl Derived for FlowFromPotentialsMap {
    type Value = DVec2;

    fn cache(&self) -> &CellCache<DVec2> {
        &self.cache
    }

    fn compute(&self, x: usize, y: usize) -> DVec2 {
        if self.sources.registry().is_empty() {
            return DVec2::ZERO;
        }
        let (cx, cy) = (x as isize, y as isize);
        let mut sum = DVec2::ZERO;
        let mut scale = 0.0;
        for (dx, dy, unit) in MOORE {
            let p = self.combined_potential(cx + dx, cy + dy);
            sum += unit * p;
            scale += p.abs();
        }
        normalize_or_neutral(sum, scale)
    }
}

impl GridDomain for FlowFromPotentialsMap {
    fn width(&self) -> usize {
        self.domain.width()
    }

    fn height(&self) -> usize {
        self.domain.height()
    }
}

impl ChangeSource for FlowFromPotentialsMap {
    fn notifier(&self) -> Option<&Notifier> {
        Some(self.cache.notifier())
    }
}

impl FlowMap for FlowFromPotentialsMap {
    fn direction(&self, x: usize, y: usize) -> DVec2 {
        self.value_at(x, y)
    }
}

// ---------------------------------------------------------------------------
// Flow from flows
// ---------------------------------------------------------------------------

/// Weighted blend of flow maps: `normalize(Σ weight × direction(x, y))`.
///
/// With exactly one source its vector is passed through untouched, whatever
/// the weight. Opposing sources of equal weight cancel to neutral.
pub struct FlowFromFlowsMap {
    this: Weak<Self>,
    domain: Domain,
    sources: SourceSet<dyn FlowMap>,
    cache: CellCache<DVec2>,
}

impl FlowFromFlowsMap {
    pub fn new(domain: Domain, mode: UpdateMode) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            domain,
            sources: SourceSet::new(),
            cache: CellCache::new(domain, Extend::NONE, mode),
        })
    }

    /// Registers `map` with `weight`, or re-weights it if already registered.
    pub fn add_map(&self, map: Rc<dyn FlowMap>, weight: f64) -> Result<(), FieldError> {
        self.sources.attach(&self.this, self.domain, map, weight)?;
        self.force_update_all();
        Ok(())
    }

    pub fn remove_map<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        let removed = self.sources.detach(&self.this, map);
        if removed {
            self.force_update_all();
        }
        removed
    }

    pub fn set_weight<N: ?Sized>(&self, map: &Rc<N>, weight: f64) -> bool {
        let changed = self.sources.set_weight(map, weight);
        if changed {
            self.force_update_all();
        }
        changed
    }

    pub fn contains_map<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        self.sources.registry().contains(map)
    }

    pub fn source_count(&self) -> usize {
        self.sources.registry().len()
    }

    pub fn weight_of<N: ?Sized>(&self, map: &Rc<N>) -> Option<f64> {
        self.sources.registry().weight_of(map)
    }
}

impl Derived for FlowFromFlowsMap {
    type Value = DVec2;

    fn cache(&self) -> &CellCache<DVec2> {
        &self.cache
    }

    fn compute(&self, x: usize, y: usize) -> DVec2 {
        let registry = self.sources.registry();
        match registry.entries() {
            [] => DVec2::ZERO,
            [only] => only.map.direction(x, y),
            entries => {
                let mut sum = DVec2::ZERO;
                let mut scale = 0.0;
                for e in entries {
                    let d = e.map.direction(x, y);
                    sum += d * e.weight;
                    scale += e.weight.abs() * d.length();
                }
                normalize_or_neutral(sum, scale)
            }
        }
    }
}

impl GridDomain for FlowFromFlowsMap {
    fn width(&self) -> usize {
        self.domain.width()
    }

    fn height(&self) -> usize {
        self.domain.height()
    }
}

impl ChangeSource for FlowFromFlowsMap {
    fn notifier(&self) -> Option<&Notifier> {
        Some(self.cache.notifier())
    }
}

impl FlowMap for FlowFromFlowsMap {
    fn direction(&self, x: usize, y: usize) -> DVec2 {
        self.value_at(x, y)
    }
}

// ---------------------------------------------------------------------------
// Combined flow
// ---------------------------------------------------------------------------

/// Accepts potential and flow maps alike and blends them into one flow.
///
/// All potential maps feed a single inner [`FlowFromPotentialsMap`]. That map
/// takes part in the outer [`FlowFromFlowsMap`] blend with weight `Σ|w|` over
/// its potentials, and only while it has at least one. The inner map already
/// applies each weight's sign.
pub struct CombinedFlowMap {
    potentials: Rc<FlowFromPotentialsMap>,
    flows: Rc<FlowFromFlowsMap>,
}

impl CombinedFlowMap {
    pub fn new(domain: Domain, mode: UpdateMode, edge: EdgePolicy) -> Self {
        Self {
            potentials: FlowFromPotentialsMap::new(domain, mode, edge),
            flows: FlowFromFlowsMap::new(domain, mode),
        }
    }

    /// Registers either kind of map, or re-weights it if already registered.
    pub fn add_map(&self, map: SourceMap, weight: f64) -> Result<(), FieldError> {
        match map {
            SourceMap::Potential(m) => self.add_potential(m, weight),
            SourceMap::Flow(m) => self.add_flow(m, weight),
        }
    }

    pub fn add_potential(&self, map: Rc<dyn PotentialMap>, weight: f64) -> Result<(), FieldError> {
        self.potentials.add_map(map, weight)?;
        self.sync_potential_entry()
    }

    pub fn add_flow(&self, map: Rc<dyn FlowMap>, weight: f64) -> Result<(), FieldError> {
        if self.is_own(&map) {
            tracing::warn!("rejected self-registration of a combined flow map");
            return Err(FieldError::SelfReference);
        }
        self.flows.add_map(map, weight)
    }

    /// Removes a map of either kind. Returns `false` if it was never registered.
    pub fn remove_map<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        if self.potentials.remove_map(map) {
            self.refresh_potential_entry();
            return true;
        }
        !self.is_own(map) && self.flows.remove_map(map)
    }

    /// Re-weights a map of either kind. Returns `false` if it was never registered.
    pub fn set_weight<N: ?Sized>(&self, map: &Rc<N>, weight: f64) -> bool {
        if self.potentials.set_weight(map, weight) {
            self.refresh_potential_entry();
            return true;
        }
        !self.is_own(map) && self.flows.set_weight(map, weight)
    }

    /// Number of user-registered maps of both kinds.
    pub fn source_count(&self) -> usize {
        let inner = usize::from(self.flows.contains_map(&self.potentials));
        self.potentials.source_count() + self.flows.source_count() - inner
    }

    /// Recomputes every dirty cell of both stages. Returns how many were.
    pub fn update_if_dirty_all(&self) -> usize {
        self.potentials.update_if_dirty_all() + self.flows.update_if_dirty_all()
    }

    /// Whether `(x, y)` is stale in either stage.
    pub fn is_dirty(&self, x: usize, y: usize) -> bool {
        self.potentials.is_dirty(x, y) || self.flows.is_dirty(x, y)
    }

    /// Dirty cells across both stages.
    pub fn dirty_count(&self) -> usize {
        self.potentials.dirty_count() + self.flows.dirty_count()
    }

    /// Per-cell recomputations across both stages.
    pub fn recompute_count(&self) -> u64 {
        self.potentials.recompute_count() + self.flows.recompute_count()
    }

    pub fn mark_all_dirty(&self) {
        self.potentials.mark_all_dirty();
        self.flows.mark_all_dirty();
    }

    // Adds the potentials stage to the blend on its first potential.
    fn sync_potential_entry(&self) -> Result<(), FieldError> {
        if self.flows.contains_map(&self.potentials) {
            self.refresh_potential_entry();
            return Ok(());
        }
        let stage: Rc<dyn FlowMap> = self.potentials.clone();
        self.flows.add_map(stage, self.potentials.total_abs_weight())
    }

    // Re-weights the potentials stage, or drops it once it has no sources.
    fn refresh_potential_entry(&self) {
        if self.potentials.source_count() == 0 {
            self.flows.remove_map(&self.potentials);
        } else {
            self.flows
                .set_weight(&self.potentials, self.potentials.total_abs_weight());
        }
    }

    fn is_own<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        same_map(map, &self.potentials)
            || same_map(map, &self.flows)
            || Rc::as_ptr(map) as *const () == self as *const Self as *const ()
    }
}

impl GridDomain for CombinedFlowMap {
    fn width(&self) -> usize {
        self.flows.width()
    }

    fn height(&self) -> usize {
        self.flows.height()
    }
}

impl ChangeSource for CombinedFlowMap {
    fn notifier(&self) -> Option<&Notifier> {
        self.flows.notifier()
    }
}

impl FlowMap for CombinedFlowMap {
    fn direction(&self, x: usize, y: usize) -> DVec2 {
        self.flows.direction(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ConstantFlow, GridPotential};

    const TOL: f64 = 1e-10;

    fn domain(w: usize, h: usize) -> Domain {
        Domain::new(w, h).unwrap()
    }

    fn assert_vec(got: DVec2, want: DVec2) {
        assert!(
            (got - want).length() < TOL,
            "expected {want:?}, got {got:?}"
        );
    }

    fn ramp_down(d: Domain) -> Rc<GridPotential> {
        GridPotential::from_fn(d, UpdateMode::Lazy, |_, y| y as f64)
    }

    fn constant_flow(d: Domain, v: DVec2) -> Rc<ConstantFlow> {
        Rc::new(ConstantFlow::new(d, v))
    }

    // -- SummedPotentialMap --

    #[test]
    fn summed_potential_is_zero_without_sources() {
        let sum = SummedPotentialMap::new(domain(3, 3), UpdateMode::Lazy);
        assert!(domain(3, 3).cells().all(|(x, y)| sum.potential(x, y) == 0.0));
    }

    #[test]
    fn summed_potential_weights_each_source() {
        let d = domain(2, 2);
        let sum = SummedPotentialMap::new(d, UpdateMode::Lazy);
        let a = GridPotential::from_fn(d, UpdateMode::Lazy, |x, _| x as f64);
        let b = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 1.0);
        sum.add_map(a.clone(), 2.0).unwrap();
        sum.add_map(b.clone(), -0.5).unwrap();
        assert!((sum.potential(1, 0) - 1.5).abs() < TOL);
        assert!((sum.potential(0, 1) + 0.5).abs() < TOL);
    }

    #[test]
    fn re_adding_a_source_reweights_it() {
        let d = domain(2, 2);
        let sum = SummedPotentialMap::new(d, UpdateMode::Lazy);
        let a = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 1.0);
        sum.add_map(a.clone(), 1.0).unwrap();
        sum.add_map(a.clone(), 4.0).unwrap();
        assert_eq!(sum.source_count(), 1);
        assert_eq!(sum.weight_of(&a), Some(4.0));
        assert!((sum.potential(0, 0) - 4.0).abs() < TOL);
    }

    #[test]
    fn set_weight_and_remove_report_missing_maps() {
        let d = domain(2, 2);
        let sum = SummedPotentialMap::new(d, UpdateMode::Lazy);
        let stranger = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 1.0);
        assert!(!sum.set_weight(&stranger, 2.0));
        assert!(!sum.remove_map(&stranger));
    }

    #[test]
    fn domain_mismatch_leaves_registry_unchanged() {
        let sum = SummedPotentialMap::new(domain(3, 3), UpdateMode::Lazy);
        let wrong = GridPotential::from_fn(domain(4, 3), UpdateMode::Lazy, |_, _| 1.0);
        let err = sum.add_map(wrong.clone(), 1.0).unwrap_err();
        assert!(matches!(err, FieldError::InvalidDomain { got_w: 4, .. }));
        assert_eq!(sum.source_count(), 0);
        assert_eq!(wrong.notifier().map(Notifier::listener_count), Some(0));
    }

    #[test]
    fn derived_map_cannot_register_itself() {
        let sum = SummedPotentialMap::new(domain(2, 2), UpdateMode::Lazy);
        let as_source: Rc<dyn PotentialMap> = sum.clone();
        assert_eq!(sum.add_map(as_source, 1.0), Err(FieldError::SelfReference));
        assert_eq!(sum.source_count(), 0);
    }

    #[test]
    fn changing_sources_recomputes_every_cell() {
        let d = domain(3, 2);
        let sum = SummedPotentialMap::new(d, UpdateMode::Lazy);
        let a = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 1.0);
        sum.add_map(a.clone(), 1.0).unwrap();
        assert_eq!(sum.recompute_count(), 6);
        assert_eq!(sum.dirty_count(), 0);
        sum.set_weight(&a, 2.0);
        assert_eq!(sum.recompute_count(), 12);
        sum.remove_map(&a);
        assert_eq!(sum.recompute_count(), 18);
    }

    #[test]
    fn source_edit_marks_sum_dirty_then_read_refreshes() {
        let d = domain(3, 3);
        let sum = SummedPotentialMap::new(d, UpdateMode::Lazy);
        let a = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 0.0);
        sum.add_map(a.clone(), 3.0).unwrap();
        a.set(1, 2, 1.0);
        assert!(sum.is_dirty(1, 2));
        assert_eq!(sum.dirty_count(), 1);
        assert!((sum.potential(1, 2) - 3.0).abs() < TOL);
        assert!(!sum.is_dirty(1, 2));
    }

    #[test]
    fn removed_source_no_longer_notifies() {
        let d = domain(2, 2);
        let sum = SummedPotentialMap::new(d, UpdateMode::Lazy);
        let a = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 0.0);
        sum.add_map(a.clone(), 1.0).unwrap();
        sum.remove_map(&a);
        a.set(0, 0, 5.0);
        assert_eq!(sum.dirty_count(), 0);
    }

    // -- FlowFromPotentialsMap --

    #[test]
    fn single_raised_neighbour_pulls_flow_toward_it() {
        let d = domain(3, 3);
        let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let p = GridPotential::from_fn(d, UpdateMode::Lazy, |x, y| {
            if (x, y) == (1, 0) {
                1.0
            } else {
                0.0
            }
        });
        flow.add_map(p, 1.0).unwrap();
        assert_vec(flow.direction(1, 1), DVec2::new(0.0, -1.0));
    }

    #[test]
    fn diagonal_neighbour_gives_diagonal_flow() {
        let d = domain(3, 3);
        let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, EdgePolicy::Constant(0.0));
        let p = GridPotential::from_fn(d, UpdateMode::Lazy, |x, y| {
            if (x, y) == (2, 2) {
                1.0
            } else {
                0.0
            }
        });
        flow.add_map(p, 1.0).unwrap();
        assert_vec(flow.direction(1, 1), DVec2::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2));
    }

    #[test]
    fn symmetric_potential_cancels_to_neutral() {
        let d = domain(5, 5);
        let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let bowl = GridPotential::from_fn(d, UpdateMode::Lazy, |x, y| {
            let (dx, dy) = (x as f64 - 2.0, y as f64 - 2.0);
            dx * dx + dy * dy
        });
        flow.add_map(bowl, 1.0).unwrap();
        assert_eq!(flow.direction(2, 2), DVec2::ZERO);
    }

    #[test]
    fn flat_potential_is_neutral_everywhere() {
        let d = domain(4, 3);
        let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        flow.add_map(GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 7.0), 1.0)
            .unwrap();
        assert!(d.cells().all(|(x, y)| flow.direction(x, y) == DVec2::ZERO));
    }

    #[test]
    fn ramp_flows_downhill_in_y_even_at_edges() {
        let d = domain(4, 4);
        for edge in [EdgePolicy::Clamp, EdgePolicy::Mirror] {
            let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, edge);
            flow.add_map(ramp_down(d), 1.0).unwrap();
            for (x, y) in d.cells() {
                let dir = flow.direction(x, y);
                if edge == EdgePolicy::Mirror && (y == 0 || y == 3) {
                    // mirrored rows above/below equal the row inside
                    assert!(dir.x.abs() < TOL, "{edge:?} ({x},{y}) gave {dir:?}");
                } else {
                    assert_vec(dir, DVec2::new(0.0, 1.0));
                }
            }
        }
    }

    #[test]
    fn constant_edge_stands_in_for_outside_potential() {
        let d = domain(3, 3);
        let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, EdgePolicy::Constant(10.0));
        flow.add_map(GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 0.0), 1.0)
            .unwrap();
        assert_vec(flow.direction(1, 0), DVec2::new(0.0, -1.0));
        assert_vec(flow.direction(0, 1), DVec2::new(-1.0, 0.0));
        assert_eq!(flow.direction(1, 1), DVec2::ZERO);
    }

    #[test]
    fn potential_change_dirties_the_neighbourhood() {
        let d = domain(5, 5);
        let flow = FlowFromPotentialsMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let p = GridPotential::from_fn(d, UpdateMode::Lazy, |_, _| 0.0);
        flow.add_map(p.clone(), 1.0).unwrap();
        p.set(2, 2, 1.0);
        assert_eq!(flow.dirty_count(), 9);
        assert_vec(flow.direction(2, 1), DVec2::new(0.0, 1.0));
        assert_vec(flow.direction(1, 2), DVec2::new(1.0, 0.0));
    }

    // -- FlowFromFlowsMap --

    #[test]
    fn flows_are_neutral_without_sources() {
        let flows = FlowFromFlowsMap::new(domain(2, 2), UpdateMode::Lazy);
        assert_eq!(flows.direction(1, 1), DVec2::ZERO);
    }

    #[test]
    fn single_flow_passes_through_regardless_of_weight() {
        let d = domain(2, 2);
        let v = DVec2::new(0.6, 0.8);
        for weight in [0.1, 1.0, -3.0] {
            let flows = FlowFromFlowsMap::new(d, UpdateMode::Lazy);
            flows.add_map(constant_flow(d, v), weight).unwrap();
            assert_eq!(flows.direction(0, 1), v);
        }
    }

    #[test]
    fn opposite_flows_of_equal_weight_cancel() {
        let d = domain(3, 3);
        let flows = FlowFromFlowsMap::new(d, UpdateMode::Lazy);
        flows.add_map(constant_flow(d, DVec2::X), 1.5).unwrap();
        flows.add_map(constant_flow(d, DVec2::NEG_X), 1.5).unwrap();
        assert!(d.cells().all(|(x, y)| flows.direction(x, y) == DVec2::ZERO));
    }

    #[test]
    fn equal_weights_blend_to_the_bisector() {
        let d = domain(1, 1);
        let flows = FlowFromFlowsMap::new(d, UpdateMode::Lazy);
        flows.add_map(constant_flow(d, DVec2::X), 1.0).unwrap();
        flows.add_map(constant_flow(d, DVec2::Y), 1.0).unwrap();
        assert_vec(flows.direction(0, 0), DVec2::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2));
    }

    // -- CombinedFlowMap --

    #[test]
    fn combined_flow_mixes_kinds_and_unwinds() {
        let d = domain(3, 3);
        let combined = CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let down_a = ramp_down(d);
        let down_b = ramp_down(d);
        let up = constant_flow(d, DVec2::NEG_Y);
        let down = DVec2::Y;

        combined.add_potential(down_a.clone(), 1.0).unwrap();
        assert_vec(combined.direction(1, 1), down);
        combined.add_flow(up.clone(), 2.1).unwrap();
        assert_vec(combined.direction(1, 1), -down);
        combined.add_potential(down_b.clone(), 2.0).unwrap();
        assert_vec(combined.direction(1, 1), down);
        assert_eq!(combined.source_count(), 3);

        assert!(combined.remove_map(&down_b));
        assert_vec(combined.direction(1, 1), -down);
        assert!(combined.remove_map(&up));
        assert_vec(combined.direction(1, 1), down);
        assert!(combined.remove_map(&down_a));
        assert_eq!(combined.direction(1, 1), DVec2::ZERO);
        assert_eq!(combined.source_count(), 0);
    }

    #[test]
    fn combined_reweight_reaches_the_potential_stage() {
        let d = domain(3, 3);
        let combined = CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let down = ramp_down(d);
        let up = constant_flow(d, DVec2::NEG_Y);
        combined.add_potential(down.clone(), 1.0).unwrap();
        combined.add_flow(up.clone(), 2.0).unwrap();
        assert_vec(combined.direction(1, 1), DVec2::NEG_Y);
        assert!(combined.set_weight(&down, 3.0));
        assert_vec(combined.direction(1, 1), DVec2::Y);
        assert!(!combined.set_weight(&ramp_down(d), 1.0));
    }

    #[test]
    fn combined_keeps_repulsive_potentials_repulsive() {
        let d = domain(3, 3);
        let combined = CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let down = ramp_down(d);
        combined.add_potential(down.clone(), -1.0).unwrap();
        assert_vec(combined.direction(1, 1), DVec2::NEG_Y);

        combined.add_flow(constant_flow(d, DVec2::X), 0.5).unwrap();
        assert_vec(
            combined.direction(1, 1),
            DVec2::new(0.5, -1.0).normalize(),
        );
    }

    #[test]
    fn combined_zero_sum_potential_weights_still_steer() {
        let d = domain(3, 3);
        let combined = CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let down = ramp_down(d);
        let east = GridPotential::from_fn(d, UpdateMode::Lazy, |x, _| x as f64);
        combined.add_potential(down, 1.0).unwrap();
        combined.add_potential(east, -1.0).unwrap();
        let stage = DVec2::new(-1.0, 1.0).normalize();
        assert_vec(combined.direction(1, 1), stage);

        combined.add_flow(constant_flow(d, DVec2::X), 0.01).unwrap();
        assert_vec(
            combined.direction(1, 1),
            (stage * 2.0 + DVec2::X * 0.01).normalize(),
        );
    }

    #[test]
    fn combined_observability_covers_both_stages() {
        let d = domain(3, 3);
        let combined = CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let down = ramp_down(d);
        combined.add_potential(down.clone(), 1.0).unwrap();
        combined.update_if_dirty_all();
        assert_eq!(combined.dirty_count(), 0);
        let before = combined.recompute_count();

        down.set(0, 0, 5.0);
        assert!(combined.is_dirty(1, 1));
        assert_eq!(combined.dirty_count(), 4 + 4);

        assert_eq!(combined.update_if_dirty_all(), 8);
        assert_eq!(combined.recompute_count() - before, 8);

        combined.mark_all_dirty();
        assert_eq!(combined.dirty_count(), 18);
    }

    #[test]
    fn combined_rejects_itself_as_a_flow() {
        let d = domain(2, 2);
        let combined = Rc::new(CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp));
        let me: Rc<dyn FlowMap> = combined.clone();
        assert_eq!(combined.add_flow(me, 1.0), Err(FieldError::SelfReference));
        assert_eq!(combined.source_count(), 0);
    }

    #[test]
    fn combined_add_map_dispatches_on_kind() {
        let d = domain(3, 3);
        let combined = CombinedFlowMap::new(d, UpdateMode::Lazy, EdgePolicy::Clamp);
        let p: Rc<dyn PotentialMap> = ramp_down(d);
        let f: Rc<dyn FlowMap> = constant_flow(d, DVec2::X);
        combined.add_map(SourceMap::from(p), 1.0).unwrap();
        combined.add_map(SourceMap::from(f), 1.0).unwrap();
        assert_vec(combined.direction(1, 1), DVec2::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn one_source_passes_through_any_weight(
                angle in -std::f64::consts::PI..std::f64::consts::PI,
                weight in prop_oneof![-100.0_f64..-0.01, 0.01_f64..100.0],
            ) {
                let d = domain(3, 2);
                let v = DVec2::from_angle(angle);
                let flows = FlowFromFlowsMap::new(d, UpdateMode::Lazy);
                flows.add_map(constant_flow(d, v), weight).unwrap();
                for (x, y) in d.cells() {
                    prop_assert_eq!(flows.direction(x, y), v);
                }
            }

            #[test]
            fn blended_flow_is_unit_or_neutral(
                a in -std::f64::consts::PI..std::f64::consts::PI,
                b in -std::f64::consts::PI..std::f64::consts::PI,
                wa in 0.0_f64..10.0,
                wb in 0.0_f64..10.0,
            ) {
                let d = domain(1, 1);
                let flows = FlowFromFlowsMap::new(d, UpdateMode::Lazy);
                flows.add_map(constant_flow(d, DVec2::from_angle(a)), wa).unwrap();
                flows.add_map(constant_flow(d, DVec2::from_angle(b)), wb).unwrap();
                let out = flows.direction(0, 0);
                prop_assert!(out == DVec2::ZERO || (out.length() - 1.0).abs() < 1e-9);
            }
        }
    }
}
