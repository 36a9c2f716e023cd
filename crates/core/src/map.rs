//! Potential and flow map contracts, and the weighted source registry
//! derived maps are built on.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::DVec2;

use crate::domain::{ensure_same_domain, Domain, GridDomain};
use crate::error::FieldError;
use crate::notify::{Notifiable, Notifier};

/// A map that may announce cell changes.
///
/// Static maps keep the default `None`. Maps whose values change over time
/// return the notifier derived maps subscribe to when they register them.
pub trait ChangeSource: GridDomain {
    fn notifier(&self) -> Option<&Notifier> {
        None
    }
}

/// Scalar "attractiveness" (or cost) per cell.
pub trait PotentialMap: ChangeSource {
    fn potential(&self, x: usize, y: usize) -> f64;
}

/// Desired travel direction per cell: a unit vector, or [`DVec2::ZERO`]
/// when there is no preference.
pub trait FlowMap: ChangeSource {
    fn direction(&self, x: usize, y: usize) -> DVec2;
}

/// Either kind of source, for compositions that accept both.
#[derive(Clone)]
pub enum SourceMap {
    Potential(Rc<dyn PotentialMap>),
    Flow(Rc<dyn FlowMap>),
}

impl SourceMap {
    /// Grid domain of the wrapped map.
    pub fn domain(&self) -> Domain {
        match self {
            SourceMap::Potential(m) => m.domain(),
            SourceMap::Flow(m) => m.domain(),
        }
    }
}

impl From<Rc<dyn PotentialMap>> for SourceMap {
    fn from(map: Rc<dyn PotentialMap>) -> Self {
        SourceMap::Potential(map)
    }
}

impl From<Rc<dyn FlowMap>> for SourceMap {
    fn from(map: Rc<dyn FlowMap>) -> Self {
        SourceMap::Flow(map)
    }
}

/// Whether two handles point at the same map object, whatever their static types.
pub fn same_map<A: ?Sized, B: ?Sized>(a: &Rc<A>, b: &Rc<B>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// One registered source and its weight.
pub struct WeightedEntry<M: ?Sized> {
    pub map: Rc<M>,
    pub weight: f64,
}

/// Sources keyed by map identity, in registration order.
///
/// Weight is not part of the key: offering an already registered map again
/// re-weights it instead of adding a second entry.
pub struct WeightedRegistry<M: ?Sized> {
    entries: Vec<WeightedEntry<M>>,
}

impl<M: ?Sized> Default for WeightedRegistry<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<M: ?Sized> WeightedRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[WeightedEntry<M>] {
        &self.entries
    }

    pub fn contains<N: ?Sized>(&self, map: &Rc<N>) -> bool {
        self.position(map).is_some()
    }

    pub fn weight_of<N: ?Sized>(&self, map: &Rc<N>) -> Option<f64> {
        self.position(map).map(|i| self.entries[i].weight)
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Sum of the magnitudes of all weights.
    pub fn total_abs_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight.abs()).sum()
    }

    /// Adds `map`, or re-weights it if already present. Returns `true` when
    /// a new entry was created.
    pub fn upsert(&mut self, map: Rc<M>, weight: f64) -> bool {
        match self.position(&map) {
            Some(i) => {
                self.entries[i].weight = weight;
                false
            }
            None => {
                self.entries.push(WeightedEntry { map, weight });
                true
            }
        }
    }

    /// Re-weights an existing entry. Returns `false` if `map` is not registered.
    pub fn set_weight<N: ?Sized>(&mut self, map: &Rc<N>, weight: f64) -> bool {
        match self.position(map) {
            Some(i) => {
                self.entries[i].weight = weight;
                true
            }
            None => false,
        }
    }

    /// Removes and returns the entry for `map`.
    pub fn remove<N: ?Sized>(&mut self, map: &Rc<N>) -> Option<WeightedEntry<M>> {
        self.position(map).map(|i| self.entries.remove(i))
    }

    fn position<N: ?Sized>(&self, map: &Rc<N>) -> Option<usize> {
        self.entries.iter().position(|e| same_map(&e.map, map))
    }
}

/// The registry of a derived map together with the bookkeeping every
/// registration needs: domain check, self-reference guard, and subscribing
/// the owner to sources that announce changes.
pub(crate) struct SourceSet<M: ?Sized> {
    registry: RefCell<WeightedRegistry<M>>,
}

impl<M: ?Sized + ChangeSource> SourceSet<M> {
    pub(crate) fn new() -> Self {
        Self {
            registry: RefCell::new(WeightedRegistry::new()),
        }
    }

    pub(crate) fn registry(&self) -> std::cell::Ref<'_, WeightedRegistry<M>> {
        self.registry.borrow()
    }

    /// Registers or re-weights `map` on behalf of `owner`.
    ///
    /// On error the registry is left unchanged.
    pub(crate) fn attach<L>(
        &self,
        owner: &Weak<L>,
        domain: Domain,
        map: Rc<M>,
        weight: f64,
    ) -> Result<bool, FieldError>
    where
        L: Notifiable + 'static,
    {
        debug_assert!(weight.is_finite(), "source weight must be finite, got {weight}");
        if owner.as_ptr() as *const () == Rc::as_ptr(&map) as *const () {
            tracing::warn!("rejected self-registration of a derived map");
            return Err(FieldError::SelfReference);
        }
        ensure_same_domain(domain, map.domain())?;

        let added = self.registry.borrow_mut().upsert(Rc::clone(&map), weight);
        if added {
            if let Some(notifier) = map.notifier() {
                let listener: Weak<dyn Notifiable> = owner.clone();
                notifier.subscribe(listener);
            }
        }
        tracing::debug!(
            weight,
            added,
            sources = self.registry.borrow().len(),
            "source registered"
        );
        Ok(added)
    }

    /// Removes `map` and unsubscribes `owner` from it.
    pub(crate) fn detach<L, N>(&self, owner: &Weak<L>, map: &Rc<N>) -> bool
    where
        L: Notifiable + 'static,
        N: ?Sized,
    {
        let removed = self.registry.borrow_mut().remove(map);
        match removed {
            Some(entry) => {
                if let Some(notifier) = entry.map.notifier() {
                    let listener: Weak<dyn Notifiable> = owner.clone();
                    notifier.unsubscribe(&listener);
                }
                tracing::debug!(sources = self.registry.borrow().len(), "source removed");
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_weight<N: ?Sized>(&self, map: &Rc<N>, weight: f64) -> bool {
        debug_assert!(weight.is_finite(), "source weight must be finite, got {weight}");
        let changed = self.registry.borrow_mut().set_weight(map, weight);
        if changed {
            tracing::debug!(weight, "source re-weighted");
        }
        changed
    }
}
