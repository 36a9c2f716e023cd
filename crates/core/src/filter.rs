//! Filtered potential maps: a convolution kernel run over one source.
//!
//! A [`ConvolvingPotentialMap`] caches `kernel ⊛ source` per cell. Its dirty
//! extend equals the kernel radius, so one source cell change invalidates
//! exactly the filtered cells whose stencil covers it.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::dirty::{CellCache, Derived};
use crate::domain::{Domain, EdgePolicy, GridDomain};
use crate::kernel::Kernel;
use crate::map::{ChangeSource, PotentialMap};
use crate::notify::{Notifiable, Notifier, UpdateMode};

/// When a filter re-applies its kernel after the source changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Recompute the affected cells as soon as the source reports a change.
    #[default]
    Automatic,
    /// Only mark cells dirty; the caller batches edits and then calls
    /// `update_if_dirty_all`. Reads of a dirty cell still refresh it.
    Manual,
}

impl FilterMode {
    fn update_mode(self) -> UpdateMode {
        match self {
            FilterMode::Automatic => UpdateMode::Eager,
            FilterMode::Manual => UpdateMode::Lazy,
        }
    }
}

/// A potential map holding `Σ kernel(dx, dy) × source(x + dx, y + dy)`.
pub struct ConvolvingPotentialMap {
    source: Rc<dyn PotentialMap>,
    kernel: Kernel,
    edge: EdgePolicy,
    mode: Cell<FilterMode>,
    cache: CellCache<f64>,
}

impl ConvolvingPotentialMap {
    /// Wraps `source` and subscribes to it if it announces changes.
    ///
    /// In automatic mode the whole grid is filtered immediately; in manual
    /// mode every cell starts dirty.
    pub fn new(
        source: Rc<dyn PotentialMap>,
        kernel: Kernel,
        edge: EdgePolicy,
        mode: FilterMode,
    ) -> Rc<Self> {
        let domain = source.domain();
        let map = Rc::new(Self {
            cache: CellCache::new(domain, kernel.extend(), mode.update_mode()),
            source,
            kernel,
            edge,
            mode: Cell::new(mode),
        });
        if let Some(notifier) = map.source.notifier() {
            let this: Weak<Self> = Rc::downgrade(&map);
            let listener: Weak<dyn Notifiable> = this;
            notifier.subscribe(listener);
        }
        let (rx, ry) = map.kernel.radius();
        tracing::debug!(
            width = domain.width(),
            height = domain.height(),
            rx,
            ry,
            ?mode,
            "filter created"
        );
        if mode == FilterMode::Automatic {
            map.force_update_all();
        }
        map
    }

    pub fn source(&self) -> &Rc<dyn PotentialMap> {
        &self.source
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.mode.get()
    }

    /// Switches between automatic and manual refiltering.
    ///
    /// Switching to automatic first brings every dirty cell up to date.
    pub fn set_filter_mode(&self, mode: FilterMode) {
        self.mode.set(mode);
        self.cache.notifier().set_mode(mode.update_mode());
        if mode == FilterMode::Automatic {
            self.update_if_dirty_all();
        }
    }

    fn source_at(&self, x: isize, y: isize) -> f64 {
        self.edge
            .sample(self.cache.domain(), x, y, |cx, cy| self.source.potential(cx, cy))
    }
}

impl Derived for ConvolvingPotentialMap {
    type Value = f64;

    fn cache(&self) -> &CellCache<f64> {
        &self.cache
    }

    fn compute(&self, x: usize, y: usize) -> f64 {
        self.kernel.apply(x, y, |sx, sy| self.source_at(sx, sy))
    }

    fn incoming_mode(&self) -> Option<UpdateMode> {
        Some(self.mode.get().update_mode())
    }
}

impl GridDomain for ConvolvingPotentialMap {
    fn width(&self) -> usize {
        self.cache.domain().width()
    }

    fn height(&self) -> usize {
        self.cache.domain().height()
    }

    fn domain(&self) -> Domain {
        self.cache.domain()
    }
}

impl ChangeSource for ConvolvingPotentialMap {
    fn notifier(&self) -> Option<&Notifier> {
        Some(self.cache.notifier())
    }
}

impl PotentialMap for ConvolvingPotentialMap {
    fn potential(&self, x: usize, y: usize) -> f64 {
        self.value_at(x, y)
    }
}
