#![deny(unsafe_code)]
//! Incrementally updated potential and flow maps over a fixed 2D grid.
//!
//! Raw sources ([`GridPotential`], [`GridFlow`], constants, plain grids) feed
//! derived maps ([`SummedPotentialMap`], [`FlowFromPotentialsMap`],
//! [`FlowFromFlowsMap`], [`CombinedFlowMap`], [`ConvolvingPotentialMap`]).
//! Derived maps cache one value per cell and track staleness with a dirty
//! bitmap: sources push invalidations through a [`Notifier`], reads pull
//! recomputation of dirty cells. [`constrain_turn`] turns a flow direction
//! into a heading change bounded by a maximum [`Rotation`] per step.
//!
//! Everything here is single-threaded (`Rc`, `RefCell`) and synchronous.

pub mod combine;
pub mod config;
pub mod coord;
pub mod dirty;
pub mod domain;
pub mod error;
pub mod field;
pub mod filter;
pub mod kernel;
pub mod map;
pub mod notify;
pub mod pattern;
pub mod rotation;
pub mod source;
pub mod steering;

pub use combine::{CombinedFlowMap, FlowFromFlowsMap, FlowFromPotentialsMap, SummedPotentialMap};
pub use config::{CompositionConfig, FilterConfig, KernelSpec};
pub use coord::{CoordCache, GridCoord};
pub use dirty::{CellCache, Derived, DirtyMap, Extend};
pub use domain::{ensure_same_domain, Domain, EdgePolicy, GridDomain};
pub use error::FieldError;
pub use field::Grid;
pub use filter::{ConvolvingPotentialMap, FilterMode};
pub use kernel::Kernel;
pub use map::{same_map, ChangeSource, FlowMap, PotentialMap, SourceMap, WeightedEntry, WeightedRegistry};
pub use notify::{Notifiable, Notifier, UpdateMode};
pub use pattern::PotentialPattern;
pub use rotation::Rotation;
pub use source::{ConstantFlow, ConstantPotential, GridFlow, GridPotential};
pub use steering::{constrain_turn, TurnLimiter};
