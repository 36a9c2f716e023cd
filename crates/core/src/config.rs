//! Construction-time configuration for compositions and filters.
//!
//! Every config type deserializes from a JSON object in which missing keys
//! take their defaults. A present but malformed value is an error rather than
//! silently replaced.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Domain, EdgePolicy};
use crate::error::FieldError;
use crate::filter::{ConvolvingPotentialMap, FilterMode};
use crate::kernel::Kernel;
use crate::map::PotentialMap;
use crate::notify::UpdateMode;

/// Default composition side length.
const DEFAULT_SIDE: usize = 32;

fn parse<T: DeserializeOwned>(what: &str, value: &Value) -> Result<T, FieldError> {
    serde_json::from_value(value.clone())
        .map_err(|e| FieldError::InvalidConfig(format!("{what}: {e}")))
}

/// Which convolution kernel a filter applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelSpec {
    Identity,
    Box { radius: usize },
    Gaussian { radius: usize, sigma: f64 },
}

impl Default for KernelSpec {
    fn default() -> Self {
        KernelSpec::Gaussian {
            radius: 1,
            sigma: 1.0,
        }
    }
}

impl KernelSpec {
    pub fn from_json(value: &Value) -> Result<Self, FieldError> {
        parse("kernel", value)
    }

    /// Builds the kernel, validating radius and sigma.
    pub fn build(&self) -> Result<Kernel, FieldError> {
        match *self {
            KernelSpec::Identity => Ok(Kernel::identity()),
            KernelSpec::Box { radius } => Kernel::box_blur(radius),
            KernelSpec::Gaussian { radius, sigma } => Kernel::gaussian(radius, sigma),
        }
    }
}

/// Kernel, edge handling and refilter mode of a [`ConvolvingPotentialMap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kernel: KernelSpec,
    pub edge: EdgePolicy,
    pub mode: FilterMode,
}

impl FilterConfig {
    pub fn from_json(value: &Value) -> Result<Self, FieldError> {
        let config: Self = parse("filter", value)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the kernel can be built.
    pub fn validate(&self) -> Result<(), FieldError> {
        self.kernel.build().map(|_| ())
    }

    /// Wraps `source` in a filter configured by `self`.
    pub fn build(&self, source: Rc<dyn PotentialMap>) -> Result<Rc<ConvolvingPotentialMap>, FieldError> {
        let kernel = self.kernel.build()?;
        Ok(ConvolvingPotentialMap::new(source, kernel, self.edge, self.mode))
    }
}

/// Domain, update mode and edge handling shared by one composition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    pub width: usize,
    pub height: usize,
    pub mode: UpdateMode,
    pub edge: EdgePolicy,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_SIDE,
            height: DEFAULT_SIDE,
            mode: UpdateMode::default(),
            edge: EdgePolicy::default(),
        }
    }
}

impl CompositionConfig {
    pub fn from_json(value: &Value) -> Result<Self, FieldError> {
        let config: Self = parse("composition", value)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the dimensions are non-zero and that `width * height`
    /// does not overflow.
    pub fn validate(&self) -> Result<(), FieldError> {
        self.domain().map(|_| ())
    }

    pub fn domain(&self) -> Result<Domain, FieldError> {
        Domain::new(self.width, self.height)
    }
}
