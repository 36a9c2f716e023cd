//! Error types for the flowfield core.

use thiserror::Error;

/// Errors produced when building or composing maps.
///
/// Reads and dirty-tracking never fail for in-domain cells, so the only
/// error paths are construction and registration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldError {
    /// Width or height was zero, or `width * height` overflowed.
    #[error("invalid dimensions: width and height must be non-zero")]
    InvalidDimensions,

    /// A map with a different grid domain was offered to a composition.
    #[error(
        "invalid domain: composition is {expected_w}x{expected_h}, offered map is {got_w}x{got_h}"
    )]
    InvalidDomain {
        expected_w: usize,
        expected_h: usize,
        got_w: usize,
        got_h: usize,
    },

    /// A derived map was asked to register itself as one of its own sources.
    #[error("a derived map cannot be registered as its own source")]
    SelfReference,

    /// A raw buffer did not hold `width * height` values.
    #[error("data length mismatch: expected {expected} values, got {got}")]
    DataLength { expected: usize, got: usize },

    /// A convolution kernel had an invalid shape or weights.
    #[error("invalid kernel: {0}")]
    InvalidKernel(String),

    /// A JSON configuration object could not be interpreted.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
