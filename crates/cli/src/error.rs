//! Errors surfaced by the `flowfield` binary and their process exit codes.
//!
//! | code | meaning |
//! |------|---------|
//! | 2    | clap rejected the arguments |
//! | 10   | the composition could not be built (dimensions, kernel, registration) |
//! | 11   | `--output` could not be written |
//! | 12   | a JSON argument was malformed or did not fit its schema |
//! | 13   | the report could not be serialized |

use flowfield_core::FieldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Field(FieldError),
    #[error("cannot write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Input(String),
    #[error("cannot serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Field(_) => 10,
            CliError::Io(_) => 11,
            CliError::Input(_) => 12,
            CliError::Serialization(_) => 13,
        }
    }
}

// A config object that parsed as JSON but not as the expected shape is bad
// user input, not a failed composition.
impl From<FieldError> for CliError {
    fn from(e: FieldError) -> Self {
        match e {
            FieldError::InvalidConfig(msg) => CliError::Input(msg),
            other => CliError::Field(other),
        }
    }
}
