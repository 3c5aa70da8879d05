//! Error types for the reconciler.

use crate::spec::ResourceKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("failed to determine host identity: {0}")]
    HostProbe(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("command `{command}` exited with status {code}: {output}")]
    Command {
        command: String,
        code: i32,
        output: String,
    },

    #[error("command `{0}` timed out")]
    CommandTimeout(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("handler received a spec of the wrong kind, expected {expected}")]
    KindMismatch { expected: ResourceKind },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ConvergeError>,
    },
}

impl ConvergeError {
    /// Wrap this error with a human-readable location, e.g. the interface
    /// or device the failure belongs to.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
