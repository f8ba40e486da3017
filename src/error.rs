//! Error handling for the bridge
//!
//! Control operations return [`Result`] internally and are flattened to
//! `bool`/status values at the [`PipelineManager`](crate::pipeline::PipelineManager)
//! boundary. Callback-path errors never leave the bridge; they are logged.

use thiserror::Error;

use crate::engine::{ElementKind, EngineStatus};
use crate::foreign::ForeignException;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Unknown context or element, or a malformed descriptor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine could not produce a handle for the element
    #[error("Cannot resolve {kind} '{name}': {reason}")]
    Resolution {
        name: String,
        kind: ElementKind,
        reason: String,
    },

    /// Descriptor or data marshaling failed
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A control operation returned a non-success status
    #[error("Engine error in {op}: {status}")]
    Engine {
        op: &'static str,
        status: EngineStatus,
    },

    /// The foreign runtime raised during a call
    #[error("Foreign call failed: {0}")]
    ForeignCall(#[from] ForeignException),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn engine(op: &'static str, status: EngineStatus) -> Self {
        BridgeError::Engine { op, status }
    }

    pub fn resolution(name: &str, kind: ElementKind, reason: impl Into<String>) -> Self {
        BridgeError::Resolution {
            name: name.to_string(),
            kind,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
