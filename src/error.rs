//! Error taxonomy for the load pipeline.
//!
//! Hard errors (`TransportError`, `ParseError`, `MappingError`, `StoreError`)
//! short-circuit a load and surface as exactly one failure notification.
//! Soft per-field mapping faults never appear here — they accumulate on the
//! mapped instance (see [`crate::mapping::FieldFault`]) and the load still
//! succeeds. Reconciliation faults are logged and counted, never raised.

use crate::mapping::MappingError;
use crate::parser::ParseError;
use crate::store::StoreError;

/// Opaque failure from the transport collaborator (DNS, connect, timeout,
/// protocol). The pipeline never inspects it beyond reporting.
#[derive(thiserror::Error, Debug, Clone)]
#[error("transport failed: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

/// Why a load finished in failure. Carried by the failure notification.
#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    /// `send()` was called while the loader was already in flight, or on a
    /// loader that already reached a terminal state. Loaders are one-shot.
    #[error("loader already sent")]
    AlreadyInFlight,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The exchange completed but the server answered with a non-2xx status.
    #[error("request failed with HTTP status {0}")]
    Status(u16),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience result type.
pub type LoaderResult<T> = Result<T, LoaderError>;
