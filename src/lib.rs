//! restmap — client-side REST object mapping.
//!
//! One [`loader::ObjectLoader`] per logical request: it dispatches an
//! asynchronous HTTP exchange, parses the response body by content type
//! into a neutral node tree, maps the tree into domain instances through a
//! declarative [`mapping::TypeDescriptor`], reconciles the fresh set
//! against the locally cached universe (evicting stale entries), and
//! notifies an observer exactly once with the outcome.

pub mod config;
pub mod error;
pub mod loader;
pub mod mapping;
pub mod parser;
pub mod reconcile;
pub mod store;
pub mod transport;

pub use config::TransportConfig;
pub use error::{LoaderError, LoaderResult, TransportError};
pub use loader::{LoaderBuilder, LoaderObserver, LoaderState, ObjectLoader, RequestLifecycleObserver, TargetRef};
pub use mapping::{
    AttrKind, AttrValue, FieldFault, MappedInstance, MappedObjectSet, MappingError,
    TypeDescriptor,
};
pub use parser::ParseError;
pub use reconcile::{CacheReconciler, ReconcileReport};
pub use store::{MemoryStore, PersistedObject, Query, SqliteStore, Store, StoreError};
pub use transport::{HttpTransport, Method, ResponseMetadata, Transport, TransportRequest, TransportResponse};
