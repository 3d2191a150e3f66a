//! Loader orchestration — one request's end-to-end lifecycle.
//!
//! An [`ObjectLoader`] owns exactly one logical request: it dispatches the
//! transport exchange, and on completion routes the raw response through
//! parse → map → upsert → reconcile before notifying its observer. The
//! observer hears exactly one outcome per un-cancelled `send()` — success
//! or failure, never both, never neither.
//!
//! State machine: `Idle → Sent → {Succeeded, Failed}`, with
//! `Sent → Cancelled` only when `cancel()` races ahead of transport
//! completion. Terminal states never re-enter `Sent`; loaders are one-shot
//! and discarded after notification.

use crate::error::{LoaderError, LoaderResult};
use crate::mapping::{self, MappedObjectSet, TypeDescriptor};
use crate::parser;
use crate::reconcile::CacheReconciler;
use crate::store::{Query, Store};
use crate::transport::{ResponseMetadata, Transport, TransportRequest, TransportResponse};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Reference to the domain object a request was dispatched for. `None` on
/// a loader means a collection fetch with no originating instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub entity: String,
    pub identity: String,
}

/// Mapping-outcome observer: receives exactly one of `on_success` /
/// `on_failure` per un-cancelled send.
pub trait LoaderObserver: Send + Sync {
    fn on_success(
        &self,
        objects: MappedObjectSet,
        metadata: ResponseMetadata,
        target: Option<TargetRef>,
    );

    fn on_failure(
        &self,
        error: LoaderError,
        metadata: Option<ResponseMetadata>,
        target: Option<TargetRef>,
    );
}

/// Request-lifecycle observer, separate from the mapping outcome. All
/// methods default to no-ops; implement whichever events matter.
pub trait RequestLifecycleObserver: Send + Sync {
    fn request_sent(&self, _request: &TransportRequest) {}
    fn request_cancelled(&self, _request: &TransportRequest) {}
}

/// Externally visible loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Sent,
    Succeeded,
    Failed,
    Cancelled,
}

// Internal state encoding. COMPLETING is the window between transport
// completion and the terminal notification; externally it reads as Sent.
const IDLE: u8 = 0;
const SENT: u8 = 1;
const COMPLETING: u8 = 2;
const SUCCEEDED: u8 = 3;
const FAILED: u8 = 4;
const CANCELLED: u8 = 5;

/// Orchestrates one asynchronous load. Build with [`LoaderBuilder`].
///
/// The loader shares its internals with the spawned pipeline task, so the
/// handle stays cheap to keep around for `cancel()` / `state()` after
/// `send()`.
pub struct ObjectLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    descriptor: Arc<TypeDescriptor>,
    store: Arc<dyn Store>,
    reconciler: CacheReconciler,
    reconcile_query: Option<Query>,
    observer: Arc<dyn LoaderObserver>,
    lifecycle: Option<Arc<dyn RequestLifecycleObserver>>,
    target: Option<TargetRef>,
    state: AtomicU8,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Builder for [`ObjectLoader`].
pub struct LoaderBuilder {
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    descriptor: Arc<TypeDescriptor>,
    store: Arc<dyn Store>,
    observer: Arc<dyn LoaderObserver>,
    reconciler: CacheReconciler,
    reconcile_query: Option<Query>,
    lifecycle: Option<Arc<dyn RequestLifecycleObserver>>,
    target: Option<TargetRef>,
}

impl LoaderBuilder {
    pub fn new(
        transport: Arc<dyn Transport>,
        request: TransportRequest,
        descriptor: Arc<TypeDescriptor>,
        store: Arc<dyn Store>,
        observer: Arc<dyn LoaderObserver>,
    ) -> Self {
        Self {
            transport,
            request,
            descriptor,
            store,
            observer,
            reconciler: CacheReconciler::new(),
            reconcile_query: None,
            lifecycle: None,
            target: None,
        }
    }

    /// Configure cache reconciliation against the given universe. Meant for
    /// list fetches; a single-object fetch reconciling against its siblings
    /// would evict everything else in the universe.
    pub fn reconcile_against(mut self, query: Query) -> Self {
        self.reconcile_query = Some(query);
        self
    }

    /// Share a reconciler across loaders so their universes serialize.
    pub fn reconciler(mut self, reconciler: CacheReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Forward request-lifecycle events to a second observer.
    pub fn lifecycle_observer(mut self, observer: Arc<dyn RequestLifecycleObserver>) -> Self {
        self.lifecycle = Some(observer);
        self
    }

    /// Associate the loader with the domain object it was dispatched for.
    pub fn target(mut self, target: TargetRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn build(self) -> ObjectLoader {
        ObjectLoader {
            inner: Arc::new(LoaderInner {
                transport: self.transport,
                request: self.request,
                descriptor: self.descriptor,
                store: self.store,
                reconciler: self.reconciler,
                reconcile_query: self.reconcile_query,
                observer: self.observer,
                lifecycle: self.lifecycle,
                target: self.target,
                state: AtomicU8::new(IDLE),
                task: Mutex::new(None),
            }),
        }
    }
}

impl ObjectLoader {
    /// Begin the asynchronous exchange.
    ///
    /// Fails synchronously with [`LoaderError::AlreadyInFlight`] unless the
    /// loader is idle — loaders are one-shot and never re-enter `Sent`.
    pub fn send(&self) -> LoaderResult<()> {
        self.inner
            .state
            .compare_exchange(IDLE, SENT, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LoaderError::AlreadyInFlight)?;

        if let Some(lifecycle) = &self.inner.lifecycle {
            lifecycle.request_sent(&self.inner.request);
        }

        tracing::debug!(
            url = %self.inner.request.url,
            entity = %self.inner.descriptor.entity,
            "loader sent"
        );

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run().await });
        if let Ok(mut task) = self.inner.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    /// Best-effort cancellation.
    ///
    /// If the transport has not yet completed, the exchange is aborted and
    /// the eventual notification suppressed. If completion has already been
    /// claimed, this is a no-op and the notification still fires.
    pub fn cancel(&self) {
        if self
            .inner
            .state
            .compare_exchange(SENT, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Ok(mut task) = self.inner.task.lock() {
                if let Some(handle) = task.take() {
                    handle.abort();
                }
            }
            if let Some(lifecycle) = &self.inner.lifecycle {
                lifecycle.request_cancelled(&self.inner.request);
            }
            tracing::debug!(url = %self.inner.request.url, "loader cancelled");
        }
    }

    /// Current state. The internal completion window reads as `Sent`.
    pub fn state(&self) -> LoaderState {
        match self.inner.state.load(Ordering::Acquire) {
            IDLE => LoaderState::Idle,
            SENT | COMPLETING => LoaderState::Sent,
            SUCCEEDED => LoaderState::Succeeded,
            FAILED => LoaderState::Failed,
            _ => LoaderState::Cancelled,
        }
    }

    /// Whether the loader reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state(),
            LoaderState::Succeeded | LoaderState::Failed | LoaderState::Cancelled
        )
    }
}

impl LoaderInner {
    /// The pipeline task. The transport await is the only suspension point;
    /// everything after it runs synchronously to a terminal notification.
    async fn run(self: Arc<Self>) {
        let result = self.transport.execute(&self.request).await;

        // Claim completion. A cancel that won the race suppresses the
        // notification; past this point cancellation can no longer land.
        if self
            .state
            .compare_exchange(SENT, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        match result {
            Err(e) => self.notify_failure(LoaderError::Transport(e), None),
            Ok(response) => {
                let metadata = response.metadata();
                if !response.is_success() {
                    self.notify_failure(LoaderError::Status(response.status), Some(metadata));
                    return;
                }
                match self.process(&response) {
                    Ok(objects) => {
                        self.state.store(SUCCEEDED, Ordering::Release);
                        tracing::debug!(
                            entity = %self.descriptor.entity,
                            count = objects.len(),
                            "load succeeded"
                        );
                        self.observer
                            .on_success(objects, metadata, self.target.clone());
                    }
                    Err(e) => self.notify_failure(e, Some(metadata)),
                }
            }
        }
    }

    /// Parse → map → upsert → reconcile. Any hard stage error aborts before
    /// the next stage runs on invalid input.
    fn process(&self, response: &TransportResponse) -> LoaderResult<MappedObjectSet> {
        let node = parser::parse(&response.body, response.content_type.as_deref())?;
        let objects = mapping::map(&node, &self.descriptor)?;

        for instance in &objects {
            if instance.is_flagged() {
                tracing::warn!(
                    entity = %instance.entity,
                    identity = %instance.identity,
                    faults = instance.faults.len(),
                    "instance mapped with soft faults"
                );
            }
            // Flagged instances are still upserted; only hard shape errors
            // keep objects out of the store.
            self.store.upsert(instance)?;
        }

        if let Some(query) = &self.reconcile_query {
            let report = self
                .reconciler
                .reconcile(self.store.as_ref(), query, &objects);
            if !report.evicted.is_empty() || !report.faults.is_empty() {
                tracing::debug!(
                    entity = %query.entity,
                    evicted = report.evicted.len(),
                    faults = report.faults.len(),
                    "reconciliation pass complete"
                );
            }
        }

        Ok(objects)
    }

    fn notify_failure(&self, error: LoaderError, metadata: Option<ResponseMetadata>) {
        self.state.store(FAILED, Ordering::Release);
        tracing::debug!(url = %self.request.url, error = %error, "load failed");
        self.observer
            .on_failure(error, metadata, self.target.clone());
    }
}
