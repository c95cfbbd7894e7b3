// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The modification bus.
//!
//! Every collection entering the bus, from an external publisher or from a
//! port's output, is first applied to the [`BusStateCache`] and then
//! forwarded to each port whose `consumes()` matches, filtered to those
//! types. Both steps happen under one lock together with port registration,
//! so a late port sees the cached state followed by exactly the collections
//! dispatched after it.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use weave_core::{ElementType, TimedDiffCollection};

use crate::cache::BusStateCache;
use crate::config::BusConfig;
use crate::limiter::WorkerPool;
use crate::port::{ModificationPort, ProcessorPort};
use crate::processor::Processor;
use crate::stream::{diff_channel, DiffSink};

/// Origin reported for collections published through [`ModificationBus::publish`].
pub const EXTERNAL_ORIGIN: &str = "external";

/// Errors returned by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The bus was shut down.
    #[error("bus is shut down")]
    Closed,
    /// The bus was created outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Observer of every collection entering the bus.
pub trait DiffInterceptor: Send + Sync {
    /// Called before the collection is cached and forwarded.
    fn intercept(&self, origin: &str, diffs: &TimedDiffCollection);
}

/// Interceptor logging collection sizes at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingInterceptor;

impl DiffInterceptor for LoggingInterceptor {
    fn intercept(&self, origin: &str, diffs: &TimedDiffCollection) {
        debug!(
            origin,
            diffs = diffs.len(),
            refresh = diffs.refresh_ids().count(),
            "entering bus"
        );
    }
}

struct PortRoute {
    id: String,
    consumes: Vec<ElementType>,
    input: DiffSink,
}

struct BusState {
    cache: BusStateCache,
    routes: Vec<PortRoute>,
}

struct BusInner {
    pool: WorkerPool,
    state: Mutex<BusState>,
    interceptor: Option<Arc<dyn DiffInterceptor>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Fan-out/fan-in hub connecting ports.
#[derive(Clone)]
pub struct ModificationBus {
    inner: Arc<BusInner>,
}

impl ModificationBus {
    /// Bus on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`BusError::NoRuntime`] outside a tokio runtime.
    pub fn new(config: &BusConfig) -> Result<Self, BusError> {
        Self::build(config, None)
    }

    /// Bus reporting every incoming collection to `interceptor`.
    ///
    /// # Errors
    /// Returns [`BusError::NoRuntime`] outside a tokio runtime.
    pub fn with_interceptor(
        config: &BusConfig,
        interceptor: Arc<dyn DiffInterceptor>,
    ) -> Result<Self, BusError> {
        Self::build(config, Some(interceptor))
    }

    fn build(
        config: &BusConfig,
        interceptor: Option<Arc<dyn DiffInterceptor>>,
    ) -> Result<Self, BusError> {
        let pool = WorkerPool::new(config.worker_threads)?;
        info!(
            workers = pool.size(),
            strategy = ?config.parallel_strategy,
            "modification bus started"
        );
        Ok(Self {
            inner: Arc::new(BusInner {
                pool,
                state: Mutex::new(BusState {
                    cache: BusStateCache::new(config.strategy()),
                    routes: Vec::new(),
                }),
                interceptor,
                tasks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Pool shared by the ports of this bus.
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Connects `port`: its input first receives the cached state relevant
    /// to it, then live collections; its output is fed back into the bus.
    ///
    /// # Errors
    /// Returns [`BusError::Closed`] after [`shutdown`](Self::shutdown).
    #[instrument(skip_all, fields(port = %port.id()))]
    pub fn register_port(&self, port: Arc<dyn ModificationPort>) -> Result<(), BusError> {
        self.inner.ensure_open()?;
        let id = port.id().to_owned();
        let consumes = port.consumes();
        let (input, stream) = diff_channel();
        port.connect_input_to(stream);

        let mut output = port.output();
        let bus = Arc::downgrade(&self.inner);
        let origin = id.clone();
        let forwarder = self.inner.pool.handle().spawn(async move {
            while let Some(diffs) = output.recv().await {
                let Some(bus) = bus.upgrade() else {
                    break;
                };
                bus.dispatch(&origin, &diffs);
            }
        });
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(forwarder);

        let mut state = self.inner.lock_state();
        state.cache.attach(&consumes, &input);
        state.routes.push(PortRoute {
            id: id.clone(),
            consumes,
            input,
        });
        info!(port = %id, ports = state.routes.len(), "port registered");
        Ok(())
    }

    /// Wraps `processor` in a [`ProcessorPort`] on this bus's pool and
    /// registers it.
    ///
    /// # Errors
    /// Returns [`BusError::Closed`] after [`shutdown`](Self::shutdown).
    pub fn register_processor<P: Processor>(
        &self,
        processor: P,
    ) -> Result<ProcessorPort<P>, BusError> {
        let port = ProcessorPort::new(processor, &self.inner.pool);
        self.register_port(Arc::new(port.clone()))?;
        Ok(port)
    }

    /// Publishes `diffs` from an external source.
    ///
    /// # Errors
    /// Returns [`BusError::Closed`] after [`shutdown`](Self::shutdown).
    #[instrument(skip_all, fields(diffs = diffs.len()))]
    pub fn publish(&self, diffs: TimedDiffCollection) -> Result<(), BusError> {
        self.inner.ensure_open()?;
        self.inner.dispatch(EXTERNAL_ORIGIN, &diffs);
        Ok(())
    }

    /// Current cached state as Add diffs.
    pub fn export_system_state(&self) -> TimedDiffCollection {
        self.inner.lock_state().cache.dump()
    }

    /// Ids of the registered ports, in registration order.
    pub fn port_ids(&self) -> Vec<String> {
        self.inner
            .lock_state()
            .routes
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    /// Disconnects every port and stops forwarding. In-flight processor
    /// invocations run to completion; their output is discarded.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.lock_state().routes.clear();
        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
        }
        info!("modification bus shut down");
    }
}

impl BusInner {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, origin: &str, diffs: &TimedDiffCollection) {
        if diffs.is_empty() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(interceptor) = &self.interceptor {
            interceptor.intercept(origin, diffs);
        }
        let mut state = self.lock_state();
        if let Err(err) = state.cache.apply(diffs) {
            warn!(origin, error = %err, "state cache rejected diffs");
        }
        state.routes.retain(|route| {
            let filtered = diffs.filter_by_element_types(&route.consumes);
            if filtered.is_empty() {
                return true;
            }
            let delivered = route.input.send(Arc::new(filtered)).is_ok();
            if !delivered {
                warn!(port = %route.id, "port input closed, dropping route");
            }
            delivered
        });
    }
}
