//! Runtime: owner of one engine instance

use crate::context::Context;
use crate::engine::{EngineContext, ExecutionLock};
use crate::error::{Error, Result};
use crate::handle::{HandleTable, RuntimeId};
use crate::options::RuntimeOptions;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared runtime state; contexts keep it alive
pub(crate) struct RuntimeInner {
    id: RuntimeId,
    lock: ExecutionLock,
    handles: HandleTable,
    engine: RwLock<Option<rquickjs::Runtime>>,
    live_contexts: AtomicUsize,
    closed: AtomicBool,
    options: RuntimeOptions,
}

impl RuntimeInner {
    pub(crate) fn id(&self) -> RuntimeId {
        self.id
    }

    pub(crate) fn lock(&self) -> &ExecutionLock {
        &self.lock
    }

    pub(crate) fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub(crate) fn context_closed(&self) {
        self.live_contexts.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An embedded engine instance
///
/// Creates [`Context`]s and must outlive them: closing a runtime while any
/// of its contexts is open fails with `InvalidState`.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with engine defaults
    pub fn new() -> Result<Self> {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create a runtime with the given limits
    pub fn with_options(options: RuntimeOptions) -> Result<Self> {
        let engine =
            rquickjs::Runtime::new().map_err(|e| Error::EngineInit(e.to_string()))?;
        if let Some(limit) = options.memory_limit {
            engine.set_memory_limit(limit);
        }
        if let Some(size) = options.max_stack_size {
            engine.set_max_stack_size(size);
        }
        if let Some(threshold) = options.gc_threshold {
            engine.set_gc_threshold(threshold);
        }

        let inner = Arc::new(RuntimeInner {
            id: RuntimeId::new(),
            lock: ExecutionLock::new(),
            handles: HandleTable::new(),
            engine: RwLock::new(Some(engine)),
            live_contexts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            options,
        });
        debug!(runtime = %inner.id, options = ?inner.options, "created runtime");
        Ok(Self { inner })
    }

    /// Get the runtime ID
    pub fn id(&self) -> RuntimeId {
        self.inner.id
    }

    /// Options this runtime was created with
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Create a new global scope
    pub fn create_context(&self) -> Result<Context> {
        let engine = self.inner.lock.exclusive(|| {
            if self.is_closed() {
                return Err(Error::invalid_state(format!("runtime {} is closed", self.id())));
            }
            let runtime = self.inner.engine.read();
            let runtime = runtime
                .as_ref()
                .ok_or_else(|| Error::invalid_state(format!("runtime {} is closed", self.id())))?;
            let engine = rquickjs::Context::full(runtime)
                .map_err(|e| Error::EngineInit(e.to_string()))?;
            self.inner.live_contexts.fetch_add(1, Ordering::AcqRel);
            Ok(EngineContext::new(engine))
        })??;

        let context = Context::open(self.inner.clone(), engine);
        debug!(runtime = %self.id(), context = %context.id(), "created context");
        Ok(context)
    }

    /// Close the runtime, freeing the engine.
    ///
    /// Fails with `InvalidState` if it is already closed, if contexts are
    /// still open, or when called from script code.
    pub fn close(&self) -> Result<()> {
        self.inner.lock.exclusive(|| {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(Error::invalid_state(format!(
                    "runtime {} is already closed",
                    self.id()
                )));
            }
            let live = self.live_contexts();
            if live > 0 {
                return Err(Error::invalid_state(format!(
                    "runtime {} still has {} open context(s)",
                    self.id(),
                    live
                )));
            }
            self.inner.closed.store(true, Ordering::Release);
            drop(self.inner.engine.write().take());
            debug!(runtime = %self.id(), "closed runtime");
            Ok(())
        })?
    }

    /// Check whether the runtime is closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of contexts that are still open
    pub fn live_contexts(&self) -> usize {
        self.inner.live_contexts.load(Ordering::Acquire)
    }

    /// Number of live handles across all contexts
    pub fn handle_count(&self) -> usize {
        self.inner.handles.live_count(None)
    }

    /// Run a full garbage collection.
    ///
    /// Fails with `InvalidState` on a closed runtime or from script code.
    pub fn run_gc(&self) -> Result<()> {
        self.inner.lock.exclusive(|| {
            let engine = self.inner.engine.read();
            let engine = engine
                .as_ref()
                .ok_or_else(|| Error::invalid_state(format!("runtime {} is closed", self.id())))?;
            engine.run_gc();
            Ok(())
        })?
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("live_contexts", &self.live_contexts())
            .finish()
    }
}
