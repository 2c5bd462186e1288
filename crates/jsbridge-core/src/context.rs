//! Context: one global scope within a runtime
//!
//! A [`Context`] is a cheap, cloneable, thread-safe reference. Every clone
//! and every value produced through it refers to the same scope; closing it
//! through any of them invalidates all.

use crate::array::Array;
use crate::callback::HostCallback;
use crate::engine::{engine_error, Arena, CatchExt, EngineContext, Pins};
use crate::error::{Error, Result};
use crate::function::{call_engine, Function};
use crate::handle::{ContextId, HandleTable};
use crate::marshal::{classify, from_engine, pin, to_engine, to_engine_all};
use crate::object::Object;
use crate::runtime::RuntimeInner;
use crate::value::{FromValue, IntoValue, Value, ValueType};
use parking_lot::RwLock;
use rquickjs::Ctx;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub(crate) struct ContextInner {
    id: ContextId,
    runtime: Arc<RuntimeInner>,
    engine: RwLock<Option<EngineContext>>,
    closed: AtomicBool,
}

impl ContextInner {
    /// Drop handles and the engine context. Returns `false` if already shut down.
    fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let purged = self.runtime.handles().purge_context(self.id);
        let engine = self.engine.write().take();
        let unpinned = engine.map_or(0, |engine| self.runtime.lock().dispose(engine));
        self.runtime.context_closed();
        debug!(runtime = %self.runtime.id(), context = %self.id, purged, unpinned, "closed context");
        true
    }

    /// Pins of the engine context, while it is open
    pub(crate) fn pins(&self) -> Option<Arc<Pins>> {
        self.engine.read().as_ref().map(|engine| engine.pins().clone())
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A script execution environment
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn open(runtime: Arc<RuntimeInner>, engine: EngineContext) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: ContextId::new(),
                runtime,
                engine: RwLock::new(Some(engine)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ContextInner> {
        &self.inner
    }

    pub(crate) fn handles(&self) -> &HandleTable {
        self.inner.runtime.handles()
    }

    /// Run `f` inside this context
    pub(crate) fn enter<F, R>(&self, f: F) -> Result<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>, &Arena<'js>) -> Result<R> + Send,
        R: Send,
    {
        let engine = || {
            self.inner
                .engine
                .read()
                .clone()
                .ok_or_else(|| self.closed_error())
        };
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.inner.runtime.lock().enter(self.id(), engine, f)
    }

    fn closed_error(&self) -> Error {
        Error::invalid_state(format!("context {} is closed", self.id()))
    }

    /// Get the context ID
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Check whether the context is closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of live handles produced by this context
    pub fn handle_count(&self) -> usize {
        self.handles().live_count(Some(self.id()))
    }

    // ===== Evaluation =====

    /// Evaluate `source` as a top-level script and return its completion value.
    ///
    /// `file_name` is attached to any [`ScriptError`](crate::ScriptError).
    pub fn evaluate(&self, source: &str, file_name: Option<&str>) -> Result<Value> {
        self.enter(|ctx, arena| {
            let result: rquickjs::Value = ctx
                .eval(source)
                .map_err(|err| engine_error(ctx, err, file_name))?;
            from_engine(self, ctx, arena, result)
        })
    }

    /// Evaluate and convert the completion value.
    ///
    /// `Undefined` never converts to a primitive default.
    pub fn evaluate_typed<T: FromValue>(&self, source: &str, file_name: Option<&str>) -> Result<T> {
        T::from_value(self.evaluate(source, file_name)?)
    }

    /// Evaluate for side effects only
    pub fn execute_void(&self, source: &str, file_name: Option<&str>) -> Result<()> {
        self.evaluate(source, file_name).map(|_| ())
    }

    /// Evaluate a script that must produce an array
    pub fn execute_array(&self, source: &str, file_name: Option<&str>) -> Result<Array> {
        self.evaluate_typed(source, file_name)
    }

    // ===== Globals =====

    /// Proxy of the global object
    pub fn global(&self) -> Result<Object> {
        self.enter(|ctx, arena| {
            let handle = pin(self, arena, ctx.globals().into_value(), ValueType::Object);
            Ok(Object::from_handle(handle))
        })
    }

    /// Read a global binding; absent bindings read as `Undefined`
    pub fn get_global(&self, name: &str) -> Result<Value> {
        self.enter(|ctx, arena| {
            let value: rquickjs::Value = ctx.globals().get(name).catch_in(ctx)?;
            from_engine(self, ctx, arena, value)
        })
    }

    /// Read a global binding and convert it
    pub fn get_global_as<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(self.get_global(name)?)
    }

    /// Write a global binding
    pub fn set_global(&self, name: &str, value: impl IntoValue) -> Result<()> {
        let value = value.into_value();
        self.enter(|ctx, arena| {
            let value = to_engine(self, ctx, arena, &value)?;
            ctx.globals().set(name, value).catch_in(ctx)
        })
    }

    /// Bind a host callback under a global name
    pub fn register(&self, name: &str, callback: HostCallback) -> Result<Function> {
        let function = Function::new(self, callback)?;
        self.set_global(name, &function)?;
        debug!(context = %self.id(), name, "registered host callback");
        Ok(function)
    }

    /// Call the global function `name` with an `undefined` receiver
    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.enter(|ctx, arena| {
            let target: rquickjs::Value = ctx.globals().get(name).catch_in(ctx)?;
            let Some(function) = target.as_function() else {
                return Err(Error::coercion(ValueType::Function, classify(&target)?));
            };
            let args = to_engine_all(self, ctx, arena, args)?;
            let this = rquickjs::Value::new_undefined(ctx.clone());
            let result = call_engine(ctx, function, this, args)?;
            from_engine(self, ctx, arena, result)
        })
    }

    /// Call the global function `name` and convert the result
    pub fn call_function_as<T: FromValue>(&self, name: &str, args: &[Value]) -> Result<T> {
        T::from_value(self.call_function(name, args)?)
    }

    // ===== Lifecycle =====

    /// Close the context.
    ///
    /// Every value produced through it becomes unusable (`InvalidState`).
    /// Fails if it is already closed or is executing the caller.
    pub fn close(&self) -> Result<()> {
        self.inner.runtime.lock().hold(|executing| {
            if self.is_closed() {
                return Err(self.closed_error());
            }
            if executing == Some(self.id().as_u64()) {
                return Err(Error::invalid_state(format!(
                    "context {} cannot be closed from its own callback",
                    self.id()
                )));
            }
            self.inner.shutdown();
            Ok(())
        })
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("runtime", &self.inner.runtime.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
