//! Engine entry: execution lock, per-context pins and exception extraction
//!
//! Every operation that touches engine memory goes through
//! [`ExecutionLock::enter`]. The lock is reentrant on the owning thread so a
//! host callback can call back into the context that invoked it; any other
//! thread blocks until the outermost entry returns.

use crate::error::{Error, Result, ScriptError};
use crate::handle::ContextId;
use parking_lot::{Mutex, ReentrantMutex};
use rquickjs::{Ctx, Persistent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

// ============================================================================
// Arena
// ============================================================================

/// An engine value kept alive outside any `Ctx` scope
#[derive(Clone, PartialEq, Eq, Hash)]
struct Pinned(Persistent<rquickjs::Value<'static>>);

// SAFETY: pinned values are only created, restored and dropped while the
// runtime execution lock is held, which serializes every engine access.
unsafe impl Send for Pinned {}

struct Pin {
    value: Pinned,
    /// Pinned until explicitly released
    held: bool,
    /// Open call scopes using the slot
    scopes: u32,
}

#[derive(Default)]
struct PinTable {
    next: u64,
    slots: HashMap<u64, Pin>,
    identities: HashMap<Pinned, u64>,
}

impl PinTable {
    /// Take the slot out, returning what has to be dropped
    fn remove(&mut self, slot: u64) -> Option<(Pinned, Option<Pinned>)> {
        let pin = self.slots.remove(&slot)?;
        let identity = if self.identities.get(&pin.value) == Some(&slot) {
            self.identities.remove_entry(&pin.value).map(|(value, _)| value)
        } else {
            None
        };
        Some((pin.value, identity))
    }
}

/// Host-side slot map pinning every engine value of one context that the
/// host holds a handle to. Script code has no way to reach it.
///
/// Values removed from the table are dropped after its lock is released:
/// freeing an engine value can run finalizers that come back here.
#[derive(Default)]
pub(crate) struct Pins {
    table: Mutex<PinTable>,
}

impl Pins {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn retain(&self, value: Pinned, scoped: bool) -> u64 {
        let mut table = self.table.lock();
        let known = table.identities.get(&value).copied();
        if let Some(slot) = known {
            if let Some(pin) = table.slots.get_mut(&slot) {
                if scoped {
                    pin.scopes += 1;
                } else {
                    pin.held = true;
                }
                return slot;
            }
        }
        table.next += 1;
        let slot = table.next;
        table.identities.insert(value.clone(), slot);
        table.slots.insert(
            slot,
            Pin {
                value,
                held: !scoped,
                scopes: u32::from(scoped),
            },
        );
        slot
    }

    fn lookup(&self, slot: u64) -> Option<Pinned> {
        self.table.lock().slots.get(&slot).map(|pin| pin.value.clone())
    }

    fn release(&self, slot: u64) -> bool {
        let removed = self.table.lock().remove(slot);
        removed.is_some()
    }

    fn unscope(&self, slot: u64) -> bool {
        let removed = {
            let mut table = self.table.lock();
            match table.slots.get_mut(&slot) {
                Some(pin) => {
                    pin.scopes = pin.scopes.saturating_sub(1);
                    if pin.scopes > 0 || pin.held {
                        return false;
                    }
                }
                None => return false,
            }
            table.remove(slot)
        };
        removed.is_some()
    }

    /// Number of pinned values
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Unpin everything; used when the context is closed
    fn drain(&self) -> usize {
        let (slots, identities) = {
            let mut table = self.table.lock();
            (
                std::mem::take(&mut table.slots),
                std::mem::take(&mut table.identities),
            )
        };
        let count = slots.len();
        drop(identities);
        drop(slots);
        count
    }
}

/// View of a context's pins bound to an engine scope
pub(crate) struct Arena<'js> {
    ctx: Ctx<'js>,
    pins: Arc<Pins>,
}

impl<'js> Arena<'js> {
    pub(crate) fn new(ctx: &Ctx<'js>, pins: Arc<Pins>) -> Self {
        Self {
            ctx: ctx.clone(),
            pins,
        }
    }

    /// Pin a value until it is released, returning its slot.
    ///
    /// Retaining an object that is already pinned returns its slot.
    pub(crate) fn retain(&self, value: rquickjs::Value<'js>) -> u64 {
        let slot = self.pins.retain(Pinned(Persistent::save(&self.ctx, value)), false);
        trace!(slot, "arena retain");
        slot
    }

    /// Pin a value for the duration of one host call
    pub(crate) fn retain_scoped(&self, value: rquickjs::Value<'js>) -> u64 {
        let slot = self.pins.retain(Pinned(Persistent::save(&self.ctx, value)), true);
        trace!(slot, "arena retain (scoped)");
        slot
    }

    /// Resolve a slot; unknown slots resolve to `undefined`
    pub(crate) fn lookup(&self, slot: u64) -> rquickjs::Result<rquickjs::Value<'js>> {
        match self.pins.lookup(slot) {
            Some(pinned) => pinned.0.restore(&self.ctx),
            None => Ok(rquickjs::Value::new_undefined(self.ctx.clone())),
        }
    }

    /// Unpin a slot. Returns `false` if it was not pinned.
    pub(crate) fn release(&self, slot: u64) -> bool {
        trace!(slot, "arena release");
        self.pins.release(slot)
    }

    /// Close one call scope of a slot. Returns `true` if that unpinned it.
    pub(crate) fn unscope(&self, slot: u64) -> bool {
        self.pins.unscope(slot)
    }
}

/// The engine half of a context: the engine context and its pins
#[derive(Clone)]
pub(crate) struct EngineContext {
    context: Arc<rquickjs::Context>,
    pins: Arc<Pins>,
}

impl EngineContext {
    pub(crate) fn new(context: rquickjs::Context) -> Self {
        Self {
            context: Arc::new(context),
            pins: Arc::new(Pins::new()),
        }
    }

    pub(crate) fn pins(&self) -> &Arc<Pins> {
        &self.pins
    }
}

// ============================================================================
// Execution Lock
// ============================================================================

/// Marker stored while the engine is busy outside any context (freeing
/// contexts, collecting garbage)
const BUSY: u64 = u64::MAX;

#[derive(Default)]
struct ExecutionState {
    /// Context executing on the lock owner (0 = none, `BUSY` = no context)
    active_context: AtomicU64,
    /// Address of the `Ctx` of the outermost entry
    active_ctx: AtomicUsize,
    /// Engine contexts dropped while the engine was executing
    deferred: Mutex<Vec<EngineContext>>,
}

/// Marks the engine active for the duration of an outermost entry
struct ActiveScope<'a> {
    state: &'a ExecutionState,
}

impl<'a> ActiveScope<'a> {
    fn context(state: &'a ExecutionState, id: ContextId, ctx: &Ctx<'_>) -> Self {
        state
            .active_ctx
            .store(ctx as *const Ctx<'_> as usize, Ordering::Release);
        state.active_context.store(id.as_u64(), Ordering::Release);
        Self { state }
    }

    fn busy(state: &'a ExecutionState) -> Self {
        state.active_context.store(BUSY, Ordering::Release);
        Self { state }
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        self.state.active_context.store(0, Ordering::Release);
        self.state.active_ctx.store(0, Ordering::Release);
    }
}

/// The per-runtime lock serializing engine entry
#[derive(Default)]
pub(crate) struct ExecutionLock {
    state: ReentrantMutex<ExecutionState>,
}

impl ExecutionLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` inside the engine context of `id` with its arena bound.
    ///
    /// Blocks while another thread is executing. On the executing thread,
    /// entering the active context again reuses its scope; entering any
    /// other context fails with `InvalidState`.
    pub(crate) fn enter<E, F, R>(&self, id: ContextId, engine: E, f: F) -> Result<R>
    where
        E: FnOnce() -> Result<EngineContext>,
        F: for<'js> FnOnce(&Ctx<'js>, &Arena<'js>) -> Result<R> + Send,
        R: Send,
    {
        let guard = self.state.lock();
        let state: &ExecutionState = &guard;

        match state.active_context.load(Ordering::Acquire) {
            0 => {}
            active if active == id.as_u64() => {
                let addr = state.active_ctx.load(Ordering::Acquire);
                // SAFETY: the address was stored by the outermost entry on this
                // thread (we hold the reentrant lock) and that entry's `Ctx`
                // outlives this nested call.
                let ctx = unsafe { active_ctx(addr) };
                let arena = Arena::new(ctx, engine()?.pins);
                return f(ctx, &arena);
            }
            _ => {
                return Err(Error::invalid_state(
                    "another context of this runtime is executing on this thread",
                ))
            }
        }

        let engine = engine()?;
        let result = engine.context.with(|ctx| {
            let _scope = ActiveScope::context(state, id, &ctx);
            let arena = Arena::new(&ctx, engine.pins.clone());
            f(&ctx, &arena)
        });
        state.deferred.lock().push(engine);
        flush(state);
        result
    }

    /// Run `f` holding the lock, passing the id of the context executing on
    /// this thread (if any)
    pub(crate) fn hold<R>(&self, f: impl FnOnce(Option<u64>) -> R) -> R {
        let guard = self.state.lock();
        match guard.active_context.load(Ordering::Acquire) {
            0 => f(None),
            active => f(Some(active)),
        }
    }

    /// Run `f` with the engine reserved, outside of any context.
    ///
    /// Fails with `InvalidState` when called from engine code on this thread.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let guard = self.state.lock();
        let state: &ExecutionState = &guard;
        if state.active_context.load(Ordering::Acquire) != 0 {
            return Err(Error::invalid_state("engine is executing on this thread"));
        }
        let result = {
            let _scope = ActiveScope::busy(state);
            f()
        };
        flush(state);
        Ok(result)
    }

    /// Unpin every value of an engine context, then drop the context now,
    /// or once the outermost entry returns if the engine is executing on
    /// this thread.
    ///
    /// Returns the number of values that were still pinned.
    pub(crate) fn dispose(&self, engine: EngineContext) -> usize {
        let guard = self.state.lock();
        let state: &ExecutionState = &guard;
        let unpinned = engine.pins.drain();
        state.deferred.lock().push(engine);
        if state.active_context.load(Ordering::Acquire) == 0 {
            flush(state);
        }
        unpinned
    }
}

/// Free parked engine contexts. Freeing one may park more (host callbacks
/// owning the last reference to another context), so drain until empty.
/// The last handle to an engine context is always dropped here, outside of
/// any engine scope.
fn flush(state: &ExecutionState) {
    loop {
        let parked = std::mem::take(&mut *state.deferred.lock());
        if parked.is_empty() {
            break;
        }
        trace!(count = parked.len(), "freeing parked engine contexts");
        let _scope = ActiveScope::busy(state);
        drop(parked);
    }
}

/// # Safety
///
/// `addr` must be the address of a `Ctx` that outlives `'a`.
unsafe fn active_ctx<'a>(addr: usize) -> &'a Ctx<'a> {
    &*(addr as *const Ctx<'a>)
}

// ============================================================================
// Exceptions
// ============================================================================

/// Map engine results into bridge results
pub(crate) trait CatchExt<T> {
    /// Convert the error, draining the pending exception of `ctx`
    fn catch_in(self, ctx: &Ctx<'_>) -> Result<T>;
}

impl<T> CatchExt<T> for rquickjs::Result<T> {
    fn catch_in(self, ctx: &Ctx<'_>) -> Result<T> {
        self.map_err(|err| engine_error(ctx, err, None))
    }
}

/// Convert an engine error into a bridge error, draining the pending
/// exception if there is one
pub(crate) fn engine_error(ctx: &Ctx<'_>, err: rquickjs::Error, file_name: Option<&str>) -> Error {
    let script = match err {
        rquickjs::Error::Exception => pending_exception(ctx),
        other => ScriptError::new(other.to_string()),
    };
    Error::Script(script.with_file_name(file_name))
}

fn pending_exception(ctx: &Ctx<'_>) -> ScriptError {
    let exception = ctx.catch();
    let Some(object) = exception.as_object() else {
        return ScriptError::new(describe_thrown(&exception));
    };

    let name: Option<String> = object.get("name").ok().flatten();
    let message: Option<String> = object.get("message").ok().flatten();
    let stack: Option<String> = object.get("stack").ok().flatten();
    let line = object
        .get::<_, rquickjs::Value>("lineNumber")
        .ok()
        .and_then(|v| v.as_int())
        .and_then(|l| u32::try_from(l).ok())
        .or_else(|| stack.as_deref().and_then(line_from_stack));

    let message = match (name, message) {
        (Some(name), Some(message)) if !message.starts_with(&name) => {
            format!("{}: {}", name, message)
        }
        (_, Some(message)) => message,
        (Some(name), None) => name,
        (None, None) => "uncaught exception".to_string(),
    };

    ScriptError {
        message,
        file_name: None,
        line,
        stack,
    }
}

fn describe_thrown(value: &rquickjs::Value<'_>) -> String {
    if let Some(s) = value.as_string().and_then(|s| s.to_string().ok()) {
        s
    } else if let Some(i) = value.as_int() {
        i.to_string()
    } else if let Some(f) = value.as_float() {
        f.to_string()
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else if value.is_null() {
        "null".to_string()
    } else if value.is_undefined() {
        "undefined".to_string()
    } else {
        format!("uncaught {}", value.type_name())
    }
}

/// First line number found in a stack trace.
///
/// Frames look like `at fn (file:LINE)` or `at fn (file:LINE:COLUMN)`.
pub(crate) fn line_from_stack(stack: &str) -> Option<u32> {
    stack.lines().find_map(|frame| {
        let start = frame.find('(')?;
        let end = frame[start..].find(')').map_or(frame.len(), |e| start + e);
        let location = &frame[start + 1..end];
        location
            .split(':')
            .skip(1)
            .find_map(|part| part.trim().parse::<u32>().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_from_stack() {
        assert_eq!(line_from_stack("    at <eval> (eval_script:3)\n"), Some(3));
        assert_eq!(
            line_from_stack("    at foo (main.js:12:5)\n    at <eval> (main.js:20:1)"),
            Some(12)
        );
        assert_eq!(line_from_stack("    at print (native)\n    at <eval> (a.js:7)"), Some(7));
        assert_eq!(line_from_stack("no frames here"), None);
        assert_eq!(line_from_stack(""), None);
    }

    #[test]
    fn test_arena_retain_dedups_objects() {
        let rt = rquickjs::Runtime::new().unwrap();
        let engine = EngineContext::new(rquickjs::Context::full(&rt).unwrap());
        engine.context.with(|ctx| {
            let arena = Arena::new(&ctx, engine.pins.clone());
            let obj: rquickjs::Value = ctx.eval("({ a: 1 })").unwrap();

            let first = arena.retain(obj.clone());
            let second = arena.retain(obj.clone());
            assert_eq!(first, second);
            assert_eq!(engine.pins.len(), 1);

            assert!(arena.release(first));
            assert!(!arena.release(first));
            assert!(arena.lookup(first).unwrap().is_undefined());
            assert_eq!(engine.pins.len(), 0);

            let third = arena.retain(obj);
            assert!(third > first);
        });
        engine.pins.drain();
    }

    #[test]
    fn test_scoped_pin_ends_with_its_scope() {
        let rt = rquickjs::Runtime::new().unwrap();
        let engine = EngineContext::new(rquickjs::Context::full(&rt).unwrap());
        engine.context.with(|ctx| {
            let arena = Arena::new(&ctx, engine.pins.clone());
            let receiver: rquickjs::Value = ctx.eval("({ name: 'receiver' })").unwrap();
            let kept: rquickjs::Value = ctx.eval("({ name: 'kept' })").unwrap();

            let scoped = arena.retain_scoped(receiver);
            assert!(arena.unscope(scoped));
            assert!(arena.lookup(scoped).unwrap().is_undefined());

            let slot = arena.retain_scoped(kept.clone());
            assert_eq!(arena.retain(kept), slot);
            assert!(!arena.unscope(slot));
            assert!(arena.lookup(slot).unwrap().is_object());
            assert_eq!(engine.pins.len(), 1);
        });
        assert_eq!(engine.pins.drain(), 1);
    }

    #[test]
    fn test_arena_is_unreachable_from_script() {
        let rt = rquickjs::Runtime::new().unwrap();
        let engine = EngineContext::new(rquickjs::Context::full(&rt).unwrap());
        engine.context.with(|ctx| {
            let arena = Arena::new(&ctx, engine.pins.clone());
            let obj: rquickjs::Value = ctx.eval("({ tag: 'pinned' })").unwrap();
            let slot = arena.retain(obj);

            let names: Vec<String> = ctx
                .eval("Object.getOwnPropertyNames(globalThis).filter(n => n.startsWith('__'))")
                .unwrap();
            assert!(names.is_empty(), "{:?}", names);

            ctx.eval::<(), _>(
                "Map.prototype.get = () => 'forged'; WeakMap.prototype.get = () => 1;",
            )
            .unwrap();
            let resolved = arena.lookup(slot).unwrap();
            let tag: String = resolved.as_object().unwrap().get("tag").unwrap();
            assert_eq!(tag, "pinned");
        });
        engine.pins.drain();
    }

    #[test]
    fn test_engine_error_extracts_exception() {
        let rt = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&rt).unwrap();
        context.with(|ctx| {
            let err = ctx
                .eval::<(), _>("\nthrow new TypeError('bad thing')")
                .unwrap_err();
            let err = engine_error(&ctx, err, Some("test.js"));
            let script = err.as_script().unwrap();
            assert_eq!(script.message, "TypeError: bad thing");
            assert_eq!(script.file_name.as_deref(), Some("test.js"));
        });
    }

    #[test]
    fn test_engine_error_thrown_primitive() {
        let rt = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&rt).unwrap();
        context.with(|ctx| {
            let err = ctx.eval::<(), _>("throw 'plain'").unwrap_err();
            let err = engine_error(&ctx, err, None);
            assert_eq!(err.as_script().unwrap().message, "plain");
        });
    }
}
