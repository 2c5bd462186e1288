//! Host callbacks callable from script
//!
//! A [`HostCallback`] becomes an engine function whose invocation
//! dispatches back into host code:
//!
//! 1. the receiver and arguments are marshalled to host values, both scoped
//!    to this one call (the arguments as an [`Array`]),
//! 2. the callback runs synchronously on the thread executing the engine,
//! 3. the result is marshalled back, or the failure is thrown into the
//!    script as an `Error` exception.
//!
//! Panics are caught at the boundary and treated like any other failure.

use crate::array::Array;
use crate::context::{Context, ContextInner};
use crate::engine::{Arena, CatchExt};
use crate::error::{Error, Result};
use crate::marshal::{from_engine_scoped, pin_scoped, to_engine};
use crate::value::{IntoValue, Value, ValueType};
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Exception};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Failure reported by a host callback
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A bridge operation inside the callback failed
    #[error(transparent)]
    Bridge(#[from] Error),

    /// The callback reported a failure
    #[error("{0}")]
    Failed(String),

    /// The callback panicked
    #[error("Host callback panicked: {0}")]
    Panicked(String),
}

impl HostError {
    /// Create a failure with a message
    pub fn msg(message: impl Into<String>) -> Self {
        HostError::Failed(message.into())
    }
}

type CallbackFn = dyn Fn(&Value, &Array) -> std::result::Result<Value, HostError> + Send + Sync;

/// A host function exposed to scripts
#[derive(Clone)]
pub struct HostCallback {
    func: Arc<CallbackFn>,
    returns_value: bool,
}

impl HostCallback {
    /// A callback returning a value
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&Value, &Array) -> std::result::Result<R, HostError> + Send + Sync + 'static,
        R: IntoValue,
    {
        Self {
            func: Arc::new(move |receiver, args| f(receiver, args).map(IntoValue::into_value)),
            returns_value: true,
        }
    }

    /// A callback returning nothing; the script sees `undefined`
    pub fn void<F>(f: F) -> Self
    where
        F: Fn(&Value, &Array) -> std::result::Result<(), HostError> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(move |receiver, args| f(receiver, args).map(|()| Value::Undefined)),
            returns_value: false,
        }
    }

    /// Check if this callback produces a value
    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    fn invoke(&self, receiver: &Value, args: &Array) -> std::result::Result<Value, HostError> {
        match catch_unwind(AssertUnwindSafe(|| (self.func)(receiver, args))) {
            Ok(result) => result,
            Err(payload) => Err(HostError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallback")
            .field("returns_value", &self.returns_value)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Create the engine function backing `callback`.
///
/// The function holds its context weakly; once the context is gone, calling
/// it throws.
pub(crate) fn into_engine<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    callback: HostCallback,
) -> Result<rquickjs::Function<'js>> {
    let owner = Arc::downgrade(context.inner());
    rquickjs::Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<rquickjs::Value<'js>>, args: Rest<rquickjs::Value<'js>>| {
            dispatch(&owner, &callback, ctx, this.0, args.0)
        },
    )
    .catch_in(ctx)
}

fn dispatch<'js>(
    owner: &Weak<ContextInner>,
    callback: &HostCallback,
    ctx: Ctx<'js>,
    this: rquickjs::Value<'js>,
    args: Vec<rquickjs::Value<'js>>,
) -> rquickjs::Result<rquickjs::Value<'js>> {
    let Some(inner) = owner.upgrade() else {
        return Err(Exception::throw_message(&ctx, "host callback outlived its context"));
    };
    let Some(pins) = inner.pins() else {
        return Err(Exception::throw_message(&ctx, "context of host callback is closed"));
    };
    let context = Context::from_inner(inner);
    let arena = Arena::new(&ctx, pins);

    match run(&context, &ctx, &arena, callback, this, args) {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(context = %context.id(), error = %err, "host callback failed");
            Err(Exception::throw_message(&ctx, &err.to_string()))
        }
    }
}

fn run<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    callback: &HostCallback,
    this: rquickjs::Value<'js>,
    args: Vec<rquickjs::Value<'js>>,
) -> std::result::Result<rquickjs::Value<'js>, HostError> {
    let engine_args = rquickjs::Array::new(ctx.clone()).catch_in(ctx)?;
    for (index, arg) in args.into_iter().enumerate() {
        engine_args.set(index, arg).catch_in(ctx)?;
    }
    let receiver = from_engine_scoped(context, ctx, arena, this)?;
    let arguments = Array::from_handle(pin_scoped(
        context,
        arena,
        engine_args.into_value(),
        ValueType::Array,
    ));
    trace!(context = %context.id(), args = %arguments.key(), "dispatching host callback");

    let result = callback
        .invoke(&receiver, &arguments)
        .and_then(|value| Ok(to_engine(context, ctx, arena, &value)?));

    arguments.handle().end_scope(arena);
    if let Some(handle) = receiver.handle() {
        handle.end_scope(arena);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }

    #[test]
    fn test_host_error_display() {
        assert_eq!(HostError::msg("nope").to_string(), "nope");
        assert_eq!(
            HostError::Panicked("boom".into()).to_string(),
            "Host callback panicked: boom"
        );
        let bridge: HostError = Error::UseAfterRelease("object ctx#1/2 was released".into()).into();
        assert_eq!(bridge.to_string(), "Use after release: object ctx#1/2 was released");
    }

    #[test]
    fn test_callback_shapes() {
        let value = HostCallback::new(|_, _| Ok(1));
        let void = HostCallback::void(|_, _| Ok(()));
        assert!(value.returns_value());
        assert!(!void.returns_value());
    }
}
