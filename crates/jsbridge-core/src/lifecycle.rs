//! Release protocol for reference values
//!
//! A [`Handle`] is the host half of an arena slot: its key, the kind of value
//! it names and the context that produced it. Every access validates the
//! handle first, so use after release or after context closure is reported
//! as an error instead of touching engine memory.
//!
//! Release is explicit and non-cascading: releasing a container unpins only
//! the container. Values the bridge pins for a single host call (the
//! receiver and argument array of a callback) are released when that call
//! returns. Closing a context drops every record of that context at once;
//! the engine reclaims whatever nothing else references.

use crate::context::Context;
use crate::engine::{Arena, CatchExt};
use crate::error::{Error, Result};
use crate::handle::{HandleKey, HandleState};
use crate::value::ValueType;
use rquickjs::Ctx;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::trace;

/// Host reference to a pinned engine value
#[derive(Clone)]
pub(crate) struct Handle {
    key: HandleKey,
    kind: ValueType,
    context: Context,
}

impl Handle {
    pub(crate) fn new(key: HandleKey, kind: ValueType, context: Context) -> Self {
        Self { key, kind, context }
    }

    pub(crate) fn key(&self) -> HandleKey {
        self.key
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    /// Validate that the handle may be used
    pub(crate) fn check(&self) -> Result<()> {
        if self.context.is_closed() {
            return Err(Error::invalid_state(format!(
                "{} {} belongs to closed context {}",
                self.kind, self.key, self.key.context
            )));
        }
        match self.context.handles().state(self.key) {
            Some(HandleState::Live) => Ok(()),
            Some(HandleState::Released) => Err(Error::UseAfterRelease(format!(
                "{} {} was released",
                self.kind, self.key
            ))),
            None => Err(Error::invalid_state(format!(
                "{} {} is not known to its context",
                self.kind, self.key
            ))),
        }
    }

    /// Resolve the pinned engine value within `context`
    pub(crate) fn resolve<'js>(
        &self,
        context: &Context,
        ctx: &Ctx<'js>,
        arena: &Arena<'js>,
    ) -> Result<rquickjs::Value<'js>> {
        if context.id() != self.key.context {
            return Err(Error::invalid_state(format!(
                "{} {} cannot be used in context {}",
                self.kind,
                self.key,
                context.id()
            )));
        }
        self.check()?;
        arena.lookup(self.key.slot).catch_in(ctx)
    }

    /// Enter the owning context with the pinned value resolved
    pub(crate) fn with_value<F, R>(&self, f: F) -> Result<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>, &Arena<'js>, rquickjs::Value<'js>) -> Result<R> + Send,
        R: Send,
    {
        self.check()?;
        self.context.enter(|ctx, arena| {
            let value = self.resolve(&self.context, ctx, arena)?;
            f(ctx, arena, value)
        })
    }

    /// Check whether the handle has been released
    pub(crate) fn is_released(&self) -> bool {
        self.context.handles().state(self.key) == Some(HandleState::Released)
    }

    /// Release the handle.
    ///
    /// Releasing twice is a no-op; releasing after the context closed fails
    /// with `InvalidState`.
    pub(crate) fn release(&self) -> Result<()> {
        if self.is_released() && !self.context.is_closed() {
            return Ok(());
        }
        self.check()?;
        self.context.enter(|_, arena| {
            self.release_in(arena);
            Ok(())
        })
    }

    /// Release while already inside the owning context
    pub(crate) fn release_in(&self, arena: &Arena<'_>) {
        if !self.context.handles().mark_released(self.key) {
            return;
        }
        arena.release(self.key.slot);
        trace!(key = %self.key, kind = %self.kind, "released handle");
    }

    /// Close the call scope this handle was pinned for.
    ///
    /// The handle is released unless it was also handed out outside the
    /// scope.
    pub(crate) fn end_scope(&self, arena: &Arena<'_>) {
        if arena.unscope(self.key.slot) && self.context.handles().mark_released(self.key) {
            trace!(key = %self.key, kind = %self.kind, "scope ended");
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Common surface of the reference proxies
macro_rules! reference_proxy {
    ($ty:ident, $kind:expr) => {
        impl $ty {
            pub(crate) fn from_handle(handle: $crate::lifecycle::Handle) -> Self {
                Self { handle }
            }

            pub(crate) fn handle(&self) -> &$crate::lifecycle::Handle {
                &self.handle
            }

            /// Handle identity of this proxy
            pub fn key(&self) -> $crate::handle::HandleKey {
                self.handle.key()
            }

            /// Context that produced this value
            pub fn context(&self) -> &$crate::context::Context {
                self.handle.context()
            }

            /// Release the underlying handle.
            ///
            /// Values previously read out of it stay valid. Releasing twice
            /// is a no-op.
            pub fn release(&self) -> $crate::error::Result<()> {
                self.handle.release()
            }

            /// Check whether this value has been released
            pub fn is_released(&self) -> bool {
                self.handle.is_released()
            }

            /// Check whether this value can still be used
            pub fn is_live(&self) -> bool {
                self.handle.check().is_ok()
            }

            /// Variant tag of this proxy
            pub fn value_type(&self) -> $crate::value::ValueType {
                $kind
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.handle == other.handle
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.handle.hash(state);
            }
        }
    };
}

pub(crate) use reference_proxy;
