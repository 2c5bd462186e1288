//! jsbridge - host/script bridge over an embedded QuickJS engine
//!
//! This crate lets a host application run scripts, exchange values with
//! them, expose host functions to scripts and call script functions back,
//! from any thread.
//!
//! # Example
//!
//! ```ignore
//! use jsbridge_core::{HostCallback, Runtime, Value};
//!
//! let runtime = Runtime::new()?;
//! let context = runtime.create_context()?;
//!
//! context.register("add", HostCallback::new(|_this, args| {
//!     Ok(args.get_as::<i32>(0)? + args.get_as::<i32>(1)?)
//! }))?;
//!
//! let sum: i32 = context.evaluate_typed("add(40, 2)", Some("main.js"))?;
//! assert_eq!(sum, 42);
//!
//! context.close()?;
//! runtime.close()?;
//! ```
//!
//! # Values and handles
//!
//! Primitive [`Value`]s are plain host data. [`Object`], [`Array`] and
//! [`Function`] are proxies over an engine value pinned by the context; two
//! proxies of the same engine value are equal. A proxy stays usable until it
//! is released or its context is closed, whichever comes first.
//!
//! # Threads
//!
//! Runtimes, contexts and values are `Send + Sync`. Engine entry is
//! serialized per runtime: a call from another thread blocks until the
//! engine is free, while a host callback may re-enter its own context on the
//! executing thread.

#![warn(missing_docs)]

mod array;
mod callback;
mod context;
mod engine;
mod error;
mod function;
mod handle;
mod lifecycle;
mod marshal;
mod object;
mod options;
mod runtime;
mod value;

pub use array::Array;
pub use callback::{HostCallback, HostError};
pub use context::Context;
pub use error::{Error, Result, ScriptError};
pub use function::Function;
pub use handle::{ContextId, HandleKey, HandleState, RuntimeId};
pub use object::Object;
pub use options::{
    ConfigError, RuntimeOptions, ENV_GC_THRESHOLD, ENV_MAX_STACK_SIZE, ENV_MEMORY_LIMIT,
};
pub use runtime::Runtime;
pub use value::{FromValue, IntoValue, Value, ValueType};
