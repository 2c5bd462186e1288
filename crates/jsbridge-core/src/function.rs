//! Function proxy
//!
//! A [`Function`] is either script code or a host callback registered
//! through [`Function::new`]; both are invoked the same way.

use crate::array::{as_engine_array, Array};
use crate::callback::{self, HostCallback};
use crate::context::Context;
use crate::engine::{Arena, CatchExt};
use crate::error::{Error, Result};
use crate::lifecycle::{reference_proxy, Handle};
use crate::marshal::{from_engine, pin, to_engine, to_engine_all};
use crate::value::{FromValue, Value, ValueType};
use rquickjs::function::Args;
use rquickjs::Ctx;

/// A callable script value
#[derive(Debug, Clone)]
pub struct Function {
    handle: Handle,
}

reference_proxy!(Function, ValueType::Function);

/// Where call arguments come from
enum Arguments<'a> {
    Array(&'a Array),
    Values(&'a [Value]),
}

impl Function {
    /// Wrap a host callback as a function of `context`
    pub fn new(context: &Context, callback: HostCallback) -> Result<Self> {
        context.enter(|ctx, arena| {
            let function = callback::into_engine(context, ctx, callback)?;
            let handle = pin(context, arena, function.into_value(), ValueType::Function);
            Ok(Self::from_handle(handle))
        })
    }

    /// Call with `receiver` as `this` and the elements of `args` as arguments.
    ///
    /// `None` for either means `undefined` receiver / no arguments. When
    /// `expected` is given the result is coerced to that type.
    pub fn call(
        &self,
        expected: Option<ValueType>,
        receiver: Option<&Value>,
        args: Option<&Array>,
    ) -> Result<Value> {
        let args = match args {
            Some(array) => Arguments::Array(array),
            None => Arguments::Values(&[]),
        };
        let result = self.apply(receiver, args)?;
        match expected {
            Some(expected) => result.coerce(expected),
            None => Ok(result),
        }
    }

    /// Call and convert the result
    pub fn call_as<T: FromValue>(&self, receiver: Option<&Value>, args: Option<&Array>) -> Result<T> {
        let args = match args {
            Some(array) => Arguments::Array(array),
            None => Arguments::Values(&[]),
        };
        T::from_value(self.apply(receiver, args)?)
    }

    /// Call with an `undefined` receiver and host values as arguments
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        self.apply(None, Arguments::Values(args))
    }

    fn apply(&self, receiver: Option<&Value>, args: Arguments<'_>) -> Result<Value> {
        let receiver = receiver.cloned().unwrap_or_default();
        self.handle.with_value(|ctx, arena, value| {
            let function = value
                .into_function()
                .ok_or_else(|| Error::invalid_state("handle no longer refers to a function"))?;
            let this = to_engine(self.context(), ctx, arena, &receiver)?;
            let args = collect_arguments(self.context(), ctx, arena, &args)?;
            let result = call_engine(ctx, &function, this, args)?;
            from_engine(self.context(), ctx, arena, result)
        })
    }
}

fn collect_arguments<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    args: &Arguments<'_>,
) -> Result<Vec<rquickjs::Value<'js>>> {
    match args {
        Arguments::Values(values) => to_engine_all(context, ctx, arena, values),
        Arguments::Array(array) => {
            let array = as_engine_array(array.handle().resolve(context, ctx, arena)?)?;
            (0..array.len())
                .map(|index| array.get(index).catch_in(ctx))
                .collect()
        }
    }
}

/// Invoke an engine function with an explicit receiver
pub(crate) fn call_engine<'js>(
    ctx: &Ctx<'js>,
    function: &rquickjs::Function<'js>,
    this: rquickjs::Value<'js>,
    args: Vec<rquickjs::Value<'js>>,
) -> Result<rquickjs::Value<'js>> {
    let mut call = Args::new(ctx.clone(), args.len());
    call.this(this).catch_in(ctx)?;
    for arg in args {
        call.push_arg(arg).catch_in(ctx)?;
    }
    function.call_arg::<rquickjs::Value>(call).catch_in(ctx)
}
