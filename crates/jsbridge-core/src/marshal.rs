//! Conversion between engine values and host [`Value`]s
//!
//! Primitives are copied across. Reference values are pinned in the arena
//! and registered in the handle table on the way out; on the way in, a proxy
//! resolves to the very engine value it was created from.

use crate::array::Array;
use crate::context::Context;
use crate::engine::{Arena, CatchExt};
use crate::error::{Error, Result, ScriptError};
use crate::function::Function;
use crate::handle::HandleKey;
use crate::lifecycle::Handle;
use crate::object::Object;
use crate::value::{Value, ValueType};
use rquickjs::Ctx;

/// How long a pinned value stays pinned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retention {
    /// Until the host releases it
    Held,
    /// Until the current host call returns
    Scoped,
}

/// Convert an engine value to a host value
pub(crate) fn from_engine<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    value: rquickjs::Value<'js>,
) -> Result<Value> {
    convert(context, ctx, arena, value, Retention::Held)
}

/// Convert an engine value for the duration of one host call
pub(crate) fn from_engine_scoped<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    value: rquickjs::Value<'js>,
) -> Result<Value> {
    convert(context, ctx, arena, value, Retention::Scoped)
}

fn convert<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    value: rquickjs::Value<'js>,
    retention: Retention,
) -> Result<Value> {
    let kind = match classify(&value)? {
        ValueType::Undefined => return Ok(Value::Undefined),
        ValueType::Null => return Ok(Value::Null),
        ValueType::Boolean => return Ok(value.as_bool().map_or(Value::Undefined, Value::Boolean)),
        ValueType::Integer => return Ok(value.as_int().map_or(Value::Undefined, Value::Integer)),
        ValueType::Double => return Ok(value.as_float().map_or(Value::Undefined, Value::Double)),
        ValueType::String => {
            return match value.as_string() {
                Some(s) => s.to_string().catch_in(ctx).map(Value::String),
                None => Ok(Value::Undefined),
            }
        }
        kind => kind,
    };

    let handle = pin_with(context, arena, value, kind, retention);
    Ok(match kind {
        ValueType::Array => Value::Array(Array::from_handle(handle)),
        ValueType::Function => Value::Function(Function::from_handle(handle)),
        _ => Value::Object(Object::from_handle(handle)),
    })
}

/// Variant an engine value marshals to
pub(crate) fn classify(value: &rquickjs::Value<'_>) -> Result<ValueType> {
    let kind = if value.is_undefined() {
        ValueType::Undefined
    } else if value.is_null() {
        ValueType::Null
    } else if value.is_bool() {
        ValueType::Boolean
    } else if value.is_int() {
        ValueType::Integer
    } else if value.is_float() {
        ValueType::Double
    } else if value.is_string() {
        ValueType::String
    } else if value.is_array() {
        ValueType::Array
    } else if value.is_function() {
        ValueType::Function
    } else if value.is_object() {
        ValueType::Object
    } else {
        return Err(Error::Script(ScriptError::new(format!(
            "unsupported engine value: {}",
            value.type_name()
        ))));
    };
    Ok(kind)
}

/// Pin an engine value and register its handle
pub(crate) fn pin<'js>(
    context: &Context,
    arena: &Arena<'js>,
    value: rquickjs::Value<'js>,
    kind: ValueType,
) -> Handle {
    pin_with(context, arena, value, kind, Retention::Held)
}

/// Pin an engine value for the duration of one host call
pub(crate) fn pin_scoped<'js>(
    context: &Context,
    arena: &Arena<'js>,
    value: rquickjs::Value<'js>,
    kind: ValueType,
) -> Handle {
    pin_with(context, arena, value, kind, Retention::Scoped)
}

fn pin_with<'js>(
    context: &Context,
    arena: &Arena<'js>,
    value: rquickjs::Value<'js>,
    kind: ValueType,
    retention: Retention,
) -> Handle {
    let slot = match retention {
        Retention::Held => arena.retain(value),
        Retention::Scoped => arena.retain_scoped(value),
    };
    let key = HandleKey {
        context: context.id(),
        slot,
    };
    context.handles().register(key, kind);
    Handle::new(key, kind, context.clone())
}

/// Convert a host value to an engine value
pub(crate) fn to_engine<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    value: &Value,
) -> Result<rquickjs::Value<'js>> {
    let converted = match value {
        Value::Undefined => rquickjs::Value::new_undefined(ctx.clone()),
        Value::Null => rquickjs::Value::new_null(ctx.clone()),
        Value::Integer(i) => rquickjs::Value::new_int(ctx.clone(), *i),
        Value::Double(d) => rquickjs::Value::new_float(ctx.clone(), *d),
        Value::Boolean(b) => rquickjs::Value::new_bool(ctx.clone(), *b),
        Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)
            .catch_in(ctx)?
            .into_value(),
        Value::Object(o) => o.handle().resolve(context, ctx, arena)?,
        Value::Array(a) => a.handle().resolve(context, ctx, arena)?,
        Value::Function(f) => f.handle().resolve(context, ctx, arena)?,
    };
    Ok(converted)
}

/// Convert a slice of host values to engine values
pub(crate) fn to_engine_all<'js>(
    context: &Context,
    ctx: &Ctx<'js>,
    arena: &Arena<'js>,
    values: &[Value],
) -> Result<Vec<rquickjs::Value<'js>>> {
    values
        .iter()
        .map(|value| to_engine(context, ctx, arena, value))
        .collect()
}
