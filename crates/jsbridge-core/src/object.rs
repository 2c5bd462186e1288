//! Object proxy

use crate::context::Context;
use crate::engine::CatchExt;
use crate::error::{Error, Result};
use crate::lifecycle::{reference_proxy, Handle};
use crate::marshal::{from_engine, pin, to_engine};
use crate::value::{FromValue, IntoValue, Value, ValueType};

/// A script object: an unordered mapping from string keys to values
#[derive(Debug, Clone)]
pub struct Object {
    handle: Handle,
}

reference_proxy!(Object, ValueType::Object);

impl Object {
    /// Create an empty object in `context`
    pub fn new(context: &Context) -> Result<Self> {
        context.enter(|ctx, arena| {
            let object = rquickjs::Object::new(ctx.clone()).catch_in(ctx)?;
            let handle = pin(context, arena, object.into_value(), ValueType::Object);
            Ok(Self::from_handle(handle))
        })
    }

    /// Read a property. Missing properties read as `Undefined`.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.handle.with_value(|ctx, arena, value| {
            let object = as_engine_object(value)?;
            let property: rquickjs::Value = object.get(key).catch_in(ctx)?;
            from_engine(self.context(), ctx, arena, property)
        })
    }

    /// Read a property and convert it
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T> {
        T::from_value(self.get(key)?)
    }

    /// Write a property
    pub fn set(&self, key: &str, value: impl IntoValue) -> Result<&Self> {
        let value = value.into_value();
        self.handle.with_value(|ctx, arena, target| {
            let object = as_engine_object(target)?;
            let value = to_engine(self.context(), ctx, arena, &value)?;
            object.set(key, value).catch_in(ctx)
        })?;
        Ok(self)
    }

    /// Check whether a property exists (own or inherited)
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        self.handle.with_value(|ctx, _, value| {
            as_engine_object(value)?.contains_key(key).catch_in(ctx)
        })
    }

    /// Delete an own property
    pub fn remove(&self, key: &str) -> Result<()> {
        self.handle.with_value(|ctx, _, value| {
            as_engine_object(value)?.remove(key).catch_in(ctx)
        })
    }

    /// Own enumerable string keys, in engine order
    pub fn keys(&self) -> Result<Vec<String>> {
        self.handle.with_value(|ctx, _, value| {
            as_engine_object(value)?
                .keys::<String>()
                .collect::<rquickjs::Result<Vec<_>>>()
                .catch_in(ctx)
        })
    }
}

fn as_engine_object(value: rquickjs::Value<'_>) -> Result<rquickjs::Object<'_>> {
    value
        .into_object()
        .ok_or_else(|| Error::invalid_state("handle no longer refers to an object"))
}
