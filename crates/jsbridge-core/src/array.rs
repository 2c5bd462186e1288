//! Array proxy

use crate::context::Context;
use crate::engine::CatchExt;
use crate::error::{Error, Result};
use crate::lifecycle::{reference_proxy, Handle};
use crate::marshal::{from_engine, pin, to_engine, to_engine_all};
use crate::value::{FromValue, IntoValue, Value, ValueType};

/// A script array: ordered, 0-based and growable
#[derive(Debug, Clone)]
pub struct Array {
    handle: Handle,
}

reference_proxy!(Array, ValueType::Array);

impl Array {
    /// Create an empty array in `context`
    pub fn new(context: &Context) -> Result<Self> {
        Self::from_values(context, Vec::<Value>::new())
    }

    /// Create an array holding `values`
    pub fn from_values<I, V>(context: &Context, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: IntoValue,
    {
        let values: Vec<Value> = values.into_iter().map(IntoValue::into_value).collect();
        context.enter(|ctx, arena| {
            let array = rquickjs::Array::new(ctx.clone()).catch_in(ctx)?;
            for (index, value) in to_engine_all(context, ctx, arena, &values)?
                .into_iter()
                .enumerate()
            {
                array.set(index, value).catch_in(ctx)?;
            }
            let handle = pin(context, arena, array.into_value(), ValueType::Array);
            Ok(Self::from_handle(handle))
        })
    }

    /// Number of elements
    pub fn len(&self) -> Result<usize> {
        self.handle
            .with_value(|_, _, value| Ok(as_engine_array(value)?.len()))
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Read an element. Out-of-range indices read as `Undefined`.
    pub fn get(&self, index: usize) -> Result<Value> {
        self.handle.with_value(|ctx, arena, value| {
            let element: rquickjs::Value = as_engine_array(value)?.get(index).catch_in(ctx)?;
            from_engine(self.context(), ctx, arena, element)
        })
    }

    /// Read an element and convert it
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        T::from_value(self.get(index)?)
    }

    /// Write an element, growing the array if needed
    pub fn set(&self, index: usize, value: impl IntoValue) -> Result<&Self> {
        let value = value.into_value();
        self.handle.with_value(|ctx, arena, target| {
            let array = as_engine_array(target)?;
            let value = to_engine(self.context(), ctx, arena, &value)?;
            array.set(index, value).catch_in(ctx)
        })?;
        Ok(self)
    }

    /// Append an element
    pub fn push(&self, value: impl IntoValue) -> Result<&Self> {
        let value = value.into_value();
        self.handle.with_value(|ctx, arena, target| {
            let array = as_engine_array(target)?;
            let value = to_engine(self.context(), ctx, arena, &value)?;
            array.set(array.len(), value).catch_in(ctx)
        })?;
        Ok(self)
    }

    /// Read every element
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        self.handle.with_value(|ctx, arena, value| {
            let array = as_engine_array(value)?;
            (0..array.len())
                .map(|index| {
                    let element = array.get(index).catch_in(ctx)?;
                    from_engine(self.context(), ctx, arena, element)
                })
                .collect()
        })
    }
}

pub(crate) fn as_engine_array(value: rquickjs::Value<'_>) -> Result<rquickjs::Array<'_>> {
    value
        .into_array()
        .ok_or_else(|| Error::invalid_state("handle no longer refers to an array"))
}
