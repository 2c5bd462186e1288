//! Host-side value model
//!
//! `Value` is a closed tagged union over everything that can cross the
//! boundary. Primitive variants are plain host data and need no release.
//! Reference variants (`Object`, `Array`, `Function`) are proxies over a
//! pinned engine handle; their equality and hashing follow handle identity,
//! not content.

use crate::array::Array;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::lifecycle::Handle;
use crate::object::Object;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Variant tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// 32-bit integer
    Integer,
    /// 64-bit float
    Double,
    /// Boolean
    Boolean,
    /// String
    String,
    /// Plain object
    Object,
    /// Array (as classified by the engine)
    Array,
    /// Callable function
    Function,
}

impl ValueType {
    /// Lowercase name of the type
    pub const fn name(&self) -> &'static str {
        match self {
            ValueType::Undefined => "undefined",
            ValueType::Null => "null",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Function => "function",
        }
    }

    /// Check if values of this type are backed by an engine handle
    pub const fn is_reference(&self) -> bool {
        matches!(self, ValueType::Object | ValueType::Array | ValueType::Function)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value exchanged between host and script
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// `undefined`; equal across every context
    #[default]
    Undefined,
    /// `null`
    Null,
    /// 32-bit integer
    Integer(i32),
    /// 64-bit float
    Double(f64),
    /// Boolean
    Boolean(bool),
    /// String
    String(String),
    /// Object proxy
    Object(Object),
    /// Array proxy
    Array(Array),
    /// Function proxy
    Function(Function),
}

impl Value {
    /// Get the variant tag
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Undefined => ValueType::Undefined,
            Value::Null => ValueType::Null,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Boolean(_) => ValueType::Boolean,
            Value::String(_) => ValueType::String,
            Value::Object(_) => ValueType::Object,
            Value::Array(_) => ValueType::Array,
            Value::Function(_) => ValueType::Function,
        }
    }

    /// Check if value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is a reference variant
    pub fn is_reference(&self) -> bool {
        self.value_type().is_reference()
    }

    /// Get as i32 if this is an integer
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a number of either kind
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Integer(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    /// Get as bool if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as str if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the object proxy
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get the array proxy
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get the function proxy
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Coerce to the given type, failing when the variant does not allow it
    pub fn coerce(self, expected: ValueType) -> Result<Value> {
        match expected {
            ValueType::Integer => i32::from_value(self).map(Value::Integer),
            ValueType::Double => f64::from_value(self).map(Value::Double),
            ValueType::Boolean => bool::from_value(self).map(Value::Boolean),
            ValueType::String => String::from_value(self).map(Value::String),
            _ if self.value_type() == expected => Ok(self),
            _ => Err(Error::coercion(expected, self.value_type())),
        }
    }

    pub(crate) fn handle(&self) -> Option<&Handle> {
        match self {
            Value::Object(o) => Some(o.handle()),
            Value::Array(a) => Some(a.handle()),
            Value::Function(f) => Some(f.handle()),
            _ => None,
        }
    }

    /// Release the underlying handle of a reference variant.
    ///
    /// No-op for primitives. Releasing a container does not release values
    /// previously read out of it.
    pub fn release(&self) -> Result<()> {
        match self {
            Value::Object(o) => o.release(),
            Value::Array(a) => a.release(),
            Value::Function(f) => f.release(),
            _ => Ok(()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Integer(a), Value::Double(b)) | (Value::Double(b), Value::Integer(a)) => {
                f64::from(*a) == *b
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            // Integers and integral doubles compare equal, so they share a hash
            Value::Integer(i) => number_bits(f64::from(*i)).hash(state),
            Value::Double(d) => number_bits(*d).hash(state),
            Value::Object(o) => o.hash(state),
            Value::Array(a) => a.hash(state),
            Value::Function(f) => f.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::String(s) => s.hash(state),
            Value::Undefined | Value::Null => {}
        }
        self.hash_class().hash(state);
    }
}

impl Value {
    fn hash_class(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Double,
            other => other.value_type(),
        }
    }
}

fn number_bits(d: f64) -> u64 {
    if d == 0.0 {
        0.0f64.to_bits()
    } else {
        d.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(o) => write!(f, "[object {}]", o.key()),
            Value::Array(a) => write!(f, "[array {}]", a.key()),
            Value::Function(func) => write!(f, "[function {}]", func.key()),
        }
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

/// Convert a [`Value`] into a host type.
///
/// Fails with `TypeCoercion` when the variant cannot be represented.
pub trait FromValue: Sized {
    /// Convert from a Value
    fn from_value(value: Value) -> Result<Self>;
}

/// Convert a host type into a [`Value`]
pub trait IntoValue {
    /// Convert to a Value
    fn into_value(self) -> Value;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &Value {
    fn into_value(self) -> Value {
        self.clone()
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            Value::Double(d)
                if d.fract() == 0.0 && d >= f64::from(i32::MIN) && d <= f64::from(i32::MAX) =>
            {
                Ok(d as i32)
            }
            other => Err(Error::coercion(ValueType::Integer, other.value_type())),
        }
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Double(d) => Ok(d),
            Value::Integer(i) => Ok(f64::from(i)),
            other => Err(Error::coercion(ValueType::Double, other.value_type())),
        }
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(Error::coercion(ValueType::Boolean, other.value_type())),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::coercion(ValueType::String, other.value_type())),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl FromValue for () {
    fn from_value(_value: Value) -> Result<Self> {
        Ok(())
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Undefined
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Undefined | Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

macro_rules! reference_conversions {
    ($ty:ident) => {
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$ty(v) => Ok(v),
                    other => Err(Error::coercion(ValueType::$ty, other.value_type())),
                }
            }
        }

        impl IntoValue for $ty {
            fn into_value(self) -> Value {
                Value::$ty(self)
            }
        }

        impl IntoValue for &$ty {
            fn into_value(self) -> Value {
                Value::$ty(self.clone())
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$ty(v)
            }
        }
    };
}

reference_conversions!(Object);
reference_conversions!(Array);
reference_conversions!(Function);

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
