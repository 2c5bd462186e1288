//! Tests for the value model: marshalling, identity and coercion

use jsbridge_core::{Array, Context, Error, Object, Runtime, Value, ValueType};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

fn setup() -> (Runtime, Context) {
    let runtime = Runtime::new().unwrap();
    let context = runtime.create_context().unwrap();
    (runtime, context)
}

fn teardown(runtime: Runtime, context: Context) {
    context.close().unwrap();
    runtime.close().unwrap();
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Primitive Round Trips
// ============================================================================

#[test]
fn test_primitive_round_trip() {
    let (runtime, context) = setup();

    let samples = vec![
        Value::Integer(0),
        Value::Integer(i32::MAX),
        Value::Integer(i32::MIN),
        Value::Double(3.14),
        Value::Double(f64::MAX),
        Value::Double(-0.5),
        Value::Boolean(true),
        Value::Boolean(false),
        Value::String(String::new()),
        Value::String("Hello".to_string()),
        Value::String("héllo wörld ✓".to_string()),
        Value::Null,
        Value::Undefined,
    ];

    for sample in samples {
        context.set_global("sample", sample.clone()).unwrap();
        let back = context.get_global("sample").unwrap();
        assert_eq!(back, sample, "round trip of {:?}", sample);
        assert_eq!(hash_of(&back), hash_of(&sample));
    }

    teardown(runtime, context);
}

#[test]
fn test_round_trip_through_script() {
    let (runtime, context) = setup();

    context.set_global("n", i32::MAX).unwrap();
    assert_eq!(context.evaluate_typed::<i32>("n", None).unwrap(), i32::MAX);

    context.set_global("d", f64::MAX).unwrap();
    assert_eq!(context.evaluate_typed::<f64>("d", None).unwrap(), f64::MAX);

    context.set_global("s", "").unwrap();
    assert_eq!(context.evaluate_typed::<String>("s", None).unwrap(), "");
    assert_eq!(context.evaluate_typed::<i32>("s.length", None).unwrap(), 0);

    context.set_global("b", false).unwrap();
    assert!(context.evaluate_typed::<bool>("!b", None).unwrap());

    teardown(runtime, context);
}

#[test]
fn test_integral_double_reads_as_integer() {
    let (runtime, context) = setup();

    let value = context.evaluate("6 / 2", None).unwrap();
    assert_eq!(value, Value::Integer(3));
    assert_eq!(context.evaluate_typed::<i32>("6 / 2", None).unwrap(), 3);
    assert_eq!(context.evaluate_typed::<f64>("1 / 4", None).unwrap(), 0.25);

    teardown(runtime, context);
}

// ============================================================================
// Undefined
// ============================================================================

#[test]
fn test_out_of_range_index_is_undefined() {
    let (runtime, context) = setup();

    let array = Array::new(&context).unwrap();
    let value = array.get(0).unwrap();
    assert!(value.is_undefined());
    assert_eq!(value.value_type(), ValueType::Undefined);
    assert_eq!(value, Value::Undefined);
    assert_eq!(hash_of(&value), hash_of(&Value::Undefined));
    array.release().unwrap();

    teardown(runtime, context);
}

#[test]
fn test_missing_global_is_undefined() {
    let (runtime, context) = setup();

    assert!(context.get_global("doesNotExist").unwrap().is_undefined());
    assert!(context.evaluate("var x;", None).unwrap().is_undefined());

    teardown(runtime, context);
}

// ============================================================================
// Handle Identity
// ============================================================================

#[test]
fn test_same_handle_equal_and_hash() {
    let (runtime, context) = setup();

    context.execute_void("var shared = { a: 1 };", Some("file.js")).unwrap();
    let first = context.get_global("shared").unwrap();
    let second = context.get_global("shared").unwrap();
    assert_eq!(first, second);
    assert_eq!(hash_of(&first), hash_of(&second));

    let mut set = HashSet::new();
    set.insert(first.as_object().unwrap().clone());
    assert!(set.contains(second.as_object().unwrap()));

    teardown(runtime, context);
}

#[test]
fn test_distinct_arrays_with_same_content_differ() {
    let (runtime, context) = setup();

    let a = context.execute_array("[1, 2, 3]", None).unwrap();
    let b = context.execute_array("[1, 2, 3]", None).unwrap();
    assert_ne!(a, b);
    assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());

    teardown(runtime, context);
}

#[test]
fn test_proxy_preserves_identity_into_script() {
    let (runtime, context) = setup();

    let object = Object::new(&context).unwrap();
    object.set("name", "shared").unwrap();
    context.set_global("first", &object).unwrap();

    let holder = Array::new(&context).unwrap();
    holder.push(&object).unwrap().push(&object).unwrap();
    context.set_global("holder", &holder).unwrap();

    assert!(context
        .evaluate_typed::<bool>("holder[0] === first && holder[1] === first", None)
        .unwrap());
    assert_eq!(holder.get(1).unwrap(), Value::Object(object.clone()));

    teardown(runtime, context);
}

#[test]
fn test_engine_classification() {
    let (runtime, context) = setup();

    let cases = [
        ("({})", ValueType::Object),
        ("[]", ValueType::Array),
        ("(function () {})", ValueType::Function),
        ("(() => 1)", ValueType::Function),
        ("({ 0: 'a', 1: 'b', length: 2 })", ValueType::Object),
        ("new Date(0)", ValueType::Object),
        ("'str'", ValueType::String),
        ("true", ValueType::Boolean),
        ("null", ValueType::Null),
    ];
    for (source, expected) in cases {
        let value = context.evaluate(source, None).unwrap();
        assert_eq!(value.value_type(), expected, "{}", source);
    }

    teardown(runtime, context);
}

#[test]
fn test_unsupported_engine_value() {
    let (runtime, context) = setup();

    let err = context.evaluate("Symbol('s')", None).unwrap_err();
    assert!(err.is_script());
    assert!(err.to_string().contains("unsupported engine value"));
    // The context stays usable
    assert_eq!(context.evaluate_typed::<i32>("1", None).unwrap(), 1);

    teardown(runtime, context);
}

// ============================================================================
// Objects and Arrays
// ============================================================================

#[test]
fn test_object_properties() {
    let (runtime, context) = setup();

    let object = Object::new(&context).unwrap();
    object
        .set("int", 1)
        .unwrap()
        .set("text", "Hello")
        .unwrap()
        .set("flag", true)
        .unwrap();

    assert_eq!(object.get_as::<i32>("int").unwrap(), 1);
    assert_eq!(object.get_as::<String>("text").unwrap(), "Hello");
    assert!(object.get_as::<bool>("flag").unwrap());
    assert!(object.get("missing").unwrap().is_undefined());
    assert!(object.contains_key("int").unwrap());
    assert_eq!(object.keys().unwrap(), vec!["int", "text", "flag"]);

    object.remove("int").unwrap();
    assert!(!object.contains_key("int").unwrap());

    teardown(runtime, context);
}

#[test]
fn test_array_operations() {
    let (runtime, context) = setup();

    let array = Array::from_values(&context, [1, 2]).unwrap();
    assert_eq!(array.len().unwrap(), 2);
    array.push("three").unwrap().push(4.5).unwrap();
    assert_eq!(array.len().unwrap(), 4);
    assert_eq!(array.get_as::<String>(2).unwrap(), "three");
    assert_eq!(array.get_as::<f64>(3).unwrap(), 4.5);

    array.set(5, true).unwrap();
    assert_eq!(array.len().unwrap(), 6);
    assert!(array.get(4).unwrap().is_undefined());

    context.set_global("arr", &array).unwrap();
    assert_eq!(context.evaluate_typed::<i32>("arr.length", None).unwrap(), 6);
    assert!(Array::new(&context).unwrap().is_empty().unwrap());

    teardown(runtime, context);
}

#[test]
fn test_global_object_proxy() {
    let (runtime, context) = setup();

    let global = context.global().unwrap();
    global.set("fromHost", 42).unwrap();
    assert_eq!(context.evaluate_typed::<i32>("fromHost", None).unwrap(), 42);
    assert_eq!(global, context.evaluate("globalThis", None).unwrap().as_object().unwrap().clone());

    teardown(runtime, context);
}

// ============================================================================
// Coercion
// ============================================================================

#[test]
fn test_object_to_integer_fails() {
    let (runtime, context) = setup();

    let err = context.evaluate_typed::<i32>("({})", None).unwrap_err();
    assert!(matches!(
        err,
        Error::TypeCoercion {
            expected: ValueType::Integer,
            actual: ValueType::Object
        }
    ));

    teardown(runtime, context);
}

#[test]
fn test_undefined_to_primitive_fails() {
    let (runtime, context) = setup();

    assert!(matches!(
        context.evaluate_typed::<i32>("undefined", None),
        Err(Error::TypeCoercion { actual: ValueType::Undefined, .. })
    ));
    assert!(matches!(
        context.evaluate_typed::<String>("void 0", None),
        Err(Error::TypeCoercion { actual: ValueType::Undefined, .. })
    ));
    assert_eq!(context.evaluate_typed::<Option<i32>>("undefined", None).unwrap(), None);

    teardown(runtime, context);
}

#[test]
fn test_execute_array_requires_array() {
    let (runtime, context) = setup();

    assert!(matches!(
        context.execute_array("({})", None),
        Err(Error::TypeCoercion { expected: ValueType::Array, actual: ValueType::Object })
    ));
    let array = context.execute_array("['Hello']", None).unwrap();
    assert_eq!(array.get_as::<String>(0).unwrap(), "Hello");

    teardown(runtime, context);
}
