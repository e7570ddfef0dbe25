//! Dynamic values carried by attributes, events and construction configs
//!
//! Attributes are declared at runtime and shared between independently
//! written levels and capabilities, so their payload is a small dynamic
//! value type rather than a generic parameter.
//!
//! Equality is structural for data variants. Handlers, instance references
//! and opaque objects compare by identity, which is what attribute change
//! detection needs: re-setting the same handler is not a change.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::events::Handler;
use crate::instance::{Instance, WeakInstance};

/// Insertion-ordered string-keyed mapping of values
pub type ValueMap = IndexMap<String, Value>;

/// A dynamically typed value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(ValueMap),
    /// An event handler (used by the `on`/`after` construction keys)
    Handler(Handler),
    /// Non-owning reference to a peer instance
    Ref(WeakInstance),
    /// Opaque shared payload
    Object(Rc<dyn Any>),
}

impl Value {
    /// Short name of the variant, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Handler(_) => "handler",
            Value::Ref(_) => "ref",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view, accepting both integers and floats
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Value::Handler(h) => Some(h),
            _ => None,
        }
    }

    /// Upgrade an instance reference, if it is still alive
    pub fn as_instance(&self) -> Option<Instance> {
        match self {
            Value::Ref(weak) => weak.upgrade(),
            _ => None,
        }
    }

    /// Downcast an opaque object payload
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Wrap an arbitrary value as an opaque object
    pub fn object<T: 'static>(value: T) -> Self {
        Value::Object(Rc::new(value))
    }

    /// Read a nested value through a chain of mapping keys
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for key in path {
            current = current.as_map()?.get(*key)?;
        }
        Some(current)
    }

    /// Write a nested value through a chain of mapping keys
    ///
    /// Every intermediate value must already be a mapping; the last key is
    /// inserted if absent. Returns `false` when the path cannot be walked.
    pub fn set_path(&mut self, path: &[&str], value: Value) -> bool {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return true;
        };
        let mut current = self;
        for key in parents {
            match current.as_map_mut().and_then(|m| m.get_mut(*key)) {
                Some(next) => current = next,
                None => return false,
            }
        }
        match current.as_map_mut() {
            Some(map) => {
                map.insert((*last).to_string(), value);
                true
            }
            None => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // NaN equals NaN so re-setting it is not a change
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Handler(a), Value::Handler(b)) => Rc::ptr_eq(a, b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Handler(h) => write!(f, "Handler({:p})", Rc::as_ptr(h)),
            Value::Ref(weak) => write!(f, "Ref({weak:?})"),
            Value::Object(obj) => write!(f, "Object({:p})", Rc::as_ptr(obj)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x as f64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl From<Handler> for Value {
    fn from(h: Handler) -> Self {
        Value::Handler(h)
    }
}

impl From<WeakInstance> for Value {
    fn from(weak: WeakInstance) -> Self {
        Value::Ref(weak)
    }
}

impl From<&Instance> for Value {
    fn from(instance: &Instance) -> Self {
        Value::Ref(instance.downgrade())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a [`ValueMap`] from `key => value` pairs
///
/// ```
/// use tessera_core::{value_map, Value};
///
/// let cfg = value_map! { "label" => "Save", "width" => 120 };
/// assert_eq!(cfg.get("width"), Some(&Value::Int(120)));
/// ```
#[macro_export]
macro_rules! value_map {
    () => { $crate::value::ValueMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::ValueMap::new();
        $(map.insert(::std::string::String::from($key), $crate::value::Value::from($value));)+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Value::from(vec![Value::from(1), Value::from("x")]);
        let b = Value::from(vec![Value::from(1), Value::from("x")]);
        assert_eq!(a, b);
        assert_ne!(Value::from(1), Value::from(1.0));
        assert_ne!(Value::Null, Value::from(false));
    }

    #[test]
    fn test_nan_equals_itself() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Float(f64::NAN), Value::Float(1.0));
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let shared = Value::object(5u8);
        let clone = shared.clone();
        assert_eq!(shared, clone);
        assert_ne!(shared, Value::object(5u8));
        assert_eq!(shared.downcast_ref::<u8>(), Some(&5));
    }

    #[test]
    fn test_paths() {
        let mut v = Value::from(value_map! {
            "pos" => value_map! { "x" => 1, "y" => 2 },
        });
        assert_eq!(v.get_path(&["pos", "y"]), Some(&Value::Int(2)));
        assert!(v.set_path(&["pos", "x"], Value::from(10)));
        assert_eq!(v.get_path(&["pos", "x"]), Some(&Value::Int(10)));
        assert!(!v.set_path(&["missing", "x"], Value::from(1)));
        assert!(v.get_path(&["pos", "z"]).is_none());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::from("a"));
        assert_eq!(Value::from(3).as_float(), Some(3.0));
    }
}
