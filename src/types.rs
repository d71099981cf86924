use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;
use std::thread::LocalKey;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Runtime value flowing through evaluation.
///
/// Lists and maps are shared handles: cloning a `Value::List` clones the
/// handle, so writes performed by `set_value` are visible to whoever owns
/// the root object.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(BigInt),
    BigDecimal(BigDecimal),
    String(String),
    List(ListRef),
    Map(MapRef),
    Object(Arc<dyn HostObject>),
    Type(TypeDescriptor),
}

/// A user type exposed to expressions. Members are described separately in
/// a [`TypeRegistry`](crate::reflect::TypeRegistry) under [`type_name`](HostObject::type_name).
pub trait HostObject: Any + Send + Sync + Debug {
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Elements for iterable types, so selection and projection can walk them.
    fn elements(&self) -> Option<Vec<Value>> {
        None
    }

    /// Natural ordering against another value, when the type has one.
    fn compare_to(&self, _other: &Value) -> Option<Ordering> {
        None
    }

    fn display(&self) -> String {
        format!("{:?}", self)
    }
}

impl Value {
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::List(ListRef::new(items.into_iter().collect()))
    }

    pub fn map<K: Into<String>, I: IntoIterator<Item = (K, Value)>>(entries: I) -> Self {
        Value::Map(MapRef::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn object<T: HostObject>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        self.descriptor().is_numeric()
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of(self)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        use bigdecimal::ToPrimitive;
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(l) => Some(*l as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            Value::BigInteger(b) => b.to_f64(),
            Value::BigDecimal(b) => b.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the host object as `T` when it is one.
    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        match self {
            Value::Object(o) => o.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Convert a JSON document into the runtime value model.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int(small),
                        Err(_) => Value::Long(i),
                    }
                } else if let Some(u) = n.as_u64() {
                    Value::BigInteger(BigInt::from(u))
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from_json)),
            serde_json::Value::Object(map) => {
                Value::map(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    /// Convert back to JSON. Host objects and types render as their string form.
    pub fn to_json(&self) -> serde_json::Value {
        use bigdecimal::ToPrimitive;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::json!(b),
            Value::Int(i) => serde_json::json!(i),
            Value::Long(l) => serde_json::json!(l),
            Value::Float(f) => serde_json::json!(f),
            Value::Double(d) => serde_json::json!(d),
            Value::BigInteger(b) => match b.to_i64() {
                Some(i) => serde_json::json!(i),
                None => serde_json::json!(b.to_string()),
            },
            Value::BigDecimal(b) => match b.to_f64() {
                Some(f) => serde_json::json!(f),
                None => serde_json::json!(b.to_string()),
            },
            Value::String(s) => serde_json::json!(s),
            Value::List(l) => match Visit::enter(&RENDERING, l.addr()) {
                Some(_visit) => serde_json::Value::Array(l.read().iter().map(Value::to_json).collect()),
                None => serde_json::json!(CYCLIC_LIST),
            },
            Value::Map(m) => match Visit::enter(&RENDERING, m.addr()) {
                Some(_visit) => {
                    serde_json::Value::Object(m.read().iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
                }
                None => serde_json::json!(CYCLIC_MAP),
            },
            Value::Object(_) | Value::Type(_) => serde_json::json!(self.to_string()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e7 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write_float(f, *x),
            Value::BigInteger(b) => write!(f, "{}", b),
            Value::BigDecimal(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::List(l) => {
                let Some(_visit) = Visit::enter(&RENDERING, l.addr()) else {
                    return f.write_str(CYCLIC_LIST);
                };
                write!(f, "[")?;
                for (i, item) in l.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                let Some(_visit) = Visit::enter(&RENDERING, m.addr()) else {
                    return f.write_str(CYCLIC_MAP);
                };
                write!(f, "{{")?;
                for (i, (k, v)) in m.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Object(o) => write!(f, "{}", o.display()),
            Value::Type(t) => write!(f, "T({})", t),
        }
    }
}

// Whole floats keep a trailing ".0" so they stay distinguishable from integers.
fn write_float(f: &mut Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{}", x)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Long(l) => write!(f, "Long({})", l),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Double(x) => write!(f, "Double({:?})", x),
            Value::BigInteger(b) => write!(f, "BigInteger({})", b),
            Value::BigDecimal(b) => write!(f, "BigDecimal({})", b),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::List(l) => f.debug_tuple("List").field(l).finish(),
            Value::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Value::Object(o) => write!(f, "Object({:?})", o),
            Value::Type(t) => write!(f, "Type({})", t),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::BigInteger(a), Value::BigInteger(b)) => a == b,
            (Value::BigDecimal(a), Value::BigDecimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            // A pair met again further down is a cycle; it compares equal so far.
            (Value::List(a), Value::List(b)) => {
                a.ptr_eq(b)
                    || Visit::enter(&COMPARING, (a.addr(), b.addr())).map_or(true, |_visit| *a.read() == *b.read())
            }
            (Value::Map(a), Value::Map(b)) => {
                a.ptr_eq(b)
                    || Visit::enter(&COMPARING, (a.addr(), b.addr())).map_or(true, |_visit| *a.read() == *b.read())
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    BigInt => BigInteger,
    BigDecimal => BigDecimal,
    String => String,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(ListRef::new(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Shared, mutable list storage.
#[derive(Clone, Default)]
pub struct ListRef(Arc<RwLock<Vec<Value>>>);

impl ListRef {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    /// Recursive read: a list may be read again while an outer read of it
    /// is still held, as when a predicate walks the list it filters.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Value>> {
        self.0.write()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.read().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.read().clone()
    }

    pub fn ptr_eq(&self, other: &ListRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl Debug for ListRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Some(_visit) = Visit::enter(&RENDERING, self.addr()) else {
            return f.write_str(CYCLIC_LIST);
        };
        f.debug_list().entries(self.read().iter()).finish()
    }
}

/// Shared, mutable, insertion-ordered map storage.
#[derive(Clone, Default)]
pub struct MapRef(Arc<RwLock<IndexMap<String, Value>>>);

impl MapRef {
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Self(Arc::new(RwLock::new(entries)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Value>> {
        self.0.read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Value>> {
        self.0.write()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.write().insert(key.into(), value)
    }

    pub fn ptr_eq(&self, other: &MapRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl Debug for MapRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Some(_visit) = Visit::enter(&RENDERING, self.addr()) else {
            return f.write_str(CYCLIC_MAP);
        };
        f.debug_map().entries(self.read().iter()).finish()
    }
}

const CYCLIC_LIST: &str = "(this List)";
const CYCLIC_MAP: &str = "(this Map)";

thread_local! {
    // Containers being rendered, and container pairs being compared, on this thread.
    static RENDERING: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    static COMPARING: RefCell<Vec<(usize, usize)>> = RefCell::new(Vec::new());
}

/// Marks a container as in progress on this thread until dropped, so a
/// container that reaches itself is detected instead of recursed into.
struct Visit<K: Copy + PartialEq + 'static> {
    active: &'static LocalKey<RefCell<Vec<K>>>,
}

impl<K: Copy + PartialEq + 'static> Visit<K> {
    /// `None` when `key` is already in progress further up the stack.
    fn enter(active: &'static LocalKey<RefCell<Vec<K>>>, key: K) -> Option<Self> {
        active.with(|keys| {
            let mut keys = keys.borrow_mut();
            if keys.contains(&key) {
                return None;
            }
            keys.push(key);
            Some(Self { active })
        })
    }
}

impl<K: Copy + PartialEq + 'static> Drop for Visit<K> {
    fn drop(&mut self) {
        self.active.with(|keys| {
            keys.borrow_mut().pop();
        });
    }
}

/// Runtime type of a value. Also used as the target of conversions and as
/// the fingerprint in accessor cache guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Conversion target meaning "leave the value as it is".
    Any,
    Null,
    Bool,
    Int,
    Long,
    Float,
    Double,
    BigInteger,
    BigDecimal,
    String,
    List,
    Map,
    Type,
    Object(Arc<str>),
}

impl TypeDescriptor {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeDescriptor::Null,
            Value::Bool(_) => TypeDescriptor::Bool,
            Value::Int(_) => TypeDescriptor::Int,
            Value::Long(_) => TypeDescriptor::Long,
            Value::Float(_) => TypeDescriptor::Float,
            Value::Double(_) => TypeDescriptor::Double,
            Value::BigInteger(_) => TypeDescriptor::BigInteger,
            Value::BigDecimal(_) => TypeDescriptor::BigDecimal,
            Value::String(_) => TypeDescriptor::String,
            Value::List(_) => TypeDescriptor::List,
            Value::Map(_) => TypeDescriptor::Map,
            Value::Object(o) => TypeDescriptor::Object(Arc::from(o.type_name())),
            Value::Type(_) => TypeDescriptor::Type,
        }
    }

    pub fn object(name: &str) -> Self {
        TypeDescriptor::Object(Arc::from(name))
    }

    /// Resolve a built-in type by the name used in `T(...)` references.
    pub fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "Boolean" | "bool" | "boolean" => TypeDescriptor::Bool,
            "Integer" | "int" => TypeDescriptor::Int,
            "Long" | "long" => TypeDescriptor::Long,
            "Float" | "float" => TypeDescriptor::Float,
            "Double" | "double" => TypeDescriptor::Double,
            "BigInteger" => TypeDescriptor::BigInteger,
            "BigDecimal" => TypeDescriptor::BigDecimal,
            "String" | "string" => TypeDescriptor::String,
            "List" => TypeDescriptor::List,
            "Map" => TypeDescriptor::Map,
            "Type" => TypeDescriptor::Type,
            "Object" | "any" => TypeDescriptor::Any,
            _ => return None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            TypeDescriptor::Any => "Object",
            TypeDescriptor::Null => "null",
            TypeDescriptor::Bool => "Boolean",
            TypeDescriptor::Int => "Integer",
            TypeDescriptor::Long => "Long",
            TypeDescriptor::Float => "Float",
            TypeDescriptor::Double => "Double",
            TypeDescriptor::BigInteger => "BigInteger",
            TypeDescriptor::BigDecimal => "BigDecimal",
            TypeDescriptor::String => "String",
            TypeDescriptor::List => "List",
            TypeDescriptor::Map => "Map",
            TypeDescriptor::Type => "Type",
            TypeDescriptor::Object(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Int
                | TypeDescriptor::Long
                | TypeDescriptor::Float
                | TypeDescriptor::Double
                | TypeDescriptor::BigInteger
                | TypeDescriptor::BigDecimal
        )
    }

    /// Whether a value of `other` can be stored here without conversion.
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        matches!(self, TypeDescriptor::Any) || matches!(other, TypeDescriptor::Null) || self == other
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A value paired with its type. The descriptor matches the runtime type of
/// the value, except for null which may carry a declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    value: Value,
    descriptor: TypeDescriptor,
}

impl TypedValue {
    pub const NULL: TypedValue = TypedValue { value: Value::Null, descriptor: TypeDescriptor::Null };

    pub fn new(value: Value) -> Self {
        let descriptor = TypeDescriptor::of(&value);
        Self { value, descriptor }
    }

    /// Pairs a value with a declared type, kept only when the value is null.
    pub fn declared(value: Value, declared: &TypeDescriptor) -> Self {
        if value.is_null() {
            Self { value, descriptor: declared.clone() }
        } else {
            Self::new(value)
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        TypedValue::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Value::Double(2.0).to_string(), "2.0");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::list(vec![Value::Int(1), Value::from("a")]).to_string(), "[1, a]");
        assert_eq!(Value::map(vec![("k", Value::Bool(true))]).to_string(), "{k=true}");
    }

    #[test]
    fn list_handles_share_storage() {
        let list = Value::list(vec![Value::Int(1)]);
        let alias = list.clone();
        alias.as_list().unwrap().write().push(Value::Int(2));
        assert_eq!(list.as_list().unwrap().len(), 2);
    }

    #[test]
    fn self_containing_containers_render_and_compare() {
        let map = Value::map(vec![("n", Value::Int(1))]);
        map.as_map().unwrap().insert("self", map.clone());
        assert_eq!(map.to_string(), "{n=1, self=(this Map)}");
        assert_eq!(format!("{:?}", map), r#"Map({"n": Int(1), "self": Map((this Map))})"#);
        assert_eq!(map.to_json(), serde_json::json!({"n": 1, "self": "(this Map)"}));
        assert_eq!(map, map.clone());

        let list = Value::list(vec![]);
        list.as_list().unwrap().write().push(list.clone());
        let twin = Value::list(vec![]);
        twin.as_list().unwrap().write().push(twin.clone());
        assert_eq!(list.to_string(), "[(this List)]");
        assert_eq!(list, twin);
        assert_ne!(list, Value::list(vec![Value::Int(1)]));

        // The same container twice, side by side, is not a cycle
        let inner = Value::list(vec![Value::Int(1)]);
        assert_eq!(Value::list(vec![inner.clone(), inner]).to_string(), "[[1], [1]]");
    }

    #[test]
    fn json_round_trip_keeps_shape() {
        let json = serde_json::json!({"name": "Ann", "age": 20, "tags": ["a", "b"], "score": 1.5});
        let value = Value::from_json(json.clone());
        let map = value.as_map().unwrap();
        assert_eq!(map.get("age"), Some(Value::Int(20)));
        assert_eq!(map.get("score"), Some(Value::Double(1.5)));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn typed_value_declared_only_for_null() {
        let tv = TypedValue::declared(Value::Null, &TypeDescriptor::String);
        assert_eq!(tv.descriptor(), &TypeDescriptor::String);
        let tv = TypedValue::declared(Value::Int(1), &TypeDescriptor::Long);
        assert_eq!(tv.descriptor(), &TypeDescriptor::Int);
    }
}
