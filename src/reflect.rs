//! Member lookup for host types.
//!
//! Rust has no runtime reflection, so host types describe their members
//! up front in a [`TypeInfo`] and register it with a [`TypeRegistry`] under
//! the name returned by [`HostObject::type_name`]. The reflective accessor
//! and resolvers in [`crate::accessor`] search these descriptors.
//!
//! ```rust
//! use std::any::Any;
//! use ladle::reflect::{TypeInfo, TypeRegistry};
//! use ladle::{HostObject, TypeDescriptor, Value};
//!
//! #[derive(Debug)]
//! struct Person { name: String }
//!
//! impl HostObject for Person {
//!     fn type_name(&self) -> &str { "Person" }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! let registry = TypeRegistry::with_builtins();
//! registry.register(
//!     TypeInfo::builder::<Person>("Person")
//!         .property("name", TypeDescriptor::String, |p| Value::from(p.name.as_str()))
//!         .build(),
//! );
//! assert!(registry.get("Person").is_some());
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::error::{Error, EvaluationErrorKind, Result};
use crate::types::{HostObject, TypeDescriptor, Value};

pub type Getter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
pub type Setter = Arc<dyn Fn(&Value, Value) -> Result<()> + Send + Sync>;
pub type Invoker = Arc<dyn Fn(&Value, Vec<Value>) -> Result<Value> + Send + Sync>;
pub type Factory = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub getter: Getter,
    pub setter: Option<Setter>,
}

impl PropertyDescriptor {
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("writable", &self.is_writable())
            .finish()
    }
}

#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    /// Parameter types. For variadic methods the last entry is the element
    /// type of the trailing arguments.
    pub params: Vec<TypeDescriptor>,
    pub variadic: bool,
    pub returns: TypeDescriptor,
    pub is_static: bool,
    pub invoker: Invoker,
}

impl MethodDescriptor {
    /// Parameter type expected at argument position `i`, if any.
    pub fn param_at(&self, i: usize) -> Option<&TypeDescriptor> {
        signature_param(&self.params, self.variadic, i)
    }

    pub fn accepts_count(&self, n: usize) -> bool {
        signature_accepts(&self.params, self.variadic, n)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .field("returns", &self.returns)
            .field("is_static", &self.is_static)
            .finish()
    }
}

#[derive(Clone)]
pub struct ConstructorDescriptor {
    pub params: Vec<TypeDescriptor>,
    pub variadic: bool,
    pub factory: Factory,
}

impl ConstructorDescriptor {
    pub fn param_at(&self, i: usize) -> Option<&TypeDescriptor> {
        signature_param(&self.params, self.variadic, i)
    }

    pub fn accepts_count(&self, n: usize) -> bool {
        signature_accepts(&self.params, self.variadic, n)
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish()
    }
}

fn signature_param(params: &[TypeDescriptor], variadic: bool, i: usize) -> Option<&TypeDescriptor> {
    match params.get(i) {
        Some(p) => Some(p),
        None if variadic => params.last(),
        None => None,
    }
}

fn signature_accepts(params: &[TypeDescriptor], variadic: bool, n: usize) -> bool {
    if variadic {
        n + 1 >= params.len()
    } else {
        n == params.len()
    }
}

/// Members of one type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    name: String,
    properties: IndexMap<String, PropertyDescriptor>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
}

impl TypeInfo {
    /// Builder whose member closures receive the target downcast to `T`.
    pub fn builder<T: HostObject>(name: &str) -> TypeInfoBuilder<T> {
        TypeInfoBuilder::new(name)
    }

    /// Builder whose member closures receive the raw target value.
    pub fn untyped(name: &str) -> TypeInfoBuilder<Value> {
        TypeInfoBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDescriptor> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }
}

pub struct TypeInfoBuilder<T> {
    info: TypeInfo,
    _target: PhantomData<fn(&T)>,
}

impl<T> TypeInfoBuilder<T> {
    fn new(name: &str) -> Self {
        Self {
            info: TypeInfo {
                name: name.to_string(),
                properties: IndexMap::new(),
                methods: Vec::new(),
                constructors: Vec::new(),
            },
            _target: PhantomData,
        }
    }

    /// Method callable on the type itself, `T(Name).method(..)`.
    pub fn static_method<F>(mut self, name: &str, params: Vec<TypeDescriptor>, returns: TypeDescriptor, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.info.methods.push(MethodDescriptor {
            name: name.to_string(),
            params,
            variadic: false,
            returns,
            is_static: true,
            invoker: Arc::new(move |_target, args| f(args)),
        });
        self
    }

    /// Constructor used by `new Name(..)`.
    pub fn constructor<F>(mut self, params: Vec<TypeDescriptor>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.info.constructors.push(ConstructorDescriptor { params, variadic: false, factory: Arc::new(f) });
        self
    }

    pub fn variadic_constructor<F>(mut self, params: Vec<TypeDescriptor>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.info.constructors.push(ConstructorDescriptor { params, variadic: true, factory: Arc::new(f) });
        self
    }

    pub fn build(self) -> TypeInfo {
        self.info
    }

    fn push_method(&mut self, name: &str, params: Vec<TypeDescriptor>, variadic: bool, returns: TypeDescriptor, invoker: Invoker) {
        self.info.methods.push(MethodDescriptor {
            name: name.to_string(),
            params,
            variadic,
            returns,
            is_static: false,
            invoker,
        });
    }
}

impl TypeInfoBuilder<Value> {
    pub fn property<F>(mut self, name: &str, ty: TypeDescriptor, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.info.properties.insert(
            name.to_string(),
            PropertyDescriptor { name: name.to_string(), ty, getter: Arc::new(f), setter: None },
        );
        self
    }

    pub fn method<F>(mut self, name: &str, params: Vec<TypeDescriptor>, returns: TypeDescriptor, f: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.push_method(name, params, false, returns, Arc::new(f));
        self
    }
}

impl<T: HostObject> TypeInfoBuilder<T> {
    /// Read-only property.
    pub fn property<F>(mut self, name: &str, ty: TypeDescriptor, f: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let type_name = self.info.name.clone();
        let getter: Getter = Arc::new(move |target| Ok(f(downcast::<T>(target, &type_name)?)));
        self.info.properties.insert(
            name.to_string(),
            PropertyDescriptor { name: name.to_string(), ty, getter, setter: None },
        );
        self
    }

    /// Property with a setter. `T` needs interior mutability since host
    /// objects are shared.
    pub fn writable_property<G, S>(mut self, name: &str, ty: TypeDescriptor, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&T, Value) -> Result<()> + Send + Sync + 'static,
    {
        let type_name = self.info.name.clone();
        let getter: Getter = Arc::new(move |target| Ok(get(downcast::<T>(target, &type_name)?)));
        let type_name = self.info.name.clone();
        let setter: Setter = Arc::new(move |target, value| set(downcast::<T>(target, &type_name)?, value));
        self.info.properties.insert(
            name.to_string(),
            PropertyDescriptor { name: name.to_string(), ty, getter, setter: Some(setter) },
        );
        self
    }

    pub fn method<F>(mut self, name: &str, params: Vec<TypeDescriptor>, returns: TypeDescriptor, f: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        let type_name = self.info.name.clone();
        let invoker: Invoker = Arc::new(move |target, args| f(downcast::<T>(target, &type_name)?, args));
        self.push_method(name, params, false, returns, invoker);
        self
    }

    /// Method whose last parameter absorbs any number of trailing arguments.
    pub fn variadic_method<F>(mut self, name: &str, params: Vec<TypeDescriptor>, returns: TypeDescriptor, f: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        let type_name = self.info.name.clone();
        let invoker: Invoker = Arc::new(move |target, args| f(downcast::<T>(target, &type_name)?, args));
        self.push_method(name, params, true, returns, invoker);
        self
    }
}

fn downcast<'a, T: HostObject>(target: &'a Value, type_name: &str) -> Result<&'a T> {
    target
        .downcast_ref::<T>()
        .ok_or_else(|| Error::function(format!("target {} is not a {}", target.descriptor(), type_name)))
}

/// Registry of [`TypeInfo`] by type name. Also answers `T(Name)` lookups.
pub struct TypeRegistry {
    types: DashMap<String, Arc<TypeInfo>>,
}

impl TypeRegistry {
    /// An empty registry, without even the built-in types.
    pub fn empty() -> Self {
        Self { types: DashMap::new() }
    }

    /// A registry holding the `String`, `List`, `Map` and `Math` members.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        for info in BUILTIN_TYPES.iter() {
            registry.types.insert(info.name().to_string(), Arc::clone(info));
        }
        registry
    }

    pub fn register(&self, info: TypeInfo) {
        self.types.insert(info.name().to_string(), Arc::new(info));
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.types.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Members of the runtime type of `target`. Type values answer with the
    /// type they denote so static members can be found.
    pub fn for_value(&self, target: &Value) -> Option<Arc<TypeInfo>> {
        match target {
            Value::Type(t) => self.get(t.name()),
            other => self.get(other.descriptor().name()),
        }
    }

    /// Resolve a `T(Name)` reference.
    pub fn resolve_type(&self, name: &str) -> Result<TypeDescriptor> {
        if let Some(builtin) = TypeDescriptor::builtin(name) {
            return Ok(builtin);
        }
        if self.types.contains_key(name) {
            return Ok(TypeDescriptor::object(name));
        }
        Err(EvaluationErrorKind::TypeNotFound { name: name.to_string() }.into())
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

lazy_static::lazy_static! {
    static ref BUILTIN_TYPES: Vec<Arc<TypeInfo>> = vec![
        Arc::new(string_type()),
        Arc::new(list_type()),
        Arc::new(map_type()),
        Arc::new(math_type()),
    ];
}

fn text(v: &Value) -> Result<&str> {
    v.as_str().ok_or_else(|| Error::function(format!("expected a String, found {}", v.descriptor())))
}

fn int_arg(v: &Value) -> Result<i64> {
    v.as_i64().ok_or_else(|| Error::function(format!("expected an integer, found {}", v.descriptor())))
}

fn float_arg(v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| Error::function(format!("expected a number, found {}", v.descriptor())))
}

fn char_index(s: &str, index: i64) -> Result<usize> {
    let length = s.chars().count();
    if index < 0 || index as usize > length {
        return Err(EvaluationErrorKind::IndexOutOfBounds { index, length }.into());
    }
    Ok(index as usize)
}

fn substring(s: &str, start: i64, end: i64) -> Result<Value> {
    let start = char_index(s, start)?;
    let end = char_index(s, end)?;
    if start > end {
        return Err(EvaluationErrorKind::IndexOutOfBounds { index: start as i64, length: end }.into());
    }
    Ok(Value::String(s.chars().skip(start).take(end - start).collect()))
}

fn string_type() -> TypeInfo {
    use TypeDescriptor as T;
    TypeInfo::untyped("String")
        .method("length", vec![], T::Int, |s, _| Ok(Value::Int(text(s)?.chars().count() as i32)))
        .method("isEmpty", vec![], T::Bool, |s, _| Ok(Value::Bool(text(s)?.is_empty())))
        .method("toUpperCase", vec![], T::String, |s, _| Ok(Value::from(text(s)?.to_uppercase())))
        .method("toLowerCase", vec![], T::String, |s, _| Ok(Value::from(text(s)?.to_lowercase())))
        .method("trim", vec![], T::String, |s, _| Ok(Value::from(text(s)?.trim())))
        .method("substring", vec![T::Int], T::String, |s, a| {
            let s = text(s)?;
            substring(s, int_arg(&a[0])?, s.chars().count() as i64)
        })
        .method("substring", vec![T::Int, T::Int], T::String, |s, a| {
            substring(text(s)?, int_arg(&a[0])?, int_arg(&a[1])?)
        })
        .method("contains", vec![T::String], T::Bool, |s, a| Ok(Value::Bool(text(s)?.contains(text(&a[0])?))))
        .method("startsWith", vec![T::String], T::Bool, |s, a| {
            Ok(Value::Bool(text(s)?.starts_with(text(&a[0])?)))
        })
        .method("endsWith", vec![T::String], T::Bool, |s, a| Ok(Value::Bool(text(s)?.ends_with(text(&a[0])?))))
        .method("indexOf", vec![T::String], T::Int, |s, a| {
            let s = text(s)?;
            Ok(Value::Int(match s.find(text(&a[0])?) {
                Some(byte) => s[..byte].chars().count() as i32,
                None => -1,
            }))
        })
        .method("concat", vec![T::String], T::String, |s, a| Ok(Value::from(format!("{}{}", text(s)?, text(&a[0])?))))
        .method("replace", vec![T::String, T::String], T::String, |s, a| {
            Ok(Value::from(text(s)?.replace(text(&a[0])?, text(&a[1])?)))
        })
        .method("split", vec![T::String], T::List, |s, a| {
            Ok(Value::list(text(s)?.split(text(&a[0])?).map(Value::from)))
        })
        .build()
}

fn list_type() -> TypeInfo {
    use TypeDescriptor as T;
    fn list(v: &Value) -> Result<&crate::types::ListRef> {
        v.as_list().ok_or_else(|| Error::function(format!("expected a List, found {}", v.descriptor())))
    }
    TypeInfo::untyped("List")
        .method("size", vec![], T::Int, |l, _| Ok(Value::Int(list(l)?.len() as i32)))
        .method("isEmpty", vec![], T::Bool, |l, _| Ok(Value::Bool(list(l)?.is_empty())))
        .method("get", vec![T::Int], T::Any, |l, a| {
            let items = list(l)?;
            let index = int_arg(&a[0])?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .ok_or_else(|| EvaluationErrorKind::IndexOutOfBounds { index, length: items.len() }.into())
        })
        .method("contains", vec![T::Any], T::Bool, |l, a| Ok(Value::Bool(list(l)?.read().contains(&a[0]))))
        .method("add", vec![T::Any], T::Bool, |l, mut a| {
            list(l)?.write().push(a.remove(0));
            Ok(Value::Bool(true))
        })
        .build()
}

fn map_type() -> TypeInfo {
    use TypeDescriptor as T;
    fn map(v: &Value) -> Result<&crate::types::MapRef> {
        v.as_map().ok_or_else(|| Error::function(format!("expected a Map, found {}", v.descriptor())))
    }
    TypeInfo::untyped("Map")
        .method("size", vec![], T::Int, |m, _| Ok(Value::Int(map(m)?.len() as i32)))
        .method("isEmpty", vec![], T::Bool, |m, _| Ok(Value::Bool(map(m)?.is_empty())))
        .method("get", vec![T::String], T::Any, |m, a| Ok(map(m)?.get(text(&a[0])?).unwrap_or(Value::Null)))
        .method("containsKey", vec![T::String], T::Bool, |m, a| Ok(Value::Bool(map(m)?.contains_key(text(&a[0])?))))
        .method("keySet", vec![], T::List, |m, _| {
            Ok(Value::list(map(m)?.read().keys().map(|k| Value::from(k.as_str()))))
        })
        .method("values", vec![], T::List, |m, _| Ok(Value::list(map(m)?.read().values().cloned())))
        .method("put", vec![T::String, T::Any], T::Any, |m, mut a| {
            let value = a.remove(1);
            let key = text(&a[0])?.to_string();
            Ok(map(m)?.insert(key, value).unwrap_or(Value::Null))
        })
        .build()
}

fn math_type() -> TypeInfo {
    use TypeDescriptor as T;
    TypeInfo::untyped("Math")
        .static_method("abs", vec![T::Int], T::Int, |a| {
            let n = int_arg(&a[0])?;
            i32::try_from(n.abs())
                .map(Value::Int)
                .map_err(|_| EvaluationErrorKind::Overflow { operator: "abs", ty: "Integer".into() }.into())
        })
        .static_method("abs", vec![T::Long], T::Long, |a| {
            int_arg(&a[0])?
                .checked_abs()
                .map(Value::Long)
                .ok_or_else(|| EvaluationErrorKind::Overflow { operator: "abs", ty: "Long".into() }.into())
        })
        .static_method("abs", vec![T::Double], T::Double, |a| Ok(Value::Double(float_arg(&a[0])?.abs())))
        .static_method("max", vec![T::Int, T::Int], T::Int, |a| Ok(Value::Int(int_arg(&a[0])?.max(int_arg(&a[1])?) as i32)))
        .static_method("max", vec![T::Long, T::Long], T::Long, |a| Ok(Value::Long(int_arg(&a[0])?.max(int_arg(&a[1])?))))
        .static_method("max", vec![T::Double, T::Double], T::Double, |a| {
            Ok(Value::Double(float_arg(&a[0])?.max(float_arg(&a[1])?)))
        })
        .static_method("min", vec![T::Int, T::Int], T::Int, |a| Ok(Value::Int(int_arg(&a[0])?.min(int_arg(&a[1])?) as i32)))
        .static_method("min", vec![T::Long, T::Long], T::Long, |a| Ok(Value::Long(int_arg(&a[0])?.min(int_arg(&a[1])?))))
        .static_method("min", vec![T::Double, T::Double], T::Double, |a| {
            Ok(Value::Double(float_arg(&a[0])?.min(float_arg(&a[1])?)))
        })
        .static_method("pow", vec![T::Double, T::Double], T::Double, |a| {
            Ok(Value::Double(float_arg(&a[0])?.powf(float_arg(&a[1])?)))
        })
        .static_method("sqrt", vec![T::Double], T::Double, |a| Ok(Value::Double(float_arg(&a[0])?.sqrt())))
        .static_method("floor", vec![T::Double], T::Double, |a| Ok(Value::Double(float_arg(&a[0])?.floor())))
        .static_method("ceil", vec![T::Double], T::Double, |a| Ok(Value::Double(float_arg(&a[0])?.ceil())))
        .static_method("round", vec![T::Double], T::Long, |a| Ok(Value::Long(float_arg(&a[0])?.round() as i64)))
        .build()
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug)]
    struct Counter {
        count: Mutex<i64>,
    }

    impl HostObject for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn typed_builder_downcasts_target() {
        let info = TypeInfo::builder::<Counter>("Counter")
            .writable_property(
                "count",
                TypeDescriptor::Long,
                |c| Value::Long(*c.count.lock()),
                |c, v| {
                    *c.count.lock() = v.as_i64().unwrap_or_default();
                    Ok(())
                },
            )
            .build();
        let target = Value::object(Counter { count: Mutex::new(3) });
        let prop = info.property("count").unwrap();

        assert_eq!((prop.getter)(&target).unwrap(), Value::Long(3));
        (prop.setter.as_ref().unwrap())(&target, Value::Long(9)).unwrap();
        assert_eq!((prop.getter)(&target).unwrap(), Value::Long(9));
        assert!((prop.getter)(&Value::from("x")).is_err());
    }

    #[test]
    fn variadic_signature_accepts_trailing_arguments() {
        let info = TypeInfo::builder::<Counter>("Counter")
            .variadic_method("sum", vec![TypeDescriptor::Long], TypeDescriptor::Long, |_, args| {
                Ok(Value::Long(args.iter().filter_map(Value::as_i64).sum()))
            })
            .build();
        let sum = info.methods_named("sum").next().unwrap();
        assert!(sum.accepts_count(0));
        assert!(sum.accepts_count(4));
        assert_eq!(sum.param_at(3), Some(&TypeDescriptor::Long));
    }

    #[test]
    fn builtins_and_type_resolution() {
        let registry = TypeRegistry::with_builtins();
        assert!(registry.for_value(&Value::from("s")).is_some());
        assert_eq!(registry.resolve_type("Integer").unwrap(), TypeDescriptor::Int);
        assert_eq!(registry.resolve_type("Math").unwrap(), TypeDescriptor::object("Math"));
        assert!(registry.resolve_type("Nope").is_err());

        let string = registry.get("String").unwrap();
        let upper = string.methods_named("toUpperCase").next().unwrap();
        assert_eq!((upper.invoker)(&Value::from("ab"), vec![]).unwrap(), Value::from("AB"));
        let sub = string.methods_named("substring").nth(1).unwrap();
        assert!((sub.invoker)(&Value::from("abc"), vec![Value::Int(2), Value::Int(9)]).is_err());
    }
}
