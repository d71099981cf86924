use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::accessor::{
    BeanResolver, ConstructorResolver, MapAccessor, MethodResolver, PropertyAccessor, ReflectiveAccessor,
    ReflectiveConstructorResolver, ReflectiveMethodResolver,
};
use crate::convert::{StandardTypeConverter, TypeConverter};
use crate::custom::FunctionRegistry;
use crate::reflect::TypeRegistry;
use crate::types::{TypedValue, Value};

lazy_static::lazy_static! {
    // Shared so cached accessors stay valid across contexts built with the defaults.
    static ref MAP_ACCESSOR: Arc<dyn PropertyAccessor> = Arc::new(MapAccessor);
    static ref REFLECTIVE_ACCESSOR: Arc<dyn PropertyAccessor> = Arc::new(ReflectiveAccessor);
    static ref REFLECTIVE_METHODS: Arc<dyn MethodResolver> = Arc::new(ReflectiveMethodResolver);
    static ref REFLECTIVE_CONSTRUCTORS: Arc<dyn ConstructorResolver> = Arc::new(ReflectiveConstructorResolver);
}

/// Everything one evaluation runs against: the root object, variables,
/// the member resolution chains and the collaborators they consult.
///
/// A context belongs to one caller at a time. The same [`Expression`](crate::Expression)
/// may be evaluated from many threads as long as each brings its own context.
pub struct EvaluationContext {
    root: TypedValue,
    variables: RwLock<HashMap<String, Value>>,
    property_accessors: Vec<Arc<dyn PropertyAccessor>>,
    method_resolvers: Vec<Arc<dyn MethodResolver>>,
    constructor_resolvers: Vec<Arc<dyn ConstructorResolver>>,
    converter: Arc<dyn TypeConverter>,
    types: Arc<TypeRegistry>,
    functions: Arc<FunctionRegistry>,
    bean_resolver: Option<Arc<dyn BeanResolver>>,
}

impl EvaluationContext {
    /// Context with the given root object and the default chains.
    pub fn new<V: Into<Value>>(root: V) -> Self {
        Self::builder().root(root).build()
    }

    /// Context with a null root.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }

    pub fn root(&self) -> &TypedValue {
        &self.root
    }

    pub fn set_variable<V: Into<Value>>(&self, name: &str, value: V) {
        self.variables.write().insert(name.to_string(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).cloned()
    }

    pub fn remove_variable(&self, name: &str) -> Option<Value> {
        self.variables.write().remove(name)
    }

    pub fn property_accessors(&self) -> &[Arc<dyn PropertyAccessor>] {
        &self.property_accessors
    }

    pub fn method_resolvers(&self) -> &[Arc<dyn MethodResolver>] {
        &self.method_resolvers
    }

    pub fn constructor_resolvers(&self) -> &[Arc<dyn ConstructorResolver>] {
        &self.constructor_resolvers
    }

    pub fn converter(&self) -> &dyn TypeConverter {
        self.converter.as_ref()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub(crate) fn types_handle(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn bean_resolver(&self) -> Option<&dyn BeanResolver> {
        self.bean_resolver.as_deref()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("root", &self.root)
            .field("variables", &*self.variables.read())
            .field("property_accessors", &self.property_accessors)
            .field("method_resolvers", &self.method_resolvers)
            .field("constructor_resolvers", &self.constructor_resolvers)
            .field("converter", &self.converter)
            .field("types", &self.types)
            .field("functions", &self.functions)
            .field("bean_resolver", &self.bean_resolver)
            .finish()
    }
}

#[derive(Default)]
pub struct EvaluationContextBuilder {
    root: Option<TypedValue>,
    variables: HashMap<String, Value>,
    property_accessors: Vec<Arc<dyn PropertyAccessor>>,
    method_resolvers: Vec<Arc<dyn MethodResolver>>,
    constructor_resolvers: Vec<Arc<dyn ConstructorResolver>>,
    converter: Option<Arc<dyn TypeConverter>>,
    types: Option<Arc<TypeRegistry>>,
    functions: Option<Arc<FunctionRegistry>>,
    bean_resolver: Option<Arc<dyn BeanResolver>>,
}

impl EvaluationContextBuilder {
    pub fn root<V: Into<Value>>(mut self, root: V) -> Self {
        self.root = Some(TypedValue::new(root.into()));
        self
    }

    pub fn typed_root(mut self, root: TypedValue) -> Self {
        self.root = Some(root);
        self
    }

    pub fn variable<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    /// Custom accessors are consulted before the map and reflective ones.
    pub fn property_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.property_accessors.push(accessor);
        self
    }

    pub fn method_resolver(mut self, resolver: Arc<dyn MethodResolver>) -> Self {
        self.method_resolvers.push(resolver);
        self
    }

    pub fn constructor_resolver(mut self, resolver: Arc<dyn ConstructorResolver>) -> Self {
        self.constructor_resolvers.push(resolver);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn bean_resolver(mut self, resolver: Arc<dyn BeanResolver>) -> Self {
        self.bean_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> EvaluationContext {
        let mut property_accessors = self.property_accessors;
        property_accessors.push(Arc::clone(&MAP_ACCESSOR));
        property_accessors.push(Arc::clone(&REFLECTIVE_ACCESSOR));
        let mut method_resolvers = self.method_resolvers;
        method_resolvers.push(Arc::clone(&REFLECTIVE_METHODS));
        let mut constructor_resolvers = self.constructor_resolvers;
        constructor_resolvers.push(Arc::clone(&REFLECTIVE_CONSTRUCTORS));

        EvaluationContext {
            root: self.root.unwrap_or(TypedValue::NULL),
            variables: RwLock::new(self.variables),
            property_accessors,
            method_resolvers,
            constructor_resolvers,
            converter: self.converter.unwrap_or_else(|| Arc::new(StandardTypeConverter)),
            types: self.types.unwrap_or_else(|| Arc::new(TypeRegistry::with_builtins())),
            functions: self.functions.unwrap_or_default(),
            bean_resolver: self.bean_resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Nothing;

    impl PropertyAccessor for Nothing {
        fn can_read(&self, _: &EvaluationContext, _: &Value, _: &str) -> bool {
            false
        }
        fn read(&self, _: &EvaluationContext, _: &Value, _: &str) -> crate::error::Result<TypedValue> {
            Ok(TypedValue::NULL)
        }
    }

    #[test]
    fn custom_accessors_precede_defaults() {
        let ctx = EvaluationContext::builder().property_accessor(Arc::new(Nothing)).build();
        let names: Vec<String> = ctx.property_accessors().iter().map(|a| format!("{:?}", a)).collect();
        assert_eq!(names, vec!["Nothing", "MapAccessor", "ReflectiveAccessor"]);
    }

    #[test]
    fn default_chain_entries_are_shared() {
        let (a, b) = (EvaluationContext::empty(), EvaluationContext::empty());
        assert!(Arc::ptr_eq(&a.property_accessors()[0], &b.property_accessors()[0]));
        assert!(Arc::ptr_eq(&a.method_resolvers()[0], &b.method_resolvers()[0]));
        assert!(Arc::ptr_eq(&a.constructor_resolvers()[0], &b.constructor_resolvers()[0]));
    }

    #[test]
    fn variables_are_scoped_to_the_context() {
        let ctx = EvaluationContext::builder().variable("x", 1).build();
        ctx.set_variable("y", "two");
        assert_eq!(ctx.variable("x"), Some(Value::Int(1)));
        assert_eq!(ctx.remove_variable("y"), Some(Value::from("two")));
        assert!(ctx.variable("y").is_none());
        assert!(ctx.root().is_null());
    }
}
