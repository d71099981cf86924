use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, EvaluationErrorKind, Result};
use crate::types::Value;

/// Trait for implementing functions callable as `#name(args)`.
///
/// # Example
/// ```rust
/// use ladle::custom::CustomFunction;
/// use ladle::{Error, Value};
///
/// struct Double;
///
/// impl CustomFunction for Double {
///     fn name(&self) -> &str { "double" }
///     fn min_args(&self) -> usize { 1 }
///     fn max_args(&self) -> Option<usize> { Some(1) }
///
///     fn execute(&self, args: Vec<Value>) -> Result<Value, Error> {
///         let n = args[0].as_i64().ok_or_else(|| Error::function("double expects an integer"))?;
///         Ok(Value::Long(n * 2))
///     }
/// }
/// ```
pub trait CustomFunction: Send + Sync {
    /// The name of the function (case-sensitive)
    fn name(&self) -> &str;

    /// Minimum number of arguments required
    fn min_args(&self) -> usize;

    /// Maximum number of arguments allowed (None = unlimited)
    fn max_args(&self) -> Option<usize>;

    /// Execute the function with the given arguments
    fn execute(&self, args: Vec<Value>) -> Result<Value>;

    /// Optional: Description of the function for documentation
    fn description(&self) -> Option<&str> {
        None
    }
}

type FnBody = dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync;

/// A [`CustomFunction`] backed by a closure, see [`FunctionRegistry::register_fn`].
pub struct ClosureFunction {
    name: String,
    min_args: usize,
    max_args: Option<usize>,
    body: Box<FnBody>,
}

impl CustomFunction for ClosureFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_args(&self) -> usize {
        self.min_args
    }

    fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    fn execute(&self, args: Vec<Value>) -> Result<Value> {
        (self.body)(args)
    }
}

/// Concurrent registry of functions, shared by every context built from it.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<dyn CustomFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one with the same name.
    pub fn register(&self, function: Box<dyn CustomFunction>) -> Result<()> {
        let name = function.name().to_string();

        if name.is_empty() {
            return Err(Error::function("function name cannot be empty"));
        }

        if function.min_args() > function.max_args().unwrap_or(usize::MAX) {
            return Err(Error::function(format!("{}: min_args cannot be greater than max_args", name)));
        }

        self.functions.insert(name, Arc::from(function));
        Ok(())
    }

    /// Register a closure with an exact arity, or any arity when `arity` is `None`.
    pub fn register_fn<F>(&self, name: &str, arity: Option<usize>, body: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(Box::new(ClosureFunction {
            name: name.to_string(),
            min_args: arity.unwrap_or(0),
            max_args: arity,
            body: Box::new(body),
        }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomFunction>> {
        self.functions.get(name).map(|f| Arc::clone(f.value()))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn list_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Validate the argument count and execute.
    pub fn execute(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| EvaluationErrorKind::FunctionNotFound { name: name.to_string() })?;

        let actual = args.len();
        let min = function.min_args();
        let max = function.max_args();
        if actual < min || max.is_some_and(|max| actual > max) {
            let expected = match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(EvaluationErrorKind::FunctionArity { name: name.to_string(), expected, actual }.into());
        }

        function.execute(args)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.list_functions()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestFunction;

    impl CustomFunction for TestFunction {
        fn name(&self) -> &str {
            "test"
        }
        fn min_args(&self) -> usize {
            1
        }
        fn max_args(&self) -> Option<usize> {
            Some(2)
        }

        fn execute(&self, args: Vec<Value>) -> Result<Value> {
            Ok(Value::String(format!("called with {} args", args.len())))
        }

        fn description(&self) -> Option<&str> {
            Some("A test function")
        }
    }

    #[test]
    fn test_function_registry() {
        let registry = FunctionRegistry::new();

        assert!(registry.register(Box::new(TestFunction)).is_ok());
        assert!(registry.has_function("test"));
        assert!(!registry.has_function("TEST"));

        let result = registry.execute("test", vec![Value::Int(1)]).unwrap();
        assert_eq!(result, Value::from("called with 1 args"));

        let err = registry.execute("test", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "function '#test' expects 1 to 2 arguments, got 0");
        assert!(registry
            .execute("test", vec![Value::Int(1), Value::Int(2), Value::Int(3)])
            .is_err());

        assert!(registry.unregister("test"));
        assert!(!registry.has_function("test"));
    }

    #[test]
    fn closures_register_with_fixed_arity() {
        let registry = FunctionRegistry::new();
        registry
            .register_fn("inc", Some(1), |args| match args[0].as_i64() {
                Some(n) => Ok(Value::Long(n + 1)),
                None => Err(Error::function("inc expects an integer")),
            })
            .unwrap();

        assert_eq!(registry.execute("inc", vec![Value::Int(4)]).unwrap(), Value::Long(5));
        let err = registry.execute("missing", vec![]).unwrap_err();
        assert_eq!(err.code(), "LADLE:RESOLUTION");
    }

    #[test]
    fn rejects_inverted_arity() {
        struct Broken;
        impl CustomFunction for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn min_args(&self) -> usize {
                3
            }
            fn max_args(&self) -> Option<usize> {
                Some(1)
            }
            fn execute(&self, _args: Vec<Value>) -> Result<Value> {
                Ok(Value::Null)
            }
        }

        assert!(FunctionRegistry::new().register(Box::new(Broken)).is_err());
    }
}
