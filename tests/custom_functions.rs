use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ladle::{parse, CustomFunction, Error, EvaluationContext, EvaluationErrorKind, FunctionRegistry, Result, Value};
use pretty_assertions::assert_eq;

struct Discount;

impl CustomFunction for Discount {
    fn name(&self) -> &str {
        "discount"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn execute(&self, args: Vec<Value>) -> Result<Value> {
        let price = args[0].as_f64().ok_or_else(|| Error::function("discount expects a numeric price"))?;
        let rate = args.get(1).and_then(Value::as_f64).unwrap_or(0.1);
        Ok(Value::Double(price * (1.0 - rate)))
    }

    fn description(&self) -> Option<&str> {
        Some("Applies a discount rate to a price")
    }
}

fn context(functions: FunctionRegistry) -> EvaluationContext {
    EvaluationContext::builder().functions(Arc::new(functions)).variable("price", 200).build()
}

#[test]
fn test_trait_functions() {
    let functions = FunctionRegistry::new();
    functions.register(Box::new(Discount)).unwrap();
    assert_eq!(functions.get("discount").unwrap().description(), Some("Applies a discount rate to a price"));

    let ctx = context(functions);
    assert_eq!(parse("#discount(#price)").unwrap().value_in(&ctx).unwrap(), Value::Double(180.0));
    assert_eq!(parse("#discount(#price, 0.5)").unwrap().value_in(&ctx).unwrap(), Value::Double(100.0));
}

#[test]
fn test_closure_functions() {
    let functions = FunctionRegistry::new();
    functions
        .register_fn("join", None, |args| {
            Ok(Value::from(args.iter().map(Value::to_string).collect::<Vec<_>>().join("-")))
        })
        .unwrap();
    let ctx = context(functions);
    assert_eq!(parse("#join('a', 1, true)").unwrap().value_in(&ctx).unwrap(), Value::from("a-1-true"));
    assert_eq!(parse("#join()").unwrap().value_in(&ctx).unwrap(), Value::from(""));
}

#[test]
fn test_arity_and_missing_functions() {
    let functions = FunctionRegistry::new();
    functions.register(Box::new(Discount)).unwrap();
    let ctx = context(functions);

    let err = parse("#discount()").unwrap().value_in(&ctx).unwrap_err();
    assert_eq!(
        err.evaluation_kind(),
        Some(&EvaluationErrorKind::FunctionArity { name: "discount".into(), expected: "1 to 2".into(), actual: 0 })
    );
    assert_eq!(err.code(), "LADLE:ARITY");

    let err = parse("#nope(1)").unwrap().value_in(&ctx).unwrap_err();
    assert_eq!(err.evaluation_kind(), Some(&EvaluationErrorKind::FunctionNotFound { name: "nope".into() }));

    let err = parse("#discount('cheap')").unwrap().value_in(&ctx).unwrap_err();
    assert_eq!(err.to_string(), "discount expects a numeric price at position 0");
}

#[test]
fn test_registry_management() {
    let functions = FunctionRegistry::new();
    functions.register_fn("one", Some(0), |_| Ok(Value::Int(1))).unwrap();
    functions.register(Box::new(Discount)).unwrap();
    assert_eq!(functions.list_functions(), vec!["discount".to_string(), "one".to_string()]);
    assert_eq!(functions.len(), 2);
    assert!(functions.unregister("one"));
    assert!(!functions.has_function("one"));
    assert!(!functions.unregister("one"));
}

#[test]
fn test_variables_and_functions_are_separate() {
    // `#price` is a variable, `#price()` is a function call
    let functions = FunctionRegistry::new();
    functions.register_fn("price", Some(0), |_| Ok(Value::Int(7))).unwrap();
    let ctx = context(functions);
    assert_eq!(parse("#price() + #price").unwrap().value_in(&ctx).unwrap(), Value::Int(207));
}

#[test]
fn test_logical_operators_short_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let functions = FunctionRegistry::new();
    functions
        .register_fn("sideEffect", Some(0), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Bool(true))
        })
        .unwrap();
    let ctx = context(functions);

    assert_eq!(parse("false and #sideEffect()").unwrap().value_in(&ctx).unwrap(), Value::Bool(false));
    assert_eq!(parse("true or #sideEffect()").unwrap().value_in(&ctx).unwrap(), Value::Bool(true));
    assert_eq!(parse("true ? 1 : #sideEffect()").unwrap().value_in(&ctx).unwrap(), Value::Int(1));
    assert_eq!(parse("'x' ?: #sideEffect()").unwrap().value_in(&ctx).unwrap(), Value::from("x"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(parse("true and #sideEffect()").unwrap().value_in(&ctx).unwrap(), Value::Bool(true));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_function_arguments_see_root_inside_selection() {
    let functions = FunctionRegistry::new();
    functions.register_fn("double", Some(1), |args| Ok(Value::Long(args[0].as_i64().unwrap_or(0) * 2))).unwrap();
    let ctx = EvaluationContext::builder()
        .functions(Arc::new(functions))
        .variable("items", Value::list(vec![Value::Int(1), Value::Int(2)]))
        .build();
    assert_eq!(
        parse("#items.![#double(#this)]").unwrap().value_in(&ctx).unwrap(),
        Value::list(vec![Value::Long(2), Value::Long(4)])
    );
}
