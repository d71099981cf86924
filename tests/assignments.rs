use ladle::{parse, parse_with, EvaluationContext, EvaluationErrorKind, ParserConfig, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn ctx() -> EvaluationContext {
    EvaluationContext::new(Value::from_json(json!({
        "order": {"total": 10, "lines": [1, 2, 3]},
        "name": "ann"
    })))
}

fn get(expr: &str, ctx: &EvaluationContext) -> Value {
    parse(expr).unwrap().value_in(ctx).unwrap()
}

#[test]
fn test_assignment_expression_returns_the_value() {
    let ctx = ctx();
    assert_eq!(get("order.total = 25", &ctx), Value::Int(25));
    assert_eq!(get("order.total", &ctx), Value::Int(25));
    assert_eq!(get("order.lines[0] = 'first'", &ctx), Value::from("first"));
    assert_eq!(get("order.lines", &ctx), Value::list(vec![Value::from("first"), Value::Int(2), Value::Int(3)]));
}

#[test]
fn test_set_value_on_properties_indexes_and_variables() {
    let ctx = ctx();
    parse("order['discount']").unwrap().set_value(&ctx, 0.5).unwrap();
    assert_eq!(get("order.discount", &ctx), Value::Double(0.5));

    parse("#counter").unwrap().set_value(&ctx, 1).unwrap();
    assert_eq!(ctx.variable("counter"), Some(Value::Int(1)));
    assert_eq!(get("#counter = #counter + 1", &ctx), Value::Int(2));
    assert_eq!(ctx.variable("counter"), Some(Value::Int(2)));
}

#[test]
fn test_assignment_sees_changes_within_one_expression() {
    let ctx = ctx();
    assert_eq!(get("(#x = 2) * #x", &ctx), Value::Int(4));
    assert_eq!(get("order.total = order.total * 2", &ctx), Value::Int(20));
}

#[test]
fn test_unassignable_targets() {
    let ctx = ctx();
    let err = parse("1 + 2").unwrap().set_value(&ctx, 3).unwrap_err();
    assert_eq!(err.evaluation_kind(), Some(&EvaluationErrorKind::NotWritable { node: "operator" }));
    assert_eq!(err.code(), "LADLE:NOT_WRITABLE");

    let err = parse("#root").unwrap().set_value(&ctx, 3).unwrap_err();
    assert_eq!(err.evaluation_kind(), Some(&EvaluationErrorKind::VariableNotAssignable { name: "root".into() }));

    let err = parse("name.length() = 3").unwrap().value_in(&ctx).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::NotWritable { .. })));

    let err = parse("missing.total").unwrap().set_value(&ctx, 3).unwrap_err();
    assert_eq!(err.evaluation_kind(), Some(&EvaluationErrorKind::NullTarget { member: "total".into() }));
}

#[test]
fn test_is_writable() {
    let ctx = ctx();
    assert!(parse("order.total").unwrap().is_writable(&ctx).unwrap());
    assert!(parse("order.lines[1]").unwrap().is_writable(&ctx).unwrap());
    assert!(parse("#anything").unwrap().is_writable(&ctx).unwrap());
    assert!(!parse("#this").unwrap().is_writable(&ctx).unwrap());
    assert!(!parse("'literal'").unwrap().is_writable(&ctx).unwrap());
    assert!(!parse("missing.total").unwrap().is_writable(&ctx).unwrap());
    assert!(!parse("name.length()").unwrap().is_writable(&ctx).unwrap());
}

#[test]
fn test_list_writes_past_the_end_need_auto_grow() {
    let ctx = ctx();
    let err = parse("order.lines[5]").unwrap().set_value(&ctx, 9).unwrap_err();
    assert_eq!(err.evaluation_kind(), Some(&EvaluationErrorKind::IndexOutOfBounds { index: 5, length: 3 }));

    let growing = parse_with("order.lines[5]", ParserConfig::default().with_auto_grow(false, true)).unwrap();
    growing.set_value(&ctx, 9).unwrap();
    assert_eq!(
        get("order.lines", &ctx),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Null, Value::Null, Value::Int(9)])
    );
}

#[test]
fn test_auto_grow_respects_the_maximum_size() {
    let ctx = ctx();
    let config = ParserConfig { maximum_auto_grow_size: 4, ..ParserConfig::default().with_auto_grow(false, true) };
    assert!(parse_with("order.lines[3]", config.clone()).unwrap().set_value(&ctx, 0).is_ok());
    let err = parse_with("order.lines[4]", config).unwrap().set_value(&ctx, 0).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::IndexOutOfBounds { index: 4, .. })));
}

#[test]
fn test_auto_grow_null_references() {
    let ctx = ctx();
    let err = parse("shipping.address.city").unwrap().set_value(&ctx, "Oslo").unwrap_err();
    assert_eq!(err.code(), "LADLE:NULL_TARGET");

    let growing = parse_with("shipping.address.city", ParserConfig::default().with_auto_grow(true, false)).unwrap();
    growing.set_value(&ctx, "Oslo").unwrap();
    assert_eq!(get("shipping.address.city", &ctx), Value::from("Oslo"));
    assert_eq!(
        get("shipping", &ctx).to_json(),
        json!({"address": {"city": "Oslo"}})
    );
}

#[test]
fn test_assignment_through_short_circuited_chain_is_skipped() {
    let ctx = ctx();
    parse("missing?.total").unwrap().set_value(&ctx, 3).unwrap();
    assert_eq!(get("missing", &ctx), Value::Null);
}

#[test]
fn test_self_containing_map_renders_and_compares() {
    let ctx = EvaluationContext::builder().variable("m", Value::map(vec![("n", Value::Int(1))])).build();
    get("#m['self'] = #m", &ctx);

    let m = ctx.variable("m").unwrap();
    assert_eq!(m.to_string(), "{n=1, self=(this Map)}");
    assert_eq!(get("#m['self'] == #m", &ctx), Value::Bool(true));
    assert_eq!(get("#m['self']['self'].n", &ctx), Value::Int(1));
}
