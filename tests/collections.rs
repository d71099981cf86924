use ladle::{parse, EvaluationContext, EvaluationErrorKind, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn ints(items: &[i32]) -> Value {
    Value::list(items.iter().copied().map(Value::Int))
}

fn eval_in(expr: &str, ctx: &EvaluationContext) -> Value {
    parse(expr).unwrap().value_in(ctx).unwrap()
}

fn numbers() -> EvaluationContext {
    EvaluationContext::builder().variable("items", ints(&[1, 2, 3, 4])).build()
}

#[test]
fn test_inline_lists_and_maps() {
    let ctx = EvaluationContext::empty();
    assert_eq!(eval_in("{1, 2, 3}", &ctx), ints(&[1, 2, 3]));
    assert_eq!(eval_in("{}", &ctx), Value::list(vec![]));
    assert_eq!(eval_in("{:}", &ctx), Value::map(Vec::<(String, Value)>::new()));
    assert_eq!(
        eval_in("{name: 'Ann', 'two words': 2}", &ctx),
        Value::map(vec![("name", Value::from("Ann")), ("two words", Value::Int(2))])
    );
    assert_eq!(eval_in("{{1, 2}, {3}}[0][1]", &ctx), Value::Int(2));
}

#[test]
fn test_inline_literals_are_fresh_per_evaluation() {
    let expr = parse("{1, 2}").unwrap();
    let first = expr.value().unwrap();
    first.as_list().unwrap().write().push(Value::Int(3));
    assert_eq!(expr.value().unwrap(), ints(&[1, 2]));
}

#[test]
fn test_selection_over_variables() {
    let ctx = numbers();
    assert_eq!(eval_in("#items.?[#this % 2 == 0]", &ctx), ints(&[2, 4]));
    assert_eq!(eval_in("#items.^[#this > 1]", &ctx), Value::Int(2));
    assert_eq!(eval_in("#items.$[#this > 1]", &ctx), Value::Int(4));
    assert_eq!(eval_in("#items.^[#this > 10]", &ctx), Value::Null);
    assert_eq!(eval_in("#items.?[#this > 10]", &ctx), Value::list(vec![]));
}

#[test]
fn test_projection() {
    let ctx = numbers();
    assert_eq!(eval_in("#items.![#this * 2]", &ctx), ints(&[2, 4, 6, 8]));
    assert_eq!(eval_in("#items.?[#this > 2].![#this + 10]", &ctx), ints(&[13, 14]));
}

#[test]
fn test_selection_on_object_graph() {
    let root = Value::from_json(json!({
        "items": [{"name": "pen", "price": 5}, {"name": "book", "price": 20}, {"name": "lamp", "price": 35}]
    }));
    let ctx = EvaluationContext::new(root);
    assert_eq!(
        eval_in("items.?[price > 10].![name]", &ctx),
        Value::list(vec![Value::from("book"), Value::from("lamp")])
    );
    assert_eq!(eval_in("items.^[price > 10].name", &ctx), Value::from("book"));
    assert_eq!(eval_in("items.![price].size()", &ctx), Value::Int(3));
}

#[test]
fn test_predicate_arguments_see_the_root() {
    // #root stays the context root while #this moves to each element
    let root = Value::from_json(json!({"limit": 2, "values": [1, 2, 3]}));
    let ctx = EvaluationContext::new(root);
    assert_eq!(eval_in("values.?[#this > #root.limit]", &ctx), ints(&[3]));
}

#[test]
fn test_map_selection_and_projection() {
    let root = Value::from_json(json!({"stock": {"apples": 3, "pears": 0, "plums": 7}}));
    let ctx = EvaluationContext::new(root);
    assert_eq!(
        eval_in("stock.?[value > 0]", &ctx),
        Value::map(vec![("apples", Value::Int(3)), ("plums", Value::Int(7))])
    );
    assert_eq!(eval_in("stock.^[value > 0]", &ctx), Value::map(vec![("apples", Value::Int(3))]));
    assert_eq!(eval_in("stock.$[value > 0]", &ctx), Value::map(vec![("plums", Value::Int(7))]));
    assert_eq!(eval_in("stock.^[value > 100]", &ctx), Value::Null);
    assert_eq!(
        eval_in("stock.![key]", &ctx),
        Value::list(vec![Value::from("apples"), Value::from("pears"), Value::from("plums")])
    );
}

#[test]
fn test_selection_requires_boolean_predicate() {
    let err = parse("#items.?[#this]").unwrap().value_in(&numbers()).unwrap_err();
    assert!(matches!(
        err.evaluation_kind(),
        Some(EvaluationErrorKind::NotBoolean { context: "selection", .. })
    ));
    assert_eq!(err.position(), Some(9));
}

#[test]
fn test_selection_on_non_collection() {
    let ctx = EvaluationContext::builder().variable("n", 5).build();
    let err = parse("#n.?[true]").unwrap().value_in(&ctx).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::NotIterable { .. })));

    let err = parse("#missing.![#this]").unwrap().value_in(&ctx).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::NullTarget { .. })));
    assert_eq!(parse("#missing?.![#this]").unwrap().value_in(&ctx).unwrap(), Value::Null);
}

#[test]
fn test_indexing() {
    let root = Value::from_json(json!({
        "list": [10, 20, 30],
        "map": {"a": 1, "b c": 2},
        "name": "ladle"
    }));
    let ctx = EvaluationContext::new(root);
    assert_eq!(eval_in("list[1]", &ctx), Value::Int(20));
    assert_eq!(eval_in("list['2']", &ctx), Value::Int(30));
    assert_eq!(eval_in("map['b c']", &ctx), Value::Int(2));
    assert_eq!(eval_in("map[a]", &ctx), Value::Int(1));
    assert_eq!(eval_in("map['zzz']", &ctx), Value::Null);
    assert_eq!(eval_in("name[0]", &ctx), Value::from("l"));
}

#[test]
fn test_index_errors() {
    let ctx = EvaluationContext::new(Value::from_json(json!({"list": [10, 20], "flag": true})));
    let err = parse("list[5]").unwrap().value_in(&ctx).unwrap_err();
    assert_eq!(err.evaluation_kind(), Some(&EvaluationErrorKind::IndexOutOfBounds { index: 5, length: 2 }));
    assert_eq!(err.code(), "LADLE:INDEX");

    let err = parse("list[-1]").unwrap().value_in(&ctx).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::IndexOutOfBounds { index: -1, .. })));

    let err = parse("flag[0]").unwrap().value_in(&ctx).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::NotIndexable { .. })));
}

#[test]
fn test_collection_methods() {
    let ctx = numbers();
    assert_eq!(eval_in("#items.size()", &ctx), Value::Int(4));
    assert_eq!(eval_in("#items.contains(3)", &ctx), Value::Bool(true));
    assert_eq!(eval_in("{a: 1}.containsKey('a')", &ctx), Value::Bool(true));
    assert_eq!(eval_in("{a: 1, b: 2}.keySet()", &ctx), Value::list(vec![Value::from("a"), Value::from("b")]));
    assert_eq!(eval_in("'a,b,c'.split(',').size()", &ctx), Value::Int(3));
}
