use std::time::Instant;

use ladle::{parse_template, parse_with, EvaluationContext, ParserConfig, TemplateParserContext, TypedValue, Value};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Usage: ladle \"expression\" [options] [name=value ...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --json JSON        Use a JSON object as the root object");
    eprintln!("  --json-file PATH   Read the root object from a JSON file");
    eprintln!("  --template         Treat the input as a #{{...}} template");
    eprintln!("  --output-json      Print result, type and timing as JSON");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  ladle \"2 + 3 * 4\"");
    eprintln!("  ladle \"#price * #quantity\" price=19.99 quantity=3");
    eprintln!("  ladle \"name.toUpperCase()\" --json '{{\"name\": \"ann\"}}'");
    eprintln!("  ladle \"items.?[price > 10]\" --json-file order.json --output-json");
    eprintln!("  ladle \"Hello #{{name}}\" --template --json '{{\"name\": \"Ann\"}}'");
    std::process::exit(1);
}

fn fail(message: String) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LADLE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((expr, rest)) = args.split_first() else {
        usage();
    };

    let mut root = None;
    let mut output_json = false;
    let mut template = false;
    let mut vars = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let arg = rest[i].as_str();
        match arg {
            "--json" | "--json-file" => {
                let Some(input) = rest.get(i + 1) else {
                    fail(format!("{} requires an argument", arg));
                };
                let text = if arg == "--json" {
                    input.clone()
                } else {
                    std::fs::read_to_string(input).unwrap_or_else(|e| fail(format!("cannot read {}: {}", input, e)))
                };
                let json: serde_json::Value =
                    serde_json::from_str(&text).unwrap_or_else(|e| fail(format!("invalid JSON: {}", e)));
                root = Some(Value::from_json(json));
                i += 1;
            }
            "--output-json" => output_json = true,
            "--template" => template = true,
            _ => match arg.split_once('=') {
                Some((name, value)) => vars.push((name.to_string(), parse_value(value))),
                None => fail(format!("invalid variable assignment '{}', use name=value", arg)),
            },
        }
        i += 1;
    }

    let config = ParserConfig::from_env();
    let parsed = if template {
        parse_template(expr, &TemplateParserContext::default())
    } else {
        parse_with(expr, config)
    };
    let expression = match parsed {
        Ok(expression) => expression,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let mut builder = EvaluationContext::builder();
    if let Some(root) = root {
        builder = builder.root(root);
    }
    for (name, value) in vars {
        builder = builder.variable(&name, value);
    }
    let ctx = builder.build();

    let start = Instant::now();
    let result = expression.typed_value(&ctx);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(value) if output_json => println!("{}", format_json_output(&value, elapsed_ms)),
        Ok(value) => println!("{}", value.value()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

fn format_json_output(value: &TypedValue, elapsed_ms: f64) -> String {
    let output = json!({
        "result": value.value().to_json(),
        "type": value.descriptor().name(),
        "execution_time": format!("{:.2} ms", elapsed_ms),
    });
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Command-line variable values: quoted strings, booleans, null,
/// `[a,b]` lists and numbers; anything else is a bare string.
fn parse_value(s: &str) -> Value {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        return Value::String(s[1..s.len() - 1].to_string());
    }
    match s.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Some(inner) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        if inner.trim().is_empty() {
            return Value::list(Vec::new());
        }
        return Value::list(inner.split(',').map(|item| parse_value(item.trim())));
    }
    if let Ok(i) = s.parse::<i32>() {
        return Value::Int(i);
    }
    if let Ok(l) = s.parse::<i64>() {
        return Value::Long(l);
    }
    if let Ok(d) = s.parse::<f64>() {
        return Value::Double(d);
    }
    Value::String(s.to_string())
}
