use super::parser::{BinaryOp, Expr, Function};
use serde_json::Value;

/// Outcome of whatever a condition is guarding: the `needs` of a job, or
/// the earlier steps of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusContext {
  pub success: bool,
  pub failure: bool,
  pub cancelled: bool,
}

impl Default for StatusContext {
  fn default() -> Self {
    StatusContext {
      success: true,
      failure: false,
      cancelled: false,
    }
  }
}

pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// String form used by template interpolation.
pub fn to_display_string(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => match n.as_f64() {
      Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
      _ => n.to_string(),
    },
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    Value::Null => Some(0.0),
    _ => None,
  }
}

/// Strings compare case-insensitively; mixed scalars compare as numbers.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
  match (lhs, rhs) {
    (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
    (Value::Null, Value::Null) => true,
    (Value::Bool(a), Value::Bool(b)) => a == b,
    (Value::Array(_), _) | (Value::Object(_), _) | (_, Value::Array(_)) | (_, Value::Object(_)) => {
      lhs == rhs
    }
    _ => match (as_number(lhs), as_number(rhs)) {
      (Some(a), Some(b)) => a == b,
      _ => false,
    },
  }
}

fn lookup<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
  path.iter().try_fold(data, |current, segment| match current {
    Value::Object(map) => map.get(segment),
    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  })
}

fn contains(search: &Value, item: &Value) -> bool {
  match search {
    Value::Array(items) => items.iter().any(|candidate| loose_eq(candidate, item)),
    Value::Null => false,
    other => to_display_string(other)
      .to_lowercase()
      .contains(&to_display_string(item).to_lowercase()),
  }
}

pub fn evaluate(expr: &Expr, data: &Value, status: StatusContext) -> Value {
  match expr {
    Expr::Literal(value) => value.clone(),
    Expr::Path(path) => lookup(data, path).cloned().unwrap_or(Value::Null),
    Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, data, status))),
    Expr::Binary { op, lhs, rhs } => {
      let left = evaluate(lhs, data, status);
      match op {
        BinaryOp::And if !is_truthy(&left) => left,
        BinaryOp::And => evaluate(rhs, data, status),
        BinaryOp::Or if is_truthy(&left) => left,
        BinaryOp::Or => evaluate(rhs, data, status),
        BinaryOp::Eq => Value::Bool(loose_eq(&left, &evaluate(rhs, data, status))),
        BinaryOp::Ne => Value::Bool(!loose_eq(&left, &evaluate(rhs, data, status))),
      }
    }
    Expr::Call { function, args } => {
      let result = match function {
        Function::Success => status.success,
        Function::Failure => status.failure,
        Function::Cancelled => status.cancelled,
        Function::Always => true,
        Function::Contains => contains(
          &evaluate(&args[0], data, status),
          &evaluate(&args[1], data, status),
        ),
        Function::StartsWith => to_display_string(&evaluate(&args[0], data, status))
          .to_lowercase()
          .starts_with(&to_display_string(&evaluate(&args[1], data, status)).to_lowercase()),
        Function::EndsWith => to_display_string(&evaluate(&args[0], data, status))
          .to_lowercase()
          .ends_with(&to_display_string(&evaluate(&args[1], data, status)).to_lowercase()),
      };

      Value::Bool(result)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::parser::parse;
  use super::*;
  use serde_json::json;

  fn eval(source: &str, data: &Value) -> Value {
    evaluate(&parse(source).unwrap(), data, StatusContext::default())
  }

  #[test]
  fn paths_and_equality() {
    let data = json!({
      "event": "push",
      "branch": "Main",
      "needs": { "build": { "result": "success", "outputs": { "count": "3" } } },
    });

    assert_eq!(eval("event == 'push'", &data), json!(true));
    assert_eq!(eval("branch == 'main'", &data), json!(true));
    assert_eq!(eval("needs.build.result != 'success'", &data), json!(false));
    assert_eq!(eval("needs.build.outputs.count == 3", &data), json!(true));
    assert_eq!(eval("needs.missing.result", &data), Value::Null);
  }

  #[test]
  fn logical_operators_return_operands() {
    let data = json!({ "tag": "", "sha": "abc" });

    assert_eq!(eval("tag || sha", &data), json!("abc"));
    assert_eq!(eval("sha && 'yes'", &data), json!("yes"));
    assert_eq!(eval("tag && 'yes'", &data), json!(""));
    assert_eq!(eval("!tag", &data), json!(true));
  }

  #[test]
  fn functions() {
    let data = json!({
      "files": ["Cargo.lock", "src/lib.rs"],
      "ref": "refs/tags/v1.2.0",
    });

    assert_eq!(eval("contains(files, 'cargo.lock')", &data), json!(true));
    assert_eq!(eval("contains(files, 'README.md')", &data), json!(false));
    assert_eq!(eval("startsWith(ref, 'refs/tags/')", &data), json!(true));
    assert_eq!(eval("endsWith(ref, '.0')", &data), json!(true));
    assert_eq!(eval("contains(ref, 'v1')", &data), json!(true));
  }

  #[test]
  fn status_functions() {
    let failed = StatusContext {
      success: false,
      failure: true,
      cancelled: false,
    };
    let data = json!({});

    assert_eq!(evaluate(&parse("failure()").unwrap(), &data, failed), json!(true));
    assert_eq!(evaluate(&parse("success()").unwrap(), &data, failed), json!(false));
    assert_eq!(evaluate(&parse("always()").unwrap(), &data, failed), json!(true));
    assert_eq!(evaluate(&parse("cancelled()").unwrap(), &data, failed), json!(false));
  }

  #[test]
  fn truthiness() {
    assert!(!is_truthy(&json!(null)));
    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("")));
    assert!(is_truthy(&json!("false")));
    assert!(is_truthy(&json!([])));
  }

  #[test]
  fn display_strings() {
    assert_eq!(to_display_string(&json!(3.0)), "3");
    assert_eq!(to_display_string(&json!(1.5)), "1.5");
    assert_eq!(to_display_string(&json!(null)), "");
    assert_eq!(to_display_string(&json!(["a"])), "[\"a\"]");
  }
}
