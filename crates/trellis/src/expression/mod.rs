//! Restricted expression language used by `if:` conditions and `${{ }}`
//! templates. Expressions are parsed once when the workflow is loaded and
//! evaluated against a JSON context:
//!
//! | path | value |
//! | --- | --- |
//! | `run_id`, `event`, `branch`, `ref`, `sha`, `actor` | trigger metadata |
//! | `files` | changed files |
//! | `needs.<job>.result`, `needs.<job>.outputs.<key>` | upstream jobs |
//! | `steps.<id>.outcome`, `steps.<id>.outputs.<key>` | earlier steps of the job |
//! | `cache.hit`, `cache.key` | cache resolution for the job |

mod evaluate;
mod parser;

pub use evaluate::{is_truthy, to_display_string, StatusContext};
pub use parser::{BinaryOp, Expr, Function};

use crate::{Error, Result};
use serde_json::Value;

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

fn strip_wrapper(source: &str) -> &str {
  let trimmed = source.trim();
  match trimmed
    .strip_prefix(OPEN)
    .and_then(|rest| rest.strip_suffix(CLOSE))
  {
    Some(inner) if !inner.contains(CLOSE) => inner.trim(),
    _ => trimmed,
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
  source: String,
  expr: Expr,
  checks_status: bool,
}

impl Condition {
  pub fn parse(source: &str) -> Result<Self> {
    let expr = parser::parse(strip_wrapper(source))?;

    Ok(Condition {
      source: source.to_string(),
      checks_status: expr.checks_status(),
      expr,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn evaluate(&self, data: &Value, status: StatusContext) -> bool {
    if !self.checks_status && !status.success {
      return false;
    }

    is_truthy(&evaluate::evaluate(&self.expr, data, status))
  }

  /// A missing condition behaves like `success()`.
  pub fn should_run(condition: Option<&Condition>, data: &Value, status: StatusContext) -> bool {
    match condition {
      Some(condition) => condition.evaluate(data, status),
      None => status.success,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
  Text(String),
  Expr(Expr),
}

/// String with embedded `${{ expr }}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  source: String,
  parts: Vec<Part>,
}

impl Template {
  pub fn parse(source: &str) -> Result<Self> {
    let mut parts = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find(OPEN) {
      if start > 0 {
        parts.push(Part::Text(rest[..start].to_string()));
      }

      let after_open = &rest[start + OPEN.len()..];
      let end = after_open.find(CLOSE).ok_or_else(|| {
        Error::configuration_error(format!("Unterminated `${{{{` in `{}`", source))
      })?;

      parts.push(Part::Expr(parser::parse(after_open[..end].trim())?));
      rest = &after_open[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
      parts.push(Part::Text(rest.to_string()));
    }

    Ok(Template {
      source: source.to_string(),
      parts,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn is_static(&self) -> bool {
    self.parts.iter().all(|part| matches!(part, Part::Text(_)))
  }

  pub fn render(&self, data: &Value) -> String {
    self
      .parts
      .iter()
      .map(|part| match part {
        Part::Text(text) => text.clone(),
        Part::Expr(expr) => {
          to_display_string(&evaluate::evaluate(expr, data, StatusContext::default()))
        }
      })
      .collect()
  }
}

/// Renders every string leaf of a JSON value as a template.
pub fn render_value(value: &Value, data: &Value) -> Result<Value> {
  let rendered = match value {
    Value::String(s) if s.contains(OPEN) => Value::String(Template::parse(s)?.render(data)),
    Value::Array(items) => Value::Array(
      items
        .iter()
        .map(|item| render_value(item, data))
        .collect::<Result<_>>()?,
    ),
    Value::Object(map) => Value::Object(
      map
        .iter()
        .map(|(key, item)| Ok((key.clone(), render_value(item, data)?)))
        .collect::<Result<_>>()?,
    ),
    other => other.clone(),
  };

  Ok(rendered)
}

/// Parse-only pass over a JSON value, so bad templates in step inputs fail
/// at load time instead of mid-run.
pub fn validate_value(value: &Value) -> Result<()> {
  match value {
    Value::String(s) if s.contains(OPEN) => Template::parse(s).map(|_| ()),
    Value::Array(items) => items.iter().try_for_each(validate_value),
    Value::Object(map) => map.values().try_for_each(validate_value),
    _ => Ok(()),
  }
}
