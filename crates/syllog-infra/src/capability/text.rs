//! The `text` tool: pure string and arithmetic affordances.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use syllog_core::body::{Body, Capability, CapabilityError, CapabilityInputs, require_str, require_value};

pub fn register(body: &mut Body) {
    body.register("text", "add", Arc::new(Add));
    body.register("text", "concat", Arc::new(Concat));
    body.register("text", "upper", Arc::new(Upper));
    body.register("text", "template", Arc::new(Template));
}

fn parse_int(inputs: &CapabilityInputs, name: &str) -> Result<i64, CapabilityError> {
    require_str(inputs, name)?
        .trim()
        .parse()
        .map_err(|_| CapabilityError::InvalidInput {
            name: name.to_string(),
            reason: "expected an integer string".to_string(),
        })
}

/// `text.add` -- sum two integer strings: `lhs`, `rhs`.
struct Add;

impl Capability for Add {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let lhs = parse_int(&inputs, "lhs")?;
            let rhs = parse_int(&inputs, "rhs")?;
            Ok(Value::String((lhs + rhs).to_string()))
        })
    }
}

/// `text.concat` -- join the string elements of `parts`, with optional `sep`.
struct Concat;

impl Capability for Concat {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let parts = require_value(&inputs, "parts")?;
            let Value::Array(items) = parts else {
                return Err(CapabilityError::InvalidInput {
                    name: "parts".to_string(),
                    reason: "expected an array".to_string(),
                });
            };
            let sep = inputs
                .get("sep")
                .and_then(Value::as_str)
                .unwrap_or_default();

            let mut joined: Vec<&str> = Vec::with_capacity(items.len());
            for item in items {
                joined.push(item.as_str().ok_or_else(|| CapabilityError::InvalidInput {
                    name: "parts".to_string(),
                    reason: "every element must be a string".to_string(),
                })?);
            }
            Ok(Value::String(joined.join(sep)))
        })
    }
}

/// `text.upper` -- uppercase `value`.
struct Upper;

impl Capability for Upper {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let value = require_str(&inputs, "value")?;
            Ok(Value::String(value.to_uppercase()))
        })
    }
}

/// `text.template` -- substitute `{key}` placeholders in `template` with
/// the remaining string inputs.
struct Template;

impl Capability for Template {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let template = require_str(&inputs, "template")?;
            let mut rendered = template.to_string();
            for (key, value) in &inputs {
                if key == "template" {
                    continue;
                }
                let replacement = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&format!("{{{key}}}"), &replacement);
            }
            Ok(Value::String(rendered))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
