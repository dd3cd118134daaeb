//! Selector application over composite concept values.
//!
//! A selector draws a positional input from a concept's data sequence:
//! `index` picks one element (out of range is a hard error, never a silent
//! pass-through), `branch` applies exactly one statically declared
//! micro-transform, and `unpack` expands a composite element into N
//! independent bindings.

use serde_json::Value;
use thiserror::Error;

use syllog_types::inference::{BranchRule, SelectorSpec};

use super::{ResolveError, WrapperResolver};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while applying a selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// Index selector out of bounds. Surfaced with the offending selector
    /// state for diagnosis.
    #[error("selector index {index} out of range for sequence of length {len}")]
    Range { index: usize, len: usize },

    /// The selector's source concept has no usable data.
    #[error("selector source has no produced values")]
    EmptySource,

    /// Unpack was requested on a non-composite element.
    #[error("unpack selector needs an array element, got {found}")]
    NotComposite { found: String },

    /// A branch transform failed (e.g. the `content` branch could not read
    /// the referenced file).
    #[error("branch transform failed: {0}")]
    Branch(#[from] ResolveError),
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Result of applying a selector to one concept's data sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedInput {
    /// One value bound to the positional slot.
    Fixed(Value),
    /// N independent values; the owning inference executes once per value
    /// (cross-product with other unpacked inputs).
    Unpacked(Vec<Value>),
}

/// Build the ordered sequence a selector indexes into.
///
/// The sequence is the concept's successfully produced payloads; when
/// exactly one payload exists and it is a JSON array, the sequence is that
/// array's elements. This keeps single-value list concepts addressable by
/// element without an extra nesting level.
pub fn selection_sequence(payloads: &[&Value]) -> Vec<Value> {
    match payloads {
        [single] => match single {
            Value::Array(items) => items.clone(),
            other => vec![(*other).clone()],
        },
        many => many.iter().map(|v| (**v).clone()).collect(),
    }
}

/// Apply a selector spec to a data sequence.
///
/// Order of operations: `index` narrows the sequence to one element,
/// `unpack` expands the selected element, and `branch` transforms each
/// resulting value.
pub fn apply_selector(
    spec: &SelectorSpec,
    sequence: &[Value],
    resolver: &WrapperResolver,
) -> Result<SelectedInput, SelectorError> {
    if sequence.is_empty() {
        return Err(SelectorError::EmptySource);
    }

    let selected: Value = match spec.index {
        Some(index) => sequence
            .get(index)
            .cloned()
            .ok_or(SelectorError::Range {
                index,
                len: sequence.len(),
            })?,
        None => {
            if sequence.len() == 1 {
                sequence[0].clone()
            } else {
                Value::Array(sequence.to_vec())
            }
        }
    };

    if spec.unpack {
        let Value::Array(items) = selected else {
            return Err(SelectorError::NotComposite {
                found: type_name(&selected).to_string(),
            });
        };
        let transformed = items
            .into_iter()
            .map(|item| apply_branch(spec.branch, item, resolver))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SelectedInput::Unpacked(transformed))
    } else {
        Ok(SelectedInput::Fixed(apply_branch(
            spec.branch,
            selected,
            resolver,
        )?))
    }
}

fn apply_branch(
    branch: Option<BranchRule>,
    value: Value,
    resolver: &WrapperResolver,
) -> Result<Value, SelectorError> {
    match branch {
        None | Some(BranchRule::Path) => Ok(value),
        Some(BranchRule::Content) => Ok(resolver.branch_read(&value)?),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
