//! Inference domain types.
//!
//! An inference is a named computation step: it consumes concepts and
//! produces exactly one concept. The `binding` describes how dependency
//! concepts map onto the paradigm's positional inputs, including any
//! selector rules for extracting sub-values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inference definition (repository record)
// ---------------------------------------------------------------------------

/// A single computation step in the inference repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inference {
    /// Dependency and audit ordering key. Unique within a repository.
    pub flow_index: u64,
    /// How to interpret this step.
    pub sequence_kind: SequenceKind,
    /// The single target concept name.
    pub produces: String,
    /// The concept naming the paradigm/behavior for this step.
    pub function_concept: String,
    /// Concepts supplying data, in declaration order.
    #[serde(default)]
    pub value_concepts: Vec<String>,
    /// Paradigm name, positional order, and per-value selector rules.
    pub binding: BindingSpec,
}

impl Inference {
    /// Every concept this inference depends on: the function concept,
    /// the value concepts, and any selector source concepts.
    pub fn depends_on(&self) -> Vec<&str> {
        let mut deps = vec![self.function_concept.as_str()];
        deps.extend(self.value_concepts.iter().map(String::as_str));
        for selector in self.binding.value_selectors.values() {
            if let Some(source) = &selector.source_concept {
                deps.push(source.as_str());
            }
        }
        deps.sort_unstable();
        deps.dedup();
        deps
    }
}

/// Discriminates how an inference is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    /// A single paradigm call through the capability registry.
    Paradigm,
    /// A pure grouping of existing concept values, no external call.
    Grouping,
}

// ---------------------------------------------------------------------------
// Binding spec
// ---------------------------------------------------------------------------

/// How dependency concepts bind to a paradigm's declared inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSpec {
    /// Name of the paradigm to execute.
    pub paradigm: String,
    /// Positional slot for each value concept (dense, zero-based).
    #[serde(default)]
    pub value_order: HashMap<String, usize>,
    /// Selector rules keyed by value concept name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub value_selectors: HashMap<String, SelectorSpec>,
}

/// A rule for drawing a positional input from a different concept, or from
/// a sub-element of a composite concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSpec {
    /// Draw from this concept instead of the one directly listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_concept: Option<String>,
    /// Pick the element at this position from the ordered sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Micro-transform applied to the selected element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchRule>,
    /// Expand a composite value into N independent bindings
    /// (cross-product with other unpacked inputs of the same inference).
    #[serde(default)]
    pub unpack: bool,
}

/// The closed set of branch micro-transforms. Branch selection is declared
/// statically in the binding spec, never inferred from runtime content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchRule {
    /// Read the selected element as a file path and return its contents.
    Content,
    /// Keep the selected element as a path string.
    Path,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inference_repository_record() {
        let raw = r#"{
            "flow_index": 3,
            "sequence_kind": "paradigm",
            "produces": "sum",
            "function_concept": "adder",
            "value_concepts": ["a", "b"],
            "binding": {
                "paradigm": "add_two",
                "value_order": {"a": 0, "b": 1},
                "value_selectors": {
                    "b": {"source_concept": "raw_numbers", "index": 1}
                }
            }
        }"#;
        let inference: Inference = serde_json::from_str(raw).unwrap();
        assert_eq!(inference.flow_index, 3);
        assert_eq!(inference.sequence_kind, SequenceKind::Paradigm);
        assert_eq!(inference.produces, "sum");
        assert_eq!(inference.binding.paradigm, "add_two");
        assert_eq!(inference.binding.value_order["b"], 1);

        let selector = &inference.binding.value_selectors["b"];
        assert_eq!(selector.source_concept.as_deref(), Some("raw_numbers"));
        assert_eq!(selector.index, Some(1));
        assert!(selector.branch.is_none());
        assert!(!selector.unpack);
    }

    #[test]
    fn depends_on_includes_function_and_selector_sources() {
        let raw = r#"{
            "flow_index": 1,
            "sequence_kind": "paradigm",
            "produces": "out",
            "function_concept": "fn",
            "value_concepts": ["x"],
            "binding": {
                "paradigm": "p",
                "value_order": {"x": 0},
                "value_selectors": {
                    "x": {"source_concept": "other", "unpack": true}
                }
            }
        }"#;
        let inference: Inference = serde_json::from_str(raw).unwrap();
        let deps = inference.depends_on();
        assert_eq!(deps, vec!["fn", "other", "x"]);
    }

    #[test]
    fn grouping_inference_parses_without_selectors() {
        let raw = r#"{
            "flow_index": 9,
            "sequence_kind": "grouping",
            "produces": "bundle",
            "function_concept": "grouper",
            "value_concepts": ["a", "b"],
            "binding": {"paradigm": "group", "value_order": {"a": 0, "b": 1}}
        }"#;
        let inference: Inference = serde_json::from_str(raw).unwrap();
        assert_eq!(inference.sequence_kind, SequenceKind::Grouping);
        assert!(inference.binding.value_selectors.is_empty());
    }

    #[test]
    fn branch_rule_rejects_unknown_variants() {
        let raw = r#"{"branch": "read_backwards"}"#;
        let result: Result<SelectorSpec, _> = serde_json::from_str(raw);
        assert!(result.is_err(), "unknown branch rules must fail at parse time");
    }

    #[test]
    fn branch_rule_serde_roundtrip() {
        for rule in [BranchRule::Content, BranchRule::Path] {
            let raw = serde_json::to_string(&rule).unwrap();
            let parsed: BranchRule = serde_json::from_str(&raw).unwrap();
            assert_eq!(parsed, rule);
        }
    }
}
