//! Concept domain types.
//!
//! A concept is a named, versioned value slot in the concept repository.
//! Ground concepts carry their values from the repository file; computed
//! concepts start empty and receive values when an inference produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Concept definition (repository record)
// ---------------------------------------------------------------------------

/// A named value slot in the concept repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    /// Unique key within the repository.
    pub name: String,
    /// Tagged type discriminator.
    pub kind: ConceptKind,
    /// Pre-supplied by the repository, never computed.
    #[serde(default)]
    pub is_ground: bool,
    /// Consumer-visible terminal output.
    #[serde(default)]
    pub is_final: bool,
    /// Declared values for ground concepts (raw JSON payloads).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
}

/// The shape of data a concept holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    Scalar,
    Tuple,
    List,
}

// ---------------------------------------------------------------------------
// Concept state (run-time values)
// ---------------------------------------------------------------------------

/// One resolved value instance held by a concept during a run.
///
/// A concept's `values` supports multiple simultaneous branches of data
/// (batch samples, unpack expansions). Failed capability invocations are
/// recorded here too, so downstream presence checks still see data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptValue {
    /// The JSON payload.
    pub data: Value,
    /// Whether the producing invocation succeeded.
    pub outcome: ValueOutcome,
    /// `flow_index` of the producing inference; `None` for ground values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<u64>,
    /// When the value was recorded.
    pub at: DateTime<Utc>,
}

/// Outcome tag on a concept value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueOutcome {
    /// The value was produced normally.
    Produced,
    /// The underlying capability call failed; `data` is null and the
    /// error text is kept for diagnosis.
    Failed { error: String },
}

impl ConceptValue {
    /// A successfully produced value.
    pub fn produced(data: Value, produced_by: Option<u64>) -> Self {
        Self {
            data,
            outcome: ValueOutcome::Produced,
            produced_by,
            at: Utc::now(),
        }
    }

    /// A failed result value recorded against the target concept.
    pub fn failed(error: String, produced_by: u64) -> Self {
        Self {
            data: Value::Null,
            outcome: ValueOutcome::Failed { error },
            produced_by: Some(produced_by),
            at: Utc::now(),
        }
    }

    /// Whether this value carries usable data.
    pub fn is_produced(&self) -> bool {
        matches!(self.outcome, ValueOutcome::Produced)
    }
}

/// Run-time state of one concept: the definition's name plus the values
/// accumulated so far. Serialized into checkpoint snapshots verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptState {
    pub name: String,
    pub values: Vec<ConceptValue>,
}

impl ConceptState {
    /// Initial state for a concept definition: ground values materialize
    /// immediately, computed concepts start empty.
    pub fn from_definition(def: &Concept) -> Self {
        let values = if def.is_ground {
            def.values
                .iter()
                .map(|v| ConceptValue::produced(v.clone(), None))
                .collect()
        } else {
            Vec::new()
        };
        Self {
            name: def.name.clone(),
            values,
        }
    }

    /// Whether the concept has at least one value of any outcome.
    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Payloads of successfully produced values, in order.
    pub fn produced_payloads(&self) -> Vec<&Value> {
        self.values
            .iter()
            .filter(|v| v.is_produced())
            .map(|v| &v.data)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_concept_repository_record() {
        let raw = r#"{
            "name": "samples",
            "kind": "list",
            "is_ground": true,
            "values": [["5", "7"]]
        }"#;
        let concept: Concept = serde_json::from_str(raw).unwrap();
        assert_eq!(concept.name, "samples");
        assert_eq!(concept.kind, ConceptKind::List);
        assert!(concept.is_ground);
        assert!(!concept.is_final);
        assert_eq!(concept.values, vec![json!(["5", "7"])]);
    }

    #[test]
    fn defaults_for_omitted_flags() {
        let concept: Concept =
            serde_json::from_str(r#"{"name": "sum", "kind": "scalar"}"#).unwrap();
        assert!(!concept.is_ground);
        assert!(!concept.is_final);
        assert!(concept.values.is_empty());
    }

    #[test]
    fn ground_concept_state_materializes_values() {
        let def = Concept {
            name: "a".to_string(),
            kind: ConceptKind::Scalar,
            is_ground: true,
            is_final: false,
            values: vec![json!("5")],
        };
        let state = ConceptState::from_definition(&def);
        assert!(state.has_values());
        assert_eq!(state.values[0].data, json!("5"));
        assert!(state.values[0].produced_by.is_none());
    }

    #[test]
    fn computed_concept_state_starts_empty() {
        let def = Concept {
            name: "sum".to_string(),
            kind: ConceptKind::Scalar,
            is_ground: false,
            is_final: true,
            values: vec![],
        };
        let state = ConceptState::from_definition(&def);
        assert!(!state.has_values());
    }

    #[test]
    fn failed_values_count_for_presence_but_not_payloads() {
        let mut state = ConceptState {
            name: "out".to_string(),
            values: vec![ConceptValue::failed("boom".to_string(), 3)],
        };
        assert!(state.has_values());
        assert!(state.produced_payloads().is_empty());

        state.values.push(ConceptValue::produced(json!("12"), Some(4)));
        assert_eq!(state.produced_payloads(), vec![&json!("12")]);
    }

    #[test]
    fn concept_value_json_roundtrip() {
        let value = ConceptValue::produced(json!({"n": 1}), Some(7));
        let raw = serde_json::to_string(&value).unwrap();
        let parsed: ConceptValue = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, value);

        let failed = ConceptValue::failed("malformed payload".to_string(), 2);
        let raw = serde_json::to_string(&failed).unwrap();
        assert!(raw.contains("\"kind\":\"failed\""));
        let parsed: ConceptValue = serde_json::from_str(&raw).unwrap();
        assert!(!parsed.is_produced());
    }
}
