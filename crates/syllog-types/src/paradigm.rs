//! Paradigm domain types.
//!
//! A paradigm is a declarative, named composition plan over capability
//! calls. Its `plan` is a flat ordered instruction list, not a general
//! graph: each step invokes exactly one capability and may reference only
//! literals, the paradigm's positional inputs, or outputs of earlier steps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Paradigm definition
// ---------------------------------------------------------------------------

/// A declarative pipeline definition loaded by name from a paradigm store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paradigm {
    /// Name of the paradigm (matches its store key).
    pub name: String,
    /// Tools/affordances this paradigm needs from the capability registry.
    #[serde(default)]
    pub capability_requirements: Vec<CapabilityRef>,
    /// Ordered list of steps, each producing a named intermediate output.
    pub plan: Vec<PlanStep>,
    /// Which intermediate output becomes the paradigm's result.
    pub return_key: String,
}

/// A `(tool, affordance)` pair naming one capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityRef {
    pub tool: String,
    pub affordance: String,
}

impl std::fmt::Display for CapabilityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.tool, self.affordance)
    }
}

// ---------------------------------------------------------------------------
// Plan steps
// ---------------------------------------------------------------------------

/// One instruction in a paradigm plan: a single capability call whose
/// result is stored under `output_key` for later steps to reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Key the step's result is stored under.
    pub output_key: String,
    /// The capability to invoke.
    pub capability: CapabilityRef,
    /// Keyword parameters passed to the capability.
    #[serde(default)]
    pub params: HashMap<String, ParamSource>,
}

/// Where a step parameter's value comes from.
///
/// Tagged-variant dispatch: a plan resolves against the capability table
/// without any runtime reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum ParamSource {
    /// A literal JSON value embedded in the plan.
    Literal { value: Value },
    /// The paradigm's positional input at this slot.
    Input { position: usize },
    /// The output of an earlier step in the same plan.
    Step { output_key: String },
}

// ---------------------------------------------------------------------------
// Paradigm result
// ---------------------------------------------------------------------------

/// Result kind tag attached to a paradigm's output so the scheduler knows
/// how to merge it into the target concept's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// One value per binding set (the common case).
    Single,
    /// Multiple values from unpack expansion.
    Expanded,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
