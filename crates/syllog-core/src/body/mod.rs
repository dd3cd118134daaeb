//! Capability registry ("body").
//!
//! A process-wide, run-scoped registry mapping `(tool, affordance)` to an
//! invocable capability. The registry is built once per run from an
//! immutable [`BodyContext`] and handed by reference to every component
//! that needs it; it holds no per-inference state and assumes no
//! memoization; every scheduled execution is a real invocation.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use syllog_types::paradigm::CapabilityRef;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised by capability invocation.
///
/// These are recorded as failed result values on the target concept, not
/// as scheduler-level failures, so downstream presence checks can proceed.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// No capability registered under this `(tool, affordance)` pair.
    #[error("no capability registered for {0}")]
    Unknown(CapabilityRef),

    /// A required keyword input was absent.
    #[error("capability input '{0}' missing")]
    MissingInput(String),

    /// A keyword input had the wrong shape for this capability.
    #[error("capability input '{name}' invalid: {reason}")]
    InvalidInput { name: String, reason: String },

    /// The underlying call itself failed.
    #[error("capability invocation failed: {0}")]
    Invocation(String),
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Keyword inputs passed to a capability. Ordered map so logging and
/// test assertions are deterministic.
pub type CapabilityInputs = BTreeMap<String, Value>;

/// A single named operation exposed by a tool.
///
/// Object-safe with a boxed future so the registry can hold heterogeneous
/// implementations behind `Arc<dyn Capability>`.
pub trait Capability: Send + Sync {
    /// Invoke the capability with keyword inputs, returning one value or
    /// a capability-specific error.
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>>;
}

// ---------------------------------------------------------------------------
// Body context
// ---------------------------------------------------------------------------

/// Immutable configuration a body is constructed from. Explicitly passed
/// into the constructor, never global state.
#[derive(Debug, Clone)]
pub struct BodyContext {
    /// Working-directory root for file-touching capabilities.
    pub base_dir: PathBuf,
    /// Model identifier for model-backed capabilities, if configured.
    pub model: Option<String>,
}

impl BodyContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The capability registry for one run.
pub struct Body {
    ctx: BodyContext,
    capabilities: HashMap<CapabilityRef, Arc<dyn Capability>>,
}

impl Body {
    /// Create an empty body for the given context.
    pub fn new(ctx: BodyContext) -> Self {
        Self {
            ctx,
            capabilities: HashMap::new(),
        }
    }

    /// The context this body was constructed from.
    pub fn context(&self) -> &BodyContext {
        &self.ctx
    }

    /// Register a capability under `(tool, affordance)`. Later
    /// registrations replace earlier ones.
    pub fn register(
        &mut self,
        tool: impl Into<String>,
        affordance: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) {
        let key = CapabilityRef {
            tool: tool.into(),
            affordance: affordance.into(),
        };
        tracing::debug!(capability = %key, "registered capability");
        self.capabilities.insert(key, capability);
    }

    /// Whether a capability is registered.
    pub fn contains(&self, cap: &CapabilityRef) -> bool {
        self.capabilities.contains_key(cap)
    }

    /// Look up a capability, failing with `CapabilityError::Unknown`.
    pub fn get(&self, cap: &CapabilityRef) -> Result<Arc<dyn Capability>, CapabilityError> {
        self.capabilities
            .get(cap)
            .cloned()
            .ok_or_else(|| CapabilityError::Unknown(cap.clone()))
    }

    /// Invoke a capability by reference.
    pub async fn invoke(
        &self,
        cap: &CapabilityRef,
        inputs: CapabilityInputs,
    ) -> Result<Value, CapabilityError> {
        let capability = self.get(cap)?;
        tracing::debug!(capability = %cap, inputs = inputs.len(), "invoking capability");
        capability.invoke(inputs).await
    }

    /// All registered capability references, sorted for stable listings.
    pub fn registered(&self) -> Vec<CapabilityRef> {
        let mut refs: Vec<_> = self.capabilities.keys().cloned().collect();
        refs.sort_by(|a, b| (&a.tool, &a.affordance).cmp(&(&b.tool, &b.affordance)));
        refs
    }
}

// ---------------------------------------------------------------------------
// Helpers for capability implementations
// ---------------------------------------------------------------------------

/// Pull a required string input out of the keyword map.
pub fn require_str<'a>(
    inputs: &'a CapabilityInputs,
    name: &str,
) -> Result<&'a str, CapabilityError> {
    let value = inputs
        .get(name)
        .ok_or_else(|| CapabilityError::MissingInput(name.to_string()))?;
    value.as_str().ok_or_else(|| CapabilityError::InvalidInput {
        name: name.to_string(),
        reason: "expected a string".to_string(),
    })
}

/// Pull a required input of any shape out of the keyword map.
pub fn require_value<'a>(
    inputs: &'a CapabilityInputs,
    name: &str,
) -> Result<&'a Value, CapabilityError> {
    inputs
        .get(name)
        .ok_or_else(|| CapabilityError::MissingInput(name.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
