//! Composition interpreter for paradigm plans.
//!
//! A paradigm is interpreted in five stages: load, validate, input
//! binding, in-order step evaluation, and return extraction. Any stage
//! failure aborts the owning inference only; the run itself continues.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use syllog_types::paradigm::{Paradigm, ParamSource, ResultKind};

use crate::body::{Body, CapabilityError, CapabilityInputs};
use crate::resolver::{ResolveError, WrapperResolver};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while interpreting a paradigm.
#[derive(Debug, Error)]
pub enum ParadigmError {
    /// The store has no paradigm under this name.
    #[error("paradigm '{0}' not found")]
    NotFound(String),

    /// The store failed to load or parse the definition.
    #[error("paradigm '{name}' failed to load: {reason}")]
    Load { name: String, reason: String },

    /// A declared capability requirement is not registered in the body.
    #[error("paradigm '{paradigm}' requires unregistered capability {capability}")]
    MissingCapability { paradigm: String, capability: String },

    /// A step parameter referenced an output key no earlier step produced.
    #[error("step '{step}' references '{output_key}' before it is produced")]
    ForwardReference { step: String, output_key: String },

    /// The return key does not name any step output.
    #[error("return key '{0}' matches no step output")]
    UnknownReturnKey(String),

    /// A step parameter referenced a positional input beyond the bound arity.
    #[error("step '{step}' references input {position}, only {arity} bound")]
    InputArity {
        step: String,
        position: usize,
        arity: usize,
    },

    /// Wrapper resolution of an input or literal failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The capability invocation itself failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

// ---------------------------------------------------------------------------
// Paradigm store
// ---------------------------------------------------------------------------

/// Loads paradigm definitions by name.
///
/// Object-safe so the engine can hold any backing store (filesystem JSON,
/// in-memory for tests) behind `Arc<dyn ParadigmStore>`.
pub trait ParadigmStore: Send + Sync {
    fn load(&self, name: &str) -> BoxFuture<'_, Result<Paradigm, ParadigmError>>;
}

/// In-memory store over a fixed set of definitions. Used by tests and by
/// library embedders that build paradigms in code.
#[derive(Default)]
pub struct StaticParadigmStore {
    paradigms: HashMap<String, Paradigm>,
}

impl StaticParadigmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, paradigm: Paradigm) {
        self.paradigms.insert(paradigm.name.clone(), paradigm);
    }
}

impl ParadigmStore for StaticParadigmStore {
    fn load(&self, name: &str) -> BoxFuture<'_, Result<Paradigm, ParadigmError>> {
        let result = self
            .paradigms
            .get(name)
            .cloned()
            .ok_or_else(|| ParadigmError::NotFound(name.to_string()));
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Result of interpreting one paradigm across its binding sets.
#[derive(Debug, Clone, PartialEq)]
pub struct ParadigmResult {
    /// One value per binding set, in binding-set order.
    pub values: Vec<Value>,
    /// Whether the result came from a single binding or unpack expansion.
    pub kind: ResultKind,
}

/// Interprets paradigm plans against a capability registry.
pub struct ParadigmEngine {
    store: Arc<dyn ParadigmStore>,
    body: Arc<Body>,
    resolver: WrapperResolver,
}

impl ParadigmEngine {
    pub fn new(store: Arc<dyn ParadigmStore>, body: Arc<Body>, resolver: WrapperResolver) -> Self {
        Self {
            store,
            body,
            resolver,
        }
    }

    /// Interpret a paradigm once per binding set.
    ///
    /// Binding sets come from selector evaluation: a single set for fixed
    /// bindings, several for unpack cross-products. Each set is an ordered
    /// positional input vector.
    pub async fn run(
        &self,
        name: &str,
        binding_sets: Vec<Vec<Value>>,
    ) -> Result<ParadigmResult, ParadigmError> {
        let paradigm = self.store.load(name).await?;
        self.validate(&paradigm)?;

        let kind = if binding_sets.len() > 1 {
            ResultKind::Expanded
        } else {
            ResultKind::Single
        };

        let mut values = Vec::with_capacity(binding_sets.len());
        for inputs in binding_sets {
            values.push(self.evaluate(&paradigm, inputs).await?);
        }

        Ok(ParadigmResult { values, kind })
    }

    /// Static validation: every required capability is registered, every
    /// step-output reference points backwards, and the return key exists.
    fn validate(&self, paradigm: &Paradigm) -> Result<(), ParadigmError> {
        for cap in &paradigm.capability_requirements {
            if !self.body.contains(cap) {
                return Err(ParadigmError::MissingCapability {
                    paradigm: paradigm.name.clone(),
                    capability: cap.to_string(),
                });
            }
        }

        let mut produced: Vec<&str> = Vec::with_capacity(paradigm.plan.len());
        for step in &paradigm.plan {
            for source in step.params.values() {
                if let ParamSource::Step { output_key } = source
                    && !produced.contains(&output_key.as_str())
                {
                    return Err(ParadigmError::ForwardReference {
                        step: step.output_key.clone(),
                        output_key: output_key.clone(),
                    });
                }
            }
            produced.push(step.output_key.as_str());
        }

        if !produced.contains(&paradigm.return_key.as_str()) {
            return Err(ParadigmError::UnknownReturnKey(paradigm.return_key.clone()));
        }

        Ok(())
    }

    /// Evaluate the plan for one positional input vector.
    async fn evaluate(
        &self,
        paradigm: &Paradigm,
        inputs: Vec<Value>,
    ) -> Result<Value, ParadigmError> {
        // Inputs resolve once, before any step sees them.
        let inputs = inputs
            .iter()
            .map(|input| self.resolver.resolve_value(input))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs: HashMap<&str, Value> = HashMap::with_capacity(paradigm.plan.len());
        for step in &paradigm.plan {
            let mut call_inputs = CapabilityInputs::new();
            for (param, source) in &step.params {
                let value = match source {
                    ParamSource::Literal { value } => self.resolver.resolve_value(value)?,
                    ParamSource::Input { position } => inputs
                        .get(*position)
                        .cloned()
                        .ok_or_else(|| ParadigmError::InputArity {
                            step: step.output_key.clone(),
                            position: *position,
                            arity: inputs.len(),
                        })?,
                    ParamSource::Step { output_key } => outputs
                        .get(output_key.as_str())
                        .cloned()
                        .ok_or_else(|| ParadigmError::ForwardReference {
                            step: step.output_key.clone(),
                            output_key: output_key.clone(),
                        })?,
                };
                call_inputs.insert(param.clone(), value);
            }

            tracing::debug!(
                paradigm = %paradigm.name,
                step = %step.output_key,
                capability = %step.capability,
                "evaluating plan step"
            );
            let result = self.body.invoke(&step.capability, call_inputs).await?;
            outputs.insert(step.output_key.as_str(), result);
        }

        outputs
            .remove(paradigm.return_key.as_str())
            .ok_or_else(|| ParadigmError::UnknownReturnKey(paradigm.return_key.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyContext, Capability, require_str};
    use crate::resolver::ResolverContext;
    use serde_json::json;
    use syllog_types::paradigm::{CapabilityRef, PlanStep};

    struct Add;

    impl Capability for Add {
        fn invoke(
            &self,
            inputs: CapabilityInputs,
        ) -> BoxFuture<'_, Result<Value, CapabilityError>> {
            Box::pin(async move {
                let lhs: i64 = require_str(&inputs, "lhs")?.parse().map_err(|_| {
                    CapabilityError::InvalidInput {
                        name: "lhs".to_string(),
                        reason: "not an integer".to_string(),
                    }
                })?;
                let rhs: i64 = require_str(&inputs, "rhs")?.parse().map_err(|_| {
                    CapabilityError::InvalidInput {
                        name: "rhs".to_string(),
                        reason: "not an integer".to_string(),
                    }
                })?;
                Ok(json!((lhs + rhs).to_string()))
            })
        }
    }

    struct Upper;

    impl Capability for Upper {
        fn invoke(
            &self,
            inputs: CapabilityInputs,
        ) -> BoxFuture<'_, Result<Value, CapabilityError>> {
            Box::pin(async move {
                let value = require_str(&inputs, "value")?;
                Ok(json!(value.to_uppercase()))
            })
        }
    }

    fn cap(tool: &str, affordance: &str) -> CapabilityRef {
        CapabilityRef {
            tool: tool.to_string(),
            affordance: affordance.to_string(),
        }
    }

    fn add_two() -> Paradigm {
        Paradigm {
            name: "add_two".to_string(),
            capability_requirements: vec![cap("text", "add")],
            plan: vec![PlanStep {
                output_key: "total".to_string(),
                capability: cap("text", "add"),
                params: HashMap::from([
                    ("lhs".to_string(), ParamSource::Input { position: 0 }),
                    ("rhs".to_string(), ParamSource::Input { position: 1 }),
                ]),
            }],
            return_key: "total".to_string(),
        }
    }

    fn engine_with(paradigms: Vec<Paradigm>) -> (tempfile::TempDir, ParadigmEngine) {
        let dir = tempfile::tempdir().unwrap();

        let mut body = Body::new(BodyContext::new(dir.path()));
        body.register("text", "add", Arc::new(Add));
        body.register("text", "upper", Arc::new(Upper));

        let mut store = StaticParadigmStore::new();
        for paradigm in paradigms {
            store.insert(paradigm);
        }

        let resolver = WrapperResolver::new(ResolverContext::new(dir.path()));
        let engine = ParadigmEngine::new(Arc::new(store), Arc::new(body), resolver);
        (dir, engine)
    }

    #[tokio::test]
    async fn single_binding_set_adds() {
        let (_dir, engine) = engine_with(vec![add_two()]);
        let result = engine
            .run("add_two", vec![vec![json!("5"), json!("7")]])
            .await
            .unwrap();
        assert_eq!(result.values, vec![json!("12")]);
        assert_eq!(result.kind, ResultKind::Single);
    }

    #[tokio::test]
    async fn multiple_binding_sets_expand() {
        let (_dir, engine) = engine_with(vec![add_two()]);
        let result = engine
            .run(
                "add_two",
                vec![
                    vec![json!("1"), json!("2")],
                    vec![json!("10"), json!("20")],
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.values, vec![json!("3"), json!("30")]);
        assert_eq!(result.kind, ResultKind::Expanded);
    }

    #[tokio::test]
    async fn missing_paradigm_errors() {
        let (_dir, engine) = engine_with(vec![]);
        let err = engine.run("absent", vec![vec![]]).await.unwrap_err();
        assert!(matches!(err, ParadigmError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_capability_requirement_errors() {
        let mut paradigm = add_two();
        paradigm.capability_requirements.push(cap("net", "fetch"));
        let (_dir, engine) = engine_with(vec![paradigm]);
        let err = engine
            .run("add_two", vec![vec![json!("1"), json!("2")]])
            .await
            .unwrap_err();
        match err {
            ParadigmError::MissingCapability { capability, .. } => {
                assert_eq!(capability, "net.fetch");
            }
            other => panic!("expected missing capability, got {other}"),
        }
    }

    #[tokio::test]
    async fn forward_reference_rejected() {
        let paradigm = Paradigm {
            name: "bad".to_string(),
            capability_requirements: vec![cap("text", "upper")],
            plan: vec![PlanStep {
                output_key: "first".to_string(),
                capability: cap("text", "upper"),
                params: HashMap::from([(
                    "value".to_string(),
                    ParamSource::Step { output_key: "later".to_string() },
                )]),
            }],
            return_key: "first".to_string(),
        };
        let (_dir, engine) = engine_with(vec![paradigm]);
        let err = engine.run("bad", vec![vec![]]).await.unwrap_err();
        assert!(matches!(err, ParadigmError::ForwardReference { .. }));
    }

    #[tokio::test]
    async fn unknown_return_key_rejected() {
        let mut paradigm = add_two();
        paradigm.return_key = "missing".to_string();
        let (_dir, engine) = engine_with(vec![paradigm]);
        let err = engine
            .run("add_two", vec![vec![json!("1"), json!("2")]])
            .await
            .unwrap_err();
        assert!(matches!(err, ParadigmError::UnknownReturnKey(_)));
    }

    #[tokio::test]
    async fn step_output_feeds_later_step() {
        let paradigm = Paradigm {
            name: "add_then_shout".to_string(),
            capability_requirements: vec![cap("text", "add"), cap("text", "upper")],
            plan: vec![
                PlanStep {
                    output_key: "total".to_string(),
                    capability: cap("text", "add"),
                    params: HashMap::from([
                        ("lhs".to_string(), ParamSource::Input { position: 0 }),
                        (
                            "rhs".to_string(),
                            ParamSource::Literal { value: json!("1") },
                        ),
                    ]),
                },
                PlanStep {
                    output_key: "shouted".to_string(),
                    capability: cap("text", "upper"),
                    params: HashMap::from([(
                        "value".to_string(),
                        ParamSource::Step { output_key: "total".to_string() },
                    )]),
                },
            ],
            return_key: "shouted".to_string(),
        };
        let (_dir, engine) = engine_with(vec![paradigm]);
        let result = engine
            .run("add_then_shout", vec![vec![json!("41")]])
            .await
            .unwrap();
        assert_eq!(result.values, vec![json!("42")]);
    }

    #[tokio::test]
    async fn wrapper_inputs_resolve_before_steps() {
        let (dir, engine) = engine_with(vec![add_two()]);
        std::fs::write(dir.path().join("n.txt"), "30").unwrap();

        let result = engine
            .run(
                "add_two",
                vec![vec![json!("%{file}n(n.txt)"), json!("12")]],
            )
            .await
            .unwrap();
        assert_eq!(result.values, vec![json!("42")]);
    }

    #[tokio::test]
    async fn input_position_beyond_arity_errors() {
        let (_dir, engine) = engine_with(vec![add_two()]);
        let err = engine
            .run("add_two", vec![vec![json!("5")]])
            .await
            .unwrap_err();
        match err {
            ParadigmError::InputArity { position, arity, .. } => {
                assert_eq!(position, 1);
                assert_eq!(arity, 1);
            }
            other => panic!("expected arity error, got {other}"),
        }
    }

    #[tokio::test]
    async fn capability_failure_surfaces() {
        let (_dir, engine) = engine_with(vec![add_two()]);
        let err = engine
            .run("add_two", vec![vec![json!("five"), json!("7")]])
            .await
            .unwrap_err();
        assert!(matches!(err, ParadigmError::Capability(_)));
    }
}
