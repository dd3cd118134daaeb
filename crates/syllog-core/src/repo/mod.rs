//! Concept and inference repository loading.
//!
//! Repositories are ordered JSON lists loaded from disk and validated
//! before any run starts. Every validation failure here is a
//! configuration error: the run is refused outright rather than started
//! and aborted.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

use syllog_types::concept::Concept;
use syllog_types::inference::Inference;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating repositories.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate concept name '{0}'")]
    DuplicateConcept(String),

    #[error("duplicate flow index {0}")]
    DuplicateFlowIndex(u64),

    #[error("inference {flow_index} references unknown concept '{concept}'")]
    DanglingReference { flow_index: u64, concept: String },

    #[error("inference {flow_index} produces ground concept '{concept}'")]
    ProducesGround { flow_index: u64, concept: String },

    #[error("inference {flow_index} has invalid value order: {reason}")]
    InvalidValueOrder { flow_index: u64, reason: String },

    #[error("dependency cycle involving concept '{0}'")]
    Cycle(String),
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// The concept repository: an ordered list of concept definitions.
#[derive(Debug, Clone, Default)]
pub struct ConceptRepository {
    concepts: Vec<Concept>,
}

impl ConceptRepository {
    /// Load and parse a JSON concept list from disk.
    pub fn load(path: &Path) -> Result<Self, RepoError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let concepts: Vec<Concept> =
            serde_json::from_str(&raw).map_err(|source| RepoError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_concepts(concepts)
    }

    /// Build from in-memory definitions, rejecting duplicate names.
    pub fn from_concepts(concepts: Vec<Concept>) -> Result<Self, RepoError> {
        let mut seen = HashSet::new();
        for concept in &concepts {
            if !seen.insert(concept.name.as_str()) {
                return Err(RepoError::DuplicateConcept(concept.name.clone()));
            }
        }
        Ok(Self { concepts })
    }

    pub fn get(&self, name: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.iter()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

/// The inference repository: computation steps ordered by `flow_index`.
#[derive(Debug, Clone, Default)]
pub struct InferenceRepository {
    inferences: Vec<Inference>,
}

impl InferenceRepository {
    /// Load and parse a JSON inference list from disk.
    pub fn load(path: &Path) -> Result<Self, RepoError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let inferences: Vec<Inference> =
            serde_json::from_str(&raw).map_err(|source| RepoError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_inferences(inferences)
    }

    /// Build from in-memory definitions, rejecting duplicate flow indices
    /// and sorting ascending for deterministic scans.
    pub fn from_inferences(mut inferences: Vec<Inference>) -> Result<Self, RepoError> {
        let mut seen = HashSet::new();
        for inference in &inferences {
            if !seen.insert(inference.flow_index) {
                return Err(RepoError::DuplicateFlowIndex(inference.flow_index));
            }
        }
        inferences.sort_by_key(|i| i.flow_index);
        Ok(Self { inferences })
    }

    pub fn get(&self, flow_index: u64) -> Option<&Inference> {
        self.inferences.iter().find(|i| i.flow_index == flow_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inference> {
        self.inferences.iter()
    }

    pub fn len(&self) -> usize {
        self.inferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inferences.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Cross validation
// ---------------------------------------------------------------------------

/// A validated pair of repositories, ready to run.
#[derive(Debug, Clone)]
pub struct RepositorySet {
    pub concepts: ConceptRepository,
    pub inferences: InferenceRepository,
}

impl RepositorySet {
    /// Load both repositories from disk and cross-validate them.
    pub fn load(concept_path: &Path, inference_path: &Path) -> Result<Self, RepoError> {
        Self::new(
            ConceptRepository::load(concept_path)?,
            InferenceRepository::load(inference_path)?,
        )
    }

    /// Cross-validate a repository pair.
    ///
    /// Checks: every referenced concept exists, no inference writes a
    /// ground concept, every binding's value order is a dense zero-based
    /// assignment over its value concepts, and the produces/depends graph
    /// is acyclic.
    pub fn new(
        concepts: ConceptRepository,
        inferences: InferenceRepository,
    ) -> Result<Self, RepoError> {
        for inference in inferences.iter() {
            let flow_index = inference.flow_index;

            for dep in inference.depends_on() {
                if !concepts.contains(dep) {
                    return Err(RepoError::DanglingReference {
                        flow_index,
                        concept: dep.to_string(),
                    });
                }
            }
            if !concepts.contains(&inference.produces) {
                return Err(RepoError::DanglingReference {
                    flow_index,
                    concept: inference.produces.clone(),
                });
            }

            if let Some(target) = concepts.get(&inference.produces)
                && target.is_ground
            {
                return Err(RepoError::ProducesGround {
                    flow_index,
                    concept: inference.produces.clone(),
                });
            }

            validate_value_order(inference)?;
        }

        check_acyclic(&inferences)?;

        Ok(Self { concepts, inferences })
    }
}

/// The value order must assign each value concept exactly one slot, and
/// the slots together must be exactly `0..n`.
fn validate_value_order(inference: &Inference) -> Result<(), RepoError> {
    let order = &inference.binding.value_order;
    let n = inference.value_concepts.len();

    let mut slots: HashMap<usize, &str> = HashMap::with_capacity(n);
    for concept in &inference.value_concepts {
        let Some(&position) = order.get(concept) else {
            return Err(RepoError::InvalidValueOrder {
                flow_index: inference.flow_index,
                reason: format!("concept '{concept}' has no slot"),
            });
        };
        if position >= n {
            return Err(RepoError::InvalidValueOrder {
                flow_index: inference.flow_index,
                reason: format!("slot {position} out of range for {n} value concepts"),
            });
        }
        if let Some(prev) = slots.insert(position, concept) {
            return Err(RepoError::InvalidValueOrder {
                flow_index: inference.flow_index,
                reason: format!("slot {position} assigned to both '{prev}' and '{concept}'"),
            });
        }
    }

    Ok(())
}

/// Reject dependency cycles in the produces/depends graph. A concept can
/// never (transitively) feed an inference that produces it.
fn check_acyclic(inferences: &InferenceRepository) -> Result<(), RepoError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for inference in inferences.iter() {
        for dep in inference.depends_on() {
            graph.add_edge(dep, inference.produces.as_str(), ());
        }
    }

    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| RepoError::Cycle(cycle.node_id().to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
