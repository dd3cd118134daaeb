//! Filesystem paradigm store.
//!
//! Loads paradigm definitions from `<dir>/<name>.json`. Definitions are
//! read on every load so edits take effect without a restart.

use std::path::PathBuf;

use futures_util::future::BoxFuture;

use syllog_core::paradigm::{ParadigmError, ParadigmStore};
use syllog_types::paradigm::Paradigm;

/// One JSON file per paradigm, named after it.
pub struct FileParadigmStore {
    dir: PathBuf,
}

impl FileParadigmStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn load_file(&self, name: &str) -> Result<Paradigm, ParadigmError> {
        // Paradigm names double as file names; reject anything path-like.
        if name.contains(['/', '\\']) || name.contains("..") {
            return Err(ParadigmError::NotFound(name.to_string()));
        }

        let path = self.dir.join(format!("{name}.json"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ParadigmError::NotFound(name.to_string()));
            }
            Err(e) => {
                return Err(ParadigmError::Load {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let paradigm: Paradigm =
            serde_json::from_str(&raw).map_err(|e| ParadigmError::Load {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if paradigm.name != name {
            return Err(ParadigmError::Load {
                name: name.to_string(),
                reason: format!("definition names itself '{}'", paradigm.name),
            });
        }
        Ok(paradigm)
    }
}

impl ParadigmStore for FileParadigmStore {
    fn load(&self, name: &str) -> BoxFuture<'_, Result<Paradigm, ParadigmError>> {
        let name = name.to_string();
        Box::pin(async move { self.load_file(&name).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
