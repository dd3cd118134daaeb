//! The `fs` tool: file affordances confined to the body's base directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use syllog_core::body::{Body, Capability, CapabilityError, CapabilityInputs, require_str};

pub fn register(body: &mut Body) {
    let base = body.context().base_dir.clone();
    body.register("fs", "read", Arc::new(Read { base: base.clone() }));
    body.register("fs", "write", Arc::new(Write { base: base.clone() }));
    body.register("fs", "list", Arc::new(List { base }));
}

/// Interpret a relative path under the base directory. Absolute inputs
/// and `..` traversal are rejected.
fn anchored(base: &Path, raw: &str) -> Result<PathBuf, CapabilityError> {
    let relative = Path::new(raw);
    if relative.is_absolute()
        || relative.components().any(|c| matches!(c, Component::ParentDir))
    {
        return Err(CapabilityError::InvalidInput {
            name: "path".to_string(),
            reason: format!("'{raw}' escapes the working directory"),
        });
    }
    Ok(base.join(relative))
}

/// `fs.read` -- return the contents of the file at `path`.
struct Read {
    base: PathBuf,
}

impl Capability for Read {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let path = anchored(&self.base, require_str(&inputs, "path")?)?;
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CapabilityError::Invocation(format!("read {}: {e}", path.display())))?;
            Ok(Value::String(contents))
        })
    }
}

/// `fs.write` -- write `content` to `path`, creating parent directories.
/// Returns the path written.
struct Write {
    base: PathBuf,
}

impl Capability for Write {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let raw = require_str(&inputs, "path")?.to_string();
            let content = require_str(&inputs, "content")?.to_string();
            let path = anchored(&self.base, &raw)?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CapabilityError::Invocation(format!("mkdir {}: {e}", parent.display()))
                })?;
            }
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| CapabilityError::Invocation(format!("write {}: {e}", path.display())))?;
            Ok(Value::String(raw))
        })
    }
}

/// `fs.list` -- file names under `path` (or the base directory), sorted.
struct List {
    base: PathBuf,
}

impl Capability for List {
    fn invoke(&self, inputs: CapabilityInputs) -> BoxFuture<'_, Result<Value, CapabilityError>> {
        Box::pin(async move {
            let dir = match inputs.get("path").and_then(Value::as_str) {
                Some(raw) => anchored(&self.base, raw)?,
                None => self.base.clone(),
            };

            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| CapabilityError::Invocation(format!("list {}: {e}", dir.display())))?;
            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| CapabilityError::Invocation(e.to_string()))?
            {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(Value::Array(names.into_iter().map(Value::String).collect()))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
