//! Wrapper and selector resolution.
//!
//! Turns raw reference strings and nested containers into the concrete
//! values a capability call needs. Wrapper strings (`%{kind}tag(content)`)
//! are parsed into an AST and evaluated against an explicit immutable
//! [`ResolverContext`]; selectors (index/branch/unpack) extract and
//! transform sub-values from composite concepts.

pub mod selector;
pub mod wrapper;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

pub use selector::{SelectorError, apply_selector, selection_sequence};
pub use wrapper::WrapperExpr;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while resolving wrapper references.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A `file`/`script` wrapper pointed at something unreadable.
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A wrapper's resolved content was not a path-like string.
    #[error("wrapper kind '{kind}' needs a string payload, got {found}")]
    NonStringPayload { kind: String, found: String },

    /// A path escaped the resolver's base directory.
    #[error("path '{0}' escapes the working directory")]
    PathEscape(String),
}

// ---------------------------------------------------------------------------
// Resolver context
// ---------------------------------------------------------------------------

/// Immutable per-run context threaded into wrapper resolution. Passed by
/// reference wherever resolution happens; never a global.
#[derive(Debug, Clone)]
pub struct ResolverContext {
    /// Root for all relative paths named by wrapper references.
    pub base_dir: PathBuf,
}

impl ResolverContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// WrapperResolver
// ---------------------------------------------------------------------------

/// Resolves wrapper reference strings and nested containers.
pub struct WrapperResolver {
    ctx: ResolverContext,
}

impl WrapperResolver {
    pub fn new(ctx: ResolverContext) -> Self {
        Self { ctx }
    }

    /// Resolve a JSON value recursively: arrays resolve element-wise with
    /// their shape preserved, strings go through the wrapper parser, and
    /// other scalars pass through untouched.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, ResolveError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::String(s) => self.resolve_str(s),
            other => Ok(other.clone()),
        }
    }

    /// Parse and evaluate one string. Non-wrapper strings come back as-is.
    pub fn resolve_str(&self, raw: &str) -> Result<Value, ResolveError> {
        self.eval(&WrapperExpr::parse(raw))
    }

    fn eval(&self, expr: &WrapperExpr) -> Result<Value, ResolveError> {
        match expr {
            WrapperExpr::Literal(s) => Ok(Value::String(s.clone())),
            WrapperExpr::Wrapped { kind, tag, content } => {
                let inner = self.eval(content)?;
                match kind.as_str() {
                    "file" => self.read_file(kind, &inner),
                    "dir" => self.writable_dir(kind, &inner),
                    "script" => self.script_path(kind, &inner),
                    other => {
                        // Unknown kinds fall back to the literal content.
                        tracing::debug!(kind = other, tag, "unknown wrapper kind, passing content through");
                        Ok(inner)
                    }
                }
            }
        }
    }

    /// Read the referenced file's contents.
    fn read_file(&self, kind: &str, payload: &Value) -> Result<Value, ResolveError> {
        let path = self.anchored_path(kind, payload)?;
        let contents = std::fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Value::String(contents))
    }

    /// Ensure the referenced directory exists and yield its absolute path.
    fn writable_dir(&self, kind: &str, payload: &Value) -> Result<Value, ResolveError> {
        let path = self.anchored_path(kind, payload)?;
        std::fs::create_dir_all(&path).map_err(|source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Value::String(path.display().to_string()))
    }

    /// Yield the absolute path of an existing script.
    fn script_path(&self, kind: &str, payload: &Value) -> Result<Value, ResolveError> {
        let path = self.anchored_path(kind, payload)?;
        if !path.exists() {
            return Err(ResolveError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "script not found"),
            });
        }
        Ok(Value::String(path.display().to_string()))
    }

    /// Interpret a payload as a path under the base directory. Absolute
    /// inputs and `..` traversal are rejected.
    fn anchored_path(&self, kind: &str, payload: &Value) -> Result<PathBuf, ResolveError> {
        let raw = payload.as_str().ok_or_else(|| ResolveError::NonStringPayload {
            kind: kind.to_string(),
            found: payload_type_name(payload).to_string(),
        })?;

        let relative = Path::new(raw);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ResolveError::PathEscape(raw.to_string()));
        }

        Ok(self.ctx.base_dir.join(relative))
    }

    /// Read a file named by a selector's `content` branch transform.
    pub(crate) fn branch_read(&self, payload: &Value) -> Result<Value, ResolveError> {
        self.read_file("file", payload)
    }
}

fn payload_type_name(value: &Value) -> &'static str {
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
