//! Shared domain types for Syllog.
//!
//! This crate holds the serde data model that every other crate speaks:
//! concepts, inferences, paradigms, checkpoint snapshots, and the storage
//! error type used by repository traits. It depends on no IO or runtime
//! crates.

pub mod concept;
pub mod config;
pub mod error;
pub mod inference;
pub mod paradigm;
pub mod run;
