//! Infrastructure layer for Syllog.
//!
//! Contains implementations of the ports defined in `syllog-core`:
//! SQLite checkpoint storage, the built-in capability set, the
//! filesystem paradigm store, and configuration loading.

pub mod capability;
pub mod config;
pub mod filesystem;
pub mod sqlite;
