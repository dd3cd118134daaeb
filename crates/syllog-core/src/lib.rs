//! Scheduling, composition, and checkpoint logic for Syllog.
//!
//! This crate defines the "ports" (the checkpoint repository trait and
//! the paradigm store trait) that the infrastructure layer implements.
//! It depends only on `syllog-types` -- never on `syllog-infra` or any
//! database crate.

pub mod body;
pub mod checkpoint;
pub mod orchestrator;
pub mod paradigm;
pub mod repo;
pub mod repository;
pub mod resolver;
