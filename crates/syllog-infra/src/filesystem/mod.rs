//! Filesystem adapters.

pub mod paradigms;

pub use paradigms::FileParadigmStore;
