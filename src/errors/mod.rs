//! # Error Taxonomy and Classification
//!
//! The typed failure model shared by every pipeline stage plus the
//! dependency-specific classifiers that produce it.

pub mod classifier;
pub mod typed;

pub use classifier::{
    BrowserErrorClassifier, ErrorClassifier, LlmErrorClassifier, RawFailure, SearchErrorClassifier,
};
pub use typed::{detail, ErrorKind, ErrorSeverity, TypedError};
