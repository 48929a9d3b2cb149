//! Guided-question trees
//!
//! Two kinds of tree exist: hand-authored [`DecisionTree`](crate::domain::tree::DecisionTree)s
//! activated by keyword triggers, and [`GeneratedTree`](crate::domain::tree::GeneratedTree)s
//! produced by the text-generation service from a catalog analysis and cached per category.

pub mod cache;
pub mod decoder;
pub mod generator;
pub mod registry;
pub mod triggers;
pub mod validation;
pub mod walk;

use thiserror::Error;

use crate::errors::ApplicationError;
use crate::llm::GenerationError;

pub use cache::{cache_key, CachedTreeEntry, CatalogSnapshot, InMemoryTreeCache, TreeCacheStore};
pub use decoder::{decode_tree, extract_json, DecodeError};
pub use generator::{build_prompt, confidence_score, GenerateOptions, TreeGenerator};
pub use registry::{StaticTree, TreeRegistry};
pub use triggers::{
    TreeTrigger, TriggerContext, TriggerMatch, TriggerMatcher, DEFAULT_TRIGGER_CONFIDENCE,
    SHOULD_TRIGGER_CONFIDENCE,
};
pub use validation::{is_fatal, validate_tree};
pub use walk::{GeneratedTreeSession, TreeSession, WalkError, WalkStep};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("no products in category `{category}`")]
    NoProducts { category: String },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("generated tree is unusable: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("tree cache persistence failed: {0}")]
    Persistence(String),
}

impl From<TreeError> for ApplicationError {
    fn from(value: TreeError) -> Self {
        match value {
            TreeError::NoProducts { category } => Self::NotFound { entity: "category", id: category },
            TreeError::Persistence(message) => Self::Persistence(message),
            other => Self::Integration(other.to_string()),
        }
    }
}
