//! Shopping assistant runtime.
//!
//! This crate connects the personalization engine to a chat turn:
//! - `llm` speaks HTTP to the configured text-generation provider
//! - `assistant` runs mission tracking, tree activation and ranking for each message
//!
//! # Safety Principle
//!
//! The text-generation service only drafts guided questions. Ranking, allergy vetoes and mission
//! state are deterministic decisions made by the core.

pub mod assistant;
pub mod llm;

pub use assistant::{
    AssistantParts, AssistantSettings, QuestionPrompt, Recommendations, ShoppingAssistant,
    TreeActivation, TurnContext, TurnOutcome,
};
pub use llm::{generation_params, HttpTextGenerator};
