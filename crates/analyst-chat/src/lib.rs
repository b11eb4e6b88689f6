//! Conversation engine for the business analyst assistant.
//!
//! Turns a user message plus session history into a streamed reply:
//! history sanitizing, mode detection and the mode state machine, prompt
//! assembly, the response cleaner and the per-turn controller. BRD
//! generation and one-shot requirement analysis live here as well.

pub mod analysis;
pub mod brd;
pub mod cleaner;
pub mod controller;
pub mod error;
pub mod history;
pub mod mode;
pub mod prompt;

pub use analysis::RequirementAnalyzer;
pub use brd::{word_chunks, BrdGenerator, BRD_UNAVAILABLE_MESSAGE};
pub use cleaner::{ResponseCleaner, DEFAULT_FALLBACK_QUESTION};
pub use controller::{ConversationController, TurnEvent, TurnStream, SERVICE_UNAVAILABLE_MESSAGE};
pub use error::ChatError;
pub use history::{sanitize, AllowAllPolicy, KeywordRelevancePolicy, RelevancePolicy};
pub use mode::{validate_transition, ModeDetector};
pub use prompt::{assemble, options_for, AssembledPrompt};
