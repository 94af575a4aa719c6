//! Conversational interface for Palaver.
//!
//! Provides the conversation engine that replays a user's dialogue history
//! into a prompt, streams it through an external text-generation service and
//! records both turns, plus the stateless keyword responder.

pub mod context;
pub mod error;
pub mod generation;
pub mod keyword;
pub mod locks;
pub mod orchestrator;

pub use context::{assemble_prompt, ContextWindow};
pub use error::ChatError;
pub use generation::{
    GenerationChunk, GenerationRequest, OllamaClient, StreamAccumulator, TextGenerator,
};
pub use keyword::KeywordResponder;
pub use locks::UserLocks;
pub use orchestrator::{ChatOutcome, ConversationEngine, EngineSettings};
