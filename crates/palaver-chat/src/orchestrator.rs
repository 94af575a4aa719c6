//! Conversation engine: the stateful `/chat-ai` pipeline.
//!
//! One call runs identity resolution, history load, prompt assembly, one
//! streamed generation and the write of both turns, strictly in that order.
//! Any failure before generation completes ends the call with nothing
//! written. Failures while writing the turns are logged and reported through
//! [`ChatOutcome::persisted`] but never withhold the reply.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use palaver_core::config::{ChatConfig, GenerationConfig};
use palaver_core::types::DialogueTurn;
use palaver_storage::{DialogueRepository, UserRepository};

use crate::context::{assemble_prompt, ContextWindow};
use crate::error::ChatError;
use crate::generation::{GenerationRequest, TextGenerator};
use crate::locks::UserLocks;

/// Fixed parameters for every generation call plus engine policy.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Sender recorded on generated turns.
    pub bot_tag: String,
    pub window: ContextWindow,
    pub serialize_per_user: bool,
}

impl EngineSettings {
    pub fn from_config(generation: &GenerationConfig, chat: &ChatConfig) -> Self {
        Self {
            model: generation.model.clone(),
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            bot_tag: chat.bot_tag.clone(),
            window: ContextWindow::from_config(chat),
            serialize_per_user: chat.serialize_per_user,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default(), &ChatConfig::default())
    }
}

/// Result of one successful conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    /// Accumulated generated text, possibly empty.
    pub reply: String,
    /// Whether both the user turn and the bot turn were written.
    pub persisted: bool,
    /// Prior turns replayed into the prompt.
    pub context_turns: usize,
}

pub struct ConversationEngine {
    users: UserRepository,
    dialogue: DialogueRepository,
    generator: Arc<dyn TextGenerator>,
    locks: UserLocks,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        users: UserRepository,
        dialogue: DialogueRepository,
        generator: Arc<dyn TextGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            users,
            dialogue,
            generator,
            locks: UserLocks::new(),
            settings,
        }
    }

    /// Run one conversational turn for `username`.
    pub async fn converse(&self, username: &str, text: &str) -> Result<ChatOutcome, ChatError> {
        if username.is_empty() {
            return Err(ChatError::EmptyUser);
        }

        let _guard = if self.settings.serialize_per_user {
            Some(self.locks.acquire(username).await)
        } else {
            None
        };

        let (user, provisioned) = self.users.find_or_provision(username)?;
        if provisioned {
            info!(username = %username, user_id = user.id, "Provisioned chat identity");
        }

        let history = self.dialogue.history(user.id)?;
        let context = self.settings.window.select(&history);
        let request = GenerationRequest {
            model: self.settings.model.clone(),
            prompt: assemble_prompt(context, username, text),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        debug!(
            username = %username,
            history_turns = history.len(),
            context_turns = context.len(),
            prompt_chars = request.prompt.chars().count(),
            "Prompt assembled"
        );

        let started = Instant::now();
        let reply = self.generator.generate(&request).await.map_err(|e| {
            error!(username = %username, error = %e, "Generation failed");
            e
        })?;
        info!(
            username = %username,
            reply_chars = reply.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation complete"
        );

        let persisted = self.record_turns(user.id, username, text, &reply);

        Ok(ChatOutcome {
            reply,
            persisted,
            context_turns: context.len(),
        })
    }

    /// Write the user turn then the bot turn. Both are attempted.
    fn record_turns(&self, user_id: i64, username: &str, text: &str, reply: &str) -> bool {
        let mut persisted = true;
        if let Err(e) = self.dialogue.append(user_id, username, text) {
            error!(username = %username, error = %e, "Failed to save user turn");
            persisted = false;
        }
        if let Err(e) = self.dialogue.append(user_id, &self.settings.bot_tag, reply) {
            error!(username = %username, error = %e, "Failed to save bot turn");
            persisted = false;
        }
        persisted
    }

    /// Full recorded dialogue for `username`, oldest first.
    ///
    /// An unknown username has an empty history; nothing is provisioned.
    pub fn history(&self, username: &str) -> Result<Vec<DialogueTurn>, ChatError> {
        match self.users.find_by_username(username)? {
            Some(user) => Ok(self.dialogue.history(user.id)?),
            None => Ok(Vec::new()),
        }
    }
}
