//! Prompt assembly and the context-window policy.
//!
//! The store always returns a user's full history; the window decides how
//! much of its tail is replayed into the next prompt.

use palaver_core::config::ChatConfig;
use palaver_core::types::DialogueTurn;

/// Cue appended after the incoming turn so the model answers as the bot.
pub const BOT_CUE: &str = "Bot:";

// =============================================================================
// ContextWindow
// =============================================================================

/// Bounds on how much prior dialogue is replayed into a prompt.
///
/// Both limits keep the most recent turns and drop whole turns from the
/// front. `None` disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextWindow {
    pub max_turns: Option<usize>,
    /// Measured over the rendered `"<sender>: <message>\n"` lines, in chars.
    pub max_chars: Option<usize>,
}

impl ContextWindow {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            max_turns: config.max_context_turns,
            max_chars: config.max_context_chars,
        }
    }

    /// The chronological tail of `history` that fits inside the window.
    pub fn select<'a>(&self, history: &'a [DialogueTurn]) -> &'a [DialogueTurn] {
        let mut start = match self.max_turns {
            Some(max) => history.len().saturating_sub(max),
            None => 0,
        };

        if let Some(max_chars) = self.max_chars {
            let mut used = 0usize;
            let mut fitted = history.len();
            for (idx, turn) in history.iter().enumerate().skip(start).rev() {
                let cost = rendered_len(turn);
                if used + cost > max_chars {
                    break;
                }
                used += cost;
                fitted = idx;
            }
            start = start.max(fitted);
        }

        &history[start..]
    }
}

fn rendered_len(turn: &DialogueTurn) -> usize {
    // "<sender>: <message>\n"
    turn.sender.chars().count() + 2 + turn.message.chars().count() + 1
}

/// Render the prompt sent to the generation service.
///
/// Each prior turn becomes `"<sender>: <message>\n"` in order, followed by
/// the incoming `"<username>: <text>\n"` and the `"Bot:"` cue.
pub fn assemble_prompt(history: &[DialogueTurn], username: &str, text: &str) -> String {
    let capacity = history.iter().map(|t| t.sender.len() + t.message.len() + 3).sum::<usize>()
        + username.len()
        + text.len()
        + 3
        + BOT_CUE.len();
    let mut prompt = String::with_capacity(capacity);

    for turn in history {
        push_line(&mut prompt, &turn.sender, &turn.message);
    }
    push_line(&mut prompt, username, text);
    prompt.push_str(BOT_CUE);
    prompt
}

fn push_line(buf: &mut String, sender: &str, message: &str) {
    buf.push_str(sender);
    buf.push_str(": ");
    buf.push_str(message);
    buf.push('\n');
}
