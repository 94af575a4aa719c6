use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identity
// =============================================================================

/// A known username.
///
/// Users created through registration carry a password hash. Users first seen
/// by the conversational endpoint are provisioned without one: they are known
/// to chat but hold no login credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identifier.
    pub id: i64,
    /// Unique, immutable username.
    pub username: String,
    /// PHC-format password hash. `None` for chat-only identities.
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this identity can authenticate through the login path.
    pub fn can_login(&self) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| !hash.is_empty())
    }
}

// =============================================================================
// Dialogue
// =============================================================================

/// One immutable utterance in a user's conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub id: i64,
    pub user_id: i64,
    /// The username for user turns, or the bot tag for generated turns.
    pub sender: String,
    pub message: String,
    /// Assigned by the store at write time; strictly increasing per user.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Items
// =============================================================================

/// A record in the protected item catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

/// Fields accepted when creating or replacing an item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub price: f64,
}
