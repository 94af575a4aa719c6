//! Stateless keyword-matching replies for `/chat`.

/// Matches a lower-cased message against a fixed, ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct KeywordResponder;

impl KeywordResponder {
    pub fn new() -> Self {
        Self
    }

    /// First matching rule wins; no external calls, nothing persisted.
    pub fn reply(&self, user: &str, text: &str) -> String {
        let text = text.to_lowercase();
        if text.contains("bonjour") {
            format!("Bonjour {user} 👋")
        } else if text.contains("ça va") {
            "Oui merci, et toi ?".to_string()
        } else if text.contains("bye") {
            "Au revoir 👋".to_string()
        } else {
            "Je n'ai pas compris 🤔".to_string()
        }
    }
}
