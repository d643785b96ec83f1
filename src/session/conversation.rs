//! Per-session conversation history.

use serde::{Deserialize, Serialize};

use crate::llm::{Turn, TurnRole};

/// Default persona instruction sent as the first (hidden) user turn.
pub const DEFAULT_INSTRUCTION: &str = "You are an earthquake analysis expert. Your task is to \
give accurate, scientific information about earthquakes: their signs, causes, impacts, and \
safety guidance. When asked about recent earthquake data, always direct the user to the \
official website of BMKG or another trusted geological agency. Politely decline questions \
that are not related to earthquakes or that are personal or emotional in nature.";

/// Default canned greeting paired with [`DEFAULT_INSTRUCTION`].
pub const DEFAULT_GREETING: &str = "Hello! I am an earthquake analysis expert. I am ready to \
give you accurate information and guidance about earthquakes. What would you like to know \
today?";

/// Fixed instruction + greeting turns seeded before any user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimingPair {
    /// Hidden instruction establishing the persona.
    pub instruction: String,
    /// Visible greeting the model "answered" with.
    pub greeting: String,
}

impl Default for PrimingPair {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

/// Who authored a message as shown on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayRole {
    User,
    Assistant,
}

impl DisplayRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl From<TurnRole> for DisplayRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Self::User,
            TurnRole::Model => Self::Assistant,
        }
    }
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEntry {
    pub role: DisplayRole,
    pub text: String,
}

/// Ordered, append-only history for one session.
///
/// Holds two views kept in lockstep: the turns sent to the model and the
/// entries rendered for the user. The priming instruction only exists in the
/// first, so the display log is always exactly one entry shorter.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    turns: Vec<Turn>,
    display: Vec<DisplayEntry>,
}

impl ConversationStore {
    /// Create a store seeded with the priming pair.
    #[must_use]
    pub fn new(priming: &PrimingPair) -> Self {
        let greeting = Turn::model(priming.greeting.clone());
        Self {
            display: vec![DisplayEntry {
                role: DisplayRole::Assistant,
                text: priming.greeting.clone(),
            }],
            turns: vec![Turn::user(priming.instruction.clone()), greeting],
        }
    }

    /// Record a user message.
    pub fn append_user(&mut self, text: impl Into<String>) {
        self.push(Turn::user(text));
    }

    /// Record a model reply.
    pub fn append_model(&mut self, text: impl Into<String>) {
        self.push(Turn::model(text));
    }

    fn push(&mut self, turn: Turn) {
        self.display.push(DisplayEntry {
            role: turn.role().into(),
            text: turn.text().to_string(),
        });
        self.turns.push(turn);
    }

    /// Full history in order, priming pair included.
    #[must_use]
    pub fn snapshot_for_model(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Visible history in order.
    #[must_use]
    pub fn snapshot_for_display(&self) -> Vec<DisplayEntry> {
        self.display.clone()
    }

    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn display_count(&self) -> usize {
        self.display.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_store() {
        let store = ConversationStore::new(&PrimingPair::default());

        assert_eq!(store.turn_count(), 2);
        assert_eq!(store.display_count(), 1);

        let turns = store.snapshot_for_model();
        assert_eq!(turns[0].role(), TurnRole::User);
        assert_eq!(turns[0].text(), DEFAULT_INSTRUCTION);
        assert_eq!(turns[1].role(), TurnRole::Model);

        let display = store.snapshot_for_display();
        assert_eq!(display[0].role, DisplayRole::Assistant);
        assert_eq!(display[0].text, DEFAULT_GREETING);
    }

    #[test]
    fn test_appends_mirror_both_logs() {
        let mut store = ConversationStore::new(&PrimingPair::default());

        store.append_user("01/01");
        store.append_model("Fact A and Fact B");

        assert_eq!(store.turn_count(), 4);
        assert_eq!(store.display_count(), 3);

        let display = store.snapshot_for_display();
        assert_eq!(display[1].role, DisplayRole::User);
        assert_eq!(display[1].text, "01/01");
        assert_eq!(display[2].role, DisplayRole::Assistant);
        assert_eq!(display[2].text, "Fact A and Fact B");
    }

    #[test]
    fn test_custom_priming() {
        let priming = PrimingPair {
            instruction: "Be brief.".to_string(),
            greeting: "Hi.".to_string(),
        };
        let store = ConversationStore::new(&priming);

        assert_eq!(store.snapshot_for_model()[0].text(), "Be brief.");
        assert_eq!(store.snapshot_for_display()[0].text, "Hi.");
    }
}
