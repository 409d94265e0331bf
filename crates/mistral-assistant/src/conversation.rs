//! Conversation history and its text rendering.
//!
//! A [`Conversation`] is an immutable snapshot. Extending it produces a new
//! snapshot; nothing mutates a conversation held by someone else.

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Message {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Ordered turn history for one session, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A conversation made of a single turn.
    pub fn single(turn: Turn) -> Self {
        Self { turns: vec![turn] }
    }

    /// Returns a new snapshot with `turn` appended.
    #[must_use]
    pub fn with_turn(&self, turn: Turn) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.extend_from_slice(&self.turns);
        turns.push(turn);
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Wire messages for every turn, in order.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Message::from).collect()
    }
}

impl FromIterator<Turn> for Conversation {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

/// Render a conversation as `"<Role>: <content>"` lines joined by `\n`.
pub fn render(conversation: &Conversation) -> String {
    conversation
        .turns()
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}
