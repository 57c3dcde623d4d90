use crate::observation::Observation;

pub mod store;

pub use store::{ConversationStore, SelectError};

pub const DEFAULT_TITLE: &str = "New Chat";
pub const WELCOME_TEXT: &str = "How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Copy,
    Like,
    Dislike,
}

impl MessageAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: Option<String>,
    pub actions: Vec<MessageAction>,
}

impl Message {
    pub fn allows(&self, action: MessageAction) -> bool {
        self.actions.contains(&action)
    }
}

/// A message before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub text: String,
    pub sender: Sender,
    pub actions: Vec<MessageAction>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            actions: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Assistant,
            actions: vec![MessageAction::Copy, MessageAction::Like, MessageAction::Dislike],
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Error,
            actions: Vec::new(),
        }
    }

    pub fn welcome() -> Self {
        Self {
            text: WELCOME_TEXT.to_string(),
            sender: Sender::Assistant,
            actions: vec![MessageAction::Copy],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub thread_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub observations: Vec<Observation>,
}
