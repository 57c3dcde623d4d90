use crate::art::generate_thread_id;
use crate::conversation::{Conversation, Message, NewMessage, DEFAULT_TITLE};
use crate::observation::Observation;
use chrono::Local;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("cannot switch conversations while a response is in flight")]
    Responding,

    #[error("unknown conversation {0}")]
    UnknownConversation(String),
}

/// In-memory conversation list, newest first. Conversations are never
/// removed, so the active id can only ever point at a live entry.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    next_message_id: u64,
}

fn message_time() -> String {
    Local::now().format("%H:%M").to_string()
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    fn get_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation.id == conversation_id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_messages(&self) -> &[Message] {
        self.active()
            .map(|conversation| conversation.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn active_observations(&self) -> &[Observation] {
        self.active()
            .map(|conversation| conversation.observations.as_slice())
            .unwrap_or(&[])
    }

    /// Adds a fresh conversation with its welcome message at the top of the
    /// list and returns its id.
    pub fn create(&mut self, activate: bool) -> String {
        let mut thread_id = generate_thread_id();
        while self
            .conversations
            .iter()
            .any(|conversation| conversation.thread_id == thread_id)
        {
            thread_id = generate_thread_id();
        }

        let mut id = format!("conv-{}", uuid::Uuid::new_v4());
        while self.get(&id).is_some() {
            id = format!("conv-{}", uuid::Uuid::new_v4());
        }

        let welcome = self.build_message(NewMessage::welcome());
        debug!(conversation_id = %id, %thread_id, "conversation created");
        self.conversations.insert(
            0,
            Conversation {
                id: id.clone(),
                thread_id,
                title: DEFAULT_TITLE.to_string(),
                messages: vec![welcome],
                observations: Vec::new(),
            },
        );

        if activate {
            self.active_id = Some(id.clone());
        }
        id
    }

    /// Returns `Ok(true)` when the active conversation changed.
    pub fn select(&mut self, conversation_id: &str, responding: bool) -> Result<bool, SelectError> {
        if self.active_id.as_deref() == Some(conversation_id) {
            return Ok(false);
        }
        if responding {
            return Err(SelectError::Responding);
        }
        if self.get(conversation_id).is_none() {
            return Err(SelectError::UnknownConversation(conversation_id.to_string()));
        }

        self.active_id = Some(conversation_id.to_string());
        Ok(true)
    }

    fn build_message(&mut self, draft: NewMessage) -> Message {
        self.next_message_id += 1;
        Message {
            id: self.next_message_id,
            text: draft.text,
            sender: draft.sender,
            timestamp: Some(message_time()),
            actions: draft.actions,
        }
    }

    pub fn append_message(&mut self, conversation_id: &str, draft: NewMessage) -> Option<u64> {
        self.get(conversation_id)?;
        let message = self.build_message(draft);
        let id = message.id;
        self.get_mut(conversation_id)?.messages.push(message);
        Some(id)
    }

    pub fn append_observation(&mut self, conversation_id: &str, observation: Observation) -> bool {
        match self.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.observations.push(observation);
                true
            }
            None => false,
        }
    }

    pub fn clear_observations(&mut self, conversation_id: &str) -> bool {
        match self.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.observations.clear();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::RawObservation;
    use crate::conversation::{MessageAction, Sender, WELCOME_TEXT};
    use crate::observation::normalize;
    use serde_json::json;
    use std::collections::HashSet;

    fn observation() -> Observation {
        normalize(&RawObservation::new("INTENT", json!({ "intent": "x" })))
    }

    #[test]
    fn create_prepends_with_welcome_message() {
        let mut store = ConversationStore::new();
        let first = store.create(true);
        let second = store.create(false);

        let ids: Vec<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(store.active_id(), Some(first.as_str()));

        let conversation = store.get(&second).expect("conversation exists");
        assert_eq!(conversation.title, DEFAULT_TITLE);
        assert!(conversation.thread_id.starts_with("web-"));
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].text, WELCOME_TEXT);
        assert_eq!(conversation.messages[0].sender, Sender::Assistant);
        assert_eq!(conversation.messages[0].actions, vec![MessageAction::Copy]);
    }

    #[test]
    fn ids_are_unique_across_many_conversations() {
        let mut store = ConversationStore::new();
        for _ in 0..50 {
            store.create(false);
        }
        let ids: HashSet<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
        let threads: HashSet<&str> = store
            .conversations()
            .iter()
            .map(|c| c.thread_id.as_str())
            .collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(threads.len(), 50);
    }

    #[test]
    fn select_rules() {
        let mut store = ConversationStore::new();
        let first = store.create(true);
        let second = store.create(false);

        assert_eq!(store.select(&first, false), Ok(false));
        assert_eq!(store.select(&second, true), Err(SelectError::Responding));
        assert_eq!(store.active_id(), Some(first.as_str()));
        assert_eq!(
            store.select("conv-missing", false),
            Err(SelectError::UnknownConversation("conv-missing".to_string()))
        );
        assert_eq!(store.select(&second, false), Ok(true));
        assert_eq!(store.active_id(), Some(second.as_str()));
    }

    #[test]
    fn projections_follow_active_conversation() {
        let mut store = ConversationStore::new();
        assert!(store.active_messages().is_empty());
        assert!(store.active_observations().is_empty());

        let first = store.create(true);
        let second = store.create(false);
        store.append_message(&first, NewMessage::user("hello"));
        store.append_observation(&first, observation());

        assert_eq!(store.active_messages().len(), 2);
        assert_eq!(store.active_observations().len(), 1);

        store.select(&second, false).expect("select succeeds");
        assert_eq!(store.active_messages().len(), 1);
        assert!(store.active_observations().is_empty());
    }

    #[test]
    fn message_ids_increase_and_unknown_targets_are_ignored() {
        let mut store = ConversationStore::new();
        let id = store.create(true);
        let a = store.append_message(&id, NewMessage::user("a")).expect("appended");
        let b = store
            .append_message(&id, NewMessage::assistant("b"))
            .expect("appended");
        assert!(b > a);
        assert_eq!(store.append_message("nope", NewMessage::user("c")), None);
        assert!(!store.append_observation("nope", observation()));
        assert!(!store.clear_observations("nope"));
    }

    #[test]
    fn clear_observations_empties_only_target() {
        let mut store = ConversationStore::new();
        let first = store.create(true);
        let second = store.create(false);
        store.append_observation(&first, observation());
        store.append_observation(&second, observation());

        assert!(store.clear_observations(&first));
        assert!(store.get(&first).expect("exists").observations.is_empty());
        assert_eq!(store.get(&second).expect("exists").observations.len(), 1);
    }
}
