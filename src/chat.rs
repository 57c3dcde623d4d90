//! Chat orchestration: everything between a button press and the store.
//!
//! `ChatState` owns the conversation store, the subscription manager and the
//! single in-flight query. It never blocks; work goes out through an
//! [`AgentBackend`] and comes back as [`AppEvent`]s via [`ChatState::apply_event`].

use crate::art::AgentResponse;
use crate::client::{AgentBackend, QueryRequest};
use crate::conversation::{ConversationStore, NewMessage, SelectError};
use crate::event::AppEvent;
use crate::observation::normalize;
use crate::subscription::{Delivery, SubscriptionManager};
use chrono::Local;
use tracing::{debug, error, info, warn};

pub const SUBSCRIPTION_FAILURE_MESSAGE: &str = "Failed to connect to observation service.";

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingQuery {
    request_id: u64,
    conversation_id: String,
}

#[derive(Debug, Default)]
pub struct ChatState {
    store: ConversationStore,
    subscriptions: SubscriptionManager,
    pending: Option<PendingQuery>,
    next_request_id: u64,
    global_error: Option<String>,
    focus_input: bool,
    diagnostics: Vec<String>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn is_responding(&self) -> bool {
        self.pending.is_some()
    }

    pub fn global_error(&self) -> Option<&str> {
        self.global_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.global_error = None;
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn log_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(format!(
            "[{}] {}",
            Local::now().format("%H:%M:%S"),
            message.into()
        ));
    }

    /// One-shot request for the composer to grab keyboard focus.
    pub fn take_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.focus_input)
    }

    /// Creates the first conversation on launch and subscribes to it.
    pub fn start(&mut self, backend: &dyn AgentBackend) {
        if self.store.active_id().is_some() {
            return;
        }
        self.new_chat(backend);
    }

    pub fn new_chat(&mut self, backend: &dyn AgentBackend) -> Option<String> {
        if self.is_responding() {
            self.log_diagnostic("new chat ignored while a response is in flight");
            return None;
        }

        let conversation_id = self.store.create(true);
        self.global_error = None;
        self.focus_input = true;
        self.activate_subscription(backend);
        self.log_diagnostic(format!("conversation created: {conversation_id}"));
        Some(conversation_id)
    }

    pub fn select(
        &mut self,
        conversation_id: &str,
        backend: &dyn AgentBackend,
    ) -> Result<bool, SelectError> {
        let changed = self.store.select(conversation_id, self.is_responding())?;
        if changed {
            info!(conversation_id, "switched conversation");
            self.global_error = None;
            self.focus_input = true;
            self.activate_subscription(backend);
        }
        Ok(changed)
    }

    fn activate_subscription(&mut self, backend: &dyn AgentBackend) {
        let Some(conversation) = self.store.active() else {
            return;
        };
        let conversation_id = conversation.id.clone();
        let thread_id = conversation.thread_id.clone();
        self.subscriptions
            .activate(&conversation_id, &thread_id, backend);
    }

    /// Returns `false` when the submission was a no-op.
    pub fn submit_query(&mut self, text: &str, backend: &dyn AgentBackend) -> bool {
        if text.trim().is_empty() || self.is_responding() {
            return false;
        }
        let Some(conversation) = self.store.active() else {
            return false;
        };
        let conversation_id = conversation.id.clone();
        let thread_id = conversation.thread_id.clone();

        self.global_error = None;
        self.store
            .append_message(&conversation_id, NewMessage::user(text));
        self.store.clear_observations(&conversation_id);

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.pending = Some(PendingQuery {
            request_id,
            conversation_id: conversation_id.clone(),
        });

        info!(request_id, %thread_id, "submitting query");
        backend.dispatch_query(QueryRequest {
            request_id,
            conversation_id,
            thread_id,
            text: text.to_string(),
        });
        true
    }

    /// Aborts the in-flight query. Its result, should it still arrive, is
    /// ignored.
    pub fn stop_generating(&mut self, backend: &dyn AgentBackend) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        backend.cancel_query(pending.request_id);
        self.focus_input = true;
        self.log_diagnostic(format!("generation stopped (request {})", pending.request_id));
        true
    }

    pub fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Initialized(_) => {
                debug!("initialization result is handled by the app shell");
            }
            AppEvent::SubscriptionEstablished { ticket_id, handle } => {
                let Some(backlog) = self.subscriptions.on_established(ticket_id, handle) else {
                    return;
                };
                self.log_diagnostic(format!("observation subscription {ticket_id} active"));
                let conversation_id = self
                    .subscriptions
                    .state()
                    .ticket()
                    .map(|ticket| ticket.conversation_id.clone());
                if let Some(conversation_id) = conversation_id {
                    for observation in backlog {
                        self.store
                            .append_observation(&conversation_id, normalize(&observation));
                    }
                }
            }
            AppEvent::SubscriptionFailed { ticket_id, error } => {
                if self.subscriptions.on_failed(ticket_id, &error) {
                    error!(ticket_id, %error, "failed to set up observation socket");
                    self.log_diagnostic(format!("subscription failed: {error}"));
                    self.global_error = Some(SUBSCRIPTION_FAILURE_MESSAGE.to_string());
                }
            }
            AppEvent::Observation {
                ticket_id,
                observation,
            } => {
                match self.subscriptions.accept(ticket_id, &observation) {
                    Delivery::Deliver(conversation_id) => {
                        self.store
                            .append_observation(&conversation_id, normalize(&observation));
                    }
                    Delivery::Buffered => {
                        debug!(ticket_id, kind = %observation.kind, "holding observation until subscribed");
                    }
                    Delivery::Dropped => {
                        debug!(ticket_id, kind = %observation.kind, "dropping stale observation");
                    }
                }
            }
            AppEvent::QueryCompleted { request_id, result } => {
                self.complete_query(request_id, result);
            }
        }
    }

    fn complete_query(&mut self, request_id: u64, result: Result<AgentResponse, String>) {
        if self.pending.as_ref().map(|pending| pending.request_id) != Some(request_id) {
            debug!(request_id, "ignoring completion for abandoned request");
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        let conversation_id = pending.conversation_id;

        match result {
            Ok(response) => {
                self.store.append_message(
                    &conversation_id,
                    NewMessage::assistant(response.response.content),
                );
                if let Some(embedded) = response.metadata.error {
                    warn!(request_id, error = %embedded, "agent response carried an error");
                    self.log_diagnostic(format!("agent response error: {embedded}"));
                    self.store.append_message(
                        &conversation_id,
                        NewMessage::error(format!("An error occurred: {embedded}")),
                    );
                }
            }
            Err(reason) => {
                error!(request_id, error = %reason, "error processing query");
                self.log_diagnostic(format!("query failed: {reason}"));
                self.store
                    .append_message(&conversation_id, NewMessage::error(format!("Error: {reason}")));
                self.global_error = Some(reason);
            }
        }

        self.focus_input = true;
    }

    pub fn shutdown(&mut self) {
        self.subscriptions.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::{
        ObservationSocket, RawObservation, ResponseBody, ResponseMetadata, SubscribeOptions,
    };
    use crate::client::testing::{runtime, RecordingBackend};
    use crate::conversation::Sender;
    use serde_json::json;

    fn started() -> (ChatState, RecordingBackend) {
        let backend = RecordingBackend::default();
        let mut chat = ChatState::new();
        chat.start(&backend);
        (chat, backend)
    }

    fn establish(chat: &mut ChatState, socket: &ObservationSocket) {
        let ticket = chat
            .subscriptions()
            .state()
            .ticket()
            .cloned()
            .expect("subscription requested");
        let handle = socket
            .subscribe(
                |_| {},
                None,
                SubscribeOptions {
                    thread_id: Some(ticket.thread_id.clone()),
                },
            )
            .expect("subscribe should succeed");
        chat.apply_event(AppEvent::SubscriptionEstablished {
            ticket_id: ticket.id,
            handle,
        });
    }

    fn deliver(chat: &mut ChatState, kind: &str, thread_id: &str) {
        let ticket_id = chat
            .subscriptions()
            .state()
            .ticket()
            .map(|ticket| ticket.id)
            .expect("subscription ticket");
        chat.apply_event(AppEvent::Observation {
            ticket_id,
            observation: RawObservation::new(kind, json!({ "intent": "x" })).for_thread(thread_id),
        });
    }

    fn active_thread(chat: &ChatState) -> String {
        chat.store().active().expect("active conversation").thread_id.clone()
    }

    fn texts(chat: &ChatState) -> Vec<(Sender, String)> {
        chat.store()
            .active_messages()
            .iter()
            .map(|message| (message.sender, message.text.clone()))
            .collect()
    }

    fn response(content: &str, status: &str, error: Option<&str>) -> AgentResponse {
        AgentResponse {
            response: ResponseBody {
                content: content.to_string(),
            },
            metadata: ResponseMetadata {
                status: status.to_string(),
                error: error.map(str::to_string),
            },
        }
    }

    #[test]
    fn start_creates_and_subscribes_first_conversation() {
        let (chat, backend) = started();
        assert_eq!(chat.store().conversations().len(), 1);
        let subscriptions = backend.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].thread_id, active_thread(&chat));
    }

    #[test]
    fn successful_query_appends_user_then_assistant() {
        let (mut chat, backend) = started();
        let thread_id = active_thread(&chat);

        assert!(chat.submit_query("2+2", &backend));
        assert!(chat.is_responding());
        let queries = backend.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].text, "2+2");
        assert_eq!(queries[0].thread_id, thread_id);

        chat.apply_event(AppEvent::QueryCompleted {
            request_id: queries[0].request_id,
            result: Ok(response("4", "ok", None)),
        });

        let messages = texts(&chat);
        assert_eq!(
            messages[1..].to_vec(),
            vec![
                (Sender::User, "2+2".to_string()),
                (Sender::Assistant, "4".to_string())
            ]
        );
        assert!(!chat.is_responding());
        assert!(chat.global_error().is_none());
        assert!(chat.take_focus_request());
    }

    #[test]
    fn embedded_error_adds_error_message_after_answer() {
        let (mut chat, backend) = started();
        chat.submit_query("divide", &backend);
        let request_id = backend.queries()[0].request_id;

        chat.apply_event(AppEvent::QueryCompleted {
            request_id,
            result: Ok(response("partial", "error", Some("tool crashed"))),
        });

        let messages = texts(&chat);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], (Sender::Assistant, "partial".to_string()));
        assert_eq!(
            messages[3],
            (Sender::Error, "An error occurred: tool crashed".to_string())
        );
        assert!(!chat.is_responding());
    }

    #[test]
    fn failed_query_appends_single_error_and_sets_flag() {
        let (mut chat, backend) = started();
        chat.submit_query("2+2", &backend);
        let request_id = backend.queries()[0].request_id;

        chat.apply_event(AppEvent::QueryCompleted {
            request_id,
            result: Err("network down".to_string()),
        });

        let messages = texts(&chat);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], (Sender::User, "2+2".to_string()));
        assert_eq!(messages[2], (Sender::Error, "Error: network down".to_string()));
        assert_eq!(chat.global_error(), Some("network down"));
        assert!(!chat.is_responding());
        assert!(chat.take_focus_request());
    }

    #[test]
    fn submissions_while_pending_are_no_ops() {
        let (mut chat, backend) = started();
        assert!(chat.submit_query("first", &backend));
        assert!(!chat.submit_query("second", &backend));
        assert!(!chat.submit_query("third", &backend));
        assert_eq!(backend.queries().len(), 1);
        assert_eq!(chat.store().active_messages().len(), 2);
    }

    #[test]
    fn blank_or_inactive_submissions_are_rejected() {
        let backend = RecordingBackend::default();
        let mut idle = ChatState::new();
        assert!(!idle.submit_query("hello", &backend));

        let (mut chat, backend) = started();
        assert!(!chat.submit_query("   \n\t", &backend));
        assert!(backend.queries().is_empty());
    }

    #[test]
    fn switching_rejected_while_pending_and_resubscribes_when_idle() {
        let (mut chat, backend) = started();
        let runtime = runtime();
        let _guard = runtime.enter();
        let socket = ObservationSocket::new();
        establish(&mut chat, &socket);
        let first = chat.store().active_id().expect("active").to_string();

        let second = chat.new_chat(&backend).expect("new chat while idle");
        establish(&mut chat, &socket);
        assert_eq!(socket.subscriber_count(), 1);

        chat.submit_query("hold", &backend);
        assert_eq!(chat.select(&first, &backend), Err(SelectError::Responding));
        assert!(chat.new_chat(&backend).is_none());
        assert_eq!(chat.store().active_id(), Some(second.as_str()));

        let request_id = backend.queries()[0].request_id;
        chat.apply_event(AppEvent::QueryCompleted {
            request_id,
            result: Ok(response("done", "ok", None)),
        });

        let before = backend.subscriptions().len();
        assert_eq!(chat.select(&first, &backend), Ok(true));
        assert_eq!(socket.subscriber_count(), 0);
        assert_eq!(backend.subscriptions().len(), before + 1);
        assert_eq!(
            backend.subscriptions().last().map(|t| t.conversation_id.clone()),
            Some(first)
        );
    }

    #[test]
    fn observations_reset_on_submit_and_only_match_thread() {
        let (mut chat, backend) = started();
        let runtime = runtime();
        let _guard = runtime.enter();
        let socket = ObservationSocket::new();
        establish(&mut chat, &socket);
        let thread_id = active_thread(&chat);

        deliver(&mut chat, "INTENT", &thread_id);
        assert_eq!(chat.store().active_observations().len(), 1);

        chat.submit_query("again", &backend);
        assert!(chat.store().active_observations().is_empty());

        deliver(&mut chat, "PLAN", "web-someone-else");
        assert!(chat.store().active_observations().is_empty());

        deliver(&mut chat, "PLAN", &thread_id);
        deliver(&mut chat, "SYNTHESIS", &thread_id);
        let kinds: Vec<&str> = chat
            .store()
            .active_observations()
            .iter()
            .map(|observation| observation.kind().as_str())
            .collect();
        assert_eq!(kinds, vec!["PLAN", "SYNTHESIS"]);
    }

    #[test]
    fn observation_arriving_before_handle_is_kept() {
        let (mut chat, backend) = started();
        let runtime = runtime();
        let _guard = runtime.enter();
        let socket = ObservationSocket::new();
        let thread_id = active_thread(&chat);

        chat.submit_query("2+2", &backend);
        deliver(&mut chat, "INTENT", &thread_id);
        assert!(chat.store().active_observations().is_empty());

        establish(&mut chat, &socket);
        deliver(&mut chat, "SYNTHESIS", &thread_id);
        let kinds: Vec<&str> = chat
            .store()
            .active_observations()
            .iter()
            .map(|observation| observation.kind().as_str())
            .collect();
        assert_eq!(kinds, vec!["INTENT", "SYNTHESIS"]);
    }

    #[test]
    fn events_for_previous_thread_are_dropped_after_switch() {
        let (mut chat, backend) = started();
        let runtime = runtime();
        let _guard = runtime.enter();
        let socket = ObservationSocket::new();
        establish(&mut chat, &socket);
        let old_ticket = chat
            .subscriptions()
            .state()
            .ticket()
            .map(|ticket| ticket.id)
            .expect("ticket");
        let old_thread = active_thread(&chat);
        let old_conversation = chat.store().active_id().expect("active").to_string();

        chat.new_chat(&backend);
        chat.apply_event(AppEvent::Observation {
            ticket_id: old_ticket,
            observation: RawObservation::new("INTENT", json!({})).for_thread(old_thread),
        });

        assert!(chat
            .store()
            .get(&old_conversation)
            .expect("old conversation")
            .observations
            .is_empty());
        assert!(chat.store().active_observations().is_empty());
    }

    #[test]
    fn subscription_failure_sets_banner_without_blocking_chat() {
        let (mut chat, backend) = started();
        let ticket_id = backend.subscriptions()[0].id;

        chat.apply_event(AppEvent::SubscriptionFailed {
            ticket_id,
            error: "observation socket is closed".to_string(),
        });
        assert_eq!(chat.global_error(), Some(SUBSCRIPTION_FAILURE_MESSAGE));
        assert!(chat.submit_query("still works", &backend));
    }

    #[test]
    fn stop_generating_cancels_and_ignores_late_result() {
        let (mut chat, backend) = started();
        chat.submit_query("slow", &backend);
        let request_id = backend.queries()[0].request_id;

        assert!(chat.stop_generating(&backend));
        assert!(!chat.is_responding());
        assert_eq!(backend.cancelled(), vec![request_id]);
        assert!(!chat.stop_generating(&backend));

        chat.apply_event(AppEvent::QueryCompleted {
            request_id,
            result: Ok(response("late", "ok", None)),
        });
        assert_eq!(chat.store().active_messages().len(), 2);
    }
}
