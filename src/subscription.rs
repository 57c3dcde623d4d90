//! Lifecycle of the observation subscription for the active thread.
//!
//! Each subscribe call gets a [`SubscriptionTicket`]. Only the current
//! ticket's handle and events are ever accepted; anything arriving for an
//! older ticket is dropped or released on the spot. Events for the current
//! ticket that beat its handle to the UI thread are held until it arrives.

use crate::art::{RawObservation, Unsubscribe};
use crate::client::AgentBackend;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTicket {
    pub id: u64,
    pub conversation_id: String,
    pub thread_id: String,
}

#[derive(Debug, Default)]
pub enum SubscriptionState {
    #[default]
    Idle,
    Subscribing {
        ticket: SubscriptionTicket,
        backlog: Vec<RawObservation>,
    },
    Active {
        ticket: SubscriptionTicket,
        handle: Unsubscribe,
    },
    Released,
}

impl SubscriptionState {
    pub fn ticket(&self) -> Option<&SubscriptionTicket> {
        match self {
            Self::Subscribing { ticket, .. } | Self::Active { ticket, .. } => Some(ticket),
            Self::Idle | Self::Released => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Subscribing { .. } => "subscribing",
            Self::Active { .. } => "active",
            Self::Released => "released",
        }
    }
}

/// What to do with an incoming observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Append to this conversation now.
    Deliver(String),
    /// Held until the subscription handle arrives.
    Buffered,
    Dropped,
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    state: SubscriptionState,
    next_ticket: u64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Tears down whatever is live, then asks the backend to subscribe to
    /// `thread_id` on behalf of `conversation_id`.
    pub fn activate(
        &mut self,
        conversation_id: &str,
        thread_id: &str,
        backend: &dyn AgentBackend,
    ) -> SubscriptionTicket {
        self.release();

        self.next_ticket += 1;
        let ticket = SubscriptionTicket {
            id: self.next_ticket,
            conversation_id: conversation_id.to_string(),
            thread_id: thread_id.to_string(),
        };
        info!(ticket = ticket.id, thread_id, "subscribing to observations");
        backend.open_subscription(&ticket);
        self.state = SubscriptionState::Subscribing {
            ticket: ticket.clone(),
            backlog: Vec::new(),
        };
        ticket
    }

    /// For the current ticket, activates and hands back the buffered
    /// backlog. A stale `handle` is released and `None` returned.
    pub fn on_established(
        &mut self,
        ticket_id: u64,
        handle: Unsubscribe,
    ) -> Option<Vec<RawObservation>> {
        match std::mem::take(&mut self.state) {
            SubscriptionState::Subscribing { ticket, backlog } if ticket.id == ticket_id => {
                debug!(ticket = ticket_id, buffered = backlog.len(), "observation subscription active");
                self.state = SubscriptionState::Active { ticket, handle };
                Some(backlog)
            }
            other => {
                self.state = other;
                debug!(ticket = ticket_id, "releasing late subscription handle");
                handle.unsubscribe();
                None
            }
        }
    }

    /// Returns `true` when the failure belongs to the current ticket.
    pub fn on_failed(&mut self, ticket_id: u64, error: &str) -> bool {
        let current = matches!(
            &self.state,
            SubscriptionState::Subscribing { ticket, .. } if ticket.id == ticket_id
        );
        if current {
            warn!(ticket = ticket_id, error, "observation subscription failed");
            self.state = SubscriptionState::Released;
        }
        current
    }

    pub fn accept(&mut self, ticket_id: u64, observation: &RawObservation) -> Delivery {
        let (ticket, backlog) = match &mut self.state {
            SubscriptionState::Active { ticket, .. } => (ticket, None),
            SubscriptionState::Subscribing { ticket, backlog } => (ticket, Some(backlog)),
            SubscriptionState::Idle | SubscriptionState::Released => return Delivery::Dropped,
        };
        if ticket.id != ticket_id {
            return Delivery::Dropped;
        }
        if let Some(thread_id) = observation.thread_id.as_deref() {
            if thread_id != ticket.thread_id {
                return Delivery::Dropped;
            }
        }

        match backlog {
            Some(backlog) => {
                backlog.push(observation.clone());
                Delivery::Buffered
            }
            None => Delivery::Deliver(ticket.conversation_id.clone()),
        }
    }

    pub fn release(&mut self) {
        match std::mem::take(&mut self.state) {
            SubscriptionState::Active { ticket, handle } => {
                handle.unsubscribe();
                info!(ticket = ticket.id, thread_id = %ticket.thread_id, "observation subscription released");
                self.state = SubscriptionState::Released;
            }
            SubscriptionState::Subscribing { ticket, backlog } => {
                debug!(ticket = ticket.id, dropped = backlog.len(), "abandoning pending subscription");
                self.state = SubscriptionState::Released;
            }
            other => self.state = other,
        }
    }
}
