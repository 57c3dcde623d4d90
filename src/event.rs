use crate::art::{AgentResponse, RawObservation, Unsubscribe};
use crate::client::ArtClient;
use eframe::egui;
use std::sync::{mpsc, Arc, OnceLock};

#[derive(Debug)]
pub enum AppEvent {
    Initialized(Result<ArtClient, String>),
    SubscriptionEstablished {
        ticket_id: u64,
        handle: Unsubscribe,
    },
    SubscriptionFailed {
        ticket_id: u64,
        error: String,
    },
    Observation {
        ticket_id: u64,
        observation: RawObservation,
    },
    QueryCompleted {
        request_id: u64,
        result: Result<AgentResponse, String>,
    },
}

/// Channel into the UI thread. Sending also wakes the egui loop once a
/// context has been attached.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<AppEvent>,
    repaint: Arc<OnceLock<egui::Context>>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            tx,
            repaint: Arc::new(OnceLock::new()),
        }
    }

    pub fn attach(&self, ctx: egui::Context) {
        let _ = self.repaint.set(ctx);
    }

    pub fn send(&self, event: AppEvent) -> bool {
        let delivered = self.tx.send(event).is_ok();
        if let Some(ctx) = self.repaint.get() {
            ctx.request_repaint();
        }
        delivered
    }
}
