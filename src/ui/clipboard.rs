use std::time::{Duration, Instant};

pub const COPY_ACK_DURATION: Duration = Duration::from_millis(1500);

/// Transient "Copied" acknowledgements. Messages are keyed by id and
/// observation cards by the exact text that went to the clipboard; the two
/// slots are independent.
#[derive(Debug, Default)]
pub struct CopyFeedback {
    message: Option<(u64, Instant)>,
    payload: Option<(String, Instant)>,
}

impl CopyFeedback {
    pub fn mark_message(&mut self, message_id: u64, now: Instant) {
        self.message = Some((message_id, now + COPY_ACK_DURATION));
    }

    pub fn mark_payload(&mut self, payload: impl Into<String>, now: Instant) {
        self.payload = Some((payload.into(), now + COPY_ACK_DURATION));
    }

    pub fn is_message_copied(&self, message_id: u64, now: Instant) -> bool {
        matches!(self.message, Some((id, until)) if id == message_id && now < until)
    }

    pub fn is_payload_copied(&self, payload: &str, now: Instant) -> bool {
        matches!(&self.payload, Some((copied, until)) if copied == payload && now < *until)
    }

    pub fn expire(&mut self, now: Instant) {
        if matches!(self.message, Some((_, until)) if now >= until) {
            self.message = None;
        }
        if matches!(&self.payload, Some((_, until)) if now >= *until) {
            self.payload = None;
        }
    }

    /// Earliest instant at which an acknowledgement disappears.
    pub fn next_deadline(&self) -> Option<Instant> {
        let message = self.message.map(|(_, until)| until);
        let payload = self.payload.as_ref().map(|(_, until)| *until);
        match (message, payload) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
