use super::{ArtError, RawObservation};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

const SOCKET_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub thread_id: Option<String>,
}

struct Filter {
    types: Option<Vec<String>>,
    thread_id: Option<String>,
}

impl Filter {
    fn wants(&self, observation: &RawObservation) -> bool {
        if let Some(types) = &self.types {
            if !types.iter().any(|kind| kind == &observation.kind) {
                return false;
            }
        }

        match &self.thread_id {
            Some(thread_id) => observation.thread_id.as_deref() == Some(thread_id.as_str()),
            None => true,
        }
    }
}

struct SocketInner {
    sender: Mutex<Option<broadcast::Sender<Arc<RawObservation>>>>,
    live: AtomicUsize,
}

/// Broadcast hub for observations. Each subscriber gets its own forwarding
/// task that applies the thread and type filters before invoking the callback.
#[derive(Clone)]
pub struct ObservationSocket {
    inner: Arc<SocketInner>,
}

impl Default for ObservationSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationSocket {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SOCKET_CAPACITY);
        Self {
            inner: Arc::new(SocketInner {
                sender: Mutex::new(Some(sender)),
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Must be called from within a tokio runtime. The receiver is attached
    /// before this returns, so nothing published afterwards is missed.
    pub fn subscribe<F>(
        &self,
        callback: F,
        types: Option<Vec<String>>,
        options: SubscribeOptions,
    ) -> Result<Unsubscribe, ArtError>
    where
        F: Fn(RawObservation) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ArtError::NoRuntime)?;
        let receiver = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(ArtError::SocketClosed)?;

        let released = Arc::new(AtomicBool::new(false));
        let filter = Filter {
            types,
            thread_id: options.thread_id,
        };
        let task = runtime.spawn(forward(receiver, filter, callback, Arc::clone(&released)));
        self.inner.live.fetch_add(1, Ordering::SeqCst);

        Ok(Unsubscribe {
            task: task.abort_handle(),
            released,
            socket: Arc::downgrade(&self.inner),
        })
    }

    pub fn notify(&self, observation: RawObservation) {
        let sender = self.inner.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = sender.as_ref() {
            // No receivers is fine.
            let _ = sender.send(Arc::new(observation));
        }
    }

    /// Ends every forwarding task and refuses new subscribers.
    pub fn close(&self) {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Subscriptions whose handle has not been released yet.
    pub fn subscriber_count(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }
}

async fn forward<F>(
    mut receiver: broadcast::Receiver<Arc<RawObservation>>,
    filter: Filter,
    callback: F,
    released: Arc<AtomicBool>,
) where
    F: Fn(RawObservation),
{
    loop {
        match receiver.recv().await {
            Ok(observation) => {
                if released.load(Ordering::SeqCst) {
                    break;
                }
                if filter.wants(&observation) {
                    callback(observation.as_ref().clone());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "observation subscriber lagged behind");
            }
            Err(RecvError::Closed) => {
                debug!("observation socket closed");
                break;
            }
        }
    }
}

/// Teardown handle returned by [`ObservationSocket::subscribe`]. Releasing
/// twice is a no-op; dropping the handle releases it.
pub struct Unsubscribe {
    task: AbortHandle,
    released: Arc<AtomicBool>,
    socket: Weak<SocketInner>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.task.abort();
        if let Some(socket) = self.socket.upgrade() {
            socket.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn collector() -> (
        mpsc::UnboundedReceiver<String>,
        impl Fn(RawObservation) + Send + 'static,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (rx, move |observation: RawObservation| {
            let _ = tx.send(observation.kind);
        })
    }

    fn scoped(thread_id: &str) -> SubscribeOptions {
        SubscribeOptions {
            thread_id: Some(thread_id.to_string()),
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn delivers_only_matching_thread_in_order() {
        let socket = ObservationSocket::new();
        let (mut seen, callback) = collector();
        let _handle = socket
            .subscribe(callback, None, scoped("web-a"))
            .expect("subscribe should succeed");

        socket.notify(RawObservation::new("INTENT", json!({})).for_thread("web-a"));
        socket.notify(RawObservation::new("PLAN", json!({})).for_thread("web-b"));
        socket.notify(RawObservation::new("SYNTHESIS", json!({})).for_thread("web-a"));

        assert_eq!(next(&mut seen).await.as_deref(), Some("INTENT"));
        assert_eq!(next(&mut seen).await.as_deref(), Some("SYNTHESIS"));
        assert_eq!(next(&mut seen).await, None);
    }

    #[tokio::test]
    async fn type_filter_restricts_delivery() {
        let socket = ObservationSocket::new();
        let (mut seen, callback) = collector();
        let _handle = socket
            .subscribe(
                callback,
                Some(vec!["TOOL_CALL".to_string()]),
                SubscribeOptions::default(),
            )
            .expect("subscribe should succeed");

        socket.notify(RawObservation::new("INTENT", json!({})));
        socket.notify(RawObservation::new("TOOL_CALL", json!({})));

        assert_eq!(next(&mut seen).await.as_deref(), Some("TOOL_CALL"));
        assert_eq!(next(&mut seen).await, None);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let socket = ObservationSocket::new();
        let (mut seen, callback) = collector();
        let handle = socket
            .subscribe(callback, None, scoped("web-a"))
            .expect("subscribe should succeed");
        assert_eq!(socket.subscriber_count(), 1);

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(handle.is_released());
        assert_eq!(socket.subscriber_count(), 0);

        socket.notify(RawObservation::new("INTENT", json!({})).for_thread("web-a"));
        assert_eq!(next(&mut seen).await, None);
    }

    #[tokio::test]
    async fn dropping_handle_releases_subscription() {
        let socket = ObservationSocket::new();
        let (_seen, callback) = collector();
        {
            let _handle = socket
                .subscribe(callback, None, SubscribeOptions::default())
                .expect("subscribe should succeed");
            assert_eq!(socket.subscriber_count(), 1);
        }
        assert_eq!(socket.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closed_socket_rejects_subscribers_and_ends_forwarding() {
        let socket = ObservationSocket::new();
        let (mut seen, callback) = collector();
        let _handle = socket
            .subscribe(callback, None, SubscribeOptions::default())
            .expect("subscribe should succeed");

        socket.close();
        assert_eq!(next(&mut seen).await, None);

        let (_other, callback) = collector();
        let result = socket.subscribe(callback, None, SubscribeOptions::default());
        assert!(matches!(result, Err(ArtError::SocketClosed)));
    }

    #[test]
    fn subscribing_outside_a_runtime_fails() {
        let socket = ObservationSocket::new();
        let (_seen, callback) = collector();
        let result = socket.subscribe(callback, None, SubscribeOptions::default());
        assert!(matches!(result, Err(ArtError::NoRuntime)));
    }
}
