use crate::art::{self, ArtInstance, SubscribeOptions, ThreadConfig};
use crate::event::{AppEvent, EventSender};
use crate::subscription::SubscriptionTicket;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub request_id: u64,
    pub conversation_id: String,
    pub thread_id: String,
    pub text: String,
}

/// Work the chat state hands off to the framework. Results come back later
/// as [`AppEvent`]s.
pub trait AgentBackend {
    fn dispatch_query(&self, request: QueryRequest);

    fn cancel_query(&self, request_id: u64);

    fn open_subscription(&self, ticket: &SubscriptionTicket);
}

#[derive(Clone)]
pub struct ArtClient {
    art: Arc<dyn ArtInstance>,
    thread_config: ThreadConfig,
    events: EventSender,
    runtime_handle: Handle,
    in_flight: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl ArtClient {
    pub fn new(
        art: Arc<dyn ArtInstance>,
        thread_config: ThreadConfig,
        events: EventSender,
        runtime_handle: Handle,
    ) -> Self {
        Self {
            art,
            thread_config,
            events,
            runtime_handle,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn model(&self) -> &str {
        &self.thread_config.reasoning.model
    }
}

impl fmt::Debug for ArtClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtClient")
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

impl AgentBackend for ArtClient {
    fn dispatch_query(&self, request: QueryRequest) {
        let art = Arc::clone(&self.art);
        let config = self.thread_config.clone();
        let events = self.events.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let request_id = request.request_id;

        // Held across spawn so the task cannot deregister before it is registered.
        let mut registry = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let task = self.runtime_handle.spawn(async move {
            info!(request_id, thread_id = %request.thread_id, "processing query");
            let result =
                art::process_query(art.as_ref(), &config, &request.text, &request.thread_id)
                    .await
                    .map_err(|err| err.to_string());
            if let Err(err) = &result {
                warn!(request_id, error = %err, "query failed");
            }

            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&request_id);
            events.send(AppEvent::QueryCompleted { request_id, result });
        });
        registry.insert(request_id, task.abort_handle());
    }

    fn cancel_query(&self, request_id: u64) {
        let task = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request_id);
        if let Some(task) = task {
            task.abort();
            info!(request_id, "query cancelled");
        }
    }

    fn open_subscription(&self, ticket: &SubscriptionTicket) {
        let art = Arc::clone(&self.art);
        let events = self.events.clone();
        let ticket_id = ticket.id;
        let thread_id = ticket.thread_id.clone();

        self.runtime_handle.spawn(async move {
            let forward = events.clone();
            let subscribed = art.observation_socket().subscribe(
                move |observation| {
                    forward.send(AppEvent::Observation {
                        ticket_id,
                        observation,
                    });
                },
                None,
                SubscribeOptions {
                    thread_id: Some(thread_id.clone()),
                },
            );

            match subscribed {
                Ok(handle) => {
                    debug!(ticket = ticket_id, %thread_id, "observation socket subscribed");
                    events.send(AppEvent::SubscriptionEstablished { ticket_id, handle });
                }
                Err(err) => {
                    events.send(AppEvent::SubscriptionFailed {
                        ticket_id,
                        error: err.to_string(),
                    });
                }
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::{
        AgentProps, AgentResponse, ArtError, ObservationSocket, RawObservation,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ScriptedArt {
        socket: ObservationSocket,
        configured: Mutex<Vec<String>>,
        reply: Option<String>,
        delay: Duration,
    }

    impl ScriptedArt {
        fn new(reply: Option<&str>) -> Self {
            Self {
                socket: ObservationSocket::new(),
                configured: Mutex::new(Vec::new()),
                reply: reply.map(str::to_string),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ArtInstance for ScriptedArt {
        async fn set_thread_config(
            &self,
            thread_id: &str,
            _config: ThreadConfig,
        ) -> Result<(), ArtError> {
            self.configured
                .lock()
                .expect("configured lock")
                .push(thread_id.to_string());
            Ok(())
        }

        async fn process(&self, props: AgentProps) -> Result<AgentResponse, ArtError> {
            tokio::time::sleep(self.delay).await;
            self.socket.notify(
                RawObservation::new("INTENT", json!({ "intent": props.query }))
                    .for_thread(props.thread_id.clone()),
            );
            match &self.reply {
                Some(reply) => Ok(AgentResponse::success(reply.clone())),
                None => Err(ArtError::Provider("network down".to_string())),
            }
        }

        fn observation_socket(&self) -> &ObservationSocket {
            &self.socket
        }
    }

    fn client(
        art: Arc<ScriptedArt>,
        runtime: &tokio::runtime::Runtime,
    ) -> (ArtClient, mpsc::Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel();
        let client = ArtClient::new(
            art,
            ThreadConfig::gemini("test-model", 20),
            EventSender::new(tx),
            runtime.handle().clone(),
        );
        (client, rx)
    }

    fn request(id: u64, text: &str) -> QueryRequest {
        QueryRequest {
            request_id: id,
            conversation_id: "conv-1".to_string(),
            thread_id: "web-1".to_string(),
            text: text.to_string(),
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime should build")
    }

    #[test]
    fn dispatch_configures_thread_and_reports_result() {
        let runtime = runtime();
        let art = Arc::new(ScriptedArt::new(Some("4")));
        let (client, rx) = client(Arc::clone(&art), &runtime);
        assert_eq!(client.model(), "test-model");

        client.dispatch_query(request(7, "2+2"));
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("completion should arrive");

        match event {
            AppEvent::QueryCompleted { request_id, result } => {
                assert_eq!(request_id, 7);
                assert_eq!(result.expect("success").response.content, "4");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(*art.configured.lock().expect("configured lock"), vec!["web-1"]);
    }

    #[test]
    fn dispatch_reports_failure_as_text() {
        let runtime = runtime();
        let (client, rx) = client(Arc::new(ScriptedArt::new(None)), &runtime);

        client.dispatch_query(request(1, "2+2"));
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(AppEvent::QueryCompleted { result, .. }) => {
                assert!(result.expect_err("failure").contains("network down"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn cancelled_query_never_completes() {
        let runtime = runtime();
        let mut art = ScriptedArt::new(Some("late"));
        art.delay = Duration::from_secs(30);
        let (client, rx) = client(Arc::new(art), &runtime);

        client.dispatch_query(request(3, "slow"));
        client.cancel_query(3);
        client.cancel_query(3);

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn subscription_forwards_thread_events_with_ticket() {
        let runtime = runtime();
        let art = Arc::new(ScriptedArt::new(Some("4")));
        let (client, rx) = client(Arc::clone(&art), &runtime);

        client.open_subscription(&SubscriptionTicket {
            id: 11,
            conversation_id: "conv-1".to_string(),
            thread_id: "web-1".to_string(),
        });
        let handle = match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(AppEvent::SubscriptionEstablished { ticket_id, handle }) => {
                assert_eq!(ticket_id, 11);
                handle
            }
            other => panic!("unexpected event {other:?}"),
        };

        art.socket
            .notify(RawObservation::new("PLAN", json!({})).for_thread("web-2"));
        art.socket
            .notify(RawObservation::new("INTENT", json!({})).for_thread("web-1"));

        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(AppEvent::Observation {
                ticket_id,
                observation,
            }) => {
                assert_eq!(ticket_id, 11);
                assert_eq!(observation.kind, "INTENT");
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.unsubscribe();
        assert_eq!(art.socket.subscriber_count(), 0);
    }

    #[test]
    fn subscription_failure_is_reported() {
        let runtime = runtime();
        let art = Arc::new(ScriptedArt::new(Some("4")));
        art.socket.close();
        let (client, rx) = client(art, &runtime);

        client.open_subscription(&SubscriptionTicket {
            id: 2,
            conversation_id: "conv-1".to_string(),
            thread_id: "web-1".to_string(),
        });
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(AppEvent::SubscriptionFailed { ticket_id, error }) => {
                assert_eq!(ticket_id, 2);
                assert!(error.contains("closed"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
