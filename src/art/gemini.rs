//! Gemini-backed framework instance.
//!
//! A thin single-pass agent: it keeps per-thread configuration and history in
//! memory, reports the query as an `INTENT` observation, asks Gemini for a
//! reply and reports that reply as `SYNTHESIS`.

use super::{
    AgentProps, AgentResponse, ArtError, ArtInstance, ObservationSocket, RawObservation,
    ThreadConfig,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    role: &'static str,
    text: String,
}

#[derive(Debug)]
struct ThreadState {
    config: ThreadConfig,
    history: Vec<Turn>,
}

pub struct GeminiArt {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    socket: ObservationSocket,
    threads: RwLock<HashMap<String, ThreadState>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<RequestContent>,
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl GeminiArt {
    pub fn new(api_key: String, base_url: String) -> Result<Self, ArtError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ArtError::Client(err.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            socket: ObservationSocket::new(),
            threads: RwLock::new(HashMap::new()),
        })
    }

    fn publish(&self, thread_id: &str, kind: &str, content: Value) {
        let observation = RawObservation::new(kind, content)
            .for_thread(thread_id)
            .at(chrono::Utc::now().timestamp_millis());
        self.socket.notify(observation);
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    async fn generate(
        &self,
        config: &ThreadConfig,
        history: &[Turn],
        query: &str,
    ) -> Result<String, ArtError> {
        let request = build_request(config, history, query);
        let response = self
            .client
            .post(self.endpoint(&config.reasoning.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ArtError::Provider(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ArtError::Provider(err.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            return Err(ArtError::Provider(format!("{status}: {message}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|err| ArtError::Provider(format!("malformed response: {err}")))?;
        extract_reply(parsed)
    }
}

#[async_trait]
impl ArtInstance for GeminiArt {
    async fn set_thread_config(
        &self,
        thread_id: &str,
        config: ThreadConfig,
    ) -> Result<(), ArtError> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .and_modify(|state| state.config = config.clone())
            .or_insert_with(|| ThreadState {
                config,
                history: Vec::new(),
            });
        Ok(())
    }

    async fn process(&self, props: AgentProps) -> Result<AgentResponse, ArtError> {
        let (config, history) = {
            let threads = self.threads.read().await;
            let state = threads
                .get(&props.thread_id)
                .ok_or_else(|| ArtError::ThreadNotConfigured(props.thread_id.clone()))?;
            (state.config.clone(), state.history.clone())
        };

        self.publish(
            &props.thread_id,
            "INTENT",
            json!({ "intent": props.query }),
        );

        match self.generate(&config, &history, &props.query).await {
            Ok(reply) => {
                self.publish(
                    &props.thread_id,
                    "SYNTHESIS",
                    json!({ "thoughts": reply }),
                );

                let mut threads = self.threads.write().await;
                if let Some(state) = threads.get_mut(&props.thread_id) {
                    state.history.push(Turn {
                        role: "user",
                        text: props.query.clone(),
                    });
                    state.history.push(Turn {
                        role: "model",
                        text: reply.clone(),
                    });
                    trim_history(&mut state.history, state.config.history_limit);
                }
                debug!(thread_id = %props.thread_id, "query processed");

                Ok(AgentResponse::success(reply))
            }
            Err(err) => {
                warn!(thread_id = %props.thread_id, error = %err, "query failed");
                self.publish(
                    &props.thread_id,
                    "ERROR",
                    json!({ "message": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    fn observation_socket(&self) -> &ObservationSocket {
        &self.socket
    }
}

fn build_request(config: &ThreadConfig, history: &[Turn], query: &str) -> GenerateRequest {
    let system_instruction = (!config.system_prompt.trim().is_empty()).then(|| RequestContent {
        role: None,
        parts: vec![RequestPart {
            text: config.system_prompt.clone(),
        }],
    });

    let mut contents: Vec<RequestContent> = history
        .iter()
        .map(|turn| RequestContent {
            role: Some(turn.role),
            parts: vec![RequestPart {
                text: turn.text.clone(),
            }],
        })
        .collect();
    contents.push(RequestContent {
        role: Some("user"),
        parts: vec![RequestPart {
            text: query.to_string(),
        }],
    });

    GenerateRequest {
        system_instruction,
        contents,
    }
}

fn extract_reply(response: GenerateResponse) -> Result<String, ArtError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ArtError::Provider("response contained no text".to_string()));
    }
    Ok(text)
}

/// Keeps the last `limit` exchanges. A turn is a user message plus the
/// model's reply, so the history handed to Gemini always opens with `user`.
fn trim_history(history: &mut Vec<Turn>, limit: usize) {
    let max_entries = limit.saturating_mul(2);
    if history.len() > max_entries {
        let excess = history.len() - max_entries;
        history.drain(..excess);
    }
    let leading_replies = history
        .iter()
        .take_while(|turn| turn.role != "user")
        .count();
    history.drain(..leading_replies);
}
