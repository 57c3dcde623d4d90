//! Boundary to the agent framework.
//!
//! Everything the chat front-end knows about the framework lives here: the
//! wire shapes it produces, the [`ArtInstance`] trait the UI talks to, the
//! observation socket and the thread configuration applied before each query.

use crate::config::AppConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub mod gemini;
pub mod socket;

pub use socket::{ObservationSocket, SubscribeOptions, Unsubscribe};

pub const THREAD_ID_PREFIX: &str = "web-";
pub const CALCULATOR_TOOL: &str = "CalculatorTool";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the calculator tool for any math calculations.";

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("GEMINI_API_KEY not found in environment variables.")]
    MissingApiKey,

    #[error("failed to build framework client: {0}")]
    Client(String),

    #[error("thread {0} has no configuration")]
    ThreadNotConfigured(String),

    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("observation socket is closed")]
    SocketClosed,

    #[error("observation socket requires a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub provider: String,
    pub model: String,
}

/// Per-thread settings the framework needs before it will process a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadConfig {
    pub reasoning: ReasoningConfig,
    pub enabled_tools: Vec<String>,
    pub history_limit: usize,
    pub system_prompt: String,
}

impl ThreadConfig {
    pub fn gemini(model: impl Into<String>, history_limit: usize) -> Self {
        Self {
            reasoning: ReasoningConfig {
                provider: "gemini".to_string(),
                model: model.into(),
            },
            enabled_tools: vec![CALCULATOR_TOOL.to_string()],
            history_limit,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProps {
    pub query: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: ResponseBody,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            response: ResponseBody {
                content: content.into(),
            },
            metadata: ResponseMetadata {
                status: "success".to_string(),
                error: None,
            },
        }
    }
}

/// One event as the framework emits it. `content` and `metadata` are
/// untyped on purpose; `observation::normalize` is the only reader.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl RawObservation {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content,
            ..Default::default()
        }
    }

    pub fn for_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn at(mut self, timestamp_millis: i64) -> Self {
        self.timestamp = Some(timestamp_millis);
        self
    }
}

#[async_trait]
pub trait ArtInstance: Send + Sync {
    async fn set_thread_config(&self, thread_id: &str, config: ThreadConfig)
        -> Result<(), ArtError>;

    async fn process(&self, props: AgentProps) -> Result<AgentResponse, ArtError>;

    fn observation_socket(&self) -> &ObservationSocket;
}

/// Builds the framework instance. Called once at startup; the result is
/// handed to every consumer instead of being cached globally.
pub fn acquire(config: &AppConfig) -> Result<Arc<dyn ArtInstance>, ArtError> {
    let api_key = config
        .gemini_api_key
        .clone()
        .ok_or(ArtError::MissingApiKey)?;

    let instance = gemini::GeminiArt::new(api_key, config.gemini_base_url.clone())?;
    info!(model = %config.model, "framework instance ready");
    Ok(Arc::new(instance))
}

/// Applies `config` to the thread, then runs the query through the agent.
pub async fn process_query(
    art: &dyn ArtInstance,
    config: &ThreadConfig,
    query: &str,
    thread_id: &str,
) -> Result<AgentResponse, ArtError> {
    art.set_thread_config(thread_id, config.clone()).await?;
    debug!(thread_id, "thread configuration applied");

    art.process(AgentProps {
        query: query.to_string(),
        thread_id: thread_id.to_string(),
    })
    .await
}

pub fn generate_thread_id() -> String {
    format!("{THREAD_ID_PREFIX}{}", uuid::Uuid::new_v4())
}
