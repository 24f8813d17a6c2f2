//! Shapes exchanged with the host runtime.
//!
//! Field names are the on-the-wire identifiers; every struct decodes missing
//! fields to their zero value.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const OP_CHAT: &str = "Llm.Chat";
pub const OP_SHOW: &str = "Llm.Show";
pub const OP_LIST: &str = "Llm.List";

/// One inbound invocation delivered by the host runtime.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    pub id: u64,
    pub operation: String,
    pub msg: Bytes,
}

/// Envelope the host runtime receives back for an [`Action`].
///
/// `error` is only set when the reply itself could not be produced; backend
/// and decode failures travel inside `msg` as [`ProviderActionResponse::Err`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderResponse {
    pub id: u64,
    pub msg: Bytes,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProviderActionResponse<T> {
    Ok(T),
    Err(StatusError),
}

impl<T> ProviderActionResponse<T> {
    pub fn into_result(self) -> Result<T, StatusError> {
        match self {
            ProviderActionResponse::Ok(v) => Ok(v),
            ProviderActionResponse::Err(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, StatusError>> for ProviderActionResponse<T> {
    fn from(r: Result<T, StatusError>) -> Self {
        match r {
            Ok(v) => ProviderActionResponse::Ok(v),
            Err(e) => ProviderActionResponse::Err(e),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusError {
    pub status_code: u32,
    pub status: String,
    pub error: String,
}

impl StatusError {
    pub fn new(status: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status_code: 0,
            status: status.into(),
            error: error.into(),
        }
    }
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{} ({}): {}", self.status, self.status_code, self.error)
        }
    }
}

impl std::error::Error for StatusError {}

/// Option pair, encoded as a two element array `[key, value]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct OptionKv {
    pub key: String,
    pub value: String,
}

impl OptionKv {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<(String, String)> for OptionKv {
    fn from((key, value): (String, String)) -> Self {
        Self { key, value }
    }
}

impl From<OptionKv> for (String, String) {
    fn from(kv: OptionKv) -> Self {
        (kv.key, kv.value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// One of `system`, `user`, `assistant`.
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub with_stream: Option<bool>,
    pub format: String,
    pub options: Vec<OptionKv>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metrics {
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: u32,
    pub prompt_eval_duration: u64,
    pub eval_count: u32,
    pub eval_duration: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatResponse {
    pub model: String,
    pub created_at: u64,
    pub message: Message,
    pub done: bool,
    #[serde(flatten)]
    pub metrics: Metrics,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowRequest {
    pub name: String,
    pub model: String,
    pub system: String,
    pub template: String,
    pub options: Vec<OptionKv>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelDetails {
    pub format: String,
    pub family: String,
    pub families: Vec<String>,
    pub parameter_size: String,
    pub quantization_level: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowResponse {
    pub license: String,
    pub modelfile: String,
    pub parameters: String,
    pub template: String,
    pub system: String,
    pub details: ModelDetails,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelResponse {
    pub name: String,
    pub modified_at: u64,
    pub size: u64,
    pub digest: String,
    pub details: ModelDetails,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListResponse {
    pub models: Vec<ModelResponse>,
}
