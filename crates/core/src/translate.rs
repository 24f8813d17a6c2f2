//! Field mappings between the wire shapes and the backend's native shapes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::api::{
    ApiChatRequest, ApiChatResponse, ApiListResponse, ApiMessage, ApiModelDetails,
    ApiShowRequest, ApiShowResponse,
};
use crate::wire::{
    ChatRequest, ChatResponse, ListResponse, Message, Metrics, ModelDetails, ModelResponse,
    OptionKv, ShowRequest, ShowResponse,
};

pub fn chat_request(req: &ChatRequest) -> ApiChatRequest {
    ApiChatRequest {
        model: req.model.clone(),
        messages: req
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect(),
        // the outer protocol is request/response, so never ask the backend to stream
        stream: Some(false),
        format: req.format.clone(),
        options: options_map(&req.options),
    }
}

pub fn chat_response(r: &ApiChatResponse) -> ChatResponse {
    ChatResponse {
        model: r.model.clone(),
        created_at: epoch_millis(&r.created_at),
        message: Message {
            role: r.message.role.clone(),
            content: r.message.content.clone(),
        },
        done: r.done,
        metrics: Metrics {
            total_duration: millis(r.metrics.total_duration),
            load_duration: millis(r.metrics.load_duration),
            prompt_eval_count: count(r.metrics.prompt_eval_count),
            prompt_eval_duration: millis(r.metrics.prompt_eval_duration),
            eval_count: count(r.metrics.eval_count),
            eval_duration: millis(r.metrics.eval_duration),
        },
    }
}

pub fn show_request(req: &ShowRequest) -> ApiShowRequest {
    ApiShowRequest {
        name: req.name.clone(),
        model: req.model.clone(),
        system: req.system.clone(),
        template: req.template.clone(),
    }
}

pub fn show_response(r: ApiShowResponse) -> ShowResponse {
    ShowResponse {
        license: r.license,
        modelfile: r.modelfile,
        parameters: r.parameters,
        template: r.template,
        system: r.system,
        details: model_details(r.details),
    }
}

pub fn list_response(r: ApiListResponse) -> ListResponse {
    ListResponse {
        models: r
            .models
            .into_iter()
            .map(|m| ModelResponse {
                name: m.name,
                modified_at: epoch_millis(&m.modified_at),
                size: m.size.max(0) as u64,
                digest: m.digest,
                details: model_details(m.details),
            })
            .collect(),
    }
}

pub fn model_details(d: ApiModelDetails) -> ModelDetails {
    ModelDetails {
        format: d.format,
        family: d.family,
        families: d.families.unwrap_or_default(),
        parameter_size: d.parameter_size,
        quantization_level: d.quantization_level,
    }
}

/// Numbers and booleans are forwarded typed, everything else as a string.
/// A repeated key keeps its last value.
fn options_map(options: &[OptionKv]) -> Map<String, Value> {
    options
        .iter()
        .map(|kv| {
            let value = match serde_json::from_str::<Value>(kv.value.trim()) {
                Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
                _ => Value::String(kv.value.clone()),
            };
            (kv.key.clone(), value)
        })
        .collect()
}

fn epoch_millis(t: &DateTime<Utc>) -> u64 {
    t.timestamp_millis().max(0) as u64
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}
