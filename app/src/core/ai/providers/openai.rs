//! OpenAI-compatible wire format
//!
//! Shared by OpenAI, Groq and Deepseek: `POST /chat/completions` with a
//! system and a user message and `response_format: json_object`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatPrompt, ProviderSpec};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// OpenAI API Types
// =============================================================================

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// =============================================================================
// Table Functions
// =============================================================================

pub(super) fn build_request(spec: &ProviderSpec, prompt: &ChatPrompt<'_>) -> CoreResult<Value> {
    let system = if prompt.format_suffix.is_empty() {
        prompt.instruction.to_string()
    } else {
        format!("{}\n\n{}", prompt.instruction, prompt.format_suffix)
    };

    let request = ChatCompletionRequest {
        model: spec.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: prompt.user.to_string(),
            },
        ],
        response_format: ResponseFormat {
            format_type: "json_object",
        },
    };

    Ok(serde_json::to_value(request)?)
}

pub(super) fn extract_content(body: &str) -> CoreResult<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::ParseError(format!("Failed to parse response: {}", e)))?;

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        CoreError::ValidationError("No completion choices returned".to_string())
    })?;

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(CoreError::ValidationError(format!(
            "Empty completion (finish reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

/// Uses `error.message` when the body carries one, plus its type.
pub(super) fn extract_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(ApiError { error }) => match error.error_type.filter(|t| !t.is_empty()) {
            Some(error_type) => format!("{} (type: {})", error.message, error_type),
            None => error.message,
        },
        Err(_) => format!("HTTP error! status: {}", status),
    }
}
