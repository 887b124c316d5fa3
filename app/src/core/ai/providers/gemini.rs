//! Google Gemini wire format
//!
//! `generateContent` with a system instruction and a JSON response schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatPrompt, ProviderSpec};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Gemini API Types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

// =============================================================================
// Table Functions
// =============================================================================

pub(super) fn build_request(_spec: &ProviderSpec, prompt: &ChatPrompt<'_>) -> CoreResult<Value> {
    let request = GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: prompt.user.to_string(),
            }],
        }],
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: prompt.instruction.to_string(),
            }],
        },
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: prompt.response_schema,
        },
    };

    Ok(serde_json::to_value(request)?)
}

pub(super) fn extract_content(body: &str) -> CoreResult<String> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::ParseError(format!("Failed to parse Gemini response: {}", e)))?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(CoreError::ProviderError {
            status: 200,
            message: format!("Content blocked by Gemini safety filters: {}", reason),
        });
    }

    let candidate = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| {
            CoreError::ValidationError("No candidates returned from Gemini".to_string())
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(CoreError::ValidationError(format!(
            "Gemini returned an empty response (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}

/// Keeps the raw body so the classifier can read the embedded error object.
pub(super) fn extract_error(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP error! status: {}", status)
    } else {
        format!("got status: {}. {}", status, body)
    }
}
