//! AI Provider Table
//!
//! Every supported chat-completion service is one row in [`PROVIDERS`]:
//! endpoint, model, auth style and the request/response functions for its
//! API family. Adding a provider means adding a row.

mod gemini;
mod openai;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::HttpRequest;
use crate::core::CoreResult;

// =============================================================================
// Provider Kind
// =============================================================================

/// Supported providers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini (native structured-output API)
    Google,
    /// OpenAI GPT models
    OpenAI,
    /// Grok key slot, served by the Groq OpenAI-compatible API
    Grok,
    /// Deepseek chat models
    Deepseek,
}

impl ProviderKind {
    /// All providers, in display order
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Google,
        ProviderKind::OpenAI,
        ProviderKind::Grok,
        ProviderKind::Deepseek,
    ];

    /// Returns the table row for this provider
    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            ProviderKind::Google => &PROVIDERS[0],
            ProviderKind::OpenAI => &PROVIDERS[1],
            ProviderKind::Grok => &PROVIDERS[2],
            ProviderKind::Deepseek => &PROVIDERS[3],
        }
    }

    /// Name shown in selection lists and missing-key messages
    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    /// Short name used inside error messages
    pub fn short_name(self) -> &'static str {
        self.spec().short_name
    }

    /// Key name in the credential store
    pub fn vault_key(self) -> &'static str {
        match self {
            ProviderKind::Google => "googleApiKey",
            ProviderKind::OpenAI => "openaiApiKey",
            ProviderKind::Grok => "grokApiKey",
            ProviderKind::Deepseek => "deepseekApiKey",
        }
    }

    /// Whether this provider uses the native structured-output API
    pub fn is_native(self) -> bool {
        self.spec().family == ApiFamily::Native
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Google => write!(f, "google"),
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Grok => write!(f, "grok"),
            ProviderKind::Deepseek => write!(f, "deepseek"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(ProviderKind::Google),
            "openai" | "gpt" | "chatgpt" => Ok(ProviderKind::OpenAI),
            "grok" | "groq" => Ok(ProviderKind::Grok),
            "deepseek" => Ok(ProviderKind::Deepseek),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

// =============================================================================
// Provider Spec
// =============================================================================

/// Wire family of a provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiFamily {
    /// Gemini `generateContent` with a response schema
    Native,
    /// `POST /chat/completions` with `response_format: json_object`
    OpenAICompatible,
}

/// How the API key is attached to the request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-goog-api-key: <key>` (keeps the key out of URLs and logs)
    GoogApiKeyHeader,
}

impl AuthStyle {
    pub fn header(self, api_key: &str) -> (String, String) {
        match self {
            AuthStyle::Bearer => ("Authorization".to_string(), format!("Bearer {}", api_key)),
            AuthStyle::GoogApiKeyHeader => ("x-goog-api-key".to_string(), api_key.to_string()),
        }
    }
}

/// Prompt pieces handed to a request builder
#[derive(Clone, Copy, Debug)]
pub struct ChatPrompt<'a> {
    /// Main system instruction
    pub instruction: &'a str,
    /// Output-format reminder for providers without schema enforcement
    pub format_suffix: &'a str,
    /// User content
    pub user: &'a str,
    /// Response schema for providers with native schema enforcement
    pub response_schema: &'a Value,
}

/// Builds the JSON body for one provider call
pub type RequestBuilder = fn(&ProviderSpec, &ChatPrompt<'_>) -> CoreResult<Value>;
/// Pulls the model's JSON text out of a success body
pub type ContentExtractor = fn(&str) -> CoreResult<String>;
/// Turns a non-success body into an error message
pub type ErrorExtractor = fn(u16, &str) -> String;

/// One row of the provider table
#[derive(Debug)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub short_name: &'static str,
    pub family: ApiFamily,
    pub endpoint: &'static str,
    pub model: &'static str,
    pub auth: AuthStyle,
    pub build_request: RequestBuilder,
    pub extract_content: ContentExtractor,
    pub extract_error: ErrorExtractor,
}

impl ProviderSpec {
    /// Assembles the outbound HTTP request for this provider
    pub fn build_http_request(
        &self,
        api_key: &str,
        prompt: &ChatPrompt<'_>,
    ) -> CoreResult<HttpRequest> {
        let body = (self.build_request)(self, prompt)?;
        Ok(HttpRequest {
            url: self.endpoint.to_string(),
            headers: vec![self.auth.header(api_key)],
            body,
        })
    }
}

/// Provider table. Endpoints and models are fixed at build time.
pub static PROVIDERS: [ProviderSpec; 4] = [
    ProviderSpec {
        kind: ProviderKind::Google,
        display_name: "Google Gemini",
        short_name: "Google",
        family: ApiFamily::Native,
        endpoint: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent",
        model: "gemini-2.5-flash",
        auth: AuthStyle::GoogApiKeyHeader,
        build_request: gemini::build_request,
        extract_content: gemini::extract_content,
        extract_error: gemini::extract_error,
    },
    ProviderSpec {
        kind: ProviderKind::OpenAI,
        display_name: "OpenAI GPT-4o",
        short_name: "OpenAI",
        family: ApiFamily::OpenAICompatible,
        endpoint: "https://api.openai.com/v1/chat/completions",
        model: "gpt-4o",
        auth: AuthStyle::Bearer,
        build_request: openai::build_request,
        extract_content: openai::extract_content,
        extract_error: openai::extract_error,
    },
    ProviderSpec {
        kind: ProviderKind::Grok,
        display_name: "Grok",
        short_name: "Grok",
        family: ApiFamily::OpenAICompatible,
        endpoint: "https://api.groq.com/openai/v1/chat/completions",
        model: "llama-3.3-70b-versatile",
        auth: AuthStyle::Bearer,
        build_request: openai::build_request,
        extract_content: openai::extract_content,
        extract_error: openai::extract_error,
    },
    ProviderSpec {
        kind: ProviderKind::Deepseek,
        display_name: "Deepseek",
        short_name: "Deepseek",
        family: ApiFamily::OpenAICompatible,
        endpoint: "https://api.deepseek.com/chat/completions",
        model: "deepseek-chat",
        auth: AuthStyle::Bearer,
        build_request: openai::build_request,
        extract_content: openai::extract_content,
        extract_error: openai::extract_error,
    },
];

// =============================================================================
// API Key Set
// =============================================================================

/// Resolved API keys, one per provider. Blank values count as missing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeySet {
    keys: HashMap<ProviderKind, String>,
}

impl ApiKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_key(mut self, provider: ProviderKind, key: &str) -> Self {
        self.set(provider, key);
        self
    }

    pub fn set(&mut self, provider: ProviderKind, key: &str) {
        self.keys.insert(provider, key.trim().to_string());
    }

    pub fn remove(&mut self, provider: ProviderKind) {
        self.keys.remove(&provider);
    }

    /// Returns the key for the provider, if one is set and non-blank
    pub fn get(&self, provider: ProviderKind) -> Option<&str> {
        self.keys
            .get(&provider)
            .map(String::as_str)
            .filter(|k| !k.is_empty())
    }

    pub fn has_key(&self, provider: ProviderKind) -> bool {
        self.get(provider).is_some()
    }

    /// Providers that currently have a usable key
    pub fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|p| self.has_key(*p))
            .collect()
    }
}

impl std::fmt::Debug for ApiKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeySet")
            .field("configured", &self.configured())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
