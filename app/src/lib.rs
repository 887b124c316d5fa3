//! WhatIf Core Library
//!
//! Turns a short "what if" idea into a scene-by-scene video script with
//! Vietnamese narration and English video-generation prompts, using one of
//! several LLM providers.

pub mod core;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokio::sync::{Mutex, RwLock};

use crate::core::ai::{ApiKeySet, GenerationError, PromptTemplate, ScriptGateway};
use crate::core::script::{export_script, ExportedFiles, GenerationRequest, ScriptResult};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Logging
// =============================================================================

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Log file prefix inside the log directory
pub const LOG_FILE_PREFIX: &str = "whatif.log";

/// Default log directory under the app data dir
pub fn default_log_dir() -> PathBuf {
    crate::core::fs::app_data_dir().join("logs")
}

/// Installs a stderr layer and a daily rolling file layer.
///
/// `RUST_LOG` overrides `default_level`. Calling this twice is harmless.
pub fn init_logging(log_dir: &Path, default_level: &str) {
    use tracing_subscriber::prelude::*;

    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

// =============================================================================
// Script Session
// =============================================================================

/// Application state shared by front ends: the gateway, the resolved keys
/// and the outcome of the last generation.
pub struct ScriptSession {
    gateway: ScriptGateway,
    api_keys: RwLock<ApiKeySet>,
    last_result: Mutex<Option<ScriptResult>>,
    last_error: Mutex<Option<String>>,
}

impl ScriptSession {
    pub fn new(gateway: ScriptGateway, api_keys: ApiKeySet) -> Self {
        Self {
            gateway,
            api_keys: RwLock::new(api_keys),
            last_result: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn gateway(&self) -> &ScriptGateway {
        &self.gateway
    }

    /// Replaces the key set used by later generations
    pub async fn set_api_keys(&self, api_keys: ApiKeySet) {
        *self.api_keys.write().await = api_keys;
    }

    pub async fn api_keys(&self) -> ApiKeySet {
        self.api_keys.read().await.clone()
    }

    /// Runs one generation and records its outcome.
    ///
    /// A `Busy` rejection leaves the recorded outcome of the running call alone.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        template: &PromptTemplate,
    ) -> Result<ScriptResult, GenerationError> {
        let api_keys = self.api_keys().await;
        let outcome = self
            .gateway
            .generate_script(request, &api_keys, template)
            .await;

        match &outcome {
            Ok(result) => {
                *self.last_result.lock().await = Some(result.clone());
                *self.last_error.lock().await = None;
            }
            Err(e) if matches!(e.error, CoreError::Busy) => {}
            Err(e) => {
                *self.last_result.lock().await = None;
                *self.last_error.lock().await = Some(e.message.clone());
            }
        }

        outcome
    }

    pub async fn last_result(&self) -> Option<ScriptResult> {
        self.last_result.lock().await.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    /// Writes the last successful result into `output_dir`
    pub async fn export_last(&self, output_dir: &Path) -> CoreResult<ExportedFiles> {
        let guard = self.last_result.lock().await;
        let result = guard.as_ref().ok_or_else(|| {
            CoreError::ConfigurationError("Chưa có kịch bản để xuất.".to_string())
        })?;
        export_script(result, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::{GatewayConfig, MockTransport, ProviderKind};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn openai_body(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    const SCRIPT: &str = r#"{"scenes":[{"scene":1,"description":"Mở đầu","prompt":{"subject":"A glacier","action":"collapsing","setting":"the Arctic","camera_shot":"Aerial shot","style":"Cinematic","sound":"cracking ice"}}]}"#;

    #[tokio::test]
    async fn test_session_records_success_then_failure() {
        let mock = Arc::new(
            MockTransport::new()
                .with_response(200, &openai_body(SCRIPT))
                .with_network_failure("Failed to fetch"),
        );
        let session = ScriptSession::new(
            ScriptGateway::new(mock.clone(), GatewayConfig::default()),
            ApiKeySet::new().with_key(ProviderKind::OpenAI, "sk-test"),
        );
        let request = GenerationRequest::new("Nếu như băng tan hết?", ProviderKind::OpenAI);
        let template = PromptTemplate::default();

        let result = session.generate(&request, &template).await.unwrap();
        assert_eq!(result.scene_count(), 1);
        assert_eq!(session.last_result().await, Some(result));
        assert!(session.last_error().await.is_none());

        let err = session.generate(&request, &template).await.unwrap_err();
        assert!(session.last_result().await.is_none());
        assert_eq!(session.last_error().await, Some(err.message));
    }

    #[tokio::test]
    async fn test_session_uses_replaced_keys() {
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(SCRIPT)));
        let session = ScriptSession::new(
            ScriptGateway::new(mock.clone(), GatewayConfig::default()),
            ApiKeySet::new(),
        );
        let request = GenerationRequest::new("idea", ProviderKind::OpenAI);

        let err = session
            .generate(&request, &PromptTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err.error, CoreError::ConfigurationError(_)));
        assert_eq!(mock.call_count(), 0);

        session
            .set_api_keys(ApiKeySet::new().with_key(ProviderKind::OpenAI, "sk-new"))
            .await;
        session
            .generate(&request, &PromptTemplate::default())
            .await
            .unwrap();
        assert_eq!(
            mock.last_request().unwrap().header("Authorization"),
            Some("Bearer sk-new")
        );
    }

    #[tokio::test]
    async fn test_export_last() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(SCRIPT)));
        let session = ScriptSession::new(
            ScriptGateway::new(mock, GatewayConfig::default()),
            ApiKeySet::new().with_key(ProviderKind::OpenAI, "sk-test"),
        );

        assert!(session.export_last(temp.path()).await.is_err());

        let request = GenerationRequest::new("idea", ProviderKind::OpenAI);
        session
            .generate(&request, &PromptTemplate::default())
            .await
            .unwrap();

        let files = session.export_last(temp.path()).await.unwrap();
        let prompts = std::fs::read_to_string(files.prompts.unwrap()).unwrap();
        assert_eq!(
            prompts,
            "SCENE 1:\nAerial shot of A glacier collapsing in the Arctic, Cinematic. Ambient sounds of cracking ice.\n\n"
        );
        assert!(files.voiceover.is_none());
    }
}
