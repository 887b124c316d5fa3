//! Script Gateway
//!
//! Turns a [`GenerationRequest`] into one provider call and a normalized
//! [`ScriptResult`]. Checks run before the network; failures carry both the
//! typed cause and the classified user message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::classifier::classify_error;
use super::prompt::{build_user_prompt, GenerationMode, PromptTemplate, SceneTarget};
use super::provider::HttpTransport;
use super::providers::{ApiKeySet, ChatPrompt, ProviderKind};
use crate::core::script::{parse_duration_to_seconds, scenes_for, GenerationRequest, ScriptResult};
use crate::core::{CoreError, CoreResult};

/// Keys accepted for the continuous voiceover in voiceover mode
const VOICEOVER_KEYS: &[&str] = &["full_voiceover", "fullVoiceover", "voiceover", "loi_dan"];

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the script gateway
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Upper bound for one provider call
    pub request_timeout: Duration,
    /// Reject results whose scene count or numbering is off
    pub strict_validation: bool,
}

impl GatewayConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            strict_validation: false,
        }
    }
}

// =============================================================================
// Generation Error
// =============================================================================

/// A failed generation: the typed cause and the message for the user
#[derive(Debug)]
pub struct GenerationError {
    pub error: CoreError,
    pub message: String,
}

impl GenerationError {
    pub fn new(error: CoreError, provider: ProviderKind) -> Self {
        let message = classify_error(&error, provider);
        Self { error, message }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// =============================================================================
// In-flight Guard
// =============================================================================

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Script Gateway
// =============================================================================

/// Gateway for script generation. At most one call is in flight at a time.
pub struct ScriptGateway {
    transport: Arc<dyn HttpTransport>,
    config: GatewayConfig,
    in_flight: AtomicBool,
}

impl ScriptGateway {
    /// Creates a gateway over any transport
    pub fn new(transport: Arc<dyn HttpTransport>, config: GatewayConfig) -> Self {
        Self {
            transport,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Creates a gateway backed by `reqwest`
    #[cfg(feature = "ai-providers")]
    pub fn with_http(config: GatewayConfig) -> CoreResult<Self> {
        let transport = super::provider::ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns true while a generation is running
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Generates a script and classifies any failure for display.
    pub async fn generate_script(
        &self,
        request: &GenerationRequest,
        api_keys: &ApiKeySet,
        template: &PromptTemplate,
    ) -> Result<ScriptResult, GenerationError> {
        self.try_generate_script(request, api_keys, template)
            .await
            .map_err(|error| {
                warn!(
                    "Script generation via {} failed ({}): {}",
                    request.provider,
                    error.kind(),
                    error
                );
                GenerationError::new(error, request.provider)
            })
    }

    /// Generates a script, returning the raw error on failure.
    pub async fn try_generate_script(
        &self,
        request: &GenerationRequest,
        api_keys: &ApiKeySet,
        template: &PromptTemplate,
    ) -> CoreResult<ScriptResult> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(CoreError::Busy)?;

        let (api_key, target) = prepare_generation(request, api_keys)?;
        let spec = request.provider.spec();

        let user_prompt = build_user_prompt(request, target);
        let chat = ChatPrompt {
            instruction: &template.system_instruction,
            format_suffix: &template.format_suffix,
            user: &user_prompt,
            response_schema: &template.response_schema,
        };
        let http_request = spec.build_http_request(api_key, &chat)?;

        info!(
            "Generating script via {} (model={}, mode={}, scenes={})",
            spec.short_name,
            spec.model,
            template.mode,
            target
                .map(|t| t.scene_count.to_string())
                .unwrap_or_else(|| "unspecified".to_string())
        );

        let timeout = self.config.request_timeout;
        let response = tokio::time::timeout(timeout, self.transport.post_json(http_request))
            .await
            .map_err(|_| {
                CoreError::Timeout(format!(
                    "{} did not respond within {}s",
                    spec.short_name,
                    timeout.as_secs()
                ))
            })??;

        debug!("{} responded with HTTP {}", spec.short_name, response.status);

        if !response.is_success() {
            return Err(CoreError::ProviderError {
                status: response.status,
                message: (spec.extract_error)(response.status, &response.body),
            });
        }

        let content = (spec.extract_content)(&response.body)?;
        let result = parse_script_content(&content, request.provider, template.mode)?;

        if self.config.strict_validation {
            check_scene_plan(&result, target)?;
        }

        info!(
            "Generated script with {} scenes via {}",
            result.scene_count(),
            spec.short_name
        );

        Ok(result)
    }
}

// =============================================================================
// Pre-flight Checks
// =============================================================================

/// Resolves the key and scene budget for a request, before any network I/O.
pub fn prepare_generation<'k>(
    request: &GenerationRequest,
    api_keys: &'k ApiKeySet,
) -> CoreResult<(&'k str, Option<SceneTarget>)> {
    let api_key = api_keys.get(request.provider).ok_or_else(|| {
        CoreError::ConfigurationError(format!(
            "Chưa có {} API key. Vui lòng vào tab Profile để thêm key.",
            request.provider.display_name()
        ))
    })?;

    request.validate()?;

    let target = match request.duration() {
        None => None,
        Some(text) => {
            let total_seconds = parse_duration_to_seconds(text).ok_or_else(|| {
                CoreError::ConfigurationError(format!("Invalid duration format: \"{}\".", text))
            })?;
            let scene_count = scenes_for(total_seconds);
            if scene_count == 0 {
                return Err(CoreError::ConfigurationError(format!(
                    "Thời lượng \"{}\" quá ngắn: cần ít nhất 4 giây để tạo một cảnh.",
                    text
                )));
            }
            Some(SceneTarget {
                total_seconds,
                scene_count,
            })
        }
    };

    Ok((api_key, target))
}

// =============================================================================
// Response Parsing
// =============================================================================

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parses and shape-checks the model's JSON text.
pub fn parse_script_content(
    content: &str,
    provider: ProviderKind,
    mode: GenerationMode,
) -> CoreResult<ScriptResult> {
    let payload = strip_code_fences(content);
    let value: Value =
        serde_json::from_str(payload).map_err(|e| CoreError::ParseError(e.to_string()))?;

    let has_scenes = value
        .as_object()
        .and_then(|o| o.get("scenes"))
        .is_some_and(Value::is_array);
    if !has_scenes {
        return Err(CoreError::ValidationError(format!(
            "Invalid response format from {}. Expected a JSON object with a 'scenes' array.",
            provider
        )));
    }

    if mode.requires_voiceover() {
        let has_voiceover = VOICEOVER_KEYS
            .iter()
            .any(|k| value.get(*k).is_some_and(Value::is_string));
        if !has_voiceover {
            return Err(CoreError::ValidationError(format!(
                "Invalid response format from {}. Expected a 'full_voiceover' string next to the 'scenes' array.",
                provider
            )));
        }
    }

    let result: ScriptResult = serde_json::from_value(value).map_err(|e| {
        CoreError::ValidationError(format!("Invalid response format from {}: {}", provider, e))
    })?;

    let structured = mode == GenerationMode::StructuredPrompt;
    if let Some(scene) = result
        .scenes
        .iter()
        .find(|s| s.prompt.is_structured() != structured)
    {
        let expected = if structured {
            "a structured prompt object"
        } else {
            "a plain prompt string"
        };
        return Err(CoreError::ValidationError(format!(
            "Invalid response format from {}. Scene {} must have {}.",
            provider, scene.scene_number, expected
        )));
    }

    Ok(result)
}

fn check_scene_plan(result: &ScriptResult, target: Option<SceneTarget>) -> CoreResult<()> {
    if let Some(target) = target {
        if result.scene_count() != target.scene_count as usize {
            return Err(CoreError::ValidationError(format!(
                "Expected {} scenes but the model returned {}.",
                target.scene_count,
                result.scene_count()
            )));
        }
    }
    if !result.has_contiguous_numbering() {
        return Err(CoreError::ValidationError(
            "Scene numbers must start at 1 and increase by 1.".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::provider::MockTransport;
    use serde_json::json;

    const IDEA: &str = "Nếu như khủng long chưa từng tuyệt chủng?";

    fn structured_content(count: u32) -> String {
        let scenes: Vec<Value> = (1..=count)
            .map(|n| {
                json!({
                    "scene": n,
                    "description": format!("Cảnh {}", n),
                    "prompt": {
                        "subject": "A herd of sauropods",
                        "action": "grazing",
                        "setting": "a modern city park",
                        "camera_shot": "Wide aerial shot",
                        "style": "Photorealistic",
                        "sound": "traffic and low rumbles"
                    }
                })
            })
            .collect();
        json!({ "scenes": scenes }).to_string()
    }

    fn openai_body(content: &str) -> String {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        })
        .to_string()
    }

    fn gemini_body(content: &str) -> String {
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": content}]}, "finishReason": "STOP"}]
        })
        .to_string()
    }

    fn keys() -> ApiKeySet {
        ApiKeySet::new()
            .with_key(ProviderKind::Google, "AIza-test")
            .with_key(ProviderKind::OpenAI, "sk-test")
            .with_key(ProviderKind::Deepseek, "sk-deep")
    }

    fn gateway(mock: &Arc<MockTransport>, config: GatewayConfig) -> ScriptGateway {
        ScriptGateway::new(mock.clone(), config)
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let mock = Arc::new(MockTransport::new());
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::Google);

        let err = gateway
            .generate_script(&request, &ApiKeySet::new(), &PromptTemplate::default())
            .await
            .unwrap_err();

        assert!(matches!(err.error, CoreError::ConfigurationError(_)));
        assert!(err.message.contains("Google Gemini"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_durations_fail_before_network() {
        let mock = Arc::new(MockTransport::new());
        let gateway = gateway(&mock, GatewayConfig::default());

        for duration in ["soon", "2s", "99999999999999999999999 phút"] {
            let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI).with_duration(duration);
            let err = gateway
                .generate_script(&request, &keys(), &PromptTemplate::default())
                .await
                .unwrap_err();
            assert!(matches!(err.error, CoreError::ConfigurationError(_)));
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_google_structured_generation() {
        let mock = Arc::new(MockTransport::new().with_response(200, &gemini_body(&structured_content(4))));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::Google).with_duration("30s");

        let result = gateway
            .generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap();

        assert_eq!(result.scene_count(), 4);
        assert!(result.scenes[0].prompt.is_structured());
        assert!(result.full_voiceover.is_none());

        let sent = mock.last_request().unwrap();
        assert_eq!(sent.url, ProviderKind::Google.spec().endpoint);
        assert_eq!(sent.header("x-goog-api-key"), Some("AIza-test"));
        assert!(sent.header("Authorization").is_none());
        assert_eq!(
            sent.body["generationConfig"]["responseSchema"]["required"],
            json!(["scenes"])
        );
        let user_text = sent.body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(user_text.contains("Total Scenes to Generate: 4"));
    }

    #[tokio::test]
    async fn test_voiceover_generation_with_code_fence() {
        let content = "```json\n{\"full_voiceover\":\"Nếu như...\",\"scenes\":[{\"scene\":1,\"description\":\"Mở đầu\",\"prompt\":\"Aerial shot of a jungle city\"}]}\n```";
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(content)));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::Deepseek);
        let template = PromptTemplate::for_mode(GenerationMode::VoiceoverWithPlainPrompt);

        let result = gateway
            .generate_script(&request, &keys(), &template)
            .await
            .unwrap();

        assert_eq!(result.full_voiceover.as_deref(), Some("Nếu như..."));
        assert_eq!(
            result.scenes[0].prompt.to_prompt_text(),
            "Aerial shot of a jungle city"
        );

        let sent = mock.last_request().unwrap();
        assert_eq!(sent.header("Authorization"), Some("Bearer sk-deep"));
        assert_eq!(sent.body["model"], "deepseek-chat");
        let system = sent.body["messages"][0]["content"].as_str().unwrap();
        assert!(system.ends_with(&template.format_suffix));
    }

    #[tokio::test]
    async fn test_missing_scenes_is_validation_error() {
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(r#"{"notScenes": []}"#)));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);

        let err = gateway
            .generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap_err();

        assert!(matches!(err.error, CoreError::ValidationError(_)));
        assert!(err.message.contains("Invalid response format from openai"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_voiceover_mode_requires_voiceover() {
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(r#"{"scenes": []}"#)));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);
        let template = PromptTemplate::for_mode(GenerationMode::VoiceoverWithPlainPrompt);

        let err = gateway
            .try_generate_script(&request, &keys(), &template)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_non_json_content_is_parse_error() {
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body("Here is your script!")));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);

        let err = gateway
            .try_generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_network_failure_is_classified() {
        let mock = Arc::new(MockTransport::new().with_network_failure("Failed to fetch"));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);

        let err = gateway
            .generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap_err();

        assert!(matches!(err.error, CoreError::TransportError(_)));
        assert!(err.message.contains("OpenAI"));
        assert!(err.message.contains("Google Gemini"));
    }

    #[tokio::test]
    async fn test_http_error_is_provider_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided: sk-test.","type":"invalid_request_error"}}"#;
        let mock = Arc::new(MockTransport::new().with_response(401, body));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);

        let err = gateway
            .generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap_err();

        assert!(matches!(err.error, CoreError::ProviderError { status: 401, .. }));
        assert!(err.message.contains("Profile"));
    }

    #[tokio::test]
    async fn test_concurrent_call_is_busy() {
        let mock = Arc::new(
            MockTransport::new()
                .with_response(200, &openai_body(&structured_content(1)))
                .with_delay(Duration::from_millis(200)),
        );
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);
        let template = PromptTemplate::default();
        let keys = keys();

        let (first, second) = tokio::join!(
            gateway.generate_script(&request, &keys, &template),
            gateway.generate_script(&request, &keys, &template)
        );

        assert!(first.is_ok());
        assert!(matches!(second.unwrap_err().error, CoreError::Busy));
        assert_eq!(mock.call_count(), 1);
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let mock = Arc::new(
            MockTransport::new()
                .with_response(200, &openai_body(&structured_content(1)))
                .with_delay(Duration::from_secs(5)),
        );
        let config = GatewayConfig {
            request_timeout: Duration::from_millis(50),
            strict_validation: false,
        };
        let gateway = gateway(&mock, config);
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI);

        let err = gateway
            .generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap_err();

        assert!(matches!(err.error, CoreError::Timeout(_)));
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn test_scene_count_is_lenient_by_default() {
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(&structured_content(2))));
        let gateway = gateway(&mock, GatewayConfig::default());
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI).with_duration("5 phút");

        let result = gateway
            .generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap();
        assert_eq!(result.scene_count(), 2);
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_wrong_scene_count() {
        let mock = Arc::new(MockTransport::new().with_response(200, &openai_body(&structured_content(2))));
        let gateway = gateway(&mock, GatewayConfig::default().with_strict_validation(true));
        let request = GenerationRequest::new(IDEA, ProviderKind::OpenAI).with_duration("30s");

        let err = gateway
            .try_generate_script(&request, &keys(), &PromptTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"scenes\":[]} "), "{\"scenes\":[]}");
    }

    #[test]
    fn test_structured_mode_rejects_plain_prompts() {
        let content = r#"{"scenes":[{"scene":1,"description":"a","prompt":"just a string"}]}"#;
        let err = parse_script_content(content, ProviderKind::OpenAI, GenerationMode::StructuredPrompt)
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(ref m) if m.contains("Scene 1")));
    }

    #[test]
    fn test_voiceover_mode_rejects_structured_prompts() {
        let content = json!({
            "full_voiceover": "Nếu như...",
            "scenes": [
                {"scene": 1, "description": "a", "prompt": "Aerial shot of a flooded city"},
                {"scene": 2, "description": "b", "prompt": {
                    "subject": "s", "action": "a", "setting": "x",
                    "camera_shot": "c", "style": "y", "sound": "z"
                }}
            ]
        })
        .to_string();
        let err = parse_script_content(
            &content,
            ProviderKind::Deepseek,
            GenerationMode::VoiceoverWithPlainPrompt,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(ref m) if m.contains("Scene 2")));
    }

    #[test]
    fn test_canonical_voiceover_key_wins_over_alias() {
        let content = r#"{"full_voiceover":"chính","voiceover":"phụ","scenes":[{"scene":1,"description":"a","prompt":"p"}]}"#;
        let result = parse_script_content(
            content,
            ProviderKind::Grok,
            GenerationMode::VoiceoverWithPlainPrompt,
        )
        .unwrap();
        assert_eq!(result.full_voiceover.as_deref(), Some("chính"));
    }

    #[test]
    fn test_check_scene_plan_numbering() {
        let result: ScriptResult = serde_json::from_str(
            r#"{"scenes":[{"scene":1,"description":"a","prompt":"p"},{"scene":3,"description":"b","prompt":"q"}]}"#,
        )
        .unwrap();
        assert!(check_scene_plan(&result, None).is_err());
    }
}
