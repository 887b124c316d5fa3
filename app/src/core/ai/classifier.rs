//! Error Classifier
//!
//! Maps a generation failure to the Vietnamese message shown to the user.
//! Rules are checked in order and the first match wins.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::providers::ProviderKind;
use crate::core::CoreError;

fn json_fragment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("json fragment pattern"))
}

const INVALID_KEY_MARKERS: &[&str] = &[
    "incorrect api key",
    "invalid api key",
    "api key not valid",
    "api_key_invalid",
];

/// Returns the user-facing message for a failed generation.
pub fn classify_error(error: &CoreError, provider: ProviderKind) -> String {
    let name = provider.short_name();

    match error {
        CoreError::ConfigurationError(message) => return message.clone(),
        CoreError::Busy => return error.to_string(),
        CoreError::TransportError(_) => return network_message(name),
        _ => {}
    }

    let message = raw_message(error);

    if provider == ProviderKind::Google {
        if let Some(classified) = classify_google_payload(&message) {
            return classified;
        }
    }

    let lowered = message.to_lowercase();
    if INVALID_KEY_MARKERS.iter().any(|m| lowered.contains(m)) {
        return invalid_key_message(name);
    }
    if lowered.contains("rate limit") {
        return format!(
            "Lỗi API {}: Bạn đã vượt quá giới hạn sử dụng. Vui lòng thử lại sau hoặc kiểm tra gói cước của bạn.",
            name
        );
    }
    if lowered.contains("insufficient") {
        return format!(
            "Lỗi API {name}: Số dư tài khoản không đủ. Vui lòng kiểm tra và nạp thêm tiền vào tài khoản {name} của bạn."
        );
    }

    format!(
        "Không thể tạo kịch bản. Vui lòng kiểm tra API key và prompt. Chi tiết lỗi: {}",
        message
    )
}

/// The provider's own wording, without the variant prefix.
fn raw_message(error: &CoreError) -> String {
    match error {
        CoreError::ProviderError { message, .. } => message.clone(),
        CoreError::ValidationError(message) => message.clone(),
        other => other.to_string(),
    }
}

fn network_message(name: &str) -> String {
    format!(
        "Lỗi kết nối đến {}: Trình duyệt của bạn có thể đã chặn yêu cầu do chính sách bảo mật (CORS). \
         Đây là một hạn chế phổ biến khi gọi API trực tiếp từ trang web. \
         Vui lòng thử lại, hoặc sử dụng Google Gemini để đảm bảo ứng dụng hoạt động ổn định.",
        name
    )
}

fn invalid_key_message(name: &str) -> String {
    format!(
        "Lỗi API {}: API key không hợp lệ. Vui lòng kiểm tra lại trong tab Profile.",
        name
    )
}

/// Reads the `{...}` error object Gemini embeds in its failure text.
fn classify_google_payload(message: &str) -> Option<String> {
    let fragment = json_fragment_pattern().find(message)?;
    let root: Value = serde_json::from_str(fragment.as_str()).ok()?;
    let nested = root.get("error").filter(|e| e.is_object()).unwrap_or(&root);

    let status = nested.get("status").and_then(Value::as_str);
    let code = nested.get("code").and_then(Value::as_i64);
    if status == Some("UNAVAILABLE") || code == Some(503) {
        return Some(
            "Lỗi từ Google AI: Model đang bị quá tải. Vui lòng thử lại sau ít phút.".to_string(),
        );
    }

    let inner = nested
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())?;
    if inner.contains("API key not valid") || inner.contains("API_KEY_INVALID") {
        return Some(invalid_key_message("Google"));
    }

    Some(format!("Lỗi từ Google AI: {}", inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_error(status: u16, message: &str) -> CoreError {
        CoreError::ProviderError {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_network_failure_names_provider_and_suggests_gemini() {
        let err = CoreError::TransportError("Failed to fetch".to_string());
        let message = classify_error(&err, ProviderKind::OpenAI);

        assert!(message.starts_with("Lỗi kết nối đến OpenAI"));
        assert!(message.contains("CORS"));
        assert!(message.contains("Google Gemini"));
    }

    #[test]
    fn test_google_invalid_key_mentions_profile() {
        let err = provider_error(400, "API key not valid. Please pass a valid API key.");
        let message = classify_error(&err, ProviderKind::Google);

        assert_eq!(
            message,
            "Lỗi API Google: API key không hợp lệ. Vui lòng kiểm tra lại trong tab Profile."
        );
    }

    #[test]
    fn test_google_embedded_payload_invalid_key() {
        let body = r#"got status: 400. {"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        let message = classify_error(&provider_error(400, body), ProviderKind::Google);
        assert!(message.contains("Profile"));
    }

    #[test]
    fn test_google_overload() {
        let body = r#"got status: 503. {"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let message = classify_error(&provider_error(503, body), ProviderKind::Google);
        assert_eq!(
            message,
            "Lỗi từ Google AI: Model đang bị quá tải. Vui lòng thử lại sau ít phút."
        );
    }

    #[test]
    fn test_google_other_payload_message() {
        let body = r#"{"error":{"code":400,"message":"Request contains an invalid argument.","status":"INVALID_ARGUMENT"}}"#;
        let message = classify_error(&provider_error(400, body), ProviderKind::Google);
        assert_eq!(
            message,
            "Lỗi từ Google AI: Request contains an invalid argument."
        );
    }

    #[test]
    fn test_embedded_payload_ignored_for_other_providers() {
        let body = r#"{"error":{"code":503,"status":"UNAVAILABLE","message":"busy"}}"#;
        let message = classify_error(&provider_error(503, body), ProviderKind::Deepseek);
        assert!(message.starts_with("Không thể tạo kịch bản."));
    }

    #[test]
    fn test_openai_compatible_substrings() {
        let message = classify_error(
            &provider_error(401, "Incorrect API key provided: sk-abc."),
            ProviderKind::OpenAI,
        );
        assert!(message.starts_with("Lỗi API OpenAI: API key không hợp lệ"));

        let message = classify_error(
            &provider_error(429, "Rate limit reached for requests"),
            ProviderKind::Grok,
        );
        assert!(message.starts_with("Lỗi API Grok: Bạn đã vượt quá giới hạn"));

        let message = classify_error(
            &provider_error(402, "Insufficient Balance"),
            ProviderKind::Deepseek,
        );
        assert!(message.contains("nạp thêm tiền vào tài khoản Deepseek"));
    }

    #[test]
    fn test_configuration_and_busy_pass_through() {
        let err = CoreError::ConfigurationError(
            "Chưa có Google Gemini API key. Vui lòng vào tab Profile để thêm key.".to_string(),
        );
        assert_eq!(
            classify_error(&err, ProviderKind::Google),
            "Chưa có Google Gemini API key. Vui lòng vào tab Profile để thêm key."
        );
        assert_eq!(
            classify_error(&CoreError::Busy, ProviderKind::OpenAI),
            CoreError::Busy.to_string()
        );
    }

    #[test]
    fn test_fallback_includes_raw_text() {
        let err = CoreError::ValidationError(
            "Invalid response format from openai. Expected a JSON object with a 'scenes' array."
                .to_string(),
        );
        let message = classify_error(&err, ProviderKind::OpenAI);
        assert!(message.starts_with("Không thể tạo kịch bản."));
        assert!(message.ends_with("Expected a JSON object with a 'scenes' array."));
    }
}
