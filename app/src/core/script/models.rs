//! Script Models
//!
//! Plain data records produced once per generation: the request, the scenes
//! and the normalized result. Field names on the wire follow the JSON shape
//! the models are instructed to emit (`scene`, `camera_shot`, `full_voiceover`).

use serde::{Deserialize, Serialize};

use crate::core::ai::providers::ProviderKind;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Fixed Option Sets
// =============================================================================

/// Script types offered to the user. The label is passed to the model verbatim.
pub const SCRIPT_TYPES: &[&str] = &[
    "KH Viễn tưởng / Triết học",
    "Lịch sử Giả tưởng",
    "Kinh dị / Sinh tồn",
    "Thảm họa Tự nhiên",
    "Tiền sử / Huyền bí",
    "Xã hội / Chính trị",
];

/// Script type used when none is selected.
pub const DEFAULT_SCRIPT_TYPE: &str = "KH Viễn tưởng / Triết học";

/// Duration presets shown by `options`. Any free text accepted by the
/// duration parser also works.
pub const DURATION_OPTIONS: &[&str] = &[
    "5 phút", "8 phút", "10 phút", "12 phút", "15 phút", "20 phút", "25 phút", "30 phút",
    "40 phút", "50 phút", "60 phút", "90 phút",
];

/// Returns true if the label is one of the known script types.
pub fn is_known_script_type(label: &str) -> bool {
    SCRIPT_TYPES.iter().any(|t| *t == label.trim())
}

// =============================================================================
// Visual Prompt
// =============================================================================

/// Structured visual prompt for the video model (English, no dialogue).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub subject: String,
    pub action: String,
    pub setting: String,
    #[serde(alias = "cameraShot")]
    pub camera_shot: String,
    pub style: String,
    pub sound: String,
}

impl StructuredPrompt {
    /// Flattens the fields into one prompt line ready to paste into the video model.
    pub fn to_prompt_text(&self) -> String {
        format!(
            "{} of {} {} in {}, {}. Ambient sounds of {}.",
            self.camera_shot, self.subject, self.action, self.setting, self.style, self.sound
        )
    }
}

/// A scene's visual prompt: a structured object or a plain string,
/// depending on the generation mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisualPrompt {
    Structured(StructuredPrompt),
    Plain(String),
}

impl VisualPrompt {
    /// Returns the prompt as a single line of text.
    pub fn to_prompt_text(&self) -> String {
        match self {
            VisualPrompt::Structured(p) => p.to_prompt_text(),
            VisualPrompt::Plain(s) => s.clone(),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, VisualPrompt::Structured(_))
    }
}

// =============================================================================
// Scene / Script Result
// =============================================================================

/// One 8-second unit of generated video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene number, starting at 1
    #[serde(rename = "scene")]
    pub scene_number: u32,
    /// Narration / summary text (Vietnamese)
    pub description: String,
    /// Visual generation prompt (English)
    pub prompt: VisualPrompt,
}

/// Normalized generation output.
///
/// Reads `full_voiceover` first and falls back to the `fullVoiceover`,
/// `voiceover` and `loi_dan` spellings, in that order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawScriptResult")]
pub struct ScriptResult {
    /// Continuous narration spanning all scenes (voiceover mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_voiceover: Option<String>,
    /// Scenes in the order the provider returned them
    pub scenes: Vec<Scene>,
}

#[derive(Deserialize)]
struct RawScriptResult {
    #[serde(default)]
    full_voiceover: Option<String>,
    #[serde(default, rename = "fullVoiceover")]
    full_voiceover_camel: Option<String>,
    #[serde(default)]
    voiceover: Option<String>,
    #[serde(default)]
    loi_dan: Option<String>,
    scenes: Vec<Scene>,
}

impl From<RawScriptResult> for ScriptResult {
    fn from(raw: RawScriptResult) -> Self {
        Self {
            full_voiceover: raw
                .full_voiceover
                .or(raw.full_voiceover_camel)
                .or(raw.voiceover)
                .or(raw.loi_dan),
            scenes: raw.scenes,
        }
    }
}

impl ScriptResult {
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Checks that scene numbers run 1, 2, 3, ... without gaps.
    pub fn has_contiguous_numbering(&self) -> bool {
        self.scenes
            .iter()
            .enumerate()
            .all(|(i, s)| s.scene_number as usize == i + 1)
    }
}

// =============================================================================
// Generation Request
// =============================================================================

/// User input for one generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// The "what if" idea
    pub idea: String,
    /// One of [`SCRIPT_TYPES`]
    pub script_type: String,
    /// Free-text duration such as "5 phút" or "90s"
    #[serde(default)]
    pub duration_text: Option<String>,
    /// Target provider
    pub provider: ProviderKind,
}

impl GenerationRequest {
    /// Creates a request with the default script type and no duration
    pub fn new(idea: &str, provider: ProviderKind) -> Self {
        Self {
            idea: idea.to_string(),
            script_type: DEFAULT_SCRIPT_TYPE.to_string(),
            duration_text: None,
            provider,
        }
    }

    /// Sets the script type label
    pub fn with_script_type(mut self, script_type: &str) -> Self {
        self.script_type = script_type.to_string();
        self
    }

    /// Sets the free-text duration
    pub fn with_duration(mut self, duration: &str) -> Self {
        self.duration_text = Some(duration.to_string());
        self
    }

    /// Returns the duration text, treating blank input as "not selected"
    pub fn duration(&self) -> Option<&str> {
        self.duration_text
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Checks the user-supplied fields. Key presence is checked by the gateway.
    pub fn validate(&self) -> CoreResult<()> {
        if self.idea.trim().is_empty() {
            return Err(CoreError::ConfigurationError(
                "Please enter a content idea.".to_string(),
            ));
        }
        if !is_known_script_type(&self.script_type) {
            return Err(CoreError::ConfigurationError(format!(
                "Loại kịch bản không hợp lệ: \"{}\".",
                self.script_type
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn structured_scene(n: u32) -> Scene {
        Scene {
            scene_number: n,
            description: format!("Cảnh {} mô tả", n),
            prompt: VisualPrompt::Structured(StructuredPrompt {
                subject: "A lone astronaut".to_string(),
                action: "walking slowly".to_string(),
                setting: "a desolate alien planet".to_string(),
                camera_shot: "Wide tracking shot".to_string(),
                style: "Hyperrealistic, cinematic lighting".to_string(),
                sound: "wind and distant rumbles".to_string(),
            }),
        }
    }

    #[test]
    fn test_structured_prompt_text() {
        let scene = structured_scene(1);
        assert_eq!(
            scene.prompt.to_prompt_text(),
            "Wide tracking shot of A lone astronaut walking slowly in a desolate alien planet, \
             Hyperrealistic, cinematic lighting. Ambient sounds of wind and distant rumbles."
        );
        assert!(scene.prompt.is_structured());
    }

    #[test]
    fn test_structured_result_round_trip() {
        let result = ScriptResult {
            full_voiceover: None,
            scenes: vec![structured_scene(1), structured_scene(2)],
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("full_voiceover"));
        assert!(json.contains("\"camera_shot\""));
        assert!(json.contains("\"scene\":1"));

        let parsed: ScriptResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_voiceover_result_round_trip() {
        let result = ScriptResult {
            full_voiceover: Some("Nếu như loài người có thể bay...".to_string()),
            scenes: vec![Scene {
                scene_number: 1,
                description: "Mở đầu".to_string(),
                prompt: VisualPrompt::Plain("Aerial shot of a city at dawn".to_string()),
            }],
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"full_voiceover\""));

        let parsed: ScriptResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
        assert!(!parsed.scenes[0].prompt.is_structured());
    }

    #[test]
    fn test_voiceover_alias_keys_accepted() {
        let parsed: ScriptResult = serde_json::from_str(
            r#"{"fullVoiceover":"lời dẫn","scenes":[{"scene":1,"description":"d","prompt":"p"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.full_voiceover.as_deref(), Some("lời dẫn"));
    }

    #[test]
    fn test_voiceover_key_and_alias_together() {
        let parsed: ScriptResult = serde_json::from_str(
            r#"{"loi_dan":"phụ","full_voiceover":"chính","voiceover":"khác","scenes":[]}"#,
        )
        .unwrap();
        assert_eq!(parsed.full_voiceover.as_deref(), Some("chính"));

        let parsed: ScriptResult =
            serde_json::from_str(r#"{"loi_dan":"phụ","voiceover":"khác","scenes":[]}"#).unwrap();
        assert_eq!(parsed.full_voiceover.as_deref(), Some("khác"));
    }

    #[test]
    fn test_contiguous_numbering() {
        let ok = ScriptResult {
            full_voiceover: None,
            scenes: vec![structured_scene(1), structured_scene(2), structured_scene(3)],
        };
        assert!(ok.has_contiguous_numbering());

        let gap = ScriptResult {
            full_voiceover: None,
            scenes: vec![structured_scene(1), structured_scene(3)],
        };
        assert!(!gap.has_contiguous_numbering());
    }

    #[test]
    fn test_request_validation() {
        let request = GenerationRequest::new("   ", ProviderKind::Google);
        assert!(matches!(
            request.validate(),
            Err(CoreError::ConfigurationError(_))
        ));

        let request = GenerationRequest::new("Nếu như khủng long còn sống?", ProviderKind::OpenAI)
            .with_script_type("Không tồn tại");
        assert!(matches!(
            request.validate(),
            Err(CoreError::ConfigurationError(_))
        ));

        let request = GenerationRequest::new("Nếu như khủng long còn sống?", ProviderKind::OpenAI)
            .with_script_type("Tiền sử / Huyền bí")
            .with_duration("5 phút");
        assert!(request.validate().is_ok());
        assert_eq!(request.duration(), Some("5 phút"));
    }

    #[test]
    fn test_blank_duration_is_not_selected() {
        let request = GenerationRequest::new("idea", ProviderKind::Grok).with_duration("  ");
        assert_eq!(request.duration(), None);
    }
}
