//! Prompt Templates
//!
//! Instruction text, format suffix and response schema for each generation
//! mode, plus the per-request user prompt.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::script::GenerationRequest;

// =============================================================================
// Generation Mode
// =============================================================================

/// Output shape requested from the model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Per-scene Vietnamese description plus a structured English prompt object
    #[default]
    StructuredPrompt,
    /// One continuous voiceover plus a plain English prompt string per scene
    VoiceoverWithPlainPrompt,
}

impl GenerationMode {
    /// Whether the result must carry `full_voiceover`
    pub fn requires_voiceover(self) -> bool {
        matches!(self, GenerationMode::VoiceoverWithPlainPrompt)
    }

    /// Gemini response schema for this mode
    pub fn response_schema(self) -> Value {
        match self {
            GenerationMode::StructuredPrompt => structured_schema(),
            GenerationMode::VoiceoverWithPlainPrompt => voiceover_schema(),
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::StructuredPrompt => write!(f, "structured"),
            GenerationMode::VoiceoverWithPlainPrompt => write!(f, "voiceover"),
        }
    }
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" | "structured_prompt" => Ok(GenerationMode::StructuredPrompt),
            "voiceover" | "voiceover_with_plain_prompt" => {
                Ok(GenerationMode::VoiceoverWithPlainPrompt)
            }
            _ => Err(format!("Unknown generation mode: {}", s)),
        }
    }
}

// =============================================================================
// Instruction Text
// =============================================================================

const STRUCTURED_INSTRUCTION: &str = r#"**CRITICAL TASK: HYPOTHETICAL SCRIPT AND VEO 3.1 PROMPT GENERATION (JSON ONLY)**

You are a playwright, a historian and a traveler through alternate realities. You receive a "What If...?" idea and turn it into a scene-by-scene, documentary-style video script that keeps asking "what if" and answers through the scenes.

**RULE 1: SCENE COUNT**
- When the request states "Total Scenes to Generate: N", output EXACTLY N scenes. Each scene is an 8-second video clip.

**RULE 2: ENGLISH-ONLY STRUCTURED PROMPTS (VISUALS ONLY)**
- The 'prompt' field is a JSON object for the VEO 3.1 video model with six keys: `subject`, `action`, `setting`, `camera_shot`, `style`, `sound`.
- Every value in 'prompt' MUST be in ENGLISH.
- Values describe visuals, camera work and ambient sound ONLY. No dialogue, no narration, no on-screen text, no written words.

**RULE 3: JSON OUTPUT**
- Output one raw JSON object and nothing else. No markdown fences, no commentary.
- The root object has a single key "scenes" holding an array.
- Each scene has exactly three keys:
    1. "scene" (integer): the scene number, starting at 1 and increasing by 1.
    2. "description" (string): the detailed narration for the scene, in VIETNAMESE.
    3. "prompt" (object): the structured visual prompt, in ENGLISH, following RULE 2.

**SELF-CHECK BEFORE ANSWERING**
1. The scene count matches the requested number.
2. Every 'prompt' is an object with the six keys, written in English.
3. Every 'description' is written in Vietnamese.
4. No prompt contains dialogue or text.
5. The whole output is one valid JSON object."#;

const STRUCTURED_FORMAT_SUFFIX: &str = r#"**OUTPUT FORMAT (CRITICAL):**
Your final output must be a single, valid JSON object with one key: "scenes". The value of "scenes" must be an array of objects. Each scene object must contain 'scene', 'description', and 'prompt' keys as described in the main instructions."#;

const VOICEOVER_INSTRUCTION: &str = r#"**CRITICAL TASK: HYPOTHETICAL VOICEOVER SCRIPT AND VEO 3.1 PROMPT GENERATION (JSON ONLY)**

You are a playwright, a historian and a traveler through alternate realities. You receive a "What If...?" idea and turn it into a continuous documentary-style narration with matching video scenes.

**RULE 1: SCENE COUNT**
- When the request states "Total Scenes to Generate: N", output EXACTLY N scenes. Each scene is an 8-second video clip.

**RULE 2: ONE CONTINUOUS VOICEOVER**
- "full_voiceover" is the complete narration for the whole video, in VIETNAMESE, written to be read aloud without breaks between scenes.

**RULE 3: ENGLISH-ONLY PLAIN PROMPTS (VISUALS ONLY)**
- Each scene's "prompt" is a single English string for the VEO 3.1 video model: shot type, subject, action, setting, visual style and ambient sound.
- No dialogue, no narration, no on-screen text, no written words.

**RULE 4: JSON OUTPUT**
- Output one raw JSON object and nothing else. No markdown fences, no commentary.
- The root object has two keys: "full_voiceover" (string) and "scenes" (array).
- Each scene has exactly three keys:
    1. "scene" (integer): the scene number, starting at 1 and increasing by 1.
    2. "description" (string): a short VIETNAMESE summary of the part of the voiceover this scene covers.
    3. "prompt" (string): the English visual prompt, following RULE 3."#;

const VOICEOVER_FORMAT_SUFFIX: &str = r#"**OUTPUT FORMAT (CRITICAL):**
Your final output must be a single, valid JSON object with two keys: "full_voiceover" (a string) and "scenes" (an array of objects). Each scene object must contain 'scene', 'description', and 'prompt' keys, where 'prompt' is a plain English string."#;

// =============================================================================
// Response Schemas
// =============================================================================

fn scene_number_schema() -> Value {
    json!({ "type": "INTEGER", "description": "The scene number, starting from 1." })
}

fn structured_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "scenes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "scene": scene_number_schema(),
                        "description": {
                            "type": "STRING",
                            "description": "The detailed narration for the scene, written in Vietnamese, in a hypothetical 'what if' style."
                        },
                        "prompt": {
                            "type": "OBJECT",
                            "description": "A structured visual prompt for the VEO 3.1 model. English only. No text or dialogue.",
                            "properties": {
                                "subject": { "type": "STRING", "description": "The main subject(s) of the scene. E.g., 'A lone astronaut'." },
                                "action": { "type": "STRING", "description": "What the subject is doing. E.g., 'walking across a desolate alien plain'." },
                                "setting": { "type": "STRING", "description": "The environment or background. E.g., 'Rain-slicked neon streets at night'." },
                                "camera_shot": { "type": "STRING", "description": "Camera angle, movement or shot type. E.g., 'Cinematic aerial drone shot'." },
                                "style": { "type": "STRING", "description": "Overall visual style. E.g., 'Hyperrealistic, dramatic cinematic lighting'." },
                                "sound": { "type": "STRING", "description": "Ambient environmental sounds only. E.g., 'Distant sirens and humming machinery'." }
                            },
                            "required": ["subject", "action", "setting", "camera_shot", "style", "sound"]
                        }
                    },
                    "required": ["scene", "description", "prompt"]
                }
            }
        },
        "required": ["scenes"]
    })
}

fn voiceover_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "full_voiceover": {
                "type": "STRING",
                "description": "The complete continuous narration for the whole video, written in Vietnamese."
            },
            "scenes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "scene": scene_number_schema(),
                        "description": {
                            "type": "STRING",
                            "description": "A short Vietnamese summary of the narration this scene covers."
                        },
                        "prompt": {
                            "type": "STRING",
                            "description": "A single English visual prompt for the VEO 3.1 model. No text or dialogue."
                        }
                    },
                    "required": ["scene", "description", "prompt"]
                }
            }
        },
        "required": ["full_voiceover", "scenes"]
    })
}

// =============================================================================
// Prompt Template
// =============================================================================

/// Instruction set used for one generation
#[derive(Clone, Debug, PartialEq)]
pub struct PromptTemplate {
    pub mode: GenerationMode,
    /// System instruction sent to every provider
    pub system_instruction: String,
    /// Appended to the system instruction for OpenAI-compatible providers
    pub format_suffix: String,
    /// Response schema for providers that enforce one
    pub response_schema: Value,
}

impl PromptTemplate {
    /// Built-in template for a mode
    pub fn for_mode(mode: GenerationMode) -> Self {
        let (instruction, suffix) = match mode {
            GenerationMode::StructuredPrompt => (STRUCTURED_INSTRUCTION, STRUCTURED_FORMAT_SUFFIX),
            GenerationMode::VoiceoverWithPlainPrompt => {
                (VOICEOVER_INSTRUCTION, VOICEOVER_FORMAT_SUFFIX)
            }
        };

        Self {
            mode,
            system_instruction: instruction.to_string(),
            format_suffix: suffix.to_string(),
            response_schema: mode.response_schema(),
        }
    }

    /// Replaces the system instruction, keeping the mode's suffix and schema
    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.system_instruction = instruction.to_string();
        self
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_mode(GenerationMode::default())
    }
}

// =============================================================================
// User Prompt
// =============================================================================

/// Scene budget derived from the requested duration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneTarget {
    pub total_seconds: u64,
    pub scene_count: u32,
}

/// Builds the user message for a request.
pub fn build_user_prompt(request: &GenerationRequest, target: Option<SceneTarget>) -> String {
    let mut prompt = format!(
        "Generate a script and video prompts based on these details:\n\n- Idea: \"{}\"\n- Script Type: \"{}\"",
        request.idea.trim(),
        request.script_type
    );

    if let Some(target) = target {
        prompt.push_str(&format!(
            "\n- Video Duration: {} seconds\n- Total Scenes to Generate: {}\n\nMOST IMPORTANT INSTRUCTION: You MUST generate EXACTLY {} scenes, one per 8-second clip.",
            target.total_seconds, target.scene_count, target.scene_count
        ));
    }

    prompt
}
