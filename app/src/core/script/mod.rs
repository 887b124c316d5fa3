//! Script Module
//!
//! Data model for generated story scripts, duration parsing and file export.

pub mod duration;
pub mod export;
pub mod models;

pub use duration::{parse_duration_to_seconds, scenes_for, MAX_DURATION_SECS, SCENE_DURATION_SECS};
pub use export::{export_script, render_prompts, ExportedFiles};
pub use models::{
    is_known_script_type, GenerationRequest, Scene, ScriptResult, StructuredPrompt, VisualPrompt,
    DEFAULT_SCRIPT_TYPE, DURATION_OPTIONS, SCRIPT_TYPES,
};
