//! Script export
//!
//! Renders a [`ScriptResult`] into the three downloadable artifacts and writes
//! them atomically into an output directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::models::ScriptResult;
use crate::core::fs::{atomic_write_json_pretty, atomic_write_text, prepare_output_dir};
use crate::core::CoreResult;

pub const PROMPTS_FILE: &str = "generated_prompts.txt";
pub const VOICEOVER_FILE: &str = "generated_voiceover.txt";
pub const SCRIPT_FILE: &str = "generated_script.json";

/// Paths of the files written by [`export_script`].
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFiles {
    pub prompts: Option<PathBuf>,
    pub voiceover: Option<PathBuf>,
    pub script: PathBuf,
}

/// One `SCENE N:` block per scene, each followed by a blank line.
pub fn render_prompts(result: &ScriptResult) -> String {
    result
        .scenes
        .iter()
        .map(|scene| {
            format!(
                "SCENE {}:\n{}\n\n",
                scene.scene_number,
                scene.prompt.to_prompt_text()
            )
        })
        .collect()
}

/// Writes the prompts file, the voiceover file (when present) and the script JSON.
pub fn export_script(result: &ScriptResult, output_dir: &Path) -> CoreResult<ExportedFiles> {
    let dir = prepare_output_dir(output_dir)?;

    let mut exported = ExportedFiles {
        script: dir.join(SCRIPT_FILE),
        ..Default::default()
    };

    if !result.scenes.is_empty() {
        let path = dir.join(PROMPTS_FILE);
        atomic_write_text(&path, &render_prompts(result))?;
        exported.prompts = Some(path);
    }

    if let Some(voiceover) = result
        .full_voiceover
        .as_deref()
        .filter(|v| !v.trim().is_empty())
    {
        let path = dir.join(VOICEOVER_FILE);
        atomic_write_text(&path, voiceover)?;
        exported.voiceover = Some(path);
    }

    atomic_write_json_pretty(&exported.script, result)?;

    info!(
        "Exported script with {} scenes to {}",
        result.scene_count(),
        dir.display()
    );

    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::models::{Scene, VisualPrompt};
    use tempfile::TempDir;

    fn plain_result(voiceover: Option<&str>) -> ScriptResult {
        ScriptResult {
            full_voiceover: voiceover.map(str::to_string),
            scenes: vec![
                Scene {
                    scene_number: 1,
                    description: "Mở đầu".to_string(),
                    prompt: VisualPrompt::Plain("Aerial shot of a flooded city".to_string()),
                },
                Scene {
                    scene_number: 2,
                    description: "Kết".to_string(),
                    prompt: VisualPrompt::Plain("Close-up of rain on glass".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_render_prompts_blocks() {
        let text = render_prompts(&plain_result(None));
        assert_eq!(
            text,
            "SCENE 1:\nAerial shot of a flooded city\n\nSCENE 2:\nClose-up of rain on glass\n\n"
        );
    }

    #[test]
    fn test_export_writes_all_artifacts() {
        let temp = TempDir::new().unwrap();
        let result = plain_result(Some("Nếu như nước biển dâng..."));

        let files = export_script(&result, temp.path()).unwrap();

        let voiceover = std::fs::read_to_string(files.voiceover.unwrap()).unwrap();
        assert_eq!(voiceover, "Nếu như nước biển dâng...");

        let prompts = std::fs::read_to_string(files.prompts.unwrap()).unwrap();
        assert!(prompts.starts_with("SCENE 1:\n"));

        let script: ScriptResult =
            serde_json::from_str(&std::fs::read_to_string(&files.script).unwrap()).unwrap();
        assert_eq!(script, result);
    }

    #[test]
    fn test_export_skips_missing_voiceover() {
        let temp = TempDir::new().unwrap();
        let files = export_script(&plain_result(None), temp.path()).unwrap();

        assert!(files.voiceover.is_none());
        assert!(!temp.path().join(VOICEOVER_FILE).exists());
        assert!(files.script.exists());
    }
}
