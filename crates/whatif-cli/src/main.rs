//! WhatIf CLI
//!
//! Generates what-if video scripts from the terminal and manages the
//! provider keys and settings shared with the library.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use whatif_lib::core::ai::{GenerationMode, PromptTemplate, ProviderKind, ScriptGateway};
use whatif_lib::core::credentials::{redact, CredentialVault, VAULT_FILE_NAME};
use whatif_lib::core::fs::app_data_dir;
use whatif_lib::core::script::{
    ExportedFiles, GenerationRequest, ScriptResult, DURATION_OPTIONS, SCRIPT_TYPES,
};
use whatif_lib::core::settings::{SettingsManager, TIMEOUT_RANGE_SECS};
use whatif_lib::{init_logging, ScriptSession};

#[derive(Debug, Parser)]
#[command(name = "whatif-cli", version)]
#[command(about = "What-if story scripts and video prompts from LLM providers")]
struct Cli {
    /// Directory for settings, the key vault and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log at debug level on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a script from an idea
    Generate(GenerateArgs),
    /// Manage provider API keys
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// List providers, script types, modes and duration presets
    Options,
    /// Show, change or reset saved settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// The "what if" idea
    #[arg(short, long)]
    idea: String,

    /// Script type label (see `options`)
    #[arg(short = 't', long)]
    script_type: Option<String>,

    /// Target duration, e.g. "5 phút", "90s", "1 min 30 sec"
    #[arg(short, long)]
    duration: Option<String>,

    /// google, openai, grok or deepseek
    #[arg(short, long)]
    provider: Option<ProviderKind>,

    /// structured or voiceover
    #[arg(short, long)]
    mode: Option<GenerationMode>,

    /// Write the export files into this directory
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Skip export even when an output directory is configured
    #[arg(long, conflicts_with = "out_dir")]
    no_export: bool,

    /// Replace the built-in system instruction with this file's contents
    #[arg(long)]
    instruction_file: Option<PathBuf>,

    /// Reject results with the wrong scene count or numbering
    #[arg(long)]
    strict: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum ProfileAction {
    /// Store a key. Reads it from stdin when omitted.
    Set {
        provider: ProviderKind,
        key: Option<String>,
    },
    /// Show which providers have a key
    Show,
    /// Remove a stored key
    Delete { provider: ProviderKind },
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Change saved defaults
    Set(SettingsSetArgs),
    /// Delete the settings file
    Reset,
}

#[derive(Debug, Args)]
struct SettingsSetArgs {
    #[arg(long)]
    provider: Option<ProviderKind>,
    #[arg(long)]
    mode: Option<GenerationMode>,
    #[arg(long)]
    script_type: Option<String>,
    #[arg(long)]
    duration: Option<String>,
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    strict: Option<bool>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

/// A generation that failed with an already-classified message
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct GenerationFailed {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateOutput<'a> {
    provider: ProviderKind,
    mode: GenerationMode,
    result: &'a ScriptResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    exported: Option<&'a ExportedFiles>,
}

struct AppContext {
    data_dir: PathBuf,
}

impl AppContext {
    fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.unwrap_or_else(app_data_dir),
        }
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    fn settings(&self) -> SettingsManager {
        SettingsManager::new(&self.data_dir)
    }

    fn vault(&self) -> Result<CredentialVault> {
        CredentialVault::new(self.data_dir.join(VAULT_FILE_NAME))
            .context("Failed to open the API key vault")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = AppContext::new(cli.data_dir);

    init_logging(&ctx.log_dir(), if cli.verbose { "debug" } else { "warn" });

    match cli.command {
        Commands::Generate(args) => run_generate(&ctx, args).await,
        Commands::Profile { action } => run_profile(&ctx, action).await,
        Commands::Options => {
            print_options();
            Ok(())
        }
        Commands::Settings { action } => run_settings(&ctx, action),
    }
}

async fn run_generate(ctx: &AppContext, args: GenerateArgs) -> Result<()> {
    let settings = ctx.settings().load();
    let defaults = &settings.generation;

    let provider = args.provider.unwrap_or(defaults.default_provider);
    let mode = args.mode.unwrap_or(defaults.mode);
    let script_type = args
        .script_type
        .unwrap_or_else(|| defaults.script_type.clone());
    let duration = args.duration.or_else(|| defaults.default_duration.clone());

    let mut config = settings.gateway_config();
    if let Some(secs) = args.timeout {
        let (min, max) = TIMEOUT_RANGE_SECS;
        config = config.with_timeout_secs(secs.clamp(min, max));
    }
    if args.strict {
        config = config.with_strict_validation(true);
    }

    let mut template = PromptTemplate::for_mode(mode);
    if let Some(path) = &args.instruction_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instruction file {}", path.display()))?;
        template = template.with_system_instruction(&text);
    }

    let api_keys = ctx.vault()?.load_key_set().await;
    let session = ScriptSession::new(ScriptGateway::with_http(config)?, api_keys);

    let mut request = GenerationRequest::new(&args.idea, provider).with_script_type(&script_type);
    if let Some(duration) = &duration {
        request = request.with_duration(duration);
    }

    tracing::debug!(%provider, %mode, script_type = %script_type, "Starting generation");
    if !args.json {
        eprintln!(
            "AI đang viết kịch bản với {}...",
            provider.display_name()
        );
    }

    let result = match session.generate(&request, &template).await {
        Ok(result) => result,
        Err(e) => {
            if args.json {
                let payload = serde_json::json!({ "error": e.error.kind(), "message": e.message });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            return Err(GenerationFailed { message: e.message }.into());
        }
    };

    let out_dir = if args.no_export {
        None
    } else {
        args.out_dir.or(settings.output.output_dir)
    };
    let exported = match &out_dir {
        Some(dir) => Some(session.export_last(dir).await?),
        None => None,
    };

    if args.json {
        let output = GenerateOutput {
            provider,
            mode,
            result: &result,
            exported: exported.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_script(&result);
        if let Some(files) = &exported {
            print_exported(files);
        }
    }

    Ok(())
}

fn print_script(result: &ScriptResult) {
    if let Some(voiceover) = result.full_voiceover.as_deref() {
        println!("=== LỜI DẪN ===\n{}\n", voiceover);
    }

    println!("=== {} CẢNH ===", result.scene_count());
    for scene in &result.scenes {
        println!("\nSCENE {}:", scene.scene_number);
        println!("  {}", scene.description);
        println!("  Prompt: {}", scene.prompt.to_prompt_text());
    }
}

fn print_exported(files: &ExportedFiles) {
    println!();
    for path in [files.prompts.as_deref(), files.voiceover.as_deref()]
        .into_iter()
        .flatten()
        .chain(std::iter::once(files.script.as_path()))
    {
        println!("Wrote {}", path.display());
    }
}

async fn run_profile(ctx: &AppContext, action: ProfileAction) -> Result<()> {
    let vault = ctx.vault()?;

    match action {
        ProfileAction::Set { provider, key } => {
            let key = match key {
                Some(key) => key,
                None => read_key_from_stdin(provider)?,
            };
            vault
                .store(provider, &key)
                .await
                .with_context(|| format!("Failed to store {} key", provider.display_name()))?;
            println!("Saved {} API key.", provider.display_name());
        }
        ProfileAction::Show => {
            for provider in ProviderKind::ALL {
                let status = match vault.retrieve(provider).await {
                    Ok(key) => format!("configured ({})", redact(&key)),
                    Err(_) => "not set".to_string(),
                };
                println!("{:<16} {:<16} {}", provider.display_name(), provider.vault_key(), status);
            }
            println!("\nVault: {}", vault.path().display());
        }
        ProfileAction::Delete { provider } => {
            vault.delete(provider).await?;
            println!("Removed {} API key.", provider.display_name());
        }
    }

    Ok(())
}

fn read_key_from_stdin(provider: ProviderKind) -> Result<String> {
    eprintln!("Paste the {} API key and press Enter:", provider.display_name());
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read key from stdin")?;
    Ok(line.trim().to_string())
}

fn print_options() {
    println!("Providers:");
    for provider in ProviderKind::ALL {
        let spec = provider.spec();
        println!("  {:<10} {:<16} {}", provider, spec.display_name, spec.model);
    }

    println!("\nScript types:");
    for script_type in SCRIPT_TYPES {
        println!("  {}", script_type);
    }

    println!("\nModes:");
    println!("  {:<12} per-scene narration + structured prompt", GenerationMode::StructuredPrompt);
    println!(
        "  {:<12} continuous voiceover + plain prompt",
        GenerationMode::VoiceoverWithPlainPrompt
    );

    println!("\nDuration presets:");
    println!("  {}", DURATION_OPTIONS.join(", "));
}

fn run_settings(ctx: &AppContext, action: SettingsAction) -> Result<()> {
    let manager = ctx.settings();

    match action {
        SettingsAction::Show => {
            let settings = manager.load();
            println!("{}", serde_json::to_string_pretty(&settings)?);
            println!("\n{}", manager.settings_path().display());
        }
        SettingsAction::Set(args) => {
            let mut settings = manager.load();
            apply_settings(&mut settings.generation, &mut settings.output.output_dir, args);
            let saved = manager.save(&settings)?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        SettingsAction::Reset => {
            manager.reset()?;
            println!("Settings reset to defaults.");
        }
    }

    Ok(())
}

fn apply_settings(
    generation: &mut whatif_lib::core::settings::GenerationSettings,
    output_dir: &mut Option<PathBuf>,
    args: SettingsSetArgs,
) {
    if let Some(provider) = args.provider {
        generation.default_provider = provider;
    }
    if let Some(mode) = args.mode {
        generation.mode = mode;
    }
    if let Some(script_type) = args.script_type {
        generation.script_type = script_type;
    }
    if let Some(duration) = args.duration {
        generation.default_duration = Some(duration);
    }
    if let Some(timeout) = args.timeout {
        generation.timeout_secs = timeout;
    }
    if let Some(strict) = args.strict {
        generation.strict_validation = strict;
    }
    if let Some(dir) = args.out_dir {
        *output_dir = Some(absolute(&dir));
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
