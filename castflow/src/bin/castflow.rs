//! Command-line driver: runs the pipeline against a live backend.

use anyhow::{Context, Result};
use castflow::auth::AuthorizationState;
use castflow::backend::HttpTaskBackend;
use castflow::catalog::{PixelType, StageId, StageParams};
use castflow::config::CoordinatorConfig;
use castflow::events::LoggingEventSink;
use castflow::observability::init_tracing;
use castflow::workflow::{AutoMode, WorkflowCoordinator, WorkflowStepInfo};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Start {
    ParseLink,
    Rewrite,
    Voice,
    Video,
    Publish,
}

impl From<Start> for StageId {
    fn from(start: Start) -> Self {
        match start {
            Start::ParseLink => Self::ParseLink,
            Start::Rewrite => Self::RewriteScript,
            Start::Voice => Self::SynthesizeVoice,
            Start::Video => Self::SynthesizeVideo,
            Start::Publish => Self::Publish,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Only the start stage
    Single,
    /// Through video synthesis
    Synthesis,
    /// Through publishing
    Publish,
}

#[derive(Parser, Debug)]
#[command(name = "castflow", version, about = "Run the link-to-publish video pipeline")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, env = "CASTFLOW_API_BASE")]
    api_base: Option<String>,

    /// Stage to start from
    #[arg(short, long, value_enum, default_value = "parse-link")]
    start: Start,

    /// How far to run
    #[arg(short, long, value_enum, default_value = "single")]
    mode: Mode,

    /// Share link to parse
    #[arg(long)]
    link: Option<String>,

    /// Script text for the start stage (rewrite, or voice when starting there)
    #[arg(long)]
    content: Option<String>,

    /// Rewrite style
    #[arg(long)]
    styles: Option<String>,

    /// Rewrite tone
    #[arg(long)]
    tone: Option<String>,

    /// Extra rewrite instructions
    #[arg(long)]
    extra_instructions: Option<String>,

    /// Reference voice resource id
    #[arg(long)]
    voice_resource_id: Option<i64>,

    /// Emotion prompt for voice synthesis
    #[arg(long)]
    emotion: Option<String>,

    /// Narration audio resource id, when starting at video synthesis
    #[arg(long)]
    audio_resource_id: Option<i64>,

    /// Source video resource id
    #[arg(long)]
    video_resource_id: Option<i64>,

    /// Output ratio (P9_16, RATIO_16_9, RATIO_1_1)
    #[arg(long)]
    pixel_type: Option<PixelType>,

    /// Video path, when starting at publish
    #[arg(long)]
    video_path: Option<String>,

    /// Publish title
    #[arg(long)]
    title: Option<String>,

    /// Publish description
    #[arg(long)]
    description: Option<String>,

    /// The publishing account has been authorized
    #[arg(long)]
    authorized: bool,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn load_config(&self) -> Result<CoordinatorConfig> {
        let mut config = match &self.config {
            Some(path) => CoordinatorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => CoordinatorConfig::new(),
        }
        .with_env_overrides()?;
        if let Some(base) = &self.api_base {
            config.backend = config.backend.with_base_url(base.clone());
        }
        if self.json_logs {
            config.log.json = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn fill_forms(&self, coordinator: &WorkflowCoordinator) {
        let voice_content = matches!(self.start, Start::Voice);
        coordinator.edit_params(StageId::ParseLink, |params| {
            if let (StageParams::ParseLink(p), Some(link)) = (params, &self.link) {
                p.link.clone_from(link);
            }
        });
        coordinator.edit_params(StageId::RewriteScript, |params| {
            if let StageParams::RewriteScript(p) = params {
                if !voice_content {
                    set(&mut p.content, self.content.as_ref());
                }
                set(&mut p.styles, self.styles.as_ref());
                set(&mut p.tone, self.tone.as_ref());
                set(&mut p.extra_instructions, self.extra_instructions.as_ref());
            }
        });
        coordinator.edit_params(StageId::SynthesizeVoice, |params| {
            if let StageParams::SynthesizeVoice(p) = params {
                p.audio_resource_id = self.voice_resource_id.or(p.audio_resource_id);
                if voice_content {
                    set(&mut p.content, self.content.as_ref());
                }
                set(&mut p.emotion_text, self.emotion.as_ref());
            }
        });
        coordinator.edit_params(StageId::SynthesizeVideo, |params| {
            if let StageParams::SynthesizeVideo(p) = params {
                p.audio_resource_id = self.audio_resource_id.or(p.audio_resource_id);
                p.video_resource_id = self.video_resource_id.or(p.video_resource_id);
                p.pixel_type = self.pixel_type.unwrap_or(p.pixel_type);
            }
        });
        coordinator.edit_params(StageId::Publish, |params| {
            if let StageParams::Publish(p) = params {
                set(&mut p.video_path, self.video_path.as_ref());
                p.title = self.title.clone().or_else(|| p.title.take());
                p.description = self.description.clone().or_else(|| p.description.take());
            }
        });
    }
}

fn set(field: &mut String, value: Option<&String>) {
    if let Some(value) = value {
        field.clone_from(value);
    }
}

fn print_steps(steps: &[WorkflowStepInfo]) {
    println!("{:<18} {:<8} DETAIL", "STAGE", "STATUS");
    for step in steps {
        let detail = step
            .error
            .clone()
            .or_else(|| step.result.as_ref().map(|r| r.raw_payload.clone()))
            .unwrap_or_default();
        println!(
            "{:<18} {:<8} {}",
            step.name,
            format!("{:?}", step.status),
            detail
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_tracing(&config.log)?;

    let backend = Arc::new(HttpTaskBackend::new(config.backend.clone())?);
    let auth = Arc::new(AuthorizationState::new());
    if args.authorized {
        auth.mark_authorized();
    }
    let coordinator = Arc::new(
        WorkflowCoordinator::new(config, backend, auth)
            .with_event_sink(Arc::new(LoggingEventSink::default())),
    );
    args.fill_forms(&coordinator);
    coordinator.select_stage(args.start.into());

    let interrupt = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel("interrupted");
        }
    });

    let result = match args.mode {
        Mode::Single => coordinator.run_single_step().await,
        Mode::Synthesis => coordinator.run_auto(AutoMode::ToSynthesis).await,
        Mode::Publish => coordinator.run_auto(AutoMode::ToPublish).await,
    };
    print_steps(&coordinator.steps());

    let report = result?;
    println!(
        "\nrun {} (main task {}): {} stage(s) completed{}",
        report.run_id,
        report.main_task_id,
        report.completed.len(),
        if report.stopped { ", stopped" } else { "" }
    );
    Ok(())
}
