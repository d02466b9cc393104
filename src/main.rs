use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;
use esrgan_pipe::config::{
    DEFAULT_FFMPEG, DEFAULT_FRAME_SUFFIX, DEFAULT_UPSCALER, DEFAULT_VIDEO_ENCODER, ToolConfig,
};
use esrgan_pipe::job::{ImageJob, Model, Scale, VideoJob};
use esrgan_pipe::observability::log_snapshot;
use esrgan_pipe::pipeline::{PipelineExecutor, StageProgress, upscale_image};
use esrgan_pipe::probe::{VideoMetadata, effective_frame_rate, probe_video};
use esrgan_pipe::runner::{SystemRunner, Tool, check_available};
use glob::glob;
use serde::Serialize;
use serde_json::to_writer_pretty;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    let tools = cli.tools.to_config();
    match cli.command {
        Commands::Video(args) => run_video(args, &tools),
        Commands::Image(args) => run_image(args, &tools),
        Commands::Probe { input, json } => run_probe(&input, json, &tools),
        Commands::Doctor => run_doctor(&tools),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "esrgan-pipe", &mut io::stdout());
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(())
}

fn run_video(args: VideoArgs, tools: &ToolConfig) -> Result<()> {
    let inputs = expand_inputs(&args.inputs)?;
    let jobs: Vec<VideoJob> = inputs
        .iter()
        .map(|input| {
            VideoJob::new(input)
                .scale(args.scale)
                .model(args.model)
                .frame_rate(args.frame_rate)
                .fps(args.fps)
                .tile_size(args.tile_size)
                .keep_scratch(args.keep_frames)
                .overwrite(args.overwrite)
        })
        .collect();

    let runner = SystemRunner;
    let executor = PipelineExecutor::new(tools, &runner);
    let metrics = executor.metrics();

    let bar_width = 30usize;
    let progress_render = move |progress: StageProgress<'_>| {
        let total_inputs = progress.total_inputs.max(1);
        let total_stages = progress.total_stages.max(1);
        let total_steps = total_inputs * total_stages;
        let completed_steps = progress
            .input_index
            .saturating_mul(total_stages)
            .saturating_add(progress.stage_index);
        let fraction = (completed_steps as f64 / total_steps as f64).clamp(0.0, 1.0);
        let filled =
            ((fraction * bar_width as f64).round() as isize).clamp(0, bar_width as isize) as usize;
        let empty = bar_width.saturating_sub(filled);
        let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as i32;
        print!(
            "\r{:>3}/{:<3} [{}{}] {:>3}% {:<8}",
            progress.input_index + 1,
            total_inputs,
            "=".repeat(filled),
            " ".repeat(empty),
            percent,
            progress.stage_name
        );
        let _ = io::stdout().flush();
    };

    let outcome = executor.execute_with_progress(&jobs, progress_render);
    println!();

    if args.print_metrics || args.metrics_json.is_some() {
        let snapshot = metrics.snapshot();
        if args.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = &args.metrics_json {
            write_json(path, &snapshot)?;
            info!(metrics = %path.display(), "Metrics JSON written");
        }
    }

    let results = outcome?;
    for result in &results {
        println!("{}", result.output.display());
    }
    Ok(())
}

fn run_image(args: ImageArgs, tools: &ToolConfig) -> Result<()> {
    let inputs = expand_inputs(&args.inputs)?;
    let runner = SystemRunner;
    for input in inputs {
        let job = ImageJob::new(&input, args.scale, args.model).tile_size(args.tile_size);
        let output = upscale_image(&job, tools, &runner)
            .with_context(|| format!("Failed to upscale image {}", input.display()))?;
        println!("{}", output.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    #[serde(flatten)]
    metadata: &'a VideoMetadata,
    frame_rate_rounded: f64,
}

fn run_probe(input: &Path, as_json: bool, tools: &ToolConfig) -> Result<()> {
    let metadata = probe_video(input, tools, &SystemRunner)?;
    let rounded = effective_frame_rate(metadata.frame_rate)?;
    if as_json {
        let report = ProbeReport {
            metadata: &metadata,
            frame_rate_rounded: rounded,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("frame_rate={rounded}");
        match metadata.frame_count {
            Some(count) => println!("frame_count={count}"),
            None => println!("frame_count=unknown"),
        }
        println!("has_audio={}", metadata.has_audio);
    }
    Ok(())
}

fn run_doctor(tools: &ToolConfig) -> Result<()> {
    let checks = [
        (Tool::Ffmpeg, &tools.ffmpeg),
        (Tool::Ffprobe, &tools.ffprobe),
        (Tool::Upscaler, &tools.upscaler),
    ];
    let mut missing = 0usize;
    for (tool, program) in checks {
        if check_available(tool, program) {
            println!("{:<9} ok       {}", tool.as_str(), program.display());
        } else {
            missing += 1;
            println!("{:<9} MISSING  {}", tool.as_str(), program.display());
            error!(tool = tool.as_str(), program = %program.display(), "Tool cannot be started");
        }
    }
    if missing > 0 {
        bail!("{missing} tool(s) unavailable");
    }
    Ok(())
}

/// Expands glob patterns; plain paths pass through untouched so a missing
/// file is reported by the pipeline as not found.
fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();
    for pattern in patterns {
        if Path::new(pattern).exists() || !is_glob(pattern) {
            resolved.push(PathBuf::from(pattern));
            continue;
        }
        let matches = glob(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        let mut found = false;
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                resolved.push(path);
                found = true;
            }
        }
        if !found {
            bail!("No inputs matched pattern: {pattern}");
        }
    }
    Ok(resolved)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    to_writer_pretty(file, value).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "esrgan-pipe",
    version,
    about = "Upscale videos and images with ffmpeg and a Real-ESRGAN executable"
)]
struct Cli {
    #[command(flatten)]
    tools: ToolArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ToolArgs {
    /// ffmpeg executable
    #[arg(long, global = true, value_hint = ValueHint::ExecutablePath)]
    ffmpeg: Option<PathBuf>,
    /// ffprobe executable; defaults to the one beside --ffmpeg
    #[arg(long, global = true, value_hint = ValueHint::ExecutablePath)]
    ffprobe: Option<PathBuf>,
    /// Real-ESRGAN executable
    #[arg(long, global = true, value_hint = ValueHint::ExecutablePath, default_value = DEFAULT_UPSCALER)]
    upscaler: PathBuf,
    #[arg(long = "video-encoder", global = true, default_value = DEFAULT_VIDEO_ENCODER)]
    video_encoder: String,
    /// Suffix the upscaler appends to output frame names ("" keeps names)
    #[arg(long = "frame-suffix", global = true, default_value = DEFAULT_FRAME_SUFFIX)]
    frame_suffix: String,
    /// Output image format passed to the upscaler as -f in video mode
    #[arg(long = "upscaler-format", global = true)]
    upscaler_format: Option<String>,
}

impl ToolArgs {
    fn to_config(&self) -> ToolConfig {
        let mut config = ToolConfig::default();
        config = match &self.ffmpeg {
            Some(ffmpeg) => config.with_ffmpeg(ffmpeg),
            None => config.with_ffmpeg(DEFAULT_FFMPEG),
        };
        if let Some(ffprobe) = &self.ffprobe {
            config = config.with_ffprobe(ffprobe);
        }
        config
            .with_upscaler(&self.upscaler)
            .with_video_encoder(&self.video_encoder)
            .with_frame_suffix(&self.frame_suffix)
            .with_upscaler_format(self.upscaler_format.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upscale one or more videos
    Video(VideoArgs),
    /// Upscale one or more still images
    Image(ImageArgs),
    /// Print the frame rate and frame count of a video
    Probe {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Check that the configured tools can be started
    Doctor,
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct VideoArgs {
    /// Video files or glob patterns
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<String>,
    #[arg(short = 'n', long, value_enum, default_value_t = Model::default())]
    model: Model,
    /// Upscale factor: 2, 3 or 4
    #[arg(short = 's', long, default_value = "2")]
    scale: Scale,
    /// Rate the frame sequence is reassembled at (default: probed rate)
    #[arg(long = "frame-rate")]
    frame_rate: Option<f64>,
    /// Declared rate of the output video (default: --frame-rate)
    #[arg(long)]
    fps: Option<f64>,
    /// Upscaler tile size; 0 leaves it to the upscaler
    #[arg(short = 't', long = "tile-size")]
    tile_size: Option<u32>,
    /// Keep the frame directories after a successful run
    #[arg(long = "keep-frames")]
    keep_frames: bool,
    /// Replace an existing output video
    #[arg(long)]
    overwrite: bool,
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ImageArgs {
    /// Image files or glob patterns
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<String>,
    #[arg(short = 'n', long, value_enum, default_value_t = Model::default())]
    model: Model,
    /// Upscale factor: 2, 3 or 4
    #[arg(short = 's', long, default_value = "2")]
    scale: Scale,
    /// Upscaler tile size; 0 leaves it to the upscaler
    #[arg(short = 't', long = "tile-size")]
    tile_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn video_defaults() {
        let cli = Cli::try_parse_from(["esrgan-pipe", "video", "clip.mp4"]).unwrap();
        let Commands::Video(args) = cli.command else {
            panic!("expected video command");
        };
        assert_eq!(args.scale, Scale::X2);
        assert_eq!(args.model, Model::RealesrAnimeVideoV3);
        assert!(args.frame_rate.is_none());
        assert!(args.fps.is_none());
        let config = cli.tools.to_config();
        assert_eq!(config, ToolConfig::default());
    }

    #[test]
    fn rejects_unknown_scale_and_model() {
        assert!(Cli::try_parse_from(["esrgan-pipe", "video", "a.mp4", "-s", "5"]).is_err());
        assert!(Cli::try_parse_from(["esrgan-pipe", "image", "a.png", "-n", "nope"]).is_err());
    }

    #[test]
    fn tool_flags_build_config() {
        let cli = Cli::try_parse_from([
            "esrgan-pipe",
            "--ffmpeg",
            "/opt/ff/ffmpeg",
            "image",
            "a.png",
            "--upscaler",
            "/opt/esr/realesrgan-ncnn-vulkan",
            "--frame-suffix",
            "",
        ])
        .unwrap();
        let config = cli.tools.to_config();
        assert_eq!(config.ffprobe, PathBuf::from("/opt/ff/ffprobe"));
        assert_eq!(
            config.upscaler,
            PathBuf::from("/opt/esr/realesrgan-ncnn-vulkan")
        );
        assert_eq!(config.frame_suffix, "");
    }

    #[test]
    fn plain_missing_paths_pass_through() {
        let inputs = expand_inputs(&["/definitely/missing.mp4".to_string()]).unwrap();
        assert_eq!(inputs, vec![PathBuf::from("/definitely/missing.mp4")]);
        assert!(expand_inputs(&["/definitely/missing/*.mp4".to_string()]).is_err());
    }
}
