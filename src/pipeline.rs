use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::config::ToolConfig;
use crate::error::{PipeError, PipeResult};
use crate::job::{ImageJob, VideoJob};
use crate::observability::MetricsCollector;
use crate::paths::{self, ScratchDirs};
use crate::probe::{self, VideoMetadata};
use crate::runner::ToolRunner;
use crate::stages::{self, upscale};

/// Working state of one video job as it moves through the stages.
#[derive(Debug)]
pub struct VideoArtifact {
    pub job: VideoJob,
    /// Absolute path of the source video.
    pub source: PathBuf,
    pub scratch: ScratchDirs,
    pub output: PathBuf,
    /// Rate the frame sequence is read back at when encoding.
    pub frame_rate: f64,
    /// Declared rate of the encoded stream.
    pub fps: f64,
    pub probe: VideoMetadata,
    pub metadata: Map<String, Value>,
}

pub struct StageContext<'a> {
    pub tools: &'a ToolConfig,
    pub runner: &'a dyn ToolRunner,
}

pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, artifact: &mut VideoArtifact, ctx: &StageContext<'_>) -> PipeResult<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct StageProgress<'a> {
    pub input_index: usize,
    pub total_inputs: usize,
    pub stage_index: usize,
    pub total_stages: usize,
    pub stage_name: &'a str,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub metadata: Map<String, Value>,
}

/// Runs video jobs one after another, each through extract, upscale and
/// encode. Nothing overlaps: every tool call blocks until the tool exits.
pub struct PipelineExecutor<'a> {
    stages: Vec<Box<dyn Stage>>,
    tools: &'a ToolConfig,
    runner: &'a dyn ToolRunner,
    metrics: MetricsCollector,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(tools: &'a ToolConfig, runner: &'a dyn ToolRunner) -> Self {
        Self::with_stages(stages::default_stages(), tools, runner)
    }

    pub fn with_stages(
        stages: Vec<Box<dyn Stage>>,
        tools: &'a ToolConfig,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            stages,
            tools,
            runner,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Resolves paths and rates, creates the scratch directories and probes
    /// the source. Safe to repeat on a job that was interrupted earlier.
    /// An existing output is refused before any tool runs unless the job
    /// allows overwriting.
    #[instrument(skip(self, job), fields(source = %job.source.display()))]
    pub fn prepare(&self, job: &VideoJob) -> PipeResult<VideoArtifact> {
        if !job.source.exists() {
            return Err(PipeError::NotFound {
                path: job.source.clone(),
            });
        }
        let source = job
            .source
            .canonicalize()
            .map_err(|e| PipeError::io(&job.source, e))?;
        validate_rate("frame rate", job.frame_rate)?;
        validate_rate("fps", job.fps)?;

        let output = paths::output_path(&source, job.scale);
        if !job.overwrite && output.exists() {
            return Err(PipeError::OutputExists { path: output });
        }

        let scratch = ScratchDirs::for_source(&source);
        scratch.create()?;

        let probe = probe::probe_video(&source, self.tools, self.runner)?;
        let frame_rate = match job.frame_rate {
            Some(rate) => rate,
            None => probe::effective_frame_rate(probe.frame_rate)?,
        };
        let fps = job.fps.unwrap_or(frame_rate);

        let mut metadata = Map::new();
        metadata.insert(
            "source".into(),
            Value::String(source.to_string_lossy().into_owned()),
        );
        metadata.insert("scale".into(), json!(job.scale));
        metadata.insert("model".into(), json!(job.model));
        metadata.insert("frame_rate".into(), json!(frame_rate));
        metadata.insert("fps".into(), json!(fps));
        metadata.insert("probe.frame_count".into(), json!(probe.frame_count));

        Ok(VideoArtifact {
            job: job.clone(),
            source,
            scratch,
            output,
            frame_rate,
            fps,
            probe,
            metadata,
        })
    }

    /// Runs every stage in order; the first failure stops the job and leaves
    /// the scratch directories as they are.
    pub fn process<F>(
        &self,
        artifact: &mut VideoArtifact,
        input_index: usize,
        total_inputs: usize,
        progress: &mut F,
    ) -> PipeResult<()>
    where
        F: FnMut(StageProgress<'_>),
    {
        let ctx = StageContext {
            tools: self.tools,
            runner: self.runner,
        };
        for (stage_index, stage) in self.stages.iter().enumerate() {
            progress(StageProgress {
                input_index,
                total_inputs,
                stage_index,
                total_stages: self.stages.len(),
                stage_name: stage.name(),
            });
            let span = tracing::span!(tracing::Level::INFO, "stage", stage = stage.name());
            let _span_guard = span.enter();
            let timer = self.metrics.start_stage(stage.name());
            stage.run(artifact, &ctx)?;
            timer.finish();
        }
        progress(StageProgress {
            input_index,
            total_inputs,
            stage_index: self.stages.len(),
            total_stages: self.stages.len(),
            stage_name: "done",
        });
        Ok(())
    }

    pub fn run_job<F>(
        &self,
        job: &VideoJob,
        input_index: usize,
        total_inputs: usize,
        progress: &mut F,
    ) -> PipeResult<PipelineResult>
    where
        F: FnMut(StageProgress<'_>),
    {
        let span = tracing::span!(tracing::Level::INFO, "job", input = %job.source.display());
        let _guard = span.enter();

        let mut artifact = self.prepare(job)?;
        if let Err(err) = self.process(&mut artifact, input_index, total_inputs, progress) {
            warn!(
                input_frames = %artifact.scratch.input_frames.display(),
                output_frames = %artifact.scratch.output_frames.display(),
                "Job failed; scratch directories kept for inspection"
            );
            return Err(err);
        }

        if artifact.job.keep_scratch {
            info!("Keeping scratch directories");
        } else {
            artifact.scratch.remove()?;
        }
        artifact
            .metadata
            .insert("scratch.kept".into(), json!(artifact.job.keep_scratch));

        info!(output = %artifact.output.display(), "Video upscaled");
        Ok(PipelineResult {
            input: job.source.clone(),
            output: artifact.output,
            metadata: artifact.metadata,
        })
    }

    pub fn execute(&self, jobs: &[VideoJob]) -> PipeResult<Vec<PipelineResult>> {
        self.execute_with_progress(jobs, |_| {})
    }

    /// Runs the jobs in order and stops at the first failure.
    pub fn execute_with_progress<F>(
        &self,
        jobs: &[VideoJob],
        mut progress: F,
    ) -> PipeResult<Vec<PipelineResult>>
    where
        F: FnMut(StageProgress<'_>),
    {
        self.metrics.reset();
        let total_start = Instant::now();
        let mut results = Vec::with_capacity(jobs.len());
        for (idx, job) in jobs.iter().enumerate() {
            match self.run_job(job, idx, jobs.len(), &mut progress) {
                Ok(result) => {
                    self.metrics.record_job_success();
                    results.push(result);
                }
                Err(err) => {
                    self.metrics.record_job_failure();
                    self.metrics.record_total_duration(total_start.elapsed());
                    return Err(err);
                }
            }
        }
        self.metrics.record_total_duration(total_start.elapsed());
        Ok(results)
    }
}

fn validate_rate(label: &str, rate: Option<f64>) -> PipeResult<()> {
    match rate {
        Some(r) if !(r.is_finite() && r > 0.0) => Err(PipeError::InvalidArgument(format!(
            "{label} must be a positive number, got {r}"
        ))),
        _ => Ok(()),
    }
}

/// Upscales a single still image to `<stem>_X<scale>.<ext>` beside it.
#[instrument(skip(tools, runner), fields(source = %job.source.display()))]
pub fn upscale_image(
    job: &ImageJob,
    tools: &ToolConfig,
    runner: &dyn ToolRunner,
) -> PipeResult<PathBuf> {
    if !job.source.exists() {
        return Err(PipeError::NotFound {
            path: job.source.clone(),
        });
    }
    let output = paths::output_path(&job.source, job.scale);
    let invocation = upscale::upscale_invocation(
        tools,
        &job.source,
        &output,
        job.model,
        job.scale,
        job.tile_size,
        None,
    );
    runner.run(&invocation)?;
    info!(output = %output.display(), "Image upscaled");
    Ok(output)
}

/// Formats a rate the way ffmpeg accepts it (`60`, `29.97`).
pub fn format_rate(rate: f64) -> String {
    format!("{rate}")
}

pub(crate) fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
