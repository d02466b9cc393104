use std::path::Path;

use serde_json::json;
use tracing::info;

use crate::config::ToolConfig;
use crate::error::PipeResult;
use crate::job::{Model, Scale, effective_tile};
use crate::paths::count_frames;
use crate::pipeline::{Stage, StageContext, VideoArtifact};
use crate::runner::{Invocation, Tool};

/// One upscaler run over the whole input frame directory.
pub struct UpscaleStage;

impl Stage for UpscaleStage {
    fn name(&self) -> &'static str {
        "upscale"
    }

    fn run(&self, artifact: &mut VideoArtifact, ctx: &StageContext<'_>) -> PipeResult<()> {
        let job = &artifact.job;
        let invocation = upscale_invocation(
            ctx.tools,
            &artifact.scratch.input_frames,
            &artifact.scratch.output_frames,
            job.model,
            job.scale,
            job.tile_size,
            ctx.tools.upscaler_format.as_deref(),
        );
        ctx.runner.run(&invocation)?;

        let upscaled = count_frames(&artifact.scratch.output_frames)?;
        info!(frames = upscaled, model = %job.model, scale = %job.scale, "Frames upscaled");
        artifact.metadata.insert("upscale.frames".into(), json!(upscaled));
        Ok(())
    }
}

/// `<upscaler> -i <input> -o <output> -n <model> -s <scale> [-t <tile>] [-f <format>]`
///
/// Directories select the upscaler's batch mode, files its single-image mode.
pub fn upscale_invocation(
    tools: &ToolConfig,
    input: &Path,
    output: &Path,
    model: Model,
    scale: Scale,
    tile_size: Option<u32>,
    format: Option<&str>,
) -> Invocation {
    Invocation::new(Tool::Upscaler, &tools.upscaler)
        .arg("-i")
        .arg(input)
        .arg("-o")
        .arg(output)
        .arg("-n")
        .arg(model.as_str())
        .arg("-s")
        .arg(scale.to_string())
        .opt("-t", effective_tile(tile_size).map(|t| t.to_string()))
        .opt("-f", format)
}
