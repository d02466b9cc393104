use serde_json::json;
use tracing::{info, warn};

use crate::error::PipeResult;
use crate::paths::{count_frames, output_frame_pattern};
use crate::pipeline::{Stage, StageContext, VideoArtifact, format_rate, path_value};
use crate::runner::{Invocation, Tool};

/// Reassembles the upscaled frames and muxes the source audio back in
/// without re-encoding it.
pub struct EncodeStage;

impl Stage for EncodeStage {
    fn name(&self) -> &'static str {
        "encode"
    }

    fn run(&self, artifact: &mut VideoArtifact, ctx: &StageContext<'_>) -> PipeResult<()> {
        // Counts are only compared for the log; ffmpeg encodes whatever is there.
        let extracted = count_frames(&artifact.scratch.input_frames)?;
        let upscaled = count_frames(&artifact.scratch.output_frames)?;
        if extracted != upscaled {
            warn!(
                extracted,
                upscaled, "Frame counts differ; the encoded video may be truncated"
            );
        }

        let invocation = encode_invocation(artifact, ctx);
        ctx.runner.run(&invocation)?;

        info!(
            output = %artifact.output.display(),
            frame_rate = artifact.frame_rate,
            fps = artifact.fps,
            "Video encoded"
        );
        let output = path_value(&artifact.output);
        artifact.metadata.insert("output_path".into(), output);
        artifact
            .metadata
            .insert("encode.audio".into(), json!(artifact.probe.has_audio));
        Ok(())
    }
}

/// `ffmpeg -n|-y -framerate <rate> -i <frames> -i <source> -map 0:v:0 -map 1:a:0
/// -c:a copy -c:v <encoder> -r <fps> -pix_fmt yuv420p <output>`
///
/// The audio map is dropped when the source has no audio stream.
pub fn encode_invocation(artifact: &VideoArtifact, ctx: &StageContext<'_>) -> Invocation {
    let frames = output_frame_pattern(&artifact.scratch.output_frames, &ctx.tools.frame_suffix);
    let mut inv = Invocation::new(Tool::Ffmpeg, &ctx.tools.ffmpeg)
        .arg(if artifact.job.overwrite { "-y" } else { "-n" })
        .arg("-framerate")
        .arg(format_rate(artifact.frame_rate))
        .arg("-i")
        .arg(frames)
        .arg("-i")
        .arg(&artifact.source)
        .args(["-map", "0:v:0"]);
    if artifact.probe.has_audio {
        inv = inv.args(["-map", "1:a:0", "-c:a", "copy"]);
    }
    inv.arg("-c:v")
        .arg(&ctx.tools.video_encoder)
        .arg("-r")
        .arg(format_rate(artifact.fps))
        .args(["-pix_fmt", "yuv420p"])
        .arg(&artifact.output)
}
