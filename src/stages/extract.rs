use std::path::Path;

use serde_json::json;
use tracing::{info, warn};

use crate::config::ToolConfig;
use crate::error::PipeResult;
use crate::paths::{count_frames, input_frame_pattern};
use crate::pipeline::{Stage, StageContext, VideoArtifact};
use crate::runner::{Invocation, Tool};

/// Decodes every frame of the source into max-quality JPEGs.
pub struct ExtractStage;

impl Stage for ExtractStage {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn run(&self, artifact: &mut VideoArtifact, ctx: &StageContext<'_>) -> PipeResult<()> {
        let dir = &artifact.scratch.input_frames;
        let existing = count_frames(dir)?;

        if already_extracted(existing, artifact.probe.frame_count) {
            info!(frames = existing, dir = %dir.display(), "Frames already extracted; skipping decode");
            artifact.metadata.insert("extract.skipped".into(), json!(true));
            artifact.metadata.insert("extract.frames".into(), json!(existing));
            return Ok(());
        }
        if existing > 0 {
            warn!(
                found = existing,
                expected = ?artifact.probe.frame_count,
                "Scratch directory holds a partial extraction; decoding again"
            );
        }

        let invocation = extract_invocation(ctx.tools, &artifact.source, dir);
        ctx.runner.run(&invocation)?;

        let extracted = count_frames(dir)?;
        info!(frames = extracted, "Frames extracted");
        artifact.metadata.insert("extract.skipped".into(), json!(false));
        artifact.metadata.insert("extract.frames".into(), json!(extracted));
        Ok(())
    }
}

fn already_extracted(existing: u64, expected: Option<u64>) -> bool {
    matches!(expected, Some(n) if n > 0 && n == existing)
}

/// `ffmpeg -y -i <source> -qscale:v 1 -qmin 1 -qmax 1 -vsync 0 <dir>/frame%08d.jpg`
pub fn extract_invocation(tools: &ToolConfig, source: &Path, dir: &Path) -> Invocation {
    Invocation::new(Tool::Ffmpeg, &tools.ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(source)
        .args(["-qscale:v", "1", "-qmin", "1", "-qmax", "1", "-vsync", "0"])
        .arg(input_frame_pattern(dir))
}
