use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ToolConfig;
use crate::error::{PipeError, PipeResult};
use crate::runner::{Invocation, Tool, ToolRunner};

/// A rational rate such as ffprobe's `avg_frame_rate` (`"30000/1001"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u64,
    pub denominator: u64,
}

impl FrameRate {
    /// Parses `num/den`, or a bare decimal number.
    pub fn parse(value: &str) -> PipeResult<f64> {
        let value = value.trim();
        if let Some((num, den)) = value.split_once('/') {
            let rate = FrameRate {
                numerator: num.trim().parse().map_err(|_| {
                    PipeError::FrameRate(format!("bad numerator in '{value}'"))
                })?,
                denominator: den.trim().parse().map_err(|_| {
                    PipeError::FrameRate(format!("bad denominator in '{value}'"))
                })?,
            };
            return rate.as_f64();
        }
        let rate: f64 = value
            .parse()
            .map_err(|_| PipeError::FrameRate(format!("'{value}' is not a rate")))?;
        if rate.is_finite() && rate > 0.0 {
            Ok(rate)
        } else {
            Err(PipeError::FrameRate(format!("'{value}' is not positive")))
        }
    }

    pub fn as_f64(&self) -> PipeResult<f64> {
        if self.denominator == 0 || self.numerator == 0 {
            return Err(PipeError::FrameRate(format!(
                "{}/{} is undefined",
                self.numerator, self.denominator
            )));
        }
        Ok(self.numerator as f64 / self.denominator as f64)
    }
}

pub fn round_frame_rate(rate: f64) -> f64 {
    (rate * 100.0).round() / 100.0
}

/// Rate used to reassemble frames when none was given: the probed rate to two
/// decimals, or unrounded when rounding would reach zero (slideshows,
/// timelapses).
pub fn effective_frame_rate(probed: f64) -> PipeResult<f64> {
    if !(probed.is_finite() && probed > 0.0) {
        return Err(PipeError::FrameRate(format!(
            "probed rate {probed} is not positive"
        )));
    }
    let rounded = round_frame_rate(probed);
    Ok(if rounded > 0.0 { rounded } else { probed })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    /// Average frame rate of the first video stream, unrounded.
    pub frame_rate: f64,
    /// Declared frame count; estimated by some containers, absent in others.
    pub frame_count: Option<u64>,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
}

/// Queries the container for frame rate and frame count.
pub fn probe_video(
    source: &Path,
    tools: &ToolConfig,
    runner: &dyn ToolRunner,
) -> PipeResult<VideoMetadata> {
    if !source.exists() {
        return Err(PipeError::NotFound {
            path: source.to_path_buf(),
        });
    }

    let invocation = probe_invocation(source, tools);
    let stdout = runner.run(&invocation)?;
    let metadata = parse_probe_output(&stdout)?;
    debug!(
        source = %source.display(),
        frame_rate = metadata.frame_rate,
        frame_count = ?metadata.frame_count,
        has_audio = metadata.has_audio,
        "Probed source"
    );
    Ok(metadata)
}

pub fn probe_invocation(source: &Path, tools: &ToolConfig) -> Invocation {
    Invocation::new(Tool::Ffprobe, &tools.ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(source)
}

pub fn parse_probe_output(stdout: &[u8]) -> PipeResult<VideoMetadata> {
    let output: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PipeError::Metadata(format!("ffprobe JSON: {e}")))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipeError::Metadata("no video stream".into()))?;

    let avg = video
        .avg_frame_rate
        .as_deref()
        .ok_or_else(|| PipeError::Metadata("video stream has no avg_frame_rate".into()))?;
    let frame_rate = FrameRate::parse(avg)?;

    let frame_count = match video.nb_frames.as_deref() {
        Some(raw) => Some(raw.trim().parse().map_err(|_| {
            PipeError::Metadata(format!("nb_frames '{raw}' is not an integer"))
        })?),
        None => None,
    };

    let has_audio = output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoMetadata {
        frame_rate,
        frame_count,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_and_decimal_rates() {
        assert_eq!(FrameRate::parse("60/1").unwrap(), 60.0);
        let ntsc = FrameRate::parse("30000/1001").unwrap();
        assert!((ntsc - 29.97002997).abs() < 1e-6);
        assert_eq!(round_frame_rate(ntsc), 29.97);
        assert_eq!(FrameRate::parse("25").unwrap(), 25.0);
    }

    #[test]
    fn rejects_degenerate_rates() {
        assert!(matches!(FrameRate::parse("0/0"), Err(PipeError::FrameRate(_))));
        assert!(matches!(FrameRate::parse("24/0"), Err(PipeError::FrameRate(_))));
        assert!(matches!(FrameRate::parse("a/b"), Err(PipeError::FrameRate(_))));
        assert!(matches!(FrameRate::parse("__import__('os')"), Err(PipeError::FrameRate(_))));
        assert!(FrameRate::parse("-5").is_err());
    }

    #[test]
    fn slow_sources_keep_their_unrounded_rate() {
        assert_eq!(effective_frame_rate(30000.0 / 1001.0).unwrap(), 29.97);
        let slideshow = FrameRate::parse("1/1000").unwrap();
        assert_eq!(round_frame_rate(slideshow), 0.0);
        assert_eq!(effective_frame_rate(slideshow).unwrap(), 0.001);
        assert!(matches!(effective_frame_rate(0.0), Err(PipeError::FrameRate(_))));
        assert!(effective_frame_rate(f64::NAN).is_err());
    }

    #[test]
    fn picks_first_video_stream() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_type": "audio", "avg_frame_rate": "0/0"},
                {"index": 1, "codec_type": "video", "avg_frame_rate": "24000/1001", "nb_frames": "240"},
                {"index": 2, "codec_type": "video", "avg_frame_rate": "1/1", "nb_frames": "1"}
            ]
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(round_frame_rate(meta.frame_rate), 23.98);
        assert_eq!(meta.frame_count, Some(240));
        assert!(meta.has_audio);
    }

    #[test]
    fn missing_frame_count_is_none() {
        let json = br#"{"streams": [{"codec_type": "video", "avg_frame_rate": "25/1"}]}"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.frame_count, None);
        assert!(!meta.has_audio);
    }

    #[test]
    fn audio_only_input_is_a_metadata_error() {
        let json = br#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(PipeError::Metadata(_))
        ));
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(PipeError::Metadata(_))
        ));
    }

    #[test]
    fn missing_source_fails_before_probing() {
        struct Unreachable;
        impl ToolRunner for Unreachable {
            fn run(&self, _: &Invocation) -> PipeResult<Vec<u8>> {
                panic!("probe must not run for a missing file");
            }
        }
        let err = probe_video(
            Path::new("/nonexistent/clip.mp4"),
            &ToolConfig::default(),
            &Unreachable,
        )
        .unwrap_err();
        assert!(matches!(err, PipeError::NotFound { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn probe_invocation_requests_json_streams() {
        let inv = probe_invocation(Path::new("/m/clip.mp4"), &ToolConfig::default());
        assert_eq!(inv.program, "ffprobe");
        assert_eq!(inv.value_of("-print_format").unwrap(), "json");
        assert!(inv.position("-show_streams").is_some());
        assert_eq!(inv.args.last().unwrap(), "/m/clip.mp4");
    }
}
