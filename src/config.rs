use std::path::{Path, PathBuf};

pub const DEFAULT_FFMPEG: &str = "ffmpeg";
pub const DEFAULT_FFPROBE: &str = "ffprobe";
pub const DEFAULT_UPSCALER: &str = "realesrgan-ncnn-vulkan";
pub const DEFAULT_VIDEO_ENCODER: &str = "libx264";
pub const DEFAULT_FRAME_SUFFIX: &str = "_out";

/// Locations and fixed options of the external tools.
///
/// Built once at the CLI boundary and handed to every stage by reference.
/// Bare program names are resolved through `PATH` by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub upscaler: PathBuf,
    pub video_encoder: String,
    /// Token the upscaler appends to each output frame name.
    pub frame_suffix: String,
    /// Forwarded to the upscaler as `-f <format>` when set.
    pub upscaler_format: Option<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            ffprobe: PathBuf::from(DEFAULT_FFPROBE),
            upscaler: PathBuf::from(DEFAULT_UPSCALER),
            video_encoder: DEFAULT_VIDEO_ENCODER.to_string(),
            frame_suffix: DEFAULT_FRAME_SUFFIX.to_string(),
            upscaler_format: None,
        }
    }
}

impl ToolConfig {
    /// Uses `ffmpeg` and, unless told otherwise later, the ffprobe next to it.
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.into();
        self.ffprobe = sibling_ffprobe(&ffmpeg);
        self.ffmpeg = ffmpeg;
        self
    }

    pub fn with_ffprobe(mut self, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffprobe = ffprobe.into();
        self
    }

    pub fn with_upscaler(mut self, upscaler: impl Into<PathBuf>) -> Self {
        self.upscaler = upscaler.into();
        self
    }

    pub fn with_video_encoder(mut self, encoder: impl Into<String>) -> Self {
        self.video_encoder = encoder.into();
        self
    }

    pub fn with_frame_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.frame_suffix = suffix.into();
        self
    }

    pub fn with_upscaler_format(mut self, format: Option<String>) -> Self {
        self.upscaler_format = format.filter(|f| !f.trim().is_empty());
        self
    }
}

fn sibling_ffprobe(ffmpeg: &Path) -> PathBuf {
    let name = ffmpeg
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(rest) = name.strip_prefix("ffmpeg") else {
        return PathBuf::from(DEFAULT_FFPROBE);
    };
    ffmpeg.with_file_name(format!("ffprobe{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_on_path() {
        let cfg = ToolConfig::default();
        assert_eq!(cfg.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(cfg.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(cfg.upscaler, PathBuf::from("realesrgan-ncnn-vulkan"));
        assert_eq!(cfg.video_encoder, "libx264");
        assert_eq!(cfg.frame_suffix, "_out");
    }

    #[test]
    fn ffprobe_follows_explicit_ffmpeg() {
        let cfg = ToolConfig::default().with_ffmpeg("/opt/ff/bin/ffmpeg.exe");
        assert_eq!(cfg.ffprobe, PathBuf::from("/opt/ff/bin/ffprobe.exe"));

        let cfg = ToolConfig::default()
            .with_ffmpeg("/opt/ff/bin/ffmpeg")
            .with_ffprobe("/usr/bin/ffprobe");
        assert_eq!(cfg.ffprobe, PathBuf::from("/usr/bin/ffprobe"));
    }

    #[test]
    fn unusual_ffmpeg_name_falls_back_to_path_ffprobe() {
        let cfg = ToolConfig::default().with_ffmpeg("/opt/custom-transcoder");
        assert_eq!(cfg.ffprobe, PathBuf::from("ffprobe"));
    }

    #[test]
    fn blank_upscaler_format_is_ignored() {
        let cfg = ToolConfig::default().with_upscaler_format(Some("  ".into()));
        assert!(cfg.upscaler_format.is_none());
    }
}
