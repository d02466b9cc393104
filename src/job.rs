use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::PipeError;

/// Upscale factor accepted by the upscaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    X2,
    X3,
    X4,
}

impl Scale {
    pub fn factor(self) -> u8 {
        match self {
            Scale::X2 => 2,
            Scale::X3 => 3,
            Scale::X4 => 4,
        }
    }
}

impl Serialize for Scale {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.factor())
    }
}

impl TryFrom<u8> for Scale {
    type Error = PipeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Scale::X2),
            3 => Ok(Scale::X3),
            4 => Ok(Scale::X4),
            other => Err(PipeError::InvalidArgument(format!(
                "unsupported scale {other}; expected 2, 3 or 4"
            ))),
        }
    }
}

impl FromStr for Scale {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['x', 'X']);
        let value: u8 = trimmed.parse().map_err(|_| {
            PipeError::InvalidArgument(format!("unsupported scale '{s}'; expected 2, 3 or 4"))
        })?;
        Scale::try_from(value)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factor())
    }
}

/// Model identifiers understood by the upscaler executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
pub enum Model {
    #[default]
    #[value(name = "realesr-animevideov3")]
    #[serde(rename = "realesr-animevideov3")]
    RealesrAnimeVideoV3,
    #[value(name = "realesrgan-x4plus")]
    #[serde(rename = "realesrgan-x4plus")]
    RealesrganX4Plus,
    #[value(name = "realesrgan-x4plus-anime")]
    #[serde(rename = "realesrgan-x4plus-anime")]
    RealesrganX4PlusAnime,
    #[value(name = "realesrnet-x4plus")]
    #[serde(rename = "realesrnet-x4plus")]
    RealesrnetX4Plus,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::RealesrAnimeVideoV3 => "realesr-animevideov3",
            Model::RealesrganX4Plus => "realesrgan-x4plus",
            Model::RealesrganX4PlusAnime => "realesrgan-x4plus-anime",
            Model::RealesrnetX4Plus => "realesrnet-x4plus",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upscaler tiling hint. `None` and `Some(0)` both leave tiling to the tool,
/// in which case no `-t` flag is passed.
pub fn effective_tile(tile_size: Option<u32>) -> Option<u32> {
    tile_size.filter(|&t| t > 0)
}

/// One video upscale request. Immutable once built.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub source: PathBuf,
    pub scale: Scale,
    pub model: Model,
    /// Rate the extracted frames are reassembled at; probed when absent.
    pub frame_rate: Option<f64>,
    /// Declared rate of the output stream; defaults to `frame_rate`.
    pub fps: Option<f64>,
    pub tile_size: Option<u32>,
    /// Leave scratch directories in place even after success.
    pub keep_scratch: bool,
    pub overwrite: bool,
}

impl VideoJob {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            scale: Scale::default(),
            model: Model::default(),
            frame_rate: None,
            fps: None,
            tile_size: None,
            keep_scratch: false,
            overwrite: false,
        }
    }

    pub fn scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    pub fn frame_rate(mut self, frame_rate: Option<f64>) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn fps(mut self, fps: Option<f64>) -> Self {
        self.fps = fps;
        self
    }

    pub fn tile_size(mut self, tile_size: Option<u32>) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ImageJob {
    pub source: PathBuf,
    pub scale: Scale,
    pub model: Model,
    pub tile_size: Option<u32>,
}

impl ImageJob {
    pub fn new(source: impl Into<PathBuf>, scale: Scale, model: Model) -> Self {
        Self {
            source: source.into(),
            scale,
            model,
            tile_size: None,
        }
    }

    pub fn tile_size(mut self, tile_size: Option<u32>) -> Self {
        self.tile_size = tile_size;
        self
    }
}
