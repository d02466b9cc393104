//! File naming shared by the stages. The frame file names are the only
//! contract between extraction, upscaling and encoding.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipeError, PipeResult};
use crate::job::Scale;

pub const INPUT_FRAMES_SUFFIX: &str = "_input_frames";
pub const OUTPUT_FRAMES_SUFFIX: &str = "_out_frames";
pub const FRAME_EXTENSION: &str = "jpg";

/// `clip.mp4` + 3 -> `clip_X3.mp4`, in the same directory.
pub fn output_path(source: &Path, scale: Scale) -> PathBuf {
    let stem = file_stem(source);
    let mut name = OsString::from(format!("{stem}_X{scale}"));
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    source.with_file_name(name)
}

fn file_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Scratch directories owned by one video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDirs {
    pub input_frames: PathBuf,
    pub output_frames: PathBuf,
}

impl ScratchDirs {
    /// Siblings of `source` named after its stem. Two jobs on the same source
    /// share these directories and will collide.
    pub fn for_source(source: &Path) -> Self {
        let stem = file_stem(source);
        Self {
            input_frames: source.with_file_name(format!("{stem}{INPUT_FRAMES_SUFFIX}")),
            output_frames: source.with_file_name(format!("{stem}{OUTPUT_FRAMES_SUFFIX}")),
        }
    }

    /// Creates both directories; existing ones are left untouched.
    pub fn create(&self) -> PipeResult<()> {
        for dir in [&self.input_frames, &self.output_frames] {
            fs::create_dir_all(dir).map_err(|e| PipeError::io(dir, e))?;
        }
        Ok(())
    }

    pub fn remove(&self) -> PipeResult<()> {
        for dir in [&self.input_frames, &self.output_frames] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| PipeError::io(dir, e))?;
            }
        }
        Ok(())
    }

    pub fn exist(&self) -> bool {
        self.input_frames.is_dir() && self.output_frames.is_dir()
    }
}

/// `<dir>/frame%08d.jpg`
pub fn input_frame_pattern(dir: &Path) -> PathBuf {
    dir.join(format!("frame%08d.{FRAME_EXTENSION}"))
}

/// `<dir>/frame%08d<suffix>.jpg`
pub fn output_frame_pattern(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("frame%08d{suffix}.{FRAME_EXTENSION}"))
}

/// Name of the 1-based frame `index` as written by the extractor.
pub fn input_frame_name(index: u64) -> String {
    format!("frame{index:08}.{FRAME_EXTENSION}")
}

pub fn output_frame_name(index: u64, suffix: &str) -> String {
    format!("frame{index:08}{suffix}.{FRAME_EXTENSION}")
}

/// Number of regular files in `dir`; a missing directory counts as empty.
pub fn count_frames(dir: &Path) -> PipeResult<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(PipeError::io(dir, e)),
    };
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| PipeError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| PipeError::io(entry.path(), e))?;
        if file_type.is_file() {
            count += 1;
        }
    }
    Ok(count)
}
