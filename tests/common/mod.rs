#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use esrgan_pipe::PipeError;
use esrgan_pipe::paths::{input_frame_name, output_frame_name};
use esrgan_pipe::runner::{Invocation, Tool, ToolRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Probe,
    Extract,
    Upscale,
    Encode,
}

/// Stands in for ffmpeg, ffprobe and the upscaler: records every invocation
/// and produces the files the real tools would.
pub struct FakeRunner {
    pub calls: RefCell<Vec<Invocation>>,
    pub probe_json: String,
    pub frames: u64,
    pub suffix: String,
    pub fail_at: Option<Step>,
    /// Frames the fake upscaler silently skips.
    pub dropped_frames: u64,
}

impl FakeRunner {
    pub fn new(frames: u64, avg_frame_rate: &str) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            probe_json: probe_json(avg_frame_rate, Some(frames), true),
            frames,
            suffix: "_out".to_string(),
            fail_at: None,
            dropped_frames: 0,
        }
    }

    pub fn failing_at(mut self, step: Step) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn steps(&self) -> Vec<Step> {
        self.calls.borrow().iter().map(classify).collect()
    }

    pub fn call(&self, step: Step) -> Option<Invocation> {
        self.calls
            .borrow()
            .iter()
            .find(|inv| classify(inv) == step)
            .cloned()
    }

    fn failure(&self, tool: Tool) -> PipeError {
        PipeError::ToolFailed {
            tool,
            code: Some(1),
            stderr: "simulated failure".to_string(),
        }
    }
}

impl ToolRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, PipeError> {
        self.calls.borrow_mut().push(invocation.clone());
        let step = classify(invocation);
        let failing = self.fail_at == Some(step);

        match step {
            Step::Probe => {
                if failing {
                    return Err(self.failure(invocation.tool));
                }
                Ok(self.probe_json.clone().into_bytes())
            }
            Step::Extract => {
                if failing {
                    return Err(self.failure(invocation.tool));
                }
                let pattern = PathBuf::from(invocation.args.last().unwrap());
                let dir = pattern.parent().unwrap();
                for index in 1..=self.frames {
                    fs::write(dir.join(input_frame_name(index)), b"lo").unwrap();
                }
                Ok(Vec::new())
            }
            Step::Upscale => {
                if failing {
                    return Err(self.failure(invocation.tool));
                }
                let input = PathBuf::from(invocation.value_of("-i").unwrap());
                let output = PathBuf::from(invocation.value_of("-o").unwrap());
                if input.is_dir() {
                    let count = fs::read_dir(&input).unwrap().count() as u64;
                    for index in 1..=count.saturating_sub(self.dropped_frames) {
                        fs::write(output.join(output_frame_name(index, &self.suffix)), b"hi")
                            .unwrap();
                    }
                } else {
                    fs::copy(&input, &output).unwrap();
                }
                Ok(Vec::new())
            }
            Step::Encode => {
                let output = PathBuf::from(invocation.args.last().unwrap());
                if failing {
                    fs::write(&output, b"partial").unwrap();
                    return Err(self.failure(invocation.tool));
                }
                fs::write(&output, b"video").unwrap();
                Ok(Vec::new())
            }
        }
    }
}

pub fn classify(invocation: &Invocation) -> Step {
    match invocation.tool {
        Tool::Ffprobe => Step::Probe,
        Tool::Upscaler => Step::Upscale,
        Tool::Ffmpeg if invocation.position("-qscale:v").is_some() => Step::Extract,
        Tool::Ffmpeg => Step::Encode,
    }
}

pub fn probe_json(avg_frame_rate: &str, frames: Option<u64>, audio: bool) -> String {
    let mut video = serde_json::json!({
        "index": 0,
        "codec_type": "video",
        "avg_frame_rate": avg_frame_rate,
    });
    if let Some(frames) = frames {
        video["nb_frames"] = serde_json::Value::String(frames.to_string());
    }
    let mut streams = vec![video];
    if audio {
        streams.push(serde_json::json!({"index": 1, "codec_type": "audio", "avg_frame_rate": "0/0"}));
    }
    serde_json::json!({ "streams": streams }).to_string()
}

pub fn touch(path: &Path) {
    fs::write(path, b"source").unwrap();
}

pub fn arg(invocation: &Invocation, flag: &str) -> String {
    invocation
        .value_of(flag)
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_default()
}
