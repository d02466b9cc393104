//! External process invocation.
//!
//! Every tool call is described by an [`Invocation`]: a program plus a vector
//! of discrete arguments. Nothing is ever joined into a shell command line, so
//! paths containing spaces or shell metacharacters reach the tool untouched.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, trace};

use crate::error::{PipeError, PipeResult};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Upscaler,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Upscaler => "upscaler",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(tool: Tool, program: impl AsRef<OsStr>) -> Self {
        Self {
            tool,
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Appends `flag value` when `value` is present.
    pub fn opt(self, flag: &str, value: Option<impl AsRef<OsStr>>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    /// Lossy rendering for logs only.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Position of the first argument equal to `value`.
    pub fn position(&self, value: &str) -> Option<usize> {
        self.args.iter().position(|a| a == value)
    }

    /// The argument following `flag`, if any.
    pub fn value_of(&self, flag: &str) -> Option<&OsStr> {
        self.position(flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(OsString::as_os_str)
    }
}

/// Runs external tools. Calls block until the child exits; there is no
/// timeout and no retry.
pub trait ToolRunner {
    /// Runs the invocation to completion and returns its stdout.
    fn run(&self, invocation: &Invocation) -> PipeResult<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> PipeResult<Vec<u8>> {
        debug!(tool = %invocation.tool, command = %invocation.display(), "Spawning tool");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PipeError::Spawn {
                tool: invocation.tool,
                program: invocation.program.to_string_lossy().into_owned(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!(tool = %invocation.tool, stderr = %stderr, "Tool finished");

        if !output.status.success() {
            return Err(PipeError::ToolFailed {
                tool: invocation.tool,
                code: output.status.code(),
                stderr: stderr_tail(&stderr, STDERR_TAIL_LINES),
            });
        }
        Ok(output.stdout)
    }
}

/// Whether `program` can be started at all. Exit status is ignored because
/// some upscaler builds exit non-zero when printing their usage.
pub fn check_available(tool: Tool, program: &Path) -> bool {
    let probe_flag = match tool {
        Tool::Ffmpeg | Tool::Ffprobe => "-version",
        Tool::Upscaler => "-h",
    };
    Command::new(program)
        .arg(probe_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_stay_discrete() {
        let inv = Invocation::new(Tool::Ffmpeg, "ffmpeg")
            .arg("-i")
            .arg("/tmp/my clip; rm -rf ~.mp4")
            .opt("-t", Some("256"))
            .opt("-f", None::<&str>);
        assert_eq!(inv.args.len(), 4);
        assert_eq!(
            inv.value_of("-i"),
            Some(OsStr::new("/tmp/my clip; rm -rf ~.mp4"))
        );
        assert_eq!(inv.value_of("-t"), Some(OsStr::new("256")));
        assert!(inv.position("-f").is_none());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text = (1..=30).map(|i| format!("line {i}")).collect::<Vec<_>>();
        let tail = stderr_tail(&text.join("\n"), 3);
        assert_eq!(tail, "line 28\nline 29\nline 30");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let inv = Invocation::new(Tool::Upscaler, "definitely-not-a-real-upscaler-binary");
        match SystemRunner.run(&inv) {
            Err(PipeError::Spawn { tool, .. }) => assert_eq!(tool, Tool::Upscaler),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!check_available(
            Tool::Upscaler,
            Path::new("definitely-not-a-real-upscaler-binary")
        ));
    }
}
