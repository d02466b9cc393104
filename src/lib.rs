pub mod config;
pub mod error;
pub mod job;
pub mod observability;
pub mod paths;
pub mod pipeline;
pub mod probe;
pub mod runner;
pub mod stages;

pub use config::ToolConfig;
pub use error::{PipeError, PipeResult};
pub use job::{ImageJob, Model, Scale, VideoJob};
pub use pipeline::{PipelineExecutor, PipelineResult, upscale_image};
pub use runner::{SystemRunner, ToolRunner};
