pub mod encode;
pub mod extract;
pub mod upscale;

pub use encode::EncodeStage;
pub use extract::ExtractStage;
pub use upscale::UpscaleStage;

use crate::pipeline::Stage;

/// Extract, upscale, encode: the only order the frame naming supports.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ExtractStage),
        Box::new(UpscaleStage),
        Box::new(EncodeStage),
    ]
}
