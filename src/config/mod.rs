pub mod env;
pub mod settings;

pub use env::EnvConfig;
pub use settings::{
    Device, Precision, StyleSupport, ToolConfig, ToolSettings, DEFAULT_AUDIO_DIR,
    DEFAULT_OUTPUT_DIR,
};
