pub mod config;
pub mod engine;
pub mod error;
pub mod tools;
pub mod utils;

pub use config::{Device, EnvConfig, Precision, ToolConfig, ToolSettings};
#[cfg(feature = "remote-client")]
pub use engine::HttpRemoteInference;
pub use engine::{
    EngineFactory, EngineOutput, EngineRegistry, InferenceEngine, InferenceRequest,
    PipelineLoader, PipelineSpec, RemoteArg, RemoteInference, SamplingParams, Scheduler,
};
pub use error::{MmToolsError, Result};
pub use tools::{
    builtin_catalog, load_agent_tool, load_tool, AgentTool, Applied, AudioClip, Backends, CatalogEntry,
    Framework, InputStyle, ModelSpec, OutputStyle, Tool, ToolAdapter, ToolCall, ToolHandle,
    ToolInvocation, ToolMessage, ToolMeta, ToolRegistry, ToolRunner, ToolValue,
};
pub use utils::{generate_path, logging};
