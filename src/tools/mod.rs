pub mod adapter;
pub mod factory;
pub mod image_generation;
pub mod meta;
pub mod registry;
pub mod segmentation;
pub mod speech;
pub mod style;
pub mod tool;

pub use adapter::{Applied, EngineSlot, ToolAdapter, ToolCall, ToolHandle, ToolRunner};
pub use factory::{
    builtin_catalog, load_agent_tool, load_tool, register_builtin_tool_factories, Backends,
    CatalogEntry, ConstructionPattern, ToolFactory, ToolFactoryRegistry,
};
pub use image_generation::{
    Condition, ConditionedImageTool, Guidance, GuidedImageTool, Text2ImageTool,
};
pub use meta::{ModelSpec, ToolMeta, ToolMetaBuilder};
pub use registry::ToolRegistry;
pub use segmentation::SemSegTool;
pub use speech::SpeechToTextTool;
pub use style::{AudioClip, Framework, InputStyle, OutputStyle, StyleConverter, ToolValue};
pub use tool::{AgentTool, Tool, ToolInvocation, ToolMessage};
