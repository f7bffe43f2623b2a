use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ToolConfig;
use crate::engine::{EngineRegistry, PipelineLoader, RemoteInference};
use crate::error::{MmToolsError, Result};
use crate::tools::adapter::{ToolAdapter, ToolHandle, ToolRunner};
use crate::tools::image_generation::{
    Condition, ConditionedImageTool, Guidance, GuidedImageTool, Text2ImageTool,
};
use crate::tools::meta::ToolMeta;
use crate::tools::segmentation::SemSegTool;
use crate::tools::speech::SpeechToTextTool;
use crate::tools::tool::{AgentTool, Tool};

pub const TEXT2IMAGE: &str = "Text2Image";
pub const SEG2IMAGE: &str = "Seg2Image";
pub const CANNY2IMAGE: &str = "Canny2Image";
pub const POSE2IMAGE: &str = "Pose2Image";
pub const SCRIBBLE_TEXT2IMAGE: &str = "ScribbleText2Image";
pub const DEPTH_TEXT2IMAGE: &str = "DepthText2Image";
pub const SEMSEG: &str = "SemSeg";
pub const SPEECH_TO_TEXT: &str = "SpeechToText";

/// 工具构造时可用的推理后端
#[derive(Clone, Default)]
pub struct Backends {
    pub engines: Arc<EngineRegistry>,
    pub pipeline_loader: Option<PipelineLoader>,
    pub remote: Option<Arc<dyn RemoteInference>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = Arc::new(engines);
        self
    }

    pub fn with_pipeline_loader(mut self, loader: PipelineLoader) -> Self {
        self.pipeline_loader = Some(loader);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteInference>) -> Self {
        self.remote = Some(remote);
        self
    }

    fn pipeline_loader(&self, key: &str) -> Result<PipelineLoader> {
        self.pipeline_loader.clone().ok_or_else(|| {
            MmToolsError::Config(format!("tool `{key}` requires a pipeline loader"))
        })
    }

    fn runner<A: ToolAdapter>(&self, adapter: A) -> ToolRunner<A> {
        let runner = ToolRunner::new(adapter);
        match &self.remote {
            Some(remote) => runner.with_remote(Arc::clone(remote)),
            None => runner,
        }
    }

    /// 首次本地调用时再构造引擎
    pub fn lazy<A: ToolAdapter>(&self, adapter: A) -> Box<dyn ToolHandle> {
        Box::new(self.runner(adapter))
    }

    /// 立即构造引擎
    pub fn eager<A: ToolAdapter>(&self, adapter: A) -> Result<Box<dyn ToolHandle>> {
        let mut runner = self.runner(adapter);
        runner.setup()?;
        Ok(Box::new(runner))
    }
}

pub type ToolFactory =
    Arc<dyn Fn(&Backends, ToolConfig) -> Result<Box<dyn ToolHandle>> + Send + Sync>;

#[derive(Default)]
pub struct ToolFactoryRegistry {
    factories: HashMap<String, ToolFactory>,
}

impl ToolFactoryRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtin_tool_factories(&mut registry);
        registry
    }

    pub fn register_factory<T: Into<String>>(&mut self, name: T, factory: ToolFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn build(
        &self,
        factory_name: &str,
        backends: &Backends,
        config: Option<Value>,
    ) -> Result<Box<dyn ToolHandle>> {
        let factory = self
            .factories
            .get(factory_name)
            .ok_or_else(|| MmToolsError::ToolNotRegistered(factory_name.to_string()))?;
        let config = ToolConfig::from_value(config)?;
        let handle = factory(backends, config)?;
        debug!(
            tool = factory_name,
            input_style = %handle.settings().input_style,
            output_style = %handle.settings().output_style,
            remote = handle.settings().remote,
            "tool constructed"
        );
        Ok(handle)
    }

    pub fn build_agent_tool(
        &self,
        factory_name: &str,
        backends: &Backends,
        config: Option<Value>,
    ) -> Result<Arc<dyn Tool>> {
        let handle = self.build(factory_name, backends, config)?;
        Ok(Arc::new(AgentTool::new(factory_name, handle)) as Arc<dyn Tool>)
    }
}

pub fn register_builtin_tool_factories(registry: &mut ToolFactoryRegistry) {
    registry.register_factory(
        TEXT2IMAGE,
        Arc::new(|backends: &Backends, config: ToolConfig| -> Result<Box<dyn ToolHandle>> {
            let tool = Text2ImageTool::new(config, Arc::clone(&backends.engines))?;
            Ok(backends.lazy(tool))
        }),
    );

    for (key, condition) in [
        (SEG2IMAGE, Condition::Segmentation),
        (CANNY2IMAGE, Condition::Canny),
        (POSE2IMAGE, Condition::Pose),
    ] {
        registry.register_factory(
            key,
            Arc::new(move |backends: &Backends, config: ToolConfig| -> Result<Box<dyn ToolHandle>> {
                let tool =
                    ConditionedImageTool::new(condition, config, Arc::clone(&backends.engines))?;
                Ok(backends.lazy(tool))
            }),
        );
    }

    for (key, guidance) in [
        (SCRIBBLE_TEXT2IMAGE, Guidance::Scribble),
        (DEPTH_TEXT2IMAGE, Guidance::Depth),
    ] {
        registry.register_factory(
            key,
            Arc::new(move |backends: &Backends, config: ToolConfig| -> Result<Box<dyn ToolHandle>> {
                let loader = backends.pipeline_loader(key)?;
                backends.eager(GuidedImageTool::new(guidance, config, loader)?)
            }),
        );
    }

    registry.register_factory(
        SEMSEG,
        Arc::new(|backends: &Backends, config: ToolConfig| -> Result<Box<dyn ToolHandle>> {
            let tool = SemSegTool::new(config, Arc::clone(&backends.engines))?;
            Ok(backends.lazy(tool))
        }),
    );

    registry.register_factory(
        SPEECH_TO_TEXT,
        Arc::new(|backends: &Backends, config: ToolConfig| -> Result<Box<dyn ToolHandle>> {
            let tool = SpeechToTextTool::new(config, Arc::clone(&backends.engines))?;
            Ok(backends.lazy(tool))
        }),
    );
}

static BUILTIN_FACTORIES: Lazy<ToolFactoryRegistry> = Lazy::new(ToolFactoryRegistry::with_builtins);

/// 按注册名构造内置工具
pub fn load_tool(
    name: &str,
    backends: &Backends,
    config: Option<Value>,
) -> Result<Box<dyn ToolHandle>> {
    BUILTIN_FACTORIES.build(name, backends, config)
}

pub fn load_agent_tool(
    name: &str,
    backends: &Backends,
    config: Option<Value>,
) -> Result<Arc<dyn Tool>> {
    BUILTIN_FACTORIES.build_agent_tool(name, backends, config)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionPattern {
    /// 按模型名从共享工厂懒加载
    SharedEngine,
    /// 构造时组装专用管线
    BespokePipeline,
}

/// 内置工具的静态描述，无需构造引擎即可检索
#[derive(Clone, Debug, Serialize)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub meta: ToolMeta,
    pub remote: bool,
    pub pattern: ConstructionPattern,
}

static CATALOG: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    let shared = |key, meta, remote| CatalogEntry {
        key,
        meta,
        remote,
        pattern: ConstructionPattern::SharedEngine,
    };
    let bespoke = |key, meta| CatalogEntry {
        key,
        meta,
        remote: false,
        pattern: ConstructionPattern::BespokePipeline,
    };
    let conditioned = |key, condition: Condition| {
        shared(key, condition.default_meta(), condition.remote_key().is_some())
    };
    vec![
        shared(TEXT2IMAGE, Text2ImageTool::default_meta(), false),
        conditioned(SEG2IMAGE, Condition::Segmentation),
        conditioned(CANNY2IMAGE, Condition::Canny),
        conditioned(POSE2IMAGE, Condition::Pose),
        bespoke(SCRIBBLE_TEXT2IMAGE, Guidance::Scribble.default_meta()),
        bespoke(DEPTH_TEXT2IMAGE, Guidance::Depth.default_meta()),
        shared(SEMSEG, SemSegTool::default_meta(), false),
        shared(SPEECH_TO_TEXT, SpeechToTextTool::default_meta(), false),
    ]
});

pub fn builtin_catalog() -> &'static [CatalogEntry] {
    &CATALOG
}
