//! 推理引擎协作方
//!
//! 模型本身的计算不在本 crate 内完成，这里只定义工具与引擎之间的约定：
//! - [`InferenceEngine`]：已加载的推理管线
//! - [`EngineRegistry`]：按模型名构造引擎（多个工具共用一个工厂）
//! - [`PipelineLoader`]：组装固定结构的专用管线
//! - [`remote::RemoteInference`]：远程托管推理

pub mod remote;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::{Device, Precision};
use crate::error::{MmToolsError, Result};
use crate::tools::meta::ModelSpec;
use crate::utils::path::ensure_parent_dir;

pub use remote::{RemoteArg, RemoteInference};
#[cfg(feature = "remote-client")]
pub use remote::HttpRemoteInference;

/// 扩散采样参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub steps: u32,
    pub eta: f32,
    pub guidance_scale: f32,
    pub seed: u32,
}

/// 一次推理的输入
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// 条件图（分割图、边缘图、姿态图等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<PathBuf>,
    /// 被分析的图像或音频
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingParams>,
}

impl InferenceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_negative_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(prompt.into());
        self
    }

    pub fn with_control(mut self, path: impl Into<PathBuf>) -> Self {
        self.control = Some(path.into());
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = Some(sampling);
        self
    }
}

/// 引擎返回的结果
#[derive(Debug)]
pub enum EngineOutput {
    /// 引擎已把结果写到目标路径
    Written,
    Image(DynamicImage),
    Bytes(Vec<u8>),
    Text(String),
}

impl EngineOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineOutput::Written => "written",
            EngineOutput::Image(_) => "image",
            EngineOutput::Bytes(_) => "bytes",
            EngineOutput::Text(_) => "text",
        }
    }

    /// 把图像类结果落盘到 destination
    pub fn persist(self, tool: &str, destination: &Path) -> Result<()> {
        match self {
            EngineOutput::Written => {
                if destination.exists() {
                    Ok(())
                } else {
                    Err(MmToolsError::engine(
                        tool,
                        anyhow::anyhow!(
                            "engine reported success but `{}` was not written",
                            destination.display()
                        ),
                    ))
                }
            }
            EngineOutput::Image(img) => {
                ensure_parent_dir(destination)?;
                img.save(destination)?;
                Ok(())
            }
            EngineOutput::Bytes(bytes) => write_bytes(destination, &bytes),
            EngineOutput::Text(_) => Err(MmToolsError::engine(
                tool,
                anyhow::anyhow!("expected an image result, got text"),
            )),
        }
    }
}

pub(crate) fn write_bytes(destination: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(destination)?;
    fs::write(destination, bytes).map_err(|e| MmToolsError::io(destination, e))
}

/// 已加载的推理管线
pub trait InferenceEngine: Send {
    fn infer(
        &mut self,
        request: &InferenceRequest,
        destination: Option<&Path>,
    ) -> anyhow::Result<EngineOutput>;
}

pub type EngineFactory =
    Arc<dyn Fn(&ModelSpec, &Device) -> anyhow::Result<Box<dyn InferenceEngine>> + Send + Sync>;

/// 按模型名注册的引擎工厂
#[derive(Default)]
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register_factory<T: Into<String>>(&mut self, model: T, factory: EngineFactory) {
        self.factories.insert(model.into(), factory);
    }

    pub fn contains(&self, model: &str) -> bool {
        self.factories.contains_key(model)
    }

    pub fn construct(
        &self,
        tool: &str,
        spec: &ModelSpec,
        device: &Device,
    ) -> Result<Box<dyn InferenceEngine>> {
        let factory = self
            .factories
            .get(&spec.name)
            .ok_or_else(|| MmToolsError::EngineNotRegistered(spec.name.clone()))?;
        tracing::debug!(tool, model = %spec.name, setting = ?spec.setting, %device, "constructing engine");
        factory(spec, device).map_err(|e| MmToolsError::engine(tool, e))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    UniPcMultistep,
}

/// 专用管线的固定结构：基础生成模型 + ControlNet + 安全检查器
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub base_model: String,
    pub controlnet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_checker: Option<String>,
    pub scheduler: Scheduler,
    pub precision: Precision,
}

pub type PipelineLoader =
    Arc<dyn Fn(&PipelineSpec, &Device) -> anyhow::Result<Box<dyn InferenceEngine>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Silent;

    impl InferenceEngine for Silent {
        fn infer(
            &mut self,
            _request: &InferenceRequest,
            _destination: Option<&Path>,
        ) -> anyhow::Result<EngineOutput> {
            Ok(EngineOutput::Text(String::new()))
        }
    }

    #[test]
    fn test_registry_constructs_by_model_name() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = EngineRegistry::new();
        registry.register_factory(
            "controlnet",
            Arc::new(move |spec: &ModelSpec, _device: &Device| -> anyhow::Result<Box<dyn InferenceEngine>> {
                assert_eq!(spec.setting, Some(1));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Silent) as Box<dyn InferenceEngine>)
            }),
        );

        let spec = ModelSpec::new("controlnet").with_setting(1);
        registry.construct("canny", &spec, &Device::Cpu).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.contains("controlnet"));
    }

    #[test]
    fn test_registry_missing_model() {
        let registry = EngineRegistry::new();
        let err = registry
            .construct("t", &ModelSpec::new("stable_diffusion"), &Device::Cpu)
            .err()
            .unwrap();
        assert!(matches!(err, MmToolsError::EngineNotRegistered(name) if name == "stable_diffusion"));
    }

    #[test]
    fn test_factory_error_becomes_engine_error() {
        let mut registry = EngineRegistry::new();
        registry.register_factory(
            "broken",
            Arc::new(
                |_: &ModelSpec, _: &Device| -> anyhow::Result<Box<dyn InferenceEngine>> {
                    Err(anyhow::anyhow!("weights missing"))
                },
            ),
        );
        let err = registry
            .construct("t", &ModelSpec::new("broken"), &Device::Cpu)
            .err()
            .unwrap();
        assert!(matches!(err, MmToolsError::Engine { .. }));
    }

    #[test]
    fn test_persist_written_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing.png");
        assert!(EngineOutput::Written.persist("t", &target).is_err());

        EngineOutput::Bytes(vec![1, 2, 3]).persist("t", &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), vec![1, 2, 3]);
        EngineOutput::Written.persist("t", &target).unwrap();
    }
}
