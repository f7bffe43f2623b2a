use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{StyleSupport, ToolConfig, ToolSettings};
use crate::engine::{EngineRegistry, InferenceEngine, InferenceRequest};
use crate::error::{MmToolsError, Result};
use crate::tools::adapter::{Applied, ToolAdapter};
use crate::tools::meta::{ModelSpec, ToolMeta};
use crate::tools::style::{InputStyle, OutputStyle, StyleConverter, ToolValue};
use crate::utils::path::generate_path;

pub const SEMSEG_MODEL: &str = "mask2former_r50_8xb2-90k_cityscapes-512x1024";

const SEMSEG_STYLES: StyleSupport = StyleSupport {
    default_input: InputStyle::ImagePath,
    inputs: &[InputStyle::ImagePath, InputStyle::Image],
    default_output: OutputStyle::ImagePath,
    outputs: &[OutputStyle::ImagePath, OutputStyle::Image],
};

/// 语义分割工具，输出分割可视化图，保存在输入图像旁边
pub struct SemSegTool {
    meta: ToolMeta,
    settings: ToolSettings,
    engines: Arc<EngineRegistry>,
}

impl SemSegTool {
    pub fn default_meta() -> ToolMeta {
        ToolMeta::builder("Segment the Image")
            .model(ModelSpec::new(SEMSEG_MODEL))
            .description(
                "This is a useful tool when you only want to segment the picture or segment all \
                 objects in the picture. like: segment all objects.",
            )
            .input_description("It takes a string as the input, representing the image_path.")
            .output_description("It returns a string as the output, representing the image_path.")
            .build()
    }

    pub fn new(config: ToolConfig, engines: Arc<EngineRegistry>) -> Result<Self> {
        let meta = config.toolmeta.clone().unwrap_or_else(Self::default_meta);
        let settings = config.resolve(&meta.name, &SEMSEG_STYLES)?;
        if meta.model.is_none() {
            return Err(MmToolsError::Config(format!(
                "tool `{}` has no model in its metadata",
                meta.name
            )));
        }
        Ok(Self {
            meta,
            settings,
            engines,
        })
    }

    fn converter(&self) -> StyleConverter<'_> {
        StyleConverter::new(&self.meta.name, &self.settings)
    }
}

impl ToolAdapter for SemSegTool {
    type Engine = Box<dyn InferenceEngine>;
    type Input = PathBuf;
    type Output = PathBuf;

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn build_engine(&self) -> Result<Self::Engine> {
        let model = self.meta.model.as_ref().ok_or_else(|| {
            MmToolsError::Config(format!("tool `{}` has no model in its metadata", self.meta.name))
        })?;
        self.engines
            .construct(&self.meta.name, model, &self.settings.device)
    }

    fn convert_inputs(&self, raw: ToolValue) -> Result<PathBuf> {
        self.converter().image_path(raw)
    }

    fn apply_local(&self, engine: &mut Self::Engine, input: PathBuf) -> Result<Applied<PathBuf>> {
        let destination = generate_path(&input, "semseg");
        let request = InferenceRequest::new().with_source(input);
        engine
            .infer(&request, Some(&destination))
            .map_err(|e| MmToolsError::engine(&self.meta.name, e))?
            .persist(&self.meta.name, &destination)?;
        Ok(Applied::new(destination))
    }

    fn convert_outputs(&self, raw: PathBuf) -> Result<ToolValue> {
        self.converter().image_output(raw)
    }
}
