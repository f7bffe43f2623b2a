//! 图像生成工具：文生图、ControlNet 条件生成、专用管线条件生成

use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;

use crate::config::{StyleSupport, ToolConfig, ToolSettings};
use crate::engine::{
    write_bytes, EngineRegistry, InferenceEngine, InferenceRequest, PipelineLoader, PipelineSpec,
    RemoteArg, RemoteInference, SamplingParams, Scheduler,
};
use crate::error::{MmToolsError, Result};
use crate::tools::adapter::{Applied, ToolAdapter};
use crate::tools::meta::{ModelSpec, ToolMeta};
use crate::tools::style::{InputStyle, OutputStyle, StyleConverter, ToolValue};
use crate::utils::path::{ensure_parent_dir, generate_path};

/// 追加在用户描述之后的质量提示词
pub const AUX_PROMPT: &str = "best quality, extremely detailed";

pub const NEGATIVE_PROMPT: &str = "longbody, lowres, bad anatomy, bad hands, missing fingers, \
extra digit, fewer digits, cropped, worst quality, low quality";

pub const SAMPLING_STEPS: u32 = 20;
pub const SAMPLING_ETA: f32 = 0.0;
pub const GUIDANCE_SCALE: f32 = 9.0;
pub const MAX_SEED: u32 = 65535;

pub const BASE_MODEL: &str = "runwayml/stable-diffusion-v1-5";
pub const SAFETY_CHECKER: &str = "CompVis/stable-diffusion-safety-checker";

const IMAGE_OUTPUTS: &[OutputStyle] = &[OutputStyle::ImagePath, OutputStyle::Image];

pub(crate) const TEXT2IMAGE_STYLES: StyleSupport = StyleSupport {
    default_input: InputStyle::Text,
    inputs: &[InputStyle::Text],
    default_output: OutputStyle::ImagePath,
    outputs: IMAGE_OUTPUTS,
};

pub(crate) const CONDITIONED_STYLES: StyleSupport = StyleSupport {
    default_input: InputStyle::ImagePathText,
    inputs: &[InputStyle::ImagePathText],
    default_output: OutputStyle::ImagePath,
    outputs: IMAGE_OUTPUTS,
};

/// 在用户描述后追加质量提示词
pub fn augment_prompt(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        AUX_PROMPT.to_string()
    } else {
        format!("{prompt}, {AUX_PROMPT}")
    }
}

fn resolve_meta(config: &ToolConfig, default: ToolMeta) -> ToolMeta {
    config.toolmeta.clone().unwrap_or(default)
}

fn required_model<'a>(meta: &'a ToolMeta) -> Result<&'a ModelSpec> {
    meta.model.as_ref().ok_or_else(|| {
        MmToolsError::Config(format!("tool `{}` has no model in its metadata", meta.name))
    })
}

/// 根据用户文本生成图像
pub struct Text2ImageTool {
    meta: ToolMeta,
    settings: ToolSettings,
    engines: Arc<EngineRegistry>,
}

impl Text2ImageTool {
    pub fn default_meta() -> ToolMeta {
        ToolMeta::builder("Generate Image From User Input Text")
            .model(ModelSpec::new("stable_diffusion"))
            .description(
                "This is a useful tool when you want to generate an image from a user input \
                 text and save it to a file. like: generate an image of an object or something, \
                 or generate an image that includes some objects.",
            )
            .input_description(
                "It takes a string as the input, representing the text that the tool required.",
            )
            .output_description("It returns a string as the output, representing the image_path.")
            .build()
    }

    pub fn new(config: ToolConfig, engines: Arc<EngineRegistry>) -> Result<Self> {
        let meta = resolve_meta(&config, Self::default_meta());
        let settings = config.resolve(&meta.name, &TEXT2IMAGE_STYLES)?;
        required_model(&meta)?;
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

impl ToolAdapter for Text2ImageTool {
    type Engine = Box<dyn InferenceEngine>;
    type Input = String;
    type Output = PathBuf;

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn build_engine(&self) -> Result<Self::Engine> {
        self.engines
            .construct(&self.meta.name, required_model(&self.meta)?, &self.settings.device)
    }

    fn convert_inputs(&self, raw: ToolValue) -> Result<String> {
        self.converter().text(raw)
    }

    fn apply_local(
        &self,
        engine: &mut Self::Engine,
        input: String,
    ) -> Result<Applied<PathBuf>> {
        let request = InferenceRequest::new().with_prompt(augment_prompt(&input));
        let destination =
            generate_path(self.settings.output_dir.join("sd-res.png"), "generate-image");
        ensure_parent_dir(&destination)?;
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

/// 共用 ControlNet 引擎的条件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Segmentation,
    Canny,
    Pose,
}

impl Condition {
    /// ControlNet 引擎中的条件编号
    pub fn model_setting(&self) -> u32 {
        match self {
            Condition::Canny => 1,
            Condition::Pose => 2,
            Condition::Segmentation => 3,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Condition::Segmentation => "generate-image-from-seg",
            Condition::Canny => "generate-image-from-canny",
            Condition::Pose => "generate-image-from-pose",
        }
    }

    /// 托管推理服务上的模型键，None 表示不支持远程
    pub fn remote_key(&self) -> Option<&'static str> {
        match self {
            Condition::Canny => Some("mmagic/controlnet_canny"),
            Condition::Segmentation | Condition::Pose => None,
        }
    }

    pub fn default_meta(&self) -> ToolMeta {
        let model = ModelSpec::new("controlnet").with_setting(self.model_setting());
        let (name, description, image_kind) = match self {
            Condition::Segmentation => (
                "Generate Image Condition On Segmentations",
                "This is a useful tool when you want to generate a new real image from a \
                 segmentation image and the user description. like: generate a real image of a \
                 object or something from this segmentation image. or generate a new real image \
                 of a object or something from this segmentation image.",
                "segmentation",
            ),
            Condition::Canny => (
                "Generate Image Condition On Canny Image",
                "This is a useful tool when you want to generate a new real image from a canny \
                 image and the user description. like: generate a real image of a object or \
                 something from this canny image. or generate a new real image of a object or \
                 something from this edge image.",
                "canny",
            ),
            Condition::Pose => (
                "Generate Image Condition On Pose Image",
                "This is a useful tool when you want to generate a new real image from a human \
                 pose image and the user description. like: generate a real image of a human \
                 from this human pose image. or generate a new real image of a human from this \
                 pose.",
                "human pose",
            ),
        };
        ToolMeta::builder(name)
            .model(model)
            .description(description)
            .input_description(format!(
                "The input to this tool should be a comma separated string of two, representing \
                 the image_path of a {image_kind} image and the text description of objects to \
                 generate."
            ))
            .output_description("It returns a string as the output, representing the image_path.")
            .build()
    }
}

/// 基于条件图和用户描述生成图像（共用 ControlNet 引擎）
pub struct ConditionedImageTool {
    condition: Condition,
    meta: ToolMeta,
    settings: ToolSettings,
    engines: Arc<EngineRegistry>,
}

impl ConditionedImageTool {
    pub fn new(
        condition: Condition,
        config: ToolConfig,
        engines: Arc<EngineRegistry>,
    ) -> Result<Self> {
        let meta = resolve_meta(&config, condition.default_meta());
        let settings = config.resolve(&meta.name, &CONDITIONED_STYLES)?;
        required_model(&meta)?;
        Ok(Self {
            condition,
            meta,
            settings,
            engines,
        })
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    fn destination(&self) -> PathBuf {
        generate_path(
            self.settings.output_dir.join("controlnet-res.png"),
            self.condition.tag(),
        )
    }

    fn converter(&self) -> StyleConverter<'_> {
        StyleConverter::new(&self.meta.name, &self.settings)
    }
}

impl ToolAdapter for ConditionedImageTool {
    type Engine = Box<dyn InferenceEngine>;
    type Input = (PathBuf, String);
    type Output = PathBuf;

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn build_engine(&self) -> Result<Self::Engine> {
        self.engines
            .construct(&self.meta.name, required_model(&self.meta)?, &self.settings.device)
    }

    fn convert_inputs(&self, raw: ToolValue) -> Result<Self::Input> {
        self.converter().path_and_text(raw)
    }

    fn apply_local(
        &self,
        engine: &mut Self::Engine,
        (control, prompt): Self::Input,
    ) -> Result<Applied<PathBuf>> {
        let request = InferenceRequest::new()
            .with_prompt(prompt)
            .with_control(control);
        let destination = self.destination();
        ensure_parent_dir(&destination)?;
        engine
            .infer(&request, Some(&destination))
            .map_err(|e| MmToolsError::engine(&self.meta.name, e))?
            .persist(&self.meta.name, &destination)?;
        Ok(Applied::new(destination))
    }

    fn supports_remote(&self) -> bool {
        self.condition.remote_key().is_some()
    }

    fn apply_remote(
        &self,
        remote: &dyn RemoteInference,
        (control, prompt): Self::Input,
    ) -> Result<Applied<PathBuf>> {
        let key = self
            .condition
            .remote_key()
            .ok_or_else(|| MmToolsError::RemoteNotImplemented(self.meta.name.clone()))?;
        let destination = self.destination();
        let bytes = remote.inference(key, &[RemoteArg::Path(control), RemoteArg::Text(prompt)])?;
        write_bytes(&destination, &bytes)?;
        Ok(Applied::new(destination))
    }

    fn convert_outputs(&self, raw: PathBuf) -> Result<ToolValue> {
        self.converter().image_output(raw)
    }
}

/// 专用管线使用的条件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guidance {
    Scribble,
    Depth,
}

impl Guidance {
    pub fn controlnet(&self) -> &'static str {
        match self {
            Guidance::Scribble => "fusing/stable-diffusion-v1-5-controlnet-scribble",
            Guidance::Depth => "fusing/stable-diffusion-v1-5-controlnet-depth",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Guidance::Scribble => "generate-image-from-scribble",
            Guidance::Depth => "generate-image-from-depth",
        }
    }

    pub fn default_meta(&self) -> ToolMeta {
        let builder = match self {
            Guidance::Scribble => ToolMeta::builder("Generate Image Condition On Scribble Image")
                .description(
                    "This is a useful tool when you want to generate a new real image from both \
                     the user description and a scribble image or a sketch image.",
                )
                .input_description(
                    "The input to this tool should be a comma separated string of two, \
                     representing the image_path of a scribble image and the text description \
                     of objects to generate.",
                ),
            Guidance::Depth => ToolMeta::builder("Generate Image Condition On Depth Text")
                .description(
                    "This is a useful tool when you want to generate a new real image from both \
                     the user description and a depth image.",
                )
                .input_description(
                    "The input to this tool should be a comma separated string of two, \
                     representing the image_path of a depth image and the text description of \
                     objects to generate.",
                ),
        };
        builder
            .output_description("It returns a string as the output, representing the image_path.")
            .build()
    }
}

/// 基于涂鸦图 / 深度图生成图像，管线在构造时组装
pub struct GuidedImageTool {
    guidance: Guidance,
    meta: ToolMeta,
    settings: ToolSettings,
    pipeline: PipelineSpec,
    loader: PipelineLoader,
}

impl GuidedImageTool {
    pub fn new(guidance: Guidance, config: ToolConfig, loader: PipelineLoader) -> Result<Self> {
        let meta = resolve_meta(&config, guidance.default_meta());
        let settings = config.resolve(&meta.name, &CONDITIONED_STYLES)?;
        let pipeline = PipelineSpec {
            base_model: BASE_MODEL.to_string(),
            controlnet: guidance.controlnet().to_string(),
            safety_checker: Some(SAFETY_CHECKER.to_string()),
            scheduler: Scheduler::UniPcMultistep,
            precision: settings.device.precision(),
        };
        Ok(Self {
            guidance,
            meta,
            settings,
            pipeline,
            loader,
        })
    }

    pub fn guidance(&self) -> Guidance {
        self.guidance
    }

    pub fn pipeline(&self) -> &PipelineSpec {
        &self.pipeline
    }

    fn converter(&self) -> StyleConverter<'_> {
        StyleConverter::new(&self.meta.name, &self.settings)
    }
}

impl ToolAdapter for GuidedImageTool {
    type Engine = Box<dyn InferenceEngine>;
    type Input = (PathBuf, String);
    type Output = PathBuf;

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn build_engine(&self) -> Result<Self::Engine> {
        tracing::debug!(
            tool = %self.meta.name,
            base = %self.pipeline.base_model,
            controlnet = %self.pipeline.controlnet,
            precision = ?self.pipeline.precision,
            "assembling pipeline"
        );
        (self.loader)(&self.pipeline, &self.settings.device)
            .map_err(|e| MmToolsError::engine(&self.meta.name, e))
    }

    fn convert_inputs(&self, raw: ToolValue) -> Result<Self::Input> {
        self.converter().path_and_text(raw)
    }

    fn apply_local(
        &self,
        engine: &mut Self::Engine,
        (image_path, prompt): Self::Input,
    ) -> Result<Applied<PathBuf>> {
        let seed = rand::thread_rng().gen_range(0..=MAX_SEED);
        let request = InferenceRequest::new()
            .with_prompt(augment_prompt(&prompt))
            .with_negative_prompt(NEGATIVE_PROMPT)
            .with_control(image_path.clone())
            .with_sampling(SamplingParams {
                steps: SAMPLING_STEPS,
                eta: SAMPLING_ETA,
                guidance_scale: GUIDANCE_SCALE,
                seed,
            });
        let destination = generate_path(&image_path, self.guidance.tag());
        engine
            .infer(&request, Some(&destination))
            .map_err(|e| MmToolsError::engine(&self.meta.name, e))?
            .persist(&self.meta.name, &destination)?;
        Ok(Applied::new(destination).with_seed(seed))
    }

    fn convert_outputs(&self, raw: PathBuf) -> Result<ToolValue> {
        self.converter().image_output(raw)
    }
}
