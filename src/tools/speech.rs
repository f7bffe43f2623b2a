use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{StyleSupport, ToolConfig, ToolSettings};
use crate::engine::{EngineOutput, EngineRegistry, InferenceEngine, InferenceRequest};
use crate::error::{MmToolsError, Result};
use crate::tools::adapter::{Applied, ToolAdapter};
use crate::tools::meta::{ModelSpec, ToolMeta};
use crate::tools::style::{InputStyle, OutputStyle, StyleConverter, ToolValue};

pub const SPEECH_MODEL: &str = "openai/whisper-base";

const SPEECH_STYLES: StyleSupport = StyleSupport {
    default_input: InputStyle::AudioPath,
    inputs: &[InputStyle::AudioPath, InputStyle::Audio],
    default_output: OutputStyle::Text,
    outputs: &[OutputStyle::Text],
};

/// 语音转文字
pub struct SpeechToTextTool {
    meta: ToolMeta,
    settings: ToolSettings,
    engines: Arc<EngineRegistry>,
}

impl SpeechToTextTool {
    pub fn default_meta() -> ToolMeta {
        ToolMeta::builder("Transcribe Speech")
            .model(ModelSpec::new(SPEECH_MODEL))
            .description(
                "This is a useful tool when you want to transcribe the speech in an audio file \
                 into text. like: what does this audio say, or transcribe this recording.",
            )
            .input_description("It takes a string as the input, representing the audio_path.")
            .output_description("It returns a string as the output, representing the transcribed text.")
            .build()
    }

    pub fn new(config: ToolConfig, engines: Arc<EngineRegistry>) -> Result<Self> {
        let meta = config.toolmeta.clone().unwrap_or_else(Self::default_meta);
        let settings = config.resolve(&meta.name, &SPEECH_STYLES)?;
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

impl ToolAdapter for SpeechToTextTool {
    type Engine = Box<dyn InferenceEngine>;
    type Input = PathBuf;
    type Output = String;

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
        self.converter().audio_path(raw)
    }

    fn apply_local(&self, engine: &mut Self::Engine, input: PathBuf) -> Result<Applied<String>> {
        let request = InferenceRequest::new().with_source(input);
        match engine
            .infer(&request, None)
            .map_err(|e| MmToolsError::engine(&self.meta.name, e))?
        {
            EngineOutput::Text(text) => Ok(Applied::new(text.trim().to_string())),
            other => Err(MmToolsError::engine(
                &self.meta.name,
                anyhow::anyhow!("expected a transcription, got {}", other.kind()),
            )),
        }
    }

    fn convert_outputs(&self, raw: String) -> Result<ToolValue> {
        self.converter().text_output(raw)
    }
}
