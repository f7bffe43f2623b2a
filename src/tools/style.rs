//! 输入/输出风格以及与 agent 之间传递的值类型

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ToolSettings;
use crate::error::{MmToolsError, Result};
use crate::utils::path::{ensure_parent_dir, generate_path};

/// 工具接受的输入形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InputStyle {
    Text,
    ImagePath,
    /// 单个字符串 `"<image_path>, <text>"`
    ImagePathText,
    /// 内存中的图像对象
    Image,
    /// 内存中的音频对象
    Audio,
    AudioPath,
}

impl InputStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputStyle::Text => "text",
            InputStyle::ImagePath => "image_path",
            InputStyle::ImagePathText => "image_path, text",
            InputStyle::Image => "pil image",
            InputStyle::Audio => "audio",
            InputStyle::AudioPath => "audio_path",
        }
    }

    /// 按 agent 框架的约定调整默认风格
    pub fn for_framework(self, framework: Framework) -> Self {
        match (framework, self) {
            (Framework::TransformersAgent, InputStyle::ImagePath) => InputStyle::Image,
            (Framework::TransformersAgent, InputStyle::AudioPath) => InputStyle::Audio,
            (_, style) => style,
        }
    }
}

impl FromStr for InputStyle {
    type Err = MmToolsError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_lowercase().as_str() {
            "text" => Ok(InputStyle::Text),
            "image_path" => Ok(InputStyle::ImagePath),
            "image_path, text" | "image_path,text" => Ok(InputStyle::ImagePathText),
            "pil image" | "pil_image" | "image" => Ok(InputStyle::Image),
            "audio" => Ok(InputStyle::Audio),
            "audio_path" => Ok(InputStyle::AudioPath),
            _ => Err(MmToolsError::UnknownStyle {
                axis: "input",
                style: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for InputStyle {
    type Error = MmToolsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InputStyle> for String {
    fn from(style: InputStyle) -> Self {
        style.as_str().to_string()
    }
}

impl fmt::Display for InputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具返回的输出形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputStyle {
    ImagePath,
    /// 内存中的图像对象
    Image,
    Text,
}

impl OutputStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStyle::ImagePath => "image_path",
            OutputStyle::Image => "pil image",
            OutputStyle::Text => "text",
        }
    }

    pub fn for_framework(self, framework: Framework) -> Self {
        match (framework, self) {
            (Framework::TransformersAgent, OutputStyle::ImagePath) => OutputStyle::Image,
            (_, style) => style,
        }
    }
}

impl FromStr for OutputStyle {
    type Err = MmToolsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image_path" => Ok(OutputStyle::ImagePath),
            "pil image" | "pil_image" | "image" => Ok(OutputStyle::Image),
            "text" => Ok(OutputStyle::Text),
            _ => Err(MmToolsError::UnknownStyle {
                axis: "output",
                style: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for OutputStyle {
    type Error = MmToolsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<OutputStyle> for String {
    fn from(style: OutputStyle) -> Self {
        style.as_str().to_string()
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调用方所属的 agent 框架
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    /// 以字符串和文件路径交互
    Langchain,
    /// 以图像、音频对象交互
    #[serde(alias = "huggingface", alias = "hf")]
    TransformersAgent,
}

/// 内存中的音频（保持原始编码）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            bytes,
            extension: extension.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| MmToolsError::io(path, e))?;
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wav".to_string());
        Ok(Self { bytes, extension })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        fs::write(path, &self.bytes).map_err(|e| MmToolsError::io(path, e))
    }
}

/// agent 与工具之间传递的值
#[derive(Clone, Debug)]
pub enum ToolValue {
    Text(String),
    Image(DynamicImage),
    Audio(AudioClip),
}

const KEYWORD_FIELDS: [&str; 7] = [
    "text",
    "prompt",
    "image_path",
    "audio_path",
    "audio",
    "image",
    "path",
];

impl ToolValue {
    pub fn text(value: impl Into<String>) -> Self {
        ToolValue::Text(value.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolValue::Text(_) => "text",
            ToolValue::Image(_) => "image",
            ToolValue::Audio(_) => "audio",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&DynamicImage> {
        match self {
            ToolValue::Image(img) => Some(img),
            _ => None,
        }
    }

    /// 解析 agent 传入的 JSON
    ///
    /// - 字符串：文本
    /// - `{"image_base64": ...}`：图像
    /// - `{"audio_base64": ..., "extension": ...}`：音频
    /// - `{"image_path": ..., "text" | "prompt": ...}`：组合成 `"<path>, <text>"`
    /// - 含 text / prompt / image_path 等关键字段的对象：该字段的文本
    pub fn from_json(tool: &str, value: &Value) -> Result<Self> {
        if let Some(s) = value.as_str() {
            return Ok(ToolValue::Text(s.to_string()));
        }

        let obj = value.as_object().ok_or_else(|| {
            MmToolsError::invalid_input(tool, format!("unsupported input payload: {value}"))
        })?;

        if let Some(encoded) = obj.get("image_base64").and_then(|v| v.as_str()) {
            let bytes = decode_base64(tool, encoded)?;
            return Ok(ToolValue::Image(image::load_from_memory(&bytes)?));
        }

        if let Some(encoded) = obj.get("audio_base64").and_then(|v| v.as_str()) {
            let bytes = decode_base64(tool, encoded)?;
            let extension = obj
                .get("extension")
                .and_then(|v| v.as_str())
                .unwrap_or("wav");
            return Ok(ToolValue::Audio(AudioClip::new(bytes, extension)));
        }

        let prompt = ["text", "prompt"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(|v| v.as_str()));
        if let (Some(path), Some(text)) = (obj.get("image_path").and_then(|v| v.as_str()), prompt) {
            return Ok(ToolValue::Text(format!("{path}, {text}")));
        }

        KEYWORD_FIELDS
            .iter()
            .find_map(|key| obj.get(*key).and_then(|v| v.as_str()))
            .map(|s| ToolValue::Text(s.to_string()))
            .ok_or_else(|| {
                MmToolsError::invalid_input(tool, format!("no usable field in input: {value}"))
            })
    }

    /// 转为 JSON，图像编码为 PNG base64
    pub fn to_json(&self) -> Result<Value> {
        match self {
            ToolValue::Text(s) => Ok(Value::String(s.clone())),
            ToolValue::Image(img) => {
                let mut buffer = Cursor::new(Vec::new());
                img.write_to(&mut buffer, ImageFormat::Png)?;
                Ok(json!({
                    "image_base64": general_purpose::STANDARD.encode(buffer.into_inner()),
                    "width": img.width(),
                    "height": img.height(),
                }))
            }
            ToolValue::Audio(clip) => Ok(json!({
                "audio_base64": general_purpose::STANDARD.encode(&clip.bytes),
                "extension": clip.extension,
            })),
        }
    }
}

fn decode_base64(tool: &str, encoded: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| MmToolsError::invalid_input(tool, format!("invalid base64 payload: {e}")))
}

/// 按第一个逗号拆分 `"<path>, <text>"`，其余逗号属于文本
///
/// 没有逗号时整个输入视为路径，文本为空。
pub fn split_path_and_text(raw: &str) -> Option<(&str, &str)> {
    let (path, text) = raw.split_once(',').unwrap_or((raw, ""));
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    Some((path, text.trim()))
}

/// 按工具声明的风格转换输入、输出
pub struct StyleConverter<'a> {
    tool: &'a str,
    settings: &'a ToolSettings,
}

impl<'a> StyleConverter<'a> {
    pub fn new(tool: &'a str, settings: &'a ToolSettings) -> Self {
        Self { tool, settings }
    }

    fn unsupported(&self, style: impl fmt::Display) -> MmToolsError {
        MmToolsError::UnsupportedStyle {
            tool: self.tool.to_string(),
            style: style.to_string(),
        }
    }

    fn expect_text(&self, raw: ToolValue) -> Result<String> {
        match raw {
            ToolValue::Text(s) => Ok(s),
            other => Err(MmToolsError::invalid_input(
                self.tool,
                format!(
                    "style `{}` expects text, got {}",
                    self.settings.input_style,
                    other.kind()
                ),
            )),
        }
    }

    pub fn text(&self, raw: ToolValue) -> Result<String> {
        match self.settings.input_style {
            InputStyle::Text => self.expect_text(raw),
            style => Err(self.unsupported(style)),
        }
    }

    pub fn image_path(&self, raw: ToolValue) -> Result<PathBuf> {
        match (self.settings.input_style, raw) {
            (InputStyle::ImagePath, raw) => Ok(PathBuf::from(self.expect_text(raw)?.trim())),
            (InputStyle::Image, ToolValue::Image(img)) => {
                let path = generate_path(self.settings.output_dir.join("temp.png"), "temp");
                ensure_parent_dir(&path)?;
                img.save(&path)?;
                debug!(tool = self.tool, path = %path.display(), "saved image input");
                Ok(path)
            }
            (InputStyle::Image, other) => Err(MmToolsError::invalid_input(
                self.tool,
                format!("style `pil image` expects an image, got {}", other.kind()),
            )),
            (style, _) => Err(self.unsupported(style)),
        }
    }

    pub fn audio_path(&self, raw: ToolValue) -> Result<PathBuf> {
        match (self.settings.input_style, raw) {
            (InputStyle::AudioPath, raw) => Ok(PathBuf::from(self.expect_text(raw)?.trim())),
            (InputStyle::Audio, ToolValue::Audio(clip)) => {
                let template = self
                    .settings
                    .audio_dir
                    .join(format!("temp.{}", clip.extension));
                let path = generate_path(template, "temp");
                clip.save(&path)?;
                debug!(tool = self.tool, path = %path.display(), "saved audio input");
                Ok(path)
            }
            (InputStyle::Audio, other) => Err(MmToolsError::invalid_input(
                self.tool,
                format!("style `audio` expects audio, got {}", other.kind()),
            )),
            (style, _) => Err(self.unsupported(style)),
        }
    }

    pub fn path_and_text(&self, raw: ToolValue) -> Result<(PathBuf, String)> {
        match self.settings.input_style {
            InputStyle::ImagePathText => {
                let raw = self.expect_text(raw)?;
                let (path, text) = split_path_and_text(&raw).ok_or_else(|| {
                    MmToolsError::invalid_input(
                        self.tool,
                        format!("expected `<image_path>, <text>` with a non-empty path, got `{raw}`"),
                    )
                })?;
                Ok((PathBuf::from(path), text.to_string()))
            }
            style => Err(self.unsupported(style)),
        }
    }

    pub fn image_output(&self, path: PathBuf) -> Result<ToolValue> {
        match self.settings.output_style {
            OutputStyle::ImagePath => Ok(ToolValue::Text(path.to_string_lossy().into_owned())),
            OutputStyle::Image => Ok(ToolValue::Image(image::open(&path)?)),
            style => Err(self.unsupported(style)),
        }
    }

    pub fn text_output(&self, text: String) -> Result<ToolValue> {
        match self.settings.output_style {
            OutputStyle::Text => Ok(ToolValue::Text(text)),
            style => Err(self.unsupported(style)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_styles() {
        assert_eq!("text".parse::<InputStyle>().unwrap(), InputStyle::Text);
        assert_eq!(
            "image_path, text".parse::<InputStyle>().unwrap(),
            InputStyle::ImagePathText
        );
        assert_eq!(
            "image_path,text".parse::<InputStyle>().unwrap(),
            InputStyle::ImagePathText
        );
        assert_eq!("pil image".parse::<InputStyle>().unwrap(), InputStyle::Image);
        assert_eq!("audio_path".parse::<InputStyle>().unwrap(), InputStyle::AudioPath);
    }

    #[test]
    fn test_parse_unknown_style_fails() {
        let err = "video".parse::<InputStyle>().unwrap_err();
        assert!(matches!(err, MmToolsError::UnknownStyle { axis: "input", .. }));
        let err = "json".parse::<OutputStyle>().unwrap_err();
        assert!(matches!(err, MmToolsError::UnknownStyle { axis: "output", .. }));
    }

    #[test]
    fn test_style_serde_uses_string_form() {
        let style: OutputStyle = serde_json::from_value(json!("pil image")).unwrap();
        assert_eq!(style, OutputStyle::Image);
        assert_eq!(
            serde_json::to_value(InputStyle::ImagePathText).unwrap(),
            json!("image_path, text")
        );
        assert!(serde_json::from_value::<InputStyle>(json!("nope")).is_err());
    }

    #[test]
    fn test_framework_presets() {
        let hf = Framework::TransformersAgent;
        assert_eq!(InputStyle::ImagePath.for_framework(hf), InputStyle::Image);
        assert_eq!(InputStyle::AudioPath.for_framework(hf), InputStyle::Audio);
        assert_eq!(
            InputStyle::ImagePathText.for_framework(hf),
            InputStyle::ImagePathText
        );
        assert_eq!(OutputStyle::ImagePath.for_framework(hf), OutputStyle::Image);
        assert_eq!(OutputStyle::Text.for_framework(hf), OutputStyle::Text);
        assert_eq!(
            InputStyle::ImagePath.for_framework(Framework::Langchain),
            InputStyle::ImagePath
        );
    }

    #[test]
    fn test_split_path_and_text_first_comma_only() {
        assert_eq!(
            split_path_and_text("img.png, a cat, sitting"),
            Some(("img.png", "a cat, sitting"))
        );
        assert_eq!(split_path_and_text("img.png,dog"), Some(("img.png", "dog")));
        assert_eq!(split_path_and_text(" img.png "), Some(("img.png", "")));
        assert_eq!(split_path_and_text("img.png,"), Some(("img.png", "")));
        assert_eq!(split_path_and_text(" , text"), None);
        assert_eq!(split_path_and_text("   "), None);
    }

    #[test]
    fn test_from_json_variants() {
        let value = ToolValue::from_json("t", &json!("a red bicycle")).unwrap();
        assert_eq!(value.as_text(), Some("a red bicycle"));

        let value = ToolValue::from_json("t", &json!({"audio": "speech.flac"})).unwrap();
        assert_eq!(value.as_text(), Some("speech.flac"));

        let value =
            ToolValue::from_json("t", &json!({"image_path": "seg.png", "text": "a house"}))
                .unwrap();
        assert_eq!(value.as_text(), Some("seg.png, a house"));

        let value = ToolValue::from_json(
            "t",
            &json!({"image_path": "seg.png", "prompt": "a house, by the lake"}),
        )
        .unwrap();
        assert_eq!(value.as_text(), Some("seg.png, a house, by the lake"));

        let err = ToolValue::from_json("t", &json!(42)).unwrap_err();
        assert!(matches!(err, MmToolsError::InvalidInput { .. }));
    }

    #[test]
    fn test_image_json_round_trip_keeps_dimensions() {
        let img = DynamicImage::new_rgb8(3, 2);
        let encoded = ToolValue::Image(img).to_json().unwrap();
        assert_eq!(encoded["width"], 3);
        assert_eq!(encoded["height"], 2);

        let decoded = ToolValue::from_json("t", &encoded).unwrap();
        let img = decoded.as_image().unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn test_audio_clip_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.flac");
        fs::write(&path, [7u8, 8, 9]).unwrap();

        let clip = AudioClip::from_path(&path).unwrap();
        assert_eq!(clip, AudioClip::new(vec![7, 8, 9], "flac"));

        let err = AudioClip::from_path(dir.path().join("missing.wav")).unwrap_err();
        assert!(matches!(err, MmToolsError::Io { .. }));
    }

    #[test]
    fn test_audio_json_carries_extension() {
        let clip = AudioClip::new(vec![1, 2, 3], "flac");
        let encoded = ToolValue::Audio(clip.clone()).to_json().unwrap();
        match ToolValue::from_json("t", &encoded).unwrap() {
            ToolValue::Audio(decoded) => assert_eq!(decoded, clip),
            other => panic!("unexpected value {}", other.kind()),
        }
    }
}
