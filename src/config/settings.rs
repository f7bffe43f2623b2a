use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MmToolsError, Result};
use crate::tools::meta::ToolMeta;
use crate::tools::style::{Framework, InputStyle, OutputStyle};

pub const DEFAULT_OUTPUT_DIR: &str = "image";
pub const DEFAULT_AUDIO_DIR: &str = "audio";

/// 推理设备
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    Cuda(Option<u32>),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }

    /// CUDA 上用半精度，CPU 上用全精度
    pub fn precision(&self) -> Precision {
        match self {
            Device::Cuda(_) => Precision::F16,
            Device::Cpu => Precision::F32,
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Cuda(None)
    }
}

impl FromStr for Device {
    type Err = MmToolsError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(None)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(|index| Device::Cuda(Some(index)))
                .ok_or_else(|| MmToolsError::Config(format!("unknown device `{other}`"))),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = MmToolsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(None) => f.write_str("cuda"),
            Device::Cuda(Some(index)) => write!(f, "cuda:{index}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F16,
    F32,
}

/// 某个工具支持的风格及其默认值
#[derive(Clone, Copy, Debug)]
pub struct StyleSupport {
    pub default_input: InputStyle,
    pub inputs: &'static [InputStyle],
    pub default_output: OutputStyle,
    pub outputs: &'static [OutputStyle],
}

/// 工具的原始配置（来自 JSON）
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// 整体替换默认的工具元数据
    #[serde(default)]
    pub toolmeta: Option<ToolMeta>,
    #[serde(default)]
    pub input_style: Option<InputStyle>,
    #[serde(default)]
    pub output_style: Option<OutputStyle>,
    #[serde(default)]
    pub framework: Option<Framework>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub audio_dir: Option<PathBuf>,
}

impl ToolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(config: Option<Value>) -> Result<Self> {
        let normalized = config.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(normalized)
            .map_err(|e| MmToolsError::Config(format!("invalid tool config: {e}")))
    }

    pub fn with_toolmeta(mut self, meta: ToolMeta) -> Self {
        self.toolmeta = Some(meta);
        self
    }

    pub fn with_input_style(mut self, style: InputStyle) -> Self {
        self.input_style = Some(style);
        self
    }

    pub fn with_output_style(mut self, style: OutputStyle) -> Self {
        self.output_style = Some(style);
        self
    }

    pub fn with_framework(mut self, framework: Framework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audio_dir = Some(dir.into());
        self
    }

    /// 确定最终风格并校验：显式配置 > 框架预设 > 工具默认
    pub fn resolve(&self, tool: &str, support: &StyleSupport) -> Result<ToolSettings> {
        let input_style = self.input_style.unwrap_or_else(|| match self.framework {
            Some(framework) => support.default_input.for_framework(framework),
            None => support.default_input,
        });
        let output_style = self.output_style.unwrap_or_else(|| match self.framework {
            Some(framework) => support.default_output.for_framework(framework),
            None => support.default_output,
        });

        if !support.inputs.contains(&input_style) {
            return Err(MmToolsError::UnsupportedStyle {
                tool: tool.to_string(),
                style: input_style.to_string(),
            });
        }
        if !support.outputs.contains(&output_style) {
            return Err(MmToolsError::UnsupportedStyle {
                tool: tool.to_string(),
                style: output_style.to_string(),
            });
        }

        Ok(ToolSettings {
            input_style,
            output_style,
            remote: self.remote,
            device: self.device,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            audio_dir: self
                .audio_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIO_DIR)),
        })
    }
}

/// 构造完成后固定的工具设置
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolSettings {
    pub input_style: InputStyle,
    pub output_style: OutputStyle,
    pub remote: bool,
    pub device: Device,
    pub output_dir: PathBuf,
    pub audio_dir: PathBuf,
}
