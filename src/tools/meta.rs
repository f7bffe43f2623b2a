use serde::{Deserialize, Serialize};

/// 模型选择参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelSpec {
    #[serde(alias = "model_name", alias = "model")]
    pub name: String,
    #[serde(default, alias = "model_setting", skip_serializing_if = "Option::is_none")]
    pub setting: Option<u32>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setting: None,
        }
    }

    pub fn with_setting(mut self, setting: u32) -> Self {
        self.setting = Some(setting);
        self
    }
}

/// 工具元数据，供 agent 选择工具使用
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSpec>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_description: Option<String>,
}

impl ToolMeta {
    pub fn builder(name: impl Into<String>) -> ToolMetaBuilder {
        ToolMetaBuilder::new(name)
    }
}

#[derive(Clone, Debug)]
pub struct ToolMetaBuilder {
    meta: ToolMeta,
}

impl ToolMetaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: ToolMeta {
                name: name.into(),
                model: None,
                description: String::new(),
                input_description: None,
                output_description: None,
            },
        }
    }

    pub fn model(mut self, model: ModelSpec) -> Self {
        self.meta.model = Some(model);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    pub fn input_description(mut self, description: impl Into<String>) -> Self {
        self.meta.input_description = Some(description.into());
        self
    }

    pub fn output_description(mut self, description: impl Into<String>) -> Self {
        self.meta.output_description = Some(description.into());
        self
    }

    pub fn build(self) -> ToolMeta {
        self.meta
    }
}
