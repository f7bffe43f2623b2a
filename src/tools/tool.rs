use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{MmToolsError, Result};
use crate::tools::adapter::{ToolCall, ToolHandle};
use crate::tools::meta::ToolMeta;
use crate::tools::style::ToolValue;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolInvocation {
    pub fn new<T: Into<String>>(name: T, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 返回给 agent 的消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolMessage {
    pub id: String,
    pub from: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolMessage {
    /// 文本直接作为内容，图像、音频编码为 JSON
    pub fn from_call(from: impl Into<String>, call: &ToolCall, request: Option<Value>) -> Result<Self> {
        let from = from.into();
        let content = match &call.output {
            ToolValue::Text(text) => text.clone(),
            media => media.to_json()?.to_string(),
        };
        let mut metadata = json!({ "tool": &from, "seed": call.seed });
        if let Some(request) = request {
            metadata["request"] = request;
        }
        Ok(Self {
            id: message_id(),
            from,
            content,
            metadata: Some(metadata),
        })
    }
}

pub fn message_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("msg-{}-{}", now.as_secs(), now.subsec_nanos())
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn meta(&self) -> &ToolMeta;
    async fn call(&self, invocation: ToolInvocation) -> Result<ToolMessage>;
}

/// 把同步工具句柄接入异步 agent
///
/// 调用在 tokio 的阻塞线程池上执行；同一实例的并发调用按顺序串行。
pub struct AgentTool {
    key: String,
    meta: ToolMeta,
    handle: Arc<Mutex<Box<dyn ToolHandle>>>,
}

impl AgentTool {
    pub fn new(key: impl Into<String>, handle: Box<dyn ToolHandle>) -> Self {
        let meta = handle.meta().clone();
        Self {
            key: key.into(),
            meta,
            handle: Arc::new(Mutex::new(handle)),
        }
    }

    /// 工厂中的注册名
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_ready(&self) -> bool {
        self.handle.lock().is_ready()
    }

    pub fn invoke_blocking(&self, raw: ToolValue) -> Result<ToolCall> {
        self.handle.lock().invoke(raw)
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolMessage> {
        let raw = ToolValue::from_json(&self.meta.name, &invocation.input)?;
        let handle = Arc::clone(&self.handle);
        let call = tokio::task::spawn_blocking(move || handle.lock().invoke(raw))
            .await
            .map_err(|e| MmToolsError::Other(anyhow!("tool `{}` task failed: {e}", self.key)))??;
        ToolMessage::from_call(self.key.clone(), &call, invocation.metadata)
    }
}
