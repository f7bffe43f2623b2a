use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MmToolsError, Result};
use crate::tools::meta::ToolMeta;
use crate::tools::tool::{Tool, ToolInvocation, ToolMessage};

/// 按工具名（元数据中的 name）索引，供 agent 检索和调用
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 所有工具的元数据，按名字排序
    pub fn metas(&self) -> Vec<ToolMeta> {
        let mut metas: Vec<ToolMeta> = self.tools.values().map(|t| t.meta().clone()).collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    pub async fn call(&self, invocation: ToolInvocation) -> Result<ToolMessage> {
        let tool = self
            .get(&invocation.name)
            .ok_or_else(|| MmToolsError::ToolNotRegistered(invocation.name.clone()))?;
        tool.call(invocation).await
    }
}
