//! 工具适配协议
//!
//! 每个具体工具实现 [`ToolAdapter`]，由 [`ToolRunner`] 驱动一次完整调用：
//! convert_inputs → apply（本地或远程）→ convert_outputs。
//! 本地引擎在第一次本地调用时构造，之后一直复用。

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::ToolSettings;
use crate::engine::RemoteInference;
use crate::error::{MmToolsError, Result};
use crate::tools::meta::ToolMeta;
use crate::tools::style::ToolValue;

/// apply 的结果，附带本次调用使用的随机种子
#[derive(Clone, Debug, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub seed: Option<u32>,
}

impl<T> Applied<T> {
    pub fn new(value: T) -> Self {
        Self { value, seed: None }
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// 一次调用的结果记录
#[derive(Clone, Debug)]
pub struct ToolCall {
    pub output: ToolValue,
    pub seed: Option<u32>,
}

pub trait ToolAdapter: Send + 'static {
    type Engine: Send;
    type Input: Send;
    type Output: Send;

    fn meta(&self) -> &ToolMeta;

    fn settings(&self) -> &ToolSettings;

    fn build_engine(&self) -> Result<Self::Engine>;

    fn convert_inputs(&self, raw: ToolValue) -> Result<Self::Input>;

    fn apply_local(
        &self,
        engine: &mut Self::Engine,
        input: Self::Input,
    ) -> Result<Applied<Self::Output>>;

    fn supports_remote(&self) -> bool {
        false
    }

    fn apply_remote(
        &self,
        remote: &dyn RemoteInference,
        input: Self::Input,
    ) -> Result<Applied<Self::Output>> {
        let _ = (remote, input);
        Err(MmToolsError::RemoteNotImplemented(self.meta().name.clone()))
    }

    fn convert_outputs(&self, raw: Self::Output) -> Result<ToolValue>;
}

/// 引擎句柄的两种状态
pub enum EngineSlot<E> {
    Uninitialized,
    Ready(E),
}

impl<E> Default for EngineSlot<E> {
    fn default() -> Self {
        EngineSlot::Uninitialized
    }
}

impl<E> EngineSlot<E> {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineSlot::Ready(_))
    }

    pub fn get_or_try_init<F>(&mut self, init: F) -> Result<&mut E>
    where
        F: FnOnce() -> Result<E>,
    {
        if let EngineSlot::Uninitialized = self {
            *self = EngineSlot::Ready(init()?);
        }
        match self {
            EngineSlot::Ready(engine) => Ok(engine),
            EngineSlot::Uninitialized => Err(MmToolsError::Config("engine slot is empty".into())),
        }
    }

    pub fn take(&mut self) -> Option<E> {
        match std::mem::take(self) {
            EngineSlot::Ready(engine) => Some(engine),
            EngineSlot::Uninitialized => None,
        }
    }
}

/// 驱动单个工具实例，独占其引擎
pub struct ToolRunner<A: ToolAdapter> {
    adapter: A,
    engine: EngineSlot<A::Engine>,
    remote: Option<Arc<dyn RemoteInference>>,
}

impl<A: ToolAdapter> ToolRunner<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            engine: EngineSlot::Uninitialized,
            remote: None,
        }
    }

    /// 构造时立即加载引擎
    pub fn eager(adapter: A) -> Result<Self> {
        let mut runner = Self::new(adapter);
        runner.setup()?;
        Ok(runner)
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteInference>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// 幂等：引擎已就绪时不做任何事
    pub fn setup(&mut self) -> Result<&mut A::Engine> {
        ready_engine(&self.adapter, &mut self.engine)
    }

    /// 释放引擎，下次本地调用时重新构造
    pub fn unload(&mut self) {
        if self.engine.take().is_some() {
            debug!(tool = %self.adapter.meta().name, "engine unloaded");
        }
    }

    pub fn call(&mut self, raw: ToolValue) -> Result<ToolCall> {
        let started = Instant::now();
        let input = self.adapter.convert_inputs(raw)?;
        let applied = self.apply(input)?;
        let output = self.adapter.convert_outputs(applied.value)?;
        info!(
            tool = %self.adapter.meta().name,
            remote = self.adapter.settings().remote,
            output = output.kind(),
            seed = ?applied.seed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call finished"
        );
        Ok(ToolCall {
            output,
            seed: applied.seed,
        })
    }

    fn apply(&mut self, input: A::Input) -> Result<Applied<A::Output>> {
        if self.adapter.settings().remote {
            if !self.adapter.supports_remote() {
                return Err(MmToolsError::RemoteNotImplemented(
                    self.adapter.meta().name.clone(),
                ));
            }
            let remote = self.remote.as_deref().ok_or_else(|| {
                MmToolsError::Config(format!(
                    "tool `{}` is configured for remote execution but no remote client is set",
                    self.adapter.meta().name
                ))
            })?;
            return self.adapter.apply_remote(remote, input);
        }

        let engine = ready_engine(&self.adapter, &mut self.engine)?;
        self.adapter.apply_local(engine, input)
    }
}

fn ready_engine<'a, A: ToolAdapter>(
    adapter: &A,
    slot: &'a mut EngineSlot<A::Engine>,
) -> Result<&'a mut A::Engine> {
    if !slot.is_ready() {
        debug!(tool = %adapter.meta().name, device = %adapter.settings().device, "constructing engine");
    }
    slot.get_or_try_init(|| adapter.build_engine())
}

/// 类型擦除后的同步工具句柄
pub trait ToolHandle: Send {
    fn meta(&self) -> &ToolMeta;
    fn settings(&self) -> &ToolSettings;
    fn supports_remote(&self) -> bool;
    fn is_ready(&self) -> bool;
    fn setup(&mut self) -> Result<()>;
    fn invoke(&mut self, raw: ToolValue) -> Result<ToolCall>;
    fn unload(&mut self);
}

impl<A: ToolAdapter> ToolHandle for ToolRunner<A> {
    fn meta(&self) -> &ToolMeta {
        self.adapter.meta()
    }

    fn settings(&self) -> &ToolSettings {
        self.adapter.settings()
    }

    fn supports_remote(&self) -> bool {
        self.adapter.supports_remote()
    }

    fn is_ready(&self) -> bool {
        ToolRunner::is_ready(self)
    }

    fn setup(&mut self) -> Result<()> {
        ToolRunner::setup(self).map(|_| ())
    }

    fn invoke(&mut self, raw: ToolValue) -> Result<ToolCall> {
        self.call(raw)
    }

    fn unload(&mut self) {
        ToolRunner::unload(self)
    }
}
