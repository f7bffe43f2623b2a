use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use mmtools::tools::factory::{CANNY2IMAGE, SEMSEG, TEXT2IMAGE};
use mmtools::{
    load_tool, Applied, Backends, Device, EngineOutput, EngineRegistry, InferenceEngine,
    InferenceRequest, MmToolsError, ModelSpec, ToolAdapter, ToolConfig, ToolMeta, ToolRunner,
    ToolSettings, ToolValue,
};
use serde_json::json;
use tempfile::tempdir;

struct PaintEngine;

impl InferenceEngine for PaintEngine {
    fn infer(
        &mut self,
        _request: &InferenceRequest,
        destination: Option<&Path>,
    ) -> anyhow::Result<EngineOutput> {
        let destination = destination.ok_or_else(|| anyhow!("missing destination"))?;
        image::RgbImage::new(4, 4).save(destination)?;
        Ok(EngineOutput::Written)
    }
}

fn counting_backends(models: &[&str], builds: Arc<AtomicUsize>) -> Backends {
    let mut engines = EngineRegistry::new();
    for model in models {
        let builds = Arc::clone(&builds);
        engines.register_factory(
            *model,
            Arc::new(
                move |_: &ModelSpec, _: &Device| -> anyhow::Result<Box<dyn InferenceEngine>> {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(PaintEngine))
                },
            ),
        );
    }
    Backends::new().with_engines(engines)
}

#[test]
fn engine_is_constructed_lazily_and_once() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let builds = Arc::new(AtomicUsize::new(0));
    let backends = counting_backends(&["stable_diffusion"], Arc::clone(&builds));

    let mut tool = load_tool(
        TEXT2IMAGE,
        &backends,
        Some(json!({ "output_dir": dir.path(), "device": "cpu" })),
    )?;
    assert!(!tool.is_ready());
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    for _ in 0..3 {
        tool.setup()?;
    }
    assert!(tool.is_ready());
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    tool.invoke(ToolValue::text("a red bicycle"))?;
    tool.invoke(ToolValue::text("a blue bicycle"))?;
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn unload_returns_to_uninitialized() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let builds = Arc::new(AtomicUsize::new(0));
    let backends = counting_backends(&["stable_diffusion"], Arc::clone(&builds));

    let mut tool = load_tool(TEXT2IMAGE, &backends, Some(json!({ "output_dir": dir.path() })))?;
    tool.setup()?;
    tool.unload();
    assert!(!tool.is_ready());

    tool.invoke(ToolValue::text("a lighthouse"))?;
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn remote_on_local_only_tool_fails_before_engine_is_built() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("street.png");
    image::RgbImage::new(2, 2).save(&input)?;

    let builds = Arc::new(AtomicUsize::new(0));
    let backends = counting_backends(
        &["mask2former_r50_8xb2-90k_cityscapes-512x1024"],
        Arc::clone(&builds),
    );
    let mut tool = load_tool(SEMSEG, &backends, Some(json!({ "remote": true })))?;
    assert!(!tool.supports_remote());

    let err = tool
        .invoke(ToolValue::text(input.to_string_lossy()))
        .unwrap_err();
    assert!(matches!(err, MmToolsError::RemoteNotImplemented(name) if name == "Segment the Image"));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert!(!tool.is_ready());
    Ok(())
}

#[test]
fn remote_tool_without_client_is_config_error() -> anyhow::Result<()> {
    let builds = Arc::new(AtomicUsize::new(0));
    let backends = counting_backends(&["controlnet"], Arc::clone(&builds));
    let mut tool = load_tool(CANNY2IMAGE, &backends, Some(json!({ "remote": true })))?;
    assert!(tool.supports_remote());

    let err = tool
        .invoke(ToolValue::text("edges.png, a cat"))
        .unwrap_err();
    assert!(matches!(err, MmToolsError::Config(_)));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn engine_construction_failure_propagates_without_retry() -> anyhow::Result<()> {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let mut engines = EngineRegistry::new();
    engines.register_factory(
        "stable_diffusion",
        Arc::new(
            move |_: &ModelSpec, _: &Device| -> anyhow::Result<Box<dyn InferenceEngine>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("weights not found"))
            },
        ),
    );
    let backends = Backends::new().with_engines(engines);
    let mut tool = load_tool(TEXT2IMAGE, &backends, None)?;

    let err = tool.invoke(ToolValue::text("a red bicycle")).unwrap_err();
    assert!(matches!(err, MmToolsError::Engine { .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!tool.is_ready());
    Ok(())
}

#[test]
fn missing_engine_factory_is_reported() -> anyhow::Result<()> {
    let mut tool = load_tool(TEXT2IMAGE, &Backends::new(), None)?;
    let err = tool.setup().unwrap_err();
    assert!(matches!(err, MmToolsError::EngineNotRegistered(model) if model == "stable_diffusion"));
    Ok(())
}

#[test]
fn unsupported_style_fails_at_construction() {
    let err = load_tool(TEXT2IMAGE, &Backends::new(), Some(json!({ "output_style": "text" })))
        .err()
        .unwrap();
    assert!(matches!(err, MmToolsError::UnsupportedStyle { .. }));

    let err = load_tool(SEMSEG, &Backends::new(), Some(json!({ "input_style": "video" })))
        .err()
        .unwrap();
    assert!(matches!(err, MmToolsError::Config(_)));
}

struct ShoutTool {
    meta: ToolMeta,
    settings: ToolSettings,
    builds: Arc<AtomicUsize>,
}

impl ToolAdapter for ShoutTool {
    type Engine = String;
    type Input = String;
    type Output = String;

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn build_engine(&self) -> mmtools::Result<String> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok("!".to_string())
    }

    fn convert_inputs(&self, raw: ToolValue) -> mmtools::Result<String> {
        raw.as_text()
            .map(str::to_string)
            .ok_or_else(|| MmToolsError::invalid_input(&self.meta.name, "expected text"))
    }

    fn apply_local(&self, engine: &mut String, input: String) -> mmtools::Result<Applied<String>> {
        Ok(Applied::new(format!("{}{}", input.to_uppercase(), engine)))
    }

    fn convert_outputs(&self, raw: String) -> mmtools::Result<ToolValue> {
        Ok(ToolValue::Text(raw))
    }
}

fn shout_tool(remote: bool, builds: Arc<AtomicUsize>) -> ShoutTool {
    let support = mmtools::config::StyleSupport {
        default_input: mmtools::InputStyle::Text,
        inputs: &[mmtools::InputStyle::Text],
        default_output: mmtools::OutputStyle::Text,
        outputs: &[mmtools::OutputStyle::Text],
    };
    let settings = ToolConfig::new()
        .with_remote(remote)
        .resolve("shout", &support)
        .unwrap();
    ShoutTool {
        meta: ToolMeta::builder("shout").description("shouts").build(),
        settings,
        builds,
    }
}

#[test]
fn custom_adapter_runs_through_runner() -> anyhow::Result<()> {
    let builds = Arc::new(AtomicUsize::new(0));
    let mut runner = ToolRunner::new(shout_tool(false, Arc::clone(&builds)));

    let call = runner.call(ToolValue::text("hello"))?;
    assert_eq!(call.output.as_text(), Some("HELLO!"));
    assert_eq!(call.seed, None);
    runner.call(ToolValue::text("again"))?;
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(runner.adapter().meta().name, "shout");
    assert!(!runner.adapter().supports_remote());
    Ok(())
}

#[test]
fn custom_adapter_defaults_to_no_remote() {
    let builds = Arc::new(AtomicUsize::new(0));
    let mut runner = ToolRunner::new(shout_tool(true, Arc::clone(&builds)));

    let err = runner.call(ToolValue::text("hello")).unwrap_err();
    assert!(matches!(err, MmToolsError::RemoteNotImplemented(_)));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
}

#[test]
fn eager_runner_builds_in_constructor() -> anyhow::Result<()> {
    let builds = Arc::new(AtomicUsize::new(0));
    let runner = ToolRunner::eager(shout_tool(false, Arc::clone(&builds)))?;
    assert!(runner.is_ready());
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    Ok(())
}
