//! Ember: top-level integration crate. Mirrors the teacher's `Renderer`
//! (device + graph, `graph_mut`/`render_frame`) but splits graph-building
//! from execution, since [`ember_framegraph::FrameGraphBuilder::build`]
//! consumes the builder to produce a reusable [`ember_framegraph::Plan`]
//! rather than re-walking a mutable graph every frame.

use std::collections::HashMap;
use std::sync::Arc;

use ember_framegraph::{FrameGraphBuilder, FrameGraphError, FrameGraphExecutor};
use ember_gbuffer::{GBuffer, LightingModel, PackError};
use ember_rhi::{Device, Swapchain};
use ember_shader::ast::Statement;
use ember_shader::preprocessor::LibraryResolver;

/// Resolves `include` statements against the shader-library sources
/// [`ember_gbuffer::build_gbuffer`] generates for a packed G-Buffer.
pub struct GBufferLibraryResolver {
    sources: HashMap<String, String>,
}

impl GBufferLibraryResolver {
    pub fn new(sources: HashMap<String, String>) -> Self {
        GBufferLibraryResolver { sources }
    }
}

impl LibraryResolver for GBufferLibraryResolver {
    fn resolve(&self, name: &str) -> Option<Vec<Statement>> {
        let source = self.sources.get(name)?;
        match ember_shader::parse(source) {
            Ok(Statement::Sequence(statements)) => Some(statements),
            Ok(other) => Some(vec![other]),
            Err(err) => {
                log::error!("G-Buffer library '{name}' failed to re-parse during include resolution: {err}");
                None
            }
        }
    }
}

/// Packs `models` into a G-Buffer and returns it alongside a resolver ready
/// to serve its generated libraries to [`ember_shader::compile_stage`].
pub fn build_gbuffer_resolver(models: &[LightingModel]) -> Result<(GBuffer, GBufferLibraryResolver), PackError> {
    let (gbuffer, sources) = ember_gbuffer::build_gbuffer(models)?;
    Ok((gbuffer, GBufferLibraryResolver::new(sources)))
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    FrameGraph(#[from] FrameGraphError),
    #[error("render_frame called before a frame graph was built")]
    NotBuilt,
    #[error("{0}")]
    Device(String),
}

/// Owns the device and the current frame graph plan. Built in two steps:
/// declare passes and textures on the [`FrameGraphBuilder`] returned by
/// [`Engine::graph_mut`], then call [`Engine::build`] once to compile a
/// [`ember_framegraph::Plan`] and start executing it with
/// [`Engine::render_frame`].
pub struct Engine {
    device: Arc<dyn Device>,
    builder: Option<FrameGraphBuilder>,
    executor: Option<FrameGraphExecutor>,
}

impl Engine {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Engine { device, builder: Some(FrameGraphBuilder::new()), executor: None }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Access the frame graph builder to declare textures and passes.
    /// Panics if called after [`Engine::build`] — rebuild a fresh [`Engine`]
    /// (or call [`Engine::reset`]) to redeclare a graph for a new frame
    /// topology.
    pub fn graph_mut(&mut self) -> &mut FrameGraphBuilder {
        self.builder.as_mut().expect("graph_mut called after build(); call reset() first")
    }

    /// Discards the compiled plan (if any) and returns to an empty builder,
    /// for callers that change frame-graph topology between frames (e.g. a
    /// window resize that changes transient texture dimensions).
    pub fn reset(&mut self) {
        self.builder = Some(FrameGraphBuilder::new());
        self.executor = None;
    }

    /// Compiles the declared graph into a [`ember_framegraph::Plan`] and
    /// readies the engine to execute it every frame via [`Engine::render_frame`].
    pub fn build(&mut self) -> Result<(), EngineError> {
        let builder = self.builder.take().expect("build() called twice without an intervening reset()");
        let plan = builder.build()?;
        log::debug!("frame graph compiled: {} pass(es), {} physical texture(s)", plan.passes.len(), plan.physical_textures.len());
        self.executor = Some(FrameGraphExecutor::new(plan));
        Ok(())
    }

    /// Runs one frame of the compiled plan.
    pub fn render_frame(&mut self, swapchain: Option<&mut dyn Swapchain>, frame_index: u64) -> Result<(), EngineError> {
        let executor = self.executor.as_mut().ok_or(EngineError::NotBuilt)?;
        executor.execute(self.device.as_ref(), swapchain, frame_index).map_err(EngineError::Device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gbuffer::{ComponentType, LightingModelParameter};

    #[test]
    fn resolves_an_included_gbuffer_write_library() {
        let models = vec![LightingModel {
            name: "Standard".to_string(),
            parameters: vec![LightingModelParameter { name: "albedo".to_string(), component_type: ComponentType::Unorm8, component_count: 3 }],
        }];
        let (_gbuffer, resolver) = build_gbuffer_resolver(&models).unwrap();
        let resolved = resolver.resolve("Atema.GBufferWrite.albedo");
        assert!(resolved.is_some(), "expected the per-component write library to resolve");
    }

    #[test]
    fn unknown_library_name_resolves_to_none() {
        let models = vec![LightingModel {
            name: "Standard".to_string(),
            parameters: vec![LightingModelParameter { name: "albedo".to_string(), component_type: ComponentType::Unorm8, component_count: 3 }],
        }];
        let (_gbuffer, resolver) = build_gbuffer_resolver(&models).unwrap();
        assert!(resolver.resolve("NoSuchLibrary").is_none());
    }
}
