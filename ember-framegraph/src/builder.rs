//! Phases 1-3: texture metadata, dependency graph, topological ordering and
//! culling. Phase 4 (aliasing and barriers) lives in [`crate::alias`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ember_rhi::{ClearColor, ShaderStages, Texture};

use crate::error::FrameGraphError;
use crate::executor::PassContext;
use crate::plan::Plan;
use crate::types::{PassDecl, TextureDescriptor, TextureHandle, TextureOrigin, TextureRecord, Usage};

pub struct FrameGraphBuilder {
    pub(crate) textures: Vec<TextureRecord>,
    pub(crate) passes: Vec<PassDecl>,
    present_color: TextureHandle,
    present_depth: TextureHandle,
}

impl Default for FrameGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGraphBuilder {
    pub fn new() -> Self {
        let mut textures = Vec::new();
        textures.push(TextureRecord { name: "PresentColor".to_string(), origin: TextureOrigin::Present });
        textures.push(TextureRecord { name: "PresentDepth".to_string(), origin: TextureOrigin::Present });
        FrameGraphBuilder { textures, passes: Vec::new(), present_color: TextureHandle(0), present_depth: TextureHandle(1) }
    }

    pub fn present_color(&self) -> TextureHandle {
        self.present_color
    }

    pub fn present_depth(&self) -> TextureHandle {
        self.present_depth
    }

    pub fn create_texture(&mut self, descriptor: TextureDescriptor) -> TextureHandle {
        let handle = TextureHandle(self.textures.len());
        self.textures.push(TextureRecord { name: format!("Texture{}", handle.0), origin: TextureOrigin::Transient(descriptor) });
        handle
    }

    pub fn import_texture(&mut self, texture: Box<dyn Texture>) -> TextureHandle {
        let handle = TextureHandle(self.textures.len());
        self.textures.push(TextureRecord { name: format!("Imported{}", handle.0), origin: TextureOrigin::Imported(texture) });
        handle
    }

    pub fn add_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_> {
        let index = self.passes.len();
        self.passes.push(PassDecl::new(name.into(), index));
        PassBuilder { graph: self, index }
    }

    pub fn build(self) -> Result<Plan, FrameGraphError> {
        log::debug!("building frame graph: {} texture(s), {} pass(es)", self.textures.len(), self.passes.len());
        let (order, edges) = self.topological_order()?;
        let kept = self.cull_unused(&order, &edges);
        for &index in &kept {
            if self.passes[index].callback.is_none() {
                return Err(FrameGraphError::MissingCallback { pass: self.passes[index].name.clone() });
            }
        }
        log::debug!("kept {} of {} pass(es) after culling", kept.len(), self.passes.len());
        crate::alias::build_plan(self, kept)
    }

    /// Edges `(writer_pass, reader_pass)`: every earlier write-or-clear of a
    /// texture precedes every later sample-or-read of it. Also validates that
    /// no pass both reads and writes the same texture (a self-dependency).
    fn dependency_edges(&self) -> Result<Vec<(usize, usize)>, FrameGraphError> {
        let mut writers_by_texture: HashMap<TextureHandle, Vec<usize>> = HashMap::new();
        let mut readers_by_texture: HashMap<TextureHandle, Vec<usize>> = HashMap::new();

        for pass in &self.passes {
            let mut written_here = HashSet::new();
            let mut read_here = HashSet::new();
            for (handle, usage) in pass.usages() {
                if usage.is_write() {
                    written_here.insert(handle);
                }
                if usage.is_read() {
                    read_here.insert(handle);
                }
            }
            for handle in &written_here {
                if read_here.contains(handle) {
                    return Err(FrameGraphError::SelfDependency {
                        pass: pass.name.clone(),
                        texture: self.textures[handle.0].name.clone(),
                    });
                }
            }
            for handle in written_here {
                writers_by_texture.entry(handle).or_default().push(pass.declared_index);
            }
            for handle in read_here {
                readers_by_texture.entry(handle).or_default().push(pass.declared_index);
            }
        }

        let mut edges = Vec::new();
        for (handle, readers) in &readers_by_texture {
            let Some(writers) = writers_by_texture.get(handle) else { continue };
            for &reader in readers {
                for &writer in writers {
                    if writer < reader {
                        edges.push((writer, reader));
                    }
                }
            }
        }
        Ok(edges)
    }

    /// Kahn's algorithm with a min-heap ready set so ties resolve by
    /// declaration index, keeping plan order deterministic.
    fn topological_order(&self) -> Result<(Vec<usize>, Vec<(usize, usize)>), FrameGraphError> {
        let edges = self.dependency_edges()?;
        let n = self.passes.len();
        let mut in_degree = vec![0usize; n];
        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(a, b) in &edges {
            in_degree[b] += 1;
            out_edges[a].push(b);
        }

        use std::cmp::Reverse;
        use std::collections::BinaryHeap;
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(u)) = ready.pop() {
            order.push(u);
            for &v in &out_edges[u] {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    ready.push(Reverse(v));
                }
            }
        }
        if order.len() != n {
            let stuck: Vec<String> = (0..n).filter(|&i| in_degree[i] > 0).map(|i| self.passes[i].name.clone()).collect();
            return Err(FrameGraphError::Cycle { passes: stuck.join(", ") });
        }
        Ok((order, edges))
    }

    /// Passes kept because they transitively contribute to an imported
    /// texture write or the present target, in `order`'s relative sequence.
    fn cull_unused(&self, order: &[usize], edges: &[(usize, usize)]) -> Vec<usize> {
        let mut in_edges: Vec<Vec<usize>> = vec![Vec::new(); self.passes.len()];
        for &(a, b) in edges {
            in_edges[b].push(a);
        }

        let mut keep = HashSet::new();
        let mut stack: Vec<usize> = self
            .passes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.render_frame_output || p.usages().iter().any(|(h, u)| u.is_write() && self.textures[h.0].is_imported()))
            .map(|(i, _)| i)
            .collect();
        while let Some(index) = stack.pop() {
            if keep.insert(index) {
                stack.extend(in_edges[index].iter().copied());
            }
        }

        for &index in order {
            if !keep.contains(&index) {
                log::warn!("culling pass '{}': contributes to no imported output or present target", self.passes[index].name);
            }
        }
        order.iter().copied().filter(|i| keep.contains(i)).collect()
    }
}

pub struct PassBuilder<'g> {
    graph: &'g mut FrameGraphBuilder,
    index: usize,
}

impl<'g> PassBuilder<'g> {
    fn decl(&mut self) -> &mut PassDecl {
        &mut self.graph.passes[self.index]
    }

    pub fn sample(mut self, handle: TextureHandle, stages: ShaderStages) -> Self {
        self.decl().sampled.push((handle, stages));
        self
    }

    pub fn input_attachment(mut self, handle: TextureHandle, location: u32) -> Self {
        self.decl().input.push((handle, location));
        self
    }

    pub fn output_attachment(mut self, handle: TextureHandle, location: u32, clear_color: Option<ClearColor>) -> Self {
        self.decl().output.push((handle, location, clear_color));
        self
    }

    pub fn depth_stencil(mut self, handle: TextureHandle, clear_depth: Option<f32>) -> Self {
        self.decl().depth = Some((handle, clear_depth));
        self
    }

    pub fn secondary_command_buffers(mut self, enabled: bool) -> Self {
        self.decl().secondary_command_buffers = enabled;
        self
    }

    pub fn render_frame_output(mut self, enabled: bool) -> Self {
        self.decl().render_frame_output = enabled;
        self
    }

    pub fn callback(mut self, f: impl Fn(&mut PassContext) + Send + Sync + 'static) -> Self {
        self.decl().callback = Some(Arc::new(f));
        self
    }
}
