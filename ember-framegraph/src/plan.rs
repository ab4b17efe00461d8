//! Output of [`crate::builder::FrameGraphBuilder::build`]: an ordered list of
//! passes with concrete render-pass/framebuffer descriptions, plus the
//! physical textures backing them and the barriers between passes.

use std::sync::Arc;

use ember_rhi::{ClearColor, ImageLayout, Texture};

use crate::executor::PassContext;
use crate::types::{TextureDescriptor, TextureHandle};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const BOTTOM_OF_PIPE = 1 << 1;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 2;
        const EARLY_FRAGMENT_TESTS = 1 << 3;
        const LATE_FRAGMENT_TESTS = 1 << 4;
        const FRAGMENT_SHADER = 1 << 5;
        const VERTEX_SHADER = 1 << 6;
        const COMPUTE_SHADER = 1 << 7;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u32 {
        const COLOR_ATTACHMENT_READ = 1 << 0;
        const COLOR_ATTACHMENT_WRITE = 1 << 1;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy)]
pub enum ClearValue {
    Color(ClearColor),
    Depth(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    Input(u32),
    Output(u32),
    Depth,
}

#[derive(Debug, Clone)]
pub struct AttachmentDescription {
    pub handle: TextureHandle,
    pub slot: AttachmentSlot,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Barrier attached to a `(texture, pass)` pair: applied before the pass runs.
#[derive(Debug, Clone)]
pub struct BarrierRecord {
    pub texture: TextureHandle,
    pub src_stages: PipelineStage,
    pub src_access: Access,
    pub src_layout: ImageLayout,
    pub dst_stages: PipelineStage,
    pub dst_access: Access,
    pub dst_layout: ImageLayout,
    /// True when both the previous and next usage are attachment-like, so a
    /// backend that supports it may realize this as a render-pass subpass
    /// dependency instead of a standalone image barrier.
    pub inside_render_pass: bool,
}

/// The actual GPU-side backing for a [`PhysicalTexture`].
pub enum PhysicalBacking {
    /// Allocated by the executor for the lifetime of the plan.
    Transient(TextureDescriptor),
    /// Supplied by the caller at build time via `import_texture`.
    Imported(Box<dyn Texture>),
    /// One of the two present-target handles; resolved from the acquired
    /// swapchain image at execution time.
    Present,
}

/// One allocated (or imported) GPU image shared by one or more
/// non-overlapping [`TextureHandle`]s.
pub struct PhysicalTexture {
    pub backing: PhysicalBacking,
    /// Handles sharing this physical image, in the order they were aliased.
    pub aliased_handles: Vec<TextureHandle>,
}

impl PhysicalTexture {
    pub fn is_imported(&self) -> bool {
        !matches!(self.backing, PhysicalBacking::Transient(_))
    }

    pub fn transient_descriptor(&self) -> Option<TextureDescriptor> {
        match &self.backing {
            PhysicalBacking::Transient(descriptor) => Some(*descriptor),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PhysicalTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalTexture")
            .field("imported", &self.is_imported())
            .field("aliased_handles", &self.aliased_handles)
            .finish_non_exhaustive()
    }
}

pub struct PassPlan {
    pub name: String,
    pub attachments: Vec<AttachmentDescription>,
    pub clear_values: Vec<ClearValue>,
    /// Handles this pass declared with `sample()`: bound as a read-only
    /// descriptor rather than a framebuffer attachment, so they don't appear
    /// in `attachments`. `ember-rhi` also has no native input-attachment
    /// binding, so handles declared with `input_attachment()` are resolvable
    /// here too, in addition to appearing in `attachments`.
    pub sampled: Vec<TextureHandle>,
    pub secondary_command_buffers: bool,
    pub render_frame_output: bool,
    /// Barriers attached to this pass. `ember-rhi` has no subpass-dependency
    /// construct, so the executor applies every one of these as a standalone
    /// image barrier before the pass begins, regardless of
    /// [`BarrierRecord::inside_render_pass`] — that flag is retained on the
    /// plan for a future backend that can realize it as a native dependency.
    pub barriers: Vec<BarrierRecord>,
    pub callback: Arc<dyn Fn(&mut PassContext) + Send + Sync>,
}

impl std::fmt::Debug for PassPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassPlan")
            .field("name", &self.name)
            .field("attachments", &self.attachments)
            .field("clear_values", &self.clear_values)
            .field("sampled", &self.sampled)
            .field("secondary_command_buffers", &self.secondary_command_buffers)
            .field("render_frame_output", &self.render_frame_output)
            .field("barriers", &self.barriers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Plan {
    pub passes: Vec<PassPlan>,
    pub physical_textures: Vec<PhysicalTexture>,
    pub handle_to_physical: std::collections::HashMap<TextureHandle, usize>,
    /// True if any kept pass writes the present-color or present-depth handle.
    pub writes_present_target: bool,
}
