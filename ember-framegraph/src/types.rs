//! Declaration-time types: texture handles, descriptors, and the per-(texture,
//! pass) usage a pass declares through [`crate::builder::PassBuilder`].

use ember_rhi::{ClearColor, ShaderStages, Texture, TextureFormat};

/// Opaque index assigned by the builder at texture declaration time; stable
/// for the life of a [`crate::builder::FrameGraphBuilder::build`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// Zero for render-window-backed textures (resolved at execution time).
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

bitflags::bitflags! {
    /// Subset of usages a single pass makes of a single texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Usage: u32 {
        const SAMPLED = 1 << 0;
        const INPUT = 1 << 1;
        const OUTPUT = 1 << 2;
        const DEPTH = 1 << 3;
        const CLEAR = 1 << 4;
    }
}

impl Usage {
    pub const WRITE: Usage = Usage::OUTPUT.union(Usage::DEPTH).union(Usage::CLEAR);

    pub fn is_write(self) -> bool {
        self.intersects(Usage::WRITE)
    }

    pub fn is_read(self) -> bool {
        self.intersects(Usage::SAMPLED.union(Usage::INPUT))
    }

    /// True for usages realized as render-pass attachments (as opposed to a
    /// plain sampled read, which is a descriptor-bound image).
    pub fn is_attachment_like(self) -> bool {
        self.intersects(Usage::OUTPUT.union(Usage::DEPTH).union(Usage::INPUT))
    }
}

pub(crate) enum TextureOrigin {
    Transient(TextureDescriptor),
    Imported(Box<dyn Texture>),
    /// One of the two synthetic present-target handles; resolved to the
    /// acquired swapchain image at execution time.
    Present,
}

pub(crate) struct TextureRecord {
    pub name: String,
    pub origin: TextureOrigin,
}

impl TextureRecord {
    pub fn is_imported(&self) -> bool {
        !matches!(self.origin, TextureOrigin::Transient(_))
    }

    pub fn descriptor(&self) -> Option<TextureDescriptor> {
        match &self.origin {
            TextureOrigin::Transient(desc) => Some(*desc),
            _ => None,
        }
    }
}

pub(crate) struct PassDecl {
    pub name: String,
    pub declared_index: usize,
    pub sampled: Vec<(TextureHandle, ShaderStages)>,
    pub input: Vec<(TextureHandle, u32)>,
    pub output: Vec<(TextureHandle, u32, Option<ClearColor>)>,
    pub depth: Option<(TextureHandle, Option<f32>)>,
    pub secondary_command_buffers: bool,
    pub render_frame_output: bool,
    pub callback: Option<std::sync::Arc<dyn Fn(&mut crate::executor::PassContext) + Send + Sync>>,
}

impl PassDecl {
    pub fn new(name: String, declared_index: usize) -> Self {
        PassDecl {
            name,
            declared_index,
            sampled: Vec::new(),
            input: Vec::new(),
            output: Vec::new(),
            depth: None,
            secondary_command_buffers: false,
            render_frame_output: false,
            callback: None,
        }
    }

    /// Every (handle, usage) pair this pass declares.
    pub fn usages(&self) -> Vec<(TextureHandle, Usage)> {
        let mut out = Vec::new();
        for &(h, _) in &self.sampled {
            out.push((h, Usage::SAMPLED));
        }
        for &(h, _) in &self.input {
            out.push((h, Usage::INPUT));
        }
        for &(h, _, clear) in &self.output {
            out.push((h, if clear.is_some() { Usage::OUTPUT | Usage::CLEAR } else { Usage::OUTPUT }));
        }
        if let Some((h, clear_depth)) = &self.depth {
            out.push((*h, if clear_depth.is_some() { Usage::DEPTH | Usage::CLEAR } else { Usage::DEPTH }));
        }
        out
    }
}
