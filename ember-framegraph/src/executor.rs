//! Phase 5: execution. Walks a [`Plan`] in declaration order, realizing every
//! [`crate::plan::BarrierRecord`] as a standalone `pipeline_barrier_texture`
//! call (`ember-rhi` has no subpass-dependency construct), binding each
//! pass's output/depth attachments, and invoking its recorded callback.

use std::collections::HashMap;

use ember_rhi::{ColorAttachment, CommandBuffer, CommandEncoder, DepthStencilAttachment, Device, RenderPass, RenderPassDescriptor, Swapchain, Texture, TextureDimension, TextureUsage};

use crate::plan::{AttachmentSlot, ClearValue, PhysicalBacking, Plan};
use crate::types::TextureHandle;

/// Handed to a pass's callback. Resolves the textures the pass declared and,
/// for passes with `secondary_command_buffers` enabled, lets the callback
/// record work on independently-finished encoders — `ember-rhi` has no native
/// secondary-command-buffer concept, so this is the closest approximation;
/// the executor does not synchronize these, the callback must join them
/// itself before returning.
pub struct PassContext<'a> {
    device: &'a dyn Device,
    frame_index: u64,
    textures: HashMap<TextureHandle, &'a dyn Texture>,
    render_pass: Option<Box<dyn RenderPass>>,
    secondary_buffers: Vec<Box<dyn CommandBuffer>>,
}

impl<'a> PassContext<'a> {
    pub fn device(&self) -> &'a dyn Device {
        self.device
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Resolves a texture handle the pass declared via `sample`,
    /// `input_attachment`, `output_attachment`, or `depth_stencil`.
    pub fn resolve(&self, handle: TextureHandle) -> &'a dyn Texture {
        *self.textures.get(&handle).unwrap_or_else(|| panic!("pass used {handle:?} without declaring it on its PassBuilder"))
    }

    /// The render pass bound for this pass's output/depth attachments.
    /// `None` for a pass declaring no attachments at all (a pure compute or
    /// upload pass).
    pub fn render_pass(&mut self) -> Option<&mut dyn RenderPass> {
        self.render_pass.as_deref_mut()
    }

    pub fn create_secondary_encoder(&self) -> Box<dyn CommandEncoder> {
        self.device.create_command_encoder()
    }

    pub fn push_secondary_buffer(&mut self, buffer: Box<dyn CommandBuffer>) {
        self.secondary_buffers.push(buffer);
    }
}

/// Owns the transient physical textures a [`Plan`] allocates and drives it
/// frame after frame.
pub struct FrameGraphExecutor {
    plan: Plan,
    transient: Vec<Option<Box<dyn Texture>>>,
}

impl FrameGraphExecutor {
    pub fn new(plan: Plan) -> Self {
        let transient = plan.physical_textures.iter().map(|_| None).collect();
        FrameGraphExecutor { plan, transient }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    fn ensure_transient_allocated(&mut self, device: &dyn Device) {
        for (index, physical) in self.plan.physical_textures.iter().enumerate() {
            if let Some(descriptor) = physical.transient_descriptor() {
                if self.transient[index].is_none() {
                    let rhi_descriptor = ember_rhi::TextureDescriptor {
                        label: None,
                        size: (descriptor.width, descriptor.height, 1),
                        format: descriptor.format,
                        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                        dimension: TextureDimension::D2,
                        mip_level_count: 1,
                    };
                    self.transient[index] = Some(device.create_texture(&rhi_descriptor));
                }
            }
        }
    }

    /// Resolves every physical texture to a borrow valid for this frame.
    /// `present` is `None` unless [`Plan::writes_present_target`] is set, in
    /// which case it must hold the just-acquired swapchain image.
    fn resolve_physical<'a>(&'a self, present: Option<&'a dyn Texture>) -> HashMap<TextureHandle, &'a dyn Texture> {
        let mut out = HashMap::new();
        for (index, physical) in self.plan.physical_textures.iter().enumerate() {
            let texture: &dyn Texture = match &physical.backing {
                PhysicalBacking::Transient(_) => {
                    self.transient[index].as_deref().expect("ensure_transient_allocated runs before resolve_physical")
                }
                PhysicalBacking::Imported(texture) => texture.as_ref(),
                PhysicalBacking::Present => present.expect("plan writes the present target but no swapchain image was supplied"),
            };
            for &handle in &physical.aliased_handles {
                out.insert(handle, texture);
            }
        }
        out
    }

    /// Runs one frame of the plan: acquires the present image if needed,
    /// applies each pass's barriers, binds its attachments, invokes its
    /// callback, then presents.
    pub fn execute(&mut self, device: &dyn Device, mut swapchain: Option<&mut dyn Swapchain>, frame_index: u64) -> Result<(), String> {
        self.ensure_transient_allocated(device);

        let mut acquired_image_index = None;
        let mut frame = None;
        if self.plan.writes_present_target {
            let swapchain = swapchain.as_deref_mut().ok_or("plan writes the present target but no swapchain was supplied")?;
            let acquired = swapchain.acquire_next_image(None)?;
            acquired_image_index = Some(acquired.image_index);
            frame = Some(acquired);
        }

        let resolved = self.resolve_physical(frame.as_ref().map(|f| f.texture));
        let mut submitted = Vec::with_capacity(self.plan.passes.len());

        for pass in &self.plan.passes {
            let mut encoder = device.create_command_encoder();

            for barrier in &pass.barriers {
                let texture = *resolved.get(&barrier.texture).expect("barrier references a handle resolved this frame");
                encoder.pipeline_barrier_texture(texture, barrier.src_layout, barrier.dst_layout);
            }

            let mut clear_colors = pass.clear_values.iter().filter_map(|c| match c {
                ClearValue::Color(color) => Some(*color),
                ClearValue::Depth(_) => None,
            });
            let mut clear_depths = pass.clear_values.iter().filter_map(|c| match c {
                ClearValue::Depth(depth) => Some(*depth),
                ClearValue::Color(_) => None,
            });

            let mut outputs: Vec<_> = pass.attachments.iter().filter(|a| matches!(a.slot, AttachmentSlot::Output(_))).collect();
            outputs.sort_by_key(|a| match a.slot {
                AttachmentSlot::Output(location) => location,
                _ => unreachable!(),
            });
            let color_attachments: Vec<ColorAttachment> = outputs
                .iter()
                .map(|a| {
                    let clear_value = if a.load_op == crate::plan::LoadOp::Clear { clear_colors.next() } else { None };
                    ColorAttachment {
                        texture: *resolved.get(&a.handle).expect("output attachment handle resolved this frame"),
                        load_op: into_rhi_load_op(a.load_op),
                        store_op: into_rhi_store_op(a.store_op),
                        clear_value,
                    }
                })
                .collect();

            let depth_stencil_attachment = pass
                .attachments
                .iter()
                .find(|a| matches!(a.slot, AttachmentSlot::Depth))
                .map(|a| {
                    let clear_depth = if a.load_op == crate::plan::LoadOp::Clear { clear_depths.next().unwrap_or(1.0) } else { 1.0 };
                    DepthStencilAttachment {
                        texture: *resolved.get(&a.handle).expect("depth attachment handle resolved this frame"),
                        depth_load_op: into_rhi_load_op(a.load_op),
                        depth_store_op: into_rhi_store_op(a.store_op),
                        stencil_load_op: into_rhi_load_op(a.load_op),
                        stencil_store_op: into_rhi_store_op(a.store_op),
                        clear_depth,
                    }
                });

            let has_attachments = !color_attachments.is_empty() || depth_stencil_attachment.is_some();
            let render_pass = if has_attachments {
                Some(encoder.begin_render_pass(RenderPassDescriptor { label: None, color_attachments, depth_stencil_attachment }))
            } else {
                None
            };

            let mut pass_textures = HashMap::new();
            for attachment in &pass.attachments {
                pass_textures.insert(attachment.handle, *resolved.get(&attachment.handle).unwrap());
            }
            for &handle in &pass.sampled {
                pass_textures.entry(handle).or_insert_with(|| *resolved.get(&handle).unwrap());
            }

            let mut ctx = PassContext { device, frame_index, textures: pass_textures, render_pass, secondary_buffers: Vec::new() };
            log::trace!("executing pass '{}'", pass.name);
            (pass.callback)(&mut ctx);

            if let Some(render_pass) = ctx.render_pass.take() {
                render_pass.end();
            }

            submitted.push(encoder.finish());
            submitted.extend(ctx.secondary_buffers);
        }

        device.submit(submitted);

        // `frame` borrows `swapchain` for the lifetime of its texture; drop
        // it before reusing `swapchain` so `present` can reborrow.
        drop(resolved);
        drop(frame);
        if self.plan.writes_present_target {
            let image_index = acquired_image_index.expect("writes_present_target implies acquire_next_image ran above");
            let swapchain = swapchain.expect("checked by the acquire above");
            swapchain.present(image_index, None)?;
        }

        Ok(())
    }
}

fn into_rhi_load_op(op: crate::plan::LoadOp) -> ember_rhi::LoadOp {
    match op {
        crate::plan::LoadOp::Load => ember_rhi::LoadOp::Load,
        crate::plan::LoadOp::Clear => ember_rhi::LoadOp::Clear,
    }
}

fn into_rhi_store_op(op: crate::plan::StoreOp) -> ember_rhi::StoreOp {
    match op {
        crate::plan::StoreOp::Store => ember_rhi::StoreOp::Store,
        crate::plan::StoreOp::DontCare => ember_rhi::StoreOp::DontCare,
    }
}
