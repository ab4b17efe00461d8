//! Phase 4: liveness, texture aliasing, and barrier/attachment derivation.

use std::collections::{HashMap, HashSet};

use ember_rhi::{ImageLayout, ShaderStages};

use crate::builder::FrameGraphBuilder;
use crate::error::FrameGraphError;
use crate::plan::{
    Access, AttachmentDescription, AttachmentSlot, BarrierRecord, ClearValue, LoadOp, PassPlan, PhysicalBacking, PhysicalTexture, Plan,
    PipelineStage, StoreOp,
};
use crate::types::{PassDecl, TextureDescriptor, TextureHandle, TextureOrigin, TextureRecord, Usage};

struct UsageInstance {
    plan_pos: usize,
    usage: Usage,
    sample_stages: ShaderStages,
}

fn pipeline_stages_for_shader_stages(stages: ShaderStages) -> PipelineStage {
    let mut out = PipelineStage::empty();
    if stages.contains(ShaderStages::VERTEX) {
        out |= PipelineStage::VERTEX_SHADER;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        out |= PipelineStage::FRAGMENT_SHADER;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        out |= PipelineStage::COMPUTE_SHADER;
    }
    if out.is_empty() {
        out = PipelineStage::TOP_OF_PIPE;
    }
    out
}

fn stage_access_layout(usage: Usage, sample_stages: ShaderStages) -> (PipelineStage, Access, ImageLayout) {
    if usage.contains(Usage::OUTPUT) {
        (PipelineStage::COLOR_ATTACHMENT_OUTPUT, Access::COLOR_ATTACHMENT_WRITE, ImageLayout::ColorAttachment)
    } else if usage.contains(Usage::DEPTH) {
        (
            PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
            Access::DEPTH_STENCIL_ATTACHMENT_READ | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ImageLayout::DepthStencilAttachment,
        )
    } else if usage.contains(Usage::INPUT) {
        (PipelineStage::FRAGMENT_SHADER, Access::INPUT_ATTACHMENT_READ, ImageLayout::ShaderReadOnly)
    } else {
        (pipeline_stages_for_shader_stages(sample_stages), Access::SHADER_READ, ImageLayout::ShaderReadOnly)
    }
}

pub(crate) fn build_plan(builder: FrameGraphBuilder, kept: Vec<usize>) -> Result<Plan, FrameGraphError> {
    let present_color = builder.present_color();
    let present_depth = builder.present_depth();
    let FrameGraphBuilder { textures, passes, .. } = builder;

    let imported_handles: HashSet<TextureHandle> =
        textures.iter().enumerate().filter(|(_, record)| record.is_imported()).map(|(index, _)| TextureHandle(index)).collect();

    let usage_by_handle = collect_usage_instances(&passes, &kept);
    let (physical_textures, handle_to_physical) = alias_textures(textures, &usage_by_handle)?;

    let mut barriers_by_pass: HashMap<usize, Vec<BarrierRecord>> = HashMap::new();
    for (&handle, instances) in &usage_by_handle {
        for pair in instances.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if !(prev.usage.is_write() || curr.usage.is_write()) {
                continue;
            }
            let (src_stages, src_access, src_layout) = stage_access_layout(prev.usage, prev.sample_stages);
            let (dst_stages, dst_access, dst_layout) = stage_access_layout(curr.usage, curr.sample_stages);
            let inside_render_pass = prev.usage.is_attachment_like() && curr.usage.is_attachment_like();
            barriers_by_pass.entry(curr.plan_pos).or_default().push(BarrierRecord {
                texture: handle,
                src_stages,
                src_access,
                src_layout,
                dst_stages,
                dst_access,
                dst_layout,
                inside_render_pass,
            });
        }
    }

    let mut writes_present_target = false;
    let mut pass_plans = Vec::with_capacity(kept.len());
    for (plan_pos, &pass_index) in kept.iter().enumerate() {
        let pass = &passes[pass_index];
        if pass.render_frame_output
            || pass.output.iter().any(|(h, _, _)| *h == present_color)
            || pass.depth.map(|(h, _)| h == present_depth).unwrap_or(false)
        {
            writes_present_target = true;
        }

        let mut attachments = Vec::new();
        let mut clear_values = Vec::new();

        let mut inputs = pass.input.clone();
        inputs.sort_by_key(|(_, location)| *location);
        for (handle, location) in inputs {
            let imported = imported_handles.contains(&handle);
            let (load_op, store_op, initial_layout, final_layout) =
                attachment_transitions(handle, plan_pos, Usage::INPUT, ShaderStages::empty(), imported, &usage_by_handle);
            attachments.push(AttachmentDescription { handle, slot: AttachmentSlot::Input(location), load_op, store_op, initial_layout, final_layout });
        }

        let mut outputs = pass.output.clone();
        outputs.sort_by_key(|(_, location, _)| *location);
        for (handle, location, clear_color) in outputs {
            let usage = if clear_color.is_some() { Usage::OUTPUT | Usage::CLEAR } else { Usage::OUTPUT };
            let imported = imported_handles.contains(&handle);
            let (load_op, store_op, initial_layout, final_layout) =
                attachment_transitions(handle, plan_pos, usage, ShaderStages::empty(), imported, &usage_by_handle);
            if load_op == LoadOp::Clear {
                clear_values.push(ClearValue::Color(clear_color.expect("clear load op implies a clear color was declared")));
            }
            attachments.push(AttachmentDescription { handle, slot: AttachmentSlot::Output(location), load_op, store_op, initial_layout, final_layout });
        }

        if let Some((handle, clear_depth)) = pass.depth {
            let usage = if clear_depth.is_some() { Usage::DEPTH | Usage::CLEAR } else { Usage::DEPTH };
            let imported = imported_handles.contains(&handle);
            let (load_op, store_op, initial_layout, final_layout) =
                attachment_transitions(handle, plan_pos, usage, ShaderStages::empty(), imported, &usage_by_handle);
            if load_op == LoadOp::Clear {
                clear_values.push(ClearValue::Depth(clear_depth.expect("clear load op implies a clear depth was declared")));
            }
            attachments.push(AttachmentDescription { handle, slot: AttachmentSlot::Depth, load_op, store_op, initial_layout, final_layout });
        }

        pass_plans.push(PassPlan {
            name: pass.name.clone(),
            attachments,
            clear_values,
            sampled: pass.sampled.iter().map(|(h, _)| *h).collect(),
            secondary_command_buffers: pass.secondary_command_buffers,
            render_frame_output: pass.render_frame_output,
            barriers: barriers_by_pass.remove(&plan_pos).unwrap_or_default(),
            callback: pass.callback.clone().expect("build() validated every kept pass has a callback"),
        });
    }

    Ok(Plan { passes: pass_plans, physical_textures, handle_to_physical, writes_present_target })
}

fn collect_usage_instances(passes: &[PassDecl], kept: &[usize]) -> HashMap<TextureHandle, Vec<UsageInstance>> {
    let mut usage_by_handle: HashMap<TextureHandle, Vec<UsageInstance>> = HashMap::new();
    for (plan_pos, &pass_index) in kept.iter().enumerate() {
        let pass = &passes[pass_index];
        let mut per_handle: HashMap<TextureHandle, (Usage, ShaderStages)> = HashMap::new();
        for &(h, stages) in &pass.sampled {
            let entry = per_handle.entry(h).or_insert((Usage::empty(), ShaderStages::empty()));
            entry.0 |= Usage::SAMPLED;
            entry.1 |= stages;
        }
        for &(h, _) in &pass.input {
            per_handle.entry(h).or_insert((Usage::empty(), ShaderStages::empty())).0 |= Usage::INPUT;
        }
        for &(h, _, clear) in &pass.output {
            let u = if clear.is_some() { Usage::OUTPUT | Usage::CLEAR } else { Usage::OUTPUT };
            per_handle.entry(h).or_insert((Usage::empty(), ShaderStages::empty())).0 |= u;
        }
        if let Some((h, clear_depth)) = pass.depth {
            let u = if clear_depth.is_some() { Usage::DEPTH | Usage::CLEAR } else { Usage::DEPTH };
            per_handle.entry(h).or_insert((Usage::empty(), ShaderStages::empty())).0 |= u;
        }
        for (h, (usage, sample_stages)) in per_handle {
            usage_by_handle.entry(h).or_default().push(UsageInstance { plan_pos, usage, sample_stages });
        }
    }
    for instances in usage_by_handle.values_mut() {
        instances.sort_by_key(|instance| instance.plan_pos);
    }
    usage_by_handle
}

fn alias_textures(
    mut textures: Vec<TextureRecord>,
    usage_by_handle: &HashMap<TextureHandle, Vec<UsageInstance>>,
) -> Result<(Vec<PhysicalTexture>, HashMap<TextureHandle, usize>), FrameGraphError> {
    let mut used_handles: Vec<TextureHandle> = usage_by_handle.keys().copied().collect();
    used_handles.sort_by_key(|h| (usage_by_handle[h].first().unwrap().plan_pos, h.0));

    let mut physical: Vec<PhysicalTexture> = Vec::new();
    let mut intervals: Vec<Vec<(usize, usize)>> = Vec::new();
    let mut handle_to_physical = HashMap::new();

    for handle in used_handles {
        let instances = &usage_by_handle[&handle];
        let first = instances.first().unwrap().plan_pos;
        let last = instances.last().unwrap().plan_pos;

        if textures[handle.0].is_imported() {
            let placeholder = TextureOrigin::Transient(TextureDescriptor { width: 0, height: 0, format: ember_rhi::TextureFormat::Rgba8Unorm });
            let origin = std::mem::replace(&mut textures[handle.0].origin, placeholder);
            let backing = match origin {
                TextureOrigin::Imported(texture) => PhysicalBacking::Imported(texture),
                TextureOrigin::Present => PhysicalBacking::Present,
                TextureOrigin::Transient(_) => unreachable!("is_imported() is false for Transient"),
            };
            let index = physical.len();
            physical.push(PhysicalTexture { backing, aliased_handles: vec![handle] });
            intervals.push(vec![(first, last)]);
            handle_to_physical.insert(handle, index);
            continue;
        }

        let descriptor = textures[handle.0].descriptor().expect("non-imported texture has a descriptor");
        let mut chosen = None;
        for (index, pt) in physical.iter().enumerate() {
            if pt.transient_descriptor() != Some(descriptor) {
                continue;
            }
            if intervals[index].iter().any(|&(a, b)| a <= last && first <= b) {
                continue;
            }
            chosen = Some(index);
            break;
        }
        let index = match chosen {
            Some(index) => index,
            None => {
                let index = physical.len();
                physical.push(PhysicalTexture { backing: PhysicalBacking::Transient(descriptor), aliased_handles: Vec::new() });
                intervals.push(Vec::new());
                index
            }
        };
        physical[index].aliased_handles.push(handle);
        intervals[index].push((first, last));
        handle_to_physical.insert(handle, index);
    }

    log::debug!("aliased {} texture handle(s) into {} physical texture(s)", handle_to_physical.len(), physical.len());
    Ok((physical, handle_to_physical))
}

fn attachment_transitions(
    handle: TextureHandle,
    plan_pos: usize,
    usage: Usage,
    sample_stages: ShaderStages,
    imported: bool,
    usage_by_handle: &HashMap<TextureHandle, Vec<UsageInstance>>,
) -> (LoadOp, StoreOp, ImageLayout, ImageLayout) {
    let instances = &usage_by_handle[&handle];
    let own_index = instances.iter().position(|instance| instance.plan_pos == plan_pos).expect("usage instance recorded for this pass");
    let prev = own_index.checked_sub(1).map(|i| &instances[i]);
    let next = instances.get(own_index + 1);

    let load_op = if usage.contains(Usage::CLEAR) { LoadOp::Clear } else { LoadOp::Load };
    let initial_layout = if load_op == LoadOp::Clear {
        ImageLayout::Undefined
    } else if let Some(prev) = prev {
        stage_access_layout(prev.usage, prev.sample_stages).2
    } else {
        ImageLayout::Undefined
    };

    let store_op = if imported {
        StoreOp::Store
    } else if let Some(next) = next {
        if next.usage.contains(Usage::CLEAR) { StoreOp::DontCare } else { StoreOp::Store }
    } else {
        StoreOp::DontCare
    };

    let own_layout = stage_access_layout(usage, sample_stages).2;
    let final_layout = match next {
        Some(next) if next.usage.is_read() => ImageLayout::ShaderReadOnly,
        _ => own_layout,
    };

    (load_op, store_op, initial_layout, final_layout)
}
