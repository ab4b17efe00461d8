//! Frame graph builder: declare transient and imported textures and the
//! passes that read and write them, and get back an ordered, culled,
//! aliased, barrier-annotated [`Plan`] ready to execute frame after frame.

pub mod alias;
pub mod builder;
pub mod error;
pub mod executor;
pub mod plan;
pub mod types;

pub use builder::{FrameGraphBuilder, PassBuilder};
pub use error::FrameGraphError;
pub use executor::{FrameGraphExecutor, PassContext};
pub use plan::{
    Access, AttachmentDescription, AttachmentSlot, BarrierRecord, ClearValue, LoadOp, PassPlan, PhysicalBacking, PhysicalTexture, Plan,
    PipelineStage, StoreOp,
};
pub use types::{TextureDescriptor, TextureHandle, Usage};

#[cfg(test)]
mod tests {
    use super::*;
    use ember_rhi::{ClearColor, ShaderStages, TextureFormat};

    #[test]
    fn builds_a_plan_for_a_depth_prepass_feeding_a_lit_output() {
        let mut graph = FrameGraphBuilder::new();
        let depth = graph.create_texture(TextureDescriptor { width: 1920, height: 1080, format: TextureFormat::D32Float });
        let color = graph.create_texture(TextureDescriptor { width: 1920, height: 1080, format: TextureFormat::Rgba16Float });

        graph
            .add_pass("depth_prepass")
            .depth_stencil(depth, Some(1.0))
            .callback(|_ctx| {})
            .secondary_command_buffers(false);

        graph
            .add_pass("lighting")
            .sample(depth, ShaderStages::FRAGMENT)
            .output_attachment(color, 0, Some(ClearColor { r: 0.0, g: 0.0, b: 0.0, a: 1.0 }))
            .callback(|_ctx| {});

        let present_color = graph.present_color();
        graph
            .add_pass("present_blit")
            .sample(color, ShaderStages::FRAGMENT)
            .output_attachment(present_color, 0, None)
            .render_frame_output(true)
            .callback(|_ctx| {});

        let plan = graph.build().expect("acyclic graph with every pass wired to the present target");

        assert_eq!(plan.passes.len(), 3);
        assert_eq!(plan.passes[0].name, "depth_prepass");
        assert_eq!(plan.passes[1].name, "lighting");
        assert_eq!(plan.passes[2].name, "present_blit");
        assert!(plan.writes_present_target);

        // `lighting` samples the depth buffer the prepass wrote, so the
        // executor must see a barrier transitioning it before that pass runs.
        assert!(plan.passes[1].barriers.iter().any(|b| b.texture == depth));
    }

    #[test]
    fn culls_a_pass_that_writes_to_nothing_imported_or_presented() {
        let mut graph = FrameGraphBuilder::new();
        let scratch = graph.create_texture(TextureDescriptor { width: 256, height: 256, format: TextureFormat::Rgba8Unorm });

        graph.add_pass("dead_end").output_attachment(scratch, 0, None).callback(|_ctx| {});

        let present_color = graph.present_color();
        graph
            .add_pass("present_clear")
            .output_attachment(present_color, 0, Some(ClearColor { r: 0.0, g: 0.0, b: 0.0, a: 1.0 }))
            .render_frame_output(true)
            .callback(|_ctx| {});

        let plan = graph.build().unwrap();

        assert_eq!(plan.passes.len(), 1);
        assert_eq!(plan.passes[0].name, "present_clear");
    }

    #[test]
    fn rejects_a_pass_that_both_samples_and_writes_the_same_texture() {
        let mut graph = FrameGraphBuilder::new();
        let texture = graph.create_texture(TextureDescriptor { width: 64, height: 64, format: TextureFormat::Rgba8Unorm });

        graph
            .add_pass("feedback")
            .sample(texture, ShaderStages::FRAGMENT)
            .output_attachment(texture, 0, None)
            .render_frame_output(true)
            .callback(|_ctx| {});

        match graph.build() {
            Err(FrameGraphError::SelfDependency { pass, .. }) => assert_eq!(pass, "feedback"),
            other => panic!("expected a SelfDependency error, got {other:?}"),
        }
    }

    #[test]
    fn aliases_non_overlapping_transient_textures_of_the_same_shape() {
        let mut graph = FrameGraphBuilder::new();
        let a = graph.create_texture(TextureDescriptor { width: 512, height: 512, format: TextureFormat::Rgba16Float });
        let b = graph.create_texture(TextureDescriptor { width: 512, height: 512, format: TextureFormat::Rgba16Float });

        graph.add_pass("write_a").output_attachment(a, 0, None).callback(|_ctx| {});
        graph.add_pass("read_a").sample(a, ShaderStages::FRAGMENT).render_frame_output(true).callback(|_ctx| {});
        graph.add_pass("write_b").output_attachment(b, 0, None).callback(|_ctx| {});

        let present_color = graph.present_color();
        graph
            .add_pass("read_b")
            .sample(b, ShaderStages::FRAGMENT)
            .output_attachment(present_color, 0, None)
            .render_frame_output(true)
            .callback(|_ctx| {});

        let plan = graph.build().unwrap();

        // `a`'s lifetime ends before `write_b` starts, so the aliaser should
        // have reused its physical texture for `b` rather than allocating a
        // second one of the same shape.
        assert_eq!(plan.physical_textures.len(), 2);
    }
}
