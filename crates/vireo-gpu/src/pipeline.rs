//! Graphics pipeline with its render pass and per-image framebuffers.

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use crate::swapchain::Swapchain;
use ash::vk;
use std::sync::Arc;

/// Clear color used when none is given.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.5, 0.0, 1.0];

/// Description of a graphics pipeline.
///
/// The SPIR-V words are kept so the pipeline can be rebuilt when the
/// swapchain format changes; shader modules are not.
#[derive(Clone, Debug)]
pub struct PipelineDesc {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub primitive_restart: bool,
    pub blend_alpha: bool,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub clear_color: [f32; 4],
}

impl Default for PipelineDesc {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            primitive_restart: false,
            blend_alpha: false,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            clear_color: DEFAULT_CLEAR_COLOR,
        }
    }
}

impl PipelineDesc {
    /// Description with the given shaders and default state.
    pub fn new(vertex_shader: Vec<u32>, fragment_shader: Vec<u32>) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            ..Default::default()
        }
    }

    /// Set the vertex input layout.
    pub fn vertex_layout(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.primitive_restart = enable;
        self
    }

    /// Blend with source alpha over the destination.
    pub fn blend_alpha(mut self, enable: bool) -> Self {
        self.blend_alpha = enable;
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }
}

/// Color attachment blend state for the given alpha blending setting.
pub fn color_blend_attachment(blend_alpha: bool) -> vk::PipelineColorBlendAttachmentState {
    let state =
        vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
    if blend_alpha {
        state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    } else {
        state.blend_enable(false)
    }
}

/// Replace every framebuffer in `existing` with one per view.
///
/// Old framebuffers are handed to `destroy` first. If `create` fails, the
/// framebuffers built so far stay in `existing`.
pub fn rebuild_framebuffers<F, V, E>(
    existing: &mut Vec<F>,
    views: &[V],
    mut create: impl FnMut(&V) -> std::result::Result<F, E>,
    mut destroy: impl FnMut(F),
) -> std::result::Result<(), E> {
    for framebuffer in existing.drain(..) {
        destroy(framebuffer);
    }
    existing.reserve(views.len());
    for view in views {
        existing.push(create(view)?);
    }
    Ok(())
}

/// A graphics pipeline rendering into the images of one swapchain.
pub struct RenderPipeline {
    device: Arc<ash::Device>,
    desc: PipelineDesc,
    format: vk::Format,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,
}

impl RenderPipeline {
    /// Build the render pass, pipeline and framebuffers for `swapchain`.
    pub fn new(gpu: &GpuContext, swapchain: &Swapchain, desc: PipelineDesc) -> Result<Self> {
        let device = gpu.device_arc();
        let format = swapchain.format();

        let layout = unsafe {
            device.create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)
        }
        .check("create pipeline layout")?;

        let mut pipeline = Self {
            device,
            desc,
            format,
            render_pass: vk::RenderPass::null(),
            layout,
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::new(),
        };

        // Partial state is released by Drop on failure
        pipeline.render_pass = pipeline.create_render_pass(format)?;
        pipeline.pipeline = pipeline.create_pipeline()?;
        pipeline.create_framebuffers(swapchain)?;

        tracing::debug!(
            "Render pipeline created ({:?}, {} framebuffers)",
            format,
            pipeline.framebuffers.len()
        );

        Ok(pipeline)
    }

    /// Rebuild the render pass and framebuffers after `swapchain` was recreated.
    ///
    /// The pipeline object is rebuilt too if the image format changed.
    pub fn reset(&mut self, swapchain: &Swapchain) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.check("wait for device idle")?;

        self.destroy_framebuffers();
        unsafe { self.device.destroy_render_pass(self.render_pass, None) };
        self.render_pass = vk::RenderPass::null();

        let format = swapchain.format();
        self.render_pass = self.create_render_pass(format)?;

        if format != self.format {
            tracing::debug!("Swapchain format changed, rebuilding pipeline");
            unsafe { self.device.destroy_pipeline(self.pipeline, None) };
            self.pipeline = vk::Pipeline::null();
            self.format = format;
            self.pipeline = self.create_pipeline()?;
        }

        self.create_framebuffers(swapchain)
    }

    /// Begin the render pass on the acquired image, bind the pipeline and set
    /// viewport and scissor to the swapchain extent.
    pub fn bind_cmd(&self, cmd: vk::CommandBuffer, swapchain: &Swapchain) -> Result<()> {
        let image_index = swapchain.image_index();
        let framebuffer = usize::try_from(image_index)
            .ok()
            .and_then(|index| self.framebuffers.get(index))
            .copied()
            .ok_or_else(|| {
                GpuError::InvalidState(format!("no framebuffer for swapchain image {image_index}"))
            })?;

        let extent = swapchain.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.desc.clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[render_area]);
        }

        Ok(())
    }

    /// End the render pass begun by [`Self::bind_cmd`].
    pub fn unbind_cmd(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }

    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Number of framebuffers, one per swapchain image view.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub const fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    fn create_render_pass(&self, format: vk::Format) -> Result<vk::RenderPass> {
        let attachments = [vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        // The image is only available once the acquire semaphore was waited on
        // at the color output stage
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        unsafe { self.device.create_render_pass(&create_info, None) }.check("create render pass")
    }

    fn create_shader_module(&self, code: &[u32], stage: &str) -> Result<vk::ShaderModule> {
        if code.is_empty() {
            return Err(GpuError::PipelineCreation(format!(
                "{stage} shader is empty"
            )));
        }
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { self.device.create_shader_module(&info, None) }
            .map_err(|e| GpuError::PipelineCreation(format!("{stage} shader: {e}")))
    }

    fn create_pipeline(&self) -> Result<vk::Pipeline> {
        let desc = &self.desc;

        let vert_module = self.create_shader_module(&desc.vertex_shader, "vertex")?;
        let frag_module = match self.create_shader_module(&desc.fragment_shader, "fragment") {
            Ok(module) => module,
            Err(e) => {
                unsafe { self.device.destroy_shader_module(vert_module, None) };
                return Err(e);
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(desc.primitive_restart);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(desc.polygon_mode)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments = [color_blend_attachment(desc.blend_alpha)];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0);

        let result = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        // SAFETY: Modules are no longer needed once the pipeline exists
        unsafe {
            self.device.destroy_shader_module(vert_module, None);
            self.device.destroy_shader_module(frag_module, None);
        }

        result
            .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?
            .first()
            .copied()
            .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))
    }

    fn create_framebuffers(&mut self, swapchain: &Swapchain) -> Result<()> {
        let device = Arc::clone(&self.device);
        let render_pass = self.render_pass;
        let extent = swapchain.extent();

        rebuild_framebuffers(
            &mut self.framebuffers,
            swapchain.image_views(),
            |&view| {
                let attachments = [view];
                let info = vk::FramebufferCreateInfo::default()
                    .render_pass(render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);
                unsafe { device.create_framebuffer(&info, None) }.check("create framebuffer")
            },
            // SAFETY: Callers idle the device before rebuilding
            |framebuffer| unsafe { device.destroy_framebuffer(framebuffer, None) },
        )
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.destroy_framebuffer(framebuffer, None) };
        }
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        // SAFETY: Owners wait for the device to idle before dropping; null handles are ignored
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffers_follow_view_count() {
        let mut framebuffers = vec![10u32, 11];
        let views = [0u32, 1, 2];
        let mut destroyed = Vec::new();

        rebuild_framebuffers::<_, _, ()>(
            &mut framebuffers,
            &views,
            |&view| Ok(100 + view),
            |fb| destroyed.push(fb),
        )
        .unwrap();

        assert_eq!(framebuffers, vec![100, 101, 102]);
        assert_eq!(destroyed, vec![10, 11]);
    }

    #[test]
    fn shrinking_image_set() {
        let mut framebuffers = vec![1u32, 2, 3];
        rebuild_framebuffers::<_, _, ()>(&mut framebuffers, &[7u32, 8], |&v| Ok(v), |_| {}).unwrap();
        assert_eq!(framebuffers.len(), 2);
    }

    #[test]
    fn failed_rebuild_keeps_created_framebuffers() {
        let mut framebuffers = vec![1u32];
        let result = rebuild_framebuffers(
            &mut framebuffers,
            &[0u32, 1, 2],
            |&view| if view < 2 { Ok(view) } else { Err("boom") },
            |_| {},
        );
        assert_eq!(result, Err("boom"));
        assert_eq!(framebuffers, vec![0, 1]);
    }

    #[test]
    fn alpha_blending_state() {
        let blended = color_blend_attachment(true);
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            blended.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );

        let opaque = color_blend_attachment(false);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn desc_defaults() {
        let desc = PipelineDesc::new(vec![1], vec![2]).blend_alpha(true);
        assert_eq!(desc.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(desc.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(desc.clear_color, DEFAULT_CLEAR_COLOR);
        assert!(desc.blend_alpha);
    }
}
