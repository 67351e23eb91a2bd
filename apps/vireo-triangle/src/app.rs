//! Triangle application.

use std::mem::{offset_of, size_of, size_of_val};
use std::path::PathBuf;

use anyhow::Context as _;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use vireo_app::{AppContext, Application, Event, PipelineDesc, RenderPipeline};
use vireo_core::constants::MAX_FRAMES_IN_FLIGHT;
use vireo_gpu::{load_shader_from_disk, vk, Buffer, BufferKind, BufferUsage, CommandLevel, CommandPool};

const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders");

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
}

impl Vertex {
    const fn new(x: f32, y: f32, color: Vec3) -> Self {
        Self {
            position: Vec2::new(x, y),
            color,
        }
    }

    fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    fn attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, color) as u32),
        ]
    }
}

// Clockwise in framebuffer space (y down)
const VERTICES: [Vertex; 3] = [
    Vertex::new(0.0, -0.5, Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(0.5, 0.5, Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(-0.5, 0.5, Vec3::new(0.0, 0.0, 1.0)),
];

fn load_spirv(name: &str) -> anyhow::Result<Vec<u32>> {
    let path = PathBuf::from(SHADER_DIR).join(name);
    let words = load_shader_from_disk(&path)
        .with_context(|| format!("Failed to load shader {}", path.display()))?;
    anyhow::ensure!(!words.is_empty(), "Shader {} is empty", path.display());
    Ok(words)
}

pub struct TriangleApp {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
}

impl Application for TriangleApp {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let gpu = ctx.gpu();

        let desc = PipelineDesc::new(load_spirv("basic.vert.spv")?, load_spirv("basic.frag.spv")?)
            .vertex_layout(vec![Vertex::binding()], Vertex::attributes())
            .clear_color(ctx.config().clear_color);
        let pipeline = RenderPipeline::new(gpu, ctx.swapchain(), desc)?;

        let size = size_of_val(&VERTICES) as u64;
        let staging = gpu.create_buffer(
            BufferKind::Vertex,
            BufferUsage::Staging,
            size,
            "triangle staging",
        )?;
        staging.write(0, &VERTICES)?;

        let vertex_buffer =
            gpu.create_buffer(BufferKind::Vertex, BufferUsage::Gpu, size, "triangle vertices")?;

        let upload_pool = gpu.create_command_pool(true)?;
        gpu.immediate_submit(&upload_pool, |cmd| {
            // SAFETY: immediate_submit hands us a recording command buffer
            unsafe { vertex_buffer.copy_from(cmd, &staging, size, 0, 0) }
        })?;
        tracing::debug!("Uploaded {} vertices", VERTICES.len());

        let command_pool = gpu.create_command_pool(false)?;
        let command_buffers =
            command_pool.allocate(MAX_FRAMES_IN_FLIGHT as u32, CommandLevel::Primary)?;

        Ok(Self {
            pipeline,
            vertex_buffer,
            command_buffers,
            command_pool,
        })
    }

    fn tick(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let gpu = ctx.gpu();
        let cmd = self.command_buffers[ctx.frame_slot()];

        // SAFETY: The frame fence for this slot has signaled
        unsafe { self.command_pool.reset_buffer(cmd)? };

        gpu.begin_cmd(cmd)?;
        self.pipeline.bind_cmd(cmd, ctx.swapchain())?;
        // SAFETY: cmd is recording inside the render pass
        unsafe { Buffer::bind_vertex_buffers(cmd, 0, &[&self.vertex_buffer], &[0])? };
        gpu.draw_cmd(cmd, VERTICES.len() as u32, 1, 0, 0);
        self.pipeline.unbind_cmd(cmd);
        gpu.end_cmd(cmd)?;

        ctx.submit_gfx_queue(&[cmd])?;
        Ok(())
    }

    fn recreate_pipelines(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        self.pipeline.reset(ctx.swapchain())?;
        Ok(())
    }

    fn event_proc(&mut self, _ctx: &mut AppContext, event: &Event) -> anyhow::Result<()> {
        tracing::trace!("Unhandled event: {event:?}");
        Ok(())
    }

    fn deinit(&mut self, _ctx: &mut AppContext) {
        tracing::info!("Triangle demo shutting down");
    }
}
