//! Two-pass GPU SDF rasterizer.
//!
//! Pass A draws one parabola quad per outline segment with a depth-tested
//! minimum distance; pass B fills the glyph interiors through a saturating
//! stencil winding count and inverts the distance image where the count
//! is one, producing `0.5 - dist` outside and `0.5 + dist` inside.

use anyhow::{Context, Result};
use std::sync::Arc;
use vulkano::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
    command_buffer::{
        AutoCommandBufferBuilder, CommandBufferUsage, CopyImageToBufferInfo, RenderPassBeginInfo,
    },
    format::{ClearValue, Format},
    pipeline::{
        graphics::{
            color_blend::{
                AttachmentBlend, BlendFactor, BlendOp, ColorBlendAttachmentState, ColorBlendState,
                ColorComponents,
            },
            depth_stencil::{
                CompareOp, DepthState, DepthStencilState, StencilOp, StencilOpState, StencilOps,
                StencilState,
            },
            input_assembly::InputAssemblyState,
            multisample::MultisampleState,
            rasterization::{CullMode, FrontFace, RasterizationState},
            vertex_input::{Vertex, VertexDefinition},
            viewport::{Viewport, ViewportState},
            GraphicsPipelineCreateInfo,
        },
        layout::PipelineDescriptorSetLayoutCreateInfo,
        DynamicState, GraphicsPipeline, PipelineLayout, PipelineShaderStageCreateInfo,
    },
    render_pass::{RenderPass, Subpass},
    shader::EntryPoint,
    sync::{self, GpuFuture},
    Validated,
};

use super::context::VulkanContext;
use super::offscreen::{depth_stencil_format, OffscreenTarget};
use crate::geometry::SdfVertex;

mod vs {
    vulkano_shaders::shader! {
        ty: "vertex",
        src: r"
            #version 450

            layout(location = 0) in vec2 pos;
            layout(location = 1) in vec2 par;
            layout(location = 2) in vec2 limits;
            layout(location = 3) in float scale;
            layout(location = 4) in float line_width;

            layout(location = 0) out vec2 v_par;
            layout(location = 1) out vec2 v_limits;
            layout(location = 2) out float v_dist_scale;

            layout(push_constant) uniform PushConstants {
                vec2 tex_size;
            } pc;

            void main() {
                // Atlas pixel coords to NDC
                vec2 ndc = (pos / pc.tex_size) * 2.0 - 1.0;
                gl_Position = vec4(ndc, 0.0, 1.0);
                v_par = par;
                v_limits = limits;
                v_dist_scale = line_width > 0.0 ? scale / line_width : 0.0;
            }
        ",
    }
}

mod line_fs {
    vulkano_shaders::shader! {
        ty: "fragment",
        src: r"
            #version 450

            layout(location = 0) in vec2 v_par;
            layout(location = 1) in vec2 v_limits;
            layout(location = 2) in float v_dist_scale;

            layout(location = 0) out vec4 f_color;

            // Nearest point on the parabola y = x^2: solve the cubic
            // x^3 + g*x - h = 0 with the low-rank LDL^T iteration
            // (Strobach 2015), which stays stable for the nearly straight
            // segments injected for lines.
            float solve_par_dist(vec2 pcoord, int iter) {
                float sigx = pcoord.x > 0.0 ? 1.0 : -1.0;
                float px = abs(pcoord.x);
                float py = pcoord.y;
                float h = 0.5 * px;
                float g = 0.5 - py;
                float xr = sqrt(0.5 * px);
                float x0 = g < -h ? sqrt(abs(g)) :
                           g > xr ? h / abs(g) :
                           xr;

                for (int i = 0; i < iter; ++i) {
                    float rcx0 = 1.0 / x0;
                    float pb = h * rcx0 * rcx0;
                    float pc = -px * rcx0 + g;
                    x0 = 2.0 * pc / (-pb - sqrt(abs(pb * pb - 4.0 * pc)));
                }

                x0 = sigx * x0;
                // Second real root; the third is never the closest
                float dx = sigx * sqrt(-0.75 * x0 * x0 - g);
                float x1 = -0.5 * x0 - dx;

                x0 = clamp(x0, v_limits.x, v_limits.y);
                x1 = clamp(x1, v_limits.x, v_limits.y);

                float d0 = length(vec2(x0, x0 * x0) - pcoord);
                float d1 = length(vec2(x1, x1 * x1) - pcoord);

                return min(d0, d1);
            }

            void main() {
                float dist = solve_par_dist(v_par, 3);
                float pdist = min(dist * v_dist_scale, 1.0);

                float color = 0.5 - 0.5 * pdist;
                if (color == 0.0) discard;

                f_color = vec4(color);
                // overlapping quads keep the minimum distance
                gl_FragDepth = pdist;
            }
        ",
    }
}

mod fill_fs {
    vulkano_shaders::shader! {
        ty: "fragment",
        src: r"
            #version 450

            layout(location = 0) in vec2 v_par;

            layout(location = 0) out vec4 f_color;

            void main() {
                // Solid triangles carry par = (0, 1) and always pass;
                // curve triangles keep the lens between chord and curve.
                if (v_par.x * v_par.x - v_par.y > 0.0) discard;
                f_color = vec4(1.0);
            }
        ",
    }
}

mod invert_vs {
    vulkano_shaders::shader! {
        ty: "vertex",
        src: r"
            #version 450

            layout(location = 0) in vec2 pos;

            void main() {
                gl_Position = vec4(pos, 0.0, 1.0);
            }
        ",
    }
}

mod invert_fs {
    vulkano_shaders::shader! {
        ty: "fragment",
        src: r"
            #version 450

            layout(location = 0) out vec4 f_color;

            void main() {
                // blended as 1 - dst where the stencil marks the interior
                f_color = vec4(1.0);
            }
        ",
    }
}

fn stencil_pass_state(op: StencilOp) -> StencilOpState {
    StencilOpState {
        ops: StencilOps {
            fail_op: StencilOp::Keep,
            pass_op: op,
            depth_fail_op: op,
            compare_op: CompareOp::Always,
        },
        compare_mask: 0xff,
        write_mask: 0xff,
        reference: 0,
    }
}

/// Stencil state of the inversion quad: pass only where the winding count
/// reached one, zeroing the count as it goes.
fn invert_stencil_state() -> StencilOpState {
    StencilOpState {
        ops: StencilOps {
            fail_op: StencilOp::Zero,
            pass_op: StencilOp::Zero,
            depth_fail_op: StencilOp::Zero,
            compare_op: CompareOp::Equal,
        },
        compare_mask: 0xff,
        write_mask: 0xff,
        reference: 1,
    }
}

pub struct GpuRasterizer {
    ctx: VulkanContext,
    render_pass: Arc<RenderPass>,
    line_pipeline: Arc<GraphicsPipeline>,
    fill_incr_pipeline: Arc<GraphicsPipeline>,
    fill_decr_pipeline: Arc<GraphicsPipeline>,
    invert_pipeline: Arc<GraphicsPipeline>,
    ds_format: Format,
}

impl GpuRasterizer {
    pub fn new() -> Result<Self> {
        let ctx = VulkanContext::new()?;
        let device = ctx.device.clone();

        let ds_format = depth_stencil_format(device.physical_device())?;

        let render_pass = vulkano::single_pass_renderpass!(
            device.clone(),
            attachments: {
                color: {
                    format: Format::R8_UNORM,
                    samples: 1,
                    load_op: Clear,
                    store_op: Store,
                },
                depth_stencil: {
                    format: ds_format,
                    samples: 1,
                    load_op: Clear,
                    store_op: DontCare,
                },
            },
            pass: {
                color: [color],
                depth_stencil: {depth_stencil},
            },
        )
        .context("Failed to create render pass")?;

        let vs = vs::load(device.clone()).context("Failed to load vertex shader")?;
        let line_fs = line_fs::load(device.clone()).context("Failed to load line shader")?;
        let fill_fs = fill_fs::load(device.clone()).context("Failed to load fill shader")?;
        let invert_vs = invert_vs::load(device.clone()).context("Failed to load invert shader")?;
        let invert_fs = invert_fs::load(device.clone()).context("Failed to load invert shader")?;

        let vs_entry = vs.entry_point("main").unwrap();
        let line_fs_entry = line_fs.entry_point("main").unwrap();
        let fill_fs_entry = fill_fs.entry_point("main").unwrap();
        let invert_vs_entry = invert_vs.entry_point("main").unwrap();
        let invert_fs_entry = invert_fs.entry_point("main").unwrap();

        let subpass = Subpass::from(render_pass.clone(), 0).context("Failed to get subpass")?;

        // Pass A: outline distance, depth-tested minimum
        let line_pipeline = build_pipeline(
            &ctx,
            subpass.clone(),
            vs_entry.clone(),
            line_fs_entry,
            DepthStencilState {
                depth: Some(DepthState {
                    write_enable: true,
                    compare_op: CompareOp::LessOrEqual,
                }),
                ..Default::default()
            },
            RasterizationState::default(),
            ColorBlendAttachmentState::default(),
        )?;

        // Vulkan's framebuffer y is flipped relative to GL, which flips
        // every triangle's window-space winding; declaring clockwise front
        // faces restores the GL cull/increment pairing.
        let fill_raster = |cull_mode| RasterizationState {
            cull_mode,
            front_face: FrontFace::Clockwise,
            ..Default::default()
        };
        let no_color_write = ColorBlendAttachmentState {
            color_write_mask: ColorComponents::empty(),
            ..Default::default()
        };

        // Pass B step 1: back faces increment the stencil
        let fill_incr_pipeline = build_pipeline(
            &ctx,
            subpass.clone(),
            vs_entry.clone(),
            fill_fs_entry.clone(),
            DepthStencilState {
                stencil: Some(StencilState {
                    front: stencil_pass_state(StencilOp::IncrementAndClamp),
                    back: stencil_pass_state(StencilOp::IncrementAndClamp),
                }),
                ..Default::default()
            },
            fill_raster(CullMode::Front),
            no_color_write.clone(),
        )?;

        // Pass B step 2: front faces decrement
        let fill_decr_pipeline = build_pipeline(
            &ctx,
            subpass.clone(),
            vs_entry,
            fill_fs_entry,
            DepthStencilState {
                stencil: Some(StencilState {
                    front: stencil_pass_state(StencilOp::DecrementAndClamp),
                    back: stencil_pass_state(StencilOp::DecrementAndClamp),
                }),
                ..Default::default()
            },
            fill_raster(CullMode::Back),
            no_color_write,
        )?;

        // Pass B step 3: full-screen inversion where the winding count is 1
        let invert_pipeline = build_pipeline(
            &ctx,
            subpass,
            invert_vs_entry,
            invert_fs_entry,
            DepthStencilState {
                stencil: Some(StencilState {
                    front: invert_stencil_state(),
                    back: invert_stencil_state(),
                }),
                ..Default::default()
            },
            RasterizationState::default(),
            ColorBlendAttachmentState {
                blend: Some(AttachmentBlend {
                    src_color_blend_factor: BlendFactor::OneMinusDstColor,
                    dst_color_blend_factor: BlendFactor::Zero,
                    color_blend_op: BlendOp::Add,
                    src_alpha_blend_factor: BlendFactor::OneMinusDstColor,
                    dst_alpha_blend_factor: BlendFactor::Zero,
                    alpha_blend_op: BlendOp::Add,
                }),
                ..Default::default()
            },
        )?;

        Ok(Self {
            ctx,
            render_pass,
            line_pipeline,
            fill_incr_pipeline,
            fill_decr_pipeline,
            invert_pipeline,
            ds_format,
        })
    }

    pub fn max_size(&self) -> u32 {
        self.ctx.max_image_dimension
    }

    fn vertex_buffer(&self, vertices: &[SdfVertex]) -> Result<Subbuffer<[SdfVertex]>> {
        Buffer::from_iter(
            self.ctx.memory_allocator.clone(),
            BufferCreateInfo {
                usage: BufferUsage::VERTEX_BUFFER,
                ..Default::default()
            },
            vulkano::memory::allocator::AllocationCreateInfo {
                memory_type_filter: vulkano::memory::allocator::MemoryTypeFilter::PREFER_DEVICE
                    | vulkano::memory::allocator::MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            vertices.iter().copied(),
        )
        .context("Failed to create vertex buffer")
    }

    /// Render both vertex streams and read back the single-channel image.
    /// Row 0 of the result is world y = 0.
    pub fn render(
        &self,
        width: u32,
        height: u32,
        fill_vertices: &[SdfVertex],
        line_vertices: &[SdfVertex],
    ) -> Result<Vec<u8>> {
        let target = OffscreenTarget::new(
            &self.ctx,
            self.render_pass.clone(),
            width,
            height,
            self.ds_format,
        )?;

        let readback = Buffer::from_iter(
            self.ctx.memory_allocator.clone(),
            BufferCreateInfo {
                usage: BufferUsage::TRANSFER_DST,
                ..Default::default()
            },
            vulkano::memory::allocator::AllocationCreateInfo {
                memory_type_filter: vulkano::memory::allocator::MemoryTypeFilter::PREFER_HOST
                    | vulkano::memory::allocator::MemoryTypeFilter::HOST_RANDOM_ACCESS,
                ..Default::default()
            },
            (0..width as usize * height as usize).map(|_| 0u8),
        )
        .context("Failed to create readback buffer")?;

        let viewport = Viewport {
            offset: [0.0, 0.0],
            extent: [width as f32, height as f32],
            depth_range: 0.0..=1.0,
        };

        let mut builder = AutoCommandBufferBuilder::primary(
            self.ctx.command_buffer_allocator.clone(),
            self.ctx.queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )
        .context("Failed to create command buffer")?;

        builder
            .begin_render_pass(
                RenderPassBeginInfo {
                    clear_values: vec![
                        Some([0.0, 0.0, 0.0, 0.0].into()),
                        Some(ClearValue::DepthStencil((1.0, 0))),
                    ],
                    ..RenderPassBeginInfo::framebuffer(target.framebuffer.clone())
                },
                Default::default(),
            )
            .context("Failed to begin render pass")?;

        let push = vs::PushConstants {
            tex_size: [width as f32, height as f32],
        };

        if !line_vertices.is_empty() {
            let buffer = self.vertex_buffer(line_vertices)?;
            let count = buffer.len() as u32;
            builder
                .bind_pipeline_graphics(self.line_pipeline.clone())
                .context("Failed to bind line pipeline")?
                .push_constants(self.line_pipeline.layout().clone(), 0, push)
                .context("Failed to push constants")?
                .set_viewport(0, [viewport.clone()].into_iter().collect())
                .context("Failed to set viewport")?
                .bind_vertex_buffers(0, buffer)
                .context("Failed to bind vertex buffers")?;
            // SAFETY: pipeline, push constants and vertex buffer are bound
            // and the vertex count matches the buffer length
            unsafe {
                builder.draw(count, 1, 0, 0).context("Failed to draw")?;
            }
        }

        if !fill_vertices.is_empty() {
            let buffer = self.vertex_buffer(fill_vertices)?;
            let count = buffer.len() as u32;

            for pipeline in [&self.fill_incr_pipeline, &self.fill_decr_pipeline] {
                builder
                    .bind_pipeline_graphics((*pipeline).clone())
                    .context("Failed to bind fill pipeline")?
                    .push_constants((*pipeline).layout().clone(), 0, push)
                    .context("Failed to push constants")?
                    .set_viewport(0, [viewport.clone()].into_iter().collect())
                    .context("Failed to set viewport")?
                    .bind_vertex_buffers(0, buffer.clone())
                    .context("Failed to bind vertex buffers")?;
                // SAFETY: as above
                unsafe {
                    builder.draw(count, 1, 0, 0).context("Failed to draw")?;
                }
            }

            // Full-screen quad in NDC
            let quad = [
                ndc_vertex(-1.0, -1.0),
                ndc_vertex(1.0, -1.0),
                ndc_vertex(1.0, 1.0),
                ndc_vertex(-1.0, -1.0),
                ndc_vertex(1.0, 1.0),
                ndc_vertex(-1.0, 1.0),
            ];
            let quad_buffer = self.vertex_buffer(&quad)?;
            builder
                .bind_pipeline_graphics(self.invert_pipeline.clone())
                .context("Failed to bind invert pipeline")?
                .set_viewport(0, [viewport].into_iter().collect())
                .context("Failed to set viewport")?
                .bind_vertex_buffers(0, quad_buffer)
                .context("Failed to bind vertex buffers")?;
            // SAFETY: as above
            unsafe {
                builder.draw(6, 1, 0, 0).context("Failed to draw")?;
            }
        }

        builder
            .end_render_pass(Default::default())
            .context("Failed to end render pass")?;

        builder
            .copy_image_to_buffer(CopyImageToBufferInfo::image_buffer(
                target.image.clone(),
                readback.clone(),
            ))
            .context("Failed to copy image to buffer")?;

        let command_buffer = builder.build().context("Failed to build command buffer")?;

        let future = sync::now(self.ctx.device.clone())
            .then_execute(self.ctx.queue.clone(), command_buffer)
            .context("Failed to execute")?
            .then_signal_fence_and_flush()
            .map_err(Validated::unwrap)
            .context("Failed to flush")?;
        future.wait(None).context("Failed to wait for render")?;

        let content = readback.read().context("Failed to read rendered image")?;
        Ok(content.to_vec())
    }
}

/// Full-screen quad corner as an `SdfVertex` with NDC position.
fn ndc_vertex(x: f32, y: f32) -> SdfVertex {
    SdfVertex {
        pos: [x, y],
        par: [0.0, 1.0],
        limits: [0.0, 0.0],
        scale: 0.0,
        line_width: 0.0,
    }
}

fn build_pipeline(
    ctx: &VulkanContext,
    subpass: Subpass,
    vs_entry: EntryPoint,
    fs_entry: EntryPoint,
    depth_stencil_state: DepthStencilState,
    rasterization_state: RasterizationState,
    attachment_state: ColorBlendAttachmentState,
) -> Result<Arc<GraphicsPipeline>> {
    let device = ctx.device.clone();

    let vertex_input_state = SdfVertex::per_vertex().definition(&vs_entry).unwrap();

    let stages = [
        PipelineShaderStageCreateInfo::new(vs_entry),
        PipelineShaderStageCreateInfo::new(fs_entry),
    ];

    let layout = PipelineLayout::new(
        device.clone(),
        PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages)
            .into_pipeline_layout_create_info(device.clone())
            .context("Failed to create pipeline layout info")?,
    )
    .context("Failed to create pipeline layout")?;

    GraphicsPipeline::new(
        device,
        None,
        GraphicsPipelineCreateInfo {
            stages: stages.into_iter().collect(),
            vertex_input_state: Some(vertex_input_state),
            input_assembly_state: Some(InputAssemblyState::default()),
            viewport_state: Some(ViewportState {
                viewports: [Viewport::default()].into_iter().collect(),
                ..Default::default()
            }),
            rasterization_state: Some(rasterization_state),
            multisample_state: Some(MultisampleState::default()),
            depth_stencil_state: Some(depth_stencil_state),
            color_blend_state: Some(ColorBlendState::with_attachment_states(
                subpass.num_color_attachments(),
                attachment_state,
            )),
            dynamic_state: [DynamicState::Viewport].into_iter().collect(),
            subpass: Some(subpass.into()),
            ..GraphicsPipelineCreateInfo::layout(layout)
        },
    )
    .context("Failed to create graphics pipeline")
}
