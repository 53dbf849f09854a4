use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use vulkano::{
    device::physical::PhysicalDevice,
    format::{Format, FormatFeatures},
    image::{view::ImageView, Image, ImageCreateInfo, ImageType, ImageUsage},
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
    render_pass::{Framebuffer, FramebufferCreateInfo, RenderPass},
};

use super::VulkanContext;

/// Pick a combined depth/stencil format the device can render to. The
/// distance pass needs depth, the fill passes need stencil, so a packed
/// format carries both.
pub fn depth_stencil_format(physical_device: &Arc<PhysicalDevice>) -> Result<Format> {
    for format in [Format::D24_UNORM_S8_UINT, Format::D32_SFLOAT_S8_UINT] {
        if let Ok(props) = physical_device.format_properties(format) {
            if props
                .optimal_tiling_features
                .intersects(FormatFeatures::DEPTH_STENCIL_ATTACHMENT)
            {
                return Ok(format);
            }
        }
    }
    Err(anyhow!("No supported depth/stencil format"))
}

/// Offscreen render target: single-channel color plus depth/stencil.
///
/// This bypasses any swapchain, allowing rendering at arbitrary dimensions;
/// the color image is read back after the frame.
pub struct OffscreenTarget {
    /// Color image - read this back after rendering
    pub image: Arc<Image>,
    pub framebuffer: Arc<Framebuffer>,
    pub width: u32,
    pub height: u32,
}

impl OffscreenTarget {
    pub fn new(
        ctx: &VulkanContext,
        render_pass: Arc<RenderPass>,
        width: u32,
        height: u32,
        ds_format: Format,
    ) -> Result<Self> {
        let color_image = Image::new(
            ctx.memory_allocator.clone(),
            ImageCreateInfo {
                image_type: ImageType::Dim2d,
                format: Format::R8_UNORM,
                extent: [width, height, 1],
                usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
                ..Default::default()
            },
        )
        .context("Failed to create offscreen color image")?;

        let color_view = ImageView::new_default(color_image.clone())
            .context("Failed to create offscreen color image view")?;

        let ds_image = Image::new(
            ctx.memory_allocator.clone(),
            ImageCreateInfo {
                image_type: ImageType::Dim2d,
                format: ds_format,
                extent: [width, height, 1],
                usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::TRANSIENT_ATTACHMENT,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
                ..Default::default()
            },
        )
        .context("Failed to create depth/stencil image")?;

        let ds_view =
            ImageView::new_default(ds_image).context("Failed to create depth/stencil view")?;

        let framebuffer = Framebuffer::new(
            render_pass,
            FramebufferCreateInfo {
                attachments: vec![color_view, ds_view],
                ..Default::default()
            },
        )
        .context("Failed to create offscreen framebuffer")?;

        Ok(Self {
            image: color_image,
            framebuffer,
            width,
            height,
        })
    }
}
