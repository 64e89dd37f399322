/// Swapchain - presentation surface and the targets the main render pass draws into
///
/// Owns the swapchain images and views, a depth buffer, the main render pass,
/// one framebuffer and one render-finished semaphore per image. Everything
/// but the surface is rebuilt by `recreate`.

use j4f_engine::j4f::{Error, Result};
use j4f_engine::{engine_error, engine_info};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use crate::vulkan_context::GpuContext;

pub(crate) const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

fn init_error(what: &str, e: vk::Result) -> Error {
    engine_error!("j4f::vulkan", "Failed to {}: {:?}", what, e);
    Error::InitializationFailed(format!("Failed to {}: {:?}", what, e))
}

/// Images, views and per-image objects of one swapchain generation
struct Targets {
    image_views: Vec<vk::ImageView>,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
    depth_allocation: Option<Allocation>,
    framebuffers: Vec<vk::Framebuffer>,
    render_finished: Vec<vk::Semaphore>,
}

pub(crate) struct Swapchain {
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    loader: ash::khr::swapchain::Device,
    pub(crate) swapchain: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    render_pass: vk::RenderPass,
    targets: Option<Targets>,
}

/// Prefer an sRGB BGRA surface format
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats.iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.iter().find(|f| f.format == vk::Format::R8G8B8A8_SRGB))
        .or_else(|| formats.first())
        .copied()
}

/// FIFO when vsync is on, otherwise MAILBOX, then IMMEDIATE, then FIFO
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, falling back to the requested size when the surface leaves it open
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

impl Swapchain {
    pub(crate) fn new(
        ctx: &GpuContext,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }
            .map_err(|e| init_error("query surface formats", e))?;
        let surface_format = choose_surface_format(&formats)
            .ok_or_else(|| Error::InitializationFailed("Surface reports no formats".to_string()))?;

        let loader = ash::khr::swapchain::Device::new(instance, &ctx.device);
        let mut swapchain = Self {
            physical_device,
            surface,
            surface_loader,
            loader,
            swapchain: vk::SwapchainKHR::null(),
            surface_format,
            extent: vk::Extent2D { width, height },
            render_pass: vk::RenderPass::null(),
            targets: None,
        };
        swapchain.recreate(ctx, width, height, vsync)?;
        Ok(swapchain)
    }

    pub(crate) fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.loader
    }

    pub(crate) fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub(crate) fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub(crate) fn image_count(&self) -> usize {
        self.targets.as_ref().map_or(0, |t| t.framebuffers.len())
    }

    pub(crate) fn framebuffer(&self, image: u32) -> Option<vk::Framebuffer> {
        self.targets.as_ref().and_then(|t| t.framebuffers.get(image as usize).copied())
    }

    pub(crate) fn render_finished(&self, image: u32) -> Option<vk::Semaphore> {
        self.targets.as_ref().and_then(|t| t.render_finished.get(image as usize).copied())
    }

    /// Rebuild swapchain, render pass and targets at a new size
    ///
    /// The device must be idle.
    pub(crate) fn recreate(&mut self, ctx: &GpuContext, width: u32, height: u32, vsync: bool) -> Result<()> {
        unsafe {
            let capabilities = self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| init_error("query surface capabilities", e))?;
            let modes = self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                .map_err(|e| init_error("query present modes", e))?;

            let extent = choose_extent(&capabilities, width, height);
            let mut image_count = capabilities.min_image_count + 1;
            if capabilities.max_image_count > 0 {
                image_count = image_count.min(capabilities.max_image_count);
            }
            let present_mode = choose_present_mode(&modes, vsync);

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.surface_format.format)
                .image_color_space(self.surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.loader.create_swapchain(&create_info, None)
                .map_err(|e| init_error("create swapchain", e))?;

            self.destroy_targets(ctx);
            if old_swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(old_swapchain, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                ctx.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }

            self.swapchain = swapchain;
            self.extent = extent;
            self.render_pass = create_render_pass(&ctx.device, self.surface_format.format)?;
            self.targets = Some(self.create_targets(ctx)?);

            engine_info!(
                "j4f::vulkan",
                "Swapchain {}x{}, {} images, {:?}",
                extent.width, extent.height, self.image_count(), present_mode
            );
        }
        Ok(())
    }

    unsafe fn create_targets(&self, ctx: &GpuContext) -> Result<Targets> {
        let device = &ctx.device;
        let images = self.loader.get_swapchain_images(self.swapchain)
            .map_err(|e| init_error("get swapchain images", e))?;

        let mut targets = Targets {
            image_views: Vec::with_capacity(images.len()),
            depth_image: vk::Image::null(),
            depth_view: vk::ImageView::null(),
            depth_allocation: None,
            framebuffers: Vec::with_capacity(images.len()),
            render_finished: Vec::with_capacity(images.len()),
        };

        // Partially built targets are released by `release_targets` on error
        let result = (|| -> Result<()> {
            for &image in &images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .subresource_range(color_range(vk::ImageAspectFlags::COLOR));
                targets.image_views.push(
                    device.create_image_view(&view_info, None).map_err(|e| init_error("create swapchain image view", e))?,
                );
            }

            let depth_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(DEPTH_FORMAT)
                .extent(vk::Extent3D { width: self.extent.width, height: self.extent.height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            targets.depth_image = device.create_image(&depth_info, None)
                .map_err(|e| init_error("create depth image", e))?;
            targets.depth_allocation = Some(ctx.allocate_image_memory(targets.depth_image, "depth buffer")?);

            let depth_view_info = vk::ImageViewCreateInfo::default()
                .image(targets.depth_image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(DEPTH_FORMAT)
                .subresource_range(color_range(vk::ImageAspectFlags::DEPTH));
            targets.depth_view = device.create_image_view(&depth_view_info, None)
                .map_err(|e| init_error("create depth view", e))?;

            for &view in &targets.image_views {
                let attachments = [view, targets.depth_view];
                let framebuffer_info = vk::FramebufferCreateInfo::default()
                    .render_pass(self.render_pass)
                    .attachments(&attachments)
                    .width(self.extent.width)
                    .height(self.extent.height)
                    .layers(1);
                targets.framebuffers.push(
                    device.create_framebuffer(&framebuffer_info, None).map_err(|e| init_error("create framebuffer", e))?,
                );
                targets.render_finished.push(
                    device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                        .map_err(|e| init_error("create render-finished semaphore", e))?,
                );
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(targets),
            Err(e) => {
                self.release_targets(ctx, targets);
                Err(e)
            }
        }
    }

    unsafe fn release_targets(&self, ctx: &GpuContext, targets: Targets) {
        let device = &ctx.device;
        for semaphore in targets.render_finished {
            device.destroy_semaphore(semaphore, None);
        }
        for framebuffer in targets.framebuffers {
            device.destroy_framebuffer(framebuffer, None);
        }
        if targets.depth_view != vk::ImageView::null() {
            device.destroy_image_view(targets.depth_view, None);
        }
        if let Some(allocation) = targets.depth_allocation {
            ctx.free(allocation);
        }
        if targets.depth_image != vk::Image::null() {
            device.destroy_image(targets.depth_image, None);
        }
        for view in targets.image_views {
            device.destroy_image_view(view, None);
        }
    }

    unsafe fn destroy_targets(&mut self, ctx: &GpuContext) {
        if let Some(targets) = self.targets.take() {
            self.release_targets(ctx, targets);
        }
    }

    /// Destroy everything including the surface (device idle, before device destruction)
    pub(crate) fn destroy(&mut self, ctx: &GpuContext) {
        unsafe {
            self.destroy_targets(ctx);
            if self.render_pass != vk::RenderPass::null() {
                ctx.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }
        }
    }
}

fn color_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Single-subpass pass: cleared color presented at the end, cleared depth discarded
fn create_render_pass(device: &ash::Device, color_format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];
    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
        .dst_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe { device.create_render_pass(&create_info, None) }
        .map_err(|e| init_error("create render pass", e))
}
