/// Texture - sampled Vulkan image with its views, staging upload and mip generation

use j4f_engine::j4f::Result;
use j4f_engine::j4f::render::{
    Texture as DeviceTexture, TextureData, TextureDesc, TextureFormat, TextureInfo, TextureType,
    ImageViewKind,
};
use j4f_engine::{engine_bail_warn, engine_debug, engine_err};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

pub struct Texture {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    /// View matching the texture type
    pub(crate) view: vk::ImageView,
    /// 2D-array view over every layer
    pub(crate) array_view: vk::ImageView,
    allocation: Option<Allocation>,
    info: TextureInfo,
}

pub(crate) fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8_UNORM => vk::Format::R8_UNORM,
        TextureFormat::R8G8_UNORM => vk::Format::R8G8_UNORM,
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::D32_FLOAT => vk::Format::D32_SFLOAT,
    }
}

pub(crate) fn aspect_of(format: TextureFormat) -> vk::ImageAspectFlags {
    match format {
        TextureFormat::D32_FLOAT => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Default view type of a texture
pub(crate) fn view_type_of(texture_type: TextureType, layers: u32) -> vk::ImageViewType {
    match texture_type {
        TextureType::Cube => vk::ImageViewType::CUBE,
        TextureType::Array2D => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::Tex2D if layers > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::Tex2D => vk::ImageViewType::TYPE_2D,
    }
}

fn full_range(aspect_mask: vk::ImageAspectFlags, mip_levels: u32, layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: mip_levels,
        base_array_layer: 0,
        layer_count: layers,
    }
}

fn barrier(
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

impl Texture {
    pub fn new(ctx: Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        let info = TextureInfo::from_desc(desc);
        let layers = desc.array_layers.max(1);
        if desc.width == 0 || desc.height == 0 {
            engine_bail_warn!("j4f::vulkan", "Texture has a zero extent ({}x{})", desc.width, desc.height);
        }
        if desc.texture_type == TextureType::Cube && layers % 6 != 0 {
            engine_bail_warn!("j4f::vulkan", "Cube texture needs a multiple of 6 layers, got {}", layers);
        }

        let format = format_to_vk(desc.format);
        let aspect_mask = aspect_of(desc.format);
        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if info.mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        let flags = if desc.texture_type == TextureType::Cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        unsafe {
            let image_info = vk::ImageCreateInfo::default()
                .flags(flags)
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(info.mip_levels)
                .array_layers(layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_info, None)
                .map_err(|e| engine_err!("j4f::vulkan", "Failed to create texture image: {:?}", e))?;

            let allocation = match ctx.allocate_image_memory(image, "texture") {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            let range = full_range(aspect_mask, info.mip_levels, layers);
            let create_view = |view_type: vk::ImageViewType| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(view_type)
                    .format(format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(range);
                ctx.device.create_image_view(&view_info, None)
                    .map_err(|e| engine_err!("j4f::vulkan", "Failed to create {:?} texture view: {:?}", view_type, e))
            };

            let views = create_view(view_type_of(desc.texture_type, layers)).and_then(|view| {
                create_view(vk::ImageViewType::TYPE_2D_ARRAY).map(|array_view| (view, array_view)).map_err(|e| {
                    ctx.device.destroy_image_view(view, None);
                    e
                })
            });
            let (view, array_view) = match views {
                Ok(views) => views,
                Err(e) => {
                    ctx.free(allocation);
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            engine_debug!(
                "j4f::vulkan",
                "Texture {}x{} x{} layers, {} mips, {:?}",
                desc.width, desc.height, layers, info.mip_levels, desc.format
            );

            Ok(Self { ctx, image, view, array_view, allocation: Some(allocation), info })
        }
    }

    pub(crate) fn view(&self, kind: ImageViewKind) -> vk::ImageView {
        match kind {
            ImageViewKind::Default => self.view,
            ImageViewKind::Array2D => self.array_view,
        }
    }

    /// Copy every layer of `data` through one staging buffer, then build mips
    ///
    /// The whole image ends in SHADER_READ_ONLY_OPTIMAL.
    pub fn upload(&self, data: &TextureData) -> Result<()> {
        let info = &self.info;
        let layers = info.array_layers.max(1);
        let layer_size = info.width as usize * info.height as usize * info.format.bytes_per_pixel() as usize;
        let items = data.layers();

        for (layer, bytes) in &items {
            if *layer >= layers {
                engine_bail_warn!("j4f::vulkan", "Layer index {} exceeds array_layers {}", layer, layers);
            }
            if bytes.len() != layer_size {
                engine_bail_warn!(
                    "j4f::vulkan",
                    "Layer {} has {} bytes, expected {} ({}x{} {:?})",
                    layer, bytes.len(), layer_size, info.width, info.height, info.format
                );
            }
        }

        let total = (layer_size * items.len()).max(1) as u64;
        let staging = crate::vulkan_buffer::Buffer::new(
            Arc::clone(&self.ctx),
            total,
            j4f_engine::j4f::render::BufferUsage::Storage,
        )?;
        let mut regions = Vec::with_capacity(items.len());
        let aspect_mask = aspect_of(info.format);
        for (i, (layer, bytes)) in items.iter().enumerate() {
            let offset = (i * layer_size) as u64;
            j4f_engine::j4f::render::Buffer::update(&staging, offset, bytes)?;
            regions.push(
                vk::BufferImageCopy::default()
                    .buffer_offset(offset)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask,
                        mip_level: 0,
                        base_array_layer: *layer,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D { width: info.width, height: info.height, depth: 1 }),
            );
        }

        let device = &self.ctx.device;
        let image = self.image;
        let mip_levels = info.mip_levels;
        let (width, height) = (info.width, info.height);

        self.ctx.submit_one_shot(|cb| unsafe {
            let whole = full_range(aspect_mask, mip_levels, layers);
            device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[], &[],
                &[barrier(image, whole, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::empty(), vk::AccessFlags::TRANSFER_WRITE)],
            );

            if !regions.is_empty() {
                device.cmd_copy_buffer_to_image(
                    cb, staging.buffer, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &regions,
                );
            }

            // Each level is blitted from the previous one, then handed to the shaders
            for mip in 1..mip_levels {
                let src = mip - 1;
                let src_range = vk::ImageSubresourceRange { base_mip_level: src, level_count: 1, ..whole };
                device.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[], &[],
                    &[barrier(image, src_range, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ)],
                );

                let extent = |level: u32| vk::Offset3D {
                    x: (width >> level).max(1) as i32,
                    y: (height >> level).max(1) as i32,
                    z: 1,
                };
                let subresource = |level: u32| vk::ImageSubresourceLayers {
                    aspect_mask,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: layers,
                };
                let blit = vk::ImageBlit::default()
                    .src_subresource(subresource(src))
                    .src_offsets([vk::Offset3D::default(), extent(src)])
                    .dst_subresource(subresource(mip))
                    .dst_offsets([vk::Offset3D::default(), extent(mip)]);
                device.cmd_blit_image(
                    cb,
                    image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image, vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );

                device.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::ALL_GRAPHICS,
                    vk::DependencyFlags::empty(),
                    &[], &[],
                    &[barrier(image, src_range, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ)],
                );
            }

            let last = vk::ImageSubresourceRange { base_mip_level: mip_levels - 1, level_count: 1, ..whole };
            device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::ALL_GRAPHICS,
                vk::DependencyFlags::empty(),
                &[], &[],
                &[barrier(image, last, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ)],
            );
            Ok(())
        })
    }
}

impl DeviceTexture for Texture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_image_view(self.array_view, None);
            self.ctx.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }
        unsafe {
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
