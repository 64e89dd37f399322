/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait

use j4f_engine::j4f::{Error, Result};
use j4f_engine::j4f::render::{
    AcquireResult, Buffer as DeviceBuffer, BufferDesc, CommandList as DeviceCommandList, Config,
    DescriptorBinding, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorType, DeviceLimits,
    GraphicsDevice, GraphicsPipelineDesc, ImageViewKind, PipelineHandle, PipelineLayoutHandle,
    PresentResult, PushConstantRange, RenderPassHandle, ShaderModule as DeviceShaderModule,
    ShaderStage, Texture as DeviceTexture, TextureData, TextureDesc,
};
use j4f_engine::{engine_debug, engine_error, engine_info, engine_warn, engine_err};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use winit::window::Window;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_command_list::CommandList;
use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_descriptor::{self, descriptor_type_to_vk, DescriptorPools};
use crate::vulkan_frame::{frame_result_error, FrameSync};
use crate::vulkan_pipeline;
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_shader::ShaderModule;
use crate::vulkan_swapchain::Swapchain;
use crate::vulkan_texture::Texture;

/// Upper bound on a frame fence wait before the frame is skipped
const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

const VIEWPORT_INDEX_LAYER: &CStr = c"VK_EXT_shader_viewport_index_layer";

fn init_error(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!("j4f::vulkan", "Failed to {}: {:?}", what, e);
    Error::InitializationFailed(format!("Failed to {}: {:?}", what, e))
}

fn downcast_texture(texture: &dyn DeviceTexture) -> &Texture {
    // Every texture handed to this backend was created by it
    unsafe { &*(texture as *const dyn DeviceTexture as *const Texture) }
}

fn downcast_buffer(buffer: &dyn DeviceBuffer) -> &Buffer {
    unsafe { &*(buffer as *const dyn DeviceBuffer as *const Buffer) }
}

/// Physical device plus the queue families it will be driven through
struct SelectedDevice {
    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
}

/// Vulkan device implementation
///
/// Owns the instance, the logical device, the swapchain and the per-frame
/// synchronization objects. Resources created through it share one
/// [`GpuContext`]; the device is destroyed last, in `Drop`.
pub struct VulkanGraphicsDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    ctx: Arc<GpuContext>,

    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    /// May be the graphics queue
    present_queue: vk::Queue,

    limits: DeviceLimits,
    frames_in_flight: u32,

    descriptor_pools: Mutex<DescriptorPools>,
    sampler_cache: Mutex<SamplerCache>,
    swapchain: Mutex<Swapchain>,
    frames: Mutex<Vec<FrameSync>>,
}

impl VulkanGraphicsDevice {
    /// Create the device and its swapchain for `window`
    ///
    /// Validation layers are only requested when `config.enable_validation`
    /// is set and the crate is built with the `vulkan-validation` feature.
    pub fn new(window: &Window, config: Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| init_error("load Vulkan library", e))?;

            let app_name = std::ffi::CString::new(config.app_name.clone())
                .unwrap_or_else(|_| c"J4F Application".to_owned());
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"J4F")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle()
                .map_err(|e| init_error("get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_error("get required instance extensions", e))?
                .to_vec();

            let validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| init_error("create Vulkan instance", e))?;

            let (debug_utils_loader, debug_messenger) = if validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);

                crate::debug::init_debug_config(crate::debug::Config {
                    severity: config.debug_severity,
                    output: config.debug_output.clone(),
                    message_filter: config.debug_message_filter,
                    break_on_error: config.break_on_validation_error,
                    panic_on_error: config.panic_on_error,
                    enable_stats: config.enable_validation_stats,
                });

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::severity_flags(config.debug_severity))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| init_error("create debug messenger", e))?;
                (Some(debug_utils), Some(messenger))
            } else {
                (None, None)
            };

            let window_handle = window.window_handle()
                .map_err(|e| init_error("get window handle", e))?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_error("create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let selected = select_physical_device(&instance, &surface_loader, surface)?;
            let physical_device = selected.physical_device;
            let properties = instance.get_physical_device_properties(physical_device);
            let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy();
            engine_info!("j4f::vulkan", "Using GPU '{}' ({:?})", name, properties.device_type);

            // Optional features
            let supported = instance.get_physical_device_features(physical_device);
            let available_extensions = instance.enumerate_device_extension_properties(physical_device)
                .map_err(|e| init_error("enumerate device extensions", e))?;
            let has_viewport_index_layer = available_extensions.iter()
                .any(|ext| CStr::from_ptr(ext.extension_name.as_ptr()) == VIEWPORT_INDEX_LAYER);

            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(selected.graphics_family)
                    .queue_priorities(&queue_priorities),
            ];
            if selected.present_family != selected.graphics_family {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(selected.present_family)
                        .queue_priorities(&queue_priorities),
                );
            }

            let mut device_extension_names = vec![ash::khr::swapchain::NAME.as_ptr()];
            if has_viewport_index_layer {
                device_extension_names.push(VIEWPORT_INDEX_LAYER.as_ptr());
            }

            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
                .geometry_shader(supported.geometry_shader == vk::TRUE);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);
            let device = instance.create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_error("create logical device", e))?;

            let graphics_queue = device.get_device_queue(selected.graphics_family, 0);
            let present_queue = device.get_device_queue(selected.present_family, 0);

            let device_limits = &properties.limits;
            let limits = DeviceLimits {
                min_uniform_offset_alignment: device_limits.min_uniform_buffer_offset_alignment as u32,
                min_storage_offset_alignment: device_limits.min_storage_buffer_offset_alignment as u32,
                max_push_constants_size: device_limits.max_push_constants_size,
                supports_geometry_shader: supported.geometry_shader == vk::TRUE,
                supports_viewport_index_layer: has_viewport_index_layer,
            };
            engine_debug!("j4f::vulkan", "Device limits: {:?}", limits);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_error("create GPU allocator", e))?;

            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(selected.graphics_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device.create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| init_error("create upload command pool", e))?;

            let ctx = Arc::new(GpuContext::new(
                device,
                Arc::new(Mutex::new(allocator)),
                graphics_queue,
                upload_command_pool,
            ));

            let size = window.inner_size();
            let swapchain = Swapchain::new(
                &ctx,
                &instance,
                physical_device,
                surface,
                surface_loader,
                size.width,
                size.height,
                config.vsync,
            )?;

            let frames_in_flight = config.frames_in_flight.clamp(1, swapchain.image_count().max(1) as u32);
            if frames_in_flight != config.frames_in_flight {
                engine_warn!(
                    "j4f::vulkan",
                    "frames_in_flight {} clamped to {}",
                    config.frames_in_flight, frames_in_flight
                );
            }
            let frames = (0..frames_in_flight)
                .map(|_| FrameSync::new(&ctx.device, selected.graphics_family))
                .collect::<Result<Vec<_>>>()?;

            let descriptor_pools = DescriptorPools::new(&ctx.device)?;
            let max_anisotropy = if supported.sampler_anisotropy == vk::TRUE {
                device_limits.max_sampler_anisotropy
            } else {
                1.0
            };

            engine_info!(
                "j4f::vulkan",
                "Vulkan device ready: {} frames in flight, {} swapchain images",
                frames_in_flight, swapchain.image_count()
            );

            Ok(Self {
                _entry: entry,
                instance,
                ctx,
                debug_utils_loader,
                debug_messenger,
                present_queue,
                limits,
                frames_in_flight,
                descriptor_pools: Mutex::new(descriptor_pools),
                sampler_cache: Mutex::new(SamplerCache::new(max_anisotropy)),
                swapchain: Mutex::new(swapchain),
                frames: Mutex::new(frames),
            })
        }
    }

    /// Descriptor pools created so far (grows on exhaustion)
    pub fn descriptor_pool_count(&self) -> usize {
        lock(&self.descriptor_pools).pool_count()
    }

    fn frame<R>(&self, frame: u32, f: impl FnOnce(&FrameSync) -> Result<R>) -> Result<R> {
        let frames = lock(&self.frames);
        let sync = frames.get(frame as usize).ok_or_else(|| {
            engine_err!("j4f::vulkan", "Frame index {} out of range ({} frames)", frame, frames.len())
        })?;
        f(sync)
    }
}

/// First device with graphics and present support, discrete GPUs preferred
unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<SelectedDevice> {
    let physical_devices = instance.enumerate_physical_devices()
        .map_err(|e| init_error("enumerate physical devices", e))?;

    let mut candidates: Vec<(SelectedDevice, bool)> = Vec::new();
    for physical_device in physical_devices {
        let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
        let graphics_family = queue_families.iter()
            .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);
        let present_family = (0..queue_families.len() as u32).find(|&i| {
            surface_loader
                .get_physical_device_surface_support(physical_device, i, surface)
                .unwrap_or(false)
        });
        if let (Some(graphics_family), Some(present_family)) = (graphics_family, present_family) {
            let discrete = instance.get_physical_device_properties(physical_device).device_type
                == vk::PhysicalDeviceType::DISCRETE_GPU;
            candidates.push((SelectedDevice { physical_device, graphics_family, present_family }, discrete));
        }
    }

    if candidates.is_empty() {
        engine_error!("j4f::vulkan", "No Vulkan GPU with graphics and present support found");
        return Err(Error::InitializationFailed("No suitable Vulkan GPU found".to_string()));
    }
    let index = candidates.iter().position(|(_, discrete)| *discrete).unwrap_or(0);
    Ok(candidates.swap_remove(index).0)
}

impl GraphicsDevice for VulkanGraphicsDevice {
    // ===== QUERIES =====

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    fn surface_extent(&self) -> (u32, u32) {
        let extent = lock(&self.swapchain).extent();
        (extent.width, extent.height)
    }

    // ===== RESOURCES =====

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn DeviceBuffer>> {
        Ok(Arc::new(Buffer::new(Arc::clone(&self.ctx), desc.size, desc.usage)?))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn DeviceTexture>> {
        Ok(Arc::new(Texture::new(Arc::clone(&self.ctx), desc)?))
    }

    fn upload_texture(&self, texture: &dyn DeviceTexture, data: &TextureData) -> Result<()> {
        downcast_texture(texture).upload(data)
    }

    fn create_shader_module(&self, code: &[u8], stage: ShaderStage) -> Result<Arc<dyn DeviceShaderModule>> {
        Ok(Arc::new(ShaderModule::new(Arc::clone(&self.ctx), code, stage)?))
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle> {
        let layout = vulkan_descriptor::create_set_layout(&self.ctx.device, bindings)?;
        Ok(DescriptorSetLayoutHandle(layout.as_raw()))
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = set_layouts.iter()
            .map(|l| vk::DescriptorSetLayout::from_raw(l.0))
            .collect();
        let layout = vulkan_descriptor::create_pipeline_layout(&self.ctx.device, &set_layouts, push_constants)?;
        Ok(PipelineLayoutHandle(layout.as_raw()))
    }

    fn allocate_descriptor_sets(&self, layout: DescriptorSetLayoutHandle, count: u32) -> Result<Vec<DescriptorSetHandle>> {
        let sets = lock(&self.descriptor_pools).allocate(
            &self.ctx.device,
            vk::DescriptorSetLayout::from_raw(layout.0),
            count,
        )?;
        Ok(sets.into_iter().map(|s| DescriptorSetHandle(s.as_raw())).collect())
    }

    fn write_buffer_descriptor(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        descriptor_type: DescriptorType,
        buffer: &dyn DeviceBuffer,
        offset: u64,
        range: u64,
    ) -> Result<()> {
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: downcast_buffer(buffer).buffer,
            offset,
            range,
        };
        let write = vk::WriteDescriptorSet::default()
            .dst_set(vk::DescriptorSet::from_raw(set.0))
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(descriptor_type_to_vk(descriptor_type))
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    fn write_texture_descriptor(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        texture: &dyn DeviceTexture,
        view: ImageViewKind,
    ) -> Result<()> {
        let texture = downcast_texture(texture);
        let sampler = lock(&self.sampler_cache).get(&self.ctx.device, texture.info().sampler)?;
        let image_info = vk::DescriptorImageInfo {
            sampler,
            image_view: texture.view(view),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let write = vk::WriteDescriptorSet::default()
            .dst_set(vk::DescriptorSet::from_raw(set.0))
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info));
        unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        if !layout.is_null() {
            unsafe {
                self.ctx.device.destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.0), None);
            }
        }
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        if !layout.is_null() {
            unsafe {
                self.ctx.device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.0), None);
            }
        }
    }

    // ===== PIPELINES =====

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        let pipeline = vulkan_pipeline::create_graphics_pipeline(&self.ctx.device, desc)?;
        Ok(PipelineHandle(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if !pipeline.is_null() {
            unsafe { self.ctx.device.destroy_pipeline(vk::Pipeline::from_raw(pipeline.0), None) };
        }
    }

    fn main_render_pass(&self) -> RenderPassHandle {
        RenderPassHandle(lock(&self.swapchain).render_pass().as_raw())
    }

    // ===== FRAME =====

    fn wait_frame_fence(&self, frame: u32) -> Result<()> {
        self.frame(frame, |sync| unsafe {
            match self.ctx.device.wait_for_fences(&[sync.fence], true, FENCE_TIMEOUT_NS) {
                Ok(()) => {}
                Err(vk::Result::TIMEOUT) => {
                    engine_warn!("j4f::vulkan", "Frame {} fence not signaled after {} ns", frame, FENCE_TIMEOUT_NS);
                    return Err(Error::BackendError(format!("Frame {} fence wait timed out", frame)));
                }
                Err(e) => return Err(frame_result_error("wait for frame fence", e)),
            }
            self.ctx.device.reset_fences(&[sync.fence])
                .map_err(|e| frame_result_error("reset frame fence", e))
        })
    }

    fn restore_frame_fence(&self, frame: u32) -> Result<()> {
        self.frame(frame, |sync| unsafe {
            let _queue = lock(&self.ctx.queue_lock);
            self.ctx.device.queue_submit(self.ctx.graphics_queue, &[], sync.fence)
                .map_err(|e| frame_result_error("restore frame fence", e))
        })
    }

    fn begin_frame_commands(&self, frame: u32) -> Result<Box<dyn DeviceCommandList>> {
        let (render_pass, extent) = {
            let swapchain = lock(&self.swapchain);
            (swapchain.render_pass(), swapchain.extent())
        };
        self.frame(frame, |sync| unsafe {
            self.ctx.device.reset_command_pool(sync.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| frame_result_error("reset frame command pool", e))?;
            let list = CommandList::begin(self.ctx.device.clone(), sync.secondary, render_pass, extent)?;
            Ok(Box::new(list) as Box<dyn DeviceCommandList>)
        })
    }

    fn acquire_next_image(&self, frame: u32) -> Result<AcquireResult> {
        let swapchain = lock(&self.swapchain);
        self.frame(frame, |sync| unsafe {
            match swapchain.loader().acquire_next_image(
                swapchain.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            ) {
                Ok((index, false)) => Ok(AcquireResult::Acquired(index)),
                Ok((index, true)) => Ok(AcquireResult::Suboptimal(index)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
                Err(e) => Err(frame_result_error("acquire swapchain image", e)),
            }
        })
    }

    fn submit_frame(&self, frame: u32, image: u32) -> Result<()> {
        let swapchain = lock(&self.swapchain);
        let framebuffer = swapchain.framebuffer(image)
            .ok_or_else(|| engine_err!("j4f::vulkan", "Swapchain image {} out of range", image))?;
        let render_finished = swapchain.render_finished(image)
            .ok_or_else(|| engine_err!("j4f::vulkan", "Swapchain image {} out of range", image))?;
        let extent = swapchain.extent();
        let render_pass = swapchain.render_pass();

        self.frame(frame, |sync| unsafe {
            let device = &self.ctx.device;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(sync.primary, &begin_info)
                .map_err(|e| frame_result_error("begin primary command buffer", e))?;

            let clear_values = [
                vk::ClearValue { color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] } },
                vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 } },
            ];
            let render_pass_begin = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(sync.primary, &render_pass_begin, vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
            device.cmd_execute_commands(sync.primary, &[sync.secondary]);
            device.cmd_end_render_pass(sync.primary);
            device.end_command_buffer(sync.primary)
                .map_err(|e| frame_result_error("end primary command buffer", e))?;

            let wait_semaphores = [sync.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [sync.primary];
            let signal_semaphores = [render_finished];
            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            let _queue = lock(&self.ctx.queue_lock);
            device.queue_submit(self.ctx.graphics_queue, &[submit_info], sync.fence)
                .map_err(|e| frame_result_error("submit frame", e))
        })
    }

    fn present_frame(&self, _frame: u32, image: u32) -> Result<PresentResult> {
        let swapchain = lock(&self.swapchain);
        let render_finished = swapchain.render_finished(image)
            .ok_or_else(|| engine_err!("j4f::vulkan", "Swapchain image {} out of range", image))?;

        let wait_semaphores = [render_finished];
        let swapchains = [swapchain.swapchain];
        let image_indices = [image];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let _queue = lock(&self.ctx.queue_lock);
        match unsafe { swapchain.loader().queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(frame_result_error("present swapchain image", e)),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        let _queue = lock(&self.ctx.queue_lock);
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| frame_result_error("wait for device idle", e))
    }

    fn recreate_surface(&self, width: u32, height: u32, vsync: bool) -> Result<()> {
        self.wait_idle()?;
        lock(&self.swapchain).recreate(&self.ctx, width, height, vsync)
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            // 1. Frame objects and presentation
            let frames = self.frames.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
            for frame in frames.iter_mut() {
                frame.destroy(&self.ctx.device);
            }
            self.swapchain.get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .destroy(&self.ctx);

            // 2. Samplers and descriptor pools
            self.sampler_cache.get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .destroy(&self.ctx.device);
            self.descriptor_pools.get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .destroy(&self.ctx.device);

            // 3. Upload command pool
            {
                let mut pool = lock(&self.ctx.upload_command_pool);
                if *pool != vk::CommandPool::null() {
                    self.ctx.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // 4. Allocator pages go before the device. Resources still alive
            //    keep the context, and their memory is leaked with it.
            if let Some(ctx) = Arc::get_mut(&mut self.ctx) {
                ManuallyDrop::drop(&mut ctx.allocator);
            } else {
                engine_warn!("j4f::vulkan", "GPU resources outlive the device; allocator not released");
            }

            // 5. No callbacks during destruction
            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 6. Device and instance
            self.ctx.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
