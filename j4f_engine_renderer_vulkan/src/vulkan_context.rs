/// GpuContext - device, allocator and upload queue shared by every Vulkan object
///
/// Buffers, textures, shader modules and the sampler cache hold an
/// `Arc<GpuContext>`. Device destruction is done by
/// `VulkanGraphicsDevice::drop`, never here.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use j4f_engine::j4f::{Error, Result};
use j4f_engine::{engine_error, engine_err};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct GpuContext {
    pub device: ash::Device,

    /// Dropped explicitly before the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    pub graphics_queue: vk::Queue,

    /// TRANSIENT | RESET_COMMAND_BUFFER pool for one-shot uploads
    pub upload_command_pool: Mutex<vk::CommandPool>,

    /// Held around every submission and present on `graphics_queue`
    pub queue_lock: Mutex<()>,
}

impl GpuContext {
    pub fn new(
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        graphics_queue: vk::Queue,
        upload_command_pool: vk::CommandPool,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            upload_command_pool: Mutex::new(upload_command_pool),
            queue_lock: Mutex::new(()),
        }
    }

    /// Allocate and bind memory for a buffer
    pub fn allocate_buffer_memory(&self, buffer: vk::Buffer, name: &str, location: MemoryLocation) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = lock(&self.allocator)
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("j4f::vulkan", "Out of GPU memory for {} ({:.2} MB)", name, size_mb);
                    Error::OutOfMemory
                })?;

            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("j4f::vulkan", "Failed to bind {} memory: {:?}", name, e))?;
            Ok(allocation)
        }
    }

    /// Allocate and bind device-local memory for an image
    pub fn allocate_image_memory(&self, image: vk::Image, name: &str) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = lock(&self.allocator)
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("j4f::vulkan", "Out of GPU memory for {} ({:.2} MB)", name, size_mb);
                    Error::OutOfMemory
                })?;

            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("j4f::vulkan", "Failed to bind {} memory: {:?}", name, e))?;
            Ok(allocation)
        }
    }

    pub fn free(&self, allocation: Allocation) {
        if let Err(e) = lock(&self.allocator).free(allocation) {
            engine_error!("j4f::vulkan", "Failed to free GPU allocation: {:?}", e);
        }
    }

    /// Record commands into a one-shot buffer, submit and wait for completion
    pub fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let pool = lock(&self.upload_command_pool);
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("j4f::vulkan", "Failed to allocate upload command buffer: {:?}", e))?[0];

            let result = self.record_and_submit(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device.begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to begin upload command buffer: {:?}", e))?;

        record(command_buffer)?;

        self.device.end_command_buffer(command_buffer)
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to end upload command buffer: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let _queue = lock(&self.queue_lock);
        self.device.queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to submit upload: {:?}", e))?;
        self.device.queue_wait_idle(self.graphics_queue)
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to wait for upload: {:?}", e))
    }
}
