/// Per-frame synchronization and command buffers

use j4f_engine::j4f::{Error, Result};
use j4f_engine::engine_error;
use ash::vk;

/// Objects owned by one in-flight frame
pub(crate) struct FrameSync {
    /// Signaled when the frame's last submission completed (created signaled)
    pub fence: vk::Fence,
    /// Signaled by image acquisition
    pub image_available: vk::Semaphore,
    pub command_pool: vk::CommandPool,
    /// Begins the render pass and executes `secondary`
    pub primary: vk::CommandBuffer,
    /// Draw commands recorded through the CommandList
    pub secondary: vk::CommandBuffer,
}

fn frame_error(what: &str, e: vk::Result) -> Error {
    engine_error!("j4f::vulkan", "Failed to {}: {:?}", what, e);
    Error::InitializationFailed(format!("Failed to {}: {:?}", what, e))
}

impl FrameSync {
    pub(crate) fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        unsafe {
            let fence = device
                .create_fence(&vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED), None)
                .map_err(|e| frame_error("create frame fence", e))?;
            let mut frame = Self {
                fence,
                image_available: vk::Semaphore::null(),
                command_pool: vk::CommandPool::null(),
                primary: vk::CommandBuffer::null(),
                secondary: vk::CommandBuffer::null(),
            };
            if let Err(e) = frame.create_rest(device, queue_family) {
                frame.destroy(device);
                return Err(e);
            }
            Ok(frame)
        }
    }

    unsafe fn create_rest(&mut self, device: &ash::Device, queue_family: u32) -> Result<()> {
        self.image_available = device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            .map_err(|e| frame_error("create image-available semaphore", e))?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        self.command_pool = device.create_command_pool(&pool_info, None)
            .map_err(|e| frame_error("create frame command pool", e))?;

        let pool = self.command_pool;
        let allocate = |level: vk::CommandBufferLevel| {
            let info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(level)
                .command_buffer_count(1);
            device.allocate_command_buffers(&info)
                .map(|buffers| buffers[0])
                .map_err(|e| frame_error("allocate frame command buffer", e))
        };
        self.primary = allocate(vk::CommandBufferLevel::PRIMARY)?;
        self.secondary = allocate(vk::CommandBufferLevel::SECONDARY)?;
        Ok(())
    }

    pub(crate) fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            if self.command_pool != vk::CommandPool::null() {
                device.destroy_command_pool(self.command_pool, None);
            }
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
            }
            if self.fence != vk::Fence::null() {
                device.destroy_fence(self.fence, None);
            }
        }
        self.command_pool = vk::CommandPool::null();
        self.image_available = vk::Semaphore::null();
        self.fence = vk::Fence::null();
    }
}

/// Map a frame-path Vulkan error, keeping device loss distinct
pub(crate) fn frame_result_error(what: &str, e: vk::Result) -> Error {
    if e == vk::Result::ERROR_DEVICE_LOST {
        engine_error!("j4f::vulkan", "Device lost during {}", what);
        Error::DeviceLost
    } else {
        engine_error!("j4f::vulkan", "Failed to {}: {:?}", what, e);
        Error::BackendError(format!("Failed to {}: {:?}", what, e))
    }
}
