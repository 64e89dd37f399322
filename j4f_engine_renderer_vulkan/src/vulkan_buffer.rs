/// Buffer - persistently mapped Vulkan buffer

use j4f_engine::j4f::Result;
use j4f_engine::j4f::render::{check_buffer_range, Buffer as DeviceBuffer, BufferUsage};
use j4f_engine::engine_err;
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

pub struct Buffer {
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

impl Buffer {
    /// Create a host-visible buffer of `size` bytes
    pub fn new(ctx: Arc<GpuContext>, size: u64, usage: BufferUsage) -> Result<Self> {
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(size.max(1))
                .usage(usage_to_vk(usage) | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&create_info, None)
                .map_err(|e| engine_err!("j4f::vulkan", "Failed to create buffer of {} bytes: {:?}", size, e))?;

            let allocation = match ctx.allocate_buffer_memory(buffer, "buffer", MemoryLocation::CpuToGpu) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            Ok(Self { ctx, buffer, allocation: Some(allocation), size })
        }
    }

    fn mapped(&self) -> Result<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr() as *mut u8)
            .ok_or_else(|| engine_err!("j4f::vulkan", "Buffer memory is not host-mapped"))
    }
}

pub(crate) fn usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
    }
}

impl DeviceBuffer for Buffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_buffer_range(self.size, offset, data.len())?;
        let base = self.mapped()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        check_buffer_range(self.size, offset, out.len())?;
        let base = self.mapped()?;
        unsafe {
            std::ptr::copy_nonoverlapping(base.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
