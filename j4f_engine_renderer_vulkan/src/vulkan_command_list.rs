/// CommandList - records one frame's draws into a secondary command buffer
///
/// The secondary buffer inherits the main render pass. `submit_frame`
/// executes it inside the primary buffer once the swapchain image is known.

use j4f_engine::j4f::{Error, Result};
use j4f_engine::j4f::render::{
    Buffer as DeviceBuffer, CommandList as DeviceCommandList, DepthBias, DescriptorSetHandle,
    IndexType, PipelineHandle, PipelineLayoutHandle, Rect2D, ShaderStageFlags, Viewport,
};
use j4f_engine::engine_error;
use ash::vk;
use ash::vk::Handle;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_descriptor::stage_flags_to_vk;
use crate::vulkan_pipeline::index_type_to_vk;

pub struct CommandList {
    device: ash::Device,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

fn downcast(buffer: &dyn DeviceBuffer) -> &Buffer {
    // Every buffer handed to this backend was created by it
    unsafe { &*(buffer as *const dyn DeviceBuffer as *const Buffer) }
}

impl CommandList {
    /// Begin `command_buffer` as a render-pass continuation with full-extent dynamic state
    pub(crate) fn begin(
        device: ash::Device,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        unsafe {
            let inheritance = vk::CommandBufferInheritanceInfo::default()
                .render_pass(render_pass)
                .subpass(0);
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
                .inheritance_info(&inheritance);
            device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| {
                    engine_error!("j4f::vulkan", "Failed to begin frame command buffer: {:?}", e);
                    Error::BackendError(format!("Failed to begin command buffer: {:?}", e))
                })?;

            let mut list = Self { device, command_buffer, recording: true };
            list.set_viewport(Viewport::full(extent.width, extent.height))?;
            list.set_scissor(Rect2D { x: 0, y: 0, width: extent.width, height: extent.height })?;
            list.set_depth_bias(DepthBias { constant_factor: 0.0, clamp: 0.0, slope_factor: 0.0 })?;
            Ok(list)
        }
    }

    fn check(&self) -> Result<()> {
        if self.recording {
            Ok(())
        } else {
            Err(Error::BackendError("Command list not recording".to_string()))
        }
    }
}

impl DeviceCommandList for CommandList {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        self.check()?;
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk::Pipeline::from_raw(pipeline.0),
            );
        }
        Ok(())
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        self.check()?;
        let sets: Vec<vk::DescriptorSet> = sets.iter().map(|s| vk::DescriptorSet::from_raw(s.0)).collect();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk::PipelineLayout::from_raw(layout.0),
                first_set,
                &sets,
                dynamic_offsets,
            );
        }
        Ok(())
    }

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.check()?;
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                vk::PipelineLayout::from_raw(layout.0),
                stage_flags_to_vk(stages),
                offset,
                data,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &dyn DeviceBuffer, offset: u64) -> Result<()> {
        self.check()?;
        let buffer = downcast(buffer);
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer.buffer], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn DeviceBuffer, offset: u64, index_type: IndexType) -> Result<()> {
        self.check()?;
        let buffer = downcast(buffer);
        unsafe {
            self.device.cmd_bind_index_buffer(self.command_buffer, buffer.buffer, offset, index_type_to_vk(index_type));
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.check()?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]) };
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.check()?;
        let rect = vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        };
        unsafe { self.device.cmd_set_scissor(self.command_buffer, 0, &[rect]) };
        Ok(())
    }

    fn set_depth_bias(&mut self, bias: DepthBias) -> Result<()> {
        self.check()?;
        unsafe {
            self.device.cmd_set_depth_bias(self.command_buffer, bias.constant_factor, bias.clamp, bias.slope_factor);
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.check()?;
        unsafe {
            self.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.check()?;
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer, index_count, instance_count, first_index, vertex_offset, first_instance,
            );
        }
        Ok(())
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if self.recording {
            self.recording = false;
            if let Err(e) = unsafe { self.device.end_command_buffer(self.command_buffer) } {
                engine_error!("j4f::vulkan", "Failed to end frame command buffer: {:?}", e);
            }
        }
    }
}
