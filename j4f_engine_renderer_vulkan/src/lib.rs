/*!
# J4F Engine - Vulkan Backend

Vulkan implementation of the [`GraphicsDevice`](j4f_engine::j4f::render::GraphicsDevice)
trait consumed by the J4F binding layer.

Built on Ash for the Vulkan bindings, gpu-allocator for memory and spirq for
SPIR-V reflection.

```no_run
use j4f_engine::j4f::RendererContext;
use j4f_engine::j4f::render::Config;
use j4f_engine_renderer_vulkan::j4f::VulkanGraphicsDevice;
use std::sync::Arc;

# fn demo(window: &winit::window::Window) -> j4f_engine::j4f::Result<()> {
let device = Arc::new(VulkanGraphicsDevice::new(window, Config::default())?);
let context = RendererContext::new(device, Config::default())?;
# Ok(())
# }
```
*/

mod vulkan;
mod vulkan_context;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_descriptor;
mod vulkan_pipeline;
mod vulkan_command_list;
mod vulkan_swapchain;
mod vulkan_frame;
mod debug;

pub mod j4f {
    pub use crate::vulkan::VulkanGraphicsDevice;

    // Validation layer statistics
    pub use crate::debug::{get_validation_stats, print_validation_stats_report};
}
