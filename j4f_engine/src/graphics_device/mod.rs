/// Graphics device module - backend-facing traits and plain data types

pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod shader;
pub mod pipeline;
pub mod command_list;

pub use graphics_device::*;
pub use buffer::*;
pub use texture::*;
pub use shader::*;
pub use pipeline::*;
pub use command_list::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
