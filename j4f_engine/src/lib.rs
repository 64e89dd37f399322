/*!
# J4F Engine

Core of the J4F real-time renderer: the GPU resource and pipeline binding layer.

The crate is backend-agnostic. A backend (see `j4f_engine_renderer_vulkan`) implements
the [`GraphicsDevice`](j4f::render::GraphicsDevice) trait; everything above it lives here.

## Architecture

- **Program model**: shader reflection output turned into a dense parameter table
- **Layout cache**: descriptor-set and pipeline layouts deduplicated by structure
- **Dynamic buffers**: per-frame ring allocation for per-draw uniform/storage data
- **Render data**: per-draw parameter storage and the bind/draw protocol
- **Pipeline cache**: graphics pipelines deduplicated by a packed state key
- **Frame lifecycle**: fences, retire queues, deferred uploads, resize handling

All caches are owned by an explicit [`RendererContext`](j4f::RendererContext).
*/

// Internal modules
mod error;
mod engine;
mod renderer_context;
pub mod log;
pub mod graphics_device;
pub mod program;
pub mod render;
pub mod frame;

// Main j4f namespace module
pub mod j4f {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging facade
    pub use crate::engine::Engine;

    // Context owning every cache
    pub use crate::renderer_context::RendererContext;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device-facing types and traits
    pub mod render {
        pub use crate::graphics_device::*;
    }

    // Shader program model
    pub mod program {
        pub use crate::program::*;
    }

    // Draw-side types (render data, caches, textures, render list)
    pub mod draw {
        pub use crate::render::*;
    }

    // Frame lifecycle and statistics
    pub mod frame {
        pub use crate::frame::*;
    }
}

// Re-export math library at crate root
pub use glam;
