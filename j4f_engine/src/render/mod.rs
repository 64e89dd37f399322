//! Draw-side objects: dynamic buffers, textures, render data, pipelines, render lists

pub mod dynamic_buffer;
pub mod texture;
pub mod render_data;
pub mod pipeline_cache;
pub mod renderable;
pub mod render_list;

pub use dynamic_buffer::*;
pub use texture::*;
pub use render_data::*;
pub use pipeline_cache::*;
pub use renderable::*;
pub use render_list::*;
