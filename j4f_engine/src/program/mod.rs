/// Shader program model: reflection, parameter tables and layout caching

pub mod reflection;
pub mod layout_cache;
pub mod gpu_program;

pub use reflection::*;
pub use layout_cache::*;
pub use gpu_program::*;
