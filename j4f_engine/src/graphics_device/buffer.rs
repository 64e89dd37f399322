/// Buffer trait and buffer descriptor

use crate::error::Result;

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Uniform buffer (static or dynamic-offset)
    Uniform,
    /// Storage buffer (static or dynamic-offset)
    Storage,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// Buffers are persistently mapped and destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Write `data` at `offset`
    ///
    /// Fails if `offset + data.len()` exceeds the buffer size.
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy `out.len()` bytes starting at `offset` into `out`
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;
}

/// Round `value` up to a multiple of `alignment` (0 or 1 leaves it unchanged)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Bounds check shared by all backends
pub fn check_buffer_range(size: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(crate::engine_warn_err!(
            "j4f::render",
            "Buffer access out of range: offset {} + {} bytes > size {}",
            offset, len, size
        )),
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
