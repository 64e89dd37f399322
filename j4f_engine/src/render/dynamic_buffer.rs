/// Per-frame ring allocation for dynamic uniform/storage data
///
/// A [`DynamicBuffer`] owns one mapped buffer per in-flight frame, each
/// holding `capacity` elements of `aligned_size` bytes. Draws claim an
/// element with [`DynamicBuffer::increment`] (lock-free, callable from worker
/// threads) and bind it with a dynamic offset of `slot * aligned_size`.
/// The cursor is reset once per frame by the frame owner.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphics_device::{align_up, Buffer, BufferDesc, BufferUsage, GraphicsDevice};

pub struct DynamicBuffer {
    aligned_size: u32,
    capacity: u32,
    usage: BufferUsage,
    cursor: AtomicU32,
    buffers: Vec<Arc<dyn Buffer>>,
}

impl DynamicBuffer {
    /// Create one backing buffer per in-flight frame
    pub fn new(device: &dyn GraphicsDevice, aligned_size: u32, capacity: u32, usage: BufferUsage) -> Result<Self> {
        let frames = device.frames_in_flight().max(1);
        let bytes = aligned_size as u64 * capacity as u64;
        let buffers = (0..frames)
            .map(|_| device.create_buffer(BufferDesc { size: bytes, usage }))
            .collect::<Result<Vec<_>>>()?;

        crate::engine_debug!(
            "j4f::render",
            "Dynamic {:?} buffer: {} x {} bytes, {} frames",
            usage, capacity, aligned_size, frames
        );

        Ok(Self { aligned_size, capacity, usage, cursor: AtomicU32::new(0), buffers })
    }

    pub fn aligned_size(&self) -> u32 {
        self.aligned_size
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Backing buffer of `frame`
    pub fn buffer(&self, frame: u32) -> &Arc<dyn Buffer> {
        &self.buffers[frame as usize % self.buffers.len()]
    }

    pub fn frame_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    /// Claim the next element, returning its slot index
    ///
    /// Never wraps: once `capacity` elements are claimed this frame every
    /// further call fails with `CapacityExhausted`.
    pub fn increment(&self) -> Result<u32> {
        let capacity = self.capacity;
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| (c < capacity).then_some(c + 1))
            .map_err(|_| {
                crate::engine_error!("j4f::render", "Dynamic buffer exhausted ({} elements)", capacity);
                Error::CapacityExhausted { capacity }
            })
    }

    /// Number of elements claimed so far this frame
    pub fn current(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Zero the cursor. Frame owner only, before any `increment` of the frame.
    pub fn reset_offset(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    /// Byte offset of `slot`
    pub fn slot_offset(&self, slot: u32) -> u32 {
        slot * self.aligned_size
    }

    /// Write `data` at `offset` inside element `slot`
    ///
    /// Targets frame `frame` only, or every frame's buffer when `all_buffers` is set.
    pub fn write(&self, data: &[u8], slot: u32, offset: u32, frame: u32, all_buffers: bool) -> Result<()> {
        if slot >= self.capacity || offset as usize + data.len() > self.aligned_size as usize {
            crate::engine_bail_warn!(
                "j4f::render",
                "Dynamic write out of element: slot {} offset {} len {} (element {} bytes, capacity {})",
                slot, offset, data.len(), self.aligned_size, self.capacity
            );
        }
        let at = self.slot_offset(slot) as u64 + offset as u64;
        if all_buffers {
            for buffer in &self.buffers {
                buffer.update(at, data)?;
            }
            Ok(())
        } else {
            self.buffer(frame).update(at, data)
        }
    }

    /// Read back `out.len()` bytes of element `slot` of `frame`
    pub fn read(&self, slot: u32, offset: u32, frame: u32, out: &mut [u8]) -> Result<()> {
        self.buffer(frame).read(self.slot_offset(slot) as u64 + offset as u64, out)
    }
}

/// Dynamic buffers shared by all programs, keyed by (aligned size, usage)
pub struct DynamicBufferCache {
    capacity: u32,
    buffers: FxHashMap<(u32, BufferUsage), Arc<DynamicBuffer>>,
}

impl DynamicBufferCache {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, buffers: FxHashMap::default() }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Return the buffer for `size` rounded to the device alignment of `usage`
    pub fn get_or_create(&mut self, device: &dyn GraphicsDevice, size: u32, usage: BufferUsage) -> Result<Arc<DynamicBuffer>> {
        if size == 0 {
            crate::engine_bail_warn!("j4f::render", "Dynamic {:?} buffer requested with zero element size", usage);
        }
        let limits = device.limits();
        let alignment = match usage {
            BufferUsage::Storage => limits.min_storage_offset_alignment,
            _ => limits.min_uniform_offset_alignment,
        };
        let aligned = align_up(size as u64, alignment as u64) as u32;

        if let Some(buffer) = self.buffers.get(&(aligned, usage)) {
            return Ok(Arc::clone(buffer));
        }
        let buffer = Arc::new(DynamicBuffer::new(device, aligned, self.capacity, usage)?);
        self.buffers.insert((aligned, usage), Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Reset every cursor (start of frame)
    pub fn reset_all(&self) {
        self.buffers.values().for_each(|b| b.reset_offset());
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
#[path = "dynamic_buffer_tests.rs"]
mod tests;
