/// Descriptor-set layout / pipeline layout cache
///
/// Layouts are addressed by a structural fingerprint: one `u128` per binding,
/// one vector of those per set, plus one `u128` per push-constant range.
/// Every field keeps its full width, so distinct bindings never collide.
/// A full match reuses the whole entry; otherwise individual set layouts are
/// borrowed from any entry whose set fingerprint matches, and only the
/// missing ones are created. Entries are never evicted.

use std::sync::Arc;
use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::graphics_device::{
    DescriptorBinding, DescriptorSetLayoutHandle, GraphicsDevice, PipelineLayoutHandle,
    PushConstantRange,
};

/// Pipeline layout plus the set layouts it was built from (index = set number)
#[derive(Debug, PartialEq, Eq)]
pub struct PipelineDescriptorLayout {
    pub pipeline_layout: PipelineLayoutHandle,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
}

/// `binding | count << 32 | stages << 64 | type << 96`
pub fn binding_fingerprint(binding: &DescriptorBinding) -> u128 {
    binding.binding as u128
        | (binding.count as u128) << 32
        | (binding.stages.bits() as u128) << 64
        | (binding.descriptor_type as u128) << 96
}

/// `stages | offset << 32 | size << 64`
pub fn push_constant_fingerprint(range: &PushConstantRange) -> u128 {
    range.stages.bits() as u128
        | (range.offset as u128) << 32
        | (range.size as u128) << 64
}

fn set_fingerprint(bindings: &[DescriptorBinding]) -> Vec<u128> {
    bindings.iter().map(binding_fingerprint).collect()
}

struct LayoutEntry {
    sets: Vec<Vec<u128>>,
    push_constants: Vec<u128>,
    layout: Arc<PipelineDescriptorLayout>,
}

#[derive(Default)]
pub struct DescriptorLayoutCache {
    entries: Vec<LayoutEntry>,
}

impl DescriptorLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get or build the layout for `sets` (index = set number) and `push_constants`
    pub fn get_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        sets: &[Vec<DescriptorBinding>],
        push_constants: &[PushConstantRange],
    ) -> Result<Arc<PipelineDescriptorLayout>> {
        let set_fps: Vec<Vec<u128>> = sets.iter().map(|s| set_fingerprint(s)).collect();
        let push_fps: Vec<u128> = push_constants.iter().map(push_constant_fingerprint).collect();

        if let Some(entry) = self.entries.iter().find(|e| e.sets == set_fps && e.push_constants == push_fps) {
            return Ok(Arc::clone(&entry.layout));
        }

        let mut set_layouts = Vec::with_capacity(sets.len());
        let mut created = Vec::new();
        for (bindings, fp) in sets.iter().zip(&set_fps) {
            if let Some(handle) = self.find_set_layout(fp) {
                set_layouts.push(handle);
                continue;
            }
            match device.create_descriptor_set_layout(bindings) {
                Ok(handle) => {
                    created.push(handle);
                    set_layouts.push(handle);
                }
                Err(e) => {
                    created.iter().for_each(|h| device.destroy_descriptor_set_layout(*h));
                    return Err(e);
                }
            }
        }

        let pipeline_layout = match device.create_pipeline_layout(&set_layouts, push_constants) {
            Ok(handle) => handle,
            Err(e) => {
                created.iter().for_each(|h| device.destroy_descriptor_set_layout(*h));
                return Err(e);
            }
        };

        crate::engine_debug!(
            "j4f::program",
            "New pipeline layout: {} sets ({} created, {} reused), {} push-constant ranges",
            sets.len(), created.len(), sets.len() - created.len(), push_constants.len()
        );

        let layout = Arc::new(PipelineDescriptorLayout { pipeline_layout, set_layouts });
        self.entries.push(LayoutEntry { sets: set_fps, push_constants: push_fps, layout: Arc::clone(&layout) });
        Ok(layout)
    }

    fn find_set_layout(&self, fingerprint: &[u128]) -> Option<DescriptorSetLayoutHandle> {
        self.entries.iter().find_map(|entry| {
            entry.sets.iter()
                .position(|fp| fp.as_slice() == fingerprint)
                .map(|i| entry.layout.set_layouts[i])
        })
    }

    /// Destroy every cached GPU object (shared set layouts once)
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        let mut destroyed = FxHashSet::default();
        for entry in self.entries.drain(..) {
            device.destroy_pipeline_layout(entry.layout.pipeline_layout);
            for handle in &entry.layout.set_layouts {
                if destroyed.insert(*handle) {
                    device.destroy_descriptor_set_layout(*handle);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "layout_cache_tests.rs"]
mod tests;
