/// Draw item arena sorted into submission order
///
/// Items live in a slot map with generation-checked keys. Each frame the
/// visible items with a pipeline are radix-sorted by pipeline id then depth,
/// prepared, and rendered in that order.

use rdst::{RadixKey, RadixSort};
use slotmap::{new_key_type, SlotMap};

use crate::error::Result;
use crate::frame::Statistics;
use crate::graphics_device::CommandList;
use crate::render::render_data::{RenderData, ViewParams};
use crate::render::texture::Placeholders;

new_key_type! {
    /// Stable key of a draw item in a [`RenderList`]
    pub struct RenderDataKey;
}

/// Map an `f32` to a `u32` with the same ordering
pub fn depth_sort_bits(depth: f32) -> u32 {
    let bits = depth.to_bits();
    if bits & 0x8000_0000 != 0 { !bits } else { bits | 0x8000_0000 }
}

/// `pipeline id << 32 | depth`, or `u64::MAX` without a pipeline
pub fn sort_key(data: &RenderData) -> u64 {
    match data.pipeline() {
        Some(pipeline) => (pipeline.id() as u64) << 32 | depth_sort_bits(data.sort_depth) as u64,
        None => u64::MAX,
    }
}

#[derive(Debug, Clone, Copy)]
struct DrawOrder {
    key: u64,
    item: RenderDataKey,
}

impl RadixKey for DrawOrder {
    const LEVELS: usize = 8;

    #[inline]
    fn get_level(&self, level: usize) -> u8 {
        (self.key >> (level * 8)) as u8
    }
}

#[derive(Default)]
pub struct RenderList {
    items: SlotMap<RenderDataKey, RenderData>,
    order: Vec<DrawOrder>,
}

impl RenderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, data: RenderData) -> RenderDataKey {
        self.items.insert(data)
    }

    pub fn remove(&mut self, key: RenderDataKey) -> Option<RenderData> {
        self.order.retain(|o| o.item != key);
        self.items.remove(key)
    }

    pub fn get(&self, key: RenderDataKey) -> Option<&RenderData> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: RenderDataKey) -> Option<&mut RenderData> {
        self.items.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rebuild the submission order from the visible items with a pipeline
    pub fn sort(&mut self) {
        self.order.clear();
        self.order.extend(
            self.items.iter()
                .filter(|(_, data)| data.visible && data.pipeline().is_some())
                .map(|(item, data)| DrawOrder { key: sort_key(data), item }),
        );
        self.order.radix_sort_unstable();
    }

    /// Keys in submission order (as of the last [`sort`](Self::sort))
    pub fn sorted_keys(&self) -> impl Iterator<Item = RenderDataKey> + '_ {
        self.order.iter().map(|o| o.item)
    }

    /// Prepare every sorted item for `frame`
    ///
    /// An item that fails to prepare is logged and dropped from this
    /// frame's order. Returns the number of dropped items.
    pub fn prepare(&mut self, frame: u32, placeholders: &Placeholders) -> usize {
        let items = &mut self.items;
        let before = self.order.len();
        self.order.retain(|o| {
            let Some(data) = items.get_mut(o.item) else {
                return false;
            };
            match data.prepare_render(frame, placeholders) {
                Ok(()) => true,
                Err(e) => {
                    crate::engine_warn!("j4f::render", "Draw item skipped: {}", e);
                    false
                }
            }
        });
        before - self.order.len()
    }

    /// Record every sorted item, returning the number of draw calls
    pub fn render(
        &self,
        cmd: &mut dyn CommandList,
        frame: u32,
        view: &ViewParams,
        instance_multiplier: u32,
        stats: &Statistics,
    ) -> Result<u32> {
        let mut draws = 0;
        for order in &self.order {
            if let Some(data) = self.items.get(order.item) {
                draws += data.render(cmd, frame, view, instance_multiplier, stats)?;
            }
        }
        Ok(draws)
    }

    /// Sort, prepare and render in one call
    pub fn draw(
        &mut self,
        cmd: &mut dyn CommandList,
        frame: u32,
        view: &ViewParams,
        instance_multiplier: u32,
        placeholders: &Placeholders,
        stats: &Statistics,
    ) -> Result<u32> {
        self.sort();
        self.prepare(frame, placeholders);
        self.render(cmd, frame, view, instance_multiplier, stats)
    }
}

#[cfg(test)]
#[path = "render_list_tests.rs"]
mod tests;
