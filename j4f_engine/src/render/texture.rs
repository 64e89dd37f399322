/// Textures as seen by draws: image + single-descriptor set + readiness
///
/// Every texture owns a one-binding descriptor set (sampler at binding 0,
/// all graphics stages) so a draw can bind it directly as an external set.
/// Textures whose upload has not completed are never bound: the draw falls
/// back to a [`Placeholders`] texture of matching dimensionality.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::Result;
use crate::graphics_device::{
    DescriptorSetHandle, DescriptorSetLayoutHandle, GraphicsDevice, ImageType, ImageViewKind,
    SamplerType, Texture, TextureData, TextureDesc, TextureFormat, TextureInfo, TextureType,
};

/// 2x2 RGBA8 checker used by the placeholders
pub const PLACEHOLDER_PIXELS: [u8; 16] = [
    100, 100, 100, 255, 160, 160, 160, 255,
    160, 160, 160, 255, 100, 100, 100, 255,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextureState {
    /// Waiting for its deferred upload
    Pending = 0,
    Ready = 1,
    /// Upload failed; the placeholder is used forever
    Failed = 2,
}

pub struct GpuTexture {
    texture: Arc<dyn Texture>,
    descriptor_set: DescriptorSetHandle,
    state: AtomicU8,
}

impl GpuTexture {
    /// Allocate and write the single-descriptor set of `texture`
    pub fn new(
        device: &dyn GraphicsDevice,
        texture: Arc<dyn Texture>,
        layout: DescriptorSetLayoutHandle,
        view: ImageViewKind,
    ) -> Result<Self> {
        let descriptor_set = device.allocate_descriptor_sets(layout, 1)?[0];
        device.write_texture_descriptor(descriptor_set, 0, texture.as_ref(), view)?;
        Ok(Self { texture, descriptor_set, state: AtomicU8::new(TextureState::Pending as u8) })
    }

    pub fn texture(&self) -> &Arc<dyn Texture> {
        &self.texture
    }

    pub fn info(&self) -> &TextureInfo {
        self.texture.info()
    }

    pub fn descriptor_set(&self) -> DescriptorSetHandle {
        self.descriptor_set
    }

    pub fn state(&self) -> TextureState {
        match self.state.load(Ordering::Acquire) {
            1 => TextureState::Ready,
            2 => TextureState::Failed,
            _ => TextureState::Pending,
        }
    }

    pub fn set_state(&self, state: TextureState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.state() == TextureState::Ready
    }
}

/// Always-ready fallback textures
pub struct Placeholders {
    pub texture_2d: Arc<GpuTexture>,
    pub texture_2d_array: Arc<GpuTexture>,
}

impl Placeholders {
    /// One 2x2 image, exposed through a 2D and a 2D-array view
    pub fn new(device: &dyn GraphicsDevice, layout: DescriptorSetLayoutHandle) -> Result<Self> {
        let desc = TextureDesc {
            width: 2,
            height: 2,
            array_layers: 1,
            format: TextureFormat::R8G8B8A8_UNORM,
            texture_type: TextureType::Tex2D,
            generate_mipmaps: false,
            sampler: SamplerType::NearestRepeat,
        };
        let texture = device.create_texture(&desc)?;
        device.upload_texture(texture.as_ref(), &TextureData::Single(PLACEHOLDER_PIXELS.to_vec()))?;

        let texture_2d = GpuTexture::new(device, Arc::clone(&texture), layout, ImageViewKind::Default)?;
        let texture_2d_array = GpuTexture::new(device, texture, layout, ImageViewKind::Array2D)?;
        texture_2d.set_state(TextureState::Ready);
        texture_2d_array.set_state(TextureState::Ready);

        Ok(Self { texture_2d: Arc::new(texture_2d), texture_2d_array: Arc::new(texture_2d_array) })
    }

    /// Placeholder matching what a sampler of `image_type` expects
    pub fn for_image_type(&self, image_type: Option<ImageType>) -> &Arc<GpuTexture> {
        match image_type {
            Some(t) if t.is_array() => &self.texture_2d_array,
            _ => &self.texture_2d,
        }
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
