/// Texture trait, texture descriptor, and texture info

/// Texture pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    D32_FLOAT,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8_UNORM => 1,
            TextureFormat::R8G8_UNORM => 2,
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::D32_FLOAT => 4,
            TextureFormat::R16G16B16A16_SFLOAT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    /// Pick the 8-bit format matching a bits-per-pixel value (8, 16 or 32)
    pub fn from_bits_per_pixel(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(TextureFormat::R8_UNORM),
            16 => Some(TextureFormat::R8G8_UNORM),
            32 => Some(TextureFormat::R8G8B8A8_UNORM),
            _ => None,
        }
    }
}

/// Texture type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    /// Simple 2D texture
    Tex2D,
    /// Array of 2D layers
    Array2D,
    /// Cubemap (6 layers)
    Cube,
}

/// Sampler presets shared by all textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    LinearRepeat,
    LinearClamp,
    NearestRepeat,
    NearestClamp,
    /// Depth comparison sampler for shadow maps
    Shadow,
    Anisotropic,
}

/// Which view of an image a descriptor should reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageViewKind {
    /// The view matching the texture type
    Default,
    /// Force a 2D-array view (used by the array placeholder)
    Array2D,
}

// ===== TEXTURE DATA =====

/// Data for a single layer of a texture array
#[derive(Debug, Clone)]
pub struct TextureLayerData {
    /// Target layer index (0-based)
    pub layer: u32,
    /// Raw pixel bytes for this layer
    pub data: Vec<u8>,
}

/// Pixel data uploaded to a texture
#[derive(Debug, Clone)]
pub enum TextureData {
    /// Layer 0 only
    Single(Vec<u8>),

    /// Per-layer data. Only the listed layers are uploaded.
    Layers(Vec<TextureLayerData>),
}

impl TextureData {
    /// Iterate `(layer, bytes)` pairs
    pub fn layers(&self) -> Vec<(u32, &[u8])> {
        match self {
            TextureData::Single(data) => vec![(0, data.as_slice())],
            TextureData::Layers(layers) => layers.iter().map(|l| (l.layer, l.data.as_slice())).collect(),
        }
    }
}

// ===== TEXTURE DESC =====

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Number of array layers (1 = simple 2D texture)
    pub array_layers: u32,
    pub format: TextureFormat,
    pub texture_type: TextureType,
    /// Generate the full mip chain on the GPU after upload
    pub generate_mipmaps: bool,
    pub sampler: SamplerType,
}

impl TextureDesc {
    /// Number of mip levels implied by the size and `generate_mipmaps`
    pub fn mip_levels(&self) -> u32 {
        if self.generate_mipmaps {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }

    /// Expected byte length of one layer
    pub fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }
}

// ===== TEXTURE INFO =====

/// Read-only properties of a created texture.
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub texture_type: TextureType,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub sampler: SamplerType,
}

impl TextureInfo {
    pub fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            texture_type: desc.texture_type,
            array_layers: desc.array_layers,
            mip_levels: desc.mip_levels(),
            sampler: desc.sampler,
        }
    }

    /// Returns true if this texture is a texture array (array_layers > 1)
    pub fn is_array(&self) -> bool {
        self.array_layers > 1
    }
}

// ===== TEXTURE TRAIT =====

/// Texture resource trait
///
/// Implemented by backend-specific texture types (e.g., VulkanTexture).
/// The texture is destroyed when dropped.
pub trait Texture: Send + Sync {
    /// Get the read-only properties of this texture
    fn info(&self) -> &TextureInfo;
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
