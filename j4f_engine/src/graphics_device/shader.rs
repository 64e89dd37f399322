/// Shader stages, shader modules and their reflected interface

use bitflags::bitflags;

/// Single pipeline stage a shader module is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
}

bitflags! {
    /// Set of shader stages (bit values match the Vulkan stage bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x01;
        const TESSELLATION_CONTROL = 0x02;
        const TESSELLATION_EVALUATION = 0x04;
        const GEOMETRY = 0x08;
        const FRAGMENT = 0x10;
        const ALL_GRAPHICS = 0x1F;
    }
}

impl From<ShaderStage> for ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Dimensionality of a combined image sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Sampler1D,
    Sampler1DArray,
    Sampler2D,
    Sampler2DArray,
    Sampler3D,
    SamplerCube,
    SamplerCubeArray,
}

impl ImageType {
    /// Whether the shader expects an arrayed view
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ImageType::Sampler1DArray | ImageType::Sampler2DArray | ImageType::SamplerCubeArray
        )
    }
}

// ===== REFLECTED INTERFACE =====

/// Type of a reflected block member, as reported by the backend's SPIR-V parser
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectedType {
    Scalar { size: u32 },
    Vector { components: u32, component_size: u32 },
    /// `stride` is the byte distance between columns
    Matrix { columns: u32, rows: u32, stride: u32 },
    Array { element: Box<ReflectedType>, count: u32, stride: u32 },
    Struct { name: String, members: Vec<ReflectedMember>, size: u32 },
    /// Images, samplers and other non-data types
    Opaque,
}

/// Named member of a reflected struct
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedMember {
    pub name: String,
    pub ty: ReflectedType,
}

/// Descriptor kinds the backend can report
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectedDescriptorKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler(ImageType),
    /// Anything the program model does not bind (separate samplers, storage images, ...)
    Unsupported(String),
}

/// One descriptor binding found in a shader module
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedDescriptor {
    /// Variable (instance) name
    pub name: String,
    /// Block type name; carries the `static` marker for plain buffers
    pub type_name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: ReflectedDescriptorKind,
    pub count: u32,
    /// Block layout for uniform/storage buffers
    pub ty: Option<ReflectedType>,
}

/// Member of a push-constant block (offsets come straight from the shader)
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedPushConstantMember {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// One push-constant block found in a shader module
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedPushConstant {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub members: Vec<ReflectedPushConstantMember>,
}

/// Everything the program model needs to know about one shader module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderInterface {
    pub descriptors: Vec<ReflectedDescriptor>,
    pub push_constants: Vec<ReflectedPushConstant>,
}

/// Compiled shader stage
///
/// Created by [`GraphicsDevice::create_shader_module`](crate::graphics_device::GraphicsDevice::create_shader_module),
/// which reflects the binary. The module is destroyed when dropped.
pub trait ShaderModule: Send + Sync {
    fn stage(&self) -> ShaderStage;

    fn interface(&self) -> &ShaderInterface;
}
