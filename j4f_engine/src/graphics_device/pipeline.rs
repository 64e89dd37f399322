/// Fixed-function pipeline state, vertex layouts and descriptor-layout descriptions

use std::sync::Arc;
use crate::graphics_device::{
    ShaderModule, ShaderStageFlags, PipelineLayoutHandle, RenderPassHandle,
};

/// Primitive topology (discriminants fit in 4 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveTopology {
    PointList = 0,
    LineList = 1,
    LineStrip = 2,
    TriangleList = 3,
    TriangleStrip = 4,
    TriangleFan = 5,
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices (max 65535 vertices)
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

// ===== VERTEX LAYOUT =====

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_UINT,
    R32G32B32A32_UINT,
    R8G8B8A8_UNORM,
    R16G16_SFLOAT,
}

impl VertexFormat {
    /// Returns size in bytes for this format
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::R32_SFLOAT | VertexFormat::R32_UINT => 4,
            VertexFormat::R8G8B8A8_UNORM | VertexFormat::R16G16_SFLOAT => 4,
            VertexFormat::R32G32_SFLOAT => 8,
            VertexFormat::R32G32B32_SFLOAT => 12,
            VertexFormat::R32G32B32A32_SFLOAT | VertexFormat::R32G32B32A32_UINT => 16,
        }
    }
}

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex input layout
///
/// Part of the pipeline key, compared structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Single interleaved per-vertex binding with tightly packed attributes
    pub fn interleaved(formats: &[VertexFormat]) -> Self {
        let mut attributes = Vec::with_capacity(formats.len());
        let mut offset = 0;
        for (location, format) in formats.iter().enumerate() {
            attributes.push(VertexAttribute {
                location: location as u32,
                binding: 0,
                format: *format,
                offset,
            });
            offset += format.size_bytes();
        }
        Self {
            bindings: vec![VertexBinding { binding: 0, stride: offset, input_rate: VertexInputRate::Vertex }],
            attributes,
        }
    }
}

// ===== RASTERIZATION =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PolygonMode {
    Fill = 0,
    Line = 1,
    Point = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CullMode {
    None = 0,
    Front = 1,
    Back = 2,
    FrontAndBack = 3,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrontFace {
    CounterClockwise = 0,
    Clockwise = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Rasterizer discard (no fragments produced)
    pub discard: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            discard: false,
        }
    }
}

// ===== DEPTH / STENCIL =====

/// Comparison operator for depth and stencil tests (3 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareOp {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessOrEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterOrEqual = 6,
    Always = 7,
}

/// Stencil operation (3 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StencilOp {
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementAndClamp = 3,
    DecrementAndClamp = 4,
    Invert = 5,
    IncrementAndWrap = 6,
    DecrementAndWrap = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub compare_op: CompareOp,
    pub test: bool,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self { compare_op: CompareOp::LessOrEqual, test: true, write: true }
    }
}

/// Stencil state, applied to front and back faces alike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub enabled: bool,
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u8,
    pub write_mask: u8,
    pub reference: u8,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 1,
        }
    }
}

// ===== BLENDING =====

/// Blend factor for color blending equations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
}

/// Predefined blend equations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendMode {
    /// Blending disabled
    None = 0,
    Alpha = 1,
    Add = 2,
    Multiply = 3,
    /// Alpha blending for premultiplied-alpha sources
    AlphaPma = 4,
    /// Additive blending for premultiplied-alpha sources
    AddPma = 5,
}

impl BlendMode {
    /// Source and destination color factors, None when blending is off
    pub fn factors(&self) -> Option<(BlendFactor, BlendFactor)> {
        match self {
            BlendMode::None => None,
            BlendMode::Alpha => Some((BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)),
            BlendMode::Add => Some((BlendFactor::SrcAlpha, BlendFactor::One)),
            BlendMode::Multiply => Some((BlendFactor::DstColor, BlendFactor::Zero)),
            BlendMode::AlphaPma => Some((BlendFactor::One, BlendFactor::OneMinusSrcAlpha)),
            BlendMode::AddPma => Some((BlendFactor::One, BlendFactor::One)),
        }
    }
}

// ===== FULL STATE =====

/// Everything fixed-function a pipeline needs besides program, vertex layout and render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
    pub rasterization: RasterizationState,
    pub depth: DepthState,
    pub stencil: StencilState,
    pub blend: BlendMode,
    pub subpass: u32,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
            rasterization: RasterizationState::default(),
            depth: DepthState::default(),
            stencil: StencilState::default(),
            blend: BlendMode::None,
            subpass: 0,
        }
    }
}

// ===== DESCRIPTOR LAYOUTS =====

/// Descriptor types the binding layer creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DescriptorType {
    CombinedImageSampler = 1,
    UniformBuffer = 6,
    StorageBuffer = 7,
    UniformBufferDynamic = 8,
    StorageBufferDynamic = 9,
}

impl DescriptorType {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, DescriptorType::UniformBufferDynamic | DescriptorType::StorageBufferDynamic)
    }
}

/// One binding inside a descriptor-set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Push constant range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// Everything a backend needs to build one graphics pipeline
#[derive(Clone)]
pub struct GraphicsPipelineDesc {
    pub stages: Vec<Arc<dyn ShaderModule>>,
    pub layout: PipelineLayoutHandle,
    pub render_pass: RenderPassHandle,
    pub vertex_layout: VertexLayout,
    pub state: PipelineState,
}
