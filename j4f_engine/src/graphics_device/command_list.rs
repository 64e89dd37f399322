/// CommandList trait - records the draw-side commands of one frame

use crate::error::Result;
use crate::graphics_device::{
    Buffer, IndexType, ShaderStageFlags,
    PipelineHandle, PipelineLayoutHandle, DescriptorSetHandle,
};

/// Command recorder for one in-flight frame
///
/// Obtained from `GraphicsDevice::begin_frame_commands`. The recording is
/// submitted by `GraphicsDevice::submit_frame` once the list is dropped.
pub trait CommandList: Send {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()>;

    /// Bind `sets` starting at `first_set`
    ///
    /// `dynamic_offsets` holds one entry per dynamic binding in the bound
    /// sets, in (set, binding) order.
    fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    ) -> Result<()>;

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()>;

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64, index_type: IndexType) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    fn set_depth_bias(&mut self, bias: DepthBias) -> Result<()>;

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()>;
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with depth range [0, 1]
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0.0, y: 0.0, width: width as f32, height: height as f32, min_depth: 0.0, max_depth: 1.0 }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Depth bias parameters (dynamic state)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}
