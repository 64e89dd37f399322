/// GraphicsDevice trait, device configuration and opaque GPU handles

use std::sync::Arc;
use std::path::PathBuf;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, Texture, TextureDesc, TextureData, ImageViewKind,
    ShaderModule, ShaderStage, CommandList, DescriptorBinding, DescriptorType,
    PushConstantRange, GraphicsPipelineDesc,
};

// ============================================================================
// Opaque handles
// ============================================================================

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn is_null(&self) -> bool {
                self.0 == 0
            }
        }
    };
}

gpu_handle!(
    /// Graphics pipeline object
    PipelineHandle
);
gpu_handle!(
    /// Pipeline layout (set layouts + push-constant ranges)
    PipelineLayoutHandle
);
gpu_handle!(DescriptorSetLayoutHandle);
gpu_handle!(DescriptorSetHandle);
gpu_handle!(
    /// Render pass the pipelines are built against
    RenderPassHandle
);

// ============================================================================
// Configuration
// ============================================================================

/// Debug message severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Where validation messages go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    Console,
    File(PathBuf),
    Both(PathBuf),
}

/// Validation message categories to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self { show_general: true, show_validation: true, show_performance: true }
    }
}

/// Counters collected by the validation layer callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// How shadow cascades should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowTechniquePreference {
    /// Best technique the device supports
    Auto,
    InstanceDraw,
    GeometryShader,
    PerCascade,
}

/// Device and renderer configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub enable_validation: bool,
    pub app_name: String,
    pub debug_severity: DebugSeverity,
    pub debug_output: DebugOutput,
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on a validation error (debugger break)
    pub break_on_validation_error: bool,
    pub panic_on_error: bool,
    pub enable_validation_stats: bool,
    pub vsync: bool,
    /// Requested in-flight frame count, clamped to the swapchain image count
    pub frames_in_flight: u32,
    /// Elements per dynamic buffer and per frame
    pub dynamic_buffer_capacity: u32,
    pub shadow_technique: ShadowTechniquePreference,
    pub shadow_cascades: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "J4F Application".to_string(),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: false,
            vsync: true,
            frames_in_flight: 3,
            dynamic_buffer_capacity: 2048,
            shadow_technique: ShadowTechniquePreference::Auto,
            shadow_cascades: 4,
        }
    }
}

// ============================================================================
// Device queries and frame results
// ============================================================================

/// Device limits the binding layer depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub min_uniform_offset_alignment: u32,
    pub min_storage_offset_alignment: u32,
    pub max_push_constants_size: u32,
    pub supports_geometry_shader: bool,
    /// `gl_Layer` writable from the vertex shader
    pub supports_viewport_index_layer: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_offset_alignment: 256,
            min_storage_offset_alignment: 256,
            max_push_constants_size: 128,
            supports_geometry_shader: false,
            supports_viewport_index_layer: false,
        }
    }
}

/// Outcome of acquiring the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired(u32),
    /// Usable, but the surface should be recreated
    Suboptimal(u32),
    /// Not usable, the surface must be recreated
    OutOfDate,
}

impl AcquireResult {
    pub fn image_index(&self) -> Option<u32> {
        match self {
            AcquireResult::Acquired(i) | AcquireResult::Suboptimal(i) => Some(*i),
            AcquireResult::OutOfDate => None,
        }
    }
}

/// Outcome of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Suboptimal,
    OutOfDate,
}

// ============================================================================
// GraphicsDevice trait
// ============================================================================

/// Backend interface consumed by the binding layer
///
/// All methods take `&self`. Backends synchronize internally so that
/// resources can be created from any thread.
pub trait GraphicsDevice: Send + Sync {
    // ===== QUERIES =====

    fn limits(&self) -> DeviceLimits;

    /// Number of frames the CPU may record ahead of the GPU
    fn frames_in_flight(&self) -> u32;

    fn surface_extent(&self) -> (u32, u32);

    // ===== RESOURCES =====

    /// Create a persistently mapped buffer
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create an image, its views and its sampler (no data)
    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Upload pixel data through a staging copy, generating mips if requested
    fn upload_texture(&self, texture: &dyn Texture, data: &TextureData) -> Result<()>;

    /// Create a shader module and reflect its interface
    ///
    /// Malformed binaries fail with `Error::ReflectionFailed`.
    fn create_shader_module(&self, code: &[u8], stage: ShaderStage) -> Result<Arc<dyn ShaderModule>>;

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle>;

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle>;

    /// Allocate `count` sets of one layout
    ///
    /// Pool exhaustion is retried against other pools before a new pool is created.
    fn allocate_descriptor_sets(&self, layout: DescriptorSetLayoutHandle, count: u32) -> Result<Vec<DescriptorSetHandle>>;

    fn write_buffer_descriptor(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        descriptor_type: DescriptorType,
        buffer: &dyn Buffer,
        offset: u64,
        range: u64,
    ) -> Result<()>;

    fn write_texture_descriptor(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        texture: &dyn Texture,
        view: ImageViewKind,
    ) -> Result<()>;

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    // ===== PIPELINES =====

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Render pass of the swapchain targets (changes when the surface is recreated)
    fn main_render_pass(&self) -> RenderPassHandle;

    // ===== FRAME =====

    /// Wait for the fence of `frame`, then reset it
    fn wait_frame_fence(&self, frame: u32) -> Result<()>;

    /// Put a reset fence back to the signaled state (frame abandoned before submit)
    fn restore_frame_fence(&self, frame: u32) -> Result<()>;

    fn begin_frame_commands(&self, frame: u32) -> Result<Box<dyn CommandList>>;

    fn acquire_next_image(&self, frame: u32) -> Result<AcquireResult>;

    /// Submit what was recorded for `frame`, targeting swapchain `image`
    ///
    /// Returns `Error::DeviceLost` when the device is gone.
    fn submit_frame(&self, frame: u32, image: u32) -> Result<()>;

    fn present_frame(&self, frame: u32, image: u32) -> Result<PresentResult>;

    fn wait_idle(&self) -> Result<()>;

    /// Recreate swapchain, depth buffer and framebuffers at a new size
    fn recreate_surface(&self, width: u32, height: u32, vsync: bool) -> Result<()>;
}
