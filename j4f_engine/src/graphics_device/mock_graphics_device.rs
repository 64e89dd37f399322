/// Mock graphics device for unit tests (no GPU required)
///
/// Records every object creation, descriptor write, command and frame call so
/// the binding layer can be verified without a GPU. Failures are scripted
/// through [`MockScript`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::graphics_device::*;

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub usage: BufferUsage,
    pub data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self { usage, data: Mutex::new(vec![0; size as usize]) }
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.data.lock().unwrap();
        check_buffer_range(bytes.len() as u64, offset, data.len())?;
        bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let bytes = self.data.lock().unwrap();
        check_buffer_range(bytes.len() as u64, offset, out.len())?;
        out.copy_from_slice(&bytes[offset as usize..offset as usize + out.len()]);
        Ok(())
    }
}

// ============================================================================
// Mock Texture / Shader
// ============================================================================

pub struct MockTexture {
    pub info: TextureInfo,
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

pub struct MockShaderModule {
    pub stage: ShaderStage,
    pub interface: ShaderInterface,
}

impl ShaderModule for MockShaderModule {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn interface(&self) -> &ShaderInterface {
        &self.interface
    }
}

// ============================================================================
// Mock Command List
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    BindPipeline(PipelineHandle),
    BindDescriptorSets {
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: Vec<DescriptorSetHandle>,
        dynamic_offsets: Vec<u32>,
    },
    PushConstants { stages: ShaderStageFlags, offset: u32, data: Vec<u8> },
    BindVertexBuffer { offset: u64 },
    BindIndexBuffer { offset: u64, index_type: IndexType },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    SetDepthBias(DepthBias),
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32 },
}

pub struct MockCommandList {
    pub commands: Arc<Mutex<Vec<MockCommand>>>,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self { commands: Arc::new(Mutex::new(Vec::new())) }
    }

    fn push(&self, command: MockCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

impl CommandList for MockCommandList {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        self.push(MockCommand::BindPipeline(pipeline))
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        self.push(MockCommand::BindDescriptorSets {
            layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        })
    }

    fn push_constants(&mut self, _layout: PipelineLayoutHandle, stages: ShaderStageFlags, offset: u32, data: &[u8]) -> Result<()> {
        self.push(MockCommand::PushConstants { stages, offset, data: data.to_vec() })
    }

    fn bind_vertex_buffer(&mut self, _buffer: &dyn Buffer, offset: u64) -> Result<()> {
        self.push(MockCommand::BindVertexBuffer { offset })
    }

    fn bind_index_buffer(&mut self, _buffer: &dyn Buffer, offset: u64, index_type: IndexType) -> Result<()> {
        self.push(MockCommand::BindIndexBuffer { offset, index_type })
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.push(MockCommand::SetViewport(viewport))
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.push(MockCommand::SetScissor(scissor))
    }

    fn set_depth_bias(&mut self, bias: DepthBias) -> Result<()> {
        self.push(MockCommand::SetDepthBias(bias))
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.push(MockCommand::Draw { vertex_count, instance_count, first_vertex, first_instance })
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.push(MockCommand::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance })
    }
}

// ============================================================================
// Mock Graphics Device
// ============================================================================

/// Creation/destruction counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub buffers: u32,
    pub textures: u32,
    pub texture_uploads: u32,
    pub shader_modules: u32,
    pub set_layouts: u32,
    pub pipeline_layouts: u32,
    pub descriptor_sets: u32,
    pub pipelines: u32,
    pub destroyed_set_layouts: u32,
    pub destroyed_pipeline_layouts: u32,
    pub destroyed_pipelines: u32,
}

/// Recorded descriptor write
#[derive(Debug, Clone, PartialEq)]
pub enum MockDescriptorWrite {
    Buffer { set: DescriptorSetHandle, binding: u32, descriptor_type: DescriptorType, offset: u64, range: u64, buffer_size: u64 },
    Texture { set: DescriptorSetHandle, binding: u32, width: u32, view: ImageViewKind },
}

/// Scripted failures and results, consumed in order
#[derive(Debug, Default)]
pub struct MockScript {
    pub fence_failures: u32,
    pub acquire_results: VecDeque<AcquireResult>,
    pub present_results: VecDeque<PresentResult>,
    pub submit_device_lost: bool,
    pub fail_uploads: bool,
}

pub struct MockGraphicsDevice {
    pub limits: DeviceLimits,
    pub frames: u32,
    next_handle: AtomicU64,
    render_pass: AtomicU64,
    pub counters: Mutex<MockCounters>,
    pub shader_interfaces: Mutex<HashMap<Vec<u8>, ShaderInterface>>,
    pub descriptor_writes: Mutex<Vec<MockDescriptorWrite>>,
    pub set_layouts: Mutex<HashMap<DescriptorSetLayoutHandle, Vec<DescriptorBinding>>>,
    pub pipeline_descs: Mutex<HashMap<PipelineHandle, PipelineState>>,
    pub commands: Arc<Mutex<Vec<MockCommand>>>,
    pub frame_events: Mutex<Vec<String>>,
    pub script: Mutex<MockScript>,
    pub extent: Mutex<(u32, u32)>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_frames(2)
    }

    pub fn with_frames(frames: u32) -> Self {
        Self {
            limits: DeviceLimits {
                min_uniform_offset_alignment: 64,
                min_storage_offset_alignment: 64,
                max_push_constants_size: 128,
                supports_geometry_shader: true,
                supports_viewport_index_layer: false,
            },
            frames,
            next_handle: AtomicU64::new(1),
            render_pass: AtomicU64::new(0xA000),
            counters: Mutex::new(MockCounters::default()),
            shader_interfaces: Mutex::new(HashMap::new()),
            descriptor_writes: Mutex::new(Vec::new()),
            set_layouts: Mutex::new(HashMap::new()),
            pipeline_descs: Mutex::new(HashMap::new()),
            commands: Arc::new(Mutex::new(Vec::new())),
            frame_events: Mutex::new(Vec::new()),
            script: Mutex::new(MockScript::default()),
            extent: Mutex::new((800, 600)),
        }
    }

    /// Make `code` reflect to `interface`
    pub fn register_shader(&self, code: &[u8], interface: ShaderInterface) {
        self.shader_interfaces.lock().unwrap().insert(code.to_vec(), interface);
    }

    pub fn counters(&self) -> MockCounters {
        self.counters.lock().unwrap().clone()
    }

    pub fn take_commands(&self) -> Vec<MockCommand> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }

    pub fn take_frame_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.frame_events.lock().unwrap())
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn event(&self, text: String) {
        self.frame_events.lock().unwrap().push(text);
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn frames_in_flight(&self) -> u32 {
        self.frames
    }

    fn surface_extent(&self) -> (u32, u32) {
        *self.extent.lock().unwrap()
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        self.counters.lock().unwrap().buffers += 1;
        Ok(Arc::new(MockBuffer::new(desc.size, desc.usage)))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        self.counters.lock().unwrap().textures += 1;
        Ok(Arc::new(MockTexture { info: TextureInfo::from_desc(desc) }))
    }

    fn upload_texture(&self, _texture: &dyn Texture, _data: &TextureData) -> Result<()> {
        if self.script.lock().unwrap().fail_uploads {
            return Err(Error::BackendError("scripted upload failure".to_string()));
        }
        self.counters.lock().unwrap().texture_uploads += 1;
        Ok(())
    }

    fn create_shader_module(&self, code: &[u8], stage: ShaderStage) -> Result<Arc<dyn ShaderModule>> {
        let interface = self.shader_interfaces.lock().unwrap().get(code).cloned()
            .ok_or_else(|| Error::ReflectionFailed("unknown shader binary".to_string()))?;
        self.counters.lock().unwrap().shader_modules += 1;
        Ok(Arc::new(MockShaderModule { stage, interface }))
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle> {
        self.counters.lock().unwrap().set_layouts += 1;
        let handle = DescriptorSetLayoutHandle(self.next());
        self.set_layouts.lock().unwrap().insert(handle, bindings.to_vec());
        Ok(handle)
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[DescriptorSetLayoutHandle],
        _push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle> {
        self.counters.lock().unwrap().pipeline_layouts += 1;
        Ok(PipelineLayoutHandle(self.next()))
    }

    fn allocate_descriptor_sets(&self, _layout: DescriptorSetLayoutHandle, count: u32) -> Result<Vec<DescriptorSetHandle>> {
        self.counters.lock().unwrap().descriptor_sets += count;
        Ok((0..count).map(|_| DescriptorSetHandle(self.next())).collect())
    }

    fn write_buffer_descriptor(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        descriptor_type: DescriptorType,
        buffer: &dyn Buffer,
        offset: u64,
        range: u64,
    ) -> Result<()> {
        self.descriptor_writes.lock().unwrap().push(MockDescriptorWrite::Buffer {
            set, binding, descriptor_type, offset, range, buffer_size: buffer.size(),
        });
        Ok(())
    }

    fn write_texture_descriptor(&self, set: DescriptorSetHandle, binding: u32, texture: &dyn Texture, view: ImageViewKind) -> Result<()> {
        self.descriptor_writes.lock().unwrap().push(MockDescriptorWrite::Texture {
            set, binding, width: texture.info().width, view,
        });
        Ok(())
    }

    fn destroy_descriptor_set_layout(&self, _layout: DescriptorSetLayoutHandle) {
        self.counters.lock().unwrap().destroyed_set_layouts += 1;
    }

    fn destroy_pipeline_layout(&self, _layout: PipelineLayoutHandle) {
        self.counters.lock().unwrap().destroyed_pipeline_layouts += 1;
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        self.counters.lock().unwrap().pipelines += 1;
        let handle = PipelineHandle(self.next());
        self.pipeline_descs.lock().unwrap().insert(handle, desc.state);
        Ok(handle)
    }

    fn destroy_pipeline(&self, _pipeline: PipelineHandle) {
        self.counters.lock().unwrap().destroyed_pipelines += 1;
    }

    fn main_render_pass(&self) -> RenderPassHandle {
        RenderPassHandle(self.render_pass.load(Ordering::Relaxed))
    }

    fn wait_frame_fence(&self, frame: u32) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        if script.fence_failures > 0 {
            script.fence_failures -= 1;
            return Err(Error::BackendError("scripted fence failure".to_string()));
        }
        drop(script);
        self.event(format!("wait_fence({})", frame));
        Ok(())
    }

    fn restore_frame_fence(&self, frame: u32) -> Result<()> {
        self.event(format!("restore_fence({})", frame));
        Ok(())
    }

    fn begin_frame_commands(&self, frame: u32) -> Result<Box<dyn CommandList>> {
        self.event(format!("begin_commands({})", frame));
        Ok(Box::new(MockCommandList { commands: Arc::clone(&self.commands) }))
    }

    fn acquire_next_image(&self, frame: u32) -> Result<AcquireResult> {
        let result = self.script.lock().unwrap().acquire_results.pop_front()
            .unwrap_or(AcquireResult::Acquired(frame));
        self.event(format!("acquire({})", frame));
        Ok(result)
    }

    fn submit_frame(&self, frame: u32, image: u32) -> Result<()> {
        if self.script.lock().unwrap().submit_device_lost {
            return Err(Error::DeviceLost);
        }
        self.event(format!("submit({}, {})", frame, image));
        Ok(())
    }

    fn present_frame(&self, frame: u32, image: u32) -> Result<PresentResult> {
        let result = self.script.lock().unwrap().present_results.pop_front()
            .unwrap_or(PresentResult::Presented);
        self.event(format!("present({}, {})", frame, image));
        Ok(result)
    }

    fn wait_idle(&self) -> Result<()> {
        self.event("wait_idle".to_string());
        Ok(())
    }

    fn recreate_surface(&self, width: u32, height: u32, _vsync: bool) -> Result<()> {
        *self.extent.lock().unwrap() = (width, height);
        self.render_pass.fetch_add(1, Ordering::Relaxed);
        self.event(format!("recreate_surface({}, {})", width, height));
        Ok(())
    }
}

// ============================================================================
// Shader interface builders
// ============================================================================

pub fn member(name: &str, ty: ReflectedType) -> ReflectedMember {
    ReflectedMember { name: name.to_string(), ty }
}

pub fn float() -> ReflectedType {
    ReflectedType::Scalar { size: 4 }
}

pub fn vec3() -> ReflectedType {
    ReflectedType::Vector { components: 3, component_size: 4 }
}

pub fn vec4() -> ReflectedType {
    ReflectedType::Vector { components: 4, component_size: 4 }
}

pub fn mat4() -> ReflectedType {
    ReflectedType::Matrix { columns: 4, rows: 4, stride: 16 }
}

pub fn ubo_descriptor(name: &str, type_name: &str, set: u32, binding: u32, members: Vec<ReflectedMember>) -> ReflectedDescriptor {
    ReflectedDescriptor {
        name: name.to_string(),
        type_name: type_name.to_string(),
        set,
        binding,
        kind: ReflectedDescriptorKind::UniformBuffer,
        count: 1,
        ty: Some(ReflectedType::Struct { name: type_name.to_string(), members, size: 0 }),
    }
}

pub fn texture_descriptor(name: &str, set: u32, image_type: ImageType) -> ReflectedDescriptor {
    ReflectedDescriptor {
        name: name.to_string(),
        type_name: String::new(),
        set,
        binding: 0,
        kind: ReflectedDescriptorKind::CombinedImageSampler(image_type),
        count: 1,
        ty: None,
    }
}

/// Push-constant block from `(name, offset, size)` members
pub fn push_block(name: &str, members: &[(&str, u32, u32)]) -> ReflectedPushConstant {
    let size = members.iter().map(|(_, offset, size)| offset + size).max().unwrap_or(0);
    ReflectedPushConstant {
        name: name.to_string(),
        offset: 0,
        size,
        members: members.iter()
            .map(|(n, offset, size)| ReflectedPushConstantMember { name: n.to_string(), offset: *offset, size: *size })
            .collect(),
    }
}

/// `{ mat4 mvp; vec3 color; float intensity; }`
pub fn object_members() -> Vec<ReflectedMember> {
    vec![member("mvp", mat4()), member("color", vec3()), member("intensity", float())]
}

pub const STANDARD_VS: &[u8] = b"standard.vert.spv";
pub const STANDARD_FS: &[u8] = b"standard.frag.spv";

/// Register a vertex/fragment pair using
///
/// - set 0: static `camera { mat4 view_proj }` (vertex)
/// - set 1: dynamic `object { mvp, color, intensity }` (vertex + fragment)
/// - set 2: `u_texture` sampler2D (fragment)
/// - push constants `pc { mat4 model; vec4 tint }` (vertex + fragment)
pub fn register_standard_shaders(device: &MockGraphicsDevice) {
    let pc = push_block("pc", &[("model", 0, 64), ("tint", 64, 16)]);
    device.register_shader(STANDARD_VS, ShaderInterface {
        descriptors: vec![
            ubo_descriptor("camera", "static_camera", 0, 0, vec![member("view_proj", mat4())]),
            ubo_descriptor("object", "object_data", 1, 0, object_members()),
        ],
        push_constants: vec![pc.clone()],
    });
    device.register_shader(STANDARD_FS, ShaderInterface {
        descriptors: vec![
            ubo_descriptor("object", "object_data", 1, 0, object_members()),
            texture_descriptor("u_texture", 2, ImageType::Sampler2D),
        ],
        push_constants: vec![pc],
    });
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
