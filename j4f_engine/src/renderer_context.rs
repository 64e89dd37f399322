/// Renderer context: owner of every cache and of the frame loop
///
/// One `RendererContext` wraps one [`GraphicsDevice`]. It owns the shader
/// module cache, the program registry, the layout, dynamic-buffer and
/// pipeline caches, the placeholder textures and the per-frame state.
/// Caches are behind mutexes so programs and pipelines can be created from
/// loader threads; the frame functions are meant for a single thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use rustc_hash::FxHashMap;
use winit::event::WindowEvent;

use crate::error::{Error, Result};
use crate::frame::{FrameStage, FrameState, Retired, Statistics, StatisticsSnapshot};
use crate::graphics_device::{
    AcquireResult, Buffer, CommandList, Config, DescriptorBinding, DescriptorSetLayoutHandle,
    DescriptorType, DeviceLimits, GraphicsDevice, ImageViewKind, PipelineState, PresentResult,
    SamplerType, ShaderModule, ShaderStage, ShaderStageFlags, TextureData, TextureDesc,
    TextureFormat, TextureLayerData, TextureType, VertexLayout,
};
use crate::program::{DescriptorLayoutCache, GpuProgram};
use crate::render::{
    DynamicBufferCache, GpuTexture, GraphicsPipeline, PipelineCache, Placeholders, RenderableKind,
    ShadowProgramRegistry, ShadowTechnique, TextureState,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Texture upload queued for the next `begin_frame`
struct PendingUpload {
    texture: Arc<GpuTexture>,
    data: TextureData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SurfaceState {
    width: u32,
    height: u32,
    vsync: bool,
}

/// Frame-loop timing for statistics
#[derive(Default)]
struct FrameClock {
    begin: Option<Instant>,
    last_end: Option<Instant>,
}

pub struct RendererContext {
    device: Arc<dyn GraphicsDevice>,
    config: Config,
    limits: DeviceLimits,
    shader_modules: Mutex<FxHashMap<(PathBuf, ShaderStage), Arc<dyn ShaderModule>>>,
    programs: Mutex<Vec<Arc<GpuProgram>>>,
    next_program_id: AtomicU16,
    layout_cache: Mutex<DescriptorLayoutCache>,
    dynamic_buffers: Mutex<DynamicBufferCache>,
    pipeline_cache: Mutex<PipelineCache>,
    texture_set_layout: DescriptorSetLayoutHandle,
    placeholders: Placeholders,
    shadow_technique: ShadowTechnique,
    shadow_programs: Mutex<ShadowProgramRegistry>,
    frame: Mutex<FrameState>,
    pending_uploads: Mutex<Vec<PendingUpload>>,
    surface: Mutex<SurfaceState>,
    clock: Mutex<FrameClock>,
    statistics: Statistics,
}

impl RendererContext {
    /// Build the caches and placeholder textures on top of `device`
    pub fn new(device: Arc<dyn GraphicsDevice>, config: Config) -> Result<Self> {
        let limits = device.limits();
        let mut layout_cache = DescriptorLayoutCache::new();

        // Same structure as every program's texture set, so the layouts are shared
        let texture_layout = layout_cache.get_or_create(
            device.as_ref(),
            &[vec![DescriptorBinding {
                binding: 0,
                descriptor_type: DescriptorType::CombinedImageSampler,
                count: 1,
                stages: ShaderStageFlags::ALL_GRAPHICS,
            }]],
            &[],
        )?;
        let texture_set_layout = texture_layout.set_layouts[0];
        let placeholders = Placeholders::new(device.as_ref(), texture_set_layout)?;
        let shadow_technique = ShadowTechnique::select(config.shadow_technique, &limits);
        let (width, height) = device.surface_extent();

        crate::engine_info!(
            "j4f::render",
            "Renderer context: {} frames in flight, dynamic capacity {}, surface {}x{}",
            device.frames_in_flight(), config.dynamic_buffer_capacity, width, height
        );

        Ok(Self {
            frame: Mutex::new(FrameState::new(device.frames_in_flight())),
            dynamic_buffers: Mutex::new(DynamicBufferCache::new(config.dynamic_buffer_capacity)),
            surface: Mutex::new(SurfaceState { width, height, vsync: config.vsync }),
            device,
            config,
            limits,
            shader_modules: Mutex::new(FxHashMap::default()),
            programs: Mutex::new(Vec::new()),
            next_program_id: AtomicU16::new(1),
            layout_cache: Mutex::new(layout_cache),
            pipeline_cache: Mutex::new(PipelineCache::new()),
            texture_set_layout,
            placeholders,
            shadow_technique,
            shadow_programs: Mutex::new(ShadowProgramRegistry::new()),
            pending_uploads: Mutex::new(Vec::new()),
            clock: Mutex::new(FrameClock::default()),
            statistics: Statistics::new(),
        })
    }

    // ===== ACCESSORS =====

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    pub fn texture_set_layout(&self) -> DescriptorSetLayoutHandle {
        self.texture_set_layout
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// Index of the frame being recorded
    pub fn current_frame(&self) -> u32 {
        lock(&self.frame).current()
    }

    pub fn frame_stage(&self, frame: u32) -> FrameStage {
        lock(&self.frame).stage(frame)
    }

    pub fn is_suspended(&self) -> bool {
        lock(&self.frame).is_suspended()
    }

    pub fn pipeline_count(&self) -> usize {
        lock(&self.pipeline_cache).len()
    }

    pub fn program_count(&self) -> usize {
        lock(&self.programs).len()
    }

    // ===== SHADERS AND PROGRAMS =====

    /// Load a SPIR-V file once per `(path, stage)`
    pub fn shader_module_from_file(&self, path: impl AsRef<Path>, stage: ShaderStage) -> Result<Arc<dyn ShaderModule>> {
        let key = (path.as_ref().to_path_buf(), stage);
        if let Some(module) = lock(&self.shader_modules).get(&key) {
            return Ok(Arc::clone(module));
        }

        let code = std::fs::read(&key.0).map_err(|e| {
            crate::engine_warn_err!("j4f::program", "Cannot read shader '{}': {}", key.0.display(), e)
        })?;
        let module = self.device.create_shader_module(&code, stage)?;
        crate::engine_debug!("j4f::program", "Shader '{}' ({:?}) loaded", key.0.display(), stage);

        Ok(Arc::clone(lock(&self.shader_modules).entry(key).or_insert(module)))
    }

    pub fn shader_module_from_bytes(&self, code: &[u8], stage: ShaderStage) -> Result<Arc<dyn ShaderModule>> {
        self.device.create_shader_module(code, stage)
    }

    /// Build a program from its stages and register it
    pub fn create_program(&self, stages: Vec<Arc<dyn ShaderModule>>) -> Result<Arc<GpuProgram>> {
        let id = self.next_program_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| id.checked_add(1))
            .map_err(|_| {
                crate::engine_error!("j4f::program", "Program id space exhausted");
                Error::CapacityExhausted { capacity: u16::MAX as u32 }
            })?;

        let mut layouts = lock(&self.layout_cache);
        let mut dynamics = lock(&self.dynamic_buffers);
        let program = Arc::new(GpuProgram::new(id, stages, self.device.as_ref(), &mut layouts, &mut dynamics)?);
        lock(&self.programs).push(Arc::clone(&program));
        Ok(program)
    }

    /// Pipeline for `program` and `state` on the current main render pass
    pub fn get_graphics_pipeline(
        &self,
        program: &Arc<GpuProgram>,
        state: &PipelineState,
        vertex_layout: &VertexLayout,
    ) -> Result<Arc<GraphicsPipeline>> {
        let render_pass = self.device.main_render_pass();
        lock(&self.pipeline_cache).get_or_create(self.device.as_ref(), program, state, vertex_layout, render_pass)
    }

    // ===== SHADOWS =====

    pub fn shadow_technique(&self) -> ShadowTechnique {
        self.shadow_technique
    }

    pub fn shadow_passes(&self) -> u32 {
        self.shadow_technique.passes(self.config.shadow_cascades)
    }

    pub fn shadow_instance_multiplier(&self) -> u32 {
        self.shadow_technique.instance_multiplier(self.config.shadow_cascades)
    }

    pub fn register_shadow_program(&self, kind: RenderableKind, program: Arc<GpuProgram>) {
        if lock(&self.shadow_programs).register(kind, program).is_some() {
            crate::engine_debug!("j4f::render", "Shadow program for {:?} replaced", kind);
        }
    }

    pub fn shadow_program(&self, kind: RenderableKind) -> Option<Arc<GpuProgram>> {
        lock(&self.shadow_programs).get(kind).cloned()
    }

    // ===== TEXTURES =====

    /// Create a texture and its descriptor set
    ///
    /// With `deferred` the upload runs in the next `begin_frame`; until then
    /// draws sample the placeholder. Otherwise the texture is uploaded now.
    pub fn create_texture(&self, desc: &TextureDesc, data: TextureData, deferred: bool) -> Result<Arc<GpuTexture>> {
        let texture = self.device.create_texture(desc)?;
        let view = match desc.texture_type {
            TextureType::Array2D => ImageViewKind::Array2D,
            _ => ImageViewKind::Default,
        };
        let gpu = Arc::new(GpuTexture::new(self.device.as_ref(), texture, self.texture_set_layout, view)?);

        if deferred {
            lock(&self.pending_uploads).push(PendingUpload { texture: Arc::clone(&gpu), data });
            return Ok(gpu);
        }
        match self.device.upload_texture(gpu.texture().as_ref(), &data) {
            Ok(()) => {
                gpu.set_state(TextureState::Ready);
                Ok(gpu)
            }
            Err(e) => {
                gpu.set_state(TextureState::Failed);
                Err(e)
            }
        }
    }

    /// Texture from raw pixels, the format deduced from `bits_per_pixel`
    #[allow(clippy::too_many_arguments)]
    pub fn create_texture_from_pixels(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        layers: u32,
        bits_per_pixel: u32,
        generate_mipmaps: bool,
        deferred: bool,
    ) -> Result<Arc<GpuTexture>> {
        let Some(format) = TextureFormat::from_bits_per_pixel(bits_per_pixel) else {
            crate::engine_bail_warn!("j4f::render", "Unsupported pixel size: {} bits", bits_per_pixel);
        };
        let layers = layers.max(1);
        let desc = TextureDesc {
            width,
            height,
            array_layers: layers,
            format,
            texture_type: if layers > 1 { TextureType::Array2D } else { TextureType::Tex2D },
            generate_mipmaps,
            sampler: SamplerType::LinearRepeat,
        };

        let layer_size = desc.layer_size();
        if pixels.len() != layer_size * layers as usize {
            crate::engine_bail_warn!(
                "j4f::render",
                "Pixel data is {} bytes, expected {} ({} layers of {})",
                pixels.len(), layer_size * layers as usize, layers, layer_size
            );
        }
        let data = if layers == 1 {
            TextureData::Single(pixels)
        } else {
            TextureData::Layers(
                pixels.chunks(layer_size)
                    .enumerate()
                    .map(|(layer, bytes)| TextureLayerData { layer: layer as u32, data: bytes.to_vec() })
                    .collect(),
            )
        };
        self.create_texture(&desc, data, deferred)
    }

    pub fn pending_upload_count(&self) -> usize {
        lock(&self.pending_uploads).len()
    }

    // ===== DEFERRED DESTRUCTION =====

    /// Keep `buffer` alive until the current frame index is reused
    pub fn retire_buffer(&self, buffer: Arc<dyn Buffer>) {
        lock(&self.frame).retire(Retired::Buffer(buffer));
    }

    pub fn retire_texture(&self, texture: Arc<GpuTexture>) {
        lock(&self.frame).retire(Retired::Texture(texture));
    }

    // ===== FRAME LOOP =====

    /// Start recording the current frame
    ///
    /// Returns `None` while the loop is suspended or when the frame fence
    /// could not be waited on.
    pub fn begin_frame(&self) -> Result<Option<Box<dyn CommandList>>> {
        let mut frame_state = lock(&self.frame);
        if frame_state.is_suspended() {
            return Ok(None);
        }
        let frame = frame_state.current();

        frame_state.set_stage(FrameStage::WaitingFence);
        if let Err(e) = self.device.wait_frame_fence(frame) {
            crate::engine_error!("j4f::frame", "Frame {} fence wait failed: {}", frame, e);
            frame_state.set_stage(FrameStage::Idle);
            return Ok(None);
        }

        lock(&self.dynamic_buffers).reset_all();
        let retired = frame_state.drain(frame);
        if retired > 0 {
            crate::engine_trace!("j4f::frame", "Frame {}: {} retired objects released", frame, retired);
        }
        self.run_pending_uploads();

        let commands = match self.device.begin_frame_commands(frame) {
            Ok(commands) => commands,
            Err(e) => {
                if let Err(restore) = self.device.restore_frame_fence(frame) {
                    crate::engine_error!("j4f::frame", "Frame {}: fence restore failed: {}", frame, restore);
                }
                frame_state.set_stage(FrameStage::Idle);
                return Err(e);
            }
        };
        frame_state.set_stage(FrameStage::Recording);
        lock(&self.clock).begin = Some(Instant::now());
        Ok(Some(commands))
    }

    fn run_pending_uploads(&self) {
        let uploads = std::mem::take(&mut *lock(&self.pending_uploads));
        for upload in uploads {
            match self.device.upload_texture(upload.texture.texture().as_ref(), &upload.data) {
                Ok(()) => upload.texture.set_state(TextureState::Ready),
                Err(e) => {
                    crate::engine_error!("j4f::frame", "Deferred texture upload failed: {}", e);
                    upload.texture.set_state(TextureState::Failed);
                }
            }
        }
    }

    /// Submit and present the frame recorded in `commands`
    ///
    /// Acquire and present failures are logged and the frame index still
    /// advances. Device loss suspends the loop and is returned.
    pub fn end_frame(&self, commands: Box<dyn CommandList>) -> Result<()> {
        drop(commands);
        let mut frame_state = lock(&self.frame);
        let frame = frame_state.current();
        self.record_frame_time();

        let image = match self.device.acquire_next_image(frame) {
            Ok(AcquireResult::Acquired(image)) => image,
            Ok(AcquireResult::Suboptimal(image)) => {
                crate::engine_debug!("j4f::frame", "Suboptimal swapchain image {}", image);
                image
            }
            other => {
                match other {
                    Err(e) => crate::engine_warn!("j4f::frame", "Frame {}: acquire failed: {}", frame, e),
                    _ => crate::engine_debug!("j4f::frame", "Frame {}: swapchain out of date", frame),
                }
                if let Err(e) = self.device.restore_frame_fence(frame) {
                    crate::engine_error!("j4f::frame", "Frame {}: fence restore failed: {}", frame, e);
                }
                frame_state.set_stage(FrameStage::Idle);
                frame_state.advance();
                return Ok(());
            }
        };

        if let Err(e) = self.device.submit_frame(frame, image) {
            frame_state.set_stage(FrameStage::Idle);
            if e == Error::DeviceLost {
                crate::engine_error!("j4f::frame", "Device lost while submitting frame {}", frame);
                frame_state.mark_device_lost();
                return Err(e);
            }
            crate::engine_error!("j4f::frame", "Frame {}: submit failed: {}", frame, e);
            if let Err(e) = self.device.restore_frame_fence(frame) {
                crate::engine_error!("j4f::frame", "Frame {}: fence restore failed: {}", frame, e);
            }
            frame_state.advance();
            return Err(e);
        }
        frame_state.set_stage(FrameStage::Submitted);

        match self.device.present_frame(frame, image) {
            Ok(PresentResult::Presented) => {}
            Ok(PresentResult::Suboptimal) => crate::engine_debug!("j4f::frame", "Present suboptimal"),
            Ok(PresentResult::OutOfDate) => crate::engine_debug!("j4f::frame", "Present out of date"),
            Err(e) => crate::engine_warn!("j4f::frame", "Frame {}: present failed: {}", frame, e),
        }
        frame_state.advance();
        Ok(())
    }

    fn record_frame_time(&self) {
        let now = Instant::now();
        let mut clock = lock(&self.clock);
        if let Some(begin) = clock.begin.take() {
            self.statistics.add_frame_prepare_time((now - begin).as_secs_f64());
        }
        if let Some(last) = clock.last_end.replace(now) {
            self.statistics.next_frame((now - last).as_secs_f64());
        }
    }

    /// Resize (or minimize with a zero extent) the surface
    pub fn resize(&self, width: u32, height: u32, vsync: bool) -> Result<()> {
        let requested = SurfaceState { width, height, vsync };
        let mut surface = lock(&self.surface);
        let mut frame_state = lock(&self.frame);
        if *surface == requested && (!frame_state.is_suspended() || width == 0 || height == 0) {
            return Ok(());
        }

        self.device.wait_idle()?;
        frame_state.drain_all();
        frame_state.suspend();
        *surface = requested;

        if width == 0 || height == 0 {
            crate::engine_info!("j4f::frame", "Surface minimized, frame loop suspended");
            return Ok(());
        }

        self.device.recreate_surface(width, height, vsync)?;
        frame_state.resume();
        frame_state.reset_index();
        crate::engine_info!("j4f::frame", "Surface resized to {}x{} (vsync {})", width, height, vsync);
        Ok(())
    }

    /// Forward the window events the renderer reacts to
    pub fn on_window_event(&self, event: &WindowEvent) -> Result<()> {
        match event {
            WindowEvent::Resized(size) => {
                let vsync = lock(&self.surface).vsync;
                self.resize(size.width, size.height, vsync)
            }
            _ => Ok(()),
        }
    }
}

impl Drop for RendererContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            crate::engine_error!("j4f::render", "wait_idle failed during shutdown: {}", e);
        }
        let frame_state = self.frame.get_mut().unwrap_or_else(PoisonError::into_inner);
        frame_state.drain_all();
        self.pending_uploads.get_mut().unwrap_or_else(PoisonError::into_inner).clear();

        self.pipeline_cache.get_mut().unwrap_or_else(PoisonError::into_inner).destroy(self.device.as_ref());
        self.layout_cache.get_mut().unwrap_or_else(PoisonError::into_inner).destroy(self.device.as_ref());
        self.dynamic_buffers.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        crate::engine_debug!("j4f::render", "Renderer context destroyed");
    }
}

#[cfg(test)]
#[path = "renderer_context_tests.rs"]
mod tests;
