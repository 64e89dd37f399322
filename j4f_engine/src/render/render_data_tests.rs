//! Unit tests for render_data.rs
//!
//! Draw items use the standard program: static camera (set 0), dynamic
//! object (set 1), texture (set 2), push constants `pc { model, tint }`.

use std::sync::Arc;
use glam::{Mat4, Vec3, Vec4};
use crate::render::render_data::*;
use crate::render::dynamic_buffer::DynamicBufferCache;
use crate::render::pipeline_cache::{GraphicsPipeline, PipelineCache};
use crate::render::texture::{GpuTexture, Placeholders, TextureState};
use crate::program::{DescriptorLayoutCache, GpuProgram};
use crate::frame::Statistics;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::*;

// ============================================================================
// HELPERS
// ============================================================================

struct Fixture {
    device: MockGraphicsDevice,
    texture_layout: DescriptorSetLayoutHandle,
    placeholders: Placeholders,
    pipeline: Arc<GraphicsPipeline>,
    stats: Statistics,
}

impl Fixture {
    fn new() -> Self {
        let device = MockGraphicsDevice::new();
        register_standard_shaders(&device);
        let stages = vec![
            device.create_shader_module(STANDARD_VS, ShaderStage::Vertex).unwrap(),
            device.create_shader_module(STANDARD_FS, ShaderStage::Fragment).unwrap(),
        ];
        let mut layouts = DescriptorLayoutCache::new();
        let mut dynamics = DynamicBufferCache::new(16);
        let program = Arc::new(GpuProgram::new(1, stages, &device, &mut layouts, &mut dynamics).unwrap());
        let pipeline = PipelineCache::new()
            .get_or_create(&device, &program, &PipelineState::default(), &VertexLayout::default(), device.main_render_pass())
            .unwrap();

        let texture_layout = device.create_descriptor_set_layout(&[DescriptorBinding {
            binding: 0,
            descriptor_type: DescriptorType::CombinedImageSampler,
            count: 1,
            stages: ShaderStageFlags::ALL_GRAPHICS,
        }]).unwrap();
        let placeholders = Placeholders::new(&device, texture_layout).unwrap();

        Self { device, texture_layout, placeholders, pipeline, stats: Statistics::new() }
    }

    fn item(&self) -> RenderData {
        let mut data = RenderData::new();
        data.set_pipeline(Some(Arc::clone(&self.pipeline)));
        data
    }

    fn texture(&self, state: TextureState) -> Arc<GpuTexture> {
        let desc = TextureDesc {
            width: 64,
            height: 64,
            array_layers: 1,
            format: TextureFormat::R8G8B8A8_SRGB,
            texture_type: TextureType::Tex2D,
            generate_mipmaps: false,
            sampler: SamplerType::LinearRepeat,
        };
        let texture = self.device.create_texture(&desc).unwrap();
        let gpu = GpuTexture::new(&self.device, texture, self.texture_layout, ImageViewKind::Default).unwrap();
        gpu.set_state(state);
        Arc::new(gpu)
    }
}

// ============================================================================
// TEXTURE SETS
// ============================================================================

#[test]
fn test_missing_texture_binds_placeholder() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.prepare_render(0, &fx.placeholders).unwrap();

    assert_eq!(data.external_sets()[2], fx.placeholders.texture_2d.descriptor_set());
    assert!(data.external_sets()[0].is_null());
}

#[test]
fn test_pending_texture_binds_placeholder() {
    let fx = Fixture::new();
    let mut data = fx.item();
    let texture = fx.texture(TextureState::Pending);
    data.set_texture("u_texture", Arc::clone(&texture)).unwrap();

    data.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(data.external_sets()[2], fx.placeholders.texture_2d.descriptor_set());

    texture.set_state(TextureState::Ready);
    data.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(data.external_sets()[2], texture.descriptor_set());
}

#[test]
fn test_failed_texture_keeps_placeholder() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.set_texture("u_texture", fx.texture(TextureState::Failed)).unwrap();
    data.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(data.external_sets()[2], fx.placeholders.texture_2d.descriptor_set());
}

// ============================================================================
// DYNAMIC BUFFERS
// ============================================================================

#[test]
fn test_one_slot_per_dynamic_buffer_per_draw() {
    let fx = Fixture::new();
    let buffer = Arc::clone(fx.pipeline.program().dynamic_buffer(0));
    let mut first = fx.item();
    first.set_param("mvp", &Mat4::IDENTITY).unwrap();
    first.set_param("color", &Vec3::new(1.0, 0.5, 0.25)).unwrap();
    first.set_param("intensity", &2.0f32).unwrap();

    first.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(buffer.current(), 1);
    assert_eq!(first.dynamic_offsets(), &[0]);

    let mut second = fx.item();
    second.set_param("intensity", &7.0f32).unwrap();
    second.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(buffer.current(), 2);
    assert_eq!(second.dynamic_offsets(), &[buffer.aligned_size()]);

    let mut out = [0u8; 4];
    buffer.read(0, 76, 0, &mut out).unwrap();
    assert_eq!(f32::from_ne_bytes(out), 2.0);
    buffer.read(1, 76, 0, &mut out).unwrap();
    assert_eq!(f32::from_ne_bytes(out), 7.0);
    buffer.read(0, 64, 0, &mut out).unwrap();
    assert_eq!(f32::from_ne_bytes(out), 1.0);
}

#[test]
fn test_writes_target_only_current_frame() {
    let fx = Fixture::new();
    let buffer = Arc::clone(fx.pipeline.program().dynamic_buffer(0));
    let mut data = fx.item();
    data.set_param("intensity", &3.0f32).unwrap();
    data.prepare_render(1, &fx.placeholders).unwrap();

    let mut out = [0u8; 4];
    buffer.read(0, 76, 1, &mut out).unwrap();
    assert_eq!(f32::from_ne_bytes(out), 3.0);
    buffer.read(0, 76, 0, &mut out).unwrap();
    assert_eq!(f32::from_ne_bytes(out), 0.0);
}

#[test]
fn test_dynamic_without_value_reuses_last_slot() {
    let fx = Fixture::new();
    let buffer = Arc::clone(fx.pipeline.program().dynamic_buffer(0));

    let mut empty = fx.item();
    empty.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(empty.dynamic_offsets(), &[0]);
    assert_eq!(buffer.current(), 0);

    for _ in 0..3 {
        let mut data = fx.item();
        data.set_param("intensity", &1.0f32).unwrap();
        data.prepare_render(0, &fx.placeholders).unwrap();
    }
    empty.prepare_render(0, &fx.placeholders).unwrap();
    assert_eq!(empty.dynamic_offsets(), &[2 * buffer.aligned_size()]);
    assert_eq!(buffer.current(), 3);
}

#[test]
fn test_capacity_exhaustion_propagates() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.set_param("intensity", &1.0f32).unwrap();
    for _ in 0..16 {
        data.prepare_render(0, &fx.placeholders).unwrap();
    }
    assert!(matches!(
        data.prepare_render(0, &fx.placeholders),
        Err(crate::error::Error::CapacityExhausted { capacity: 16 })
    ));
}

// ============================================================================
// STATIC BUFFERS AND PUSH CONSTANTS
// ============================================================================

#[test]
fn test_static_value_written_in_place() {
    let fx = Fixture::new();
    let mut data = fx.item();
    let view_proj = Mat4::from_scale(Vec3::splat(2.0));
    data.set_param("view_proj", &view_proj).unwrap();
    data.prepare_render(0, &fx.placeholders).unwrap();

    let mut out = [0u8; 64];
    fx.pipeline.program().static_buffer(0).read(0, &mut out).unwrap();
    assert_eq!(&out[..], bytemuck::bytes_of(&view_proj));
}

#[test]
fn test_push_constant_parts_staged_at_offsets() {
    let fx = Fixture::new();
    let mut data = fx.item();
    let tint = Vec4::new(0.1, 0.2, 0.3, 0.4);
    data.set_param("tint", &tint).unwrap();
    data.set_param("model", &Mat4::IDENTITY).unwrap();
    data.prepare_render(0, &fx.placeholders).unwrap();

    let range = fx.pipeline.program().push_constant_ranges()[0];
    let bytes = data.push_constants().range(&range);
    assert_eq!(bytes.len(), 80);
    assert_eq!(&bytes[..64], bytemuck::bytes_of(&Mat4::IDENTITY));
    assert_eq!(&bytes[64..], bytemuck::bytes_of(&tint));
}

// ============================================================================
// VALUE VALIDATION
// ============================================================================

#[test]
fn test_set_param_rejections() {
    let fx = Fixture::new();
    let mut data = fx.item();
    assert!(data.set_param("missing", &1.0f32).is_err());
    assert!(data.set_param("u_texture", &1.0f32).is_err());
    assert!(data.set_param("intensity", &Mat4::IDENTITY).is_err());
    assert!(data.set_texture("color", fx.texture(TextureState::Ready)).is_err());

    let mut detached = RenderData::new();
    assert!(detached.set_param("intensity", &1.0f32).is_err());
}

#[test]
fn test_clear_param() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.set_param("intensity", &1.0f32).unwrap();
    let id = fx.pipeline.program().param_by_name("intensity").unwrap().id;
    assert!(data.param(id).is_some());
    data.clear_param("intensity").unwrap();
    assert!(data.param(id).is_none());
}

// ============================================================================
// DRAW SUBMISSION
// ============================================================================

#[test]
fn test_render_records_binds_and_draws() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.vertex_buffer = Some(fx.device.create_buffer(BufferDesc { size: 1024, usage: BufferUsage::Vertex }).unwrap());
    data.index_buffer = Some(fx.device.create_buffer(BufferDesc { size: 256, usage: BufferUsage::Index }).unwrap());
    data.index_type = IndexType::U16;
    data.instance_count = 2;
    data.render_parts = vec![
        RenderPart { first_index: 0, index_count: 36, vertex_count: 24, ..RenderPart::default() },
        RenderPart { first_index: 36, index_count: 6, first_vertex: 24, vertex_count: 4, index_buffer_offset: 0, vertex_buffer_offset: 0 },
    ];
    data.set_param("intensity", &1.0f32).unwrap();
    data.prepare_render(1, &fx.placeholders).unwrap();

    let mut cmd = MockCommandList::new();
    let view = ViewParams { viewport: Some(Viewport::full(800, 600)), ..ViewParams::default() };
    let draws = data.render(&mut cmd, 1, &view, 3, &fx.stats).unwrap();
    assert_eq!(draws, 2);
    assert_eq!(fx.stats.pending_draw_calls(), 2);

    let program = fx.pipeline.program();
    let commands = cmd.commands.lock().unwrap().clone();
    assert_eq!(commands[0], MockCommand::BindPipeline(fx.pipeline.handle()));
    assert_eq!(commands[1], MockCommand::SetViewport(Viewport::full(800, 600)));
    assert_eq!(commands[2], MockCommand::BindDescriptorSets {
        layout: program.pipeline_layout(),
        first_set: 0,
        sets: vec![
            program.descriptor_set(0, 1).unwrap(),
            program.descriptor_set(1, 1).unwrap(),
            fx.placeholders.texture_2d.descriptor_set(),
        ],
        dynamic_offsets: vec![0],
    });
    assert!(matches!(commands[3], MockCommand::PushConstants { offset: 0, ref data, .. } if data.len() == 80));
    assert_eq!(commands[6], MockCommand::DrawIndexed {
        index_count: 36, instance_count: 6, first_index: 0, vertex_offset: 0, first_instance: 0,
    });
    assert_eq!(commands[9], MockCommand::DrawIndexed {
        index_count: 6, instance_count: 6, first_index: 36, vertex_offset: 24, first_instance: 0,
    });
}

#[test]
fn test_non_indexed_part_uses_draw() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.render_parts = vec![RenderPart { vertex_count: 3, ..RenderPart::default() }];
    data.prepare_render(0, &fx.placeholders).unwrap();

    let mut cmd = MockCommandList::new();
    data.render(&mut cmd, 0, &ViewParams::default(), 1, &fx.stats).unwrap();
    let commands = cmd.commands.lock().unwrap();
    assert_eq!(commands.last(), Some(&MockCommand::Draw {
        vertex_count: 3, instance_count: 1, first_vertex: 0, first_instance: 0,
    }));
}

#[test]
fn test_null_pipeline_is_skipped() {
    let fx = Fixture::new();
    let mut data = RenderData::new();
    data.render_parts = vec![RenderPart { vertex_count: 3, ..RenderPart::default() }];
    data.prepare_render(0, &fx.placeholders).unwrap();

    let mut cmd = MockCommandList::new();
    assert_eq!(data.render(&mut cmd, 0, &ViewParams::default(), 1, &fx.stats).unwrap(), 0);
    assert!(cmd.commands.lock().unwrap().is_empty());
    assert_eq!(fx.stats.pending_draw_calls(), 0);
}

#[test]
fn test_hidden_item_is_skipped() {
    let fx = Fixture::new();
    let mut data = fx.item();
    data.visible = false;
    data.render_parts = vec![RenderPart { vertex_count: 3, ..RenderPart::default() }];

    let mut cmd = MockCommandList::new();
    assert_eq!(data.render(&mut cmd, 0, &ViewParams::default(), 1, &fx.stats).unwrap(), 0);
    assert!(cmd.commands.lock().unwrap().is_empty());
}
