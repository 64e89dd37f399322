//! Integration tests for RendererContext on a real Vulkan device
//!
//! All tests require a GPU and are marked with #[ignore]. They share one
//! device and run serially because they drive its frame loop.
//!
//! Run with: cargo test --test renderer_context_integration_tests -- --ignored

mod gpu_test_utils;

use gpu_test_utils::get_test_device;
use j4f_engine::j4f::RendererContext;
use j4f_engine::j4f::draw::{Placeholders, TextureState};
use j4f_engine::j4f::frame::FrameStage;
use j4f_engine::j4f::render::{
    Buffer as _, BufferDesc, BufferUsage, Config, GraphicsDevice, SamplerType, TextureData, TextureDesc,
    TextureFormat, TextureType,
};
use serial_test::serial;
use std::sync::Arc;

fn create_context() -> RendererContext {
    let device: Arc<dyn GraphicsDevice> = get_test_device();
    RendererContext::new(device, Config { frames_in_flight: 2, ..Config::default() }).unwrap()
}

fn rgba_desc(width: u32, height: u32) -> TextureDesc {
    TextureDesc {
        width,
        height,
        array_layers: 1,
        format: TextureFormat::R8G8B8A8_UNORM,
        texture_type: TextureType::Tex2D,
        generate_mipmaps: false,
        sampler: SamplerType::LinearClamp,
    }
}

fn run_empty_frame(context: &RendererContext) {
    if let Some(commands) = context.begin_frame().unwrap() {
        context.end_frame(commands).unwrap();
    }
}

// ============================================================================
// CONTEXT CREATION
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_context_creation_builds_placeholders() {
    let context = create_context();
    let placeholders: &Placeholders = context.placeholders();

    assert!(placeholders.texture_2d.is_ready());
    assert!(placeholders.texture_2d_array.is_ready());
    assert!(!context.texture_set_layout().is_null());
    assert_eq!(context.current_frame(), 0);
    assert!(!context.is_suspended());
}

// ============================================================================
// TEXTURES
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_immediate_texture_upload_is_ready() {
    let context = create_context();
    let texture = context
        .create_texture(&rgba_desc(4, 4), TextureData::Single(vec![200u8; 64]), false)
        .unwrap();

    assert_eq!(texture.state(), TextureState::Ready);
    assert!(!texture.descriptor_set().is_null());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_deferred_texture_upload_runs_in_begin_frame() {
    let context = create_context();
    let texture = context
        .create_texture(&rgba_desc(8, 8), TextureData::Single(vec![10u8; 256]), true)
        .unwrap();

    assert_eq!(texture.state(), TextureState::Pending);
    assert_eq!(context.pending_upload_count(), 1);

    run_empty_frame(&context);

    assert_eq!(context.pending_upload_count(), 0);
    assert_eq!(texture.state(), TextureState::Ready);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_deferred_upload_failure_marks_texture_failed() {
    let context = create_context();
    // Wrong byte count: the upload fails when it finally runs
    let texture = context
        .create_texture(&rgba_desc(8, 8), TextureData::Single(vec![0u8; 3]), true)
        .unwrap();

    run_empty_frame(&context);
    assert_eq!(texture.state(), TextureState::Failed);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_texture_from_pixels_layers() {
    let context = create_context();
    let pixels = vec![0u8; 4 * 4 * 4 * 3];
    let texture = context.create_texture_from_pixels(pixels, 4, 4, 3, 32, false, false).unwrap();

    assert_eq!(texture.info().array_layers, 3);
    assert_eq!(texture.info().texture_type, TextureType::Array2D);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_texture_from_pixels_rejects_bad_size() {
    let context = create_context();
    assert!(context.create_texture_from_pixels(vec![0u8; 7], 4, 4, 1, 32, false, false).is_err());
    assert!(context.create_texture_from_pixels(vec![0u8; 48], 4, 4, 1, 24, false, false).is_err());
}

// ============================================================================
// FRAME LOOP
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_frame_loop_advances_frame_index() {
    let context = create_context();
    let frames = context.device().frames_in_flight();

    for expected in 0..frames * 2 {
        assert_eq!(context.current_frame(), expected % frames);
        run_empty_frame(&context);
    }
    assert_ne!(context.frame_stage(context.current_frame()), FrameStage::Recording);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_retired_buffer_survives_until_frame_reuse() {
    let context = create_context();
    let buffer = context
        .device()
        .create_buffer(BufferDesc { size: 64, usage: BufferUsage::Uniform })
        .unwrap();
    let weak = Arc::downgrade(&buffer);

    context.retire_buffer(buffer);
    assert!(weak.upgrade().is_some());

    for _ in 0..=context.device().frames_in_flight() {
        run_empty_frame(&context);
    }
    assert!(weak.upgrade().is_none());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_minimize_suspends_and_resize_resumes() {
    let context = create_context();

    context.resize(0, 0, true).unwrap();
    assert!(context.is_suspended());
    assert!(context.begin_frame().unwrap().is_none());

    context.resize(800, 600, true).unwrap();
    assert!(!context.is_suspended());
    assert_eq!(context.current_frame(), 0);
    run_empty_frame(&context);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_buffer_size_through_context_device() {
    let context = create_context();
    let buffer = context
        .device()
        .create_buffer(BufferDesc { size: 512, usage: BufferUsage::Storage })
        .unwrap();
    assert_eq!(buffer.size(), 512);
}
