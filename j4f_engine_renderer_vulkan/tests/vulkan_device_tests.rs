//! Tests for the VulkanGraphicsDevice backend
//!
//! These tests verify that VulkanGraphicsDevice correctly implements the GraphicsDevice trait.
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_device_tests -- --ignored

use j4f_engine::j4f::Error;
use j4f_engine::j4f::render::{
    AcquireResult, Buffer as _, BufferDesc, BufferUsage, Config, DescriptorBinding, DescriptorType,
    GraphicsDevice, ImageViewKind, PresentResult, PushConstantRange, SamplerType, ShaderStage,
    ShaderStageFlags, Texture as _, TextureData, TextureDesc, TextureFormat, TextureLayerData, TextureType,
};
use j4f_engine_renderer_vulkan::j4f::VulkanGraphicsDevice;
use serial_test::serial;
use std::sync::{Arc, OnceLock};
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

static DEVICE: OnceLock<Arc<VulkanGraphicsDevice>> = OnceLock::new();
static WINDOW: OnceLock<Window> = OnceLock::new();

/// One hidden window and device per test process
#[allow(deprecated)]
fn device() -> Arc<VulkanGraphicsDevice> {
    DEVICE
        .get_or_init(|| {
            let event_loop: EventLoop<()> = {
                #[cfg(target_os = "windows")]
                {
                    EventLoopBuilder::new().with_any_thread(true).build().unwrap()
                }
                #[cfg(not(target_os = "windows"))]
                {
                    EventLoopBuilder::new().build().unwrap()
                }
            };
            let attributes = Window::default_attributes()
                .with_title("Vulkan GraphicsDevice Test")
                .with_inner_size(winit::dpi::LogicalSize::new(800, 600))
                .with_visible(false);
            let window = event_loop.create_window(attributes).unwrap();

            let config = Config { frames_in_flight: 2, ..Config::default() };
            let device = VulkanGraphicsDevice::new(&window, config).unwrap();

            std::mem::forget(event_loop);
            WINDOW.set(window).ok();
            Arc::new(device)
        })
        .clone()
}

fn texture_desc(width: u32, height: u32, layers: u32, texture_type: TextureType) -> TextureDesc {
    TextureDesc {
        width,
        height,
        array_layers: layers,
        format: TextureFormat::R8G8B8A8_UNORM,
        texture_type,
        generate_mipmaps: false,
        sampler: SamplerType::LinearRepeat,
    }
}

// ============================================================================
// QUERY TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_limits() {
    let device = device();
    let limits = device.limits();

    assert!(limits.max_push_constants_size >= 128);
    assert!(limits.min_uniform_offset_alignment.is_power_of_two());
    assert!(limits.min_storage_offset_alignment.is_power_of_two());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_frames_in_flight_clamped() {
    let device = device();
    let frames = device.frames_in_flight();
    assert!((1..=2).contains(&frames));
}

// ============================================================================
// BUFFER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_buffer_update_and_read() {
    let device = device();
    let buffer = device.create_buffer(BufferDesc { size: 256, usage: BufferUsage::Uniform }).unwrap();
    assert_eq!(buffer.size(), 256);

    let data: Vec<u8> = (0..64).collect();
    buffer.update(64, &data).unwrap();

    let mut out = vec![0u8; 64];
    buffer.read(64, &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_buffer_update_out_of_range() {
    let device = device();
    let buffer = device.create_buffer(BufferDesc { size: 16, usage: BufferUsage::Storage }).unwrap();

    assert!(buffer.update(8, &[0u8; 16]).is_err());
}

// ============================================================================
// TEXTURE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_create_and_upload_texture() {
    let device = device();
    let texture = device.create_texture(&texture_desc(4, 4, 1, TextureType::Tex2D)).unwrap();

    let info = texture.info();
    assert_eq!(info.width, 4);
    assert_eq!(info.height, 4);
    assert_eq!(info.mip_levels, 1);

    let data: Vec<u8> = (0..64).collect();
    device.upload_texture(texture.as_ref(), &TextureData::Single(data)).unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_upload_with_mipmaps() {
    let device = device();
    let desc = TextureDesc { generate_mipmaps: true, ..texture_desc(64, 32, 1, TextureType::Tex2D) };
    let texture = device.create_texture(&desc).unwrap();
    assert_eq!(texture.info().mip_levels, 7);

    device.upload_texture(texture.as_ref(), &TextureData::Single(vec![255u8; 64 * 32 * 4])).unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_upload_array_layers() {
    let device = device();
    let texture = device.create_texture(&texture_desc(8, 8, 4, TextureType::Array2D)).unwrap();

    let layers = vec![
        TextureLayerData { layer: 0, data: vec![1u8; 256] },
        TextureLayerData { layer: 3, data: vec![2u8; 256] },
    ];
    device.upload_texture(texture.as_ref(), &TextureData::Layers(layers)).unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_upload_wrong_size_fails() {
    let device = device();
    let texture = device.create_texture(&texture_desc(4, 4, 1, TextureType::Tex2D)).unwrap();

    let result = device.upload_texture(texture.as_ref(), &TextureData::Single(vec![0u8; 10]));
    assert!(result.is_err());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_upload_layer_out_of_range_fails() {
    let device = device();
    let texture = device.create_texture(&texture_desc(4, 4, 2, TextureType::Array2D)).unwrap();

    let layers = vec![TextureLayerData { layer: 2, data: vec![0u8; 64] }];
    assert!(device.upload_texture(texture.as_ref(), &TextureData::Layers(layers)).is_err());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_cube_texture_needs_six_layers() {
    let device = device();

    assert!(device.create_texture(&texture_desc(16, 16, 6, TextureType::Cube)).is_ok());
    assert!(device.create_texture(&texture_desc(16, 16, 4, TextureType::Cube)).is_err());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_zero_size_texture_fails() {
    let device = device();
    assert!(device.create_texture(&texture_desc(0, 16, 1, TextureType::Tex2D)).is_err());
}

// ============================================================================
// SHADER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_shader_module_rejects_empty_code() {
    let device = device();
    let result = device.create_shader_module(&[], ShaderStage::Vertex);
    assert!(matches!(result, Err(Error::ReflectionFailed(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_shader_module_rejects_unaligned_code() {
    let device = device();
    let result = device.create_shader_module(&[0x03, 0x02, 0x23, 0x07, 0x00], ShaderStage::Fragment);
    assert!(matches!(result, Err(Error::ReflectionFailed(_))));
}

// ============================================================================
// DESCRIPTOR TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_descriptor_sets_and_writes() {
    let device = device();

    let bindings = [
        DescriptorBinding {
            binding: 0,
            descriptor_type: DescriptorType::UniformBufferDynamic,
            count: 1,
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
        },
        DescriptorBinding {
            binding: 1,
            descriptor_type: DescriptorType::CombinedImageSampler,
            count: 1,
            stages: ShaderStageFlags::FRAGMENT,
        },
    ];
    let set_layout = device.create_descriptor_set_layout(&bindings).unwrap();
    assert!(!set_layout.is_null());

    let push = [PushConstantRange { stages: ShaderStageFlags::VERTEX, offset: 0, size: 64 }];
    let pipeline_layout = device.create_pipeline_layout(&[set_layout], &push).unwrap();
    assert!(!pipeline_layout.is_null());

    let sets = device.allocate_descriptor_sets(set_layout, 2).unwrap();
    assert_eq!(sets.len(), 2);

    let buffer = device.create_buffer(BufferDesc { size: 1024, usage: BufferUsage::Uniform }).unwrap();
    let texture = device.create_texture(&texture_desc(2, 2, 1, TextureType::Tex2D)).unwrap();
    device.upload_texture(texture.as_ref(), &TextureData::Single(vec![128u8; 16])).unwrap();

    for set in &sets {
        device
            .write_buffer_descriptor(*set, 0, DescriptorType::UniformBufferDynamic, buffer.as_ref(), 0, 256)
            .unwrap();
        device.write_texture_descriptor(*set, 1, texture.as_ref(), ImageViewKind::Default).unwrap();
    }

    device.destroy_pipeline_layout(pipeline_layout);
    device.destroy_descriptor_set_layout(set_layout);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_descriptor_pool_grows_on_exhaustion() {
    let device = device();
    let bindings = [DescriptorBinding {
        binding: 0,
        descriptor_type: DescriptorType::StorageBuffer,
        count: 1,
        stages: ShaderStageFlags::VERTEX,
    }];
    let layout = device.create_descriptor_set_layout(&bindings).unwrap();

    let before = device.descriptor_pool_count();
    let sets = device.allocate_descriptor_sets(layout, 1100).unwrap();

    assert_eq!(sets.len(), 1100);
    assert!(device.descriptor_pool_count() > before);
    device.destroy_descriptor_set_layout(layout);
}

// ============================================================================
// FRAME TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_empty_frame_cycle() {
    let device = device();

    for frame in 0..device.frames_in_flight() {
        device.wait_frame_fence(frame).unwrap();
        let commands = device.begin_frame_commands(frame).unwrap();
        drop(commands);

        match device.acquire_next_image(frame).unwrap() {
            AcquireResult::Acquired(image) | AcquireResult::Suboptimal(image) => {
                device.submit_frame(frame, image).unwrap();
                let presented = device.present_frame(frame, image).unwrap();
                assert!(matches!(
                    presented,
                    PresentResult::Presented | PresentResult::Suboptimal | PresentResult::OutOfDate
                ));
            }
            AcquireResult::OutOfDate => {
                device.restore_frame_fence(frame).unwrap();
            }
        }
    }
    device.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_abandoned_frame_restores_fence() {
    let device = device();

    device.wait_frame_fence(0).unwrap();
    device.restore_frame_fence(0).unwrap();
    // Would time out if the fence were left unsignaled
    device.wait_frame_fence(0).unwrap();
    device.restore_frame_fence(0).unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_recreate_surface() {
    let device = device();
    let render_pass = device.main_render_pass();
    assert!(!render_pass.is_null());

    device.recreate_surface(640, 480, false).unwrap();
    let (width, height) = device.surface_extent();
    assert!(width > 0 && height > 0);
    assert!(!device.main_render_pass().is_null());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_frame_index_out_of_range() {
    let device = device();
    assert!(device.wait_frame_fence(99).is_err());
}
