//! Unit tests for layout_cache.rs

use std::sync::Arc;
use crate::program::layout_cache::*;
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::graphics_device::{DescriptorBinding, DescriptorType, PushConstantRange, ShaderStageFlags};

fn binding(binding: u32, descriptor_type: DescriptorType, stages: ShaderStageFlags) -> DescriptorBinding {
    DescriptorBinding { binding, descriptor_type, count: 1, stages }
}

fn camera_set() -> Vec<DescriptorBinding> {
    vec![binding(0, DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX)]
}

fn object_set() -> Vec<DescriptorBinding> {
    vec![binding(0, DescriptorType::UniformBufferDynamic, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT)]
}

fn texture_set() -> Vec<DescriptorBinding> {
    vec![binding(0, DescriptorType::CombinedImageSampler, ShaderStageFlags::ALL_GRAPHICS)]
}

// ============================================================================
// FINGERPRINTS
// ============================================================================

#[test]
fn test_binding_fingerprint_packs_fields() {
    let fp = binding_fingerprint(&binding(3, DescriptorType::UniformBufferDynamic, ShaderStageFlags::FRAGMENT));
    assert_eq!(fp & 0xFFFF_FFFF, 3);
    assert_eq!((fp >> 32) & 0xFFFF_FFFF, 1);
    assert_eq!((fp >> 64) & 0xFFFF_FFFF, ShaderStageFlags::FRAGMENT.bits() as u128);
    assert_eq!(fp >> 96, DescriptorType::UniformBufferDynamic as u128);
}

#[test]
fn test_high_binding_numbers_do_not_collide() {
    let low = binding(0, DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX);
    let high = binding(256, DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX);
    assert_ne!(binding_fingerprint(&low), binding_fingerprint(&high));

    let one = DescriptorBinding { count: 1, ..low };
    let wide = DescriptorBinding { count: 0x1_0001, ..low };
    assert_ne!(binding_fingerprint(&one), binding_fingerprint(&wide));
}

#[test]
fn test_high_binding_set_is_not_reused_for_binding_zero() {
    let device = MockGraphicsDevice::new();
    let mut cache = DescriptorLayoutCache::new();
    let low = vec![binding(0, DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX)];
    let high = vec![binding(256, DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX)];

    let a = cache.get_or_create(&device, &[low], &[]).unwrap();
    let b = cache.get_or_create(&device, &[high], &[]).unwrap();
    assert_ne!(a.set_layouts[0], b.set_layouts[0]);
    assert_eq!(device.counters().set_layouts, 2);
}

#[test]
fn test_push_constant_fingerprint_differs_by_size() {
    let a = PushConstantRange { stages: ShaderStageFlags::VERTEX, offset: 0, size: 64 };
    let b = PushConstantRange { size: 80, ..a };
    assert_ne!(push_constant_fingerprint(&a), push_constant_fingerprint(&b));
}

// ============================================================================
// CACHE BEHAVIOR
// ============================================================================

#[test]
fn test_identical_request_returns_same_layout() {
    let device = MockGraphicsDevice::new();
    let mut cache = DescriptorLayoutCache::new();
    let push = [PushConstantRange { stages: ShaderStageFlags::VERTEX, offset: 0, size: 64 }];

    let first = cache.get_or_create(&device, &[camera_set(), object_set()], &push).unwrap();
    let counters = device.counters();
    let second = cache.get_or_create(&device, &[camera_set(), object_set()], &push).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(device.counters(), counters);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_partial_match_reuses_set_layouts() {
    let device = MockGraphicsDevice::new();
    let mut cache = DescriptorLayoutCache::new();

    let a = cache.get_or_create(&device, &[camera_set(), object_set()], &[]).unwrap();
    assert_eq!(device.counters().set_layouts, 2);

    // set 0 matches a's set 0, set 1 matches nothing
    let b = cache.get_or_create(&device, &[camera_set(), texture_set()], &[]).unwrap();
    assert_eq!(device.counters().set_layouts, 3);
    assert_eq!(device.counters().pipeline_layouts, 2);
    assert_eq!(a.set_layouts[0], b.set_layouts[0]);
    assert_ne!(a.set_layouts[1], b.set_layouts[1]);

    // set layouts reused from a different position
    let c = cache.get_or_create(&device, &[texture_set(), object_set()], &[]).unwrap();
    assert_eq!(device.counters().set_layouts, 3);
    assert_eq!(c.set_layouts[0], b.set_layouts[1]);
    assert_eq!(c.set_layouts[1], a.set_layouts[1]);
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_push_constants_distinguish_entries() {
    let device = MockGraphicsDevice::new();
    let mut cache = DescriptorLayoutCache::new();
    let push = [PushConstantRange { stages: ShaderStageFlags::VERTEX, offset: 0, size: 16 }];

    let a = cache.get_or_create(&device, &[camera_set()], &[]).unwrap();
    let b = cache.get_or_create(&device, &[camera_set()], &push).unwrap();
    assert_ne!(a.pipeline_layout, b.pipeline_layout);
    assert_eq!(a.set_layouts, b.set_layouts);
}

#[test]
fn test_destroy_releases_shared_set_layouts_once() {
    let device = MockGraphicsDevice::new();
    let mut cache = DescriptorLayoutCache::new();
    cache.get_or_create(&device, &[camera_set(), object_set()], &[]).unwrap();
    cache.get_or_create(&device, &[camera_set(), texture_set()], &[]).unwrap();

    cache.destroy(&device);
    let counters = device.counters();
    assert_eq!(counters.destroyed_pipeline_layouts, 2);
    assert_eq!(counters.destroyed_set_layouts, 3);
    assert!(cache.is_empty());
}
