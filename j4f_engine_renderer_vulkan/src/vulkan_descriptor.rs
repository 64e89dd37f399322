/// Descriptor pools, set layouts and pipeline layouts

use j4f_engine::j4f::Result;
use j4f_engine::j4f::render::{
    DescriptorBinding, DescriptorType, PushConstantRange, ShaderStageFlags,
};
use j4f_engine::{engine_err, engine_info};
use ash::vk;

/// Descriptors per type and sets per pool
const POOL_SIZES: [(vk::DescriptorType, u32); 5] = [
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2048),
    (vk::DescriptorType::UNIFORM_BUFFER, 1024),
    (vk::DescriptorType::STORAGE_BUFFER, 1024),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1024),
    (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 512),
];
const POOL_MAX_SETS: u32 = 1024;

pub(crate) fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        DescriptorType::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    }
}

pub(crate) fn stage_flags_to_vk(flags: ShaderStageFlags) -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::from_raw(flags.bits())
}

/// Growable list of descriptor pools
///
/// Sets are never freed individually; the pools are destroyed with the device.
pub(crate) struct DescriptorPools {
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorPools {
    pub(crate) fn new(device: &ash::Device) -> Result<Self> {
        Ok(Self { pools: vec![create_pool(device)?] })
    }

    pub(crate) fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Allocate `count` sets of `layout`
    ///
    /// Tries the newest pool first, then the older ones, then grows.
    pub(crate) fn allocate(&mut self, device: &ash::Device, layout: vk::DescriptorSetLayout, count: u32) -> Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count as usize];
        for &pool in self.pools.iter().rev() {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
                Ok(sets) => return Ok(sets),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => continue,
                Err(e) => return Err(engine_err!("j4f::vulkan", "Failed to allocate descriptor sets: {:?}", e)),
            }
        }

        let pool = create_pool(device)?;
        self.pools.push(pool);
        engine_info!("j4f::vulkan", "Descriptor pools exhausted, created pool #{}", self.pools.len());

        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        unsafe { device.allocate_descriptor_sets(&allocate_info) }
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to allocate descriptor sets after pool growth: {:?}", e))
    }

    pub(crate) fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }
}

fn create_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let sizes: Vec<vk::DescriptorPoolSize> = POOL_SIZES.iter()
        .map(|&(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect();
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(POOL_MAX_SETS)
        .pool_sizes(&sizes);
    unsafe { device.create_descriptor_pool(&create_info, None) }
        .map_err(|e| engine_err!("j4f::vulkan", "Failed to create descriptor pool: {:?}", e))
}

pub(crate) fn create_set_layout(device: &ash::Device, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings.iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(b.binding)
                .descriptor_type(descriptor_type_to_vk(b.descriptor_type))
                .descriptor_count(b.count)
                .stage_flags(stage_flags_to_vk(b.stages))
        })
        .collect();
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
    unsafe { device.create_descriptor_set_layout(&create_info, None) }
        .map_err(|e| engine_err!("j4f::vulkan", "Failed to create descriptor set layout: {:?}", e))
}

pub(crate) fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constants: &[PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let ranges: Vec<vk::PushConstantRange> = push_constants.iter()
        .map(|r| vk::PushConstantRange {
            stage_flags: stage_flags_to_vk(r.stages),
            offset: r.offset,
            size: r.size,
        })
        .collect();
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(&ranges);
    unsafe { device.create_pipeline_layout(&create_info, None) }
        .map_err(|e| engine_err!("j4f::vulkan", "Failed to create pipeline layout: {:?}", e))
}
