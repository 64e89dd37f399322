/// SamplerCache - one VkSampler per SamplerType, created on first use

use j4f_engine::j4f::Result;
use j4f_engine::j4f::render::SamplerType;
use j4f_engine::{engine_debug, engine_err};
use ash::vk;
use rustc_hash::FxHashMap;

pub(crate) struct SamplerCache {
    samplers: FxHashMap<SamplerType, vk::Sampler>,
    max_anisotropy: f32,
}

/// Filter, mip mode, address mode, anisotropy, border and depth compare of a preset
struct SamplerPreset {
    filter: vk::Filter,
    mipmap: vk::SamplerMipmapMode,
    address: vk::SamplerAddressMode,
    anisotropic: bool,
    border: vk::BorderColor,
    compare: bool,
}

fn preset(sampler_type: SamplerType) -> SamplerPreset {
    let linear = SamplerPreset {
        filter: vk::Filter::LINEAR,
        mipmap: vk::SamplerMipmapMode::LINEAR,
        address: vk::SamplerAddressMode::REPEAT,
        anisotropic: false,
        border: vk::BorderColor::FLOAT_OPAQUE_BLACK,
        compare: false,
    };
    match sampler_type {
        SamplerType::LinearRepeat => linear,
        SamplerType::LinearClamp => SamplerPreset { address: vk::SamplerAddressMode::CLAMP_TO_EDGE, ..linear },
        SamplerType::NearestRepeat => SamplerPreset {
            filter: vk::Filter::NEAREST,
            mipmap: vk::SamplerMipmapMode::NEAREST,
            ..linear
        },
        SamplerType::NearestClamp => SamplerPreset {
            filter: vk::Filter::NEAREST,
            mipmap: vk::SamplerMipmapMode::NEAREST,
            address: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ..linear
        },
        SamplerType::Shadow => SamplerPreset {
            mipmap: vk::SamplerMipmapMode::NEAREST,
            address: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            border: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            compare: true,
            ..linear
        },
        SamplerType::Anisotropic => SamplerPreset { anisotropic: true, ..linear },
    }
}

impl SamplerCache {
    /// `max_anisotropy` of 1.0 or less disables anisotropic filtering
    pub(crate) fn new(max_anisotropy: f32) -> Self {
        Self { samplers: FxHashMap::default(), max_anisotropy }
    }

    pub(crate) fn get(&mut self, device: &ash::Device, sampler_type: SamplerType) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.samplers.get(&sampler_type) {
            return Ok(sampler);
        }

        let p = preset(sampler_type);
        let anisotropic = p.anisotropic && self.max_anisotropy > 1.0;
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(p.filter)
            .min_filter(p.filter)
            .mipmap_mode(p.mipmap)
            .address_mode_u(p.address)
            .address_mode_v(p.address)
            .address_mode_w(p.address)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(p.border)
            .compare_enable(p.compare)
            .compare_op(if p.compare { vk::CompareOp::LESS_OR_EQUAL } else { vk::CompareOp::ALWAYS })
            .anisotropy_enable(anisotropic)
            .max_anisotropy(if anisotropic { self.max_anisotropy.min(16.0) } else { 1.0 })
            .unnormalized_coordinates(false);

        let sampler = unsafe { device.create_sampler(&create_info, None) }
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to create {:?} sampler: {:?}", sampler_type, e))?;

        engine_debug!("j4f::vulkan", "Created {:?} sampler", sampler_type);
        self.samplers.insert(sampler_type, sampler);
        Ok(sampler)
    }

    /// Destroy every sampler (device still alive)
    pub(crate) fn destroy(&mut self, device: &ash::Device) {
        for (_, sampler) in self.samplers.drain() {
            unsafe { device.destroy_sampler(sampler, None) };
        }
    }
}
