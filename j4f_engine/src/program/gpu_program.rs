/// GPU program: N shader modules merged into one parameter table
///
/// Construction merges the reflected bindings of every stage, assigns dense
/// parameter ids, sorts the table by `(type, set)`, fetches layouts from the
/// [`DescriptorLayoutCache`], creates the static buffers, takes dynamic
/// buffers from the [`DynamicBufferCache`] and writes the descriptor sets.
/// Combined-image-sampler sets are left to the draw (see `RenderData`).

use std::collections::BTreeMap;
use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, DescriptorBinding, DescriptorSetHandle, DescriptorType,
    GraphicsDevice, ImageType, PipelineLayoutHandle, PushConstantRange, ShaderModule,
    ShaderStageFlags,
};
use crate::program::layout_cache::{DescriptorLayoutCache, PipelineDescriptorLayout};
use crate::program::reflection::{describe_module, BindingDescription, PushConstantDescription};
use crate::render::dynamic_buffer::{DynamicBuffer, DynamicBufferCache};

/// Size of the per-draw push-constant staging area
pub const MAX_PUSH_CONSTANT_BYTES: u32 = 128;

/// Dynamic bindings per program (one bit each in the per-draw claim mask)
pub const MAX_DYNAMIC_BINDINGS: usize = 64;

/// Parameter kind; the discriminant order is the parameter sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ParamLayoutType {
    PushConstant = 0,
    CombinedImageSampler = 1,
    UniformBuffer = 2,
    StorageBuffer = 3,
    UniformBufferDynamic = 4,
    StorageBufferDynamic = 5,
    BufferPart = 6,
    BufferDynamicPart = 7,
    PushConstantPart = 8,
}

impl ParamLayoutType {
    fn whole(descriptor_type: DescriptorType) -> Self {
        match descriptor_type {
            DescriptorType::CombinedImageSampler => ParamLayoutType::CombinedImageSampler,
            DescriptorType::UniformBuffer => ParamLayoutType::UniformBuffer,
            DescriptorType::StorageBuffer => ParamLayoutType::StorageBuffer,
            DescriptorType::UniformBufferDynamic => ParamLayoutType::UniformBufferDynamic,
            DescriptorType::StorageBufferDynamic => ParamLayoutType::StorageBufferDynamic,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            ParamLayoutType::UniformBufferDynamic
                | ParamLayoutType::StorageBufferDynamic
                | ParamLayoutType::BufferDynamicPart
        )
    }

    pub fn is_push_constant(&self) -> bool {
        matches!(self, ParamLayoutType::PushConstant | ParamLayoutType::PushConstantPart)
    }
}

/// GPU object a parameter writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamResource {
    None,
    StaticBuffer(usize),
    DynamicBuffer(usize),
    PushConstant(usize),
}

/// One addressable shader parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLayoutInfo {
    /// Dense index into per-draw parameter arrays
    pub id: usize,
    pub name: String,
    pub set: u32,
    pub binding: u32,
    /// Offset inside the parent buffer / push-constant block
    pub offset: u32,
    pub size_in_bytes: u32,
    pub layout_type: ParamLayoutType,
    /// Whole-buffer / whole-block parameter of a `*Part`
    pub parent: Option<usize>,
    pub stages: ShaderStageFlags,
    pub push_constant_index: usize,
    pub dynamic_buffer_index: usize,
    pub image_type: Option<ImageType>,
    /// Only set on whole parameters, parts resolve through `parent`
    pub resource: ParamResource,
}

/// Per-draw push-constant bytes, indexed by absolute block offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstantStaging {
    bytes: [u8; MAX_PUSH_CONSTANT_BYTES as usize],
}

impl Default for PushConstantStaging {
    fn default() -> Self {
        Self { bytes: [0; MAX_PUSH_CONSTANT_BYTES as usize] }
    }
}

impl PushConstantStaging {
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let end = offset as usize + data.len();
        if end > self.bytes.len() {
            return Err(Error::PushConstantOverflow { size: end as u32, limit: MAX_PUSH_CONSTANT_BYTES });
        }
        self.bytes[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    /// Bytes of one push-constant range
    pub fn range(&self, range: &PushConstantRange) -> &[u8] {
        &self.bytes[range.offset as usize..(range.offset + range.size) as usize]
    }
}

/// Descriptor set of one set number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramDescriptorSet {
    /// Supplied per draw (texture sets)
    External,
    /// One copy, or one copy per in-flight frame when the set holds dynamic buffers
    Owned(Vec<DescriptorSetHandle>),
}

pub struct GpuProgram {
    id: u16,
    stages: Vec<Arc<dyn ShaderModule>>,
    layout: Arc<PipelineDescriptorLayout>,
    params: Vec<ParamLayoutInfo>,
    sorted: Vec<usize>,
    names: FxHashMap<String, usize>,
    sets: Vec<ProgramDescriptorSet>,
    push_constant_ranges: Vec<PushConstantRange>,
    static_buffers: Vec<Arc<dyn Buffer>>,
    dynamic_buffers: Vec<Arc<DynamicBuffer>>,
}

/// Bindings shared by several stages keep their first declaration
fn merge_bindings(modules: &[crate::program::reflection::ModuleLayout]) -> BTreeMap<(u32, u32), BindingDescription> {
    let mut merged: BTreeMap<(u32, u32), BindingDescription> = BTreeMap::new();
    for module in modules {
        for binding in &module.bindings {
            match merged.get_mut(&(binding.set, binding.binding)) {
                Some(existing) => {
                    if existing.descriptor_type != binding.descriptor_type
                        || existing.size_in_bytes != binding.size_in_bytes
                    {
                        crate::engine_debug!(
                            "j4f::program",
                            "Set {} binding {}: {:?} stage declares '{}' differently, first declaration kept",
                            binding.set, binding.binding, module.stage, binding.name
                        );
                    }
                    existing.stages |= binding.stages;
                }
                None => {
                    merged.insert((binding.set, binding.binding), binding.clone());
                }
            }
        }
    }
    merged
}

fn merge_push_constants(
    modules: &[crate::program::reflection::ModuleLayout],
    limit: u32,
) -> Result<Vec<PushConstantDescription>> {
    let mut merged: Vec<PushConstantDescription> = Vec::new();
    for module in modules {
        for pc in &module.push_constants {
            let end = pc.range.offset + pc.range.size;
            if end > limit {
                crate::engine_error!(
                    "j4f::program",
                    "Push constant block '{}' needs {} bytes, limit is {}", pc.name, end, limit
                );
                return Err(Error::PushConstantOverflow { size: end, limit });
            }
            match merged.iter_mut().find(|m| m.name == pc.name) {
                Some(existing) => existing.range.stages |= pc.range.stages,
                None => merged.push(pc.clone()),
            }
        }
    }
    Ok(merged)
}

/// Texture sets must hold exactly one sampler at binding 0
fn normalize_image_sets(bindings: &mut BTreeMap<(u32, u32), BindingDescription>) -> Result<()> {
    let image_sets: Vec<u32> = bindings.values()
        .filter(|b| b.descriptor_type == DescriptorType::CombinedImageSampler)
        .map(|b| b.set)
        .collect();
    for set in image_sets {
        let in_set = bindings.keys().filter(|(s, _)| *s == set).count();
        let Some(binding) = bindings.get_mut(&(set, 0)) else {
            crate::engine_bail_warn!("j4f::program", "Texture in set {} must use binding 0", set);
        };
        if in_set != 1 || binding.descriptor_type != DescriptorType::CombinedImageSampler {
            crate::engine_bail_warn!("j4f::program", "Texture set {} must contain a single sampler", set);
        }
        binding.stages = ShaderStageFlags::ALL_GRAPHICS;
    }
    Ok(())
}

impl GpuProgram {
    /// Build a program from its stage modules
    pub fn new(
        id: u16,
        stages: Vec<Arc<dyn ShaderModule>>,
        device: &dyn GraphicsDevice,
        layout_cache: &mut DescriptorLayoutCache,
        dynamic_cache: &mut DynamicBufferCache,
    ) -> Result<Self> {
        let limits = device.limits();
        let modules = stages.iter()
            .map(|m| describe_module(m.interface(), m.stage(), &limits))
            .collect::<Result<Vec<_>>>()?;

        let mut bindings = merge_bindings(&modules);
        normalize_image_sets(&mut bindings)?;
        let push_limit = MAX_PUSH_CONSTANT_BYTES.min(limits.max_push_constants_size);
        let push_constants = merge_push_constants(&modules, push_limit)?;

        // ===== PARAMETER TABLE =====

        let mut params: Vec<ParamLayoutInfo> = Vec::new();
        let mut dynamic_count = 0usize;
        for binding in bindings.values() {
            let layout_type = ParamLayoutType::whole(binding.descriptor_type);
            let dynamic_buffer_index = if layout_type.is_dynamic() {
                dynamic_count += 1;
                dynamic_count - 1
            } else {
                0
            };
            let whole_id = params.len();
            params.push(ParamLayoutInfo {
                id: whole_id,
                name: binding.name.clone(),
                set: binding.set,
                binding: binding.binding,
                offset: 0,
                size_in_bytes: binding.size_in_bytes,
                layout_type,
                parent: None,
                stages: binding.stages,
                push_constant_index: 0,
                dynamic_buffer_index,
                image_type: binding.image_type,
                resource: ParamResource::None,
            });
            let part_type = if layout_type.is_dynamic() { ParamLayoutType::BufferDynamicPart } else { ParamLayoutType::BufferPart };
            for member in &binding.members {
                params.push(ParamLayoutInfo {
                    id: params.len(),
                    name: member.name.clone(),
                    set: binding.set,
                    binding: binding.binding,
                    offset: member.offset,
                    size_in_bytes: member.size,
                    layout_type: part_type,
                    parent: Some(whole_id),
                    stages: binding.stages,
                    push_constant_index: 0,
                    dynamic_buffer_index,
                    image_type: None,
                    resource: ParamResource::None,
                });
            }
        }
        if dynamic_count > MAX_DYNAMIC_BINDINGS {
            crate::engine_bail_warn!(
                "j4f::program",
                "{} dynamic bindings, at most {} supported", dynamic_count, MAX_DYNAMIC_BINDINGS
            );
        }

        for (index, pc) in push_constants.iter().enumerate() {
            let whole_id = params.len();
            params.push(ParamLayoutInfo {
                id: whole_id,
                name: pc.name.clone(),
                set: 0,
                binding: 0,
                offset: pc.range.offset,
                size_in_bytes: pc.range.size,
                layout_type: ParamLayoutType::PushConstant,
                parent: None,
                stages: pc.range.stages,
                push_constant_index: index,
                dynamic_buffer_index: 0,
                image_type: None,
                resource: ParamResource::PushConstant(index),
            });
            for member in &pc.members {
                params.push(ParamLayoutInfo {
                    id: params.len(),
                    name: member.name.clone(),
                    set: 0,
                    binding: 0,
                    offset: member.offset,
                    size_in_bytes: member.size,
                    layout_type: ParamLayoutType::PushConstantPart,
                    parent: Some(whole_id),
                    stages: pc.range.stages,
                    push_constant_index: index,
                    dynamic_buffer_index: 0,
                    image_type: None,
                    resource: ParamResource::None,
                });
            }
        }

        let mut names = FxHashMap::default();
        for param in &params {
            if names.insert(param.name.clone(), param.id).is_some() {
                crate::engine_bail_warn!("j4f::program", "Duplicate parameter name '{}'", param.name);
            }
        }

        let mut sorted: Vec<usize> = (0..params.len()).collect();
        sorted.sort_by_key(|&i| (params[i].layout_type, params[i].set));

        // ===== LAYOUTS =====

        let set_count = bindings.keys().map(|(set, _)| set + 1).max().unwrap_or(0) as usize;
        let mut set_bindings: Vec<Vec<DescriptorBinding>> = vec![Vec::new(); set_count];
        for binding in bindings.values() {
            set_bindings[binding.set as usize].push(DescriptorBinding {
                binding: binding.binding,
                descriptor_type: binding.descriptor_type,
                count: binding.count,
                stages: binding.stages,
            });
        }
        let push_constant_ranges: Vec<PushConstantRange> = push_constants.iter().map(|pc| pc.range).collect();
        let layout = layout_cache.get_or_create(device, &set_bindings, &push_constant_ranges)?;

        // ===== BUFFERS =====

        let mut static_buffers: Vec<Arc<dyn Buffer>> = Vec::new();
        let mut dynamic_buffers: Vec<Arc<DynamicBuffer>> = Vec::with_capacity(dynamic_count);
        for param in params.iter_mut().filter(|p| p.parent.is_none()) {
            let usage = match param.layout_type {
                ParamLayoutType::UniformBuffer | ParamLayoutType::UniformBufferDynamic => BufferUsage::Uniform,
                ParamLayoutType::StorageBuffer | ParamLayoutType::StorageBufferDynamic => BufferUsage::Storage,
                _ => continue,
            };
            if param.layout_type.is_dynamic() {
                dynamic_buffers.push(dynamic_cache.get_or_create(device, param.size_in_bytes, usage)?);
                param.resource = ParamResource::DynamicBuffer(param.dynamic_buffer_index);
            } else {
                static_buffers.push(device.create_buffer(BufferDesc { size: param.size_in_bytes as u64, usage })?);
                param.resource = ParamResource::StaticBuffer(static_buffers.len() - 1);
            }
        }

        // ===== DESCRIPTOR SETS =====

        let frames = device.frames_in_flight().max(1);
        let mut sets = Vec::with_capacity(set_count);
        for (set, descriptors) in set_bindings.iter().enumerate() {
            if descriptors.iter().any(|d| d.descriptor_type == DescriptorType::CombinedImageSampler) {
                sets.push(ProgramDescriptorSet::External);
                continue;
            }
            let copies = if descriptors.iter().any(|d| d.descriptor_type.is_dynamic()) { frames } else { 1 };
            let handles = device.allocate_descriptor_sets(layout.set_layouts[set], copies)?;
            for (frame, handle) in handles.iter().enumerate() {
                for param in params.iter().filter(|p| p.parent.is_none() && p.set == set as u32 && !p.layout_type.is_push_constant()) {
                    let descriptor_type = bindings[&(param.set, param.binding)].descriptor_type;
                    let buffer: &dyn Buffer = match param.resource {
                        ParamResource::StaticBuffer(i) => static_buffers[i].as_ref(),
                        ParamResource::DynamicBuffer(i) => dynamic_buffers[i].buffer(frame as u32).as_ref(),
                        _ => continue,
                    };
                    device.write_buffer_descriptor(*handle, param.binding, descriptor_type, buffer, 0, param.size_in_bytes as u64)?;
                }
            }
            sets.push(ProgramDescriptorSet::Owned(handles));
        }

        crate::engine_debug!(
            "j4f::program",
            "Program {}: {} params, {} sets, {} dynamic / {} static buffers, {} push-constant ranges",
            id, params.len(), set_count, dynamic_buffers.len(), static_buffers.len(), push_constant_ranges.len()
        );

        Ok(Self {
            id,
            stages,
            layout,
            params,
            sorted,
            names,
            sets,
            push_constant_ranges,
            static_buffers,
            dynamic_buffers,
        })
    }

    // ===== ACCESSORS =====

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn stages(&self) -> &[Arc<dyn ShaderModule>] {
        &self.stages
    }

    pub fn layout(&self) -> &Arc<PipelineDescriptorLayout> {
        &self.layout
    }

    pub fn pipeline_layout(&self) -> PipelineLayoutHandle {
        self.layout.pipeline_layout
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parameters indexed by id
    pub fn params(&self) -> &[ParamLayoutInfo] {
        &self.params
    }

    /// Parameters in `(type, set)` order
    pub fn sorted_params(&self) -> impl Iterator<Item = &ParamLayoutInfo> + '_ {
        self.sorted.iter().map(move |&i| &self.params[i])
    }

    pub fn param_by_name(&self, name: &str) -> Option<&ParamLayoutInfo> {
        self.names.get(name).map(|&id| &self.params[id])
    }

    /// Backing resource of a parameter, following the parent of parts
    pub fn resource_of(&self, param: &ParamLayoutInfo) -> ParamResource {
        match param.parent {
            Some(parent) => self.params[parent].resource,
            None => param.resource,
        }
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn descriptor_sets(&self) -> &[ProgramDescriptorSet] {
        &self.sets
    }

    /// Owned set `set` for `frame` (None for external sets)
    pub fn descriptor_set(&self, set: usize, frame: u32) -> Option<DescriptorSetHandle> {
        match self.sets.get(set)? {
            ProgramDescriptorSet::External => None,
            ProgramDescriptorSet::Owned(handles) => Some(handles[frame as usize % handles.len()]),
        }
    }

    pub fn dynamic_buffer_count(&self) -> usize {
        self.dynamic_buffers.len()
    }

    pub fn dynamic_buffer(&self, index: usize) -> &Arc<DynamicBuffer> {
        &self.dynamic_buffers[index]
    }

    pub fn static_buffer(&self, index: usize) -> &Arc<dyn Buffer> {
        &self.static_buffers[index]
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    // ===== VALUES =====

    /// Write `value` into the resource behind `param`
    ///
    /// Dynamic parameters write element `slot`, or the buffer's current cursor
    /// when `slot` is None, and return the slot used. Push constants go to
    /// `constants`. Textures are bound per draw and rejected here.
    pub fn set_value_to_layout(
        &self,
        param: &ParamLayoutInfo,
        value: &[u8],
        slot: Option<u32>,
        constants: Option<&mut PushConstantStaging>,
        frame: u32,
        all_buffers: bool,
    ) -> Result<Option<u32>> {
        if value.len() > param.size_in_bytes as usize {
            crate::engine_bail_warn!(
                "j4f::program",
                "Value for '{}' is {} bytes, parameter holds {}", param.name, value.len(), param.size_in_bytes
            );
        }
        let member_offset = if param.parent.is_some() { param.offset } else { 0 };

        match (param.layout_type, self.resource_of(param)) {
            (ParamLayoutType::PushConstant | ParamLayoutType::PushConstantPart, _) => {
                let Some(constants) = constants else {
                    crate::engine_bail_warn!("j4f::program", "No push-constant staging for '{}'", param.name);
                };
                constants.write(param.offset, value)?;
                Ok(None)
            }
            (_, ParamResource::StaticBuffer(index)) => {
                self.static_buffers[index].update(member_offset as u64, value)?;
                Ok(None)
            }
            (_, ParamResource::DynamicBuffer(index)) => {
                let buffer = &self.dynamic_buffers[index];
                let slot = slot.unwrap_or_else(|| buffer.current());
                buffer.write(value, slot, member_offset, frame, all_buffers)?;
                Ok(Some(slot))
            }
            _ => Err(crate::engine_warn_err!(
                "j4f::program",
                "Parameter '{}' ({:?}) cannot take a byte value", param.name, param.layout_type
            )),
        }
    }

    pub fn set_value_by_name(
        &self,
        name: &str,
        value: &[u8],
        slot: Option<u32>,
        constants: Option<&mut PushConstantStaging>,
        frame: u32,
        all_buffers: bool,
    ) -> Result<Option<u32>> {
        let Some(param) = self.param_by_name(name) else {
            crate::engine_bail_warn!("j4f::program", "Program {} has no parameter '{}'", self.id, name);
        };
        self.set_value_to_layout(param, value, slot, constants, frame, all_buffers)
    }

    /// Claim the slots written through the cursor by `set_value_*`
    pub fn finish_update_params(&self) -> Result<()> {
        for buffer in &self.dynamic_buffers {
            buffer.increment()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "gpu_program_tests.rs"]
mod tests;
