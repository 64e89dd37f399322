/// Reflected shader interface → binding descriptions
///
/// Backends report each module's raw interface as a [`ShaderInterface`]. This
/// module applies the buffer layout rules and the binding-type conventions
/// that the program model relies on:
///
/// - scalars: size 4, no alignment
/// - 2-component vectors align to 8, 3/4-component vectors align to 16
/// - matrices align to their column stride, size = columns × stride
/// - arrays align to their element stride, size = stride × count
///   (runtime arrays count as one element)
/// - nested structs align to 16 and keep their reflected size
///
/// Uniform/storage blocks whose type name contains `static` become plain
/// buffers, all others become their dynamic-offset variant.

use crate::error::{Error, Result};
use crate::graphics_device::{
    align_up, DescriptorType, DeviceLimits, ImageType, PushConstantRange,
    ReflectedDescriptorKind, ReflectedMember, ReflectedType, ShaderInterface,
    ShaderStage, ShaderStageFlags,
};

/// Type-name marker selecting a plain (non-dynamic) buffer binding
pub const STATIC_BUFFER_MARKER: &str = "static";

/// Byte range of one named member inside a buffer or push-constant block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// One descriptor binding of one module, ready to be merged into a program
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDescription {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
    /// Block size rounded up to the device offset alignment (0 for images)
    pub size_in_bytes: u32,
    pub image_type: Option<ImageType>,
    pub members: Vec<MemberLayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushConstantDescription {
    pub name: String,
    pub range: PushConstantRange,
    pub members: Vec<MemberLayout>,
}

/// Everything one module contributes to a program
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleLayout {
    pub stage: ShaderStage,
    pub bindings: Vec<BindingDescription>,
    pub push_constants: Vec<PushConstantDescription>,
}

/// Required alignment of a member of type `ty`
pub fn type_alignment(ty: &ReflectedType) -> u32 {
    match ty {
        ReflectedType::Scalar { .. } | ReflectedType::Opaque => 1,
        ReflectedType::Vector { components, .. } => if *components == 2 { 8 } else { 16 },
        ReflectedType::Matrix { stride, .. } => *stride,
        ReflectedType::Array { stride, .. } => *stride,
        ReflectedType::Struct { .. } => 16,
    }
}

/// Size in bytes of a member of type `ty`
pub fn type_size(ty: &ReflectedType) -> u32 {
    match ty {
        ReflectedType::Scalar { size } => *size,
        ReflectedType::Vector { components, component_size } => components * component_size,
        ReflectedType::Matrix { columns, stride, .. } => columns * stride,
        ReflectedType::Array { count, stride, .. } => (*count).max(1) * stride,
        ReflectedType::Struct { size, .. } => *size,
        ReflectedType::Opaque => 0,
    }
}

/// Lay out block members in declaration order
///
/// Returns the member table and the end offset of the last member.
/// Zero-sized members (opaque types) are skipped.
pub fn layout_members(members: &[ReflectedMember]) -> (Vec<MemberLayout>, u32) {
    let mut layouts = Vec::with_capacity(members.len());
    let mut offset = 0u32;
    for member in members {
        let size = type_size(&member.ty);
        if size == 0 {
            continue;
        }
        offset = align_up(offset as u64, type_alignment(&member.ty) as u64) as u32;
        layouts.push(MemberLayout { name: member.name.clone(), offset, size });
        offset += size;
    }
    (layouts, offset)
}

fn block_members<'a>(name: &str, ty: &'a Option<ReflectedType>) -> Result<&'a [ReflectedMember]> {
    match ty {
        Some(ReflectedType::Struct { members, .. }) => Ok(members),
        _ => {
            crate::engine_error!("j4f::program", "Buffer binding '{}' has no struct layout", name);
            Err(Error::ReflectionFailed(format!("buffer '{}' has no struct layout", name)))
        }
    }
}

/// Turn one module's reflected interface into binding descriptions
pub fn describe_module(
    interface: &ShaderInterface,
    stage: ShaderStage,
    limits: &DeviceLimits,
) -> Result<ModuleLayout> {
    let stage_flags = ShaderStageFlags::from(stage);
    let mut bindings = Vec::with_capacity(interface.descriptors.len());

    for descriptor in &interface.descriptors {
        let (descriptor_type, size_in_bytes, image_type, members) = match &descriptor.kind {
            ReflectedDescriptorKind::UniformBuffer | ReflectedDescriptorKind::StorageBuffer => {
                let uniform = descriptor.kind == ReflectedDescriptorKind::UniformBuffer;
                let is_static = descriptor.type_name.contains(STATIC_BUFFER_MARKER);
                let descriptor_type = match (uniform, is_static) {
                    (true, true) => DescriptorType::UniformBuffer,
                    (true, false) => DescriptorType::UniformBufferDynamic,
                    (false, true) => DescriptorType::StorageBuffer,
                    (false, false) => DescriptorType::StorageBufferDynamic,
                };
                let alignment = if uniform {
                    limits.min_uniform_offset_alignment
                } else {
                    limits.min_storage_offset_alignment
                };

                let (members, end) = layout_members(block_members(&descriptor.name, &descriptor.ty)?);
                if end == 0 {
                    crate::engine_error!(
                        "j4f::program",
                        "Buffer '{}' at set {} binding {} has no sized member",
                        descriptor.name, descriptor.set, descriptor.binding
                    );
                    return Err(Error::ReflectionFailed(format!("buffer '{}' has zero size", descriptor.name)));
                }
                let size = align_up(end as u64, alignment as u64) as u32;
                (descriptor_type, size, None, members)
            }
            ReflectedDescriptorKind::CombinedImageSampler(image_type) => {
                (DescriptorType::CombinedImageSampler, 0, Some(*image_type), Vec::new())
            }
            ReflectedDescriptorKind::Unsupported(kind) => {
                crate::engine_error!(
                    "j4f::program",
                    "Unsupported descriptor '{}' ({}) at set {} binding {}",
                    descriptor.name, kind, descriptor.set, descriptor.binding
                );
                return Err(Error::ReflectionFailed(format!(
                    "unsupported descriptor kind {} for '{}'", kind, descriptor.name
                )));
            }
        };

        bindings.push(BindingDescription {
            name: descriptor.name.clone(),
            set: descriptor.set,
            binding: descriptor.binding,
            descriptor_type,
            count: descriptor.count.max(1),
            stages: stage_flags,
            size_in_bytes,
            image_type,
            members,
        });
    }

    let push_constants = interface.push_constants.iter()
        .map(|pc| PushConstantDescription {
            name: pc.name.clone(),
            range: PushConstantRange { stages: stage_flags, offset: pc.offset, size: pc.size },
            members: pc.members.iter()
                .map(|m| MemberLayout { name: m.name.clone(), offset: m.offset, size: m.size })
                .collect(),
        })
        .collect();

    Ok(ModuleLayout { stage, bindings, push_constants })
}

#[cfg(test)]
#[path = "reflection_tests.rs"]
mod tests;
