/// ShaderModule - Vulkan shader module plus its spirq-reflected interface

use j4f_engine::j4f::{Error, Result};
use j4f_engine::j4f::render::{
    ShaderModule as DeviceShaderModule, ShaderStage, ShaderInterface,
    ReflectedDescriptor, ReflectedDescriptorKind, ReflectedMember, ReflectedType,
    ReflectedPushConstant, ReflectedPushConstantMember, ImageType,
};
use j4f_engine::{engine_err, engine_warn};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

pub struct ShaderModule {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    interface: ShaderInterface,
}

impl ShaderModule {
    pub fn new(ctx: Arc<GpuContext>, code: &[u8], stage: ShaderStage) -> Result<Self> {
        if code.is_empty() || code.len() % 4 != 0 {
            return Err(reflection_error(format!(
                "SPIR-V size must be a non-zero multiple of 4 (got {} bytes)",
                code.len()
            )));
        }
        let words: Vec<u32> = code
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let interface = reflect(&words)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { ctx.device.create_shader_module(&create_info, None) }
            .map_err(|e| engine_err!("j4f::vulkan", "Failed to create {:?} shader module: {:?}", stage, e))?;

        Ok(Self { ctx, module, stage, interface })
    }
}

impl DeviceShaderModule for ShaderModule {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn interface(&self) -> &ShaderInterface {
        &self.interface
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_shader_module(self.module, None) };
    }
}

pub(crate) fn stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

fn reflection_error(message: String) -> Error {
    engine_warn!("j4f::vulkan", "SPIR-V reflection failed: {}", message);
    Error::ReflectionFailed(message)
}

// ============================================================================
// spirq -> ShaderInterface
// ============================================================================

/// Parse SPIR-V words and collect descriptors and push-constant blocks
pub(crate) fn reflect(words: &[u32]) -> Result<ShaderInterface> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| reflection_error(format!("{:?}", e)))?;

    let mut interface = ShaderInterface::default();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, ty, nbind } => {
                    let (set, binding) = (desc_bind.set(), desc_bind.bind());
                    // Several entry points may reference the same resource
                    if interface.descriptors.iter().any(|d| d.set == set && d.binding == binding) {
                        continue;
                    }
                    let kind = descriptor_kind(desc_ty, ty);
                    let is_buffer = matches!(
                        kind,
                        ReflectedDescriptorKind::UniformBuffer | ReflectedDescriptorKind::StorageBuffer
                    );
                    interface.descriptors.push(ReflectedDescriptor {
                        name: name.clone().unwrap_or_default(),
                        type_name: type_name(ty),
                        set,
                        binding,
                        kind,
                        count: (*nbind).max(1),
                        ty: is_buffer.then(|| convert_type(ty)),
                    });
                }
                spirq::var::Variable::PushConstant { name, ty } => {
                    let name = name.clone().unwrap_or_default();
                    if interface.push_constants.iter().any(|p| p.name == name) {
                        continue;
                    }
                    interface.push_constants.push(push_constant_block(name, ty));
                }
                _ => {}
            }
        }
    }
    Ok(interface)
}

fn descriptor_kind(desc_ty: &spirq::ty::DescriptorType, ty: &spirq::ty::Type) -> ReflectedDescriptorKind {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => ReflectedDescriptorKind::UniformBuffer,
        DescriptorType::StorageBuffer(..) => ReflectedDescriptorKind::StorageBuffer,
        DescriptorType::CombinedImageSampler() => match ty {
            spirq::ty::Type::CombinedImageSampler(t) => {
                let image = &t.sampled_image_ty;
                match image_type(image.dim, image.is_array) {
                    Some(image_type) => ReflectedDescriptorKind::CombinedImageSampler(image_type),
                    None => ReflectedDescriptorKind::Unsupported(format!("sampler dimension {:?}", image.dim)),
                }
            }
            other => ReflectedDescriptorKind::Unsupported(format!("combined image sampler of type {:?}", other)),
        },
        other => ReflectedDescriptorKind::Unsupported(format!("{:?}", other)),
    }
}

/// Sampler image type, `None` for dimensions programs cannot bind
pub(crate) fn image_type(dim: spirq::spirv::Dim, is_array: bool) -> Option<ImageType> {
    use spirq::spirv::Dim;
    match (dim, is_array) {
        (Dim::Dim1D, false) => Some(ImageType::Sampler1D),
        (Dim::Dim1D, true) => Some(ImageType::Sampler1DArray),
        (Dim::Dim2D, false) => Some(ImageType::Sampler2D),
        (Dim::Dim2D, true) => Some(ImageType::Sampler2DArray),
        (Dim::Dim3D, false) => Some(ImageType::Sampler3D),
        (Dim::DimCube, false) => Some(ImageType::SamplerCube),
        (Dim::DimCube, true) => Some(ImageType::SamplerCubeArray),
        _ => None,
    }
}

fn type_name(ty: &spirq::ty::Type) -> String {
    match ty {
        spirq::ty::Type::Struct(st) => st.name.clone().unwrap_or_default(),
        spirq::ty::Type::Array(a) => type_name(&a.element_ty),
        _ => String::new(),
    }
}

fn scalar_size(scalar: &spirq::ty::ScalarType) -> u32 {
    use spirq::ty::ScalarType;
    match scalar {
        ScalarType::Float { bits } | ScalarType::Integer { bits, .. } => bits / 8,
        ScalarType::Boolean => 4,
        ScalarType::Void => 0,
    }
}

fn convert_type(ty: &spirq::ty::Type) -> ReflectedType {
    use spirq::ty::Type;
    match ty {
        Type::Scalar(s) => ReflectedType::Scalar { size: scalar_size(s) },
        Type::Vector(v) => ReflectedType::Vector {
            components: v.nscalar,
            component_size: scalar_size(&v.scalar_ty),
        },
        Type::Matrix(m) => {
            let column = m.vector_ty.nscalar * scalar_size(&m.vector_ty.scalar_ty);
            ReflectedType::Matrix {
                columns: m.nvector,
                rows: m.vector_ty.nscalar,
                stride: m.stride.map(|s| s as u32).unwrap_or(column),
            }
        }
        Type::Array(a) => {
            let element = convert_type(&a.element_ty);
            let stride = a.stride.map(|s| s as u32)
                .or_else(|| a.element_ty.nbyte().map(|s| s as u32))
                .unwrap_or(0);
            ReflectedType::Array { element: Box::new(element), count: a.nelement.unwrap_or(0), stride }
        }
        Type::Struct(st) => ReflectedType::Struct {
            name: st.name.clone().unwrap_or_default(),
            members: st.members.iter()
                .map(|m| ReflectedMember { name: m.name.clone().unwrap_or_default(), ty: convert_type(&m.ty) })
                .collect(),
            size: ty.nbyte().unwrap_or(0) as u32,
        },
        _ => ReflectedType::Opaque,
    }
}

fn push_constant_block(name: String, ty: &spirq::ty::Type) -> ReflectedPushConstant {
    let members: Vec<ReflectedPushConstantMember> = match ty {
        spirq::ty::Type::Struct(st) => st.members.iter()
            .map(|m| ReflectedPushConstantMember {
                name: m.name.clone().unwrap_or_default(),
                offset: m.offset.unwrap_or(0) as u32,
                size: m.ty.nbyte().unwrap_or(0) as u32,
            })
            .collect(),
        _ => Vec::new(),
    };
    let offset = members.iter().map(|m| m.offset).min().unwrap_or(0);
    let end = members.iter().map(|m| m.offset + m.size).max()
        .unwrap_or_else(|| ty.nbyte().unwrap_or(0) as u32);

    ReflectedPushConstant { name, offset, size: end - offset, members }
}
