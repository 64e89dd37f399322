/// Graphics pipeline creation and fixed-function state conversions

use j4f_engine::j4f::Result;
use j4f_engine::j4f::render::{
    BlendFactor, BlendMode, CompareOp, CullMode, FrontFace, GraphicsPipelineDesc, PolygonMode,
    PrimitiveTopology, StencilOp, StencilState, VertexFormat, VertexInputRate, IndexType,
};
use j4f_engine::{engine_bail_warn, engine_debug, engine_err};
use ash::vk;
use ash::vk::Handle;
use std::ffi::CStr;

use crate::vulkan_shader::{stage_to_vk, ShaderModule};

const ENTRY_POINT: &CStr = c"main";

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub(crate) fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub(crate) fn polygon_mode_to_vk(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn stencil_op_to_vk(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub(crate) fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
    }
}

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        VertexFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        VertexFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::R32_UINT => vk::Format::R32_UINT,
        VertexFormat::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        VertexFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::R16G16_SFLOAT => vk::Format::R16G16_SFLOAT,
    }
}

pub(crate) fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

/// Front and back stencil state (both faces share one description)
pub(crate) fn stencil_state_to_vk(state: &StencilState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op_to_vk(state.fail_op),
        pass_op: stencil_op_to_vk(state.pass_op),
        depth_fail_op: stencil_op_to_vk(state.depth_fail_op),
        compare_op: compare_op_to_vk(state.compare_op),
        compare_mask: state.compare_mask as u32,
        write_mask: state.write_mask as u32,
        reference: state.reference as u32,
    }
}

/// Color attachment blend state for a blend mode (alpha uses the same factors)
pub(crate) fn blend_attachment(mode: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    let attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    match mode.factors() {
        None => attachment.blend_enable(false),
        Some((src, dst)) => attachment
            .blend_enable(true)
            .src_color_blend_factor(blend_factor_to_vk(src))
            .dst_color_blend_factor(blend_factor_to_vk(dst))
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(blend_factor_to_vk(src))
            .dst_alpha_blend_factor(blend_factor_to_vk(dst))
            .alpha_blend_op(vk::BlendOp::ADD),
    }
}

/// Build one graphics pipeline
///
/// Viewport, scissor and depth bias are dynamic state.
pub(crate) fn create_graphics_pipeline(device: &ash::Device, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline> {
    if desc.stages.is_empty() {
        engine_bail_warn!("j4f::vulkan", "Graphics pipeline needs at least one shader stage");
    }

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = desc.stages.iter()
        .map(|module| {
            // Every module handed to this backend was created by it
            let module = unsafe { &*(std::sync::Arc::as_ptr(module) as *const ShaderModule) };
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage_to_vk(j4f_engine::j4f::render::ShaderModule::stage(module)))
                .module(module.module)
                .name(ENTRY_POINT)
        })
        .collect();

    let bindings: Vec<vk::VertexInputBindingDescription> = desc.vertex_layout.bindings.iter()
        .map(|b| vk::VertexInputBindingDescription {
            binding: b.binding,
            stride: b.stride,
            input_rate: match b.input_rate {
                VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
                VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
            },
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = desc.vertex_layout.attributes.iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: a.binding,
            format: vertex_format_to_vk(a.format),
            offset: a.offset,
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let state = &desc.state;
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology_to_vk(state.topology))
        .primitive_restart_enable(state.primitive_restart);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(state.rasterization.discard)
        .polygon_mode(polygon_mode_to_vk(state.rasterization.polygon_mode))
        .cull_mode(cull_mode_to_vk(state.rasterization.cull_mode))
        .front_face(front_face_to_vk(state.rasterization.front_face))
        .depth_bias_enable(true)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let stencil = stencil_state_to_vk(&state.stencil);
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth.test)
        .depth_write_enable(state.depth.write)
        .depth_compare_op(compare_op_to_vk(state.depth.compare_op))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(state.stencil.enabled)
        .front(stencil)
        .back(stencil);

    let attachment = blend_attachment(state.blend);
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(std::slice::from_ref(&attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR, vk::DynamicState::DEPTH_BIAS];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(vk::PipelineLayout::from_raw(desc.layout.0))
        .render_pass(vk::RenderPass::from_raw(desc.render_pass.0))
        .subpass(state.subpass);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
    }
    .map_err(|(_, e)| engine_err!("j4f::vulkan", "Failed to create graphics pipeline: {:?}", e))?;

    engine_debug!(
        "j4f::vulkan",
        "Graphics pipeline: {} stages, {:?}, blend {:?}",
        shader_stages.len(), state.topology, state.blend
    );
    Ok(pipelines[0])
}
