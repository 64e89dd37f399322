/// Per-draw parameter storage and the bind/draw protocol
///
/// A [`RenderData`] holds one value slot per program parameter. Values are
/// only resolved to GPU state in [`RenderData::prepare_render`], which may run
/// on worker threads; [`RenderData::render`] then records the bind and draw
/// commands on the submission thread.

use std::sync::Arc;

use crate::error::Result;
use crate::frame::Statistics;
use crate::graphics_device::{
    Buffer, CommandList, DepthBias, DescriptorSetHandle, IndexType, Rect2D, Viewport,
};
use crate::program::{ParamLayoutType, ParamResource, PushConstantStaging};
use crate::render::pipeline_cache::GraphicsPipeline;
use crate::render::texture::{GpuTexture, Placeholders};

/// Value assigned to one parameter
#[derive(Clone)]
pub enum ParamValue {
    Bytes(Vec<u8>),
    Texture(Arc<GpuTexture>),
}

/// Sub-range of the item's geometry drawn with one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderPart {
    pub first_index: u32,
    /// 0 for a non-indexed part
    pub index_count: u32,
    pub vertex_count: u32,
    pub first_vertex: u32,
    pub vertex_buffer_offset: u64,
    pub index_buffer_offset: u64,
}

/// Dynamic state applied before an item's draws
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewParams {
    pub viewport: Option<Viewport>,
    pub scissor: Option<Rect2D>,
    pub depth_bias: Option<DepthBias>,
}

pub struct RenderData {
    pipeline: Option<Arc<GraphicsPipeline>>,
    params: Vec<Option<ParamValue>>,
    dynamic_offsets: Vec<u32>,
    constants: PushConstantStaging,
    external_sets: Vec<DescriptorSetHandle>,
    pub render_parts: Vec<RenderPart>,
    pub instance_count: u32,
    pub first_instance: u32,
    pub vertex_buffer: Option<Arc<dyn Buffer>>,
    pub index_buffer: Option<Arc<dyn Buffer>>,
    pub index_type: IndexType,
    pub visible: bool,
    /// Secondary sort key inside a pipeline (smaller draws first)
    pub sort_depth: f32,
}

impl Default for RenderData {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderData {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            params: Vec::new(),
            dynamic_offsets: Vec::new(),
            constants: PushConstantStaging::default(),
            external_sets: Vec::new(),
            render_parts: Vec::new(),
            instance_count: 1,
            first_instance: 0,
            vertex_buffer: None,
            index_buffer: None,
            index_type: IndexType::U32,
            visible: true,
            sort_depth: 0.0,
        }
    }

    pub fn pipeline(&self) -> Option<&Arc<GraphicsPipeline>> {
        self.pipeline.as_ref()
    }

    /// Switch pipeline; clears every value if the program changes
    pub fn set_pipeline(&mut self, pipeline: Option<Arc<GraphicsPipeline>>) {
        let same_program = match (&self.pipeline, &pipeline) {
            (Some(old), Some(new)) => old.program().id() == new.program().id(),
            _ => false,
        };
        if !same_program {
            let (params, dynamics, sets) = pipeline.as_ref()
                .map(|p| {
                    let program = p.program();
                    (program.param_count(), program.dynamic_buffer_count(), program.set_count())
                })
                .unwrap_or((0, 0, 0));
            self.params = vec![None; params];
            self.dynamic_offsets = vec![0; dynamics];
            self.external_sets = vec![DescriptorSetHandle::NULL; sets];
            self.constants = PushConstantStaging::default();
        }
        self.pipeline = pipeline;
    }

    // ===== VALUES =====

    pub fn set_param<T: bytemuck::Pod>(&mut self, name: &str, value: &T) -> Result<()> {
        self.set_param_bytes(name, bytemuck::bytes_of(value))
    }

    pub fn set_param_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let (id, layout_type, size) = self.lookup(name)?;
        if layout_type == ParamLayoutType::CombinedImageSampler {
            crate::engine_bail_warn!("j4f::render", "Parameter '{}' is a texture", name);
        }
        if bytes.len() > size as usize {
            crate::engine_bail_warn!(
                "j4f::render",
                "Value for '{}' is {} bytes, parameter holds {}", name, bytes.len(), size
            );
        }
        self.params[id] = Some(ParamValue::Bytes(bytes.to_vec()));
        Ok(())
    }

    pub fn set_texture(&mut self, name: &str, texture: Arc<GpuTexture>) -> Result<()> {
        let (id, layout_type, _) = self.lookup(name)?;
        if layout_type != ParamLayoutType::CombinedImageSampler {
            crate::engine_bail_warn!("j4f::render", "Parameter '{}' is not a texture", name);
        }
        self.params[id] = Some(ParamValue::Texture(texture));
        Ok(())
    }

    pub fn clear_param(&mut self, name: &str) -> Result<()> {
        let (id, _, _) = self.lookup(name)?;
        self.params[id] = None;
        Ok(())
    }

    pub fn param(&self, id: usize) -> Option<&ParamValue> {
        self.params.get(id).and_then(|v| v.as_ref())
    }

    fn lookup(&self, name: &str) -> Result<(usize, ParamLayoutType, u32)> {
        let Some(pipeline) = &self.pipeline else {
            crate::engine_bail_warn!("j4f::render", "Cannot set '{}': no pipeline", name);
        };
        match pipeline.program().param_by_name(name) {
            Some(p) => Ok((p.id, p.layout_type, p.size_in_bytes)),
            None => Err(crate::engine_warn_err!(
                "j4f::render",
                "Program {} has no parameter '{}'", pipeline.program().id(), name
            )),
        }
    }

    // ===== PREPARED STATE =====

    /// Dynamic offsets in the program's dynamic-binding order
    pub fn dynamic_offsets(&self) -> &[u32] {
        &self.dynamic_offsets
    }

    pub fn push_constants(&self) -> &PushConstantStaging {
        &self.constants
    }

    /// Texture set chosen for each set number (NULL for owned sets)
    pub fn external_sets(&self) -> &[DescriptorSetHandle] {
        &self.external_sets
    }

    /// Resolve every value to GPU state for `frame`
    ///
    /// Each dynamic buffer gets at most one new slot per call, shared by all
    /// parameters living in it. A dynamic buffer with no value this draw
    /// reuses the last slot claimed this frame. Texture sets always resolve,
    /// to a placeholder when the texture is missing or not ready.
    pub fn prepare_render(&mut self, frame: u32, placeholders: &Placeholders) -> Result<()> {
        let Some(pipeline) = self.pipeline.clone() else {
            return Ok(());
        };
        let program = pipeline.program();

        let mut claimed: u64 = 0;
        for (index, offset) in self.dynamic_offsets.iter_mut().enumerate() {
            let buffer = program.dynamic_buffer(index);
            *offset = buffer.slot_offset(buffer.current().saturating_sub(1));
        }

        for param in program.sorted_params() {
            if param.layout_type == ParamLayoutType::CombinedImageSampler {
                let set = match &self.params[param.id] {
                    Some(ParamValue::Texture(texture)) if texture.is_ready() => texture.descriptor_set(),
                    _ => placeholders.for_image_type(param.image_type).descriptor_set(),
                };
                self.external_sets[param.set as usize] = set;
                continue;
            }

            let Some(ParamValue::Bytes(bytes)) = &self.params[param.id] else {
                continue;
            };

            if param.layout_type.is_push_constant() {
                program.set_value_to_layout(param, bytes, None, Some(&mut self.constants), frame, false)?;
                continue;
            }

            let slot = match program.resource_of(param) {
                ParamResource::DynamicBuffer(index) => {
                    let buffer = program.dynamic_buffer(index);
                    let bit = 1u64 << index;
                    if claimed & bit == 0 {
                        let slot = buffer.increment()?;
                        claimed |= bit;
                        self.dynamic_offsets[index] = buffer.slot_offset(slot);
                    }
                    Some(self.dynamic_offsets[index] / buffer.aligned_size())
                }
                _ => None,
            };
            program.set_value_to_layout(param, bytes, slot, None, frame, false)?;
        }
        Ok(())
    }

    /// Record the item's binds and draws, returning the number of draw calls
    ///
    /// Items without a pipeline, with a NULL pipeline handle or hidden are
    /// skipped without error.
    pub fn render(
        &self,
        cmd: &mut dyn CommandList,
        frame: u32,
        view: &ViewParams,
        instance_multiplier: u32,
        stats: &Statistics,
    ) -> Result<u32> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(0);
        };
        if pipeline.handle().is_null() || !self.visible {
            return Ok(0);
        }
        let program = pipeline.program();
        let layout = program.pipeline_layout();

        cmd.bind_pipeline(pipeline.handle())?;
        if let Some(viewport) = view.viewport {
            cmd.set_viewport(viewport)?;
        }
        if let Some(scissor) = view.scissor {
            cmd.set_scissor(scissor)?;
        }
        if let Some(bias) = view.depth_bias {
            cmd.set_depth_bias(bias)?;
        }

        if program.set_count() > 0 {
            let sets: Vec<DescriptorSetHandle> = (0..program.set_count())
                .map(|set| program.descriptor_set(set, frame).unwrap_or(self.external_sets[set]))
                .collect();
            cmd.bind_descriptor_sets(layout, 0, &sets, &self.dynamic_offsets)?;
        }
        for range in program.push_constant_ranges() {
            cmd.push_constants(layout, range.stages, range.offset, self.constants.range(range))?;
        }

        let instances = self.instance_count * instance_multiplier.max(1);
        let mut draws = 0;
        for part in &self.render_parts {
            if let Some(vertices) = &self.vertex_buffer {
                cmd.bind_vertex_buffer(vertices.as_ref(), part.vertex_buffer_offset)?;
            }
            match &self.index_buffer {
                Some(indices) if part.index_count > 0 => {
                    cmd.bind_index_buffer(indices.as_ref(), part.index_buffer_offset, self.index_type)?;
                    cmd.draw_indexed(part.index_count, instances, part.first_index, part.first_vertex as i32, self.first_instance)?;
                }
                _ => cmd.draw(part.vertex_count, instances, part.first_vertex, self.first_instance)?,
            }
            stats.add_draw_call();
            draws += 1;
        }
        Ok(draws)
    }
}

#[cfg(test)]
#[path = "render_data_tests.rs"]
mod tests;
