/// Graphics pipeline cache
///
/// Pipelines are keyed by packed state words plus the render pass and the
/// vertex layout, compared field by field. Bit layout:
///
/// | word      | fields                                                         |
/// |-----------|----------------------------------------------------------------|
/// | topology  | topology:4, restart:1                                          |
/// | raster    | polygon:2, cull:2, front face:1, discard:1                     |
/// | depth     | compare:3, test:1, write:1                                     |
/// | composite | topology:5, raster:6, depth:5, program id:16, subpass:32       |
/// | stencil   | enabled:1, fail:3, pass:3, depth fail:3, compare:3, cmask:8, wmask:8, ref:8 |
///
/// Pipelines built against an old render pass stay in the cache until
/// [`PipelineCache::destroy`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::graphics_device::{
    BlendMode, DepthState, GraphicsDevice, GraphicsPipelineDesc, PipelineHandle, PipelineState,
    RasterizationState, RenderPassHandle, StencilState, VertexLayout,
};
use crate::program::GpuProgram;

pub fn pack_topology(state: &PipelineState) -> u64 {
    state.topology as u64 | (state.primitive_restart as u64) << 4
}

pub fn pack_rasterization(raster: &RasterizationState) -> u64 {
    raster.polygon_mode as u64
        | (raster.cull_mode as u64) << 2
        | (raster.front_face as u64) << 4
        | (raster.discard as u64) << 5
}

pub fn pack_depth(depth: &DepthState) -> u64 {
    depth.compare_op as u64 | (depth.test as u64) << 3 | (depth.write as u64) << 4
}

pub fn composite_key(state: &PipelineState, program_id: u16) -> u64 {
    pack_topology(state)
        | pack_rasterization(&state.rasterization) << 5
        | pack_depth(&state.depth) << 11
        | (program_id as u64) << 16
        | (state.subpass as u64) << 32
}

pub fn stencil_key(stencil: &StencilState) -> u64 {
    stencil.enabled as u64
        | (stencil.fail_op as u64) << 1
        | (stencil.pass_op as u64) << 4
        | (stencil.depth_fail_op as u64) << 7
        | (stencil.compare_op as u64) << 10
        | (stencil.compare_mask as u64) << 13
        | (stencil.write_mask as u64) << 21
        | (stencil.reference as u64) << 29
}

pub fn blend_key(blend: BlendMode) -> u32 {
    blend as u32
}

/// Full structural identity of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub composite: u64,
    pub stencil: u64,
    pub blend: u32,
    pub render_pass: RenderPassHandle,
    pub vertex_layout: VertexLayout,
}

impl PipelineKey {
    pub fn new(state: &PipelineState, program_id: u16, render_pass: RenderPassHandle, vertex_layout: &VertexLayout) -> Self {
        Self {
            composite: composite_key(state, program_id),
            stencil: stencil_key(&state.stencil),
            blend: blend_key(state.blend),
            render_pass,
            vertex_layout: vertex_layout.clone(),
        }
    }
}

/// Cached pipeline with the program it was built from
pub struct GraphicsPipeline {
    id: u32,
    handle: PipelineHandle,
    program: Arc<GpuProgram>,
    key: PipelineKey,
}

impl GraphicsPipeline {
    /// Cache-unique id (also the primary render-list sort key)
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn program(&self) -> &Arc<GpuProgram> {
        &self.program
    }

    pub fn key(&self) -> &PipelineKey {
        &self.key
    }
}

pub struct PipelineCache {
    pipelines: FxHashMap<PipelineKey, Arc<GraphicsPipeline>>,
    next_id: AtomicU32,
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineCache {
    pub fn new() -> Self {
        Self { pipelines: FxHashMap::default(), next_id: AtomicU32::new(1) }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Return the pipeline for this exact state, building it on first request
    pub fn get_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        program: &Arc<GpuProgram>,
        state: &PipelineState,
        vertex_layout: &VertexLayout,
        render_pass: RenderPassHandle,
    ) -> Result<Arc<GraphicsPipeline>> {
        let key = PipelineKey::new(state, program.id(), render_pass, vertex_layout);
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(Arc::clone(pipeline));
        }

        let handle = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            stages: program.stages().to_vec(),
            layout: program.pipeline_layout(),
            render_pass,
            vertex_layout: vertex_layout.clone(),
            state: *state,
        })?;

        let pipeline = Arc::new(GraphicsPipeline {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            handle,
            program: Arc::clone(program),
            key: key.clone(),
        });
        crate::engine_debug!(
            "j4f::render",
            "Pipeline {} created (program {}, composite {:#x})",
            pipeline.id, program.id(), key.composite
        );
        self.pipelines.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Destroy every cached pipeline
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for (_, pipeline) in self.pipelines.drain() {
            device.destroy_pipeline(pipeline.handle);
        }
    }
}

#[cfg(test)]
#[path = "pipeline_cache_tests.rs"]
mod tests;
