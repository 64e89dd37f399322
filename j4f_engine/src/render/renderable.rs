/// Renderable kinds and shadow-map technique selection

use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::graphics_device::{DeviceLimits, ShadowTechniquePreference};
use crate::program::GpuProgram;

/// Closed set of things the engine knows how to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderableKind {
    StaticMesh,
    SkinnedMesh,
    Terrain,
    Foliage,
    Particles,
}

/// How cascaded shadow maps are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowTechnique {
    /// One instanced draw, the instance index selects the cascade layer
    InstanceDraw,
    /// One draw, a geometry shader replicates it to every layer
    GeometryShader,
    /// One pass per cascade
    PerCascade,
}

impl ShadowTechnique {
    /// Resolve a preference against what the device supports
    pub fn select(preference: ShadowTechniquePreference, limits: &DeviceLimits) -> Self {
        let technique = match preference {
            ShadowTechniquePreference::Auto if limits.supports_viewport_index_layer => ShadowTechnique::InstanceDraw,
            ShadowTechniquePreference::Auto if limits.supports_geometry_shader => ShadowTechnique::GeometryShader,
            ShadowTechniquePreference::Auto => ShadowTechnique::PerCascade,
            ShadowTechniquePreference::InstanceDraw if limits.supports_viewport_index_layer => ShadowTechnique::InstanceDraw,
            ShadowTechniquePreference::GeometryShader if limits.supports_geometry_shader => ShadowTechnique::GeometryShader,
            ShadowTechniquePreference::PerCascade => ShadowTechnique::PerCascade,
            unsupported => {
                crate::engine_warn!(
                    "j4f::render",
                    "Shadow technique {:?} not supported by the device, using per-cascade", unsupported
                );
                ShadowTechnique::PerCascade
            }
        };
        crate::engine_info!("j4f::render", "Shadow technique: {:?}", technique);
        technique
    }

    /// Render passes needed to fill one shadow map
    pub fn passes(&self, cascades: u32) -> u32 {
        match self {
            ShadowTechnique::PerCascade => cascades.max(1),
            _ => 1,
        }
    }

    /// Instance count multiplier of each shadow draw
    pub fn instance_multiplier(&self, cascades: u32) -> u32 {
        match self {
            ShadowTechnique::InstanceDraw => cascades.max(1),
            _ => 1,
        }
    }
}

/// Shadow program registered for each renderable kind
#[derive(Default)]
pub struct ShadowProgramRegistry {
    programs: FxHashMap<RenderableKind, Arc<GpuProgram>>,
}

impl ShadowProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `program`, returning the one it replaces
    pub fn register(&mut self, kind: RenderableKind, program: Arc<GpuProgram>) -> Option<Arc<GpuProgram>> {
        self.programs.insert(kind, program)
    }

    pub fn get(&self, kind: RenderableKind) -> Option<&Arc<GpuProgram>> {
        self.programs.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
#[path = "renderable_tests.rs"]
mod tests;
