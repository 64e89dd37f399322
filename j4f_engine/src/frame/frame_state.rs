/// Frame index rotation, per-frame stages and retire queues

use std::sync::Arc;

use crate::graphics_device::Buffer;
use crate::render::GpuTexture;

/// Stage of one frame index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    WaitingFence,
    Recording,
    Submitted,
}

/// GPU object kept alive until its frame index comes around again
pub enum Retired {
    Buffer(Arc<dyn Buffer>),
    Texture(Arc<GpuTexture>),
}

/// Per-frame bookkeeping of the frame loop
///
/// Retiring moves the last owner of an object into the queue of the current
/// frame index. The queue is dropped at the next `begin_frame` of that index,
/// after its fence proved the GPU no longer reads the object.
pub struct FrameState {
    current: u32,
    stages: Vec<FrameStage>,
    retire_queues: Vec<Vec<Retired>>,
    suspended: bool,
    device_lost: bool,
}

impl FrameState {
    pub fn new(frame_count: u32) -> Self {
        let frame_count = frame_count.max(1) as usize;
        Self {
            current: 0,
            stages: vec![FrameStage::Idle; frame_count],
            retire_queues: (0..frame_count).map(|_| Vec::new()).collect(),
            suspended: false,
            device_lost: false,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.stages.len() as u32
    }

    /// Index of the frame being (or about to be) recorded
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn stage(&self, frame: u32) -> FrameStage {
        self.stages[frame as usize % self.stages.len()]
    }

    pub fn set_stage(&mut self, stage: FrameStage) {
        self.stages[self.current as usize] = stage;
    }

    /// Move to the next frame index
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frame_count();
    }

    /// Restart rotation at index 0 (after surface recreation)
    pub fn reset_index(&mut self) {
        self.current = 0;
        self.stages.iter_mut().for_each(|s| *s = FrameStage::Idle);
    }

    // ===== RETIRE QUEUES =====

    pub fn retire(&mut self, item: Retired) {
        self.retire_queues[self.current as usize].push(item);
    }

    pub fn pending_retired(&self, frame: u32) -> usize {
        self.retire_queues[frame as usize % self.retire_queues.len()].len()
    }

    /// Drop everything retired while `frame` was current, returning the count
    pub fn drain(&mut self, frame: u32) -> usize {
        let len = self.retire_queues.len();
        std::mem::take(&mut self.retire_queues[frame as usize % len]).len()
    }

    pub fn drain_all(&mut self) -> usize {
        self.retire_queues.iter_mut().map(|q| std::mem::take(q).len()).sum()
    }

    // ===== SUSPENSION =====

    /// True while no frame may begin
    pub fn is_suspended(&self) -> bool {
        self.suspended || self.device_lost
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn mark_device_lost(&mut self) {
        self.device_lost = true;
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }
}

#[cfg(test)]
#[path = "frame_state_tests.rs"]
mod tests;
