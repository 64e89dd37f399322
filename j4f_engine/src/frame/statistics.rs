/// Frame statistics: draw calls, frames per second, CPU frame time
///
/// Values are accumulated continuously and published once per second of
/// frame time, so a reader always sees a complete one-second window.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Last published measurement window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatisticsSnapshot {
    pub fps: u32,
    /// Average draw calls per frame
    pub draw_calls: u32,
    /// Average CPU preparation time per frame, in seconds
    pub cpu_frame_time: f64,
}

#[derive(Debug, Default)]
struct Window {
    elapsed: f64,
    frames: u32,
    prepare_time: f64,
    published: StatisticsSnapshot,
}

#[derive(Debug, Default)]
pub struct Statistics {
    draw_calls: AtomicU64,
    window: Mutex<Window>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one draw call (any thread)
    pub fn add_draw_call(&self) {
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Draw calls counted since the last publication
    pub fn pending_draw_calls(&self) -> u64 {
        self.draw_calls.load(Ordering::Relaxed)
    }

    pub fn add_frame_prepare_time(&self, seconds: f64) {
        if let Ok(mut window) = self.window.lock() {
            window.prepare_time += seconds;
        }
    }

    /// Close a frame that lasted `delta_seconds`
    pub fn next_frame(&self, delta_seconds: f64) {
        let Ok(mut window) = self.window.lock() else {
            return;
        };
        window.elapsed += delta_seconds;
        window.frames += 1;
        if window.elapsed < 1.0 {
            return;
        }

        let fps = window.frames;
        let draws = self.draw_calls.swap(0, Ordering::Relaxed);
        window.published = StatisticsSnapshot {
            fps,
            draw_calls: (draws as f64 / fps as f64).round() as u32,
            cpu_frame_time: window.prepare_time / fps as f64,
        };
        window.elapsed = 0.0;
        window.frames = 0;
        window.prepare_time = 0.0;

        crate::engine_trace!(
            "j4f::frame",
            "{} fps, {} draws/frame, {:.3} ms cpu",
            fps, window.published.draw_calls, window.published.cpu_frame_time * 1000.0
        );
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.window.lock().map(|w| w.published).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "statistics_tests.rs"]
mod tests;
