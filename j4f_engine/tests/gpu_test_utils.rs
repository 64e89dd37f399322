#![allow(dead_code)]
//! GPU test utilities - one Vulkan device shared by every GPU test
//!
//! `ash-window` refuses to create a second surface for the same window on
//! some platforms, so the device and its hidden window are created once per
//! test process and shared.

use j4f_engine::j4f::render::Config;
use j4f_engine_renderer_vulkan::j4f::VulkanGraphicsDevice;
use std::sync::{Arc, OnceLock};
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

static GPU_DEVICE: OnceLock<Arc<VulkanGraphicsDevice>> = OnceLock::new();

/// Kept alive for the surface; the event loop is leaked
static GPU_WINDOW: OnceLock<Window> = OnceLock::new();

/// Shared device, created on first use
pub fn get_test_device() -> Arc<VulkanGraphicsDevice> {
    GPU_DEVICE
        .get_or_init(|| {
            let (window, event_loop) = create_test_window();
            let device = VulkanGraphicsDevice::new(&window, Config { frames_in_flight: 2, ..Config::default() })
                .expect("Failed to create VulkanGraphicsDevice for tests");

            // EventLoop is not Sync and cannot live in a static
            std::mem::forget(event_loop);
            GPU_WINDOW.set(window).ok();

            Arc::new(device)
        })
        .clone()
}

/// Hidden 800x600 window
#[allow(deprecated)]
pub fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = {
        #[cfg(target_os = "windows")]
        {
            EventLoopBuilder::new().with_any_thread(true).build().unwrap()
        }
        #[cfg(not(target_os = "windows"))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };

    let attributes = Window::default_attributes()
        .with_title("GPU Test Window")
        .with_inner_size(winit::dpi::LogicalSize::new(800, 600))
        .with_visible(false);

    let window = event_loop.create_window(attributes).unwrap();
    (window, event_loop)
}
