//! Error types for the J4F engine
//!
//! This module defines the error types used throughout the engine,
//! including GPU object creation, shader reflection and frame submission.

use std::fmt;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, parameter, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, subsystems)
    InitializationFailed(String),

    /// Shader binary could not be reflected
    ReflectionFailed(String),

    /// A dynamic buffer ran out of slots for the current frame
    CapacityExhausted { capacity: u32 },

    /// The GPU device was lost during submission
    DeviceLost,

    /// A push-constant block does not fit the staging area
    PushConstantOverflow { size: u32, limit: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ReflectionFailed(msg) => write!(f, "Shader reflection failed: {}", msg),
            Error::CapacityExhausted { capacity } => {
                write!(f, "Dynamic buffer capacity exhausted ({} elements)", capacity)
            }
            Error::DeviceLost => write!(f, "GPU device lost"),
            Error::PushConstantOverflow { size, limit } => {
                write!(f, "Push constants need {} bytes, limit is {}", size, limit)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
