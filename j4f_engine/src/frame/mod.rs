//! Frame loop state and statistics

pub mod frame_state;
pub mod statistics;

pub use frame_state::*;
pub use statistics::*;
