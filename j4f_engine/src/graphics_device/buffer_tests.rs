//! Unit tests for buffer.rs

use crate::graphics_device::buffer::{align_up, check_buffer_range};
use crate::error::Error;

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 256), 0);
    assert_eq!(align_up(1, 256), 256);
    assert_eq!(align_up(80, 64), 128);
    assert_eq!(align_up(256, 256), 256);
    assert_eq!(align_up(77, 0), 77);
    assert_eq!(align_up(77, 1), 77);
}

#[test]
fn test_check_buffer_range() {
    assert!(check_buffer_range(64, 0, 64).is_ok());
    assert!(check_buffer_range(64, 60, 4).is_ok());
    assert!(matches!(check_buffer_range(64, 61, 4), Err(Error::InvalidResource(_))));
    assert!(check_buffer_range(64, u64::MAX, 1).is_err());
}
