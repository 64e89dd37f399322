//! Unit tests for statistics.rs

use crate::frame::statistics::*;

// ============================================================================
// PUBLICATION WINDOW
// ============================================================================

#[test]
fn test_nothing_published_before_one_second() {
    let stats = Statistics::new();
    for _ in 0..10 {
        stats.add_draw_call();
        stats.next_frame(0.05);
    }
    assert_eq!(stats.snapshot(), StatisticsSnapshot::default());
    assert_eq!(stats.pending_draw_calls(), 10);
}

#[test]
fn test_publishes_averages_after_one_second() {
    let stats = Statistics::new();
    for _ in 0..4 {
        for _ in 0..3 {
            stats.add_draw_call();
        }
        stats.add_frame_prepare_time(0.002);
        stats.next_frame(0.25);
    }

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.fps, 4);
    assert_eq!(snapshot.draw_calls, 3);
    assert!((snapshot.cpu_frame_time - 0.002).abs() < 1e-9);
    assert_eq!(stats.pending_draw_calls(), 0);
}

#[test]
fn test_draw_call_average_rounds() {
    let stats = Statistics::new();
    // 5 draws over 2 frames -> 2.5 -> 3
    for _ in 0..5 {
        stats.add_draw_call();
    }
    stats.next_frame(0.5);
    stats.next_frame(0.5);
    assert_eq!(stats.snapshot().draw_calls, 3);
}

#[test]
fn test_window_restarts_after_publication() {
    let stats = Statistics::new();
    stats.next_frame(1.0);
    assert_eq!(stats.snapshot().fps, 1);

    stats.next_frame(0.5);
    stats.next_frame(0.5);
    assert_eq!(stats.snapshot().fps, 2);
}

#[test]
fn test_concurrent_draw_calls() {
    let stats = std::sync::Arc::new(Statistics::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let stats = std::sync::Arc::clone(&stats);
            std::thread::spawn(move || {
                for _ in 0..250 {
                    stats.add_draw_call();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(stats.pending_draw_calls(), 1000);
}
