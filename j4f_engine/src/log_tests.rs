//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry and DefaultLogger formatting/filtering.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "j4f::test".to_string(),
        message: format!("{:?} message", severity),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_labels_are_fixed_width() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        assert_eq!(severity.label().len(), 5);
    }
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_clone() {
    let entry1 = entry(LogSeverity::Warn, Some("test.rs"), Some(10));
    let entry2 = entry1.clone();

    assert_eq!(entry1.severity, entry2.severity);
    assert_eq!(entry1.source, entry2.source);
    assert_eq!(entry1.message, entry2.message);
    assert_eq!(entry1.file, entry2.file);
    assert_eq!(entry1.line, entry2.line);
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_format_plain_without_location() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Info, None, None));
    assert!(text.contains("[INFO ]"));
    assert!(text.contains("[j4f::test]"));
    assert!(text.ends_with("Info message"));
}

#[test]
fn test_format_plain_with_location() {
    let text = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("vulkan.rs"), Some(123)));
    assert!(text.contains("[ERROR]"));
    assert!(text.ends_with("(vulkan.rs:123)"));
}

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger::new();
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        // Just verify it doesn't panic
        logger.log(&entry(severity, None, None));
        logger.log(&entry(severity, Some("test.rs"), Some(42)));
    }
}

#[test]
fn test_default_logger_min_severity() {
    let logger = DefaultLogger::with_min_severity(LogSeverity::Warn);
    assert_eq!(logger.min_severity, LogSeverity::Warn);
    // Filtered entry, nothing printed
    logger.log(&entry(LogSeverity::Debug, None, None));
    assert_eq!(DefaultLogger::default().min_severity, LogSeverity::Trace);
}
