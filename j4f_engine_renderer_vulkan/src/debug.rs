/// Vulkan debug messenger - validation layer output with colors, file logging and statistics

use ash::vk;
use colored::*;
use j4f_engine::j4f::render::{DebugSeverity, DebugOutput, DebugMessageFilter, ValidationStats};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Callback configuration, None while no messenger is alive
static DEBUG_CONFIG: Mutex<Option<Config>> = Mutex::new(None);

static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrence count per message text
static MESSAGE_COUNTS: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Debug configuration for the callback
#[derive(Clone)]
pub struct Config {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    pub break_on_error: bool,
    pub panic_on_error: bool,
    pub enable_stats: bool,
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Install the callback configuration and reset statistics
pub fn init_debug_config(config: Config) {
    VALIDATION_STATS.reset();
    *MESSAGE_COUNTS.lock().unwrap_or_else(PoisonError::into_inner) = Some(FxHashMap::default());
    *DEBUG_CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = Some(config);
}

/// Stop reacting to messages (called before the messenger is destroyed)
pub fn cleanup_debug_config() {
    *DEBUG_CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Counters collected since the last device creation
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "✓ No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    let counts = MESSAGE_COUNTS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(counts) = counts.as_ref() {
        let repeated = counts.values().filter(|&&c| c > 1).count();
        if repeated > 0 {
            println!("\n  {} {} message(s) appeared multiple times", "ℹ".cyan(), repeated);
        }
    }
    println!("{}\n", "=============================".bright_blue().bold());
}

/// Whether `severity` passes the configured threshold
pub(crate) fn severity_passes(threshold: DebugSeverity, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
    match threshold {
        DebugSeverity::ErrorsOnly => severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
        DebugSeverity::ErrorsAndWarnings => severity.intersects(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        ),
        DebugSeverity::All => true,
    }
}

/// Messenger severity mask for a configured threshold
pub(crate) fn severity_flags(threshold: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match threshold {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

fn category_passes(filter: &DebugMessageFilter, message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> bool {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        filter.show_validation
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        filter.show_performance
    } else {
        filter.show_general
    }
}

fn count_occurrence(message: &str) -> u32 {
    let mut counts = MESSAGE_COUNTS.lock().unwrap_or_else(PoisonError::into_inner);
    let counts = counts.get_or_insert_with(FxHashMap::default);
    let count = counts.entry(message.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Vulkan debug messenger callback
///
/// # Safety
///
/// Called by the validation layers with a valid callback data pointer.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_str().unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message).to_str().unwrap_or("Invalid UTF-8")
    };

    let config = match DEBUG_CONFIG.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        Some(config) => config.clone(),
        None => return vk::FALSE,
    };

    if !severity_passes(config.severity, message_severity)
        || !category_passes(&config.message_filter, message_type)
    {
        return vk::FALSE;
    }

    let is_error = message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
    let (severity_str, severity_colored, counter) = if is_error {
        ("ERROR", "ERROR".red().bold(), &VALIDATION_STATS.errors)
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        ("WARNING", "WARNING".yellow().bold(), &VALIDATION_STATS.warnings)
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        ("INFO", "INFO".cyan(), &VALIDATION_STATS.info)
    } else {
        ("VERBOSE", "VERBOSE".bright_black(), &VALIDATION_STATS.verbose)
    };

    let occurrences = if config.enable_stats {
        counter.fetch_add(1, Ordering::Relaxed);
        count_occurrence(message)
    } else {
        1
    };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    let repeat = if occurrences > 1 { format!(" [×{}]", occurrences) } else { String::new() };

    let console_output = format!(
        "{} {} [{}]{}\n  ├─ {}: {}\n  └─ {}\n",
        "[VULKAN".bright_blue().bold(),
        format!("{}]", severity_colored).bright_blue().bold(),
        type_str.bright_black(),
        repeat.yellow(),
        "Message ID".bright_black(),
        message_id.white(),
        message.white()
    );
    let file_output = format!(
        "[VULKAN {}] [{}]{}\n  ├─ Message ID: {}\n  └─ {}\n",
        severity_str, type_str, repeat, message_id, message
    );

    match &config.output {
        DebugOutput::Console => eprint!("{}", console_output),
        DebugOutput::File(path) => write_to_file(path, &file_output),
        DebugOutput::Both(path) => {
            eprint!("{}", console_output);
            write_to_file(path, &file_output);
        }
    }

    if config.panic_on_error && is_error {
        panic!("Vulkan validation error (strict mode)\nMessage ID: {}\nMessage: {}", message_id, message);
    }

    if config.break_on_error && is_error {
        eprintln!(
            "\n{}\n  Context: {} [{}]\n  Message: {}\n",
            "BREAK ON VALIDATION ERROR - Aborting execution".red().bold(),
            message_id.yellow(),
            type_str.cyan(),
            message.white()
        );
        std::process::abort();
    }

    vk::FALSE
}

fn write_to_file(path: &Path, message: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", message);
    }
}
