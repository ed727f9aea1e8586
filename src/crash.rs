//! Crash reporting and panic handling.

use std::backtrace::Backtrace;
use std::fs;
use std::panic::PanicHookInfo;

use crate::config::paths;
use crate::types::APP_NAME;

/// Install the panic hook for crash reporting.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        handle_panic(panic_info);
    }));
}

fn handle_panic(panic_info: &PanicHookInfo) {
    let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };

    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "unknown location".to_string());

    let thread = std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string();

    tracing::error!(%message, %location, %thread, "Panic");

    let report = build_crash_report(&message, &location, &thread, &Backtrace::force_capture());
    let crash_file = write_crash_report(&report);

    show_crash_dialog(&message, crash_file.as_deref());
}

fn build_crash_report(
    message: &str,
    location: &str,
    thread: &str,
    backtrace: &Backtrace,
) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let os = std::env::consts::OS;

    format!(
        r#"{APP_NAME} Server Crash Report
==========================

Version: {version}
Timestamp: {timestamp}
OS: {os}
Thread: {thread}

Panic Message:
{message}

Location:
{location}

Backtrace:
{backtrace}
"#
    )
}

fn write_crash_report(report: &str) -> Option<String> {
    let log_dir = paths::log_dir().ok()?;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = log_dir.join(format!("crash_{}.txt", timestamp));

    fs::write(&path, report).ok()?;
    Some(path.display().to_string())
}

#[cfg(windows)]
fn show_crash_dialog(message: &str, crash_file: Option<&str>) {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK};

    let file_info = crash_file
        .map(|f| format!("\n\nCrash report saved to:\n{}", f))
        .unwrap_or_default();
    let text = format!("{APP_NAME} has crashed unexpectedly:\n\n{message}{file_info}");
    let title = format!("{APP_NAME} - Crash");

    let title_wide: Vec<u16> = OsStr::new(&title).encode_wide().chain(Some(0)).collect();
    let text_wide: Vec<u16> = OsStr::new(&text).encode_wide().chain(Some(0)).collect();

    unsafe {
        MessageBoxW(0, text_wide.as_ptr(), title_wide.as_ptr(), MB_OK | MB_ICONERROR);
    }
}

#[cfg(not(windows))]
fn show_crash_dialog(message: &str, crash_file: Option<&str>) {
    eprintln!("{APP_NAME} crashed: {message}");
    if let Some(f) = crash_file {
        eprintln!("Crash report saved to: {}", f);
    }
}
