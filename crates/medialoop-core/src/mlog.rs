//! Leveled debug output for the medialoop runtime.
//!
//! Thread-safe stderr logging in the style of kernel printk. The reactor is
//! timing-sensitive, so there is no formatting machinery beyond `format_args!`
//! and no allocation on the disabled path.
//!
//! # Environment Variables
//!
//! - `MLOOP_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//! - `MLOOP_FLUSH_LOG=1` - flush stderr after every line (crash debugging)
//!
//! # Usage
//!
//! ```ignore
//! use medialoop_core::{minfo, mdebug, mwarn};
//!
//! minfo!("reactor started");
//! mdebug!("registered source fd={} name={}", fd, name);
//! mwarn!("message ring full, dropping");
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log severity, ordered from quietest to noisiest.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    /// Fixed-width tag printed in front of each line.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Read `MLOOP_LOG_LEVEL` / `MLOOP_FLUSH_LOG`.
///
/// Runs automatically on the first log call; call it explicitly when
/// deterministic startup ordering matters.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(val) = std::env::var("MLOOP_LOG_LEVEL") {
        LOG_LEVEL.store(LogLevel::parse(&val) as u8, Ordering::Relaxed);
    }
    if let Ok(val) = std::env::var("MLOOP_FLUSH_LOG") {
        let on = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH.store(on, Ordering::Relaxed);
    }
}

/// Current log level.
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Override the log level programmatically (wins over the environment).
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check whether a level would currently be emitted.
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Internal: emit one tagged line under the stderr lock.
#[doc(hidden)]
pub fn _emit(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.label());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if FLUSH.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

/// Error level log.
#[macro_export]
macro_rules! merror {
    ($($arg:tt)*) => {{
        $crate::mlog::_emit($crate::mlog::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log.
#[macro_export]
macro_rules! mwarn {
    ($($arg:tt)*) => {{
        $crate::mlog::_emit($crate::mlog::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log.
#[macro_export]
macro_rules! minfo {
    ($($arg:tt)*) => {{
        $crate::mlog::_emit($crate::mlog::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log.
#[macro_export]
macro_rules! mdebug {
    ($($arg:tt)*) => {{
        $crate::mlog::_emit($crate::mlog::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log (per-iteration noise lives here).
#[macro_export]
macro_rules! mtrace {
    ($($arg:tt)*) => {{
        $crate::mlog::_emit($crate::mlog::LogLevel::Trace, format_args!($($arg)*));
    }};
}
