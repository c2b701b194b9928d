use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::Local;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    /// Map `-v` occurrences and `--debug` onto a level.
    pub fn from_verbosity(verbose: u8, debug: bool) -> Self {
        if debug {
            return LogLevel::Debug;
        }
        match verbose {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
// While the TUI owns the terminal, records go to a file instead of stderr.
static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

pub fn init(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: LogLevel) -> bool {
    LOG_LEVEL.load(Ordering::Relaxed) >= level as u8
}

pub fn redirect_to_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    if let Ok(mut sink) = LOG_FILE.lock() {
        *sink = Some(file);
    }
    Ok(())
}

pub fn redirect_to_stderr() {
    if let Ok(mut sink) = LOG_FILE.lock() {
        *sink = None;
    }
}

pub fn error(message: impl AsRef<str>) {
    log(LogLevel::Error, "error", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    log(LogLevel::Warn, "warn", message.as_ref());
}

pub fn info(message: impl AsRef<str>) {
    log(LogLevel::Info, "info", message.as_ref());
}

pub fn debug(message: impl AsRef<str>) {
    log(LogLevel::Debug, "debug", message.as_ref());
}

fn log(level: LogLevel, label: &str, message: &str) {
    if !enabled(level) {
        return;
    }
    if let Ok(mut sink) = LOG_FILE.lock()
        && let Some(file) = sink.as_mut()
    {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "{} [{}] {}", stamp, label, message);
        return;
    }
    eprintln!("[{}] {}", label, message);
}
