//! Log destinations.

use crate::config::LoggerConfig;
use crate::format;
use crate::types::{LogEntry, LogLevel};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// A destination for log entries.
///
/// Sinks read the live configuration on every write, so toggles and
/// directories changed through `Logger::update_config` apply immediately.
pub trait LogSink: Send + Sync {
    /// Name used when reporting sink failures
    fn name(&self) -> &str;

    /// Whether this sink takes entries under `config`
    fn enabled(&self, _config: &LoggerConfig) -> bool {
        true
    }

    /// Write one entry
    fn write(&self, entry: &LogEntry, config: &LoggerConfig) -> io::Result<()>;

    /// Flush any internal buffering
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes to stdout (debug, info) or stderr (warn and above).
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn enabled(&self, config: &LoggerConfig) -> bool {
        config.enable_console
    }

    fn write(&self, entry: &LogEntry, config: &LoggerConfig) -> io::Result<()> {
        let line = if config.environment.is_production() {
            format::json_line(entry)
        } else {
            format::pretty(entry)
        };

        if entry.level >= LogLevel::Warn {
            writeln!(io::stderr().lock(), "{}", line)
        } else {
            writeln!(io::stdout().lock(), "{}", line)
        }
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().flush()?;
        io::stderr().flush()
    }
}

/// Appends JSON lines to one file per service, level and calendar day.
///
/// Open handles are kept per file; handles from earlier days are closed
/// when the first entry of a new day arrives.
#[derive(Debug, Default)]
pub struct FileSink {
    files: Mutex<HashMap<PathBuf, OpenFile>>,
}

#[derive(Debug)]
struct OpenFile {
    date: NaiveDate,
    file: File,
}

impl FileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{service}-{level}-{YYYY-MM-DD}.log`
    pub fn file_name(service: &str, level: LogLevel, date: NaiveDate) -> String {
        format!("{}-{}-{}.log", service, level, date.format("%Y-%m-%d"))
    }

    pub fn path_for(config: &LoggerConfig, entry: &LogEntry) -> PathBuf {
        config.log_directory.join(Self::file_name(
            &config.service,
            entry.level,
            entry.timestamp.date_naive(),
        ))
    }

    /// Number of files currently held open.
    pub fn open_files(&self) -> usize {
        self.files.lock().len()
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn enabled(&self, config: &LoggerConfig) -> bool {
        config.enable_file_logging
    }

    fn write(&self, entry: &LogEntry, config: &LoggerConfig) -> io::Result<()> {
        let mut line = format::json_line(entry);
        line.push('\n');
        let path = Self::path_for(config, entry);
        let date = entry.timestamp.date_naive();

        let mut files = self.files.lock();
        if !files.contains_key(&path) {
            std::fs::create_dir_all(&config.log_directory)?;
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            files.retain(|_, open| open.date >= date);
            files.insert(path.clone(), OpenFile { date, file });
        }

        let result = match files.get_mut(&path) {
            Some(open) => open.file.write_all(line.as_bytes()),
            None => Ok(()),
        };
        if result.is_err() {
            // Reopen on the next write
            files.remove(&path);
        }
        result
    }

    fn flush(&self) -> io::Result<()> {
        for open in self.files.lock().values_mut() {
            open.file.flush()?;
        }
        Ok(())
    }
}

/// Keeps the most recent entries in memory.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&self, entry: &LogEntry, _config: &LoggerConfig) -> io::Result<()> {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Ok(())
    }
}
