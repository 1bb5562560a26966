use anyhow::{Context, Result};
use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_PREFIX: &str = "voicerelay-";
pub const LOG_FILE_SUFFIX: &str = ".log";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Where log lines go once the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Console,
    /// One file per UTC hour under `dir`. `None` retention keeps every file.
    HourlyFiles {
        dir: PathBuf,
        retention_days: Option<u32>,
    },
}

impl LogTarget {
    /// `VOICERELAY_LOG_DIR` selects file logging; anything else logs to stderr.
    pub fn from_env() -> Self {
        match std::env::var("VOICERELAY_LOG_DIR") {
            Ok(dir) if !dir.trim().is_empty() => LogTarget::HourlyFiles {
                dir: PathBuf::from(dir.trim()),
                retention_days: Some(DEFAULT_RETENTION_DAYS),
            },
            _ => LogTarget::Console,
        }
    }
}

pub fn init_logging(target: &LogTarget) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    match target {
        LogTarget::Console => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogTarget::HourlyFiles {
            dir,
            retention_days,
        } => {
            let log = HourlyLog::open(dir, *retention_days, Utc::now())?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(log)
                .init();
        }
    }
    Ok(())
}

fn hour_start(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::hours(1)).unwrap_or(t)
}

fn log_file_name(hour: DateTime<Utc>) -> String {
    format!(
        "{LOG_FILE_PREFIX}{}{LOG_FILE_SUFFIX}",
        hour.format("%Y-%m-%d-%H")
    )
}

fn open_hour_file(dir: &Path, hour: DateTime<Utc>) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(log_file_name(hour)))
}

#[derive(Debug)]
struct HourFile {
    hour: DateTime<Utc>,
    file: File,
}

/// Appends to `voicerelay-YYYY-MM-DD-HH.log`, moving to a new file when the
/// UTC hour changes and sweeping expired files at each switch.
#[derive(Clone, Debug)]
struct HourlyLog {
    dir: PathBuf,
    retention_days: Option<u32>,
    current: Arc<Mutex<HourFile>>,
}

impl HourlyLog {
    fn open(dir: &Path, retention_days: Option<u32>, now: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        if let Some(days) = retention_days {
            cleanup_old_logs(dir, now, days)?;
        }
        let hour = hour_start(now);
        let file = open_hour_file(dir, hour)
            .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            retention_days,
            current: Arc::new(Mutex::new(HourFile { hour, file })),
        })
    }

    fn write_at(&self, now: DateTime<Utc>, buf: &[u8]) -> io::Result<usize> {
        let hour = hour_start(now);
        let mut current = self
            .current
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?;

        if current.hour != hour {
            current.file.flush()?;
            *current = HourFile {
                hour,
                file: open_hour_file(&self.dir, hour)?,
            };
            if let Some(days) = self.retention_days {
                // Logging must keep going even if a stale file can't be removed.
                let _ = cleanup_old_logs(&self.dir, now, days);
            }
        }

        current.file.write(buf)
    }
}

impl<'a> MakeWriter<'a> for HourlyLog {
    type Writer = HourlyLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for HourlyLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(Utc::now(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?
            .file
            .flush()
    }
}

/// Parses `voicerelay-YYYY-MM-DD-HH.log` into the hour it covers.
fn parse_log_hour(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(&format!("{stamp}:00:00"), "%Y-%m-%d-%H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}

/// Deletes log files whose hour is older than `retention_days` before `now`.
/// Returns how many were removed; other files in `dir` are left alone.
pub fn cleanup_old_logs(dir: &Path, now: DateTime<Utc>, retention_days: u32) -> Result<usize> {
    let cutoff = now - Duration::days(i64::from(retention_days));
    let entries = match fs::read_dir(dir) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        let expired = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_log_hour)
            .is_some_and(|hour| hour < cutoff);
        if expired && path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove old log {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
