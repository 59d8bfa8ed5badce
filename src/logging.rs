//! Tracing setup
//!
//! Human-readable output in development, JSON everywhere else. `RUST_LOG`
//! takes precedence over the configured level. An optional log file receives
//! JSON lines and is rotated by size.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Settings;

/// Rotate once the active file reaches 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the active one
pub const DEFAULT_MAX_FILES: usize = 5;

/// Install the global subscriber
pub fn init_tracing(settings: &Settings, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level))
    };

    let console = if settings.is_development() {
        fmt::layer().pretty().with_filter(filter()).boxed()
    } else {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_filter(filter())
            .boxed()
    };

    let file = match log_file {
        Some(path) => {
            let writer = RotatingFileWriter::with_defaults(path)?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(filter())
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;

    if let Some(path) = log_file {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    Ok(())
}

/// Size-based rotating file writer: `api.log`, `api.log.1`, `api.log.2`, ...
#[derive(Debug, Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

#[derive(Debug)]
struct RotatingFile {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    max_size: u64,
    max_files: usize,
}

impl RotatingFileWriter {
    pub fn new(path: impl AsRef<Path>, max_size: u64, max_files: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = open_append(&path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFile {
                path,
                file: Some(file),
                written,
                max_size,
                max_files,
            })),
        })
    }

    pub fn with_defaults(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(path, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl RotatingFile {
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;

        // Shift api.log.N -> api.log.N+1, dropping the oldest
        for index in (1..=self.max_files).rev() {
            let from = self.rotated(index);
            if !from.exists() {
                continue;
            }
            if index == self.max_files {
                fs::remove_file(&from).ok();
            } else {
                fs::rename(&from, self.rotated(index + 1)).ok();
            }
        }

        if self.max_files > 0 && self.path.exists() {
            fs::rename(&self.path, self.rotated(1))?;
        } else if self.path.exists() {
            fs::remove_file(&self.path)?;
        }

        self.file = Some(open_append(&self.path)?);
        self.written = 0;
        Ok(())
    }

    fn rotated(&self, index: usize) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "api.log".to_string());
        self.path.with_file_name(format!("{}.{}", name, index))
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.written > 0 && inner.written + buf.len() as u64 > inner.max_size {
            inner.rotate()?;
        }

        let file = inner
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file not open"))?;
        let n = file.write(buf)?;
        inner.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> fmt::MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
