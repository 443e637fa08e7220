// Logging setup and the in-memory log buffer shown by the UI

use chrono::Utc;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_BUFFER_LINES: usize = 2000;

/// Bounded buffer of the last formatted log lines, optionally mirrored to a
/// live log file.
#[derive(Clone, Default)]
pub struct LogBuffer {
  lines: Arc<Mutex<VecDeque<String>>>,
  live_log: Option<Arc<Mutex<File>>>,
}

impl LogBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Also append every line to `path`.
  pub fn with_live_log(path: &Path) -> io::Result<Self> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir)?;
    }
    let file = File::options().create(true).append(true).open(path)?;
    Ok(Self {
      lines: Arc::default(),
      live_log: Some(Arc::new(Mutex::new(file))),
    })
  }

  pub fn push(&self, line: &str) {
    let line = format!("[{}] {}", Utc::now().format("%H:%M:%S%.3f"), line);

    if let Some(file) = &self.live_log {
      if let Ok(mut f) = file.lock() {
        // a failing live log must never take logging down with it
        let _ = writeln!(f, "{}", line);
      }
    }

    if let Ok(mut lines) = self.lines.lock() {
      lines.push_back(line);
      while lines.len() > LOG_BUFFER_LINES {
        lines.pop_front();
      }
    }
  }

  pub fn lines(&self) -> Vec<String> {
    match self.lines.lock() {
      Ok(lines) => lines.iter().cloned().collect(),
      Err(_) => Vec::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.lines.lock().map(|l| l.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    if let Ok(mut lines) = self.lines.lock() {
      lines.clear();
    }
  }

  /// Everything buffered, one line per entry.
  pub fn dump(&self) -> String {
    self.lines().join("\n")
  }
}

/// Collects one formatted event and hands its lines to the buffer on drop.
pub struct LogBufferWriter {
  buffer: LogBuffer,
  pending: Vec<u8>,
}

impl Write for LogBufferWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.pending.extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl Drop for LogBufferWriter {
  fn drop(&mut self) {
    let text = String::from_utf8_lossy(&self.pending);
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
      self.buffer.push(line);
    }
  }
}

impl<'a> MakeWriter<'a> for LogBuffer {
  type Writer = LogBufferWriter;

  fn make_writer(&'a self) -> Self::Writer {
    LogBufferWriter {
      buffer: self.clone(),
      pending: Vec::new(),
    }
  }
}

/// Install the global subscriber: stdout plus the returned buffer.
///
/// `RUST_LOG` takes precedence over `default_filter`. If a subscriber is
/// already installed the buffer is still returned but receives nothing.
pub fn init_logging(default_filter: &str) -> LogBuffer {
  init_logging_with(default_filter, LogBuffer::new())
}

pub fn init_logging_with(default_filter: &str, buffer: LogBuffer) -> LogBuffer {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

  let result = tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_target(false))
    .with(
      fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .without_time()
        .with_writer(buffer.clone()),
    )
    .try_init();

  if result.is_err() {
    tracing::debug!("[Logging] Subscriber already installed, keeping it");
  }
  buffer
}
