use std::io::{self, IsTerminal, Stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing_subscriber::fmt::MakeWriter;

use skep_core::upload::UploadEvent;

use crate::format::format_bytes;

const PROGRESS_REDRAW_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_PROGRESS_COLUMNS: usize = 120;

// ---------------------------------------------------------------------------
// Shared state between the progress renderer and the tracing writer
// ---------------------------------------------------------------------------

/// True while an upload progress line is being displayed on stderr.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes all stderr writes between the progress renderer and tracing.
static STDERR_LOCK: Mutex<()> = Mutex::new(());

fn acquire_stderr_lock() -> MutexGuard<'static, ()> {
    STDERR_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Progress-aware tracing writer
// ---------------------------------------------------------------------------

/// A [`MakeWriter`] that clears the progress line before each tracing event,
/// so log messages never tear the `\r`-based progress display.
pub(crate) struct ProgressAwareStderr;

/// Holds the `STDERR_LOCK` guard for the lifetime of one tracing write, so
/// the lock spans from the line-clear through the full log message.
pub(crate) struct ProgressWriter {
    _guard: MutexGuard<'static, ()>,
    inner: Stderr,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareStderr {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let guard = acquire_stderr_lock();
        let mut stderr = io::stderr();

        if PROGRESS_ACTIVE.load(Relaxed) && stderr.is_terminal() {
            // Clear the current progress line so the log message starts clean.
            let _ = stderr.write_all(b"\r\x1b[2K");
        }

        ProgressWriter {
            _guard: guard,
            inner: stderr,
        }
    }
}

// ---------------------------------------------------------------------------
// Upload progress renderer
// ---------------------------------------------------------------------------

pub(crate) struct UploadProgressRenderer {
    current: Option<String>,
    shards_done: u64,
    shards_failed: u64,
    plaintext_bytes: u64,
    stored_bytes: u64,
    last_draw: Instant,
    last_line_len: usize,
    rendered_any: bool,
}

impl UploadProgressRenderer {
    pub(crate) fn new() -> Self {
        PROGRESS_ACTIVE.store(true, Relaxed);
        Self {
            current: None,
            shards_done: 0,
            shards_failed: 0,
            plaintext_bytes: 0,
            stored_bytes: 0,
            last_draw: Instant::now(),
            last_line_len: 0,
            rendered_any: false,
        }
    }

    pub(crate) fn on_event(&mut self, event: &UploadEvent) {
        let should_render = match event {
            UploadEvent::Begin {
                file_name,
                piece_number,
                ..
            } => {
                self.current = Some(format!("{file_name} #{piece_number}"));
                true
            }
            UploadEvent::Finished {
                plaintext_length,
                stored_length,
                ..
            } => {
                self.shards_done += 1;
                self.plaintext_bytes += plaintext_length;
                self.stored_bytes += stored_length;
                true
            }
            UploadEvent::Failed { .. } => {
                self.shards_failed += 1;
                true
            }
            UploadEvent::TierChanged { .. } => false,
        };

        if should_render {
            self.render(false);
        }
    }

    pub(crate) fn finish(&mut self) {
        if !self.rendered_any {
            PROGRESS_ACTIVE.store(false, Relaxed);
            return;
        }
        self.render(true);
        // Final newline under the lock so it doesn't race with tracing.
        {
            let _guard = acquire_stderr_lock();
            eprintln!();
        }
        PROGRESS_ACTIVE.store(false, Relaxed);
        self.rendered_any = false;
        self.last_line_len = 0;
    }

    fn render(&mut self, force: bool) {
        if !force && self.rendered_any && self.last_draw.elapsed() < PROGRESS_REDRAW_INTERVAL {
            return;
        }
        self.last_draw = Instant::now();

        let current = self.current.as_deref().unwrap_or("-");
        let failed_suffix = if self.shards_failed > 0 {
            format!(", Failed: {}", self.shards_failed)
        } else {
            String::new()
        };
        let prefix = format!(
            "Shards: {}, Uploaded: {}, Stored: {}{failed_suffix}, Current: ",
            self.shards_done,
            format_bytes(self.plaintext_bytes),
            format_bytes(self.stored_bytes),
        );

        let columns = terminal_columns().saturating_sub(5);
        let available = columns.saturating_sub(prefix.chars().count());
        let line = format!("{prefix}{}", truncate_middle(current, available));
        let line_len = line.chars().count();
        let pad_len = self.last_line_len.saturating_sub(line_len);

        {
            let _guard = acquire_stderr_lock();
            eprint!("\r{line}{}", " ".repeat(pad_len));
            let _ = io::stderr().flush();
        }

        self.last_line_len = line_len;
        self.rendered_any = true;
    }
}

fn terminal_columns() -> usize {
    terminal_columns_os()
        .or_else(|| {
            std::env::var("COLUMNS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&v| v > 0)
        })
        .unwrap_or(DEFAULT_PROGRESS_COLUMNS)
}

/// Query the OS for the terminal width of stderr.
#[cfg(unix)]
fn terminal_columns_os() -> Option<usize> {
    use libc::{ioctl, winsize, STDERR_FILENO, TIOCGWINSZ};
    unsafe {
        let mut ws: winsize = std::mem::zeroed();
        if ioctl(STDERR_FILENO, TIOCGWINSZ, &mut ws) == 0 && ws.ws_col > 0 {
            Some(ws.ws_col as usize)
        } else {
            None
        }
    }
}

#[cfg(windows)]
fn terminal_columns_os() -> Option<usize> {
    use windows_sys::Win32::System::Console::{
        GetConsoleScreenBufferInfo, GetStdHandle, CONSOLE_SCREEN_BUFFER_INFO, STD_ERROR_HANDLE,
    };
    unsafe {
        let handle = GetStdHandle(STD_ERROR_HANDLE);
        let mut info: CONSOLE_SCREEN_BUFFER_INFO = std::mem::zeroed();
        if GetConsoleScreenBufferInfo(handle, &mut info) != 0 {
            let width = (info.srWindow.Right - info.srWindow.Left + 1) as usize;
            if width > 0 {
                return Some(width);
            }
        }
        None
    }
}

#[cfg(not(any(unix, windows)))]
fn terminal_columns_os() -> Option<usize> {
    None
}

/// Truncate to `max_chars`, keeping the start and end with `...` between
/// (e.g. `docs/ve...eport.pdf`). Shard labels are mostly ASCII paths, so
/// plain char counting is close enough for a progress line.
fn truncate_middle(input: &str, max_chars: usize) -> String {
    let total = input.chars().count();
    if total <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }

    let keep = max_chars - 3;
    let head = keep / 2;
    let tail = keep - head;
    let head_str: String = input.chars().take(head).collect();
    let tail_str: String = input.chars().skip(total - tail).collect();
    format!("{head_str}...{tail_str}")
}
