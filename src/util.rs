use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install a `tracing` subscriber driven by `RUST_LOG` (default `info`). Later calls are no-ops,
/// so every entry point can call this unconditionally.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

// -------- robust file ops with backoff (AV scanners, sharing violations, network shares) --------

const DEFAULT_TRIES: usize = 16;
const DEFAULT_DELAY_MS: u64 = 50;

/// Transient OS error codes worth retrying. The snapshot tree is commonly kept on Windows
/// desktops next to the spreadsheet tooling, so these are mostly Windows codes:
///   5 access denied, 21 device not ready, 32 sharing violation, 33 lock violation,
///   225 AV blocked, 1006 volume altered, 1117 device error, 1224 user-mapped section open.
fn is_retriable_io_error(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(5) | Some(21) | Some(32) | Some(33) | Some(225) | Some(1006) | Some(1117) | Some(1224)
    )
}

/// Run `op` until it succeeds, fails with a non-retriable error, or `tries` is exhausted.
/// The delay grows linearly with the attempt number.
fn retry_io<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for attempt in 1..=tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

pub fn open_with_backoff(path: &Path) -> io::Result<File> {
    retry_io(DEFAULT_TRIES, DEFAULT_DELAY_MS, || File::open(path))
}

pub fn create_with_backoff(path: &Path) -> io::Result<File> {
    retry_io(DEFAULT_TRIES, DEFAULT_DELAY_MS, || File::create(path))
}

/// Remove a file; a file that is already gone counts as removed.
pub fn remove_with_backoff(path: &Path) -> Result<()> {
    retry_io(DEFAULT_TRIES, DEFAULT_DELAY_MS, || match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
    .with_context(|| format!("remove {}", path.display()))
}

/// Move `src` to `dest`. Falls back to copy + remove when a plain rename is refused
/// (cross-device moves, share locks).
pub fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if retry_io(DEFAULT_TRIES, DEFAULT_DELAY_MS, || fs::rename(src, dest)).is_ok() {
        return Ok(());
    }
    retry_io(DEFAULT_TRIES, DEFAULT_DELAY_MS, || fs::copy(src, dest))
        .with_context(|| format!("copy {} -> {}", src.display(), dest.display()))?;
    remove_with_backoff(src)
}

/// Replace `dest` with the finished temp file `tmp`.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        remove_with_backoff(dest)?;
    }
    move_file(tmp, dest)
}

/// File name of `path` as UTF-8, if it has one.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
