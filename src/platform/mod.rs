use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Send a termination signal to the process identified by `pid`.
    fn kill_process(pid: &str) -> std::io::Result<std::process::Output>;

    /// Spawn a child that tails / follows a log file.
    fn tail_file(path: &Path) -> std::io::Result<std::process::Child>;

    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory for webedt.
    /// Unix: `~/.webedt`, Windows: `%APPDATA%\webedt`.
    fn data_dir() -> PathBuf;
}

/// `WEBEDT_DATA_DIR` overrides the platform default, which keeps test
/// daemons out of the real data directory.
pub(crate) fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var("WEBEDT_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
