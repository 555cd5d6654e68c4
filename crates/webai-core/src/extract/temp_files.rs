//! Per-process temp directory and temp file lifecycle.
//!
//! Every file materialized during extraction lives under one process-scoped
//! directory. Cleanup helpers refuse to touch anything outside it, which is
//! the traversal defense for both deletion and `file://` resolution.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use uuid::Uuid;

static TEMP_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    std::env::temp_dir().join(format!("webai-uploads-{}", std::process::id()))
});

/// The shared temp directory for this process, created on first use.
pub fn get_temp_dir() -> &'static Path {
    if let Err(e) = std::fs::create_dir_all(&*TEMP_DIR) {
        tracing::warn!("Failed to create temp dir {}: {}", TEMP_DIR.display(), e);
    }
    &TEMP_DIR
}

/// Collision-free file name inside the temp dir.
pub(crate) fn unique_name(prefix: &str, ext: &str) -> String {
    format!("{}_{}{}", prefix, Uuid::new_v4().simple(), ext)
}

/// Delete the given temp files, skipping anything outside the temp root.
pub fn cleanup_temp_files<P: AsRef<Path>>(paths: &[P]) {
    let root = get_temp_dir();
    for p in paths {
        let p = p.as_ref();
        if !p.starts_with(root) {
            tracing::warn!("Refusing to delete file outside temp root: {}", p.display());
            continue;
        }
        match std::fs::remove_file(p) {
            Ok(()) => tracing::debug!("Cleaned up temp file: {}", p.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => tracing::warn!("Failed to delete temp file {}: {}", p.display(), e),
        }
    }
}

/// Owns the temp files of one request and deletes them on drop.
///
/// Handlers move the guard into the response stream so cleanup runs only
/// after the stream finishes or the client disconnects, never before.
#[derive(Debug, Default)]
pub struct TempFileGuard {
    paths: Vec<PathBuf>,
}

impl TempFileGuard {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        cleanup_temp_files(&self.paths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_deletes_on_drop() {
        let path = get_temp_dir().join(unique_name("guard", ".bin"));
        std::fs::write(&path, b"xyz").expect("write");
        assert!(path.exists());
        drop(TempFileGuard::new(vec![path.clone()]));
        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_refuses_outside_temp_root() {
        let outside = tempfile::NamedTempFile::new().expect("tmp");
        let path = outside.path().to_path_buf();
        cleanup_temp_files(&[path.clone()]);
        assert!(path.exists(), "file outside the temp root must be left alone");
    }
}
