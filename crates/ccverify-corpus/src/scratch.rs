use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A uniquely named directory that is removed, with its contents, on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(prefix: &str) -> std::io::Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    pub fn new_in(base: &Path, prefix: &str) -> std::io::Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let pid = std::process::id();

        for _ in 0..10_000 {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!("{prefix}_{pid}_{n}"));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("failed to create unique scratch dir under {}", base.display()),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_on_drop() {
        let base = tempfile::tempdir().expect("tempdir");
        let dir = ScratchDir::new_in(base.path(), "scratch").expect("scratch");
        let kept = dir.path().to_path_buf();
        std::fs::write(kept.join("f"), b"x").expect("write");
        assert!(kept.is_dir());
        drop(dir);
        assert!(!kept.exists());
    }

    #[test]
    fn names_are_unique() {
        let base = tempfile::tempdir().expect("tempdir");
        let a = ScratchDir::new_in(base.path(), "same").expect("a");
        let b = ScratchDir::new_in(base.path(), "same").expect("b");
        assert_ne!(a.path(), b.path());
    }
}
