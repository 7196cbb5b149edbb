//! File-based locking for session files.
//!
//! Cross-platform (fs2) advisory lock on a sidecar `<file>.lock`, so two
//! captures writing the same session file do not interleave their tmp+rename.
//! Lock is released on Drop.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// `<target>.lock` рядом с файлом сессии. Файл остаётся после записи: удалять его
/// под локом нельзя, иначе ждущий процесс захватит лок на уже отвязанном inode.
pub fn lock_file_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

fn open_lock_file(target: &Path) -> Result<(File, PathBuf)> {
    let path = lock_file_path(target);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)?;
    Ok((f, path))
}

/// Acquire an exclusive lock. Blocks until acquired.
pub fn acquire_exclusive(target: &Path) -> Result<LockGuard> {
    let (file, path) = open_lock_file(target)?;
    FileExt::lock_exclusive(&file)?;
    Ok(LockGuard { file, path })
}

/// Try to acquire an exclusive lock. Returns Err if already locked.
pub fn try_acquire_exclusive(target: &Path) -> Result<LockGuard> {
    let (file, path) = open_lock_file(target)?;
    FileExt::try_lock_exclusive(&file)?;
    Ok(LockGuard { file, path })
}
