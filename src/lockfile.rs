use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{Error, Result};

/// Hold an exclusive `flock` on `lock_path` for the duration of `f`.
///
/// This is the cross-process serialization primitive shared by the memory
/// graph (compaction) and the task registry (blocker mutation): every
/// mutating operation that touches the backing file acquires the lock,
/// performs its load-modify-save cycle, and releases it when the `File`
/// handle drops at the end of this function.
pub fn with_exclusive_lock<T>(lock_path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path)?;

    let fd = std::os::unix::io::AsRawFd::as_raw_fd(&file);
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
    if rc != 0 {
        return Err(Error::LockContention(format!(
            "failed to acquire lock on {}",
            lock_path.display()
        )));
    }

    let result = f();

    let _ = unsafe { libc::flock(fd, libc::LOCK_UN) };
    drop(file);
    result
}

/// Atomically persist `bytes` to `dest`: write to a sibling `.tmp` file,
/// fsync, then rename over the destination. Survives a crash mid-write
/// because the rename is the only operation that can be observed as
/// "destination changed".
pub fn atomic_write(dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    std::io::Write::write_all(&mut file, bytes)?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("state.json");
        atomic_write(&dest, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_exclusive_lock_serializes_threads() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("x.lock");
        let counter = Arc::new(Mutex::new(0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let lock_path = lock_path.clone();
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                with_exclusive_lock(&lock_path, || {
                    let mut c = counter.lock().unwrap();
                    let before = *c;
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    *c = before + 1;
                    Ok(())
                })
                .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 20);
    }
}
