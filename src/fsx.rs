//! Cross-platform filesystem wrapper.
//!
//! Re-exports `std::fs` and adds the few helpers the cache relies on. Every persisted file
//! (cache blobs, snapshots, decoded outputs) goes through [`write_atomic`] so that an
//! interrupted run never leaves a partially written file under its final name.

use std::io::{self, Read, Write};
use std::path::Path;

use md5::{Digest, Md5};
use tempfile::NamedTempFile;

pub use std::fs::*;

/// Writes `bytes` to `path` through a temp file in the same directory, then renames it into
/// place. Parent directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Lowercase hex MD5 of `bytes`.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Lowercase hex MD5 of a file's contents, streamed.
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(not(target_os = "windows"))]
/// Repoints the symlink `link` at the relative `target`, replacing any existing link.
pub fn point_latest(link: &Path, target: &Path) -> io::Result<()> {
    match remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(target_os = "windows")]
/// No-op on Windows: creating symlinks needs elevated privileges there.
pub fn point_latest(_link: &Path, _target: &Path) -> io::Result<()> {
    Ok(())
}
