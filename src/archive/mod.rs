//! One-entry transport archives.
//!
//! Every bundle object on the CDN is a zip archive holding exactly one member; the member's
//! bytes are the real payload.

use std::io::{Cursor, Read, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SyncError;

/// Returns the bytes of the single member of `archive`.
///
/// An archive with no members is a [`SyncError::CorruptStream`]. If there are several, the
/// first one wins.
pub fn unwrap_single_entry(archive: &[u8]) -> Result<Vec<u8>, SyncError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    if zip.is_empty() {
        return Err(SyncError::CorruptStream("transport archive has no entries".into()));
    }
    if zip.len() > 1 {
        tracing::debug!(entries = zip.len(), "transport archive has extra entries, reading the first");
    }

    let mut entry = zip.by_index(0)?;
    let mut out = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut out)?;
    Ok(out)
}

/// Builds a one-member archive. Used by tests and local tooling to produce CDN-shaped objects.
pub fn wrap_single_entry(name: &str, payload: &[u8]) -> Result<Vec<u8>, SyncError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, options)?;
    zip.write_all(payload)?;
    Ok(zip.finish()?.into_inner())
}
