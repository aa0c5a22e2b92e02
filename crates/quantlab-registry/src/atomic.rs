//! Crash-safe file replacement
//!
//! Content is written to a temporary file in the destination's directory,
//! flushed to disk, then renamed over the destination. Readers see either the
//! old file or the new one, never a partial write.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = io::BufWriter::with_capacity(64 * 1024, temp.as_file_mut());
        writer.write_all(content)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
