pub mod fits;
pub mod sensor;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{EoError, Result};

/// Write `path` through a temporary sibling file that is renamed into place
/// on success, so readers never observe a partially written file.
///
/// Concurrent writers of the same path do not coordinate; the last rename wins.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| EoError::Io(e.error))?;
    Ok(())
}
