use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Write `path` through a sibling `<name>.tmp` file. `fill` produces the
/// content; the temp file is synced and renamed over `path` only if it
/// succeeds, so readers see either the old file or the complete new one.
pub fn write_atomic<T, F>(path: &Path, fill: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    let mut out = BufWriter::new(file);

    let value = match fill(&mut out) {
        Ok(value) => value,
        Err(err) => {
            drop(out);
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
    };

    let file = out.into_inner().map_err(|err| Error::Io(err.into_error()))?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)?;
    Ok(value)
}

pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<()> {
    write_atomic(path, |out| {
        out.write_all(data)?;
        Ok(())
    })
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        Error::InvalidValue(format!("cannot write to {}: no file name", path.display()))
    })?;
    let tmp_name = format!("{}.tmp", file_name.to_string_lossy());
    Ok(path.with_file_name(tmp_name))
}
