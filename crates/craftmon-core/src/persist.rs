//! Write-then-rename persistence and identifier shape checks.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::MonitorError;

/// Write `bytes` to `path` through a sibling temp file and an atomic rename,
/// so a concurrent reader sees either the old file or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MonitorError> {
    let persistence = |source| MonitorError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(persistence)?;
    }

    let tmp = temp_path(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(persistence(e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// True if `s` is a canonical hyphenated UUID (8-4-4-4-12 hex).
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}
