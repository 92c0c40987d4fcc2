//! Incremental reader for append-only log files.
//!
//! Keeps one byte offset per path for the lifetime of the process and
//! returns only lines appended since the previous call. A file that shrank
//! below the stored offset, or was replaced by a new inode, is read again
//! from the start.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Consumption state for one monitored file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TailPosition {
    /// Bytes already consumed; always at a line boundary.
    byte_offset: u64,
    /// Inode seen at the last read (0 where unavailable).
    inode: u64,
}

#[derive(Debug, Default)]
pub struct LogTailReader {
    positions: HashMap<PathBuf, TailPosition>,
}

impl LogTailReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines appended to `path` since the last call (without line endings).
    ///
    /// A trailing line without a newline is left unconsumed until it is
    /// completed. A missing file yields an empty batch.
    pub fn read_new_lines(&mut self, path: &Path) -> Vec<String> {
        let Some((size, inode)) = file_metadata(path) else {
            return Vec::new();
        };

        let pos = self.positions.entry(path.to_path_buf()).or_default();
        if size < pos.byte_offset || (pos.inode != 0 && inode != 0 && inode != pos.inode) {
            debug!(
                path = %path.display(),
                offset = pos.byte_offset,
                size,
                "log truncated or rotated, reading from start"
            );
            pos.byte_offset = 0;
        }
        pos.inode = inode;

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open log file");
                return Vec::new();
            }
        };

        let mut reader = BufReader::new(file);
        if let Err(e) = reader.seek(SeekFrom::Start(pos.byte_offset)) {
            warn!(
                path = %path.display(),
                offset = pos.byte_offset,
                error = %e,
                "failed to seek in log file"
            );
            return Vec::new();
        }

        let mut lines = Vec::new();
        let mut buf = Vec::new();
        let mut consumed = pos.byte_offset;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if buf.last() != Some(&b'\n') {
                        // Partial line at EOF; picked up on a later call.
                        break;
                    }
                    consumed += n as u64;
                    let text = String::from_utf8_lossy(&buf);
                    lines.push(text.trim_end_matches(['\n', '\r']).to_owned());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error reading log file");
                    break;
                }
            }
        }

        pos.byte_offset = consumed;
        lines
    }
}

/// File size and inode for rotation detection.
fn file_metadata(path: &Path) -> Option<(u64, u64)> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(path).ok().map(|m| (m.len(), m.ino()))
    }
    #[cfg(not(unix))]
    {
        fs::metadata(path).ok().map(|m| (m.len(), 0))
    }
}
