//! Atomic file replacement for managed configuration files.

use crate::error::ConvergeError;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Header prefixed to every managed file whose format supports comments.
pub const MANAGED_HEADER: &str = "# Managed by converged. Do not edit by hand.\n\
# Manual changes are overwritten on the next reconciliation pass.\n";

/// Write `content` to `path` such that readers never observe a partial
/// file: the bytes go to a sibling temporary file which is flushed, given
/// `mode` permission bits and renamed over the target. On error the target
/// is left untouched and the temporary file is removed.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> Result<(), ConvergeError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("managed");

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{base}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.as_file().set_permissions(fs::Permissions::from_mode(mode))?;
    tmp.persist(path).map_err(|e| ConvergeError::Io(e.error))?;
    Ok(())
}
