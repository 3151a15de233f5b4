//! Output of served views as JSON.
//!
//! Supports printing to stdout and writing files that a static web server
//! reads while they are being replaced.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Prints a view as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(std::io::Error::from)?;
    writeln!(stdout)?;
    Ok(())
}

/// Writes a view as JSON to `path`.
///
/// The content goes to a sibling temp file first and is renamed over the
/// target, so readers see either the old file or the new one.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    let body = serde_json::to_vec(value).map_err(std::io::Error::from)?;
    fs::write(&tmp, &body)?;
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), bytes = body.len(), "Wrote JSON view");
    Ok(())
}

/// [`write_json`] into `dir/name`.
pub fn write_json_to_dir<T: Serialize + ?Sized>(
    dir: &Path,
    name: &str,
    value: &T,
) -> Result<PathBuf> {
    let path = dir.join(name);
    write_json(&path, value)?;
    Ok(path)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
