// asset-squeeze/src/utils/mod.rs
use crate::core::{AssetFormat, ImageToolError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as i32).clamp(0, 5);
    let size = bytes_f64 / base.powi(exponent);

    format!("{:.2} {}", size, UNITS[exponent as usize])
}

pub fn percent_saved(original_size: u64, new_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }

    let savings = (original_size as f64 - new_size as f64) / original_size as f64 * 100.0;
    savings.clamp(0.0, 100.0)
}

/// Writes through a sibling temp file and renames it over `path`,
/// so readers see either the old bytes or the complete new ones.
///
/// The result keeps the permissions of the file it replaces. A new file takes
/// them from `like` (usually the source asset) instead of the temp file's 0600.
pub fn write_atomic(path: &Path, bytes: &[u8], like: Option<&Path>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    let permissions = std::fs::metadata(path)
        .or_else(|e| match like {
            Some(like) => std::fs::metadata(like),
            None => Err(e),
        })
        .map(|meta| meta.permissions());
    if let Ok(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }
    temp.persist(path).map_err(|e| ImageToolError::Io(e.error))?;

    log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Where the encoded asset goes: next to the input, or mirrored under `output_dir`
/// relative to `root`, with the target format's extension when it changes.
pub fn output_path_for(
    input: &Path,
    root: &Path,
    output_dir: Option<&Path>,
    source: AssetFormat,
    target: AssetFormat,
) -> PathBuf {
    let base = match output_dir {
        Some(dir) => dir.join(input.strip_prefix(root).unwrap_or(input)),
        None => input.to_path_buf(),
    };

    if source == target {
        base
    } else {
        base.with_extension(target.extension())
    }
}

/// Mirror of `input` under `root/backup_dir_name`, keeping the relative layout.
pub fn backup_path_for(input: &Path, root: &Path, backup_dir_name: &str) -> PathBuf {
    let relative = input
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(input.file_name().unwrap_or(input.as_os_str())));
    root.join(backup_dir_name).join(relative)
}

pub fn display_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
