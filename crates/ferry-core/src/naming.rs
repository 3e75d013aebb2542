//! Fresh names for the keep-both conflict policy.
//!
//! "file.txt" colliding in a directory that already holds "file.txt" and
//! "file 2.txt" becomes "file 3.txt": siblings sharing the extension and the
//! stem prefix are scanned for a numeric suffix and the next number is used.

use std::path::{Path, PathBuf};

use crate::error::FsError;
use crate::fs::FileSystem;

/// Split a name into stem and extension. Directories never have an extension.
fn split_name(name: &str, is_dir: bool) -> (&str, Option<&str>) {
    if is_dir {
        return (name, None);
    }
    let path = Path::new(name);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn join_name(stem: &str, number: u64, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{} {}.{}", stem, number, ext),
        None => format!("{} {}", stem, number),
    }
}

/// Pick a name for `name` that does not collide with `existing`.
///
/// Returns `name` unchanged when nothing in `existing` shares its stem and
/// extension.
pub fn keep_both_name<S: AsRef<str>>(existing: &[S], name: &str, is_dir: bool) -> String {
    let (stem, extension) = split_name(name, is_dir);
    let stem_lower = stem.to_lowercase();

    let mut similar = 0usize;
    let mut max_suffix: Option<u64> = None;

    for sibling in existing {
        let (sibling_stem, sibling_ext) = split_name(sibling.as_ref(), false);
        if sibling_ext != extension {
            continue;
        }
        let sibling_lower = sibling_stem.to_lowercase();
        let Some(rest) = sibling_lower.strip_prefix(&stem_lower) else {
            continue;
        };
        similar += 1;

        let rest = rest.trim();
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = rest.parse::<u64>() {
                max_suffix = max_suffix.max(Some(n));
            }
        }
    }

    if similar == 0 && !existing.iter().any(|s| s.as_ref() == name) {
        return name.to_string();
    }

    let mut number = max_suffix.map_or(2, |n| n.saturating_add(1));
    let mut candidate = join_name(stem, number, extension);
    // Directory names with dots are not matched above, so re-check literally.
    while existing.iter().any(|s| s.as_ref() == candidate) {
        number = number.saturating_add(1);
        candidate = join_name(stem, number, extension);
    }
    candidate
}

/// Compute the keep-both destination for `destination` from a fresh listing
/// of its parent directory.
///
/// This is check-then-act: another process creating the same name between
/// the listing and the copy is not guarded against.
pub fn keep_both_path(
    fs: &dyn FileSystem,
    destination: &Path,
    is_dir: bool,
) -> Result<PathBuf, FsError> {
    let parent = destination.parent().unwrap_or(Path::new(""));
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let existing = fs.list_directory(parent)?;
    Ok(parent.join(keep_both_name(&existing, &name, is_dir)))
}

/// Validate a file name for use inside a directory.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    let invalid = |reason: &str| {
        Err(FsError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("name cannot be empty");
    }

    if name.len() > 255 {
        return invalid("name is too long (max 255 bytes)");
    }

    for c in ['/', '\0'] {
        if name.contains(c) {
            return invalid(&format!("name cannot contain {:?}", c));
        }
    }

    #[cfg(target_os = "windows")]
    {
        for c in ['\\', ':', '*', '?', '"', '<', '>', '|'] {
            if name.contains(c) {
                return invalid(&format!("name cannot contain {:?}", c));
            }
        }
    }

    if name == "." || name == ".." {
        return invalid("'.' and '..' are reserved names");
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return invalid("name cannot start or end with spaces");
    }

    Ok(())
}
