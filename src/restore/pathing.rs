use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions the restoration engine is known to read and emit. The resolver
/// and the staging helpers share this set so an input the engine accepts is
/// also one whose output can be recognized.
pub const RESTORE_IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpeg", "jpg", "png", "tiff"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lowered = ext.to_ascii_lowercase();
            RESTORE_IMAGE_EXTENSIONS.contains(&lowered.as_str())
        })
        .unwrap_or(false)
}

pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name a staged input copy by batch index so inputs with identical basenames
/// never collide inside one job's input directory.
pub fn staged_input_name(index: usize, source_filename: &str) -> String {
    match Path::new(source_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
    {
        Some(ext) => format!("image_{index}.{ext}"),
        None => format!("image_{index}"),
    }
}

/// Image files directly inside `dir`, sorted by file name so callers observe
/// the same order on every platform.
pub fn list_image_files_sorted(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_image_path(path.as_path()) {
            names.push(file_name_lossy(path.as_path()));
        }
    }
    names.sort();
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// All image files under `root`, walking subdirectories in sorted order.
pub fn list_image_files_recursive(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk_sorted(root, &mut found)?;
    Ok(found)
}

fn walk_sorted(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();
    for path in entries {
        if path.is_dir() {
            walk_sorted(path.as_path(), found)?;
        } else if is_image_path(path.as_path()) {
            found.push(path);
        }
    }
    Ok(())
}

/// The engine runs with its own root as cwd, so directory flags handed to it
/// must already be absolute.
pub fn absolute_path_string(path: &Path) -> String {
    if path.is_absolute() {
        return path.to_string_lossy().into_owned();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

pub fn resolve_under_root(root: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}
