use std::path::Path;

use serde::Serialize;

use crate::restore::pathing::{file_name_lossy, list_image_files_recursive, list_image_files_sorted};
use crate::restore::stages::ENGINE_STAGE_DIRS;

pub const SAMPLE_ENTRY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDirReport {
    pub name: String,
    pub path: String,
    pub exists: bool,
    pub image_count: usize,
    pub sample_entries: Vec<String>,
}

/// Read-only survey of an engine output tree, for humans chasing where a
/// result landed. Stage rows count images recursively; the root row
/// counts only images sitting directly in the output root, matching how
/// resolution treats it. Filesystem errors degrade to empty rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTreeReport {
    pub output_dir: String,
    pub exists: bool,
    pub stages: Vec<StageDirReport>,
    pub images_anywhere: Vec<String>,
}

pub fn inspect_output_tree(output_dir: &Path) -> OutputTreeReport {
    let mut stages: Vec<StageDirReport> = ENGINE_STAGE_DIRS
        .iter()
        .map(|name| {
            let path = output_dir.join(name);
            stage_report(name, path.as_path(), true)
        })
        .collect();
    stages.push(stage_report("output_root", output_dir, false));

    let images_anywhere = if output_dir.is_dir() {
        list_image_files_recursive(output_dir)
            .unwrap_or_default()
            .iter()
            .map(|path| relative_display(output_dir, path.as_path()))
            .collect()
    } else {
        Vec::new()
    };

    OutputTreeReport {
        output_dir: output_dir.display().to_string(),
        exists: output_dir.is_dir(),
        stages,
        images_anywhere,
    }
}

fn stage_report(name: &str, path: &Path, recursive: bool) -> StageDirReport {
    let exists = path.is_dir();
    let images = if !exists {
        Vec::new()
    } else if recursive {
        list_image_files_recursive(path).unwrap_or_default()
    } else {
        list_image_files_sorted(path).unwrap_or_default()
    };
    StageDirReport {
        name: name.to_string(),
        path: path.display().to_string(),
        exists,
        image_count: images.len(),
        sample_entries: images
            .iter()
            .take(SAMPLE_ENTRY_LIMIT)
            .map(|image| relative_display(path, image.as_path()))
            .collect(),
    }
}

fn relative_display(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|_| file_name_lossy(path))
}
