use std::path::{Path, PathBuf};

use tracing::debug;

use crate::restore::pathing::list_image_files_sorted;
use crate::restore::stages::candidate_output_dirs;
use crate::restore::EngineOptions;

/// Outcome of locating one restored image among the engine's stage
/// directories. `found_path` is `None` when no candidate held a usable
/// image; the caller decides whether that is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResult {
    pub source_filename: String,
    pub found_path: Option<PathBuf>,
    pub image_dimensions: Option<(u32, u32)>,
}

impl ResolvedResult {
    pub fn miss(source_filename: impl Into<String>) -> Self {
        Self {
            source_filename: source_filename.into(),
            found_path: None,
            image_dimensions: None,
        }
    }
}

/// Walks the candidate directories most-specific-first and returns the
/// first hit: an exact filename match, otherwise the lexicographically
/// first file sharing the source's stem under a recognized image
/// extension. Some engine stages rewrite the extension; none rewrite
/// the stem, and batch items share one output tree, so the fallback
/// must never match a foreign stem.
pub fn resolve_output(
    output_dir: &Path,
    source_filename: &str,
    options: &EngineOptions,
) -> ResolvedResult {
    for candidate in candidate_output_dirs(output_dir, options) {
        if let Some(found) = match_in_dir(candidate.as_path(), source_filename) {
            debug!(
                source = source_filename,
                found = %found.display(),
                "resolved restored output"
            );
            let image_dimensions = image::image_dimensions(found.as_path()).ok();
            return ResolvedResult {
                source_filename: source_filename.to_string(),
                found_path: Some(found),
                image_dimensions,
            };
        }
        debug!(
            source = source_filename,
            candidate = %candidate.display(),
            "no match in candidate directory"
        );
    }
    ResolvedResult::miss(source_filename)
}

fn match_in_dir(dir: &Path, source_filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    let exact = dir.join(source_filename);
    if exact.is_file() {
        return Some(exact);
    }
    let stem = Path::new(source_filename).file_stem()?;
    list_image_files_sorted(dir)
        .ok()?
        .into_iter()
        .find(|candidate| candidate.file_stem() == Some(stem))
}
