use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, GrayImage, ImageFormat, RgbImage};
use thiserror::Error;

use crate::restore::job_dirs::{self, DirectoryPrepError};
use crate::restore::stages::FINAL_OUTPUT_DIR;

pub const DEFAULT_COMPARISON_TARGET_WIDTH: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    pub target_width: u32,
    pub resize: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_COMPARISON_TARGET_WIDTH,
            resize: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("failed to encode comparison image: {0}")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Write(#[from] DirectoryPrepError),
    #[error("original image has zero width or height")]
    EmptyOriginal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonArtifact {
    pub path: PathBuf,
    pub byte_size: u64,
}

fn is_grayscale(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
    )
}

/// Scaled height of a width-doubled pair brought down to `target_width`.
pub fn comparison_height(original_height: u32, original_width: u32, target_width: u32) -> u32 {
    if original_width == 0 {
        return 0;
    }
    let scaled = f64::from(original_height) * f64::from(target_width)
        / (2.0 * f64::from(original_width));
    scaled.round() as u32
}

pub fn comparison_artifact_name(source_filename: &str) -> String {
    format!("comparison_{source_filename}")
}

/// Places original and restored side by side at the original's size.
/// Grayscale originals produce a single-channel pair, everything else
/// three channels; deeper samples saturate at the 8-bit conversion. The
/// pair is scaled down to `target_width` when wider, never up.
pub fn compose(
    original: &DynamicImage,
    restored: &DynamicImage,
    options: ComposeOptions,
) -> Result<DynamicImage, ComposeError> {
    let (width, height) = original.dimensions();
    if width == 0 || height == 0 {
        return Err(ComposeError::EmptyOriginal);
    }
    let restored = restored.resize_exact(width, height, FilterType::Lanczos3);
    let mut combined = if is_grayscale(original.color()) {
        let left = original.to_luma8();
        let right = restored.to_luma8();
        let mut canvas = GrayImage::new(width * 2, height);
        image::imageops::replace(&mut canvas, &left, 0, 0);
        image::imageops::replace(&mut canvas, &right, i64::from(width), 0);
        DynamicImage::ImageLuma8(canvas)
    } else {
        let left = original.to_rgb8();
        let right = restored.to_rgb8();
        let mut canvas = RgbImage::new(width * 2, height);
        image::imageops::replace(&mut canvas, &left, 0, 0);
        image::imageops::replace(&mut canvas, &right, i64::from(width), 0);
        DynamicImage::ImageRgb8(canvas)
    };
    if options.resize && combined.width() > options.target_width {
        let target_height = comparison_height(height, width, options.target_width).max(1);
        combined = combined.resize_exact(options.target_width, target_height, FilterType::Lanczos3);
    }
    Ok(combined)
}

/// Reads both images, composes the pair, and writes it next to the
/// engine's final outputs (falling back to the output root when the
/// final stage directory does not exist).
pub fn compose_comparison_file(
    original_path: &Path,
    restored_path: &Path,
    output_dir: &Path,
    source_filename: &str,
    options: ComposeOptions,
) -> Result<ComparisonArtifact, ComposeError> {
    let original = image::open(original_path).map_err(|source| ComposeError::Read {
        path: original_path.to_path_buf(),
        source,
    })?;
    let restored = image::open(restored_path).map_err(|source| ComposeError::Read {
        path: restored_path.to_path_buf(),
        source,
    })?;
    let combined = compose(&original, &restored, options)?;

    let final_dir = output_dir.join(FINAL_OUTPUT_DIR);
    let target_dir = if final_dir.is_dir() {
        final_dir
    } else {
        output_dir.to_path_buf()
    };
    let path = target_dir.join(comparison_artifact_name(source_filename));
    let format = ImageFormat::from_path(path.as_path())?;
    let mut buffer = Cursor::new(Vec::new());
    combined.write_to(&mut buffer, format)?;
    let byte_size = job_dirs::write_artifact_bytes(path.as_path(), buffer.get_ref())?;
    Ok(ComparisonArtifact { path, byte_size })
}
