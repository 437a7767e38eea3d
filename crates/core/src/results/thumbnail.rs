//! Thumbnail generation for result plots.
//!
//! A thumbnail is written next to its source as `<stem>.resize.png`. When
//! a decodable one already exists it is reused, so repeated aggregation of
//! the same workspace never re-encodes images. New thumbnails are encoded
//! into a temporary file in the same directory and renamed into place, so
//! readers never see a partial file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::imageops::FilterType;
use image::ImageFormat;

use crate::error::AggregationError;
use crate::results::classify::THUMBNAIL_SUFFIX;

/// Default bounding box, matching the size the result page displays.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 640;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 480;

/// How thumbnails are sized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThumbnailMode {
    /// Shrink to fit the box, preserving aspect ratio. Never upscales.
    Fit { width: u32, height: u32 },
    /// Multiply both dimensions by a fixed factor.
    Scale(f32),
}

impl Default for ThumbnailMode {
    fn default() -> Self {
        Self::Fit {
            width: DEFAULT_THUMBNAIL_WIDTH,
            height: DEFAULT_THUMBNAIL_HEIGHT,
        }
    }
}

impl fmt::Display for ThumbnailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fit { width, height } => write!(f, "fit:{width}x{height}"),
            Self::Scale(factor) => write!(f, "scale:{factor}"),
        }
    }
}

/// Parses `fit:<w>x<h>` or `scale:<factor>`.
impl FromStr for ThumbnailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected 'fit:WxH' or 'scale:F', got {s:?}"))?;
        match kind {
            "fit" => {
                let (w, h) = value
                    .split_once('x')
                    .ok_or_else(|| format!("expected WxH, got {value:?}"))?;
                let width: u32 = w.parse().map_err(|_| format!("invalid width {w:?}"))?;
                let height: u32 = h.parse().map_err(|_| format!("invalid height {h:?}"))?;
                if width == 0 || height == 0 {
                    return Err("thumbnail box must be non-empty".to_string());
                }
                Ok(Self::Fit { width, height })
            }
            "scale" => {
                let factor: f32 = value
                    .parse()
                    .map_err(|_| format!("invalid scale factor {value:?}"))?;
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(format!("scale factor must be positive, got {factor}"));
                }
                Ok(Self::Scale(factor))
            }
            other => Err(format!("unknown thumbnail mode {other:?}")),
        }
    }
}

impl ThumbnailMode {
    /// Target dimensions for a source of `width` x `height`.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            Self::Fit {
                width: max_w,
                height: max_h,
            } => fit_dimensions(width, height, max_w, max_h),
            Self::Scale(factor) => (
                scale_dimension(width, factor),
                scale_dimension(height, factor),
            ),
        }
    }
}

/// Largest size within `max_w` x `max_h` with the source aspect ratio.
/// Sources already inside the box keep their size.
pub fn fit_dimensions(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let ratio = f64::min(
        f64::from(max_w) / f64::from(width),
        f64::from(max_h) / f64::from(height),
    );
    (
        ((f64::from(width) * ratio).round() as u32).max(1),
        ((f64::from(height) * ratio).round() as u32).max(1),
    )
}

fn scale_dimension(value: u32, factor: f32) -> u32 {
    ((f64::from(value) * f64::from(factor)).round() as u32).max(1)
}

/// Thumbnail path for a workspace-relative image path.
pub fn thumbnail_name(image: &str) -> String {
    let stem = match image.rfind('.') {
        Some(dot) if !image[dot..].contains('/') => &image[..dot],
        _ => image,
    };
    format!("{stem}{THUMBNAIL_SUFFIX}")
}

/// Suffix of in-progress thumbnail files. Never classified as an image.
const PARTIAL_SUFFIX: &str = ".part";

/// Make sure `image` under `workspace` has a thumbnail.
///
/// Returns the thumbnail's relative path and whether it was generated now
/// (`false` when a decodable one already existed). An existing thumbnail
/// that fails to decode is replaced.
pub fn ensure_thumbnail(
    workspace: &Path,
    image: &str,
    mode: ThumbnailMode,
) -> Result<(String, bool), AggregationError> {
    let thumb = thumbnail_name(image);
    let thumb_path = workspace.join(&thumb);
    if thumb_path.is_file() {
        match image::open(&thumb_path) {
            Ok(_) => return Ok((thumb, false)),
            Err(e) => {
                tracing::warn!(thumbnail = %thumb, error = %e, "Unreadable thumbnail, regenerating");
            }
        }
    }

    let source_path = workspace.join(image);
    let source = image::open(&source_path).map_err(|e| AggregationError::Thumbnail {
        path: source_path.clone(),
        source: e,
    })?;
    let (width, height) = mode.target_dimensions(source.width(), source.height());
    let resized = source.resize_exact(width, height, FilterType::Lanczos3);

    let dir = thumb_path.parent().unwrap_or(workspace);
    let mut partial = tempfile::Builder::new()
        .prefix(".thumbnail-")
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| AggregationError::io(dir, e))?;
    resized
        .write_to(partial.as_file_mut(), ImageFormat::Png)
        .map_err(|e| AggregationError::Thumbnail {
            path: partial.path().to_path_buf(),
            source: e,
        })?;
    partial
        .persist(&thumb_path)
        .map_err(|e| AggregationError::io(&thumb_path, e.error))?;

    tracing::debug!(
        image = %image,
        thumbnail = %thumb,
        width,
        height,
        "Thumbnail generated",
    );
    Ok((thumb, true))
}
