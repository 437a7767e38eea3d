//! Multipart submission parsing.
//!
//! A submission carries either an uploaded `file` part or a `sample_data`
//! field naming a bundled sample, plus the analysis options. Everything is
//! validated here before any workspace is created.

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use tripod_core::command::{AnalysisParams, Gender};
use tripod_core::error::ValidationError;

use crate::error::{AppError, AppResult};

/// Accepted input file extensions (lowercase).
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["txt", "csv", "tsv"];

/// An uploaded input file, already size-checked and name-sanitised.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Where the job's input comes from.
#[derive(Debug, Clone)]
pub enum InputSource {
    Upload(UploadedFile),
    /// File name under the installation's sample directory.
    Sample(String),
}

#[derive(Debug, Clone)]
pub struct SubmissionForm {
    pub input: InputSource,
    pub params: AnalysisParams,
}

/// Read and validate a job submission.
pub async fn read_submission(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> AppResult<SubmissionForm> {
    let mut upload = None;
    let mut sample = None;
    let mut params = AnalysisParams::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                if data.is_empty() && original.is_empty() {
                    // Browsers send an empty part when no file was picked.
                    continue;
                }
                if data.len() > max_upload_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "Upload exceeds {max_upload_bytes} bytes"
                    )));
                }
                let file_name = sanitize_file_name(&original).ok_or_else(|| {
                    ValidationError::InvalidParameter {
                        name: "file",
                        value: original.clone(),
                    }
                })?;
                check_extension(&file_name)?;
                upload = Some(UploadedFile { file_name, data });
            }
            "sample_data" => {
                let value = field.text().await.map_err(multipart_error)?;
                let value = value.trim();
                if !value.is_empty() {
                    let file_name = sanitize_file_name(value)
                        .filter(|n| n == value)
                        .ok_or_else(|| ValidationError::InvalidParameter {
                            name: "sample_data",
                            value: value.to_string(),
                        })?;
                    sample = Some(file_name);
                }
            }
            "gender" => params.gender = Gender::parse(&field.text().await.map_err(multipart_error)?)?,
            "alpha" => {
                params.alpha = AnalysisParams::parse_alpha(&field.text().await.map_err(multipart_error)?)?
            }
            "build" => {
                params.build = AnalysisParams::parse_build(&field.text().await.map_err(multipart_error)?)?
            }
            "pod" | "hd" | "mi1" | "podcr" => {
                let value = field.text().await.map_err(multipart_error)?;
                let (flag_name, slot) = match name.as_str() {
                    "pod" => ("pod", &mut params.methods.pod),
                    "hd" => ("hd", &mut params.methods.hd),
                    "mi1" => ("mi1", &mut params.methods.mi1),
                    _ => ("podcr", &mut params.methods.podcr),
                };
                *slot = parse_flag(flag_name, &value)?;
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    params.validate()?;

    let input = match (upload, sample) {
        (Some(file), _) => InputSource::Upload(file),
        (None, Some(sample)) => InputSource::Sample(sample),
        (None, None) => {
            return Err(AppError::BadRequest(
                "Provide an input file or choose sample data".to_string(),
            ))
        }
    };

    Ok(SubmissionForm { input, params })
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Reduce a client-supplied file name to a safe base name.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_`, and leading dots are stripped. Returns `None` when nothing
/// usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Require one of [`ALLOWED_EXTENSIONS`] (case-insensitive).
pub fn check_extension(file_name: &str) -> Result<(), ValidationError> {
    let allowed = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));
    if allowed {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedInputType(file_name.to_string()))
    }
}

/// Checkbox-style boolean.
fn parse_flag(name: &'static str, value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ValidationError::InvalidParameter {
            name,
            value: value.to_string(),
        }),
    }
}
