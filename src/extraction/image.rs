//! Image reference resolution.
//!
//! Content-store URIs (`gs://bucket/object`) and HTTP(S) URLs are passed to the
//! model by reference. Anything else is treated as a local path and read into
//! memory; local paths exist for tests and offline runs.
use super::ExtractionError;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_MIME: &str = "image/jpeg";

/// An image the vision model can consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedImage {
    /// Pointer the model backend fetches itself.
    Remote { uri: String, mime_type: String },
    /// Bytes read from a local file.
    Inline {
        path: PathBuf,
        bytes: Vec<u8>,
        mime_type: String,
    },
}

impl ResolvedImage {
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Remote { mime_type, .. } | Self::Inline { mime_type, .. } => mime_type,
        }
    }

    /// Short description for logs; never includes image bytes.
    pub fn describe(&self) -> String {
        match self {
            Self::Remote { uri, .. } => uri.clone(),
            Self::Inline { path, bytes, .. } => {
                format!("{} ({} bytes)", path.display(), bytes.len())
            }
        }
    }
}

/// Resolve a caller-supplied reference into something the model can read.
pub fn resolve_image(reference: &str) -> Result<ResolvedImage, ExtractionError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(invalid(reference, "image reference is empty"));
    }

    let lowered = reference.to_ascii_lowercase();
    if let Some(rest) = lowered.strip_prefix("gs://") {
        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() || object.is_empty() {
            return Err(invalid(
                reference,
                "content-store URI must name a bucket and an object",
            ));
        }
        return Ok(remote(reference));
    }

    let after_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"));
    if let Some(rest) = after_scheme {
        let host = rest.split(['/', '?', '#']).next().unwrap_or("");
        if host.is_empty() || reference.chars().any(char::is_whitespace) {
            return Err(invalid(reference, "URL must have a host and no whitespace"));
        }
        return Ok(remote(reference));
    }

    read_local(reference)
}

fn remote(reference: &str) -> ResolvedImage {
    ResolvedImage::Remote {
        uri: reference.to_string(),
        mime_type: mime_from_extension(reference).unwrap_or_else(|| DEFAULT_MIME.to_string()),
    }
}

fn read_local(reference: &str) -> Result<ResolvedImage, ExtractionError> {
    let path = Path::new(reference);
    let bytes = fs::read(path).map_err(|err| invalid(reference, format!("read failed: {err}")))?;
    if bytes.is_empty() {
        return Err(invalid(reference, "file is empty"));
    }
    let mime_type = sniff_mime(&bytes)
        .or_else(|| mime_from_extension(reference))
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    Ok(ResolvedImage::Inline {
        path: path.to_path_buf(),
        bytes,
        mime_type,
    })
}

fn invalid(reference: &str, reason: impl Into<String>) -> ExtractionError {
    ExtractionError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.into(),
    }
}

/// Image type from file content, when the bytes carry a known image signature.
fn sniff_mime(bytes: &[u8]) -> Option<String> {
    infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type().to_string())
}

/// Image type guessed from the path or URL extension; query and fragment are ignored.
fn mime_from_extension(reference: &str) -> Option<String> {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    mime_guess::from_path(path)
        .iter()
        .find(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
}
