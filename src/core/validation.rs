//! URL and artifact-name validation
//!
//! Provides validation for user inputs before anything is spawned or touched on disk:
//! - Video URL validation (syntactically well-formed http/https URL)
//! - Temp artifact names (`<16 hex chars>.mp4`, rejects traversal and foreign files)

use lazy_regex::regex_is_match;
use thiserror::Error;
use url::Url;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Missing or malformed URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Name does not follow the temp artifact scheme
    #[error("Invalid artifact name '{0}'")]
    InvalidArtifactName(String),
}

/// Validates that `input` is a well-formed http(s) URL.
///
/// # Examples
/// ```
/// use vidgrab::core::validation::validate_video_url;
///
/// assert!(validate_video_url("https://example.com/watch?v=1").is_ok());
/// assert!(validate_video_url("not a url").is_err());
/// assert!(validate_video_url("ftp://example.com/video").is_err());
/// ```
pub fn validate_video_url(input: &str) -> Result<Url, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidUrl("empty".to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        scheme => Err(ValidationError::InvalidUrl(format!(
            "unsupported scheme '{}' or missing host",
            scheme
        ))),
    }
}

/// Checks that `name` is exactly `<16 lowercase hex chars>.mp4`.
pub fn validate_artifact_name(name: &str) -> Result<(), ValidationError> {
    if regex_is_match!(r"^[0-9a-f]{16}\.mp4$", name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidArtifactName(name.to_string()))
    }
}
