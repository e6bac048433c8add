//! Identity names from reference image paths.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("malformed identity path {0:?}: expected <reference-dir>/<identity>/<file>")]
    MalformedIdentityPath(String),
}

/// Identity name of a reference path shaped `<prefix>/<identity>/<file>`.
///
/// Takes the segment after the first `/`, cut at the next `/`.
pub fn identity_from_path(path: &str) -> Result<&str, LabelError> {
    let malformed = || LabelError::MalformedIdentityPath(path.to_string());

    let (_, rest) = path.split_once('/').ok_or_else(malformed)?;
    let name = rest.split('/').next().unwrap_or_default();

    if name.is_empty() {
        return Err(malformed());
    }
    Ok(name)
}
