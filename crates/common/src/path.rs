// Document paths: canonical form and fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("document path is empty")]
    Empty,

    #[error("document path exceeds {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("document path contains a null byte")]
    NullByte,

    #[error("document path may not contain `{0}` components")]
    Traversal(String),

    #[error("document path has a blank component")]
    BlankComponent,
}

/// A workspace-relative document path in canonical form: NFKC normalized,
/// `/` separated, without leading, trailing or repeated separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.contains('\0') {
            return Err(PathError::NullByte);
        }

        let unified: String = input.nfkc().map(|ch| if ch == '\\' { '/' } else { ch }).collect();
        let mut components = Vec::new();
        for component in unified.split('/').filter(|component| !component.is_empty()) {
            match component {
                "." | ".." => return Err(PathError::Traversal(component.to_owned())),
                blank if blank.trim().is_empty() => return Err(PathError::BlankComponent),
                _ => components.push(component),
            }
        }

        if components.is_empty() {
            return Err(PathError::Empty);
        }

        let canonical = components.join("/");
        if canonical.chars().count() > MAX_PATH_CHARS {
            return Err(PathError::TooLong);
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256 of the canonical path. Stable identifier of the
    /// document across collaborators.
    pub fn fingerprint(&self) -> String {
        sha256_hex(self.0.as_bytes())
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
