//! Guest path parsing and lexical normalization
//!
//! Guest paths look like `part:/dir/file`. The partition part may be a plain
//! directory name (`sdmc`, `nand/user`) or one of the content aliases.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while mapping guest paths
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfsError {
    /// Path has the wrong shape
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path resolves to a location outside the emulated storage root
    #[error("Path escapes storage root: {0}")]
    OutsideRoot(String),

    /// Host filesystem operation failed
    #[error("I/O error: {0}")]
    Io(String),
}

/// Well-known content locations addressed by `@` aliases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPath {
    SdCard,
    User,
    System,
    SdCardContent,
    UserContent,
    SystemContent,
}

impl ContentPath {
    /// Parses a partition alias
    ///
    /// `@Sdcard` is accepted as a spelling of `@SdCard`.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "@SdCard" | "@Sdcard" => Some(ContentPath::SdCard),
            "@User" => Some(ContentPath::User),
            "@System" => Some(ContentPath::System),
            "@SdCardContent" => Some(ContentPath::SdCardContent),
            "@UserContent" => Some(ContentPath::UserContent),
            "@SystemContent" => Some(ContentPath::SystemContent),
            _ => None,
        }
    }

    /// Directory relative to the storage root
    pub fn relative_dir(self) -> PathBuf {
        match self {
            ContentPath::SdCard => PathBuf::from(crate::SD_CARD_DIR),
            ContentPath::User => Path::new(crate::NAND_DIR).join("user"),
            ContentPath::System => Path::new(crate::NAND_DIR).join("system"),
            ContentPath::SdCardContent => Path::new(crate::SD_CARD_DIR)
                .join("Nintendo")
                .join("Contents"),
            ContentPath::UserContent => ContentPath::User.relative_dir().join("Contents"),
            ContentPath::SystemContent => ContentPath::System.relative_dir().join("Contents"),
        }
    }
}

/// Splits `part:/name` into its partition and the rooted name
pub fn split_guest_path(guest_path: &str) -> Result<(&str, &str), VfsError> {
    let mut parts = guest_path.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(partition), Some(name), None) if !partition.is_empty() => Ok((partition, name)),
        _ => Err(VfsError::InvalidPath(guest_path.to_string())),
    }
}

/// Strips the leading `/` or `//` that every guest file name carries
pub fn strip_guest_root(name: &str) -> Option<&str> {
    name.strip_prefix("//").or_else(|| name.strip_prefix('/'))
}

/// Resolves `.` and `..` without touching the host filesystem
///
/// `..` at the top of the path is dropped.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
