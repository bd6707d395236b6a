use std::path::{Component, Path};

use crate::TransferError;
use crate::store::ARTIFACT_DIR;

/// Longest file name accepted from a peer.
const MAX_FILE_NAME_LEN: usize = 255;

/// Validates a file name received from a peer.
///
/// The name is used to build paths inside the resume directory, so it must
/// be a single plain component. Rejects:
/// - Empty names and names over 255 bytes
/// - Path separators (`/` or `\`) and NUL
/// - `.` and `..`
/// - Windows drive or stream prefixes (`C:`, `name:stream`)
/// - The store's artifact directory name
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidFileName("empty name".into()));
    }
    if name == ARTIFACT_DIR {
        return Err(TransferError::InvalidFileName(format!("{name} is reserved")));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(TransferError::InvalidFileName(format!(
            "name longer than {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0' | ':')) {
        return Err(TransferError::InvalidFileName(format!(
            "character {c:?} not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidFileName(format!(
            "not a plain file name: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_file_name("a.bin").is_ok());
        assert!(validate_file_name("report 2024.pdf").is_ok());
        assert!(validate_file_name(".hidden").is_ok());
        assert!(validate_file_name("ünïcødé.txt").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_dot_components() {
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("..").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_file_name("../../../etc/passwd").is_err());
        assert!(validate_file_name("sub/../escape").is_err());
        assert!(validate_file_name("..\\..\\evil").is_err());
    }

    #[test]
    fn rejects_absolute_and_prefixed() {
        assert!(validate_file_name("/tmp/malicious").is_err());
        assert!(validate_file_name("C:\\Windows\\evil").is_err());
        assert!(validate_file_name("C:evil").is_err());
    }

    #[test]
    fn rejects_artifact_directory_name() {
        assert!(validate_file_name(".partial").is_err());
        assert!(validate_file_name(".partial.txt").is_ok());
    }

    #[test]
    fn rejects_nul_and_long_names() {
        assert!(validate_file_name("a\0b").is_err());
        assert!(validate_file_name(&"x".repeat(256)).is_err());
        assert!(validate_file_name(&"x".repeat(255)).is_ok());
    }
}
