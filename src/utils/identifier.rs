/// Identifier validation for chroot names, session ids and config file names
use crate::config::types::ValidationError;

/// Suffixes left behind by package managers and editors
const BACKUP_SUFFIXES: &[&str] = &[
    ".dpkg-old",
    ".dpkg-new",
    ".dpkg-dist",
    ".dpkg-bak",
    ".dpkg-tmp",
    ".rpmnew",
    ".rpmsave",
    ".rpmorig",
    ".swp",
];

const MAX_IDENTIFIER_LEN: usize = 255;

fn invalid(id: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidIdentifier {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Validate a session identifier.
///
/// Session ids become file names in the session directory and path
/// components of snapshot devices and mount points, so every valid id is
/// also a valid definition file name.
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(invalid(id, "must not be empty"));
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid(id, "too long"));
    }
    if let Some(c) = id.chars().find(|c| !is_identifier_char(*c)) {
        return Err(invalid(id, &format!("contains invalid character '{}'", c)));
    }
    if id.starts_with('.') || id.starts_with('-') {
        return Err(invalid(id, "must not begin with '.' or '-'"));
    }
    if id.contains("..") {
        return Err(invalid(id, "must not contain '..'"));
    }
    if let Some(suffix) = BACKUP_SUFFIXES.iter().find(|s| id.ends_with(*s)) {
        return Err(invalid(id, &format!("must not end with '{}'", suffix)));
    }
    Ok(())
}

/// Validate a chroot name taken from a definition group.
///
/// Same rules as session ids; ':' is reserved as the namespace separator.
pub fn validate_chroot_name(name: &str) -> Result<(), ValidationError> {
    if name.contains(':') {
        return Err(invalid(name, "must not contain ':'"));
    }
    validate_session_id(name)
}

/// Whether a directory entry should be read as a definition file (run-parts rules)
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.')
        && !name.ends_with('~')
        && !BACKUP_SUFFIXES.iter().any(|s| name.ends_with(s))
}
