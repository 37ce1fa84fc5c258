// Definition validation
// Advisory findings are collected in Diagnostics while reading; a whole-file
// lint reports every group's errors and warnings at once.

use crate::chroot::Chroot;
use crate::config::keyfile::Keyfile;
use crate::config::types::ConfigWarning;
use crate::observability::LogContext;

/// Advisory findings collected while reading definitions
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    warnings: Vec<ConfigWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: ConfigWarning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    /// Emit every collected warning through the log context
    pub fn report(&self, log: &LogContext) {
        for warning in &self.warnings {
            log.warning(warning);
        }
    }
}

/// Warn about keys in `group` that no facet claimed
pub fn check_unknown_keys(
    keyfile: &Keyfile,
    group: &str,
    used_keys: &[String],
    diagnostics: &mut Diagnostics,
) {
    for key in keyfile.keys(group) {
        if !used_keys.iter().any(|used| used == key) {
            diagnostics.push(ConfigWarning::UnknownKey {
                group: group.to_string(),
                key: key.to_string(),
            });
        }
    }
}

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Check every chroot group in a definition keyfile without stopping at the first failure
pub fn validate_definitions(keyfile: &Keyfile) -> ValidationReport {
    let mut report = ValidationReport::new();

    for group in keyfile.groups() {
        let mut diagnostics = Diagnostics::new();
        match Chroot::from_keyfile(keyfile, group, false, &mut diagnostics) {
            Ok(chroot) => {
                if chroot.users().is_empty()
                    && chroot.groups().is_empty()
                    && chroot.root_users().is_empty()
                    && chroot.root_groups().is_empty()
                {
                    report.add_warning(format!(
                        "[{}]: no users or groups are permitted to use this chroot",
                        group
                    ));
                }
            }
            Err(e) => report.add_error(e.to_string()),
        }
        for warning in diagnostics.warnings() {
            report.add_warning(warning.to_string());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keys_are_warnings() {
        let keyfile = Keyfile::parse("[sid]\ntype=directory\nfrobnicate=1\n").unwrap();
        let mut diag = Diagnostics::new();
        check_unknown_keys(&keyfile, "sid", &["type".to_string()], &mut diag);
        assert_eq!(
            diag.warnings(),
            &[ConfigWarning::UnknownKey {
                group: "sid".to_string(),
                key: "frobnicate".to_string()
            }]
        );
    }

    #[test]
    fn test_validate_definitions_collects_everything() {
        let keyfile = Keyfile::parse(
            "[good]\ntype=directory\ndirectory=/srv/good\nusers=alice\n\n\
             [broken]\ntype=block-device\n\n\
             [odd]\ntype=directory\ndirectory=/srv/odd\npriority=3\n",
        )
        .unwrap();

        let report = validate_definitions(&keyfile);
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("device"));
        assert!(report.warnings.iter().any(|w| w.contains("priority")));
        assert!(report.warnings.iter().any(|w| w.contains("no users")));
    }
}
