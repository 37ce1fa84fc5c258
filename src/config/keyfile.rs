/// INI-style keyfile reader/writer for chroot definitions and session files
///
/// Groups are `[name]` headers, entries are `key=value` lines, `#` starts a
/// comment line. Lists are comma separated. Groups and keys are kept in
/// sorted order so serialization is deterministic.
///
/// Values are escaped on write (`\n`, `\t`, `\r`, `\\`, and `\s` for
/// edge spaces) so a value can never spill onto a line of its own.
use crate::config::types::{ConfigError, ConfigWarning, Priority};
use crate::config::validator::Diagnostics;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Conversion between typed values and keyfile strings
pub trait KeyValue: Sized {
    fn parse_value(raw: &str) -> Result<Self, String>;
    fn format_value(&self) -> String;
}

impl KeyValue for String {
    fn parse_value(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn format_value(&self) -> String {
        self.clone()
    }
}

impl KeyValue for PathBuf {
    fn parse_value(raw: &str) -> Result<Self, String> {
        Ok(PathBuf::from(raw))
    }

    fn format_value(&self) -> String {
        self.to_string_lossy().into_owned()
    }
}

impl KeyValue for bool {
    fn parse_value(raw: &str) -> Result<Self, String> {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err("expected a boolean (true/false)".to_string()),
        }
    }

    fn format_value(&self) -> String {
        if *self { "true" } else { "false" }.to_string()
    }
}

impl KeyValue for Vec<String> {
    fn parse_value(raw: &str) -> Result<Self, String> {
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn format_value(&self) -> String {
        self.join(",")
    }
}

impl KeyValue for crate::config::types::Verbosity {
    fn parse_value(raw: &str) -> Result<Self, String> {
        raw.parse()
    }

    fn format_value(&self) -> String {
        self.to_string()
    }
}

/// Parsed keyfile: group name -> (key -> raw value)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keyfile {
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl Keyfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse keyfile text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut keyfile = Keyfile::new();
        let mut current: Option<String> = None;

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| ConfigError::Parse {
                    line: line_no,
                    reason: "unterminated group header".to_string(),
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(ConfigError::Parse {
                        line: line_no,
                        reason: "empty group name".to_string(),
                    });
                }
                if keyfile.groups.contains_key(name) {
                    return Err(ConfigError::Parse {
                        line: line_no,
                        reason: format!("duplicate group '{}'", name),
                    });
                }
                keyfile.groups.insert(name.to_string(), BTreeMap::new());
                current = Some(name.to_string());
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
                line: line_no,
                reason: "expected 'key=value'".to_string(),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Parse {
                    line: line_no,
                    reason: "empty key".to_string(),
                });
            }

            let group = current.as_ref().ok_or_else(|| ConfigError::Parse {
                line: line_no,
                reason: format!("key '{}' outside of any group", key),
            })?;
            let entries = keyfile.groups.entry(group.clone()).or_default();
            if entries.contains_key(key) {
                return Err(ConfigError::Parse {
                    line: line_no,
                    reason: format!("duplicate key '{}' in group '{}'", key, group),
                });
            }
            entries.insert(key.to_string(), unescape_value(value.trim()));
        }

        Ok(keyfile)
    }

    /// Read and parse a keyfile from disk
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { line, reason } => ConfigError::Parse {
                line,
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn has_key(&self, group: &str, key: &str) -> bool {
        self.get(group, key).is_some()
    }

    pub fn keys(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|entries| entries.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Raw string value of a key
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .get(group)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn set_value<T: KeyValue>(&mut self, group: &str, key: &str, value: &T) {
        self.set_raw(group, key, value.format_value());
    }

    pub fn set_raw(&mut self, group: &str, key: &str, value: impl Into<String>) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn remove_key(&mut self, group: &str, key: &str) {
        if let Some(entries) = self.groups.get_mut(group) {
            entries.remove(key);
        }
    }

    pub fn remove_group(&mut self, group: &str) {
        self.groups.remove(group);
    }

    /// Read a typed value honouring the key's priority.
    ///
    /// Returns `Ok(None)` when the key is absent (and not required) or
    /// obsolete. Advisory findings are pushed onto `diagnostics`.
    pub fn read<T: KeyValue>(
        &self,
        group: &str,
        key: &str,
        priority: Priority,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<T>, ConfigError> {
        let raw = match self.get(group, key) {
            Some(raw) => raw,
            None if priority == Priority::Required => {
                return Err(ConfigError::MissingRequiredKey {
                    group: group.to_string(),
                    key: key.to_string(),
                })
            }
            None => return Ok(None),
        };

        match priority {
            Priority::Disallowed => {
                return Err(ConfigError::DisallowedKeyUsed {
                    group: group.to_string(),
                    key: key.to_string(),
                })
            }
            Priority::Deprecated => diagnostics.push(ConfigWarning::DeprecatedKeyUsed {
                group: group.to_string(),
                key: key.to_string(),
            }),
            Priority::Obsolete => {
                diagnostics.push(ConfigWarning::ObsoleteKeyUsed {
                    group: group.to_string(),
                    key: key.to_string(),
                });
                return Ok(None);
            }
            Priority::Required | Priority::Optional => {}
        }

        T::parse_value(raw)
            .map(Some)
            .map_err(|reason| ConfigError::InvalidValue {
                group: group.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                reason,
            })
    }

    /// Write to disk, replacing any existing file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_string()).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for Keyfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (group, entries) in &self.groups {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "[{}]", group)?;
            for (key, value) in entries {
                writeln!(f, "{}={}", key, escape_value(value))?;
            }
        }
        Ok(())
    }
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            ' ' if i == 0 || i == last => escaped.push_str("\\s"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Unknown escapes are kept verbatim, so hand-written regexes survive
fn unescape_value(raw: &str) -> String {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => value.push('\\'),
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some('r') => value.push('\r'),
            Some('s') => value.push(' '),
            Some(other) => {
                value.push('\\');
                value.push(other);
            }
            None => value.push('\\'),
        }
    }
    value
}
