/// Environment variables passed to setup scripts and the session command
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Variables that let an unprivileged caller influence the dynamic linker,
/// the shell, or name resolution inside the chroot.
pub const DEFAULT_ENVIRONMENT_FILTER: &str = "^(BASH_ENV|CDPATH|ENV|HOSTALIASES|IFS|KRB5_CONFIG|KRBCONFDIR|KRBTKFILE|KRB_CONF|LD_.*|LOCALDOMAIN|NLSPATH|PATH_LOCALE|RES_OPTIONS|TERMINFO|TERMINFO_DIRS|TERMPATH)$";

/// Sorted name -> value map. Adding an empty value removes the name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment
    pub fn from_host() -> Self {
        std::env::vars().collect()
    }

    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.vars.remove(name);
        } else {
            self.vars.insert(name.to_string(), value);
        }
    }

    pub fn add_bool(&mut self, name: &str, value: bool) {
        self.add(name, if value { "true" } else { "false" });
    }

    pub fn add_path(&mut self, name: &str, value: &Path) {
        self.add(name, value.to_string_lossy().into_owned());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop every variable whose name matches `filter`
    pub fn filter(&mut self, filter: &Regex) {
        self.vars.retain(|name, _| !filter.is_match(name));
    }

    /// `NAME=value` strings, for exec-style interfaces
    pub fn to_strings(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            let k = k.into();
            env.add(&k, v);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value_removes() {
        let mut env = Environment::new();
        env.add("CHROOT_NAME", "sid");
        env.add("CHROOT_NAME", "");
        assert!(env.get("CHROOT_NAME").is_none());
        assert!(env.is_empty());
    }

    #[test]
    fn test_default_filter() {
        let filter = Regex::new(DEFAULT_ENVIRONMENT_FILTER).unwrap();
        let mut env: Environment = [
            ("LD_PRELOAD", "/tmp/evil.so"),
            ("IFS", " "),
            ("HOME", "/home/alice"),
            ("LD_LIBRARY_PATH", "/opt/lib"),
            ("TERM", "xterm"),
        ]
        .into_iter()
        .collect();

        env.filter(&filter);
        assert_eq!(
            env.to_strings(),
            vec!["HOME=/home/alice".to_string(), "TERM=xterm".to_string()]
        );
    }
}
