/// Human-readable chroot metadata (name/value pairs) with a JSON rendering
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetailItem {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Details {
    pub title: String,
    pub items: Vec<DetailItem>,
}

impl Details {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, value: impl fmt::Display) {
        self.items.push(DetailItem {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn add_bool(&mut self, name: &str, value: bool) {
        self.add(name, if value { "true" } else { "false" });
    }

    pub fn add_path(&mut self, name: &str, value: &Path) {
        self.add(name, value.display());
    }

    pub fn add_list(&mut self, name: &str, values: &[String]) {
        self.add(name, values.join(" "));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.value.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  --- {} ---", self.title)?;
        for item in &self.items {
            writeln!(f, "  {:<22} {}", item.name, item.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut details = Details::new("Chroot");
        details.add("Name", "sid");
        details.add_bool("Run Setup Scripts", true);
        details.add_list("Users", &["a".to_string(), "b".to_string()]);

        let text = details.to_string();
        assert!(text.starts_with("  --- Chroot ---\n"));
        assert!(text.contains("  Name                   sid\n"));
        assert!(text.contains("  Users                  a b\n"));
        assert_eq!(details.get("Run Setup Scripts"), Some("true"));
        assert!(details.to_json().unwrap().contains("\"title\": \"Chroot\""));
    }
}
