//! Missing-dependency hints scraped from error text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static NO_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No module named ['"]([A-Za-z_][\w.]*)['"]"#).expect("static regex")
});
static NOT_DEFINED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name ['"]([A-Za-z_]\w*)['"] is not defined"#).expect("static regex")
});
static CANNOT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"cannot import name ['"]([A-Za-z_]\w*)['"] from ['"]([A-Za-z_][\w.]*)['"]"#)
        .expect("static regex")
});

/// What a run appears to be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingDependencies {
    /// Top-level packages that failed to import.
    pub modules: BTreeSet<String>,
    /// Names used without a definition or import.
    pub names: BTreeSet<String>,
}

impl MissingDependencies {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.names.is_empty()
    }
}

/// Scan every text for missing-module and undefined-name errors.
pub fn missing_dependencies<'a, I>(texts: I) -> MissingDependencies
where
    I: IntoIterator<Item = &'a str>,
{
    let mut found = MissingDependencies::default();
    for text in texts {
        for caps in NO_MODULE.captures_iter(text) {
            found.modules.insert(top_level(&caps[1]));
        }
        for caps in CANNOT_IMPORT.captures_iter(text) {
            found.modules.insert(top_level(&caps[2]));
            found.names.insert(caps[1].to_string());
        }
        for caps in NOT_DEFINED.captures_iter(text) {
            found.names.insert(caps[1].to_string());
        }
    }
    found
}

fn top_level(module: &str) -> String {
    module.split('.').next().unwrap_or(module).to_string()
}
