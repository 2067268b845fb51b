//! Registered filter list sources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Line syntax a source is expected to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxKind {
    /// Adblock Plus / uBlock Origin filter syntax
    #[default]
    Adblock,
    /// `/etc/hosts` style `IP hostname` lines
    Hosts,
    /// One domain per line
    Domains,
    /// Anything non-empty and not a comment is a rule
    Custom,
}

impl SyntaxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntaxKind::Adblock => "adblock",
            SyntaxKind::Hosts => "hosts",
            SyntaxKind::Domains => "domains",
            SyntaxKind::Custom => "custom",
        }
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra per-list acceptance rule, declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomCheck {
    /// Some line must equal `line` after trimming.
    ContainsLine { line: String },
    /// Some line must match the regular expression.
    ContainsPattern { pattern: String },
    /// A `! Name: value` metadata header must be present. When `value`
    /// is set the header value must contain it.
    HeaderField {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
}

/// How to treat an embedded `! Checksum:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    Ignore,
    #[default]
    IfPresent,
    Required,
}

/// A single registered remote filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Unique source name
    pub name: String,

    /// Fetch URL
    pub url: String,

    /// Output filename inside the snapshot directory
    pub filename: String,

    /// Expected line syntax
    #[serde(default)]
    pub syntax: SyntaxKind,

    /// Minimum number of rule lines for acceptance
    #[serde(default)]
    pub min_rules: Option<usize>,

    /// Optional custom acceptance check
    #[serde(default)]
    pub check: Option<CustomCheck>,

    /// Embedded checksum handling
    #[serde(default)]
    pub checksum: ChecksumPolicy,
}

impl SourceSpec {
    /// Create a source with default policy.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        filename: impl Into<String>,
        syntax: SyntaxKind,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            filename: filename.into(),
            syntax,
            min_rules: None,
            check: None,
            checksum: ChecksumPolicy::default(),
        }
    }

    pub fn with_min_rules(mut self, min_rules: usize) -> Self {
        self.min_rules = Some(min_rules);
        self
    }

    pub fn with_check(mut self, check: CustomCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumPolicy) -> Self {
        self.checksum = checksum;
        self
    }

    /// Effective rule threshold. Always at least one.
    pub fn threshold(&self) -> usize {
        self.min_rules.unwrap_or(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_never_zero() {
        let spec = SourceSpec::new("a", "https://example.com/a.txt", "a.txt", SyntaxKind::Adblock);
        assert_eq!(spec.threshold(), 1);
        assert_eq!(spec.clone().with_min_rules(0).threshold(), 1);
        assert_eq!(spec.with_min_rules(1000).threshold(), 1000);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let spec: SourceSpec = toml::from_str(
            r#"
            name = "peter-lowe"
            url = "https://pgl.yoyo.org/adservers/serverlist.php?hostformat=hosts"
            filename = "peter-lowe.txt"
            syntax = "hosts"
            min_rules = 1000

            [check]
            type = "contains_line"
            line = "127.0.0.1 2o7.net"
            "#,
        )
        .unwrap();

        assert_eq!(spec.syntax, SyntaxKind::Hosts);
        assert_eq!(spec.threshold(), 1000);
        assert_eq!(spec.checksum, ChecksumPolicy::IfPresent);
        assert!(matches!(spec.check, Some(CustomCheck::ContainsLine { .. })));
    }
}
