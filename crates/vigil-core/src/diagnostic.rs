//! Diagnostic types emitted by the analysis engine
//!
//! A diagnostic is pure data: emitting one never interrupts traversal.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub const FIREFOX_GUID: &str = "{ec8030f7-c20a-464f-9b0e-13a3a9e97384}";
pub const THUNDERBIRD_GUID: &str = "{3550f703-e582-4d05-9a08-453d09bdfdc6}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Notice,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// Stable `(module, check)` identifier of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId {
    pub module: &'static str,
    pub check: &'static str,
}

impl RuleId {
    pub const fn new(module: &'static str, check: &'static str) -> Self {
        Self { module, check }
    }

    /// Matches either the full `module::check` form or the bare check name.
    pub fn matches(&self, reference: &str) -> bool {
        match reference.split_once("::") {
            Some((module, check)) => module == self.module && check == self.check,
            None => reference == self.check,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.check)
    }
}

impl Serialize for RuleId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRange {
    pub min: String,
    pub max: String,
}

impl VersionRange {
    pub fn new(min: &str, max: &str) -> Self {
        Self {
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityType {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compatibility {
    pub for_appversions: BTreeMap<String, VersionRange>,
    pub compatibility_type: CompatibilityType,
}

impl Compatibility {
    pub fn new(compatibility_type: CompatibilityType) -> Self {
        Self {
            for_appversions: BTreeMap::new(),
            compatibility_type,
        }
    }

    pub fn app(mut self, guid: &str, min: &str, max: &str) -> Self {
        self.for_appversions
            .insert(guid.to_string(), VersionRange::new(min, max));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
    pub file: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<Compatibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<u32>,
}

impl Diagnostic {
    pub fn new(
        rule_id: RuleId,
        severity: Severity,
        message: impl Into<String>,
        file: &str,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            rule_id,
            severity,
            message: message.into(),
            description: Vec::new(),
            file: file.to_string(),
            line,
            column,
            context: None,
            compatibility: None,
            tier: None,
        }
    }

    pub fn with_description(mut self, line: impl Into<String>) -> Self {
        self.description.push(line.into());
        self
    }

    pub fn with_context(mut self, context: Option<&str>) -> Self {
        self.context = context.map(str::to_string);
        self
    }

    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = Some(compatibility);
        self
    }

    pub fn with_tier(mut self, tier: u32) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_id_matches_full_and_short_forms() {
        let id = RuleId::new("javascript", "dangerous_global");

        assert!(id.matches("javascript::dangerous_global"));
        assert!(id.matches("dangerous_global"));
        assert!(!id.matches("markup::dangerous_global"));
        assert_eq!(id.to_string(), "javascript::dangerous_global");
    }

    #[test]
    fn severity_orders_by_gravity() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Notice);
    }

    #[test]
    fn compatibility_serializes_version_ranges() {
        let diagnostic = Diagnostic::new(
            RuleId::new("compat", "document_getSelection"),
            Severity::Notice,
            "document.getSelection()'s return type has changed.",
            "chrome/content/overlay.js",
            3,
            4,
        )
        .with_compatibility(
            Compatibility::new(CompatibilityType::Error).app(FIREFOX_GUID, "8.0a1", "9.0a1"),
        )
        .with_tier(5);

        insta::assert_json_snapshot!(diagnostic, @r###"
        {
          "rule_id": "compat::document_getSelection",
          "severity": "notice",
          "message": "document.getSelection()'s return type has changed.",
          "file": "chrome/content/overlay.js",
          "line": 3,
          "column": 4,
          "compatibility": {
            "for_appversions": {
              "{ec8030f7-c20a-464f-9b0e-13a3a9e97384}": {
                "min": "8.0a1",
                "max": "9.0a1"
              }
            },
            "compatibility_type": "error"
          },
          "tier": 5
        }
        "###);
    }
}
