//! Rule catalog
//!
//! Every rule the engine can emit, with the metadata `explain` prints and
//! the filter built from the `[rules]` config section.

use std::collections::{HashMap, HashSet};

use crate::analysis::{NESTING_TOO_DEEP, PARSE_ERROR};
use crate::config::RulesConfig;
use crate::diagnostic::{Diagnostic, RuleId, Severity};
use crate::javascript::calls::notices;
use crate::javascript::dispatch::CALLED_DANGEROUS_GLOBAL;
use crate::javascript::predicates::READONLY_TOP;
use crate::javascript::traverser::{BANNED_IDENTIFIER, DANGEROUS_GLOBAL, GLOBAL_OVERWRITE};
use crate::markup::REMOTE_SCRIPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    Javascript,
    Compatibility,
    Markup,
}

impl RuleCategory {
    pub fn label(&self) -> &'static str {
        match self {
            RuleCategory::Javascript => "javascript",
            RuleCategory::Compatibility => "compatibility",
            RuleCategory::Markup => "markup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMetadata {
    pub id: RuleId,
    pub name: &'static str,
    pub description: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
}

const fn rule(
    id: RuleId,
    name: &'static str,
    category: RuleCategory,
    severity: Severity,
    description: &'static str,
) -> RuleMetadata {
    RuleMetadata {
        id,
        name,
        description,
        category,
        severity,
    }
}

static ENGINE_RULES: &[RuleMetadata] = &[
    rule(
        DANGEROUS_GLOBAL,
        "dangerous-global",
        RuleCategory::Javascript,
        Severity::Warning,
        "Access to a global that is unsafe or deprecated, such as \
         `eval` or `Components.utils.evalInSandbox`.",
    ),
    rule(
        CALLED_DANGEROUS_GLOBAL,
        "called-dangerous-global",
        RuleCategory::Javascript,
        Severity::Warning,
        "A restricted API was called with arguments that make the call unsafe, \
         such as `setTimeout` with a string or a synchronous XMLHttpRequest.",
    ),
    rule(
        GLOBAL_OVERWRITE,
        "global-overwrite",
        RuleCategory::Javascript,
        Severity::Warning,
        "A read-only global provided by the platform was assigned a new value.",
    ),
    rule(
        BANNED_IDENTIFIER,
        "banned-identifier",
        RuleCategory::Javascript,
        Severity::Warning,
        "An identifier or member name that may not be used at all, such as \
         `newThread` or `processNextEvent`.",
    ),
    rule(
        PARSE_ERROR,
        "parse-error",
        RuleCategory::Javascript,
        Severity::Error,
        "The script could not be parsed and was not analyzed.",
    ),
    rule(
        NESTING_TOO_DEEP,
        "nesting-too-deep",
        RuleCategory::Javascript,
        Severity::Error,
        "The script nests expressions or statements deeper than the configured \
         limit and was only partially analyzed.",
    ),
    rule(
        READONLY_TOP,
        "readonly-top",
        RuleCategory::Compatibility,
        Severity::Notice,
        "The `top` global is reserved and cannot be assigned starting with Gecko 6.",
    ),
    rule(
        REMOTE_SCRIPT,
        "remote-script",
        RuleCategory::Markup,
        Severity::Warning,
        "A markup document loads a script from a remote location. Extensions must \
         ship all of their code.",
    ),
];

#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<RuleMetadata>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        let compat = notices::ALL.iter().map(|notice| RuleMetadata {
            id: notice.rule_id(),
            name: notice.check,
            description: notice.message,
            category: RuleCategory::Compatibility,
            severity: Severity::Notice,
        });
        Self {
            rules: ENGINE_RULES.iter().cloned().chain(compat).collect(),
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleMetadata> {
        self.rules.iter()
    }

    /// Looks a rule up by `module::check`, bare check name, or display name.
    pub fn get(&self, id_or_name: &str) -> Option<&RuleMetadata> {
        self.rules
            .iter()
            .find(|r| r.id.matches(id_or_name) || r.name == id_or_name)
    }

    pub fn configure(&self, config: &RulesConfig) -> RuleFilter {
        let mut filter = RuleFilter::default();

        for reference in &config.disabled {
            match self.get(reference) {
                Some(rule) => {
                    filter.disabled.insert(rule.id);
                }
                None => filter.unknown.push(reference.clone()),
            }
        }

        for (reference, severity) in &config.severity {
            match self.get(reference) {
                Some(rule) => {
                    filter.severity_overrides.insert(rule.id, (*severity).into());
                }
                None => filter.unknown.push(reference.clone()),
            }
        }

        filter
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Disabled rules and severity overrides resolved against the catalog.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    disabled: HashSet<RuleId>,
    severity_overrides: HashMap<RuleId, Severity>,
    unknown: Vec<String>,
}

impl RuleFilter {
    pub fn apply(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        diagnostics
            .into_iter()
            .filter(|d| !self.disabled.contains(&d.rule_id))
            .map(|mut d| {
                if let Some(severity) = self.severity_overrides.get(&d.rule_id) {
                    d.severity = *severity;
                }
                d
            })
            .collect()
    }

    pub fn is_rule_enabled(&self, id: RuleId) -> bool {
        !self.disabled.contains(&id)
    }

    /// Config references that name no known rule.
    pub fn unknown_references(&self) -> &[String] {
        &self.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeverityValue;

    fn diagnostic(rule_id: RuleId) -> Diagnostic {
        Diagnostic::new(rule_id, Severity::Warning, "m", "a.js", 1, 0)
    }

    #[test]
    fn lookup_by_id_check_or_name() {
        let catalog = RuleCatalog::new();

        assert_eq!(catalog.get("javascript::dangerous_global").unwrap().id, DANGEROUS_GLOBAL);
        assert_eq!(catalog.get("dangerous_global").unwrap().id, DANGEROUS_GLOBAL);
        assert_eq!(catalog.get("dangerous-global").unwrap().id, DANGEROUS_GLOBAL);
        assert_eq!(
            catalog.get("compat::nsIJSON_deprec").unwrap().category,
            RuleCategory::Compatibility
        );
        assert!(catalog.get("no-such-rule").is_none());
    }

    #[test]
    fn every_id_is_unique() {
        let catalog = RuleCatalog::new();
        let ids: HashSet<_> = catalog.rules().map(|r| r.id).collect();

        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn filter_drops_disabled_rules_and_overrides_severity() {
        let catalog = RuleCatalog::new();
        let config = RulesConfig {
            disabled: vec!["banned-identifier".into(), "missing".into()],
            severity: HashMap::from([(
                "javascript::global_overwrite".to_string(),
                SeverityValue::Error,
            )]),
        };

        let filter = catalog.configure(&config);
        let filtered = filter.apply(vec![
            diagnostic(BANNED_IDENTIFIER),
            diagnostic(GLOBAL_OVERWRITE),
            diagnostic(DANGEROUS_GLOBAL),
        ]);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].severity, Severity::Error);
        assert_eq!(filtered[1].severity, Severity::Warning);
        assert!(!filter.is_rule_enabled(BANNED_IDENTIFIER));
        assert_eq!(filter.unknown_references(), ["missing".to_string()]);
    }
}
