//! JSON output for programmatic integration

use std::collections::BTreeSet;

use serde::Serialize;
use vigil_core::diagnostic::{Compatibility, Diagnostic, Severity};
use vigil_core::rules::{RuleCatalog, RuleCategory};

#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub version: &'static str,
    pub metadata: JsonMetadata,
    pub summary: JsonSummary,
    pub diagnostics: Vec<JsonDiagnostic<'a>>,
    /// Script files referenced from markup documents.
    pub scripts: &'a BTreeSet<String>,
}

#[derive(Serialize)]
pub struct JsonMetadata {
    pub vigil_version: &'static str,
    pub analyzed_path: String,
}

#[derive(Serialize)]
pub struct JsonSummary {
    pub total_files: usize,
    pub files_with_issues: usize,
    pub total_diagnostics: usize,
    pub passed: bool,
    pub by_severity: SeverityCounts,
    pub by_category: CategoryCounts,
}

#[derive(Serialize, Default)]
pub struct SeverityCounts {
    pub error: usize,
    pub warning: usize,
    pub notice: usize,
}

#[derive(Serialize, Default)]
pub struct CategoryCounts {
    pub javascript: usize,
    pub compatibility: usize,
    pub markup: usize,
}

#[derive(Serialize)]
pub struct JsonDiagnostic<'a> {
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    pub severity: Severity,
    pub message: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub description: &'a [String],
    pub location: JsonLocation<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<&'a Compatibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<u32>,
}

#[derive(Serialize)]
pub struct JsonLocation<'a> {
    pub file: &'a str,
    pub line: usize,
    pub column: usize,
}

/// Inputs of one rendered report besides the diagnostics.
pub struct RunSummary<'a> {
    pub analyzed_path: &'a str,
    pub total_files: usize,
    pub passed: bool,
    pub scripts: &'a BTreeSet<String>,
}

pub struct JsonFormatter<'a> {
    catalog: &'a RuleCatalog,
}

impl<'a> JsonFormatter<'a> {
    pub fn with_catalog(catalog: &'a RuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn format(&self, diagnostics: &[Diagnostic], run: &RunSummary<'_>) -> String {
        let output = self.build_output(diagnostics, run);
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }

    fn build_output<'d>(
        &self,
        diagnostics: &'d [Diagnostic],
        run: &RunSummary<'d>,
    ) -> JsonOutput<'d> {
        let diagnostics: Vec<JsonDiagnostic<'d>> =
            diagnostics.iter().map(|d| self.convert(d)).collect();

        JsonOutput {
            version: "1.0",
            metadata: JsonMetadata {
                vigil_version: env!("CARGO_PKG_VERSION"),
                analyzed_path: run.analyzed_path.to_string(),
            },
            summary: summarize(&diagnostics, run),
            diagnostics,
            scripts: run.scripts,
        }
    }

    fn convert<'d>(&self, diag: &'d Diagnostic) -> JsonDiagnostic<'d> {
        let rule = self.catalog.get(&diag.rule_id.to_string());

        JsonDiagnostic {
            rule_id: diag.rule_id.to_string(),
            rule_name: rule.map(|r| r.name),
            category: rule.map(|r| r.category.label()),
            severity: diag.severity,
            message: &diag.message,
            description: &diag.description,
            location: JsonLocation {
                file: &diag.file,
                line: diag.line,
                column: diag.column,
            },
            context: diag.context.as_deref(),
            compatibility: diag.compatibility.as_ref(),
            tier: diag.tier,
        }
    }
}

fn summarize(diagnostics: &[JsonDiagnostic<'_>], run: &RunSummary<'_>) -> JsonSummary {
    let mut by_severity = SeverityCounts::default();
    let mut by_category = CategoryCounts::default();
    let mut files = BTreeSet::new();

    for diag in diagnostics {
        files.insert(diag.location.file);
        match diag.severity {
            Severity::Error => by_severity.error += 1,
            Severity::Warning => by_severity.warning += 1,
            Severity::Notice => by_severity.notice += 1,
        }
        match diag.category {
            Some(label) if label == RuleCategory::Compatibility.label() => {
                by_category.compatibility += 1
            }
            Some(label) if label == RuleCategory::Markup.label() => by_category.markup += 1,
            _ => by_category.javascript += 1,
        }
    }

    JsonSummary {
        total_files: run.total_files,
        files_with_issues: files.len(),
        total_diagnostics: diagnostics.len(),
        passed: run.passed,
        by_severity,
        by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::javascript::calls::notices;
    use vigil_core::javascript::traverser::DANGEROUS_GLOBAL;
    use vigil_core::markup::REMOTE_SCRIPT;

    fn render(diagnostics: &[Diagnostic]) -> serde_json::Value {
        let catalog = RuleCatalog::new();
        let scripts: BTreeSet<String> = ["chrome://addon/content/main.js".to_string()].into();
        let run = RunSummary {
            analyzed_path: "addon",
            total_files: 3,
            passed: true,
            scripts: &scripts,
        };
        let output = JsonFormatter::with_catalog(&catalog).format(diagnostics, &run);
        serde_json::from_str(&output).unwrap()
    }

    #[test]
    fn empty_report_has_zero_counts() {
        let value = render(&[]);

        assert_eq!(value["version"], "1.0");
        assert_eq!(value["metadata"]["analyzed_path"], "addon");
        assert_eq!(value["summary"]["total_files"], 3);
        assert_eq!(value["summary"]["total_diagnostics"], 0);
        assert_eq!(value["summary"]["passed"], true);
        assert_eq!(value["scripts"][0], "chrome://addon/content/main.js");
    }

    #[test]
    fn diagnostics_carry_catalog_metadata() {
        let diag = Diagnostic::new(DANGEROUS_GLOBAL, Severity::Warning, "Access", "main.js", 3, 1)
            .with_context(Some("eval(x);"))
            .with_tier(2);

        let value = render(&[diag]);
        let first = &value["diagnostics"][0];

        assert_eq!(first["rule_id"], "javascript::dangerous_global");
        assert_eq!(first["category"], "javascript");
        assert_eq!(first["severity"], "warning");
        assert_eq!(first["location"]["line"], 3);
        assert_eq!(first["context"], "eval(x);");
        assert_eq!(first["tier"], 2);
        assert!(first.get("description").is_none());
    }

    #[test]
    fn summary_groups_by_category_and_file() {
        let notice = &notices::DOCUMENT_GET_SELECTION;
        let diagnostics = [
            Diagnostic::new(DANGEROUS_GLOBAL, Severity::Warning, "a", "a.js", 1, 0),
            Diagnostic::new(notice.rule_id(), Severity::Notice, "b", "a.js", 2, 0),
            Diagnostic::new(REMOTE_SCRIPT, Severity::Warning, "c", "overlay.xul", 5, 0),
        ];

        let value = render(&diagnostics);
        let summary = &value["summary"];

        assert_eq!(summary["files_with_issues"], 2);
        assert_eq!(summary["by_severity"]["warning"], 2);
        assert_eq!(summary["by_severity"]["notice"], 1);
        assert_eq!(summary["by_category"]["javascript"], 1);
        assert_eq!(summary["by_category"]["compatibility"], 1);
        assert_eq!(summary["by_category"]["markup"], 1);
    }
}
