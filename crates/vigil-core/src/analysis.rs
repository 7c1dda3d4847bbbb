//! Analysis engine for extension scripts and markup
//!
//! Wraps the semantic JavaScript traversal with parse-error reporting and the
//! configured rule filter. This is the entry point for the CLI and other
//! consumers.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::context::RunContext;
use crate::diagnostic::{Diagnostic, RuleId, Severity};
use crate::javascript::{AnalysisError, DEFAULT_MAX_DEPTH, Traverser};
use crate::markup::{self, ScriptReference};
use crate::parser::ParsedFile;
use crate::rules::{RuleCatalog, RuleFilter};

pub const PARSE_ERROR: RuleId = RuleId::new("javascript", "parse_error");
pub const NESTING_TOO_DEEP: RuleId = RuleId::new("javascript", "nesting_too_deep");

/// Diagnostics of one markup document plus the script files it references.
#[derive(Debug, Clone, Default)]
pub struct MarkupAnalysis {
    pub diagnostics: Vec<Diagnostic>,
    pub scripts: BTreeSet<String>,
}

pub struct AnalysisEngine {
    catalog: RuleCatalog,
    filter: RuleFilter,
    max_depth: usize,
}

impl AnalysisEngine {
    pub fn new() -> Self {
        Self {
            catalog: RuleCatalog::new(),
            filter: RuleFilter::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_config(config: &Config) -> Self {
        let catalog = RuleCatalog::new();
        let filter = catalog.configure(&config.rules);
        Self {
            catalog,
            filter,
            max_depth: config.analysis.max_depth,
        }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn filter(&self) -> &RuleFilter {
        &self.filter
    }

    pub fn analyze(&self, file: &ParsedFile, run: &RunContext) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = file
            .errors()
            .iter()
            .map(|error| {
                Diagnostic::new(
                    PARSE_ERROR,
                    Severity::Error,
                    format!("JavaScript syntax error: {}", error.message),
                    file.filename(),
                    error.line,
                    error.column,
                )
                .with_context(file.context_snippet(error.line))
            })
            .collect();

        let mut traverser = Traverser::new(file, run).with_max_depth(self.max_depth);
        let outcome = traverser.traverse();
        diagnostics.extend(traverser.into_diagnostics());

        match outcome {
            Ok(()) => {}
            Err(AnalysisError::NestingTooDeep { limit, line }) => {
                tracing::debug!(file = file.filename(), limit, line, "analysis stopped early");
                diagnostics.push(
                    Diagnostic::new(
                        NESTING_TOO_DEEP,
                        Severity::Error,
                        format!("Code is nested more than {limit} levels deep"),
                        file.filename(),
                        line,
                        0,
                    )
                    .with_description(
                        "The rest of this file was not analyzed. Deeply nested code is \
                         usually generated or obfuscated.",
                    )
                    .with_context(file.context_snippet(line)),
                );
            }
            Err(AnalysisError::Unparsed { filename }) => {
                if file.errors().is_empty() {
                    diagnostics.push(Diagnostic::new(
                        PARSE_ERROR,
                        Severity::Error,
                        "JavaScript could not be parsed",
                        &filename,
                        file.metadata().starting_line,
                        0,
                    ));
                }
            }
        }

        self.filter.apply(diagnostics)
    }

    pub fn analyze_source(&self, filename: &str, source: &str, run: &RunContext) -> Vec<Diagnostic> {
        let file = ParsedFile::from_source(filename, source);
        self.analyze(&file, run)
    }

    /// Analyzes the inline scripts of a markup document and collects the
    /// script files it references.
    pub fn analyze_markup(&self, filename: &str, source: &str, run: &RunContext) -> MarkupAnalysis {
        let tags = markup::scan(source);
        let mut diagnostics = Vec::new();

        for tag in tags.iter().filter(|tag| tag.is_javascript()) {
            match &tag.reference {
                ScriptReference::Remote(_) => {
                    diagnostics.extend(markup::remote_script_diagnostic(filename, tag));
                }
                ScriptReference::Inline(inline) if !inline.is_blank() => {
                    let file = ParsedFile::with_starting_line(filename, &inline.body, inline.line);
                    diagnostics.extend(self.analyze(&file, run));
                }
                _ => {}
            }
        }

        MarkupAnalysis {
            diagnostics: self.filter.apply(diagnostics),
            scripts: markup::discovered_scripts(&tags),
        }
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RulesConfig;
    use crate::javascript::traverser::DANGEROUS_GLOBAL;

    fn rule_ids(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics.iter().map(|d| d.rule_id.to_string()).collect()
    }

    #[test]
    fn syntax_errors_become_diagnostics() {
        let engine = AnalysisEngine::new();

        let diagnostics = engine.analyze_source("test.js", "var = ;", &RunContext::new());

        assert!(
            diagnostics.iter().any(|d| d.rule_id == PARSE_ERROR),
            "{:?}",
            rule_ids(&diagnostics)
        );
        assert!(diagnostics.iter().all(|d| d.file == "test.js"));
    }

    #[test]
    fn deep_nesting_keeps_earlier_diagnostics() {
        let mut config = Config::default();
        config.analysis.max_depth = 16;
        let engine = AnalysisEngine::with_config(&config);
        let nested = format!("eval;\nvar x = {}1{};", "[".repeat(40), "]".repeat(40));

        let diagnostics = engine.analyze_source("test.js", &nested, &RunContext::new());

        assert_eq!(diagnostics[0].rule_id, DANGEROUS_GLOBAL);
        let overflow = diagnostics.last().unwrap();
        assert_eq!(overflow.rule_id, NESTING_TOO_DEEP);
        assert_eq!(overflow.line, 2);
    }

    #[test]
    fn disabled_rules_are_filtered() {
        let config = Config {
            rules: RulesConfig {
                disabled: vec!["dangerous_global".into()],
                ..RulesConfig::default()
            },
            ..Config::default()
        };
        let engine = AnalysisEngine::with_config(&config);

        let diagnostics = engine.analyze_source("test.js", "eval('x');", &RunContext::new());

        assert!(diagnostics.is_empty(), "{:?}", rule_ids(&diagnostics));
    }

    #[test]
    fn inline_markup_scripts_report_document_lines() {
        let engine = AnalysisEngine::new();
        let source = "<window>\n  <script>\n    var a = 1;\n    eval('a');\n  </script>\n  \
                      <script src=\"chrome://addon/content/main.js\"/>\n</window>";

        let analysis = engine.analyze_markup("overlay.xul", source, &RunContext::new());

        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].line, 4);
        assert_eq!(analysis.diagnostics[0].file, "overlay.xul");
        assert!(analysis.scripts.contains("chrome://addon/content/main.js"));
    }

    #[test]
    fn analysis_is_deterministic() {
        let engine = AnalysisEngine::new();
        let code = "var s = document.getSelection(); setTimeout('x()', 1); eval(s);";
        let run = RunContext::new();

        let first = engine.analyze_source("test.js", code, &run);
        let second = engine.analyze_source("test.js", code, &run);

        assert_eq!(first, second);
    }
}
