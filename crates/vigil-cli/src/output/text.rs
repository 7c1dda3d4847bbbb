//! Human-readable terminal output
//!
//! One block per diagnostic with the offending line, followed by a summary.

use colored::{ColoredString, Colorize};
use vigil_core::diagnostic::{Diagnostic, Severity};

pub struct TextFormatter {
    show_descriptions: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self {
            show_descriptions: true,
        }
    }

    /// Drops the long descriptions and prints only headers and context.
    pub fn compact() -> Self {
        Self {
            show_descriptions: false,
        }
    }

    pub fn format(&self, diagnostics: &[Diagnostic]) -> String {
        let mut output = String::new();

        for diag in diagnostics {
            output.push_str(&self.format_diagnostic(diag));
            output.push('\n');
        }

        if !diagnostics.is_empty() {
            output.push_str(&format_summary(diagnostics));
        }

        output
    }

    fn format_diagnostic(&self, diag: &Diagnostic) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{}[{}]: {}",
            colorize_severity(diag.severity),
            diag.rule_id.to_string().dimmed(),
            diag.message
        ));
        lines.push(format!(
            "  {} {}:{}:{}",
            "-->".blue(),
            diag.file,
            diag.line,
            diag.column
        ));

        if let Some(context) = &diag.context {
            let padding = " ".repeat(diag.line.to_string().len());
            lines.push(format!("{} {}", padding, "|".blue()));
            lines.push(format!("{} {} {}", diag.line.to_string().blue(), "|".blue(), context));
            lines.push(format!("{} {}", padding, "|".blue()));
        }

        if self.show_descriptions {
            for paragraph in &diag.description {
                lines.push(format!("  {} {}", "=".blue(), paragraph));
            }
        }

        if let Some(compatibility) = &diag.compatibility {
            for (app, range) in &compatibility.for_appversions {
                lines.push(format!(
                    "  {} {} {} to {}",
                    "affects:".cyan(),
                    app,
                    range.min,
                    range.max
                ));
            }
        }

        lines.join("\n")
    }
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn colorize_severity(severity: Severity) -> ColoredString {
    match severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Notice => "notice".blue().bold(),
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

fn format_summary(diagnostics: &[Diagnostic]) -> String {
    let count = |severity: Severity| diagnostics.iter().filter(|d| d.severity == severity).count();
    let total = diagnostics.len();

    format!(
        "\nFound {} {} ({}, {}, {})\n",
        total.to_string().bold(),
        if total == 1 { "problem" } else { "problems" },
        plural(count(Severity::Error), "error").red(),
        plural(count(Severity::Warning), "warning").yellow(),
        plural(count(Severity::Notice), "notice").blue()
    )
}
