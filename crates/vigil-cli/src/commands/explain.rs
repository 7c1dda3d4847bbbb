//! Explain command - prints the metadata of a rule

use clap::Args;
use colored::Colorize;
use vigil_core::analysis::AnalysisEngine;
use vigil_core::config::load_config_or_default_with_warnings;
use vigil_core::diagnostic::Severity;
use vigil_core::rules::RuleMetadata;

use super::Outcome;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    #[arg(
        value_name = "RULE",
        help = "Rule to explain (e.g. \"javascript::dangerous_global\" or \"dangerous-global\")"
    )]
    pub rule: String,
}

impl ExplainArgs {
    pub fn run(&self) -> anyhow::Result<Outcome> {
        let cwd = std::env::current_dir()?;
        let config = load_config_or_default_with_warnings(&cwd).config;
        let engine = AnalysisEngine::with_config(&config);
        let catalog = engine.catalog();

        let Some(rule) = catalog.get(&self.rule) else {
            eprintln!("{} unknown rule '{}'", "error:".red().bold(), self.rule);
            eprintln!();
            eprintln!("Available rules:");
            for rule in catalog.rules() {
                eprintln!("  {} ({})", rule.id, rule.name);
            }
            return Ok(Outcome::Failed);
        };

        print!("{}", render(rule, engine.filter().is_rule_enabled(rule.id)));
        Ok(Outcome::Passed)
    }
}

fn render(rule: &RuleMetadata, enabled: bool) -> String {
    let status = if enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };

    format!(
        "\n{}\n\n  {}: {}\n  {}: {}\n  {}: {}\n  {}: {}\n\n  {}: {}\n\n",
        format!("Rule {}", rule.id).bold(),
        "Name".cyan(),
        rule.name,
        "Description".cyan(),
        rule.description,
        "Category".cyan(),
        rule.category.label(),
        "Severity".cyan(),
        format_severity(rule.severity),
        "Status".cyan(),
        status
    )
}

fn format_severity(severity: Severity) -> String {
    match severity {
        Severity::Error => "error".red().to_string(),
        Severity::Warning => "warning".yellow().to_string(),
        Severity::Notice => "notice".blue().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::config::{Config, RulesConfig};
    use vigil_core::rules::RuleCategory;

    #[test]
    fn rules_resolve_by_id_and_name() {
        let engine = AnalysisEngine::new();
        let catalog = engine.catalog();

        let by_id = catalog.get("javascript::dangerous_global").unwrap();
        let by_name = catalog.get("dangerous-global").unwrap();

        assert_eq!(by_id, by_name);
        assert_eq!(by_id.category, RuleCategory::Javascript);
        assert!(catalog.get("javascript::no_such_rule").is_none());
    }

    #[test]
    fn rendered_rule_shows_metadata() {
        let engine = AnalysisEngine::new();
        let rule = engine.catalog().get("remote_script").unwrap();

        let output = render(rule, true);

        assert!(output.contains("markup::remote_script"));
        assert!(output.contains("remote-script"));
        assert!(output.contains("markup"));
        assert!(output.contains("enabled"));
    }

    #[test]
    fn disabled_rules_show_their_status() {
        let config = Config {
            rules: RulesConfig {
                disabled: vec!["parse_error".into()],
                ..RulesConfig::default()
            },
            ..Config::default()
        };
        let engine = AnalysisEngine::with_config(&config);
        let rule = engine.catalog().get("parse_error").unwrap();

        assert!(!engine.filter().is_rule_enabled(rule.id));
        assert!(render(rule, false).contains("disabled"));
    }
}
