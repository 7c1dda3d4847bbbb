//! Vigil CLI - Command-line interface for the Vigil extension analyzer
//!
//! Exit codes: 0 when the package passed, 1 when it failed, 2 on usage or
//! configuration errors.

mod commands;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use commands::{Commands, Outcome};
use logging::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "vigil",
    author,
    version,
    about = "Static semantic analyzer for browser extension packages",
    long_about = "Vigil reads the JavaScript and markup of an unpacked extension and reports\n\
                  dangerous API use and compatibility problems without running any of its code."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level for diagnostics about the run itself (written to stderr)
    #[arg(long, value_enum, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level, cli.log_json);

    let outcome = match cli.command {
        Commands::Check(args) => args.run(),
        Commands::Explain(args) => args.run(),
    };

    match outcome {
        Ok(Outcome::Passed) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::from(1),
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::check::FailOn;
    use crate::output::OutputFormat;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_check_command() {
        let cli = Cli::try_parse_from(["vigil", "check", "./addon"]).unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.path.to_str().unwrap(), "./addon");
                assert_eq!(args.format, OutputFormat::Text);
                assert_eq!(args.fail_on, FailOn::Errors);
                assert!(!args.bootstrap);
            }
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn cli_parses_check_options() {
        let cli = Cli::try_parse_from([
            "vigil",
            "check",
            "./addon",
            "--format",
            "json",
            "--bootstrap",
            "--quiet",
            "--fail-on",
            "warnings",
            "--config",
            "ci/vigil.toml",
        ])
        .unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.format, OutputFormat::Json);
                assert!(args.bootstrap);
                assert!(args.quiet);
                assert_eq!(args.fail_on, FailOn::Warnings);
                assert_eq!(args.config.unwrap().to_str().unwrap(), "ci/vigil.toml");
            }
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn check_requires_a_path() {
        assert!(Cli::try_parse_from(["vigil", "check"]).is_err());
    }

    #[test]
    fn log_options_are_global() {
        let cli =
            Cli::try_parse_from(["vigil", "check", ".", "--log-level", "debug", "--log-json"])
                .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.log_json);

        let cli = Cli::try_parse_from(["vigil", "explain", "parse_error"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn cli_parses_explain_command() {
        let cli = Cli::try_parse_from(["vigil", "explain", "dangerous-global"]).unwrap();
        match cli.command {
            Commands::Explain(args) => assert_eq!(args.rule, "dangerous-global"),
            _ => panic!("Expected Explain command"),
        }
    }

    #[test]
    fn cli_help_contains_commands() {
        let mut cmd = Cli::command();
        let help = cmd.render_help().to_string();
        assert!(help.contains("check"));
        assert!(help.contains("explain"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
