//! CLI command implementations

pub mod check;
pub mod explain;

pub use check::CheckArgs;
pub use explain::ExplainArgs;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze an unpacked extension package or a single file
    Check(CheckArgs),

    /// Show detailed explanation for a specific rule
    Explain(ExplainArgs),
}

/// How a command finished when it did not hit a usage or config error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
}

impl Outcome {
    pub fn from_passed(passed: bool) -> Self {
        if passed { Outcome::Passed } else { Outcome::Failed }
    }
}
