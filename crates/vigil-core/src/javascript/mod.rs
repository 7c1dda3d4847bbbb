//! Semantic JavaScript analysis
//!
//! A one-pass symbolic interpreter over the swc AST. Expressions evaluate to
//! [`Wrapped`] values, identifiers resolve through [`ScopeStack`] frames and
//! then the [`KnowledgeBase`], and calls are routed through the dispatcher to
//! the hooks and predicates declared for each restricted API.

pub mod calls;
pub mod dispatch;
pub mod entities;
pub mod operators;
pub mod predicates;
pub mod scope;
pub mod traverser;
pub mod value;

use thiserror::Error;

use crate::context::RunContext;
use crate::diagnostic::Diagnostic;
use crate::parser::ParsedFile;

pub use dispatch::{Arguments, Environment, HookCall, HookError};
pub use entities::{Entity, KnowledgeBase, Verdict};
pub use scope::ScopeStack;
pub use traverser::{DEFAULT_MAX_DEPTH, Traverser};
pub use value::{Literal, Wrapped};

/// Failures that abort the analysis of one file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("{filename} has no syntax tree to analyze")]
    Unparsed { filename: String },

    #[error("nesting deeper than {limit} levels at line {line}")]
    NestingTooDeep { limit: usize, line: usize },
}

/// Analyzes one parsed script with the default nesting bound.
pub fn analyze(file: &ParsedFile, run: &RunContext) -> Result<Vec<Diagnostic>, AnalysisError> {
    Traverser::new(file, run).run()
}

/// Same as [`analyze`] with an explicit nesting bound.
pub fn analyze_with_depth(
    file: &ParsedFile,
    run: &RunContext,
    max_depth: usize,
) -> Result<Vec<Diagnostic>, AnalysisError> {
    Traverser::new(file, run).with_max_depth(max_depth).run()
}
