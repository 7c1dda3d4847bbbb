//! Vigil core: static semantic analysis of browser extension code.

pub mod analysis;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod javascript;
pub mod markup;
pub mod parser;
pub mod report;
pub mod rules;

pub use analysis::{AnalysisEngine, MarkupAnalysis};
pub use context::{BOOTSTRAP, ResourceState, RunContext};
pub use diagnostic::{Diagnostic, RuleId, Severity};
pub use parser::ParsedFile;
pub use report::{DiagnosticSink, Report};
