//! Diagnostic sink for a validation run
//!
//! A [`Report`] collects diagnostics from every file of a package. Nested
//! packages are analyzed inside a [`Report::nested`] scope so their
//! diagnostics are attributed to the right archive and tier.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;

use crate::diagnostic::{Diagnostic, Severity};

/// Append-only destination for diagnostics.
pub trait DiagnosticSink {
    fn record(&mut self, diagnostic: Diagnostic);

    fn record_all(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>)
    where
        Self: Sized,
    {
        for diagnostic in diagnostics {
            self.record(diagnostic);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportScope {
    pub file: String,
    pub tier: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    scopes: Vec<ReportScope>,
    #[serde(skip)]
    base_tier: u32,
}

impl Report {
    pub fn new() -> Self {
        Self::with_tier(1)
    }

    pub fn with_tier(tier: u32) -> Self {
        Self {
            diagnostics: Vec::new(),
            scopes: Vec::new(),
            base_tier: tier,
        }
    }

    pub fn tier(&self) -> u32 {
        self.scopes.last().map_or(self.base_tier, |scope| scope.tier)
    }

    pub fn set_tier(&mut self, tier: u32) {
        match self.scopes.last_mut() {
            Some(scope) => scope.tier = tier,
            None => self.base_tier = tier,
        }
    }

    /// Runs `analyze` inside a scope for the nested package `file`. The scope
    /// is popped when `analyze` returns, whatever it returns, and before a
    /// panic inside it propagates.
    pub fn nested<R>(&mut self, file: &str, tier: u32, analyze: impl FnOnce(&mut Self) -> R) -> R {
        tracing::debug!(file, tier, "entering nested package");
        let depth = self.scopes.len();
        self.scopes.push(ReportScope {
            file: file.to_string(),
            tier,
        });
        let result = panic::catch_unwind(AssertUnwindSafe(|| analyze(&mut *self)));
        self.scopes.truncate(depth);
        tracing::debug!(file, "left nested package");
        result.unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    /// Path prefix of the innermost scope, such as `outer.xpi/inner.jar`.
    pub fn scope_path(&self) -> Option<String> {
        if self.scopes.is_empty() {
            return None;
        }
        let parts: Vec<&str> = self.scopes.iter().map(|s| s.file.as_str()).collect();
        Some(parts.join("/"))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// True if and only if an error was recorded.
    pub fn failed(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn notice_count(&self) -> usize {
        self.count(Severity::Notice)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for Report {
    fn record(&mut self, mut diagnostic: Diagnostic) {
        if let Some(prefix) = self.scope_path() {
            diagnostic.file = format!("{prefix}/{}", diagnostic.file);
        }
        if diagnostic.tier.is_none() {
            diagnostic.tier = Some(self.tier());
        }
        self.diagnostics.push(diagnostic);
    }
}
