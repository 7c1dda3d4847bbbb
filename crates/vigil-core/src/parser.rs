//! Parser module for extension JavaScript
//!
//! Integrates with SWC for parsing scripts into an AST. Scripts scraped out of
//! markup carry a starting line so that reported positions point into the
//! enclosing document rather than the extracted fragment.

use std::ops::Range;
use std::sync::OnceLock;

use swc_common::sync::Lrc;
use swc_common::{FileName, SourceMap, Span, Spanned};
use swc_ecma_parser::{EsSyntax, Syntax, parse_file_as_script};

pub use swc_ecma_ast::{EsVersion, Script};

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct ParseResult {
    pub script: Option<Script>,
    pub errors: Vec<ParseError>,
    base: u32,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.script.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub filename: String,
    pub starting_line: usize,
    pub line_count: usize,
    pub has_errors: bool,
}

pub struct ParsedFile {
    source: String,
    metadata: FileMetadata,
    script: Option<Script>,
    errors: Vec<ParseError>,
    base: u32,
    line_ranges: OnceLock<Vec<Range<usize>>>,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("metadata", &self.metadata)
            .field("has_script", &self.script.is_some())
            .field("error_count", &self.errors.len())
            .finish()
    }
}

impl ParsedFile {
    pub fn from_source(filename: &str, source: &str) -> Self {
        Self::with_starting_line(filename, source, 1)
    }

    /// Parses `source` as if its first line were line `starting_line` of
    /// `filename`.
    pub fn with_starting_line(filename: &str, source: &str, starting_line: usize) -> Self {
        let starting_line = starting_line.max(1);
        let parse_result = Parser::new().parse_recovering(source);
        let offset = starting_line - 1;

        let line_count = if source.is_empty() {
            0
        } else {
            source.lines().count()
        };

        let metadata = FileMetadata {
            filename: filename.to_string(),
            starting_line,
            line_count,
            has_errors: parse_result.has_errors(),
        };

        let errors = parse_result
            .errors
            .into_iter()
            .map(|e| ParseError {
                line: e.line + offset,
                ..e
            })
            .collect();

        Self {
            source: source.to_string(),
            metadata,
            script: parse_result.script,
            errors,
            base: parse_result.base,
            line_ranges: OnceLock::new(),
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn filename(&self) -> &str {
        &self.metadata.filename
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Reported `(line, column)` of a span start. Lines are 1-based and
    /// already shifted by the starting line; columns are 0-based.
    pub fn location(&self, span: Span) -> (usize, usize) {
        let offset = (span.lo.0.saturating_sub(self.base) as usize).min(self.source.len());
        let ranges = self.line_ranges();

        let index = match ranges.binary_search_by(|r| {
            if offset < r.start {
                std::cmp::Ordering::Greater
            } else if offset > r.end {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        }) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };

        let column = ranges
            .get(index)
            .and_then(|r| self.source.get(r.start..offset))
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);

        (index + self.metadata.starting_line, column)
    }

    /// Source text of a reported line, trimmed, for diagnostic context.
    pub fn context_snippet(&self, reported_line: usize) -> Option<&str> {
        let local = reported_line.checked_sub(self.metadata.starting_line - 1)?;
        self.get_line(local).map(str::trim)
    }

    pub fn get_line(&self, line_number: usize) -> Option<&str> {
        if line_number == 0 {
            return None;
        }

        let ranges = self.line_ranges();
        ranges
            .get(line_number - 1)
            .map(|range| &self.source[range.clone()])
    }

    fn line_ranges(&self) -> &[Range<usize>] {
        self.line_ranges.get_or_init(|| self.build_line_ranges())
    }

    fn build_line_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;

        for (i, c) in self.source.char_indices() {
            if c == '\n' {
                ranges.push(start..i);
                start = i + 1;
            }
        }

        if start < self.source.len() || (start == 0 && !self.source.is_empty()) {
            ranges.push(start..self.source.len());
        }

        ranges
    }
}

#[derive(Debug, Clone)]
pub struct Parser {
    syntax: Syntax,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            syntax: Syntax::Es(EsSyntax {
                allow_return_outside_function: true,
                ..Default::default()
            }),
        }
    }

    /// Parses `code` as a classic script, collecting recoverable errors.
    /// A fatal error leaves `script` empty.
    pub fn parse_recovering(&self, code: &str) -> ParseResult {
        let source_map: Lrc<SourceMap> = Default::default();
        let fm = source_map
            .new_source_file(FileName::Custom("input.js".into()).into(), code.to_string());
        let base = fm.start_pos.0;

        let mut recovered_errors = Vec::new();

        let result = parse_file_as_script(
            &fm,
            self.syntax,
            EsVersion::latest(),
            None,
            &mut recovered_errors,
        );

        let to_parse_error = |e: swc_ecma_parser::error::Error| {
            let span = e.span();
            let loc = source_map.lookup_char_pos(span.lo);
            ParseError {
                line: loc.line,
                column: loc.col_display,
                message: e.kind().msg().to_string(),
            }
        };

        let mut errors: Vec<ParseError> = recovered_errors.into_iter().map(to_parse_error).collect();

        match result {
            Ok(script) => ParseResult {
                script: Some(script),
                errors,
                base,
            },
            Err(e) => {
                errors.push(to_parse_error(e));
                ParseResult {
                    script: None,
                    errors,
                    base,
                }
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
