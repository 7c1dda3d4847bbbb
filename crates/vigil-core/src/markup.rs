//! Script discovery in markup documents
//!
//! Finds `<script>` elements in XUL, XML and HTML text without building a
//! document tree. Comments and CDATA sections outside of scripts are
//! skipped, so commented-out tags never contribute a script.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostic::{Diagnostic, RuleId, Severity};

pub const REMOTE_SCRIPT: RuleId = RuleId::new("markup", "remote_script");

pub const MARKUP_EXTENSIONS: &[&str] = &["xul", "xml", "html", "xhtml", "htm"];

const JAVASCRIPT_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/ecmascript",
    "application/ecmascript",
    "module",
];

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("Invalid regex pattern")
});

/// Where a script element gets its code from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReference {
    /// A path without a scheme, including `/abs` and `../x`.
    Relative(String),
    /// A `chrome://` URL.
    ChromeAbsolute(String),
    /// `http(s)://`, `ftp://` or protocol-relative `//`.
    Remote(String),
    /// Any other scheme, such as `resource:` or `data:`.
    Other(String),
    /// Code in the element body.
    Inline(InlineScript),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineScript {
    pub body: String,
    /// Line of the document on which the body begins.
    pub line: usize,
}

impl InlineScript {
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
    pub reference: ScriptReference,
    pub line: usize,
    pub script_type: Option<String>,
}

impl ScriptTag {
    /// Elements with a non-JavaScript `type` hold templates or data.
    pub fn is_javascript(&self) -> bool {
        self.script_type.as_deref().is_none_or(is_javascript_type)
    }
}

pub fn is_markup_file(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| MARKUP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

pub fn is_javascript_type(script_type: &str) -> bool {
    let media = script_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media.is_empty() || JAVASCRIPT_TYPES.contains(&media.as_str())
}

pub fn classify(src: &str) -> ScriptReference {
    let src = src.trim();
    let lower = src.to_ascii_lowercase();

    if lower.starts_with("//")
        || ["http://", "https://", "ftp://"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
    {
        return ScriptReference::Remote(src.to_string());
    }
    if lower.starts_with("chrome://") {
        return ScriptReference::ChromeAbsolute(src.to_string());
    }
    if has_scheme(src) {
        return ScriptReference::Other(src.to_string());
    }
    ScriptReference::Relative(src.to_string())
}

fn has_scheme(src: &str) -> bool {
    let Some((scheme, _)) = src.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Scans `source` for script elements in document order.
pub fn scan(source: &str) -> Vec<ScriptTag> {
    Scanner::new(source).run()
}

/// Paths of referenced JavaScript files that need their own analysis.
pub fn discovered_scripts(tags: &[ScriptTag]) -> BTreeSet<String> {
    tags.iter()
        .filter(|tag| tag.is_javascript())
        .filter_map(|tag| match &tag.reference {
            ScriptReference::Relative(path) | ScriptReference::ChromeAbsolute(path) => {
                Some(path.clone())
            }
            _ => None,
        })
        .collect()
}

pub fn remote_script_diagnostic(filename: &str, tag: &ScriptTag) -> Option<Diagnostic> {
    let ScriptReference::Remote(url) = &tag.reference else {
        return None;
    };
    Some(
        Diagnostic::new(
            REMOTE_SCRIPT,
            Severity::Warning,
            "Scripts must not be loaded from remote locations",
            filename,
            tag.line,
            0,
        )
        .with_description(format!("A `<script>` element references `{url}`."))
        .with_description(
            "Extensions must bundle all of their code. Remote scripts run with the \
             privileges of the document that loads them.",
        ),
    )
}

struct Scanner<'s> {
    source: &'s str,
    lower: String,
    pos: usize,
}

impl<'s> Scanner<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            lower: source.to_ascii_lowercase(),
            pos: 0,
        }
    }

    fn run(mut self) -> Vec<ScriptTag> {
        let mut tags = Vec::new();

        while let Some(offset) = self.lower[self.pos..].find('<') {
            self.pos += offset;
            let rest = &self.lower[self.pos..];

            if rest.starts_with("<!--") {
                self.skip_past("-->", 4);
            } else if rest.starts_with("<![cdata[") {
                self.skip_past("]]>", 9);
            } else if is_script_open(rest) {
                match self.script() {
                    Some(tag) => tags.push(tag),
                    None => break,
                }
            } else {
                self.pos += 1;
            }
        }

        tags
    }

    fn skip_past(&mut self, terminator: &str, opener_len: usize) {
        let from = self.pos + opener_len;
        self.pos = match self.lower[from..].find(terminator) {
            Some(offset) => from + offset + terminator.len(),
            None => self.lower.len(),
        };
    }

    fn line_at(&self, pos: usize) -> usize {
        self.source[..pos].matches('\n').count() + 1
    }

    /// Parses one script element starting at `self.pos`. Returns `None` for
    /// an open tag that never closes.
    fn script(&mut self) -> Option<ScriptTag> {
        let line = self.line_at(self.pos);
        let tag_start = self.pos + "<script".len();
        let tag_end = tag_start + find_tag_end(&self.source[tag_start..])?;
        let attributes = &self.source[tag_start..tag_end];
        let self_closing = attributes.trim_end().ends_with('/');

        let mut src = None;
        let mut script_type = None;
        for capture in ATTRIBUTE.captures_iter(attributes) {
            let value = capture
                .get(2)
                .or_else(|| capture.get(3))
                .or_else(|| capture.get(4))
                .map_or("", |m| m.as_str());
            match capture[1].to_ascii_lowercase().as_str() {
                "src" => src = Some(value.to_string()),
                "type" => script_type = Some(value.to_string()),
                _ => {}
            }
        }

        let body_start = tag_end + 1;
        let body = if self_closing {
            self.pos = body_start;
            ""
        } else {
            match self.lower[body_start..].find("</script") {
                Some(offset) => {
                    let body_end = body_start + offset;
                    self.pos = body_end + "</script".len();
                    &self.source[body_start..body_end]
                }
                None => {
                    self.pos = self.source.len();
                    &self.source[body_start..]
                }
            }
        };

        let reference = match src.as_deref().map(str::trim) {
            Some(src) if !src.is_empty() => classify(src),
            _ => ScriptReference::Inline(InlineScript {
                body: strip_cdata(body),
                line: self.line_at(body_start),
            }),
        };

        Some(ScriptTag {
            reference,
            line,
            script_type,
        })
    }
}

fn is_script_open(rest: &str) -> bool {
    rest.strip_prefix("<script").is_some_and(|after| {
        after
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
    })
}

/// Offset of the `>` closing an open tag, skipping quoted attribute values.
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (index, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(index),
            (None, _) => {}
        }
    }
    None
}

/// Blanks out CDATA markers so line and column positions stay put.
fn strip_cdata(body: &str) -> String {
    body.replace("<![CDATA[", "         ").replace("]]>", "   ")
}
