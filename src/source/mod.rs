//! Source Arena
//!
//! Owns every source line a front end reads, the path each line came from,
//! and the spans that IR nodes point into. A tree never stores positions
//! directly: it stores `SpanId`s, and the arena turns them back into a
//! file, line, column and length when a diagnostic is rendered.

pub mod location;

pub use location::ErrorLocation;

use serde::{Deserialize, Serialize};

/// Index of a span registered in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(pub usize);

impl SpanId {
    /// Never registered; renders as a location without position info.
    pub const UNKNOWN: SpanId = SpanId(usize::MAX);
}

/// Index of a line registered in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub usize);

impl LineId {
    /// The id `n` lines further down.
    pub fn offset(self, n: usize) -> LineId {
        LineId(self.0 + n)
    }
}

/// One physical source line, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    /// Index into the arena's path table
    pub path_index: usize,
    /// 1-based physical line number
    pub line_num: usize,
}

impl SourceLine {
    /// Length of the line in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A span never crosses a line boundary. Columns count characters from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub line_id: LineId,
    pub col: usize,
    pub length: usize,
}

/// A fully resolved position, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub path: String,
    /// 1-based line number
    pub line: usize,
    /// 0-based column
    pub col: usize,
    pub length: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.col + 1)
    }
}

/// Line pool shared by the front ends and the diagnostics renderer.
#[derive(Debug, Default, Clone)]
pub struct Arena {
    paths: Vec<String>,
    lines: Vec<SourceLine>,
    spans: Vec<LineSpan>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a whole source buffer and return the id of its first line.
    ///
    /// The text is split on `\n`, so a buffer ending in a newline gets a
    /// trailing empty line. End-of-input positions stay resolvable that way.
    pub fn add_source(&mut self, path: impl Into<String>, text: &str) -> LineId {
        self.paths.push(path.into());
        let path_index = self.paths.len() - 1;
        let first = LineId(self.lines.len());
        for (i, line) in text.split('\n').enumerate() {
            self.lines.push(SourceLine {
                text: line.to_string(),
                path_index,
                line_num: i + 1,
            });
        }
        first
    }

    /// Register a span, clamping it to the bounds of its line.
    ///
    /// Multi-line constructs are recorded by their first line only.
    pub fn add_span(&mut self, line_id: LineId, col: usize, length: usize) -> SpanId {
        let line_len = self.lines.get(line_id.0).map(SourceLine::len).unwrap_or(0);
        let col = col.min(line_len);
        let length = length.min(line_len - col);
        self.spans.push(LineSpan { line_id, col, length });
        SpanId(self.spans.len() - 1)
    }

    pub fn span(&self, id: SpanId) -> Option<&LineSpan> {
        self.spans.get(id.0)
    }

    pub fn line(&self, id: LineId) -> Option<&SourceLine> {
        self.lines.get(id.0)
    }

    pub fn path(&self, index: usize) -> Option<&str> {
        self.paths.get(index).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// True when `id` names a registered span that lies inside its line.
    pub fn resolves(&self, id: SpanId) -> bool {
        match self.span(id) {
            Some(span) => match self.line(span.line_id) {
                Some(line) => span.col + span.length <= line.len(),
                None => false,
            },
            None => false,
        }
    }

    pub fn location(&self, id: SpanId) -> Option<SourceLocation> {
        let span = self.span(id)?;
        let line = self.line(span.line_id)?;
        Some(SourceLocation {
            path: self.path(line.path_index).unwrap_or("<unknown>").to_string(),
            line: line.line_num,
            col: span.col,
            length: span.length,
        })
    }

    /// Two spans are on the same source line when they share a line id.
    /// Unknown spans never compare equal.
    pub fn same_line(&self, a: SpanId, b: SpanId) -> bool {
        match (self.span(a), self.span(b)) {
            (Some(x), Some(y)) => x.line_id == y.line_id,
            _ => false,
        }
    }

    /// The text a span covers.
    pub fn snippet(&self, id: SpanId) -> Option<String> {
        let span = self.span(id)?;
        let line = self.line(span.line_id)?;
        Some(line.text.chars().skip(span.col).take(span.length).collect())
    }
}
