//! Source text as a sequence of positioned symbols.

use std::fmt;

/// A half-open `[start, end)` range of symbol offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One source character and its 0-based offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    byte: u8,
    position: usize,
}

impl Symbol {
    pub fn byte(&self) -> u8 {
        self.byte
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The terminating symbol that follows the last character.
    pub fn is_end(&self) -> bool {
        self.byte == 0
    }
}

/// The characters of an expression, terminated by a `'\0'` symbol.
///
/// Input stops at the first NUL byte, if any.
#[derive(Debug, Clone)]
pub struct SymbolSequence {
    source: String,
    symbols: Vec<Symbol>,
}

impl SymbolSequence {
    pub fn new(source: &str) -> Self {
        let len = source.bytes().position(|b| b == 0).unwrap_or(source.len());
        let source = source[..len].to_string();
        let mut symbols: Vec<Symbol> = source
            .bytes()
            .enumerate()
            .map(|(position, byte)| Symbol { byte, position })
            .collect();
        symbols.push(Symbol {
            byte: 0,
            position: symbols.len(),
        });
        Self { source, symbols }
    }

    /// Number of characters, not counting the terminator.
    pub fn len(&self) -> usize {
        self.symbols.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Symbol at `index`; anything past the end is the terminator.
    pub fn get(&self, index: usize) -> Symbol {
        self.symbols
            .get(index)
            .copied()
            .unwrap_or(self.symbols[self.symbols.len() - 1])
    }

    /// The full character starting at `index`, for diagnostics.
    pub fn char_at(&self, index: usize) -> char {
        self.source
            .get(index..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or(self.get(index).byte as char)
    }

    /// Text covered by `span`, without the terminator.
    pub fn text(&self, span: Span) -> &str {
        let end = span.end.min(self.len());
        let start = span.start.min(end);
        self.source.get(start..end).unwrap_or("")
    }

    /// Render the line containing `span.start` with `^` under the span.
    pub fn excerpt(&self, span: Span) -> String {
        let len = self.len();
        let start = span.start.min(len);
        let line_start = self.symbols[..start]
            .iter()
            .rposition(|s| s.byte == b'\n')
            .map_or(0, |i| i + 1);
        let line_end = self.symbols[start..]
            .iter()
            .position(|s| s.byte == b'\n' || s.is_end())
            .map_or(len, |i| start + i);

        let mut out = String::new();
        out.push_str(self.source.get(line_start..line_end).unwrap_or(""));
        out.push('\n');
        for symbol in &self.symbols[line_start..start] {
            out.push(if symbol.byte == b'\t' { '\t' } else { ' ' });
        }
        let carets = span.end.saturating_sub(start).max(1);
        out.extend(std::iter::repeat_n('^', carets));
        out
    }
}
