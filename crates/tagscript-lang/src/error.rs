use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Error codes prefixed by phase: L = lexer, P = parser, R = runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Lexer
    L001, // no rule matches the input
    L002, // unterminated string literal
    L003, // invalid escape sequence
    L004, // unterminated block comment
    L005, // malformed number literal

    // Parser
    P001, // unexpected token
    P002, // missing expected token
    P003, // invalid assignment target
    P004, // break / continue outside a loop
    P005, // unexpected end of input
    P006, // nesting too deep

    // Runtime
    R001, // variable not declared yet
    R002, // loop iteration ceiling exceeded
    R003, // value is not callable
    R004, // property access on null
    R005, // value cannot be iterated
    R006, // operator not applicable to operand types
    R007, // wrong argument to a built-in
    R008, // redeclaration of a reserved name
    R009, // call depth exceeded
    R010, // host rejected a bridge call
    R011, // property cannot be assigned
    R012, // value would exceed a size limit
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L001 => "L001",
            Self::L002 => "L002",
            Self::L003 => "L003",
            Self::L004 => "L004",
            Self::L005 => "L005",
            Self::P001 => "P001",
            Self::P002 => "P002",
            Self::P003 => "P003",
            Self::P004 => "P004",
            Self::P005 => "P005",
            Self::P006 => "P006",
            Self::R001 => "R001",
            Self::R002 => "R002",
            Self::R003 => "R003",
            Self::R004 => "R004",
            Self::R005 => "R005",
            Self::R006 => "R006",
            Self::R007 => "R007",
            Self::R008 => "R008",
            Self::R009 => "R009",
            Self::R010 => "R010",
            Self::R011 => "R011",
            Self::R012 => "R012",
        }
    }

    pub fn is_lexical(&self) -> bool {
        self.as_str().starts_with('L')
    }
}

// ─── Compile diagnostics ──────────────────────────────────────────────────────

/// A lexical or parse error. Compilation stops at the first one.
#[derive(Debug, Clone, PartialEq, ThisError)]
#[error("[{}] {}:{}: {}", .code.as_str(), .line, .column, .message)]
pub struct Error {
    pub code: ErrorCode,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub message: String,
    /// Offending source line with a caret under `column`. Empty until
    /// `with_source` is called.
    pub excerpt: String,
}

impl Error {
    pub fn new(code: ErrorCode, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            line,
            column,
            end_line: line,
            end_column: column + 1,
            message: message.into(),
            excerpt: String::new(),
        }
    }

    /// Widen the diagnostic to cover `width` columns of the offending token.
    pub fn spanning(mut self, width: usize) -> Self {
        self.end_column = self.column + width.max(1);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.excerpt = excerpt(source, self.line, self.column);
        self
    }

    pub fn to_diagnostic(&self) -> CompileDiagnostic {
        CompileDiagnostic {
            start_line_number: self.line,
            start_column: self.column,
            end_line_number: self.end_line,
            end_column: self.end_column,
            message: self.message.clone(),
        }
    }
}

/// Wire form of a compile error, in editor-marker coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileDiagnostic {
    pub start_line_number: usize,
    pub start_column: usize,
    pub end_line_number: usize,
    pub end_column: usize,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────

/// A legitimate script fault raised while interpreting.
#[derive(Debug, Clone, PartialEq, ThisError)]
#[error("[runtime {}] {}:{}: {}", .code.as_str(), .line, .column, .message)]
pub struct RuntimeError {
    pub code: ErrorCode,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub excerpt: Option<String>,
}

impl RuntimeError {
    pub fn new(code: ErrorCode, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { code, line, column, message: message.into(), excerpt: None }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        if self.line > 0 {
            self.excerpt = Some(excerpt(source, self.line, self.column));
        }
        self
    }
}

/// Render `line` of `source` with a caret under `column` (both 1-based).
pub fn excerpt(source: &str, line: usize, column: usize) -> String {
    let Some(text) = source.lines().nth(line.saturating_sub(1)) else {
        return String::new();
    };
    let gutter = line.to_string();
    let pad = " ".repeat(gutter.len());
    let caret = " ".repeat(column.saturating_sub(1));
    format!("{gutter} | {text}\n{pad} | {caret}^")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_points_at_column() {
        let src = "x = 1\ny = ?\n";
        assert_eq!(excerpt(src, 2, 5), "2 | y = ?\n  |     ^");
    }

    #[test]
    fn excerpt_out_of_range_is_empty() {
        assert_eq!(excerpt("a", 4, 1), "");
    }

    #[test]
    fn diagnostic_uses_end_column() {
        let e = Error::new(ErrorCode::P001, 3, 4, "unexpected `)`").spanning(2);
        let d = e.to_diagnostic();
        assert_eq!((d.start_line_number, d.start_column, d.end_line_number, d.end_column), (3, 4, 3, 6));
    }

    #[test]
    fn display_includes_code() {
        let e = Error::new(ErrorCode::L002, 1, 1, "unterminated string literal");
        assert_eq!(e.to_string(), "[L002] 1:1: unterminated string literal");
    }
}
