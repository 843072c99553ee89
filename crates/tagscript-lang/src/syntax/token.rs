#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    Str(String),
    Ident(String),

    // Keywords
    Func,
    Return,
    For,
    Of,
    While,
    Break,
    Continue,
    If,
    Then,
    Else,
    Reply,
    And,
    Or,
    Null,
    True,
    False,
    Sleep,

    // Operators
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    Caret,      // ^
    PlusPlus,   // ++
    MinusMinus, // --
    Eq,         // =
    PlusEq,     // +=
    MinusEq,    // -=
    StarEq,     // *=
    SlashEq,    // /=
    PercentEq,  // %=
    EqEq,       // ==
    BangEq,     // !=
    Lt,         // <
    LtEq,       // <=
    Gt,         // >
    GtEq,       // >=
    Bang,       // !

    // Punctuation
    Dot,       // .
    Comma,     // ,
    Colon,     // :
    Semicolon, // ;
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Number(_) | Self::Str(_) | Self::Null | Self::True | Self::False)
    }

    pub fn is_assign_op(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::PlusEq | Self::MinusEq | Self::StarEq | Self::SlashEq | Self::PercentEq
        )
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::Func | Self::Return | Self::For | Self::Of | Self::While | Self::Break
            | Self::Continue | Self::If | Self::Then | Self::Else | Self::Reply | Self::And
            | Self::Or | Self::Null | Self::True | Self::False | Self::Sleep
        )
    }

    /// Short human name used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number `{n}`"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::Ident(s) => format!("identifier `{s}`"),
            other => match punct_text(other).or_else(|| keyword_text(other)) {
                Some(t) => format!("`{t}`"),
                None => format!("{other:?}"),
            },
        }
    }
}

/// Maps an identifier string to its keyword token, or returns `Ident`.
pub fn keyword_or_ident(s: &str) -> TokenKind {
    match s {
        "func"     => TokenKind::Func,
        "return"   => TokenKind::Return,
        "for"      => TokenKind::For,
        "of"       => TokenKind::Of,
        "while"    => TokenKind::While,
        "break"    => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "if"       => TokenKind::If,
        "then"     => TokenKind::Then,
        "else"     => TokenKind::Else,
        "reply"    => TokenKind::Reply,
        "and"      => TokenKind::And,
        "or"       => TokenKind::Or,
        "null"     => TokenKind::Null,
        "true"     => TokenKind::True,
        "false"    => TokenKind::False,
        "sleep"    => TokenKind::Sleep,
        _          => TokenKind::Ident(s.to_string()),
    }
}

/// Punctuator text → token. `&&` / `||` alias the `and` / `or` keywords.
pub fn punct(s: &str) -> Option<TokenKind> {
    let kind = match s {
        "++" => TokenKind::PlusPlus,
        "--" => TokenKind::MinusMinus,
        "+=" => TokenKind::PlusEq,
        "-=" => TokenKind::MinusEq,
        "*=" => TokenKind::StarEq,
        "/=" => TokenKind::SlashEq,
        "%=" => TokenKind::PercentEq,
        "==" => TokenKind::EqEq,
        "!=" => TokenKind::BangEq,
        "<=" => TokenKind::LtEq,
        ">=" => TokenKind::GtEq,
        "&&" => TokenKind::And,
        "||" => TokenKind::Or,
        "+"  => TokenKind::Plus,
        "-"  => TokenKind::Minus,
        "*"  => TokenKind::Star,
        "/"  => TokenKind::Slash,
        "%"  => TokenKind::Percent,
        "^"  => TokenKind::Caret,
        "="  => TokenKind::Eq,
        "<"  => TokenKind::Lt,
        ">"  => TokenKind::Gt,
        "!"  => TokenKind::Bang,
        "."  => TokenKind::Dot,
        ","  => TokenKind::Comma,
        ":"  => TokenKind::Colon,
        ";"  => TokenKind::Semicolon,
        "("  => TokenKind::LParen,
        ")"  => TokenKind::RParen,
        "{"  => TokenKind::LBrace,
        "}"  => TokenKind::RBrace,
        "["  => TokenKind::LBracket,
        "]"  => TokenKind::RBracket,
        _ => return None,
    };
    Some(kind)
}

fn punct_text(kind: &TokenKind) -> Option<&'static str> {
    PUNCTUATORS.iter().copied().find(|p| punct(p).as_ref() == Some(kind))
}

fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|k| keyword_or_ident(k) == *kind)
}

pub const KEYWORDS: &[&str] = &[
    "func", "return", "for", "of", "while", "break", "continue", "if", "then", "else",
    "reply", "and", "or", "null", "true", "false", "sleep",
];

pub const PUNCTUATORS: &[&str] = &[
    "++", "--", "+=", "-=", "*=", "/=", "%=", "==", "!=", "<=", ">=", "&&", "||",
    "+", "-", "*", "/", "%", "^", "=", "<", ">", "!", ".", ",", ":", ";",
    "(", ")", "{", "}", "[", "]",
];

// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text the token was produced from.
    pub text: String,
    /// Byte offset of the first character.
    pub pos: usize,
    pub line: usize,
    pub column: usize,
    /// A line terminator separates this token from the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: usize, line: usize, column: usize) -> Self {
        Self { kind, text: text.into(), pos, line, column, newline_before: false }
    }

    pub fn width(&self) -> usize {
        self.text.chars().count()
    }
}
