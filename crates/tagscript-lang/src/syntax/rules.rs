//! The command language's lexer rules.

use once_cell::sync::Lazy;

use crate::error::{Error, ErrorCode};
use crate::syntax::lexer::{Outcome, Pattern, RuleSet, Scanner};
use crate::syntax::token::{keyword_or_ident, punct, TokenKind, KEYWORDS, PUNCTUATORS};

pub static LANGUAGE: Lazy<RuleSet> = Lazy::new(language);

const WORD: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";
const NUMBER: &str = r"0[xX][0-9a-fA-F]+|0[oO][0-7]+|0[bB][01]+|[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?";
const ESCAPE: &str = concat!(
    r"\\(?:u[dD][89abAB][0-9a-fA-F]{2}\\u[dD][c-fC-F][0-9a-fA-F]{2}",
    r"|u\{[0-9a-fA-F]*\}?|u[0-9a-fA-F]{0,4}|x[0-9a-fA-F]{0,2}|[0-7]{1,3}|\r\n|[\s\S])",
);

fn re(src: &str) -> Pattern {
    Pattern::regex(src).expect("lexer rule patterns are valid")
}

fn language() -> RuleSet {
    RuleSet::new("default")
        // Layout
        .rule("default, comment", re(r"[ \t\x0B\x0C\u{00A0}\u{FEFF}]+"), ignore)
        .rule("default", re(r"\r\n|\r|\n"), ignore)
        .rule("default", re(r"//[^\r\n]*"), ignore)
        .rule("default", Pattern::literal("/*"), |s, _| {
            s.push_state("comment");
            Ok(Outcome::Ignore)
        })
        .rule("comment", Pattern::literal("*/"), |s, _| {
            s.pop_state();
            Ok(Outcome::Ignore)
        })
        .rule("comment", re(r"[^*]+|\*"), ignore)
        // After `.` every word is a property name, keywords included.
        .rule("default #member", re(WORD), |s, t| {
            s.remove_tag("member");
            Ok(Outcome::accept(TokenKind::Ident(t.to_string())))
        })
        .rule("default #member", re(r"[\s\S]"), |s, _| {
            s.remove_tag("member");
            Ok(Outcome::Repeat)
        })
        // Literals and words
        .rule("default", re(NUMBER), number)
        .rule("default", re(WORD), |_, t| {
            if KEYWORDS.contains(&t) {
                Ok(Outcome::accept(keyword_or_ident(t)))
            } else {
                Ok(Outcome::Reject)
            }
        })
        .rule("default", re(WORD), |_, t| Ok(Outcome::accept(TokenKind::Ident(t.to_string()))))
        .rule("default", Pattern::literal("\""), |s, _| open_string(s, "dstring"))
        .rule("default", Pattern::literal("'"), |s, _| open_string(s, "sstring"))
        .rule("dstring", Pattern::literal("\""), close_string)
        .rule("sstring", Pattern::literal("'"), close_string)
        .rule("dstring", re(r#"[^"\\\r\n]+"#), string_chars)
        .rule("sstring", re(r"[^'\\\r\n]+"), string_chars)
        .rule("dstring, sstring", re(ESCAPE), escape)
        .rule("dstring, sstring", re(r"\r\n|\r|\n"), |s, _| {
            Err(s.error(ErrorCode::L002, "unterminated string literal"))
        })
        // Operators and punctuation
        .rule("default", Pattern::one_of(PUNCTUATORS).expect("lexer rule patterns are valid"), |s, t| {
            let kind = punct(t).ok_or_else(|| s.error(ErrorCode::L001, format!("unknown punctuator `{t}`")))?;
            if kind == TokenKind::Dot {
                s.set_tag("member");
            }
            Ok(Outcome::accept(kind))
        })
        .on_eof("dstring", ErrorCode::L002, "unterminated string literal")
        .on_eof("sstring", ErrorCode::L002, "unterminated string literal")
        .on_eof("comment", ErrorCode::L004, "unterminated block comment")
}

fn ignore(_: &mut Scanner, _: &str) -> Result<Outcome, Error> {
    Ok(Outcome::Ignore)
}

// ─── Numbers ──────────────────────────────────────────────────────────────────

fn number(s: &mut Scanner, t: &str) -> Result<Outcome, Error> {
    if s.following(t.len()).starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(s.error(ErrorCode::L005, format!("identifier starts immediately after numeric literal `{t}`")));
    }
    let radix = match t.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0o" | "0O") => 8,
        Some("0b" | "0B") => 2,
        _ => 10,
    };
    let value = if radix == 10 {
        t.parse::<f64>().map_err(|e| s.error(ErrorCode::L005, format!("malformed number `{t}`: {e}")))?
    } else {
        t[2..]
            .chars()
            .filter_map(|c| c.to_digit(radix))
            .fold(0.0, |acc, d| acc * radix as f64 + d as f64)
    };
    Ok(Outcome::accept(TokenKind::Number(value)))
}

// ─── Strings ──────────────────────────────────────────────────────────────────

fn open_string(s: &mut Scanner, state: &'static str) -> Result<Outcome, Error> {
    s.push_state(state);
    s.mark_start();
    Ok(Outcome::Ignore)
}

fn close_string(s: &mut Scanner, _: &str) -> Result<Outcome, Error> {
    s.pop_state();
    let text = s.take_buffer();
    Ok(Outcome::accept(TokenKind::Str(text)))
}

fn string_chars(s: &mut Scanner, t: &str) -> Result<Outcome, Error> {
    s.buffer.push_str(t);
    Ok(Outcome::Ignore)
}

fn escape(s: &mut Scanner, t: &str) -> Result<Outcome, Error> {
    let decoded = decode_escape(&t[1..]).ok_or_else(|| s.error(ErrorCode::L003, format!("invalid escape sequence `{t}`")))?;
    if let Some(c) = decoded {
        s.buffer.push(c);
    }
    Ok(Outcome::Ignore)
}

/// Decode the text after a backslash. `Some(None)` is a line continuation.
fn decode_escape(body: &str) -> Option<Option<char>> {
    let mut chars = body.chars();
    let first = chars.next()?;
    let c = match first {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'v' => '\u{b}',
        '\r' | '\n' => return Some(None),
        '0'..='7' => char::from_u32(u32::from_str_radix(body, 8).ok()?)?,
        'x' => {
            let hex = &body[1..];
            if hex.len() != 2 {
                return None;
            }
            char::from_u32(u32::from_str_radix(hex, 16).ok()?)?
        }
        'u' => return decode_unicode(&body[1..]).map(Some),
        other => other,
    };
    Some(Some(c))
}

fn decode_unicode(rest: &str) -> Option<char> {
    if let Some(inner) = rest.strip_prefix('{') {
        let hex = inner.strip_suffix('}')?;
        if hex.is_empty() {
            return None;
        }
        return char::from_u32(u32::from_str_radix(hex, 16).ok()?);
    }
    // Surrogate pair written as two escapes.
    if let Some((high, low)) = rest.split_once("\\u") {
        let high = u32::from_str_radix(high, 16).ok()?;
        let low = u32::from_str_radix(low, 16).ok()?;
        return char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00));
    }
    if rest.len() != 4 {
        return None;
    }
    char::from_u32(u32::from_str_radix(rest, 16).ok()?)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::error::ErrorCode;
    use crate::syntax::lexer::Lexer;
    use crate::syntax::token::TokenKind::{self, *};

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(src: &str) -> ErrorCode {
        Lexer::tokenize(src).unwrap_err().code
    }

    fn ident(s: &str) -> TokenKind {
        Ident(s.into())
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(kinds("func f $msg _x"), vec![Func, ident("f"), ident("$msg"), ident("_x")]);
        assert_eq!(kinds("iffy if"), vec![ident("iffy"), If]);
    }

    #[test]
    fn keyword_after_dot_is_identifier() {
        assert_eq!(kinds("a.for"), vec![ident("a"), Dot, ident("for")]);
        assert_eq!(kinds("a. /* c */ null"), vec![ident("a"), Dot, ident("null")]);
        assert_eq!(kinds("a.b(null)"), vec![ident("a"), Dot, ident("b"), LParen, Null, RParen]);
    }

    #[test]
    fn dot_followed_by_non_word_lexes_normally() {
        assert_eq!(kinds("a.(1)"), vec![ident("a"), Dot, LParen, Number(1.0), RParen]);
    }

    #[test]
    fn number_forms() {
        assert_eq!(
            kinds("12 1.5 2e3 0x1F 0o17 0b101 1.5e-1"),
            vec![Number(12.0), Number(1.5), Number(2000.0), Number(31.0), Number(15.0), Number(5.0), Number(0.15)]
        );
    }

    #[test]
    fn method_on_integer_literal() {
        assert_eq!(kinds("5.toFixed"), vec![Number(5.0), Dot, ident("toFixed")]);
    }

    #[test]
    fn number_glued_to_word_is_error() {
        assert_eq!(lex_err("3in"), ErrorCode::L005);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\tb\n\x41B\u{43}\101\'\"\\""#), vec![Str("a\tb\nABCA'\"\\".into())]);
        assert_eq!(kinds(r"'😀'"), vec![Str("😀".into())]);
        assert_eq!(kinds("'a\\\nb'"), vec![Str("ab".into())]);
        assert_eq!(kinds(r"'\q'"), vec![Str("q".into())]);
    }

    #[test]
    fn string_token_keeps_raw_text_and_start() {
        let toks = Lexer::tokenize("x = 'hi'").unwrap();
        assert_eq!(toks[2].text, "'hi'");
        assert_eq!(toks[2].column, 5);
    }

    #[test]
    fn bad_escapes_are_errors() {
        assert_eq!(lex_err(r"'\x4'"), ErrorCode::L003);
        assert_eq!(lex_err(r"'\u{}'"), ErrorCode::L003);
        assert_eq!(lex_err(r"'\u12'"), ErrorCode::L003);
    }

    #[test]
    fn unterminated_constructs() {
        assert_eq!(lex_err("'abc"), ErrorCode::L002);
        assert_eq!(lex_err("\"abc\nd\""), ErrorCode::L002);
        assert_eq!(lex_err("/* open"), ErrorCode::L004);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("a // b\n/* c\n*/ d"), vec![ident("a"), ident("d")]);
    }

    #[test]
    fn block_comment_with_newline_marks_next_token() {
        let toks = Lexer::tokenize("a /*\n*/ b").unwrap();
        assert!(toks[1].newline_before);
    }

    #[test]
    fn punctuators_longest_first() {
        assert_eq!(kinds("a+=b==c"), vec![ident("a"), PlusEq, ident("b"), EqEq, ident("c")]);
        assert_eq!(kinds("i++ && j-- || !k"), vec![ident("i"), PlusPlus, And, ident("j"), MinusMinus, Or, Bang, ident("k")]);
    }

    #[test]
    fn unknown_character() {
        assert_eq!(lex_err("a # b"), ErrorCode::L001);
    }
}
