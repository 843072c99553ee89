//! Rule-driven tokenizer.
//!
//! A `RuleSet` is an ordered list of `(state clause, pattern, action)` rules.
//! At every position the first rule whose clause matches the current state and
//! tags, and whose pattern matches at that position, fires. Its action returns
//! exactly one `Outcome`. `Lexer` buffers the produced tokens and layers
//! lookahead and nested transactions on top for the parser.

use std::collections::{HashSet, VecDeque};

use regex::Regex;

use crate::error::{Error, ErrorCode};
use crate::syntax::token::{Token, TokenKind};

// ─── Patterns ─────────────────────────────────────────────────────────────────

pub enum Pattern {
    Literal(&'static str),
    Regex(Regex),
}

impl Pattern {
    pub fn literal(s: &'static str) -> Self {
        Self::Literal(s)
    }

    /// Anchored regular expression.
    pub fn regex(src: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{src})")).map(Self::Regex)
    }

    /// Literal set compiled into one escaped alternation, longest first so
    /// that `==` wins over `=`.
    pub fn one_of(items: &[&str]) -> Result<Self, regex::Error> {
        let mut sorted: Vec<&str> = items.to_vec();
        sorted.sort_by(|a, b| b.len().cmp(&a.len()));
        let alternation = sorted.iter().map(|s| regex::escape(s)).collect::<Vec<_>>().join("|");
        Self::regex(&alternation)
    }

    fn match_at<'s>(&self, rest: &'s str) -> Option<&'s str> {
        match self {
            Self::Literal(s) => rest.starts_with(s).then(|| &rest[..s.len()]),
            Self::Regex(re) => re.find(rest).map(|m| m.as_str()),
        }
    }
}

// ─── State clauses ────────────────────────────────────────────────────────────

/// `state [#tag ...][, state [#tag ...]]*`. Comma-separated terms are OR-ed,
/// tags inside one term are AND-ed, `*` matches any state.
#[derive(Debug, Clone)]
pub struct StateClause {
    terms: Vec<ClauseTerm>,
}

#[derive(Debug, Clone)]
struct ClauseTerm {
    state: Option<&'static str>,
    tags: Vec<&'static str>,
}

impl StateClause {
    pub fn parse(text: &'static str) -> Self {
        let terms = text
            .split(',')
            .map(|term| {
                let mut state = None;
                let mut tags = Vec::new();
                for word in term.split_whitespace() {
                    if let Some(tag) = word.strip_prefix('#') {
                        tags.push(tag);
                    } else if word != "*" {
                        state = Some(word);
                    }
                }
                ClauseTerm { state, tags }
            })
            .collect();
        Self { terms }
    }

    pub fn matches(&self, state: &str, tags: &HashSet<&'static str>) -> bool {
        self.terms.iter().any(|t| {
            t.state.is_none_or(|s| s == state) && t.tags.iter().all(|tag| tags.contains(tag))
        })
    }
}

// ─── Rules ────────────────────────────────────────────────────────────────────

/// What a rule's action decided for the text it matched.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Consume the text and produce nothing.
    Ignore,
    /// Pretend this rule did not match; try the next one.
    Reject,
    /// Restart matching at the same position (after a state or tag change).
    Repeat,
    /// Consume the text and enqueue these tokens.
    Accept(Vec<TokenKind>),
    /// Halt tokenization for good.
    Stop,
}

impl Outcome {
    pub fn accept(kind: TokenKind) -> Self {
        Self::Accept(vec![kind])
    }
}

pub type RuleAction = fn(&mut Scanner, &str) -> Result<Outcome, Error>;

pub struct Rule {
    clause: StateClause,
    pattern: Pattern,
    action: RuleAction,
}

pub struct RuleSet {
    initial: &'static str,
    rules: Vec<Rule>,
    eof_errors: Vec<(&'static str, ErrorCode, &'static str)>,
}

impl RuleSet {
    pub fn new(initial: &'static str) -> Self {
        Self { initial, rules: Vec::new(), eof_errors: Vec::new() }
    }

    pub fn rule(mut self, states: &'static str, pattern: Pattern, action: RuleAction) -> Self {
        self.rules.push(Rule { clause: StateClause::parse(states), pattern, action });
        self
    }

    /// Error raised when input ends while `state` is still active.
    pub fn on_eof(mut self, state: &'static str, code: ErrorCode, message: &'static str) -> Self {
        self.eof_errors.push((state, code, message));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ─── Scanner ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    column: usize,
}

const TAB_STOP: usize = 8;
const MAX_REPEATS: usize = 64;

/// The matching engine. Rule actions receive it to manipulate states, tags
/// and the composite-token buffer.
pub struct Scanner {
    rules: &'static RuleSet,
    input: String,
    pos: usize,
    line: usize,
    column: usize,
    states: Vec<&'static str>,
    tags: HashSet<&'static str>,
    /// Text accumulated for a token spanning several rule matches (strings).
    pub buffer: String,
    start: Option<Mark>,
    match_start: Mark,
    queue: VecDeque<Token>,
    newline_pending: bool,
    stopped: bool,
}

impl Scanner {
    pub fn new(rules: &'static RuleSet) -> Self {
        Self {
            rules,
            input: String::new(),
            pos: 0,
            line: 1,
            column: 1,
            states: vec![rules.initial],
            tags: HashSet::new(),
            buffer: String::new(),
            start: None,
            match_start: Mark { pos: 0, line: 1, column: 1 },
            queue: VecDeque::new(),
            newline_pending: false,
            stopped: false,
        }
    }

    pub fn set_input(&mut self, text: &str) {
        *self = Self::new(self.rules);
        self.input = text.to_string();
    }

    // ── State stack and tags ─────────────────────────────────────────────────

    pub fn state(&self) -> &'static str {
        self.states.last().copied().unwrap_or(self.rules.initial)
    }

    pub fn push_state(&mut self, state: &'static str) {
        self.states.push(state);
    }

    pub fn pop_state(&mut self) {
        if self.states.len() > 1 {
            self.states.pop();
        }
    }

    pub fn set_state(&mut self, state: &'static str) {
        match self.states.last_mut() {
            Some(top) => *top = state,
            None => self.states.push(state),
        }
    }

    pub fn set_tag(&mut self, tag: &'static str) {
        self.tags.insert(tag);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.remove(tag);
    }

    // ── Composite tokens ─────────────────────────────────────────────────────

    /// Begin a token that will be accepted by a later rule. Its position is
    /// the start of the current match.
    pub fn mark_start(&mut self) {
        self.start = Some(self.match_start);
        self.buffer.clear();
    }

    pub fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Input following the current match of length `len`.
    pub fn following(&self, len: usize) -> &str {
        self.input.get(self.match_start.pos + len..).unwrap_or("")
    }

    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> Error {
        Error::new(code, self.match_start.line, self.match_start.column, message)
    }

    // ── Engine ───────────────────────────────────────────────────────────────

    /// Produce the next token, or `None` once input is exhausted or a rule
    /// stopped the scanner.
    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        let mut repeats = 0;
        loop {
            if let Some(tok) = self.queue.pop_front() {
                return Ok(Some(tok));
            }
            if self.stopped {
                return Ok(None);
            }
            if self.pos >= self.input.len() {
                return self.end_of_input();
            }

            self.match_start = Mark { pos: self.pos, line: self.line, column: self.column };
            let rules = self.rules;
            let mut fired = false;

            for rule in &rules.rules {
                if !rule.clause.matches(self.state(), &self.tags) {
                    continue;
                }
                let Some(text) = rule.pattern.match_at(&self.input[self.pos..]) else { continue };
                let text = text.to_string();

                match (rule.action)(self, &text)? {
                    Outcome::Reject => continue,
                    Outcome::Ignore => {
                        self.advance(&text);
                    }
                    Outcome::Accept(kinds) => {
                        self.advance(&text);
                        self.enqueue(kinds);
                    }
                    Outcome::Repeat => {
                        repeats += 1;
                        if repeats > MAX_REPEATS {
                            return Err(self.error(ErrorCode::L001, "lexer rules repeat without progress"));
                        }
                    }
                    Outcome::Stop => {
                        self.stopped = true;
                    }
                }
                fired = true;
                break;
            }

            if !fired {
                let ch = self.input[self.pos..].chars().next().unwrap_or(' ');
                return Err(self.error(ErrorCode::L001, format!("unexpected character `{ch}`")));
            }
        }
    }

    fn end_of_input(&mut self) -> Result<Option<Token>, Error> {
        let state = self.state();
        if state == self.rules.initial {
            return Ok(None);
        }
        let (code, message) = self
            .rules
            .eof_errors
            .iter()
            .find(|(s, ..)| *s == state)
            .map(|(_, code, msg)| (*code, *msg))
            .unwrap_or((ErrorCode::L001, "unexpected end of input"));
        let at = self.start.unwrap_or(self.match_start);
        Err(Error::new(code, at.line, at.column, message))
    }

    fn enqueue(&mut self, kinds: Vec<TokenKind>) {
        let start = self.start.take().unwrap_or(self.match_start);
        let text = &self.input[start.pos..self.pos];
        let mut newline = std::mem::take(&mut self.newline_pending);
        for kind in kinds {
            let mut tok = Token::new(kind, text, start.pos, start.line, start.column);
            tok.newline_before = newline;
            newline = false;
            self.queue.push_back(tok);
        }
    }

    /// Move past `text`, tracking lines and tab stops.
    fn advance(&mut self, text: &str) {
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\r' | '\n' => {
                    if ch == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    self.line += 1;
                    self.column = 1;
                    if self.start.is_none() {
                        self.newline_pending = true;
                    }
                }
                '\t' => {
                    self.column = ((self.column - 1) / TAB_STOP + 1) * TAB_STOP + 1;
                }
                _ => self.column += 1,
            }
        }
        self.pos += text.len();
    }

    fn end_mark(&self) -> (usize, usize) {
        (self.line, self.column)
    }
}

// ─── Lexer: buffered token stream with transactions ───────────────────────────

pub struct Lexer {
    scanner: Scanner,
    tokens: Vec<Token>,
    cursor: usize,
    checkpoints: Vec<usize>,
    exhausted: bool,
}

impl Lexer {
    /// A lexer for the command language.
    pub fn new() -> Self {
        Self::with_rules(&crate::syntax::rules::LANGUAGE)
    }

    pub fn with_rules(rules: &'static RuleSet) -> Self {
        Self { scanner: Scanner::new(rules), tokens: Vec::new(), cursor: 0, checkpoints: Vec::new(), exhausted: false }
    }

    /// Reset all state and start over on `text`.
    pub fn set_input(&mut self, text: &str) {
        self.scanner.set_input(text);
        self.tokens.clear();
        self.cursor = 0;
        self.checkpoints.clear();
        self.exhausted = false;
    }

    /// Tokenize `text` completely.
    pub fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
        let mut lexer = Self::new();
        lexer.set_input(text);
        let mut out = Vec::new();
        while let Some(tok) = lexer.next_token()? {
            out.push(tok);
        }
        Ok(out)
    }

    fn fill(&mut self, upto: usize) -> Result<(), Error> {
        while !self.exhausted && self.tokens.len() <= upto {
            match self.scanner.next_token()? {
                Some(tok) => self.tokens.push(tok),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.fill(self.cursor)?;
        let tok = self.tokens.get(self.cursor).cloned();
        if tok.is_some() {
            self.cursor += 1;
        }
        Ok(tok)
    }

    pub fn peek(&mut self, offset: usize) -> Result<Option<&Token>, Error> {
        self.fill(self.cursor + offset)?;
        Ok(self.tokens.get(self.cursor + offset))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.fill(self.cursor + n)?;
        self.cursor = (self.cursor + n).min(self.tokens.len());
        Ok(())
    }

    /// Consume the next token if it has the given kind. Payload-carrying kinds
    /// (`Ident`, `Number`, `Str`) match on the kind alone.
    pub fn consume(&mut self, kind: &TokenKind) -> Result<Token, Error> {
        match self.peek(0)? {
            Some(tok) if same_kind(&tok.kind, kind) => {
                let tok = tok.clone();
                self.cursor += 1;
                Ok(tok)
            }
            Some(tok) => Err(Error::new(
                ErrorCode::P002,
                tok.line,
                tok.column,
                format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            )
            .spanning(tok.width())),
            None => {
                let (line, column) = self.end_position();
                Err(Error::new(ErrorCode::P005, line, column, format!(
                    "expected {}, found end of input", kind.describe()
                )))
            }
        }
    }

    /// Position just past the last character of input.
    pub fn end_position(&self) -> (usize, usize) {
        self.scanner.end_mark()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The most recently consumed token.
    pub fn previous(&self) -> Option<&Token> {
        self.cursor.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    pub fn begin(&mut self) {
        self.checkpoints.push(self.cursor);
    }

    pub fn commit(&mut self) {
        self.checkpoints.pop();
    }

    pub fn rollback(&mut self) {
        if let Some(at) = self.checkpoints.pop() {
            self.cursor = at;
        }
    }

    pub fn depth(&self) -> usize {
        self.checkpoints.len()
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

fn same_kind(a: &TokenKind, b: &TokenKind) -> bool {
    match (a, b) {
        (TokenKind::Ident(_), TokenKind::Ident(_))
        | (TokenKind::Number(_), TokenKind::Number(_))
        | (TokenKind::Str(_), TokenKind::Str(_)) => true,
        _ => a == b,
    }
}

// ─── Alternatives ─────────────────────────────────────────────────────────────

/// Anything that owns a `Lexer` and can therefore run transactional parses.
pub trait Transactional {
    fn lexer(&mut self) -> &mut Lexer;
}

impl Transactional for Lexer {
    fn lexer(&mut self) -> &mut Lexer {
        self
    }
}

pub type Alternative<C, T> = fn(&mut C) -> Result<T, Error>;

/// Try each strategy inside its own transaction and keep the first that
/// succeeds. Tokens consumed by a failing strategy are rolled back. When all
/// fail, the error of the strategy that got furthest is returned.
pub fn alternatives<C: Transactional, T>(ctx: &mut C, alts: &[Alternative<C, T>]) -> Result<T, Error> {
    let start = ctx.lexer().cursor();
    let mut deepest: Option<(usize, Error)> = None;

    for alt in alts {
        ctx.lexer().begin();
        match alt(ctx) {
            Ok(value) => {
                ctx.lexer().commit();
                return Ok(value);
            }
            Err(err) => {
                let consumed = ctx.lexer().cursor().saturating_sub(start);
                ctx.lexer().rollback();
                if deepest.as_ref().is_none_or(|(d, _)| consumed > *d) {
                    deepest = Some((consumed, err));
                }
            }
        }
    }

    match deepest {
        Some((_, err)) => Err(err),
        None => {
            let (line, column) = match ctx.lexer().peek(0)? {
                Some(tok) => (tok.line, tok.column),
                None => ctx.lexer().end_position(),
            };
            Err(Error::new(ErrorCode::P001, line, column, "no alternative applies here"))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    // A tiny rule set: words, numbers, `|` separators; `!` stops the scanner;
    // `<` ... `>` switches into a raw state where everything up to `>` is one token.
    static TOY: Lazy<RuleSet> = Lazy::new(|| {
        RuleSet::new("main")
            .rule("main", Pattern::regex(r"[ \t\r\n]+").unwrap(), |_, _| Ok(Outcome::Ignore))
            .rule("main", Pattern::literal("!"), |_, _| Ok(Outcome::Stop))
            .rule("main", Pattern::regex(r"[a-z]+").unwrap(), |s, t| {
                if t == "raw" {
                    s.set_tag("raw");
                    return Ok(Outcome::Reject);
                }
                Ok(Outcome::accept(TokenKind::Ident(t.to_string())))
            })
            .rule("main #raw", Pattern::regex(r"[a-z]+").unwrap(), |s, t| {
                s.remove_tag("raw");
                Ok(Outcome::Accept(vec![TokenKind::Ident(t.to_string()), TokenKind::Ident(t.to_string())]))
            })
            .rule("main", Pattern::regex(r"[0-9]+").unwrap(), |_, t| {
                Ok(Outcome::accept(TokenKind::Number(t.parse().unwrap_or(0.0))))
            })
            .rule("main", Pattern::one_of(&["|", "||"]).unwrap(), |_, t| {
                Ok(Outcome::accept(if t == "||" { TokenKind::Or } else { TokenKind::Comma }))
            })
            .rule("main", Pattern::literal("<"), |s, _| {
                s.push_state("angle");
                s.mark_start();
                Ok(Outcome::Ignore)
            })
            .rule("angle", Pattern::literal(">"), |s, _| {
                s.pop_state();
                let text = s.take_buffer();
                Ok(Outcome::accept(TokenKind::Str(text)))
            })
            .rule("angle", Pattern::regex(r"[^>]+").unwrap(), |s, t| {
                s.buffer.push_str(t);
                Ok(Outcome::Ignore)
            })
            .on_eof("angle", ErrorCode::L002, "unterminated angle")
    });

    fn toy(src: &str) -> Lexer {
        let mut l = Lexer::with_rules(&TOY);
        l.set_input(src);
        l
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut l = toy(src);
        let mut out = Vec::new();
        while let Some(t) = l.next_token().unwrap() {
            out.push(t.kind);
        }
        out
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.into())
    }

    #[test]
    fn rules_fire_in_order() {
        assert_eq!(kinds("ab 12"), vec![ident("ab"), TokenKind::Number(12.0)]);
    }

    #[test]
    fn literal_set_prefers_longest() {
        assert_eq!(kinds("a||b|c"), vec![ident("a"), TokenKind::Or, ident("b"), TokenKind::Comma, ident("c")]);
    }

    #[test]
    fn reject_falls_through_to_tagged_rule() {
        assert_eq!(kinds("raw"), vec![ident("raw"), ident("raw")]);
    }

    #[test]
    fn stop_halts_permanently() {
        assert_eq!(kinds("a ! b c"), vec![ident("a")]);
    }

    #[test]
    fn state_stack_builds_composite_token() {
        let mut l = toy("x <a b> y");
        l.next_token().unwrap();
        let tok = l.next_token().unwrap().unwrap();
        assert_eq!(tok.kind, TokenKind::Str("a b".into()));
        assert_eq!(tok.text, "<a b>");
        assert_eq!(tok.column, 3);
    }

    #[test]
    fn eof_inside_state_is_error() {
        let mut l = toy("<abc");
        let err = l.next_token().unwrap_err();
        assert_eq!(err.code, ErrorCode::L002);
    }

    #[test]
    fn unmatched_input_is_error() {
        let mut l = toy("a $");
        l.next_token().unwrap();
        let err = l.next_token().unwrap_err();
        assert_eq!(err.code, ErrorCode::L001);
        assert_eq!((err.line, err.column), (1, 3));
    }

    #[test]
    fn tab_rounds_to_next_stop() {
        let mut l = toy("a\tb\n\t\tc");
        let a = l.next_token().unwrap().unwrap();
        let b = l.next_token().unwrap().unwrap();
        let c = l.next_token().unwrap().unwrap();
        assert_eq!((a.line, a.column), (1, 1));
        assert_eq!((b.line, b.column), (1, 9));
        assert_eq!((c.line, c.column), (2, 17));
        assert!(c.newline_before);
        assert!(!b.newline_before);
    }

    #[test]
    fn crlf_counts_once() {
        let mut l = toy("a\r\n\r\nb");
        l.next_token().unwrap();
        let b = l.next_token().unwrap().unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn peek_and_skip_do_not_consume_unexpectedly() {
        let mut l = toy("a b c");
        assert_eq!(l.peek(2).unwrap().map(|t| t.kind.clone()), Some(ident("c")));
        assert_eq!(l.cursor(), 0);
        l.skip(2).unwrap();
        assert_eq!(l.next_token().unwrap().map(|t| t.kind), Some(ident("c")));
        assert_eq!(l.next_token().unwrap(), None);
    }

    #[test]
    fn consume_reports_mismatch() {
        let mut l = toy("a");
        let err = l.consume(&TokenKind::Number(0.0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::P002);
        assert!(l.consume(&TokenKind::Ident(String::new())).is_ok());
        assert_eq!(l.consume(&TokenKind::Comma).unwrap_err().code, ErrorCode::P005);
    }

    #[test]
    fn nested_rollback_restores_outer_checkpoint() {
        let mut l = toy("a b c d");
        l.begin();
        l.skip(1).unwrap();
        l.begin();
        l.skip(2).unwrap();
        l.rollback();
        assert_eq!(l.cursor(), 1);
        l.rollback();
        assert_eq!(l.cursor(), 0);
    }

    fn two_words(l: &mut Lexer) -> Result<&'static str, Error> {
        l.consume(&TokenKind::Ident(String::new()))?;
        l.consume(&TokenKind::Ident(String::new()))?;
        l.consume(&TokenKind::Ident(String::new()))?;
        Ok("three words")
    }

    fn word_number(l: &mut Lexer) -> Result<&'static str, Error> {
        l.consume(&TokenKind::Ident(String::new()))?;
        l.consume(&TokenKind::Number(0.0))?;
        Ok("word number")
    }

    fn number_first(l: &mut Lexer) -> Result<&'static str, Error> {
        l.consume(&TokenKind::Number(0.0))?;
        Ok("number")
    }

    #[test]
    fn alternatives_roll_back_failed_attempts() {
        let mut l = toy("a 1 z");
        let got = alternatives(&mut l, &[two_words, word_number]).unwrap();
        assert_eq!(got, "word number");
        assert_eq!(l.cursor(), 2);
        assert_eq!(l.depth(), 0);
    }

    #[test]
    fn alternatives_report_deepest_failure() {
        // two_words consumes `a b` before failing on `1`; number_first fails at once.
        let mut l = toy("a b 1");
        let err = alternatives(&mut l, &[number_first, two_words]).unwrap_err();
        assert_eq!(err.column, 5);
        assert_eq!(l.cursor(), 0);
    }
}
