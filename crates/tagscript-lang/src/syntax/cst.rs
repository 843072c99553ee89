use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Source location attached to every node for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Statement>,
}

// ─── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `{ ... }`
    Block { body: Vec<Statement>, span: Span },
    /// `func name(a, b) { ... }`
    Function(Arc<FunctionLiteral>),
    /// `if (test) consequent else alternate`
    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
        span: Span,
    },
    /// `while (test) body`
    While { test: Expression, body: Box<Statement>, span: Span },
    /// `for (binding of iterable) body`
    ForOf {
        binding: Identifier,
        iterable: Expression,
        body: Box<Statement>,
        span: Span,
    },
    /// `for (init; test; update) body`
    For {
        init: Option<Expression>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
        span: Span,
    },
    /// `return` or `return expr`
    Return { argument: Option<Expression>, span: Span },
    /// `reply expr`; a bare `reply` replies with null.
    Reply { argument: Option<Expression>, span: Span },
    /// `sleep ms`
    Sleep { argument: Expression, span: Span },
    Break { span: Span },
    Continue { span: Span },
    /// A lone `;`.
    Empty { span: Span },
    Expression { expression: Expression, span: Span },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Self::Function(f) => f.span,
            Self::Block { span, .. }
            | Self::If { span, .. }
            | Self::While { span, .. }
            | Self::ForOf { span, .. }
            | Self::For { span, .. }
            | Self::Return { span, .. }
            | Self::Reply { span, .. }
            | Self::Sleep { span, .. }
            | Self::Break { span }
            | Self::Continue { span }
            | Self::Empty { span }
            | Self::Expression { span, .. } => *span,
        }
    }
}

/// Shared by `func` statements and function expressions. The body is kept
/// behind an `Arc` so closures can hold it without cloning the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionLiteral {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub span: Span,
}

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// `target = value`, `target += value`, ...
    Assignment {
        op: AssignOp,
        target: Box<Expression>,
        value: Box<Expression>,
        span: Span,
    },
    /// `test then consequent else alternate`
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Unary { op: UnaryOp, argument: Box<Expression>, span: Span },
    /// Postfix `x++` / `x--`.
    Update { op: UpdateOp, target: Box<Expression>, span: Span },
    /// `object[index]`
    Index { object: Box<Expression>, index: Box<Expression>, span: Span },
    /// `object.name`
    Property { object: Box<Expression>, name: String, span: Span },
    Call { callee: Box<Expression>, arguments: Vec<Expression>, span: Span },
    Identifier(Identifier),
    Number { value: f64, span: Span },
    String { value: String, span: Span },
    Boolean { value: bool, span: Span },
    Null { span: Span },
    Array { elements: Vec<Expression>, span: Span },
    Object { properties: Vec<ObjectProperty>, span: Span },
    Function(Arc<FunctionLiteral>),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Self::Identifier(id) => id.span,
            Self::Function(f) => f.span,
            Self::Assignment { span, .. }
            | Self::Conditional { span, .. }
            | Self::Logical { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. }
            | Self::Update { span, .. }
            | Self::Index { span, .. }
            | Self::Property { span, .. }
            | Self::Call { span, .. }
            | Self::Number { span, .. }
            | Self::String { span, .. }
            | Self::Boolean { span, .. }
            | Self::Null { span }
            | Self::Array { span, .. }
            | Self::Object { span, .. } => *span,
        }
    }

    /// Only identifiers and member accesses can be assigned to.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Identifier(_) | Self::Index { .. } | Self::Property { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    /// Directly followed by a bare `=`: resolving it may create the variable.
    pub declares: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub key: String,
    pub value: Expression,
    pub span: Span,
}

// ─── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Rem, Pow,
    Eq, Ne, Lt, Le, Gt, Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Pow => "^",
            Self::Eq  => "==",
            Self::Ne  => "!=",
            Self::Lt  => "<",
            Self::Le  => "<=",
            Self::Gt  => ">",
            Self::Ge  => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign, Add, Sub, Mul, Div, Rem,
}

impl AssignOp {
    /// The arithmetic applied before storing, for compound forms.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            Self::Assign => None,
            Self::Add => Some(BinaryOp::Add),
            Self::Sub => Some(BinaryOp::Sub),
            Self::Mul => Some(BinaryOp::Mul),
            Self::Div => Some(BinaryOp::Div),
            Self::Rem => Some(BinaryOp::Rem),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}
