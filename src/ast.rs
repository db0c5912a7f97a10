//! The reconstructed source tree.
//!
//! A closed family of sum types mirroring the source-level constructs the
//! recognizer can prove. Ownership is exclusive along tree edges; the tree
//! is handed to an external formatter unchanged.

use crate::code::Const;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    USub,
    UAdd,
    Invert,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOp {
    /// The operator testing the opposite relation.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Lt => Self::GtE,
            Self::LtE => Self::Gt,
            Self::Gt => Self::LtE,
            Self::GtE => Self::Lt,
            Self::Is => Self::IsNot,
            Self::IsNot => Self::Is,
            Self::In => Self::NotIn,
            Self::NotIn => Self::In,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

/// A keyword argument in a call or class header. `arg: None` renders as
/// `**value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
}

/// One `for`/`if` clause group of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionClause {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: String,
    pub annotation: Option<Expr>,
}

impl Arg {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
        }
    }
}

/// A function signature assembled from argument counts, defaults and
/// annotations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arguments {
    pub posonlyargs: Vec<Arg>,
    pub args: Vec<Arg>,
    pub vararg: Option<Arg>,
    pub kwonlyargs: Vec<Arg>,
    /// Parallel to `kwonlyargs`; `None` for required keyword-only params.
    pub kw_defaults: Vec<Option<Expr>>,
    pub kwarg: Option<Arg>,
    /// Defaults for the trailing positional parameters.
    pub defaults: Vec<Expr>,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Literal(Const),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    /// `keys[i] == None` marks a `**` expansion at that position.
    Dict {
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        args: Box<Arguments>,
        body: Box<Expr>,
    },
    Comprehension {
        kind: ComprehensionKind,
        /// Element for list/set/generator; key for dict.
        element: Box<Expr>,
        /// Value for dict comprehensions.
        value: Option<Box<Expr>>,
        clauses: Vec<ComprehensionClause>,
    },
    Starred(Box<Expr>),
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    /// An f-string: a sequence of literal and formatted pieces.
    JoinedStr(Vec<Expr>),
    FormattedValue {
        value: Box<Expr>,
        /// `!s`, `!r` or `!a`.
        conversion: Option<char>,
        format_spec: Option<Box<Expr>>,
    },
    /// Placeholder emitted when lifting fails recoverably.
    Unknown,
}

impl Expr {
    #[must_use]
    pub fn none() -> Self {
        Self::Literal(Const::None)
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Self::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    /// Logical negation with compare/`not` folding.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            Self::Compare {
                left,
                ops,
                comparators,
            } if ops.len() == 1 => Self::Compare {
                left,
                ops: vec![ops[0].negated()],
                comparators,
            },
            other => Self::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(other),
            },
        }
    }

    /// True for literals of falsey/truthy use in `while True` headers.
    #[must_use]
    pub fn is_true_literal(&self) -> bool {
        matches!(self, Self::Literal(Const::Bool(true)) | Self::Literal(Const::Int(1)))
    }
}

/// An `except` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// `None` for a bare `except:`.
    pub typ: Option<Expr>,
    /// The `as name` binding.
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

/// One `with` item: `context [as vars]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub optional_vars: Option<Expr>,
}

/// An `import x as y` / `from m import x as y` component.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

/// `match` case patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchPattern {
    /// A literal or dotted-name value compared with `==`.
    Value(Expr),
    /// `None`, `True`, `False` compared with `is`.
    Singleton(Const),
    Sequence(Vec<MatchPattern>),
    Mapping {
        keys: Vec<Expr>,
        patterns: Vec<MatchPattern>,
        rest: Option<String>,
    },
    Class {
        cls: Expr,
        patterns: Vec<MatchPattern>,
        kwd_attrs: Vec<String>,
        kwd_patterns: Vec<MatchPattern>,
    },
    Star(Option<String>),
    /// `pattern as name`; `(None, None)` is the wildcard `_`.
    As {
        pattern: Option<Box<MatchPattern>>,
        name: Option<String>,
    },
    Or(Vec<MatchPattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: MatchPattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    Expr(Expr),
    Return(Option<Expr>),
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Delete(Vec<Expr>),
    Pass,
    Break,
    Continue,
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
        is_async: bool,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
        is_async: bool,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },
    FunctionDef {
        name: String,
        args: Arguments,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
        returns: Option<Expr>,
        is_async: bool,
        docstring: Option<String>,
    },
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        keywords: Vec<Keyword>,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
        docstring: Option<String>,
    },
    Import {
        names: Vec<Alias>,
    },
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: u32,
    },
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    /// Python 2 `print` statement.
    Print {
        dest: Option<Expr>,
        values: Vec<Expr>,
        newline: bool,
    },
    /// Python 2 `exec` statement.
    Exec {
        body: Expr,
        globals: Option<Expr>,
        locals: Option<Expr>,
    },
}

/// The decompiled module: the top-level statement list plus the module
/// docstring when one was present in `consts`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub docstring: Option<String>,
}
