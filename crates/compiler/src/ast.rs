//! Abstract syntax tree consumed by the code generator.
//!
//! This tree is produced by the (external) lexer/parser and is read-only to
//! everything in this crate: nothing here mutates a `Module` in place, the
//! generator only walks it and threads derived information through its own
//! side tables (symbol table, class registry, type maps, ...).

use std::path::PathBuf;

/// Location of a node in the original source, used for diagnostics and for
/// the optional debug-info sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const fn new(line: u32, column: u32) -> Self {
        Span { line, column }
    }
}

/// Top-level unit handed to the generator: one source file's worth of
/// statements plus the metadata needed for relative-import resolution.
///
/// `Serialize`/`Deserialize` let the CLI accept this tree as JSON from the
/// external lexer/parser rather than embedding a front end in this crate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Module {
    /// Path of the source file this module was parsed from, used to resolve
    /// relative imports and to populate the `__file__` constant.
    pub source_path: PathBuf,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StmtKind {
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: TypeAnnotation,
        value: Option<Expr>,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
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
    },
    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },
    Return {
        value: Option<Expr>,
    },
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    Import {
        names: Vec<ImportAlias>,
    },
    ImportFrom {
        module: Option<String>,
        /// Number of leading dots in `from ...pkg import x` (0 = absolute).
        level: u32,
        names: Vec<ImportAlias>,
    },
    ClassDef(ClassDef),
    FunctionDef(FunctionDef),
    Global {
        names: Vec<String>,
    },
    Del {
        targets: Vec<Expr>,
    },
    Pass,
    Break,
    Continue,
    /// A bare `yield`/`yield from` used as a statement.
    Yield {
        value: Option<Expr>,
        is_yield_from: bool,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    Wildcard,
    Capture(String),
    Literal(Constant),
    Class {
        name: String,
        positional: Vec<Pattern>,
        keyword: Vec<(String, Pattern)>,
    },
    Sequence(Vec<Pattern>),
    Mapping(Vec<(Constant, Pattern)>),
    Or(Vec<Pattern>),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExceptHandler {
    pub exc_type: Option<Expr>,
    pub bound_name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WithItem {
    pub context_expr: Expr,
    pub optional_vars: Option<Expr>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ImportAlias {
    pub name: String,
    pub asname: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub args: Vec<Param>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
    pub decorators: Vec<Expr>,
    pub return_annotation: Option<TypeAnnotation>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    /// True when this def appears inside another function's body; used to
    /// decide between a plain function and a closure-lowered factory.
    pub is_nested: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    pub default: Option<Expr>,
}

/// A syntactic type annotation as written by the author. This is a hint for
/// the Type Inferrer, not itself a semantic type -- annotated-assign treats
/// it as authoritative (see `type_inferrer::infer_annotation`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum TypeAnnotation {
    Name(String),
    Subscript {
        base: String,
        args: Vec<TypeAnnotation>,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ExprKind {
    Name(String),
    Constant(Constant),
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
        op: BoolOp,
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
        keywords: Vec<(Option<String>, Expr)>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Option<Expr>, Expr)>),
    Set(Vec<Expr>),
    Lambda {
        args: Vec<Param>,
        body: Box<Expr>,
    },
    ListComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    FString {
        parts: Vec<FStringPart>,
    },
    NamedExpr {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Await(Box<Expr>),
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Starred(Box<Expr>),
    Yield {
        value: Option<Box<Expr>>,
        is_yield_from: bool,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum FStringPart {
    Literal(String),
    Expr {
        value: Box<Expr>,
        format_spec: Option<String>,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Constant {
    Int(i64),
    /// Integers outside the native range; kept as decimal text so no digit
    /// is lost on the way to the TL big-int literal form.
    BigInt(String),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    None,
    Ellipsis,
    Complex { re: f64, im: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    MatMul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
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

impl Stmt {
    pub fn new(span: Span, kind: StmtKind) -> Self {
        Stmt { span, kind }
    }
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Expr { span, kind }
    }
}
