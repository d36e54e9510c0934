//=====================================================
// File: ast/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript Abstract Syntax Tree definitions
// Objective: Define the closed set of statement, expression, and pattern
//            nodes produced by the parser and walked by the analyzer and
//            interpreter
//=====================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tokenizer::Position;

pub mod printer;

pub type NodeId = u32;

static NODE_COUNTER: AtomicU32 = AtomicU32::new(1);

pub fn next_node_id() -> NodeId {
    NODE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

//=====================================================
//            Section 1: Operators & Literals
//=====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Subtract => Some(BinaryOp::Subtract),
            AssignOp::Multiply => Some(BinaryOp::Multiply),
            AssignOp::Divide => Some(BinaryOp::Divide),
            AssignOp::Modulo => Some(BinaryOp::Modulo),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Right-hand side of the `<:` type test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeName {
    Number,
    String,
    Bool,
    Unit,
    Null,
    Array,
    Tuple,
    Map,
    Object,
    Function,
    Promise,
    External,
}

impl TypeName {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "number" => TypeName::Number,
            "string" => TypeName::String,
            "bool" => TypeName::Bool,
            "unit" => TypeName::Unit,
            "null" => TypeName::Null,
            "array" => TypeName::Array,
            "tuple" => TypeName::Tuple,
            "map" => TypeName::Map,
            "object" | "entity" => TypeName::Object,
            "function" => TypeName::Function,
            "promise" => TypeName::Promise,
            "external" => TypeName::External,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    Let,
    Var,
}

//=====================================================
//            Section 2: Node Classification
//=====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Terminal(TerminalKind),
    NonTerminal(NonTerminalKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Literal,
    Identifier,
    This,
    Base,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonTerminalKind {
    Program,
    Block,
    Declare,
    FunctionDeclare,
    If,
    While,
    DoWhile,
    For,
    Each,
    Match,
    Return,
    Break,
    Continue,
    Import,
    Export,
    Namespace,
    ExpressionStatement,
    ScopedName,
    ArrayLiteral,
    MapLiteral,
    TupleLiteral,
    EntityLiteral,
    EntityExtend,
    Construct,
    Unary,
    Binary,
    TypeTest,
    Update,
    Assign,
    Conditional,
    Pipe,
    Call,
    Member,
    TupleIndex,
    Index,
    Function,
    BlockExpression,
    Async,
    Safe,
    Lock,
}

//=====================================================
//            Section 3: Expressions
//=====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub position: Position,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    This,
    Base,
    /// `ext::name`, resolved against host bindings at the point of use.
    External(String),
    /// `ns::name`
    Scoped {
        namespace: Box<Expr>,
        name: String,
    },
    Array(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Tuple(Vec<Expr>),
    Entity(Vec<MemberInit>),
    /// `base::{...}`
    Extend {
        base: Box<Expr>,
        members: Vec<MemberInit>,
    },
    /// `Class{...}` for a granted host class.
    Construct {
        class: String,
        members: Vec<MemberInit>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    TypeTest {
        value: Box<Expr>,
        type_name: TypeName,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: AssignTarget,
        value: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `value >> function`
    Pipe {
        value: Box<Expr>,
        function: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    TupleIndex {
        object: Box<Expr>,
        index: usize,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Function(Arc<FunctionDef>),
    Block(Block),
    Async(Block),
    Safe(Block),
    Lock {
        key: Option<Box<Expr>>,
        body: Block,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Self {
            id: next_node_id(),
            position,
            kind,
        }
    }

    pub fn node_kind(&self) -> NodeKind {
        use NonTerminalKind as N;
        use TerminalKind as T;
        match &self.kind {
            ExprKind::Literal(_) => NodeKind::Terminal(T::Literal),
            ExprKind::Identifier(_) => NodeKind::Terminal(T::Identifier),
            ExprKind::This => NodeKind::Terminal(T::This),
            ExprKind::Base => NodeKind::Terminal(T::Base),
            ExprKind::External(_) => NodeKind::Terminal(T::External),
            ExprKind::Scoped { .. } => NodeKind::NonTerminal(N::ScopedName),
            ExprKind::Array(_) => NodeKind::NonTerminal(N::ArrayLiteral),
            ExprKind::Map(_) => NodeKind::NonTerminal(N::MapLiteral),
            ExprKind::Tuple(_) => NodeKind::NonTerminal(N::TupleLiteral),
            ExprKind::Entity(_) => NodeKind::NonTerminal(N::EntityLiteral),
            ExprKind::Extend { .. } => NodeKind::NonTerminal(N::EntityExtend),
            ExprKind::Construct { .. } => NodeKind::NonTerminal(N::Construct),
            ExprKind::Unary { .. } => NodeKind::NonTerminal(N::Unary),
            ExprKind::Binary { .. } => NodeKind::NonTerminal(N::Binary),
            ExprKind::TypeTest { .. } => NodeKind::NonTerminal(N::TypeTest),
            ExprKind::Update { .. } => NodeKind::NonTerminal(N::Update),
            ExprKind::Assign { .. } => NodeKind::NonTerminal(N::Assign),
            ExprKind::Conditional { .. } => NodeKind::NonTerminal(N::Conditional),
            ExprKind::Pipe { .. } => NodeKind::NonTerminal(N::Pipe),
            ExprKind::Call { .. } => NodeKind::NonTerminal(N::Call),
            ExprKind::Member { .. } => NodeKind::NonTerminal(N::Member),
            ExprKind::TupleIndex { .. } => NodeKind::NonTerminal(N::TupleIndex),
            ExprKind::Index { .. } => NodeKind::NonTerminal(N::Index),
            ExprKind::Function(_) => NodeKind::NonTerminal(N::Function),
            ExprKind::Block(_) => NodeKind::NonTerminal(N::BlockExpression),
            ExprKind::Async(_) => NodeKind::NonTerminal(N::Async),
            ExprKind::Safe(_) => NodeKind::NonTerminal(N::Safe),
            ExprKind::Lock { .. } => NodeKind::NonTerminal(N::Lock),
            ExprKind::Match { .. } => NodeKind::NonTerminal(N::Match),
        }
    }

    /// Assignments and increments never complete an enclosing body as its
    /// trailing value.
    pub fn is_assignment_like(&self) -> bool {
        matches!(self.kind, ExprKind::Assign { .. } | ExprKind::Update { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInit {
    pub name: String,
    pub value: Expr,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    /// Identifier, member, index, or tuple-index expression.
    Place(Box<Expr>),
    /// `(a, _, ..) = value`
    Pattern(Pattern),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub id: NodeId,
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionBody {
    Block(Block),
    Expr(Box<Expr>),
}

//=====================================================
//            Section 4: Patterns & Match Arms
//=====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Wildcard,
    Rest,
    Bind(String),
    Literal(Literal),
    Tuple(Vec<Pattern>),
    Array(Vec<Pattern>),
}

impl Pattern {
    /// Names bound by this pattern, in source order.
    pub fn bindings(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_bindings(&mut names);
        names
    }

    fn collect_bindings<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Pattern::Bind(name) => names.push(name),
            Pattern::Tuple(items) | Pattern::Array(items) => {
                for item in items {
                    item.collect_bindings(names);
                }
            }
            Pattern::Wildcard | Pattern::Rest | Pattern::Literal(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: ArmBody,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArmBody {
    Block(Block),
    Expr(Expr),
}

//=====================================================
//            Section 5: Statements & Blocks
//=====================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: NodeId,
    pub statements: Vec<Stmt>,
    pub position: Position,
}

impl Block {
    pub fn new(statements: Vec<Stmt>, position: Position) -> Self {
        Self {
            id: next_node_id(),
            statements,
            position,
        }
    }

    /// The trailing expression written without a semicolon, if any.
    pub fn tail(&self) -> Option<&Expr> {
        match self.statements.last() {
            Some(Stmt {
                kind:
                    StmtKind::Expression {
                        expr,
                        terminated: false,
                    },
                ..
            }) => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub id: NodeId,
    pub position: Position,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Declare {
        kind: BindingKind,
        declarators: Vec<Declarator>,
    },
    Function(Arc<FunctionDef>),
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        condition: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Block,
    },
    Each {
        item: String,
        index: Option<String>,
        iterable: Expr,
        body: Block,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Import {
        items: Vec<ImportItem>,
        module: String,
    },
    Export(Vec<String>),
    Namespace {
        name: String,
        body: Block,
    },
    Expression {
        expr: Expr,
        terminated: bool,
    },
}

impl Stmt {
    pub fn new(kind: StmtKind, position: Position) -> Self {
        Self {
            id: next_node_id(),
            position,
            kind,
        }
    }

    pub fn node_kind(&self) -> NodeKind {
        use NonTerminalKind as N;
        NodeKind::NonTerminal(match &self.kind {
            StmtKind::Declare { .. } => N::Declare,
            StmtKind::Function(_) => N::FunctionDeclare,
            StmtKind::If { .. } => N::If,
            StmtKind::While { .. } => N::While,
            StmtKind::DoWhile { .. } => N::DoWhile,
            StmtKind::For { .. } => N::For,
            StmtKind::Each { .. } => N::Each,
            StmtKind::Match { .. } => N::Match,
            StmtKind::Return(_) => N::Return,
            StmtKind::Break => N::Break,
            StmtKind::Continue => N::Continue,
            StmtKind::Import { .. } => N::Import,
            StmtKind::Export(_) => N::Export,
            StmtKind::Namespace { .. } => N::Namespace,
            StmtKind::Expression { .. } => N::ExpressionStatement,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub target: Pattern,
    pub value: Option<Expr>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportItem {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportItem {
    /// Name the import is bound to inside the importing module.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// One parsed module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Block,
}

impl Program {
    pub fn statements(&self) -> &[Stmt] {
        &self.body.statements
    }

    pub fn imports(&self) -> impl Iterator<Item = (&[ImportItem], &str, Position)> {
        self.body.statements.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Import { items, module } => {
                Some((items.as_slice(), module.as_str(), stmt.position))
            }
            _ => None,
        })
    }

    pub fn exports(&self) -> impl Iterator<Item = (&str, Position)> {
        self.body
            .statements
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::Export(names) => Some((names, stmt.position)),
                _ => None,
            })
            .flat_map(|(names, position)| names.iter().map(move |name| (name.as_str(), position)))
    }
}

/// A parsed module: its name and syntax tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    pub module: String,
    pub program: Program,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        printer::write_program(f, self)
    }
}

//=====================================================
// End of file
//=====================================================
