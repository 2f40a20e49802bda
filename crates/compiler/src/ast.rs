// Copyright (C) 2025 The Fore Project Authors. This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The abstract syntax tree produced by the parser and handed to downstream
//! tooling (interpreters, linters, code generators). Nodes are closed tagged
//! unions, immutable once built, with no cross-tree sharing: every subtree
//! has exactly one parent.

use std::fmt::Display;

use serde::Serialize;

/// Root of one compilation unit. Declaration order is source order and is
/// preserved; later passes rely on it (e.g. shadowing diagnostics).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub declarations: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Decl {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Enum(EnumDecl),
    Delegate(DelegateDecl),
    Event(EventDecl),
    /// A free function or procedure declared outside any class.
    Function(MethodDecl),
}

/// `Default` means the modifier was omitted in source; the builder never
/// rewrites it to another value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessModifier {
    Public,
    Private,
    Protected,
    Friend,
    ProtectedFriend,
    Default,
}

impl Display for AccessModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "Public"),
            Self::Private => write!(f, "Private"),
            Self::Protected => write!(f, "Protected"),
            Self::Friend => write!(f, "Friend"),
            Self::ProtectedFriend => write!(f, "Protected Friend"),
            Self::Default => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: String,
    pub access: AccessModifier,
    pub shared: bool,
    /// Base class and/or implemented interfaces, in source order. Whether
    /// more than one *class* appears here is left to a later semantic pass.
    pub bases: Vec<TypeRef>,
    pub body: ClassBody,
}

/// Class members grouped by category; each category keeps source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassBody {
    pub consts: Vec<ConstDecl>,
    pub fields: Vec<FieldDecl>,
    pub properties: Vec<PropertyDecl>,
    pub constructors: Vec<ConstructorDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassBody {
    pub fn is_empty(&self) -> bool {
        self.consts.is_empty()
            && self.fields.is_empty()
            && self.properties.is_empty()
            && self.constructors.is_empty()
            && self.methods.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub access: AccessModifier,
    pub parent: Option<TypeRef>,
    pub methods: Vec<MethodSig>,
    pub properties: Vec<PropertySig>,
}

/// Interface method signature; no body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSig {
    pub kind: CallableKind,
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeRef>,
}

/// Interface property signature; no accessor bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySig {
    pub name: String,
    pub params: Vec<Parameter>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDecl {
    pub name: String,
    pub access: AccessModifier,
    /// `(name, explicit value)` pairs; `None` where the source omitted the
    /// value. `resolved_values` applies the auto-increment rule.
    pub variants: Vec<(String, Option<i64>)>,
}

impl EnumDecl {
    /// Concrete value per variant: explicit where given, otherwise previous
    /// value plus one, starting at 0.
    pub fn resolved_values(&self) -> Vec<(String, i64)> {
        let mut next = 0;
        self.variants
            .iter()
            .map(|(name, explicit)| {
                let value = explicit.unwrap_or(next);
                next = value + 1;
                (name.clone(), value)
            })
            .collect()
    }
}

/// One field per declared name; `A, B: Integer` produces two of these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub access: AccessModifier,
    pub shared: bool,
    pub name: String,
    pub ty: TypeRef,
}

/// Class-level constant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstDecl {
    pub access: AccessModifier,
    pub name: String,
    pub value: Expr,
}

/// At least one of `getter`/`setter` is always present; the builder rejects
/// accessor-less properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDecl {
    pub access: AccessModifier,
    pub shared: bool,
    pub name: String,
    /// Indexer parameters; empty for a plain property.
    pub params: Vec<Parameter>,
    pub ty: TypeRef,
    pub getter: Option<MethodBody>,
    pub setter: Option<MethodBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructorDecl {
    pub access: AccessModifier,
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: MethodBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallableKind {
    Sub,
    Function,
}

impl Display for CallableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sub => write!(f, "Sub"),
            Self::Function => write!(f, "Function"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDecl {
    pub access: AccessModifier,
    pub shared: bool,
    pub kind: CallableKind,
    pub name: String,
    pub params: Vec<Parameter>,
    /// Absent for `Sub`.
    pub return_type: Option<TypeRef>,
    pub body: MethodBody,
}

/// Optional local `Const` and `Var` blocks, then the statement list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodBody {
    pub consts: Vec<(String, Expr)>,
    pub vars: Vec<VarDecl>,
    pub statements: Vec<Stmt>,
}

/// One local per declared name; names in a shared declaration all reference
/// the same type and the same default expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Expr>,
}

/// One parameter per declared name (same fan-out rule as fields).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    /// `Var` prefix: passed by reference.
    pub by_ref: bool,
    /// `ParamArray` prefix: collects trailing call-site arguments. Only
    /// legal on the last parameter.
    pub param_array: bool,
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegateDecl {
    pub name: String,
    pub access: AccessModifier,
    pub kind: CallableKind,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDecl {
    pub name: String,
    pub access: AccessModifier,
    /// The delegate type the event is bound to.
    pub delegate: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeRef {
    Base(String),
    Class(String),
    Interface(String),
    Array {
        element: Box<TypeRef>,
        /// Fixed size where declared, e.g. `Integer[8]`.
        size: Option<u64>,
    },
}

impl TypeRef {
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Base(n) | TypeRef::Class(n) | TypeRef::Interface(n) => n,
            TypeRef::Array { element, .. } => element.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub node: StmtNode,
    /// Position from the physical source code, 1-based.
    pub line_col: (usize, usize),
}

impl Stmt {
    pub fn new(node: StmtNode, line_col: (usize, usize)) -> Self {
        Stmt { node, line_col }
    }
}

/// One `If`/`Elseif` branch. Branches are evaluated in order by the
/// consumer, first true condition wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondArm {
    pub condition: Expr,
    pub statements: Vec<Stmt>,
}

/// One `Case` clause: ordered alternatives, first matching clause wins, no
/// fallthrough between clauses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseArm {
    pub alternatives: Vec<CaseAlternative>,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CaseAlternative {
    /// Equality match against a single value.
    Value(Expr),
    /// Inclusive `From To` containment match.
    Range { from: Expr, to: Expr },
}

/// A typed `Except On name: Type Do` handler arm. Arms are tested in
/// declared order against the runtime exception's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptArm {
    pub binding: String,
    pub ty: TypeRef,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtNode {
    Assign {
        target: Expr,
        value: Expr,
    },
    Return(Option<Expr>),
    If {
        arms: Vec<CondArm>,
        otherwise: Option<Vec<Stmt>>,
    },
    For {
        counter: String,
        init: Expr,
        to: Expr,
        /// `None` means the implicit step of integer 1.
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        binding: String,
        collection: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// `Repeat ... Until cond;` — body runs at least once.
    Repeat {
        body: Vec<Stmt>,
        condition: Expr,
    },
    With {
        subject: Expr,
        body: Vec<Stmt>,
    },
    Select {
        /// Evaluated exactly once by the consumer.
        selector: Expr,
        cases: Vec<CaseArm>,
        otherwise: Option<Vec<Stmt>>,
    },
    Try {
        body: Vec<Stmt>,
        /// Typed handlers, in declared order.
        excepts: Vec<ExceptArm>,
        /// The bare `Except` fallback; at most one, always last.
        catch_all: Option<Vec<Stmt>>,
        /// Run condition intentionally uninterpreted here; carried for
        /// lossless round-tripping.
        else_body: Option<Vec<Stmt>>,
        /// Runs unconditionally after the body or any handler, before any
        /// propagating exception continues.
        finally: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Raise(Option<Expr>),
    Dispose(Expr),
    /// Explicit invocation of a base-class member, `Inherited Create(..);`.
    Inherited(Option<Expr>),
    /// A bare expression in statement position, usually a call.
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Eq,
    NEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Add,
    Sub,
    Mul,
    Div,
    /// Integer division, `\`.
    IDiv,
    Mod,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::NEq => write!(f, "<>"),
            Self::Lt => write!(f, "<"),
            Self::LtE => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtE => write!(f, ">="),
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::IDiv => write!(f, "\\"),
            Self::Mod => write!(f, "Mod"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Neg => write!(f, "-"),
            Self::Not => write!(f, "Not"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Value(Literal),
    Id(String),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    /// `cond ? then : else`; a distinct eager expression, not sugar over If.
    Ternary {
        condition: Box<Expr>,
        consequence: Box<Expr>,
        alternative: Box<Expr>,
    },
    /// `expr As Type`.
    Cast {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    /// `expr Is Type`.
    TypeCheck {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        /// Ordered, possibly empty.
        args: Vec<Expr>,
    },
    /// `New Type(..)`.
    New {
        ty: TypeRef,
        args: Vec<Expr>,
    },
    /// The `Inherited` base reference; member access and calls chain onto it.
    Inherited,
}

impl Expr {
    pub fn mk_int(i: i64) -> Self {
        Expr::Value(Literal::Integer(i))
    }

    pub fn mk_str(s: &str) -> Self {
        Expr::Value(Literal::String(s.to_string()))
    }

    pub fn mk_id(name: &str) -> Self {
        Expr::Id(name.to_string())
    }
}
