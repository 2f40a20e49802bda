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

//! Kicks off the Pest parser and converts the parse tree into the Fore AST.
//! This is the main entry point for parsing.
//!
//! Every optional clause has its own grammar rule, so the transformer picks
//! children out of a production by rule kind, never by child position.

use std::cell::Cell;
use std::rc::Rc;

pub use pest::Parser as PestParser;
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use tracing::debug;

use crate::ast::{
    AccessModifier, BinaryOp, CallableKind, CaseAlternative, CaseArm, ClassBody, ClassDecl,
    CondArm, ConstDecl, ConstructorDecl, Decl, DelegateDecl, EnumDecl, EventDecl, ExceptArm, Expr,
    FieldDecl, InterfaceDecl, Literal, MethodBody, MethodDecl, MethodSig, Parameter, PropertyDecl,
    PropertySig, Stmt, StmtNode, TypeRef, UnaryOp, Unit, VarDecl,
};
use crate::errors::{CompileContext, CompileError};
use crate::lex::unquote_str;
use crate::parse::fore::{ForeParser, Rule};

pub mod fore {
    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "src/fore.pest"]
    pub struct ForeParser;
}

/// Bumped together with `fore.pest`; the grammar and the transformer are
/// versioned as a unit and never fork.
pub const GRAMMAR_VERSION: u32 = 1;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompileOptions {
    /// Bound on statement/expression nesting. Exceeding it aborts the parse
    /// with `CompileError::NestingTooDeep` instead of exhausting the stack.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { max_depth: 128 }
    }
}

/// Type names that always denote built-in scalar types.
const BASE_TYPE_NAMES: &[&str] = &["integer", "double", "string", "boolean", "char", "object"];

pub struct TreeTransformer {
    depth: Cell<usize>,
    options: CompileOptions,
}

impl TreeTransformer {
    pub fn new(options: CompileOptions) -> Rc<Self> {
        Rc::new(Self {
            depth: Cell::new(0),
            options,
        })
    }

    fn context(&self, pair: &Pair<Rule>) -> CompileContext {
        CompileContext::new(pair.line_col())
    }

    fn descend(&self, context: CompileContext) -> Result<(), CompileError> {
        let depth = self.depth.get() + 1;
        if depth > self.options.max_depth {
            return Err(CompileError::NestingTooDeep {
                context,
                max_depth: self.options.max_depth,
            });
        }
        self.depth.set(depth);
        Ok(())
    }

    fn ascend(&self) {
        self.depth.set(self.depth.get() - 1);
    }

    fn build_error(
        &self,
        pair: &Pair<Rule>,
        node_kind: &'static str,
        rule: impl Into<String>,
    ) -> CompileError {
        CompileError::SemanticBuildError {
            context: self.context(pair),
            node_kind,
            rule: rule.into(),
        }
    }

    // === Modifiers and names ===

    fn parse_access(&self, pair: Pair<Rule>) -> AccessModifier {
        let Some(inner) = pair.into_inner().next() else {
            unreachable!("access_modifier without alternative")
        };
        match inner.as_rule() {
            Rule::protected_friend => AccessModifier::ProtectedFriend,
            Rule::public_mod => AccessModifier::Public,
            Rule::private_mod => AccessModifier::Private,
            Rule::protected_mod => AccessModifier::Protected,
            Rule::friend_mod => AccessModifier::Friend,
            _ => unreachable!("unexpected access modifier: {:?}", inner.as_rule()),
        }
    }

    /// Declarations are bracketed (`Class Foo; ... End Class Foo;`); the
    /// closing name must agree with the opening one.
    fn check_end_label(
        &self,
        pair: &Pair<Rule>,
        node_kind: &'static str,
        names: &[&str],
    ) -> Result<(), CompileError> {
        if names.len() >= 2 {
            let (open, close) = (names[0], names[names.len() - 1]);
            if !open.eq_ignore_ascii_case(close) {
                return Err(self.build_error(
                    pair,
                    node_kind,
                    format!("end label `{close}` does not match declaration name `{open}`"),
                ));
            }
        }
        Ok(())
    }

    // === Types ===

    fn classify_type_name(name: &str) -> TypeRef {
        let lowered = name.to_ascii_lowercase();
        if BASE_TYPE_NAMES.contains(&lowered.as_str()) {
            return TypeRef::Base(name.to_string());
        }
        let mut chars = name.chars();
        if chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase()) {
            return TypeRef::Interface(name.to_string());
        }
        TypeRef::Class(name.to_string())
    }

    fn parse_type(&self, pair: Pair<Rule>) -> Result<TypeRef, CompileError> {
        let context = self.context(&pair);
        let mut ty = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::ident => {
                    ty = Some(Self::classify_type_name(child.as_str()));
                }
                Rule::array_suffix => {
                    let size = match child.into_inner().next() {
                        Some(size_pair) => Some(size_pair.as_str().parse::<u64>().map_err(
                            |e| {
                                CompileError::LexError(
                                    context,
                                    format!("invalid array size literal: {e}"),
                                )
                            },
                        )?),
                        None => None,
                    };
                    let element = ty.take().unwrap_or_else(|| {
                        unreachable!("array suffix before element type")
                    });
                    ty = Some(TypeRef::Array {
                        element: Box::new(element),
                        size,
                    });
                }
                _ => unreachable!("unexpected type child: {:?}", child.as_rule()),
            }
        }
        match ty {
            Some(ty) => Ok(ty),
            None => unreachable!("type reference without a name"),
        }
    }

    // === Expressions ===

    /// Literals and identifiers shared between expression primaries and
    /// `Case` alternative values.
    fn parse_atom(self: Rc<Self>, pair: Pair<Rule>) -> Result<Expr, CompileError> {
        match pair.as_rule() {
            Rule::ident => Ok(Expr::Id(pair.as_str().to_string())),
            Rule::string => {
                let parsed = unquote_str(pair.as_str()).map_err(|e| {
                    CompileError::LexError(
                        self.context(&pair),
                        format!("invalid string literal '{}': {e}", pair.as_str()),
                    )
                })?;
                Ok(Expr::Value(Literal::String(parsed)))
            }
            Rule::integer => match pair.as_str().parse::<i64>() {
                Ok(int) => Ok(Expr::Value(Literal::Integer(int))),
                Err(e) => Err(CompileError::LexError(
                    self.context(&pair),
                    format!("invalid integer literal '{}': {e}", pair.as_str()),
                )),
            },
            Rule::float => match pair.as_str().parse::<f64>() {
                Ok(f) => Ok(Expr::Value(Literal::Double(f))),
                Err(e) => Err(CompileError::LexError(
                    self.context(&pair),
                    format!("invalid double literal '{}': {e}", pair.as_str()),
                )),
            },
            Rule::boolean => Ok(Expr::Value(Literal::Boolean(
                pair.as_str().eq_ignore_ascii_case("true"),
            ))),
            Rule::null_lit => Ok(Expr::Value(Literal::Null)),
            _ => panic!("Unimplemented atom: {:?}", pair),
        }
    }

    fn parse_arglist(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<Expr>, CompileError> {
        // call_args wraps an optional arglist.
        let Some(arglist) = pair.into_inner().next() else {
            return Ok(vec![]);
        };
        let mut args = vec![];
        for arg in arglist.into_inner() {
            match arg.as_rule() {
                Rule::expression => args.push(self.clone().parse_expr(arg.into_inner())?),
                _ => panic!("Unimplemented arglist entry: {:?}", arg),
            }
        }
        Ok(args)
    }

    fn parse_expr(self: Rc<Self>, pairs: Pairs<Rule>) -> Result<Expr, CompileError> {
        let context = pairs
            .peek()
            .map(|p| CompileContext::new(p.line_col()))
            .unwrap_or(CompileContext::new((0, 0)));
        self.descend(context)?;

        let pratt = PrattParser::new()
            // Precedence from loosest to tightest binding.
            // The ternary form is a distinct production below everything.
            .op(Op::postfix(Rule::cond_suffix))
            // `As`/`Is` apply to an already-reduced comparison result.
            .op(Op::postfix(Rule::cast_suffix) | Op::postfix(Rule::check_suffix))
            // Comparison operators.
            .op(Op::infix(Rule::eq, Assoc::Left)
                | Op::infix(Rule::neq, Assoc::Left)
                | Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::lte, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::gte, Assoc::Left))
            // Additive.
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            // Multiplicative.
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::idiv, Assoc::Left)
                | Op::infix(Rule::modulus, Assoc::Left))
            // Unary prefix.
            .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not))
            // Member/index/call suffixes bind tightest.
            .op(Op::postfix(Rule::member_access)
                | Op::postfix(Rule::index_access)
                | Op::postfix(Rule::call_args));

        let primary_self = self.clone();
        let postfix_self = self.clone();

        let result = pratt
            .map_primary(|primary| match primary.as_rule() {
                Rule::paren_expr => {
                    let Some(inner) = primary.into_inner().next() else {
                        unreachable!("empty parenthesized expression")
                    };
                    primary_self.clone().parse_expr(inner.into_inner())
                }
                Rule::new_expr => {
                    let mut ty = None;
                    let mut args = vec![];
                    for child in primary.into_inner() {
                        match child.as_rule() {
                            Rule::type_ref => ty = Some(primary_self.parse_type(child)?),
                            Rule::call_args => {
                                args = primary_self.clone().parse_arglist(child)?;
                            }
                            _ => {}
                        }
                    }
                    let Some(ty) = ty else {
                        unreachable!("New without a type")
                    };
                    Ok(Expr::New { ty, args })
                }
                Rule::inherited_ref => Ok(Expr::Inherited),
                _ => primary_self.clone().parse_atom(primary),
            })
            .map_prefix(|op, rhs| {
                let rhs = Box::new(rhs?);
                match op.as_rule() {
                    Rule::neg => Ok(Expr::Unary(UnaryOp::Neg, rhs)),
                    Rule::not => Ok(Expr::Unary(UnaryOp::Not, rhs)),
                    _ => panic!("Unimplemented prefix: {:?}", op),
                }
            })
            .map_infix(|lhs, op, rhs| {
                let operator = match op.as_rule() {
                    Rule::eq => BinaryOp::Eq,
                    Rule::neq => BinaryOp::NEq,
                    Rule::lt => BinaryOp::Lt,
                    Rule::lte => BinaryOp::LtE,
                    Rule::gt => BinaryOp::Gt,
                    Rule::gte => BinaryOp::GtE,
                    Rule::add => BinaryOp::Add,
                    Rule::sub => BinaryOp::Sub,
                    Rule::mul => BinaryOp::Mul,
                    Rule::div => BinaryOp::Div,
                    Rule::idiv => BinaryOp::IDiv,
                    Rule::modulus => BinaryOp::Mod,
                    _ => panic!("Unimplemented infix: {:?}", op),
                };
                Ok(Expr::Binary(operator, Box::new(lhs?), Box::new(rhs?)))
            })
            .map_postfix(|lhs, op| {
                let lhs = lhs?;
                match op.as_rule() {
                    Rule::member_access => {
                        let Some(name) = op.into_inner().next() else {
                            unreachable!("member access without a name")
                        };
                        Ok(Expr::Member {
                            object: Box::new(lhs),
                            name: name.as_str().to_string(),
                        })
                    }
                    Rule::index_access => {
                        let Some(index) = op.into_inner().next() else {
                            unreachable!("index access without an index")
                        };
                        Ok(Expr::Index {
                            object: Box::new(lhs),
                            index: Box::new(postfix_self.clone().parse_expr(index.into_inner())?),
                        })
                    }
                    Rule::call_args => Ok(Expr::Call {
                        callee: Box::new(lhs),
                        args: postfix_self.clone().parse_arglist(op)?,
                    }),
                    Rule::cast_suffix => {
                        let mut ty = None;
                        for child in op.into_inner() {
                            if child.as_rule() == Rule::type_ref {
                                ty = Some(postfix_self.parse_type(child)?);
                            }
                        }
                        let Some(ty) = ty else {
                            unreachable!("As without a type")
                        };
                        Ok(Expr::Cast {
                            expr: Box::new(lhs),
                            ty,
                        })
                    }
                    Rule::check_suffix => {
                        let mut ty = None;
                        for child in op.into_inner() {
                            if child.as_rule() == Rule::type_ref {
                                ty = Some(postfix_self.parse_type(child)?);
                            }
                        }
                        let Some(ty) = ty else {
                            unreachable!("Is without a type")
                        };
                        Ok(Expr::TypeCheck {
                            expr: Box::new(lhs),
                            ty,
                        })
                    }
                    Rule::cond_suffix => {
                        let mut branches = op.into_inner().filter(|p| p.as_rule() == Rule::expression);
                        let (Some(consequence), Some(alternative)) =
                            (branches.next(), branches.next())
                        else {
                            unreachable!("ternary without both branches")
                        };
                        Ok(Expr::Ternary {
                            condition: Box::new(lhs),
                            consequence: Box::new(
                                postfix_self.clone().parse_expr(consequence.into_inner())?,
                            ),
                            alternative: Box::new(
                                postfix_self.clone().parse_expr(alternative.into_inner())?,
                            ),
                        })
                    }
                    _ => panic!("Unimplemented postfix: {:?}", op),
                }
            })
            .parse(pairs);

        self.ascend();
        result
    }

    // === Statements ===

    fn parse_statements(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = vec![];
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::statement => {
                    let Some(inner) = child.into_inner().next() else {
                        unreachable!("empty statement")
                    };
                    statements.push(self.clone().parse_statement(inner)?);
                }
                _ => panic!("Unexpected rule in statements: {:?}", child.as_rule()),
            }
        }
        Ok(statements)
    }

    fn parse_statement(self: Rc<Self>, pair: Pair<Rule>) -> Result<Stmt, CompileError> {
        let line_col = pair.line_col();
        let context = CompileContext::new(line_col);
        self.descend(context)?;
        let node = self.clone().parse_statement_node(pair);
        self.ascend();
        Ok(Stmt::new(node?, line_col))
    }

    fn parse_statement_node(self: Rc<Self>, pair: Pair<Rule>) -> Result<StmtNode, CompileError> {
        match pair.as_rule() {
            Rule::assignment_statement => {
                let mut exprs = vec![];
                for child in pair.into_inner() {
                    if child.as_rule() == Rule::expression {
                        exprs.push(self.clone().parse_expr(child.into_inner())?);
                    }
                }
                let (Some(value), Some(target)) = (exprs.pop(), exprs.pop()) else {
                    unreachable!("assignment without both sides")
                };
                Ok(StmtNode::Assign { target, value })
            }
            Rule::expr_statement => {
                let mut expr = None;
                for child in pair.into_inner() {
                    if child.as_rule() == Rule::expression {
                        expr = Some(self.clone().parse_expr(child.into_inner())?);
                    }
                }
                let Some(expr) = expr else {
                    unreachable!("expression statement without expression")
                };
                Ok(StmtNode::Expr(expr))
            }
            Rule::return_statement => {
                let mut expr = None;
                for child in pair.into_inner() {
                    if child.as_rule() == Rule::expression {
                        expr = Some(self.clone().parse_expr(child.into_inner())?);
                    }
                }
                Ok(StmtNode::Return(expr))
            }
            Rule::break_statement => Ok(StmtNode::Break),
            Rule::continue_statement => Ok(StmtNode::Continue),
            Rule::raise_statement => {
                let mut expr = None;
                for child in pair.into_inner() {
                    if child.as_rule() == Rule::expression {
                        expr = Some(self.clone().parse_expr(child.into_inner())?);
                    }
                }
                Ok(StmtNode::Raise(expr))
            }
            Rule::dispose_statement => {
                let mut expr = None;
                for child in pair.into_inner() {
                    if child.as_rule() == Rule::expression {
                        expr = Some(self.clone().parse_expr(child.into_inner())?);
                    }
                }
                let Some(expr) = expr else {
                    unreachable!("Dispose without expression")
                };
                Ok(StmtNode::Dispose(expr))
            }
            Rule::inherited_statement => {
                let mut call = None;
                for child in pair.into_inner() {
                    if child.as_rule() == Rule::expression {
                        call = Some(self.clone().parse_expr(child.into_inner())?);
                    }
                }
                Ok(StmtNode::Inherited(call))
            }
            Rule::if_statement => {
                let mut first_condition = None;
                let mut first_body = None;
                let mut arms = vec![];
                let mut otherwise = None;
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::expression => {
                            first_condition = Some(self.clone().parse_expr(child.into_inner())?);
                        }
                        Rule::statements => {
                            first_body = Some(self.clone().parse_statements(child)?);
                        }
                        Rule::elseif_clause => {
                            let mut condition = None;
                            let mut body = None;
                            for part in child.into_inner() {
                                match part.as_rule() {
                                    Rule::expression => {
                                        condition =
                                            Some(self.clone().parse_expr(part.into_inner())?);
                                    }
                                    Rule::statements => {
                                        body = Some(self.clone().parse_statements(part)?);
                                    }
                                    _ => {}
                                }
                            }
                            let (Some(condition), Some(body)) = (condition, body) else {
                                unreachable!("elseif clause missing condition or body")
                            };
                            arms.push(CondArm {
                                condition,
                                statements: body,
                            });
                        }
                        Rule::else_clause => {
                            for part in child.into_inner() {
                                if part.as_rule() == Rule::statements {
                                    otherwise = Some(self.clone().parse_statements(part)?);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                let (Some(condition), Some(statements)) = (first_condition, first_body) else {
                    unreachable!("if statement missing condition or body")
                };
                arms.insert(
                    0,
                    CondArm {
                        condition,
                        statements,
                    },
                );
                Ok(StmtNode::If { arms, otherwise })
            }
            Rule::for_statement => {
                let error_pair = pair.clone();
                let mut counter = None;
                let mut bounds = vec![];
                let mut step = None;
                let mut body = None;
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::ident => counter = Some(child.as_str().to_string()),
                        Rule::expression => {
                            bounds.push(self.clone().parse_expr(child.into_inner())?);
                        }
                        Rule::step_clause => {
                            for part in child.into_inner() {
                                if part.as_rule() == Rule::expression {
                                    step = Some(self.clone().parse_expr(part.into_inner())?);
                                }
                            }
                        }
                        Rule::statements => body = Some(self.clone().parse_statements(child)?),
                        _ => {}
                    }
                }
                if let Some(step) = &step
                    && is_zero_literal(step)
                {
                    return Err(self.build_error(&error_pair, "For", "Step must not be zero"));
                }
                let (Some(counter), Some(to), Some(init), Some(body)) =
                    (counter, bounds.pop(), bounds.pop(), body)
                else {
                    unreachable!("for statement missing counter, bounds or body")
                };
                Ok(StmtNode::For {
                    counter,
                    init,
                    to,
                    step,
                    body,
                })
            }
            Rule::foreach_statement => {
                let mut binding = None;
                let mut collection = None;
                let mut body = None;
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::ident => binding = Some(child.as_str().to_string()),
                        Rule::expression => {
                            collection = Some(self.clone().parse_expr(child.into_inner())?);
                        }
                        Rule::statements => body = Some(self.clone().parse_statements(child)?),
                        _ => {}
                    }
                }
                let (Some(binding), Some(collection), Some(body)) = (binding, collection, body)
                else {
                    unreachable!("foreach statement missing binding, collection or body")
                };
                Ok(StmtNode::Foreach {
                    binding,
                    collection,
                    body,
                })
            }
            Rule::while_statement => {
                let mut condition = None;
                let mut body = None;
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::expression => {
                            condition = Some(self.clone().parse_expr(child.into_inner())?);
                        }
                        Rule::statements => body = Some(self.clone().parse_statements(child)?),
                        _ => {}
                    }
                }
                let (Some(condition), Some(body)) = (condition, body) else {
                    unreachable!("while statement missing condition or body")
                };
                Ok(StmtNode::While { condition, body })
            }
            Rule::repeat_statement => {
                let mut condition = None;
                let mut body = None;
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::expression => {
                            condition = Some(self.clone().parse_expr(child.into_inner())?);
                        }
                        Rule::statements => body = Some(self.clone().parse_statements(child)?),
                        _ => {}
                    }
                }
                let (Some(condition), Some(body)) = (condition, body) else {
                    unreachable!("repeat statement missing condition or body")
                };
                Ok(StmtNode::Repeat { body, condition })
            }
            Rule::with_statement => {
                let mut subject = None;
                let mut body = None;
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::expression => {
                            subject = Some(self.clone().parse_expr(child.into_inner())?);
                        }
                        Rule::statements => body = Some(self.clone().parse_statements(child)?),
                        _ => {}
                    }
                }
                let (Some(subject), Some(body)) = (subject, body) else {
                    unreachable!("with statement missing subject or body")
                };
                Ok(StmtNode::With { subject, body })
            }
            Rule::select_statement => self.parse_select(pair),
            Rule::try_statement => self.parse_try(pair),
            _ => panic!("Unimplemented statement: {:?}", pair.as_rule()),
        }
    }

    fn parse_select(self: Rc<Self>, pair: Pair<Rule>) -> Result<StmtNode, CompileError> {
        let error_pair = pair.clone();
        let mut selector = None;
        let mut cases = vec![];
        let mut otherwise = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::expression => {
                    selector = Some(self.clone().parse_expr(child.into_inner())?);
                }
                Rule::case_clause => {
                    if otherwise.is_some() {
                        return Err(self.build_error(
                            &error_pair,
                            "Select",
                            "Else clause must be the last clause",
                        ));
                    }
                    cases.push(self.clone().parse_case_clause(child)?);
                }
                Rule::select_else_clause => {
                    if otherwise.is_some() {
                        return Err(self.build_error(
                            &error_pair,
                            "Select",
                            "at most one Else clause is allowed",
                        ));
                    }
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::statements {
                            otherwise = Some(self.clone().parse_statements(part)?);
                        }
                    }
                }
                _ => {}
            }
        }
        let Some(selector) = selector else {
            unreachable!("select without selector")
        };
        Ok(StmtNode::Select {
            selector,
            cases,
            otherwise,
        })
    }

    fn parse_case_clause(self: Rc<Self>, pair: Pair<Rule>) -> Result<CaseArm, CompileError> {
        let mut alternatives = vec![];
        let mut statements = vec![];
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::case_alternatives => {
                    for alternative in child.into_inner() {
                        let Some(inner) = alternative.into_inner().next() else {
                            unreachable!("empty case alternative")
                        };
                        match inner.as_rule() {
                            Rule::case_range => {
                                let mut ends = vec![];
                                for value in inner.into_inner() {
                                    if value.as_rule() == Rule::case_value {
                                        ends.push(self.clone().parse_case_value(value)?);
                                    }
                                }
                                let (Some(to), Some(from)) = (ends.pop(), ends.pop()) else {
                                    unreachable!("case range without both bounds")
                                };
                                alternatives.push(CaseAlternative::Range { from, to });
                            }
                            Rule::case_value => {
                                alternatives
                                    .push(CaseAlternative::Value(self.clone().parse_case_value(inner)?));
                            }
                            _ => unreachable!("unexpected case alternative: {:?}", inner.as_rule()),
                        }
                    }
                }
                Rule::statements => statements = self.clone().parse_statements(child)?,
                _ => {}
            }
        }
        Ok(CaseArm {
            alternatives,
            statements,
        })
    }

    fn parse_case_value(self: Rc<Self>, pair: Pair<Rule>) -> Result<Expr, CompileError> {
        let Some(inner) = pair.into_inner().next() else {
            unreachable!("empty case value")
        };
        self.parse_atom(inner)
    }

    fn parse_try(self: Rc<Self>, pair: Pair<Rule>) -> Result<StmtNode, CompileError> {
        let error_pair = pair.clone();
        let mut body = None;
        let mut excepts = vec![];
        let mut catch_all = None;
        let mut else_body = None;
        let mut finally = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::statements => body = Some(self.clone().parse_statements(child)?),
                Rule::except_on_clause => {
                    if catch_all.is_some() {
                        return Err(self.build_error(
                            &error_pair,
                            "Try",
                            "a bare Except must be the last except clause",
                        ));
                    }
                    let mut binding = None;
                    let mut ty = None;
                    let mut statements = None;
                    for part in child.into_inner() {
                        match part.as_rule() {
                            Rule::ident => binding = Some(part.as_str().to_string()),
                            Rule::type_ref => ty = Some(self.parse_type(part)?),
                            Rule::statements => {
                                statements = Some(self.clone().parse_statements(part)?);
                            }
                            _ => {}
                        }
                    }
                    let (Some(binding), Some(ty), Some(statements)) = (binding, ty, statements)
                    else {
                        unreachable!("except-on clause missing binding, type or body")
                    };
                    excepts.push(ExceptArm {
                        binding,
                        ty,
                        statements,
                    });
                }
                Rule::except_any_clause => {
                    if catch_all.is_some() {
                        return Err(self.build_error(
                            &error_pair,
                            "Try",
                            "at most one bare Except clause is allowed",
                        ));
                    }
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::statements {
                            catch_all = Some(self.clone().parse_statements(part)?);
                        }
                    }
                }
                Rule::try_else_clause => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::statements {
                            else_body = Some(self.clone().parse_statements(part)?);
                        }
                    }
                }
                Rule::finally_clause => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::statements {
                            finally = Some(self.clone().parse_statements(part)?);
                        }
                    }
                }
                _ => {}
            }
        }
        let Some(body) = body else {
            unreachable!("try without body")
        };
        Ok(StmtNode::Try {
            body,
            excepts,
            catch_all,
            else_body,
            finally,
        })
    }

    // === Parameters and bodies ===

    fn parse_param_group(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<Parameter>, CompileError> {
        let mut params = vec![];
        for child in pair.into_inner() {
            if child.as_rule() == Rule::param_list {
                for parameter in child.into_inner() {
                    if parameter.as_rule() == Rule::parameter {
                        params.extend(self.clone().parse_parameter(parameter)?);
                    }
                }
            }
        }
        Ok(params)
    }

    /// `a, b: Integer = 3` fans out one node per name; the names share the
    /// type and the very same default expression (evaluated downstream once
    /// per instantiation site, not once per name).
    fn parse_parameter(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<Parameter>, CompileError> {
        let mut by_ref = false;
        let mut param_array = false;
        let mut names = vec![];
        let mut ty = None;
        let mut default = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::var_mod => by_ref = true,
                Rule::paramarray_mod => param_array = true,
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::type_ref => ty = Some(self.parse_type(child)?),
                Rule::param_default => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::expression {
                            default = Some(self.clone().parse_expr(part.into_inner())?);
                        }
                    }
                }
                _ => {}
            }
        }
        let Some(ty) = ty else {
            unreachable!("parameter without a type")
        };
        Ok(names
            .into_iter()
            .map(|name| Parameter {
                by_ref,
                param_array,
                name,
                ty: ty.clone(),
                default: default.clone(),
            })
            .collect())
    }

    /// Shape rules the grammar cannot express: ParamArray only on the last
    /// parameter, and no required parameter after a defaulted one.
    fn validate_params(
        &self,
        pair: &Pair<Rule>,
        node_kind: &'static str,
        params: &[Parameter],
    ) -> Result<(), CompileError> {
        let mut seen_default = false;
        for (i, param) in params.iter().enumerate() {
            if param.param_array && i + 1 != params.len() {
                return Err(self.build_error(
                    pair,
                    node_kind,
                    format!("ParamArray parameter `{}` must be last", param.name),
                ));
            }
            if param.default.is_some() {
                seen_default = true;
            } else if seen_default && !param.param_array {
                return Err(self.build_error(
                    pair,
                    node_kind,
                    format!(
                        "parameter `{}` without a default follows a defaulted parameter",
                        param.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn parse_method_body(self: Rc<Self>, pair: Pair<Rule>) -> Result<MethodBody, CompileError> {
        let mut consts = vec![];
        let mut vars = vec![];
        let mut statements = vec![];
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::method_const_block => {
                    for decl in child.into_inner() {
                        if decl.as_rule() == Rule::const_decl {
                            let (name, value) = self.clone().parse_const_decl(decl)?;
                            consts.push((name, value));
                        }
                    }
                }
                Rule::var_block => {
                    for decl in child.into_inner() {
                        if decl.as_rule() == Rule::var_decl {
                            vars.extend(self.clone().parse_var_decl(decl)?);
                        }
                    }
                }
                Rule::statements => statements = self.clone().parse_statements(child)?,
                _ => {}
            }
        }
        Ok(MethodBody {
            consts,
            vars,
            statements,
        })
    }

    fn parse_const_decl(self: Rc<Self>, pair: Pair<Rule>) -> Result<(String, Expr), CompileError> {
        let mut name = None;
        let mut value = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::ident => name = Some(child.as_str().to_string()),
                Rule::expression => value = Some(self.clone().parse_expr(child.into_inner())?),
                _ => {}
            }
        }
        let (Some(name), Some(value)) = (name, value) else {
            unreachable!("const declaration missing name or value")
        };
        Ok((name, value))
    }

    fn parse_var_decl(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<VarDecl>, CompileError> {
        let mut names = vec![];
        let mut ty = None;
        let mut default = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::type_ref => ty = Some(self.parse_type(child)?),
                Rule::var_default => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::expression {
                            default = Some(self.clone().parse_expr(part.into_inner())?);
                        }
                    }
                }
                _ => {}
            }
        }
        let Some(ty) = ty else {
            unreachable!("var declaration without a type")
        };
        Ok(names
            .into_iter()
            .map(|name| VarDecl {
                name,
                ty: ty.clone(),
                default: default.clone(),
            })
            .collect())
    }

    // === Declarations ===

    fn parse_callable_kind(pair: Pair<Rule>) -> CallableKind {
        if pair.as_str().eq_ignore_ascii_case("sub") {
            CallableKind::Sub
        } else {
            CallableKind::Function
        }
    }

    fn parse_method(self: Rc<Self>, pair: Pair<Rule>) -> Result<MethodDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut shared = false;
        let mut kinds = vec![];
        let mut names = vec![];
        let mut params = vec![];
        let mut return_type = None;
        let mut body = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::shared_mod => shared = true,
                Rule::callable_kind => kinds.push(Self::parse_callable_kind(child)),
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::param_group => params = self.clone().parse_param_group(child)?,
                Rule::return_clause => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::type_ref {
                            return_type = Some(self.parse_type(part)?);
                        }
                    }
                }
                Rule::method_body => body = Some(self.clone().parse_method_body(child)?),
                _ => {}
            }
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.check_end_label(&error_pair, "Method", &name_refs)?;
        let (Some(&kind), Some(name), Some(body)) = (kinds.first(), names.into_iter().next(), body)
        else {
            unreachable!("method declaration missing kind, name or body")
        };
        if kinds.len() >= 2 && kinds[0] != kinds[1] {
            return Err(self.build_error(
                &error_pair,
                "Method",
                format!("`End {}` does not close a {}", kinds[1], kinds[0]),
            ));
        }
        match kind {
            CallableKind::Sub if return_type.is_some() => {
                return Err(self.build_error(&error_pair, "Method", "a Sub has no return type"));
            }
            CallableKind::Function if return_type.is_none() => {
                return Err(self.build_error(
                    &error_pair,
                    "Method",
                    "a Function requires a return type",
                ));
            }
            _ => {}
        }
        self.validate_params(&error_pair, "Method", &params)?;
        Ok(MethodDecl {
            access,
            shared,
            kind,
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_constructor(
        self: Rc<Self>,
        pair: Pair<Rule>,
    ) -> Result<ConstructorDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut names = vec![];
        let mut params = vec![];
        let mut body = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::param_group => params = self.clone().parse_param_group(child)?,
                Rule::method_body => body = Some(self.clone().parse_method_body(child)?),
                _ => {}
            }
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.check_end_label(&error_pair, "Constructor", &name_refs)?;
        let (Some(name), Some(body)) = (names.into_iter().next(), body) else {
            unreachable!("constructor missing name or body")
        };
        self.validate_params(&error_pair, "Constructor", &params)?;
        Ok(ConstructorDecl {
            access,
            name,
            params,
            body,
        })
    }

    fn parse_property(self: Rc<Self>, pair: Pair<Rule>) -> Result<PropertyDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut shared = false;
        let mut names = vec![];
        let mut params = vec![];
        let mut ty = None;
        let mut getter = None;
        let mut setter = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::shared_mod => shared = true,
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::indexer => params = self.clone().parse_param_group(child)?,
                Rule::type_ref => ty = Some(self.parse_type(child)?),
                Rule::property_get => {
                    if getter.is_some() {
                        return Err(self.build_error(
                            &error_pair,
                            "Property",
                            "at most one Get accessor is allowed",
                        ));
                    }
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::method_body {
                            getter = Some(self.clone().parse_method_body(part)?);
                        }
                    }
                }
                Rule::property_set => {
                    if setter.is_some() {
                        return Err(self.build_error(
                            &error_pair,
                            "Property",
                            "at most one Set accessor is allowed",
                        ));
                    }
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::method_body {
                            setter = Some(self.clone().parse_method_body(part)?);
                        }
                    }
                }
                _ => {}
            }
        }
        if getter.is_none() && setter.is_none() {
            return Err(self.build_error(
                &error_pair,
                "Property",
                "a property requires at least one Get or Set accessor",
            ));
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.check_end_label(&error_pair, "Property", &name_refs)?;
        let (Some(name), Some(ty)) = (names.into_iter().next(), ty) else {
            unreachable!("property missing name or type")
        };
        self.validate_params(&error_pair, "Property", &params)?;
        Ok(PropertyDecl {
            access,
            shared,
            name,
            params,
            ty,
            getter,
            setter,
        })
    }

    /// One field per declared name; all share the type reference.
    fn parse_field(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<FieldDecl>, CompileError> {
        let mut access = AccessModifier::Default;
        let mut shared = false;
        let mut names = vec![];
        let mut ty = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::shared_mod => shared = true,
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::type_ref => ty = Some(self.parse_type(child)?),
                _ => {}
            }
        }
        let Some(ty) = ty else {
            unreachable!("field declaration without a type")
        };
        Ok(names
            .into_iter()
            .map(|name| FieldDecl {
                access,
                shared,
                name,
                ty: ty.clone(),
            })
            .collect())
    }

    fn parse_const_block(self: Rc<Self>, pair: Pair<Rule>) -> Result<Vec<ConstDecl>, CompileError> {
        let mut access = AccessModifier::Default;
        let mut consts = vec![];
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::const_decl => {
                    let (name, value) = self.clone().parse_const_decl(child)?;
                    consts.push(ConstDecl {
                        access,
                        name,
                        value,
                    });
                }
                _ => {}
            }
        }
        Ok(consts)
    }

    fn parse_class(self: Rc<Self>, pair: Pair<Rule>) -> Result<ClassDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut shared = false;
        let mut names = vec![];
        let mut bases = vec![];
        let mut body = ClassBody::default();
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::shared_mod => shared = true,
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::base_list => {
                    for base in child.into_inner() {
                        if base.as_rule() == Rule::type_ref {
                            bases.push(self.parse_type(base)?);
                        }
                    }
                }
                Rule::class_body => body = self.clone().parse_class_body(child)?,
                _ => {}
            }
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.check_end_label(&error_pair, "Class", &name_refs)?;
        let Some(name) = names.into_iter().next() else {
            unreachable!("class without a name")
        };
        Ok(ClassDecl {
            name,
            access,
            shared,
            bases,
            body,
        })
    }

    fn parse_class_body(self: Rc<Self>, pair: Pair<Rule>) -> Result<ClassBody, CompileError> {
        let mut body = ClassBody::default();
        for member in pair.into_inner() {
            let Rule::class_member = member.as_rule() else {
                panic!("Unexpected rule in class body: {:?}", member.as_rule());
            };
            let Some(inner) = member.into_inner().next() else {
                unreachable!("empty class member")
            };
            match inner.as_rule() {
                Rule::constructor_decl => {
                    body.constructors.push(self.clone().parse_constructor(inner)?);
                }
                Rule::property_decl => body.properties.push(self.clone().parse_property(inner)?),
                Rule::method_decl => body.methods.push(self.clone().parse_method(inner)?),
                Rule::const_block => body.consts.extend(self.clone().parse_const_block(inner)?),
                Rule::field_decl => body.fields.extend(self.clone().parse_field(inner)?),
                _ => panic!("Unimplemented class member: {:?}", inner.as_rule()),
            }
        }
        Ok(body)
    }

    fn parse_interface(self: Rc<Self>, pair: Pair<Rule>) -> Result<InterfaceDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut names = vec![];
        let mut parent = None;
        let mut methods = vec![];
        let mut properties = vec![];
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::parent_clause => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::type_ref {
                            parent = Some(self.parse_type(part)?);
                        }
                    }
                }
                Rule::interface_member => {
                    let Some(inner) = child.into_inner().next() else {
                        unreachable!("empty interface member")
                    };
                    match inner.as_rule() {
                        Rule::interface_method_sig => {
                            methods.push(self.clone().parse_method_sig(inner)?);
                        }
                        Rule::interface_property_sig => {
                            properties.push(self.clone().parse_property_sig(inner)?);
                        }
                        _ => {
                            panic!("Unimplemented interface member: {:?}", inner.as_rule())
                        }
                    }
                }
                _ => {}
            }
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.check_end_label(&error_pair, "Interface", &name_refs)?;
        let Some(name) = names.into_iter().next() else {
            unreachable!("interface without a name")
        };
        Ok(InterfaceDecl {
            name,
            access,
            parent,
            methods,
            properties,
        })
    }

    fn parse_method_sig(self: Rc<Self>, pair: Pair<Rule>) -> Result<MethodSig, CompileError> {
        let error_pair = pair.clone();
        let mut kind = None;
        let mut name = None;
        let mut params = vec![];
        let mut return_type = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::callable_kind => kind = Some(Self::parse_callable_kind(child)),
                Rule::ident => name = Some(child.as_str().to_string()),
                Rule::param_group => params = self.clone().parse_param_group(child)?,
                Rule::return_clause => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::type_ref {
                            return_type = Some(self.parse_type(part)?);
                        }
                    }
                }
                _ => {}
            }
        }
        let (Some(kind), Some(name)) = (kind, name) else {
            unreachable!("interface method missing kind or name")
        };
        self.validate_params(&error_pair, "Interface", &params)?;
        Ok(MethodSig {
            kind,
            name,
            params,
            return_type,
        })
    }

    fn parse_property_sig(self: Rc<Self>, pair: Pair<Rule>) -> Result<PropertySig, CompileError> {
        let error_pair = pair.clone();
        let mut name = None;
        let mut params = vec![];
        let mut ty = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::ident => name = Some(child.as_str().to_string()),
                Rule::indexer => params = self.clone().parse_param_group(child)?,
                Rule::type_ref => ty = Some(self.parse_type(child)?),
                _ => {}
            }
        }
        let (Some(name), Some(ty)) = (name, ty) else {
            unreachable!("interface property missing name or type")
        };
        self.validate_params(&error_pair, "Interface", &params)?;
        Ok(PropertySig { name, params, ty })
    }

    fn parse_enum(self: Rc<Self>, pair: Pair<Rule>) -> Result<EnumDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut names = vec![];
        let mut variants = vec![];
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::ident => names.push(child.as_str().to_string()),
                Rule::enum_member => {
                    let mut variant = None;
                    let mut value = None;
                    for part in child.into_inner() {
                        match part.as_rule() {
                            Rule::ident => variant = Some(part.as_str().to_string()),
                            Rule::enum_value_clause => {
                                for value_pair in part.into_inner() {
                                    if value_pair.as_rule() == Rule::enum_value {
                                        value = Some(
                                            value_pair.as_str().parse::<i64>().map_err(|e| {
                                                CompileError::LexError(
                                                    self.context(&value_pair),
                                                    format!("invalid enum value: {e}"),
                                                )
                                            })?,
                                        );
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    let Some(variant) = variant else {
                        unreachable!("enum member without a name")
                    };
                    variants.push((variant, value));
                }
                _ => {}
            }
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.check_end_label(&error_pair, "Enum", &name_refs)?;
        let Some(name) = names.into_iter().next() else {
            unreachable!("enum without a name")
        };
        Ok(EnumDecl {
            name,
            access,
            variants,
        })
    }

    fn parse_delegate(self: Rc<Self>, pair: Pair<Rule>) -> Result<DelegateDecl, CompileError> {
        let error_pair = pair.clone();
        let mut access = AccessModifier::Default;
        let mut kind = None;
        let mut name = None;
        let mut params = vec![];
        let mut return_type = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::callable_kind => kind = Some(Self::parse_callable_kind(child)),
                Rule::ident => name = Some(child.as_str().to_string()),
                Rule::param_group => params = self.clone().parse_param_group(child)?,
                Rule::return_clause => {
                    for part in child.into_inner() {
                        if part.as_rule() == Rule::type_ref {
                            return_type = Some(self.parse_type(part)?);
                        }
                    }
                }
                _ => {}
            }
        }
        let Some(name) = name else {
            unreachable!("delegate without a name")
        };
        // Kind may be omitted in source; infer it from the return type.
        let kind = kind.unwrap_or(if return_type.is_some() {
            CallableKind::Function
        } else {
            CallableKind::Sub
        });
        self.validate_params(&error_pair, "Delegate", &params)?;
        Ok(DelegateDecl {
            name,
            access,
            kind,
            params,
            return_type,
        })
    }

    fn parse_event(self: Rc<Self>, pair: Pair<Rule>) -> Result<EventDecl, CompileError> {
        let mut access = AccessModifier::Default;
        let mut name = None;
        let mut delegate = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::access_modifier => access = self.parse_access(child),
                Rule::ident => name = Some(child.as_str().to_string()),
                Rule::type_ref => delegate = Some(self.parse_type(child)?),
                _ => {}
            }
        }
        let (Some(name), Some(delegate)) = (name, delegate) else {
            unreachable!("event missing name or delegate type")
        };
        Ok(EventDecl {
            name,
            access,
            delegate,
        })
    }

    fn parse_unit_decl(self: Rc<Self>, pair: Pair<Rule>) -> Result<Decl, CompileError> {
        let Some(inner) = pair.into_inner().next() else {
            unreachable!("empty unit declaration")
        };
        match inner.as_rule() {
            Rule::class_decl => Ok(Decl::Class(self.parse_class(inner)?)),
            Rule::interface_decl => Ok(Decl::Interface(self.parse_interface(inner)?)),
            Rule::enum_decl => Ok(Decl::Enum(self.parse_enum(inner)?)),
            Rule::delegate_decl => Ok(Decl::Delegate(self.parse_delegate(inner)?)),
            Rule::event_decl => Ok(Decl::Event(self.parse_event(inner)?)),
            Rule::method_decl => Ok(Decl::Function(self.parse_method(inner)?)),
            _ => panic!("Unimplemented unit declaration: {:?}", inner.as_rule()),
        }
    }

    fn transform_tree(self: Rc<Self>, pairs: Pairs<Rule>) -> Result<Unit, CompileError> {
        let mut declarations = vec![];
        for pair in pairs {
            match pair.as_rule() {
                Rule::unit => {
                    for decl in pair.into_inner() {
                        match decl.as_rule() {
                            Rule::unit_decl => {
                                declarations.push(self.clone().parse_unit_decl(decl)?);
                            }
                            Rule::EOI => {}
                            _ => panic!("Unexpected rule: {:?}", decl.as_rule()),
                        }
                    }
                }
                _ => panic!("Unexpected rule: {:?}", pair.as_rule()),
            }
        }
        Ok(Unit { declarations })
    }
}

/// Bracket-depth guard run before the grammar. The generated parser recurses
/// on nested parentheses and index brackets, so the depth bound must hold
/// before it ever sees the input; the transformer's own `descend` counter
/// only covers the tree-walking phase. Quoted strings and line comments are
/// skipped (string literals carry no escapes).
fn check_nesting(source: &str, max_depth: usize) -> Result<(), CompileError> {
    let mut depth = 0usize;
    let mut line = 1;
    let mut column = 0;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            column = 0;
            continue;
        }
        column += 1;
        match c {
            '(' | '[' => {
                depth += 1;
                if depth > max_depth {
                    return Err(CompileError::NestingTooDeep {
                        context: CompileContext::new((line, column)),
                        max_depth,
                    });
                }
            }
            ')' | ']' => depth = depth.saturating_sub(1),
            '\'' | '"' => {
                for s in chars.by_ref() {
                    if s == '\n' {
                        line += 1;
                        column = 0;
                    } else {
                        column += 1;
                        if s == c {
                            break;
                        }
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for s in chars.by_ref() {
                    if s == '\n' {
                        line += 1;
                        column = 0;
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_zero_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Value(Literal::Integer(0)) => true,
        Expr::Value(Literal::Double(f)) => *f == 0.0,
        Expr::Unary(UnaryOp::Neg, inner) => is_zero_literal(inner),
        _ => false,
    }
}

/// Parse one compilation unit into its AST.
///
/// Deterministic and side-effect free; each call owns its own tree and no
/// state is shared across calls. All-or-nothing: the first `CompileError`
/// aborts the parse and no partial tree is returned.
pub fn parse_unit(source: &str, options: CompileOptions) -> Result<Unit, CompileError> {
    debug!(source_len = source.len(), "parsing compilation unit");
    check_nesting(source, options.max_depth)?;
    let pairs = match ForeParser::parse(Rule::unit, source) {
        Ok(pairs) => pairs,
        Err(e) => {
            let ((line, column), end_line_col) = match e.line_col {
                LineColLocation::Pos(lc) => (lc, None),
                LineColLocation::Span(begin, end) => (begin, Some(end)),
            };
            return Err(CompileError::SyntaxError {
                error_position: CompileContext::new((line, column)),
                end_line_col,
                context: e.line().to_string(),
                message: e.variant.message().to_string(),
            });
        }
    };

    let transformer = TreeTransformer::new(options);
    transformer.transform_tree(pairs)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use unindent::unindent;

    use super::{CompileOptions, parse_unit};
    use crate::ast::{
        AccessModifier, BinaryOp, CallableKind, CaseAlternative, Decl, Expr, Literal, StmtNode,
        TypeRef, UnaryOp,
    };
    use crate::errors::CompileError;

    // Shorthand used all over the tests below.
    fn parse(source: &str) -> crate::ast::Unit {
        parse_unit(&unindent(source), CompileOptions::default()).expect("parse failed")
    }

    fn parse_err(source: &str) -> CompileError {
        parse_unit(&unindent(source), CompileOptions::default())
            .expect_err("parse unexpectedly succeeded")
    }

    /// Wraps one statement into a free Sub and returns the parsed node.
    fn parse_stmt(stmt: &str) -> StmtNode {
        let source = format!("Sub T; Begin {stmt} End Sub T;");
        let unit = parse(&source);
        let Decl::Function(method) = &unit.declarations[0] else {
            panic!("expected a free function");
        };
        method.body.statements[0].node.clone()
    }

    /// Parses one expression by planting it in a return statement.
    fn parse_expr(expr: &str) -> Expr {
        match parse_stmt(&format!("Return {expr};")) {
            StmtNode::Return(Some(e)) => e,
            other => panic!("expected return, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_class() {
        let unit = parse("Class Foo; End Class Foo;");
        assert_eq!(unit.declarations.len(), 1);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        assert_eq!(class.name, "Foo");
        assert_eq!(class.access, AccessModifier::Default);
        assert!(!class.shared);
        assert!(class.bases.is_empty());
        assert!(class.body.is_empty());
    }

    #[test]
    fn test_malformed_class_header() {
        let err = parse_err("Class Foo Bar;");
        let CompileError::SyntaxError { error_position, .. } = err else {
            panic!("expected a syntax error, got {err:?}");
        };
        assert_eq!(error_position.line_col.0, 1);
        assert!(error_position.line_col.1 > 1);
    }

    #[test]
    fn test_determinism() {
        let source = r#"
            Public Class Point : IShape;
                x, y: Integer;
                Constructor Create(ax, ay: Integer);
                Begin
                    x := ax;
                    y := ay;
                End Constructor Create;
            End Class Point;
        "#;
        let first = parse(source);
        let second = parse(source);
        assert_eq!(first, second);
    }

    #[test]
    fn test_field_fanout_and_modifiers() {
        let unit = parse(r#"
            Class Foo;
                Private Shared a, b, c: Integer;
                Protected Friend d: String;
            End Class Foo;
        "#);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        let fields = &class.body.fields;
        assert_eq!(fields.len(), 4);
        assert_eq!(
            fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c", "d"]
        );
        for field in &fields[..3] {
            assert_eq!(field.access, AccessModifier::Private);
            assert!(field.shared);
            assert_eq!(field.ty, TypeRef::Base("Integer".into()));
        }
        assert_eq!(fields[3].access, AccessModifier::ProtectedFriend);
        assert!(!fields[3].shared);
    }

    #[test]
    fn test_type_classification() {
        let unit = parse(r#"
            Class Foo;
                a: Integer;
                b: IShape;
                c: Widget;
                d: Integer[8];
                e: String[];
            End Class Foo;
        "#);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        let tys: Vec<_> = class.body.fields.iter().map(|f| f.ty.clone()).collect();
        assert_eq!(tys[0], TypeRef::Base("Integer".into()));
        assert_eq!(tys[1], TypeRef::Interface("IShape".into()));
        assert_eq!(tys[2], TypeRef::Class("Widget".into()));
        assert_eq!(
            tys[3],
            TypeRef::Array {
                element: Box::new(TypeRef::Base("Integer".into())),
                size: Some(8),
            }
        );
        assert_eq!(
            tys[4],
            TypeRef::Array {
                element: Box::new(TypeRef::Base("String".into())),
                size: None,
            }
        );
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse_expr("1 + 2 * 3");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::mk_int(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::mk_int(2)),
                    Box::new(Expr::mk_int(3)),
                )),
            )
        );
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse_expr("10 - 4 - 3");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(
                    BinaryOp::Sub,
                    Box::new(Expr::mk_int(10)),
                    Box::new(Expr::mk_int(4)),
                )),
                Box::new(Expr::mk_int(3)),
            )
        );
    }

    #[test]
    fn test_comparison_binds_looser_than_arithmetic() {
        let expr = parse_expr("a + 1 < b * 2");
        let Expr::Binary(BinaryOp::Lt, lhs, rhs) = expr else {
            panic!("expected a comparison at the top");
        };
        assert_eq!(
            *lhs,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::mk_id("a")),
                Box::new(Expr::mk_int(1)),
            )
        );
        assert_eq!(
            *rhs,
            Expr::Binary(
                BinaryOp::Mul,
                Box::new(Expr::mk_id("b")),
                Box::new(Expr::mk_int(2)),
            )
        );
    }

    #[test]
    fn test_cast_binds_looser_than_comparison() {
        // The whole comparison result is cast, not just `b`.
        let expr = parse_expr("a < b As Boolean");
        let Expr::Cast { expr, ty } = expr else {
            panic!("expected a cast at the top");
        };
        assert_eq!(ty, TypeRef::Base("Boolean".into()));
        assert!(matches!(*expr, Expr::Binary(BinaryOp::Lt, _, _)));
    }

    #[test]
    fn test_type_check_expression() {
        let expr = parse_expr("shape Is Circle");
        assert_eq!(
            expr,
            Expr::TypeCheck {
                expr: Box::new(Expr::mk_id("shape")),
                ty: TypeRef::Class("Circle".into()),
            }
        );
    }

    #[test]
    fn test_ternary() {
        let expr = parse_expr("a < b ? a : b");
        let Expr::Ternary {
            condition,
            consequence,
            alternative,
        } = expr
        else {
            panic!("expected a ternary");
        };
        assert!(matches!(*condition, Expr::Binary(BinaryOp::Lt, _, _)));
        assert_eq!(*consequence, Expr::mk_id("a"));
        assert_eq!(*alternative, Expr::mk_id("b"));
    }

    #[test]
    fn test_unary_and_not() {
        assert_eq!(
            parse_expr("-x + 1"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Unary(UnaryOp::Neg, Box::new(Expr::mk_id("x")))),
                Box::new(Expr::mk_int(1)),
            )
        );
        assert_eq!(
            parse_expr("Not done"),
            Expr::Unary(UnaryOp::Not, Box::new(Expr::mk_id("done")))
        );
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_expr("obj.items[0].Render(1, 2)");
        let Expr::Call { callee, args } = expr else {
            panic!("expected a call at the top");
        };
        assert_eq!(args, vec![Expr::mk_int(1), Expr::mk_int(2)]);
        let Expr::Member { object, name } = *callee else {
            panic!("expected a member access");
        };
        assert_eq!(name, "Render");
        let Expr::Index { object, index } = *object else {
            panic!("expected an index access");
        };
        assert_eq!(*index, Expr::mk_int(0));
        assert_eq!(
            *object,
            Expr::Member {
                object: Box::new(Expr::mk_id("obj")),
                name: "items".into(),
            }
        );
    }

    #[test]
    fn test_new_expression() {
        let expr = parse_expr("New Widget(1)");
        assert_eq!(
            expr,
            Expr::New {
                ty: TypeRef::Class("Widget".into()),
                args: vec![Expr::mk_int(1)],
            }
        );
    }

    #[test_case("3.25", Literal::Double(3.25); "plain decimal")]
    #[test_case("1e6", Literal::Double(1e6); "bare exponent")]
    #[test_case("42", Literal::Integer(42); "integer")]
    #[test_case("True", Literal::Boolean(true); "boolean keyword")]
    #[test_case("Null", Literal::Null; "null keyword")]
    fn test_literals(source: &str, expected: Literal) {
        assert_eq!(parse_expr(source), Expr::Value(expected));
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(parse_expr(r#""hi""#), Expr::mk_str("hi"));
        assert_eq!(parse_expr("'hi'"), Expr::mk_str("hi"));
        // Prefixes are accepted and stripped.
        assert_eq!(parse_expr(r#"f"hi""#), Expr::mk_str("hi"));
    }

    #[test]
    fn test_for_with_step() {
        let node = parse_stmt("For i := 10 To 1 Step -1 Do x := i; End For;");
        let StmtNode::For {
            counter,
            init,
            to,
            step,
            body,
        } = node
        else {
            panic!("expected a for loop");
        };
        assert_eq!(counter, "i");
        assert_eq!(init, Expr::mk_int(10));
        assert_eq!(to, Expr::mk_int(1));
        assert_eq!(
            step,
            Some(Expr::Unary(UnaryOp::Neg, Box::new(Expr::mk_int(1))))
        );
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_for_without_step() {
        let node = parse_stmt("For i := 1 To 10 Do Continue; End For;");
        let StmtNode::For { step, .. } = node else {
            panic!("expected a for loop");
        };
        assert_eq!(step, None);
    }

    #[test_case("Step 0"; "integer zero")]
    #[test_case("Step -0"; "negated zero")]
    #[test_case("Step 0.0"; "double zero")]
    fn test_for_step_zero_rejected(step: &str) {
        let err = parse_err(&format!(
            "Sub T; Begin For i := 1 To 10 {step} Do Break; End For; End Sub T;"
        ));
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "For", .. }
        ));
    }

    #[test]
    fn test_foreach() {
        let node = parse_stmt("Foreach item In list Do Dispose item; End Foreach;");
        let StmtNode::Foreach {
            binding,
            collection,
            body,
        } = node
        else {
            panic!("expected a foreach loop");
        };
        assert_eq!(binding, "item");
        assert_eq!(collection, Expr::mk_id("list"));
        assert!(matches!(body[0].node, StmtNode::Dispose(_)));
    }

    #[test]
    fn test_while_and_repeat() {
        let node = parse_stmt("While x < 10 Do x := x + 1; End While;");
        assert!(matches!(node, StmtNode::While { .. }));

        let node = parse_stmt("Repeat x := x - 1; Until x = 0;");
        let StmtNode::Repeat { body, condition } = node else {
            panic!("expected a repeat loop");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(condition, Expr::Binary(BinaryOp::Eq, _, _)));
    }

    #[test]
    fn test_if_elseif_else() {
        let node = parse_stmt(
            "If a Then Return 1; Elseif b Then Return 2; Elseif c Then Return 3; \
             Else Return 4; End If;",
        );
        let StmtNode::If { arms, otherwise } = node else {
            panic!("expected an if");
        };
        assert_eq!(arms.len(), 3);
        assert_eq!(arms[0].condition, Expr::mk_id("a"));
        assert_eq!(arms[1].condition, Expr::mk_id("b"));
        assert_eq!(arms[2].condition, Expr::mk_id("c"));
        assert_eq!(otherwise.map(|stmts| stmts.len()), Some(1));
    }

    #[test]
    fn test_select_with_ranges_and_else() {
        let node = parse_stmt(
            "Select grade; Case 90 To 100: Return 1; Case 80, 85: Return 2; \
             Else: Return 3; End Select;",
        );
        let StmtNode::Select {
            selector,
            cases,
            otherwise,
        } = node
        else {
            panic!("expected a select");
        };
        assert_eq!(selector, Expr::mk_id("grade"));
        assert_eq!(cases.len(), 2);
        assert_eq!(
            cases[0].alternatives,
            vec![CaseAlternative::Range {
                from: Expr::mk_int(90),
                to: Expr::mk_int(100),
            }]
        );
        assert_eq!(
            cases[1].alternatives,
            vec![
                CaseAlternative::Value(Expr::mk_int(80)),
                CaseAlternative::Value(Expr::mk_int(85)),
            ]
        );
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_select_else_not_last_rejected() {
        let err = parse_err(
            "Sub T; Begin Select x; Else: Break; Case 1: Break; End Select; End Sub T;",
        );
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "Select", .. }
        ));
    }

    #[test]
    fn test_try_full_shape() {
        let node = parse_stmt(
            "Try Risky(); Except On e: ParseFault Do Log(e); Except Cleanup(); \
             Finally Close(); End Try;",
        );
        let StmtNode::Try {
            body,
            excepts,
            catch_all,
            else_body,
            finally,
        } = node
        else {
            panic!("expected a try");
        };
        assert_eq!(body.len(), 1);
        assert_eq!(excepts.len(), 1);
        assert_eq!(excepts[0].binding, "e");
        assert_eq!(excepts[0].ty, TypeRef::Class("ParseFault".into()));
        assert_eq!(catch_all.map(|stmts| stmts.len()), Some(1));
        assert_eq!(else_body, None);
        assert_eq!(finally.map(|stmts| stmts.len()), Some(1));
    }

    #[test]
    fn test_try_bare_except_must_be_last() {
        let err = parse_err(&unindent(
            "Sub T; Begin Try Break; Except Break; Except On e: ParseFault Do Break; \
             End Try; End Sub T;",
        ));
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "Try", .. }
        ));
    }

    #[test]
    fn test_method_kinds() {
        let unit = parse(r#"
            Class Foo;
                Public Function Area(): Double;
                Begin
                    Return 0.0;
                End Function Area;
                Private Shared Sub Reset();
                Begin
                    count := 0;
                End Sub Reset;
            End Class Foo;
        "#);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        let methods = &class.body.methods;
        assert_eq!(methods[0].kind, CallableKind::Function);
        assert_eq!(methods[0].return_type, Some(TypeRef::Base("Double".into())));
        assert_eq!(methods[1].kind, CallableKind::Sub);
        assert!(methods[1].shared);
        assert_eq!(methods[1].return_type, None);
    }

    #[test]
    fn test_sub_with_return_type_rejected() {
        let err = parse_err("Sub T(): Integer; Begin End Sub T;");
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "Method", .. }
        ));
    }

    #[test]
    fn test_function_without_return_type_rejected() {
        let err = parse_err("Function T(); Begin End Function T;");
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "Method", .. }
        ));
    }

    #[test]
    fn test_end_label_mismatch() {
        let err = parse_err("Class Foo; End Class Bar;");
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "Class", .. }
        ));
    }

    #[test]
    fn test_end_label_case_insensitive() {
        parse("Class Foo; End Class FOO;");
    }

    #[test]
    fn test_parameters() {
        let unit = parse(r#"
            Sub T(a, b: Integer; Var out: String; ParamArray rest: Object[]);
            Begin
            End Sub T;
        "#);
        let Decl::Function(method) = &unit.declarations[0] else {
            panic!("expected a free function");
        };
        let params = &method.params;
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].name, "a");
        assert_eq!(params[1].name, "b");
        assert_eq!(params[0].ty, params[1].ty);
        assert!(params[2].by_ref);
        assert!(params[3].param_array);
    }

    #[test]
    fn test_paramarray_must_be_last() {
        let err = parse_err(
            "Sub T(ParamArray rest: Object[]; x: Integer); Begin End Sub T;",
        );
        assert!(matches!(err, CompileError::SemanticBuildError { .. }));
    }

    #[test]
    fn test_default_ordering() {
        let err = parse_err("Sub T(a: Integer = 1; b: Integer); Begin End Sub T;");
        assert!(matches!(err, CompileError::SemanticBuildError { .. }));

        parse("Sub T(a: Integer; b: Integer = 1); Begin End Sub T;");
    }

    #[test]
    fn test_method_body_const_and_var_blocks() {
        let unit = parse(r#"
            Sub T;
            Const
                limit = 10;
            Var
                i, j: Integer;
                name: String := "x";
            Begin
                i := limit;
            End Sub T;
        "#);
        let Decl::Function(method) = &unit.declarations[0] else {
            panic!("expected a free function");
        };
        assert_eq!(method.body.consts, vec![("limit".into(), Expr::mk_int(10))]);
        assert_eq!(method.body.vars.len(), 3);
        assert_eq!(method.body.vars[2].default, Some(Expr::mk_str("x")));
    }

    #[test]
    fn test_property_accessors() {
        let unit = parse(r#"
            Class Foo;
                Public Property Width: Integer;
                Get;
                Begin
                    Return w;
                End Get;
                Set;
                Begin
                    w := value;
                End Set;
                End Property Width;
            End Class Foo;
        "#);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        let prop = &class.body.properties[0];
        assert!(prop.getter.is_some());
        assert!(prop.setter.is_some());
        assert!(prop.params.is_empty());
    }

    #[test]
    fn test_property_without_accessors_rejected() {
        let err = parse_err(r#"
            Class Foo;
                Property Width: Integer;
                End Property Width;
            End Class Foo;
        "#);
        assert!(matches!(
            err,
            CompileError::SemanticBuildError { node_kind: "Property", .. }
        ));
    }

    #[test]
    fn test_indexed_property() {
        let unit = parse(r#"
            Class Foo;
                Property Item[index: Integer]: String;
                Get;
                Begin
                    Return items[index];
                End Get;
                End Property Item;
            End Class Foo;
        "#);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        let prop = &class.body.properties[0];
        assert_eq!(prop.params.len(), 1);
        assert_eq!(prop.params[0].name, "index");
    }

    #[test]
    fn test_enum_auto_increment() {
        let unit = parse(r#"
            Enum Color;
                Red;
                Green = 5;
                Blue;
            End Enum Color;
        "#);
        let Decl::Enum(decl) = &unit.declarations[0] else {
            panic!("expected an enum");
        };
        assert_eq!(
            decl.resolved_values(),
            vec![
                ("Red".into(), 0),
                ("Green".into(), 5),
                ("Blue".into(), 6),
            ]
        );
    }

    #[test]
    fn test_interface() {
        let unit = parse(r#"
            Public Interface IShape;
                Function Area(): Double;
                Sub Scale(factor: Double);
                Property Name: String;
            End Interface IShape;
        "#);
        let Decl::Interface(decl) = &unit.declarations[0] else {
            panic!("expected an interface");
        };
        assert_eq!(decl.name, "IShape");
        assert_eq!(decl.methods.len(), 2);
        assert_eq!(decl.methods[0].kind, CallableKind::Function);
        assert_eq!(decl.properties.len(), 1);
    }

    #[test]
    fn test_delegate_and_event() {
        let unit = parse(r#"
            Public Delegate Sub Notify(message: String);
            Public Event Changed: Notify;
        "#);
        let Decl::Delegate(delegate) = &unit.declarations[0] else {
            panic!("expected a delegate");
        };
        assert_eq!(delegate.kind, CallableKind::Sub);
        assert_eq!(delegate.params.len(), 1);
        let Decl::Event(event) = &unit.declarations[1] else {
            panic!("expected an event");
        };
        assert_eq!(event.delegate, TypeRef::Class("Notify".into()));
    }

    #[test]
    fn test_constructor_and_inherited() {
        let unit = parse(r#"
            Class Circle : Shape;
                Constructor Create(r: Double);
                Begin
                    Inherited Create(r);
                    radius := r;
                End Constructor Create;
            End Class Circle;
        "#);
        let Decl::Class(class) = &unit.declarations[0] else {
            panic!("expected a class");
        };
        let ctor = &class.body.constructors[0];
        assert_eq!(ctor.name, "Create");
        let StmtNode::Inherited(Some(Expr::Call { .. })) = &ctor.body.statements[0].node else {
            panic!("expected an inherited call");
        };
    }

    #[test]
    fn test_with_statement() {
        let node = parse_stmt("With canvas Do Clear(); End With;");
        assert!(matches!(node, StmtNode::With { .. }));
    }

    #[test]
    fn test_assignment_targets() {
        let node = parse_stmt("obj.items[0] := 5;");
        let StmtNode::Assign { target, .. } = node else {
            panic!("expected an assignment");
        };
        assert!(matches!(target, Expr::Index { .. }));
    }

    #[test]
    fn test_comments_are_skipped() {
        let unit = parse(r#"
            // leading comment
            Class Foo; // trailing comment
            End Class Foo;
        "#);
        assert_eq!(unit.declarations.len(), 1);
    }

    #[test]
    fn test_keyword_prefix_identifiers() {
        // `Classy` and `Ended` must lex as identifiers.
        let node = parse_stmt("Classy := Ended;");
        assert_eq!(
            node,
            StmtNode::Assign {
                target: Expr::mk_id("Classy"),
                value: Expr::mk_id("Ended"),
            }
        );
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_err(&format!("Sub T; Begin x := {deep}; End Sub T;"));
        assert!(matches!(err, CompileError::NestingTooDeep { .. }));
    }

    #[test]
    fn test_nesting_limit_far_past_bound() {
        // Deep enough to exhaust the call stack were it ever handed to the
        // grammar; the depth guard must reject it up front instead.
        let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        let err = parse_err(&format!("Sub T; Begin x := {deep}; End Sub T;"));
        assert!(matches!(err, CompileError::NestingTooDeep { .. }));
    }

    #[test]
    fn test_nesting_guard_ignores_strings_and_comments() {
        let parens = "(".repeat(200);
        let source = format!("Sub T; // {parens}\nBegin x := '{parens}'; End Sub T;");
        parse(&source);
    }

    #[test]
    fn test_json_serialization() {
        let unit = parse("Public Class Foo; a: Integer; End Class Foo;");
        let json = serde_json::to_value(&unit).expect("serialization failed");
        let class = &json["declarations"][0]["Class"];
        assert_eq!(class["name"], "Foo");
        assert_eq!(class["access"], "Public");
        assert_eq!(class["body"]["fields"][0]["ty"], serde_json::json!({"Base": "Integer"}));
    }

    #[test]
    fn test_statement_positions() {
        let unit = parse("Sub T;\nBegin\n    x := 1;\n    y := 2;\nEnd Sub T;\n");
        let Decl::Function(method) = &unit.declarations[0] else {
            panic!("expected a free function");
        };
        assert_eq!(method.body.statements[0].line_col, (3, 5));
        assert_eq!(method.body.statements[1].line_col, (4, 5));
    }
}
