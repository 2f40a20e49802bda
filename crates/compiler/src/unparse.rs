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

//! Renders an AST back to canonical source text. The output is normalized
//! (two-space indent, double-quoted strings, one member per line) rather
//! than a byte-for-byte echo of the input, but it parses back to an equal
//! tree.

use itertools::Itertools;

use crate::ast::{
    AccessModifier, BinaryOp, CaseAlternative, ClassDecl, ConstDecl, ConstructorDecl, Decl,
    DelegateDecl, EnumDecl, EventDecl, Expr, FieldDecl, InterfaceDecl, Literal, MethodBody,
    MethodDecl, Parameter, PropertyDecl, Stmt, StmtNode, TypeRef, UnaryOp, Unit,
};

const INDENT_LEVEL: usize = 2;

/// Binding strength used to decide where parentheses are required. Higher
/// binds tighter; mirrors the parser's precedence ladder.
fn prec(expr: &Expr) -> u8 {
    match expr {
        Expr::Ternary { .. } => 1,
        Expr::Cast { .. } | Expr::TypeCheck { .. } => 2,
        Expr::Binary(op, _, _) => match op {
            BinaryOp::Eq
            | BinaryOp::NEq
            | BinaryOp::Lt
            | BinaryOp::LtE
            | BinaryOp::Gt
            | BinaryOp::GtE => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::IDiv | BinaryOp::Mod => 5,
        },
        Expr::Unary(..) => 6,
        _ => 7,
    }
}

pub fn unparse_type(ty: &TypeRef) -> String {
    let mut suffixes = vec![];
    let mut current = ty;
    while let TypeRef::Array { element, size } = current {
        suffixes.push(*size);
        current = element;
    }
    let mut out = current.name().to_string();
    // Suffixes were collected outermost-first; source order is innermost-first.
    for size in suffixes.into_iter().rev() {
        match size {
            Some(n) => out.push_str(&format!("[{n}]")),
            None => out.push_str("[]"),
        }
    }
    out
}

fn unparse_literal(literal: &Literal) -> String {
    match literal {
        Literal::String(s) if s.contains('"') => format!("'{s}'"),
        Literal::String(s) => format!("\"{s}\""),
        Literal::Integer(i) => i.to_string(),
        Literal::Double(d) if d.fract() == 0.0 && d.is_finite() => format!("{d:.1}"),
        Literal::Double(d) => d.to_string(),
        Literal::Boolean(true) => "True".to_string(),
        Literal::Boolean(false) => "False".to_string(),
        Literal::Null => "Null".to_string(),
    }
}

pub fn unparse_expr(expr: &Expr) -> String {
    // Wraps an operand in parens when it binds looser than its parent, or no
    // tighter on the right of a left-associative operator.
    let operand = |child: &Expr, parent_prec: u8, right: bool| {
        let child_prec = prec(child);
        if child_prec < parent_prec || (right && child_prec == parent_prec) {
            format!("({})", unparse_expr(child))
        } else {
            unparse_expr(child)
        }
    };

    match expr {
        Expr::Value(literal) => unparse_literal(literal),
        Expr::Id(name) => name.clone(),
        Expr::Binary(op, lhs, rhs) => {
            let p = prec(expr);
            format!("{} {op} {}", operand(lhs, p, false), operand(rhs, p, true))
        }
        Expr::Unary(op, operand_expr) => match op {
            UnaryOp::Neg => format!("-{}", operand(operand_expr, 6, false)),
            UnaryOp::Not => format!("Not {}", operand(operand_expr, 6, false)),
        },
        Expr::Ternary {
            condition,
            consequence,
            alternative,
        } => format!(
            "{} ? {} : {}",
            operand(condition, 2, false),
            unparse_expr(consequence),
            unparse_expr(alternative),
        ),
        Expr::Cast { expr: inner, ty } => {
            format!("{} As {}", operand(inner, 2, false), unparse_type(ty))
        }
        Expr::TypeCheck { expr: inner, ty } => {
            format!("{} Is {}", operand(inner, 2, false), unparse_type(ty))
        }
        Expr::Member { object, name } => format!("{}.{name}", operand(object, 7, false)),
        Expr::Index { object, index } => {
            format!("{}[{}]", operand(object, 7, false), unparse_expr(index))
        }
        Expr::Call { callee, args } => format!(
            "{}({})",
            operand(callee, 7, false),
            args.iter().map(unparse_expr).join(", ")
        ),
        Expr::New { ty, args } => format!(
            "New {}({})",
            unparse_type(ty),
            args.iter().map(unparse_expr).join(", ")
        ),
        Expr::Inherited => "Inherited".to_string(),
    }
}

struct Unparse {
    out: String,
    indent: usize,
}

impl Unparse {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent * INDENT_LEVEL {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, body: impl FnOnce(&mut Self)) {
        self.indent += 1;
        body(self);
        self.indent -= 1;
    }

    fn prefix(access: AccessModifier, shared: bool) -> String {
        let mut out = String::new();
        if access != AccessModifier::Default {
            out.push_str(&access.to_string());
            out.push(' ');
        }
        if shared {
            out.push_str("Shared ");
        }
        out
    }

    fn params(params: &[Parameter]) -> String {
        // Fan-out is not re-merged; each parameter prints on its own.
        let rendered = params
            .iter()
            .map(|p| {
                let mut out = String::new();
                if p.by_ref {
                    out.push_str("Var ");
                }
                if p.param_array {
                    out.push_str("ParamArray ");
                }
                out.push_str(&format!("{}: {}", p.name, unparse_type(&p.ty)));
                if let Some(default) = &p.default {
                    out.push_str(&format!(" = {}", unparse_expr(default)));
                }
                out
            })
            .join("; ");
        format!("({rendered})")
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.node {
            StmtNode::Assign { target, value } => {
                self.line(&format!(
                    "{} := {};",
                    unparse_expr(target),
                    unparse_expr(value)
                ));
            }
            StmtNode::Return(None) => self.line("Return;"),
            StmtNode::Return(Some(expr)) => {
                self.line(&format!("Return {};", unparse_expr(expr)));
            }
            StmtNode::If { arms, otherwise } => {
                for (i, arm) in arms.iter().enumerate() {
                    let keyword = if i == 0 { "If" } else { "Elseif" };
                    self.line(&format!(
                        "{keyword} {} Then",
                        unparse_expr(&arm.condition)
                    ));
                    self.nested(|me| me.stmts(&arm.statements));
                }
                if let Some(otherwise) = otherwise {
                    self.line("Else");
                    self.nested(|me| me.stmts(otherwise));
                }
                self.line("End If;");
            }
            StmtNode::For {
                counter,
                init,
                to,
                step,
                body,
            } => {
                let step = match step {
                    Some(step) => format!(" Step {}", unparse_expr(step)),
                    None => String::new(),
                };
                self.line(&format!(
                    "For {counter} := {} To {}{step} Do",
                    unparse_expr(init),
                    unparse_expr(to)
                ));
                self.nested(|me| me.stmts(body));
                self.line("End For;");
            }
            StmtNode::Foreach {
                binding,
                collection,
                body,
            } => {
                self.line(&format!(
                    "Foreach {binding} In {} Do",
                    unparse_expr(collection)
                ));
                self.nested(|me| me.stmts(body));
                self.line("End Foreach;");
            }
            StmtNode::While { condition, body } => {
                self.line(&format!("While {} Do", unparse_expr(condition)));
                self.nested(|me| me.stmts(body));
                self.line("End While;");
            }
            StmtNode::Repeat { body, condition } => {
                self.line("Repeat");
                self.nested(|me| me.stmts(body));
                self.line(&format!("Until {};", unparse_expr(condition)));
            }
            StmtNode::With { subject, body } => {
                self.line(&format!("With {} Do", unparse_expr(subject)));
                self.nested(|me| me.stmts(body));
                self.line("End With;");
            }
            StmtNode::Select {
                selector,
                cases,
                otherwise,
            } => {
                self.line(&format!("Select {};", unparse_expr(selector)));
                for case in cases {
                    let alternatives = case
                        .alternatives
                        .iter()
                        .map(|alt| match alt {
                            CaseAlternative::Value(value) => unparse_expr(value),
                            CaseAlternative::Range { from, to } => {
                                format!("{} To {}", unparse_expr(from), unparse_expr(to))
                            }
                        })
                        .join(", ");
                    self.line(&format!("Case {alternatives}:"));
                    self.nested(|me| me.stmts(&case.statements));
                }
                if let Some(otherwise) = otherwise {
                    self.line("Else:");
                    self.nested(|me| me.stmts(otherwise));
                }
                self.line("End Select;");
            }
            StmtNode::Try {
                body,
                excepts,
                catch_all,
                else_body,
                finally,
            } => {
                self.line("Try");
                self.nested(|me| me.stmts(body));
                for arm in excepts {
                    self.line(&format!(
                        "Except On {}: {} Do",
                        arm.binding,
                        unparse_type(&arm.ty)
                    ));
                    self.nested(|me| me.stmts(&arm.statements));
                }
                if let Some(catch_all) = catch_all {
                    self.line("Except");
                    self.nested(|me| me.stmts(catch_all));
                }
                if let Some(else_body) = else_body {
                    self.line("Else");
                    self.nested(|me| me.stmts(else_body));
                }
                if let Some(finally) = finally {
                    self.line("Finally");
                    self.nested(|me| me.stmts(finally));
                }
                self.line("End Try;");
            }
            StmtNode::Break => self.line("Break;"),
            StmtNode::Continue => self.line("Continue;"),
            StmtNode::Raise(None) => self.line("Raise;"),
            StmtNode::Raise(Some(expr)) => {
                self.line(&format!("Raise {};", unparse_expr(expr)));
            }
            StmtNode::Dispose(expr) => {
                self.line(&format!("Dispose {};", unparse_expr(expr)));
            }
            StmtNode::Inherited(None) => self.line("Inherited;"),
            StmtNode::Inherited(Some(call)) => {
                self.line(&format!("Inherited {};", unparse_expr(call)));
            }
            StmtNode::Expr(expr) => self.line(&format!("{};", unparse_expr(expr))),
        }
    }

    fn stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.stmt(statement);
        }
    }

    fn body(&mut self, body: &MethodBody) {
        if !body.consts.is_empty() {
            self.line("Const");
            self.nested(|me| {
                for (name, value) in &body.consts {
                    me.line(&format!("{name} = {};", unparse_expr(value)));
                }
            });
        }
        if !body.vars.is_empty() {
            self.line("Var");
            self.nested(|me| {
                for var in &body.vars {
                    let default = match &var.default {
                        Some(default) => format!(" := {}", unparse_expr(default)),
                        None => String::new(),
                    };
                    me.line(&format!("{}: {}{default};", var.name, unparse_type(&var.ty)));
                }
            });
        }
        self.line("Begin");
        self.nested(|me| me.stmts(&body.statements));
    }

    fn method(&mut self, method: &MethodDecl) {
        let return_clause = match &method.return_type {
            Some(ty) => format!(": {}", unparse_type(ty)),
            None => String::new(),
        };
        self.line(&format!(
            "{}{} {}{}{return_clause};",
            Self::prefix(method.access, method.shared),
            method.kind,
            method.name,
            Self::params(&method.params)
        ));
        self.body(&method.body);
        self.line(&format!("End {} {};", method.kind, method.name));
    }

    fn constructor(&mut self, ctor: &ConstructorDecl) {
        self.line(&format!(
            "{}Constructor {}{};",
            Self::prefix(ctor.access, false),
            ctor.name,
            Self::params(&ctor.params)
        ));
        self.body(&ctor.body);
        self.line(&format!("End Constructor {};", ctor.name));
    }

    fn property(&mut self, prop: &PropertyDecl) {
        let indexer = if prop.params.is_empty() {
            String::new()
        } else {
            // Indexer brackets, not parens.
            let inner = Self::params(&prop.params);
            format!("[{}]", &inner[1..inner.len() - 1])
        };
        self.line(&format!(
            "{}Property {}{indexer}: {};",
            Self::prefix(prop.access, prop.shared),
            prop.name,
            unparse_type(&prop.ty)
        ));
        if let Some(getter) = &prop.getter {
            self.line("Get;");
            self.body(getter);
            self.line("End Get;");
        }
        if let Some(setter) = &prop.setter {
            self.line("Set;");
            self.body(setter);
            self.line("End Set;");
        }
        self.line(&format!("End Property {};", prop.name));
    }

    fn field(&mut self, field: &FieldDecl) {
        self.line(&format!(
            "{}{}: {};",
            Self::prefix(field.access, field.shared),
            field.name,
            unparse_type(&field.ty)
        ));
    }

    fn constant(&mut self, decl: &ConstDecl) {
        self.line(&format!("{}Const", Self::prefix(decl.access, false)));
        self.nested(|me| {
            me.line(&format!("{} = {};", decl.name, unparse_expr(&decl.value)));
        });
    }

    fn class(&mut self, class: &ClassDecl) {
        let bases = if class.bases.is_empty() {
            String::new()
        } else {
            format!(" : {}", class.bases.iter().map(unparse_type).join(", "))
        };
        self.line(&format!(
            "{}Class {}{bases};",
            Self::prefix(class.access, class.shared),
            class.name
        ));
        self.nested(|me| {
            for decl in &class.body.consts {
                me.constant(decl);
            }
            for field in &class.body.fields {
                me.field(field);
            }
            for prop in &class.body.properties {
                me.property(prop);
            }
            for ctor in &class.body.constructors {
                me.constructor(ctor);
            }
            for method in &class.body.methods {
                me.method(method);
            }
        });
        self.line(&format!("End Class {};", class.name));
    }

    fn interface(&mut self, decl: &InterfaceDecl) {
        let parent = match &decl.parent {
            Some(parent) => format!(" : {}", unparse_type(parent)),
            None => String::new(),
        };
        self.line(&format!(
            "{}Interface {}{parent};",
            Self::prefix(decl.access, false),
            decl.name
        ));
        self.nested(|me| {
            for method in &decl.methods {
                let return_clause = match &method.return_type {
                    Some(ty) => format!(": {}", unparse_type(ty)),
                    None => String::new(),
                };
                me.line(&format!(
                    "{} {}{}{return_clause};",
                    method.kind,
                    method.name,
                    Self::params(&method.params)
                ));
            }
            for prop in &decl.properties {
                let indexer = if prop.params.is_empty() {
                    String::new()
                } else {
                    let inner = Self::params(&prop.params);
                    format!("[{}]", &inner[1..inner.len() - 1])
                };
                me.line(&format!(
                    "Property {}{indexer}: {};",
                    prop.name,
                    unparse_type(&prop.ty)
                ));
            }
        });
        self.line(&format!("End Interface {};", decl.name));
    }

    fn enumeration(&mut self, decl: &EnumDecl) {
        self.line(&format!(
            "{}Enum {};",
            Self::prefix(decl.access, false),
            decl.name
        ));
        self.nested(|me| {
            for (name, value) in &decl.variants {
                match value {
                    Some(value) => me.line(&format!("{name} = {value};")),
                    None => me.line(&format!("{name};")),
                }
            }
        });
        self.line(&format!("End Enum {};", decl.name));
    }

    fn delegate(&mut self, decl: &DelegateDecl) {
        let return_clause = match &decl.return_type {
            Some(ty) => format!(": {}", unparse_type(ty)),
            None => String::new(),
        };
        self.line(&format!(
            "{}Delegate {} {}{}{return_clause};",
            Self::prefix(decl.access, false),
            decl.kind,
            decl.name,
            Self::params(&decl.params)
        ));
    }

    fn event(&mut self, decl: &EventDecl) {
        self.line(&format!(
            "{}Event {}: {};",
            Self::prefix(decl.access, false),
            decl.name,
            unparse_type(&decl.delegate)
        ));
    }

    fn unit(&mut self, unit: &Unit) {
        for decl in &unit.declarations {
            match decl {
                Decl::Class(class) => self.class(class),
                Decl::Interface(interface) => self.interface(interface),
                Decl::Enum(decl) => self.enumeration(decl),
                Decl::Delegate(decl) => self.delegate(decl),
                Decl::Event(decl) => self.event(decl),
                Decl::Function(method) => self.method(method),
            }
        }
    }
}

/// Renders a whole unit to canonical source.
pub fn unparse(unit: &Unit) -> String {
    let mut unparser = Unparse::new();
    unparser.unit(unit);
    unparser.out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use unindent::unindent;

    use super::{unparse, unparse_expr};
    use crate::parse::{CompileOptions, parse_unit};

    fn roundtrip(source: &str) {
        let source = unindent(source);
        let first = parse_unit(&source, CompileOptions::default()).expect("parse failed");
        let rendered = unparse(&first);
        let second = parse_unit(&rendered, CompileOptions::default()).expect("reparse failed");
        // Positions shift under reformatting, so compare rendered text of
        // both trees rather than the trees themselves.
        assert_eq!(rendered, unparse(&second));
    }

    fn expr_text(expr: &str) -> String {
        let source = format!("Sub T; Begin Return {expr}; End Sub T;");
        let unit = parse_unit(&source, CompileOptions::default()).expect("parse failed");
        let crate::ast::Decl::Function(method) = &unit.declarations[0] else {
            panic!("expected a free function");
        };
        let crate::ast::StmtNode::Return(Some(e)) = &method.body.statements[0].node else {
            panic!("expected a return");
        };
        unparse_expr(e)
    }

    #[test]
    fn test_expr_parens_preserved_where_needed() {
        assert_eq!(expr_text("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(expr_text("1 + 2 * 3"), "1 + 2 * 3");
        assert_eq!(expr_text("10 - (4 - 3)"), "10 - (4 - 3)");
        assert_eq!(expr_text("(a < b) As Boolean"), "a < b As Boolean");
        assert_eq!(expr_text("Not (a = b)"), "Not (a = b)");
    }

    #[test]
    fn test_roundtrip_class() {
        roundtrip(r#"
            Public Class Point : IShape;
                Private x, y: Integer;
                Constructor Create(ax, ay: Integer);
                Begin
                    x := ax;
                    y := ay;
                End Constructor Create;
                Public Function Dist(): Double;
                Var
                    d: Double;
                Begin
                    d := x * x + y * y;
                    Return d;
                End Function Dist;
            End Class Point;
        "#);
    }

    #[test]
    fn test_roundtrip_control_flow() {
        roundtrip(r#"
            Sub Walk(n: Integer);
            Begin
                For i := 1 To n Step 2 Do
                    If i > 5 Then
                        Break;
                    Elseif i = 3 Then
                        Continue;
                    Else
                        Report(i);
                    End If;
                End For;
                Select n;
                Case 1, 2:
                    Return;
                Case 10 To 20:
                    Raise New RangeFault();
                Else:
                    Return;
                End Select;
                Try
                    Risky();
                Except On e: ParseFault Do
                    Log(e);
                Except
                    Cleanup();
                Finally
                    Close();
                End Try;
            End Sub Walk;
        "#);
    }

    #[test]
    fn test_roundtrip_loops_and_with() {
        roundtrip(r#"
            Sub Drain(queue: Widget);
            Var
                item: Object;
                total: Integer := 0;
            Begin
                While queue.HasNext() Do
                    item := queue.Take();
                    Dispose item;
                End While;
                Repeat
                    total := total - 1;
                Until total <= 0;
                Foreach entry In queue.History() Do
                    total := total + (entry.Size() As Integer);
                End Foreach;
                With queue.Stats() Do
                    Report(total > 0 ? "busy" : "idle");
                End With;
            End Sub Drain;
        "#);
    }

    #[test]
    fn test_roundtrip_property() {
        roundtrip(r#"
            Class Grid;
                Private cells: Integer[];
                Public Property Item[index: Integer]: Integer;
                Get;
                Begin
                    Return cells[index];
                End Get;
                Set;
                Begin
                    cells[index] := value;
                End Set;
                End Property Item;
            End Class Grid;
        "#);
    }

    #[test]
    fn test_roundtrip_declarations() {
        roundtrip(r#"
            Public Interface IShape;
                Function Area(): Double;
                Property Name: String;
            End Interface IShape;
            Enum Color;
                Red;
                Green = 5;
            End Enum Color;
            Delegate Sub Notify(message: String);
            Event Changed: Notify;
        "#);
    }
}
