use std::fmt::{self, Write};

use crate::{ast::*, types::Type};

const INDENT_WIDTH: usize = 2;

/// Displays a module as an indented tree, one node per line.
pub struct ModuleTree<'a, I: Info>(pub &'a Module<I>);

/// Displays an expression as an indented tree, one node per line.
pub struct ExprTree<'a, I: Info>(pub &'a Expr<I>);

impl<I: InfoWriter> fmt::Display for ModuleTree<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_module(f, self.0)
    }
}

impl<I: InfoWriter> fmt::Display for ExprTree<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_expr(f, 0, self.0)
    }
}

pub fn print_module<I: InfoWriter>(w: &mut impl Write, module: &Module<I>) -> fmt::Result {
    for decl in &module.decls {
        print_decl(w, 0, decl)?;
    }
    Ok(())
}

fn print_decl<I: InfoWriter>(w: &mut impl Write, i: usize, decl: &Decl<I>) -> fmt::Result {
    sp(w, i)?;
    write!(w, "let {}", decl.name.name)?;
    print_annotation(w, decl.ty.as_ref())?;
    writeln!(w, " ({})", decl.pos)?;
    print_expr(w, i + 1, &decl.expr)
}

fn print_annotation(w: &mut impl Write, ty: Option<&TypeNode>) -> fmt::Result {
    match ty {
        Some(node) => write!(w, ": {}", node.ty),
        None => Ok(()),
    }
}

pub fn print_expr<I: InfoWriter>(w: &mut impl Write, i: usize, expr: &Expr<I>) -> fmt::Result {
    sp(w, i)?;
    let pos = expr.pos;
    let info = InfoDisplay::<I>(&expr.info); // inferred type, for typed trees
    match &expr.kind {
        ExprKind::Lit(lit) => {
            match lit {
                Lit::Int(val) => write!(w, "int {val}")?,
                Lit::Float(val) => write!(w, "float {val:?}")?,
                Lit::Str(val) => write!(w, "str {val:?}")?,
                Lit::Char(val) => write!(w, "char {val:?}")?,
                Lit::Bool(val) => write!(w, "bool {val}")?,
                Lit::Void => write!(w, "void")?,
            }
            writeln!(w, " ({pos}{info})")?;
        }
        ExprKind::Ident(ident) => {
            writeln!(w, "ident {} ({pos}{info})", ident.name)?;
        }
        ExprKind::Tuple(items) => {
            writeln!(w, "tuple ({pos}{info})")?;
            for item in items {
                print_expr(w, i + 1, item)?;
            }
        }
        ExprKind::Array(items) => {
            writeln!(w, "array ({pos}{info})")?;
            for item in items {
                print_expr(w, i + 1, item)?;
            }
        }
        ExprKind::NewArray { elem, len } => {
            writeln!(w, "new {} ({pos}{info})", elem.ty)?;
            print_expr(w, i + 1, len)?;
        }
        ExprKind::Func(func) => {
            write!(w, "fn (")?;
            for (idx, param) in func.params.iter().enumerate() {
                if idx > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{}: {}", param.name.name, param.ty.ty)?;
            }
            writeln!(w, ") {} ({pos}{info})", func.ret.ty)?;
            print_expr(w, i + 1, &func.body)?;
        }
        ExprKind::Call { callee, args } => {
            writeln!(w, "call ({pos}{info})")?;
            print_expr(w, i + 1, callee)?;
            if !args.is_empty() {
                sp(w, i + 1)?;
                writeln!(w, "arguments")?;
                for arg in args {
                    print_expr(w, i + 2, arg)?;
                }
            }
        }
        ExprKind::Index { target, index } => {
            writeln!(w, "index ({pos}{info})")?;
            print_expr(w, i + 1, target)?;
            print_expr(w, i + 1, index)?;
        }
        ExprKind::Cond {
            predicate,
            then_arm,
            else_arm,
        } => {
            writeln!(w, "cond ({pos}{info})")?;
            print_expr(w, i + 1, predicate)?;
            print_expr(w, i + 1, then_arm)?;
            if let Some(else_arm) = else_arm {
                print_expr(w, i + 1, else_arm)?;
            }
        }
        ExprKind::While { predicate, body } => {
            writeln!(w, "while ({pos}{info})")?;
            print_expr(w, i + 1, predicate)?;
            print_expr(w, i + 1, body)?;
        }
        ExprKind::For {
            var,
            start,
            end,
            body,
        } => {
            writeln!(w, "for {} ({pos}{info})", var.name)?;
            print_expr(w, i + 1, start)?;
            print_expr(w, i + 1, end)?;
            print_expr(w, i + 1, body)?;
        }
        ExprKind::Break => {
            writeln!(w, "break ({pos}{info})")?;
        }
        ExprKind::Block(block) => {
            writeln!(w, "block ({pos}{info})")?;
            for stmt in &block.stmts {
                print_stmt(w, i + 1, stmt)?;
            }
            if let Some(value) = &block.value {
                sp(w, i + 1)?;
                writeln!(w, "value")?;
                print_expr(w, i + 2, value)?;
            }
        }
        ExprKind::Unary { op, expr: inner } => {
            writeln!(w, "unary {op:?} ({pos}{info})")?;
            print_expr(w, i + 1, inner)?;
        }
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {op:?} ({pos}{info})")?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)?;
        }
        ExprKind::Paren(inner) => {
            writeln!(w, "paren ({pos}{info})")?;
            print_expr(w, i + 1, inner)?;
        }
        ExprKind::Prim { op, args } => {
            writeln!(w, "prim {op:?} ({pos}{info})")?;
            for arg in args {
                print_expr(w, i + 1, arg)?;
            }
        }
    }
    Ok(())
}

fn print_stmt<I: InfoWriter>(w: &mut impl Write, i: usize, stmt: &Stmt<I>) -> fmt::Result {
    let pos = stmt.pos;
    match &stmt.kind {
        StmtKind::Let { name, ty, value } => {
            sp(w, i)?;
            write!(w, "let {}", name.name)?;
            print_annotation(w, ty.as_ref())?;
            writeln!(w, " ({pos})")?;
            print_expr(w, i + 1, value)
        }
        StmtKind::Assign { target, op, value } => {
            sp(w, i)?;
            match op {
                Some(op) => writeln!(w, "assign {}= ({pos})", op.symbol())?,
                None => writeln!(w, "assign ({pos})")?,
            }
            print_expr(w, i + 1, target)?;
            print_expr(w, i + 1, value)
        }
        StmtKind::Expr(expr) => print_expr(w, i, expr),
    }
}

fn sp(w: &mut impl Write, i: usize) -> fmt::Result {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

/// Tree stages that know how to print their per-expression info.
pub trait InfoWriter: Info {
    fn write_info(info: &Self::Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl InfoWriter for Untyped {
    fn write_info(_: &(), _: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl InfoWriter for Typed {
    fn write_info(ty: &Type, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " %: {ty}")
    }
}

struct InfoDisplay<'a, I: Info>(&'a I::Expr);

impl<I: InfoWriter> fmt::Display for InfoDisplay<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        I::write_info(self.0, f)
    }
}
