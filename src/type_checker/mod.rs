use std::collections::HashSet;

use crate::{
    ast::{
        BinaryOp, Block, Decl, Expr, ExprKind, Func, Ident, Lit, Module, Stmt, StmtKind, TypeNode,
        Typed, UnaryOp, Untyped,
    },
    error::TypeError,
    token::Pos,
    types::Type,
};

mod context;

pub use context::{Scope, TypeContext};

type Result<T, E = TypeError> = std::result::Result<T, E>;

/// Checks a whole module, producing a tree where every expression carries its
/// type. Stops at the first error.
pub fn type_check(module: Module<Untyped>, ctx: &mut TypeContext) -> Result<Module<Typed>> {
    Checker::new(ctx).check_module(module)
}

/// Checks a standalone expression against the bindings in `ctx`. The
/// expression is checked as a top-level definition, so it may be a function
/// literal.
pub fn check_expr(expr: Expr<Untyped>, ctx: &mut TypeContext) -> Result<Expr<Typed>> {
    Checker::new(ctx).check_definition(expr)
}

/// Returns the type of `expr` under the bindings in `ctx`.
pub fn type_of(expr: &Expr<Untyped>, ctx: &mut TypeContext) -> Result<Type> {
    Ok(check_expr(expr.clone(), ctx)?.info)
}

/// Succeeds iff the two types are structurally equal. No coercion.
pub fn type_equal(expected: &Type, actual: &Type, pos: Pos) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(mismatch(expected, actual, pos))
    }
}

fn mismatch(expected: &Type, found: &Type, pos: Pos) -> TypeError {
    TypeError::new(
        format!("type mismatch: expected {expected}, found {found}"),
        pos,
    )
}

pub struct Checker<'ctx> {
    ctx: &'ctx mut TypeContext,
    /// Number of loops enclosing the current expression, within the current
    /// function.
    loop_depth: usize,
}

impl<'ctx> Checker<'ctx> {
    pub fn new(ctx: &'ctx mut TypeContext) -> Checker<'ctx> {
        Checker { ctx, loop_depth: 0 }
    }

    pub fn check_module(&mut self, module: Module<Untyped>) -> Result<Module<Typed>> {
        self.scoped(|this| {
            // Bind function signatures first so that functions may reference
            // each other regardless of declaration order.
            let mut seen = HashSet::with_capacity(module.decls.len());
            for decl in &module.decls {
                if !seen.insert(decl.name.name.clone()) {
                    return Err(TypeError::new(
                        format!("duplicate declaration `{}`", decl.name.name),
                        decl.name.pos,
                    ));
                }
                if let Some(func) = decl.as_func() {
                    this.ctx.bind(decl.name.name.clone(), func.signature());
                }
            }

            let decls = module
                .decls
                .into_iter()
                .map(|decl| this.check_decl(decl))
                .collect::<Result<_>>()?;
            Ok(Module { decls })
        })
    }

    fn check_decl(&mut self, decl: Decl<Untyped>) -> Result<Decl<Typed>> {
        let is_func = decl.as_func().is_some();
        let expr = self.check_definition(decl.expr)?;
        if let Some(annotation) = &decl.ty {
            type_equal(&annotation.ty, expr.ty(), expr.pos)?;
        }
        // Globals become wasm globals, whose initialisers must be constants.
        if !is_func && !is_constant(&expr) {
            return Err(TypeError::new(
                format!("global `{}` must be initialised with a literal", decl.name.name),
                expr.pos,
            ));
        }
        self.ctx.bind(decl.name.name.clone(), expr.ty().clone());
        Ok(Decl {
            name: decl.name,
            ty: decl.ty,
            expr,
            pos: decl.pos,
        })
    }

    /// Checks the right-hand side of a top-level declaration, the only place
    /// where a function literal may appear.
    fn check_definition(&mut self, expr: Expr<Untyped>) -> Result<Expr<Typed>> {
        let pos = expr.pos;
        match expr.kind {
            ExprKind::Func(func) => {
                let func = self.check_func(func)?;
                let ty = func.signature();
                Ok(Expr::typed(ExprKind::Func(func), pos, ty))
            }
            ExprKind::Paren(inner) => {
                let inner = self.check_definition(*inner)?;
                let ty = inner.ty().clone();
                Ok(Expr::typed(ExprKind::Paren(Box::new(inner)), pos, ty))
            }
            kind => self.check_expr(Expr::new(kind, pos)),
        }
    }

    pub fn check_expr(&mut self, expr: Expr<Untyped>) -> Result<Expr<Typed>> {
        let pos = expr.pos;
        let (kind, ty) = match expr.kind {
            ExprKind::Lit(lit) => {
                let ty = match lit {
                    Lit::Int(_) => Type::Int,
                    Lit::Float(_) => Type::Float,
                    Lit::Str(_) => Type::Str,
                    Lit::Char(_) => Type::Char,
                    Lit::Bool(_) => Type::Bool,
                    Lit::Void => Type::Void,
                };
                (ExprKind::Lit(lit), ty)
            }

            ExprKind::Ident(ident) => {
                let ty = self.lookup(&ident)?;
                if let Type::Func(..) = ty {
                    return Err(TypeError::new(
                        format!("function `{}` can only be called directly", ident.name),
                        ident.pos,
                    ));
                }
                (ExprKind::Ident(ident), ty)
            }

            ExprKind::Tuple(items) => {
                let items = self.check_all(items)?;
                let ty = Type::Tuple(items.iter().map(|item| item.ty().clone()).collect());
                (ExprKind::Tuple(items), ty)
            }

            ExprKind::Array(items) => {
                let items = self.check_all(items)?;
                let Some(first) = items.first() else {
                    return Err(TypeError::new(
                        "cannot infer the element type of an empty array",
                        pos,
                    ));
                };
                let elem = first.ty().clone();
                for item in &items[1..] {
                    type_equal(&elem, item.ty(), item.pos)?;
                }
                (ExprKind::Array(items), Type::array_of(elem))
            }

            ExprKind::NewArray { elem, len } => {
                no_function_values(&elem)?;
                let len = self.check_expr(*len)?;
                type_equal(&Type::Int, len.ty(), len.pos)?;
                let ty = Type::array_of(elem.ty.clone());
                let kind = ExprKind::NewArray {
                    elem,
                    len: Box::new(len),
                };
                (kind, ty)
            }

            ExprKind::Func(_) => {
                return Err(TypeError::new(
                    "function literals are only allowed in top-level declarations",
                    pos,
                ));
            }

            ExprKind::Call { callee, args } => self.check_call(*callee, args, pos)?,

            ExprKind::Index { target, index } => self.check_index(*target, *index)?,

            ExprKind::Cond {
                predicate,
                then_arm,
                else_arm,
            } => {
                let predicate = self.check_expr(*predicate)?;
                type_equal(&Type::Bool, predicate.ty(), predicate.pos)?;
                let then_arm = self.check_expr(*then_arm)?;
                let else_arm = match else_arm {
                    Some(else_arm) => {
                        let else_arm = self.check_expr(*else_arm)?;
                        type_equal(then_arm.ty(), else_arm.ty(), else_arm.pos)?;
                        Some(Box::new(else_arm))
                    }
                    // Without an else arm the conditional yields `()`.
                    None => {
                        type_equal(&Type::Void, then_arm.ty(), then_arm.pos)?;
                        None
                    }
                };
                let ty = then_arm.ty().clone();
                let kind = ExprKind::Cond {
                    predicate: Box::new(predicate),
                    then_arm: Box::new(then_arm),
                    else_arm,
                };
                (kind, ty)
            }

            ExprKind::While { predicate, body } => {
                let predicate = self.check_expr(*predicate)?;
                type_equal(&Type::Bool, predicate.ty(), predicate.pos)?;
                let body = self.in_loop(|this| this.check_expr(*body))?;
                let kind = ExprKind::While {
                    predicate: Box::new(predicate),
                    body: Box::new(body),
                };
                (kind, Type::Void)
            }

            ExprKind::For {
                var,
                start,
                end,
                body,
            } => {
                let start = self.check_expr(*start)?;
                type_equal(&Type::Int, start.ty(), start.pos)?;
                let end = self.check_expr(*end)?;
                type_equal(&Type::Int, end.ty(), end.pos)?;
                let body = self.scoped(|this| {
                    this.ctx.bind(var.name.clone(), Type::Int);
                    this.in_loop(|this| this.check_expr(*body))
                })?;
                let kind = ExprKind::For {
                    var,
                    start: Box::new(start),
                    end: Box::new(end),
                    body: Box::new(body),
                };
                (kind, Type::Void)
            }

            ExprKind::Break => {
                if self.loop_depth == 0 {
                    return Err(TypeError::new("`break` outside of a loop", pos));
                }
                (ExprKind::Break, Type::Void)
            }

            ExprKind::Block(block) => {
                let block = self.scoped(|this| this.check_block(block))?;
                let ty = block
                    .value
                    .as_ref()
                    .map_or(Type::Void, |value| value.ty().clone());
                (ExprKind::Block(block), ty)
            }

            ExprKind::Unary { op, expr } => {
                let operand = self.check_expr(*expr)?;
                let ty = match op {
                    UnaryOp::Neg | UnaryOp::Plus => {
                        expect_numeric(&operand)?;
                        operand.ty().clone()
                    }
                    UnaryOp::Not => {
                        type_equal(&Type::Bool, operand.ty(), operand.pos)?;
                        Type::Bool
                    }
                };
                let kind = ExprKind::Unary {
                    op,
                    expr: Box::new(operand),
                };
                (kind, ty)
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expr(*lhs)?;
                let rhs = self.check_expr(*rhs)?;
                let ty = binary_type(op, &lhs, &rhs)?;
                let kind = ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (kind, ty)
            }

            ExprKind::Paren(inner) => {
                let inner = self.check_expr(*inner)?;
                let ty = inner.ty().clone();
                (ExprKind::Paren(Box::new(inner)), ty)
            }

            ExprKind::Prim { op, .. } => {
                return Err(TypeError::new(
                    format!("unexpected primitive operation {op:?} before type checking"),
                    pos,
                ));
            }
        };
        Ok(Expr::typed(kind, pos, ty))
    }

    fn check_all(&mut self, exprs: Vec<Expr<Untyped>>) -> Result<Vec<Expr<Typed>>> {
        exprs.into_iter().map(|e| self.check_expr(e)).collect()
    }

    fn check_func(&mut self, func: Func<Untyped>) -> Result<Func<Typed>> {
        let ret = func.ret;
        let params = func.params;
        let body = func.body;
        no_function_values(&ret)?;

        let body = self.scoped(|this| {
            for param in &params {
                no_function_values(&param.ty)?;
                if this.ctx.is_bound_here(&param.name.name) {
                    return Err(TypeError::new(
                        format!("duplicate parameter `{}`", param.name.name),
                        param.name.pos,
                    ));
                }
                this.ctx.bind(param.name.name.clone(), param.ty.ty.clone());
            }

            // Loops do not extend into nested functions.
            let outer_loop_depth = std::mem::replace(&mut this.loop_depth, 0);
            let body = this.check_expr(*body);
            this.loop_depth = outer_loop_depth;

            let body = body?;
            type_equal(&ret.ty, body.ty(), body.pos)?;
            Ok(body)
        })?;

        Ok(Func {
            params,
            ret,
            body: Box::new(body),
        })
    }

    fn check_call(
        &mut self,
        callee: Expr<Untyped>,
        args: Vec<Expr<Untyped>>,
        pos: Pos,
    ) -> Result<(ExprKind<Typed>, Type)> {
        // A named function in callee position is the one place where an
        // identifier of function type is allowed.
        let callee = match callee.kind {
            ExprKind::Ident(ident) => {
                let ty = self.lookup(&ident)?;
                Expr::typed(ExprKind::Ident(ident), callee.pos, ty)
            }
            kind => self.check_expr(Expr::new(kind, callee.pos))?,
        };
        let Type::Func(params, ret) = callee.ty() else {
            return Err(TypeError::new(
                format!("expected a function, found {}", callee.ty()),
                callee.pos,
            ));
        };
        if params.len() != args.len() {
            return Err(TypeError::new(
                format!(
                    "expected {} arguments, found {}",
                    params.len(),
                    args.len()
                ),
                pos,
            ));
        }
        let (params, ret) = (params.clone(), (**ret).clone());

        let args = self.check_all(args)?;
        for (param, arg) in params.iter().zip(&args) {
            type_equal(param, arg.ty(), arg.pos)?;
        }

        let kind = ExprKind::Call {
            callee: Box::new(callee),
            args,
        };
        Ok((kind, ret))
    }

    fn check_index(
        &mut self,
        target: Expr<Untyped>,
        index: Expr<Untyped>,
    ) -> Result<(ExprKind<Typed>, Type)> {
        let target = self.check_expr(target)?;
        let index = self.check_expr(index)?;

        let ty = match target.ty() {
            Type::Array(elem) => {
                type_equal(&Type::Int, index.ty(), index.pos)?;
                (**elem).clone()
            }
            Type::Str => {
                type_equal(&Type::Int, index.ty(), index.pos)?;
                Type::Char
            }
            Type::Tuple(fields) => {
                let ExprKind::Lit(Lit::Int(i)) = &index.kind else {
                    return Err(TypeError::new(
                        "tuple index must be an int literal",
                        index.pos,
                    ));
                };
                let field = usize::try_from(*i).ok().and_then(|i| fields.get(i));
                let Some(field) = field else {
                    return Err(TypeError::new(
                        format!("tuple index {i} out of range for {}", target.ty()),
                        index.pos,
                    ));
                };
                field.clone()
            }
            other => {
                return Err(TypeError::new(
                    format!("cannot index into a value of type {other}"),
                    target.pos,
                ));
            }
        };

        let kind = ExprKind::Index {
            target: Box::new(target),
            index: Box::new(index),
        };
        Ok((kind, ty))
    }

    /// Checks the statements of a block. The caller opens the scope.
    fn check_block(&mut self, block: Block<Untyped>) -> Result<Block<Typed>> {
        let stmts = block
            .stmts
            .into_iter()
            .map(|stmt| self.check_stmt(stmt))
            .collect::<Result<_>>()?;
        let value = match block.value {
            Some(value) => Some(Box::new(self.check_expr(*value)?)),
            None => None,
        };
        Ok(Block { stmts, value })
    }

    fn check_stmt(&mut self, stmt: Stmt<Untyped>) -> Result<Stmt<Typed>> {
        let kind = match stmt.kind {
            StmtKind::Let { name, ty, value } => {
                let value = self.check_expr(value)?;
                if let Some(annotation) = &ty {
                    type_equal(&annotation.ty, value.ty(), value.pos)?;
                }
                self.ctx.bind(name.name.clone(), value.ty().clone());
                StmtKind::Let { name, ty, value }
            }

            StmtKind::Assign { target, op, value } => {
                let target = self.check_assign_target(target)?;
                let value = self.check_expr(value)?;
                match op {
                    // x op= e has the type of x op e, which must be x's type.
                    Some(op) => {
                        let combined = binary_type(op, &target, &value)?;
                        type_equal(target.ty(), &combined, value.pos)?;
                    }
                    None => type_equal(target.ty(), value.ty(), value.pos)?,
                }
                StmtKind::Assign { target, op, value }
            }

            StmtKind::Expr(expr) => StmtKind::Expr(self.check_expr(expr)?),
        };
        Ok(Stmt {
            kind,
            pos: stmt.pos,
        })
    }

    fn check_assign_target(&mut self, target: Expr<Untyped>) -> Result<Expr<Typed>> {
        let is_index = matches!(target.kind, ExprKind::Index { .. });
        if !is_index && !matches!(target.kind, ExprKind::Ident(_)) {
            return Err(TypeError::new("invalid assignment target", target.pos));
        }

        let target = self.check_expr(target)?;
        if let ExprKind::Index { target: base, .. } = &target.kind {
            if !matches!(base.ty(), Type::Array(_)) {
                return Err(TypeError::new(
                    format!("cannot assign to an element of {}", base.ty()),
                    target.pos,
                ));
            }
        }
        Ok(target)
    }

    fn lookup(&self, ident: &Ident) -> Result<Type> {
        match self.ctx.lookup(&ident.name) {
            Some(ty) => Ok(ty.clone()),
            None => Err(TypeError::new(
                format!("found undefined identifier {}", ident.name),
                ident.pos,
            )),
        }
    }

    /// Runs `f` in a fresh scope, popped even when `f` fails.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ctx.push_scope();
        let result = f(self);
        self.ctx.pop_scope();
        result
    }

    fn in_loop<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.loop_depth += 1;
        let result = f(self);
        self.loop_depth -= 1;
        result
    }
}

/// Functions are not first-class: parameters, results and array elements
/// cannot hold them.
fn no_function_values(ty: &TypeNode) -> Result<()> {
    if ty.ty.contains_func() {
        return Err(TypeError::new(
            format!("values of type {} are not supported", ty.ty),
            ty.pos,
        ));
    }
    Ok(())
}

/// Literals, possibly parenthesised or signed. Negation only applies to
/// numeric literals.
fn is_constant(expr: &Expr<Typed>) -> bool {
    match &expr.kind {
        ExprKind::Lit(_) => true,
        ExprKind::Paren(inner)
        | ExprKind::Unary {
            op: UnaryOp::Plus,
            expr: inner,
        } => is_constant(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            expr: inner,
        } => matches!(
            strip_signs(inner).kind,
            ExprKind::Lit(Lit::Int(_) | Lit::Float(_))
        ),
        _ => false,
    }
}

fn strip_signs(expr: &Expr<Typed>) -> &Expr<Typed> {
    match &expr.kind {
        ExprKind::Paren(inner)
        | ExprKind::Unary {
            op: UnaryOp::Plus,
            expr: inner,
        } => strip_signs(inner),
        _ => expr,
    }
}

fn expect_numeric(expr: &Expr<Typed>) -> Result<()> {
    if expr.ty().is_numeric() {
        Ok(())
    } else {
        Err(mismatch(&Type::Int, expr.ty(), expr.pos))
    }
}

/// Result type of `lhs op rhs`, given already typed operands.
fn binary_type(op: BinaryOp, lhs: &Expr<Typed>, rhs: &Expr<Typed>) -> Result<Type> {
    let (lt, rt) = (lhs.ty(), rhs.ty());
    match op {
        BinaryOp::Add if *lt == Type::Str => {
            type_equal(&Type::Str, rt, rhs.pos)?;
            Ok(Type::Str)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            expect_numeric(lhs)?;
            expect_numeric(rhs)?;
            if *lt == Type::Float || *rt == Type::Float {
                Ok(Type::Float)
            } else {
                Ok(Type::Int)
            }
        }
        BinaryOp::Rem => {
            type_equal(&Type::Int, lt, lhs.pos)?;
            type_equal(&Type::Int, rt, rhs.pos)?;
            Ok(Type::Int)
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if *lt == Type::Char {
                type_equal(&Type::Char, rt, rhs.pos)?;
            } else {
                expect_numeric(lhs)?;
                expect_numeric(rhs)?;
            }
            Ok(Type::Bool)
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            if !lt.is_equatable() {
                return Err(TypeError::new(
                    format!("cannot compare values of type {lt}"),
                    lhs.pos,
                ));
            }
            if !(lt.is_numeric() && rt.is_numeric()) {
                type_equal(lt, rt, rhs.pos)?;
            }
            Ok(Type::Bool)
        }
        BinaryOp::And | BinaryOp::Or => {
            type_equal(&Type::Bool, lt, lhs.pos)?;
            type_equal(&Type::Bool, rt, rhs.pos)?;
            Ok(Type::Bool)
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{lexer, parser, util::test_utils::tree_tests};

    fn parse_expr(src: &str) -> Expr {
        let tokens = lexer::tokenize(src).expect("failed to lex");
        parser::parse_expr(&tokens).expect("failed to parse")
    }

    fn scope<const N: usize>(bindings: [(&str, Type); N]) -> Scope {
        bindings
            .into_iter()
            .map(|(name, ty)| (Box::from(name), ty))
            .collect()
    }

    #[test]
    fn literal_types() {
        let cases = [
            ("123", Type::Int),
            (".123", Type::Float),
            ("\"hello, world\"", Type::Str),
            ("true", Type::Bool),
            ("false", Type::Bool),
            ("'\\n'", Type::Char),
            ("()", Type::Void),
        ];
        for (src, expected) in cases {
            let ty = type_of(&parse_expr(src), &mut TypeContext::new()).unwrap();
            assert_eq!(ty, expected, "type of {src}");
        }
    }

    #[test]
    fn identifiers_resolve_to_the_innermost_scope() {
        let mut ctx = TypeContext::from_scopes([
            scope([]),
            scope([("other_ident", Type::Float)]),
            scope([("some_ident", Type::Int)]),
            scope([]),
        ]);
        let expr = parse_expr("some_ident");
        assert_eq!(type_of(&expr, &mut ctx), Ok(Type::Int));

        ctx.push_scope();
        ctx.bind("some_ident", Type::Str);
        assert_eq!(type_of(&expr, &mut ctx), Ok(Type::Str));

        ctx.pop_scope();
        assert_eq!(type_of(&expr, &mut ctx), Ok(Type::Int));
    }

    #[test]
    fn undefined_identifier() {
        let mut ctx = TypeContext::from_scopes([
            scope([]),
            scope([("some_ident", Type::Int)]),
            scope([("some_ident", Type::Str)]),
            scope([]),
        ]);
        let err = type_of(&parse_expr("invalid_ident"), &mut ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:1: semantic error: found undefined identifier invalid_ident"
        );
        // Failing checks leave the caller's scopes in place.
        assert_eq!(ctx.depth(), 4);
    }

    #[test]
    fn type_equal_is_structural() {
        let pos = Pos::new(3, 7);
        let pair = Type::Tuple(vec![Type::Int, Type::array_of(Type::Char)]);
        assert_eq!(type_equal(&pair, &pair.clone(), pos), Ok(()));
        assert_eq!(
            type_equal(&Type::Int, &Type::Float, pos)
                .unwrap_err()
                .to_string(),
            "3:7: semantic error: type mismatch: expected int, found float"
        );
    }

    tree_tests!(
        use checker;

        fn mixed_arithmetic_is_float() {
            let expr = "1 + 2.5";
            let tree_ok = "
                binary Add (1:1 %: float)
                  int 1 (1:1 %: int)
                  float 2.5 (1:5 %: float)
            ";
        }

        fn string_concatenation() {
            let expr = r#""a" + "b""#;
            let tree_ok = r#"
                binary Add (1:1 %: str)
                  str "a" (1:1 %: str)
                  str "b" (1:7 %: str)
            "#;
        }

        fn block_scopes_and_value() {
            let expr = "{ let x = 1; let x = 'c'; x }";
            let tree_ok = "
                block (1:1 %: char)
                  let x (1:3)
                    int 1 (1:11 %: int)
                  let x (1:14)
                    char 'c' (1:22 %: char)
                  value
                    ident x (1:27 %: char)
            ";
        }

        fn indexing() {
            let expr = r#"("ab"[0], [1.5][0], (1, true)[1])"#;
            let tree_ok = r#"
                tuple (1:1 %: (char, float, bool))
                  index (1:2 %: char)
                    str "ab" (1:2 %: str)
                    int 0 (1:7 %: int)
                  index (1:11 %: float)
                    array (1:11 %: [float])
                      float 1.5 (1:12 %: float)
                    int 0 (1:17 %: int)
                  index (1:21 %: bool)
                    tuple (1:21 %: (int, bool))
                      int 1 (1:22 %: int)
                      bool true (1:25 %: bool)
                    int 1 (1:31 %: int)
            "#;
        }

        fn mutual_recursion() {
            let program = indoc! {"
                let is_even = fn (n int) bool {
                  if n == 0 then true else is_odd(n - 1)
                }
                let is_odd = fn (n int) bool {
                  if n == 0 then false else is_even(n - 1)
                }
            "};
            let tree_ok = "
                let is_even (1:1)
                  fn (n: int) bool (1:15 %: fn (int) bool)
                    block (1:31 %: bool)
                      value
                        cond (2:3 %: bool)
                          binary Eq (2:6 %: bool)
                            ident n (2:6 %: int)
                            int 0 (2:11 %: int)
                          bool true (2:18 %: bool)
                          call (2:28 %: bool)
                            ident is_odd (2:28 %: fn (int) bool)
                            arguments
                              binary Sub (2:35 %: int)
                                ident n (2:35 %: int)
                                int 1 (2:39 %: int)
                let is_odd (4:1)
                  fn (n: int) bool (4:14 %: fn (int) bool)
                    block (4:30 %: bool)
                      value
                        cond (5:3 %: bool)
                          binary Eq (5:6 %: bool)
                            ident n (5:6 %: int)
                            int 0 (5:11 %: int)
                          bool false (5:18 %: bool)
                          call (5:29 %: bool)
                            ident is_even (5:29 %: fn (int) bool)
                            arguments
                              binary Sub (5:37 %: int)
                                ident n (5:37 %: int)
                                int 1 (5:41 %: int)
            ";
        }

        fn undefined_identifier_in_program() {
            let program = "let main = fn () int { y }";
            let error = "1:24: semantic error: found undefined identifier y";
        }

        fn mismatched_arms() {
            let expr = "if true then 1 else 'a'";
            let error = "1:21: semantic error: type mismatch: expected int, found char";
        }

        fn return_type_mismatch() {
            let program = "let f = fn () bool { 1 }";
            let error = "1:20: semantic error: type mismatch: expected bool, found int";
        }

        fn call_non_function() {
            let program = "let x = 1; let y = x(2)";
            let error = "1:20: semantic error: expected a function, found int";
        }

        fn call_arity() {
            let program = "let f = fn (a int) int { a }; let y = f(1, 2)";
            let error = "1:39: semantic error: expected 1 arguments, found 2";
        }

        fn call_argument_type() {
            let program = "let f = fn (a int) int { a }; let y = f(true)";
            let error = "1:41: semantic error: type mismatch: expected int, found bool";
        }

        fn break_outside_loop() {
            let expr = "{ break }";
            let error = "1:3: semantic error: `break` outside of a loop";
        }

        fn break_after_the_loop_ends() {
            let program = "let f = fn () { while true { break }; break }";
            let error = "1:39: semantic error: `break` outside of a loop";
        }

        fn nested_function_literals_are_rejected() {
            let expr = "while true { let f = fn () { break }; }";
            let error =
                "1:22: semantic error: function literals are only allowed in top-level declarations";
        }

        fn local_function_literals_are_rejected() {
            let program = "let main = fn () int { let g = fn () int { 1 }; g() }";
            let error =
                "1:32: semantic error: function literals are only allowed in top-level declarations";
        }

        fn functions_are_not_values() {
            let program = "let f = fn () int { 1 }; let main = fn () int { let g = f; g() }";
            let error = "1:57: semantic error: function `f` can only be called directly";
        }

        fn function_typed_parameters_are_rejected() {
            let program = "let apply = fn (f fn () int) int { 0 }";
            let error = "1:19: semantic error: values of type fn () int are not supported";
        }

        fn arrays_of_functions_are_rejected() {
            let expr = "new fn () int[2]";
            let error = "1:5: semantic error: values of type fn () int are not supported";
        }

        fn globals_need_literal_initialisers() {
            let program = "let x = 1 + 2; let main = fn () int { x }";
            let error = "1:9: semantic error: global `x` must be initialised with a literal";
        }

        fn signed_literal_globals() {
            let program = "let x = -(1); let y = +2.5";
            let tree_ok = "
                let x (1:1)
                  unary Neg (1:9 %: int)
                    paren (1:10 %: int)
                      int 1 (1:11 %: int)
                let y (1:15)
                  unary Plus (1:23 %: float)
                    float 2.5 (1:24 %: float)
            ";
        }

        fn duplicate_declaration() {
            let program = "let a = 1; let a = 2";
            let error = "1:16: semantic error: duplicate declaration `a`";
        }

        fn remainder_needs_ints() {
            let expr = "1.5 % 2";
            let error = "1:1: semantic error: type mismatch: expected int, found float";
        }

        fn new_array_length_must_be_int() {
            let expr = "new int[2.0]";
            let error = "1:9: semantic error: type mismatch: expected int, found float";
        }

        fn tuple_index_out_of_range() {
            let expr = "(1, 2)[2]";
            let error = "1:8: semantic error: tuple index 2 out of range for (int, int)";
        }

        fn assign_to_string_element() {
            let expr = r#"{ let s = "ab"; s[0] = 'c' }"#;
            let error = "1:17: semantic error: cannot assign to an element of str";
        }

        fn compound_assign_keeps_target_type() {
            let expr = "{ let x = 1; x += 0.5 }";
            let error = "1:14: semantic error: type mismatch: expected int, found float";
        }
    );
}
