//! Rewrites between the surface tree and the core the later stages accept.
//!
//! [`desugar_before`] runs on the untyped tree and removes surface sugar so
//! the type checker only sees core forms. [`desugar_after`] runs on the typed
//! tree and resolves every operator to a [`PrimOp`] based on operand types.

use crate::{
    ast::{
        BinaryOp, Block, Decl, Expr, ExprKind, Func, Ident, Info, Lit, Module, PrimOp, Stmt,
        StmtKind, Typed, UnaryOp, Untyped,
    },
    token::Pos,
    types::Type,
};

/// Removes `Paren`, unary `+`, `&&`, `||`, `!=`, compound assignments,
/// else-less conditionals and `for` loops. Core trees are returned unchanged.
pub fn desugar_before(module: Module<Untyped>) -> Module<Untyped> {
    Sugar::default().module(module)
}

/// Like [`desugar_before`], for a standalone expression.
pub fn desugar_expr_before(expr: Expr<Untyped>) -> Expr<Untyped> {
    Sugar::default().expr(expr)
}

/// Turns every `Unary` and `Binary` into a `Prim`, inserting int to float
/// conversions where the checker allowed mixed operands. Leftover sugar is
/// removed first, exactly as [`desugar_before`] would.
pub fn desugar_after(module: Module<Typed>) -> Module<Typed> {
    let module = Sugar::default().module(module);
    Module {
        decls: module
            .decls
            .into_iter()
            .map(|decl| Decl {
                expr: lower(decl.expr),
                ..decl
            })
            .collect(),
    }
}

/// Like [`desugar_after`], for a standalone expression.
pub fn desugar_expr_after(expr: Expr<Typed>) -> Expr<Typed> {
    lower(Sugar::default().expr(expr))
}

/// Builds the per-expression info of synthesized nodes.
trait Synth: Info {
    fn synth(ty: Type) -> Self::Expr;
}

impl Synth for Untyped {
    fn synth(_: Type) {}
}

impl Synth for Typed {
    fn synth(ty: Type) -> Type {
        ty
    }
}

fn synth<I: Synth>(kind: ExprKind<I>, pos: Pos, ty: Type) -> Expr<I> {
    Expr {
        kind,
        pos,
        info: I::synth(ty),
    }
}

fn lit<I: Synth>(lit: Lit, pos: Pos) -> Expr<I> {
    let ty = match lit {
        Lit::Int(_) => Type::Int,
        Lit::Float(_) => Type::Float,
        Lit::Str(_) => Type::Str,
        Lit::Char(_) => Type::Char,
        Lit::Bool(_) => Type::Bool,
        Lit::Void => Type::Void,
    };
    synth(ExprKind::Lit(lit), pos, ty)
}

#[derive(Default)]
struct Sugar {
    fresh: usize,
}

impl Sugar {
    fn module<I: Synth>(&mut self, module: Module<I>) -> Module<I> {
        Module {
            decls: module
                .decls
                .into_iter()
                .map(|decl| Decl {
                    expr: self.expr(decl.expr),
                    ..decl
                })
                .collect(),
        }
    }

    fn expr<I: Synth>(&mut self, expr: Expr<I>) -> Expr<I> {
        let Expr { kind, pos, info } = expr;
        let kind = match kind {
            kind @ (ExprKind::Lit(_) | ExprKind::Ident(_) | ExprKind::Break) => kind,
            ExprKind::Tuple(items) => ExprKind::Tuple(self.exprs(items)),
            ExprKind::Array(items) => ExprKind::Array(self.exprs(items)),
            ExprKind::NewArray { elem, len } => ExprKind::NewArray {
                elem,
                len: self.boxed(len),
            },
            ExprKind::Func(func) => ExprKind::Func(Func {
                params: func.params,
                ret: func.ret,
                body: self.boxed(func.body),
            }),
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: self.boxed(callee),
                args: self.exprs(args),
            },
            ExprKind::Index { target, index } => ExprKind::Index {
                target: self.boxed(target),
                index: self.boxed(index),
            },
            ExprKind::Cond {
                predicate,
                then_arm,
                else_arm,
            } => ExprKind::Cond {
                predicate: self.boxed(predicate),
                then_arm: self.boxed(then_arm),
                else_arm: Some(match else_arm {
                    Some(else_arm) => self.boxed(else_arm),
                    None => Box::new(lit(Lit::Void, pos)),
                }),
            },
            ExprKind::While { predicate, body } => ExprKind::While {
                predicate: self.boxed(predicate),
                body: self.boxed(body),
            },
            ExprKind::For {
                var,
                start,
                end,
                body,
            } => return self.for_loop(var, *start, *end, *body, pos, info),
            ExprKind::Block(block) => ExprKind::Block(self.block(block)),
            ExprKind::Unary {
                op: UnaryOp::Plus,
                expr,
            } => return self.expr(*expr),
            ExprKind::Unary { op, expr } => ExprKind::Unary {
                op,
                expr: self.boxed(expr),
            },
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => ExprKind::Cond {
                predicate: self.boxed(lhs),
                then_arm: self.boxed(rhs),
                else_arm: Some(Box::new(lit(Lit::Bool(false), pos))),
            },
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => ExprKind::Cond {
                predicate: self.boxed(lhs),
                then_arm: Box::new(lit(Lit::Bool(true), pos)),
                else_arm: Some(self.boxed(rhs)),
            },
            ExprKind::Binary {
                op: BinaryOp::Ne,
                lhs,
                rhs,
            } => {
                let eq = ExprKind::Binary {
                    op: BinaryOp::Eq,
                    lhs: self.boxed(lhs),
                    rhs: self.boxed(rhs),
                };
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(synth(eq, pos, Type::Bool)),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op,
                lhs: self.boxed(lhs),
                rhs: self.boxed(rhs),
            },
            ExprKind::Paren(inner) => return self.expr(*inner),
            ExprKind::Prim { op, args } => ExprKind::Prim {
                op,
                args: self.exprs(args),
            },
        };
        Expr { kind, pos, info }
    }

    fn boxed<I: Synth>(&mut self, expr: Box<Expr<I>>) -> Box<Expr<I>> {
        Box::new(self.expr(*expr))
    }

    fn exprs<I: Synth>(&mut self, exprs: Vec<Expr<I>>) -> Vec<Expr<I>> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn block<I: Synth>(&mut self, block: Block<I>) -> Block<I> {
        let stmts = block
            .stmts
            .into_iter()
            .map(|stmt| self.stmt(stmt))
            .collect();
        let value = block.value.map(|value| self.boxed(value));
        Block { stmts, value }
    }

    fn stmt<I: Synth>(&mut self, stmt: Stmt<I>) -> Stmt<I> {
        let kind = match stmt.kind {
            StmtKind::Let { name, ty, value } => StmtKind::Let {
                name,
                ty,
                value: self.expr(value),
            },
            // x op= e  ~>  x = x op e
            StmtKind::Assign {
                target,
                op: Some(op),
                value,
            } => {
                let Expr { kind, pos, info } = self.expr(target);
                let value = self.expr(value);
                match kind {
                    ExprKind::Index { target: base, index }
                        if !is_pure(&base) || !is_pure(&index) =>
                    {
                        return self.compound_index(*base, *index, pos, info, op, value, stmt.pos);
                    }
                    kind => compound(Expr { kind, pos, info }, op, value),
                }
            }
            StmtKind::Assign {
                target,
                op: None,
                value,
            } => StmtKind::Assign {
                target: self.expr(target),
                op: None,
                value: self.expr(value),
            },
            StmtKind::Expr(expr) => StmtKind::Expr(self.expr(expr)),
        };
        Stmt {
            kind,
            pos: stmt.pos,
        }
    }

    /// a[i] op= v
    ///   ~>
    /// { let $arr_N = a; let $idx_M = i; $arr_N[$idx_M] = $arr_N[$idx_M] op v }
    #[allow(clippy::too_many_arguments)]
    fn compound_index<I: Synth>(
        &mut self,
        base: Expr<I>,
        index: Expr<I>,
        pos: Pos,
        info: I::Expr,
        op: BinaryOp,
        value: Expr<I>,
        stmt_pos: Pos,
    ) -> Stmt<I> {
        let arr = Ident::new(self.fresh_name("arr"), base.pos);
        let idx = Ident::new(self.fresh_name("idx"), index.pos);
        let target = Expr {
            kind: ExprKind::Index {
                target: Box::new(ident_expr(&arr, &base.info)),
                index: Box::new(ident_expr(&idx, &index.info)),
            },
            pos,
            info,
        };
        let stmts = vec![
            Stmt {
                pos: arr.pos,
                kind: StmtKind::Let {
                    name: arr,
                    ty: None,
                    value: base,
                },
            },
            Stmt {
                pos: idx.pos,
                kind: StmtKind::Let {
                    name: idx,
                    ty: None,
                    value: index,
                },
            },
            Stmt {
                kind: compound(target, op, value),
                pos: stmt_pos,
            },
        ];
        let block = Block { stmts, value: None };
        Stmt {
            kind: StmtKind::Expr(synth(ExprKind::Block(block), stmt_pos, Type::Void)),
            pos: stmt_pos,
        }
    }

    /// for i in a..b { body }
    ///   ~>
    /// { let i = a; let $end_N = b; while i < $end_N { body; i = i + 1 } }
    fn for_loop<I: Synth>(
        &mut self,
        var: Ident,
        start: Expr<I>,
        end: Expr<I>,
        body: Expr<I>,
        pos: Pos,
        info: I::Expr,
    ) -> Expr<I> {
        let start = self.expr(start);
        let end = self.expr(end);
        let body = self.expr(body);

        let end_var = Ident::new(self.fresh_name("end"), end.pos);
        let load = |ident: &Ident| synth(ExprKind::Ident(ident.clone()), ident.pos, Type::Int);

        let step = Stmt {
            kind: StmtKind::Assign {
                target: load(&var),
                op: None,
                value: synth(
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        lhs: Box::new(load(&var)),
                        rhs: Box::new(lit(Lit::Int(1), var.pos)),
                    },
                    var.pos,
                    Type::Int,
                ),
            },
            pos: var.pos,
        };
        let body_pos = body.pos;
        let loop_body = Block {
            stmts: vec![
                Stmt {
                    kind: StmtKind::Expr(body),
                    pos: body_pos,
                },
                step,
            ],
            value: None,
        };
        let predicate = synth(
            ExprKind::Binary {
                op: BinaryOp::Lt,
                lhs: Box::new(load(&var)),
                rhs: Box::new(load(&end_var)),
            },
            var.pos,
            Type::Bool,
        );
        let while_loop = synth(
            ExprKind::While {
                predicate: Box::new(predicate),
                body: Box::new(synth(ExprKind::Block(loop_body), body_pos, Type::Void)),
            },
            pos,
            Type::Void,
        );

        let stmts = vec![
            Stmt {
                pos: var.pos,
                kind: StmtKind::Let {
                    name: var,
                    ty: None,
                    value: start,
                },
            },
            Stmt {
                pos: end_var.pos,
                kind: StmtKind::Let {
                    name: end_var,
                    ty: None,
                    value: end,
                },
            },
            Stmt {
                pos,
                kind: StmtKind::Expr(while_loop),
            },
        ];
        Expr {
            kind: ExprKind::Block(Block { stmts, value: None }),
            pos,
            info,
        }
    }

    /// Returns a name the lexer can never produce.
    fn fresh_name(&mut self, base: &str) -> String {
        let name = format!("${base}_{}", self.fresh);
        self.fresh += 1;
        name
    }
}

/// `target = target op value`.
fn compound<I: Synth>(target: Expr<I>, op: BinaryOp, value: Expr<I>) -> StmtKind<I> {
    let combined = Expr {
        pos: target.pos,
        info: target.info.clone(),
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(target.clone()),
            rhs: Box::new(value),
        },
    };
    StmtKind::Assign {
        target,
        op: None,
        value: combined,
    }
}

/// Expressions that can be evaluated twice without changing the program.
fn is_pure<I: Info>(expr: &Expr<I>) -> bool {
    matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Lit(_))
}

fn ident_expr<I: Info>(ident: &Ident, info: &I::Expr) -> Expr<I> {
    Expr {
        kind: ExprKind::Ident(ident.clone()),
        pos: ident.pos,
        info: info.clone(),
    }
}

/// Resolves operators of a typed tree to primitive operations.
fn lower(expr: Expr<Typed>) -> Expr<Typed> {
    let Expr { kind, pos, info } = expr;
    let kind = match kind {
        kind @ (ExprKind::Lit(_) | ExprKind::Ident(_) | ExprKind::Break) => kind,
        ExprKind::Tuple(items) => ExprKind::Tuple(lower_all(items)),
        ExprKind::Array(items) => ExprKind::Array(lower_all(items)),
        ExprKind::NewArray { elem, len } => ExprKind::NewArray {
            elem,
            len: lower_boxed(len),
        },
        ExprKind::Func(func) => ExprKind::Func(Func {
            params: func.params,
            ret: func.ret,
            body: lower_boxed(func.body),
        }),
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: lower_boxed(callee),
            args: lower_all(args),
        },
        ExprKind::Index { target, index } => ExprKind::Index {
            target: lower_boxed(target),
            index: lower_boxed(index),
        },
        ExprKind::Cond {
            predicate,
            then_arm,
            else_arm,
        } => ExprKind::Cond {
            predicate: lower_boxed(predicate),
            then_arm: lower_boxed(then_arm),
            else_arm: else_arm.map(lower_boxed),
        },
        ExprKind::While { predicate, body } => ExprKind::While {
            predicate: lower_boxed(predicate),
            body: lower_boxed(body),
        },
        ExprKind::For {
            var,
            start,
            end,
            body,
        } => ExprKind::For {
            var,
            start: lower_boxed(start),
            end: lower_boxed(end),
            body: lower_boxed(body),
        },
        ExprKind::Block(block) => ExprKind::Block(Block {
            stmts: block.stmts.into_iter().map(lower_stmt).collect(),
            value: block.value.map(lower_boxed),
        }),
        ExprKind::Unary { op, expr } => {
            let operand = lower(*expr);
            let ty = operand.ty().clone();
            match (op, &ty) {
                (UnaryOp::Neg, Type::Int) => ExprKind::Prim {
                    op: PrimOp::I32Sub,
                    args: vec![lit(Lit::Int(0), pos), operand],
                },
                (UnaryOp::Neg, Type::Float) => ExprKind::Prim {
                    op: PrimOp::F64Neg,
                    args: vec![operand],
                },
                (UnaryOp::Not, _) => ExprKind::Prim {
                    op: PrimOp::I32Eqz,
                    args: vec![operand],
                },
                (UnaryOp::Plus, _) => return operand,
                // Ill-typed; left for the code generator to reject.
                (op, _) => ExprKind::Unary {
                    op,
                    expr: Box::new(operand),
                },
            }
        }
        ExprKind::Binary { op, lhs, rhs } => lower_binary(op, lower(*lhs), lower(*rhs)),
        ExprKind::Paren(inner) => return lower(*inner),
        ExprKind::Prim { op, args } => ExprKind::Prim {
            op,
            args: lower_all(args),
        },
    };
    Expr { kind, pos, info }
}

fn lower_boxed(expr: Box<Expr<Typed>>) -> Box<Expr<Typed>> {
    Box::new(lower(*expr))
}

fn lower_all(exprs: Vec<Expr<Typed>>) -> Vec<Expr<Typed>> {
    exprs.into_iter().map(lower).collect()
}

fn lower_stmt(stmt: Stmt<Typed>) -> Stmt<Typed> {
    let kind = match stmt.kind {
        StmtKind::Let { name, ty, value } => StmtKind::Let {
            name,
            ty,
            value: lower(value),
        },
        StmtKind::Assign { target, op, value } => StmtKind::Assign {
            target: lower(target),
            op,
            value: lower(value),
        },
        StmtKind::Expr(expr) => StmtKind::Expr(lower(expr)),
    };
    Stmt {
        kind,
        pos: stmt.pos,
    }
}

fn lower_binary(op: BinaryOp, lhs: Expr<Typed>, rhs: Expr<Typed>) -> ExprKind<Typed> {
    if op == BinaryOp::Add && *lhs.ty() == Type::Str && *rhs.ty() == Type::Str {
        return ExprKind::Prim {
            op: PrimOp::StrConcat,
            args: vec![lhs, rhs],
        };
    }

    let float = *lhs.ty() == Type::Float || *rhs.ty() == Type::Float;
    let prim = if float {
        match op {
            BinaryOp::Add => Some(PrimOp::F64Add),
            BinaryOp::Sub => Some(PrimOp::F64Sub),
            BinaryOp::Mul => Some(PrimOp::F64Mul),
            BinaryOp::Div => Some(PrimOp::F64Div),
            BinaryOp::Eq => Some(PrimOp::F64Eq),
            BinaryOp::Lt => Some(PrimOp::F64Lt),
            BinaryOp::Le => Some(PrimOp::F64Le),
            BinaryOp::Gt => Some(PrimOp::F64Gt),
            BinaryOp::Ge => Some(PrimOp::F64Ge),
            _ => None,
        }
    } else {
        match op {
            BinaryOp::Add => Some(PrimOp::I32Add),
            BinaryOp::Sub => Some(PrimOp::I32Sub),
            BinaryOp::Mul => Some(PrimOp::I32Mul),
            BinaryOp::Div => Some(PrimOp::I32DivS),
            BinaryOp::Rem => Some(PrimOp::I32RemS),
            BinaryOp::Eq => Some(PrimOp::I32Eq),
            BinaryOp::Lt => Some(PrimOp::I32LtS),
            BinaryOp::Le => Some(PrimOp::I32LeS),
            BinaryOp::Gt => Some(PrimOp::I32GtS),
            BinaryOp::Ge => Some(PrimOp::I32GeS),
            _ => None,
        }
    };

    match prim {
        Some(prim) if float => ExprKind::Prim {
            op: prim,
            args: vec![to_float(lhs), to_float(rhs)],
        },
        Some(prim) => ExprKind::Prim {
            op: prim,
            args: vec![lhs, rhs],
        },
        // Ill-typed; left for the code generator to reject.
        None => ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

/// Wraps an int operand in a conversion; float operands pass through.
fn to_float(expr: Expr<Typed>) -> Expr<Typed> {
    if *expr.ty() != Type::Int {
        return expr;
    }
    let pos = expr.pos;
    Expr::typed(
        ExprKind::Prim {
            op: PrimOp::F64ConvertI32S,
            args: vec![expr],
        },
        pos,
        Type::Float,
    )
}
