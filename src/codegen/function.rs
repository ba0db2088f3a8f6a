use std::collections::HashMap;

use wasm_encoder::{BlockType, Function, Instruction, MemArg, ValType};

use super::{address, char_value, runtime::Helper, val_type, Generator, Result, TopLevel};
use crate::{
    ast::{Block, Expr, ExprKind, Lit, PrimOp, Stmt, StmtKind, Typed},
    error::CodegenError,
    types::Type,
};

/// A name bound inside a function body.
#[derive(Debug, Clone, Copy)]
enum Var {
    Local(u32),
    /// A `void` binding; it has no runtime representation.
    Void,
}

/// Lowers one function body to wasm instructions.
pub(crate) struct FuncBuilder<'g> {
    cx: &'g mut Generator,
    /// Types of the locals declared after the parameters.
    locals: Vec<ValType>,
    next_local: u32,
    scopes: Vec<HashMap<Box<str>, Var>>,
    instructions: Vec<Instruction<'static>>,
    /// Number of enclosing structured control instructions.
    depth: u32,
    /// Depth of the exit block of each enclosing loop, innermost last.
    loop_exits: Vec<u32>,
}

impl<'g> FuncBuilder<'g> {
    /// Starts a function whose parameters are bound in order. `void`
    /// parameters take no local slot.
    pub(crate) fn new<'p>(
        cx: &'g mut Generator,
        params: impl IntoIterator<Item = (&'p str, Option<ValType>)>,
    ) -> FuncBuilder<'g> {
        let mut scope = HashMap::new();
        let mut next_local = 0;
        for (name, ty) in params {
            let var = match ty {
                Some(_) => {
                    next_local += 1;
                    Var::Local(next_local - 1)
                }
                None => Var::Void,
            };
            scope.insert(Box::from(name), var);
        }
        FuncBuilder {
            cx,
            locals: Vec::new(),
            next_local,
            scopes: vec![scope],
            instructions: Vec::with_capacity(64),
            depth: 0,
            loop_exits: Vec::new(),
        }
    }

    /// Lowers `body`, whose value becomes the function result.
    pub(crate) fn finish_body(mut self, body: &Expr<Typed>) -> Result<Function> {
        self.expr(body)?;
        Ok(self.finish())
    }

    pub(crate) fn finish(self) -> Function {
        let mut locals: Vec<(u32, ValType)> = Vec::new();
        for ty in self.locals {
            match locals.last_mut() {
                Some((count, last)) if *last == ty => *count += 1,
                _ => locals.push((1, ty)),
            }
        }
        let mut func = Function::new(locals);
        for instruction in &self.instructions {
            func.instruction(instruction);
        }
        func.instruction(&Instruction::End);
        func
    }

    pub(crate) fn emit(&mut self, instruction: Instruction<'static>) {
        self.instructions.push(instruction);
    }

    pub(crate) fn new_local(&mut self, ty: ValType) -> u32 {
        self.locals.push(ty);
        self.next_local += 1;
        self.next_local - 1
    }

    /// Calls a runtime helper, generating it if this is its first use.
    pub(crate) fn call_helper(&mut self, helper: Helper) {
        let index = self.cx.helper(helper);
        self.emit(Instruction::Call(index));
    }

    fn expr(&mut self, expr: &Expr<Typed>) -> Result<()> {
        match &expr.kind {
            ExprKind::Lit(lit) => self.lit(lit),
            ExprKind::Ident(ident) => self.load_var(&ident.name)?,
            ExprKind::Tuple(items) => self.tuple(items)?,
            ExprKind::Array(items) => self.array(items, expr.ty())?,
            ExprKind::NewArray { elem, len } => self.new_array(&elem.ty, len)?,
            ExprKind::Func(_) => {
                return Err(CodegenError::new(format!(
                    "values of function type are not supported: {}",
                    expr.ty()
                )));
            }
            ExprKind::Call { callee, args } => self.call(callee, args)?,
            ExprKind::Index { target, index } => self.index(target, index)?,
            ExprKind::Cond {
                predicate,
                then_arm,
                else_arm,
            } => {
                let Some(else_arm) = else_arm else {
                    return Err(desugar_first("`if` without `else`"));
                };
                self.expr(predicate)?;
                let block_type = match val_type(expr.ty())? {
                    Some(ty) => BlockType::Result(ty),
                    None => BlockType::Empty,
                };
                self.emit(Instruction::If(block_type));
                self.depth += 1;
                self.expr(then_arm)?;
                self.emit(Instruction::Else);
                self.expr(else_arm)?;
                self.emit(Instruction::End);
                self.depth -= 1;
            }
            ExprKind::While { predicate, body } => {
                self.emit(Instruction::Block(BlockType::Empty));
                self.depth += 1;
                self.loop_exits.push(self.depth);
                self.emit(Instruction::Loop(BlockType::Empty));
                self.depth += 1;

                self.expr(predicate)?;
                self.emit(Instruction::I32Eqz);
                self.emit(Instruction::BrIf(1));
                self.expr(body)?;
                self.drop_value(body.ty())?;
                self.emit(Instruction::Br(0));

                self.emit(Instruction::End);
                self.depth -= 1;
                self.loop_exits.pop();
                self.emit(Instruction::End);
                self.depth -= 1;
            }
            ExprKind::Break => {
                let Some(exit) = self.loop_exits.last().copied() else {
                    return Err(CodegenError::new("`break` outside of a loop"));
                };
                self.emit(Instruction::Br(self.depth - exit));
            }
            ExprKind::Block(block) => self.block(block)?,
            ExprKind::Prim { op, args } => {
                for arg in args {
                    self.expr(arg)?;
                }
                self.prim(*op);
            }
            ExprKind::Unary { op, .. } => {
                return Err(CodegenError::new(format!(
                    "unexpected unary operator `{}`; operators must be lowered first",
                    op.symbol()
                )));
            }
            ExprKind::Binary { op, .. } => {
                return Err(CodegenError::new(format!(
                    "unexpected binary operator `{}`; operators must be lowered first",
                    op.symbol()
                )));
            }
            ExprKind::Paren(_) => return Err(desugar_first("parenthesized expression")),
            ExprKind::For { .. } => return Err(desugar_first("`for` loop")),
        }
        Ok(())
    }

    fn lit(&mut self, lit: &Lit) {
        let instruction = match lit {
            Lit::Int(val) => Instruction::I32Const(*val),
            Lit::Float(val) => Instruction::F64Const(*val),
            Lit::Bool(val) => Instruction::I32Const(i32::from(*val)),
            Lit::Char(val) => Instruction::I32Const(char_value(*val)),
            Lit::Str(val) => Instruction::I32Const(address(self.cx.intern_str(val))),
            Lit::Void => return,
        };
        self.emit(instruction);
    }

    fn lookup(&self, name: &str) -> Option<Var> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn load_var(&mut self, name: &str) -> Result<()> {
        if let Some(var) = self.lookup(name) {
            if let Var::Local(index) = var {
                self.emit(Instruction::LocalGet(index));
            }
            return Ok(());
        }
        match self.cx.top_level(name) {
            Some(TopLevel::Global(index, _)) => self.emit(Instruction::GlobalGet(index)),
            Some(TopLevel::Void) => {}
            Some(TopLevel::Func(_)) => {
                return Err(CodegenError::new(format!(
                    "values of function type are not supported: `{name}`"
                )));
            }
            None => return Err(unknown_variable(name)),
        }
        Ok(())
    }

    /// Stores the value on top of the stack into a variable.
    fn store_var(&mut self, name: &str) -> Result<()> {
        if let Some(var) = self.lookup(name) {
            if let Var::Local(index) = var {
                self.emit(Instruction::LocalSet(index));
            }
            return Ok(());
        }
        match self.cx.top_level(name) {
            Some(TopLevel::Global(index, _)) => self.emit(Instruction::GlobalSet(index)),
            Some(TopLevel::Void) => {}
            Some(TopLevel::Func(_)) => {
                return Err(CodegenError::new(format!(
                    "cannot assign to function `{name}`"
                )));
            }
            None => return Err(unknown_variable(name)),
        }
        Ok(())
    }

    fn tuple(&mut self, items: &[Expr<Typed>]) -> Result<()> {
        let ptr = self.alloc(8 * len_u32(items));
        for (offset, item) in (0..).step_by(8).zip(items) {
            match val_type(item.ty())? {
                Some(ty) => {
                    self.emit(Instruction::LocalGet(ptr));
                    self.expr(item)?;
                    self.emit(store(ty, offset));
                }
                None => self.expr(item)?,
            }
        }
        self.emit(Instruction::LocalGet(ptr));
        Ok(())
    }

    fn array(&mut self, items: &[Expr<Typed>], ty: &Type) -> Result<()> {
        let Type::Array(elem) = ty else {
            return Err(CodegenError::new(format!(
                "array literal of non-array type {ty}"
            )));
        };
        let slot = slot_size(elem);
        let len = len_u32(items);
        let ptr = self.alloc(8 + slot * len);

        self.emit(Instruction::LocalGet(ptr));
        self.emit(Instruction::I32Const(address(len)));
        self.emit(store(ValType::I32, 0));

        let elem_ty = val_type(elem)?;
        for (offset, item) in (8..).step_by(slot as usize).zip(items) {
            match elem_ty {
                Some(ty) => {
                    self.emit(Instruction::LocalGet(ptr));
                    self.expr(item)?;
                    self.emit(store(ty, offset));
                }
                None => self.expr(item)?,
            }
        }
        self.emit(Instruction::LocalGet(ptr));
        Ok(())
    }

    fn new_array(&mut self, elem: &Type, len: &Expr<Typed>) -> Result<()> {
        let slot = slot_size(elem);
        let len_local = self.new_local(ValType::I32);
        self.expr(len)?;
        self.emit(Instruction::LocalSet(len_local));

        // Negative lengths trap.
        self.emit(Instruction::LocalGet(len_local));
        self.emit(Instruction::I32Const(0));
        self.emit(Instruction::I32LtS);
        self.emit(Instruction::If(BlockType::Empty));
        self.emit(Instruction::Unreachable);
        self.emit(Instruction::End);

        let ptr = self.new_local(ValType::I32);
        self.emit(Instruction::LocalGet(len_local));
        self.emit(Instruction::I32Const(address(slot)));
        self.emit(Instruction::I32Mul);
        self.emit(Instruction::I32Const(8));
        self.emit(Instruction::I32Add);
        self.call_helper(Helper::Alloc);
        self.emit(Instruction::LocalSet(ptr));

        self.emit(Instruction::LocalGet(ptr));
        self.emit(Instruction::LocalGet(len_local));
        self.emit(store(ValType::I32, 0));
        self.emit(Instruction::LocalGet(ptr));
        Ok(())
    }

    /// Allocates `size` bytes and returns the local holding the address.
    fn alloc(&mut self, size: u32) -> u32 {
        let ptr = self.new_local(ValType::I32);
        self.emit(Instruction::I32Const(address(size)));
        self.call_helper(Helper::Alloc);
        self.emit(Instruction::LocalSet(ptr));
        ptr
    }

    fn call(&mut self, callee: &Expr<Typed>, args: &[Expr<Typed>]) -> Result<()> {
        let unsupported =
            || CodegenError::new("only direct calls of top-level functions are supported");

        let ExprKind::Ident(ident) = &callee.kind else {
            return Err(unsupported());
        };
        if self.lookup(&ident.name).is_some() {
            return Err(unsupported());
        }
        let Some(TopLevel::Func(index)) = self.cx.top_level(&ident.name) else {
            return Err(unsupported());
        };

        for arg in args {
            self.expr(arg)?;
        }
        self.emit(Instruction::Call(index));
        Ok(())
    }

    fn index(&mut self, target: &Expr<Typed>, index: &Expr<Typed>) -> Result<()> {
        match target.ty() {
            Type::Array(elem) => {
                self.element_address(target, index, elem)?;
                match val_type(elem)? {
                    Some(ty) => self.emit(load(ty, 8)),
                    None => self.emit(Instruction::Drop),
                }
            }
            Type::Str => {
                self.expr(target)?;
                self.expr(index)?;
                self.emit(Instruction::I32Add);
                self.emit(Instruction::I32Load8U(mem_arg(4, 0)));
            }
            Type::Tuple(fields) => {
                let field = match index.kind {
                    ExprKind::Lit(Lit::Int(i)) => usize::try_from(i)
                        .ok()
                        .and_then(|i| fields.get(i).map(|field| (i, field))),
                    _ => None,
                };
                let Some((i, field)) = field else {
                    return Err(CodegenError::new(
                        "tuple index must be an in-range int literal",
                    ));
                };
                self.expr(target)?;
                match val_type(field)? {
                    Some(ty) => self.emit(load(ty, 8 * len_u32(&fields[..i]))),
                    None => self.emit(Instruction::Drop),
                }
            }
            other => {
                return Err(CodegenError::new(format!(
                    "cannot index into a value of type {other}"
                )));
            }
        }
        Ok(())
    }

    /// Pushes the address of `array[index]`, minus the 8-byte header.
    fn element_address(
        &mut self,
        array: &Expr<Typed>,
        index: &Expr<Typed>,
        elem: &Type,
    ) -> Result<()> {
        self.expr(array)?;
        self.expr(index)?;
        self.emit(Instruction::I32Const(address(slot_size(elem))));
        self.emit(Instruction::I32Mul);
        self.emit(Instruction::I32Add);
        Ok(())
    }

    fn block(&mut self, block: &Block<Typed>) -> Result<()> {
        self.scopes.push(HashMap::new());
        for stmt in &block.stmts {
            self.stmt(stmt)?;
        }
        if let Some(value) = &block.value {
            self.expr(value)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt<Typed>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Let { name, value, .. } => {
                let ty = val_type(value.ty())?;
                self.expr(value)?;
                let var = match ty {
                    Some(ty) => {
                        let index = self.new_local(ty);
                        self.emit(Instruction::LocalSet(index));
                        Var::Local(index)
                    }
                    None => Var::Void,
                };
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.name.clone(), var);
                }
            }
            StmtKind::Assign { op: Some(_), .. } => {
                return Err(desugar_first("compound assignment"));
            }
            StmtKind::Assign {
                target,
                op: None,
                value,
            } => match &target.kind {
                ExprKind::Ident(ident) => {
                    self.expr(value)?;
                    self.store_var(&ident.name)?;
                }
                ExprKind::Index {
                    target: array,
                    index,
                } => {
                    let Type::Array(elem) = array.ty() else {
                        return Err(CodegenError::new(format!(
                            "cannot assign to an element of {}",
                            array.ty()
                        )));
                    };
                    self.element_address(array, index, elem)?;
                    match val_type(elem)? {
                        Some(ty) => {
                            self.expr(value)?;
                            self.emit(store(ty, 8));
                        }
                        None => {
                            self.emit(Instruction::Drop);
                            self.expr(value)?;
                        }
                    }
                }
                _ => return Err(CodegenError::new("invalid assignment target")),
            },
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                self.drop_value(expr.ty())?;
            }
        }
        Ok(())
    }

    /// Discards the value an expression of type `ty` left on the stack.
    fn drop_value(&mut self, ty: &Type) -> Result<()> {
        if val_type(ty)?.is_some() {
            self.emit(Instruction::Drop);
        }
        Ok(())
    }

    fn prim(&mut self, op: PrimOp) {
        let instruction = match op {
            PrimOp::I32Add => Instruction::I32Add,
            PrimOp::I32Sub => Instruction::I32Sub,
            PrimOp::I32Mul => Instruction::I32Mul,
            PrimOp::I32DivS => Instruction::I32DivS,
            PrimOp::I32RemS => Instruction::I32RemS,
            PrimOp::I32Eq => Instruction::I32Eq,
            PrimOp::I32LtS => Instruction::I32LtS,
            PrimOp::I32LeS => Instruction::I32LeS,
            PrimOp::I32GtS => Instruction::I32GtS,
            PrimOp::I32GeS => Instruction::I32GeS,
            PrimOp::I32Eqz => Instruction::I32Eqz,
            PrimOp::F64Add => Instruction::F64Add,
            PrimOp::F64Sub => Instruction::F64Sub,
            PrimOp::F64Mul => Instruction::F64Mul,
            PrimOp::F64Div => Instruction::F64Div,
            PrimOp::F64Eq => Instruction::F64Eq,
            PrimOp::F64Lt => Instruction::F64Lt,
            PrimOp::F64Le => Instruction::F64Le,
            PrimOp::F64Gt => Instruction::F64Gt,
            PrimOp::F64Ge => Instruction::F64Ge,
            PrimOp::F64Neg => Instruction::F64Neg,
            PrimOp::F64ConvertI32S => Instruction::F64ConvertI32S,
            PrimOp::StrConcat => {
                self.call_helper(Helper::StrConcat);
                return;
            }
        };
        self.emit(instruction);
    }
}

fn desugar_first(what: &str) -> CodegenError {
    CodegenError::new(format!("unexpected {what}; the tree must be desugared first"))
}

fn unknown_variable(name: &str) -> CodegenError {
    CodegenError::new(format!("unknown variable `{name}`"))
}

/// Bytes per array element.
fn slot_size(elem: &Type) -> u32 {
    match elem {
        Type::Float => 8,
        _ => 4,
    }
}

fn len_u32<T>(items: &[T]) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}

fn mem_arg(offset: u32, align: u32) -> MemArg {
    MemArg {
        offset: u64::from(offset),
        align,
        memory_index: 0,
    }
}

pub(crate) fn load(ty: ValType, offset: u32) -> Instruction<'static> {
    match ty {
        ValType::F64 => Instruction::F64Load(mem_arg(offset, 3)),
        _ => Instruction::I32Load(mem_arg(offset, 2)),
    }
}

pub(crate) fn store(ty: ValType, offset: u32) -> Instruction<'static> {
    match ty {
        ValType::F64 => Instruction::F64Store(mem_arg(offset, 3)),
        _ => Instruction::I32Store(mem_arg(offset, 2)),
    }
}
