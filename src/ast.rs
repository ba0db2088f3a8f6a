// module ::= (decl ';'?)*
// decl ::= let ID [':' type] '=' expr
// type ::= int | float | str | bool | char | void
//        | '(' ')' | '(' type (',' type)+ ')' | '[' type ']'
//        | fn '(' [type (',' type)*] ')' [type]
// expr ::= literal | ID | '(' ')' | '(' expr ')' | '(' expr (',' expr)+ ')'
//        | '[' expr (',' expr)* ']' | new type '[' expr ']'
//        | fn '(' [ID type (',' ID type)*] ')' [type] block
//        | if expr then expr [else expr]
//        | while expr block
//        | for ID in expr '..' expr block
//        | break
//        | block
//        | unop expr | expr binop expr
//        | expr '(' [expr (',' expr)*] ')' | expr '[' expr ']'
// block ::= '{' (stmt ';')* [stmt | expr] '}'
// stmt ::= let ID [':' type] '=' expr | expr assignop expr | expr

// Precedence
//
// call, index
// - + !  (prefix)
// * / %
// + -
// < <= > >=
// == !=
// &&
// ||

use std::fmt::Debug;

use crate::{token::Pos, types::Type};

/// Per-stage information attached to the tree.
pub trait Info: Clone + Debug + PartialEq {
    /// Stored on every expression.
    type Expr: Clone + Debug + PartialEq;
}

/// Produced by the parser.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Untyped;

impl Info for Untyped {
    type Expr = ();
}

/// Produced by the type checker. Every expression knows its type.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Typed;

impl Info for Typed {
    type Expr = Type;
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Module<I: Info = Untyped> {
    pub decls: Vec<Decl<I>>,
}

/// A top-level `let` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Decl<I: Info = Untyped> {
    pub name: Ident,
    pub ty: Option<TypeNode>,
    pub expr: Expr<I>,
    pub pos: Pos,
}

impl<I: Info> Decl<I> {
    /// Returns the function literal if this declaration defines a function.
    pub fn as_func(&self) -> Option<&Func<I>> {
        match &self.expr.kind {
            ExprKind::Func(func) => Some(func),
            ExprKind::Paren(inner) => match &inner.kind {
                ExprKind::Func(func) => Some(func),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr<I: Info = Untyped> {
    pub kind: ExprKind<I>,
    pub pos: Pos,
    pub info: I::Expr,
}

impl Expr<Untyped> {
    pub fn new(kind: ExprKind<Untyped>, pos: Pos) -> Self {
        Expr {
            kind,
            pos,
            info: (),
        }
    }
}

impl Expr<Typed> {
    pub fn typed(kind: ExprKind<Typed>, pos: Pos, ty: Type) -> Self {
        Expr {
            kind,
            pos,
            info: ty,
        }
    }

    pub fn ty(&self) -> &Type {
        &self.info
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind<I: Info = Untyped> {
    Lit(Lit),
    Ident(Ident),
    Tuple(Vec<Expr<I>>),
    /// Non empty list of elements.
    Array(Vec<Expr<I>>),
    NewArray {
        elem: TypeNode,
        len: Box<Expr<I>>,
    },
    Func(Func<I>),
    Call {
        callee: Box<Expr<I>>,
        args: Vec<Expr<I>>,
    },
    Index {
        target: Box<Expr<I>>,
        index: Box<Expr<I>>,
    },
    Cond {
        predicate: Box<Expr<I>>,
        then_arm: Box<Expr<I>>,
        /// Only `None` before desugaring.
        else_arm: Option<Box<Expr<I>>>,
    },
    While {
        predicate: Box<Expr<I>>,
        body: Box<Expr<I>>,
    },
    /// Surface sugar, removed by `desugar_before`.
    For {
        var: Ident,
        start: Box<Expr<I>>,
        end: Box<Expr<I>>,
        body: Box<Expr<I>>,
    },
    Break,
    Block(Block<I>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr<I>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr<I>>,
        rhs: Box<Expr<I>>,
    },
    /// Surface sugar, removed by `desugar_before`.
    Paren(Box<Expr<I>>),
    /// An operation with resolved operand types, produced by `desugar_after`.
    Prim {
        op: PrimOp,
        args: Vec<Expr<I>>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    Int(i32),
    Float(f64),
    Str(Box<str>),
    Char(char),
    Bool(bool),
    /// `()`
    Void,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Func<I: Info = Untyped> {
    pub params: Vec<Param>,
    pub ret: TypeNode,
    pub body: Box<Expr<I>>,
}

impl<I: Info> Func<I> {
    pub fn signature(&self) -> Type {
        Type::Func(
            self.params.iter().map(|p| p.ty.ty.clone()).collect(),
            Box::new(self.ret.ty.clone()),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeNode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block<I: Info = Untyped> {
    pub stmts: Vec<Stmt<I>>,
    /// Trailing expression without a semicolon; the block's value.
    pub value: Option<Box<Expr<I>>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt<I: Info = Untyped> {
    pub kind: StmtKind<I>,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind<I: Info = Untyped> {
    Let {
        name: Ident,
        ty: Option<TypeNode>,
        value: Expr<I>,
    },
    Assign {
        target: Expr<I>,
        /// `Some` for compound assignments such as `+=`, before desugaring.
        op: Option<BinaryOp>,
        value: Expr<I>,
    },
    Expr(Expr<I>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Operations the code generator maps one to one onto instructions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimOp {
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32RemS,
    I32Eq,
    I32LtS,
    I32LeS,
    I32GtS,
    I32GeS,
    I32Eqz,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Eq,
    F64Lt,
    F64Le,
    F64Gt,
    F64Ge,
    F64Neg,
    F64ConvertI32S,
    /// Calls the generated string concatenation helper.
    StrConcat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
    pub name: Box<str>,
    pub pos: Pos,
}

impl Ident {
    pub fn new(name: impl Into<Box<str>>, pos: Pos) -> Ident {
        Ident {
            name: name.into(),
            pos,
        }
    }
}

/// A type annotation in the source.
#[derive(Clone, Debug)]
pub struct TypeNode {
    pub ty: Type,
    pub pos: Pos,
}

impl TypeNode {
    pub fn new(ty: Type, pos: Pos) -> TypeNode {
        TypeNode { ty, pos }
    }
}

/// Annotations compare structurally; positions are ignored.
impl PartialEq for TypeNode {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}
