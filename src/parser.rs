use crate::{
    ast::{
        BinaryOp, Block, Decl, Expr, ExprKind, Func, Ident, Lit, Module, Param, Stmt, StmtKind,
        TypeNode, UnaryOp,
    },
    error::ParseError,
    token::{Pos, Span, Token, TokenKind},
    types::Type,
};

type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Parses a whole module. Stops at the first grammar violation.
pub fn parse(tokens: &[Token]) -> Result<Module> {
    let mut p = Parser::new(tokens);
    let module = p.parse_module()?;
    p.consume(&TokenKind::Eof, "end of input")?;
    Ok(module)
}

/// Parses a single expression spanning the whole token sequence.
pub fn parse_expr(tokens: &[Token]) -> Result<Expr> {
    let mut p = Parser::new(tokens);
    let expr = p.parse_expr()?;
    p.consume(&TokenKind::Eof, "end of input")?;
    Ok(expr)
}

struct Parser<'tok> {
    tokens: &'tok [Token],
    cursor: usize,
    eof: Token,
}

impl Parser<'_> {
    fn parse_module(&mut self) -> Result<Module> {
        let mut decls = Vec::with_capacity(8);
        while !self.is(&TokenKind::Eof) {
            decls.push(self.parse_decl()?);
            self.take(&TokenKind::Semicolon);
        }
        Ok(Module { decls })
    }

    fn parse_decl(&mut self) -> Result<Decl> {
        let let_token = self.consume(&TokenKind::Let, "`let`")?;
        let name = self.parse_ident()?;
        let ty = self.parse_annotation()?;
        self.consume(&TokenKind::Assign, "`=`")?;
        let expr = self.parse_expr()?;
        Ok(Decl {
            name,
            ty,
            expr,
            pos: let_token.pos,
        })
    }

    /// Parses an optional `: type`.
    fn parse_annotation(&mut self) -> Result<Option<TypeNode>> {
        if self.take(&TokenKind::Colon) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.peek();
        match &token.kind {
            TokenKind::Ident(name) => {
                let ident = Ident::new(name.clone(), token.pos);
                self.advance();
                Ok(ident)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_type(&mut self) -> Result<TypeNode> {
        if !self.starts_type() {
            return Err(self.unexpected("type"));
        }
        let token = self.advance();
        let ty = match token.kind {
            TokenKind::IntTy => Type::Int,
            TokenKind::FloatTy => Type::Float,
            TokenKind::StrTy => Type::Str,
            TokenKind::BoolTy => Type::Bool,
            TokenKind::CharTy => Type::Char,
            TokenKind::VoidTy => Type::Void,

            // Void `()`, tuple `(a, b)` or parenthesized `(a)`
            TokenKind::LParen => {
                if self.take(&TokenKind::RParen) {
                    Type::Void
                } else {
                    let first = self.parse_type()?.ty;
                    if self.take(&TokenKind::Comma) {
                        let mut fields = vec![first];
                        fields.extend(
                            self.parse_list(&TokenKind::RParen, |p| p.parse_type())?
                                .into_iter()
                                .map(|node| node.ty),
                        );
                        Type::Tuple(fields)
                    } else {
                        self.consume(&TokenKind::RParen, "`)`")?;
                        first
                    }
                }
            }

            // Array: [elem]
            TokenKind::LBracket => {
                let elem = self.parse_type()?.ty;
                self.consume(&TokenKind::RBracket, "`]`")?;
                Type::array_of(elem)
            }

            // Function: fn (params) [ret]
            TokenKind::Fn => {
                self.consume(&TokenKind::LParen, "`(`")?;
                let params = if self.take(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_list(&TokenKind::RParen, |p| p.parse_type())?
                };
                let ret = if self.starts_type() {
                    self.parse_type()?.ty
                } else {
                    Type::Void
                };
                Type::func(params.into_iter().map(|node| node.ty), ret)
            }

            _ => unreachable!("`starts_type` admits only type tokens"),
        };
        Ok(TypeNode::new(ty, token.pos))
    }

    /// Whether the current token can begin a type.
    fn starts_type(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::IntTy
                | TokenKind::FloatTy
                | TokenKind::StrTy
                | TokenKind::BoolTy
                | TokenKind::CharTy
                | TokenKind::VoidTy
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Fn
        )
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let lhs_token = self.advance();
        let mut lhs = self.parse_nud(&lhs_token)?;

        loop {
            let op_token = self.peek().clone();

            if let Some((lbp, rbp)) = Self::infix_binding_power(&op_token.kind) {
                if lbp < min_bp {
                    // Operator binds less tightly than the minimum required
                    break;
                }

                self.advance(); // Operator
                lhs = self.parse_led(&op_token, lhs, rbp)?;
            } else {
                // Not an infix operator or binds too loosely
                break;
            }
        }

        Ok(lhs)
    }

    /// nud: Parses tokens that start an expression
    /// (prefix operators, literals, grouping)
    fn parse_nud(&mut self, token: &Token) -> Result<Expr> {
        let pos = token.pos;
        let kind = match &token.kind {
            TokenKind::Ident(name) => ExprKind::Ident(Ident::new(name.clone(), pos)),
            TokenKind::Int(val) => ExprKind::Lit(Lit::Int(*val)),
            TokenKind::Float(val) => ExprKind::Lit(Lit::Float(*val)),
            TokenKind::Str(val) => ExprKind::Lit(Lit::Str(val.clone())),
            TokenKind::Char(val) => ExprKind::Lit(Lit::Char(*val)),
            TokenKind::Bool(val) => ExprKind::Lit(Lit::Bool(*val)),

            // Void `()`, grouping `(expr)` or tuple `(expr, expr...)`
            TokenKind::LParen => {
                if self.take(&TokenKind::RParen) {
                    ExprKind::Lit(Lit::Void)
                } else {
                    let first = self.parse_expr()?;
                    if self.take(&TokenKind::Comma) {
                        let mut items = vec![first];
                        items.extend(self.parse_list(&TokenKind::RParen, Parser::parse_expr)?);
                        ExprKind::Tuple(items)
                    } else {
                        self.consume(&TokenKind::RParen, "`)`")?;
                        ExprKind::Paren(Box::new(first))
                    }
                }
            }

            // Array literal: [expr, ...]
            TokenKind::LBracket => {
                let items = self.parse_list(&TokenKind::RBracket, Parser::parse_expr)?;
                ExprKind::Array(items)
            }

            // Array allocation: new type[len]
            TokenKind::New => {
                let elem = self.parse_type()?;
                self.consume(&TokenKind::LBracket, "`[`")?;
                let len = self.parse_expr()?;
                self.consume(&TokenKind::RBracket, "`]`")?;
                ExprKind::NewArray {
                    elem,
                    len: Box::new(len),
                }
            }

            TokenKind::Fn => ExprKind::Func(self.parse_func(pos)?),

            // Conditional: if expr then expr [else expr]
            TokenKind::If => {
                let predicate = self.parse_expr()?;
                self.consume(&TokenKind::Then, "`then`")?;
                let then_arm = self.parse_expr()?;
                let else_arm = if self.take(&TokenKind::Else) {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                ExprKind::Cond {
                    predicate: Box::new(predicate),
                    then_arm: Box::new(then_arm),
                    else_arm,
                }
            }

            // Loop: while expr block
            TokenKind::While => {
                let predicate = self.parse_expr()?;
                let body = self.parse_block_expr()?;
                ExprKind::While {
                    predicate: Box::new(predicate),
                    body: Box::new(body),
                }
            }

            // Range loop: for ID in expr..expr block
            TokenKind::For => {
                let var = self.parse_ident()?;
                self.consume(&TokenKind::In, "`in`")?;
                let start = self.parse_expr()?;
                self.consume(&TokenKind::DotDot, "`..`")?;
                let end = self.parse_expr()?;
                let body = self.parse_block_expr()?;
                ExprKind::For {
                    var,
                    start: Box::new(start),
                    end: Box::new(end),
                    body: Box::new(body),
                }
            }

            TokenKind::Break => ExprKind::Break,

            TokenKind::LBrace => ExprKind::Block(self.parse_block_body()?),

            // Prefix operators: -, +, !
            kind @ (TokenKind::Minus | TokenKind::Plus | TokenKind::Bang) => {
                let op = match kind {
                    TokenKind::Minus => UnaryOp::Neg,
                    TokenKind::Plus => UnaryOp::Plus,
                    _ => UnaryOp::Not,
                };
                let expr = self.parse_expr_bp(PREFIX_BINDING_POWER)?;
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                }
            }

            _ => return Err(unexpected_token(token, "expression")),
        };

        Ok(Expr::new(kind, pos))
    }

    /// led: Parses tokens that follow a left-hand-side expression
    /// (infix/postfix operators)
    fn parse_led(&mut self, op_token: &Token, lhs: Expr, rbp: u8) -> Result<Expr> {
        let pos = lhs.pos;
        let kind = match op_token.kind {
            // Call: expr(args)
            TokenKind::LParen => {
                let args = if self.take(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_list(&TokenKind::RParen, Parser::parse_expr)?
                };
                ExprKind::Call {
                    callee: Box::new(lhs),
                    args,
                }
            }

            // Index: expr[index]
            TokenKind::LBracket => {
                let index = self.parse_expr()?;
                self.consume(&TokenKind::RBracket, "`]`")?;
                ExprKind::Index {
                    target: Box::new(lhs),
                    index: Box::new(index),
                }
            }

            ref kind => {
                let Some(op) = binary_op(kind) else {
                    return Err(unexpected_token(op_token, "operator"));
                };
                // Parse right operand with correct precedence
                let rhs = self.parse_expr_bp(rbp)?;
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
        };
        Ok(Expr::new(kind, pos))
    }

    /// Parses `(params) [ret] block` after the `fn` keyword.
    fn parse_func(&mut self, pos: Pos) -> Result<Func> {
        self.consume(&TokenKind::LParen, "`(`")?;
        let params = if self.take(&TokenKind::RParen) {
            Vec::new()
        } else {
            self.parse_list(&TokenKind::RParen, |p| {
                let name = p.parse_ident()?;
                let ty = p.parse_type()?;
                Ok(Param { name, ty })
            })?
        };
        let ret = if self.is(&TokenKind::LBrace) {
            TypeNode::new(Type::Void, pos)
        } else {
            self.parse_type()?
        };
        let body = self.parse_block_expr()?;
        Ok(Func {
            params,
            ret,
            body: Box::new(body),
        })
    }

    fn parse_block_expr(&mut self) -> Result<Expr> {
        let pos = self.consume(&TokenKind::LBrace, "`{`")?.pos;
        let block = self.parse_block_body()?;
        Ok(Expr::new(ExprKind::Block(block), pos))
    }

    /// Parses the statements of a block whose `{` was already consumed,
    /// including the closing `}`.
    fn parse_block_body(&mut self) -> Result<Block> {
        let mut stmts = Vec::new();
        let mut value = None;

        while !self.take(&TokenKind::RBrace) {
            let pos = self.peek().pos;

            if self.take(&TokenKind::Let) {
                let name = self.parse_ident()?;
                let ty = self.parse_annotation()?;
                self.consume(&TokenKind::Assign, "`=`")?;
                let value = self.parse_expr()?;
                stmts.push(Stmt {
                    kind: StmtKind::Let { name, ty, value },
                    pos,
                });
                if self.end_of_stmt()? {
                    break;
                }
                continue;
            }

            let expr = self.parse_expr()?;

            if let Some(op) = assign_op(&self.peek().kind) {
                if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Index { .. }) {
                    return Err(ParseError::new("invalid assignment target", expr.pos));
                }
                self.advance();
                let value = self.parse_expr()?;
                stmts.push(Stmt {
                    kind: StmtKind::Assign {
                        target: expr,
                        op,
                        value,
                    },
                    pos,
                });
                if self.end_of_stmt()? {
                    break;
                }
                continue;
            }

            if self.take(&TokenKind::Semicolon) {
                stmts.push(Stmt {
                    kind: StmtKind::Expr(expr),
                    pos,
                });
                continue;
            }

            self.consume(&TokenKind::RBrace, "`;` or `}`")?;
            value = Some(Box::new(expr));
            break;
        }

        Ok(Block { stmts, value })
    }

    /// Consumes the terminator of a statement. Returns true if it closed the
    /// block.
    fn end_of_stmt(&mut self) -> Result<bool> {
        if self.take(&TokenKind::Semicolon) {
            return Ok(false);
        }
        self.consume(&TokenKind::RBrace, "`;` or `}`")?;
        Ok(true)
    }

    /// Parses `item (, item)*` and then the end delimiter, which is consumed.
    fn parse_list<T>(
        &mut self,
        end_delim: &TokenKind,
        mut parse_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        loop {
            items.push(parse_item(self)?);
            if self.take(&TokenKind::Comma) {
                continue;
            }
            if self.take(end_delim) {
                return Ok(items);
            }
            let expected = format!("`,` or {}", end_delim.describe());
            return Err(self.unexpected(&expected));
        }
    }

    fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8)> {
        let bp = match kind {
            TokenKind::OrOr => (1, 2),
            TokenKind::AndAnd => (3, 4),
            TokenKind::EqEq | TokenKind::NotEq => (5, 6),
            TokenKind::Less | TokenKind::LessEq | TokenKind::Greater | TokenKind::GreaterEq => {
                (7, 8)
            }
            TokenKind::Plus | TokenKind::Minus => (9, 10),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (11, 12),
            // Postfix call and index bind tighter than any prefix operator.
            TokenKind::LParen | TokenKind::LBracket => (15, 16),
            _ => return None,
        };
        Some(bp)
    }
}

fn unexpected_token(found: &Token, construct: &str) -> ParseError {
    ParseError::new(
        format!("expected {construct}, found {}", found.kind.describe()),
        found.pos,
    )
}

/// Prefix operators bind tighter than any binary operator.
const PREFIX_BINDING_POWER: u8 = 13;

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Less => BinaryOp::Lt,
        TokenKind::LessEq => BinaryOp::Le,
        TokenKind::Greater => BinaryOp::Gt,
        TokenKind::GreaterEq => BinaryOp::Ge,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::OrOr => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

/// Maps `=` to `Some(None)` and compound operators to `Some(Some(op))`.
fn assign_op(kind: &TokenKind) -> Option<Option<BinaryOp>> {
    let op = match kind {
        TokenKind::Assign => None,
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::StarAssign => Some(BinaryOp::Mul),
        TokenKind::SlashAssign => Some(BinaryOp::Div),
        TokenKind::PercentAssign => Some(BinaryOp::Rem),
        _ => return None,
    };
    Some(op)
}

impl<'tok> Parser<'tok> {
    fn new(tokens: &'tok [Token]) -> Parser<'tok> {
        // A sequence that lacks its trailing `Eof` still ends somewhere.
        let (lo, pos) = tokens
            .last()
            .map_or((0, Pos::new(1, 1)), |t| (t.span().hi(), t.pos));
        Parser {
            tokens,
            cursor: 0,
            eof: Token::new(TokenKind::Eof, Span::new_of_length(lo, 0), pos),
        }
    }

    /// Returns the current token.
    fn peek(&self) -> &Token {
        self.tokens.get(self.cursor).unwrap_or(&self.eof)
    }

    /// Returns the current token and advances. Never moves past the end.
    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.cursor += 1;
        }
        token
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: &TokenKind) -> bool {
        self.peek().kind == *expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: &TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails
    /// naming the expected construct.
    fn consume(&mut self, expect: &TokenKind, construct: &str) -> Result<Token> {
        if self.is(expect) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(construct))
        }
    }

    /// Builds the error for the current token.
    fn unexpected(&self, construct: &str) -> ParseError {
        unexpected_token(self.peek(), construct)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use parser;

        fn precedence_mul_over_add() {
            let expr = "1 + 2 * 3";
            let tree_ok = "
                binary Add (1:1)
                  int 1 (1:1)
                  binary Mul (1:5)
                    int 2 (1:5)
                    int 3 (1:9)
            ";
        }

        fn binary_operators_are_left_associative() {
            let expr = "a - b - c";
            let tree_ok = "
                binary Sub (1:1)
                  binary Sub (1:1)
                    ident a (1:1)
                    ident b (1:5)
                  ident c (1:9)
            ";
        }

        fn logical_precedence() {
            let expr = "a || b && c == d";
            let tree_ok = "
                binary Or (1:1)
                  ident a (1:1)
                  binary And (1:6)
                    ident b (1:6)
                    binary Eq (1:11)
                      ident c (1:11)
                      ident d (1:16)
            ";
        }

        fn postfix_binds_tighter_than_prefix() {
            let expr = "-a(1)[0]";
            let tree_ok = "
                unary Neg (1:1)
                  index (1:2)
                    call (1:2)
                      ident a (1:2)
                      arguments
                        int 1 (1:4)
                    int 0 (1:7)
            ";
        }

        fn tuples_and_void() {
            let expr = "((1, 'a'), ())";
            let tree_ok = "
                tuple (1:1)
                  tuple (1:2)
                    int 1 (1:3)
                    char 'a' (1:6)
                  void (1:12)
            ";
        }

        fn grouping_is_kept_as_paren() {
            let expr = "(1 + 2) * 3";
            let tree_ok = "
                binary Mul (1:1)
                  paren (1:1)
                    binary Add (1:2)
                      int 1 (1:2)
                      int 2 (1:6)
                  int 3 (1:11)
            ";
        }

        fn for_loop_with_break() {
            let expr = "for i in 0..10 { if i == 5 then break; }";
            let tree_ok = "
                for i (1:1)
                  int 0 (1:10)
                  int 10 (1:13)
                  block (1:16)
                    cond (1:18)
                      binary Eq (1:21)
                        ident i (1:21)
                        int 5 (1:26)
                      break (1:33)
            ";
        }

        fn recursive_function_program() {
            let program = indoc! {"
                let main = fn (n int) int {
                  let x: [int] = new int[n];
                  x[0] += 1;
                  if n < 2 then 1 else n * main(n - 1)
                }
            "};
            let tree_ok = "
                let main (1:1)
                  fn (n: int) int (1:12)
                    block (1:27)
                      let x: [int] (2:3)
                        new int (2:18)
                          ident n (2:26)
                      assign += (3:3)
                        index (3:3)
                          ident x (3:3)
                          int 0 (3:5)
                        int 1 (3:11)
                      value
                        cond (4:3)
                          binary Lt (4:6)
                            ident n (4:6)
                            int 2 (4:10)
                          int 1 (4:17)
                          binary Mul (4:24)
                            ident n (4:24)
                            call (4:28)
                              ident main (4:28)
                              arguments
                                binary Sub (4:33)
                                  ident n (4:33)
                                  int 1 (4:37)
            ";
        }

        fn annotated_declarations() {
            let program = indoc! {"
                let pair: (int, fn ([str]) bool) = (1, f);
                let unit: () = ()
            "};
            let tree_ok = "
                let pair: (int, fn ([str]) bool) (1:1)
                  tuple (1:36)
                    int 1 (1:37)
                    ident f (1:40)
                let unit: void (2:1)
                  void (2:16)
            ";
        }

        fn while_loop() {
            let expr = "while x < 3 { x = x + 1 }";
            let tree_ok = "
                while (1:1)
                  binary Lt (1:7)
                    ident x (1:7)
                    int 3 (1:11)
                  block (1:13)
                    assign (1:15)
                      ident x (1:15)
                      binary Add (1:19)
                        ident x (1:19)
                        int 1 (1:23)
            ";
        }

        fn missing_expression() {
            let program = "let x = ;";
            let error = "1:9: parse error: expected expression, found `;`";
        }

        fn missing_let() {
            let program = "main";
            let error = "1:1: parse error: expected `let`, found identifier `main`";
        }

        fn unterminated_parameter_list() {
            let program = "let f = fn (a int { a }";
            let error = "1:19: parse error: expected `,` or `)`, found `{`";
        }

        fn missing_statement_separator() {
            let expr = "{ let x = 1 x }";
            let error = "1:13: parse error: expected `;` or `}`, found identifier `x`";
        }

        fn invalid_assignment_target() {
            let expr = "{ 1 + 2 = 3 }";
            let error = "1:3: parse error: invalid assignment target";
        }

        fn trailing_tokens_after_expression() {
            let expr = "1 2";
            let error = "1:3: parse error: expected end of input, found int literal `2`";
        }
    );
}
