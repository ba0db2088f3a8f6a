use std::{fmt, ops::Range};

#[derive(Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    lo: usize,
    len: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, pos: Pos) -> Token {
        Token {
            kind,
            pos,
            len: span.len,
            lo: span.lo,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {}, {})", self.kind, self.span(), self.pos)
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap_or(u32::MAX))
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

/// A 1-based line and column pair. Columns count characters, not bytes.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub const fn new(line: u32, column: u32) -> Pos {
        Pos { line, column }
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({self})")
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    Let,
    Fn,
    If,
    Then,
    Else,
    While,
    For,
    In,
    Break,
    New,

    // Type keywords
    IntTy,
    FloatTy,
    StrTy,
    BoolTy,
    CharTy,
    VoidTy,

    // Literals
    Ident(Box<str>),
    Int(i32),
    Float(f64),
    Str(Box<str>),
    Char(char),
    Bool(bool),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,
    DotDot,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,

    Eof,
}

impl TokenKind {
    /// Short human description used by parse errors.
    pub fn describe(&self) -> String {
        use TokenKind::*;
        let s = match self {
            Ident(name) => return format!("identifier `{name}`"),
            Int(val) => return format!("int literal `{val}`"),
            Float(val) => return format!("float literal `{val}`"),
            Str(val) => return format!("string literal {val:?}"),
            Char(val) => return format!("char literal {val:?}"),
            Bool(val) => return format!("`{val}`"),
            Eof => return "end of input".to_owned(),
            Let => "let",
            Fn => "fn",
            If => "if",
            Then => "then",
            Else => "else",
            While => "while",
            For => "for",
            In => "in",
            Break => "break",
            New => "new",
            IntTy => "int",
            FloatTy => "float",
            StrTy => "str",
            BoolTy => "bool",
            CharTy => "char",
            VoidTy => "void",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Bang => "!",
            Assign => "=",
            PlusAssign => "+=",
            MinusAssign => "-=",
            StarAssign => "*=",
            SlashAssign => "/=",
            PercentAssign => "%=",
            EqEq => "==",
            NotEq => "!=",
            Less => "<",
            LessEq => "<=",
            Greater => ">",
            GreaterEq => ">=",
            AndAnd => "&&",
            OrOr => "||",
            DotDot => "..",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            LBrace => "{",
            RBrace => "}",
            Comma => ",",
            Colon => ":",
            Semicolon => ";",
        };
        format!("`{s}`")
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "let" => TokenKind::Let,
    "fn" => TokenKind::Fn,
    "if" => TokenKind::If,
    "then" => TokenKind::Then,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "for" => TokenKind::For,
    "in" => TokenKind::In,
    "break" => TokenKind::Break,
    "new" => TokenKind::New,
    "int" => TokenKind::IntTy,
    "float" => TokenKind::FloatTy,
    "str" => TokenKind::StrTy,
    "bool" => TokenKind::BoolTy,
    "char" => TokenKind::CharTy,
    "void" => TokenKind::VoidTy,
    "true" => TokenKind::Bool(true),
    "false" => TokenKind::Bool(false),
};
