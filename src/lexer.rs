use std::str::Chars;

use crate::{
    error::LexError,
    token::{Pos, Span, Token, TokenKind, KEYWORDS},
};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

type Result<T, E = LexError> = std::result::Result<T, E>;

/// Lexes the provided string into a token sequence terminated by a single
/// [`TokenKind::Eof`].
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity((src.len() / 4).min(SUGGESTED_TOKENS_CAPACITY));
    lex(src, &mut tokens)?;
    Ok(tokens)
}

/// Lexes the provided string, producing the tokens into the provided buffer.
pub fn lex(src: &str, tokens: &mut Vec<Token>) -> Result<()> {
    Lexer::new(src, tokens).lex()
}

/// The kou lexer
struct Lexer<'src, 'tok> {
    iter: Chars<'src>,
    cursor: usize,
    line: u32,
    column: u32,
    current_lo: usize,
    current_pos: Pos,
    tokens: &'tok mut Vec<Token>,
}

impl Lexer<'_, '_> {
    /// Scans the source string until the input is exhausted.
    fn lex(mut self) -> Result<()> {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            self.skip_trivia()?;
            let next = self.scan_token_kind()?;
            let is_eof = matches!(next, TokenKind::Eof);
            self.produce(next);
            if is_eof {
                return Ok(());
            }
        }
    }

    /// Tries to scan the current character.
    fn scan_token_kind(&mut self) -> Result<TokenKind> {
        use TokenKind::*;
        if self.at_end() {
            self.mark_advance();
            return Ok(Eof);
        }
        let kind = match self.mark_advance() {
            '+' => self.with_assign(Plus, PlusAssign),
            '-' => self.with_assign(Minus, MinusAssign),
            '*' => self.with_assign(Star, StarAssign),
            '/' => self.with_assign(Slash, SlashAssign),
            '%' => self.with_assign(Percent, PercentAssign),
            '=' => self.with_assign(Assign, EqEq),
            '!' => self.with_assign(Bang, NotEq),
            '<' => self.with_assign(Less, LessEq),
            '>' => self.with_assign(Greater, GreaterEq),
            '&' => match self.peek() {
                '&' => self.advance_with(AndAnd),
                _ => return Err(self.unexpected('&')),
            },
            '|' => match self.peek() {
                '|' => self.advance_with(OrOr),
                _ => return Err(self.unexpected('|')),
            },
            '.' => match self.peek() {
                '.' => self.advance_with(DotDot),
                c if c.is_ascii_digit() => self.fraction()?,
                _ => return Err(self.unexpected('.')),
            },
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            ',' => Comma,
            ':' => Colon,
            ';' => Semicolon,
            '"' => self.string()?,
            '\'' => self.char()?,
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(c),
            c if c.is_ascii_digit() => self.number(c)?,
            c => return Err(self.unexpected(c)),
        };
        Ok(kind)
    }

    /// Skips whitespace and comments. Line and column counters keep moving
    /// across them.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_second()) {
                (c, _) if c.is_whitespace() => {
                    self.advance();
                }
                ('/', '/') => {
                    while self.peek() != '\n' && !self.at_end() {
                        self.advance();
                    }
                }
                ('/', '*') => self.block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn block_comment(&mut self) -> Result<()> {
        let start = self.here();
        self.advance();
        self.advance();
        loop {
            match self.advance() {
                '*' if self.peek() == '/' => {
                    self.advance();
                    return Ok(());
                }
                '\0' if self.at_end() => {
                    return Err(LexError::new("unclosed block comment", start));
                }
                _ => (),
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind> {
        let mut buf = String::new();
        loop {
            let pos = self.here();
            match self.advance() {
                '\0' if self.at_end() => {
                    return Err(LexError::new("unclosed string literal", self.current_pos));
                }
                '"' => return Ok(TokenKind::Str(buf.into_boxed_str())),
                '\\' => buf.push(self.escape()?),
                c => buf.push(literal_char(c, pos)?),
            }
        }
    }

    fn char(&mut self) -> Result<TokenKind> {
        let pos = self.here();
        let value = match self.advance() {
            '\0' if self.at_end() => {
                return Err(LexError::new("unclosed char literal", self.current_pos));
            }
            '\'' => return Err(LexError::new("empty char literal", self.current_pos)),
            '\\' => self.escape()?,
            c => literal_char(c, pos)?,
        };
        match self.advance() {
            '\'' => Ok(TokenKind::Char(value)),
            '\0' if self.at_end() => Err(LexError::new("unclosed char literal", self.current_pos)),
            _ => Err(LexError::new(
                "char literal must contain exactly one character",
                self.current_pos,
            )),
        }
    }

    /// Decodes the character after a backslash.
    fn escape(&mut self) -> Result<char> {
        let pos = self.here();
        let decoded = match self.advance() {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '\0' if self.at_end() => return Err(LexError::new("unclosed escape sequence", pos)),
            other => {
                return Err(LexError::new(
                    format!("unknown escape sequence `\\{other}`"),
                    pos,
                ))
            }
        };
        Ok(decoded)
    }

    fn identifier_or_keyword(&mut self, first: char) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        let mut name = String::from(first);
        while valid_identifier_suffix(self.peek()) {
            name.push(self.advance());
        }
        match KEYWORDS.get(name.as_str()).cloned() {
            Some(keyword) => keyword,
            None => TokenKind::Ident(name.into_boxed_str()),
        }
    }

    fn number(&mut self, first: char) -> Result<TokenKind> {
        let mut digits = String::from(first);
        while self.peek().is_ascii_digit() {
            digits.push(self.advance());
        }
        // `0..10` is a range, not the float `0.` followed by `.10`.
        if self.peek() == '.' && self.peek_second().is_ascii_digit() {
            self.advance();
            digits.push('.');
            while self.peek().is_ascii_digit() {
                digits.push(self.advance());
            }
            return self.float(&digits);
        }
        digits.parse().map(TokenKind::Int).map_err(|_| {
            LexError::new(
                format!("integer literal `{digits}` is out of range"),
                self.current_pos,
            )
        })
    }

    /// Lexes a float which starts with its decimal point, such as `.123`.
    fn fraction(&mut self) -> Result<TokenKind> {
        let mut digits = String::from("0.");
        while self.peek().is_ascii_digit() {
            digits.push(self.advance());
        }
        self.float(&digits)
    }

    fn float(&self, digits: &str) -> Result<TokenKind> {
        digits.parse().map(TokenKind::Float).map_err(|_| {
            LexError::new(
                format!("invalid float literal `{digits}`"),
                self.current_pos,
            )
        })
    }

    /// Consumes a trailing `=` to form a compound operator.
    fn with_assign(&mut self, plain: TokenKind, compound: TokenKind) -> TokenKind {
        match self.peek() {
            '=' => self.advance_with(compound),
            _ => plain,
        }
    }

    fn unexpected(&self, c: char) -> LexError {
        LexError::new(format!("unexpected character {c:?}"), self.current_pos)
    }
}

impl Lexer<'_, '_> {
    /// Constructs a new lexer with the default state.
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok mut Vec<Token>) -> Lexer<'src, 'tok> {
        Lexer {
            iter: src.chars(),
            cursor: 0,
            line: 1,
            column: 1,
            current_lo: 0,
            current_pos: Pos::new(1, 1),
            tokens,
        }
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.current_pos = self.here();
        self.advance()
    }

    /// Whether the whole input was consumed. A `'\0'` returned by `advance`
    /// or `peek` is only the end of input if this holds.
    fn at_end(&self) -> bool {
        self.iter.as_str().is_empty()
    }

    /// Returns the next character and advances the iterator.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&self) -> char {
        self.iter.clone().next().unwrap_or('\0')
    }

    /// Returns the character after the next one without advancing.
    fn peek_second(&self) -> char {
        self.iter.clone().nth(1).unwrap_or('\0')
    }

    /// Position of the next character.
    fn here(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Produces a token using the marked bounds.
    fn produce(&mut self, kind: TokenKind) {
        let token = Token::new(kind, self.span(), self.current_pos);
        self.tokens.push(token);
    }
}

/// Checks a character written directly inside a string or char literal.
/// Strings are indexed by byte, so only ASCII is accepted.
fn literal_char(c: char, pos: Pos) -> Result<char> {
    if c == '\0' {
        Err(LexError::new(format!("unexpected character {c:?}"), pos))
    } else if !c.is_ascii() {
        Err(LexError::new(
            format!("non-ASCII character {c:?} in literal"),
            pos,
        ))
    } else {
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .expect("failed to lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/%" => [
                (Plus, 0..1, 1:1),
                (Minus, 1..2, 1:2),
                (Star, 2..3, 1:3),
                (Slash, 3..4, 1:4),
                (Percent, 4..5, 1:5),
                (Eof, 5..5, 1:6),
            ],
            "a += 1;\nb!=c" => [
                (Ident("a".into()), 0..1, 1:1),
                (PlusAssign, 2..4, 1:3),
                (Int(1), 5..6, 1:6),
                (Semicolon, 6..7, 1:7),
                (Ident("b".into()), 8..9, 2:1),
                (NotEq, 9..11, 2:2),
                (Ident("c".into()), 11..12, 2:4),
                (Eof, 12..12, 2:5),
            ],
            "for i in 0..10" => [
                (For, 0..3, 1:1),
                (Ident("i".into()), 4..5, 1:5),
                (In, 6..8, 1:7),
                (Int(0), 9..10, 1:10),
                (DotDot, 10..12, 1:11),
                (Int(10), 12..14, 1:13),
                (Eof, 14..14, 1:15),
            ],
            "/* multi\nline */ x // trailing\n  y" => [
                (Ident("x".into()), 17..18, 2:9),
                (Ident("y".into()), 33..34, 3:3),
                (Eof, 34..34, 3:4),
            ],
        });

        for (input, tokens) in cases {
            let lexed = tokenize(input).expect("failed to lex");
            assert_eq!(lexed, tokens.as_slice());
        }
    }

    #[test]
    fn literals() {
        use TokenKind::*;
        assert_eq!(
            kinds(r#"123 .123 1.5 "hello, world" 'a' '\n' true false"#),
            [
                Int(123),
                Float(0.123),
                Float(1.5),
                Str("hello, world".into()),
                Char('a'),
                Char('\n'),
                Bool(true),
                Bool(false),
                Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        use TokenKind::*;
        assert_eq!(
            kinds(r#""tab\there\n\"quoted\" \\ \0""#),
            [Str("tab\there\n\"quoted\" \\ \0".into()), Eof]
        );
    }

    #[test]
    fn keywords_and_types() {
        use TokenKind::*;
        assert_eq!(
            kinds("let fn if then else while break new int float str bool char void letter"),
            [
                Let,
                Fn,
                If,
                Then,
                Else,
                While,
                Break,
                New,
                IntTy,
                FloatTy,
                StrTy,
                BoolTy,
                CharTy,
                VoidTy,
                Ident("letter".into()),
                Eof,
            ]
        );
    }

    #[test]
    fn multiline_string_keeps_positions() {
        let tokens = tokenize("\"a\nb\" x").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".into()));
        assert_eq!(tokens[0].pos, Pos::new(1, 1));
        assert_eq!(tokens[1].pos, Pos::new(2, 4));
    }

    #[test]
    fn errors() {
        let cases: &[(&str, &str, Pos)] = &[
            ("let x = 1 $ 2", "unexpected character '$'", Pos::new(1, 11)),
            ("\n  \"open", "unclosed string literal", Pos::new(2, 3)),
            ("'ab'", "char literal must contain exactly one character", Pos::new(1, 1)),
            ("''", "empty char literal", Pos::new(1, 1)),
            ("\"\\q\"", "unknown escape sequence `\\q`", Pos::new(1, 3)),
            ("x /* never closed", "unclosed block comment", Pos::new(1, 3)),
            ("99999999999", "integer literal `99999999999` is out of range", Pos::new(1, 1)),
            ("-2147483648", "integer literal `2147483648` is out of range", Pos::new(1, 2)),
            ("a & b", "unexpected character '&'", Pos::new(1, 3)),
            (
                "let main = fn () int { 7 }\0 rest $$$",
                "unexpected character '\\0'",
                Pos::new(1, 27),
            ),
            ("\"a\0b\"", "unexpected character '\\0'", Pos::new(1, 3)),
            ("\"caf\u{e9}\"", "non-ASCII character '\u{e9}' in literal", Pos::new(1, 5)),
            ("x = '\u{e9}'", "non-ASCII character '\u{e9}' in literal", Pos::new(1, 6)),
        ];
        for &(input, message, pos) in cases {
            let error = tokenize(input).expect_err(input);
            assert_eq!(error, LexError::new(message, pos), "input: {input:?}");
        }
    }

    #[test]
    fn comments_may_hold_any_character() {
        use TokenKind::*;
        assert_eq!(kinds("/* caf\u{e9} \0 */ 1 // \0 \u{e9}"), [Int(1), Eof]);
    }

    #[test]
    fn escaped_nul_is_a_character() {
        assert_eq!(kinds("'\\0'"), [TokenKind::Char('\0'), TokenKind::Eof]);
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr, $line:literal : $col:literal)),* $(,)?]),* $(,)?
        }) => {{
            vec![$((
                $str,
                vec![
                    $(Token::new(
                        $kind,
                        Span::new_of_bounds($range.start..$range.end),
                        Pos::new($line, $col),
                    )),*
                ],
            )),*]
        }};
    }
    use cases;
}
