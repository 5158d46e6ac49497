//! Tokenizer for grading scripts.
//!
//! Newlines are significant statement separators except inside `(...)` and
//! `[...]`, where they are dropped so long calls and list literals can wrap.

use super::LanguageError;
use super::ast::Position;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Newline,
    Semicolon,
    Comma,
    Colon,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DoubleSlashAssign,
    PercentAssign,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Bang,
    AndAnd,
    OrOr,
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Int(v) => format!("number {v}"),
            Token::Float(v) => format!("number {v}"),
            Token::Str(_) => "string literal".to_string(),
            Token::Ident(name) => format!("'{name}'"),
            Token::Newline => "end of line".to_string(),
            Token::Eof => "end of script".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::DoubleStar => "**",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::DoubleSlashAssign => "//=",
            Token::PercentAssign => "%=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtE => "<=",
            Token::Gt => ">",
            Token::GtE => ">=",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: Position,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    nesting: usize,
    out: Vec<Spanned>,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LanguageError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
        nesting: 0,
        out: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.out)
}

fn syntax(message: impl Into<String>, pos: Position) -> LanguageError {
    LanguageError::Syntax {
        message: message.into(),
        position: pos,
    }
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn push(&mut self, token: Token, pos: Position) {
        self.out.push(Spanned { token, pos });
    }

    fn run(&mut self) -> Result<(), LanguageError> {
        while let Some(&c) = self.chars.peek() {
            let pos = Position::new(self.line, self.column);
            match c {
                '\n' => {
                    self.bump();
                    if self.nesting == 0 && !matches!(self.out.last().map(|s| &s.token), Some(Token::Newline) | None) {
                        self.push(Token::Newline, pos);
                    }
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\\' => {
                    // explicit line continuation
                    self.bump();
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            self.bump();
                            break;
                        }
                        if !c.is_whitespace() {
                            return Err(syntax("unexpected character after line continuation", pos));
                        }
                        self.bump();
                    }
                }
                '0'..='9' => self.number(pos)?,
                '.' => {
                    self.bump();
                    if matches!(self.chars.peek(), Some('0'..='9')) {
                        return Err(syntax("numbers must start with a digit", pos));
                    }
                    self.push(Token::Dot, pos);
                }
                '"' | '\'' => self.string(pos)?,
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(Token::Ident(ident), pos);
                }
                _ => self.punct(pos)?,
            }
        }
        let end = Position::new(self.line, self.column);
        self.push(Token::Newline, end);
        self.push(Token::Eof, end);
        Ok(())
    }

    fn number(&mut self, pos: Position) -> Result<(), LanguageError> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(&sign) = self.chars.peek() {
                        if sign == '+' || sign == '-' {
                            text.push(sign);
                            self.bump();
                        }
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let token = if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| syntax(format!("invalid number '{text}'"), pos))?
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| syntax(format!("integer literal '{text}' is too large"), pos))?
        };
        self.push(token, pos);
        Ok(())
    }

    fn string(&mut self, pos: Position) -> Result<(), LanguageError> {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(syntax("unterminated string literal", pos)),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(syntax(format!("unknown escape sequence '\\{other}'"), pos));
                        }
                        None => return Err(syntax("unterminated string literal", pos)),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
        self.push(Token::Str(value), pos);
        Ok(())
    }

    fn punct(&mut self, pos: Position) -> Result<(), LanguageError> {
        let c = self.bump().unwrap_or('\0');
        let token = match c {
            ';' => Token::Semicolon,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '(' => {
                self.nesting += 1;
                Token::LParen
            }
            ')' => {
                self.nesting = self.nesting.saturating_sub(1);
                Token::RParen
            }
            '[' => {
                self.nesting += 1;
                Token::LBracket
            }
            ']' => {
                self.nesting = self.nesting.saturating_sub(1);
                Token::RBracket
            }
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '+' if self.eat('=') => Token::PlusAssign,
            '+' => Token::Plus,
            '-' if self.eat('=') => Token::MinusAssign,
            '-' => Token::Minus,
            '*' if self.eat('*') => Token::DoubleStar,
            '*' if self.eat('=') => Token::StarAssign,
            '*' => Token::Star,
            '/' if self.eat('/') => {
                if self.eat('=') {
                    Token::DoubleSlashAssign
                } else {
                    Token::DoubleSlash
                }
            }
            '/' if self.eat('=') => Token::SlashAssign,
            '/' => Token::Slash,
            '%' if self.eat('=') => Token::PercentAssign,
            '%' => Token::Percent,
            '=' if self.eat('=') => Token::EqEq,
            '=' => Token::Assign,
            '!' if self.eat('=') => Token::NotEq,
            '!' => Token::Bang,
            '<' if self.eat('=') => Token::LtE,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::GtE,
            '>' => Token::Gt,
            '&' if self.eat('&') => Token::AndAnd,
            '|' if self.eat('|') => Token::OrOr,
            other => return Err(syntax(format!("unexpected character '{other}'"), pos)),
        };
        self.push(token, pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators_and_literals() {
        let tokens = kinds("x //= 2 ** 3.5e1 != 'a\\n'");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".into()),
                Token::DoubleSlashAssign,
                Token::Int(2),
                Token::DoubleStar,
                Token::Float(35.0),
                Token::NotEq,
                Token::Str("a\n".into()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_suppressed_inside_brackets() {
        let tokens = kinds("f(1,\n 2)\n# comment\n\ny");
        let newlines = tokens.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = tokenize("a\n  bb").unwrap();
        assert_eq!(tokens[0].pos, Position::new(1, 1));
        assert_eq!(tokens[2].pos, Position::new(2, 3));
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = tokenize("x = 'oops").unwrap_err();
        assert!(matches!(err, LanguageError::Syntax { .. }));
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_huge_integer_literal_rejected() {
        assert!(tokenize("99999999999999999999999").is_err());
    }

    #[test]
    fn test_unknown_character_rejected() {
        let err = tokenize("x = $y").unwrap_err();
        assert!(err.to_string().contains("'$'"));
    }
}
