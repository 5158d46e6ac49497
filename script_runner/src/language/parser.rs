//! Recursive-descent parser producing a [`Program`].
//!
//! Blocks are brace-delimited; statements end at a newline, `;`, a closing
//! brace or the end of the script. Operator precedence follows Python.

use super::LanguageError;
use super::ast::*;
use super::lexer::{Spanned, Token, tokenize};

/// Words that name capabilities scripts do not have. Using one anywhere is a
/// compile error rather than a confusing "unknown name" at runtime.
pub const FORBIDDEN_WORDS: &[&str] = &[
    "import", "from", "def", "class", "lambda", "exec", "eval", "with", "global", "nonlocal",
    "del", "try", "except", "finally", "raise", "return", "yield", "async", "await",
];

/// Deepest expression/block nesting accepted. Keeps parsing and evaluation
/// well inside a worker thread's stack.
const MAX_NESTING: usize = 200;

const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "in", "not", "and", "or", "break", "continue", "pass",
    "true", "false", "none", "True", "False", "None",
];

pub fn parse(source: &str) -> Result<Program, LanguageError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

type PResult<T> = Result<T, LanguageError>;

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn position(&self) -> Position {
        self.tokens[self.pos.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        Err(LanguageError::Syntax {
            message: message.into(),
            position: self.position(),
        })
    }

    fn expect(&mut self, token: Token, context: &str) -> PResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            let found = self.peek().describe();
            self.error(format!("expected {} {context}, found {found}", token.describe()))
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return self.error("script is nested too deeply");
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.advance();
        }
    }

    fn program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        self.skip_separators();
        while !self.check(&Token::Eof) {
            if self.check(&Token::RBrace) {
                return self.error("unmatched '}'");
            }
            body.push(self.statement()?);
            self.skip_separators();
        }
        Ok(Program { body })
    }

    fn block(&mut self, context: &str) -> PResult<Vec<Stmt>> {
        self.nested(|p| p.block_body(context))
    }

    fn block_body(&mut self, context: &str) -> PResult<Vec<Stmt>> {
        self.skip_newlines();
        if self.check(&Token::Colon) {
            return self.error(format!("blocks use braces: expected '{{' {context}"));
        }
        self.expect(Token::LBrace, context)?;
        let mut body = Vec::new();
        self.skip_separators();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return self.error(format!("missing '}}' to close block {context}"));
            }
            body.push(self.statement()?);
            self.skip_separators();
        }
        self.advance();
        Ok(body)
    }

    fn forbidden_check(&self) -> PResult<()> {
        if let Token::Ident(name) = self.peek() {
            if FORBIDDEN_WORDS.contains(&name.as_str()) {
                return Err(LanguageError::Capability {
                    message: format!("'{name}' is not available in grading scripts"),
                    position: self.position(),
                });
            }
        }
        Ok(())
    }

    fn statement(&mut self) -> PResult<Stmt> {
        self.forbidden_check()?;
        let pos = self.position();
        let word = match self.peek() {
            Token::Ident(name) => Some(name.clone()),
            _ => None,
        };
        let kind = match word.as_deref() {
            Some("if") => {
                self.advance();
                return self.if_statement(pos);
            }
            Some("while") => {
                self.advance();
                let cond = self.expression()?;
                let body = self.block("after 'while' condition")?;
                return Ok(Stmt {
                    kind: StmtKind::While { cond, body },
                    pos,
                });
            }
            Some("for") => {
                self.advance();
                let vars = self.loop_vars()?;
                let iter = self.expression()?;
                let body = self.block("after 'for' header")?;
                return Ok(Stmt {
                    kind: StmtKind::For { vars, iter, body },
                    pos,
                });
            }
            Some(w @ ("elif" | "else")) => {
                return self.error(format!("'{w}' without a matching 'if'"));
            }
            Some("break") => {
                self.advance();
                StmtKind::Break
            }
            Some("continue") => {
                self.advance();
                StmtKind::Continue
            }
            Some("pass") => {
                self.advance();
                StmtKind::Pass
            }
            _ => self.simple_statement()?,
        };
        match self.peek() {
            Token::Newline | Token::Semicolon | Token::RBrace | Token::Eof => Ok(Stmt { kind, pos }),
            other => {
                let found = other.describe();
                self.error(format!("expected end of statement, found {found}"))
            }
        }
    }

    fn if_statement(&mut self, pos: Position) -> PResult<Stmt> {
        let mut branches = Vec::new();
        let cond = self.expression()?;
        let body = self.block("after 'if' condition")?;
        branches.push((cond, body));
        let mut otherwise = None;
        loop {
            let save = self.pos;
            self.skip_separators();
            if self.eat_word("elif") {
                let cond = self.expression()?;
                let body = self.block("after 'elif' condition")?;
                branches.push((cond, body));
            } else if self.is_word("else") && matches!(self.peek_at(1), Token::Ident(w) if w == "if") {
                self.advance();
                self.advance();
                let cond = self.expression()?;
                let body = self.block("after 'else if' condition")?;
                branches.push((cond, body));
            } else if self.eat_word("else") {
                otherwise = Some(self.block("after 'else'")?);
                break;
            } else {
                self.pos = save;
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { branches, otherwise },
            pos,
        })
    }

    fn loop_vars(&mut self) -> PResult<Vec<String>> {
        let mut vars = vec![self.identifier("as loop variable")?];
        while self.eat(&Token::Comma) {
            vars.push(self.identifier("as loop variable")?);
        }
        if !self.eat_word("in") {
            return self.error("expected 'in' after loop variables");
        }
        Ok(vars)
    }

    fn identifier(&mut self, context: &str) -> PResult<String> {
        self.forbidden_check()?;
        match self.peek().clone() {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            other => self.error(format!("expected a name {context}, found {}", other.describe())),
        }
    }

    fn simple_statement(&mut self) -> PResult<StmtKind> {
        let expr = self.expression()?;
        let op = match self.peek() {
            Token::Assign => None,
            Token::PlusAssign => Some(BinaryOp::Add),
            Token::MinusAssign => Some(BinaryOp::Sub),
            Token::StarAssign => Some(BinaryOp::Mul),
            Token::SlashAssign => Some(BinaryOp::Div),
            Token::DoubleSlashAssign => Some(BinaryOp::FloorDiv),
            Token::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(StmtKind::Expr(expr)),
        };
        let target = match into_target(expr) {
            Some(target) => target,
            None => return self.error("can only assign to a name or a subscript"),
        };
        self.advance();
        let value = self.expression()?;
        Ok(match op {
            None => StmtKind::Assign { target, value },
            Some(op) => StmtKind::AugAssign { target, op, value },
        })
    }

    fn expression(&mut self) -> PResult<Expr> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let pos = self.position();
        let then = self.or_expr()?;
        if self.is_word("if") {
            self.advance();
            let cond = self.or_expr()?;
            if !self.eat_word("else") {
                return self.error("expected 'else' in conditional expression");
            }
            let otherwise = self.expression()?;
            return Ok(Expr {
                kind: ExprKind::Conditional {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                pos,
            });
        }
        Ok(then)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut left = self.and_expr()?;
        loop {
            let pos = self.position();
            if self.eat_word("or") || self.eat(&Token::OrOr) {
                let right = self.and_expr()?;
                left = Expr {
                    kind: ExprKind::Or(Box::new(left), Box::new(right)),
                    pos,
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut left = self.not_expr()?;
        loop {
            let pos = self.position();
            if self.eat_word("and") || self.eat(&Token::AndAnd) {
                let right = self.not_expr()?;
                left = Expr {
                    kind: ExprKind::And(Box::new(left), Box::new(right)),
                    pos,
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        let pos = self.position();
        if self.eat_word("not") || self.eat(&Token::Bang) {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                pos,
            });
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        if self.is_word("not") && matches!(self.peek_at(1), Token::Ident(n) if n == "in") {
            self.advance();
            self.advance();
            return Some(CompareOp::NotIn);
        }
        let op = match self.peek() {
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Lt => CompareOp::Lt,
            Token::LtE => CompareOp::LtE,
            Token::Gt => CompareOp::Gt,
            Token::GtE => CompareOp::GtE,
            Token::Ident(w) if w == "in" => CompareOp::In,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let pos = self.position();
        let first = self.additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            return Ok(first);
        }
        Ok(Expr {
            kind: ExprKind::Compare {
                first: Box::new(first),
                rest,
            },
            pos,
        })
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut left = self.term()?;
        loop {
            let pos = self.position();
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.term()?;
            left = binary(op, left, right, pos);
        }
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let pos = self.position();
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right, pos);
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary_body)
    }

    fn unary_body(&mut self) -> PResult<Expr> {
        let pos = self.position();
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        })
    }

    fn power(&mut self) -> PResult<Expr> {
        let base = self.postfix()?;
        let pos = self.position();
        if self.eat(&Token::DoubleStar) {
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent, pos));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            let pos = self.position();
            match self.peek() {
                Token::LParen => {
                    let name = match &expr.kind {
                        ExprKind::Name(name) => name.clone(),
                        _ => return self.error("only built-in functions can be called"),
                    };
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr {
                        kind: ExprKind::Call { name, args },
                        pos: expr.pos,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    expr = self.subscript(expr, pos)?;
                }
                Token::Dot => {
                    self.advance();
                    let method = self.identifier("after '.'")?;
                    if !self.check(&Token::LParen) {
                        return self.error(format!(
                            "attribute access is not supported; call it as a method, e.g. x.{method}()"
                        ));
                    }
                    self.advance();
                    let mut args = vec![expr];
                    args.extend(self.arguments()?);
                    expr = Expr {
                        kind: ExprKind::Call { name: method, args },
                        pos,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            if matches!(self.peek(), Token::Ident(_)) && self.peek_at(1) == &Token::Assign {
                return self.error("keyword arguments are not supported");
            }
            args.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "to close the argument list")?;
        Ok(args)
    }

    fn subscript(&mut self, base: Expr, pos: Position) -> PResult<Expr> {
        let start = if self.check(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        if self.eat(&Token::Colon) {
            let end = if self.check(&Token::RBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.expect(Token::RBracket, "to close the slice")?;
            return Ok(Expr {
                kind: ExprKind::Slice {
                    base: Box::new(base),
                    start,
                    end,
                },
                pos,
            });
        }
        self.expect(Token::RBracket, "to close the subscript")?;
        match start {
            Some(index) => Ok(Expr {
                kind: ExprKind::Index {
                    base: Box::new(base),
                    index,
                },
                pos,
            }),
            None => self.error("empty subscript"),
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        self.forbidden_check()?;
        let pos = self.position();
        let kind = match self.peek().clone() {
            Token::Int(v) => ExprKind::Literal(Literal::Int(v)),
            Token::Float(v) => ExprKind::Literal(Literal::Float(v)),
            Token::Str(mut s) => {
                self.advance();
                // adjacent literals concatenate
                while let Token::Str(next) = self.peek().clone() {
                    self.advance();
                    s.push_str(&next);
                }
                return Ok(Expr {
                    kind: ExprKind::Literal(Literal::Str(s)),
                    pos,
                });
            }
            Token::Ident(name) => match name.as_str() {
                "true" | "True" => ExprKind::Literal(Literal::Bool(true)),
                "false" | "False" => ExprKind::Literal(Literal::Bool(false)),
                "none" | "None" => ExprKind::Literal(Literal::None),
                n if KEYWORDS.contains(&n) => {
                    return self.error(format!("unexpected keyword '{n}'"));
                }
                _ => ExprKind::Name(name),
            },
            Token::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(Token::RParen, "to close the parenthesis")?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                return self.list_or_comprehension(pos);
            }
            Token::LBrace => {
                self.advance();
                return self.map_literal(pos);
            }
            other => {
                return self.error(format!("expected an expression, found {}", other.describe()));
            }
        };
        self.advance();
        Ok(Expr { kind, pos })
    }

    fn list_or_comprehension(&mut self, pos: Position) -> PResult<Expr> {
        if self.eat(&Token::RBracket) {
            return Ok(Expr {
                kind: ExprKind::List(Vec::new()),
                pos,
            });
        }
        let first = self.or_expr_or_conditional()?;
        if self.eat_word("for") {
            let vars = self.loop_vars()?;
            let iter = self.or_expr()?;
            let filter = if self.eat_word("if") {
                Some(Box::new(self.or_expr()?))
            } else {
                None
            };
            self.expect(Token::RBracket, "to close the comprehension")?;
            return Ok(Expr {
                kind: ExprKind::Comprehension {
                    element: Box::new(first),
                    vars,
                    iter: Box::new(iter),
                    filter,
                },
                pos,
            });
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect(Token::RBracket, "to close the list")?;
        Ok(Expr {
            kind: ExprKind::List(items),
            pos,
        })
    }

    /// Like [`Parser::expression`] but leaves a trailing `for` alone so the
    /// caller can recognise a comprehension.
    fn or_expr_or_conditional(&mut self) -> PResult<Expr> {
        let pos = self.position();
        let then = self.or_expr()?;
        if self.is_word("if") {
            self.advance();
            let cond = self.or_expr()?;
            if !self.eat_word("else") {
                return self.error("expected 'else' in conditional expression");
            }
            let otherwise = self.or_expr()?;
            return Ok(Expr {
                kind: ExprKind::Conditional {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                pos,
            });
        }
        Ok(then)
    }

    fn map_literal(&mut self, pos: Position) -> PResult<Expr> {
        let mut entries = Vec::new();
        self.skip_newlines();
        while !self.check(&Token::RBrace) {
            let key = self.expression()?;
            self.expect(Token::Colon, "between map key and value")?;
            let value = self.expression()?;
            entries.push((key, value));
            self.skip_newlines();
            if !self.eat(&Token::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.skip_newlines();
        self.expect(Token::RBrace, "to close the map literal")?;
        Ok(Expr {
            kind: ExprKind::Map(entries),
            pos,
        })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, pos: Position) -> Expr {
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    }
}

fn into_target(expr: Expr) -> Option<Target> {
    match expr.kind {
        ExprKind::Name(name) => Some(Target {
            name,
            indices: Vec::new(),
        }),
        ExprKind::Index { base, index } => {
            let mut target = into_target(*base)?;
            target.indices.push(*index);
            Some(target)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_stmt(src: &str) -> StmtKind {
        parse(src).unwrap().body.remove(0).kind
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let StmtKind::Expr(expr) = first_stmt("-2 ** 2") else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_method_call_is_lowered_to_builtin_call() {
        let StmtKind::Assign { value, .. } = first_stmt("x = answer.strip().lower()") else {
            panic!("expected assignment");
        };
        let ExprKind::Call { name, args } = value.kind else {
            panic!("expected call");
        };
        assert_eq!(name, "lower");
        assert!(matches!(&args[0].kind, ExprKind::Call { name, .. } if name == "strip"));
    }

    #[test]
    fn test_if_elif_else_if_else_chain() {
        let src = "if a { x = 1 }\nelif b { x = 2 }\nelse if c { x = 3 } else { x = 4 }";
        let StmtKind::If { branches, otherwise } = first_stmt(src) else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 3);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_indexed_and_compound_assignment() {
        let StmtKind::AugAssign { target, op, .. } = first_stmt("grid[1][2] += 3") else {
            panic!("expected compound assignment");
        };
        assert_eq!(target.name, "grid");
        assert_eq!(target.indices.len(), 2);
        assert_eq!(op, BinaryOp::Add);
    }

    #[test]
    fn test_comprehension_with_filter() {
        let StmtKind::Assign { value, .. } = first_stmt("xs = [w.upper() for w in words if len(w) > 2]")
        else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Comprehension { filter: Some(_), .. }));
    }

    #[test]
    fn test_multiline_map_literal() {
        let program = parse("m = {\n  'a': 1,\n  'b': 2,\n}\nn = len(m)").unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_chained_comparison_and_not_in() {
        let StmtKind::Expr(expr) = first_stmt("0 <= x < 10 and y not in zs") else {
            panic!("expected expression");
        };
        let ExprKind::And(left, right) = expr.kind else {
            panic!("expected and");
        };
        assert!(matches!(left.kind, ExprKind::Compare { ref rest, .. } if rest.len() == 2));
        assert!(matches!(right.kind, ExprKind::Compare { ref rest, .. } if rest[0].0 == CompareOp::NotIn));
    }

    #[test]
    fn test_forbidden_word_is_capability_error() {
        let err = parse("import os").unwrap_err();
        assert!(matches!(err, LanguageError::Capability { .. }));
        let err = parse("x = lambda").unwrap_err();
        assert!(matches!(err, LanguageError::Capability { .. }));
    }

    #[test]
    fn test_attribute_access_rejected() {
        let err = parse("x = answer.__class__").unwrap_err();
        assert!(err.to_string().contains("attribute access"));
    }

    #[test]
    fn test_colon_blocks_get_a_helpful_error() {
        let err = parse("if x:\n    y = 1").unwrap_err();
        assert!(err.to_string().contains("braces"));
    }

    #[test]
    fn test_missing_close_brace() {
        let err = parse("while true {\n x = 1\n").unwrap_err();
        assert!(err.to_string().contains("missing '}'"));
    }

    #[test]
    fn test_deep_nesting_is_rejected_not_overflowed() {
        let src = format!("x = {}1{}", "(".repeat(5_000), ")".repeat(5_000));
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        assert!(parse("x = 1 2").is_err());
    }
}
