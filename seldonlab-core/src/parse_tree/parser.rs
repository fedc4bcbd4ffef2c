//! Recursive-descent parser for constraint expressions.
//!
//! ```text
//! constraint := expr CMP expr
//! expr       := term (('+' | '-') term)*
//! term       := unary (('*' | '/') unary)*
//! unary      := '-' unary | atom
//! atom       := NUMBER | MEASURE | FUNC '(' expr (',' expr)* ')'
//!             | '(' MEASURE '|' group ')' | '(' expr ')'
//! group      := '[' IDENT (',' IDENT)* ']'
//! ```

use super::lexer::{tokenize, Token};
use super::node::{BinaryOp, Comparison, Expr, Measure, MeasureKind, UnaryOp};
use super::ParseError;

/// Parse a constraint into `(lhs, comparison, rhs)`.
///
/// Every subgroup name must appear in `columns`.
pub fn parse_constraint(
    source: &str,
    columns: &[String],
) -> Result<(Expr, Comparison, Expr), ParseError> {
    let tokens = tokenize(source).map_err(|e| ParseError::Syntax {
        offset: e.offset,
        message: format!("unexpected character '{}'", e.snippet),
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        columns,
    };
    parser.constraint()
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    columns: &'a [String],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, o)| *o)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError::Syntax {
            offset: self.offset(),
            message: message.into(),
        })
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T, ParseError> {
        match self.peek() {
            Some(token) => self.error(format!("expected {expected}, found {}", token.describe())),
            None => self.error(format!("expected {expected}, found end of input")),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            self.unexpected(expected)
        }
    }

    fn constraint(&mut self) -> Result<(Expr, Comparison, Expr), ParseError> {
        let lhs = self.expr()?;
        let comparison = match self.peek() {
            Some(Token::Ge) => Comparison::Ge,
            Some(Token::Gt) => Comparison::Gt,
            Some(Token::Le) => Comparison::Le,
            Some(Token::Lt) => Comparison::Lt,
            _ => return self.unexpected("a comparison (>=, <=, >, <)"),
        };
        self.pos += 1;
        let rhs = self.expr()?;
        if self.peek().is_some() {
            return self.unexpected("end of constraint");
        }
        if lhs.measures().is_empty() && rhs.measures().is_empty() {
            return Err(ParseError::NoMeasure);
        }
        Ok((lhs, comparison, rhs))
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let arg = self.unary()?;
            return Ok(match arg {
                Expr::Constant(v) => Expr::Constant(-v),
                other => Expr::unary(UnaryOp::Neg, other),
            });
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Token::Number(v)) => {
                self.pos += 1;
                Ok(Expr::Constant(v))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                if let Some(kind) = MeasureKind::from_name(&name) {
                    return Ok(Expr::Measure(Measure::new(kind, Vec::new())));
                }
                match name.as_str() {
                    "min" => self.call(BinaryOp::Min),
                    "max" => self.call(BinaryOp::Max),
                    "abs" => {
                        let mut args = self.arguments()?;
                        if args.len() != 1 {
                            return Err(ParseError::Syntax {
                                offset,
                                message: format!("abs takes 1 argument, got {}", args.len()),
                            });
                        }
                        Ok(Expr::unary(UnaryOp::Abs, args.remove(0)))
                    }
                    _ => Err(ParseError::UnknownMeasure { name, offset }),
                }
            }
            Some(Token::LParen) => {
                let conditional = matches!(
                    (self.peek_at(1), self.peek_at(2)),
                    (Some(Token::Ident(_)), Some(Token::Pipe))
                );
                self.pos += 1;
                let inner = if conditional {
                    self.conditional_measure()?
                } else {
                    self.expr()?
                };
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => self.unexpected("a number, measure, function, or '('"),
        }
    }

    fn call(&mut self, op: BinaryOp) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let args = self.arguments()?;
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(first), Some(second)) => {
                Ok(args.fold(Expr::binary(op, first, second), |acc, e| Expr::binary(op, acc, e)))
            }
            _ => Err(ParseError::Syntax {
                offset,
                message: "min/max take at least 2 arguments".into(),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(Token::LParen, "'('")?;
        let mut args = vec![self.expr()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            args.push(self.expr()?);
        }
        self.expect(Token::RParen, "')' or ','")?;
        Ok(args)
    }

    /// `MEASURE '|' '[' IDENT (',' IDENT)* ']'`, with the opening '(' consumed.
    fn conditional_measure(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let kind = match self.next() {
            Some(Token::Ident(name)) => match MeasureKind::from_name(&name) {
                Some(kind) => kind,
                None => return Err(ParseError::UnknownMeasure { name, offset }),
            },
            _ => return self.unexpected("a measure"),
        };
        self.expect(Token::Pipe, "'|'")?;
        self.expect(Token::LBracket, "'['")?;

        let mut groups = Vec::new();
        loop {
            let offset = self.offset();
            let group = match self.peek() {
                Some(Token::Ident(group)) => group.clone(),
                _ => return self.unexpected("a subgroup name"),
            };
            if !self.columns.contains(&group) {
                return Err(ParseError::UnknownGroup {
                    name: group,
                    offset,
                    declared: self.columns.to_vec(),
                });
            }
            self.pos += 1;
            groups.push(group);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBracket) => {
                    self.pos += 1;
                    break;
                }
                _ => return self.unexpected("',' or ']'"),
            }
        }
        Ok(Expr::Measure(Measure::new(kind, groups)))
    }
}
