//! Recursive-descent parser: tokens -> `Expr`.
//!
//! Precedence, low to high: `or` < `and` < `not` < comparison (`==`, `!=`, `<`,
//! `<=`, `>`, `>=`, `in`) < additive (`+`, `-`) < multiplicative (`*`, `/`, `%`)
//! < unary (`-`) < postfix (`.field`, `[index]`) < primary.

use super::ast::{BinOp, Expr, PathSegment, UnaryOp};
use super::error::ExpressionError;
use super::lexer::{Lexer, Token};

pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(ExpressionError::TrailingInput(format!("{:?}", other))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token, what: &str) -> Result<(), ExpressionError> {
        if self.peek() == want {
            self.bump();
            Ok(())
        } else {
            Err(ExpressionError::Expected(what.to_string()))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_not()?;
        while *self.peek() == Token::And {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if *self.peek() == Token::Not {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::In => BinOp::In,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if *self.peek() == Token::Minus {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_postfix()
    }

    /// Only identifier-rooted primaries (`Expr::Path`) accept `.field`/`[index]`
    /// postfixes — a literal like `[1, 2][0]` is rare enough in machine configs
    /// that we don't special-case indexing into it.
    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let primary = self.parse_primary()?;
        let mut segments = match primary {
            Expr::Path(segs) => segs,
            other => return Ok(other),
        };
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    let Token::Ident(name) = self.bump() else {
                        return Err(ExpressionError::Expected("identifier after '.'".to_string()));
                    };
                    segments.push(PathSegment::Ident(name));
                }
                Token::LBracket => {
                    self.bump();
                    let index_expr = self.parse_or()?;
                    self.expect(&Token::RBracket, "']'")?;
                    segments.push(PathSegment::Index(Box::new(index_expr)));
                }
                _ => break,
            }
        }
        Ok(Expr::Path(segments))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.bump() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::Minus => {
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    loop {
                        items.push(self.parse_or()?);
                        if *self.peek() == Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                Ok(Expr::Array(items))
            }
            Token::LBrace => {
                let mut fields = Vec::new();
                if *self.peek() != Token::RBrace {
                    loop {
                        let key = match self.bump() {
                            Token::Ident(s) => s,
                            Token::Str(s) => s,
                            _ => return Err(ExpressionError::Expected("object key".to_string())),
                        };
                        self.expect(&Token::Colon, "':'")?;
                        let value = self.parse_or()?;
                        fields.push((key, value));
                        if *self.peek() == Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace, "'}'")?;
                Ok(Expr::Object(fields))
            }
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.bump();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        loop {
                            args.push(self.parse_or()?);
                            if *self.peek() == Token::Comma {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "')'")?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Path(vec![PathSegment::Ident(name)]))
                }
            }
            Token::Eof => Err(ExpressionError::UnexpectedEof),
            other => Err(ExpressionError::Expected(format!("primary expression, got {:?}", other))),
        }
    }
}
