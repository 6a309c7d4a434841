//! Text form of column expressions, as written in analysis files and on the
//! command line: `jet_pt > 25 && sum(jet_pt[jet_pt > 25]) > 100`.
//!
//! Precedence, loosest first: `||`, `&&`, comparisons, `+ -`, `* /`,
//! unary `! -`, then postfix `[mask]`.

use evgraph_core::error::{Error, Result};
use evgraph_core::expr::{BinaryOp, Expr, UnaryOp};
use evgraph_core::types::Scalar;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

const OPS: [&str; 13] = [
    "&&", "||", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "!",
];

fn err(pos: usize, msg: impl std::fmt::Display) -> Error {
    Error::Plan(format!("expression parse error at {}: {}", pos, msg))
}

fn tokenize(src: &str) -> Result<Vec<(usize, Tok)>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            '"' | '\'' => {
                let end = src[i + 1..]
                    .find(c)
                    .ok_or_else(|| err(start, "unterminated string"))?;
                let s = src[i + 1..i + 1 + end].to_string();
                i += end + 2;
                out.push((start, Tok::Str(s)));
                continue;
            }
            c if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) => {
                let mut j = i;
                let mut float = false;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    if d.is_ascii_digit() {
                        j += 1;
                    } else if d == '.' || d == 'e' || d == 'E' {
                        float = true;
                        j += 1;
                        if (d == 'e' || d == 'E') && matches!(bytes.get(j), Some(b'+' | b'-')) {
                            j += 1;
                        }
                    } else {
                        break;
                    }
                }
                let text = &src[i..j];
                i = j;
                let tok = if float {
                    Tok::Float(text.parse().map_err(|_| err(start, format!("bad number '{}'", text)))?)
                } else {
                    Tok::Int(text.parse().map_err(|_| err(start, format!("bad number '{}'", text)))?)
                };
                out.push((start, tok));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i;
                while j < bytes.len() && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_') {
                    j += 1;
                }
                let word = &src[i..j];
                i = j;
                let tok = match word {
                    "and" => Tok::Op("&&"),
                    "or" => Tok::Op("||"),
                    "not" => Tok::Op("!"),
                    _ => Tok::Ident(word.to_string()),
                };
                out.push((start, tok));
                continue;
            }
            _ => {
                let op = OPS
                    .iter()
                    .find(|op| src[i..].starts_with(**op))
                    .ok_or_else(|| err(start, format!("unexpected character '{}'", c)))?;
                i += op.len();
                out.push((start, Tok::Op(*op)));
                continue;
            }
        };
        i += 1;
        out.push((start, tok));
    }
    Ok(out)
}

fn infix(op: &str) -> Option<(u8, BinaryOp)> {
    Some(match op {
        "||" => (1, BinaryOp::Or),
        "&&" => (2, BinaryOp::And),
        "==" => (3, BinaryOp::Eq),
        "!=" => (3, BinaryOp::NotEq),
        "<" => (3, BinaryOp::Lt),
        "<=" => (3, BinaryOp::LtEq),
        ">" => (3, BinaryOp::Gt),
        ">=" => (3, BinaryOp::GtEq),
        "+" => (4, BinaryOp::Add),
        "-" => (4, BinaryOp::Sub),
        "*" => (5, BinaryOp::Mul),
        "/" => (5, BinaryOp::Div),
        _ => return None,
    })
}

struct Parser {
    toks: Vec<(usize, Tok)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(_, t)| t)
    }

    fn at(&self) -> usize {
        self.toks.get(self.pos).map(|(p, _)| *p).unwrap_or(self.len)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Tok) -> Result<()> {
        let at = self.at();
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(err(at, format!("expected {:?}, found {:?}", want, t))),
            None => Err(err(at, format!("expected {:?}, found end of input", want))),
        }
    }

    fn expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Tok::Op(op)) = self.peek() {
            let Some((prec, bin)) = infix(op) else { break };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(prec + 1)?;
            lhs = Expr::Binary {
                left: Box::new(lhs),
                op: bin,
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Tok::Op("!")) => Some(UnaryOp::Not),
            Some(Tok::Op("-")) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let inner = self.unary()?;
            // Fold negative literals so `-3` stays a literal.
            return Ok(match (op, inner) {
                (UnaryOp::Neg, Expr::Literal(Scalar::I64(i))) => Expr::Literal(Scalar::I64(-i)),
                (UnaryOp::Neg, Expr::Literal(Scalar::F64(f))) => Expr::Literal(Scalar::F64(-f)),
                (op, inner) => Expr::Unary {
                    op,
                    expr: Box::new(inner),
                },
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut e = self.primary()?;
        while self.peek() == Some(&Tok::LBracket) {
            self.pos += 1;
            let mask = self.expr(1)?;
            self.expect(Tok::RBracket)?;
            e = e.masked(mask);
        }
        Ok(e)
    }

    fn primary(&mut self) -> Result<Expr> {
        let at = self.at();
        match self.next() {
            Some(Tok::Int(i)) => Ok(Expr::Literal(Scalar::I64(i))),
            Some(Tok::Float(f)) => Ok(Expr::Literal(Scalar::F64(f))),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Scalar::Str(s))),
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Scalar::Bool(true))),
                "false" => Ok(Expr::Literal(Scalar::Bool(false))),
                _ if self.peek() == Some(&Tok::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Tok::RParen) {
                        loop {
                            args.push(self.expr(1)?);
                            if self.peek() == Some(&Tok::Comma) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Tok::RParen)?;
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Column(name)),
            },
            Some(Tok::LParen) => {
                let e = self.expr(1)?;
                self.expect(Tok::RParen)?;
                Ok(e)
            }
            Some(t) => Err(err(at, format!("unexpected {:?}", t))),
            None => Err(err(at, "unexpected end of input")),
        }
    }
}

/// Parse the text form of an expression.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let toks = tokenize(src)?;
    if toks.is_empty() {
        return Err(err(0, "empty expression"));
    }
    let mut p = Parser {
        toks,
        pos: 0,
        len: src.len(),
    };
    let e = p.expr(1)?;
    if p.pos < p.toks.len() {
        return Err(err(p.at(), "trailing input"));
    }
    Ok(e)
}
