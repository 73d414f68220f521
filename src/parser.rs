use crate::error::EvalErrorKind;
use crate::expression::{Constant, Expr, Function};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    End,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> EvalErrorKind {
    EvalErrorKind::Syntax {
        position,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, EvalErrorKind> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'/' => Token::Slash,
            b'^' => Token::Caret,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b'*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    i += 1;
                    Token::Caret
                } else {
                    Token::Star
                }
            }
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                return Err(syntax(start, "unexpected character `.`"));
            }
            b'0'..=b'9' | b'.' => {
                let end = scan_number(bytes, i);
                let literal = &source[i..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| syntax(start, format!("malformed number `{literal}`")))?;
                tokens.push(Spanned {
                    token: Token::Number(value),
                    position: start,
                });
                i = end;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let mut end = i;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                tokens.push(Spanned {
                    token: Token::Ident(source[i..end].to_string()),
                    position: start,
                });
                i = end;
                continue;
            }
            _ => {
                let found = source[i..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character `{found}`")));
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
        i += 1;
    }

    tokens.push(Spanned {
        token: Token::End,
        position: source.len(),
    });

    Ok(tokens)
}

/// Returns the end of the numeric literal starting at `start`.
fn scan_number(bytes: &[u8], start: usize) -> usize {
    let digits = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = digits(start);
    if end < bytes.len() && bytes[end] == b'.' {
        end = digits(end + 1);
    }

    // Only consume an exponent when digits follow, so `2e` stays `2` then `e`.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            end = digits(j);
        }
    }

    end
}

const MAX_DEPTH: usize = 256;

/// A parsed subtree and its height.
type Parsed = (Expr, usize);

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        &self.tokens[self.cursor]
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.tokens[self.cursor].clone();
        if spanned.token != Token::End {
            self.cursor += 1;
        }
        spanned
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), EvalErrorKind> {
        let next = self.advance();
        if next.token == expected {
            Ok(())
        } else {
            Err(syntax(next.position, format!("expected {what}")))
        }
    }

    /// Height of a node over children of height `below`.
    fn node_depth(position: usize, below: usize) -> Result<usize, EvalErrorKind> {
        if below >= MAX_DEPTH {
            Err(syntax(position, "expression nested too deeply"))
        } else {
            Ok(below + 1)
        }
    }

    fn parse_sum(&mut self) -> Result<Parsed, EvalErrorKind> {
        let (mut lhs, mut depth) = self.parse_product()?;
        loop {
            let Spanned { token, position } = self.peek().clone();
            let build: fn(Box<Expr>, Box<Expr>) -> Expr = match token {
                Token::Plus => Expr::Add,
                Token::Minus => Expr::Sub,
                _ => return Ok((lhs, depth)),
            };
            self.advance();
            let (rhs, rhs_depth) = self.parse_product()?;
            depth = Self::node_depth(position, depth.max(rhs_depth))?;
            lhs = build(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> Result<Parsed, EvalErrorKind> {
        let (mut lhs, mut depth) = self.parse_unary()?;
        loop {
            let Spanned { token, position } = self.peek().clone();
            let build: fn(Box<Expr>, Box<Expr>) -> Expr = match token {
                Token::Star => Expr::Mul,
                Token::Slash => Expr::Div,
                _ => return Ok((lhs, depth)),
            };
            self.advance();
            let (rhs, rhs_depth) = self.parse_unary()?;
            depth = Self::node_depth(position, depth.max(rhs_depth))?;
            lhs = build(Box::new(lhs), Box::new(rhs));
        }
    }

    // Every recursive descent passes through here.
    fn parse_unary(&mut self) -> Result<Parsed, EvalErrorKind> {
        if self.nesting >= MAX_DEPTH {
            return Err(syntax(self.peek().position, "expression nested too deeply"));
        }
        self.nesting += 1;
        let parsed = self.parse_signed();
        self.nesting -= 1;
        parsed
    }

    fn parse_signed(&mut self) -> Result<Parsed, EvalErrorKind> {
        let Spanned { token, position } = self.peek().clone();
        match token {
            Token::Minus => {
                self.advance();
                let (inner, depth) = self.parse_unary()?;
                Ok((Expr::Neg(Box::new(inner)), Self::node_depth(position, depth)?))
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Parsed, EvalErrorKind> {
        let (base, base_depth) = self.parse_primary()?;
        let Spanned { token, position } = self.peek().clone();
        if token == Token::Caret {
            self.advance();
            let (exponent, exponent_depth) = self.parse_unary()?;
            let depth = Self::node_depth(position, base_depth.max(exponent_depth))?;
            return Ok((Expr::Pow(Box::new(base), Box::new(exponent)), depth));
        }
        Ok((base, base_depth))
    }

    fn parse_primary(&mut self) -> Result<Parsed, EvalErrorKind> {
        let Spanned { token, position } = self.advance();
        match token {
            Token::Number(value) => Ok((Expr::Number(value), 1)),
            Token::Ident(name) => {
                if self.peek().token == Token::LParen {
                    self.advance();
                    return self.parse_call(name, position);
                }
                match name.as_str() {
                    "x" => Ok((Expr::X, 1)),
                    "pi" => Ok((Expr::Constant(Constant::Pi), 1)),
                    "e" => Ok((Expr::Constant(Constant::E), 1)),
                    _ => Err(EvalErrorKind::UnknownIdentifier(name)),
                }
            }
            Token::LParen => {
                let inner = self.parse_sum()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::End => Err(syntax(position, "unexpected end of expression")),
            other => Err(syntax(position, format!("unexpected {}", describe(&other)))),
        }
    }

    /// Parses the argument list after `name(`.
    fn parse_call(&mut self, name: String, position: usize) -> Result<Parsed, EvalErrorKind> {
        let function =
            Function::from_name(&name).ok_or_else(|| EvalErrorKind::UnknownFunction(name.clone()))?;

        if self.peek().token == Token::RParen {
            return Err(EvalErrorKind::Arity { name, given: 0 });
        }

        let mut arguments = vec![self.parse_sum()?];
        while self.peek().token == Token::Comma {
            self.advance();
            arguments.push(self.parse_sum()?);
        }
        self.expect(Token::RParen, "`)`")?;

        if arguments.len() != 1 {
            return Err(EvalErrorKind::Arity {
                name,
                given: arguments.len(),
            });
        }

        let (argument, depth) = arguments.pop().ok_or(EvalErrorKind::Arity { name, given: 0 })?;
        Ok((Expr::Call(function, Box::new(argument)), Self::node_depth(position, depth)?))
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(value) => format!("number `{value}`"),
        Token::Ident(name) => format!("identifier `{name}`"),
        Token::Plus => "`+`".to_string(),
        Token::Minus => "`-`".to_string(),
        Token::Star => "`*`".to_string(),
        Token::Slash => "`/`".to_string(),
        Token::Caret => "power operator".to_string(),
        Token::LParen => "`(`".to_string(),
        Token::RParen => "`)`".to_string(),
        Token::Comma => "`,`".to_string(),
        Token::End => "end of expression".to_string(),
    }
}

pub fn parse(source: &str) -> Result<Expr, EvalErrorKind> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        nesting: 0,
    };
    let (expr, _) = parser.parse_sum()?;

    let trailing = parser.advance();
    if trailing.token != Token::End {
        return Err(syntax(
            trailing.position,
            format!("unexpected {}", describe(&trailing.token)),
        ));
    }

    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Box<Expr> {
        Box::new(Expr::X)
    }

    fn num(value: f64) -> Box<Expr> {
        Box::new(Expr::Number(value))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + 2*x").unwrap(),
            Expr::Add(num(1.), Box::new(Expr::Mul(num(2.), x())))
        );
        assert_eq!(
            parse("-x^2").unwrap(),
            Expr::Neg(Box::new(Expr::Pow(x(), num(2.))))
        );
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(
            parse("2^3^2").unwrap(),
            Expr::Pow(num(2.), Box::new(Expr::Pow(num(3.), num(2.))))
        );
        assert_eq!(parse("x**2").unwrap(), parse("x^2").unwrap());
        assert_eq!(
            parse("2^-x").unwrap(),
            Expr::Pow(num(2.), Box::new(Expr::Neg(x())))
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse("1e-3").unwrap(), Expr::Number(1e-3));
        assert_eq!(parse("2.5E2").unwrap(), Expr::Number(250.));
        assert!(matches!(parse("1.2.3"), Err(EvalErrorKind::Syntax { .. })));
    }

    #[test]
    fn test_constant_e_next_to_number() {
        assert!(matches!(parse("2e"), Err(EvalErrorKind::Syntax { position: 1, .. })));
        assert_eq!(
            parse("2*e").unwrap(),
            Expr::Mul(num(2.), Box::new(Expr::Constant(Constant::E)))
        );
    }

    #[test]
    fn test_identifiers_are_whole_tokens() {
        assert_eq!(
            parse("sinx"),
            Err(EvalErrorKind::UnknownIdentifier("sinx".to_string()))
        );
        assert_eq!(
            parse("exp2(x)"),
            Err(EvalErrorKind::UnknownFunction("exp2".to_string()))
        );
        assert_eq!(
            parse("y + 1"),
            Err(EvalErrorKind::UnknownIdentifier("y".to_string()))
        );
    }

    #[test]
    fn test_namespace_access_rejected() {
        assert!(matches!(parse("np.sin(x)"), Err(EvalErrorKind::Syntax { position: 2, .. })));
        assert!(matches!(parse("__import__(x)"), Err(EvalErrorKind::UnknownFunction(_))));
    }

    #[test]
    fn test_arity() {
        assert_eq!(
            parse("sin(x, 2)"),
            Err(EvalErrorKind::Arity {
                name: "sin".to_string(),
                given: 2
            })
        );
        assert_eq!(
            parse("cos()"),
            Err(EvalErrorKind::Arity {
                name: "cos".to_string(),
                given: 0
            })
        );
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse(""), Err(EvalErrorKind::Syntax { position: 0, .. })));
        assert!(matches!(parse("(x + 1"), Err(EvalErrorKind::Syntax { position: 6, .. })));
        assert!(matches!(parse("x +* 2"), Err(EvalErrorKind::Syntax { .. })));
        assert!(matches!(parse("x 2"), Err(EvalErrorKind::Syntax { position: 2, .. })));
        assert!(matches!(parse("x # 2"), Err(EvalErrorKind::Syntax { position: 2, .. })));
    }

    fn too_deep(result: Result<Expr, EvalErrorKind>) -> bool {
        matches!(
            result,
            Err(EvalErrorKind::Syntax { ref message, .. }) if message == "expression nested too deeply"
        )
    }

    #[test]
    fn test_nesting_limit() {
        let minus = "-".repeat(100_000) + "x";
        let parens = "(".repeat(100_000) + "x" + &")".repeat(100_000);
        let sum = "x+".repeat(100_000) + "x";
        let power = "x^".repeat(100_000) + "x";
        let calls = "sin(".repeat(100_000) + "x" + &")".repeat(100_000);

        for source in [&minus, &parens, &sum, &power, &calls] {
            assert!(too_deep(parse(source)), "{}", &source[..8]);
        }
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        let parens = "(".repeat(200) + "x" + &")".repeat(200);
        assert_eq!(parse(&parens).unwrap(), Expr::X);

        let sum = "x+".repeat(200) + "x";
        assert!(parse(&sum).is_ok());
        assert!(parse(&("-".repeat(200) + "x")).is_ok());
    }
}
