use crate::{Error, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Value),
  /// Dotted context lookup, e.g. `needs.build.outputs.digest`
  Path(Vec<String>),
  Not(Box<Expr>),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    function: Function,
    args: Vec<Expr>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Ne,
  And,
  Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
  Success,
  Failure,
  Cancelled,
  Always,
  Contains,
  StartsWith,
  EndsWith,
}

impl Function {
  fn from_name(name: &str) -> Option<Self> {
    let function = match name {
      "success" => Function::Success,
      "failure" => Function::Failure,
      "cancelled" => Function::Cancelled,
      "always" => Function::Always,
      "contains" => Function::Contains,
      "startsWith" => Function::StartsWith,
      "endsWith" => Function::EndsWith,
      _ => return None,
    };

    Some(function)
  }

  fn arity(&self) -> usize {
    match self {
      Function::Success | Function::Failure | Function::Cancelled | Function::Always => 0,
      Function::Contains | Function::StartsWith | Function::EndsWith => 2,
    }
  }

  /// Status functions replace the implicit `success()` guard of a condition.
  pub fn is_status_check(&self) -> bool {
    self.arity() == 0
  }
}

impl Expr {
  pub fn checks_status(&self) -> bool {
    match self {
      Expr::Literal(_) | Expr::Path(_) => false,
      Expr::Not(inner) => inner.checks_status(),
      Expr::Binary { lhs, rhs, .. } => lhs.checks_status() || rhs.checks_status(),
      Expr::Call { function, args } => {
        function.is_status_check() || args.iter().any(Expr::checks_status)
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Ident(String),
  Str(String),
  Number(f64),
  LParen,
  RParen,
  Comma,
  Dot,
  Not,
  Eq,
  Ne,
  And,
  Or,
}

fn syntax_error(source: &str, message: impl std::fmt::Display) -> Error {
  Error::configuration_error(format!("Invalid expression `{}`: {}", source, message))
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
  let chars: Vec<char> = source.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    match c {
      c if c.is_whitespace() => i += 1,
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        i += 1;
      }
      '.' => {
        tokens.push(Token::Dot);
        i += 1;
      }
      '!' if chars.get(i + 1) == Some(&'=') => {
        tokens.push(Token::Ne);
        i += 2;
      }
      '!' => {
        tokens.push(Token::Not);
        i += 1;
      }
      '=' if chars.get(i + 1) == Some(&'=') => {
        tokens.push(Token::Eq);
        i += 2;
      }
      '&' if chars.get(i + 1) == Some(&'&') => {
        tokens.push(Token::And);
        i += 2;
      }
      '|' if chars.get(i + 1) == Some(&'|') => {
        tokens.push(Token::Or);
        i += 2;
      }
      '\'' | '"' => {
        let quote = c;
        let mut value = String::new();
        i += 1;
        loop {
          match chars.get(i) {
            None => return Err(syntax_error(source, "unterminated string")),
            // A doubled quote is an escaped quote
            Some(&q) if q == quote && chars.get(i + 1) == Some(&quote) => {
              value.push(quote);
              i += 2;
            }
            Some(&q) if q == quote => {
              i += 1;
              break;
            }
            Some(&other) => {
              value.push(other);
              i += 1;
            }
          }
        }
        tokens.push(Token::Str(value));
      }
      c if c.is_ascii_digit() => {
        let start = i;
        while i < chars.len()
          && (chars[i].is_ascii_digit()
            || (chars[i] == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())))
        {
          i += 1;
        }
        let literal: String = chars[start..i].iter().collect();
        let number = literal
          .parse::<f64>()
          .map_err(|_| syntax_error(source, format!("invalid number `{}`", literal)))?;
        tokens.push(Token::Number(number));
      }
      c if c.is_alphabetic() || c == '_' => {
        let start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
        {
          i += 1;
        }
        tokens.push(Token::Ident(chars[start..i].iter().collect()));
      }
      other => {
        return Err(syntax_error(
          source,
          format!("unexpected character `{}`", other),
        ))
      }
    }
  }

  Ok(tokens)
}

struct Parser<'a> {
  source: &'a str,
  tokens: Vec<Token>,
  pos: usize,
}

impl<'a> Parser<'a> {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn next(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    token
  }

  fn expect(&mut self, expected: Token) -> Result<()> {
    match self.next() {
      Some(token) if token == expected => Ok(()),
      Some(token) => Err(syntax_error(
        self.source,
        format!("expected {:?}, found {:?}", expected, token),
      )),
      None => Err(syntax_error(
        self.source,
        format!("expected {:?}, found end of input", expected),
      )),
    }
  }

  fn parse_or(&mut self) -> Result<Expr> {
    let mut lhs = self.parse_and()?;
    while self.peek() == Some(&Token::Or) {
      self.pos += 1;
      let rhs = self.parse_and()?;
      lhs = Expr::Binary {
        op: BinaryOp::Or,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      };
    }
    Ok(lhs)
  }

  fn parse_and(&mut self) -> Result<Expr> {
    let mut lhs = self.parse_comparison()?;
    while self.peek() == Some(&Token::And) {
      self.pos += 1;
      let rhs = self.parse_comparison()?;
      lhs = Expr::Binary {
        op: BinaryOp::And,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      };
    }
    Ok(lhs)
  }

  fn parse_comparison(&mut self) -> Result<Expr> {
    let lhs = self.parse_unary()?;
    let op = match self.peek() {
      Some(Token::Eq) => BinaryOp::Eq,
      Some(Token::Ne) => BinaryOp::Ne,
      _ => return Ok(lhs),
    };
    self.pos += 1;
    let rhs = self.parse_unary()?;

    Ok(Expr::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    })
  }

  fn parse_unary(&mut self) -> Result<Expr> {
    if self.peek() == Some(&Token::Not) {
      self.pos += 1;
      return Ok(Expr::Not(Box::new(self.parse_unary()?)));
    }

    self.parse_primary()
  }

  fn parse_primary(&mut self) -> Result<Expr> {
    match self.next() {
      Some(Token::Str(value)) => Ok(Expr::Literal(Value::String(value))),
      Some(Token::Number(number)) => Ok(Expr::Literal(
        serde_json::Number::from_f64(number)
          .map(Value::Number)
          .unwrap_or(Value::Null),
      )),
      Some(Token::LParen) => {
        let expr = self.parse_or()?;
        self.expect(Token::RParen)?;
        Ok(expr)
      }
      Some(Token::Ident(name)) => match name.as_str() {
        "true" => Ok(Expr::Literal(Value::Bool(true))),
        "false" => Ok(Expr::Literal(Value::Bool(false))),
        "null" => Ok(Expr::Literal(Value::Null)),
        _ if self.peek() == Some(&Token::LParen) => self.parse_call(name),
        _ => self.parse_path(name),
      },
      Some(token) => Err(syntax_error(
        self.source,
        format!("unexpected token {:?}", token),
      )),
      None => Err(syntax_error(self.source, "unexpected end of input")),
    }
  }

  fn parse_call(&mut self, name: String) -> Result<Expr> {
    let function = Function::from_name(&name)
      .ok_or_else(|| syntax_error(self.source, format!("unknown function `{}`", name)))?;

    self.expect(Token::LParen)?;
    let mut args = Vec::new();
    if self.peek() != Some(&Token::RParen) {
      loop {
        args.push(self.parse_or()?);
        if self.peek() == Some(&Token::Comma) {
          self.pos += 1;
        } else {
          break;
        }
      }
    }
    self.expect(Token::RParen)?;

    if args.len() != function.arity() {
      return Err(syntax_error(
        self.source,
        format!(
          "`{}` takes {} argument(s), {} given",
          name,
          function.arity(),
          args.len()
        ),
      ));
    }

    Ok(Expr::Call { function, args })
  }

  fn parse_path(&mut self, head: String) -> Result<Expr> {
    let mut segments = vec![head];
    while self.peek() == Some(&Token::Dot) {
      self.pos += 1;
      match self.next() {
        Some(Token::Ident(segment)) => segments.push(segment),
        Some(Token::Number(index)) if index.fract() == 0.0 && index >= 0.0 => {
          segments.push((index as u64).to_string())
        }
        _ => return Err(syntax_error(self.source, "expected a property name after `.`")),
      }
    }

    Ok(Expr::Path(segments))
  }
}

/// Parses a bare expression (without the `${{ }}` wrapper).
pub fn parse(source: &str) -> Result<Expr> {
  let tokens = tokenize(source)?;
  if tokens.is_empty() {
    return Err(syntax_error(source, "empty expression"));
  }

  let mut parser = Parser {
    source,
    tokens,
    pos: 0,
  };
  let expr = parser.parse_or()?;

  if let Some(token) = parser.peek() {
    return Err(syntax_error(
      source,
      format!("unexpected trailing token {:?}", token),
    ));
  }

  Ok(expr)
}
