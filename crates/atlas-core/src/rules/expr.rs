//! Sandboxed evaluation of rule condition expressions.
//!
//! A small hand-written lexer, recursive-descent parser, and evaluator over
//! a fixed grammar: numeric and boolean literals, bound variables,
//! comparisons, arithmetic, and boolean connectives (`and or not`, with
//! `&& || !` accepted as alternate spellings). There are no function calls,
//! no attribute access, and no ambient state: conditions structurally
//! cannot execute arbitrary code. Numbers and booleans coerce the way
//! Python treats them (`true == 1`), and truthiness of a non-zero number
//! satisfies a bare numeric condition.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Values & errors
// ---------------------------------------------------------------------------

/// A runtime value: conditions only ever produce numbers or booleans.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn as_number(self) -> f64 {
        match self {
            Value::Number(n) => n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
        }
    }

    /// Python-style truthiness: non-zero numbers are true.
    pub fn truthy(self) -> bool {
        match self {
            Value::Number(n) => n != 0.0,
            Value::Bool(b) => b,
        }
    }
}

/// Evaluation failure. The rule engine treats every variant the same way:
/// the rule is not triggered.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unexpected token")]
    UnexpectedToken,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown name '{0}'")]
    UnknownName(String),

    #[error("division by zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '0'..='9' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedChar(c))?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match name.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    _ => Token::Ident(name),
                });
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Eq),
                    _ => return Err(ExprError::UnexpectedChar('=')),
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                match chars.next() {
                    Some('&') => tokens.push(Token::And),
                    _ => return Err(ExprError::UnexpectedChar('&')),
                }
            }
            '|' => {
                chars.next();
                match chars.next() {
                    Some('|') => tokens.push(Token::Or),
                    _ => return Err(ExprError::UnexpectedChar('|')),
                }
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Number(f64),
    Bool(bool),
    Var(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(left),
        };
        self.position += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name.clone())),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    Err(ExprError::UnexpectedEnd)
                }
            }
            Some(_) => Err(ExprError::UnexpectedToken),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
    };
    let expr = parser.parse_or()?;
    if parser.position != tokens.len() {
        return Err(ExprError::UnexpectedToken);
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, vars: &HashMap<String, Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name) => vars
            .get(name)
            .copied()
            .ok_or_else(|| ExprError::UnknownName(name.clone())),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, vars)?.truthy())),
        Expr::Neg(inner) => Ok(Value::Number(-eval(inner, vars)?.as_number())),
        Expr::Binary(op, left, right) => {
            // Boolean connectives short-circuit on truthiness.
            match op {
                BinOp::And => {
                    let lhs = eval(left, vars)?;
                    if !lhs.truthy() {
                        return Ok(Value::Bool(false));
                    }
                    return Ok(Value::Bool(eval(right, vars)?.truthy()));
                }
                BinOp::Or => {
                    let lhs = eval(left, vars)?;
                    if lhs.truthy() {
                        return Ok(Value::Bool(true));
                    }
                    return Ok(Value::Bool(eval(right, vars)?.truthy()));
                }
                _ => {}
            }

            let lhs = eval(left, vars)?.as_number();
            let rhs = eval(right, vars)?.as_number();
            match op {
                BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
                BinOp::Ne => Ok(Value::Bool(lhs != rhs)),
                BinOp::Lt => Ok(Value::Bool(lhs < rhs)),
                BinOp::Le => Ok(Value::Bool(lhs <= rhs)),
                BinOp::Gt => Ok(Value::Bool(lhs > rhs)),
                BinOp::Ge => Ok(Value::Bool(lhs >= rhs)),
                BinOp::Add => Ok(Value::Number(lhs + rhs)),
                BinOp::Sub => Ok(Value::Number(lhs - rhs)),
                BinOp::Mul => Ok(Value::Number(lhs * rhs)),
                BinOp::Div => {
                    if rhs == 0.0 {
                        Err(ExprError::DivisionByZero)
                    } else {
                        Ok(Value::Number(lhs / rhs))
                    }
                }
                BinOp::Rem => {
                    if rhs == 0.0 {
                        Err(ExprError::DivisionByZero)
                    } else {
                        Ok(Value::Number(lhs % rhs))
                    }
                }
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }
    }
}

/// Evaluate an expression against the given variable bindings.
pub fn evaluate(input: &str, vars: &HashMap<String, Value>) -> Result<Value, ExprError> {
    eval(&parse(input)?, vars)
}

/// Evaluate an expression as a condition, applying truthiness to the result.
pub fn evaluate_bool(input: &str, vars: &HashMap<String, Value>) -> Result<bool, ExprError> {
    Ok(evaluate(input, vars)?.truthy())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Value::Number(*value)))
            .collect()
    }

    #[test]
    fn test_comparison() {
        let bindings = vars(&[("complexity", 12.0), ("max_complexity", 10.0)]);
        assert_eq!(
            evaluate_bool("complexity > max_complexity", &bindings),
            Ok(true)
        );
        assert_eq!(
            evaluate_bool("complexity <= max_complexity", &bindings),
            Ok(false)
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        let bindings = HashMap::new();
        assert_eq!(evaluate("2 + 3 * 4", &bindings), Ok(Value::Number(14.0)));
        assert_eq!(evaluate("(2 + 3) * 4", &bindings), Ok(Value::Number(20.0)));
        assert_eq!(evaluate("10 % 4", &bindings), Ok(Value::Number(2.0)));
        assert_eq!(evaluate("-3 + 5", &bindings), Ok(Value::Number(2.0)));
    }

    #[test]
    fn test_boolean_connectives() {
        let bindings = vars(&[("loc", 600.0), ("comment_ratio", 0.02)]);
        assert_eq!(
            evaluate_bool("loc > 500 and comment_ratio < 0.1", &bindings),
            Ok(true)
        );
        assert_eq!(
            evaluate_bool("loc > 1000 or comment_ratio < 0.1", &bindings),
            Ok(true)
        );
        assert_eq!(evaluate_bool("not loc > 500", &bindings), Ok(false));
    }

    #[test]
    fn test_symbolic_spellings() {
        let bindings = vars(&[("a", 1.0), ("b", 0.0)]);
        assert_eq!(evaluate_bool("a == 1 && b == 0", &bindings), Ok(true));
        assert_eq!(evaluate_bool("a == 0 || b == 0", &bindings), Ok(true));
        assert_eq!(evaluate_bool("!(a == 1)", &bindings), Ok(false));
    }

    #[test]
    fn test_boolean_literals_coerce_like_python() {
        let bindings = HashMap::new();
        assert_eq!(evaluate_bool("true", &bindings), Ok(true));
        assert_eq!(evaluate_bool("True == 1", &bindings), Ok(true));
        assert_eq!(evaluate_bool("False < 0.5", &bindings), Ok(true));
    }

    #[test]
    fn test_numeric_truthiness() {
        let bindings = vars(&[("complexity", 3.0), ("zero", 0.0)]);
        assert_eq!(evaluate_bool("complexity", &bindings), Ok(true));
        assert_eq!(evaluate_bool("zero", &bindings), Ok(false));
    }

    #[test]
    fn test_unknown_name_errors() {
        let bindings = vars(&[("loc", 10.0)]);
        assert_eq!(
            evaluate_bool("undefined_var > 5", &bindings),
            Err(ExprError::UnknownName("undefined_var".to_string()))
        );
    }

    #[test]
    fn test_malformed_expressions_error() {
        let bindings = HashMap::new();
        assert!(evaluate_bool("1 +", &bindings).is_err());
        assert!(evaluate_bool("(1 > 0", &bindings).is_err());
        assert!(evaluate_bool("1 = 1", &bindings).is_err());
        assert!(evaluate_bool("foo bar", &bindings).is_err());
        assert!(evaluate_bool("@", &bindings).is_err());
    }

    #[test]
    fn test_no_call_syntax_exists() {
        // The grammar has no call production; a paren after a name is a
        // parse error, keeping the sandbox structural.
        let bindings = vars(&[("loc", 10.0)]);
        assert!(evaluate_bool("loc(1)", &bindings).is_err());
        assert!(evaluate_bool("__import__(1)", &bindings).is_err());
    }

    #[test]
    fn test_no_attribute_access() {
        let bindings = vars(&[("loc", 10.0)]);
        assert!(evaluate_bool("loc.real > 1", &bindings).is_err());
    }

    #[test]
    fn test_division_by_zero_errors() {
        let bindings = HashMap::new();
        assert_eq!(
            evaluate_bool("1 / 0", &bindings),
            Err(ExprError::DivisionByZero)
        );
        assert_eq!(
            evaluate_bool("1 % 0", &bindings),
            Err(ExprError::DivisionByZero)
        );
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let bindings = vars(&[("loc", 0.0)]);
        // rhs would fail on the unknown name, but the lhs decides first
        assert_eq!(evaluate_bool("loc and missing > 1", &bindings), Ok(false));
        assert_eq!(evaluate_bool("1 or missing > 1", &bindings), Ok(true));
    }

    #[test]
    fn test_float_literals() {
        let bindings = vars(&[("comment_ratio", 0.05)]);
        assert_eq!(
            evaluate_bool("comment_ratio < 0.1", &bindings),
            Ok(true)
        );
    }
}
