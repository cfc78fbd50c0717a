//! The built-in command loop's language: integer arithmetic with variables.
//!
//! ```text
//! line    := "" | "help" | "vars" | "quit" | "exit" | ident "=" expr | expr
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | atom
//! atom    := number | ident | "(" expr ")"
//! ```
//!
//! Arithmetic is checked `i64`; overflow and division by zero are errors,
//! not panics.

use std::collections::BTreeMap;
use std::fmt;

pub const HELP: &str = "\
Expressions:  1 + 2 * (3 - 4), -x % 7
Assignment:   name = expr
Commands:     vars (list variables), help, quit
Undo:         type `undo` or press Ctrl-C at the prompt to take back the last line";

/// Why a line could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcError {
    Syntax(String),
    UnknownVariable(String),
    DivisionByZero,
    Overflow,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "syntax error: {msg}"),
            Self::UnknownVariable(name) => write!(f, "unknown variable `{name}`"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::Overflow => write!(f, "integer overflow"),
        }
    }
}

impl std::error::Error for CalcError {}

/// What the loop should do with an evaluated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Nothing,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Ident(String),
    Op(char),
}

/// Interpreter state. This is what undo rolls back.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    vars: BTreeMap<String, i64>,
}

impl Calculator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.vars.get(name).copied()
    }

    /// Evaluate one input line.
    ///
    /// # Errors
    ///
    /// Returns a [`CalcError`] for malformed or failing expressions; state is
    /// unchanged in that case.
    pub fn eval_line(&mut self, line: &str) -> Result<Reply, CalcError> {
        let line = line.trim();
        match line {
            "" => return Ok(Reply::Nothing),
            "help" => return Ok(Reply::Output(HELP.to_string())),
            "quit" | "exit" => return Ok(Reply::Quit),
            "vars" => return Ok(Reply::Output(self.render_vars())),
            _ => {}
        }

        let tokens = tokenize(line)?;
        if let [Token::Ident(name), Token::Op('='), rest @ ..] = tokens.as_slice() {
            let value = Parser::new(rest, &self.vars).parse_all()?;
            self.vars.insert(name.clone(), value);
            return Ok(Reply::Nothing);
        }
        let value = Parser::new(&tokens, &self.vars).parse_all()?;
        Ok(Reply::Output(value.to_string()))
    }

    fn render_vars(&self) -> String {
        if self.vars.is_empty() {
            return "(no variables)".to_string();
        }
        self.vars
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn tokenize(line: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();
    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else if ch.is_ascii_digit() {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let value = line[start..end].parse().map_err(|_| CalcError::Overflow)?;
            tokens.push(Token::Number(value));
        } else if ch.is_alphabetic() || ch == '_' {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !(c.is_alphanumeric() || c == '_') {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push(Token::Ident(line[start..end].to_string()));
        } else if "+-*/%()=".contains(ch) {
            tokens.push(Token::Op(ch));
            chars.next();
        } else {
            return Err(CalcError::Syntax(format!("unexpected `{ch}`")));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    vars: &'a BTreeMap<String, i64>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], vars: &'a BTreeMap<String, i64>) -> Self {
        Self {
            tokens,
            pos: 0,
            vars,
        }
    }

    fn parse_all(mut self) -> Result<i64, CalcError> {
        let value = self.expr()?;
        match self.tokens.get(self.pos) {
            None => Ok(value),
            Some(token) => Err(CalcError::Syntax(format!("unexpected {}", describe(token)))),
        }
    }

    fn eat(&mut self, op: char) -> bool {
        if self.tokens.get(self.pos) == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<i64, CalcError> {
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                acc = acc.checked_add(self.term()?).ok_or(CalcError::Overflow)?;
            } else if self.eat('-') {
                acc = acc.checked_sub(self.term()?).ok_or(CalcError::Overflow)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<i64, CalcError> {
        let mut acc = self.unary()?;
        loop {
            let op = if self.eat('*') {
                '*'
            } else if self.eat('/') {
                '/'
            } else if self.eat('%') {
                '%'
            } else {
                return Ok(acc);
            };
            let rhs = self.unary()?;
            acc = match op {
                '*' => acc.checked_mul(rhs).ok_or(CalcError::Overflow)?,
                _ if rhs == 0 => return Err(CalcError::DivisionByZero),
                '/' => acc.checked_div(rhs).ok_or(CalcError::Overflow)?,
                _ => acc.checked_rem(rhs).ok_or(CalcError::Overflow)?,
            };
        }
    }

    fn unary(&mut self) -> Result<i64, CalcError> {
        if self.eat('-') {
            return self.unary()?.checked_neg().ok_or(CalcError::Overflow);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<i64, CalcError> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| CalcError::Syntax("unexpected end of input".to_string()))?;
        self.pos += 1;
        match token {
            Token::Number(value) => Ok(*value),
            Token::Ident(name) => self
                .vars
                .get(name)
                .copied()
                .ok_or_else(|| CalcError::UnknownVariable(name.clone())),
            Token::Op('(') => {
                let value = self.expr()?;
                if self.eat(')') {
                    Ok(value)
                } else {
                    Err(CalcError::Syntax("missing `)`".to_string()))
                }
            }
            other => Err(CalcError::Syntax(format!("unexpected {}", describe(other)))),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(value) => format!("number {value}"),
        Token::Ident(name) => format!("name `{name}`"),
        Token::Op(op) => format!("`{op}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(calc: &mut Calculator, line: &str) -> Result<Reply, CalcError> {
        calc.eval_line(line)
    }

    fn value(calc: &mut Calculator, line: &str) -> String {
        match eval(calc, line) {
            Ok(Reply::Output(text)) => text,
            other => panic!("expected output for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn precedence_and_parentheses() {
        let mut calc = Calculator::new();
        assert_eq!(value(&mut calc, "1 + 2 * 3"), "7");
        assert_eq!(value(&mut calc, "(1 + 2) * 3"), "9");
        assert_eq!(value(&mut calc, "-2 * -3"), "6");
        assert_eq!(value(&mut calc, "17 % 5 - 10 / 3"), "-1");
    }

    #[test]
    fn assignment_and_lookup() {
        let mut calc = Calculator::new();
        assert_eq!(eval(&mut calc, "x = 40\n"), Ok(Reply::Nothing));
        assert_eq!(value(&mut calc, "x + 2"), "42");
        assert_eq!(calc.get("x"), Some(40));
        assert_eq!(value(&mut calc, "vars"), "x = 40");
    }

    #[test]
    fn errors_leave_state_alone() {
        let mut calc = Calculator::new();
        eval(&mut calc, "x = 1").unwrap();
        assert_eq!(eval(&mut calc, "x = 1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(calc.get("x"), Some(1));
        assert_eq!(
            eval(&mut calc, "y + 1"),
            Err(CalcError::UnknownVariable("y".to_string()))
        );
        assert!(matches!(eval(&mut calc, "(1 + 2"), Err(CalcError::Syntax(_))));
        assert!(matches!(eval(&mut calc, "1 $ 2"), Err(CalcError::Syntax(_))));
        assert!(matches!(eval(&mut calc, "1 2"), Err(CalcError::Syntax(_))));
    }

    #[test]
    fn overflow_is_an_error() {
        let mut calc = Calculator::new();
        assert_eq!(
            eval(&mut calc, "9223372036854775807 + 1"),
            Err(CalcError::Overflow)
        );
        assert_eq!(eval(&mut calc, "99999999999999999999"), Err(CalcError::Overflow));
    }

    #[test]
    fn commands() {
        let mut calc = Calculator::new();
        assert_eq!(eval(&mut calc, "  \n"), Ok(Reply::Nothing));
        assert_eq!(eval(&mut calc, "quit\n"), Ok(Reply::Quit));
        assert_eq!(eval(&mut calc, "exit"), Ok(Reply::Quit));
        assert_eq!(value(&mut calc, "vars"), "(no variables)");
        assert!(value(&mut calc, "help").contains("undo"));
    }
}
