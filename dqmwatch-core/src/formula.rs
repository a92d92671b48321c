//! Fit formula parsing and evaluation.
//!
//! The formula language covers arithmetic on numbers, the variables `x`,
//! `y`, `z`, fit parameters `[i]`, the constant `pi`, the functions
//! `sin cos tan exp log sqrt abs pow`, and the built-in shapes:
//!
//! | built-in  | expansion                                   |
//! |-----------|---------------------------------------------|
//! | `gaus(k)` | `[k]*exp(-0.5*((x-[k+1])/[k+2])^2)`         |
//! | `expo(k)` | `exp([k]+[k+1]*x)`                          |
//! | `polN(k)` | `[k]+[k+1]*x+...+[k+N]*x^N`                 |
//!
//! A bare built-in (`gaus`, `pol2`) starts at parameter 0. Parameter
//! indices, including those a built-in expands to, stay below
//! [`MAX_PARAMETERS`].
//!
//! ```rust
//! use dqmwatch_core::formula::Formula;
//!
//! let formula = Formula::parse("gaus(0) + [3]").unwrap();
//! assert_eq!(formula.npar(), 4);
//! assert_eq!(formula.eval(&[0.0], &[2.0, 0.0, 1.0, 0.5]), 2.5);
//! ```

use thiserror::Error;

/// Upper bound on the number of fit parameters a formula may use.
pub const MAX_PARAMETERS: usize = 100;

/// Errors raised while parsing a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("empty formula")]
    Empty,

    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid parameter index in '{0}'")]
    BadParameter(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Param(usize),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Comma,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(v) => v.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Param(i) => format!("[{i}]"),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Caret => "^".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| start + p)
                    .ok_or(FormulaError::UnexpectedEnd)?;
                let text: String = chars[start..end].iter().collect();
                let index = text
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|&index| index < MAX_PARAMETERS)
                    .ok_or_else(|| FormulaError::BadParameter(format!("[{text}]")))?;
                tokens.push(Token::Param(index));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent part, e.g. 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(FormulaError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Pow,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            "log" => Function::Log,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "pow" => Function::Pow,
            _ => return None,
        })
    }

    fn arity(&self) -> usize {
        match self {
            Function::Pow => 2,
            _ => 1,
        }
    }

    fn apply(&self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(0.0);
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Exp => a.exp(),
            Function::Log => a.ln(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
            Function::Pow => a.powf(args.get(1).copied().unwrap_or(1.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(usize),
    Parameter(usize),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn eval(&self, vars: &[f64], params: &[f64]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Variable(i) => vars.get(*i).copied().unwrap_or(0.0),
            Expr::Parameter(i) => params.get(*i).copied().unwrap_or(0.0),
            Expr::Negate(e) => -e.eval(vars, params),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(vars, params), rhs.eval(vars, params));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Expr::Call(f, args) => {
                let values: Vec<f64> = args.iter().map(|a| a.eval(vars, params)).collect();
                f.apply(&values)
            }
        }
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Negate(e) => e.visit(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.visit(f)),
            _ => {}
        }
    }
}

/// A built-in shape used in a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Gaus,
    Expo,
    /// Polynomial of the given degree.
    Pol(usize),
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "gaus" => Some(Builtin::Gaus),
            "expo" => Some(Builtin::Expo),
            _ => name
                .strip_prefix("pol")
                .and_then(|degree| degree.parse::<usize>().ok())
                .map(Builtin::Pol),
        }
    }

    /// Number of parameters the shape consumes.
    pub fn npar(&self) -> usize {
        match self {
            Builtin::Gaus => 3,
            Builtin::Expo => 2,
            Builtin::Pol(degree) => degree.saturating_add(1),
        }
    }

    fn expand(&self, offset: usize) -> Expr {
        let x = || Expr::Variable(0);
        let p = |i: usize| Expr::Parameter(offset + i);
        match self {
            Builtin::Gaus => {
                let reduced = Expr::binary(BinaryOp::Div, Expr::binary(BinaryOp::Sub, x(), p(1)), p(2));
                let exponent = Expr::binary(
                    BinaryOp::Mul,
                    Expr::Number(-0.5),
                    Expr::binary(BinaryOp::Pow, reduced, Expr::Number(2.0)),
                );
                Expr::binary(BinaryOp::Mul, p(0), Expr::Call(Function::Exp, vec![exponent]))
            }
            Builtin::Expo => Expr::Call(
                Function::Exp,
                vec![Expr::binary(BinaryOp::Add, p(0), Expr::binary(BinaryOp::Mul, p(1), x()))],
            ),
            Builtin::Pol(degree) => (1..=*degree).fold(p(0), |acc, power| {
                let term = Expr::binary(
                    BinaryOp::Mul,
                    p(power),
                    Expr::binary(BinaryOp::Pow, x(), Expr::Number(power as f64)),
                );
                Expr::binary(BinaryOp::Add, acc, term)
            }),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    builtins: Vec<(Builtin, usize)>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(FormulaError::UnexpectedToken(token.describe())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            lhs = Expr::binary(op, lhs, self.term()?);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.pos += 1;
            lhs = Expr::binary(op, lhs, self.unary()?);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // Right associative, binds tighter than unary minus on its left.
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::Param(i)) => Ok(Expr::Parameter(i)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.identifier(name),
            Some(token) => Err(FormulaError::UnexpectedToken(token.describe())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, FormulaError> {
        match name.as_str() {
            "x" => return Ok(Expr::Variable(0)),
            "y" => return Ok(Expr::Variable(1)),
            "z" => return Ok(Expr::Variable(2)),
            "pi" => return Ok(Expr::Number(std::f64::consts::PI)),
            _ => {}
        }
        if let Some(builtin) = Builtin::lookup(&name) {
            let offset = self.builtin_offset(&name)?;
            if offset.saturating_add(builtin.npar()) > MAX_PARAMETERS {
                return Err(FormulaError::BadParameter(format!("{name}({offset})")));
            }
            self.builtins.push((builtin, offset));
            return Ok(builtin.expand(offset));
        }
        if let Some(function) = Function::lookup(&name) {
            self.expect(Token::LParen)?;
            let mut args = vec![self.expression()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                args.push(self.expression()?);
            }
            self.expect(Token::RParen)?;
            if args.len() != function.arity() {
                return Err(FormulaError::Arity {
                    name,
                    expected: function.arity(),
                    found: args.len(),
                });
            }
            return Ok(Expr::Call(function, args));
        }
        Err(FormulaError::UnknownIdentifier(name))
    }

    fn builtin_offset(&mut self, name: &str) -> Result<usize, FormulaError> {
        if self.peek() != Some(&Token::LParen) {
            return Ok(0);
        }
        self.pos += 1;
        let offset = match self.next() {
            Some(Token::Number(v)) if v >= 0.0 && v.fract() == 0.0 => v as usize,
            _ => return Err(FormulaError::BadParameter(format!("{name}(...)"))),
        };
        self.expect(Token::RParen)?;
        Ok(offset)
    }
}

/// A parsed fit formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
    npar: usize,
    ndim: usize,
    builtins: Vec<(Builtin, usize)>,
}

impl Formula {
    /// Parse `source`.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        if source.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            builtins: Vec::new(),
        };
        let expr = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(FormulaError::UnexpectedToken(token.describe()));
        }

        let (mut npar, mut ndim) = (0, 0);
        expr.visit(&mut |e| match e {
            Expr::Parameter(i) => npar = npar.max(i.saturating_add(1)),
            Expr::Variable(i) => ndim = ndim.max(i + 1),
            _ => {}
        });

        Ok(Self {
            source: source.to_string(),
            expr,
            npar,
            ndim,
            builtins: parser.builtins,
        })
    }

    /// The formula as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of fit parameters, i.e. the highest `[i]` used plus one.
    pub fn npar(&self) -> usize {
        self.npar
    }

    /// Number of variables used, 1 for `x` only, up to 3.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Built-in shapes with their first parameter index.
    pub fn builtins(&self) -> &[(Builtin, usize)] {
        &self.builtins
    }

    /// Evaluate at `vars` (x, y, z) with `params`.
    pub fn eval(&self, vars: &[f64], params: &[f64]) -> f64 {
        self.expr.eval(vars, params)
    }
}

impl std::str::FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}
