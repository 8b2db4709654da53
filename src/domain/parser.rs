//! Row predicate expressions.
//!
//! Rows can be targeted with a small, side-effect free expression language
//! evaluated against the raw values of each row. This module implements a
//! recursive descent parser for it and a tree-walking evaluator.
//!
//! # BNF Grammar
//!
//! ```bnf
//! Expression     ::= Equality
//! Equality       ::= Comparison ( ( "<>" | "!=" | "=" | "==" ) Comparison )*
//! Comparison     ::= Addition ( ( "<" | "<=" | ">" | ">=" ) Addition )*
//! Addition       ::= Multiplication ( ( "+" | "-" ) Multiplication )*
//! Multiplication ::= Power ( ( "*" | "/" | "%" ) Power )*
//! Power          ::= Unary ( ( "**" | "^" ) Unary )*
//! Unary          ::= ( "+" | "-" )? Primary
//! Primary        ::= Number | String | Boolean | Column | FunctionCall | "(" Expression ")"
//! FunctionCall   ::= Identifier "(" ArgumentList? ")"
//! ArgumentList   ::= Expression ( "," Expression )*
//! Column         ::= Identifier | "`" any-char-but-backtick+ "`"
//! String         ::= '"' any-char-but-quote* '"'
//! Boolean        ::= "TRUE" | "FALSE"
//! Number         ::= [0-9]+ ( "." [0-9]+ )?
//! Identifier     ::= [A-Za-z_][A-Za-z0-9_.]*
//! ```
//!
//! Comparisons and arithmetic involving a missing value yield a missing
//! value, and a row whose predicate evaluates to missing is not selected.
//! Logical operations are functions (`AND`, `OR`, `NOT`).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;

use super::datetime::{parse_date, parse_datetime, parse_time};
use super::errors::{FormatError, FormatResult};
use super::models::{CellValue, Table};

/// Represents a token in the expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    Str(String),
    Bool(bool),
    Identifier(String),
    QuotedColumn(String),

    // Operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Power,
    PowerAlt,

    // Comparison operators
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    NotEqual,
    Equal,

    // Delimiters
    LeftParen,
    RightParen,
    Comma,

    Eof,
}

/// Represents an Abstract Syntax Tree node for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    /// Column reference by name, as written.
    Column(String),
    /// Column reference bound to an index by [`bind_columns`].
    ColumnAt(usize),

    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Equal,
    NotEqual,

    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    Power,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Lexical analyzer for tokenizing expressions.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<f64, String> {
        let mut number_str = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self.current_char == Some('.') {
            number_str.push('.');
            self.advance();

            while let Some(ch) = self.current_char {
                if ch.is_ascii_digit() {
                    number_str.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        number_str
            .parse::<f64>()
            .map_err(|_| format!("Invalid number: {}", number_str))
    }

    /// Reads an identifier, preserving case since column names are case-sensitive.
    fn read_identifier(&mut self) -> String {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        identifier
    }

    /// Reads text up to `terminator`, consuming both delimiters.
    fn read_delimited(&mut self, terminator: char) -> Result<String, String> {
        self.advance();
        let mut text = String::new();

        loop {
            match self.current_char {
                Some(ch) if ch == terminator => {
                    self.advance();
                    return Ok(text);
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
                None => return Err(format!("Unterminated literal, expected '{}'", terminator)),
            }
        }
    }

    fn classify_identifier(identifier: String) -> Token {
        if identifier.eq_ignore_ascii_case("true") {
            Token::Bool(true)
        } else if identifier.eq_ignore_ascii_case("false") {
            Token::Bool(false)
        } else {
            Token::Identifier(identifier)
        }
    }

    pub fn next_token(&mut self) -> Result<Token, String> {
        self.skip_whitespace();

        match self.current_char {
            None => Ok(Token::Eof),

            Some(ch) => match ch {
                '0'..='9' => {
                    let number = self.read_number()?;
                    Ok(Token::Number(number))
                }

                'A'..='Z' | 'a'..='z' | '_' => {
                    let identifier = self.read_identifier();
                    Ok(Self::classify_identifier(identifier))
                }

                '"' => Ok(Token::Str(self.read_delimited('"')?)),

                '`' => {
                    let name = self.read_delimited('`')?;
                    if name.is_empty() {
                        Err("Empty quoted column name".to_string())
                    } else {
                        Ok(Token::QuotedColumn(name))
                    }
                }

                '+' => {
                    self.advance();
                    Ok(Token::Plus)
                }

                '-' => {
                    self.advance();
                    Ok(Token::Minus)
                }

                '*' => {
                    self.advance();
                    if self.current_char == Some('*') {
                        self.advance();
                        Ok(Token::Power)
                    } else {
                        Ok(Token::Multiply)
                    }
                }

                '/' => {
                    self.advance();
                    Ok(Token::Divide)
                }

                '%' => {
                    self.advance();
                    Ok(Token::Modulo)
                }

                '^' => {
                    self.advance();
                    Ok(Token::PowerAlt)
                }

                '<' => {
                    self.advance();
                    match self.current_char {
                        Some('=') => {
                            self.advance();
                            Ok(Token::LessEqual)
                        }
                        Some('>') => {
                            self.advance();
                            Ok(Token::NotEqual)
                        }
                        _ => Ok(Token::Less),
                    }
                }

                '>' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                        Ok(Token::GreaterEqual)
                    } else {
                        Ok(Token::Greater)
                    }
                }

                '!' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                        Ok(Token::NotEqual)
                    } else {
                        Err("Unexpected character: '!'".to_string())
                    }
                }

                '=' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                    }
                    Ok(Token::Equal)
                }

                '(' => {
                    self.advance();
                    Ok(Token::LeftParen)
                }

                ')' => {
                    self.advance();
                    Ok(Token::RightParen)
                }

                ',' => {
                    self.advance();
                    Ok(Token::Comma)
                }

                _ => Err(format!("Unexpected character: '{}'", ch)),
            },
        }
    }
}

/// Function signature for predicate functions.
pub type FunctionImpl = fn(&[CellValue]) -> Result<CellValue, String>;

/// Registry of the pure functions available to predicates.
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionImpl>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_builtin_functions();
        registry
    }

    pub fn register_function(&mut self, name: &str, func: FunctionImpl) {
        self.functions.insert(name.to_uppercase(), func);
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionImpl> {
        self.functions.get(&name.to_uppercase())
    }

    fn register_builtin_functions(&mut self) {
        self.register_function("AND", |args| {
            let mut saw_missing = false;
            for arg in args {
                match truthiness(arg)? {
                    Some(false) => return Ok(CellValue::Bool(false)),
                    None => saw_missing = true,
                    Some(true) => {}
                }
            }
            Ok(if saw_missing { CellValue::Missing } else { CellValue::Bool(true) })
        });

        self.register_function("OR", |args| {
            let mut saw_missing = false;
            for arg in args {
                match truthiness(arg)? {
                    Some(true) => return Ok(CellValue::Bool(true)),
                    None => saw_missing = true,
                    Some(false) => {}
                }
            }
            Ok(if saw_missing { CellValue::Missing } else { CellValue::Bool(false) })
        });

        self.register_function("NOT", |args| match args {
            [arg] => Ok(truthiness(arg)?.map_or(CellValue::Missing, |b| CellValue::Bool(!b))),
            _ => Err("NOT requires exactly 1 argument".to_string()),
        });

        self.register_function("IF", |args| match args {
            [cond, then, otherwise] => Ok(match truthiness(cond)? {
                Some(true) => then.clone(),
                Some(false) => otherwise.clone(),
                None => CellValue::Missing,
            }),
            _ => Err("IF requires exactly 3 arguments".to_string()),
        });

        self.register_function("IS_MISSING", |args| match args {
            [arg] => Ok(CellValue::Bool(arg.is_missing())),
            _ => Err("IS_MISSING requires exactly 1 argument".to_string()),
        });

        self.register_function("ABS", |args| match args {
            [arg] => Ok(numeric(arg)?.map_or(CellValue::Missing, |n| CellValue::Number(n.abs()))),
            _ => Err("ABS requires exactly 1 argument".to_string()),
        });

        self.register_function("ROUND", |args| {
            let (value, places) = match args {
                [value] => (numeric(value)?, Some(0.0)),
                [value, places] => (numeric(value)?, numeric(places)?),
                _ => return Err("ROUND requires 1 or 2 arguments".to_string()),
            };
            Ok(match value.zip(places) {
                Some((v, p)) => {
                    let multiplier = 10f64.powi(p as i32);
                    CellValue::Number((v * multiplier).round() / multiplier)
                }
                None => CellValue::Missing,
            })
        });

        self.register_function("MIN", |args| fold_numeric(args, "MIN", f64::min));
        self.register_function("MAX", |args| fold_numeric(args, "MAX", f64::max));

        self.register_function("LEN", |args| match args {
            [CellValue::Text(s)] => Ok(CellValue::Number(s.chars().count() as f64)),
            [arg] if arg.is_missing() => Ok(CellValue::Missing),
            [arg] => Ok(CellValue::Number(arg.display().chars().count() as f64)),
            _ => Err("LEN requires exactly 1 argument".to_string()),
        });
    }
}

/// Shared built-in registry used by compiled row expressions.
static BUILTINS: LazyLock<FunctionRegistry> = LazyLock::new(FunctionRegistry::new);

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn truthiness(value: &CellValue) -> Result<Option<bool>, String> {
    match value {
        CellValue::Bool(b) => Ok(Some(*b)),
        CellValue::Number(n) if n.is_nan() => Ok(None),
        CellValue::Number(n) => Ok(Some(*n != 0.0)),
        CellValue::Missing => Ok(None),
        other => Err(format!("Expected a logical value, found {}", other.kind())),
    }
}

fn numeric(value: &CellValue) -> Result<Option<f64>, String> {
    match value {
        CellValue::Number(n) if n.is_nan() => Ok(None),
        CellValue::Number(n) => Ok(Some(*n)),
        CellValue::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        CellValue::Missing => Ok(None),
        other => Err(format!("Expected a number, found {}", other.kind())),
    }
}

fn fold_numeric(args: &[CellValue], name: &str, op: fn(f64, f64) -> f64) -> Result<CellValue, String> {
    let mut acc: Option<f64> = None;
    for arg in args {
        match numeric(arg)? {
            Some(x) => acc = Some(acc.map_or(x, |a| op(a, x))),
            None => return Ok(CellValue::Missing),
        }
    }
    acc.map(CellValue::Number)
        .ok_or_else(|| format!("{} requires at least one argument", name))
}

/// Recursive descent parser for predicate expressions.
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, String> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<(), String> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(format!("Expected {:?}, found {:?}", expected, self.current_token))
        }
    }

    pub fn parse(&mut self) -> Result<Expr, String> {
        let expr = self.parse_equality()?;

        if self.current_token != Token::Eof {
            return Err(format!("Unexpected token at end: {:?}", self.current_token));
        }

        Ok(expr)
    }

    fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.current_token {
                Token::Equal => BinaryOp::Equal,
                Token::NotEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_comparison()?;
            left = Self::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_addition()?;

        loop {
            let op = match self.current_token {
                Token::Less => BinaryOp::Less,
                Token::LessEqual => BinaryOp::LessEqual,
                Token::Greater => BinaryOp::Greater,
                Token::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_addition()?;
            left = Self::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplication()?;

        loop {
            let op = match self.current_token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplication()?;
            left = Self::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplication(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_power()?;

        loop {
            let op = match self.current_token {
                Token::Multiply => BinaryOp::Multiply,
                Token::Divide => BinaryOp::Divide,
                Token::Modulo => BinaryOp::Modulo,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_power()?;
            left = Self::binary(left, op, right);
        }

        Ok(left)
    }

    /// Parses power expressions (right-associative).
    fn parse_power(&mut self) -> Result<Expr, String> {
        let left = self.parse_unary()?;

        if matches!(self.current_token, Token::Power | Token::PowerAlt) {
            self.advance()?;
            let right = self.parse_power()?;
            Ok(Self::binary(left, BinaryOp::Power, right))
        } else {
            Ok(left)
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let operator = match self.current_token {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            _ => return self.parse_primary(),
        };
        self.advance()?;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match &self.current_token {
            Token::Number(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Number(value))
            }

            Token::Str(text) => {
                let text = text.clone();
                self.advance()?;
                Ok(Expr::Text(text))
            }

            Token::Bool(b) => {
                let b = *b;
                self.advance()?;
                Ok(Expr::Bool(b))
            }

            Token::QuotedColumn(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(Expr::Column(name))
            }

            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;

                if self.current_token == Token::LeftParen {
                    self.advance()?;
                    let args = self.parse_argument_list()?;
                    self.expect(Token::RightParen)?;
                    Ok(Expr::FunctionCall {
                        name: name.to_uppercase(),
                        args,
                    })
                } else {
                    Ok(Expr::Column(name))
                }
            }

            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_equality()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }

            _ => Err(format!("Unexpected token: {:?}", self.current_token)),
        }
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();

        if self.current_token == Token::RightParen {
            return Ok(args);
        }

        args.push(self.parse_equality()?);

        while self.current_token == Token::Comma {
            self.advance()?;
            args.push(self.parse_equality()?);
        }

        Ok(args)
    }
}

/// Replaces every [`Expr::Column`] with an [`Expr::ColumnAt`] bound against `table`.
///
/// Also checks that every called function exists, so a bound expression can
/// only fail on values, never on structure.
pub fn bind_columns(expr: Expr, table: &Table, functions: &FunctionRegistry) -> Result<Expr, String> {
    Ok(match expr {
        Expr::Column(name) => {
            let idx = table
                .column_index(&name)
                .ok_or_else(|| format!("Unknown column: {}", name))?;
            Expr::ColumnAt(idx)
        }
        Expr::Binary { left, operator, right } => Expr::Binary {
            left: Box::new(bind_columns(*left, table, functions)?),
            operator,
            right: Box::new(bind_columns(*right, table, functions)?),
        },
        Expr::Unary { operator, operand } => Expr::Unary {
            operator,
            operand: Box::new(bind_columns(*operand, table, functions)?),
        },
        Expr::FunctionCall { name, args } => {
            if functions.get_function(&name).is_none() {
                return Err(format!("Unknown function: {}", name));
            }
            let args = args
                .into_iter()
                .map(|arg| bind_columns(arg, table, functions))
                .collect::<Result<Vec<_>, _>>()?;
            Expr::FunctionCall { name, args }
        }
        other => other,
    })
}

/// Expression evaluator that walks a bound AST for one row.
pub struct ExpressionEvaluator<'a> {
    table: &'a Table,
    function_registry: &'a FunctionRegistry,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(table: &'a Table, function_registry: &'a FunctionRegistry) -> Self {
        Self {
            table,
            function_registry,
        }
    }

    pub fn evaluate(&self, expr: &Expr, row: usize) -> Result<CellValue, String> {
        match expr {
            Expr::Number(value) => Ok(CellValue::Number(*value)),
            Expr::Text(text) => Ok(CellValue::Text(text.clone())),
            Expr::Bool(b) => Ok(CellValue::Bool(*b)),

            Expr::Column(name) => {
                let idx = self
                    .table
                    .column_index(name)
                    .ok_or_else(|| format!("Unknown column: {}", name))?;
                self.value_at(idx, row)
            }

            Expr::ColumnAt(idx) => self.value_at(*idx, row),

            Expr::Binary { left, operator, right } => {
                let left_val = self.evaluate(left, row)?;
                let right_val = self.evaluate(right, row)?;
                apply_binary(*operator, &left_val, &right_val)
            }

            Expr::Unary { operator, operand } => {
                let value = numeric(&self.evaluate(operand, row)?)?;
                Ok(match (operator, value) {
                    (_, None) => CellValue::Missing,
                    (UnaryOp::Plus, Some(n)) => CellValue::Number(n),
                    (UnaryOp::Minus, Some(n)) => CellValue::Number(-n),
                })
            }

            Expr::FunctionCall { name, args } => {
                let func = self
                    .function_registry
                    .get_function(name)
                    .ok_or_else(|| format!("Unknown function: {}", name))?;

                let arg_values = args
                    .iter()
                    .map(|arg| self.evaluate(arg, row))
                    .collect::<Result<Vec<_>, _>>()?;
                func(&arg_values)
            }
        }
    }

    fn value_at(&self, col: usize, row: usize) -> Result<CellValue, String> {
        self.table
            .get(row, col)
            .cloned()
            .ok_or_else(|| format!("No cell at row {}, column {}", row, col))
    }
}

fn apply_binary(operator: BinaryOp, left: &CellValue, right: &CellValue) -> Result<CellValue, String> {
    if left.is_missing() || right.is_missing() {
        return Ok(CellValue::Missing);
    }

    let cmp = |pred: fn(Ordering) -> bool| -> Result<CellValue, String> {
        Ok(CellValue::Bool(pred(compare(left, right)?)))
    };

    match operator {
        BinaryOp::Less => cmp(|o| o == Ordering::Less),
        BinaryOp::LessEqual => cmp(|o| o != Ordering::Greater),
        BinaryOp::Greater => cmp(|o| o == Ordering::Greater),
        BinaryOp::GreaterEqual => cmp(|o| o != Ordering::Less),
        BinaryOp::Equal => cmp(|o| o == Ordering::Equal),
        BinaryOp::NotEqual => cmp(|o| o != Ordering::Equal),
        arithmetic => {
            let (Some(l), Some(r)) = (numeric(left)?, numeric(right)?) else {
                return Ok(CellValue::Missing);
            };
            let result = match arithmetic {
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide => {
                    if r == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    l / r
                }
                BinaryOp::Modulo => {
                    if r == 0.0 {
                        return Err("Modulo by zero".to_string());
                    }
                    l % r
                }
                _ => l.powf(r),
            };
            Ok(CellValue::Number(result))
        }
    }
}

/// Orders two non-missing values. Text literals are coerced to dates/times
/// when compared against temporal values.
fn compare(left: &CellValue, right: &CellValue) -> Result<Ordering, String> {
    use CellValue::*;

    let mismatch = || format!("Cannot compare {} with {}", left.kind(), right.kind());

    match (left, right) {
        (Number(_) | Bool(_), Number(_) | Bool(_)) => {
            let (l, r) = (numeric(left)?.unwrap_or(0.0), numeric(right)?.unwrap_or(0.0));
            l.partial_cmp(&r).ok_or_else(mismatch)
        }
        (Text(l), Text(r)) => Ok(l.cmp(r)),
        (Date(l), Date(r)) => Ok(l.cmp(r)),
        (Time(l), Time(r)) => Ok(l.cmp(r)),
        (DateTime(l), DateTime(r)) => Ok(l.cmp(r)),
        (Date(l), Text(r)) => Ok(l.cmp(&parse_date(r).ok_or_else(mismatch)?)),
        (Text(l), Date(r)) => Ok(parse_date(l).ok_or_else(mismatch)?.cmp(r)),
        (Time(l), Text(r)) => Ok(l.cmp(&parse_time(r).ok_or_else(mismatch)?)),
        (Text(l), Time(r)) => Ok(parse_time(l).ok_or_else(mismatch)?.cmp(r)),
        (DateTime(l), Text(r)) => Ok(l.cmp(&parse_literal_datetime(r).ok_or_else(mismatch)?)),
        (Text(l), DateTime(r)) => Ok(parse_literal_datetime(l).ok_or_else(mismatch)?.cmp(r)),
        _ => Err(mismatch()),
    }
}

/// Datetime literal; a bare date means midnight.
fn parse_literal_datetime(s: &str) -> Option<NaiveDateTime> {
    parse_datetime(s).or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// A parsed and column-bound row predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct RowExpression {
    source: String,
    expr: Expr,
}

impl RowExpression {
    /// Parses `source` and binds its column references against `table`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellfmt::domain::{Column, RowExpression, Table};
    ///
    /// let table = Table::new(vec![Column::new("value", [100.0, 900.0])]).unwrap();
    /// let expr = RowExpression::compile("value > 500", &table).unwrap();
    /// assert_eq!(expr.matches(&table, 0), Ok(false));
    /// assert_eq!(expr.matches(&table, 1), Ok(true));
    /// ```
    pub fn compile(source: &str, table: &Table) -> FormatResult<Self> {
        let invalid = |msg: String| FormatError::Selection(format!("Invalid row expression '{}': {}", source, msg));

        let expr = Parser::new(source).and_then(|mut p| p.parse()).map_err(invalid)?;
        let expr = bind_columns(expr, table, &BUILTINS).map_err(invalid)?;

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the predicate for `row`. A missing result means "not selected".
    pub fn matches(&self, table: &Table, row: usize) -> Result<bool, String> {
        let evaluator = ExpressionEvaluator::new(table, &BUILTINS);
        Ok(truthiness(&evaluator.evaluate(&self.expr, row)?)?.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::domain::Column;

    fn create_test_table() -> Table {
        Table::new(vec![
            Column::new("region", ["EU", "US", "APAC"]),
            Column::new("value", [Some(500.0), Some(501.0), None]),
            Column::new(
                "day",
                [
                    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                ],
            ),
            Column::new("unit price", [1.0, 2.0, 3.0]),
        ])
        .unwrap()
    }

    fn eval(src: &str, row: usize) -> Result<CellValue, String> {
        let table = create_test_table();
        let registry = FunctionRegistry::new();
        let expr = Parser::new(src)?.parse()?;
        let expr = bind_columns(expr, &table, &registry)?;
        ExpressionEvaluator::new(&table, &registry).evaluate(&expr, row)
    }

    #[test]
    fn test_lexer_numbers() {
        let mut lexer = Lexer::new("42 3.14 0.5");

        assert_eq!(lexer.next_token().unwrap(), Token::Number(42.0));
        assert_eq!(lexer.next_token().unwrap(), Token::Number(3.14));
        assert_eq!(lexer.next_token().unwrap(), Token::Number(0.5));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_lexer_operators() {
        let mut lexer = Lexer::new("+ - * / % ** ^ < <= > >= <> != = ==");

        assert_eq!(lexer.next_token().unwrap(), Token::Plus);
        assert_eq!(lexer.next_token().unwrap(), Token::Minus);
        assert_eq!(lexer.next_token().unwrap(), Token::Multiply);
        assert_eq!(lexer.next_token().unwrap(), Token::Divide);
        assert_eq!(lexer.next_token().unwrap(), Token::Modulo);
        assert_eq!(lexer.next_token().unwrap(), Token::Power);
        assert_eq!(lexer.next_token().unwrap(), Token::PowerAlt);
        assert_eq!(lexer.next_token().unwrap(), Token::Less);
        assert_eq!(lexer.next_token().unwrap(), Token::LessEqual);
        assert_eq!(lexer.next_token().unwrap(), Token::Greater);
        assert_eq!(lexer.next_token().unwrap(), Token::GreaterEqual);
        assert_eq!(lexer.next_token().unwrap(), Token::NotEqual);
        assert_eq!(lexer.next_token().unwrap(), Token::NotEqual);
        assert_eq!(lexer.next_token().unwrap(), Token::Equal);
        assert_eq!(lexer.next_token().unwrap(), Token::Equal);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_lexer_literals_and_columns() {
        let mut lexer = Lexer::new("value \"EU\" `unit price` TRUE false");

        assert_eq!(lexer.next_token().unwrap(), Token::Identifier("value".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Str("EU".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::QuotedColumn("unit price".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Bool(true));
        assert_eq!(lexer.next_token().unwrap(), Token::Bool(false));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_lexer_error_handling() {
        assert!(Lexer::new("@#$").next_token().is_err());
        assert!(Lexer::new("\"open").next_token().is_err());
        assert!(Lexer::new("``").next_token().is_err());
    }

    #[test]
    fn test_parser_operator_precedence() {
        let expr = Parser::new("2 + 3 * 4").unwrap().parse().unwrap();
        match expr {
            Expr::Binary { left, operator: BinaryOp::Add, right } => {
                assert_eq!(*left, Expr::Number(2.0));
                assert!(matches!(*right, Expr::Binary { operator: BinaryOp::Multiply, .. }));
            }
            _ => panic!("Expected addition at top level"),
        }
    }

    #[test]
    fn test_parser_power_right_associative() {
        let expr = Parser::new("2 ** 3 ^ 2").unwrap().parse().unwrap();
        match expr {
            Expr::Binary { left, operator: BinaryOp::Power, right } => {
                assert_eq!(*left, Expr::Number(2.0));
                assert!(matches!(*right, Expr::Binary { operator: BinaryOp::Power, .. }));
            }
            _ => panic!("Expected power at top level"),
        }
    }

    #[test]
    fn test_parser_columns_and_functions() {
        let expr = Parser::new("and(value > 5, `unit price` < 10)").unwrap().parse().unwrap();
        match expr {
            Expr::FunctionCall { name, args } => {
                assert_eq!(name, "AND");
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[0], Expr::Binary { left, .. } if **left == Expr::Column("value".to_string())));
                assert!(matches!(&args[1], Expr::Binary { left, .. } if **left == Expr::Column("unit price".to_string())));
            }
            _ => panic!("Expected function call"),
        }
    }

    #[test]
    fn test_parser_error_handling() {
        assert!(Parser::new("2 +").unwrap().parse().is_err());
        assert!(Parser::new("(2 + 3").unwrap().parse().is_err());
        assert!(Parser::new("MAX(").unwrap().parse().is_err());
    }

    #[test]
    fn test_bind_rejects_unknown_names() {
        let table = create_test_table();
        let registry = FunctionRegistry::new();
        let expr = Parser::new("price > 1").unwrap().parse().unwrap();
        assert_eq!(
            bind_columns(expr, &table, &registry),
            Err("Unknown column: price".to_string())
        );
        let expr = Parser::new("FROB(value)").unwrap().parse().unwrap();
        assert!(bind_columns(expr, &table, &registry).is_err());
    }

    #[test]
    fn test_strict_comparison_boundary() {
        assert_eq!(eval("value > 500", 0), Ok(CellValue::Bool(false)));
        assert_eq!(eval("value > 500", 1), Ok(CellValue::Bool(true)));
        assert_eq!(eval("value >= 500", 0), Ok(CellValue::Bool(true)));
    }

    #[test]
    fn test_tiny_values_compare_exactly() {
        let table = Table::new(vec![Column::new("value", [1e-17, 0.0, 500.0 + 1e-13])]).unwrap();
        let positive = RowExpression::compile("value > 0", &table).unwrap();
        assert_eq!(positive.matches(&table, 0), Ok(true));
        assert_eq!(positive.matches(&table, 1), Ok(false));

        let zero = RowExpression::compile("value = 0", &table).unwrap();
        assert_eq!(zero.matches(&table, 0), Ok(false));
        assert_eq!(zero.matches(&table, 1), Ok(true));

        let above = RowExpression::compile("value > 500", &table).unwrap();
        assert_eq!(above.matches(&table, 2), Ok(true));
    }

    #[test]
    fn test_temporal_literals_with_fractions_and_zulu() {
        let stamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 500)
            .unwrap();
        let table = Table::new(vec![
            Column::new("ts", [CellValue::DateTime(stamp)]),
            Column::new("at", [CellValue::Time(stamp.time())]),
        ])
        .unwrap();
        let check = |src: &str| RowExpression::compile(src, &table).unwrap().matches(&table, 0);

        assert_eq!(check("ts > \"2024-01-01T10:00:00Z\""), Ok(true));
        assert_eq!(check("ts < \"2024-01-01 10:00:00.750\""), Ok(true));
        assert_eq!(check("ts > \"2024-01-01\""), Ok(true));
        assert_eq!(check("at > \"10:00:00.250\""), Ok(true));
        assert_eq!(check("at < \"10:00:01\""), Ok(true));
    }

    #[test]
    fn test_missing_propagates() {
        assert_eq!(eval("value > 500", 2), Ok(CellValue::Missing));
        assert_eq!(eval("value + 1", 2), Ok(CellValue::Missing));
        assert_eq!(eval("IS_MISSING(value)", 2), Ok(CellValue::Bool(true)));
        assert_eq!(eval("OR(value > 1, TRUE)", 2), Ok(CellValue::Bool(true)));
        assert_eq!(eval("AND(value > 1, TRUE)", 2), Ok(CellValue::Missing));
    }

    #[test]
    fn test_text_and_date_comparisons() {
        assert_eq!(eval("region = \"EU\"", 0), Ok(CellValue::Bool(true)));
        assert_eq!(eval("region <> \"EU\"", 1), Ok(CellValue::Bool(true)));
        assert_eq!(eval("day >= \"2024-01-01\"", 0), Ok(CellValue::Bool(true)));
        assert_eq!(eval("day >= \"2024-01-01\"", 2), Ok(CellValue::Bool(false)));
        assert!(eval("region > 3", 0).is_err());
    }

    #[test]
    fn test_builtin_functions() {
        assert_eq!(eval("ABS(-3)", 0), Ok(CellValue::Number(3.0)));
        assert_eq!(eval("ROUND(2.456, 2)", 0), Ok(CellValue::Number(2.46)));
        assert_eq!(eval("MAX(1, value, 3)", 1), Ok(CellValue::Number(501.0)));
        assert_eq!(eval("MIN(4, 2)", 0), Ok(CellValue::Number(2.0)));
        assert_eq!(eval("IF(value > 500, 1, 0)", 1), Ok(CellValue::Number(1.0)));
        assert_eq!(eval("LEN(region)", 2), Ok(CellValue::Number(4.0)));
        assert_eq!(eval("NOT(FALSE)", 0), Ok(CellValue::Bool(true)));
    }

    #[test]
    fn test_shared_builtins() {
        assert!(BUILTINS.get_function("abs").is_some());
        assert!(BUILTINS.get_function("is_missing").is_some());
        assert!(BUILTINS.get_function("sum").is_none());
    }

    #[test]
    fn test_evaluation_errors() {
        assert!(eval("1 / 0", 0).is_err());
        assert!(eval("5 % 0", 0).is_err());
        assert!(eval("AND(region)", 0).is_err());
    }

    #[test]
    fn test_row_expression_compile_and_match() {
        let table = create_test_table();
        let expr = RowExpression::compile("`unit price` * 2 >= 4", &table).unwrap();
        assert_eq!(expr.source(), "`unit price` * 2 >= 4");
        assert_eq!(expr.matches(&table, 0), Ok(false));
        assert_eq!(expr.matches(&table, 1), Ok(true));

        let missing = RowExpression::compile("value > 0", &table).unwrap();
        assert_eq!(missing.matches(&table, 2), Ok(false));

        assert!(matches!(
            RowExpression::compile("nope > 1", &table),
            Err(FormatError::Selection(_))
        ));
    }
}
