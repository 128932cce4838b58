//! Target expression parsing.
//!
//! A render target is a compact, non-whitespace expression such as
//! `sumSeries(nonNegativeDerivative(host.*.cpu),scale(other,2.5))`. The
//! grammar is small:
//!
//! ```text
//! expr    := call | name | number | string
//! call    := ident '(' args? ')'
//! args    := expr (',' expr)*
//! name    := path of chars in [A-Za-z0-9._*?{}\[\]-]
//! number  := optional sign, digits, optional fractional part
//! string  := '...'  |  "..."      (no escapes)
//! ```
//!
//! Metric paths are opaque to this module: wildcards (`*`, `?`, `[...]`,
//! `{...}`) travel verbatim to the storage fan-out. Whitespace between
//! tokens is not tolerated.
//!
//! Call nodes capture `arg_string`, the exact source slice between the
//! matching parentheses. Function output naming depends on that verbatim
//! slice (quoting style included), so it is taken from the input rather
//! than reconstructed by printing arguments.

use crate::error::{ParseError, ParseResult};

/// A parsed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A metric path, handed verbatim to the fetch interface.
    Name(String),
    /// A numeric literal.
    Const(f64),
    /// A quoted literal; the value excludes the quotes.
    String(String),
    /// A function invocation.
    Call(CallExpr),
}

/// A function invocation node.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    /// The function name as written in the source.
    pub function: String,
    /// Argument expressions in source order.
    pub args: Vec<Expr>,
    /// The verbatim source slice between the outer parentheses.
    pub arg_string: String,
}

impl Expr {
    /// Collects every metric-path leaf in left-to-right order, duplicates
    /// preserved. The data plane prefetches these targets before calling
    /// the evaluator; it may deduplicate.
    pub fn metrics(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_metrics(&mut out);
        out
    }

    fn collect_metrics<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Name(path) => out.push(path),
            Expr::Call(call) => {
                for arg in &call.args {
                    arg.collect_metrics(out);
                }
            }
            Expr::Const(_) | Expr::String(_) => {}
        }
    }
}

/// Parses one expression from the front of `input`.
///
/// Returns the node together with the unconsumed suffix so the caller can
/// verify the whole input was used. See [`parse_complete`] for the common
/// case that rejects residue.
pub fn parse(input: &str) -> ParseResult<(Expr, &str)> {
    let mut parser = Parser { input, pos: 0 };
    let expr = parser.parse_expr()?;
    Ok((expr, &input[parser.pos..]))
}

/// Parses `input` as a single complete expression, rejecting trailing
/// bytes.
pub fn parse_complete(input: &str) -> ParseResult<Expr> {
    let (expr, rest) = parse(input)?;
    if !rest.is_empty() {
        return Err(ParseError::TrailingInput {
            position: input.len() - rest.len(),
        });
    }
    Ok(expr)
}

/// Bytes permitted in a metric path.
fn is_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'*' | b'?' | b'{' | b'}' | b'[' | b']' | b'-')
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd { position: self.pos }),
            Some(quote @ (b'\'' | b'"')) => self.parse_string(quote),
            Some(b) if b.is_ascii_digit() || b == b'.' => self.parse_number(),
            // A sign opens a number only when a digit or dot follows;
            // otherwise it belongs to a path like `-foo`.
            Some(b'+') | Some(b'-')
                if matches!(self.peek_at(1), Some(n) if n.is_ascii_digit() || n == b'.') =>
            {
                self.parse_number()
            }
            Some(b) if is_path_byte(b) => self.parse_name_or_call(),
            Some(b) => Err(ParseError::UnexpectedByte {
                byte: b,
                position: self.pos,
            }),
        }
    }

    fn parse_string(&mut self, quote: u8) -> ParseResult<Expr> {
        let open = self.pos;
        self.bump();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let value = self.input[start..self.pos].to_string();
                self.bump();
                return Ok(Expr::String(value));
            }
            self.bump();
        }
        Err(ParseError::UnterminatedString { position: open })
    }

    fn parse_number(&mut self) -> ParseResult<Expr> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.bump();
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') {
            self.bump();
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.bump();
            }
        }
        self.input[start..self.pos]
            .parse::<f64>()
            .map(Expr::Const)
            .map_err(|_| ParseError::InvalidNumber { position: start })
    }

    fn parse_name_or_call(&mut self) -> ParseResult<Expr> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_path_byte(b)) {
            self.bump();
        }
        let name = &self.input[start..self.pos];
        if self.peek() == Some(b'(') {
            self.parse_call(name.to_string())
        } else {
            Ok(Expr::Name(name.to_string()))
        }
    }

    /// Parses the argument list of `function`, positioned on the `(`.
    fn parse_call(&mut self, function: String) -> ParseResult<Expr> {
        self.bump();
        let args_start = self.pos;
        let mut args = Vec::new();

        // `f()` is a valid call with no arguments.
        if self.peek() == Some(b')') {
            self.bump();
            return Ok(Expr::Call(CallExpr {
                function,
                args,
                arg_string: String::new(),
            }));
        }

        loop {
            match self.peek() {
                Some(b',') | Some(b')') => {
                    return Err(ParseError::EmptyArgument { position: self.pos })
                }
                None => return Err(ParseError::MissingCloseParen { position: self.pos }),
                _ => {}
            }
            args.push(self.parse_expr()?);
            match self.peek() {
                Some(b',') => self.bump(),
                Some(b')') => {
                    let arg_string = self.input[args_start..self.pos].to_string();
                    self.bump();
                    return Ok(Expr::Call(CallExpr {
                        function,
                        args,
                        arg_string,
                    }));
                }
                None => return Err(ParseError::MissingCloseParen { position: self.pos }),
                Some(b) => {
                    return Err(ParseError::UnexpectedByte {
                        byte: b,
                        position: self.pos,
                    })
                }
            }
        }
    }
}
