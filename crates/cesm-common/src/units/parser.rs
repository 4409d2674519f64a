//! Unit string parser.
//!
//! Handles the spellings found in CESM output and var specs:
//!
//! - Exponents: `m^2`, `m**2`, `m2`, `m-2`
//! - Multiplication: `mol m`, `mol*m`, `mol.m`
//! - Division, left to right: `mmol/m^3 cm/s` is `((mmol / m^3) cm) / s`
//! - Groups and numeric factors: `(1.0e-3)(mol/m2/s)`, `12 g/mol`
//!
//! # Grammar
//!
//! ```text
//! expr    = factor (op? factor)*
//! op      = '*' | '.' | '/'
//! factor  = '(' expr ')' exponent? | number exponent? | symbol exponent?
//! symbol  = [a-zA-Z_%µ]+
//! exponent = ('^' | '**')? '-'? [0-9]+
//! ```

use super::Unit;
use crate::error::{TseriesError, TseriesResult};

pub(super) struct UnitParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> UnitParser<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    pub(super) fn parse(mut self) -> TseriesResult<Unit> {
        let unit = self.parse_expression()?;
        self.skip_whitespace();
        if let Some(c) = self.peek() {
            return Err(self.error(&format!("unexpected character '{}'", c)));
        }
        Ok(unit)
    }

    fn error(&self, message: &str) -> TseriesError {
        TseriesError::invalid_units(self.input, message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_expression(&mut self) -> TseriesResult<Unit> {
        self.skip_whitespace();
        let mut result = self.parse_factor()?;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(')') => break,
                Some('/') => {
                    self.pos += 1;
                    let divisor = self.parse_factor()?;
                    result = result.div(&divisor);
                }
                Some('*') => {
                    self.pos += 1;
                    let factor = self.parse_factor()?;
                    result = result.mul(&factor);
                }
                Some('.') if !matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) => {
                    self.pos += 1;
                    let factor = self.parse_factor()?;
                    result = result.mul(&factor);
                }
                Some(_) => {
                    let factor = self.parse_factor()?;
                    result = result.mul(&factor);
                }
            }
        }

        Ok(result)
    }

    fn parse_factor(&mut self) -> TseriesResult<Unit> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_expression()?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err(self.error("missing closing parenthesis"));
                }
                self.pos += 1;
                let exp = self.parse_exponent(true)?;
                Ok(inner.pow(exp))
            }
            Some(c) if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                let value = self.parse_number()?;
                // "10^15" style factors; bare digits after a number are not exponents
                let exp = self.parse_exponent(false)?;
                Ok(Unit::scalar(value.powi(exp)))
            }
            Some(c) if is_symbol_char(c) => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if is_symbol_char(c)) {
                    self.pos += 1;
                }
                let symbol: String = self.chars[start..self.pos].iter().collect();
                let exp = self.parse_exponent(true)?;
                Ok(Unit::symbol(&symbol, exp))
            }
            Some(c) => Err(self.error(&format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_number(&mut self) -> TseriesResult<f64> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        // scientific notation only when digits follow the marker
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut look = 1;
            if matches!(self.peek_at(1), Some('-') | Some('+')) {
                look = 2;
            }
            if matches!(self.peek_at(look), Some(c) if c.is_ascii_digit()) {
                self.pos += look;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map_err(|_| self.error(&format!("invalid number '{}'", text)))
    }

    /// Parse an optional exponent; `bare` allows `m2` / `m-2` without a marker.
    fn parse_exponent(&mut self, bare: bool) -> TseriesResult<i32> {
        let marker = if self.peek() == Some('^') {
            1
        } else if self.peek() == Some('*') && self.peek_at(1) == Some('*') {
            2
        } else {
            0
        };

        let signed_digit_at = |p: &Self, offset: usize| -> bool {
            match p.peek_at(offset) {
                Some(c) if c.is_ascii_digit() => true,
                Some('-') | Some('+') => matches!(p.peek_at(offset + 1), Some(c) if c.is_ascii_digit()),
                _ => false,
            }
        };

        if marker == 0 && !(bare && signed_digit_at(self, 0)) {
            return Ok(1);
        }
        if marker > 0 && !signed_digit_at(self, marker) {
            return Err(self.error("exponent marker without exponent"));
        }

        self.pos += marker;
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i32>()
            .map_err(|_| self.error(&format!("invalid exponent '{}'", text)))
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '%' || c == 'µ'
}
