// src/parser.rs
use crate::errors::EvalError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl From<ParseError> for EvalError {
    fn from(e: ParseError) -> Self {
        EvalError::Parse {
            message: e.message,
            offset: e.offset,
        }
    }
}

/// Character cursor shared by the predicate and expression parsers.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            message: msg.into(),
            offset: self.i,
        }
    }

    pub fn pos(&self) -> usize {
        self.i
    }

    /// Rewind to a position previously returned by `pos`.
    pub fn reset(&mut self, pos: usize) {
        self.i = pos;
    }

    pub fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.i;
        if let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphabetic() {
                self.i += c.len_utf8();
            }
        }
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("identifier expected"));
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// Decimal integers and floats (with optional exponent) and `0x` hex.
    /// A leading minus is handled by the expression grammar.
    pub fn parse_number_literal(&mut self) -> Result<Value, ParseError> {
        let start = self.i;
        if self.peek_str("0x") || self.peek_str("0X") {
            self.i += 2;
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            return i64::from_str_radix(digits, 16)
                .map(Value::Integer)
                .map_err(|_| ParseError {
                    message: "bad hex literal".into(),
                    offset: start,
                });
        }
        self.take_while(|c| c.is_ascii_digit());
        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.s[self.i + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.i += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let save = self.i;
            self.i += 1;
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.i += 1;
            }
            if self.take_while(|c| c.is_ascii_digit()).is_empty() {
                self.i = save;
            } else {
                is_float = true;
            }
        }
        let s = &self.s[start..self.i];
        if s.is_empty() {
            return Err(self.error("number expected"));
        }
        let bad = |what: &str| ParseError {
            message: format!("bad {what}"),
            offset: start,
        };
        let f = if is_float {
            s.parse::<f64>().map_err(|_| bad("float"))?
        } else {
            match s.parse::<i64>() {
                Ok(i) => return Ok(Value::Integer(i)),
                // too large for i64, keep it as a float
                Err(_) => s.parse::<f64>().map_err(|_| bad("int"))?,
            }
        };
        if !f.is_finite() {
            return Err(ParseError {
                message: "number out of range".into(),
                offset: start,
            });
        }
        Ok(Value::Float(f))
    }

    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        let start = self.i;
        let quote = self.peek_char().ok_or_else(|| self.error("string expected"))?;
        if quote != '\'' && quote != '"' {
            return Err(self.error("expected quoted string"));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                if let Some(nc) = self.peek_char() {
                    self.i += nc.len_utf8();
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        _ => {
                            out.push('\\');
                            out.push(nc);
                        }
                    }
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        Err(ParseError {
            message: "unterminated string".into(),
            offset: start,
        })
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    /// Case-insensitive keyword match that refuses to split an identifier,
    /// so `INDEX` never reads as `IN` followed by `DEX`.
    pub fn peek_keyword(&self, kw: &str) -> bool {
        let rest = &self.s[self.i..];
        match rest.get(..kw.len()) {
            Some(head) if head.eq_ignore_ascii_case(kw) => !rest[kw.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '_' || c.is_alphanumeric()),
            _ => false,
        }
    }

    pub fn consume_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.i += kw.len();
            true
        } else {
            false
        }
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if pred(c) {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        &self.s[start..self.i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keywords_respect_word_boundaries() {
        let p = Parser::new("INDEX == 1");
        assert!(!p.peek_keyword("IN"));
        assert!(p.peek_keyword("index"));
        let mut p = Parser::new("in {1}");
        assert!(p.consume_keyword("IN"));
        assert_eq!(p.pos(), 2);
    }

    #[test]
    fn number_forms() {
        assert_eq!(Parser::new("42").parse_number_literal(), Ok(Value::Integer(42)));
        assert_eq!(Parser::new("2.5").parse_number_literal(), Ok(Value::Float(2.5)));
        assert_eq!(Parser::new("1e3").parse_number_literal(), Ok(Value::Float(1000.0)));
        assert_eq!(Parser::new("0x1F").parse_number_literal(), Ok(Value::Integer(31)));
        let mut p = Parser::new("3.foo");
        assert_eq!(p.parse_number_literal(), Ok(Value::Integer(3)));
        assert_eq!(p.peek_char(), Some('.'));
    }

    #[test]
    fn infinite_numbers_are_rejected() {
        let err = Parser::new("1e999").parse_number_literal().unwrap_err();
        assert_eq!(err.message, "number out of range");
        assert_eq!(err.offset, 0);
        let huge = "9".repeat(400);
        assert!(Parser::new(&huge).parse_number_literal().is_err());
        assert_eq!(
            Parser::new("99999999999999999999").parse_number_literal(),
            Ok(Value::Float(1e20))
        );
    }

    #[test]
    fn unterminated_string_reports_its_start() {
        let mut p = Parser::new("  'abc");
        p.skip_ws();
        let err = p.parse_quoted_string().unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn quoted_string_escapes() {
        let mut p = Parser::new(r#""a\"b\n""#);
        assert_eq!(p.parse_quoted_string().unwrap(), "a\"b\n");
        assert!(p.eof());
    }
}
