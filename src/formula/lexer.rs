//! Formula tokenizer

use std::str::FromStr;

use rust_decimal::Decimal;

use super::errors::{FormulaError, FormulaResult};

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Decimal),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Bang,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
}

/// A token with its byte offset in the formula text
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split formula text into tokens
pub fn tokenize(text: &str) -> FormulaResult<Vec<Spanned>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let simple = match c {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'%' => Some(Token::Percent),
            b'&' => Some(Token::Amp),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = simple {
            tokens.push(Spanned { token, offset: start });
            i += 1;
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let comparison = match (c, next) {
            (b'=', Some(b'=')) => Some((Token::Eq, 2)),
            (b'!', Some(b'=')) => Some((Token::Ne, 2)),
            (b'<', Some(b'=')) => Some((Token::Le, 2)),
            (b'>', Some(b'=')) => Some((Token::Ge, 2)),
            (b'<', _) => Some((Token::Lt, 1)),
            (b'>', _) => Some((Token::Gt, 1)),
            (b'!', _) => Some((Token::Bang, 1)),
            _ => None,
        };
        if let Some((token, width)) = comparison {
            tokens.push(Spanned { token, offset: start });
            i += width;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && next.map_or(false, |n| n.is_ascii_digit())) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let literal = &text[start..i];
            let number = Decimal::from_str(literal).map_err(|_| {
                FormulaError::syntax(start, format!("invalid number literal '{}'", literal))
            })?;
            tokens.push(Spanned {
                token: Token::Number(number),
                offset: start,
            });
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (s, end) = read_string(text, start, c)?;
            tokens.push(Spanned {
                token: Token::Str(s),
                offset: start,
            });
            i = end;
            continue;
        }

        if c == b'@' {
            tokens.push(Spanned {
                token: Token::Ident("@".to_string()),
                offset: start,
            });
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
            {
                i += 1;
            }
            let word = &text[start..i];
            let token = match word {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push(Spanned { token, offset: start });
            continue;
        }

        let ch = text[start..].chars().next().unwrap_or('?');
        return Err(FormulaError::syntax(
            start,
            format!("unexpected character '{}'", ch),
        ));
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`; returns the string and the
/// offset just past the closing quote.
fn read_string(text: &str, start: usize, quote: u8) -> FormulaResult<(String, usize)> {
    let mut out = String::new();
    let mut chars = text[start + 1..].char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or_else(|| FormulaError::syntax(start, "unterminated string literal"))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    other => {
                        return Err(FormulaError::syntax(
                            start + 1 + idx,
                            format!("unknown escape '\\{}'", other),
                        ))
                    }
                }
            }
            c if c as u32 == quote as u32 => return Ok((out, start + 1 + idx + 1)),
            c => out.push(c),
        }
    }

    Err(FormulaError::syntax(start, "unterminated string literal"))
}
