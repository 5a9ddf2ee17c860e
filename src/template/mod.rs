//! Narrative templates
//!
//! `${name}` substitutes a mandatory value, `${name?}` an optional one
//! (missing or null renders empty) and `$$` is a literal `$`. A mandatory
//! placeholder that cannot be filled is an error, never a blank.

mod errors;

pub use errors::{TemplateError, TemplateResult};

use std::sync::OnceLock;

use regex::Regex;

use crate::value::{Bindings, Value};

static NAME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn is_valid_name(name: &str) -> bool {
    let pattern = NAME_PATTERN.get_or_init(|| Regex::new(r"^(@|[A-Za-z_][A-Za-z0-9_.]*)$").ok());
    match pattern {
        Some(re) => re.is_match(name),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, optional: bool },
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text
    pub fn parse(text: &str) -> TemplateResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            if ch != '$' {
                literal.push(ch);
                continue;
            }

            match chars.peek().map(|(_, c)| *c) {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::Unterminated { offset });
                    }

                    let (name, optional) = match body.strip_suffix('?') {
                        Some(stripped) => (stripped.trim(), true),
                        None => (body.trim(), false),
                    };
                    if !is_valid_name(name) {
                        return Err(TemplateError::InvalidName {
                            name: body.clone(),
                            offset,
                        });
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder {
                        name: name.to_string(),
                        optional,
                    });
                }
                _ => return Err(TemplateError::StrayDollar { offset }),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: text.to_string(),
            segments,
        })
    }

    /// Render against the given bindings
    pub fn render(&self, bindings: &dyn Bindings) -> TemplateResult<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { name, optional } => match bindings.lookup(name) {
                    Some(Value::Null) | None if *optional => {}
                    Some(Value::Null) => return Err(TemplateError::NullValue(name.clone())),
                    None => return Err(TemplateError::Unresolved(name.clone())),
                    Some(value) => out.push_str(&value.render()),
                },
            }
        }
        Ok(out)
    }

    /// Placeholder names in first-seen order
    pub fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder { name, .. } = segment {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Placeholder names that must resolve
    pub fn required_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder {
                name,
                optional: false,
            } = segment
            {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
