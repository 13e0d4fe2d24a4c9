//! Conjunctive equality predicates over stored tracker rows.
//!
//! A predicate is a list of `field = literal` clauses joined by `AND`. Fields
//! name top-level row columns (`source_type`, `catalog_entry_created`, ...) or
//! dotted paths into `source_attributes` (`source_attributes.bucketName`).

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::CoreError;
use crate::record::{SourceType, TrackerRecord};

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    field: String,
    value: Value,
}

/// An `AND` of equality clauses. The empty predicate matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Records of `source_type` that have not been registered in the catalog.
    pub fn awaiting_catalog(source_type: SourceType) -> Self {
        Self::all()
            .eq("source_type", source_type.as_str())
            .eq("catalog_entry_created", false)
            .eq("job_created", false)
    }

    /// Catalogued records of `source_type` that still need a scan job.
    pub fn awaiting_job(source_type: SourceType) -> Self {
        Self::all()
            .eq("source_type", source_type.as_str())
            .eq("catalog_entry_created", true)
            .eq("job_created", false)
    }

    /// Every catalogued record of `source_type`.
    pub fn catalogued(source_type: SourceType) -> Self {
        Self::all()
            .eq("source_type", source_type.as_str())
            .eq("catalog_entry_created", true)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against a flat row. Missing fields never match.
    pub fn matches(&self, row: &Value) -> bool {
        self.clauses
            .iter()
            .all(|clause| lookup(row, &clause.field).is_some_and(|v| *v == clause.value))
    }

    pub fn matches_record(&self, record: &TrackerRecord) -> bool {
        self.matches(&record.to_row())
    }
}

fn lookup<'a>(row: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(row, |current, key| current.get(key))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            match &clause.value {
                Value::String(s) => write!(f, "{} = '{}'", clause.field, s.replace('\'', "''"))?,
                other => write!(f, "{} = {}", clause.field, other)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Eq,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CoreError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            tokens.push(Token::Eq);
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        text.push('\'');
                    }
                    Some('\'') => break,
                    Some(ch) => text.push(ch),
                    None => {
                        return Err(CoreError::InvalidPredicate(
                            "unterminated string literal".into(),
                        ))
                    }
                }
            }
            tokens.push(Token::Quoted(text));
        } else if c.is_alphanumeric() || matches!(c, '_' | '.' | '-') {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-') {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else {
            return Err(CoreError::InvalidPredicate(format!(
                "unexpected character '{c}'"
            )));
        }
    }

    Ok(tokens)
}

fn literal(word: &str) -> Result<Value, CoreError> {
    if word.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if word.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    if let Ok(n) = word.parse::<i64>() {
        return Ok(Value::from(n));
    }
    Err(CoreError::InvalidPredicate(format!(
        "unquoted literal '{word}' (strings need single quotes)"
    )))
}

impl FromStr for Predicate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = tokenize(s)?.into_iter();
        let mut predicate = Predicate::all();

        let Some(mut next) = tokens.next() else {
            return Ok(predicate);
        };

        loop {
            let field = match next {
                Token::Word(w) => w,
                other => {
                    return Err(CoreError::InvalidPredicate(format!(
                        "expected field name, found {other:?}"
                    )))
                }
            };
            if tokens.next() != Some(Token::Eq) {
                return Err(CoreError::InvalidPredicate(format!(
                    "expected '=' after '{field}'"
                )));
            }
            let value = match tokens.next() {
                Some(Token::Quoted(text)) => Value::String(text),
                Some(Token::Word(w)) => literal(&w)?,
                other => {
                    return Err(CoreError::InvalidPredicate(format!(
                        "expected value for '{field}', found {other:?}"
                    )))
                }
            };
            predicate = predicate.eq(field, value);

            match tokens.next() {
                None => break,
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("and") => {}
                Some(other) => {
                    return Err(CoreError::InvalidPredicate(format!(
                        "expected AND, found {other:?}"
                    )))
                }
            }
            next = tokens.next().ok_or_else(|| {
                CoreError::InvalidPredicate("dangling AND at end of predicate".into())
            })?;
        }

        Ok(predicate)
    }
}
