//! Filter specifications over entry attributes.
//!
//! A filter specification is a JSON object whose keys name an entry field and
//! an optional comparison operator separated by `__`, and whose values are the
//! expected operands:
//!
//! ```json
//! {
//!     "type": "file",
//!     "secondsSinceModified__gt": 86400,
//!     "name__regex": "\\.log$"
//! }
//! ```
//!
//! Keys without an operator compare for equality. All keys must hold for an
//! entry to match; an empty specification matches everything.
//!
//! Specifications are compiled once, when the configuration is loaded. Unknown
//! fields, unknown operators and operands of the wrong type are rejected at
//! that point, so evaluation can only fail when the filesystem does.

use crate::entry::{Entry, EntryType};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::io;
use thiserror::Error;

/// Separator between the field and the operator in a filter key.
pub const OPERATOR_DELIMITER: &str = "__";

/// Errors raised while compiling a filter specification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// The key names a field entries do not have.
    #[error("unknown field '{field}' in filter '{key}'")]
    UnknownField { key: String, field: String },
    /// The key names an operator that does not exist.
    #[error("unknown operator '{operator}' in filter '{key}'")]
    UnknownOperator { key: String, operator: String },
    /// The operator exists but makes no sense for the field.
    #[error("operator '{operator}' cannot be applied to field '{field}' in filter '{key}'")]
    UnsupportedOperator {
        key: String,
        field: &'static str,
        operator: &'static str,
    },
    /// The expected value has the wrong shape for the field.
    #[error("invalid value for filter '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Entry attributes that filters can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Path,
    Name,
    Type,
    IsDir,
    IsFile,
    IsSymlink,
    ModifiedAt,
    SecondsSinceModified,
}

impl Field {
    /// Resolves a field name. `mtime` and `msince` are accepted as short
    /// aliases for the two time fields.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "path" => Some(Field::Path),
            "name" => Some(Field::Name),
            "type" => Some(Field::Type),
            "is_dir" => Some(Field::IsDir),
            "is_file" => Some(Field::IsFile),
            "is_symlink" => Some(Field::IsSymlink),
            "modifiedAt" | "mtime" => Some(Field::ModifiedAt),
            "secondsSinceModified" | "msince" => Some(Field::SecondsSinceModified),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Path => "path",
            Field::Name => "name",
            Field::Type => "type",
            Field::IsDir => "is_dir",
            Field::IsFile => "is_file",
            Field::IsSymlink => "is_symlink",
            Field::ModifiedAt => "modifiedAt",
            Field::SecondsSinceModified => "secondsSinceModified",
        }
    }
}

/// Comparison operators usable as the second segment of a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring test, text fields only.
    Contains,
    /// Regular expression search, text fields only.
    Regex,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Operator::Eq),
            "ne" => Some(Operator::Ne),
            "lt" => Some(Operator::Lt),
            "le" => Some(Operator::Le),
            "gt" => Some(Operator::Gt),
            "ge" => Some(Operator::Ge),
            "contains" => Some(Operator::Contains),
            "regex" => Some(Operator::Regex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Contains => "contains",
            Operator::Regex => "regex",
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }

    fn is_ordering(&self) -> bool {
        !matches!(self, Operator::Contains | Operator::Regex)
    }

    /// Applies an ordering operator to the result of `actual.cmp(expected)`.
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Contains | Operator::Regex => false,
        }
    }
}

/// A compiled operand.
#[derive(Debug, Clone)]
enum Expected {
    Number(f64),
    Text(String),
    Bool(bool),
    Type(EntryType),
    Pattern(Regex),
}

/// One compiled `field__operator: value` condition.
#[derive(Debug, Clone)]
pub struct Predicate {
    key: String,
    field: Field,
    operator: Operator,
    expected: Expected,
}

impl Predicate {
    /// Compiles a single filter key and its expected value.
    ///
    /// # Examples
    ///
    /// ```
    /// use auto_archive_files::filter::{Field, Operator, Predicate};
    /// use serde_json::json;
    ///
    /// let predicate = Predicate::parse("msince__ge", &json!(3600)).unwrap();
    /// assert_eq!(predicate.field(), Field::SecondsSinceModified);
    /// assert_eq!(predicate.operator(), Operator::Ge);
    ///
    /// assert!(Predicate::parse("size__gt", &json!(10)).is_err());
    /// assert!(Predicate::parse("name__like", &json!("a")).is_err());
    /// ```
    pub fn parse(key: &str, value: &Value) -> Result<Self, FilterError> {
        let mut parts = key.split(OPERATOR_DELIMITER);
        let field_name = parts.next().unwrap_or_default();
        let field = Field::parse(field_name).ok_or_else(|| FilterError::UnknownField {
            key: key.to_string(),
            field: field_name.to_string(),
        })?;

        let operator = match parts.next() {
            None => Operator::Eq,
            Some(name) => Operator::parse(name).ok_or_else(|| FilterError::UnknownOperator {
                key: key.to_string(),
                operator: name.to_string(),
            })?,
        };

        if let Some(extra) = parts.next() {
            return Err(FilterError::UnknownOperator {
                key: key.to_string(),
                operator: extra.to_string(),
            });
        }

        let expected = compile_operand(key, field, operator, value)?;

        Ok(Self {
            key: key.to_string(),
            field,
            operator,
            expected,
        })
    }

    /// The key this predicate was compiled from.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Evaluates the predicate against the current state of `entry`.
    ///
    /// Fails only if an attribute cannot be read, e.g. the entry vanished.
    pub fn evaluate(&self, entry: &Entry) -> io::Result<bool> {
        let op = self.operator;
        let result = match (&self.expected, self.field) {
            (Expected::Number(expected), Field::ModifiedAt) => {
                compare_numbers(op, entry.modified_at_secs()?, *expected)
            }
            (Expected::Number(expected), Field::SecondsSinceModified) => {
                compare_numbers(op, entry.seconds_since_modified()?, *expected)
            }
            (Expected::Text(expected), Field::Path) => {
                compare_text(op, &entry.path().to_string_lossy(), expected)
            }
            (Expected::Text(expected), Field::Name) => compare_text(op, entry.name(), expected),
            (Expected::Pattern(regex), Field::Path) => {
                regex.is_match(&entry.path().to_string_lossy())
            }
            (Expected::Pattern(regex), Field::Name) => regex.is_match(entry.name()),
            (Expected::Type(expected), Field::Type) => {
                let equal = entry.entry_type() == Some(*expected);
                if op == Operator::Eq { equal } else { !equal }
            }
            (Expected::Bool(expected), field) => {
                let actual = match field {
                    Field::IsDir => entry.is_dir(),
                    Field::IsFile => entry.is_file(),
                    _ => entry.is_symlink(),
                };
                if op == Operator::Eq {
                    actual == *expected
                } else {
                    actual != *expected
                }
            }
            // compile_operand only pairs operands with matching fields.
            _ => false,
        };
        Ok(result)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn compile_operand(
    key: &str,
    field: Field,
    operator: Operator,
    value: &Value,
) -> Result<Expected, FilterError> {
    let invalid = |reason: String| FilterError::InvalidValue {
        key: key.to_string(),
        reason,
    };
    let unsupported = || FilterError::UnsupportedOperator {
        key: key.to_string(),
        field: field.as_str(),
        operator: operator.as_str(),
    };

    match field {
        Field::ModifiedAt | Field::SecondsSinceModified => {
            if !operator.is_ordering() {
                return Err(unsupported());
            }
            match value {
                Value::Number(n) => n
                    .as_f64()
                    .map(Expected::Number)
                    .ok_or_else(|| invalid(format!("{} is not representable", n))),
                Value::String(s) if field == Field::ModifiedAt => {
                    chrono::DateTime::parse_from_rfc3339(s)
                        .map(|t| Expected::Number(t.timestamp_micros() as f64 / 1_000_000.0))
                        .map_err(|e| invalid(format!("'{}' is not an RFC 3339 timestamp: {}", s, e)))
                }
                other => Err(invalid(format!("expected a number, got {}", other))),
            }
        }
        Field::Path | Field::Name => {
            let Value::String(s) = value else {
                return Err(invalid(format!("expected a string, got {}", value)));
            };
            if operator == Operator::Regex {
                Regex::new(s)
                    .map(Expected::Pattern)
                    .map_err(|e| invalid(format!("bad regular expression: {}", e)))
            } else if operator == Operator::Contains {
                let pattern = Regex::new(&regex::escape(s))
                    .map_err(|e| invalid(format!("bad substring: {}", e)))?;
                Ok(Expected::Pattern(pattern))
            } else {
                Ok(Expected::Text(s.clone()))
            }
        }
        Field::Type => {
            if !operator.is_equality() {
                return Err(unsupported());
            }
            let name = value
                .as_str()
                .ok_or_else(|| invalid(format!("expected a type name, got {}", value)))?;
            EntryType::parse(name).map(Expected::Type).ok_or_else(|| {
                invalid(format!(
                    "unknown type '{}', expected one of file, dir, symlink",
                    name
                ))
            })
        }
        Field::IsDir | Field::IsFile | Field::IsSymlink => {
            if !operator.is_equality() {
                return Err(unsupported());
            }
            value
                .as_bool()
                .map(Expected::Bool)
                .ok_or_else(|| invalid(format!("expected a boolean, got {}", value)))
        }
    }
}

fn compare_numbers(op: Operator, actual: f64, expected: f64) -> bool {
    actual
        .partial_cmp(&expected)
        .is_some_and(|ordering| op.holds(ordering))
}

fn compare_text(op: Operator, actual: &str, expected: &str) -> bool {
    op.holds(actual.cmp(expected))
}

/// A compiled, AND-ed set of predicates.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    predicates: Vec<Predicate>,
}

impl FilterSpec {
    /// A specification that matches every entry.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Compiles every key of a filter mapping.
    ///
    /// # Errors
    ///
    /// Returns the first [`FilterError`] found.
    pub fn compile(filters: &Map<String, Value>) -> Result<Self, FilterError> {
        let predicates = filters
            .iter()
            .map(|(key, value)| Predicate::parse(key, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { predicates })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Tests an entry against every predicate, stopping at the first failure.
    pub fn matches(&self, entry: &Entry) -> io::Result<bool> {
        for predicate in &self.predicates {
            if !predicate.evaluate(entry)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Tests `entry` against `spec`.
pub fn matches(entry: &Entry, spec: &FilterSpec) -> io::Result<bool> {
    spec.matches(entry)
}
