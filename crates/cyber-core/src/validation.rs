//! Declarative request validation.
//!
//! A [`Schema`] is an ordered list of fields, each with an ordered list of
//! [`Rule`]s, evaluated against a JSON value. No runtime type introspection
//! is involved: the schema describes the expected shape and the validator
//! walks the JSON.
//!
//! # Example
//!
//! ```rust
//! use cyber_core::validation::{Rule, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .field("name", [Rule::Required, Rule::Min(2), Rule::Max(50)])
//!     .field("email", [Rule::Required, Rule::Email])
//!     .field("age", [Rule::Min(0), Rule::Max(150)]);
//!
//! assert!(schema.validate(&json!({"name": "Ada", "email": "ada@example.com"})).is_ok());
//!
//! let errors = schema.validate(&json!({"name": "A", "email": "nope"})).unwrap_err();
//! assert_eq!(errors.len(), 2);
//! ```

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    // Constant pattern; compiled by `test_email_pattern_compiles`.
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"))
}

/// A single validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// The field must be present and non-empty (`""`, `0`, `false`, `[]`,
    /// `{}` and `null` count as empty).
    Required,
    /// Numbers: value ≥ n. Strings: at least n characters. Arrays and
    /// objects: at least n elements.
    Min(i64),
    /// Numbers: value ≤ n. Strings: at most n characters. Arrays and
    /// objects: at most n elements.
    Max(i64),
    /// A string shaped like an e-mail address. Empty strings pass.
    Email,
    /// A string matching the regular expression. Empty strings pass.
    Pattern(Regex),
}

impl Rule {
    /// Builds a [`Rule::Pattern`] from a regular expression.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid expression.
    pub fn pattern(expr: &str) -> Result<Self, regex::Error> {
        Regex::new(expr).map(Self::Pattern)
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Required => {
                if is_empty(value) {
                    Err("field is required".to_string())
                } else {
                    Ok(())
                }
            }
            Self::Min(min) => check_bound(value, *min, Bound::Min),
            Self::Max(max) => check_bound(value, *max, Bound::Max),
            Self::Email => match value {
                Value::String(s) if s.is_empty() || email_regex().is_match(s) => Ok(()),
                Value::String(_) => Err("invalid email format".to_string()),
                _ => Err("email validation only applies to strings".to_string()),
            },
            Self::Pattern(re) => match value {
                Value::String(s) if s.is_empty() || re.is_match(s) => Ok(()),
                Value::String(_) => Err(format!("value does not match pattern: {}", re.as_str())),
                _ => Err("pattern validation only applies to strings".to_string()),
            },
        }
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Min,
    Max,
}

fn check_bound(value: &Value, limit: i64, bound: Bound) -> Result<(), String> {
    let (measured, what) = match value {
        Value::Number(n) => {
            let Some(v) = n.as_f64() else {
                return Err("number out of range".to_string());
            };
            let limit = limit as f64;
            let ok = match bound {
                Bound::Min => v >= limit,
                Bound::Max => v <= limit,
            };
            return if ok {
                Ok(())
            } else {
                Err(match bound {
                    Bound::Min => format!("value must be at least {limit}"),
                    Bound::Max => format!("value must be at most {limit}"),
                })
            };
        }
        Value::String(s) => (s.chars().count(), "length"),
        Value::Array(a) => (a.len(), "length"),
        Value::Object(o) => (o.len(), "length"),
        Value::Bool(_) | Value::Null => {
            return Err(format!(
                "{} rule not applicable to {}",
                match bound {
                    Bound::Min => "min",
                    Bound::Max => "max",
                },
                type_name(value)
            ));
        }
    };

    let measured = i64::try_from(measured).unwrap_or(i64::MAX);
    match bound {
        Bound::Min if measured < limit => Err(format!("{what} must be at least {limit}")),
        Bound::Max if measured > limit => Err(format!("{what} must be at most {limit}")),
        _ => Ok(()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Rules(Vec<Rule>),
    Nested(Schema),
}

/// An ordered set of field rules.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Entry)>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rules for a field. Rules run in the given order.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.fields
            .push((name.into(), Entry::Rules(rules.into_iter().collect())));
        self
    }

    /// Validates a nested object field with its own schema. Errors are
    /// reported as `parent.child`.
    #[must_use]
    pub fn nested(mut self, name: impl Into<String>, schema: Self) -> Self {
        self.fields.push((name.into(), Entry::Nested(schema)));
        self
    }

    /// Returns the number of fields in the schema.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates `value`, collecting every failure.
    ///
    /// # Errors
    ///
    /// Returns all field errors if any rule fails, or a single error if
    /// `value` is not a JSON object.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationErrors> {
        let Value::Object(object) = value else {
            return Err(ValidationErrors(vec![FieldError::new(
                "",
                "validation only works on objects",
            )]));
        };

        let mut errors = Vec::new();
        self.validate_object(object, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    fn validate_object(&self, object: &Map<String, Value>, prefix: &str, errors: &mut Vec<FieldError>) {
        for (name, entry) in &self.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let value = object.get(name).unwrap_or(&Value::Null);

            match entry {
                Entry::Rules(rules) => {
                    for rule in rules {
                        // Absent optional fields only answer to `Required`.
                        if value.is_null() && !matches!(rule, Rule::Required) {
                            continue;
                        }
                        if let Err(message) = rule.check(value) {
                            errors.push(FieldError::new(path.clone(), message));
                        }
                    }
                }
                Entry::Nested(schema) => match value {
                    Value::Object(inner) => schema.validate_object(inner, &path, errors),
                    Value::Null => {}
                    other => errors.push(FieldError::new(
                        path,
                        format!("expected an object, found {}", type_name(other)),
                    )),
                },
            }
        }
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted field path.
    pub field: String,
    /// What went wrong.
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All failures from one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    /// Returns the number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the failures.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_pattern_compiles() {
        assert!(Regex::new(EMAIL_PATTERN).is_ok());
        assert!(email_regex().is_match("ada@example.com"));
        assert!(!email_regex().is_match("ada@example"));
    }

    fn user_schema() -> Schema {
        Schema::new()
            .field("name", [Rule::Required, Rule::Min(2), Rule::Max(10)])
            .field("email", [Rule::Required, Rule::Email])
            .field("age", [Rule::Min(18), Rule::Max(130)])
            .field("tags", [Rule::Max(2)])
    }

    #[test]
    fn test_valid_document() {
        let doc = json!({"name": "Ada", "email": "ada@example.com", "age": 36, "tags": ["a"]});
        assert!(user_schema().validate(&doc).is_ok());
    }

    #[test]
    fn test_required_rejects_empty_values() {
        for empty in [json!(null), json!(""), json!(0), json!(false), json!([]), json!({})] {
            assert!(Rule::Required.check(&empty).is_err(), "{empty} should be empty");
        }
        assert!(Rule::Required.check(&json!("x")).is_ok());
    }

    #[test]
    fn test_collects_all_errors_in_order() {
        let doc = json!({"name": "A", "email": "bad", "age": 12, "tags": [1, 2, 3]});
        let errors = user_schema().validate(&doc).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "email", "age", "tags"]);
        assert_eq!(errors.0[0].message, "length must be at least 2");
        assert_eq!(errors.0[2].message, "value must be at least 18");
    }

    #[test]
    fn test_absent_optional_fields_skip_rules() {
        let doc = json!({"name": "Ada", "email": "ada@example.com"});
        assert!(user_schema().validate(&doc).is_ok());
    }

    #[test]
    fn test_string_length_counts_chars() {
        assert!(Rule::Max(2).check(&json!("日本")).is_ok());
        assert!(Rule::Max(1).check(&json!("日本")).is_err());
    }

    #[test]
    fn test_bound_not_applicable_to_bool() {
        let err = Rule::Min(1).check(&json!(true)).unwrap_err();
        assert_eq!(err, "min rule not applicable to boolean");
    }

    #[test]
    fn test_pattern_rule() {
        let rule = Rule::pattern(r"^\d{3}$").unwrap();
        assert!(rule.check(&json!("123")).is_ok());
        assert!(rule.check(&json!("")).is_ok());
        assert!(rule.check(&json!("12a")).is_err());
        assert!(rule.check(&json!(123)).is_err());
        assert!(Rule::pattern("(").is_err());
    }

    #[test]
    fn test_nested_schema_reports_dotted_paths() {
        let schema = Schema::new().nested(
            "address",
            Schema::new().field("city", [Rule::Required]),
        );
        let errors = schema.validate(&json!({"address": {"city": ""}})).unwrap_err();
        assert_eq!(errors.0[0].field, "address.city");

        let errors = schema.validate(&json!({"address": 5})).unwrap_err();
        assert_eq!(errors.0[0].message, "expected an object, found number");

        assert!(schema.validate(&json!({})).is_ok());
    }

    #[test]
    fn test_non_object_input() {
        let errors = user_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_display_joins_errors() {
        let errors = ValidationErrors(vec![
            FieldError::new("a", "x"),
            FieldError::new("b", "y"),
        ]);
        assert_eq!(errors.to_string(), "a: x; b: y");
    }
}
