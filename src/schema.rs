//! Declarative table schemas.
//!
//! A schema arrives as a JSON object mapping column names to option
//! objects, either already parsed or as text:
//!
//! ```json
//! {
//!   "id":   {"type": "INTEGER", "primary_key": true, "auto_increment": true},
//!   "name": {"type": "TEXT", "not_null": true}
//! }
//! ```
//!
//! [`TableDefinition::interpret`] validates it once into a strict model.
//! Nothing downstream re-checks names or types.

use crate::error::{Result, StoreError};
use log::warn;
use serde::{Deserialize, Deserializer};

/// Raw schema input, before validation
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaInput {
    Structured(serde_json::Value),
    Text(String),
}

impl From<serde_json::Value> for SchemaInput {
    fn from(value: serde_json::Value) -> Self {
        SchemaInput::Structured(value)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for SchemaInput {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        SchemaInput::Structured(serde_json::Value::Object(map))
    }
}

impl From<&str> for SchemaInput {
    fn from(text: &str) -> Self {
        SchemaInput::Text(text.to_string())
    }
}

impl From<String> for SchemaInput {
    fn from(text: String) -> Self {
        SchemaInput::Text(text)
    }
}

/// Per-column options as written by the caller. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColumnOptions {
    /// Left optional here so a missing type is reported against its column
    #[serde(rename = "type")]
    pub data_type: Option<String>,
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    #[serde(deserialize_with = "literal")]
    pub default: Option<String>,
}

// Defaults are literals; accept numbers and booleans as well as strings.
fn literal<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Backend-native type token, e.g. `INTEGER` or `VARCHAR(64)`
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    /// Emitted verbatim after `DEFAULT`
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            not_null: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, literal: &str) -> Self {
        self.default_value = Some(literal.to_string());
        self
    }

    fn from_options(name: &str, options: ColumnOptions) -> Result<Self> {
        let data_type = options.data_type.ok_or_else(|| {
            StoreError::Validation(format!("column '{}' does not include a \"type\" field", name))
        })?;
        Ok(Self {
            name: name.to_string(),
            data_type,
            not_null: options.not_null,
            primary_key: options.primary_key,
            auto_increment: options.auto_increment,
            unique: options.unique,
            default_value: options.default,
        })
    }

    /// Column clause: name, type, then NOT NULL, PRIMARY KEY, AUTOINCREMENT,
    /// UNIQUE and DEFAULT in that order.
    pub fn clause(&self) -> String {
        let mut clause = format!("{} {}", self.name, self.data_type);
        if self.not_null {
            clause.push_str(" NOT NULL");
        }
        if self.primary_key {
            clause.push_str(" PRIMARY KEY");
        }
        if self.auto_increment {
            clause.push_str(" AUTOINCREMENT");
        }
        if self.unique {
            clause.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default_value {
            clause.push_str(" DEFAULT ");
            clause.push_str(default);
        }
        clause
    }
}

/// A validated table: legal identifiers, at least one column, at most one
/// primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Validate hand-built columns.
    pub fn new(name: &str, columns: Vec<ColumnDefinition>) -> Result<Self> {
        validate_identifier(name)?;
        if columns.is_empty() {
            return Err(StoreError::Validation(format!(
                "table '{}' has no columns",
                name
            )));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(columns.len());
        for column in &columns {
            validate_identifier(&column.name)?;
            validate_type_token(&column.name, &column.data_type)?;
            if seen.contains(&column.name.as_str()) {
                return Err(StoreError::Validation(format!(
                    "column '{}' is defined twice",
                    column.name
                )));
            }
            seen.push(&column.name);
        }

        let mut definition = Self {
            name: name.to_string(),
            columns,
        };
        definition.keep_first_primary_key();
        Ok(definition)
    }

    /// Interpret a declarative schema.
    pub fn interpret(name: &str, input: impl Into<SchemaInput>) -> Result<Self> {
        let parsed = match input.into() {
            SchemaInput::Structured(value) => value,
            SchemaInput::Text(text) => serde_json::from_str(&text)?,
        };
        let serde_json::Value::Object(map) = parsed else {
            return Err(StoreError::Validation(format!(
                "schema for table '{}' must be an object of columns",
                name
            )));
        };

        let columns = map
            .into_iter()
            .map(|(column, options)| {
                if !options.is_object() {
                    return Err(StoreError::Validation(format!(
                        "options for column '{}' must be an object",
                        column
                    )));
                }
                let options: ColumnOptions = serde_json::from_value(options).map_err(|e| {
                    StoreError::Validation(format!("column '{}': {}", column, e))
                })?;
                ColumnDefinition::from_options(&column, options)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(name, columns)
    }

    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.primary_key)
    }

    fn keep_first_primary_key(&mut self) {
        let mut defined = false;
        for column in &mut self.columns {
            if !column.primary_key {
                continue;
            }
            if defined {
                warn!(
                    "At least 2 primary keys defined for table {}! - Ignoring primary key {}",
                    self.name, column.name
                );
                column.primary_key = false;
            }
            defined = true;
        }
    }
}

/// Check a table or column name before it is interpolated into SQL.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

// Words that start a column constraint, never part of a type name.
const CONSTRAINT_WORDS: &[&str] = &[
    "AS",
    "AUTOINCREMENT",
    "CHECK",
    "COLLATE",
    "CONSTRAINT",
    "DEFAULT",
    "GENERATED",
    "KEY",
    "NOT",
    "NULL",
    "PRIMARY",
    "REFERENCES",
    "UNIQUE",
];

/// Type tokens look like `NAME[ NAME]*[(digits[, digits])]`, e.g.
/// `UNSIGNED BIG INT` or `DECIMAL(10, 2)`.
fn validate_type_token(column: &str, token: &str) -> Result<()> {
    let token = token.trim();
    let (words, size) = match token.find('(') {
        Some(idx) => (&token[..idx], Some(&token[idx..])),
        None => (token, None),
    };

    let words_valid = !words.trim().is_empty()
        && words.split_whitespace().all(|word| {
            word.starts_with(|c: char| c.is_ascii_alphabetic())
                && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !CONSTRAINT_WORDS.contains(&word.to_ascii_uppercase().as_str())
        });

    let size_valid = match size {
        None => true,
        Some(size) => match size.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            Some(inner) => {
                let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
                parts.len() <= 2
                    && parts
                        .iter()
                        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
            }
            None => false,
        },
    };

    if words_valid && size_valid {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "column '{}' has an invalid type '{}'",
            column, token
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpret_keeps_column_order() {
        let def = TableDefinition::interpret(
            "users",
            r#"{"zeta": {"type": "TEXT"}, "alpha": {"type": "INTEGER"}}"#,
        )
        .unwrap();
        let names: Vec<_> = def.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_clause_modifier_order() {
        let column = ColumnDefinition::new("id", "INTEGER")
            .with_default("0")
            .unique()
            .auto_increment()
            .primary_key()
            .not_null();
        assert_eq!(
            column.clause(),
            "id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT UNIQUE DEFAULT 0"
        );
    }

    #[test]
    fn test_missing_type_names_column() {
        let err = TableDefinition::interpret(
            "t",
            json!({"ok": {"type": "TEXT"}, "broken": {"not_null": true}}),
        )
        .unwrap_err();
        match err {
            StoreError::Validation(msg) => assert!(msg.contains("broken")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_failure_is_distinct() {
        let err = TableDefinition::interpret("t", "{not json").unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }

    #[test]
    fn test_second_primary_key_dropped() {
        let def = TableDefinition::interpret(
            "t",
            json!({
                "a": {"type": "INTEGER", "primary_key": true},
                "b": {"type": "INTEGER", "primary_key": true}
            }),
        )
        .unwrap();
        assert!(def.columns[0].primary_key);
        assert!(!def.columns[1].primary_key);
        assert_eq!(def.primary_key().unwrap().name, "a");
    }

    #[test]
    fn test_empty_schema_rejected() {
        let err = TableDefinition::interpret("t", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_non_object_options_rejected() {
        let err = TableDefinition::interpret("t", json!({"a": "TEXT"})).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_numeric_default_literal() {
        let def =
            TableDefinition::interpret("t", json!({"n": {"type": "INTEGER", "default": 5}}))
                .unwrap();
        assert_eq!(def.columns[0].clause(), "n INTEGER DEFAULT 5");
    }

    #[test]
    fn test_identifiers() {
        assert!(validate_identifier("_users_2").is_ok());
        assert!(validate_identifier("2users").is_err());
        assert!(validate_identifier("users; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());

        let err = TableDefinition::interpret("t", json!({"bad name": {"type": "TEXT"}}))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_type_token_checked() {
        assert!(TableDefinition::new("t", vec![ColumnDefinition::new("p", "DECIMAL(10, 2)")])
            .is_ok());
        let err = TableDefinition::new("t", vec![ColumnDefinition::new("p", "TEXT); --")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_type_token_grammar() {
        let accepted = [
            "INTEGER",
            "UNSIGNED BIG INT",
            "VARCHAR(64)",
            "varchar (64)",
            "NUMERIC(8,3)",
        ];
        for token in accepted {
            assert!(
                validate_type_token("c", token).is_ok(),
                "{} should be accepted",
                token
            );
        }
        for token in [
            "TEXT, injected INTEGER",
            "TEXT PRIMARY KEY",
            "INTEGER NOT NULL",
            "TEXT DEFAULT x",
            "INT(1, 2, 3)",
            "INT(a)",
            "INT(1) UNIQUE",
            "(10)",
            "",
        ] {
            assert!(
                validate_type_token("c", token).is_err(),
                "{} should be rejected",
                token
            );
        }
    }

    #[test]
    fn test_type_cannot_smuggle_constraints() {
        let err = TableDefinition::interpret(
            "t",
            json!({
                "a": {"type": "INTEGER", "primary_key": true},
                "b": {"type": "TEXT PRIMARY KEY"}
            }),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("'b'")));

        let err = TableDefinition::interpret(
            "t",
            json!({"c": {"type": "TEXT, injected INTEGER"}}),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("'c'")));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = TableDefinition::new(
            "t",
            vec![
                ColumnDefinition::new("a", "TEXT"),
                ColumnDefinition::new("a", "TEXT"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
