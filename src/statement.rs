//! Statement text plus positional parameters.
//!
//! Identifiers are interpolated only after [`validate_identifier`];
//! values are always bound.

use crate::error::{Result, StoreError};
use crate::schema::{validate_identifier, TableDefinition};
use crate::value::{Record, Value};

/// SQL statement with typed, positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn create_table(definition: &TableDefinition) -> Self {
        let clauses: Vec<String> = definition.columns.iter().map(|c| c.clause()).collect();
        Self::new(&format!(
            "CREATE TABLE {} ({})",
            definition.name,
            clauses.join(", ")
        ))
    }

    pub fn table_exists(name: &str) -> Self {
        Self::new("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .with_params(vec![Value::from(name)])
    }

    /// `SELECT <fields or *> FROM <table> WHERE <column> = ?1`
    pub fn select_where(
        table: &str,
        column: &str,
        value: Value,
        fields: Option<&[String]>,
    ) -> Result<Self> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        let projection = match fields {
            None => "*".to_string(),
            Some([]) => {
                return Err(StoreError::Validation(
                    "field list must name at least one column".to_string(),
                ))
            }
            Some(fields) => fields
                .iter()
                .map(|f| validate_identifier(f))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
        };
        Ok(Self::new(&format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            projection, table, column
        ))
        .with_params(vec![value]))
    }

    /// `INSERT INTO <table> (<columns>) VALUES (?, ...)`, one placeholder
    /// per record value.
    pub fn insert(table: &str, record: &Record) -> Result<Self> {
        validate_identifier(table)?;
        if record.is_empty() {
            return Err(StoreError::Validation(format!(
                "nothing to insert into '{}'",
                table
            )));
        }
        let columns = record
            .columns()
            .map(validate_identifier)
            .collect::<Result<Vec<_>>>()?;
        let placeholders = vec!["?"; columns.len()].join(", ");
        Ok(Self::new(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        ))
        .with_params(record.values().cloned().collect()))
    }
}
