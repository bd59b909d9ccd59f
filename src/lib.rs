//! Schema-driven table builder and row access over embedded SQLite.
//!
//! # Intention
//!
//! - Let callers create tables from a declarative JSON column description
//!   and insert or look up rows without writing SQL by hand.
//! - Encapsulate SQLite-specific logic, types, and error handling.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - No configuration files are read and no logger is installed; both are
//!   the caller's business.
//!
//! # Example
//!
//! ```no_run
//! use schema_store::{DbSettings, Record, SqliteStore};
//!
//! let store = SqliteStore::new(DbSettings::sqlite("app.db"));
//! store.create_table(
//!     "users",
//!     r#"{"id": {"type": "INTEGER", "primary_key": true, "auto_increment": true},
//!         "name": {"type": "TEXT", "not_null": true}}"#,
//! )?;
//! store.insert("users", &Record::new().with_value("name", "Alice"))?;
//! let alice = store.fetch_one("users", "name", "Alice")?;
//! assert!(alice.is_some());
//! # Ok::<(), schema_store::StoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod schema;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use config::{ConfigSource, DbSettings, Driver};
pub use error::{Result, StoreError};
pub use schema::{ColumnDefinition, ColumnOptions, SchemaInput, TableDefinition};
pub use sqlite::{
    CreateOperation, CrudOperation, CrudOutcome, FetchOutcome, ReadOperation, SqliteStore,
    TableCreation,
};
pub use statement::SqlQuery;
pub use value::{Record, Row, Value};
