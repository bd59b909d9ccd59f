use crate::config::{ConfigSource, DbSettings, Driver};
use crate::error::{Result, StoreError};
use crate::schema::{SchemaInput, TableDefinition};
use crate::statement::SqlQuery;
use crate::value::{Record, Row, Value};
use log::{debug, error, info, warn};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::sync::{Mutex, MutexGuard};

/// Lookup of rows whose `column` equals `value`
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    pub column: String,
    pub value: Value,
    /// Projected columns; `None` selects every column
    pub fields: Option<Vec<String>>,
    /// Return at most one row
    pub unique: bool,
}

impl ReadOperation {
    pub fn new(table: &str, column: &str, value: impl Into<Value>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: value.into(),
            fields: None,
            unique: false,
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Rows(Vec<Row>),
    /// Result of a unique fetch; `None` when nothing matched
    Unique(Option<Row>),
}

impl FetchOutcome {
    /// First row of either shape
    pub fn into_first(self) -> Option<Row> {
        match self {
            FetchOutcome::Rows(rows) => rows.into_iter().next(),
            FetchOutcome::Unique(row) => row,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOutcome {
    Inserted,
    Fetched(FetchOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCreation {
    Created,
    /// The table was already present; nothing was executed
    AlreadyExists,
}

/// SQLite-backed store holding at most one connection, opened on first use.
///
/// The store is `Sync`; share it behind an `Arc` and every caller goes
/// through the same handle. Each statement commits on its own.
pub struct SqliteStore {
    settings: DbSettings,
    connection: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Create a store; nothing is opened until the first operation
    pub fn new(settings: DbSettings) -> Self {
        Self {
            settings,
            connection: Mutex::new(None),
        }
    }

    /// Create a store and open its connection immediately
    pub fn connect(settings: DbSettings) -> Result<Self> {
        let store = Self::new(settings);
        store.ensure_connection()?;
        Ok(store)
    }

    pub fn from_config<S: ConfigSource + ?Sized>(source: &S) -> Result<Self> {
        info!("read config...");
        let settings = DbSettings::from_source(source)
            .inspect_err(|e| error!("Database config is not usable! - Error: {}", e))?;
        Ok(Self::new(settings))
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    /// Open the connection if it is not open yet.
    pub fn ensure_connection(&self) -> Result<()> {
        self.with_connection(|_| Ok(()))
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        self.with_connection(|conn| table_exists(conn, name))
            .inspect_err(|e| error!("Error while checking for table {}! - Error: {}", name, e))
    }

    /// Create `name` from a declarative schema unless it already exists.
    pub fn create_table(
        &self,
        name: &str,
        schema: impl Into<SchemaInput>,
    ) -> Result<TableCreation> {
        let schema = schema.into();
        self.create_with(name, move || TableDefinition::interpret(name, schema))
    }

    /// Create a table from an already validated definition.
    pub fn create_table_from(&self, definition: &TableDefinition) -> Result<TableCreation> {
        self.create_with(&definition.name, || Ok(definition.clone()))
    }

    pub fn fetch(&self, op: &ReadOperation) -> Result<FetchOutcome> {
        self.with_connection(|conn| fetch(conn, op)).inspect_err(|e| {
            error!(
                "Error while fetching value from table {}! - Error: {}",
                op.table, e
            )
        })
    }

    pub fn fetch_all(
        &self,
        table: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Row>> {
        let op = ReadOperation::new(table, column, value);
        Ok(match self.fetch(&op)? {
            FetchOutcome::Rows(rows) => rows,
            FetchOutcome::Unique(row) => row.into_iter().collect(),
        })
    }

    pub fn fetch_one(
        &self,
        table: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Row>> {
        let op = ReadOperation::new(table, column, value).unique();
        Ok(self.fetch(&op)?.into_first())
    }

    /// Fetch and read the first column of the first row as a flag.
    ///
    /// No matching row reads as `false`.
    pub fn fetch_as_bool(&self, op: &ReadOperation) -> Result<bool> {
        let first = self
            .fetch(op)?
            .into_first()
            .and_then(|row| row.into_values().into_iter().next());
        match first {
            Some(value) => value.coerce_bool().inspect_err(|_| {
                error!(
                    "Error while converting fetched \"{:?}\" value to bool! - Unsupported type {}",
                    value,
                    value.type_name()
                )
            }),
            None => {
                debug!(
                    "No value in {} where {} matched, reading as false",
                    op.table, op.column
                );
                Ok(false)
            }
        }
    }

    /// Insert one row. Nested values are stored as JSON text.
    pub fn insert(&self, table: &str, record: &Record) -> Result<()> {
        let verify = self.settings.verify_inserts;
        self.with_connection(|conn| insert(conn, table, record, verify))
            .inspect_err(|e| {
                error!(
                    "Error while inserting value in table {}! - Error: {}",
                    table, e
                )
            })
    }

    pub fn execute_crud(&self, op: CrudOperation) -> Result<CrudOutcome> {
        match op {
            CrudOperation::Create(create) => {
                self.insert(&create.table, &create.record)?;
                Ok(CrudOutcome::Inserted)
            }
            CrudOperation::Read(read) => Ok(CrudOutcome::Fetched(self.fetch(&read)?)),
        }
    }

    fn create_with(
        &self,
        name: &str,
        definition: impl FnOnce() -> Result<TableDefinition>,
    ) -> Result<TableCreation> {
        self.with_connection(|conn| {
            if table_exists(conn, name)? {
                warn!("Table {} already exist! - SKIP", name);
                return Ok(TableCreation::AlreadyExists);
            }
            info!("Create table {}", name);
            let definition = definition()?;
            create_table(conn, &definition)?;
            Ok(TableCreation::Created)
        })
        .inspect_err(|e| error!("Error while creating table {}! - Error: {}", name, e))
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(open(&self.settings)?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Connect("connection was not initialized".to_string())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.connection
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

fn open(settings: &DbSettings) -> Result<Connection> {
    info!("Init database with driver {}...", settings.driver.as_str());
    let conn = match settings.driver {
        Driver::Sqlite => {
            let path = settings.resolved_path()?;
            info!("Selected DB Driver is SQLite, file {}", path.display());
            Connection::open(&path)
        }
        Driver::Memory => {
            let uri = settings.memory_uri();
            info!("Selected DB Driver is SQLite-Memory, {}", uri);
            Connection::open_with_flags(
                &uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        Driver::MySql => {
            return Err(StoreError::UnsupportedBackend {
                driver: settings.driver.as_str().to_string(),
                reason: "recognized but not implemented".to_string(),
            })
        }
    }
    .map_err(|e| StoreError::Connect(e.to_string()))?;
    debug!("DB initialized!");
    Ok(conn)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let query = SqlQuery::table_exists(name);
    let mut stmt = conn.prepare(&query.statement)?;
    Ok(stmt.exists(params_from_iter(query.params.iter()))?)
}

fn create_table(conn: &Connection, definition: &TableDefinition) -> Result<()> {
    let query = SqlQuery::create_table(definition);
    debug!("Query successfully generated. Query: {}", query.statement);
    conn.execute(&query.statement, params_from_iter(query.params.iter()))?;

    if !table_exists(conn, &definition.name)? {
        return Err(StoreError::PostCondition(format!(
            "table {} does not exist after creation",
            definition.name
        )));
    }
    Ok(())
}

fn fetch(conn: &Connection, op: &ReadOperation) -> Result<FetchOutcome> {
    if !table_exists(conn, &op.table)? {
        return Err(StoreError::TableNotFound(op.table.clone()));
    }
    let query = SqlQuery::select_where(
        &op.table,
        &op.column,
        op.value.clone(),
        op.fields.as_deref(),
    )?;
    debug!("Prepared query: {}", query.statement);

    let mut stmt = conn.prepare(&query.statement)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(query.params.iter()))?;

    let read = |row: &rusqlite::Row<'_>| -> Result<Row> {
        let values = (0..columns.len())
            .map(|idx| row.get::<_, Value>(idx))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Row::new(columns.clone(), values))
    };

    if op.unique {
        let row = rows.next()?.map(&read).transpose()?;
        return Ok(FetchOutcome::Unique(row));
    }
    let mut found = Vec::new();
    while let Some(row) = rows.next()? {
        found.push(read(row)?);
    }
    Ok(FetchOutcome::Rows(found))
}

fn insert(conn: &Connection, table: &str, record: &Record, verify: bool) -> Result<()> {
    if !table_exists(conn, table)? {
        return Err(StoreError::TableNotFound(table.to_string()));
    }
    let query = SqlQuery::insert(table, record)?;
    debug!("Prepared query: {}", query.statement);

    let affected = conn
        .execute(&query.statement, params_from_iter(query.params.iter()))
        .inspect_err(|_| error!("Statement: {}, values: {:?}", query.statement, query.params))?;

    if verify && affected != 1 {
        return Err(StoreError::PostCondition(format!(
            "insert into {} affected {} rows",
            table, affected
        )));
    }
    Ok(())
}
