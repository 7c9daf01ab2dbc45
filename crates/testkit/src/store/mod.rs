//! Data Store Simulator.
//!
//! An in-memory store over the fixed campaign schema. Every write goes
//! through one checked insert path that validates declared foreign keys
//! before touching any table: a failed insert or seed leaves the store
//! unchanged.

pub mod fixtures;
mod query;
mod schema;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::SecondsFormat;
use serde_json::Value;

pub use query::{Direction, Operand, ParsedStatement, Projection, Query};
pub use schema::{ForeignKey, Row, SchemaDescriptor, TableSchema};

use crate::infrastructure::ports::{ClockPort, RandomPort, StoreError};
use crate::infrastructure::sync::{read, write};
use query::values_equal;

/// Options for `DataStore::setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub enable_foreign_keys: bool,
    pub seed_test_data: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            enable_foreign_keys: true,
            seed_test_data: false,
        }
    }
}

/// Rows of one table in insertion order, indexed by primary key.
#[derive(Clone, Default)]
struct Table {
    rows: BTreeMap<u64, Row>,
    ids: HashMap<String, u64>,
    next_seq: u64,
}

impl Table {
    fn insert(&mut self, id: String, row: Row) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(seq, row);
        self.ids.insert(id, seq);
    }

    fn get(&self, id: &str) -> Option<&Row> {
        self.ids.get(id).and_then(|seq| self.rows.get(seq))
    }

    fn remove(&mut self, id: &str) -> Option<Row> {
        let seq = self.ids.remove(id)?;
        self.rows.remove(&seq)
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.ids.clear();
    }
}

/// Outcome of `Statement::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub changes: usize,
    pub last_insert_id: Option<String>,
}

/// The simulated database.
pub struct DataStore {
    schema: SchemaDescriptor,
    options: StoreOptions,
    tables: RwLock<HashMap<&'static str, Table>>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl DataStore {
    /// Create the store and seed it when requested.
    pub fn setup(
        options: StoreOptions,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Result<Self, StoreError> {
        let schema = SchemaDescriptor::campaign();
        let tables = schema
            .tables()
            .iter()
            .map(|table| (table.name, Table::default()))
            .collect();
        let store = Self {
            schema,
            options,
            tables: RwLock::new(tables),
            clock,
            random,
        };
        if options.seed_test_data {
            store.seed_test_data()?;
        }
        tracing::debug!(
            foreign_keys = options.enable_foreign_keys,
            seeded = options.seed_test_data,
            "Data store ready"
        );
        Ok(store)
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    fn table_schema(&self, table: &str) -> Result<&'static TableSchema, StoreError> {
        self.schema
            .table(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    /// Insert a row, validating every declared foreign key first.
    ///
    /// Generates a UUID `id` when absent and fills `created_at` when the
    /// table declares it. Returns the stored row.
    pub fn insert(&self, table: &str, row: Value) -> Result<Row, StoreError> {
        let schema = self.table_schema(table)?;
        let (id, row) = self.complete_row(schema, row)?;
        self.insert_checked(&mut write(&self.tables), schema, &id, &row)?;
        tracing::debug!(table = schema.name, id = %id, "Row inserted");
        Ok(row)
    }

    /// Fill in the generated columns and extract the primary key.
    fn complete_row(&self, schema: &TableSchema, row: Value) -> Result<(String, Row), StoreError> {
        let mut row = match row {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidRow {
                    table: schema.name.to_string(),
                    reason: format!("expected an object, got {}", json_kind(&other)),
                })
            }
        };

        let id = match row.get("id") {
            None | Some(Value::Null) => {
                let id = self.random.gen_uuid().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
            Some(value) => key_of(value).ok_or_else(|| StoreError::InvalidRow {
                table: schema.name.to_string(),
                reason: "id must be a string or a number".to_string(),
            })?,
        };
        if schema.has_column("created_at") && !row.contains_key("created_at") {
            let now = self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
            row.insert("created_at".to_string(), Value::String(now));
        }
        Ok((id, row))
    }

    /// The single write path: key and reference checks, then the insert.
    fn insert_checked(
        &self,
        tables: &mut HashMap<&'static str, Table>,
        schema: &'static TableSchema,
        id: &str,
        row: &Row,
    ) -> Result<(), StoreError> {
        if tables.get(schema.name).is_some_and(|t| t.ids.contains_key(id)) {
            return Err(StoreError::DuplicateKey {
                table: schema.name.to_string(),
                id: id.to_string(),
            });
        }
        if self.options.enable_foreign_keys {
            for fk in schema.foreign_keys {
                check_reference(tables, schema, fk, row)?;
            }
        }

        tables
            .entry(schema.name)
            .or_default()
            .insert(id.to_string(), row.clone());
        Ok(())
    }

    pub fn get_by_id(&self, table: &str, id: &str) -> Result<Option<Row>, StoreError> {
        let schema = self.table_schema(table)?;
        Ok(read(&self.tables)
            .get(schema.name)
            .and_then(|t| t.get(id))
            .cloned())
    }

    /// Every row of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let schema = self.table_schema(table)?;
        Ok(read(&self.tables)
            .get(schema.name)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Delete a row by id. Returns whether a row was removed.
    ///
    /// With foreign keys enabled, deleting a row that children still
    /// reference fails and removes nothing.
    pub fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        let schema = self.table_schema(table)?;
        let mut tables = write(&self.tables);
        if !tables.get(schema.name).is_some_and(|t| t.ids.contains_key(id)) {
            return Ok(false);
        }

        if self.options.enable_foreign_keys {
            let key = Value::String(id.to_string());
            for (child, fk) in self.schema.referencing(schema.name) {
                let referenced = tables.get(child.name).is_some_and(|t| {
                    t.rows
                        .values()
                        .any(|row| values_equal(row.get(fk.column), &key))
                });
                if referenced {
                    return Err(StoreError::StillReferenced {
                        table: table.to_string(),
                        id: id.to_string(),
                        child_table: child.name.to_string(),
                        child_column: fk.column.to_string(),
                    });
                }
            }
        }

        let removed = tables
            .get_mut(schema.name)
            .and_then(|t| t.remove(id))
            .is_some();
        tracing::debug!(table = schema.name, id = %id, "Row deleted");
        Ok(removed)
    }

    pub fn count_records(&self, table: &str) -> Result<usize, StoreError> {
        let schema = self.table_schema(table)?;
        Ok(read(&self.tables)
            .get(schema.name)
            .map_or(0, |t| t.rows.len()))
    }

    /// Row count of every table.
    pub fn table_counts(&self) -> BTreeMap<String, usize> {
        let tables = read(&self.tables);
        self.schema
            .tables()
            .iter()
            .map(|table| {
                let count = tables.get(table.name).map_or(0, |t| t.rows.len());
                (table.name.to_string(), count)
            })
            .collect()
    }

    /// Empty every table. The schema is untouched.
    pub fn clear_all_data(&self) {
        for table in write(&self.tables).values_mut() {
            table.clear();
        }
        tracing::debug!("Data store cleared");
    }

    /// Insert the canonical fixture rows, all or nothing.
    ///
    /// Fixture rows already stored unchanged are skipped, so seeding an
    /// already seeded store is a no-op. A different row holding a fixture
    /// id fails with `DuplicateKey` and nothing is written.
    pub fn seed_test_data(&self) -> Result<(), StoreError> {
        let mut rows = Vec::new();
        for (table, row) in fixtures::seed_rows() {
            let schema = self.table_schema(table)?;
            let (id, row) = self.complete_row(schema, row)?;
            rows.push((schema, id, row));
        }

        let mut tables = write(&self.tables);
        let mut staged = tables.clone();
        let mut inserted = 0;
        for (schema, id, row) in &rows {
            if staged
                .get(schema.name)
                .and_then(|t| t.get(id))
                .is_some_and(|existing| existing == row)
            {
                continue;
            }
            self.insert_checked(&mut staged, *schema, id, row)?;
            inserted += 1;
        }
        *tables = staged;
        tracing::debug!(
            rows = inserted,
            skipped = rows.len() - inserted,
            "Data store seeded"
        );
        Ok(())
    }

    /// Prepare a statement from the supported subset.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>, StoreError> {
        let parsed = ParsedStatement::parse(sql)?;
        self.table_schema(parsed.table())?;
        Ok(Statement {
            store: self,
            parsed,
        })
    }

    /// Run a typed query.
    pub fn query(&self, query: &Query, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let schema = self.table_schema(&query.table)?;
        let tables = read(&self.tables);
        match tables.get(schema.name) {
            Some(table) => query.evaluate(table.rows.values(), params),
            None => query.evaluate(std::iter::empty(), params),
        }
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("options", &self.options)
            .field("counts", &self.table_counts())
            .finish()
    }
}

/// A prepared statement bound to its store.
#[derive(Debug)]
pub struct Statement<'a> {
    store: &'a DataStore,
    parsed: ParsedStatement,
}

impl Statement<'_> {
    /// First matching row.
    pub fn get(&self, params: &[Value]) -> Result<Option<Row>, StoreError> {
        Ok(self.all(params)?.into_iter().next())
    }

    /// Every matching row.
    pub fn all(&self, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        match &self.parsed {
            ParsedStatement::Select(query) => self.store.query(query, params),
            ParsedStatement::Insert { .. } => Err(StoreError::UnsupportedQuery(
                "INSERT statements are executed with run()".to_string(),
            )),
        }
    }

    /// Execute an INSERT through the foreign-key checked insert path.
    pub fn run(&self, params: &[Value]) -> Result<RunResult, StoreError> {
        let ParsedStatement::Insert {
            table,
            columns,
            values,
        } = &self.parsed
        else {
            return Err(StoreError::UnsupportedQuery(
                "run() expects an INSERT statement".to_string(),
            ));
        };

        let expected = values.iter().filter(|v| **v == Operand::Param).count();
        if params.len() != expected {
            return Err(StoreError::ParameterCount {
                expected,
                actual: params.len(),
            });
        }

        let mut bound = params.iter();
        let mut row = Row::new();
        for (column, operand) in columns.iter().zip(values) {
            let value = match operand {
                Operand::Param => bound.next().cloned().unwrap_or(Value::Null),
                Operand::Literal(value) => value.clone(),
            };
            row.insert(column.clone(), value);
        }

        let stored = self.store.insert(table, Value::Object(row))?;
        Ok(RunResult {
            changes: 1,
            last_insert_id: stored.get("id").and_then(key_of),
        })
    }

    pub fn parsed(&self) -> &ParsedStatement {
        &self.parsed
    }
}

fn check_reference(
    tables: &HashMap<&'static str, Table>,
    schema: &TableSchema,
    fk: &ForeignKey,
    row: &Row,
) -> Result<(), StoreError> {
    let value = match row.get(fk.column) {
        None | Some(Value::Null) => return Ok(()),
        Some(value) => value,
    };

    let exists = tables.get(fk.references_table).is_some_and(|parent| {
        if fk.references_column == "id" {
            key_of(value).is_some_and(|key| parent.ids.contains_key(&key))
        } else {
            parent
                .rows
                .values()
                .any(|candidate| values_equal(candidate.get(fk.references_column), value))
        }
    });

    if exists {
        Ok(())
    } else {
        Err(StoreError::ForeignKeyViolation {
            table: schema.name.to_string(),
            column: fk.column.to_string(),
            referenced_table: fk.references_table.to_string(),
            referenced_column: fk.references_column.to_string(),
            value: key_of(value).unwrap_or_else(|| value.to_string()),
        })
    }
}

/// Primary-key text of a JSON value.
fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
