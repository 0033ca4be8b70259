//! Pet repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over the `pets` table with projection, filter and sort.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths validate through `PETS_SCHEMA` before SQL mutations.
//! - Every mutation runs in one transaction; on error nothing is applied.
//! - Identifiers in SQL text come only from the catalog; values are bound.

use crate::db::DbError;
use crate::model::pet::PetId;
use crate::model::record::{FieldValue, Record};
use crate::model::schema::{
    ColumnDef, ColumnType, ValidatedValues, ValidationError, COLUMN_ID, PETS_SCHEMA,
};
use rusqlite::{params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for routing, validation and persistence of pet data.
#[derive(Debug)]
pub enum StoreError {
    Validation(ValidationError),
    /// Unrecognized resource URI.
    NotFound(String),
    /// The URI is valid but does not support the requested operation.
    UnsupportedOperation(String),
    Db(DbError),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(uri) => write!(f, "unknown resource uri: {uri}"),
            Self::UnsupportedOperation(message) => write!(f, "{message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted pet data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::UnsupportedOperation(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

/// Conjunction of equality/range conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(
        mut self,
        column: impl Into<String>,
        op: FilterOp,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.and(column, FilterOp::Eq, value)
    }

    pub fn ne(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.and(column, FilterOp::Ne, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.and(column, FilterOp::Lt, value)
    }

    pub fn le(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.and(column, FilterOp::Le, value)
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.and(column, FilterOp::Gt, value)
    }

    pub fn ge(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.and(column, FilterOp::Ge, value)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

/// Ordered sort keys; empty means `id ASC`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOrder {
    keys: Vec<SortKey>,
}

impl SortOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, column: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            column: column.into(),
            descending: false,
        });
        self
    }

    pub fn desc(mut self, column: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            column: column.into(),
            descending: true,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }
}

/// Checks projection, filter and sort columns without touching storage.
pub fn validate_query_shape(
    projection: &[String],
    filter: &Filter,
    sort: &SortOrder,
) -> StoreResult<()> {
    PETS_SCHEMA.validate_projection(projection)?;
    let mut binds = Vec::new();
    build_where(None, filter, &mut binds)?;
    build_order_by(sort)?;
    Ok(())
}

/// Repository interface for pet CRUD operations.
///
/// `id = Some(..)` narrows an operation to one row on top of `filter`.
pub trait PetRepository {
    fn insert_pet(&self, record: &Record) -> StoreResult<PetId>;
    fn update_pets(&self, id: Option<PetId>, values: &Record, filter: &Filter)
        -> StoreResult<usize>;
    fn query_pets(
        &self,
        id: Option<PetId>,
        projection: &[String],
        filter: &Filter,
        sort: &SortOrder,
    ) -> StoreResult<Vec<Record>>;
    fn delete_pets(&self, id: Option<PetId>, filter: &Filter) -> StoreResult<usize>;
}

/// SQLite-backed pet repository.
pub struct SqlitePetRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePetRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PetRepository for SqlitePetRepository<'_> {
    fn insert_pet(&self, record: &Record) -> StoreResult<PetId> {
        let values = PETS_SCHEMA.prepare_insert(record)?;
        let columns = values.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            PETS_SCHEMA.table_name,
            columns.join(", ")
        );

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&sql, params_from_iter(values.iter().map(|(_, value)| value)))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    fn update_pets(
        &self,
        id: Option<PetId>,
        values: &Record,
        filter: &Filter,
    ) -> StoreResult<usize> {
        if values.is_empty() {
            return Ok(0);
        }

        let partial = PETS_SCHEMA.prepare_update(values)?;

        let tx = self.conn.unchecked_transaction()?;
        let validated = match id {
            Some(id) => {
                let current = select_rows(&tx, Some(id), &[], filter, &SortOrder::default())?;
                let Some(mut merged) = current.into_iter().next() else {
                    return Ok(0);
                };
                merged.remove(COLUMN_ID);
                for (column, value) in partial {
                    merged.set(column, value);
                }
                PETS_SCHEMA.prepare_insert(&merged)?
            }
            None => partial,
        };

        let changed = execute_update(&tx, id, &validated, filter)?;
        tx.commit()?;
        Ok(changed)
    }

    fn query_pets(
        &self,
        id: Option<PetId>,
        projection: &[String],
        filter: &Filter,
        sort: &SortOrder,
    ) -> StoreResult<Vec<Record>> {
        select_rows(self.conn, id, projection, filter, sort)
    }

    fn delete_pets(&self, id: Option<PetId>, filter: &Filter) -> StoreResult<usize> {
        let mut binds = Vec::new();
        let where_sql = build_where(id, filter, &mut binds)?;
        let sql = format!("DELETE FROM {}{where_sql};", PETS_SCHEMA.table_name);

        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(&sql, params_from_iter(binds.iter()))?;
        tx.commit()?;
        Ok(removed)
    }
}

fn execute_update(
    conn: &Connection,
    id: Option<PetId>,
    values: &ValidatedValues,
    filter: &Filter,
) -> StoreResult<usize> {
    let assignments = values
        .iter()
        .map(|(name, _)| format!("{name} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut binds = values
        .iter()
        .map(|(_, value)| value.clone())
        .collect::<Vec<_>>();
    let where_sql = build_where(id, filter, &mut binds)?;
    let sql = format!(
        "UPDATE {} SET {assignments}{where_sql};",
        PETS_SCHEMA.table_name
    );
    Ok(conn.execute(&sql, params_from_iter(binds.iter()))?)
}

fn select_rows(
    conn: &Connection,
    id: Option<PetId>,
    projection: &[String],
    filter: &Filter,
    sort: &SortOrder,
) -> StoreResult<Vec<Record>> {
    let columns = PETS_SCHEMA.validate_projection(projection)?;
    let mut binds = Vec::new();
    let where_sql = build_where(id, filter, &mut binds)?;
    let order_sql = build_order_by(sort)?;
    let column_sql = columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {column_sql} FROM {}{where_sql}{order_sql};",
        PETS_SCHEMA.table_name
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_row(row, &columns)?);
    }
    Ok(records)
}

fn build_where(
    id: Option<PetId>,
    filter: &Filter,
    binds: &mut Vec<FieldValue>,
) -> StoreResult<String> {
    let mut clauses = Vec::new();
    if let Some(id) = id {
        clauses.push(format!("{COLUMN_ID} = ?"));
        binds.push(FieldValue::Integer(id));
    }
    for condition in filter.conditions() {
        let column = PETS_SCHEMA.resolve(&condition.column)?;
        check_filter_type(column, &condition.value)?;
        clauses.push(format!("{} {} ?", column.name, condition.op.sql()));
        binds.push(condition.value.clone());
    }

    if clauses.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" WHERE {}", clauses.join(" AND ")))
    }
}

fn build_order_by(sort: &SortOrder) -> StoreResult<String> {
    let mut keys = Vec::with_capacity(sort.keys().len() + 1);
    for key in sort.keys() {
        let column = PETS_SCHEMA.resolve(&key.column)?;
        let direction = if key.descending { "DESC" } else { "ASC" };
        keys.push(format!("{} {direction}", column.name));
    }
    if !keys.iter().any(|key| key.starts_with(&format!("{COLUMN_ID} "))) {
        keys.push(format!("{COLUMN_ID} ASC"));
    }
    Ok(format!(" ORDER BY {}", keys.join(", ")))
}

fn check_filter_type(column: &'static ColumnDef, value: &FieldValue) -> StoreResult<()> {
    let matches = matches!(
        (column.column_type, value),
        (ColumnType::Integer, FieldValue::Integer(_)) | (ColumnType::Text, FieldValue::Text(_))
    );
    if matches {
        return Ok(());
    }
    Err(ValidationError::TypeMismatch {
        column: column.name,
        expected: match column.column_type {
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
        },
        actual: value.type_name(),
    }
    .into())
}

fn parse_row(row: &Row<'_>, columns: &[&'static ColumnDef]) -> StoreResult<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        let value = match column.column_type {
            ColumnType::Integer => FieldValue::Integer(row.get::<_, i64>(index).map_err(|err| {
                StoreError::InvalidData(format!("pets.{} is not an integer: {err}", column.name))
            })?),
            ColumnType::Text => FieldValue::Text(row.get::<_, String>(index).map_err(|err| {
                StoreError::InvalidData(format!("pets.{} is not text: {err}", column.name))
            })?),
        };
        record.set(column.name, value);
    }
    Ok(record)
}
