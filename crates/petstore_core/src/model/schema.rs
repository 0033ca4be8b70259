//! Pet schema catalog and boundary validation.
//!
//! # Responsibility
//! - Describe the `pets` table: columns, types, defaults and constraints.
//! - Reject unknown columns and invalid values before SQL is built.
//!
//! # Invariants
//! - `PETS_SCHEMA.version` equals the latest registered migration version.
//! - Column names reaching SQL text always come from this catalog.
//! - Invalid values are rejected, never coerced.

use crate::model::record::{FieldValue, Record};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const CONTENT_AUTHORITY: &str = "com.example.android.pets";
pub const PATH_PETS: &str = "pets";
pub const TABLE_PETS: &str = "pets";

pub const COLUMN_ID: &str = "id";
pub const COLUMN_NAME: &str = "name";
pub const COLUMN_BREED: &str = "breed";
pub const COLUMN_GENDER: &str = "gender";
pub const COLUMN_WEIGHT: &str = "weight";

pub const GENDER_UNKNOWN: i64 = 0;
pub const GENDER_MALE: i64 = 1;
pub const GENDER_FEMALE: i64 = 2;

pub const BREED_DEFAULT: &str = "Unknown";
pub const WEIGHT_DEFAULT: i64 = 0;

/// Returns whether `gender` is one of the three stored gender codes.
pub fn is_valid_gender(gender: i64) -> bool {
    gender == GENDER_UNKNOWN || gender == GENDER_MALE || gender == GENDER_FEMALE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    fn label(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Integer(i64),
    Text(&'static str),
}

impl DefaultValue {
    pub fn to_value(self) -> FieldValue {
        match self {
            Self::Integer(value) => FieldValue::Integer(value),
            Self::Text(value) => FieldValue::Text(value.to_string()),
        }
    }
}

/// Value rule enforced on top of the column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    None,
    /// Text must contain a non-whitespace character.
    NonEmpty,
    Gender,
    NonNegative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub constraint: Constraint,
    /// Assigned by the store; callers may read but never write it.
    pub assigned: bool,
}

/// Static, versioned table description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaCatalog {
    pub version: u32,
    pub table_name: &'static str,
    pub columns: &'static [ColumnDef],
}

pub static PETS_SCHEMA: SchemaCatalog = SchemaCatalog {
    version: 2,
    table_name: TABLE_PETS,
    columns: &[
        ColumnDef {
            name: COLUMN_ID,
            column_type: ColumnType::Integer,
            required: false,
            default: None,
            constraint: Constraint::None,
            assigned: true,
        },
        ColumnDef {
            name: COLUMN_NAME,
            column_type: ColumnType::Text,
            required: true,
            default: None,
            constraint: Constraint::NonEmpty,
            assigned: false,
        },
        ColumnDef {
            name: COLUMN_BREED,
            column_type: ColumnType::Text,
            required: false,
            default: Some(DefaultValue::Text(BREED_DEFAULT)),
            constraint: Constraint::None,
            assigned: false,
        },
        ColumnDef {
            name: COLUMN_GENDER,
            column_type: ColumnType::Integer,
            required: true,
            default: None,
            constraint: Constraint::Gender,
            assigned: false,
        },
        ColumnDef {
            name: COLUMN_WEIGHT,
            column_type: ColumnType::Integer,
            required: false,
            default: Some(DefaultValue::Integer(WEIGHT_DEFAULT)),
            constraint: Constraint::NonNegative,
            assigned: false,
        },
    ],
};

/// Validation failures raised at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingRequired(&'static str),
    EmptyValue(&'static str),
    InvalidGender(i64),
    NegativeValue { column: &'static str, value: i64 },
    TypeMismatch {
        column: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    UnknownColumn(String),
    ImmutableColumn(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired(column) => write!(f, "column `{column}` is required"),
            Self::EmptyValue(column) => write!(f, "column `{column}` must not be empty"),
            Self::InvalidGender(value) => {
                write!(f, "gender must be 0, 1 or 2, got {value}")
            }
            Self::NegativeValue { column, value } => {
                write!(f, "column `{column}` must be non-negative, got {value}")
            }
            Self::TypeMismatch {
                column,
                expected,
                actual,
            } => write!(f, "column `{column}` expects {expected}, got {actual}"),
            Self::UnknownColumn(column) => write!(f, "unknown column `{column}`"),
            Self::ImmutableColumn(column) => write!(f, "column `{column}` cannot be written"),
        }
    }
}

impl Error for ValidationError {}

/// Column/value pairs that passed validation, keyed by catalog names.
pub type ValidatedValues = Vec<(&'static str, FieldValue)>;

impl SchemaCatalog {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        let columns: &'static [ColumnDef] = self.columns;
        columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.name).collect()
    }

    /// Resolves a caller-supplied name to the catalog column.
    pub fn resolve(&self, name: &str) -> Result<&'static ColumnDef, ValidationError> {
        self.column(name.trim())
            .ok_or_else(|| ValidationError::UnknownColumn(name.to_string()))
    }

    /// Validates a projection; an empty projection selects every column.
    pub fn validate_projection(
        &self,
        projection: &[String],
    ) -> Result<Vec<&'static ColumnDef>, ValidationError> {
        if projection.is_empty() {
            let columns: &'static [ColumnDef] = self.columns;
            return Ok(columns.iter().collect());
        }
        projection.iter().map(|name| self.resolve(name)).collect()
    }

    /// Checks one value against the column type and constraint.
    pub fn validate_value(
        &self,
        column: &'static ColumnDef,
        value: &FieldValue,
    ) -> Result<(), ValidationError> {
        match (column.column_type, value) {
            (ColumnType::Integer, FieldValue::Integer(number)) => match column.constraint {
                Constraint::Gender if !is_valid_gender(*number) => {
                    Err(ValidationError::InvalidGender(*number))
                }
                Constraint::NonNegative if *number < 0 => Err(ValidationError::NegativeValue {
                    column: column.name,
                    value: *number,
                }),
                _ => Ok(()),
            },
            (ColumnType::Text, FieldValue::Text(text)) => match column.constraint {
                Constraint::NonEmpty if text.trim().is_empty() => {
                    Err(ValidationError::EmptyValue(column.name))
                }
                _ => Ok(()),
            },
            (expected, actual) => Err(ValidationError::TypeMismatch {
                column: column.name,
                expected: expected.label(),
                actual: actual.type_name(),
            }),
        }
    }

    /// Validates a full record for insertion and fills defaults.
    ///
    /// # Errors
    /// - `ImmutableColumn` when the record carries an assigned column.
    /// - `UnknownColumn`, `TypeMismatch` or a constraint error for bad fields.
    /// - `MissingRequired` when a required column is absent.
    pub fn prepare_insert(&self, record: &Record) -> Result<ValidatedValues, ValidationError> {
        let mut supplied = self.prepare_update(record)?;

        for column in self.columns.iter().filter(|column| !column.assigned) {
            if supplied.iter().any(|(name, _)| *name == column.name) {
                continue;
            }
            match column.default {
                Some(default) => supplied.push((column.name, default.to_value())),
                None if column.required => {
                    return Err(ValidationError::MissingRequired(column.name))
                }
                None => {}
            }
        }

        supplied.sort_by_key(|(name, _)| self.position(name));
        Ok(supplied)
    }

    /// Validates the fields of a partial record.
    ///
    /// Blank text in a column that carries a text default is replaced by the
    /// default.
    pub fn prepare_update(&self, record: &Record) -> Result<ValidatedValues, ValidationError> {
        let mut validated = ValidatedValues::with_capacity(record.len());
        for (name, value) in record.iter() {
            let column = self.resolve(name)?;
            if column.assigned {
                return Err(ValidationError::ImmutableColumn(column.name));
            }
            let value = match (value, column.default) {
                (FieldValue::Text(text), Some(DefaultValue::Text(default)))
                    if text.trim().is_empty() =>
                {
                    FieldValue::Text(default.to_string())
                }
                _ => value.clone(),
            };
            self.validate_value(column, &value)?;
            validated.push((column.name, value));
        }
        Ok(validated)
    }

    fn position(&self, name: &str) -> usize {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .unwrap_or(usize::MAX)
    }
}
