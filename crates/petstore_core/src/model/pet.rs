//! Pet domain model.
//!
//! # Responsibility
//! - Provide a typed view over rows of the `pets` table.
//! - Convert between typed pets and column records.
//!
//! # Invariants
//! - `id` is `None` until the store assigns one, and never changes afterwards.
//! - `gender` can only hold the three stored codes.

use crate::model::record::Record;
use crate::model::schema::{
    ValidationError, BREED_DEFAULT, COLUMN_BREED, COLUMN_GENDER, COLUMN_ID, COLUMN_NAME,
    COLUMN_WEIGHT, GENDER_FEMALE, GENDER_MALE, GENDER_UNKNOWN, WEIGHT_DEFAULT,
};
use serde::{Deserialize, Serialize};

/// Row identifier assigned by the store.
pub type PetId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Gender {
    /// Stored integer code.
    pub fn code(self) -> i64 {
        match self {
            Self::Unknown => GENDER_UNKNOWN,
            Self::Male => GENDER_MALE,
            Self::Female => GENDER_FEMALE,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            GENDER_UNKNOWN => Some(Self::Unknown),
            GENDER_MALE => Some(Self::Male),
            GENDER_FEMALE => Some(Self::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub id: Option<PetId>,
    pub name: String,
    pub breed: String,
    pub gender: Gender,
    pub weight: i64,
}

impl Pet {
    /// Creates an unsaved pet with default breed, gender and weight.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            breed: BREED_DEFAULT.to_string(),
            gender: Gender::Unknown,
            weight: WEIGHT_DEFAULT,
        }
    }

    /// Record with every writable column; `id` is left out.
    pub fn to_record(&self) -> Record {
        Record::new()
            .with(COLUMN_NAME, self.name.as_str())
            .with(COLUMN_BREED, self.breed.as_str())
            .with(COLUMN_GENDER, self.gender.code())
            .with(COLUMN_WEIGHT, self.weight)
    }
}

impl TryFrom<&Record> for Pet {
    type Error = ValidationError;

    /// Requires a full-row record such as one returned by an unprojected query.
    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let name = record
            .get_str(COLUMN_NAME)
            .ok_or(ValidationError::MissingRequired(COLUMN_NAME))?;
        let breed = record
            .get_str(COLUMN_BREED)
            .ok_or(ValidationError::MissingRequired(COLUMN_BREED))?;
        let gender_code = record
            .get_i64(COLUMN_GENDER)
            .ok_or(ValidationError::MissingRequired(COLUMN_GENDER))?;
        let gender =
            Gender::from_code(gender_code).ok_or(ValidationError::InvalidGender(gender_code))?;
        let weight = record
            .get_i64(COLUMN_WEIGHT)
            .ok_or(ValidationError::MissingRequired(COLUMN_WEIGHT))?;

        Ok(Self {
            id: record.get_i64(COLUMN_ID),
            name: name.to_string(),
            breed: breed.to_string(),
            gender,
            weight,
        })
    }
}
