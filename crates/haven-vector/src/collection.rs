//! Collection schemas and scalar field values.
//!
//! A collection fixes the vector dimension, the distance metric and the set
//! of scalar fields its entries may carry. Entries are validated against
//! the schema on insert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use haven_core::error::HavenError;
use haven_core::types::DistanceMetric;

use crate::ivf::IvfParams;

/// Longest text value a scalar field accepts, in bytes.
pub const MAX_TEXT_FIELD_LEN: usize = 65_535;

/// Scalar fields attached to an entry, keyed by field name.
pub type ScalarFields = BTreeMap<String, ScalarValue>;

/// Type of a scalar field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Text,
}

/// A scalar value stored next to a vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::Bool(_) => ScalarKind::Bool,
            ScalarValue::Int(_) => ScalarKind::Int,
            ScalarValue::Float(_) => ScalarKind::Float,
            ScalarValue::Text(_) => ScalarKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

/// Declaration of one scalar field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarField {
    pub name: String,
    pub kind: ScalarKind,
}

/// Schema of a vector collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub fields: Vec<ScalarField>,
    pub ivf: IvfParams,
    /// Free-form description shown in listings.
    pub description: String,
}

impl CollectionSchema {
    /// New L2 collection with no scalar fields and default IVF parameters.
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: DistanceMetric::L2,
            fields: Vec::new(),
            ivf: IvfParams::default(),
            description: String::new(),
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.fields.push(ScalarField {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn with_ivf(mut self, ivf: IvfParams) -> Self {
        self.ivf = ivf;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn field(&self, name: &str) -> Option<&ScalarField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check the schema itself before a collection is created from it.
    pub fn validate(&self) -> Result<(), HavenError> {
        if self.name.trim().is_empty() {
            return Err(HavenError::Validation(
                "Collection name cannot be empty".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(HavenError::Validation(format!(
                "Collection '{}' must have a non-zero dimension",
                self.name
            )));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(HavenError::Validation(format!(
                    "Duplicate scalar field '{}' in collection '{}'",
                    field.name, self.name
                )));
            }
        }
        self.ivf.validate()
    }

    /// Check a vector's length against the collection dimension.
    pub fn check_vector(&self, vector: &[f32]) -> Result<(), HavenError> {
        if vector.len() != self.dimension {
            return Err(HavenError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(HavenError::Validation(
                "Vector contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that every supplied field is declared and of the declared type.
    pub fn check_fields(&self, fields: &ScalarFields) -> Result<(), HavenError> {
        for (name, value) in fields {
            let declared = self.field(name).ok_or_else(|| {
                HavenError::Validation(format!(
                    "Unknown scalar field '{}' for collection '{}'",
                    name, self.name
                ))
            })?;
            if declared.kind != value.kind() {
                return Err(HavenError::Validation(format!(
                    "Scalar field '{}' expects {:?}, got {:?}",
                    name,
                    declared.kind,
                    value.kind()
                )));
            }
            if let ScalarValue::Text(text) = value {
                if text.len() > MAX_TEXT_FIELD_LEN {
                    return Err(HavenError::Validation(format!(
                        "Scalar field '{}' exceeds {} bytes",
                        name, MAX_TEXT_FIELD_LEN
                    )));
                }
            }
        }
        Ok(())
    }
}
