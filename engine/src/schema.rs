//! Change validation.
//!
//! Every queued change must be a non-empty list of JSON objects carrying an
//! identifier. Categories may additionally register a [`CategorySchema`]
//! whose field definitions are checked before anything is queued.

use crate::record::{json_type_name, parse_timestamp};
use crate::{error::Result, Category, Document, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Value kinds a schema field can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// RFC 3339 text or integer milliseconds
    Timestamp,
    /// Arbitrary nested JSON
    Json,
}

impl FieldType {
    /// Name used in validation errors, in the same style as JSON value kinds.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Int => "Int",
            FieldType::Float => "Float",
            FieldType::Bool => "Bool",
            FieldType::Timestamp => "Timestamp",
            FieldType::Json => "Json",
        }
    }

    /// Whether a non-null value is of this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => parse_timestamp(value).is_some(),
            FieldType::Json => true,
        }
    }
}

/// A named field rule. `null` counts as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            required,
        }
    }

    /// Field that must be present and non-null.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type, true)
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type, false)
    }

    /// Check the value found under this field's name, if any.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        match value.filter(|v| !v.is_null()) {
            None if self.required => Err(Error::MissingRequiredField(self.name.clone())),
            None => Ok(()),
            Some(v) if self.field_type.accepts(v) => Ok(()),
            Some(v) => Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: self.field_type.name().to_string(),
                got: json_type_name(v).to_string(),
            }),
        }
    }
}

/// Field rules for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySchema {
    /// Category name
    pub name: Category,
    /// Field definitions
    pub fields: Vec<FieldDef>,
}

impl CategorySchema {
    /// Create a new category schema.
    pub fn new(name: impl Into<Category>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Validate one record against this schema.
    pub fn validate_record(&self, record: &Document) -> Result<()> {
        for field in &self.fields {
            field.validate(record.get(&field.name))?;
        }
        Ok(())
    }
}

/// Optional per-category schemas. Categories without one accept any record
/// that has an identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Category schemas by name
    pub categories: HashMap<Category, CategorySchema>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a category to the schema.
    pub fn add_category(&mut self, category: CategorySchema) -> &mut Self {
        self.categories.insert(category.name.clone(), category);
        self
    }

    /// Builder-style method to add a category.
    pub fn with_category(mut self, category: CategorySchema) -> Self {
        self.add_category(category);
        self
    }

    /// Get a category schema by name.
    pub fn get_category(&self, name: &str) -> Option<&CategorySchema> {
        self.categories.get(name)
    }

    /// Check a change set for `category` and convert it into documents.
    pub fn validate_changes(&self, category: &str, changes: Vec<Value>) -> Result<Vec<Document>> {
        if category.trim().is_empty() {
            return Err(Error::InvalidCategory(category.to_string()));
        }
        if changes.is_empty() {
            return Err(Error::InvalidPayload(
                "changes must contain at least one record".into(),
            ));
        }

        let category_schema = self.categories.get(category);
        let mut records = Vec::with_capacity(changes.len());

        for (index, change) in changes.into_iter().enumerate() {
            let record = Document::from_value(change).map_err(|e| match e {
                Error::InvalidPayload(msg) => {
                    Error::InvalidPayload(format!("record at index {index}: {msg}"))
                }
                other => other,
            })?;

            if record.id().is_none() {
                return Err(Error::MissingIdentifier { index });
            }
            if let Some(schema) = category_schema {
                schema.validate_record(&record)?;
            }
            records.push(record);
        }

        Ok(records)
    }
}
