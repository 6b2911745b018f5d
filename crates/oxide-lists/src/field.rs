//! Field declarations.
//!
//! A [`FieldDescriptor`] is one attribute of a list: a path, a kind and an open
//! map of attributes. Scalar fields know how to materialize themselves onto a
//! [`TableBuilder`]; relationship fields are resolved by the migration engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::column::{ColumnSchema, DefaultValue, IndexSchema, SqlType};
use crate::error::{ListError, Result};
use crate::table::TableBuilder;

/// Well-known attribute names.
pub mod attr {
    /// Marks the field as the list's primary key.
    pub const IS_PRIMARY_KEY: &str = "isPrimaryKey";
    /// Makes the column NOT NULL.
    pub const IS_REQUIRED: &str = "isRequired";
    /// Adds a unique index on the column.
    pub const IS_UNIQUE: &str = "isUnique";
    /// Adds a plain index on the column.
    pub const IS_INDEXED: &str = "isIndexed";
    /// Column default.
    pub const DEFAULT_VALUE: &str = "defaultValue";
    /// Decimal precision.
    pub const PRECISION: &str = "precision";
    /// Decimal scale.
    pub const SCALE: &str = "scale";
    /// Allowed values of a select field.
    pub const OPTIONS: &str = "options";
    /// Relationship target, `List` or `List.field`.
    pub const REF: &str = "ref";
    /// Whether a relationship points at many records.
    pub const MANY: &str = "many";
}

const DEFAULT_PRECISION: u8 = 18;
const DEFAULT_SCALE: u8 = 4;

/// The kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Auto-incrementing integer primary key.
    AutoIncrement,
    /// Free text.
    Text,
    /// 32-bit integer.
    Integer,
    /// Double precision float.
    Float,
    /// Fixed-point decimal.
    Decimal,
    /// Boolean.
    Checkbox,
    /// Timestamp.
    DateTime,
    /// Date without time.
    CalendarDay,
    /// One value out of a fixed set of options.
    Select,
    /// UUID.
    Uuid,
    /// Reference to another list.
    Relationship,
}

impl FieldKind {
    /// Returns the kind name as recorded in schema snapshots.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AutoIncrement => "AutoIncrement",
            Self::Text => "Text",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Decimal => "Decimal",
            Self::Checkbox => "Checkbox",
            Self::DateTime => "DateTime",
            Self::CalendarDay => "CalendarDay",
            Self::Select => "Select",
            Self::Uuid => "Uuid",
            Self::Relationship => "Relationship",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target of a relationship field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipRef<'a> {
    /// Referenced list key.
    pub list: &'a str,
    /// Field on the referenced list pointing back, for two-sided relationships.
    pub field: Option<&'a str>,
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field path, also the column name.
    pub path: String,
    /// Field kind.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Kind-specific configuration.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl FieldDescriptor {
    /// Creates a field without attributes.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            path: path.into(),
            kind,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a relationship field. `target` is `List` or `List.field`.
    #[must_use]
    pub fn relationship(path: impl Into<String>, target: impl Into<String>, many: bool) -> Self {
        Self::new(path, FieldKind::Relationship)
            .attribute(attr::REF, Value::String(target.into()))
            .attribute(attr::MANY, Value::Bool(many))
    }

    /// Sets an arbitrary attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(self) -> Self {
        self.attribute(attr::IS_REQUIRED, Value::Bool(true))
    }

    /// Marks the field as unique.
    #[must_use]
    pub fn unique(self) -> Self {
        self.attribute(attr::IS_UNIQUE, Value::Bool(true))
    }

    /// Marks the field as indexed.
    #[must_use]
    pub fn indexed(self) -> Self {
        self.attribute(attr::IS_INDEXED, Value::Bool(true))
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(self, value: Value) -> Self {
        self.attribute(attr::DEFAULT_VALUE, value)
    }

    /// Returns true when `key` is set to `true`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.attributes.get(key), Some(Value::Bool(true)))
    }

    /// Returns true for relationship fields.
    #[must_use]
    pub fn is_relationship(&self) -> bool {
        self.kind == FieldKind::Relationship
    }

    /// Returns true for the list's primary key field.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.kind == FieldKind::AutoIncrement || self.flag(attr::IS_PRIMARY_KEY)
    }

    /// Parses the `ref` attribute of a relationship field.
    pub fn relationship_ref(&self) -> Result<RelationshipRef<'_>> {
        let target = match self.attributes.get(attr::REF) {
            Some(Value::String(target)) if !target.is_empty() => target.as_str(),
            _ => return Err(self.invalid(attr::REF, "expected a non-empty list reference")),
        };

        let reference = match target.split_once('.') {
            Some((list, field)) if !list.is_empty() && !field.is_empty() => RelationshipRef {
                list,
                field: Some(field),
            },
            Some(_) => return Err(self.invalid(attr::REF, "expected `List` or `List.field`")),
            None => RelationshipRef {
                list: target,
                field: None,
            },
        };
        Ok(reference)
    }

    /// Adds this field's column and indexes to `table`.
    pub fn materialize(&self, table: &mut dyn TableBuilder) -> Result<()> {
        let sql_type = match self.kind {
            FieldKind::AutoIncrement => SqlType::BigInt,
            FieldKind::Text | FieldKind::Select => SqlType::Text,
            FieldKind::Integer => SqlType::Integer,
            FieldKind::Float => SqlType::Double,
            FieldKind::Decimal => SqlType::Decimal(
                self.small_number(attr::PRECISION, DEFAULT_PRECISION)?,
                self.small_number(attr::SCALE, DEFAULT_SCALE)?,
            ),
            FieldKind::Checkbox => SqlType::Boolean,
            FieldKind::DateTime => SqlType::Timestamp,
            FieldKind::CalendarDay => SqlType::Date,
            FieldKind::Uuid => SqlType::Uuid,
            FieldKind::Relationship => return Err(ListError::NotMaterializable(self.path.clone())),
        };

        let mut column = ColumnSchema::new(&self.path, sql_type);
        if self.kind == FieldKind::AutoIncrement {
            column = column.primary_key().auto_increment();
        } else if self.flag(attr::IS_PRIMARY_KEY) {
            column = column.primary_key();
        }
        if self.flag(attr::IS_REQUIRED) {
            column = column.not_null();
        }
        if let Some(value) = self.attributes.get(attr::DEFAULT_VALUE) {
            let default = DefaultValue::from_json(value)
                .ok_or_else(|| self.invalid(attr::DEFAULT_VALUE, "expected a scalar value"))?;
            column = column.default(default);
        }
        if self.kind == FieldKind::Select {
            column = column.check(self.select_check()?);
        }

        let table_name = table.table_name().to_string();
        table.add_column(column);

        if self.flag(attr::IS_UNIQUE) {
            table.add_index(
                IndexSchema::new(
                    unique_index_name(&table_name, &self.path),
                    vec![self.path.clone()],
                )
                .unique(),
            );
        }
        if self.flag(attr::IS_INDEXED) {
            table.add_index(IndexSchema::new(
                index_name(&table_name, &self.path),
                vec![self.path.clone()],
            ));
        }

        Ok(())
    }

    fn small_number(&self, key: &str, fallback: u8) -> Result<u8> {
        match self.attributes.get(key) {
            None => Ok(fallback),
            Some(value) => value
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| self.invalid(key, "expected an integer between 0 and 255")),
        }
    }

    fn select_check(&self) -> Result<String> {
        let options = match self.attributes.get(attr::OPTIONS) {
            Some(Value::Array(options)) if !options.is_empty() => options,
            _ => return Err(self.invalid(attr::OPTIONS, "expected a non-empty array")),
        };

        let mut values = Vec::with_capacity(options.len());
        for option in options {
            let value = match option {
                Value::String(s) => s.as_str(),
                Value::Object(map) => match map.get("value") {
                    Some(Value::String(s)) => s.as_str(),
                    _ => return Err(self.invalid(attr::OPTIONS, "option objects need a `value`")),
                },
                _ => return Err(self.invalid(attr::OPTIONS, "options must be strings")),
            };
            values.push(format!("'{}'", value.replace('\'', "''")));
        }

        Ok(format!("\"{}\" IN ({})", self.path, values.join(", ")))
    }

    fn invalid(&self, attribute: &str, message: &str) -> ListError {
        ListError::InvalidAttribute {
            field: self.path.clone(),
            attribute: attribute.to_string(),
            message: message.to_string(),
        }
    }
}

/// Name of the plain index created for an indexed field.
#[must_use]
pub fn index_name(table: &str, column: &str) -> String {
    format!("{}_{}_index", table, column)
}

/// Name of the unique index created for a unique field.
#[must_use]
pub fn unique_index_name(table: &str, column: &str) -> String {
    format!("{}_{}_unique", table, column)
}
