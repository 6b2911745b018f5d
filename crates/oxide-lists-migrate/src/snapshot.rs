//! Schema snapshot types.
//!
//! A snapshot is the target shape of every list at one point in time. Snapshots
//! are compared against each other to plan modifications and are persisted as
//! JSON in the schema history table.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use oxide_lists::field::{FieldDescriptor, FieldKind};

use crate::error::{MigrateError, Result};

/// Table option holding the table name.
pub const TABLE_NAME_OPTION: &str = "tableName";

/// Open attribute map.
pub type Options = BTreeMap<String, Value>;

/// Shape of a scalar field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Field kind name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Field path.
    pub name: String,
    /// Shape-relevant attributes.
    #[serde(default)]
    pub options: Options,
}

impl FieldSnapshot {
    /// Creates a field snapshot without options.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            options: Options::new(),
        }
    }

    /// Sets an option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Returns true if both fields have the same kind and deeply equal options,
    /// regardless of their names.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.kind == other.kind && options_equal(&self.options, &other.options)
    }

    /// Rebuilds a field descriptor from this snapshot, so that a field which
    /// is no longer declared can still be materialized.
    pub fn descriptor(&self) -> Result<FieldDescriptor> {
        let kind: FieldKind = serde_json::from_value(Value::String(self.kind.clone()))
            .map_err(|_| {
                MigrateError::configuration(format!(
                    "Unknown kind '{}' for field '{}'",
                    self.kind, self.name
                ))
            })?;
        let mut descriptor = FieldDescriptor::new(&self.name, kind);
        descriptor.attributes = self.options.clone();
        Ok(descriptor)
    }
}

/// Compares two option maps key by key, recursing into nested values.
///
/// Numbers compare by value, so `1` and `1.0` are equal.
#[must_use]
pub fn options_equal(a: &Options, b: &Options) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => a == b,
    }
}

/// Relationship multiplicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// One to one.
    #[serde(rename = "1:1")]
    OneToOne,
    /// One to many: the target side holds the foreign key.
    #[serde(rename = "1:N")]
    OneToMany,
    /// Many to one: the declaring side holds the foreign key.
    #[serde(rename = "N:1")]
    ManyToOne,
    /// Many to many: a join table links both sides.
    #[serde(rename = "N:N")]
    ManyToMany,
}

impl Cardinality {
    /// Derives the cardinality from whether each side points at many records.
    #[must_use]
    pub fn from_sides(source_many: bool, target_many: bool) -> Self {
        match (source_many, target_many) {
            (true, true) => Self::ManyToMany,
            (true, false) => Self::OneToMany,
            (false, true) => Self::ManyToOne,
            (false, false) => Self::OneToOne,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneToOne => "1:1",
            Self::OneToMany => "1:N",
            Self::ManyToOne => "N:1",
            Self::ManyToMany => "N:N",
        })
    }
}

/// A relationship field, promoted out of the list's scalar fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSnapshot {
    /// List declaring the relationship.
    pub source_list: String,
    /// Relationship field on the declaring list.
    pub source_field: String,
    /// Relationship multiplicity.
    pub cardinality: Cardinality,
    /// Referenced list.
    pub target_list: String,
    /// Field on the referenced list pointing back, for two-sided relationships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
}

impl AssociationSnapshot {
    /// Returns true if the relationship is declared on both sides.
    #[must_use]
    pub fn is_bidirectional(&self) -> bool {
        self.target_field.is_some()
    }

    /// Logical identity of the declaring side.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.source_list, &self.source_field)
    }

    /// Logical identity of the other side, for two-sided relationships.
    #[must_use]
    pub fn target_key(&self) -> Option<(&str, &str)> {
        self.target_field
            .as_deref()
            .map(|field| (self.target_list.as_str(), field))
    }
}

impl fmt::Display for AssociationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} ({}) -> {}",
            self.source_list, self.source_field, self.cardinality, self.target_list
        )?;
        if let Some(field) = &self.target_field {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

/// Target structure of one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSchema {
    /// List key.
    pub list_name: String,
    /// Table options, including the table name.
    #[serde(default)]
    pub table_options: Options,
    /// Scalar fields in declaration order.
    pub fields: Vec<FieldSnapshot>,
    /// Relationship fields.
    #[serde(default)]
    pub associations: Vec<AssociationSnapshot>,
}

impl ListSchema {
    /// Creates an empty list schema.
    #[must_use]
    pub fn new(list_name: impl Into<String>) -> Self {
        Self {
            list_name: list_name.into(),
            table_options: Options::new(),
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Sets the table name option.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_options
            .insert(TABLE_NAME_OPTION.to_string(), Value::String(name.into()));
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldSnapshot) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends an association.
    #[must_use]
    pub fn association(mut self, association: AssociationSnapshot) -> Self {
        self.associations.push(association);
        self
    }

    /// Returns the backing table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table_options
            .get(TABLE_NAME_OPTION)
            .and_then(Value::as_str)
            .unwrap_or(&self.list_name)
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldSnapshot> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Looks up a list schema by name.
#[must_use]
pub fn find_list<'a>(schema: &'a [ListSchema], name: &str) -> Option<&'a ListSchema> {
    schema.iter().find(|l| l.list_name == name)
}

/// One applied generation of the schema, as stored in the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSnapshotRecord {
    /// Row id in the history table.
    pub id: i64,
    /// Schema of every list.
    pub content: Vec<ListSchema>,
    /// When the snapshot was stored.
    pub created_at: DateTime<Utc>,
    /// Whether this is the active generation.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Options {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_options_equal_nested() {
        let a = options(json!({"isRequired": true, "defaultValue": {"x": [1, 2]}}));
        let b = options(json!({"defaultValue": {"x": [1, 2]}, "isRequired": true}));
        assert!(options_equal(&a, &b));

        let c = options(json!({"isRequired": true, "defaultValue": {"x": [1, 3]}}));
        assert!(!options_equal(&a, &c));
    }

    #[test]
    fn test_options_equal_key_sets() {
        let a = options(json!({"isRequired": true}));
        let b = options(json!({"isRequired": true, "isUnique": false}));
        assert!(!options_equal(&a, &b));
        assert!(!options_equal(&b, &a));
        assert!(options_equal(&Options::new(), &Options::new()));
    }

    #[test]
    fn test_options_equal_numbers_by_value() {
        let a = options(json!({"scale": 2}));
        let b = options(json!({"scale": 2.0}));
        assert!(options_equal(&a, &b));
    }

    #[test]
    fn test_same_shape_ignores_name() {
        let a = FieldSnapshot::new("Text", "name").option("isRequired", json!(true));
        let b = FieldSnapshot::new("Text", "fullName").option("isRequired", json!(true));
        let c = FieldSnapshot::new("Integer", "name").option("isRequired", json!(true));
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn test_descriptor_from_snapshot() {
        let field = FieldSnapshot::new("Decimal", "price").option("scale", json!(2));
        let descriptor = field.descriptor().unwrap();
        assert_eq!(descriptor.kind, FieldKind::Decimal);
        assert_eq!(descriptor.path, "price");
        assert_eq!(descriptor.attributes["scale"], json!(2));

        let unknown = FieldSnapshot::new("Markdown", "body").descriptor();
        assert!(matches!(unknown, Err(MigrateError::Configuration(_))));
    }

    #[test]
    fn test_cardinality_serde() {
        assert_eq!(
            serde_json::to_value(Cardinality::OneToMany).unwrap(),
            json!("1:N")
        );
        let parsed: Cardinality = serde_json::from_value(json!("N:N")).unwrap();
        assert_eq!(parsed, Cardinality::ManyToMany);
        assert_eq!(Cardinality::from_sides(false, true), Cardinality::ManyToOne);
    }

    #[test]
    fn test_list_schema_table_name() {
        let list = ListSchema::new("Todo");
        assert_eq!(list.table_name(), "Todo");
        assert_eq!(list.table("todos").table_name(), "todos");
    }

    #[test]
    fn test_list_schema_without_associations_parses() {
        let list: ListSchema = serde_json::from_value(json!({
            "listName": "Todo",
            "tableOptions": {"tableName": "todos"},
            "fields": [{"type": "Text", "name": "name", "options": {}}]
        }))
        .unwrap();
        assert!(list.associations.is_empty());
        assert_eq!(list.fields[0].kind, "Text");
    }
}
