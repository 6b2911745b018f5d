//! List declarations and the registry holding them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ListError, Result};
use crate::field::{FieldDescriptor, FieldKind};

/// Path of the implicit primary key field.
pub const ID_FIELD: &str = "id";

/// A declared list (record type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDescriptor {
    /// List key, unique across the registry.
    pub key: String,
    /// Table backing the list. Defaults to the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Extra table options.
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ListDescriptor {
    /// Creates a list with the implicit `id` primary key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            table_name: None,
            config: BTreeMap::new(),
            fields: vec![FieldDescriptor::new(ID_FIELD, FieldKind::AutoIncrement)],
        }
    }

    /// Sets the table name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Sets a table option.
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.key)
    }

    /// Gets a field by path.
    #[must_use]
    pub fn get_field(&self, path: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Checks field uniqueness and keeps a single primary key: the implicit
    /// `id` gives way to a declared key and is inserted when no field claims it.
    fn normalize(&mut self) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.path == field.path) {
                return Err(ListError::DuplicateField {
                    list: self.key.clone(),
                    field: field.path.clone(),
                });
            }
        }

        let custom_key = self
            .fields
            .iter()
            .any(|f| f.path != ID_FIELD && f.is_primary_key());
        if custom_key {
            self.fields.retain(|f| !is_implicit_key(f));
        }

        if !self.fields.iter().any(FieldDescriptor::is_primary_key) {
            if self.get_field(ID_FIELD).is_some() {
                return Err(ListError::DuplicateField {
                    list: self.key.clone(),
                    field: ID_FIELD.to_string(),
                });
            }
            self.fields
                .insert(0, FieldDescriptor::new(ID_FIELD, FieldKind::AutoIncrement));
        }
        Ok(())
    }
}

/// Returns true for the `id` field inserted by [`ListDescriptor::new`].
fn is_implicit_key(field: &FieldDescriptor) -> bool {
    field.path == ID_FIELD && field.kind == FieldKind::AutoIncrement && field.attributes.is_empty()
}

#[derive(Deserialize)]
struct Declarations {
    lists: Vec<ListDescriptor>,
}

/// Ordered collection of declared lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRegistry {
    lists: Vec<ListDescriptor>,
}

impl ListRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a list, keeping declaration order.
    pub fn register(&mut self, mut list: ListDescriptor) -> Result<()> {
        if self.get(&list.key).is_some() {
            return Err(ListError::DuplicateList(list.key));
        }
        list.normalize()?;
        self.lists.push(list);
        Ok(())
    }

    /// Registers a list, builder style.
    pub fn with(mut self, list: ListDescriptor) -> Result<Self> {
        self.register(list)?;
        Ok(self)
    }

    /// Parses a declaration document of the form `{"lists": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let declarations: Declarations = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for list in declarations.lists {
            registry.register(list)?;
        }
        Ok(registry)
    }

    /// Reads a declaration document from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Gets a list by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ListDescriptor> {
        self.lists.iter().find(|l| l.key == key)
    }

    /// Iterates lists in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ListDescriptor> {
        self.lists.iter()
    }

    /// Returns the number of lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Returns true if no list is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::attr;

    #[test]
    fn test_new_list_has_primary_key() {
        let list = ListDescriptor::new("Todo");
        assert_eq!(list.fields.len(), 1);
        assert!(list.fields[0].is_primary_key());
        assert_eq!(list.table(), "Todo");
        assert_eq!(list.clone().table_name("todos").table(), "todos");
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ListRegistry::new();
        registry.register(ListDescriptor::new("Todo")).unwrap();
        let err = registry.register(ListDescriptor::new("Todo")).unwrap_err();
        assert!(matches!(err, ListError::DuplicateList(_)));

        let list = ListDescriptor::new("User")
            .field(FieldDescriptor::new("name", FieldKind::Text))
            .field(FieldDescriptor::new("name", FieldKind::Text));
        let err = registry.register(list).unwrap_err();
        assert!(matches!(err, ListError::DuplicateField { .. }));
    }

    #[test]
    fn test_from_json_inserts_primary_key() {
        let registry = ListRegistry::from_json_str(
            r#"{
                "lists": [
                    {
                        "key": "Todo",
                        "tableName": "todos",
                        "fields": [
                            { "path": "name", "type": "Text", "isRequired": true },
                            { "path": "createdBy", "type": "Relationship", "ref": "User" }
                        ]
                    },
                    { "key": "User", "fields": [ { "path": "email", "type": "Text" } ] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        let todo = registry.get("Todo").unwrap();
        assert_eq!(todo.table(), "todos");
        assert_eq!(todo.fields[0].path, ID_FIELD);
        assert_eq!(todo.fields.len(), 3);
        assert!(todo.get_field("createdBy").unwrap().is_relationship());

        let keys: Vec<&str> = registry.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["Todo", "User"]);
    }

    #[test]
    fn test_custom_primary_key_replaces_implicit_id() {
        let registry = ListRegistry::new()
            .with(
                ListDescriptor::new("Country")
                    .field(
                        FieldDescriptor::new("code", FieldKind::Text)
                            .attribute(attr::IS_PRIMARY_KEY, Value::Bool(true)),
                    )
                    .field(FieldDescriptor::new("name", FieldKind::Text)),
            )
            .unwrap();

        let country = registry.get("Country").unwrap();
        let paths: Vec<&str> = country.fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["code", "name"]);
        assert_eq!(country.fields.iter().filter(|f| f.is_primary_key()).count(), 1);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = ListRegistry::from_json_str(r#"{"lists": [{"key": 1}]}"#).unwrap_err();
        assert!(matches!(err, ListError::Json(_)));
    }
}
