//! Snapshot builder.
//!
//! Walks the declared lists and produces the schema the database should have.

use serde_json::Value;

use oxide_lists::field::{attr, FieldDescriptor};
use oxide_lists::list::{ListDescriptor, ListRegistry};

use crate::association::classify;
use crate::error::{MigrateError, Result};
use crate::snapshot::{FieldSnapshot, ListSchema, Options, TABLE_NAME_OPTION};
use crate::store::{HISTORY_COLUMNS, HISTORY_LIST};

/// Attributes that affect the physical shape of a field.
pub const SHAPE_ATTRIBUTES: &[&str] = &[
    attr::IS_PRIMARY_KEY,
    attr::IS_REQUIRED,
    attr::IS_UNIQUE,
    attr::IS_INDEXED,
    attr::DEFAULT_VALUE,
    attr::PRECISION,
    attr::SCALE,
    attr::OPTIONS,
];

/// Builds [`ListSchema`]s from list declarations.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotBuilder<'a> {
    registry: &'a ListRegistry,
}

impl<'a> SnapshotBuilder<'a> {
    /// Creates a builder over `registry`.
    #[must_use]
    pub fn new(registry: &'a ListRegistry) -> Self {
        Self { registry }
    }

    /// Returns the table backing the schema history list.
    ///
    /// Fails when the history list is not declared or lacks a column the
    /// snapshot store writes.
    pub fn history_table(&self) -> Result<&'a str> {
        let list = self.registry.get(HISTORY_LIST).ok_or_else(|| {
            MigrateError::configuration(format!(
                "The schema history list '{}' must be declared",
                HISTORY_LIST
            ))
        })?;
        for column in HISTORY_COLUMNS {
            if list.get_field(column).is_none() {
                return Err(MigrateError::configuration(format!(
                    "The schema history list '{}' is missing field '{}'",
                    HISTORY_LIST, column
                )));
            }
        }
        Ok(list.table())
    }

    /// Builds the current schema, one entry per list in declaration order.
    pub fn build(&self) -> Result<Vec<ListSchema>> {
        self.history_table()?;
        self.registry.iter().map(|list| self.build_list(list)).collect()
    }

    fn build_list(&self, list: &ListDescriptor) -> Result<ListSchema> {
        let mut table_options: Options = list.config.clone();
        table_options.insert(
            TABLE_NAME_OPTION.to_string(),
            Value::String(list.table().to_string()),
        );

        let mut schema = ListSchema::new(&list.key);
        schema.table_options = table_options;

        for field in &list.fields {
            if field.is_relationship() {
                schema
                    .associations
                    .push(classify(self.registry, list, field)?);
            } else {
                schema.fields.push(field_snapshot(field));
            }
        }

        Ok(schema)
    }
}

/// Captures the shape-relevant part of a field declaration.
#[must_use]
pub fn field_snapshot(field: &FieldDescriptor) -> FieldSnapshot {
    let options = SHAPE_ATTRIBUTES
        .iter()
        .filter_map(|key| {
            field
                .attributes
                .get(*key)
                .map(|value| ((*key).to_string(), value.clone()))
        })
        .collect();

    FieldSnapshot {
        kind: field.kind.name().to_string(),
        name: field.path.clone(),
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Cardinality;
    use crate::store::history_list;
    use oxide_lists::field::FieldKind;
    use serde_json::json;

    fn registry() -> ListRegistry {
        ListRegistry::new()
            .with(history_list())
            .unwrap()
            .with(
                ListDescriptor::new("Todo")
                    .table_name("todos")
                    .config("schemaDoc", json!("Things to do"))
                    .field(
                        FieldDescriptor::new("name", FieldKind::Text)
                            .required()
                            .attribute("label", json!("Name")),
                    )
                    .field(FieldDescriptor::relationship("createdBy", "User", false)),
            )
            .unwrap()
            .with(
                ListDescriptor::new("User")
                    .field(FieldDescriptor::new("email", FieldKind::Text).unique()),
            )
            .unwrap()
    }

    #[test]
    fn test_build_lists_in_order() {
        let registry = registry();
        let schema = SnapshotBuilder::new(&registry).build().unwrap();

        let names: Vec<&str> = schema.iter().map(|l| l.list_name.as_str()).collect();
        assert_eq!(names, vec![HISTORY_LIST, "Todo", "User"]);
    }

    #[test]
    fn test_relationships_become_associations() {
        let registry = registry();
        let schema = SnapshotBuilder::new(&registry).build().unwrap();
        let todo = &schema[1];

        assert_eq!(todo.table_name(), "todos");
        assert_eq!(todo.table_options["schemaDoc"], json!("Things to do"));
        assert!(todo.get_field("createdBy").is_none());
        assert_eq!(todo.associations.len(), 1);
        assert_eq!(todo.associations[0].cardinality, Cardinality::ManyToOne);
        assert_eq!(todo.associations[0].target_list, "User");
    }

    #[test]
    fn test_options_keep_shape_attributes_only() {
        let registry = registry();
        let schema = SnapshotBuilder::new(&registry).build().unwrap();
        let name = schema[1].get_field("name").unwrap();

        assert_eq!(name.kind, "Text");
        assert_eq!(name.options.len(), 1);
        assert_eq!(name.options[attr::IS_REQUIRED], json!(true));

        let id = schema[1].get_field("id").unwrap();
        assert_eq!(id.kind, "AutoIncrement");
    }

    #[test]
    fn test_missing_history_list() {
        let registry = ListRegistry::new()
            .with(ListDescriptor::new("Todo"))
            .unwrap();
        let err = SnapshotBuilder::new(&registry).build().unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn test_incomplete_history_list() {
        let registry = ListRegistry::new()
            .with(ListDescriptor::new(HISTORY_LIST))
            .unwrap();
        let err = SnapshotBuilder::new(&registry).history_table().unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }
}
