//! Table-definition context that fields materialize onto.

use crate::column::{ColumnSchema, ForeignKeySchema, IndexSchema};

/// A unit of work describing additions to a single table.
///
/// Fields never talk to the database directly: they describe their columns,
/// indexes and foreign keys through this trait, and the migration engine
/// decides whether the result becomes a `CREATE TABLE` or an `ALTER TABLE`.
pub trait TableBuilder {
    /// Returns the name of the table being defined.
    fn table_name(&self) -> &str;

    /// Adds a column.
    fn add_column(&mut self, column: ColumnSchema);

    /// Adds an index.
    fn add_index(&mut self, index: IndexSchema);

    /// Adds a foreign key constraint.
    fn add_foreign_key(&mut self, foreign_key: ForeignKeySchema);
}

/// Collects everything added to one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns in the order they were added.
    pub columns: Vec<ColumnSchema>,
    /// Indexes in the order they were added.
    pub indexes: Vec<IndexSchema>,
    /// Foreign keys in the order they were added.
    pub foreign_keys: Vec<ForeignKeySchema>,
}

impl TableDefinition {
    /// Creates an empty definition for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true if nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.indexes.is_empty() && self.foreign_keys.is_empty()
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the foreign key declared on `column`, if any.
    #[must_use]
    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKeySchema> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

impl TableBuilder for TableDefinition {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn add_column(&mut self, column: ColumnSchema) {
        self.columns.push(column);
    }

    fn add_index(&mut self, index: IndexSchema) {
        self.indexes.push(index);
    }

    fn add_foreign_key(&mut self, foreign_key: ForeignKeySchema) {
        self.foreign_keys.push(foreign_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::SqlType;

    #[test]
    fn test_collects_in_order() {
        let mut table = TableDefinition::new("posts");
        assert!(table.is_empty());

        table.add_column(ColumnSchema::new("title", SqlType::Text));
        table.add_column(ColumnSchema::new("author", SqlType::BigInt));
        table.add_foreign_key(ForeignKeySchema::new("posts_author_fk", "author", "users", "id"));

        assert_eq!(table.table_name(), "posts");
        assert_eq!(table.columns[1].name, "author");
        assert!(table.get_column("title").is_some());
        assert_eq!(table.foreign_key_for("author").unwrap().references_table, "users");
        assert!(table.foreign_key_for("title").is_none());
    }
}
