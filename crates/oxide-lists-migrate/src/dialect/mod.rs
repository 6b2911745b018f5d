//! Database dialect implementations.
//!
//! Each dialect knows how to generate SQL for schema changes specific to
//! that database system.

mod sqlite;

pub use sqlite::SqliteDialect;

use oxide_lists::column::{ColumnSchema, SqlType};
use oxide_lists::table::TableDefinition;

/// A physical change to the database schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    /// Creates a table with its indexes and foreign keys.
    CreateTable(TableDefinition),
    /// Adds the columns, indexes and foreign keys of the definition to an
    /// existing table.
    AlterTable(TableDefinition),
    /// Drops a table.
    DropTable {
        /// Table name.
        name: String,
        /// Whether to add IF EXISTS.
        if_exists: bool,
    },
    /// Renames a table.
    RenameTable {
        /// Current name.
        old_name: String,
        /// New name.
        new_name: String,
    },
    /// Drops a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Renames a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Current name.
        old_name: String,
        /// New name.
        new_name: String,
    },
    /// Drops an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Whether to add IF EXISTS.
        if_exists: bool,
    },
    /// Drops a column that holds a foreign key.
    DropForeignKeyColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
}

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Generates SQL for a schema change.
    ///
    /// Statements starting with `--` describe a change the dialect cannot
    /// perform; the executor logs and skips them.
    fn generate_sql(&self, change: &SchemaChange) -> Vec<String>;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Returns whether a column referenced by a foreign key can be dropped.
    fn supports_drop_foreign_key(&self) -> bool;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnSchema) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default_sql) = column.default.to_sql() {
            parts.push(format!("DEFAULT {}", default_sql));
        }

        if let Some(ref check) = column.check {
            parts.push(format!("CHECK ({})", check));
        }

        parts.join(" ")
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
