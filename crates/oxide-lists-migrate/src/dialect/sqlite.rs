//! SQLite dialect for schema changes.
//!
//! SQLite has limited ALTER TABLE support: foreign keys can only be declared
//! inline when a column is added, and a column referenced by a foreign key
//! constraint cannot be dropped without recreating the table.

use oxide_lists::column::{ColumnSchema, DefaultValue, ForeignKeySchema, IndexSchema, SqlType};
use oxide_lists::table::TableDefinition;

use super::{MigrationDialect, SchemaChange};

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generates SQL for creating a table and its indexes.
    fn create_table_sql(&self, table: &TableDefinition) -> Vec<String> {
        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        definitions.extend(
            table
                .foreign_keys
                .iter()
                .map(|fk| self.foreign_key_constraint(fk)),
        );

        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&self.quote_identifier(&table.name));
        sql.push_str(" (\n  ");
        sql.push_str(&definitions.join(",\n  "));
        sql.push_str("\n)");

        let mut statements = vec![sql];
        statements.extend(
            table
                .indexes
                .iter()
                .map(|index| self.create_index_sql(&table.name, index)),
        );
        statements
    }

    /// Generates SQL for adding the columns and indexes of `table` to an
    /// existing table.
    fn alter_table_sql(&self, table: &TableDefinition) -> Vec<String> {
        let mut statements = Vec::new();

        for column in &table.columns {
            statements.extend(self.add_column_sql(table, column));
        }

        for fk in &table.foreign_keys {
            if table.get_column(&fk.column).is_none() {
                statements.push(format!(
                    "-- Foreign key {} cannot be added after table creation in SQLite. \
                     Table recreation required.",
                    fk.name
                ));
            }
        }

        statements.extend(
            table
                .indexes
                .iter()
                .map(|index| self.create_index_sql(&table.name, index)),
        );
        statements
    }

    /// Generates SQL for adding a column, with its foreign key inline.
    fn add_column_sql(&self, table: &TableDefinition, column: &ColumnSchema) -> Vec<String> {
        let mut statements = Vec::new();
        let mut column = column.clone();

        // SQLite refuses NOT NULL columns without a default on ALTER TABLE.
        if !column.nullable && matches!(column.default, DefaultValue::None | DefaultValue::Null) {
            statements.push(format!(
                "-- Column {}.{} added as nullable: NOT NULL requires a default in SQLite.",
                table.name, column.name
            ));
            column.nullable = true;
        }

        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(&table.name),
            self.column_definition(&column)
        );
        if let Some(fk) = table.foreign_key_for(&column.name) {
            sql.push_str(&self.references_clause(fk));
        }
        statements.push(sql);
        statements
    }

    fn foreign_key_constraint(&self, fk: &ForeignKeySchema) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}){}",
            self.quote_identifier(&fk.name),
            self.quote_identifier(&fk.column),
            self.references_clause(fk)
        )
    }

    fn references_clause(&self, fk: &ForeignKeySchema) -> String {
        format!(
            " REFERENCES {} ({}) ON DELETE {}",
            self.quote_identifier(&fk.references_table),
            self.quote_identifier(&fk.references_column),
            fk.on_delete.to_sql()
        )
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP TABLE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for dropping a column (SQLite 3.35.0+).
    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for renaming a column (SQLite 3.25.0+).
    fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, table: &str, index: &IndexSchema) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");

        let quoted: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');
        sql
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP INDEX ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn generate_sql(&self, change: &SchemaChange) -> Vec<String> {
        match change {
            SchemaChange::CreateTable(table) => self.create_table_sql(table),

            SchemaChange::AlterTable(table) => self.alter_table_sql(table),

            SchemaChange::DropTable { name, if_exists } => {
                vec![self.drop_table_sql(name, *if_exists)]
            }

            SchemaChange::RenameTable { old_name, new_name } => {
                vec![self.rename_table_sql(old_name, new_name)]
            }

            SchemaChange::DropColumn { table, column } => {
                vec![self.drop_column_sql(table, column)]
            }

            SchemaChange::RenameColumn {
                table,
                old_name,
                new_name,
            } => vec![self.rename_column_sql(table, old_name, new_name)],

            SchemaChange::DropIndex { name, if_exists } => {
                vec![self.drop_index_sql(name, *if_exists)]
            }

            SchemaChange::DropForeignKeyColumn { table, column } => {
                vec![format!(
                    "-- Foreign key column {}.{} cannot be dropped in SQLite. \
                     Table recreation required.",
                    table, column
                )]
            }
        }
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "INTEGER".to_string(),
            SqlType::Timestamp | SqlType::Date => "TEXT".to_string(),
            SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) => "NUMERIC".to_string(),
            SqlType::Uuid => "TEXT".to_string(),
        }
    }

    fn supports_drop_foreign_key(&self) -> bool {
        false
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }
}
