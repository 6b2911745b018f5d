//! Modification executor.
//!
//! This module plans modifications from the declared lists and applies them
//! against a database, recording the resulting schema in the history table.

use std::collections::HashSet;

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use oxide_lists::column::{ColumnSchema, ForeignKeyAction, ForeignKeySchema, IndexSchema, SqlType};
use oxide_lists::field::{index_name, unique_index_name, FieldDescriptor};
use oxide_lists::list::{ListRegistry, ID_FIELD};
use oxide_lists::table::{TableBuilder, TableDefinition};

use crate::artifacts::PlanArtifacts;
use crate::association::{AssociationResolver, JoinColumn, Placement, TableAssociation};
use crate::builder::{field_snapshot, SnapshotBuilder};
use crate::dialect::{MigrationDialect, SchemaChange};
use crate::error::Result;
use crate::modification::{order, Modification};
use crate::planner::DiffPlanner;
use crate::snapshot::{FieldSnapshot, ListSchema, SchemaSnapshotRecord};
use crate::store::{column_exists, table_exists, SnapshotStore};

/// Resolution state of one pass over a plan.
///
/// Creations and removals are resolved independently: removing one side of a
/// relationship must not stop the other side from being created again.
/// Removals never touch a table or column created earlier in the pass.
struct Pass {
    creates: AssociationResolver,
    removes: AssociationResolver,
    tables: HashSet<String>,
    columns: HashSet<(String, String)>,
}

impl Pass {
    fn new(modifications: &[Modification]) -> Self {
        let creates = modifications.iter().filter_map(|m| match m {
            Modification::CreateAssociation { association } => Some(&association.association),
            _ => None,
        });
        let removes = modifications.iter().filter_map(|m| match m {
            Modification::RemoveAssociation { association } => Some(&association.association),
            _ => None,
        });
        Self {
            creates: AssociationResolver::new(creates),
            removes: AssociationResolver::new(removes),
            tables: HashSet::new(),
            columns: HashSet::new(),
        }
    }

    fn record(&mut self, placement: &Placement) {
        match placement {
            Placement::ForeignKey { table, column, .. } => {
                self.columns.insert((table.clone(), column.clone()));
            }
            Placement::JoinTable { name, .. } => {
                self.tables.insert(name.clone());
            }
        }
    }

    fn created(&self, placement: &Placement) -> bool {
        match placement {
            Placement::ForeignKey { table, column, .. } => {
                self.columns.contains(&(table.clone(), column.clone()))
            }
            Placement::JoinTable { name, .. } => self.tables.contains(name),
        }
    }
}

/// Plans and applies modifications against a database.
pub struct Executor<D: MigrationDialect> {
    pool: SqlitePool,
    dialect: D,
    registry: ListRegistry,
    store: SnapshotStore,
    dry_run: bool,
}

impl<D: MigrationDialect> Executor<D> {
    /// Creates a new executor for the declared lists.
    ///
    /// Fails if the schema history list is not declared.
    pub fn new(pool: SqlitePool, dialect: D, registry: ListRegistry) -> Result<Self> {
        let table = SnapshotBuilder::new(&registry).history_table()?;
        let store = SnapshotStore::new(table);
        Ok(Self {
            pool,
            dialect,
            registry,
            store,
            dry_run: false,
        })
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the snapshot store.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the declared lists.
    #[must_use]
    pub fn registry(&self) -> &ListRegistry {
        &self.registry
    }

    /// Checks if a table exists.
    pub async fn has_table(&self, name: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        table_exists(&mut conn, name).await
    }

    /// Loads every stored snapshot, oldest first.
    pub async fn snapshots(&self) -> Result<Vec<SchemaSnapshotRecord>> {
        let mut conn = self.pool.acquire().await?;
        self.store.list_all(&mut conn).await
    }

    /// Builds the current schema and diffs it against the latest snapshot.
    pub async fn plan(&self) -> Result<PlanArtifacts> {
        let schema = SnapshotBuilder::new(&self.registry).build()?;

        let mut conn = self.pool.acquire().await?;
        let latest = self.store.load_latest(&mut conn).await?;
        drop(conn);

        let modifications = DiffPlanner::new().plan(
            &schema,
            latest.as_ref().map(|record| record.content.as_slice()),
        );
        info!(
            modifications = modifications.len(),
            baseline = ?latest.as_ref().map(|record| record.id),
            "Planned modifications"
        );

        Ok(PlanArtifacts {
            modifications,
            schema,
            baseline: latest.map(|record| record.id),
        })
    }

    /// Plans and applies in one step.
    pub async fn migrate(&self) -> Result<Option<SchemaSnapshotRecord>> {
        let plan = self.plan().await?;
        self.apply(&plan).await
    }

    /// Applies a plan and stores its schema as the new snapshot.
    ///
    /// Every statement and the snapshot itself are written in one
    /// transaction: if any modification fails, nothing is kept. Returns the
    /// stored snapshot, or `None` in dry-run mode and when the latest
    /// snapshot already records the plan's schema.
    pub async fn apply(&self, plan: &PlanArtifacts) -> Result<Option<SchemaSnapshotRecord>> {
        let modifications = order(plan.modifications.clone());

        if self.dry_run {
            for sql in self.sql_for(&modifications)? {
                println!("{};", sql);
            }
            return Ok(None);
        }

        if modifications.is_empty() && self.is_current(&plan.schema).await? {
            info!("Schema is up to date");
            return Ok(None);
        }

        let mut pass = Pass::new(&modifications);
        let mut tx = self.pool.begin().await?;
        self.store.check_baseline(&mut tx, plan.baseline).await?;

        for modification in &modifications {
            info!(modification = %modification, "Applying modification");
            self.apply_one(&mut tx, modification, &mut pass)
                .await
                .map_err(|e| e.while_applying(modification.describe()))?;
        }

        let record = self.store.save(&mut tx, &plan.schema, plan.baseline).await?;
        tx.commit().await?;

        info!(
            snapshot = record.id,
            modifications = modifications.len(),
            "Modifications applied successfully"
        );
        Ok(Some(record))
    }

    /// Returns true if the latest snapshot already records `schema`.
    async fn is_current(&self, schema: &[ListSchema]) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let latest = self.store.load_latest(&mut conn).await?;
        Ok(latest.is_some_and(|record| record.content == schema))
    }

    async fn apply_one(
        &self,
        conn: &mut SqliteConnection,
        modification: &Modification,
        pass: &mut Pass,
    ) -> Result<()> {
        if let Modification::CreateList { schema } = modification {
            if table_exists(conn, schema.table_name()).await? {
                warn!(table = %schema.table_name(), "Dropping existing table before creating it");
            }
        }

        for change in self.changes_for(modification, pass)? {
            if let (
                Modification::CreateAssociation { association },
                SchemaChange::AlterTable(table),
            ) = (modification, &change)
            {
                if self.has_columns(conn, table).await? {
                    warn!(
                        association = %association,
                        table = %table.name,
                        "Foreign key column already exists, its constraint is kept"
                    );
                    continue;
                }
            }

            for sql in self.dialect.generate_sql(&change) {
                debug!(sql = %sql, "Executing SQL");

                // Skip comments
                if sql.starts_with("--") {
                    warn!(comment = %sql, "Skipping comment (unsupported operation)");
                    continue;
                }
                sqlx::query(&sql).execute(&mut *conn).await?;
            }
        }
        Ok(())
    }

    async fn has_columns(&self, conn: &mut SqliteConnection, table: &TableDefinition) -> Result<bool> {
        for column in &table.columns {
            if !column_exists(conn, &table.name, &column.name).await? {
                return Ok(false);
            }
        }
        Ok(!table.columns.is_empty())
    }

    /// Generates SQL for modifications without executing them.
    pub fn sql_for(&self, modifications: &[Modification]) -> Result<Vec<String>> {
        let modifications = order(modifications.to_vec());
        let mut pass = Pass::new(&modifications);

        let mut all_sql = Vec::new();
        for modification in &modifications {
            for change in self.changes_for(modification, &mut pass)? {
                all_sql.extend(self.dialect.generate_sql(&change));
            }
        }
        Ok(all_sql)
    }

    /// Translates one modification into schema changes.
    fn changes_for(
        &self,
        modification: &Modification,
        pass: &mut Pass,
    ) -> Result<Vec<SchemaChange>> {
        let changes = match modification {
            Modification::CreateList { schema } => {
                pass.tables.insert(schema.table_name().to_string());
                let mut table = TableDefinition::new(schema.table_name());
                for field in &schema.fields {
                    self.descriptor(&schema.list_name, field)?
                        .materialize(&mut table)?;
                }
                vec![
                    SchemaChange::DropTable {
                        name: schema.table_name().to_string(),
                        if_exists: true,
                    },
                    SchemaChange::CreateTable(table),
                ]
            }

            Modification::RemoveList { table, .. } if pass.tables.contains(table) => {
                debug!(table = %table, "Table was recreated in this pass, keeping it");
                Vec::new()
            }

            Modification::RemoveList { table, .. } => vec![SchemaChange::DropTable {
                name: table.clone(),
                if_exists: true,
            }],

            Modification::RenameList {
                list,
                from,
                to,
                fields,
            } => {
                let mut changes = Vec::new();
                for field in fields {
                    changes.extend(drop_indexes(from, &field.name));
                }
                changes.push(SchemaChange::RenameTable {
                    old_name: from.clone(),
                    new_name: to.clone(),
                });
                changes.push(SchemaChange::AlterTable(
                    self.indexes_of(list, to, fields)?,
                ));
                changes
            }

            Modification::CreateField { list, table, field } => {
                vec![SchemaChange::AlterTable(self.materialize(list, table, field)?)]
            }

            Modification::RemoveField { table, field, .. } => {
                let mut changes = drop_indexes(table, &field.name);
                changes.push(SchemaChange::DropColumn {
                    table: table.clone(),
                    column: field.name.clone(),
                });
                changes
            }

            Modification::UpdateField {
                list,
                table,
                from,
                to,
            } => {
                warn!(
                    table = %table,
                    column = %from.name,
                    "Recreating column, existing values are discarded"
                );
                let mut changes = drop_indexes(table, &from.name);
                changes.push(SchemaChange::DropColumn {
                    table: table.clone(),
                    column: from.name.clone(),
                });
                changes.push(SchemaChange::AlterTable(self.materialize(list, table, to)?));
                changes
            }

            Modification::RenameField {
                list,
                table,
                from,
                to,
            } => {
                let mut changes = drop_indexes(table, from);
                changes.push(SchemaChange::RenameColumn {
                    table: table.clone(),
                    old_name: from.clone(),
                    new_name: to.name.clone(),
                });
                changes.push(SchemaChange::AlterTable(
                    self.indexes_of(list, table, std::slice::from_ref(to))?,
                ));
                changes
            }

            Modification::CreateAssociation { association } => {
                match pass.creates.claim(association) {
                    Some(placement) => {
                        pass.creates.mark_resolved(association);
                        pass.record(&placement);
                        debug!(association = %association, placement = %placement, "Placing association");
                        create_placement(&placement)
                    }
                    None => {
                        debug!(association = %association, "Other side already materialized");
                        Vec::new()
                    }
                }
            }

            Modification::RemoveAssociation { association } => {
                match pass.removes.claim(association) {
                    Some(placement) if pass.created(&placement) => {
                        pass.removes.mark_resolved(association);
                        debug!(
                            association = %association,
                            placement = %placement,
                            "Placement was recreated in this pass, keeping it"
                        );
                        Vec::new()
                    }
                    Some(placement) => {
                        pass.removes.mark_resolved(association);
                        self.remove_placement(association, &placement)
                    }
                    None => Vec::new(),
                }
            }
        };
        Ok(changes)
    }

    /// Returns the descriptor to materialize `field` with: the declared one
    /// when it still has that shape, otherwise one rebuilt from the snapshot.
    fn descriptor(&self, list: &str, field: &FieldSnapshot) -> Result<FieldDescriptor> {
        let declared = self
            .registry
            .get(list)
            .and_then(|l| l.get_field(&field.name))
            .filter(|d| !d.is_relationship() && field_snapshot(d).same_shape(field));
        match declared {
            Some(descriptor) => Ok(descriptor.clone()),
            None => field.descriptor(),
        }
    }

    fn materialize(&self, list: &str, table: &str, field: &FieldSnapshot) -> Result<TableDefinition> {
        let mut definition = TableDefinition::new(table);
        self.descriptor(list, field)?.materialize(&mut definition)?;
        Ok(definition)
    }

    /// Collects only the indexes `fields` materialize on `table`.
    fn indexes_of(&self, list: &str, table: &str, fields: &[FieldSnapshot]) -> Result<TableDefinition> {
        let mut definition = TableDefinition::new(table);
        for field in fields {
            let mut scratch = TableDefinition::new(table);
            self.descriptor(list, field)?.materialize(&mut scratch)?;
            for index in scratch.indexes {
                definition.add_index(index);
            }
        }
        Ok(definition)
    }

    fn remove_placement(
        &self,
        association: &TableAssociation,
        placement: &Placement,
    ) -> Vec<SchemaChange> {
        match placement {
            Placement::ForeignKey { table, column, .. } => {
                if !self.dialect.supports_drop_foreign_key() {
                    warn!(
                        association = %association,
                        table = %table,
                        column = %column,
                        dialect = self.dialect.name(),
                        "Foreign key column is left in place"
                    );
                }
                vec![SchemaChange::DropForeignKeyColumn {
                    table: table.clone(),
                    column: column.clone(),
                }]
            }
            Placement::JoinTable { name, .. } => vec![SchemaChange::DropTable {
                name: name.clone(),
                if_exists: true,
            }],
        }
    }
}

/// Drops the indexes a field may have on `table`.
fn drop_indexes(table: &str, column: &str) -> Vec<SchemaChange> {
    vec![
        SchemaChange::DropIndex {
            name: unique_index_name(table, column),
            if_exists: true,
        },
        SchemaChange::DropIndex {
            name: index_name(table, column),
            if_exists: true,
        },
    ]
}

fn create_placement(placement: &Placement) -> Vec<SchemaChange> {
    match placement {
        Placement::ForeignKey {
            table,
            column,
            references_table,
        } => {
            let mut definition = TableDefinition::new(table);
            definition.add_column(ColumnSchema::new(column, SqlType::BigInt));
            definition.add_foreign_key(
                ForeignKeySchema::new(
                    format!("{}_{}_fk", table, column),
                    column,
                    references_table,
                    ID_FIELD,
                )
                .on_delete(ForeignKeyAction::SetNull),
            );
            vec![SchemaChange::AlterTable(definition)]
        }
        Placement::JoinTable { name, left, right } => {
            let mut definition = TableDefinition::new(name);
            add_join_column(&mut definition, left);
            add_join_column(&mut definition, right);
            vec![
                SchemaChange::DropTable {
                    name: name.clone(),
                    if_exists: true,
                },
                SchemaChange::CreateTable(definition),
            ]
        }
    }
}

fn add_join_column(definition: &mut TableDefinition, join: &JoinColumn) {
    let table = definition.name.clone();
    definition.add_column(ColumnSchema::new(&join.column, SqlType::BigInt).not_null());
    definition.add_foreign_key(
        ForeignKeySchema::new(
            format!("{}_{}_fk", table, join.column),
            &join.column,
            &join.references_table,
            ID_FIELD,
        )
        .on_delete(ForeignKeyAction::Cascade),
    );
    definition.add_index(IndexSchema::new(
        index_name(&table, &join.column),
        vec![join.column.clone()],
    ));
}
