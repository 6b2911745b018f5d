//! Snapshot-diffing schema migrations for declarative lists.
//!
//! `oxide-lists-migrate` keeps a database in step with the lists declared
//! through `oxide-lists`. Instead of hand-written migration files, every run
//! compares the declared schema with the last schema it applied, where:
//! - Relationship fields become foreign keys or join tables, once per pair
//! - Field renames are inferred from the shape of unmatched fields
//! - A whole run is applied in a single transaction or not at all
//!
//! # Architecture
//!
//! - **Builder** - Turns list declarations into a [`snapshot::ListSchema`] per list
//! - **Store** - Persists applied schemas in the schema history table
//! - **Planner** - Diffs two schemas into [`modification::Modification`]s
//! - **Association** - Classifies relationships and decides where they live
//! - **Executor** - Orders and applies modifications, then stores the schema
//! - **Dialect** - Database-specific SQL generation
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_lists::prelude::*;
//! use oxide_lists_migrate::prelude::*;
//!
//! let registry = ListRegistry::new()
//!     .with(history_list())?
//!     .with(
//!         ListDescriptor::new("Todo")
//!             .field(FieldDescriptor::new("name", FieldKind::Text).required())
//!             .field(FieldDescriptor::relationship("createdBy", "User", false)),
//!     )?
//!     .with(ListDescriptor::new("User"))?;
//!
//! let executor = Executor::new(pool, SqliteDialect::new(), registry)?;
//! let plan = executor.plan().await?;
//! executor.apply(&plan).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Compute the plan into compiled/
//! oxide-lists-migrate create-modifications
//!
//! # Apply the computed plan
//! oxide-lists-migrate apply-modifications
//!
//! # Plan and apply in one step
//! oxide-lists-migrate migrate
//!
//! # List stored schema snapshots
//! oxide-lists-migrate show-snapshots
//! ```

pub mod artifacts;
pub mod association;
pub mod builder;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod modification;
pub mod planner;
pub mod snapshot;
pub mod store;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::artifacts::PlanArtifacts;
    pub use crate::association::{
        classify, AssociationResolver, JoinColumn, Placement, TableAssociation,
    };
    pub use crate::builder::SnapshotBuilder;
    pub use crate::dialect::{MigrationDialect, SchemaChange, SqliteDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::Executor;
    pub use crate::modification::{order, ModObject, ModOp, Modification};
    pub use crate::planner::DiffPlanner;
    pub use crate::snapshot::{
        AssociationSnapshot, Cardinality, FieldSnapshot, ListSchema, SchemaSnapshotRecord,
    };
    pub use crate::store::{history_list, SnapshotStore, HISTORY_LIST, HISTORY_TABLE};
}
