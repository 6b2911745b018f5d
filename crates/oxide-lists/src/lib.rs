//! Declarative lists and fields.
//!
//! An application describes its record types as *lists*, each with an ordered
//! set of *fields*. `oxide-lists-migrate` turns these declarations into a
//! relational schema and keeps the database in step with them.
//!
//! # Example
//!
//! ```rust
//! use oxide_lists::prelude::*;
//!
//! let registry = ListRegistry::new()
//!     .with(
//!         ListDescriptor::new("Todo")
//!             .table_name("todos")
//!             .field(FieldDescriptor::new("name", FieldKind::Text).required())
//!             .field(FieldDescriptor::relationship("createdBy", "User", false)),
//!     )
//!     .unwrap()
//!     .with(ListDescriptor::new("User").field(FieldDescriptor::new("email", FieldKind::Text).unique()))
//!     .unwrap();
//!
//! let mut table = TableDefinition::new("todos");
//! registry.get("Todo").unwrap().fields[1].materialize(&mut table).unwrap();
//! assert_eq!(table.columns[0].name, "name");
//! ```

pub mod column;
pub mod error;
pub mod field;
pub mod list;
pub mod table;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::column::{
        ColumnSchema, DefaultValue, ForeignKeyAction, ForeignKeySchema, IndexSchema, SqlType,
    };
    pub use crate::error::{ListError, Result};
    pub use crate::field::{attr, FieldDescriptor, FieldKind, RelationshipRef};
    pub use crate::list::{ListDescriptor, ListRegistry, ID_FIELD};
    pub use crate::table::{TableBuilder, TableDefinition};
}
