//! Structural modifications and their ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::association::TableAssociation;
use crate::snapshot::{FieldSnapshot, ListSchema};

/// What a modification acts upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModObject {
    /// A whole list (table).
    List,
    /// A scalar field (column).
    Field,
    /// A relationship (foreign key or join table).
    Association,
}

/// What a modification does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModOp {
    /// Creates the object.
    Create,
    /// Removes the object.
    Remove,
    /// Changes the object's shape.
    Update,
    /// Changes the object's name.
    Rename,
}

impl fmt::Display for ModObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::Field => "field",
            Self::Association => "association",
        })
    }
}

impl fmt::Display for ModOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Rename => "rename",
        })
    }
}

/// A single structural change to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Modification {
    /// Creates the table of a list, dropping any existing table of that name.
    #[serde(rename = "list/create")]
    CreateList {
        /// Target structure of the list.
        schema: ListSchema,
    },

    /// Drops the table of a list that is no longer declared.
    #[serde(rename = "list/remove")]
    RemoveList {
        /// List key.
        list: String,
        /// Table to drop.
        table: String,
    },

    /// Renames the table of a list.
    #[serde(rename = "list/rename")]
    RenameList {
        /// List key.
        list: String,
        /// Previous table name.
        from: String,
        /// New table name.
        to: String,
        /// Fields of the list as last applied, whose indexes follow the table.
        #[serde(default)]
        fields: Vec<FieldSnapshot>,
    },

    /// Adds a column.
    #[serde(rename = "field/create")]
    CreateField {
        /// List key.
        list: String,
        /// Table holding the column.
        table: String,
        /// The new field.
        field: FieldSnapshot,
    },

    /// Drops a column.
    #[serde(rename = "field/remove")]
    RemoveField {
        /// List key.
        list: String,
        /// Table holding the column.
        table: String,
        /// The field as it was last applied.
        field: FieldSnapshot,
    },

    /// Changes a column's type or options.
    #[serde(rename = "field/update")]
    UpdateField {
        /// List key.
        list: String,
        /// Table holding the column.
        table: String,
        /// The field as it was last applied.
        from: FieldSnapshot,
        /// The field as it is now declared.
        to: FieldSnapshot,
    },

    /// Renames a column whose shape is unchanged.
    #[serde(rename = "field/rename")]
    RenameField {
        /// List key.
        list: String,
        /// Table holding the column.
        table: String,
        /// Previous field name.
        from: String,
        /// The field as it is now declared.
        to: FieldSnapshot,
    },

    /// Materializes a relationship.
    #[serde(rename = "association/create")]
    CreateAssociation {
        /// The relationship and its tables.
        association: TableAssociation,
    },

    /// Removes a relationship.
    #[serde(rename = "association/remove")]
    RemoveAssociation {
        /// The relationship as it was last applied.
        association: TableAssociation,
    },
}

impl Modification {
    /// Returns what this modification acts upon.
    #[must_use]
    pub fn object(&self) -> ModObject {
        match self {
            Self::CreateList { .. } | Self::RemoveList { .. } | Self::RenameList { .. } => {
                ModObject::List
            }
            Self::CreateField { .. }
            | Self::RemoveField { .. }
            | Self::UpdateField { .. }
            | Self::RenameField { .. } => ModObject::Field,
            Self::CreateAssociation { .. } | Self::RemoveAssociation { .. } => {
                ModObject::Association
            }
        }
    }

    /// Returns what this modification does.
    #[must_use]
    pub fn op(&self) -> ModOp {
        match self {
            Self::CreateList { .. } | Self::CreateField { .. } | Self::CreateAssociation { .. } => {
                ModOp::Create
            }
            Self::RemoveList { .. } | Self::RemoveField { .. } | Self::RemoveAssociation { .. } => {
                ModOp::Remove
            }
            Self::UpdateField { .. } => ModOp::Update,
            Self::RenameList { .. } | Self::RenameField { .. } => ModOp::Rename,
        }
    }

    /// Sort key used by [`order`].
    #[must_use]
    pub fn rank(&self) -> (ModObject, ModOp) {
        (self.object(), self.op())
    }

    /// Returns the association carried by this modification, if any.
    #[must_use]
    pub fn association(&self) -> Option<&TableAssociation> {
        match self {
            Self::CreateAssociation { association } | Self::RemoveAssociation { association } => {
                Some(association)
            }
            _ => None,
        }
    }

    /// Returns a human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        let target = match self {
            Self::CreateList { schema } => format!("{} ({})", schema.list_name, schema.table_name()),
            Self::RemoveList { list, table } => format!("{} ({})", list, table),
            Self::RenameList { list, from, to, .. } => format!("{} ({} -> {})", list, from, to),
            Self::CreateField { list, field, .. } | Self::RemoveField { list, field, .. } => {
                format!("{}.{}", list, field.name)
            }
            Self::UpdateField { list, to, .. } => format!("{}.{}", list, to.name),
            Self::RenameField { list, from, to, .. } => {
                format!("{}.{} -> {}", list, from, to.name)
            }
            Self::CreateAssociation { association } | Self::RemoveAssociation { association } => {
                association.to_string()
            }
        };
        format!("{}/{} {}", self.object(), self.op(), target)
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Orders modifications so lists come before fields and fields before
/// associations, and within each, creates before removes before updates
/// before renames. Ties keep their input order.
#[must_use]
pub fn order(mut modifications: Vec<Modification>) -> Vec<Modification> {
    modifications.sort_by_key(Modification::rank);
    modifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{AssociationSnapshot, Cardinality};
    use serde_json::json;

    fn tags() -> TableAssociation {
        TableAssociation::new(
            AssociationSnapshot {
                source_list: "Post".to_string(),
                source_field: "tags".to_string(),
                cardinality: Cardinality::ManyToMany,
                target_list: "Tag".to_string(),
                target_field: None,
            },
            "posts",
            "tags",
        )
    }

    fn field(list: &str, name: &str) -> Modification {
        Modification::CreateField {
            list: list.to_string(),
            table: list.to_lowercase(),
            field: FieldSnapshot::new("Text", name),
        }
    }

    #[test]
    fn test_order_ranks() {
        let input = vec![
            Modification::CreateAssociation {
                association: tags(),
            },
            Modification::RenameField {
                list: "Post".to_string(),
                table: "posts".to_string(),
                from: "name".to_string(),
                to: FieldSnapshot::new("Text", "title"),
            },
            field("Post", "body"),
            Modification::RemoveList {
                list: "Old".to_string(),
                table: "old".to_string(),
            },
            Modification::CreateList {
                schema: ListSchema::new("Tag").table("tags"),
            },
        ];

        let kinds: Vec<String> = order(input)
            .iter()
            .map(|m| format!("{}/{}", m.object(), m.op()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                "list/create",
                "list/remove",
                "field/create",
                "field/rename",
                "association/create"
            ]
        );
    }

    #[test]
    fn test_order_is_stable() {
        let input = vec![field("Post", "b"), field("Post", "a"), field("Tag", "c")];
        let ordered = order(input.clone());
        assert_eq!(ordered, input);
    }

    #[test]
    fn test_list_create_precedes_association_create() {
        let input = vec![
            Modification::CreateAssociation {
                association: tags(),
            },
            Modification::CreateList {
                schema: ListSchema::new("Post").table("posts"),
            },
            Modification::CreateList {
                schema: ListSchema::new("Tag").table("tags"),
            },
        ];
        let ordered = order(input);
        let association = ordered
            .iter()
            .position(|m| m.object() == ModObject::Association)
            .unwrap();
        let last_list = ordered
            .iter()
            .rposition(|m| m.object() == ModObject::List)
            .unwrap();
        assert!(last_list < association);
    }

    #[test]
    fn test_serde_tags() {
        let modification = Modification::RemoveList {
            list: "Old".to_string(),
            table: "old".to_string(),
        };
        let value = serde_json::to_value(&modification).unwrap();
        assert_eq!(
            value,
            json!({"kind": "list/remove", "list": "Old", "table": "old"})
        );

        let association = serde_json::to_value(Modification::CreateAssociation {
            association: tags(),
        })
        .unwrap();
        assert_eq!(association["kind"], "association/create");
        assert_eq!(association["association"]["cardinality"], "N:N");
        assert_eq!(association["association"]["sourceTable"], "posts");
    }

    #[test]
    fn test_describe() {
        let modification = Modification::RenameField {
            list: "User".to_string(),
            table: "users".to_string(),
            from: "name".to_string(),
            to: FieldSnapshot::new("Text", "fullName"),
        };
        assert_eq!(modification.describe(), "field/rename User.name -> fullName");
    }
}
