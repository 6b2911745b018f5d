//! Relationship resolution.
//!
//! Relationship fields do not become columns of their own list. Each one is
//! classified into an [`AssociationSnapshot`] and later placed as either a
//! foreign key column or a join table. A relationship declared on both sides
//! appears twice in a plan; the [`AssociationResolver`] makes sure only the
//! first side processed materializes it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use oxide_lists::field::{attr, FieldDescriptor};
use oxide_lists::list::{ListDescriptor, ListRegistry, ID_FIELD};

use crate::error::{MigrateError, Result};
use crate::snapshot::{AssociationSnapshot, Cardinality};

/// Classifies a relationship field of `list`.
pub fn classify(
    registry: &ListRegistry,
    list: &ListDescriptor,
    field: &FieldDescriptor,
) -> Result<AssociationSnapshot> {
    let reference = field.relationship_ref()?;
    let target = registry.get(reference.list).ok_or_else(|| {
        MigrateError::configuration(format!(
            "Relationship '{}.{}' references unknown list '{}'",
            list.key, field.path, reference.list
        ))
    })?;
    let source_many = field.flag(attr::MANY);

    let (cardinality, target_field) = match reference.field {
        None => {
            let cardinality = if source_many {
                Cardinality::ManyToMany
            } else {
                Cardinality::ManyToOne
            };
            (cardinality, None)
        }
        Some(name) => {
            let back = target.get_field(name).ok_or_else(|| {
                MigrateError::configuration(format!(
                    "Relationship '{}.{}' references unknown field '{}.{}'",
                    list.key, field.path, target.key, name
                ))
            })?;
            if !back.is_relationship() {
                return Err(MigrateError::configuration(format!(
                    "Field '{}.{}' is not a relationship",
                    target.key, name
                )));
            }
            let back_ref = back.relationship_ref()?;
            if back_ref.list != list.key || back_ref.field != Some(field.path.as_str()) {
                return Err(MigrateError::configuration(format!(
                    "Relationship '{}.{}' must reference '{}.{}' back",
                    target.key, name, list.key, field.path
                )));
            }
            (
                Cardinality::from_sides(source_many, back.flag(attr::MANY)),
                Some(name.to_string()),
            )
        }
    };

    Ok(AssociationSnapshot {
        source_list: list.key.clone(),
        source_field: field.path.clone(),
        cardinality,
        target_list: target.key.clone(),
        target_field,
    })
}

/// An association together with the tables of both lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAssociation {
    /// The association.
    #[serde(flatten)]
    pub association: AssociationSnapshot,
    /// Table of the declaring list.
    pub source_table: String,
    /// Table of the referenced list.
    pub target_table: String,
}

impl TableAssociation {
    /// Binds an association to its tables.
    #[must_use]
    pub fn new(
        association: AssociationSnapshot,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        Self {
            association,
            source_table: source_table.into(),
            target_table: target_table.into(),
        }
    }

    /// Decides where the relationship physically lives.
    ///
    /// Standalone relationships are placed from the declaring side only. For
    /// two-sided relationships both sides compute the same placement.
    #[must_use]
    pub fn placement(&self) -> Placement {
        let a = &self.association;
        let source_fk = || Placement::ForeignKey {
            table: self.source_table.clone(),
            column: a.source_field.clone(),
            references_table: self.target_table.clone(),
        };

        let Some(target_field) = a.target_field.as_deref() else {
            return match a.cardinality {
                Cardinality::ManyToOne | Cardinality::OneToOne => source_fk(),
                Cardinality::ManyToMany | Cardinality::OneToMany => Placement::JoinTable {
                    name: format!("{}_{}", a.source_list, a.source_field),
                    left: JoinColumn::new(&a.source_list, "left", &self.source_table),
                    right: JoinColumn::new(&a.target_list, "right", &self.target_table),
                },
            };
        };

        let target_fk = || Placement::ForeignKey {
            table: self.target_table.clone(),
            column: target_field.to_string(),
            references_table: self.source_table.clone(),
        };
        let source_first = (a.source_list.as_str(), a.source_field.as_str())
            <= (a.target_list.as_str(), target_field);

        match a.cardinality {
            Cardinality::ManyToOne => source_fk(),
            Cardinality::OneToMany => target_fk(),
            Cardinality::OneToOne if source_first => source_fk(),
            Cardinality::OneToOne => target_fk(),
            Cardinality::ManyToMany => {
                let source = (
                    a.source_list.as_str(),
                    a.source_field.as_str(),
                    self.source_table.as_str(),
                );
                let target = (
                    a.target_list.as_str(),
                    target_field,
                    self.target_table.as_str(),
                );
                let (left, right) = if source_first {
                    (source, target)
                } else {
                    (target, source)
                };
                Placement::JoinTable {
                    name: format!("{}_{}_{}_{}", left.0, left.1, right.0, right.1),
                    left: JoinColumn::new(left.0, "left", left.2),
                    right: JoinColumn::new(right.0, "right", right.2),
                }
            }
        }
    }
}

impl fmt::Display for TableAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.association, f)
    }
}

/// One foreign key column of a join table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    /// Column name.
    pub column: String,
    /// Table referenced by the column.
    pub references_table: String,
}

impl JoinColumn {
    fn new(list: &str, side: &str, table: &str) -> Self {
        Self {
            column: format!("{}_{}_{}", list, side, ID_FIELD),
            references_table: table.to_string(),
        }
    }
}

/// Physical structure realising an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// A nullable column referencing the primary key of another table.
    ForeignKey {
        /// Table holding the column.
        table: String,
        /// Column name.
        column: String,
        /// Referenced table.
        references_table: String,
    },
    /// A table linking both sides.
    JoinTable {
        /// Join table name.
        name: String,
        /// Column referencing the first side.
        left: JoinColumn,
        /// Column referencing the second side.
        right: JoinColumn,
    },
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignKey {
                table,
                column,
                references_table,
            } => write!(f, "foreign key {}.{} -> {}", table, column, references_table),
            Self::JoinTable { name, .. } => write!(f, "join table {}", name),
        }
    }
}

/// Tracks which two-sided relationships have already been materialized
/// during one pass over a plan.
#[derive(Debug, Default)]
pub struct AssociationResolver {
    resolved: HashMap<(String, String), bool>,
}

impl AssociationResolver {
    /// Registers every two-sided association of the pass, unresolved.
    pub fn new<'a>(associations: impl IntoIterator<Item = &'a AssociationSnapshot>) -> Self {
        let resolved = associations
            .into_iter()
            .filter(|a| a.is_bidirectional())
            .map(|a| ((a.source_list.clone(), a.source_field.clone()), false))
            .collect();
        Self { resolved }
    }

    /// Returns where `association` must be materialized, or `None` when its
    /// other side was already materialized in this pass.
    #[must_use]
    pub fn claim(&self, association: &TableAssociation) -> Option<Placement> {
        if let Some((list, field)) = association.association.target_key() {
            let paired = (list.to_string(), field.to_string());
            if self.resolved.get(&paired).copied().unwrap_or(false) {
                return None;
            }
        }
        Some(association.placement())
    }

    /// Records that the declaring side of `association` has been acted upon.
    pub fn mark_resolved(&mut self, association: &TableAssociation) {
        let a = &association.association;
        if a.is_bidirectional() {
            self.resolved
                .insert((a.source_list.clone(), a.source_field.clone()), true);
        }
    }

    /// Claims and resolves every association in order, returning the
    /// structures to materialize.
    pub fn resolve_all<'a>(
        associations: impl IntoIterator<Item = &'a TableAssociation> + Clone,
    ) -> Vec<Placement> {
        let mut resolver = Self::new(associations.clone().into_iter().map(|a| &a.association));
        let mut placements = Vec::new();
        for association in associations {
            if let Some(placement) = resolver.claim(association) {
                placements.push(placement);
                resolver.mark_resolved(association);
            }
        }
        placements
    }
}
