//! Diff planner.
//!
//! Compares the current schema with the last applied one and emits the
//! modifications that take the database from one to the other.

use tracing::debug;

use crate::association::{Placement, TableAssociation};
use crate::modification::{order, Modification};
use crate::snapshot::{find_list, AssociationSnapshot, FieldSnapshot, ListSchema};

/// Plans modifications between two schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPlanner;

impl DiffPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the ordered modifications turning `cached` into `current`.
    ///
    /// Without a cached schema every list and relationship is created.
    #[must_use]
    pub fn plan(&self, current: &[ListSchema], cached: Option<&[ListSchema]>) -> Vec<Modification> {
        let mut modifications = Vec::new();

        let Some(cached) = cached else {
            for list in current {
                create_list(current, list, &mut modifications);
            }
            return order(modifications);
        };

        for list in current {
            match find_list(cached, &list.list_name) {
                None => create_list(current, list, &mut modifications),
                Some(previous) => {
                    diff_list(current, cached, previous, list, &mut modifications);
                }
            }
        }

        for previous in cached {
            if find_list(current, &previous.list_name).is_none() {
                debug!(list = %previous.list_name, "List no longer declared");
                if current
                    .iter()
                    .any(|list| list.table_name() == previous.table_name())
                {
                    debug!(table = %previous.table_name(), "Table taken over by another list");
                } else {
                    modifications.push(Modification::RemoveList {
                        list: previous.list_name.clone(),
                        table: previous.table_name().to_string(),
                    });
                }
                for association in &previous.associations {
                    modifications.push(Modification::RemoveAssociation {
                        association: bind(cached, association),
                    });
                }
            }
        }

        order(settle(current, cached, modifications))
    }
}

/// Drops association changes that leave the physical structure untouched.
///
/// A relationship whose declaration changes without moving its column or
/// join table (made two-sided, or described from the other side) needs no
/// statement. Foreign key columns on a table recreated by the plan are kept.
fn settle(
    current: &[ListSchema],
    cached: &[ListSchema],
    modifications: Vec<Modification>,
) -> Vec<Modification> {
    let before = placements(cached);
    let after = placements(current);
    let rebuilt: Vec<String> = modifications
        .iter()
        .filter_map(|m| match m {
            Modification::CreateList { schema } => Some(schema.table_name().to_string()),
            _ => None,
        })
        .collect();

    modifications
        .into_iter()
        .filter(|m| match m {
            Modification::CreateAssociation { association } => {
                let placement = association.placement();
                let on_rebuilt = matches!(
                    &placement,
                    Placement::ForeignKey { table, .. } if rebuilt.contains(table)
                );
                on_rebuilt || !before.contains(&placement)
            }
            Modification::RemoveAssociation { association } => {
                !after.contains(&association.placement())
            }
            _ => true,
        })
        .collect()
}

fn placements(schema: &[ListSchema]) -> Vec<Placement> {
    schema
        .iter()
        .flat_map(|list| {
            list.associations
                .iter()
                .map(|association| bind(schema, association).placement())
        })
        .collect()
}

fn create_list(schema: &[ListSchema], list: &ListSchema, out: &mut Vec<Modification>) {
    out.push(Modification::CreateList {
        schema: list.clone(),
    });
    for association in &list.associations {
        out.push(Modification::CreateAssociation {
            association: bind(schema, association),
        });
    }
}

/// Attaches table names to an association using the schema it belongs to.
fn bind(schema: &[ListSchema], association: &AssociationSnapshot) -> TableAssociation {
    let table = |name: &str| {
        find_list(schema, name).map_or_else(|| name.to_string(), |l| l.table_name().to_string())
    };
    TableAssociation::new(
        association.clone(),
        table(&association.source_list),
        table(&association.target_list),
    )
}

fn diff_list(
    current: &[ListSchema],
    cached: &[ListSchema],
    previous: &ListSchema,
    list: &ListSchema,
    out: &mut Vec<Modification>,
) {
    if previous.table_name() != list.table_name() {
        out.push(Modification::RenameList {
            list: list.list_name.clone(),
            from: previous.table_name().to_string(),
            to: list.table_name().to_string(),
            fields: previous.fields.clone(),
        });
    }

    diff_fields(&list.list_name, list.table_name(), &previous.fields, &list.fields, out);

    for association in &list.associations {
        match previous
            .associations
            .iter()
            .find(|a| a.source_field == association.source_field)
        {
            None => out.push(Modification::CreateAssociation {
                association: bind(current, association),
            }),
            Some(old) if old != association => {
                out.push(Modification::RemoveAssociation {
                    association: bind(cached, old),
                });
                out.push(Modification::CreateAssociation {
                    association: bind(current, association),
                });
            }
            Some(_) => {}
        }
    }

    for old in &previous.associations {
        if !list
            .associations
            .iter()
            .any(|a| a.source_field == old.source_field)
        {
            out.push(Modification::RemoveAssociation {
                association: bind(cached, old),
            });
        }
    }
}

/// Classifies every field of one list.
///
/// Fields are first matched by name. The unmatched fields left on each side
/// are then paired by their position among the unmatched ones. A pair is a
/// rename when both have the same kind and options and the field either kept
/// its declared position or carries options identifying it; any other pair is
/// a removal plus a creation. Unpaired leftovers are removed or created.
fn diff_fields(
    list: &str,
    table: &str,
    previous: &[FieldSnapshot],
    current: &[FieldSnapshot],
    out: &mut Vec<Modification>,
) {
    for field in current {
        if let Some(old) = previous.iter().find(|f| f.name == field.name) {
            if !old.same_shape(field) {
                out.push(Modification::UpdateField {
                    list: list.to_string(),
                    table: table.to_string(),
                    from: old.clone(),
                    to: field.clone(),
                });
            }
        }
    }

    let removed: Vec<(usize, &FieldSnapshot)> = previous
        .iter()
        .enumerate()
        .filter(|(_, f)| !current.iter().any(|c| c.name == f.name))
        .collect();
    let added: Vec<(usize, &FieldSnapshot)> = current
        .iter()
        .enumerate()
        .filter(|(_, f)| !previous.iter().any(|p| p.name == f.name))
        .collect();

    let remove = |field: &FieldSnapshot| Modification::RemoveField {
        list: list.to_string(),
        table: table.to_string(),
        field: field.clone(),
    };
    let create = |field: &FieldSnapshot| Modification::CreateField {
        list: list.to_string(),
        table: table.to_string(),
        field: field.clone(),
    };

    for (&(old_position, old), &(new_position, field)) in removed.iter().zip(&added) {
        let identified = old_position == new_position || !old.options.is_empty();
        if identified && old.same_shape(field) {
            out.push(Modification::RenameField {
                list: list.to_string(),
                table: table.to_string(),
                from: old.name.clone(),
                to: field.clone(),
            });
        } else {
            out.push(remove(old));
            out.push(create(field));
        }
    }

    for &(_, old) in removed.iter().skip(added.len()) {
        out.push(remove(old));
    }
    for &(_, field) in added.iter().skip(removed.len()) {
        out.push(create(field));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modification::{ModObject, ModOp};
    use crate::snapshot::Cardinality;
    use serde_json::json;

    fn text(name: &str) -> FieldSnapshot {
        FieldSnapshot::new("Text", name)
    }

    fn number(name: &str) -> FieldSnapshot {
        FieldSnapshot::new("Integer", name)
    }

    fn list(name: &str, fields: Vec<FieldSnapshot>) -> ListSchema {
        let mut schema = ListSchema::new(name).table(name.to_lowercase());
        schema.fields = fields;
        schema
    }

    fn association(
        source: (&str, &str),
        cardinality: Cardinality,
        target: (&str, Option<&str>),
    ) -> AssociationSnapshot {
        AssociationSnapshot {
            source_list: source.0.to_string(),
            source_field: source.1.to_string(),
            cardinality,
            target_list: target.0.to_string(),
            target_field: target.1.map(str::to_string),
        }
    }

    fn blog() -> Vec<ListSchema> {
        vec![
            list("Post", vec![text("title")])
                .association(association(
                    ("Post", "tags"),
                    Cardinality::ManyToMany,
                    ("Tag", Some("posts")),
                ))
                .association(association(
                    ("Post", "author"),
                    Cardinality::ManyToOne,
                    ("User", None),
                )),
            list("Tag", vec![text("label")]).association(association(
                ("Tag", "posts"),
                Cardinality::ManyToMany,
                ("Post", Some("tags")),
            )),
            list("User", vec![text("email")]),
        ]
    }

    fn kinds(modifications: &[Modification]) -> Vec<(ModObject, ModOp)> {
        modifications.iter().map(Modification::rank).collect()
    }

    #[test]
    fn test_bootstrap_creates_everything() {
        let current = blog();
        let plan = DiffPlanner::new().plan(&current, None);

        let lists = plan
            .iter()
            .filter(|m| matches!(m, Modification::CreateList { .. }))
            .count();
        let associations = plan
            .iter()
            .filter(|m| matches!(m, Modification::CreateAssociation { .. }))
            .count();
        assert_eq!(lists, 3);
        assert_eq!(associations, 3);
        assert_eq!(plan.len(), 6);

        match &plan[3] {
            Modification::CreateAssociation { association } => {
                assert_eq!(association.source_table, "post");
                assert_eq!(association.target_table, "tag");
            }
            other => panic!("Expected CreateAssociation, got {:?}", other),
        }
    }

    #[test]
    fn test_planning_is_idempotent() {
        let cached = blog();
        let mut current = blog();
        current[0].fields.push(text("body"));
        current[2].fields[0] = text("mail");

        let planner = DiffPlanner::new();
        let first = planner.plan(&current, Some(&cached));
        let second = planner.plan(&current, Some(&cached));
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_unchanged_schema_yields_nothing() {
        let plan = DiffPlanner::new().plan(&blog(), Some(&blog()));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_exact_names_resolve_before_positions() {
        let cached = vec![list("Item", vec![text("A"), text("B"), number("C")])];
        let current = vec![list("Item", vec![text("A"), number("C"), text("D")])];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert_eq!(plan.len(), 2);
        match (&plan[0], &plan[1]) {
            (
                Modification::CreateField { field: created, .. },
                Modification::RemoveField { field: removed, .. },
            ) => {
                assert_eq!(created.name, "D");
                assert_eq!(removed.name, "B");
            }
            other => panic!("Expected create then remove, got {:?}", other),
        }
    }

    #[test]
    fn test_rename_detection() {
        let required = |name: &str| text(name).option("isRequired", json!(true));
        let cached = vec![list("User", vec![required("name")])];
        let current = vec![list("User", vec![required("fullName")])];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert_eq!(plan.len(), 1);
        match &plan[0] {
            Modification::RenameField {
                table, from, to, ..
            } => {
                assert_eq!(table, "user");
                assert_eq!(from, "name");
                assert_eq!(to.name, "fullName");
            }
            other => panic!("Expected RenameField, got {:?}", other),
        }
    }

    #[test]
    fn test_moved_field_with_same_options_is_renamed() {
        let required = |name: &str| text(name).option("isRequired", json!(true));
        let cached = vec![list(
            "User",
            vec![number("id"), number("x"), required("name")],
        )];
        let current = vec![list(
            "User",
            vec![number("id"), required("fullName"), number("x")],
        )];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        let described: Vec<String> = plan.iter().map(Modification::describe).collect();
        assert_eq!(described, vec!["field/rename User.name -> fullName"]);
    }

    #[test]
    fn test_leftovers_pair_by_residual_position() {
        let cached = vec![list("Item", vec![text("a"), number("b"), text("c")])];
        let current = vec![list("Item", vec![number("renamed"), text("d"), text("e")])];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        let described: Vec<String> = plan.iter().map(Modification::describe).collect();
        assert_eq!(
            described,
            vec![
                "field/create Item.renamed",
                "field/create Item.d",
                "field/remove Item.a",
                "field/remove Item.b",
                "field/rename Item.c -> e",
            ]
        );
    }

    #[test]
    fn test_rename_with_retype_is_remove_and_create() {
        let cached = vec![list("User", vec![text("age")])];
        let current = vec![list("User", vec![number("years")])];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert_eq!(
            kinds(&plan),
            vec![
                (ModObject::Field, ModOp::Create),
                (ModObject::Field, ModOp::Remove)
            ]
        );
    }

    #[test]
    fn test_changed_options_update() {
        let cached = vec![list("User", vec![text("email")])];
        let current = vec![list(
            "User",
            vec![text("email").option("isUnique", json!(true))],
        )];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        match plan.as_slice() {
            [Modification::UpdateField { from, to, .. }] => {
                assert!(from.options.is_empty());
                assert_eq!(to.options["isUnique"], json!(true));
            }
            other => panic!("Expected one UpdateField, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_fields_are_created_and_removed() {
        let cached = vec![list("Item", vec![text("a"), text("gone")])];
        let current = vec![list("Item", vec![text("a")])];
        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert_eq!(kinds(&plan), vec![(ModObject::Field, ModOp::Remove)]);

        let plan = DiffPlanner::new().plan(&cached, Some(&current));
        assert_eq!(kinds(&plan), vec![(ModObject::Field, ModOp::Create)]);
    }

    #[test]
    fn test_list_added_removed_and_renamed() {
        let cached = blog();
        let mut current = blog();
        current.remove(1);
        current[0].associations.remove(0);
        current[1] = current[1].clone().table("accounts");
        current.push(list("Comment", vec![text("body")]));

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert_eq!(
            kinds(&plan),
            vec![
                (ModObject::List, ModOp::Create),
                (ModObject::List, ModOp::Remove),
                (ModObject::List, ModOp::Rename),
                (ModObject::Association, ModOp::Remove),
                (ModObject::Association, ModOp::Remove),
            ]
        );

        match &plan[2] {
            Modification::RenameList { from, to, .. } => {
                assert_eq!(from, "user");
                assert_eq!(to, "accounts");
            }
            other => panic!("Expected RenameList, got {:?}", other),
        }
    }

    #[test]
    fn test_association_made_two_sided_keeps_its_column() {
        let cached = vec![
            list("Post", vec![]).association(association(
                ("Post", "author"),
                Cardinality::ManyToOne,
                ("User", None),
            )),
            list("User", vec![]),
        ];
        let current = vec![
            list("Post", vec![]).association(association(
                ("Post", "author"),
                Cardinality::ManyToOne,
                ("User", Some("posts")),
            )),
            list("User", vec![]).association(association(
                ("User", "posts"),
                Cardinality::OneToMany,
                ("Post", Some("author")),
            )),
        ];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert!(plan.is_empty(), "unexpected plan: {:?}", plan);
    }

    #[test]
    fn test_list_key_renamed_onto_same_table() {
        let cached = vec![list("User", vec![text("name")]).table("users")];
        let current = vec![list("Account", vec![text("name")]).table("users")];

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        let described: Vec<String> = plan.iter().map(Modification::describe).collect();
        assert_eq!(described, vec!["list/create Account (users)"]);
    }

    #[test]
    fn test_changed_association_is_replaced() {
        let cached = blog();
        let mut current = blog();
        current[0].associations[1].cardinality = Cardinality::ManyToMany;

        let plan = DiffPlanner::new().plan(&current, Some(&cached));
        assert_eq!(
            kinds(&plan),
            vec![
                (ModObject::Association, ModOp::Create),
                (ModObject::Association, ModOp::Remove),
            ]
        );
    }
}
