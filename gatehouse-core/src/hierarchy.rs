//! Hierarchy integrity checks for the menu forest and the two-level
//! permission tree, plus sibling reordering.
//!
//! Every check reads through the [`Store`]; callers run them inside the same
//! unit of work as the write they guard, so the read and the write cannot be
//! separated by another writer.

use std::collections::HashSet;
use std::fmt::Write as _;

use rusqlite::types::Value;
use tracing::debug;

use crate::catalog::permissions::level_column;
use crate::error::{GatehouseError, Result};
use crate::store::sqlite::now_timestamp;
use crate::store::{Store, UnitOfWork};
use crate::types::{MenuId, PermissionId, PermissionLevel, TreeTable};

/// Gap between consecutive computed `sort` values, leaving room for manual
/// inserts between ranks.
pub const SORT_STEP: i64 = 10;

/// The parent of `id`: `None` if the row does not exist, `Some(None)` for a root.
pub async fn parent_of(store: &Store, table: TreeTable, id: i64) -> Result<Option<Option<i64>>> {
    store
        .query_opt(
            &format!("SELECT parent_id FROM {} WHERE id = ?1", table.table()),
            &[Value::Integer(id)],
            |row| row.get::<_, Option<i64>>(0),
        )
        .await
}

pub async fn exists(store: &Store, table: TreeTable, id: i64) -> Result<bool> {
    Ok(parent_of(store, table, id).await?.is_some())
}

pub async fn has_children(store: &Store, table: TreeTable, id: i64) -> Result<bool> {
    let child = store
        .query_opt(
            &format!(
                "SELECT id FROM {} WHERE parent_id = ?1 LIMIT 1",
                table.table()
            ),
            &[Value::Integer(id)],
            |row| row.get::<_, i64>(0),
        )
        .await?;
    Ok(child.is_some())
}

/// Would making `proposed_parent` the parent of `node` close a loop?
///
/// Walks upward from `proposed_parent`. Reaching `node`, or revisiting a
/// node (pre-existing corrupt data), is a cycle; reaching a root or a
/// missing row is not. Cost is bounded by the depth of `proposed_parent`.
pub async fn would_create_cycle(
    store: &Store,
    table: TreeTable,
    node: i64,
    proposed_parent: i64,
) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut cursor = Some(proposed_parent);
    while let Some(current) = cursor {
        if current == node || !seen.insert(current) {
            return Ok(true);
        }
        cursor = parent_of(store, table, current).await?.flatten();
    }
    Ok(false)
}

fn reject_self_parent(table: TreeTable, node: i64, parent: i64) -> Result<()> {
    if node == parent {
        return Err(GatehouseError::validation(format!(
            "{} {node} cannot be its own parent",
            table.label()
        )));
    }
    Ok(())
}

/// Validate placing a menu (`node`, or a new menu when `None`) under `parent`.
pub async fn check_menu_parent(
    store: &Store,
    node: Option<MenuId>,
    parent: Option<MenuId>,
) -> Result<()> {
    let Some(parent) = parent else {
        return Ok(());
    };
    if let Some(node) = node {
        reject_self_parent(TreeTable::Menu, node.0, parent.0)?;
    }
    if !exists(store, TreeTable::Menu, parent.0).await? {
        return Err(GatehouseError::validation(format!(
            "Parent menu {parent} not found"
        )));
    }
    if let Some(node) = node {
        if would_create_cycle(store, TreeTable::Menu, node.0, parent.0).await? {
            return Err(GatehouseError::validation(format!(
                "Moving menu {node} under {parent} would create a cycle"
            )));
        }
    }
    Ok(())
}

/// Level of permission `id`, `None` if it does not exist.
pub async fn level_of(store: &Store, id: PermissionId) -> Result<Option<PermissionLevel>> {
    store
        .query_opt(
            "SELECT level FROM permission WHERE id = ?1",
            &[id.into()],
            |row| level_column(row, "level"),
        )
        .await
}

/// Validate the level/parent rule for a permission (`node`, or a new
/// permission when `None`).
pub async fn check_permission_placement(
    store: &Store,
    node: Option<PermissionId>,
    level: PermissionLevel,
    parent: Option<PermissionId>,
) -> Result<()> {
    check_permission_parent(store, node, level, parent).await?;
    if let Some(node) = node {
        check_method_is_leaf(store, node, level).await?;
    }
    Ok(())
}

/// A method permission must not have children.
pub async fn check_method_is_leaf(
    store: &Store,
    node: PermissionId,
    level: PermissionLevel,
) -> Result<()> {
    if level == PermissionLevel::Method && has_children(store, TreeTable::Permission, node.0).await?
    {
        return Err(GatehouseError::validation(format!(
            "Permission {node} has children and cannot be method level"
        )));
    }
    Ok(())
}

/// The parent half of [`check_permission_placement`]: class rows are roots,
/// method rows hang off an existing class row.
pub async fn check_permission_parent(
    store: &Store,
    node: Option<PermissionId>,
    level: PermissionLevel,
    parent: Option<PermissionId>,
) -> Result<()> {
    match level {
        PermissionLevel::Class => {
            if parent.is_some() {
                return Err(GatehouseError::validation(
                    "class permission must not have parentId",
                ));
            }
        }
        PermissionLevel::Method => {
            let Some(parent) = parent else {
                return Err(GatehouseError::validation(
                    "method permission must have parentId",
                ));
            };
            if let Some(node) = node {
                reject_self_parent(TreeTable::Permission, node.0, parent.0)?;
            }
            match level_of(store, parent).await? {
                None => {
                    return Err(GatehouseError::validation(format!(
                        "Parent permission {parent} not found"
                    )));
                }
                Some(PermissionLevel::Method) => {
                    return Err(GatehouseError::validation(
                        "method parent must be class level",
                    ));
                }
                Some(PermissionLevel::Class) => {}
            }
        }
    }
    Ok(())
}

fn describe_parent(table: TreeTable, parent: Option<i64>) -> String {
    match parent {
        Some(id) => format!("{} {id}", table.label().to_lowercase()),
        None => "the root".to_string(),
    }
}

pub(crate) fn join_ids(ids: impl IntoIterator<Item = i64>) -> String {
    let mut out = String::new();
    for (i, id) in ids.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{id}");
    }
    out
}

/// Check a sibling reorder request: ids distinct, all present, and all
/// already children of `parent`. Reordering never reparents.
pub async fn validate_reorder(
    store: &Store,
    table: TreeTable,
    parent: Option<i64>,
    ids: &[i64],
) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    let duplicates: Vec<i64> = ids.iter().copied().filter(|id| !seen.insert(*id)).collect();
    if !duplicates.is_empty() {
        return Err(GatehouseError::validation(format!(
            "Duplicate ids in reorder list: {}",
            join_ids(duplicates)
        )));
    }

    let mut missing = Vec::new();
    let mut misplaced = Vec::new();
    for &id in ids {
        match parent_of(store, table, id).await? {
            None => missing.push(id),
            Some(current) if current != parent => misplaced.push(id),
            Some(_) => {}
        }
    }
    if !missing.is_empty() {
        return Err(GatehouseError::validation(format!(
            "{} ids not found: {}",
            table.label(),
            join_ids(missing)
        )));
    }
    if !misplaced.is_empty() {
        return Err(GatehouseError::validation(format!(
            "{} ids {} are not children of {}",
            table.label(),
            join_ids(misplaced),
            describe_parent(table, parent)
        )));
    }
    Ok(())
}

/// Assign `sort = (position + 1) * SORT_STEP` to an explicit ordering of
/// siblings, so the first child gets `SORT_STEP`.
#[derive(Debug, Clone)]
pub struct ReorderSiblings {
    pub table: TreeTable,
    pub parent: Option<i64>,
    pub ids: Vec<i64>,
}

#[async_trait::async_trait]
impl UnitOfWork for ReorderSiblings {
    /// `(id, sort)` pairs in the requested order.
    type Output = Vec<(i64, i64)>;

    fn label(&self) -> &'static str {
        "reorder-siblings"
    }

    async fn run(self, store: &Store) -> Result<Self::Output> {
        validate_reorder(store, self.table, self.parent, &self.ids).await?;

        let sql = format!(
            "UPDATE {} SET sort = ?1, updated_at = ?2 WHERE id = ?3",
            self.table.table()
        );
        let now = now_timestamp();
        let mut assigned = Vec::with_capacity(self.ids.len());
        for (index, id) in self.ids.iter().copied().enumerate() {
            let rank = i64::try_from(index).map_or(i64::MAX / SORT_STEP, |i| i + 1);
            let sort = rank.saturating_mul(SORT_STEP);
            store
                .execute(
                    &sql,
                    &[
                        Value::Integer(sort),
                        Value::Text(now.clone()),
                        Value::Integer(id),
                    ],
                )
                .await?;
            assigned.push((id, sort));
        }
        debug!(
            table = self.table.table(),
            parent = ?self.parent,
            count = assigned.len(),
            "Reordered siblings"
        );
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    async fn insert_menu(store: &Store, code: &str, parent: Option<i64>) -> i64 {
        store
            .execute(
                "INSERT INTO menu (parent_id, name, code) VALUES (?1, ?2, ?2)",
                &[parent.map_or(Value::Null, Value::Integer), Value::Text(code.into())],
            )
            .await
            .unwrap()
            .last_insert_id
    }

    async fn insert_permission(store: &Store, code: &str, level: &str, parent: Option<i64>) -> i64 {
        store
            .execute(
                "INSERT INTO permission (parent_id, level, name, code) VALUES (?1, ?2, ?3, ?3)",
                &[
                    parent.map_or(Value::Null, Value::Integer),
                    Value::Text(level.into()),
                    Value::Text(code.into()),
                ],
            )
            .await
            .unwrap()
            .last_insert_id
    }

    async fn sorts(store: &Store, ids: &[i64]) -> Vec<i64> {
        let mut out = Vec::new();
        for id in ids {
            let sort = store
                .query_opt("SELECT sort FROM menu WHERE id = ?1", &[Value::Integer(*id)], |row| {
                    row.get::<_, i64>(0)
                })
                .await
                .unwrap()
                .unwrap();
            out.push(sort);
        }
        out
    }

    #[tokio::test]
    async fn detects_cycle_through_descendant() {
        let store = Store::in_memory().unwrap();
        let a = insert_menu(&store, "a", None).await;
        let b = insert_menu(&store, "b", Some(a)).await;
        let c = insert_menu(&store, "c", Some(b)).await;

        assert!(would_create_cycle(&store, TreeTable::Menu, a, c).await.unwrap());
        assert!(would_create_cycle(&store, TreeTable::Menu, a, b).await.unwrap());
        assert!(!would_create_cycle(&store, TreeTable::Menu, c, a).await.unwrap());

        let err = check_menu_parent(&store, Some(MenuId(a)), Some(MenuId(c)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn walk_terminates_on_corrupt_loop() {
        let store = Store::in_memory().unwrap();
        let x = insert_menu(&store, "x", None).await;
        let y = insert_menu(&store, "y", Some(x)).await;
        store
            .execute(
                "UPDATE menu SET parent_id = ?1 WHERE id = ?2",
                &[Value::Integer(y), Value::Integer(x)],
            )
            .await
            .unwrap();
        let z = insert_menu(&store, "z", None).await;

        // z is unrelated, but the walk from x spins in the x<->y loop.
        assert!(would_create_cycle(&store, TreeTable::Menu, z, x).await.unwrap());
    }

    #[tokio::test]
    async fn self_parent_rejected_before_walk() {
        let store = Store::in_memory().unwrap();
        let a = insert_menu(&store, "a", None).await;
        let b = insert_menu(&store, "b", Some(a)).await;
        let err = check_menu_parent(&store, Some(MenuId(b)), Some(MenuId(b)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("own parent"));
    }

    #[tokio::test]
    async fn missing_parent_rejected() {
        let store = Store::in_memory().unwrap();
        let err = check_menu_parent(&store, None, Some(MenuId(42)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn permission_level_rules() {
        let store = Store::in_memory().unwrap();
        let class = PermissionId(insert_permission(&store, "user", "class", None).await);
        let method =
            PermissionId(insert_permission(&store, "user:list", "method", Some(class.0)).await);

        assert!(
            check_permission_placement(&store, None, PermissionLevel::Class, None)
                .await
                .is_ok()
        );
        assert!(
            check_permission_placement(&store, None, PermissionLevel::Method, Some(class))
                .await
                .is_ok()
        );

        let cases = [
            (None, PermissionLevel::Class, Some(class), "must not have parentId"),
            (None, PermissionLevel::Method, None, "must have parentId"),
            (Some(method), PermissionLevel::Method, Some(method), "own parent"),
            (None, PermissionLevel::Method, Some(method), "must be class level"),
            (None, PermissionLevel::Method, Some(PermissionId(99)), "not found"),
            (Some(class), PermissionLevel::Method, Some(PermissionId(999)), "not found"),
        ];
        for (node, level, parent, needle) in cases {
            let err = check_permission_placement(&store, node, level, parent)
                .await
                .unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "{node:?} {level} {parent:?}: {err}"
            );
        }

        let other = PermissionId(insert_permission(&store, "order", "class", None).await);
        let err = check_permission_placement(&store, Some(class), PermissionLevel::Method, Some(other))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has children"));
    }

    #[tokio::test]
    async fn reorder_assigns_stepped_sort_and_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let p = insert_menu(&store, "p", None).await;
        let one = insert_menu(&store, "one", Some(p)).await;
        let two = insert_menu(&store, "two", Some(p)).await;
        let three = insert_menu(&store, "three", Some(p)).await;
        let order = vec![three, one, two];

        for _ in 0..2 {
            let assigned = store
                .run_exclusive(ReorderSiblings {
                    table: TreeTable::Menu,
                    parent: Some(p),
                    ids: order.clone(),
                })
                .await
                .unwrap();
            assert_eq!(assigned, vec![(three, 10), (one, 20), (two, 30)]);
            assert_eq!(sorts(&store, &order).await, vec![10, 20, 30]);
        }
    }

    #[tokio::test]
    async fn reorder_rejects_duplicates_missing_and_foreign_ids() {
        let store = Store::in_memory().unwrap();
        let p = insert_menu(&store, "p", None).await;
        let child = insert_menu(&store, "child", Some(p)).await;
        let root = insert_menu(&store, "root", None).await;

        let reorder = |ids: Vec<i64>| ReorderSiblings {
            table: TreeTable::Menu,
            parent: Some(p),
            ids,
        };

        let dup = store.run_exclusive(reorder(vec![child, child])).await.unwrap_err();
        assert!(dup.to_string().contains("Duplicate"));

        let missing = store.run_exclusive(reorder(vec![child, 404])).await.unwrap_err();
        assert!(missing.to_string().contains("404"));

        let foreign = store.run_exclusive(reorder(vec![child, root])).await.unwrap_err();
        assert_eq!(foreign.kind(), ErrorKind::Validation);
        assert!(foreign.to_string().contains("not children of menu"));

        // Nothing was renumbered by the failed attempts.
        assert_eq!(sorts(&store, &[child, root]).await, vec![0, 0]);
    }

    #[tokio::test]
    async fn reorder_roots() {
        let store = Store::in_memory().unwrap();
        let a = insert_menu(&store, "a", None).await;
        let b = insert_menu(&store, "b", None).await;
        store
            .run_exclusive(ReorderSiblings {
                table: TreeTable::Menu,
                parent: None,
                ids: vec![b, a],
            })
            .await
            .unwrap();
        assert_eq!(sorts(&store, &[b, a]).await, vec![10, 20]);
    }
}
