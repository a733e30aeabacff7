//! Role link tables: replace-all assignment and bulk bind/unbind.

use std::collections::HashSet;

use rusqlite::types::Value;
use tracing::{debug, info};

use crate::catalog::require_role;
use crate::error::{GatehouseError, Result};
use crate::hierarchy::{self, join_ids};
use crate::store::{Store, UnitOfWork};
use crate::types::{
    AssociationKind, BulkAction, BulkOutcome, MenuId, PermissionId, RoleId, TreeTable,
};

/// Distinct ids, first occurrence wins.
fn dedupe(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// `?{start}, ?{start+1}, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn missing_ids(store: &Store, table: TreeTable, ids: &[i64]) -> Result<Vec<i64>> {
    let mut missing = Vec::new();
    for &id in ids {
        if !hierarchy::exists(store, table, id).await? {
            missing.push(id);
        }
    }
    Ok(missing)
}

async fn missing_roles(store: &Store, roles: &[i64]) -> Result<Vec<i64>> {
    let mut missing = Vec::new();
    for &id in roles {
        let found = store
            .query_opt("SELECT 1 FROM role WHERE id = ?1", &[Value::Integer(id)], |_| Ok(()))
            .await?;
        if found.is_none() {
            missing.push(id);
        }
    }
    Ok(missing)
}

fn target_noun(kind: AssociationKind) -> &'static str {
    match kind {
        AssociationKind::Menus => "menu",
        AssociationKind::Permissions => "permission",
    }
}

/// Ids linked to `role` in the `kind` table, ascending.
pub async fn role_target_ids(store: &Store, kind: AssociationKind, role: RoleId) -> Result<Vec<i64>> {
    require_role(store, role).await?;
    store
        .query(
            &format!(
                "SELECT {col} FROM {table} WHERE role_id = ?1 ORDER BY {col}",
                col = kind.target_column(),
                table = kind.link_table(),
            ),
            &[role.into()],
            |row| row.get::<_, i64>(0),
        )
        .await
}

pub async fn role_menu_ids(store: &Store, role: RoleId) -> Result<Vec<MenuId>> {
    let ids = role_target_ids(store, AssociationKind::Menus, role).await?;
    Ok(ids.into_iter().map(MenuId).collect())
}

pub async fn role_permission_ids(store: &Store, role: RoleId) -> Result<Vec<PermissionId>> {
    let ids = role_target_ids(store, AssociationKind::Permissions, role).await?;
    Ok(ids.into_iter().map(PermissionId).collect())
}

/// Replace every link of one role with exactly `targets`. An empty list
/// clears the role's links.
#[derive(Debug, Clone)]
pub struct SetAssociations {
    pub kind: AssociationKind,
    pub role: RoleId,
    pub targets: Vec<i64>,
}

impl SetAssociations {
    pub fn menus(role: RoleId, menus: impl IntoIterator<Item = MenuId>) -> Self {
        Self {
            kind: AssociationKind::Menus,
            role,
            targets: menus.into_iter().map(|m| m.0).collect(),
        }
    }

    pub fn permissions(role: RoleId, permissions: impl IntoIterator<Item = PermissionId>) -> Self {
        Self {
            kind: AssociationKind::Permissions,
            role,
            targets: permissions.into_iter().map(|p| p.0).collect(),
        }
    }
}

#[async_trait::async_trait]
impl UnitOfWork for SetAssociations {
    /// Number of links the role holds afterwards.
    type Output = usize;

    fn label(&self) -> &'static str {
        "set-associations"
    }

    async fn run(self, store: &Store) -> Result<usize> {
        require_role(store, self.role).await?;
        let targets = dedupe(self.targets);
        let missing = missing_ids(store, self.kind.target(), &targets).await?;
        if !missing.is_empty() {
            return Err(GatehouseError::validation(format!(
                "Unknown {} ids: {}",
                target_noun(self.kind),
                join_ids(missing)
            )));
        }

        let table = self.kind.link_table();
        store
            .execute(
                &format!("DELETE FROM {table} WHERE role_id = ?1"),
                &[self.role.into()],
            )
            .await?;
        let insert = format!(
            "INSERT INTO {table} (role_id, {}) VALUES (?1, ?2)",
            self.kind.target_column()
        );
        for &target in &targets {
            store
                .execute(&insert, &[self.role.into(), Value::Integer(target)])
                .await?;
        }
        debug!(role = %self.role, table, count = targets.len(), "Replaced role links");
        Ok(targets.len())
    }
}

/// Bind or unbind every pair of `roles` x `targets`.
#[derive(Debug, Clone)]
pub struct BulkUpdate {
    pub kind: AssociationKind,
    pub roles: Vec<RoleId>,
    pub targets: Vec<i64>,
    pub action: BulkAction,
}

#[async_trait::async_trait]
impl UnitOfWork for BulkUpdate {
    type Output = BulkOutcome;

    fn label(&self) -> &'static str {
        "bulk-associations"
    }

    async fn run(self, store: &Store) -> Result<BulkOutcome> {
        let roles = dedupe(self.roles.iter().map(|r| r.0));
        let targets = dedupe(self.targets);
        if roles.is_empty() || targets.is_empty() {
            return Err(GatehouseError::validation(
                "bulk update needs at least one role and one target",
            ));
        }
        let table = self.kind.link_table();
        let column = self.kind.target_column();

        let outcome = match self.action {
            BulkAction::Bind => {
                let unknown_roles = missing_roles(store, &roles).await?;
                if !unknown_roles.is_empty() {
                    return Err(GatehouseError::validation(format!(
                        "Unknown role ids: {}",
                        join_ids(unknown_roles)
                    )));
                }
                let unknown_targets = missing_ids(store, self.kind.target(), &targets).await?;
                if !unknown_targets.is_empty() {
                    return Err(GatehouseError::validation(format!(
                        "Unknown {} ids: {}",
                        target_noun(self.kind),
                        join_ids(unknown_targets)
                    )));
                }

                let insert =
                    format!("INSERT OR IGNORE INTO {table} (role_id, {column}) VALUES (?1, ?2)");
                let mut inserted = 0;
                for &role in &roles {
                    for &target in &targets {
                        inserted += store
                            .execute(&insert, &[Value::Integer(role), Value::Integer(target)])
                            .await?
                            .rows_affected;
                    }
                }
                BulkOutcome {
                    action: BulkAction::Bind,
                    inserted,
                    deleted: 0,
                }
            }
            BulkAction::Unbind => {
                let sql = format!(
                    "DELETE FROM {table} WHERE role_id IN ({}) AND {column} IN ({})",
                    placeholders(1, roles.len()),
                    placeholders(roles.len() + 1, targets.len()),
                );
                let params: Vec<Value> = roles
                    .iter()
                    .chain(&targets)
                    .map(|&id| Value::Integer(id))
                    .collect();
                let deleted = store.execute(&sql, &params).await?.rows_affected;
                BulkOutcome {
                    action: BulkAction::Unbind,
                    inserted: 0,
                    deleted,
                }
            }
        };
        info!(
            table,
            action = outcome.action.as_str(),
            roles = roles.len(),
            targets = targets.len(),
            inserted = outcome.inserted,
            deleted = outcome.deleted,
            "Bulk association update"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CreateMenu, CreatePermission, CreateRole, DeleteMenu};
    use crate::error::ErrorKind;
    use crate::types::{NewMenu, NewPermission, NewRole};

    struct Fixture {
        store: Store,
        roles: Vec<RoleId>,
        menus: Vec<MenuId>,
    }

    async fn fixture() -> Fixture {
        let store = Store::in_memory().unwrap();
        let mut roles = Vec::new();
        for code in ["admin", "ops"] {
            roles.push(
                store
                    .run_exclusive(CreateRole(NewRole::new(code, code)))
                    .await
                    .unwrap()
                    .id,
            );
        }
        let mut menus = Vec::new();
        for code in ["home", "users", "audit"] {
            menus.push(
                store
                    .run_exclusive(CreateMenu(NewMenu::new(code, code)))
                    .await
                    .unwrap()
                    .id,
            );
        }
        Fixture { store, roles, menus }
    }

    #[tokio::test]
    async fn replace_all_swaps_the_whole_set() {
        let f = fixture().await;
        let admin = f.roles[0];
        let n = f
            .store
            .run_exclusive(SetAssociations::menus(admin, [f.menus[0], f.menus[1], f.menus[0]]))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            role_menu_ids(&f.store, admin).await.unwrap(),
            vec![f.menus[0], f.menus[1]]
        );

        f.store
            .run_exclusive(SetAssociations::menus(admin, [f.menus[2]]))
            .await
            .unwrap();
        assert_eq!(role_menu_ids(&f.store, admin).await.unwrap(), vec![f.menus[2]]);

        f.store
            .run_exclusive(SetAssociations::menus(admin, []))
            .await
            .unwrap();
        assert!(role_menu_ids(&f.store, admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_all_with_unknown_target_changes_nothing() {
        let f = fixture().await;
        let admin = f.roles[0];
        f.store
            .run_exclusive(SetAssociations::menus(admin, [f.menus[0]]))
            .await
            .unwrap();

        let err = f
            .store
            .run_exclusive(SetAssociations::menus(admin, [f.menus[1], MenuId(77)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("77"));
        assert_eq!(role_menu_ids(&f.store, admin).await.unwrap(), vec![f.menus[0]]);
    }

    #[tokio::test]
    async fn replace_all_for_unknown_role_is_not_found() {
        let f = fixture().await;
        let err = f
            .store
            .run_exclusive(SetAssociations::menus(RoleId(99), [f.menus[0]]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn permission_links_are_separate_from_menu_links() {
        let f = fixture().await;
        let class = f
            .store
            .run_exclusive(CreatePermission(NewPermission::class("user", "User")))
            .await
            .unwrap();
        let admin = f.roles[0];
        f.store
            .run_exclusive(SetAssociations::permissions(admin, [class.id]))
            .await
            .unwrap();
        assert_eq!(
            role_permission_ids(&f.store, admin).await.unwrap(),
            vec![class.id]
        );
        assert!(role_menu_ids(&f.store, admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bind_is_idempotent() {
        let f = fixture().await;
        let bind = BulkUpdate {
            kind: AssociationKind::Menus,
            roles: vec![f.roles[0]],
            targets: vec![f.menus[0].0],
            action: BulkAction::Bind,
        };
        let first = f.store.run_exclusive(bind.clone()).await.unwrap();
        let second = f.store.run_exclusive(bind).await.unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(second.inserted, 0);
        assert_eq!(f.store.count("role_menu").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bind_and_unbind_cartesian_product() {
        let f = fixture().await;
        let targets: Vec<i64> = f.menus.iter().map(|m| m.0).collect();
        let bound = f
            .store
            .run_exclusive(BulkUpdate {
                kind: AssociationKind::Menus,
                roles: f.roles.clone(),
                targets: targets.clone(),
                action: BulkAction::Bind,
            })
            .await
            .unwrap();
        assert_eq!(bound.inserted, 6);

        let unbound = f
            .store
            .run_exclusive(BulkUpdate {
                kind: AssociationKind::Menus,
                roles: vec![f.roles[1], RoleId(500)],
                targets: vec![targets[0], targets[2], 9_999],
                action: BulkAction::Unbind,
            })
            .await
            .unwrap();
        assert_eq!(unbound.deleted, 2);
        assert_eq!(
            role_menu_ids(&f.store, f.roles[1]).await.unwrap(),
            vec![f.menus[1]]
        );
        assert_eq!(role_menu_ids(&f.store, f.roles[0]).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn bind_rejects_unknown_ids_and_empty_lists() {
        let f = fixture().await;
        let err = f
            .store
            .run_exclusive(BulkUpdate {
                kind: AssociationKind::Menus,
                roles: vec![f.roles[0], RoleId(404)],
                targets: vec![f.menus[0].0],
                action: BulkAction::Bind,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown role ids: 404"));
        assert_eq!(f.store.count("role_menu").await.unwrap(), 0);

        let err = f
            .store
            .run_exclusive(BulkUpdate {
                kind: AssociationKind::Permissions,
                roles: vec![f.roles[0]],
                targets: vec![],
                action: BulkAction::Unbind,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn deleting_a_menu_drops_its_links() {
        let f = fixture().await;
        f.store
            .run_exclusive(SetAssociations::menus(f.roles[0], f.menus.clone()))
            .await
            .unwrap();
        f.store.run_exclusive(DeleteMenu(f.menus[1])).await.unwrap();
        assert_eq!(
            role_menu_ids(&f.store, f.roles[0]).await.unwrap(),
            vec![f.menus[0], f.menus[2]]
        );
    }
}
