use std::collections::{BTreeSet, HashMap};

use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{GatehouseError, Result};
use crate::hierarchy;
use crate::store::sqlite::{now_timestamp, opt_text, text};
use crate::store::{Store, UnitOfWork};
use crate::types::{PermissionId, TreeTable};

use super::SnapshotDocument;

/// Rows touched by one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub menus: usize,
    pub permissions: usize,
    pub roles: usize,
    pub role_menus: u64,
    pub role_permissions: u64,
}

/// Reconcile a [`SnapshotDocument`] against the live store in one transaction.
///
/// Records are matched by `code`. Tree rows are upserted with no parent
/// first and relinked in a second pass, so array order never matters and
/// no statement holds a forward reference. Roles named in `roleMenus` /
/// `rolePermissions` have those links replaced; other roles keep theirs.
/// Any invariant broken by the result fails the whole import.
#[derive(Debug, Clone)]
pub struct ImportSnapshot(pub SnapshotDocument);

async fn code_map(store: &Store, table: &str) -> Result<HashMap<String, i64>> {
    let rows = store
        .query(&format!("SELECT code, id FROM {table}"), &[], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .await?;
    Ok(rows.into_iter().collect())
}

fn blame(code: &str, err: GatehouseError) -> GatehouseError {
    match err {
        GatehouseError::Validation(msg) => {
            GatehouseError::validation(format!("Imported permission \"{code}\": {msg}"))
        }
        other => other,
    }
}

fn resolve(map: &HashMap<String, i64>, code: Option<&str>) -> Value {
    code.and_then(|c| map.get(c))
        .map_or(Value::Null, |&id| Value::Integer(id))
}

impl ImportSnapshot {
    async fn upsert_menus(&self, store: &Store) -> Result<()> {
        let doc = &self.0;
        for m in &doc.menus {
            store
                .execute(
                    "INSERT INTO menu (parent_id, name, code, path, icon, sort, enabled, updated_at)
                     VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(code) DO UPDATE SET
                       name = excluded.name, path = excluded.path, icon = excluded.icon,
                       sort = excluded.sort, enabled = excluded.enabled,
                       updated_at = excluded.updated_at",
                    &[
                        text(&m.name),
                        text(&m.code),
                        opt_text(m.path.as_deref()),
                        opt_text(m.icon.as_deref()),
                        Value::Integer(m.sort),
                        Value::Integer(i64::from(m.enabled)),
                        Value::Text(now_timestamp()),
                    ],
                )
                .await?;
        }

        let ids = code_map(store, "menu").await?;
        for m in &doc.menus {
            store
                .execute(
                    "UPDATE menu SET parent_id = ?1, updated_at = ?2 WHERE code = ?3",
                    &[
                        resolve(&ids, m.parent_code.as_deref()),
                        Value::Text(now_timestamp()),
                        text(&m.code),
                    ],
                )
                .await?;
        }

        for m in &doc.menus {
            let Some(&id) = ids.get(&m.code) else {
                continue;
            };
            if let Some(Some(parent)) = hierarchy::parent_of(store, TreeTable::Menu, id).await? {
                if hierarchy::would_create_cycle(store, TreeTable::Menu, id, parent).await? {
                    return Err(GatehouseError::validation(format!(
                        "Imported menu \"{}\" is part of a parent cycle",
                        m.code
                    )));
                }
            }
        }
        Ok(())
    }

    async fn upsert_permissions(&self, store: &Store) -> Result<()> {
        let doc = &self.0;
        for p in &doc.permissions {
            store
                .execute(
                    "INSERT INTO permission
                       (parent_id, level, name, code, path, description, sort, enabled, updated_at)
                     VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(code) DO UPDATE SET
                       level = excluded.level, name = excluded.name, path = excluded.path,
                       description = excluded.description, sort = excluded.sort,
                       enabled = excluded.enabled, updated_at = excluded.updated_at",
                    &[
                        text(p.level.as_str()),
                        text(&p.name),
                        text(&p.code),
                        opt_text(p.path.as_deref()),
                        opt_text(p.description.as_deref()),
                        Value::Integer(p.sort),
                        Value::Integer(i64::from(p.enabled)),
                        Value::Text(now_timestamp()),
                    ],
                )
                .await?;
        }

        let ids = code_map(store, "permission").await?;
        for p in &doc.permissions {
            store
                .execute(
                    "UPDATE permission SET parent_id = ?1, updated_at = ?2 WHERE code = ?3",
                    &[
                        resolve(&ids, p.parent_code.as_deref()),
                        Value::Text(now_timestamp()),
                        text(&p.code),
                    ],
                )
                .await?;
        }

        // Parents first over every record, so a misplaced child is blamed
        // before the leaf rule flags the row it hangs off.
        let mut placed = Vec::with_capacity(doc.permissions.len());
        for p in &doc.permissions {
            let Some(&id) = ids.get(&p.code) else {
                continue;
            };
            // Re-read: with repeated codes the last record decides the stored row.
            let Some(level) = hierarchy::level_of(store, PermissionId(id)).await? else {
                continue;
            };
            let parent = hierarchy::parent_of(store, TreeTable::Permission, id)
                .await?
                .flatten()
                .map(PermissionId);
            hierarchy::check_permission_parent(store, Some(PermissionId(id)), level, parent)
                .await
                .map_err(|err| blame(&p.code, err))?;
            placed.push((p.code.as_str(), PermissionId(id), level));
        }
        for (code, id, level) in placed {
            hierarchy::check_method_is_leaf(store, id, level)
                .await
                .map_err(|err| blame(code, err))?;
        }
        Ok(())
    }

    async fn upsert_roles(&self, store: &Store) -> Result<()> {
        for r in &self.0.roles {
            store
                .execute(
                    "INSERT INTO role (name, code, owner, description, enabled, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(code) DO UPDATE SET
                       name = excluded.name, owner = excluded.owner,
                       description = excluded.description, enabled = excluded.enabled,
                       updated_at = excluded.updated_at",
                    &[
                        text(&r.name),
                        text(&r.code),
                        opt_text(r.owner.as_deref()),
                        opt_text(r.description.as_deref()),
                        Value::Integer(i64::from(r.enabled)),
                        Value::Text(now_timestamp()),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// Replace the links of every role named in `pairs`; unresolved pairs
    /// are skipped.
    async fn replace_links(
        store: &Store,
        table: &str,
        column: &str,
        roles: &HashMap<String, i64>,
        targets: &HashMap<String, i64>,
        pairs: &[(&str, &str)],
    ) -> Result<u64> {
        let named: BTreeSet<&str> = pairs.iter().map(|(role, _)| *role).collect();
        for role in named {
            if let Some(&role_id) = roles.get(role) {
                store
                    .execute(
                        &format!("DELETE FROM {table} WHERE role_id = ?1"),
                        &[Value::Integer(role_id)],
                    )
                    .await?;
            }
        }

        let insert = format!("INSERT OR IGNORE INTO {table} (role_id, {column}) VALUES (?1, ?2)");
        let mut inserted = 0;
        for (role, target) in pairs {
            let (Some(&role_id), Some(&target_id)) = (roles.get(*role), targets.get(*target))
            else {
                debug!(table, role, target, "Skipping unresolved link");
                continue;
            };
            inserted += store
                .execute(&insert, &[Value::Integer(role_id), Value::Integer(target_id)])
                .await?
                .rows_affected;
        }
        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl UnitOfWork for ImportSnapshot {
    type Output = ImportSummary;

    fn label(&self) -> &'static str {
        "import-snapshot"
    }

    async fn run(self, store: &Store) -> Result<ImportSummary> {
        self.0.validate()?;

        if !self.0.menus.is_empty() {
            self.upsert_menus(store).await?;
        }
        if !self.0.permissions.is_empty() {
            self.upsert_permissions(store).await?;
        }
        if !self.0.roles.is_empty() {
            self.upsert_roles(store).await?;
        }

        let roles = code_map(store, "role").await?;
        let menus = code_map(store, "menu").await?;
        let permissions = code_map(store, "permission").await?;
        let doc = &self.0;

        let mut summary = ImportSummary {
            menus: doc.menus.len(),
            permissions: doc.permissions.len(),
            roles: doc.roles.len(),
            ..ImportSummary::default()
        };
        if !doc.role_menus.is_empty() {
            let pairs: Vec<(&str, &str)> = doc
                .role_menus
                .iter()
                .map(|rm| (rm.role_code.as_str(), rm.menu_code.as_str()))
                .collect();
            summary.role_menus =
                Self::replace_links(store, "role_menu", "menu_id", &roles, &menus, &pairs).await?;
        }
        if !doc.role_permissions.is_empty() {
            let pairs: Vec<(&str, &str)> = doc
                .role_permissions
                .iter()
                .map(|rp| (rp.role_code.as_str(), rp.permission_code.as_str()))
                .collect();
            summary.role_permissions = Self::replace_links(
                store,
                "role_permission",
                "permission_id",
                &roles,
                &permissions,
                &pairs,
            )
            .await?;
        }

        info!(
            menus = summary.menus,
            permissions = summary.permissions,
            roles = summary.roles,
            role_menus = summary.role_menus,
            role_permissions = summary.role_permissions,
            "Imported configuration"
        );
        Ok(summary)
    }
}
