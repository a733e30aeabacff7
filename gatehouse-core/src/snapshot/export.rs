use chrono::{DateTime, Utc};
use tracing::info;

use crate::catalog::permissions::level_column;
use crate::error::Result;
use crate::store::Store;

use super::{
    MenuRecord, PermissionRecord, RoleMenuRecord, RolePermissionRecord, RoleRecord,
    SUPPORTED_VERSION, SnapshotDocument,
};

/// Read the whole configuration into a document.
///
/// A plain read: it does not queue behind the write serializer. Each table
/// is read by its own query, so a writer that commits in between can leave
/// the document mixing old and new rows, and rows of a transaction still in
/// flight are visible.
pub async fn export(store: &Store) -> Result<SnapshotDocument> {
    let menus = store
        .query(
            "SELECT m.code, pm.code AS parent_code, m.name, m.path, m.icon, m.sort, m.enabled
             FROM menu m
             LEFT JOIN menu pm ON pm.id = m.parent_id
             ORDER BY m.sort, m.id",
            &[],
            |row| {
                Ok(MenuRecord {
                    code: row.get("code")?,
                    parent_code: row.get("parent_code")?,
                    name: row.get("name")?,
                    path: row.get("path")?,
                    icon: row.get("icon")?,
                    sort: row.get("sort")?,
                    enabled: row.get::<_, i64>("enabled")? != 0,
                })
            },
        )
        .await?;

    let permissions = store
        .query(
            "SELECT p.code, pp.code AS parent_code, p.level, p.name, p.path, p.description,
                    p.sort, p.enabled
             FROM permission p
             LEFT JOIN permission pp ON pp.id = p.parent_id
             ORDER BY p.sort, p.id",
            &[],
            |row| {
                Ok(PermissionRecord {
                    code: row.get("code")?,
                    parent_code: row.get("parent_code")?,
                    level: level_column(row, "level")?,
                    name: row.get("name")?,
                    path: row.get("path")?,
                    description: row.get("description")?,
                    sort: row.get("sort")?,
                    enabled: row.get::<_, i64>("enabled")? != 0,
                })
            },
        )
        .await?;

    let roles = store
        .query(
            "SELECT code, name, owner, description, enabled FROM role ORDER BY id",
            &[],
            |row| {
                Ok(RoleRecord {
                    code: row.get("code")?,
                    name: row.get("name")?,
                    owner: row.get("owner")?,
                    description: row.get("description")?,
                    enabled: row.get::<_, i64>("enabled")? != 0,
                })
            },
        )
        .await?;

    let role_menus = store
        .query(
            "SELECT r.code, m.code
             FROM role_menu rm
             JOIN role r ON r.id = rm.role_id
             JOIN menu m ON m.id = rm.menu_id
             ORDER BY r.code, m.code",
            &[],
            |row| {
                Ok(RoleMenuRecord {
                    role_code: row.get(0)?,
                    menu_code: row.get(1)?,
                })
            },
        )
        .await?;

    let role_permissions = store
        .query(
            "SELECT r.code, p.code
             FROM role_permission rp
             JOIN role r ON r.id = rp.role_id
             JOIN permission p ON p.id = rp.permission_id
             ORDER BY r.code, p.code",
            &[],
            |row| {
                Ok(RolePermissionRecord {
                    role_code: row.get(0)?,
                    permission_code: row.get(1)?,
                })
            },
        )
        .await?;

    info!(
        menus = menus.len(),
        permissions = permissions.len(),
        roles = roles.len(),
        role_menus = role_menus.len(),
        role_permissions = role_permissions.len(),
        "Exported configuration"
    );
    Ok(SnapshotDocument {
        version: SUPPORTED_VERSION,
        exported_at: Some(Utc::now()),
        menus,
        permissions,
        roles,
        role_menus,
        role_permissions,
    })
}

/// Default download name, `role-config-export-<unix millis>.json`.
pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("role-config-export-{}.json", at.timestamp_millis())
}
