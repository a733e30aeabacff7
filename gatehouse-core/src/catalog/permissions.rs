use rusqlite::Row;
use rusqlite::types::{Type, Value};
use tracing::debug;

use crate::error::{GatehouseError, Result};
use crate::hierarchy;
use crate::store::sqlite::{now_timestamp, opt_text, timestamp_column};
use crate::store::{Store, UnitOfWork};
use crate::types::{NewPermission, Permission, PermissionId, PermissionLevel, PermissionPatch};

use super::{flag, require_text};

const SELECT_PERMISSION: &str = "SELECT id, parent_id, level, name, code, path, description, \
     sort, enabled, created_at, updated_at FROM permission";

pub(crate) fn level_column(row: &Row<'_>, column: &str) -> rusqlite::Result<PermissionLevel> {
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: String| {
        let idx = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

pub(crate) fn row_to_permission(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: PermissionId(row.get("id")?),
        parent_id: row.get::<_, Option<i64>>("parent_id")?.map(PermissionId),
        level: level_column(row, "level")?,
        name: row.get("name")?,
        code: row.get("code")?,
        path: row.get("path")?,
        description: row.get("description")?,
        sort: row.get("sort")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

/// Every permission, ordered `sort, id`.
pub async fn list_permissions(store: &Store) -> Result<Vec<Permission>> {
    store
        .query(
            &format!("{SELECT_PERMISSION} ORDER BY sort, id"),
            &[],
            row_to_permission,
        )
        .await
}

pub async fn get_permission(store: &Store, id: PermissionId) -> Result<Option<Permission>> {
    store
        .query_opt(
            &format!("{SELECT_PERMISSION} WHERE id = ?1"),
            &[id.into()],
            row_to_permission,
        )
        .await
}

pub async fn require_permission(store: &Store, id: PermissionId) -> Result<Permission> {
    get_permission(store, id)
        .await?
        .ok_or_else(|| GatehouseError::not_found(format!("Permission {id}")))
}

/// Insert a permission after checking the class/method placement rule.
#[derive(Debug, Clone)]
pub struct CreatePermission(pub NewPermission);

#[async_trait::async_trait]
impl UnitOfWork for CreatePermission {
    type Output = Permission;

    fn label(&self) -> &'static str {
        "create-permission"
    }

    async fn run(self, store: &Store) -> Result<Permission> {
        let perm = self.0;
        require_text("code", &perm.code)?;
        require_text("name", &perm.name)?;
        hierarchy::check_permission_placement(store, None, perm.level, perm.parent_id).await?;

        let exec = store
            .execute(
                "INSERT INTO permission
                   (parent_id, level, name, code, path, description, sort, enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                &[
                    perm.parent_id.map_or(Value::Null, Value::from),
                    Value::Text(perm.level.as_str().to_owned()),
                    Value::Text(perm.name),
                    Value::Text(perm.code),
                    opt_text(perm.path.as_deref()),
                    opt_text(perm.description.as_deref()),
                    Value::Integer(perm.sort),
                    flag(perm.enabled),
                    Value::Text(now_timestamp()),
                ],
            )
            .await?;
        let id = PermissionId(exec.last_insert_id);
        debug!(%id, level = %perm.level, "Created permission");
        require_permission(store, id).await
    }
}

/// Apply a [`PermissionPatch`]. The merged level and parent are re-checked.
#[derive(Debug, Clone)]
pub struct UpdatePermission {
    pub id: PermissionId,
    pub patch: PermissionPatch,
}

#[async_trait::async_trait]
impl UnitOfWork for UpdatePermission {
    type Output = Permission;

    fn label(&self) -> &'static str {
        "update-permission"
    }

    async fn run(self, store: &Store) -> Result<Permission> {
        let current = require_permission(store, self.id).await?;
        let patch = self.patch;

        let level = patch.level.unwrap_or(current.level);
        let parent_id = patch.parent_id.unwrap_or(current.parent_id);
        if level != current.level || parent_id != current.parent_id {
            hierarchy::check_permission_placement(store, Some(self.id), level, parent_id).await?;
        }
        let name = patch.name.unwrap_or(current.name);
        let code = patch.code.unwrap_or(current.code);
        require_text("code", &code)?;
        require_text("name", &name)?;

        store
            .execute(
                "UPDATE permission
                 SET parent_id = ?1, level = ?2, name = ?3, code = ?4, path = ?5,
                     description = ?6, sort = ?7, enabled = ?8, updated_at = ?9
                 WHERE id = ?10",
                &[
                    parent_id.map_or(Value::Null, Value::from),
                    Value::Text(level.as_str().to_owned()),
                    Value::Text(name),
                    Value::Text(code),
                    opt_text(patch.path.unwrap_or(current.path).as_deref()),
                    opt_text(patch.description.unwrap_or(current.description).as_deref()),
                    Value::Integer(patch.sort.unwrap_or(current.sort)),
                    flag(patch.enabled.unwrap_or(current.enabled)),
                    Value::Text(now_timestamp()),
                    self.id.into(),
                ],
            )
            .await?;
        require_permission(store, self.id).await
    }
}

/// Hard delete; method children and role links go with it.
#[derive(Debug, Clone, Copy)]
pub struct DeletePermission(pub PermissionId);

#[async_trait::async_trait]
impl UnitOfWork for DeletePermission {
    type Output = ();

    fn label(&self) -> &'static str {
        "delete-permission"
    }

    async fn run(self, store: &Store) -> Result<()> {
        let exec = store
            .execute("DELETE FROM permission WHERE id = ?1", &[self.0.into()])
            .await?;
        if exec.rows_affected == 0 {
            return Err(GatehouseError::not_found(format!("Permission {}", self.0)));
        }
        debug!(id = %self.0, "Deleted permission");
        Ok(())
    }
}
