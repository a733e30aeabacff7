use rusqlite::Row;
use rusqlite::types::Value;
use tracing::debug;

use crate::error::{GatehouseError, Result};
use crate::store::sqlite::{now_timestamp, opt_text, timestamp_column};
use crate::store::{Store, UnitOfWork};
use crate::types::{NewRole, Role, RoleId, RolePatch};

use super::{flag, require_text};

const SELECT_ROLE: &str =
    "SELECT id, name, code, owner, description, enabled, created_at, updated_at FROM role";

pub(crate) fn row_to_role(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: RoleId(row.get("id")?),
        name: row.get("name")?,
        code: row.get("code")?,
        owner: row.get("owner")?,
        description: row.get("description")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

/// Every role, newest first.
pub async fn list_roles(store: &Store) -> Result<Vec<Role>> {
    store
        .query(&format!("{SELECT_ROLE} ORDER BY id DESC"), &[], row_to_role)
        .await
}

pub async fn get_role(store: &Store, id: RoleId) -> Result<Option<Role>> {
    store
        .query_opt(&format!("{SELECT_ROLE} WHERE id = ?1"), &[id.into()], row_to_role)
        .await
}

pub async fn require_role(store: &Store, id: RoleId) -> Result<Role> {
    get_role(store, id)
        .await?
        .ok_or_else(|| GatehouseError::not_found(format!("Role {id}")))
}

#[derive(Debug, Clone)]
pub struct CreateRole(pub NewRole);

#[async_trait::async_trait]
impl UnitOfWork for CreateRole {
    type Output = Role;

    fn label(&self) -> &'static str {
        "create-role"
    }

    async fn run(self, store: &Store) -> Result<Role> {
        let role = self.0;
        require_text("code", &role.code)?;
        require_text("name", &role.name)?;

        let exec = store
            .execute(
                "INSERT INTO role (name, code, owner, description, enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                &[
                    Value::Text(role.name),
                    Value::Text(role.code),
                    opt_text(role.owner.as_deref()),
                    opt_text(role.description.as_deref()),
                    flag(role.enabled),
                    Value::Text(now_timestamp()),
                ],
            )
            .await?;
        let id = RoleId(exec.last_insert_id);
        debug!(%id, "Created role");
        require_role(store, id).await
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRole {
    pub id: RoleId,
    pub patch: RolePatch,
}

#[async_trait::async_trait]
impl UnitOfWork for UpdateRole {
    type Output = Role;

    fn label(&self) -> &'static str {
        "update-role"
    }

    async fn run(self, store: &Store) -> Result<Role> {
        let current = require_role(store, self.id).await?;
        let patch = self.patch;
        let name = patch.name.unwrap_or(current.name);
        let code = patch.code.unwrap_or(current.code);
        require_text("code", &code)?;
        require_text("name", &name)?;

        store
            .execute(
                "UPDATE role
                 SET name = ?1, code = ?2, owner = ?3, description = ?4, enabled = ?5,
                     updated_at = ?6
                 WHERE id = ?7",
                &[
                    Value::Text(name),
                    Value::Text(code),
                    opt_text(patch.owner.unwrap_or(current.owner).as_deref()),
                    opt_text(patch.description.unwrap_or(current.description).as_deref()),
                    flag(patch.enabled.unwrap_or(current.enabled)),
                    Value::Text(now_timestamp()),
                    self.id.into(),
                ],
            )
            .await?;
        require_role(store, self.id).await
    }
}

/// Hard delete; the role's menu and permission links go with it.
#[derive(Debug, Clone, Copy)]
pub struct DeleteRole(pub RoleId);

#[async_trait::async_trait]
impl UnitOfWork for DeleteRole {
    type Output = ();

    fn label(&self) -> &'static str {
        "delete-role"
    }

    async fn run(self, store: &Store) -> Result<()> {
        let exec = store
            .execute("DELETE FROM role WHERE id = ?1", &[self.0.into()])
            .await?;
        if exec.rows_affected == 0 {
            return Err(GatehouseError::not_found(format!("Role {}", self.0)));
        }
        debug!(id = %self.0, "Deleted role");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = Store::in_memory().unwrap();
        for code in ["admin", "auditor", "guest"] {
            store
                .run_exclusive(CreateRole(NewRole::new(code, code.to_uppercase())))
                .await
                .unwrap();
        }
        let codes: Vec<String> = list_roles(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(codes, vec!["guest", "auditor", "admin"]);
    }

    #[tokio::test]
    async fn update_owner_and_disable() {
        let store = Store::in_memory().unwrap();
        let mut new = NewRole::new("ops", "Operations");
        new.owner = Some("alice".into());
        let role = store.run_exclusive(CreateRole(new)).await.unwrap();
        assert_eq!(role.owner.as_deref(), Some("alice"));

        let updated = store
            .run_exclusive(UpdateRole {
                id: role.id,
                patch: RolePatch {
                    owner: Some(None),
                    enabled: Some(false),
                    ..RolePatch::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(updated.owner, None);
        assert!(!updated.enabled);
        assert_eq!(updated.name, "Operations");
    }

    #[tokio::test]
    async fn renaming_onto_existing_code_is_conflict() {
        let store = Store::in_memory().unwrap();
        store
            .run_exclusive(CreateRole(NewRole::new("a", "A")))
            .await
            .unwrap();
        let b = store
            .run_exclusive(CreateRole(NewRole::new("b", "B")))
            .await
            .unwrap();
        let err = store
            .run_exclusive(UpdateRole {
                id: b.id,
                patch: RolePatch {
                    code: Some("a".into()),
                    ..RolePatch::default()
                },
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(require_role(&store, b.id).await.unwrap().code, "b");
    }

    #[tokio::test]
    async fn delete_missing_role_is_not_found() {
        let store = Store::in_memory().unwrap();
        let err = store.run_exclusive(DeleteRole(RoleId(1))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(get_role(&store, RoleId(1)).await.unwrap().is_none());
    }
}
