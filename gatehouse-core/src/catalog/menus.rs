use rusqlite::Row;
use rusqlite::types::Value;
use tracing::debug;

use crate::error::{GatehouseError, Result};
use crate::hierarchy;
use crate::store::sqlite::{now_timestamp, opt_text, text, timestamp_column};
use crate::store::{Store, UnitOfWork};
use crate::types::{Menu, MenuId, MenuPatch, NewMenu};

use super::{flag, require_text};

const SELECT_MENU: &str = "SELECT id, parent_id, name, code, path, icon, sort, enabled, \
     created_at, updated_at FROM menu";

pub(crate) fn row_to_menu(row: &Row<'_>) -> rusqlite::Result<Menu> {
    Ok(Menu {
        id: MenuId(row.get("id")?),
        parent_id: row.get::<_, Option<i64>>("parent_id")?.map(MenuId),
        name: row.get("name")?,
        code: row.get("code")?,
        path: row.get("path")?,
        icon: row.get("icon")?,
        sort: row.get("sort")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

/// Every menu, ordered `sort, id`.
pub async fn list_menus(store: &Store) -> Result<Vec<Menu>> {
    store
        .query(&format!("{SELECT_MENU} ORDER BY sort, id"), &[], row_to_menu)
        .await
}

pub async fn get_menu(store: &Store, id: MenuId) -> Result<Option<Menu>> {
    store
        .query_opt(
            &format!("{SELECT_MENU} WHERE id = ?1"),
            &[id.into()],
            row_to_menu,
        )
        .await
}

/// Like [`get_menu`], but a missing row is [`GatehouseError::NotFound`].
pub async fn require_menu(store: &Store, id: MenuId) -> Result<Menu> {
    get_menu(store, id)
        .await?
        .ok_or_else(|| GatehouseError::not_found(format!("Menu {id}")))
}

/// Insert a menu. The parent, if any, must exist.
#[derive(Debug, Clone)]
pub struct CreateMenu(pub NewMenu);

#[async_trait::async_trait]
impl UnitOfWork for CreateMenu {
    type Output = Menu;

    fn label(&self) -> &'static str {
        "create-menu"
    }

    async fn run(self, store: &Store) -> Result<Menu> {
        let menu = self.0;
        require_text("code", &menu.code)?;
        require_text("name", &menu.name)?;
        hierarchy::check_menu_parent(store, None, menu.parent_id).await?;

        let exec = store
            .execute(
                "INSERT INTO menu (parent_id, name, code, path, icon, sort, enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                &[
                    menu.parent_id.map_or(Value::Null, Value::from),
                    Value::Text(menu.name),
                    Value::Text(menu.code),
                    opt_text(menu.path.as_deref()),
                    opt_text(menu.icon.as_deref()),
                    Value::Integer(menu.sort),
                    flag(menu.enabled),
                    Value::Text(now_timestamp()),
                ],
            )
            .await?;
        let id = MenuId(exec.last_insert_id);
        debug!(%id, "Created menu");
        require_menu(store, id).await
    }
}

/// Apply a [`MenuPatch`]. A parent change is checked for self-parenting,
/// existence and cycles.
#[derive(Debug, Clone)]
pub struct UpdateMenu {
    pub id: MenuId,
    pub patch: MenuPatch,
}

#[async_trait::async_trait]
impl UnitOfWork for UpdateMenu {
    type Output = Menu;

    fn label(&self) -> &'static str {
        "update-menu"
    }

    async fn run(self, store: &Store) -> Result<Menu> {
        let current = require_menu(store, self.id).await?;
        let patch = self.patch;

        let parent_id = patch.parent_id.unwrap_or(current.parent_id);
        if parent_id != current.parent_id {
            hierarchy::check_menu_parent(store, Some(self.id), parent_id).await?;
        }
        let name = patch.name.unwrap_or(current.name);
        let code = patch.code.unwrap_or(current.code);
        require_text("code", &code)?;
        require_text("name", &name)?;

        store
            .execute(
                "UPDATE menu
                 SET parent_id = ?1, name = ?2, code = ?3, path = ?4, icon = ?5, sort = ?6,
                     enabled = ?7, updated_at = ?8
                 WHERE id = ?9",
                &[
                    parent_id.map_or(Value::Null, Value::from),
                    Value::Text(name),
                    Value::Text(code),
                    opt_text(patch.path.unwrap_or(current.path).as_deref()),
                    opt_text(patch.icon.unwrap_or(current.icon).as_deref()),
                    Value::Integer(patch.sort.unwrap_or(current.sort)),
                    flag(patch.enabled.unwrap_or(current.enabled)),
                    text(&now_timestamp()),
                    self.id.into(),
                ],
            )
            .await?;
        require_menu(store, self.id).await
    }
}

/// Hard delete; descendants and role links go with it.
#[derive(Debug, Clone, Copy)]
pub struct DeleteMenu(pub MenuId);

#[async_trait::async_trait]
impl UnitOfWork for DeleteMenu {
    type Output = ();

    fn label(&self) -> &'static str {
        "delete-menu"
    }

    async fn run(self, store: &Store) -> Result<()> {
        let exec = store
            .execute("DELETE FROM menu WHERE id = ?1", &[self.0.into()])
            .await?;
        if exec.rows_affected == 0 {
            return Err(GatehouseError::not_found(format!("Menu {}", self.0)));
        }
        debug!(id = %self.0, "Deleted menu");
        Ok(())
    }
}
