//! Entity CRUD for menus, permissions and roles.
//!
//! Reads are plain async functions over the [`Store`](crate::store::Store).
//! Every write is a [`UnitOfWork`](crate::store::UnitOfWork) type and returns
//! the row as stored.

pub mod menus;
pub mod permissions;
pub mod roles;

pub use menus::{CreateMenu, DeleteMenu, UpdateMenu, get_menu, list_menus, require_menu};
pub use permissions::{
    CreatePermission, DeletePermission, UpdatePermission, get_permission, list_permissions,
    require_permission,
};
pub use roles::{CreateRole, DeleteRole, UpdateRole, get_role, list_roles, require_role};

use rusqlite::types::Value;

use crate::error::{GatehouseError, Result};

/// Reject blank `code`/`name` values before they reach the store.
pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GatehouseError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// `enabled` column value.
pub(crate) fn flag(enabled: bool) -> Value {
    Value::Integer(i64::from(enabled))
}
