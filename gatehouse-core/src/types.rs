use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

// ── Typed ID wrappers ──────────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Value {
            fn from(id: $name) -> Self {
                Value::Integer(id.0)
            }
        }
    };
}

typed_id!(MenuId);
typed_id!(PermissionId);
typed_id!(RoleId);

// ── Tree tables ────────────────────────────────────────────────────

/// The two self-referential tables that share parent/sort handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeTable {
    Menu,
    Permission,
}

impl TreeTable {
    pub fn table(self) -> &'static str {
        match self {
            Self::Menu => "menu",
            Self::Permission => "permission",
        }
    }

    /// Capitalized entity name for messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Menu => "Menu",
            Self::Permission => "Permission",
        }
    }
}

// ── Permission level ───────────────────────────────────────────────

/// Position of a permission in the fixed two-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// Top level; never has a parent.
    Class,
    /// Leaf level; parent must be a `Class` permission.
    Method,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" => Ok(Self::Class),
            "method" => Ok(Self::Method),
            other => Err(format!("unknown permission level: {other}")),
        }
    }
}

// ── Stored records ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub id: MenuId,
    pub parent_id: Option<MenuId>,
    pub name: String,
    pub code: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: PermissionId,
    pub parent_id: Option<PermissionId>,
    pub level: PermissionLevel,
    pub name: String,
    pub code: String,
    pub path: Option<String>,
    pub description: Option<String>,
    pub sort: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub code: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Inputs ─────────────────────────────────────────────────────────

/// Fields for a new menu. Construct with [`NewMenu::new`] and adjust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMenu {
    pub parent_id: Option<MenuId>,
    pub name: String,
    pub code: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort: i64,
    pub enabled: bool,
}

impl NewMenu {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            name: name.into(),
            code: code.into(),
            path: None,
            icon: None,
            sort: 0,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: MenuId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

/// Partial menu update. `None` keeps the stored value; for nullable
/// columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuPatch {
    pub parent_id: Option<Option<MenuId>>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub path: Option<Option<String>>,
    pub icon: Option<Option<String>>,
    pub sort: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    pub parent_id: Option<PermissionId>,
    pub level: PermissionLevel,
    pub name: String,
    pub code: String,
    pub path: Option<String>,
    pub description: Option<String>,
    pub sort: i64,
    pub enabled: bool,
}

impl NewPermission {
    /// A top-level `class` permission.
    pub fn class(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            level: PermissionLevel::Class,
            name: name.into(),
            code: code.into(),
            path: None,
            description: None,
            sort: 0,
            enabled: true,
        }
    }

    /// A `method` permission under `parent`.
    pub fn method(parent: PermissionId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent),
            level: PermissionLevel::Method,
            ..Self::class(code, name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionPatch {
    pub parent_id: Option<Option<PermissionId>>,
    pub level: Option<PermissionLevel>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub path: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub sort: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub code: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
}

impl NewRole {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            owner: None,
            description: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub owner: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub enabled: Option<bool>,
}

// ── Associations ───────────────────────────────────────────────────

/// Which role link table an association operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationKind {
    Menus,
    Permissions,
}

impl AssociationKind {
    pub fn link_table(self) -> &'static str {
        match self {
            Self::Menus => "role_menu",
            Self::Permissions => "role_permission",
        }
    }

    pub fn target_column(self) -> &'static str {
        match self {
            Self::Menus => "menu_id",
            Self::Permissions => "permission_id",
        }
    }

    pub fn target(self) -> TreeTable {
        match self {
            Self::Menus => TreeTable::Menu,
            Self::Permissions => TreeTable::Permission,
        }
    }
}

/// Direction of a bulk association update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Bind,
    Unbind,
}

impl BulkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Unbind => "unbind",
        }
    }
}

impl FromStr for BulkAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bind" => Ok(Self::Bind),
            "unbind" => Ok(Self::Unbind),
            other => Err(format!("unknown bulk action: {other}")),
        }
    }
}

/// Rows actually changed by a bulk bind/unbind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub action: BulkAction,
    pub inserted: u64,
    pub deleted: u64,
}

// ── Store statistics ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub menus: u64,
    pub permissions: u64,
    pub roles: u64,
    pub role_menus: u64,
    pub role_permissions: u64,
    pub db_size_bytes: u64,
}
