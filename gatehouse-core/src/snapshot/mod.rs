//! Portable configuration snapshots keyed by `code`.
//!
//! A [`SnapshotDocument`] carries no numeric ids: parents and association
//! endpoints are referenced by code, so a document exported from one store
//! can be imported into another whose ids differ.

pub mod export;
pub mod import;

pub use export::{export, export_file_name};
pub use import::{ImportSnapshot, ImportSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatehouseError, Result, SnapshotError};
use crate::types::PermissionLevel;

/// Highest document version this build reads and the version it writes.
pub const SUPPORTED_VERSION: i64 = 1;

fn default_version() -> i64 {
    SUPPORTED_VERSION
}

fn default_enabled() -> bool {
    true
}

/// `enabled` travels as `0`/`1`; `true`/`false` are accepted on input.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(i64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => b,
            Raw::Int(i) => i != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuRecord {
    pub code: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort: i64,
    #[serde(default = "default_enabled", with = "flag")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub code: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    pub level: PermissionLevel,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort: i64,
    #[serde(default = "default_enabled", with = "flag")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled", with = "flag")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMenuRecord {
    pub role_code: String,
    pub menu_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionRecord {
    pub role_code: String,
    pub permission_code: String,
}

/// The whole configuration. Every collection is optional on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub menus: Vec<MenuRecord>,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    #[serde(default)]
    pub roles: Vec<RoleRecord>,
    #[serde(default)]
    pub role_menus: Vec<RoleMenuRecord>,
    #[serde(default)]
    pub role_permissions: Vec<RolePermissionRecord>,
}

impl Default for SnapshotDocument {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            exported_at: None,
            menus: Vec::new(),
            permissions: Vec::new(),
            roles: Vec::new(),
            role_menus: Vec::new(),
            role_permissions: Vec::new(),
        }
    }
}

fn require(field: &str, index: usize, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GatehouseError::validation(format!(
            "{field} #{index}: code and name must not be empty"
        )));
    }
    Ok(())
}

impl SnapshotDocument {
    /// Parse a document from JSON text.
    ///
    /// Only a top-level object is accepted; serde would otherwise fill the
    /// fields of a JSON array by position.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(SnapshotError::Json)?;
        let found = match &value {
            serde_json::Value::Object(_) => {
                return Ok(serde_json::from_value(value).map_err(SnapshotError::Json)?);
            }
            serde_json::Value::Array(_) => "array",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Null => "null",
        };
        Err(SnapshotError::NotAnObject(found).into())
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let text = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        Ok(text.map_err(SnapshotError::Json)?)
    }

    /// Reject documents this build cannot apply, before any write happens.
    pub fn validate(&self) -> Result<()> {
        if self.version > SUPPORTED_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SUPPORTED_VERSION,
            }
            .into());
        }
        for (i, m) in self.menus.iter().enumerate() {
            require("menus", i, &m.code)?;
            require("menus", i, &m.name)?;
        }
        for (i, p) in self.permissions.iter().enumerate() {
            require("permissions", i, &p.code)?;
            require("permissions", i, &p.name)?;
        }
        for (i, r) in self.roles.iter().enumerate() {
            require("roles", i, &r.code)?;
            require("roles", i, &r.name)?;
        }
        for (i, rm) in self.role_menus.iter().enumerate() {
            require("roleMenus", i, &rm.role_code)?;
            require("roleMenus", i, &rm.menu_code)?;
        }
        for (i, rp) in self.role_permissions.iter().enumerate() {
            require("rolePermissions", i, &rp.role_code)?;
            require("rolePermissions", i, &rp.permission_code)?;
        }
        Ok(())
    }
}
