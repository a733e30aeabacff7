// Integration test utilities and fixtures for Gatehouse.

use std::path::{Path, PathBuf};

use gatehouse_core::Gatehouse;
use gatehouse_core::config::GatehouseConfig;
use gatehouse_core::types::{
    MenuId, NewMenu, NewPermission, NewRole, PermissionId, RoleId, StoreStats,
};

/// A Gatehouse backed by a database file in a temporary directory.
#[derive(Debug)]
pub struct TestStore {
    pub dir: tempfile::TempDir,
    pub gatehouse: Gatehouse,
}

impl TestStore {
    /// Fresh, empty on-disk store.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let gatehouse = Gatehouse::open(config_for(&dir.path().join("gatehouse.db")))
            .expect("open store");
        Self { dir, gatehouse }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("gatehouse.db")
    }

    /// A second handle on the same database file.
    pub fn reopen(&self) -> Gatehouse {
        Gatehouse::open(config_for(&self.db_path())).expect("reopen store")
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Gatehouse;

    fn deref(&self) -> &Gatehouse {
        &self.gatehouse
    }
}

fn config_for(path: &Path) -> GatehouseConfig {
    let mut config = GatehouseConfig::default();
    config.store.path = path.to_path_buf();
    config
}

/// Ids of the rows created by [`seed_admin_console`].
#[derive(Debug, Clone)]
pub struct Seeded {
    pub system: MenuId,
    pub users: MenuId,
    pub roles_menu: MenuId,
    pub audit: MenuId,
    pub user_class: PermissionId,
    pub user_list: PermissionId,
    pub user_edit: PermissionId,
    pub admin: RoleId,
    pub viewer: RoleId,
}

/// A small admin console: a `system` menu with three children, a `user`
/// permission class with two methods, and two roles with links.
pub async fn seed_admin_console(gatehouse: &Gatehouse) -> Seeded {
    let system = gatehouse
        .create_menu(NewMenu {
            path: Some("/system".into()),
            icon: Some("gear".into()),
            ..NewMenu::new("system", "System")
        })
        .await
        .unwrap()
        .id;
    let mut children = Vec::new();
    for (sort, code, name) in [(10, "users", "Users"), (20, "roles", "Roles"), (30, "audit", "Audit")] {
        let menu = gatehouse
            .create_menu(NewMenu {
                path: Some(format!("/system/{code}")),
                sort,
                ..NewMenu::new(code, name).with_parent(system)
            })
            .await
            .unwrap();
        children.push(menu.id);
    }

    let user_class = gatehouse
        .create_permission(NewPermission {
            path: Some("/api/users".into()),
            ..NewPermission::class("user", "User")
        })
        .await
        .unwrap()
        .id;
    let user_list = gatehouse
        .create_permission(NewPermission::method(user_class, "user:list", "List users"))
        .await
        .unwrap()
        .id;
    let user_edit = gatehouse
        .create_permission(NewPermission {
            description: Some("Edit any user".into()),
            sort: 10,
            ..NewPermission::method(user_class, "user:edit", "Edit user")
        })
        .await
        .unwrap()
        .id;

    let admin = gatehouse
        .create_role(NewRole {
            owner: Some("ops".into()),
            ..NewRole::new("admin", "Administrator")
        })
        .await
        .unwrap()
        .id;
    let viewer = gatehouse
        .create_role(NewRole::new("viewer", "Viewer"))
        .await
        .unwrap()
        .id;

    gatehouse
        .set_role_menus(admin, &[system, children[0], children[1], children[2]])
        .await
        .unwrap();
    gatehouse
        .set_role_permissions(admin, &[user_list, user_edit])
        .await
        .unwrap();
    gatehouse.set_role_menus(viewer, &[system, children[0]]).await.unwrap();
    gatehouse.set_role_permissions(viewer, &[user_list]).await.unwrap();

    Seeded {
        system,
        users: children[0],
        roles_menu: children[1],
        audit: children[2],
        user_class,
        user_list,
        user_edit,
        admin,
        viewer,
    }
}

/// A chain of `len` menus, each the child of the one before.
pub async fn menu_chain(gatehouse: &Gatehouse, prefix: &str, len: usize) -> Vec<MenuId> {
    let mut ids: Vec<MenuId> = Vec::with_capacity(len);
    for i in 0..len {
        let mut menu = NewMenu::new(format!("{prefix}{i}"), format!("{prefix} {i}"));
        menu.parent_id = ids.last().copied();
        ids.push(gatehouse.create_menu(menu).await.unwrap().id);
    }
    ids
}

/// Export as JSON with `exportedAt` removed, for comparing two stores.
pub async fn export_without_timestamp(gatehouse: &Gatehouse) -> serde_json::Value {
    let mut value = serde_json::to_value(gatehouse.export().await.unwrap()).unwrap();
    if let Some(object) = value.as_object_mut() {
        object.remove("exportedAt");
    }
    value
}

/// Row counts only; the file size moves with WAL checkpoints.
pub async fn row_counts(gatehouse: &Gatehouse) -> StoreStats {
    StoreStats {
        db_size_bytes: 0,
        ..gatehouse.stats().await.unwrap()
    }
}
