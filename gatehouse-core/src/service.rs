use std::sync::Arc;

use crate::associations::{self, BulkUpdate, SetAssociations};
use crate::catalog::{
    self, CreateMenu, CreatePermission, CreateRole, DeleteMenu, DeletePermission, DeleteRole,
    UpdateMenu, UpdatePermission, UpdateRole,
};
use crate::config::GatehouseConfig;
use crate::error::Result;
use crate::hierarchy::ReorderSiblings;
use crate::snapshot::{self, ImportSnapshot, ImportSummary, SnapshotDocument};
use crate::store::{SerializerStats, Store};
use crate::tree::Forest;
use crate::types::{
    AssociationKind, BulkAction, BulkOutcome, Menu, MenuId, MenuPatch, NewMenu, NewPermission,
    NewRole, Permission, PermissionId, PermissionPatch, Role, RoleId, RolePatch, StoreStats,
    TreeTable,
};

/// High-level handle over one [`Store`].
///
/// Reads go straight to the store; every mutation is queued on the store's
/// write serializer and runs as one transaction.
#[derive(Debug, Clone)]
pub struct Gatehouse {
    store: Arc<Store>,
    config: GatehouseConfig,
}

impl Gatehouse {
    /// Open the store described by `config`.
    pub fn open(config: GatehouseConfig) -> Result<Self> {
        let store = Store::open_with(&config.store)?;
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    /// Wrap an already-open store.
    pub fn from_store(store: Arc<Store>, config: GatehouseConfig) -> Self {
        Self { store, config }
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_store(
            Arc::new(Store::in_memory()?),
            GatehouseConfig::default(),
        ))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    pub fn writer_stats(&self) -> SerializerStats {
        self.store.serializer().stats()
    }

    // ── Menus ──────────────────────────────────────────────────────

    pub async fn menus(&self) -> Result<Vec<Menu>> {
        catalog::list_menus(&self.store).await
    }

    pub async fn menu_tree(&self) -> Result<Forest<Menu>> {
        Ok(Forest::build(self.menus().await?))
    }

    pub async fn menu(&self, id: MenuId) -> Result<Menu> {
        catalog::require_menu(&self.store, id).await
    }

    pub async fn create_menu(&self, menu: NewMenu) -> Result<Menu> {
        self.store.run_exclusive(CreateMenu(menu)).await
    }

    pub async fn update_menu(&self, id: MenuId, patch: MenuPatch) -> Result<Menu> {
        self.store.run_exclusive(UpdateMenu { id, patch }).await
    }

    pub async fn delete_menu(&self, id: MenuId) -> Result<()> {
        self.store.run_exclusive(DeleteMenu(id)).await
    }

    /// Renumber the children of `parent` (`None` for roots) in the given order.
    pub async fn reorder_menus(&self, parent: Option<MenuId>, ids: &[MenuId]) -> Result<()> {
        self.store
            .run_exclusive(ReorderSiblings {
                table: TreeTable::Menu,
                parent: parent.map(|p| p.0),
                ids: ids.iter().map(|id| id.0).collect(),
            })
            .await
            .map(drop)
    }

    // ── Permissions ────────────────────────────────────────────────

    pub async fn permissions(&self) -> Result<Vec<Permission>> {
        catalog::list_permissions(&self.store).await
    }

    pub async fn permission_tree(&self) -> Result<Forest<Permission>> {
        Ok(Forest::build(self.permissions().await?))
    }

    pub async fn permission(&self, id: PermissionId) -> Result<Permission> {
        catalog::require_permission(&self.store, id).await
    }

    pub async fn create_permission(&self, permission: NewPermission) -> Result<Permission> {
        self.store.run_exclusive(CreatePermission(permission)).await
    }

    pub async fn update_permission(
        &self,
        id: PermissionId,
        patch: PermissionPatch,
    ) -> Result<Permission> {
        self.store.run_exclusive(UpdatePermission { id, patch }).await
    }

    pub async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        self.store.run_exclusive(DeletePermission(id)).await
    }

    pub async fn reorder_permissions(
        &self,
        parent: Option<PermissionId>,
        ids: &[PermissionId],
    ) -> Result<()> {
        self.store
            .run_exclusive(ReorderSiblings {
                table: TreeTable::Permission,
                parent: parent.map(|p| p.0),
                ids: ids.iter().map(|id| id.0).collect(),
            })
            .await
            .map(drop)
    }

    // ── Roles and associations ─────────────────────────────────────

    pub async fn roles(&self) -> Result<Vec<Role>> {
        catalog::list_roles(&self.store).await
    }

    pub async fn role(&self, id: RoleId) -> Result<Role> {
        catalog::require_role(&self.store, id).await
    }

    pub async fn create_role(&self, role: NewRole) -> Result<Role> {
        self.store.run_exclusive(CreateRole(role)).await
    }

    pub async fn update_role(&self, id: RoleId, patch: RolePatch) -> Result<Role> {
        self.store.run_exclusive(UpdateRole { id, patch }).await
    }

    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        self.store.run_exclusive(DeleteRole(id)).await
    }

    pub async fn role_menus(&self, role: RoleId) -> Result<Vec<MenuId>> {
        associations::role_menu_ids(&self.store, role).await
    }

    pub async fn role_permissions(&self, role: RoleId) -> Result<Vec<PermissionId>> {
        associations::role_permission_ids(&self.store, role).await
    }

    pub async fn set_role_menus(&self, role: RoleId, menus: &[MenuId]) -> Result<usize> {
        self.store
            .run_exclusive(SetAssociations::menus(role, menus.iter().copied()))
            .await
    }

    pub async fn set_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<usize> {
        self.store
            .run_exclusive(SetAssociations::permissions(role, permissions.iter().copied()))
            .await
    }

    pub async fn bulk_update(
        &self,
        kind: AssociationKind,
        roles: &[RoleId],
        targets: &[i64],
        action: BulkAction,
    ) -> Result<BulkOutcome> {
        self.store
            .run_exclusive(BulkUpdate {
                kind,
                roles: roles.to_vec(),
                targets: targets.to_vec(),
                action,
            })
            .await
    }

    // ── Snapshots ──────────────────────────────────────────────────

    pub async fn export(&self) -> Result<SnapshotDocument> {
        snapshot::export(&self.store).await
    }

    /// Export as JSON text, pretty-printed per `[snapshot] pretty`.
    pub async fn export_json(&self) -> Result<String> {
        self.export().await?.to_json(self.config.snapshot.pretty)
    }

    /// Apply a snapshot. A document this build cannot apply is refused
    /// before a transaction is opened.
    pub async fn import(&self, document: SnapshotDocument) -> Result<ImportSummary> {
        document.validate()?;
        self.store.run_exclusive(ImportSnapshot(document)).await
    }

    pub async fn import_json(&self, text: &str) -> Result<ImportSummary> {
        self.import(SnapshotDocument::from_json(text)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn facade_covers_a_full_configuration() {
        let gh = Gatehouse::in_memory().unwrap();
        let root = gh.create_menu(NewMenu::new("root", "Root")).await.unwrap();
        let a = gh
            .create_menu(NewMenu::new("a", "A").with_parent(root.id))
            .await
            .unwrap();
        let b = gh
            .create_menu(NewMenu::new("b", "B").with_parent(root.id))
            .await
            .unwrap();
        gh.reorder_menus(Some(root.id), &[b.id, a.id]).await.unwrap();
        assert_eq!(gh.menu_tree().await.unwrap().collect_ids(), vec![root.id.0, b.id.0, a.id.0]);

        let class = gh
            .create_permission(NewPermission::class("user", "User"))
            .await
            .unwrap();
        let role = gh.create_role(NewRole::new("admin", "Admin")).await.unwrap();
        gh.set_role_menus(role.id, &[a.id, b.id]).await.unwrap();
        gh.set_role_permissions(role.id, &[class.id]).await.unwrap();
        assert_eq!(gh.role_menus(role.id).await.unwrap(), vec![a.id, b.id]);

        let stats = gh.stats().await.unwrap();
        assert_eq!((stats.menus, stats.role_menus, stats.role_permissions), (3, 2, 1));
        assert_eq!(gh.writer_stats().pending, 0);
    }

    #[tokio::test]
    async fn export_json_respects_pretty_setting() {
        let mut config = GatehouseConfig::default();
        config.snapshot.pretty = false;
        let gh = Gatehouse::from_store(Arc::new(Store::in_memory().unwrap()), config);
        let json = gh.export_json().await.unwrap();
        assert!(!json.contains('\n'));
        assert!(json.starts_with("{\"version\":1"));
    }

    #[tokio::test]
    async fn import_json_reports_validation_kind() {
        let gh = Gatehouse::in_memory().unwrap();
        let err = gh.import_json("[]").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = gh
            .import_json(r#"[1, null, [{"code":"m","name":"M"}]]"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(gh.stats().await.unwrap().menus, 0);
    }

    #[tokio::test]
    async fn unsupported_import_never_opens_a_transaction() {
        let gh = Gatehouse::in_memory().unwrap();
        let err = gh
            .import_json(r#"{"version":2,"roles":[{"code":"r","name":"R"}]}"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let stats = gh.writer_stats();
        assert_eq!((stats.committed, stats.rolled_back), (0, 0));
        assert_eq!(gh.stats().await.unwrap().roles, 0);
    }
}
