use gatehouse_core::ErrorKind;
use gatehouse_core::snapshot::{MenuRecord, PermissionRecord, RoleMenuRecord, SnapshotDocument};
use gatehouse_core::types::{MenuPatch, NewMenu, PermissionLevel};
use gatehouse_test::{TestStore, export_without_timestamp, row_counts, seed_admin_console};

fn menu(code: &str, parent: Option<&str>) -> MenuRecord {
    MenuRecord {
        code: code.into(),
        parent_code: parent.map(Into::into),
        name: code.to_uppercase(),
        path: None,
        icon: None,
        sort: 0,
        enabled: true,
    }
}

// ── Round trip ───────────────────────────────────────────────────

#[tokio::test]
async fn export_import_round_trip_is_lossless() {
    let source = TestStore::new();
    seed_admin_console(&source).await;
    // A disabled row must come back disabled
    let menus = source.menus().await.unwrap();
    let audit = menus.iter().find(|m| m.code == "audit").unwrap();
    source
        .update_menu(
            audit.id,
            MenuPatch {
                enabled: Some(false),
                ..MenuPatch::default()
            },
        )
        .await
        .unwrap();

    let json = source.export_json().await.unwrap();

    let target = TestStore::new();
    let summary = target.import_json(&json).await.unwrap();
    assert_eq!(summary.menus, 4);
    assert_eq!(summary.permissions, 3);
    assert_eq!(summary.roles, 2);
    assert_eq!(summary.role_menus, 6);
    assert_eq!(summary.role_permissions, 3);

    assert_eq!(
        export_without_timestamp(&source).await,
        export_without_timestamp(&target).await
    );
}

#[tokio::test]
async fn reimporting_the_same_snapshot_changes_nothing() {
    let store = TestStore::new();
    seed_admin_console(&store).await;
    let before = export_without_timestamp(&store).await;
    let ids: Vec<_> = store.menus().await.unwrap().into_iter().map(|m| m.id).collect();

    let document = store.export().await.unwrap();
    store.import(document).await.unwrap();

    assert_eq!(export_without_timestamp(&store).await, before);
    let after: Vec<_> = store.menus().await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, after);
}

// ── Parent resolution ────────────────────────────────────────────

#[tokio::test]
async fn child_resolves_parent_in_either_order() {
    for menus in [
        vec![menu("root", None), menu("child", Some("root"))],
        vec![menu("child", Some("root")), menu("root", None)],
    ] {
        let store = TestStore::new();
        store
            .import(SnapshotDocument {
                menus,
                ..SnapshotDocument::default()
            })
            .await
            .unwrap();

        let all = store.menus().await.unwrap();
        let root = all.iter().find(|m| m.code == "root").unwrap();
        let child = all.iter().find(|m| m.code == "child").unwrap();
        assert_eq!(root.parent_id, None);
        assert_eq!(child.parent_id, Some(root.id));
    }
}

#[tokio::test]
async fn import_can_attach_to_existing_rows() {
    let store = TestStore::new();
    let existing = store.create_menu(NewMenu::new("home", "Home")).await.unwrap();

    store
        .import(SnapshotDocument {
            menus: vec![menu("news", Some("home"))],
            ..SnapshotDocument::default()
        })
        .await
        .unwrap();
    let news = store
        .menus()
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.code == "news")
        .unwrap();
    assert_eq!(news.parent_id, Some(existing.id));
}

// ── Atomicity ────────────────────────────────────────────────────

#[tokio::test]
async fn failing_import_leaves_store_untouched() {
    let store = TestStore::new();
    seed_admin_console(&store).await;
    let before = export_without_timestamp(&store).await;
    let counts = row_counts(&store).await;

    let mut document = store.export().await.unwrap();
    document.menus[0].name = "Renamed".into();
    document.menus.push(menu("extra", Some("system")));
    document.role_menus.push(RoleMenuRecord {
        role_code: "viewer".into(),
        menu_code: "extra".into(),
    });
    // A method whose parent is itself a method: the import must fail late.
    document.permissions.push(PermissionRecord {
        code: "user:list:csv".into(),
        parent_code: Some("user:list".into()),
        level: PermissionLevel::Method,
        name: "CSV".into(),
        path: None,
        description: None,
        sort: 0,
        enabled: true,
    });

    let err = store.import(document).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("user:list:csv"), "{err}");

    assert_eq!(export_without_timestamp(&store).await, before);
    assert_eq!(row_counts(&store).await, counts);
    assert_eq!(store.writer_stats().rolled_back, 1);
}

#[tokio::test]
async fn cyclic_snapshot_is_rejected() {
    let store = TestStore::new();
    let err = store
        .import(SnapshotDocument {
            menus: vec![menu("a", Some("b")), menu("b", Some("a"))],
            ..SnapshotDocument::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(store.menus().await.unwrap().is_empty());
}

#[tokio::test]
async fn newer_version_is_refused_before_writing() {
    let store = TestStore::new();
    let json = r#"{"version": 2, "roles": [{"code": "r", "name": "R"}]}"#;
    let err = store.import_json(json).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(row_counts(&store).await.roles, 0);
}

#[tokio::test]
async fn snapshot_survives_reopen() {
    let store = TestStore::new();
    seed_admin_console(&store).await;
    let before = export_without_timestamp(&store).await;

    let reopened = store.reopen();
    assert_eq!(export_without_timestamp(&reopened).await, before);
}
