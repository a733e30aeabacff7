use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatehouse_core::catalog::CreateRole;
use gatehouse_core::store::{Store, UnitOfWork};
use gatehouse_core::types::{NewMenu, NewRole, Role};
use gatehouse_core::{GatehouseError, Result};
use gatehouse_test::{TestStore, row_counts};

/// Creates a role, recording when its body starts and ends.
#[derive(Debug)]
struct Traced {
    id: usize,
    log: Arc<Mutex<Vec<(usize, &'static str)>>>,
    fail: bool,
}

#[async_trait::async_trait]
impl UnitOfWork for Traced {
    type Output = Role;

    fn label(&self) -> &'static str {
        "traced"
    }

    async fn run(self, store: &Store) -> Result<Role> {
        self.log.lock().unwrap().push((self.id, "enter"));
        tokio::time::sleep(Duration::from_millis(2)).await;
        let role = CreateRole(NewRole::new(format!("r{}", self.id), "Traced"))
            .run(store)
            .await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.log.lock().unwrap().push((self.id, "exit"));
        if self.fail {
            return Err(GatehouseError::validation("forced failure"));
        }
        Ok(role)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transaction_bodies_never_interleave() {
    let store = TestStore::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for id in 0..16 {
        let gatehouse = store.gatehouse.clone();
        let log = Arc::clone(&log);
        handles.push(tokio::spawn(async move {
            gatehouse
                .store()
                .run_exclusive(Traced {
                    id,
                    log,
                    fail: id % 4 == 3,
                })
                .await
        }));
    }
    let mut failed = 0;
    for handle in handles {
        if handle.await.unwrap().is_err() {
            failed += 1;
        }
    }
    assert_eq!(failed, 4);

    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 32);
    for pair in log.chunks(2) {
        assert_eq!(pair[0].1, "enter");
        assert_eq!(pair[1], (pair[0].0, "exit"), "bodies interleaved: {log:?}");
    }

    // Failed bodies were rolled back; the rest committed.
    assert_eq!(row_counts(&store).await.roles, 12);
    let stats = store.writer_stats();
    assert_eq!(stats.committed, 12);
    assert_eq!(stats.rolled_back, 4);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_facade_writes_all_land() {
    let store = TestStore::new();
    let parent = store.create_menu(NewMenu::new("root", "Root")).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..20 {
        let gatehouse = store.gatehouse.clone();
        handles.push(tokio::spawn(async move {
            gatehouse
                .create_menu(NewMenu::new(format!("leaf{i}"), format!("Leaf {i}")).with_parent(parent))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let tree = store.menu_tree().await.unwrap();
    assert_eq!(tree.children(parent.0).count(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conflicting_concurrent_creates_admit_one() {
    let store = TestStore::new();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gatehouse = store.gatehouse.clone();
        handles.push(tokio::spawn(async move {
            gatehouse.create_role(NewRole::new("shared", "Shared")).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert_eq!(err.kind(), gatehouse_core::ErrorKind::Conflict),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(row_counts(&store).await.roles, 1);
}
