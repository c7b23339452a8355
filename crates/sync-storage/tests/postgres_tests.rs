//! PgStore tests against a live Postgres.
//!
//! Opt-in: they are skipped unless `METASYNC_TEST_PG_HOST` is set. The
//! database named by `METASYNC_TEST_DB_*` is used for both environments and
//! its metadata tables are truncated between tests.
//!
//! ```bash
//! METASYNC_TEST_PG_HOST=localhost METASYNC_TEST_DB_PASSWORD=postgres \
//!     cargo test -p metasync-storage --test postgres_tests
//! ```

use metasync_core::{
    quote_ident, EntityDraft, EntityKind, Environment, Role, RoleDraft, SyncError, System,
    SystemDraft,
};
use metasync_storage::{DbSettings, MetadataStore, PgStore, SyncService, UpsertOutcome};
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

static DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn test_settings(host: &str) -> DbSettings {
    DbSettings::from_lookup("METASYNC_TEST", |key| {
        if key == "METASYNC_TEST_DB_HOST" {
            Some(host.to_string())
        } else {
            std::env::var(key).ok()
        }
    })
    .expect("valid test settings")
}

/// Connect, create the schema and empty every table.
async fn fresh_store(settings: &DbSettings, environment: Environment) -> PgStore {
    let store = PgStore::connect(settings, environment)
        .await
        .expect("connect to test database");
    store.initialize().await.expect("initialize schema");
    sqlx::query("TRUNCATE roles, category, systems, catalog, context, table_audit RESTART IDENTITY")
        .execute(store.pool())
        .await
        .expect("truncate tables");
    store
}

/// Skip unless a test database is configured; serialize tests sharing it.
async fn test_guard(name: &str) -> Option<(MutexGuard<'static, ()>, PgStore)> {
    let Ok(host) = std::env::var("METASYNC_TEST_PG_HOST") else {
        eprintln!("skipping {name}: set METASYNC_TEST_PG_HOST to run Postgres tests");
        return None;
    };

    let guard = DB_LOCK.get_or_init(|| Mutex::new(())).lock().await;
    let store = fresh_store(&test_settings(&host), Environment::Dev).await;
    Some((guard, store))
}

/// Like [`test_guard`], plus a sync service whose prod side is a sibling
/// database named `{db}_prod`, created on first use.
async fn service_guard(
    name: &str,
) -> Option<(MutexGuard<'static, ()>, SyncService<PgStore>)> {
    let (guard, dev) = test_guard(name).await?;

    let mut prod_settings = test_settings(&std::env::var("METASYNC_TEST_PG_HOST").ok()?);
    prod_settings.database = format!("{}_prod", prod_settings.database);

    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(&prod_settings.database)
        .fetch_optional(dev.pool())
        .await
        .expect("look up prod database");
    if exists.is_none() {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&prod_settings.database)))
            .execute(dev.pool())
            .await
            .expect("create prod database");
    }

    let prod = fresh_store(&prod_settings, Environment::Prod).await;
    Some((guard, SyncService::new(dev, prod)))
}

#[tokio::test]
async fn test_insert_get_update_delete() {
    let Some((_guard, store)) = test_guard("test_insert_get_update_delete").await else {
        return;
    };

    let created: System = store
        .insert(SystemDraft {
            systemname: "billing".to_string(),
            system_preferences: Some(serde_json::json!({"theme": "dark"})),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.systemid, 1);

    let fetched: System = store.get(1).await.unwrap().unwrap();
    assert_eq!(fetched, created);

    let updated: Option<System> = store
        .update(
            1,
            SystemDraft {
                systemname: "billing-2".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.unwrap().systemname, "billing-2");

    let removed: Option<System> = store.delete(1).await.unwrap();
    assert!(removed.is_some());
    assert!(store.get::<System>(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_and_sequence() {
    let Some((_guard, store)) = test_guard("test_upsert_and_sequence").await else {
        return;
    };

    let copied = SystemDraft {
        systemname: "copied".to_string(),
        ..Default::default()
    };
    let record = copied.into_entity(41);
    assert_eq!(store.upsert(&record).await.unwrap(), UpsertOutcome::Inserted);
    assert_eq!(store.upsert(&record).await.unwrap(), UpsertOutcome::Updated);

    // The serial sequence continues past the copied key
    let next: System = store
        .insert(SystemDraft {
            systemname: "next".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(next.systemid, 42);
}

#[tokio::test]
async fn test_foreign_key_is_conflict() {
    let Some((_guard, store)) = test_guard("test_foreign_key_is_conflict").await else {
        return;
    };

    let err = store
        .insert::<Role>(RoleDraft {
            rolename: "analyst".to_string(),
            systemid: 999,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConflictError(_)));
}

#[tokio::test]
async fn test_sync_after_delete_keeps_ids_distinct() {
    let Some((_guard, svc)) = service_guard("test_sync_after_delete_keeps_ids_distinct").await
    else {
        return;
    };

    let draft = |name: &str| SystemDraft {
        systemname: name.to_string(),
        ..Default::default()
    };
    let _a: System = svc.create(draft("erp"), None).await.unwrap();
    let b: System = svc.create(draft("billing"), None).await.unwrap();
    svc.sync::<System>(b.systemid, None).await.unwrap();
    svc.delete::<System>(b.systemid, None).await.unwrap();

    let c: System = svc.create(draft("crm"), None).await.unwrap();
    assert_ne!(c.systemid, b.systemid);

    let old = svc.get::<System>(b.systemid).await.unwrap();
    assert!(old.dev.is_none());
    assert_eq!(old.prod.unwrap().systemname, "billing");

    svc.sync::<System>(c.systemid, None).await.unwrap();
    let old = svc.get::<System>(b.systemid).await.unwrap();
    assert_eq!(old.prod.unwrap().systemname, "billing");

    let history = svc
        .history(Environment::Dev, EntityKind::System, c.systemid)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}
