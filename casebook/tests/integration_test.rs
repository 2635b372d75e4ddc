//! Integration tests for Casebook
//!
//! These tests verify end-to-end functionality including:
//! - Store changes reaching durable storage
//! - Export and import workflows
//! - Postponement and overdue detection
//! - Synchronization between two offices sharing a remote store

use casebook::app::{self, AppState};
use casebook::calendar::HolidayCalendar;
use casebook::config::{DATA_STORAGE_KEY, NEEDS_SYNC_STORAGE_KEY, UNASSIGNED};
use casebook::error::AppError;
use casebook::models::{Case, Client, Session, Stage};
use casebook::postponement::{PostponementRequest, Rejection};
use casebook::services::reminders::overdue_sessions;
use casebook::store::{LocalStore, SessionEdit};
use casebook::sync::{MemoryRemoteStore, RemoteStore, SyncOutcome, SyncService};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create an initialized data directory
async fn create_test_app() -> (AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let state = app::setup(temp_dir.path().to_path_buf()).await.unwrap();
    (state, temp_dir)
}

fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn at_nine(raw: &str) -> DateTime<Utc> {
    day(raw).and_hms_opt(9, 0, 0).unwrap().and_utc()
}

struct Seeded {
    client_id: String,
    stage_id: String,
    session_id: String,
}

/// One client with a case, a stage and a session assigned to "Amal"
fn seed(store: &mut LocalStore) -> Seeded {
    store.add_assistant("Amal");

    let client = Client::new("Nadia", "0100 000");
    let case = Case::new(&client, "Lease dispute", "Acme Properties");
    let stage = Stage::new(&case, "First Instance", "12/2024");
    let mut session = Session::new(&case, &stage, at_nine("2024-05-10"));
    session.assignee = "Amal".to_string();

    let client_id = store.add_client(client);
    let case_id = store.add_case(&client_id, case).unwrap();
    let stage_id = store.add_stage(&case_id, stage).unwrap();
    let session_id = store.add_session(&stage_id, session).unwrap();

    Seeded {
        client_id,
        stage_id,
        session_id,
    }
}

/// Apply `f` to the store and wait until every change is on disk
async fn with_store<T>(state: &AppState, f: impl FnOnce(&mut LocalStore) -> T) -> T {
    let (mut store, persister) = state.open_store().await.unwrap();
    let out = f(&mut store);
    drop(store);
    persister.await.unwrap();
    out
}

#[tokio::test]
async fn test_delete_client_cascades_through_storage() {
    let (state, _temp) = create_test_app().await;

    let seeded = with_store(&state, seed).await;

    with_store(&state, |store| {
        assert_eq!(store.all_sessions().len(), 1);
        store.delete_client(&seeded.client_id).unwrap();
    })
    .await;

    let (store, _persister) = state.open_store().await.unwrap();
    assert!(store.clients().is_empty());
    assert!(store.all_sessions().is_empty());
    assert!(store.find_session(&seeded.session_id).is_none());
}

#[tokio::test]
async fn test_removed_assistant_falls_back_to_sentinel() {
    let (state, _temp) = create_test_app().await;
    let seeded = with_store(&state, seed).await;

    with_store(&state, |store| {
        assert!(store.remove_assistant("Amal"));
        assert!(!store.remove_assistant(UNASSIGNED));
    })
    .await;

    let (mut store, _persister) = state.open_store().await.unwrap();
    assert_eq!(store.assistants().names(), &[UNASSIGNED]);
    let location = store.find_session(&seeded.session_id).unwrap();
    assert_eq!(location.session.assignee, UNASSIGNED);

    let result = store.edit_session(&seeded.session_id, SessionEdit::Assignee("Amal".to_string()));
    assert!(matches!(result, Err(AppError::UnknownAssistant(_))));
}

#[tokio::test]
async fn test_export_then_import_into_fresh_office() {
    let (source, source_temp) = create_test_app().await;
    let seeded = with_store(&source, seed).await;

    let export_path = source_temp.path().join("handover.json");
    source.backup_service().export_to(&export_path).await.unwrap();

    let (target, _target_temp) = create_test_app().await;
    let backup = target.backup_service();
    with_store(&target, |store| store.add_client(Client::new("Someone else", ""))).await;

    let (mut store, persister) = target.open_store().await.unwrap();
    backup.import_from(&export_path, &mut store).await.unwrap();
    drop(store);
    persister.await.unwrap();

    let (store, _persister) = target.open_store().await.unwrap();
    assert_eq!(store.clients().len(), 1);
    assert_eq!(store.clients()[0].id, seeded.client_id);
    assert!(store.find_session(&seeded.session_id).is_some());

    // A local change in the target marks it for sync
    assert!(target
        .repo
        .get_item(NEEDS_SYNC_STORAGE_KEY)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_corrupt_import_changes_nothing() {
    let (state, temp) = create_test_app().await;
    with_store(&state, seed).await;
    let stored_before = state.repo.get_item(DATA_STORAGE_KEY).await.unwrap();

    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{\"clients\": [{\"name\": ").unwrap();

    let (mut store, persister) = state.open_store().await.unwrap();
    let result = state.backup_service().import_from(&path, &mut store).await;
    assert!(matches!(result, Err(AppError::Import(_))));
    drop(store);
    persister.await.unwrap();

    assert_eq!(state.repo.get_item(DATA_STORAGE_KEY).await.unwrap(), stored_before);
}

#[tokio::test]
async fn test_postponement_is_persisted_and_clears_overdue() {
    let (state, _temp) = create_test_app().await;
    let seeded = with_store(&state, seed).await;
    let calendar = HolidayCalendar::new(vec![]);

    // Past session without override is refused
    let refused = with_store(&state, |store| {
        let request = PostponementRequest::new(day("2024-05-20"), "Expert report pending");
        store.postpone_session(&seeded.session_id, &request, day("2024-05-15"), false, &calendar)
    })
    .await;
    assert!(matches!(
        refused,
        Err(AppError::Postponement(Rejection::PastSession))
    ));

    let snapshot = with_store(&state, |store| store.snapshot()).await;
    assert_eq!(overdue_sessions(&snapshot, day("2024-05-15")).len(), 1);

    let next = with_store(&state, |store| {
        let request = PostponementRequest::new(day("2024-05-20"), "Expert report pending");
        store
            .postpone_session(&seeded.session_id, &request, day("2024-05-01"), false, &calendar)
            .unwrap()
    })
    .await;

    let (store, _persister) = state.open_store().await.unwrap();
    let (_, stage) = store.find_stage(&seeded.stage_id).unwrap();
    assert_eq!(stage.sessions.len(), 2);
    assert!(stage.sessions[0].is_postponed);
    assert_eq!(stage.sessions[1].id, next.id);
    assert_eq!(
        stage.sessions[1].postponement_reason.as_deref(),
        Some("Expert report pending")
    );

    // The postponed session is no longer overdue; its follow-up is not yet due
    assert!(overdue_sessions(&store.snapshot(), day("2024-05-15")).is_empty());
    assert_eq!(overdue_sessions(&store.snapshot(), day("2024-05-21")).len(), 1);
}

#[tokio::test]
async fn test_weekend_postponement_needs_confirmation() {
    let (state, _temp) = create_test_app().await;
    let seeded = with_store(&state, seed).await;
    let calendar = state.calendar();

    // 2024-05-11 is a Saturday
    let result = with_store(&state, |store| {
        let request = PostponementRequest::new(day("2024-05-11"), "Judge on leave");
        store.postpone_session(&seeded.session_id, &request, day("2024-05-01"), false, &calendar)
    })
    .await;
    assert!(matches!(
        result,
        Err(AppError::Postponement(Rejection::ConfirmationRequired(_)))
    ));

    let confirmed = with_store(&state, |store| {
        let request = PostponementRequest::new(day("2024-05-11"), "Judge on leave").confirmed();
        store.postpone_session(&seeded.session_id, &request, day("2024-05-01"), false, &calendar)
    })
    .await;
    assert!(confirmed.is_ok());
}

#[tokio::test]
async fn test_sync_between_two_offices() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let shared: Arc<dyn RemoteStore> = remote.clone();

    let (office_a, _temp_a) = create_test_app().await;
    let (office_b, _temp_b) = create_test_app().await;
    let sync_a = SyncService::new(
        office_a.repo.clone(),
        Arc::clone(&shared),
        "office",
        Duration::from_secs(5),
    );
    let sync_b = SyncService::new(
        office_b.repo.clone(),
        Arc::clone(&shared),
        "office",
        Duration::from_secs(5),
    );

    let seeded = with_store(&office_a, seed).await;

    // Office A has local changes, so it pushes
    match sync_a.sync_once().await.unwrap() {
        SyncOutcome::Pushed { cleared, .. } => assert!(cleared),
        other => panic!("expected push, got {:?}", other),
    }
    assert_eq!(remote.rows("sessions", "office").await.len(), 1);

    // Office B is clean, so it pulls
    let document = match sync_b.sync_once().await.unwrap() {
        SyncOutcome::Pulled(document) => document,
        other => panic!("expected pull, got {:?}", other),
    };
    with_store(&office_b, |store| store.apply_remote(&document)).await;

    let (store_b, _persister) = office_b.open_store().await.unwrap();
    let location = store_b.find_session(&seeded.session_id).unwrap();
    assert_eq!(location.client.id, seeded.client_id);
    assert_eq!(location.session.assignee, "Amal");

    // Applying a pulled document does not schedule a push back
    assert_eq!(
        office_b.repo.get_item(NEEDS_SYNC_STORAGE_KEY).await.unwrap(),
        None
    );

    let runs = office_a.repo.list_sync_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].direction, "push");
    assert_eq!(runs[0].status, "ok");
}
