// Casebook - offline-first case management core
// Entry point: CLI dispatch and the background service loop

use anyhow::Context;
use casebook::app::{self, AppState};
use casebook::calendar::today;
use casebook::cli::{Args, Command};
use casebook::config::NEEDS_SYNC_STORAGE_KEY;
use casebook::postponement::PostponementRequest;
use casebook::services::{RemindersService, SyncFrequency, SyncScheduler};
use casebook::store::LocalStore;
use casebook::sync::{SyncOutcome, SyncService};
use clap::Parser;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Casebook {}", env!("CARGO_PKG_VERSION"));

    let state = app::setup(args.data_dir.clone())
        .await
        .context("failed to initialize data directory")?;

    match args.action() {
        Command::Run => run(&state).await,
        Command::Export { path } => {
            state.backup_service().export_to(&path).await?;
            println!("Exported to {}", path.display());
            Ok(())
        }
        Command::Snapshot => {
            let path = state.backup_service().create_snapshot().await?;
            println!("Snapshot written to {}", path.display());
            Ok(())
        }
        Command::Import { path } => import(&state, &path).await,
        Command::Sync => sync_once(&state).await,
        Command::Overdue => overdue(&state).await,
        Command::Postpone {
            session_id,
            next_date,
            reason,
            confirm,
            allow_past,
        } => {
            let mut request = PostponementRequest::new(next_date, reason);
            request.confirmed = confirm;
            postpone(&state, &session_id, &request, allow_past).await
        }
    }
}

/// Open the store, apply `f`, then flush pending writes before returning
async fn with_store<T>(
    state: &AppState,
    f: impl FnOnce(&mut LocalStore) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let (mut store, persister) = state.open_store().await?;
    let result = f(&mut store);
    drop(store);
    persister.await.context("persister task failed")?;
    result
}

async fn import(state: &AppState, path: &Path) -> anyhow::Result<()> {
    let (clients, sessions) = state.import_file(path).await?;
    println!("Imported {} clients, {} sessions", clients, sessions);
    Ok(())
}

async fn overdue(state: &AppState) -> anyhow::Result<()> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let service = RemindersService::new(
        state.repo.clone(),
        Duration::from_secs(state.settings.reminders.check_interval_secs),
        tx,
    );

    let sessions = service.check_overdue(today()).await?;
    if sessions.is_empty() {
        println!("No overdue sessions");
    }
    for session in sessions {
        println!(
            "{}  {}  {} v. {}  {} {}  ({})",
            session.date.date_naive(),
            session.session_id,
            session.client_name,
            session.opponent_name,
            session.court,
            session.case_number,
            session.assignee
        );
    }
    Ok(())
}

async fn postpone(
    state: &AppState,
    session_id: &str,
    request: &PostponementRequest,
    allow_past: bool,
) -> anyhow::Result<()> {
    let calendar = state.calendar();
    let allow_past = allow_past || state.settings.postponement.allow_past_sessions;

    with_store(state, |store| {
        let next = store.postpone_session(session_id, request, today(), allow_past, &calendar)?;
        println!("Postponed to {} (new session {})", next.date.date_naive(), next.id);
        Ok(())
    })
    .await
}

fn sync_service(state: &AppState) -> anyhow::Result<SyncService> {
    SyncService::from_settings(state.repo.clone(), &state.settings.sync)
        .context("remote sync is not configured")
}

/// Apply a pulled document unless local changes are waiting to be pushed
async fn apply_pulled(state: &AppState, store: &mut LocalStore, document: &Value) {
    match state.repo.get_item(NEEDS_SYNC_STORAGE_KEY).await {
        Ok(None) => store.apply_remote(document),
        Ok(Some(_)) => tracing::info!("Local changes pending, ignoring pulled document"),
        Err(e) => tracing::error!("Cannot check sync flag, ignoring pulled document: {}", e),
    }
}

async fn sync_once(state: &AppState) -> anyhow::Result<()> {
    let service = sync_service(state)?;

    match service.sync_once().await? {
        SyncOutcome::Pulled(document) => {
            let (mut store, persister) = state.open_store().await?;
            apply_pulled(state, &mut store, &document).await;
            println!("Pulled {} clients", store.clients().len());
            drop(store);
            persister.await?;
        }
        SyncOutcome::Pushed { revision, cleared } => {
            println!("Pushed revision {}{}", revision, if cleared { "" } else { " (newer changes pending)" });
        }
        SyncOutcome::Skipped => println!("Sync already running"),
    }
    Ok(())
}

/// Background service loop: reminders, scheduled sync, pulled documents
async fn run(state: &AppState) -> anyhow::Result<()> {
    let (mut store, persister) = state.open_store().await?;

    let (reminder_tx, mut reminder_rx) = mpsc::unbounded_channel();
    let reminders = state.settings.reminders.enabled.then(|| {
        RemindersService::new(
            state.repo.clone(),
            Duration::from_secs(state.settings.reminders.check_interval_secs),
            reminder_tx,
        )
        .start_scheduler()
    });

    let (pulled_tx, mut pulled_rx) = mpsc::unbounded_channel();
    let scheduler = if state.settings.sync.enabled {
        let frequency: SyncFrequency = state
            .settings
            .sync
            .frequency
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let scheduler = SyncScheduler::new(Arc::new(sync_service(state)?), pulled_tx).await?;
        scheduler.schedule_sync(frequency, true).await?;
        scheduler.start().await?;
        scheduler.sync_now().await;
        Some(scheduler)
    } else {
        tracing::info!("Remote sync disabled");
        None
    };

    tracing::info!("Casebook running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            Some(event) = reminder_rx.recv() => {
                for session in &event.overdue {
                    tracing::warn!(
                        "Overdue session {} on {}: {} v. {} ({})",
                        session.session_id,
                        session.date.date_naive(),
                        session.client_name,
                        session.opponent_name,
                        session.assignee
                    );
                }
            }
            Some(document) = pulled_rx.recv() => {
                apply_pulled(state, &mut store, &document).await;
            }
        }
    }

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    if let Some(reminders) = reminders {
        reminders.abort();
    }

    drop(store);
    persister.await.context("persister task failed")?;
    tracing::info!("Casebook stopped");
    Ok(())
}
