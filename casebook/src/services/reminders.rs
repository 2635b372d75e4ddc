//! Reminders service
//!
//! Watches for overdue sessions: hearings dated before today that were
//! neither postponed nor closed by a stage decision. Runs a background
//! task that re-reads the durable snapshot on a fixed interval and reports
//! each overdue session once per process.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::calendar::{is_before_today, today};
use crate::config::DATA_STORAGE_KEY;
use crate::database::Repository;
use crate::error::Result;
use crate::hydration::hydrate_str;
use crate::models::AppData;

/// A session that should have been postponed or decided by now
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueSession {
    pub session_id: String,
    pub client_id: String,
    pub case_id: String,
    pub client_name: String,
    pub opponent_name: String,
    pub court: String,
    pub case_number: String,
    pub date: DateTime<Utc>,
    pub assignee: String,
}

/// Emitted when a check finds sessions not reported before
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEvent {
    pub checked_at: DateTime<Utc>,
    pub overdue: Vec<OverdueSession>,
}

/// Overdue sessions of `data`, oldest first
pub fn overdue_sessions(data: &AppData, today: NaiveDate) -> Vec<OverdueSession> {
    let mut overdue: Vec<OverdueSession> = data
        .clients
        .iter()
        .flat_map(|client| client.cases.iter().map(move |case| (client, case)))
        .flat_map(|(client, case)| case.stages.iter().map(move |stage| (client, case, stage)))
        .filter(|(_, _, stage)| !stage.is_decided())
        .flat_map(|(client, case, stage)| {
            stage
                .sessions
                .iter()
                .map(move |session| (client, case, session))
        })
        .filter(|(_, _, session)| !session.is_postponed && is_before_today(&session.date, today))
        .map(|(client, case, session)| OverdueSession {
            session_id: session.id.clone(),
            client_id: client.id.clone(),
            case_id: case.id.clone(),
            client_name: session.client_name.clone(),
            opponent_name: session.opponent_name.clone(),
            court: session.court.clone(),
            case_number: session.case_number.clone(),
            date: session.date,
            assignee: session.assignee.clone(),
        })
        .collect();

    overdue.sort_by_key(|entry| entry.date);
    overdue
}

/// Reminders service with background scheduler
#[derive(Clone)]
pub struct RemindersService {
    repo: Repository,
    interval: Duration,
    events: mpsc::UnboundedSender<ReminderEvent>,
}

impl RemindersService {
    pub fn new(
        repo: Repository,
        interval: Duration,
        events: mpsc::UnboundedSender<ReminderEvent>,
    ) -> Self {
        Self {
            repo,
            interval,
            events,
        }
    }

    /// Overdue sessions in the durable snapshot as of `today`
    pub async fn check_overdue(&self, today: NaiveDate) -> Result<Vec<OverdueSession>> {
        let data = match self.repo.get_item(DATA_STORAGE_KEY).await? {
            Some(raw) => hydrate_str(&raw),
            None => AppData::default(),
        };
        Ok(overdue_sessions(&data, today))
    }

    /// Start the background scheduler
    pub fn start_scheduler(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Starting reminders scheduler (every {}s)",
                self.interval.as_secs()
            );

            let mut interval = tokio::time::interval(self.interval);
            let mut reported = HashSet::new();

            loop {
                interval.tick().await;

                match self.check_and_notify(today(), &mut reported).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!("Reminder listener gone, stopping scheduler");
                        break;
                    }
                    Err(e) => tracing::error!("Error checking overdue sessions: {}", e),
                }
            }
        })
    }

    /// Report sessions not in `reported`; returns false once nobody listens
    async fn check_and_notify(
        &self,
        today: NaiveDate,
        reported: &mut HashSet<String>,
    ) -> Result<bool> {
        let fresh: Vec<OverdueSession> = self
            .check_overdue(today)
            .await?
            .into_iter()
            .filter(|entry| !reported.contains(&entry.session_id))
            .collect();

        if fresh.is_empty() {
            return Ok(!self.events.is_closed());
        }

        for entry in &fresh {
            tracing::info!(
                "Session {} ({} v. {}) on {} is overdue",
                entry.session_id,
                entry.client_name,
                entry.opponent_name,
                entry.date.date_naive()
            );
        }

        let event = ReminderEvent {
            checked_at: Utc::now(),
            overdue: fresh.clone(),
        };
        if self.events.send(event).is_err() {
            return Ok(false);
        }

        reported.extend(fresh.into_iter().map(|entry| entry.session_id));
        Ok(true)
    }
}
