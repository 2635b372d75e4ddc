//! Local store
//!
//! The in-memory source of truth for one running session. Every setter
//! replaces a collection (copy-on-write), then emits a [`StoreEvent`]
//! carrying the full snapshot. The persister task consumes those events
//! and writes durable storage plus the needs-sync flag, so the store itself
//! never blocks on I/O.
//!
//! Data from outside (import files, remote pulls) only enters through
//! [`LocalStore::replace_all`], which re-runs hydration first.

pub mod persister;
mod tree;

pub use tree::{SessionEdit, SessionLocation};

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::DATA_STORAGE_KEY;
use crate::database::Repository;
use crate::error::Result;
use crate::hydration::{hydrate, hydrate_str, repair};
use crate::models::{
    AccountingEntry, AdminTask, AppData, Appointment, Assistants, Client, Invoice, Session,
};

/// A committed change: the revision it produced and the whole document
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub revision: u64,
    pub snapshot: Arc<AppData>,
    /// False only when the change came from the remote store itself
    pub needs_sync: bool,
}

pub type StoreEvents = mpsc::UnboundedSender<StoreEvent>;

/// Replacement value or updater of the previous value
pub enum Update<T> {
    Replace(T),
    Apply(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T> Update<T> {
    pub fn with(f: impl FnOnce(&T) -> T + Send + 'static) -> Self {
        Update::Apply(Box::new(f))
    }

    fn resolve(self, previous: &T) -> T {
        match self {
            Update::Replace(value) => value,
            Update::Apply(f) => f(previous),
        }
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Update::Replace(value)
    }
}

/// One session in the flattened, tree-free view
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub client_id: String,
    pub case_id: String,
    pub stage_id: String,
    pub stage_decided: bool,
    pub session: Session,
}

pub struct LocalStore {
    clients: Arc<Vec<Client>>,
    admin_tasks: Vec<AdminTask>,
    appointments: Vec<Appointment>,
    accounting_entries: Vec<AccountingEntry>,
    invoices: Vec<Invoice>,
    assistants: Assistants,
    revision: u64,
    sessions: OnceLock<Arc<Vec<SessionEntry>>>,
    events: StoreEvents,
}

impl LocalStore {
    pub fn new(mut data: AppData, events: StoreEvents) -> Self {
        repair::repair(&mut data);
        Self {
            clients: Arc::new(data.clients),
            admin_tasks: data.admin_tasks,
            appointments: data.appointments,
            accounting_entries: data.accounting_entries,
            invoices: data.invoices,
            assistants: data.assistants,
            // Seeded from the clock so revisions keep increasing across restarts
            revision: Utc::now().timestamp_millis().max(0) as u64,
            sessions: OnceLock::new(),
            events,
        }
    }

    /// Load and hydrate the document kept in durable storage.
    ///
    /// A missing or corrupt document yields the empty default; only a
    /// failing database read is an error.
    pub async fn open(repo: &Repository, events: StoreEvents) -> Result<Self> {
        let data = match repo.get_item(DATA_STORAGE_KEY).await? {
            Some(raw) => hydrate_str(&raw),
            None => {
                tracing::info!("No stored document found, starting empty");
                AppData::default()
            }
        };

        tracing::info!(
            "Local store opened: {} clients, {} tasks, {} appointments",
            data.clients.len(),
            data.admin_tasks.len(),
            data.appointments.len()
        );

        Ok(Self::new(data, events))
    }

    // ===== Reads =====

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn admin_tasks(&self) -> &[AdminTask] {
        &self.admin_tasks
    }

    pub fn appointments(&self) -> &[Appointment] {
        &self.appointments
    }

    pub fn accounting_entries(&self) -> &[AccountingEntry] {
        &self.accounting_entries
    }

    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }

    pub fn assistants(&self) -> &Assistants {
        &self.assistants
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every session in the tree with its owning ids.
    ///
    /// Memoized; recomputed only after the client tree is replaced.
    pub fn all_sessions(&self) -> Arc<Vec<SessionEntry>> {
        self.sessions
            .get_or_init(|| Arc::new(flatten_sessions(&self.clients)))
            .clone()
    }

    /// Owned copy of the whole document
    pub fn snapshot(&self) -> AppData {
        AppData {
            clients: self.clients.as_ref().clone(),
            admin_tasks: self.admin_tasks.clone(),
            appointments: self.appointments.clone(),
            accounting_entries: self.accounting_entries.clone(),
            invoices: self.invoices.clone(),
            assistants: self.assistants.clone(),
        }
    }

    // ===== Setters =====

    /// Replace the client tree. Every setter repairs its input the way
    /// hydration would, so the in-memory tree always equals what a reload
    /// from storage produces.
    pub fn set_clients(&mut self, update: impl Into<Update<Vec<Client>>>) {
        let mut clients = update.into().resolve(&self.clients);
        repair::repair_clients(&mut clients, &self.assistants);
        self.replace_clients(clients);
        self.commit();
    }

    pub fn set_admin_tasks(&mut self, update: impl Into<Update<Vec<AdminTask>>>) {
        let mut tasks = update.into().resolve(&self.admin_tasks);
        repair::repair_admin_tasks(&mut tasks, &self.assistants);
        self.admin_tasks = tasks;
        self.commit();
    }

    pub fn set_appointments(&mut self, update: impl Into<Update<Vec<Appointment>>>) {
        let mut appointments = update.into().resolve(&self.appointments);
        repair::repair_appointments(&mut appointments, &self.assistants);
        self.appointments = appointments;
        self.commit();
    }

    pub fn set_accounting_entries(&mut self, update: impl Into<Update<Vec<AccountingEntry>>>) {
        let mut entries = update.into().resolve(&self.accounting_entries);
        repair::repair_accounting_entries(&mut entries);
        self.accounting_entries = entries;
        self.commit();
    }

    pub fn set_invoices(&mut self, update: impl Into<Update<Vec<Invoice>>>) {
        let mut invoices = update.into().resolve(&self.invoices);
        repair::repair_invoices(&mut invoices);
        self.invoices = invoices;
        self.commit();
    }

    /// Replace the assistants. Assignees that are no longer valid fall back
    /// to the sentinel in the same commit.
    pub fn set_assistants(&mut self, update: impl Into<Update<Assistants>>) {
        self.assistants = update.into().resolve(&self.assistants);

        let mut clients = self.clients.as_ref().clone();
        repair::repair_clients(&mut clients, &self.assistants);
        self.replace_clients(clients);

        repair::repair_admin_tasks(&mut self.admin_tasks, &self.assistants);
        repair::repair_appointments(&mut self.appointments, &self.assistants);

        self.commit();
    }

    pub fn add_assistant(&mut self, name: &str) -> bool {
        let mut assistants = self.assistants.clone();
        if !assistants.add(name) {
            return false;
        }
        self.set_assistants(assistants);
        true
    }

    /// Remove an assistant; the sentinel is never removed
    pub fn remove_assistant(&mut self, name: &str) -> bool {
        let mut assistants = self.assistants.clone();
        if !assistants.remove(name) {
            return false;
        }
        self.set_assistants(assistants);
        true
    }

    /// Replace everything with externally sourced data, hydrating it first
    pub fn replace_all(&mut self, raw: &Value) {
        self.load(raw);
        self.commit();
    }

    /// Replace everything with a document pulled from the remote store.
    /// The result already matches the remote, so it is not marked dirty.
    pub fn apply_remote(&mut self, raw: &Value) {
        self.load(raw);
        self.publish(false);
    }

    fn load(&mut self, raw: &Value) {
        let data = hydrate(raw);
        tracing::info!(
            "Replacing local document: {} clients, {} sessions",
            data.clients.len(),
            data.clients
                .iter()
                .flat_map(|c| &c.cases)
                .flat_map(|k| &k.stages)
                .map(|s| s.sessions.len())
                .sum::<usize>()
        );

        self.replace_clients(data.clients);
        self.admin_tasks = data.admin_tasks;
        self.appointments = data.appointments;
        self.accounting_entries = data.accounting_entries;
        self.invoices = data.invoices;
        self.assistants = data.assistants;
    }

    fn replace_clients(&mut self, clients: Vec<Client>) {
        self.clients = Arc::new(clients);
        self.sessions = OnceLock::new();
    }

    fn commit(&mut self) {
        self.publish(true);
    }

    fn publish(&mut self, needs_sync: bool) {
        self.revision += 1;
        let event = StoreEvent {
            revision: self.revision,
            snapshot: Arc::new(self.snapshot()),
            needs_sync,
        };

        if self.events.send(event).is_err() {
            tracing::warn!(
                "Persister is not running; revision {} kept in memory only",
                self.revision
            );
        }
    }
}

fn flatten_sessions(clients: &[Client]) -> Vec<SessionEntry> {
    let mut entries = Vec::new();
    for client in clients {
        for case in &client.cases {
            for stage in &case.stages {
                for session in &stage.sessions {
                    entries.push(SessionEntry {
                        client_id: client.id.clone(),
                        case_id: case.id.clone(),
                        stage_id: stage.id.clone(),
                        stage_decided: stage.is_decided(),
                        session: session.clone(),
                    });
                }
            }
        }
    }
    entries
}
