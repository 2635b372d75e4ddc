//! Domain models
//!
//! The in-memory document and every entity it holds. Instances of these
//! types are only ever produced by the hydration layer or by typed
//! constructors, so downstream code can rely on them being well formed.

pub mod records;
pub mod tree;

pub use records::*;
pub use tree::*;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::UNASSIGNED;

/// Generate a fresh entity id: epoch milliseconds plus a random suffix.
pub fn generate_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Ordered set of assistant names.
///
/// The [`UNASSIGNED`] sentinel is always the first entry and cannot be
/// removed. Names are compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Assistants(Vec<String>);

impl Assistants {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self(vec![UNASSIGNED.to_string()]);
        for name in names {
            set.add(name);
        }
        set
    }

    /// Add a name; blank names and duplicates are ignored.
    /// Returns whether the set changed.
    pub fn add(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    /// Remove a name. The sentinel is never removed.
    pub fn remove(&mut self, name: &str) -> bool {
        if name == UNASSIGNED {
            return false;
        }
        let before = self.0.len();
        self.0.retain(|existing| existing != name);
        self.0.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|existing| existing == name)
    }

    /// The assignee to store for `candidate`: itself when known, else the sentinel
    pub fn resolve(&self, candidate: &str) -> String {
        if self.contains(candidate) {
            candidate.to_string()
        } else {
            UNASSIGNED.to_string()
        }
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Assistants {
    fn default() -> Self {
        Self(vec![UNASSIGNED.to_string()])
    }
}

impl From<Vec<String>> for Assistants {
    fn from(names: Vec<String>) -> Self {
        Assistants::new(names)
    }
}

impl From<Assistants> for Vec<String> {
    fn from(assistants: Assistants) -> Self {
        assistants.0
    }
}

/// The whole persisted document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub clients: Vec<Client>,
    pub admin_tasks: Vec<AdminTask>,
    pub appointments: Vec<Appointment>,
    pub accounting_entries: Vec<AccountingEntry>,
    pub invoices: Vec<Invoice>,
    pub assistants: Assistants,
}
