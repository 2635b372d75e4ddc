//! Flat, owner-scoped records: tasks, appointments, accounting and invoices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    #[default]
    Normal,
    Important,
    Urgent,
}

impl Importance {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(Importance::Normal),
            "important" => Some(Importance::Important),
            "urgent" => Some(Importance::Urgent),
            _ => None,
        }
    }
}

/// Administrative task (filing, fetching documents, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTask {
    pub id: String,
    pub task: String,
    pub due_date: DateTime<Utc>,
    pub completed: bool,
    pub importance: Importance,
    pub assignee: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub importance: Importance,
    pub assignee: String,
    pub notes: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    #[default]
    Income,
    Expense,
}

impl EntryType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "income" => Some(EntryType::Income),
            "expense" => Some(EntryType::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub description: String,
    pub client_id: String,
    pub case_id: String,
    pub client_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: String,
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub case_id: Option<String>,
    pub case_subject: Option<String>,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub items: Vec<InvoiceItem>,
    /// Percentage, e.g. `14.0`
    pub tax_rate: f64,
    pub discount: f64,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
}

impl Invoice {
    pub fn subtotal(&self) -> f64 {
        self.items.iter().map(|item| item.amount).sum()
    }

    /// Subtotal plus tax, minus the flat discount
    pub fn total(&self) -> f64 {
        let subtotal = self.subtotal();
        subtotal + subtotal * self.tax_rate / 100.0 - self.discount
    }
}
