//! Typed repair
//!
//! The sanitizers guarantee a valid document when the input is JSON. The
//! functions here enforce the same guarantees on values that are already
//! typed, for the store's setters and for the last step of hydration.
//! Ids must also be unique per entity kind: blank ids get a fresh one, and
//! an id already used earlier in the same kind is replaced.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::dates::representable;
use crate::config::{
    CASE_WITHOUT_SUBJECT, NO_CASE_NUMBER, NO_DESCRIPTION, UNKNOWN_OPPONENT, UNNAMED_CLIENT,
    UNSPECIFIED_COURT, UNTITLED_APPOINTMENT, UNTITLED_TASK,
};
use crate::models::{
    generate_id, AccountingEntry, AdminTask, AppData, Appointment, Assistants, Client, Invoice,
};

/// Ids already handed out within one entity kind
#[derive(Debug, Default)]
struct IdSet(HashSet<String>);

impl IdSet {
    /// Keep `id` if it is non-blank and unused, otherwise replace it
    fn claim(&mut self, id: &mut String) {
        if id.trim().is_empty() || self.0.contains(id.as_str()) {
            let fresh = self.fresh();
            tracing::debug!("Replacing unusable id {:?} with {}", id, fresh);
            *id = fresh;
        }
        self.0.insert(id.clone());
    }

    fn fresh(&self) -> String {
        loop {
            let id = generate_id();
            if !self.0.contains(&id) {
                return id;
            }
        }
    }
}

/// A usable id for a new entity: `candidate` unless blank or already taken
pub(crate) fn unused_id(candidate: String, taken: impl Fn(&str) -> bool) -> String {
    if candidate.trim().is_empty() || taken(&candidate) {
        generate_id()
    } else {
        candidate
    }
}

fn text(value: &mut String, fallback: &str) {
    if value.trim().is_empty() {
        *value = fallback.to_string();
    }
}

fn optional_text(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|text| text.trim().is_empty()) {
        *value = None;
    }
}

fn required_date(date: &mut DateTime<Utc>) {
    if !representable(date) {
        *date = Utc::now();
    }
}

fn optional_date(date: &mut Option<DateTime<Utc>>) {
    if date.as_ref().is_some_and(|d| !representable(d)) {
        *date = None;
    }
}

fn amount(value: &mut f64) {
    if !value.is_finite() {
        *value = 0.0;
    }
}

pub fn repair(data: &mut AppData) {
    repair_clients(&mut data.clients, &data.assistants);
    repair_admin_tasks(&mut data.admin_tasks, &data.assistants);
    repair_appointments(&mut data.appointments, &data.assistants);
    repair_accounting_entries(&mut data.accounting_entries);
    repair_invoices(&mut data.invoices);
}

/// Repair the client tree top-down, so inherited values come from
/// ancestors that are already valid, and re-point every back-reference.
pub fn repair_clients(clients: &mut [Client], assistants: &Assistants) {
    let mut client_ids = IdSet::default();
    let mut case_ids = IdSet::default();
    let mut stage_ids = IdSet::default();
    let mut session_ids = IdSet::default();

    for client in clients {
        client_ids.claim(&mut client.id);
        text(&mut client.name, UNNAMED_CLIENT);

        for case in &mut client.cases {
            case_ids.claim(&mut case.id);
            case.client_id = client.id.clone();
            text(&mut case.client_name, &client.name);
            text(&mut case.subject, CASE_WITHOUT_SUBJECT);
            text(&mut case.opponent_name, UNKNOWN_OPPONENT);
            required_date(&mut case.created_at);

            for stage in &mut case.stages {
                stage_ids.claim(&mut stage.id);
                stage.case_id = case.id.clone();
                text(&mut stage.court, UNSPECIFIED_COURT);
                text(&mut stage.case_number, NO_CASE_NUMBER);
                optional_date(&mut stage.first_session_date);
                optional_date(&mut stage.decision_date);
                optional_text(&mut stage.decision_number);
                optional_text(&mut stage.decision_summary);
                optional_text(&mut stage.decision_notes);

                for session in &mut stage.sessions {
                    session_ids.claim(&mut session.id);
                    session.stage_id = stage.id.clone();
                    text(&mut session.court, &stage.court);
                    text(&mut session.case_number, &stage.case_number);
                    text(&mut session.client_name, &case.client_name);
                    text(&mut session.opponent_name, &case.opponent_name);
                    required_date(&mut session.date);
                    optional_text(&mut session.postponement_reason);
                    optional_date(&mut session.next_session_date);
                    optional_text(&mut session.next_postponement_reason);
                    session.assignee = assistants.resolve(&session.assignee);
                }
            }
        }
    }
}

pub fn repair_admin_tasks(tasks: &mut [AdminTask], assistants: &Assistants) {
    let mut ids = IdSet::default();
    for task in tasks {
        ids.claim(&mut task.id);
        text(&mut task.task, UNTITLED_TASK);
        required_date(&mut task.due_date);
        task.assignee = assistants.resolve(&task.assignee);
        optional_text(&mut task.location);
    }
}

pub fn repair_appointments(appointments: &mut [Appointment], assistants: &Assistants) {
    let mut ids = IdSet::default();
    for appointment in appointments {
        ids.claim(&mut appointment.id);
        text(&mut appointment.title, UNTITLED_APPOINTMENT);
        required_date(&mut appointment.date);
        appointment.assignee = assistants.resolve(&appointment.assignee);
        optional_text(&mut appointment.notes);
    }
}

pub fn repair_accounting_entries(entries: &mut [AccountingEntry]) {
    let mut ids = IdSet::default();
    for entry in entries {
        ids.claim(&mut entry.id);
        amount(&mut entry.amount);
        required_date(&mut entry.date);
        text(&mut entry.description, NO_DESCRIPTION);
    }
}

/// Invoice ids are unique across invoices; item ids within their invoice
pub fn repair_invoices(invoices: &mut [Invoice]) {
    let mut ids = IdSet::default();
    for invoice in invoices {
        ids.claim(&mut invoice.id);
        text(&mut invoice.client_name, UNNAMED_CLIENT);
        optional_text(&mut invoice.case_id);
        optional_text(&mut invoice.case_subject);
        required_date(&mut invoice.issue_date);
        optional_date(&mut invoice.due_date);
        amount(&mut invoice.tax_rate);
        amount(&mut invoice.discount);
        optional_text(&mut invoice.notes);

        let mut item_ids = IdSet::default();
        for item in &mut invoice.items {
            item_ids.claim(&mut item.id);
            text(&mut item.description, NO_DESCRIPTION);
            amount(&mut item.amount);
        }
    }
}
