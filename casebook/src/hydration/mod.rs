//! Hydration pipeline
//!
//! Converts an untrusted JSON document (durable storage, an import file or
//! a remote pull) into a guaranteed-valid [`AppData`]. Parsing happens in
//! two phases: serde_json gives a loosely typed [`Value`], then the
//! sanitizers convert it into domain types without ever failing. A final
//! typed repair pass makes ids unique per entity kind.

pub mod dates;
pub mod repair;
pub mod sanitize;

use serde_json::Value;

use crate::config::DATE_FIELDS;
use crate::models::AppData;
use sanitize::{
    objects, sanitize_accounting_entry, sanitize_admin_task, sanitize_appointment,
    sanitize_assistants, sanitize_client, sanitize_invoice,
};

/// Hydrate a raw document.
///
/// Assistants are sanitized first because every assignee is validated
/// against them. A non-object input yields the default document.
/// `hydrate(&to_value(hydrate(x))) == hydrate(x)` for every `x`.
pub fn hydrate(raw: &Value) -> AppData {
    if !raw.is_object() {
        tracing::debug!("Hydrating non-object document, using defaults");
        return AppData::default();
    }

    let assistants = sanitize_assistants(raw.get("assistants"));

    let clients = objects(raw.get("clients"))
        .map(|client| sanitize_client(client, &assistants))
        .collect();

    let admin_tasks = objects(raw.get("adminTasks"))
        .map(|task| sanitize_admin_task(task, &assistants))
        .collect();

    let appointments = objects(raw.get("appointments"))
        .map(|appointment| sanitize_appointment(appointment, &assistants))
        .collect();

    let accounting_entries = objects(raw.get("accountingEntries"))
        .map(sanitize_accounting_entry)
        .collect();

    let invoices = objects(raw.get("invoices"))
        .map(sanitize_invoice)
        .collect();

    let mut data = AppData {
        clients,
        admin_tasks,
        appointments,
        accounting_entries,
        invoices,
        assistants,
    };
    repair::repair(&mut data);
    data
}

/// Parse stored text and hydrate it. Unparseable text yields the default document.
pub fn hydrate_str(raw: &str) -> AppData {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => hydrate(&revive_dates(value)),
        Err(e) => {
            tracing::warn!("Stored document is not valid JSON, starting empty: {}", e);
            AppData::default()
        }
    }
}

/// Normalize date strings under the allow-listed field names to RFC 3339.
///
/// Strings that do not parse as dates are left untouched; the sanitizers
/// decide what to do with them.
pub fn revive_dates(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, field)| {
                    let field = if DATE_FIELDS.contains(&key.as_str()) {
                        revive_date_field(field)
                    } else {
                        revive_dates(field)
                    };
                    (key, field)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(revive_dates).collect()),
        other => other,
    }
}

fn revive_date_field(field: Value) -> Value {
    if let Value::String(text) = &field {
        if let Some(date) = dates::parse_date_str(text) {
            return Value::String(dates::format_date(&date));
        }
    }
    field
}
