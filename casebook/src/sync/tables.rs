//! Mapping between the nested document and flat remote tables.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{json, Value};

use super::remote::RemoteRow;
use crate::config::UNASSIGNED;
use crate::error::Result;
use crate::models::AppData;

pub const CLIENTS: &str = "clients";
pub const CASES: &str = "cases";
pub const STAGES: &str = "stages";
pub const SESSIONS: &str = "sessions";
pub const ADMIN_TASKS: &str = "admin_tasks";
pub const APPOINTMENTS: &str = "appointments";
pub const ACCOUNTING_ENTRIES: &str = "accounting_entries";
pub const INVOICES: &str = "invoices";
pub const ASSISTANTS: &str = "assistants";

/// Every remote table, parents before children
pub const TABLES: [&str; 9] = [
    CLIENTS,
    CASES,
    STAGES,
    SESSIONS,
    ADMIN_TASKS,
    APPOINTMENTS,
    ACCOUNTING_ENTRIES,
    INVOICES,
    ASSISTANTS,
];

pub type Tables = BTreeMap<&'static str, Vec<RemoteRow>>;

fn row<T: Serialize>(
    entity: &T,
    id: &str,
    owner_id: &str,
    parent_id: Option<&str>,
    position: usize,
    children: Option<&str>,
) -> Result<RemoteRow> {
    let mut data = serde_json::to_value(entity)?;
    if let (Some(key), Some(object)) = (children, data.as_object_mut()) {
        object.remove(key);
    }

    Ok(RemoteRow {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        parent_id: parent_id.map(str::to_string),
        position: position as i64,
        data,
    })
}

/// Split the document into one row list per table
pub fn flatten(data: &AppData, owner_id: &str) -> Result<Tables> {
    let mut tables: Tables = TABLES.iter().map(|table| (*table, Vec::new())).collect();

    let mut clients = Vec::new();
    let mut cases = Vec::new();
    let mut stages = Vec::new();
    let mut sessions = Vec::new();

    for (p, client) in data.clients.iter().enumerate() {
        clients.push(row(client, &client.id, owner_id, None, p, Some("cases"))?);
        for (p, case) in client.cases.iter().enumerate() {
            cases.push(row(case, &case.id, owner_id, Some(&client.id), p, Some("stages"))?);
            for (p, stage) in case.stages.iter().enumerate() {
                stages.push(row(stage, &stage.id, owner_id, Some(&case.id), p, Some("sessions"))?);
                for (p, session) in stage.sessions.iter().enumerate() {
                    sessions.push(row(session, &session.id, owner_id, Some(&stage.id), p, None)?);
                }
            }
        }
    }

    tables.insert(CLIENTS, clients);
    tables.insert(CASES, cases);
    tables.insert(STAGES, stages);
    tables.insert(SESSIONS, sessions);

    tables.insert(
        ADMIN_TASKS,
        data.admin_tasks
            .iter()
            .enumerate()
            .map(|(p, task)| row(task, &task.id, owner_id, None, p, None))
            .collect::<Result<_>>()?,
    );
    tables.insert(
        APPOINTMENTS,
        data.appointments
            .iter()
            .enumerate()
            .map(|(p, appointment)| row(appointment, &appointment.id, owner_id, None, p, None))
            .collect::<Result<_>>()?,
    );
    tables.insert(
        ACCOUNTING_ENTRIES,
        data.accounting_entries
            .iter()
            .enumerate()
            .map(|(p, entry)| row(entry, &entry.id, owner_id, None, p, None))
            .collect::<Result<_>>()?,
    );
    tables.insert(
        INVOICES,
        data.invoices
            .iter()
            .enumerate()
            .map(|(p, invoice)| row(invoice, &invoice.id, owner_id, None, p, None))
            .collect::<Result<_>>()?,
    );

    // The sentinel is implied on every load
    tables.insert(
        ASSISTANTS,
        data.assistants
            .names()
            .iter()
            .filter(|name| name.as_str() != UNASSIGNED)
            .enumerate()
            .map(|(p, name)| row(&json!({ "name": name }), name, owner_id, None, p, None))
            .collect::<Result<_>>()?,
    );

    Ok(tables)
}

fn take(tables: &mut HashMap<String, Vec<RemoteRow>>, table: &str) -> Vec<RemoteRow> {
    let mut rows = tables.remove(table).unwrap_or_default();
    rows.sort_by_key(|row| row.position);
    rows
}

fn group_by_parent(rows: Vec<RemoteRow>) -> HashMap<String, Vec<RemoteRow>> {
    let mut groups: HashMap<String, Vec<RemoteRow>> = HashMap::new();
    for row in rows {
        let parent = row.parent_id.clone().unwrap_or_default();
        groups.entry(parent).or_default().push(row);
    }
    groups
}

/// Row payload with the row id written back into it
fn payload(row: RemoteRow) -> Value {
    let mut data = row.data;
    if let Some(object) = data.as_object_mut() {
        object.insert("id".to_string(), Value::String(row.id));
    }
    data
}

fn with_children(row: RemoteRow, key: &str, children: Vec<Value>) -> Value {
    let mut data = payload(row);
    if let Some(object) = data.as_object_mut() {
        object.insert(key.to_string(), Value::Array(children));
    }
    data
}

/// Rebuild the nested document from fetched tables.
///
/// Rows whose parent is missing are dropped. The result is raw JSON; it
/// goes through hydration before reaching the store.
pub fn unflatten(mut tables: HashMap<String, Vec<RemoteRow>>) -> Value {
    let mut cases = group_by_parent(take(&mut tables, CASES));
    let mut stages = group_by_parent(take(&mut tables, STAGES));
    let mut sessions = group_by_parent(take(&mut tables, SESSIONS));

    let mut clients = Vec::new();
    for client in take(&mut tables, CLIENTS) {
        let mut client_cases = Vec::new();
        for case in cases.remove(&client.id).unwrap_or_default() {
            let mut case_stages = Vec::new();
            for stage in stages.remove(&case.id).unwrap_or_default() {
                let stage_sessions = sessions
                    .remove(&stage.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(payload)
                    .collect();
                case_stages.push(with_children(stage, "sessions", stage_sessions));
            }
            client_cases.push(with_children(case, "stages", case_stages));
        }
        clients.push(with_children(client, "cases", client_cases));
    }

    let orphans: usize = [&cases, &stages, &sessions]
        .iter()
        .flat_map(|groups| groups.values())
        .map(Vec::len)
        .sum();
    if orphans > 0 {
        tracing::warn!("Dropped {} remote rows without a parent", orphans);
    }

    let flat = |tables: &mut HashMap<String, Vec<RemoteRow>>, table: &str| -> Vec<Value> {
        take(tables, table).into_iter().map(payload).collect()
    };

    let assistants: Vec<Value> = take(&mut tables, ASSISTANTS)
        .into_iter()
        .filter_map(|row| row.data.get("name").cloned())
        .collect();

    json!({
        "clients": clients,
        "adminTasks": flat(&mut tables, ADMIN_TASKS),
        "appointments": flat(&mut tables, APPOINTMENTS),
        "accountingEntries": flat(&mut tables, ACCOUNTING_ENTRIES),
        "invoices": flat(&mut tables, INVOICES),
        "assistants": assistants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydration::hydrate;
    use std::collections::HashSet;

    fn document() -> Value {
        json!({
            "assistants": ["Amal", "Karim"],
            "clients": [{
                "id": "c1",
                "name": "Nadia",
                "cases": [{
                    "id": "k1",
                    "subject": "Lease",
                    "stages": [{
                        "id": "s1",
                        "court": "First Instance",
                        "sessions": [
                            {"id": "h1", "date": "2024-05-10T09:00:00Z", "assignee": "Amal"},
                            {"id": "h2", "date": "2024-05-20T09:00:00Z"}
                        ]
                    }]
                }]
            }, {
                "id": "c2",
                "name": "Omar"
            }],
            "adminTasks": [{"id": "t1", "task": "File brief", "assignee": "Karim"}],
            "invoices": [{
                "id": "i1",
                "clientId": "c1",
                "issueDate": "2024-05-01",
                "items": [{"id": "it1", "description": "Hearing", "amount": 300}]
            }]
        })
    }

    fn owned(tables: Tables) -> HashMap<String, Vec<RemoteRow>> {
        tables
            .into_iter()
            .map(|(table, rows)| (table.to_string(), rows))
            .collect()
    }

    #[test]
    fn test_flatten_produces_parent_links() {
        let data = hydrate(&document());
        let tables = flatten(&data, "office").unwrap();

        assert_eq!(tables.len(), TABLES.len());
        assert_eq!(tables[CLIENTS].len(), 2);
        assert_eq!(tables[SESSIONS].len(), 2);
        assert_eq!(tables[SESSIONS][1].parent_id.as_deref(), Some("s1"));
        assert_eq!(tables[SESSIONS][1].position, 1);
        assert_eq!(tables[CASES][0].parent_id.as_deref(), Some("c1"));
        assert!(tables[CLIENTS][0].data.get("cases").is_none());
        assert!(tables[CLIENTS].iter().all(|row| row.owner_id == "office"));

        let assistants: Vec<&str> = tables[ASSISTANTS].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(assistants, vec!["Amal", "Karim"]);
    }

    #[test]
    fn test_unflatten_rebuilds_document() {
        let data = hydrate(&document());
        let rebuilt = unflatten(owned(flatten(&data, "office").unwrap()));
        assert_eq!(hydrate(&rebuilt), data);
    }

    #[test]
    fn test_unflatten_drops_orphans() {
        let data = hydrate(&document());
        let mut tables = owned(flatten(&data, "office").unwrap());

        if let Some(sessions) = tables.get_mut(SESSIONS) {
            sessions[0].parent_id = Some("missing".to_string());
        }
        if let Some(cases) = tables.get_mut(CASES) {
            cases.push(RemoteRow {
                id: "k9".to_string(),
                owner_id: "office".to_string(),
                parent_id: None,
                position: 0,
                data: json!({"subject": "Stray"}),
            });
        }

        let rebuilt = hydrate(&unflatten(tables));
        let client = &rebuilt.clients[0];
        assert_eq!(client.cases.len(), 1);
        assert_eq!(client.cases[0].stages[0].sessions.len(), 1);
        assert_eq!(client.cases[0].stages[0].sessions[0].id, "h2");
    }

    #[test]
    fn test_unflatten_orders_by_position() {
        let data = hydrate(&document());
        let mut tables = owned(flatten(&data, "office").unwrap());
        if let Some(clients) = tables.get_mut(CLIENTS) {
            clients.reverse();
        }

        let rebuilt = hydrate(&unflatten(tables));
        assert_eq!(rebuilt.clients[0].id, "c1");
        assert_eq!(rebuilt.clients[1].id, "c2");
    }

    #[test]
    fn test_repeated_ids_do_not_move_children_between_clients() {
        let data = hydrate(&json!({"clients": [
            {"id": "c1", "name": "Nadia", "cases": [{"id": "k1", "subject": "Lease"}]},
            {"id": "c1", "name": "Omar", "cases": [{"id": "k2", "subject": "Loan"}]}
        ]}));
        let tables = flatten(&data, "office").unwrap();

        let client_ids: HashSet<&str> = tables[CLIENTS].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(client_ids.len(), 2);

        let rebuilt = hydrate(&unflatten(owned(tables)));
        assert_eq!(rebuilt, data);
        assert_eq!(rebuilt.clients[1].name, "Omar");
        assert_eq!(rebuilt.clients[1].cases.len(), 1);
        assert_eq!(rebuilt.clients[1].cases[0].subject, "Loan");
    }

    #[test]
    fn test_unflatten_empty_tables() {
        let rebuilt = hydrate(&unflatten(HashMap::new()));
        assert_eq!(rebuilt, AppData::default());
    }
}
