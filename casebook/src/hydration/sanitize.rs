//! Entity sanitizers
//!
//! Each function turns one raw JSON value into a complete, well-typed
//! entity. They are total: `null`, primitives and objects with missing or
//! mistyped fields all produce a valid record using the defaults below.
//!
//! - ids: kept when a non-empty string (or finite number), else generated
//! - required text: placeholder, or a value inherited from an ancestor
//! - optional text and dates: `None`
//! - required dates: now
//! - enums: the default variant
//! - assignees: resolved against the already-sanitized assistants

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::dates::parse_date;
use crate::config::{
    CASE_WITHOUT_SUBJECT, NO_CASE_NUMBER, NO_DESCRIPTION, UNASSIGNED, UNKNOWN_OPPONENT,
    UNNAMED_CLIENT, UNSPECIFIED_COURT, UNTITLED_APPOINTMENT, UNTITLED_TASK,
};
use crate::models::{
    generate_id, AccountingEntry, AdminTask, Appointment, Assistants, Case, CaseStatus, Client,
    EntryType, Importance, Invoice, InvoiceItem, InvoiceStatus, Session, Stage,
};

// ===== Field readers =====

fn id_field(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::Number(n)) if n.as_f64().is_some_and(f64::is_finite) => n.to_string(),
        _ => generate_id(),
    }
}

fn text_or(record: &Value, key: &str, fallback: &str) -> String {
    optional_text(record, key).unwrap_or_else(|| fallback.to_string())
}

fn optional_text(record: &Value, key: &str) -> Option<String> {
    match record.get(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    }
}

/// Free text that may legitimately be empty
fn plain_text(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    }
}

fn required_date(record: &Value, key: &str) -> DateTime<Utc> {
    optional_date(record, key).unwrap_or_else(Utc::now)
}

fn optional_date(record: &Value, key: &str) -> Option<DateTime<Utc>> {
    record.get(key).and_then(parse_date)
}

fn flag(record: &Value, key: &str) -> bool {
    matches!(record.get(key), Some(Value::Bool(true)))
}

fn number(record: &Value, key: &str) -> f64 {
    let parsed = match record.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn enum_field<T: Default>(
    record: &Value,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(parse)
        .unwrap_or_default()
}

fn assignee(record: &Value, assistants: &Assistants) -> String {
    match record.get("assignee") {
        Some(Value::String(name)) => assistants.resolve(name),
        _ => UNASSIGNED.to_string(),
    }
}

/// Object entries of an array field; anything else yields nothing
pub(crate) fn objects<'a>(value: Option<&'a Value>) -> impl Iterator<Item = &'a Value> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|entry| entry.is_object())
}

// ===== Assistants =====

pub fn sanitize_assistants(value: Option<&Value>) -> Assistants {
    match value.and_then(Value::as_array) {
        Some(names) => Assistants::new(names.iter().filter_map(Value::as_str)),
        None => Assistants::default(),
    }
}

// ===== Client tree =====

pub fn sanitize_client(value: &Value, assistants: &Assistants) -> Client {
    let id = id_field(value);
    let name = text_or(value, "name", UNNAMED_CLIENT);

    let cases = objects(value.get("cases"))
        .map(|case| sanitize_case(case, &id, &name, assistants))
        .collect();

    Client {
        id,
        name,
        contact_info: plain_text(value, "contactInfo"),
        cases,
    }
}

pub fn sanitize_case(
    value: &Value,
    client_id: &str,
    client_name: &str,
    assistants: &Assistants,
) -> Case {
    let mut case = Case {
        id: id_field(value),
        client_id: client_id.to_string(),
        client_name: text_or(value, "clientName", client_name),
        subject: text_or(value, "subject", CASE_WITHOUT_SUBJECT),
        opponent_name: text_or(value, "opponentName", UNKNOWN_OPPONENT),
        fee_agreement: plain_text(value, "feeAgreement"),
        status: enum_field(value, "status", CaseStatus::parse),
        created_at: required_date(value, "createdAt"),
        stages: Vec::new(),
    };

    case.stages = objects(value.get("stages"))
        .map(|stage| sanitize_stage(stage, &case, assistants))
        .collect();
    case
}

pub fn sanitize_stage(value: &Value, case: &Case, assistants: &Assistants) -> Stage {
    let mut stage = Stage {
        id: id_field(value),
        case_id: case.id.clone(),
        court: text_or(value, "court", UNSPECIFIED_COURT),
        case_number: text_or(value, "caseNumber", NO_CASE_NUMBER),
        first_session_date: optional_date(value, "firstSessionDate"),
        decision_date: optional_date(value, "decisionDate"),
        decision_number: optional_text(value, "decisionNumber"),
        decision_summary: optional_text(value, "decisionSummary"),
        decision_notes: optional_text(value, "decisionNotes"),
        sessions: Vec::new(),
    };

    stage.sessions = objects(value.get("sessions"))
        .map(|session| sanitize_session(session, case, &stage, assistants))
        .collect();
    stage
}

pub fn sanitize_session(
    value: &Value,
    case: &Case,
    stage: &Stage,
    assistants: &Assistants,
) -> Session {
    Session {
        id: id_field(value),
        stage_id: stage.id.clone(),
        court: text_or(value, "court", &stage.court),
        case_number: text_or(value, "caseNumber", &stage.case_number),
        client_name: text_or(value, "clientName", &case.client_name),
        opponent_name: text_or(value, "opponentName", &case.opponent_name),
        date: required_date(value, "date"),
        is_postponed: flag(value, "isPostponed"),
        postponement_reason: optional_text(value, "postponementReason"),
        next_session_date: optional_date(value, "nextSessionDate"),
        next_postponement_reason: optional_text(value, "nextPostponementReason"),
        assignee: assignee(value, assistants),
    }
}

// ===== Flat collections =====

pub fn sanitize_admin_task(value: &Value, assistants: &Assistants) -> AdminTask {
    AdminTask {
        id: id_field(value),
        task: text_or(value, "task", UNTITLED_TASK),
        due_date: required_date(value, "dueDate"),
        completed: flag(value, "completed"),
        importance: enum_field(value, "importance", Importance::parse),
        assignee: assignee(value, assistants),
        location: optional_text(value, "location"),
    }
}

pub fn sanitize_appointment(value: &Value, assistants: &Assistants) -> Appointment {
    Appointment {
        id: id_field(value),
        title: text_or(value, "title", UNTITLED_APPOINTMENT),
        date: required_date(value, "date"),
        importance: enum_field(value, "importance", Importance::parse),
        assignee: assignee(value, assistants),
        notes: optional_text(value, "notes"),
        completed: flag(value, "completed"),
    }
}

pub fn sanitize_accounting_entry(value: &Value) -> AccountingEntry {
    AccountingEntry {
        id: id_field(value),
        entry_type: enum_field(value, "type", EntryType::parse),
        amount: number(value, "amount"),
        date: required_date(value, "date"),
        description: text_or(value, "description", NO_DESCRIPTION),
        client_id: plain_text(value, "clientId"),
        case_id: plain_text(value, "caseId"),
        client_name: plain_text(value, "clientName"),
    }
}

pub fn sanitize_invoice(value: &Value) -> Invoice {
    Invoice {
        id: id_field(value),
        client_id: plain_text(value, "clientId"),
        client_name: text_or(value, "clientName", UNNAMED_CLIENT),
        case_id: optional_text(value, "caseId"),
        case_subject: optional_text(value, "caseSubject"),
        issue_date: required_date(value, "issueDate"),
        due_date: optional_date(value, "dueDate"),
        items: objects(value.get("items"))
            .map(sanitize_invoice_item)
            .collect(),
        tax_rate: number(value, "taxRate"),
        discount: number(value, "discount"),
        status: enum_field(value, "status", InvoiceStatus::parse),
        notes: optional_text(value, "notes"),
    }
}

pub fn sanitize_invoice_item(value: &Value) -> InvoiceItem {
    InvoiceItem {
        id: id_field(value),
        description: text_or(value, "description", NO_DESCRIPTION),
        amount: number(value, "amount"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistants() -> Assistants {
        Assistants::new(["Amal", "Karim"])
    }

    #[test]
    fn test_null_client_gets_defaults() {
        let client = sanitize_client(&Value::Null, &assistants());
        assert!(!client.id.is_empty());
        assert_eq!(client.name, UNNAMED_CLIENT);
        assert_eq!(client.contact_info, "");
        assert!(client.cases.is_empty());
    }

    #[test]
    fn test_primitive_inputs_are_total() {
        for raw in [json!(42), json!("client"), json!(true), json!([1, 2])] {
            let client = sanitize_client(&raw, &assistants());
            assert_eq!(client.name, UNNAMED_CLIENT);

            let task = sanitize_admin_task(&raw, &assistants());
            assert_eq!(task.task, UNTITLED_TASK);
            assert_eq!(task.assignee, UNASSIGNED);
        }
    }

    #[test]
    fn test_numeric_id_is_kept_as_string() {
        let client = sanitize_client(&json!({"id": 17, "name": "Nadia"}), &assistants());
        assert_eq!(client.id, "17");
    }

    #[test]
    fn test_blank_strings_fall_back_to_placeholders() {
        let client = sanitize_client(
            &json!({
                "id": "c1",
                "name": "   ",
                "cases": [{"id": "k1", "subject": "", "opponentName": 7}]
            }),
            &assistants(),
        );
        assert_eq!(client.name, UNNAMED_CLIENT);
        assert_eq!(client.cases[0].subject, CASE_WITHOUT_SUBJECT);
        assert_eq!(client.cases[0].opponent_name, UNKNOWN_OPPONENT);
    }

    #[test]
    fn test_nested_collections_filter_non_objects() {
        let client = sanitize_client(
            &json!({
                "id": "c1",
                "name": "Nadia",
                "cases": [null, 3, "x", {"id": "k1", "stages": "oops"}, {"id": "k2"}]
            }),
            &assistants(),
        );
        assert_eq!(client.cases.len(), 2);
        assert!(client.cases[0].stages.is_empty());
        assert_eq!(client.cases[1].id, "k2");
    }

    #[test]
    fn test_session_inherits_ancestor_fields() {
        let client = sanitize_client(
            &json!({
                "id": "c1",
                "name": "Nadia",
                "cases": [{
                    "id": "k1",
                    "clientId": "someone-else",
                    "opponentName": "Acme",
                    "stages": [{
                        "id": "s1",
                        "court": "Court of Appeal",
                        "caseNumber": "123/2024",
                        "sessions": [{"id": "h1", "stageId": "wrong", "date": "2024-05-10"}]
                    }]
                }]
            }),
            &assistants(),
        );

        let case = &client.cases[0];
        assert_eq!(case.client_id, "c1");
        assert_eq!(case.client_name, "Nadia");

        let stage = &case.stages[0];
        assert_eq!(stage.case_id, "k1");

        let session = &stage.sessions[0];
        assert_eq!(session.stage_id, "s1");
        assert_eq!(session.court, "Court of Appeal");
        assert_eq!(session.case_number, "123/2024");
        assert_eq!(session.client_name, "Nadia");
        assert_eq!(session.opponent_name, "Acme");
        assert!(!session.is_postponed);
    }

    #[test]
    fn test_session_assignee_is_validated() {
        let case = sanitize_case(&json!({"id": "k1"}), "c1", "Nadia", &assistants());
        let stage = sanitize_stage(&json!({"id": "s1"}), &case, &assistants());

        let known = sanitize_session(&json!({"assignee": "Amal"}), &case, &stage, &assistants());
        assert_eq!(known.assignee, "Amal");

        let stale = sanitize_session(&json!({"assignee": "Ghost"}), &case, &stage, &assistants());
        assert_eq!(stale.assignee, UNASSIGNED);

        let wrong_type = sanitize_session(&json!({"assignee": 5}), &case, &stage, &assistants());
        assert_eq!(wrong_type.assignee, UNASSIGNED);
    }

    #[test]
    fn test_invalid_enums_fall_back_to_default() {
        let case = sanitize_case(&json!({"status": "archived"}), "c1", "Nadia", &assistants());
        assert_eq!(case.status, CaseStatus::Active);

        let case = sanitize_case(&json!({"status": "on_hold"}), "c1", "Nadia", &assistants());
        assert_eq!(case.status, CaseStatus::OnHold);

        let entry = sanitize_accounting_entry(&json!({"type": 1}));
        assert_eq!(entry.entry_type, EntryType::Income);

        let invoice = sanitize_invoice(&json!({"status": "PAID"}));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }

    #[test]
    fn test_optional_dates_stay_absent() {
        let case = sanitize_case(&json!({}), "c1", "Nadia", &assistants());
        let stage = sanitize_stage(
            &json!({"firstSessionDate": "garbage", "decisionDate": null}),
            &case,
            &assistants(),
        );
        assert!(stage.first_session_date.is_none());
        assert!(stage.decision_date.is_none());
        assert!(!stage.is_decided());
    }

    #[test]
    fn test_required_dates_default_to_now() {
        let before = Utc::now();
        let task = sanitize_admin_task(&json!({"dueDate": "soon"}), &assistants());
        assert!(task.due_date >= before);
    }

    #[test]
    fn test_amounts_accept_numeric_strings() {
        let entry = sanitize_accounting_entry(&json!({"amount": " 250.5 "}));
        assert_eq!(entry.amount, 250.5);

        let entry = sanitize_accounting_entry(&json!({"amount": "a lot"}));
        assert_eq!(entry.amount, 0.0);

        let invoice = sanitize_invoice(&json!({
            "taxRate": 14,
            "items": [{"description": "Filing", "amount": 100}, "junk"]
        }));
        assert_eq!(invoice.tax_rate, 14.0);
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].amount, 100.0);
    }

    #[test]
    fn test_assistants_from_garbage() {
        assert_eq!(sanitize_assistants(None), Assistants::default());
        assert_eq!(sanitize_assistants(Some(&json!("Amal"))), Assistants::default());

        let assistants = sanitize_assistants(Some(&json!(["Amal", 3, null, "Amal", "Karim"])));
        assert_eq!(assistants.names(), &[UNASSIGNED, "Amal", "Karim"]);
    }
}
