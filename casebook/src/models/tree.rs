//! The owned client tree: Client → Case → Stage → Session.
//!
//! Each level owns its children outright. The `client_id`, `case_id` and
//! `stage_id` back-references are lookup keys kept equal to the owning
//! parent's id by the hydration layer and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config;

/// A client of the office
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub contact_info: String,
    pub cases: Vec<Case>,
}

impl Client {
    pub fn new(name: impl Into<String>, contact_info: impl Into<String>) -> Self {
        Self {
            id: super::generate_id(),
            name: name.into(),
            contact_info: contact_info.into(),
            cases: Vec::new(),
        }
    }
}

/// Lifecycle status of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Active,
    Closed,
    OnHold,
}

impl CaseStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(CaseStatus::Active),
            "closed" => Some(CaseStatus::Closed),
            "on_hold" => Some(CaseStatus::OnHold),
            _ => None,
        }
    }
}

/// A legal matter handled for one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub subject: String,
    pub opponent_name: String,
    pub fee_agreement: String,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub stages: Vec<Stage>,
}

impl Case {
    pub fn new(client: &Client, subject: impl Into<String>, opponent_name: impl Into<String>) -> Self {
        Self {
            id: super::generate_id(),
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            subject: subject.into(),
            opponent_name: opponent_name.into(),
            fee_agreement: String::new(),
            status: CaseStatus::Active,
            created_at: Utc::now(),
            stages: Vec::new(),
        }
    }
}

/// A phase of litigation at one court
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    pub case_id: String,
    pub court: String,
    pub case_number: String,
    pub first_session_date: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
    pub decision_number: Option<String>,
    pub decision_summary: Option<String>,
    pub decision_notes: Option<String>,
    pub sessions: Vec<Session>,
}

impl Stage {
    pub fn new(case: &Case, court: impl Into<String>, case_number: impl Into<String>) -> Self {
        Self {
            id: super::generate_id(),
            case_id: case.id.clone(),
            court: court.into(),
            case_number: case_number.into(),
            first_session_date: None,
            decision_date: None,
            decision_number: None,
            decision_summary: None,
            decision_notes: None,
            sessions: Vec::new(),
        }
    }

    /// A stage with a decision date is terminal
    pub fn is_decided(&self) -> bool {
        self.decision_date.is_some()
    }
}

/// A single scheduled court hearing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub stage_id: String,
    pub court: String,
    pub case_number: String,
    pub client_name: String,
    pub opponent_name: String,
    pub date: DateTime<Utc>,
    pub is_postponed: bool,
    /// Why this session exists as the target of an earlier postponement
    pub postponement_reason: Option<String>,
    /// Set when this session is postponed forward
    pub next_session_date: Option<DateTime<Utc>>,
    pub next_postponement_reason: Option<String>,
    pub assignee: String,
}

impl Session {
    /// New session on `stage`, copying the denormalized display fields
    /// from the stage and its case.
    pub fn new(case: &Case, stage: &Stage, date: DateTime<Utc>) -> Self {
        Self {
            id: super::generate_id(),
            stage_id: stage.id.clone(),
            court: stage.court.clone(),
            case_number: stage.case_number.clone(),
            client_name: case.client_name.clone(),
            opponent_name: case.opponent_name.clone(),
            date,
            is_postponed: false,
            postponement_reason: None,
            next_session_date: None,
            next_postponement_reason: None,
            assignee: config::UNASSIGNED.to_string(),
        }
    }
}
