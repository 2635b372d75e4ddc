//! Targeted operations on the client tree.
//!
//! Each mutation clones the tree, edits the copy and commits it through
//! `set_clients`, so a failed operation leaves the store untouched.

use chrono::{DateTime, NaiveDate, Utc};

use super::LocalStore;
use crate::calendar::HolidayCalendar;
use crate::error::{AppError, Result};
use crate::hydration::repair::unused_id;
use crate::models::{Assistants, Case, Client, Session, Stage};
use crate::postponement::{guard_outcome_edit, plan, PostponementRequest, SessionState};

/// A single inline edit of a session row
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEdit {
    Court(String),
    CaseNumber(String),
    ClientName(String),
    OpponentName(String),
    Assignee(String),
    PostponementReason(Option<String>),
    NextSessionDate(Option<DateTime<Utc>>),
    NextPostponementReason(Option<String>),
}

impl SessionEdit {
    fn touches_outcome(&self) -> bool {
        matches!(
            self,
            SessionEdit::NextSessionDate(_) | SessionEdit::NextPostponementReason(_)
        )
    }
}

/// A session together with every ancestor
#[derive(Debug, Clone, Copy)]
pub struct SessionLocation<'a> {
    pub client: &'a Client,
    pub case: &'a Case,
    pub stage: &'a Stage,
    pub session: &'a Session,
}

impl SessionLocation<'_> {
    pub fn state(&self) -> SessionState {
        SessionState::of(self.session, self.stage)
    }
}

fn remove_first<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> bool {
    match items.iter().position(matches) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

/// Indices of (client, case, stage, session) for `session_id`
fn session_path(clients: &[Client], session_id: &str) -> Option<(usize, usize, usize, usize)> {
    for (c, client) in clients.iter().enumerate() {
        for (k, case) in client.cases.iter().enumerate() {
            for (s, stage) in case.stages.iter().enumerate() {
                if let Some(i) = stage.sessions.iter().position(|x| x.id == session_id) {
                    return Some((c, k, s, i));
                }
            }
        }
    }
    None
}

fn or_fallback(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

impl LocalStore {
    fn modify_clients<R>(
        &mut self,
        f: impl FnOnce(&mut Vec<Client>, &Assistants) -> Result<R>,
    ) -> Result<R> {
        let mut clients = self.clients.as_ref().clone();
        let out = f(&mut clients, &self.assistants)?;
        self.set_clients(clients);
        Ok(out)
    }

    // ===== Lookups =====

    pub fn client(&self, client_id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == client_id)
    }

    pub fn find_stage(&self, stage_id: &str) -> Option<(&Case, &Stage)> {
        self.clients
            .iter()
            .flat_map(|c| &c.cases)
            .find_map(|case| {
                case.stages
                    .iter()
                    .find(|stage| stage.id == stage_id)
                    .map(|stage| (case, stage))
            })
    }

    pub fn find_session(&self, session_id: &str) -> Option<SessionLocation<'_>> {
        let (c, k, s, i) = session_path(&self.clients, session_id)?;
        let client = &self.clients[c];
        let case = &client.cases[k];
        let stage = &case.stages[s];
        Some(SessionLocation {
            client,
            case,
            stage,
            session: &stage.sessions[i],
        })
    }

    fn case_exists(&self, case_id: &str) -> bool {
        self.clients
            .iter()
            .flat_map(|c| &c.cases)
            .any(|case| case.id == case_id)
    }

    // ===== Additions =====

    /// Append a client; a blank or already used id is replaced and the
    /// id actually stored is returned.
    pub fn add_client(&mut self, mut client: Client) -> String {
        client.id = unused_id(client.id, |id| self.client(id).is_some());
        let id = client.id.clone();
        let mut clients = self.clients.as_ref().clone();
        clients.push(client);
        self.set_clients(clients);
        tracing::info!("Added client {}", id);
        id
    }

    pub fn add_case(&mut self, client_id: &str, mut case: Case) -> Result<String> {
        case.id = unused_id(case.id, |id| self.case_exists(id));
        self.modify_clients(|clients, _| {
            let client = clients
                .iter_mut()
                .find(|c| c.id == client_id)
                .ok_or_else(|| AppError::not_found("client", client_id))?;

            case.client_id = client.id.clone();
            case.client_name = or_fallback(case.client_name, &client.name);
            let id = case.id.clone();
            client.cases.push(case);
            Ok(id)
        })
    }

    pub fn add_stage(&mut self, case_id: &str, mut stage: Stage) -> Result<String> {
        stage.id = unused_id(stage.id, |id| self.find_stage(id).is_some());
        self.modify_clients(|clients, _| {
            let case = clients
                .iter_mut()
                .flat_map(|c| c.cases.iter_mut())
                .find(|k| k.id == case_id)
                .ok_or_else(|| AppError::not_found("case", case_id))?;

            stage.case_id = case.id.clone();
            let id = stage.id.clone();
            case.stages.push(stage);
            Ok(id)
        })
    }

    /// Append a session; blank display fields are inherited from the stage
    /// and case, an unknown assignee becomes unassigned.
    pub fn add_session(&mut self, stage_id: &str, mut session: Session) -> Result<String> {
        session.id = unused_id(session.id, |id| self.find_session(id).is_some());
        self.modify_clients(|clients, _| {
            let case = clients
                .iter_mut()
                .flat_map(|c| c.cases.iter_mut())
                .find(|k| k.stages.iter().any(|s| s.id == stage_id))
                .ok_or_else(|| AppError::not_found("stage", stage_id))?;

            session.client_name = or_fallback(session.client_name, &case.client_name);
            session.opponent_name = or_fallback(session.opponent_name, &case.opponent_name);

            let stage = case
                .stages
                .iter_mut()
                .find(|s| s.id == stage_id)
                .ok_or_else(|| AppError::not_found("stage", stage_id))?;

            session.stage_id = stage.id.clone();
            session.court = or_fallback(session.court, &stage.court);
            session.case_number = or_fallback(session.case_number, &stage.case_number);
            let id = session.id.clone();
            stage.sessions.push(session);
            Ok(id)
        })
    }

    // ===== Deletions =====

    /// Remove a client with all of its cases, stages and sessions
    pub fn delete_client(&mut self, client_id: &str) -> Result<()> {
        self.modify_clients(|clients, _| {
            if !remove_first(clients, |c| c.id == client_id) {
                return Err(AppError::not_found("client", client_id));
            }
            tracing::info!("Deleted client {} with its cases", client_id);
            Ok(())
        })
    }

    pub fn delete_case(&mut self, case_id: &str) -> Result<()> {
        self.modify_clients(|clients, _| {
            let removed = clients
                .iter_mut()
                .any(|c| remove_first(&mut c.cases, |k| k.id == case_id));
            if !removed {
                return Err(AppError::not_found("case", case_id));
            }
            Ok(())
        })
    }

    pub fn delete_stage(&mut self, stage_id: &str) -> Result<()> {
        self.modify_clients(|clients, _| {
            let removed = clients
                .iter_mut()
                .flat_map(|c| c.cases.iter_mut())
                .any(|k| remove_first(&mut k.stages, |s| s.id == stage_id));
            if !removed {
                return Err(AppError::not_found("stage", stage_id));
            }
            Ok(())
        })
    }

    pub fn delete_session(&mut self, session_id: &str) -> Result<()> {
        self.modify_clients(|clients, _| {
            let removed = clients
                .iter_mut()
                .flat_map(|c| c.cases.iter_mut())
                .flat_map(|k| k.stages.iter_mut())
                .any(|s| remove_first(&mut s.sessions, |x| x.id == session_id));
            if !removed {
                return Err(AppError::not_found("session", session_id));
            }
            Ok(())
        })
    }

    // ===== Session workflow =====

    /// Apply one inline edit. Blank display fields fall back to the values
    /// inherited from the stage and case, the same way hydration fills them.
    pub fn edit_session(&mut self, session_id: &str, edit: SessionEdit) -> Result<()> {
        self.modify_clients(|clients, assistants| {
            let (c, k, s, i) = session_path(clients, session_id)
                .ok_or_else(|| AppError::not_found("session", session_id))?;

            let case = &mut clients[c].cases[k];
            let case_client = case.client_name.clone();
            let case_opponent = case.opponent_name.clone();
            let stage = &mut case.stages[s];

            if edit.touches_outcome() {
                guard_outcome_edit(SessionState::of(&stage.sessions[i], &*stage))?;
            }

            let stage_court = stage.court.clone();
            let stage_number = stage.case_number.clone();
            let session = &mut stage.sessions[i];

            match edit {
                SessionEdit::Court(value) => session.court = or_fallback(value, &stage_court),
                SessionEdit::CaseNumber(value) => {
                    session.case_number = or_fallback(value, &stage_number)
                }
                SessionEdit::ClientName(value) => {
                    session.client_name = or_fallback(value, &case_client)
                }
                SessionEdit::OpponentName(value) => {
                    session.opponent_name = or_fallback(value, &case_opponent)
                }
                SessionEdit::Assignee(name) => {
                    if !assistants.contains(&name) {
                        return Err(AppError::UnknownAssistant(name));
                    }
                    session.assignee = name;
                }
                SessionEdit::PostponementReason(reason) => {
                    session.postponement_reason = non_blank(reason)
                }
                SessionEdit::NextSessionDate(date) => session.next_session_date = date,
                SessionEdit::NextPostponementReason(reason) => {
                    session.next_postponement_reason = non_blank(reason)
                }
            }
            Ok(())
        })
    }

    /// Postpone a session forward; returns the follow-up session that was
    /// appended to the same stage.
    pub fn postpone_session(
        &mut self,
        session_id: &str,
        request: &PostponementRequest,
        today: NaiveDate,
        allow_past: bool,
        calendar: &HolidayCalendar,
    ) -> Result<Session> {
        self.modify_clients(|clients, _| {
            let (c, k, s, i) = session_path(clients, session_id)
                .ok_or_else(|| AppError::not_found("session", session_id))?;

            let stage = &mut clients[c].cases[k].stages[s];
            let outcome = plan(&stage.sessions[i], &*stage, request, today, allow_past, calendar)?;

            tracing::info!(
                "Postponed session {} to {} as {}",
                session_id,
                outcome.next.date.date_naive(),
                outcome.next.id
            );

            stage.sessions[i] = outcome.current;
            stage.sessions.push(outcome.next.clone());
            Ok(outcome.next)
        })
    }
}
