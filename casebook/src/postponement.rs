//! Session postponement workflow
//!
//! A session is `Open` until it is postponed forward, after which it is
//! `Postponed`. Any session under a stage with a decision date is
//! `Decided`, which is terminal and overrides the session's own flag.
//!
//! [`transition`] is the whole state machine: it validates an event
//! against the current state and returns the next state or a
//! [`Rejection`]. [`plan`] additionally computes the records the store
//! writes when a postponement is accepted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::calendar::{is_before_today, DateWarning, HolidayCalendar};
use crate::models::{generate_id, Session, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Postponed,
    Decided,
}

impl SessionState {
    pub fn of(session: &Session, stage: &Stage) -> Self {
        if stage.is_decided() {
            SessionState::Decided
        } else if session.is_postponed {
            SessionState::Postponed
        } else {
            SessionState::Open
        }
    }
}

/// What the user submitted from the postponement row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostponementRequest {
    pub next_date: Option<NaiveDate>,
    pub reason: String,
    /// The user accepted the weekend/holiday warning
    pub confirmed: bool,
}

impl PostponementRequest {
    pub fn new(next_date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            next_date: Some(next_date),
            reason: reason.into(),
            confirmed: false,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostponementEvent {
    Postpone(PostponementRequest),
}

/// Facts about the session and environment the transition depends on
#[derive(Debug, Clone, Copy)]
pub struct PostponementContext<'a> {
    pub session_date: DateTime<Utc>,
    pub today: NaiveDate,
    /// Permit postponing sessions dated before today (historical backfill)
    pub allow_past: bool,
    pub calendar: &'a HolidayCalendar,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("the stage has a decision, its sessions are closed")]
    StageDecided,

    #[error("this session has already been postponed")]
    AlreadyPostponed,

    #[error("the session date has passed")]
    PastSession,

    #[error("a next session date is required")]
    MissingDate,

    #[error("a postponement reason is required")]
    MissingReason,

    #[error("the next session date must be after {session_date} (got {candidate})")]
    NotAfterSession {
        session_date: NaiveDate,
        candidate: NaiveDate,
    },

    #[error("confirmation required: {0}")]
    ConfirmationRequired(DateWarning),

    #[error("postponement fields cannot be edited once the stage is decided")]
    OutcomeFrozen,
}

/// Whether the UI should offer the postponement form at all
pub fn is_eligible(state: SessionState, ctx: &PostponementContext<'_>) -> bool {
    state == SessionState::Open && (ctx.allow_past || !is_before_today(&ctx.session_date, ctx.today))
}

/// Validate `event` against `state`.
///
/// Checks run in a fixed order so the first problem reported is the most
/// fundamental one: decided stage, already postponed, past session,
/// missing input, date ordering, then the soft weekend/holiday warning.
pub fn transition(
    state: SessionState,
    event: &PostponementEvent,
    ctx: &PostponementContext<'_>,
) -> Result<SessionState, Rejection> {
    let PostponementEvent::Postpone(request) = event;

    match state {
        SessionState::Decided => return Err(Rejection::StageDecided),
        SessionState::Postponed => return Err(Rejection::AlreadyPostponed),
        SessionState::Open => {}
    }

    if !ctx.allow_past && is_before_today(&ctx.session_date, ctx.today) {
        return Err(Rejection::PastSession);
    }

    let candidate = request.next_date.ok_or(Rejection::MissingDate)?;
    if request.reason.trim().is_empty() {
        return Err(Rejection::MissingReason);
    }

    let session_date = ctx.session_date.date_naive();
    if candidate <= session_date {
        return Err(Rejection::NotAfterSession {
            session_date,
            candidate,
        });
    }

    if !request.confirmed {
        if let Some(warning) = ctx.calendar.warning_for(candidate) {
            return Err(Rejection::ConfirmationRequired(warning));
        }
    }

    Ok(SessionState::Postponed)
}

/// Postponement fields stay editable inline until the stage is decided.
pub fn guard_outcome_edit(state: SessionState) -> Result<(), Rejection> {
    match state {
        SessionState::Decided => Err(Rejection::OutcomeFrozen),
        SessionState::Open | SessionState::Postponed => Ok(()),
    }
}

/// The writes produced by an accepted postponement
#[derive(Debug, Clone, PartialEq)]
pub struct Postponement {
    /// The original session, marked postponed
    pub current: Session,
    /// The follow-up session appended to the same stage
    pub next: Session,
}

/// Run the transition for `session` and build the resulting records.
pub fn plan(
    session: &Session,
    stage: &Stage,
    request: &PostponementRequest,
    today: NaiveDate,
    allow_past: bool,
    calendar: &HolidayCalendar,
) -> Result<Postponement, Rejection> {
    let ctx = PostponementContext {
        session_date: session.date,
        today,
        allow_past,
        calendar,
    };
    let state = SessionState::of(session, stage);
    transition(state, &PostponementEvent::Postpone(request.clone()), &ctx)?;

    let candidate = request.next_date.ok_or(Rejection::MissingDate)?;
    let next_date = candidate.and_time(session.date.time()).and_utc();
    let reason = request.reason.trim().to_string();

    let mut current = session.clone();
    current.is_postponed = true;
    current.next_session_date = Some(next_date);
    current.next_postponement_reason = Some(reason.clone());

    let next = Session {
        id: generate_id(),
        stage_id: stage.id.clone(),
        court: session.court.clone(),
        case_number: session.case_number.clone(),
        client_name: session.client_name.clone(),
        opponent_name: session.opponent_name.clone(),
        date: next_date,
        is_postponed: false,
        postponement_reason: Some(reason),
        next_session_date: None,
        next_postponement_reason: None,
        assignee: session.assignee.clone(),
    };

    Ok(Postponement { current, next })
}
