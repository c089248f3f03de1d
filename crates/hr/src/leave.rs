use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, optional_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use atelier_events::Event;

pub const LEAVE_REQUEST_AGGREGATE: &str = "hr.leave_request";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaveRequestId(pub AggregateId);

impl LeaveRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LeaveRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Draft,
    PendingApproval,
    Approved,
    Denied,
}

/// Dates and type of a leave request as entered by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePeriod {
    pub leave_type: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    #[serde(default)]
    pub half_day_start: bool,
    #[serde(default)]
    pub half_day_end: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

impl LeavePeriod {
    fn normalized(&self) -> Result<Self, DomainError> {
        if self.date_end < self.date_start {
            return Err(DomainError::validation("date_end must be on or after date_start"));
        }
        Ok(Self {
            leave_type: normalize_code(&self.leave_type, "leave_type")?,
            comment: optional_text(self.comment.as_deref()),
            ..self.clone()
        })
    }

    /// Working time requested, in half days.
    pub fn working_half_days(&self) -> u32 {
        working_half_days(self.date_start, self.date_end, self.half_day_start, self.half_day_end)
    }
}

fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday to Friday days in `[start, end]`, counted in halves. A half-day flag
/// removes half of the first or last day when that day is worked.
pub fn working_half_days(start: NaiveDate, end: NaiveDate, half_day_start: bool, half_day_end: bool) -> u32 {
    if end < start {
        return 0;
    }
    let full = start.iter_days().take_while(|d| *d <= end).filter(|d| is_working_day(*d)).count() as u32;
    let mut halves = full * 2;
    if half_day_start && is_working_day(start) {
        halves = halves.saturating_sub(1);
    }
    if half_day_end && is_working_day(end) && (end != start || !half_day_start) {
        halves = halves.saturating_sub(1);
    }
    halves
}

/// Aggregate root: a leave request and its approval workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    id: LeaveRequestId,
    tenant_id: Option<TenantId>,
    requester: Option<UserId>,
    period: Option<LeavePeriod>,
    status: LeaveStatus,
    validator: Option<UserId>,
    response_comment: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    denied_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl LeaveRequest {
    pub fn empty(id: LeaveRequestId) -> Self {
        Self {
            id,
            tenant_id: None,
            requester: None,
            period: None,
            status: LeaveStatus::Draft,
            validator: None,
            response_comment: None,
            submitted_at: None,
            approved_at: None,
            denied_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub fn period(&self) -> Option<&LeavePeriod> {
        self.period.as_ref()
    }

    pub fn status(&self) -> LeaveStatus {
        self.status
    }

    pub fn validator(&self) -> Option<UserId> {
        self.validator
    }

    pub fn response_comment(&self) -> Option<&str> {
        self.response_comment.as_deref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn denied_at(&self) -> Option<DateTime<Utc>> {
        self.denied_at
    }
}

impl AggregateRoot for LeaveRequest {
    type Id = LeaveRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLeaveRequest {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub requester: UserId,
    pub period: LeavePeriod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLeaveRequest {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub acting_user: UserId,
    pub period: LeavePeriod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitLeaveRequest {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub acting_user: UserId,
    /// Configured validator for the requester; `None` blocks submission.
    pub validator: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideLeaveRequest {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub acting_user: UserId,
    #[serde(default)]
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveRequestCommand {
    Create(CreateLeaveRequest),
    Update(UpdateLeaveRequest),
    Submit(SubmitLeaveRequest),
    Approve(DecideLeaveRequest),
    Deny(DecideLeaveRequest),
    Reopen(DecideLeaveRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequestCreated {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub requester: UserId,
    pub period: LeavePeriod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequestUpdated {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub period: LeavePeriod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequestSubmitted {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub requester: UserId,
    pub validator: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequestDecided {
    pub tenant_id: TenantId,
    pub request_id: LeaveRequestId,
    pub requester: UserId,
    pub decided_by: UserId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveRequestEvent {
    Created(LeaveRequestCreated),
    Updated(LeaveRequestUpdated),
    Submitted(LeaveRequestSubmitted),
    Approved(LeaveRequestDecided),
    Denied(LeaveRequestDecided),
    Reopened(LeaveRequestDecided),
}

impl Event for LeaveRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeaveRequestEvent::Created(_) => "hr.leave_request.created",
            LeaveRequestEvent::Updated(_) => "hr.leave_request.updated",
            LeaveRequestEvent::Submitted(_) => "hr.leave_request.submitted",
            LeaveRequestEvent::Approved(_) => "hr.leave_request.approved",
            LeaveRequestEvent::Denied(_) => "hr.leave_request.denied",
            LeaveRequestEvent::Reopened(_) => "hr.leave_request.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LeaveRequestEvent::Created(e) => e.occurred_at,
            LeaveRequestEvent::Updated(e) => e.occurred_at,
            LeaveRequestEvent::Submitted(e) => e.occurred_at,
            LeaveRequestEvent::Approved(e) | LeaveRequestEvent::Denied(e) | LeaveRequestEvent::Reopened(e) => {
                e.occurred_at
            }
        }
    }
}

impl Aggregate for LeaveRequest {
    type Command = LeaveRequestCommand;
    type Event = LeaveRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeaveRequestEvent::Created(e) => {
                self.id = e.request_id;
                self.tenant_id = Some(e.tenant_id);
                self.requester = Some(e.requester);
                self.period = Some(e.period.clone());
                self.status = LeaveStatus::Draft;
                self.created = true;
            }
            LeaveRequestEvent::Updated(e) => self.period = Some(e.period.clone()),
            LeaveRequestEvent::Submitted(e) => {
                self.status = LeaveStatus::PendingApproval;
                self.validator = Some(e.validator);
                self.submitted_at = Some(e.occurred_at);
            }
            LeaveRequestEvent::Approved(e) => {
                self.status = LeaveStatus::Approved;
                self.approved_at = Some(e.occurred_at);
            }
            LeaveRequestEvent::Denied(e) => {
                self.status = LeaveStatus::Denied;
                self.denied_at = Some(e.occurred_at);
                self.response_comment = e.comment.clone();
            }
            LeaveRequestEvent::Reopened(_) => self.status = LeaveStatus::Draft,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LeaveRequestCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("leave request already exists"));
                }
                Ok(vec![LeaveRequestEvent::Created(LeaveRequestCreated {
                    tenant_id: cmd.tenant_id,
                    request_id: cmd.request_id,
                    requester: cmd.requester,
                    period: cmd.period.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LeaveRequestCommand::Update(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
                self.ensure_status(LeaveStatus::Draft, "only draft requests can be edited")?;
                self.ensure_requester(cmd.acting_user)?;
                Ok(vec![LeaveRequestEvent::Updated(LeaveRequestUpdated {
                    tenant_id: cmd.tenant_id,
                    request_id: cmd.request_id,
                    period: cmd.period.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LeaveRequestCommand::Submit(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
                self.ensure_status(LeaveStatus::Draft, "only draft requests can be submitted")?;
                let requester = self.ensure_requester(cmd.acting_user)?;
                let validator = cmd
                    .validator
                    .ok_or_else(|| DomainError::invariant("no leave validator defined for this user"))?;
                Ok(vec![LeaveRequestEvent::Submitted(LeaveRequestSubmitted {
                    tenant_id: cmd.tenant_id,
                    request_id: cmd.request_id,
                    requester,
                    validator,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LeaveRequestCommand::Approve(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
                self.ensure_status(LeaveStatus::PendingApproval, "only pending requests can be approved")?;
                self.ensure_validator(cmd.acting_user)?;
                Ok(vec![LeaveRequestEvent::Approved(self.decided(cmd)?)])
            }
            LeaveRequestCommand::Deny(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
                self.ensure_status(LeaveStatus::PendingApproval, "only pending requests can be denied")?;
                self.ensure_validator(cmd.acting_user)?;
                Ok(vec![LeaveRequestEvent::Denied(self.decided(cmd)?)])
            }
            LeaveRequestCommand::Reopen(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
                self.ensure_status(LeaveStatus::Denied, "only denied requests can be reopened")?;
                self.ensure_requester(cmd.acting_user)?;
                Ok(vec![LeaveRequestEvent::Reopened(self.decided(cmd)?)])
            }
        }
    }
}

impl LeaveRequest {
    fn ensure_existing(&self, tenant_id: TenantId, request_id: LeaveRequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: LeaveStatus, msg: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invariant(msg));
        }
        Ok(())
    }

    fn ensure_requester(&self, user: UserId) -> Result<UserId, DomainError> {
        match self.requester {
            Some(r) if r == user => Ok(r),
            _ => Err(DomainError::unauthorized()),
        }
    }

    fn ensure_validator(&self, user: UserId) -> Result<(), DomainError> {
        if self.validator != Some(user) {
            return Err(DomainError::unauthorized());
        }
        Ok(())
    }

    fn decided(&self, cmd: &DecideLeaveRequest) -> Result<LeaveRequestDecided, DomainError> {
        Ok(LeaveRequestDecided {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            requester: self.requester.ok_or_else(DomainError::not_found)?,
            decided_by: cmd.acting_user,
            comment: optional_text(cmd.comment.as_deref()),
            occurred_at: cmd.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;
    use proptest::prelude::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn period() -> LeavePeriod {
        LeavePeriod {
            leave_type: "cp".to_string(),
            // Monday 2 March to Friday 6 March 2026
            date_start: date(3, 2),
            date_end: date(3, 6),
            half_day_start: false,
            half_day_end: true,
            comment: None,
        }
    }

    struct Fixture {
        request: LeaveRequest,
        tenant_id: TenantId,
        requester: UserId,
        validator: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let tenant_id = TenantId::new();
            let requester = UserId::new();
            let id = LeaveRequestId::new(AggregateId::new());
            let mut request = LeaveRequest::empty(id);
            execute(
                &mut request,
                &LeaveRequestCommand::Create(CreateLeaveRequest {
                    tenant_id,
                    request_id: id,
                    requester,
                    period: period(),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
            Self {
                request,
                tenant_id,
                requester,
                validator: UserId::new(),
            }
        }

        fn submit(&mut self, by: UserId, validator: Option<UserId>) -> Result<Vec<LeaveRequestEvent>, DomainError> {
            let cmd = LeaveRequestCommand::Submit(SubmitLeaveRequest {
                tenant_id: self.tenant_id,
                request_id: *self.request.id(),
                acting_user: by,
                validator,
                occurred_at: Utc::now(),
            });
            execute(&mut self.request, &cmd)
        }

        fn decide(
            &mut self,
            make: fn(DecideLeaveRequest) -> LeaveRequestCommand,
            by: UserId,
            comment: Option<&str>,
        ) -> Result<Vec<LeaveRequestEvent>, DomainError> {
            let cmd = make(DecideLeaveRequest {
                tenant_id: self.tenant_id,
                request_id: *self.request.id(),
                acting_user: by,
                comment: comment.map(str::to_string),
                occurred_at: Utc::now(),
            });
            execute(&mut self.request, &cmd)
        }
    }

    #[test]
    fn leave_type_is_upper_cased_and_days_counted() {
        let f = Fixture::new();
        let p = f.request.period().unwrap();
        assert_eq!(p.leave_type, "CP");
        // Five weekdays minus the afternoon of Friday.
        assert_eq!(p.working_half_days(), 9);
    }

    #[test]
    fn submit_requires_a_validator() {
        let mut f = Fixture::new();
        let requester = f.requester;
        match f.submit(requester, None) {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("validator") => {}
            other => panic!("Expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn only_requester_submits_and_only_validator_approves() {
        let mut f = Fixture::new();
        let (requester, validator) = (f.requester, f.validator);
        assert_eq!(f.submit(validator, Some(validator)).unwrap_err(), DomainError::Unauthorized);
        f.submit(requester, Some(validator)).unwrap();
        assert_eq!(f.request.status(), LeaveStatus::PendingApproval);
        assert!(f.request.submitted_at().is_some());

        assert_eq!(
            f.decide(LeaveRequestCommand::Approve, requester, None).unwrap_err(),
            DomainError::Unauthorized
        );
        f.decide(LeaveRequestCommand::Approve, validator, None).unwrap();
        assert_eq!(f.request.status(), LeaveStatus::Approved);
        assert!(f.request.approved_at().is_some());
    }

    #[test]
    fn denied_request_can_be_reopened_and_edited() {
        let mut f = Fixture::new();
        let (requester, validator) = (f.requester, f.validator);
        f.submit(requester, Some(validator)).unwrap();
        f.decide(LeaveRequestCommand::Deny, validator, Some("Busy week")).unwrap();
        assert_eq!(f.request.response_comment(), Some("Busy week"));

        assert!(matches!(
            f.decide(LeaveRequestCommand::Approve, validator, None),
            Err(DomainError::InvariantViolation(_))
        ));
        f.decide(LeaveRequestCommand::Reopen, requester, None).unwrap();
        assert_eq!(f.request.status(), LeaveStatus::Draft);

        let mut shorter = period();
        shorter.date_end = date(3, 3);
        let cmd = LeaveRequestCommand::Update(UpdateLeaveRequest {
            tenant_id: f.tenant_id,
            request_id: *f.request.id(),
            acting_user: requester,
            period: shorter,
            occurred_at: Utc::now(),
        });
        execute(&mut f.request, &cmd).unwrap();
        assert_eq!(f.request.period().unwrap().working_half_days(), 3);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut p = period();
        p.date_end = date(3, 1);
        assert!(matches!(p.normalized(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn weekends_are_not_counted() {
        // Saturday 7 March to Sunday 8 March.
        assert_eq!(working_half_days(date(3, 7), date(3, 8), true, true), 0);
        // A single half day.
        assert_eq!(working_half_days(date(3, 9), date(3, 9), true, true), 1);
    }

    proptest! {
        #[test]
        fn half_days_never_exceed_calendar_span(offset in 0u64..365, len in 0u64..60, hs: bool, he: bool) {
            let start = date(1, 1).checked_add_days(chrono::Days::new(offset)).unwrap();
            let end = start.checked_add_days(chrono::Days::new(len)).unwrap();
            let halves = working_half_days(start, end, hs, he);
            prop_assert!(u64::from(halves) <= (len + 1) * 2);
        }
    }
}
