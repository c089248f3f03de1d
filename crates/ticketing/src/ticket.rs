use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use atelier_events::Event;
use atelier_parties::ThirdPartyId;

pub const TICKET_AGGREGATE: &str = "ticketing.ticket";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub AggregateId);

impl TicketId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TicketId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Forward moves one step at a time; resolved and closed tickets may reopen.
    pub fn can_move_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (InProgress, Resolved) | (Resolved, Closed) | (Resolved, Open) | (Closed, Open)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketComment {
    pub comment_id: AggregateId,
    pub author: UserId,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Aggregate root: a support ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    id: TicketId,
    tenant_id: Option<TenantId>,
    reference: String,
    subject: String,
    description: Option<String>,
    status: TicketStatus,
    priority: TicketPriority,
    requester: Option<UserId>,
    assignee: Option<UserId>,
    third_party_id: Option<ThirdPartyId>,
    comments: Vec<TicketComment>,
    version: u64,
    created: bool,
}

impl Ticket {
    pub fn empty(id: TicketId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            subject: String::new(),
            description: None,
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            requester: None,
            assignee: None,
            third_party_id: None,
            comments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> TicketStatus {
        self.status
    }

    pub fn priority(&self) -> TicketPriority {
        self.priority
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub fn assignee(&self) -> Option<UserId> {
        self.assignee
    }

    pub fn third_party_id(&self) -> Option<ThirdPartyId> {
        self.third_party_id
    }

    pub fn comments(&self) -> &[TicketComment] {
        &self.comments
    }
}

impl AggregateRoot for Ticket {
    type Id = TicketId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTicket {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub reference: String,
    pub subject: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TicketPriority,
    pub requester: UserId,
    pub third_party_id: Option<ThirdPartyId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignTicket {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    /// `None` unassigns.
    pub assignee: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTicketStatus {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub status: TicketStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTicketPriority {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub priority: TicketPriority,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTicketComment {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub comment_id: AggregateId,
    pub author: UserId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketCommand {
    Open(OpenTicket),
    Assign(AssignTicket),
    ChangeStatus(ChangeTicketStatus),
    ChangePriority(ChangeTicketPriority),
    AddComment(AddTicketComment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketOpened {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub reference: String,
    pub subject: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
    pub requester: UserId,
    pub third_party_id: Option<ThirdPartyId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAssigned {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub assignee: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStatusChanged {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub from: TicketStatus,
    pub status: TicketStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPriorityChanged {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub priority: TicketPriority,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCommented {
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub comment: TicketComment,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketEvent {
    Opened(TicketOpened),
    Assigned(TicketAssigned),
    StatusChanged(TicketStatusChanged),
    PriorityChanged(TicketPriorityChanged),
    Commented(TicketCommented),
}

impl Event for TicketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TicketEvent::Opened(_) => "ticketing.ticket.opened",
            TicketEvent::Assigned(_) => "ticketing.ticket.assigned",
            TicketEvent::StatusChanged(_) => "ticketing.ticket.status_changed",
            TicketEvent::PriorityChanged(_) => "ticketing.ticket.priority_changed",
            TicketEvent::Commented(_) => "ticketing.ticket.commented",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TicketEvent::Opened(e) => e.occurred_at,
            TicketEvent::Assigned(e) => e.occurred_at,
            TicketEvent::StatusChanged(e) => e.occurred_at,
            TicketEvent::PriorityChanged(e) => e.occurred_at,
            TicketEvent::Commented(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ticket {
    type Command = TicketCommand;
    type Event = TicketEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TicketEvent::Opened(e) => {
                self.id = e.ticket_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.subject = e.subject.clone();
                self.description = e.description.clone();
                self.priority = e.priority;
                self.requester = Some(e.requester);
                self.third_party_id = e.third_party_id;
                self.status = TicketStatus::Open;
                self.created = true;
            }
            TicketEvent::Assigned(e) => self.assignee = e.assignee,
            TicketEvent::StatusChanged(e) => self.status = e.status,
            TicketEvent::PriorityChanged(e) => self.priority = e.priority,
            TicketEvent::Commented(e) => self.comments.push(e.comment.clone()),
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TicketCommand::Open(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("ticket already exists"));
                }
                Ok(vec![TicketEvent::Opened(TicketOpened {
                    tenant_id: cmd.tenant_id,
                    ticket_id: cmd.ticket_id,
                    reference: required_text(&cmd.reference, "reference")?,
                    subject: required_text(&cmd.subject, "subject")?,
                    description: optional_text(cmd.description.as_deref()),
                    priority: cmd.priority,
                    requester: cmd.requester,
                    third_party_id: cmd.third_party_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TicketCommand::Assign(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.ticket_id)?;
                Ok(vec![TicketEvent::Assigned(TicketAssigned {
                    tenant_id: cmd.tenant_id,
                    ticket_id: cmd.ticket_id,
                    assignee: cmd.assignee,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TicketCommand::ChangeStatus(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.ticket_id)?;
                if !self.status.can_move_to(cmd.status) {
                    return Err(DomainError::invariant(format!(
                        "cannot move ticket from {:?} to {:?}",
                        self.status, cmd.status
                    )));
                }
                Ok(vec![TicketEvent::StatusChanged(TicketStatusChanged {
                    tenant_id: cmd.tenant_id,
                    ticket_id: cmd.ticket_id,
                    from: self.status,
                    status: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TicketCommand::ChangePriority(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.ticket_id)?;
                Ok(vec![TicketEvent::PriorityChanged(TicketPriorityChanged {
                    tenant_id: cmd.tenant_id,
                    ticket_id: cmd.ticket_id,
                    priority: cmd.priority,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TicketCommand::AddComment(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.ticket_id)?;
                if self.status == TicketStatus::Closed {
                    return Err(DomainError::invariant("closed tickets cannot be commented"));
                }
                Ok(vec![TicketEvent::Commented(TicketCommented {
                    tenant_id: cmd.tenant_id,
                    ticket_id: cmd.ticket_id,
                    comment: TicketComment {
                        comment_id: cmd.comment_id,
                        author: cmd.author,
                        content: required_text(&cmd.content, "content")?,
                        at: cmd.occurred_at,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Ticket {
    fn ensure_existing(&self, tenant_id: TenantId, ticket_id: TicketId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != ticket_id {
            return Err(DomainError::invariant("ticket_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    fn opened() -> (Ticket, TenantId) {
        let tenant_id = TenantId::new();
        let id = TicketId::new(AggregateId::new());
        let mut t = Ticket::empty(id);
        execute(
            &mut t,
            &TicketCommand::Open(OpenTicket {
                tenant_id,
                ticket_id: id,
                reference: "TCK-00001".to_string(),
                subject: " Printer jammed ".to_string(),
                description: None,
                priority: TicketPriority::default(),
                requester: UserId::new(),
                third_party_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (t, tenant_id)
    }

    fn move_to(t: &mut Ticket, tenant_id: TenantId, status: TicketStatus) -> Result<Vec<TicketEvent>, DomainError> {
        let cmd = TicketCommand::ChangeStatus(ChangeTicketStatus {
            tenant_id,
            ticket_id: *t.id(),
            status,
            occurred_at: Utc::now(),
        });
        execute(t, &cmd)
    }

    fn comment(t: &Ticket, tenant_id: TenantId, content: &str) -> TicketCommand {
        TicketCommand::AddComment(AddTicketComment {
            tenant_id,
            ticket_id: *t.id(),
            comment_id: AggregateId::new(),
            author: UserId::new(),
            content: content.to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn open_defaults() {
        let (t, _) = opened();
        assert_eq!(t.subject(), "Printer jammed");
        assert_eq!(t.priority(), TicketPriority::Medium);
        assert_eq!(t.status(), TicketStatus::Open);
    }

    #[test]
    fn status_follows_transition_table() {
        let (mut t, tenant_id) = opened();
        assert!(matches!(
            move_to(&mut t, tenant_id, TicketStatus::Closed),
            Err(DomainError::InvariantViolation(_))
        ));
        move_to(&mut t, tenant_id, TicketStatus::InProgress).unwrap();
        move_to(&mut t, tenant_id, TicketStatus::Resolved).unwrap();
        move_to(&mut t, tenant_id, TicketStatus::Closed).unwrap();
        move_to(&mut t, tenant_id, TicketStatus::Open).unwrap();
        assert_eq!(t.status(), TicketStatus::Open);
    }

    #[test]
    fn comments_are_refused_once_closed() {
        let (mut t, tenant_id) = opened();
        let c = comment(&t, tenant_id, "Tried turning it off and on");
        execute(&mut t, &c).unwrap();
        assert_eq!(t.comments().len(), 1);
        assert!(t.handle(&comment(&t, tenant_id, "  ")).is_err());

        for s in [TicketStatus::InProgress, TicketStatus::Resolved, TicketStatus::Closed] {
            move_to(&mut t, tenant_id, s).unwrap();
        }
        assert!(matches!(
            t.handle(&comment(&t, tenant_id, "late")),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
