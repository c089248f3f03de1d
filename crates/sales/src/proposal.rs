use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;
use atelier_parties::ThirdPartyId;

use crate::document::{DocumentLine, DocumentTotals, LineInput, next_line_no};

pub const PROPOSAL_AGGREGATE: &str = "sales.proposal";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub AggregateId);

impl ProposalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Accepted,
    Refused,
    Cancelled,
    Converted,
}

impl ProposalStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "accepted" => Some(Self::Accepted),
            "refused" => Some(Self::Refused),
            "cancelled" => Some(Self::Cancelled),
            "converted" => Some(Self::Converted),
            _ => None,
        }
    }
}

/// Aggregate root: a commercial proposal (quote) sent to a third party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    id: ProposalId,
    tenant_id: Option<TenantId>,
    reference: String,
    third_party_id: Option<ThirdPartyId>,
    issue_date: Option<NaiveDate>,
    valid_until: Option<NaiveDate>,
    currency: String,
    notes: Option<String>,
    lines: Vec<DocumentLine>,
    totals: DocumentTotals,
    status: ProposalStatus,
    order_id: Option<AggregateId>,
    version: u64,
    created: bool,
}

/// What an order needs to know about the proposal it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSnapshot {
    pub proposal_id: ProposalId,
    pub third_party_id: ThirdPartyId,
    pub status: ProposalStatus,
    pub currency: String,
    pub lines: Vec<DocumentLine>,
    pub discount_amount: i64,
}

impl Proposal {
    pub fn empty(id: ProposalId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            third_party_id: None,
            issue_date: None,
            valid_until: None,
            currency: String::new(),
            notes: None,
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            status: ProposalStatus::Draft,
            order_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn third_party_id(&self) -> Option<ThirdPartyId> {
        self.third_party_id
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn valid_until(&self) -> Option<NaiveDate> {
        self.valid_until
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn snapshot(&self) -> Option<ProposalSnapshot> {
        Some(ProposalSnapshot {
            proposal_id: self.id,
            third_party_id: self.third_party_id?,
            status: self.status,
            currency: self.currency.clone(),
            lines: self.lines.clone(),
            discount_amount: self.totals.discount_amount,
        })
    }
}

impl AggregateRoot for Proposal {
    type Id = ProposalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProposal {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub issue_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub currency: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddProposalLine {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub line: LineInput,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveProposalLine {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProposalDiscount {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub discount_amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProposalHeader {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub issue_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Send, accept, refuse and cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTransition {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkProposalConverted {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Historical proposal brought in from another system, in any status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProposal {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub issue_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub currency: String,
    pub status: ProposalStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalCommand {
    Create(CreateProposal),
    AddLine(AddProposalLine),
    RemoveLine(RemoveProposalLine),
    SetDiscount(SetProposalDiscount),
    UpdateHeader(UpdateProposalHeader),
    Send(ProposalTransition),
    Accept(ProposalTransition),
    Refuse(ProposalTransition),
    Cancel(ProposalTransition),
    MarkConverted(MarkProposalConverted),
    Import(ImportProposal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCreated {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub issue_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub currency: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Lines changed; carries the full line set and recomputed totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalLinesChanged {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalHeaderUpdated {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub issue_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Status change with enough context for automation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStatusChanged {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub status: ProposalStatus,
    pub third_party_id: ThirdPartyId,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalConverted {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalImported {
    pub tenant_id: TenantId,
    pub proposal_id: ProposalId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub issue_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub currency: String,
    pub status: ProposalStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalEvent {
    Created(ProposalCreated),
    LinesChanged(ProposalLinesChanged),
    HeaderUpdated(ProposalHeaderUpdated),
    Sent(ProposalStatusChanged),
    Accepted(ProposalStatusChanged),
    Refused(ProposalStatusChanged),
    Cancelled(ProposalStatusChanged),
    Converted(ProposalConverted),
    Imported(ProposalImported),
}

impl Event for ProposalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProposalEvent::Created(_) => "sales.proposal.created",
            ProposalEvent::LinesChanged(_) => "sales.proposal.lines_changed",
            ProposalEvent::HeaderUpdated(_) => "sales.proposal.header_updated",
            ProposalEvent::Sent(_) => "sales.proposal.sent",
            ProposalEvent::Accepted(_) => "sales.proposal.accepted",
            ProposalEvent::Refused(_) => "sales.proposal.refused",
            ProposalEvent::Cancelled(_) => "sales.proposal.cancelled",
            ProposalEvent::Converted(_) => "sales.proposal.converted",
            ProposalEvent::Imported(_) => "sales.proposal.imported",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProposalEvent::Created(e) => e.occurred_at,
            ProposalEvent::LinesChanged(e) => e.occurred_at,
            ProposalEvent::HeaderUpdated(e) => e.occurred_at,
            ProposalEvent::Sent(e)
            | ProposalEvent::Accepted(e)
            | ProposalEvent::Refused(e)
            | ProposalEvent::Cancelled(e) => e.occurred_at,
            ProposalEvent::Converted(e) => e.occurred_at,
            ProposalEvent::Imported(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Proposal {
    type Command = ProposalCommand;
    type Event = ProposalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProposalEvent::Created(e) => {
                self.id = e.proposal_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.third_party_id = Some(e.third_party_id);
                self.issue_date = Some(e.issue_date);
                self.valid_until = e.valid_until;
                self.currency = e.currency.clone();
                self.notes = e.notes.clone();
                self.status = ProposalStatus::Draft;
                self.created = true;
            }
            ProposalEvent::LinesChanged(e) => {
                self.lines = e.lines.clone();
                self.totals = e.totals;
            }
            ProposalEvent::HeaderUpdated(e) => {
                self.issue_date = Some(e.issue_date);
                self.valid_until = e.valid_until;
                self.notes = e.notes.clone();
            }
            ProposalEvent::Sent(e)
            | ProposalEvent::Accepted(e)
            | ProposalEvent::Refused(e)
            | ProposalEvent::Cancelled(e) => self.status = e.status,
            ProposalEvent::Converted(e) => {
                self.status = ProposalStatus::Converted;
                self.order_id = Some(e.order_id);
            }
            ProposalEvent::Imported(e) => {
                self.id = e.proposal_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.third_party_id = Some(e.third_party_id);
                self.issue_date = Some(e.issue_date);
                self.valid_until = e.valid_until;
                self.currency = e.currency.clone();
                self.status = e.status;
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProposalCommand::Create(cmd) => self.handle_create(cmd),
            ProposalCommand::AddLine(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.proposal_id)?;
                let mut lines = self.lines.clone();
                lines.push(DocumentLine::price(next_line_no(&lines), &cmd.line)?);
                self.lines_changed(cmd.tenant_id, lines, self.totals.discount_amount, cmd.occurred_at)
            }
            ProposalCommand::RemoveLine(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.proposal_id)?;
                if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
                    return Err(DomainError::not_found());
                }
                let lines: Vec<_> = self.lines.iter().filter(|l| l.line_no != cmd.line_no).cloned().collect();
                // Removing lines may push the discount above the new subtotal.
                let subtotal: i64 = lines.iter().map(|l| l.total).sum();
                let discount = self.totals.discount_amount.min(subtotal);
                self.lines_changed(cmd.tenant_id, lines, discount, cmd.occurred_at)
            }
            ProposalCommand::SetDiscount(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.proposal_id)?;
                self.lines_changed(cmd.tenant_id, self.lines.clone(), cmd.discount_amount, cmd.occurred_at)
            }
            ProposalCommand::UpdateHeader(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.proposal_id)?;
                let issue_date = cmd.issue_date.or(self.issue_date).ok_or_else(DomainError::not_found)?;
                let valid_until = cmd.valid_until.or(self.valid_until);
                check_validity(issue_date, valid_until)?;
                Ok(vec![ProposalEvent::HeaderUpdated(ProposalHeaderUpdated {
                    tenant_id: cmd.tenant_id,
                    proposal_id: cmd.proposal_id,
                    issue_date,
                    valid_until,
                    notes: match cmd.notes.as_deref() {
                        Some(n) => optional_text(Some(n)),
                        None => self.notes.clone(),
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProposalCommand::Send(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.proposal_id)?;
                if self.lines.is_empty() {
                    return Err(DomainError::invariant("cannot send a proposal without lines"));
                }
                Ok(vec![ProposalEvent::Sent(self.status_changed(cmd, ProposalStatus::Sent)?)])
            }
            ProposalCommand::Accept(cmd) => {
                self.ensure_status(cmd, ProposalStatus::Sent, "only sent proposals can be accepted")?;
                Ok(vec![ProposalEvent::Accepted(self.status_changed(cmd, ProposalStatus::Accepted)?)])
            }
            ProposalCommand::Refuse(cmd) => {
                self.ensure_status(cmd, ProposalStatus::Sent, "only sent proposals can be refused")?;
                Ok(vec![ProposalEvent::Refused(self.status_changed(cmd, ProposalStatus::Refused)?)])
            }
            ProposalCommand::Cancel(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.proposal_id)?;
                match self.status {
                    ProposalStatus::Converted => {
                        return Err(DomainError::invariant("converted proposals cannot be cancelled"));
                    }
                    ProposalStatus::Cancelled => {
                        return Err(DomainError::conflict("proposal is already cancelled"));
                    }
                    _ => {}
                }
                Ok(vec![ProposalEvent::Cancelled(self.status_changed(cmd, ProposalStatus::Cancelled)?)])
            }
            ProposalCommand::MarkConverted(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.proposal_id)?;
                if self.status != ProposalStatus::Accepted {
                    return Err(DomainError::invariant("only accepted proposals can be converted"));
                }
                Ok(vec![ProposalEvent::Converted(ProposalConverted {
                    tenant_id: cmd.tenant_id,
                    proposal_id: cmd.proposal_id,
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProposalCommand::Import(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("proposal already exists"));
                }
                Ok(vec![ProposalEvent::Imported(ProposalImported {
                    tenant_id: cmd.tenant_id,
                    proposal_id: cmd.proposal_id,
                    reference: required_text(&cmd.reference, "reference")?,
                    third_party_id: cmd.third_party_id,
                    issue_date: cmd.issue_date,
                    valid_until: cmd.valid_until,
                    currency: cmd.currency.clone(),
                    status: cmd.status,
                    lines: cmd.lines.clone(),
                    totals: cmd.totals,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

fn check_validity(issue_date: NaiveDate, valid_until: Option<NaiveDate>) -> Result<(), DomainError> {
    if valid_until.is_some_and(|v| v < issue_date) {
        return Err(DomainError::validation("valid_until cannot precede the issue date"));
    }
    Ok(())
}

impl Proposal {
    fn ensure_existing(&self, tenant_id: TenantId, proposal_id: ProposalId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != proposal_id {
            return Err(DomainError::invariant("proposal_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, tenant_id: TenantId, proposal_id: ProposalId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, proposal_id)?;
        if self.status != ProposalStatus::Draft {
            return Err(DomainError::invariant("only draft proposals can be modified"));
        }
        Ok(())
    }

    fn ensure_status(
        &self,
        cmd: &ProposalTransition,
        expected: ProposalStatus,
        msg: &str,
    ) -> Result<(), DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.proposal_id)?;
        if self.status != expected {
            return Err(DomainError::invariant(msg));
        }
        Ok(())
    }

    fn status_changed(
        &self,
        cmd: &ProposalTransition,
        status: ProposalStatus,
    ) -> Result<ProposalStatusChanged, DomainError> {
        Ok(ProposalStatusChanged {
            tenant_id: cmd.tenant_id,
            proposal_id: cmd.proposal_id,
            status,
            third_party_id: self.third_party_id.ok_or_else(DomainError::not_found)?,
            total: self.totals.total,
            occurred_at: cmd.occurred_at,
        })
    }

    fn lines_changed(
        &self,
        tenant_id: TenantId,
        lines: Vec<DocumentLine>,
        discount_amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<ProposalEvent>, DomainError> {
        let totals = DocumentTotals::compute(&lines, discount_amount)?;
        Ok(vec![ProposalEvent::LinesChanged(ProposalLinesChanged {
            tenant_id,
            proposal_id: self.id,
            lines,
            totals,
            occurred_at,
        })])
    }

    fn handle_create(&self, cmd: &CreateProposal) -> Result<Vec<ProposalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("proposal already exists"));
        }
        check_validity(cmd.issue_date, cmd.valid_until)?;
        let currency = cmd.currency.trim().to_uppercase();
        if currency.len() != 3 {
            return Err(DomainError::validation("currency must be a 3-letter ISO code"));
        }
        Ok(vec![ProposalEvent::Created(ProposalCreated {
            tenant_id: cmd.tenant_id,
            proposal_id: cmd.proposal_id,
            reference: required_text(&cmd.reference, "reference")?,
            third_party_id: cmd.third_party_id,
            issue_date: cmd.issue_date,
            valid_until: cmd.valid_until,
            currency,
            notes: optional_text(cmd.notes.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }
}
