use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::required_text;
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;
use atelier_parties::ThirdPartyId;

use crate::document::{DocumentLine, DocumentTotals, LineInput, price_lines};
use crate::proposal::{ProposalId, ProposalSnapshot, ProposalStatus};

pub const SALES_ORDER_AGGREGATE: &str = "sales.order";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub AggregateId);

impl SalesOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "confirmed" => Some(Self::Confirmed),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Aggregate root: a confirmed customer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    reference: String,
    third_party_id: Option<ThirdPartyId>,
    proposal_id: Option<ProposalId>,
    order_date: Option<NaiveDate>,
    expected_delivery: Option<NaiveDate>,
    currency: String,
    lines: Vec<DocumentLine>,
    totals: DocumentTotals,
    status: OrderStatus,
    version: u64,
    created: bool,
}

impl SalesOrder {
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            third_party_id: None,
            proposal_id: None,
            order_date: None,
            expected_delivery: None,
            currency: String::new(),
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            status: OrderStatus::Confirmed,
            version: 0,
            created: false,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn proposal_id(&self) -> Option<ProposalId> {
        self.proposal_id
    }

    pub fn third_party_id(&self) -> Option<ThirdPartyId> {
        self.third_party_id
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn expected_delivery(&self) -> Option<NaiveDate> {
        self.expected_delivery
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub currency: String,
    pub lines: Vec<LineInput>,
    pub discount_amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderFromProposal {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reference: String,
    pub proposal: ProposalSnapshot,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub currency: String,
    pub status: OrderStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    Create(CreateSalesOrder),
    CreateFromProposal(CreateOrderFromProposal),
    StartProcessing(OrderTransition),
    Ship(OrderTransition),
    Deliver(OrderTransition),
    Cancel(OrderTransition),
    Import(ImportSalesOrder),
}

/// Emitted for direct creation, proposal conversion and import alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub proposal_id: Option<ProposalId>,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub currency: String,
    pub status: OrderStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderStatusChanged {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub status: OrderStatus,
    pub third_party_id: ThirdPartyId,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    Created(SalesOrderCreated),
    Imported(SalesOrderCreated),
    Processing(SalesOrderStatusChanged),
    Shipped(SalesOrderStatusChanged),
    Delivered(SalesOrderStatusChanged),
    Cancelled(SalesOrderStatusChanged),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::Created(_) => "sales.order.created",
            SalesOrderEvent::Imported(_) => "sales.order.imported",
            SalesOrderEvent::Processing(_) => "sales.order.processing",
            SalesOrderEvent::Shipped(_) => "sales.order.shipped",
            SalesOrderEvent::Delivered(_) => "sales.order.delivered",
            SalesOrderEvent::Cancelled(_) => "sales.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::Created(e) | SalesOrderEvent::Imported(e) => e.occurred_at,
            SalesOrderEvent::Processing(e)
            | SalesOrderEvent::Shipped(e)
            | SalesOrderEvent::Delivered(e)
            | SalesOrderEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::Created(e) | SalesOrderEvent::Imported(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.third_party_id = Some(e.third_party_id);
                self.proposal_id = e.proposal_id;
                self.order_date = Some(e.order_date);
                self.expected_delivery = e.expected_delivery;
                self.currency = e.currency.clone();
                self.status = e.status;
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.created = true;
            }
            SalesOrderEvent::Processing(e)
            | SalesOrderEvent::Shipped(e)
            | SalesOrderEvent::Delivered(e)
            | SalesOrderEvent::Cancelled(e) => self.status = e.status,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::Create(cmd) => {
                self.ensure_new()?;
                check_delivery(cmd.order_date, cmd.expected_delivery)?;
                let lines = price_lines(&cmd.lines)?;
                let totals = DocumentTotals::compute(&lines, cmd.discount_amount)?;
                Ok(vec![SalesOrderEvent::Created(SalesOrderCreated {
                    tenant_id: cmd.tenant_id,
                    order_id: cmd.order_id,
                    reference: required_text(&cmd.reference, "reference")?,
                    third_party_id: cmd.third_party_id,
                    proposal_id: None,
                    order_date: cmd.order_date,
                    expected_delivery: cmd.expected_delivery,
                    currency: normalize_currency(&cmd.currency)?,
                    status: OrderStatus::Confirmed,
                    lines,
                    totals,
                    occurred_at: cmd.occurred_at,
                })])
            }
            SalesOrderCommand::CreateFromProposal(cmd) => {
                self.ensure_new()?;
                let proposal = &cmd.proposal;
                if proposal.status != ProposalStatus::Accepted {
                    return Err(DomainError::invariant("only accepted proposals can be converted to orders"));
                }
                check_delivery(cmd.order_date, cmd.expected_delivery)?;
                let totals = DocumentTotals::compute(&proposal.lines, proposal.discount_amount)?;
                Ok(vec![SalesOrderEvent::Created(SalesOrderCreated {
                    tenant_id: cmd.tenant_id,
                    order_id: cmd.order_id,
                    reference: required_text(&cmd.reference, "reference")?,
                    third_party_id: proposal.third_party_id,
                    proposal_id: Some(proposal.proposal_id),
                    order_date: cmd.order_date,
                    expected_delivery: cmd.expected_delivery,
                    currency: proposal.currency.clone(),
                    status: OrderStatus::Confirmed,
                    lines: proposal.lines.clone(),
                    totals,
                    occurred_at: cmd.occurred_at,
                })])
            }
            SalesOrderCommand::StartProcessing(cmd) => {
                self.transition(cmd, &[OrderStatus::Confirmed], OrderStatus::Processing)
                    .map(|e| vec![SalesOrderEvent::Processing(e)])
            }
            SalesOrderCommand::Ship(cmd) => self
                .transition(cmd, &[OrderStatus::Processing], OrderStatus::Shipped)
                .map(|e| vec![SalesOrderEvent::Shipped(e)]),
            SalesOrderCommand::Deliver(cmd) => self
                .transition(cmd, &[OrderStatus::Shipped], OrderStatus::Delivered)
                .map(|e| vec![SalesOrderEvent::Delivered(e)]),
            SalesOrderCommand::Cancel(cmd) => self
                .transition(
                    cmd,
                    &[OrderStatus::Confirmed, OrderStatus::Processing],
                    OrderStatus::Cancelled,
                )
                .map(|e| vec![SalesOrderEvent::Cancelled(e)]),
            SalesOrderCommand::Import(cmd) => {
                self.ensure_new()?;
                Ok(vec![SalesOrderEvent::Imported(SalesOrderCreated {
                    tenant_id: cmd.tenant_id,
                    order_id: cmd.order_id,
                    reference: required_text(&cmd.reference, "reference")?,
                    third_party_id: cmd.third_party_id,
                    proposal_id: None,
                    order_date: cmd.order_date,
                    expected_delivery: cmd.expected_delivery,
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

fn normalize_currency(value: &str) -> Result<String, DomainError> {
    let currency = value.trim().to_uppercase();
    if currency.len() != 3 {
        return Err(DomainError::validation("currency must be a 3-letter ISO code"));
    }
    Ok(currency)
}

fn check_delivery(order_date: NaiveDate, expected: Option<NaiveDate>) -> Result<(), DomainError> {
    if expected.is_some_and(|d| d < order_date) {
        return Err(DomainError::validation("expected delivery cannot precede the order date"));
    }
    Ok(())
}

impl SalesOrder {
    fn ensure_new(&self) -> Result<(), DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        Ok(())
    }

    fn transition(
        &self,
        cmd: &OrderTransition,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<SalesOrderStatusChanged, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != cmd.order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        if !from.contains(&self.status) {
            return Err(DomainError::invariant(format!(
                "cannot move order from {:?} to {:?}",
                self.status, to
            )));
        }
        Ok(SalesOrderStatusChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            status: to,
            third_party_id: self.third_party_id.ok_or_else(DomainError::not_found)?,
            total: self.totals.total,
            occurred_at: cmd.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
    }

    fn line(price: i64) -> LineInput {
        LineInput {
            product_id: None,
            description: "Catering".to_string(),
            quantity_milli: 2_000,
            unit_price: price,
            discount_bps: 0,
            vat_rate_bps: 1_000,
        }
    }

    fn snapshot(status: ProposalStatus) -> ProposalSnapshot {
        ProposalSnapshot {
            proposal_id: ProposalId::new(AggregateId::new()),
            third_party_id: ThirdPartyId::new(AggregateId::new()),
            status,
            currency: "EUR".to_string(),
            lines: price_lines(&[line(5_000)]).unwrap(),
            discount_amount: 1_000,
        }
    }

    fn from_proposal(status: ProposalStatus) -> (SalesOrder, TenantId, Result<Vec<SalesOrderEvent>, DomainError>) {
        let tenant_id = test_tenant_id();
        let id = SalesOrderId::new(AggregateId::new());
        let mut order = SalesOrder::empty(id);
        let res = execute(
            &mut order,
            &SalesOrderCommand::CreateFromProposal(CreateOrderFromProposal {
                tenant_id,
                order_id: id,
                reference: "ORD-00001".to_string(),
                proposal: snapshot(status),
                order_date: date(),
                expected_delivery: None,
                occurred_at: test_time(),
            }),
        );
        (order, tenant_id, res)
    }

    fn step(order: &mut SalesOrder, tenant_id: TenantId, make: fn(OrderTransition) -> SalesOrderCommand) -> Result<Vec<SalesOrderEvent>, DomainError> {
        let cmd = make(OrderTransition {
            tenant_id,
            order_id: *order.id(),
            occurred_at: test_time(),
        });
        execute(order, &cmd)
    }

    #[test]
    fn accepted_proposal_becomes_confirmed_order() {
        let (order, _, res) = from_proposal(ProposalStatus::Accepted);
        res.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert!(order.proposal_id().is_some());
        // 2 x 50.00 = 100.00, minus 10.00, VAT 10% on lines = 10.00
        assert_eq!(order.totals().total, 10_000 - 1_000 + 1_000);
    }

    #[test]
    fn sent_proposal_cannot_be_converted() {
        let (_, _, res) = from_proposal(ProposalStatus::Sent);
        match res {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("accepted") => {}
            other => panic!("Expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn order_moves_through_fulfilment() {
        let (mut order, tenant_id, res) = from_proposal(ProposalStatus::Accepted);
        res.unwrap();
        step(&mut order, tenant_id, SalesOrderCommand::StartProcessing).unwrap();
        step(&mut order, tenant_id, SalesOrderCommand::Ship).unwrap();
        assert!(matches!(
            step(&mut order, tenant_id, SalesOrderCommand::Cancel),
            Err(DomainError::InvariantViolation(_))
        ));
        step(&mut order, tenant_id, SalesOrderCommand::Deliver).unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.version(), 4);
    }

    #[test]
    fn direct_order_prices_lines() {
        let tenant_id = test_tenant_id();
        let id = SalesOrderId::new(AggregateId::new());
        let mut order = SalesOrder::empty(id);
        execute(
            &mut order,
            &SalesOrderCommand::Create(CreateSalesOrder {
                tenant_id,
                order_id: id,
                reference: "ORD-00002".to_string(),
                third_party_id: ThirdPartyId::new(AggregateId::new()),
                order_date: date(),
                expected_delivery: date().succ_opt(),
                currency: "usd".to_string(),
                lines: vec![line(250)],
                discount_amount: 0,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.lines()[0].total, 500);
        assert_eq!(order.totals().total, 550);

        step(&mut order, tenant_id, SalesOrderCommand::Cancel).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn other_tenant_cannot_transition() {
        let (mut order, _, res) = from_proposal(ProposalStatus::Accepted);
        res.unwrap();
        let err = step(&mut order, test_tenant_id(), SalesOrderCommand::StartProcessing).unwrap_err();
        assert_eq!(err, DomainError::invariant("tenant mismatch"));
    }
}
