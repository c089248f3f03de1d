use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

pub const THIRD_PARTY_AGGREGATE: &str = "parties.third_party";

/// Days granted to pay when none are configured.
pub const DEFAULT_PAYMENT_TERMS_DAYS: u32 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThirdPartyId(pub AggregateId);

impl ThirdPartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ThirdPartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Commercial role derived from the customer/supplier/prospect flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThirdPartyKind {
    Customer,
    Supplier,
    Both,
    Prospect,
    Other,
}

impl ThirdPartyKind {
    pub fn derive(customer: bool, supplier: bool, prospect: bool) -> Self {
        match (customer, supplier, prospect) {
            (true, true, _) => ThirdPartyKind::Both,
            (true, false, _) => ThirdPartyKind::Customer,
            (false, true, _) => ThirdPartyKind::Supplier,
            (false, false, true) => ThirdPartyKind::Prospect,
            (false, false, false) => ThirdPartyKind::Other,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Some(ThirdPartyKind::Customer),
            "supplier" => Some(ThirdPartyKind::Supplier),
            "both" => Some(ThirdPartyKind::Both),
            "prospect" => Some(ThirdPartyKind::Prospect),
            "other" => Some(ThirdPartyKind::Other),
            _ => None,
        }
    }

    /// Filter semantics: `Both` records show up under customers and suppliers.
    pub fn includes(self, wanted: ThirdPartyKind) -> bool {
        self == wanted
            || (self == ThirdPartyKind::Both
                && matches!(wanted, ThirdPartyKind::Customer | ThirdPartyKind::Supplier))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThirdPartyStatus {
    Active,
    Inactive,
}

/// Descriptive fields, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyDetails {
    #[serde(default)]
    pub legal_form: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub registration_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ThirdPartyDetails {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = self.email.as_deref() {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(DomainError::validation("email is not valid"));
            }
        }
        if let Some(country) = self.country_code.as_deref() {
            if country.trim().len() != 2 {
                return Err(DomainError::validation("country code must have 2 letters"));
            }
        }
        Ok(())
    }
}

/// Aggregate root: a customer, supplier or prospect of the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdParty {
    id: ThirdPartyId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    customer: bool,
    supplier: bool,
    prospect: bool,
    details: ThirdPartyDetails,
    payment_terms_days: u32,
    credit_limit: Option<i64>,
    status: ThirdPartyStatus,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ThirdParty {
    pub fn empty(id: ThirdPartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            customer: false,
            supplier: false,
            prospect: false,
            details: ThirdPartyDetails::default(),
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            credit_limit: None,
            status: ThirdPartyStatus::Active,
            deleted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ThirdPartyKind {
        ThirdPartyKind::derive(self.customer, self.supplier, self.prospect)
    }

    pub fn details(&self) -> &ThirdPartyDetails {
        &self.details
    }

    pub fn payment_terms_days(&self) -> u32 {
        self.payment_terms_days
    }

    pub fn credit_limit(&self) -> Option<i64> {
        self.credit_limit
    }

    pub fn status(&self) -> ThirdPartyStatus {
        self.status
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl AggregateRoot for ThirdParty {
    type Id = ThirdPartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterThirdParty {
    pub tenant_id: TenantId,
    pub third_party_id: ThirdPartyId,
    pub code: String,
    pub name: String,
    pub customer: bool,
    pub supplier: bool,
    pub prospect: bool,
    pub details: ThirdPartyDetails,
    pub payment_terms_days: Option<u32>,
    pub credit_limit: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateThirdParty {
    pub tenant_id: TenantId,
    pub third_party_id: ThirdPartyId,
    pub name: Option<String>,
    pub customer: Option<bool>,
    pub supplier: Option<bool>,
    pub prospect: Option<bool>,
    pub details: Option<ThirdPartyDetails>,
    pub payment_terms_days: Option<u32>,
    pub credit_limit: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Deactivate, activate and delete only need the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyRef {
    pub tenant_id: TenantId,
    pub third_party_id: ThirdPartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThirdPartyCommand {
    Register(RegisterThirdParty),
    Update(UpdateThirdParty),
    Deactivate(ThirdPartyRef),
    Activate(ThirdPartyRef),
    Delete(ThirdPartyRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyRegistered {
    pub tenant_id: TenantId,
    pub third_party_id: ThirdPartyId,
    pub code: String,
    pub name: String,
    pub customer: bool,
    pub supplier: bool,
    pub prospect: bool,
    pub details: ThirdPartyDetails,
    pub payment_terms_days: u32,
    pub credit_limit: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full profile after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyUpdated {
    pub tenant_id: TenantId,
    pub third_party_id: ThirdPartyId,
    pub name: String,
    pub customer: bool,
    pub supplier: bool,
    pub prospect: bool,
    pub details: ThirdPartyDetails,
    pub payment_terms_days: u32,
    pub credit_limit: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyStatusChanged {
    pub tenant_id: TenantId,
    pub third_party_id: ThirdPartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThirdPartyEvent {
    Registered(ThirdPartyRegistered),
    Updated(ThirdPartyUpdated),
    Deactivated(ThirdPartyStatusChanged),
    Activated(ThirdPartyStatusChanged),
    Deleted(ThirdPartyStatusChanged),
}

impl Event for ThirdPartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ThirdPartyEvent::Registered(_) => "parties.third_party.registered",
            ThirdPartyEvent::Updated(_) => "parties.third_party.updated",
            ThirdPartyEvent::Deactivated(_) => "parties.third_party.deactivated",
            ThirdPartyEvent::Activated(_) => "parties.third_party.activated",
            ThirdPartyEvent::Deleted(_) => "parties.third_party.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ThirdPartyEvent::Registered(e) => e.occurred_at,
            ThirdPartyEvent::Updated(e) => e.occurred_at,
            ThirdPartyEvent::Deactivated(e)
            | ThirdPartyEvent::Activated(e)
            | ThirdPartyEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ThirdParty {
    type Command = ThirdPartyCommand;
    type Event = ThirdPartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ThirdPartyEvent::Registered(e) => {
                self.id = e.third_party_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.customer = e.customer;
                self.supplier = e.supplier;
                self.prospect = e.prospect;
                self.details = e.details.clone();
                self.payment_terms_days = e.payment_terms_days;
                self.credit_limit = e.credit_limit;
                self.status = ThirdPartyStatus::Active;
                self.created = true;
            }
            ThirdPartyEvent::Updated(e) => {
                self.name = e.name.clone();
                self.customer = e.customer;
                self.supplier = e.supplier;
                self.prospect = e.prospect;
                self.details = e.details.clone();
                self.payment_terms_days = e.payment_terms_days;
                self.credit_limit = e.credit_limit;
            }
            ThirdPartyEvent::Deactivated(_) => self.status = ThirdPartyStatus::Inactive,
            ThirdPartyEvent::Activated(_) => self.status = ThirdPartyStatus::Active,
            ThirdPartyEvent::Deleted(e) => {
                self.status = ThirdPartyStatus::Inactive;
                self.deleted_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ThirdPartyCommand::Register(cmd) => self.handle_register(cmd),
            ThirdPartyCommand::Update(cmd) => self.handle_update(cmd),
            ThirdPartyCommand::Deactivate(cmd) => {
                self.ensure_live(cmd)?;
                if self.status == ThirdPartyStatus::Inactive {
                    return Err(DomainError::conflict("third party is already inactive"));
                }
                Ok(vec![ThirdPartyEvent::Deactivated(status_changed(cmd))])
            }
            ThirdPartyCommand::Activate(cmd) => {
                self.ensure_live(cmd)?;
                if self.status == ThirdPartyStatus::Active {
                    return Err(DomainError::conflict("third party is already active"));
                }
                Ok(vec![ThirdPartyEvent::Activated(status_changed(cmd))])
            }
            ThirdPartyCommand::Delete(cmd) => {
                self.ensure_live(cmd)?;
                Ok(vec![ThirdPartyEvent::Deleted(status_changed(cmd))])
            }
        }
    }
}

fn status_changed(cmd: &ThirdPartyRef) -> ThirdPartyStatusChanged {
    ThirdPartyStatusChanged {
        tenant_id: cmd.tenant_id,
        third_party_id: cmd.third_party_id,
        occurred_at: cmd.occurred_at,
    }
}

fn validate_terms(payment_terms_days: u32, credit_limit: Option<i64>) -> Result<(), DomainError> {
    if payment_terms_days > 365 {
        return Err(DomainError::validation("payment terms cannot exceed 365 days"));
    }
    if credit_limit.is_some_and(|l| l < 0) {
        return Err(DomainError::validation("credit limit cannot be negative"));
    }
    Ok(())
}

impl ThirdParty {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_third_party_id(&self, id: ThirdPartyId) -> Result<(), DomainError> {
        if self.id != id {
            return Err(DomainError::invariant("third_party_id mismatch"));
        }
        Ok(())
    }

    /// Created, same tenant, same id, not deleted.
    fn ensure_writable(&self, tenant_id: TenantId, id: ThirdPartyId) -> Result<(), DomainError> {
        if !self.created || self.is_deleted() {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_third_party_id(id)
    }

    fn ensure_live(&self, cmd: &ThirdPartyRef) -> Result<(), DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.third_party_id)
    }

    fn handle_register(&self, cmd: &RegisterThirdParty) -> Result<Vec<ThirdPartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("third party already exists"));
        }
        let code = normalize_code(&cmd.code, "code")?;
        let name = required_text(&cmd.name, "name")?;
        cmd.details.validate()?;
        let payment_terms_days = cmd.payment_terms_days.unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS);
        validate_terms(payment_terms_days, cmd.credit_limit)?;

        Ok(vec![ThirdPartyEvent::Registered(ThirdPartyRegistered {
            tenant_id: cmd.tenant_id,
            third_party_id: cmd.third_party_id,
            code,
            name,
            customer: cmd.customer,
            supplier: cmd.supplier,
            prospect: cmd.prospect,
            details: cmd.details.clone(),
            payment_terms_days,
            credit_limit: cmd.credit_limit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateThirdParty) -> Result<Vec<ThirdPartyEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.third_party_id)?;

        let name = match cmd.name.as_deref() {
            Some(n) => required_text(n, "name")?,
            None => self.name.clone(),
        };
        let details = cmd.details.clone().unwrap_or_else(|| self.details.clone());
        details.validate()?;
        let payment_terms_days = cmd.payment_terms_days.unwrap_or(self.payment_terms_days);
        let credit_limit = cmd.credit_limit.or(self.credit_limit);
        validate_terms(payment_terms_days, credit_limit)?;

        Ok(vec![ThirdPartyEvent::Updated(ThirdPartyUpdated {
            tenant_id: cmd.tenant_id,
            third_party_id: cmd.third_party_id,
            name,
            customer: cmd.customer.unwrap_or(self.customer),
            supplier: cmd.supplier.unwrap_or(self.supplier),
            prospect: cmd.prospect.unwrap_or(self.prospect),
            details,
            payment_terms_days,
            credit_limit,
            occurred_at: cmd.occurred_at,
        })])
    }
}
