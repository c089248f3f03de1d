use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, optional_text, required_text};
use atelier_core::money::FULL_RATE_BPS;
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

use crate::category::CategoryId;

pub const PRODUCT_AGGREGATE: &str = "catalog.product";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    #[default]
    Product,
    Service,
    Consumable,
}

/// Commercial data of a product. Prices are minor units, VAT in basis points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: ProductKind,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub sale_price: i64,
    #[serde(default)]
    pub purchase_price: Option<i64>,
    #[serde(default)]
    pub vat_rate_bps: u32,
    #[serde(default = "default_true")]
    pub sellable: bool,
    #[serde(default = "default_true")]
    pub purchasable: bool,
    #[serde(default)]
    pub track_stock: bool,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

fn default_true() -> bool {
    true
}

impl ProductProfile {
    fn normalized(&self) -> Result<Self, DomainError> {
        let name = required_text(&self.name, "name")?;
        if self.sale_price < 0 || self.purchase_price.is_some_and(|p| p < 0) {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        if self.vat_rate_bps > FULL_RATE_BPS {
            return Err(DomainError::validation("VAT rate cannot exceed 100%"));
        }
        if self.kind == ProductKind::Service && self.track_stock {
            return Err(DomainError::validation("services cannot track stock"));
        }
        Ok(Self {
            name,
            description: optional_text(self.description.as_deref()),
            barcode: optional_text(self.barcode.as_deref()),
            unit: optional_text(self.unit.as_deref()),
            ..self.clone()
        })
    }
}

/// Aggregate root: an item of the tenant's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    code: String,
    profile: Option<ProductProfile>,
    active: bool,
    version: u64,
    created: bool,
}

impl Product {
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            profile: None,
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn profile(&self) -> Option<&ProductProfile> {
        self.profile.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub code: String,
    pub profile: ProductProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub profile: ProductProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivation {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    Update(UpdateProduct),
    Deactivate(ProductActivation),
    Reactivate(ProductActivation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub code: String,
    pub profile: ProductProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub profile: ProductProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStatusChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Created(ProductCreated),
    Updated(ProductUpdated),
    Deactivated(ProductStatusChanged),
    Reactivated(ProductStatusChanged),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => "catalog.product.created",
            ProductEvent::Updated(_) => "catalog.product.updated",
            ProductEvent::Deactivated(_) => "catalog.product.deactivated",
            ProductEvent::Reactivated(_) => "catalog.product.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Created(e) => e.occurred_at,
            ProductEvent::Updated(e) => e.occurred_at,
            ProductEvent::Deactivated(e) | ProductEvent::Reactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Created(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.profile = Some(e.profile.clone());
                self.active = true;
                self.created = true;
            }
            ProductEvent::Updated(e) => self.profile = Some(e.profile.clone()),
            ProductEvent::Deactivated(_) => self.active = false,
            ProductEvent::Reactivated(_) => self.active = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("product already exists"));
                }
                Ok(vec![ProductEvent::Created(ProductCreated {
                    tenant_id: cmd.tenant_id,
                    product_id: cmd.product_id,
                    code: normalize_code(&cmd.code, "code")?,
                    profile: cmd.profile.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::Update(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
                Ok(vec![ProductEvent::Updated(ProductUpdated {
                    tenant_id: cmd.tenant_id,
                    product_id: cmd.product_id,
                    profile: cmd.profile.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::Deactivate(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
                if !self.active {
                    return Err(DomainError::conflict("product is already inactive"));
                }
                Ok(vec![ProductEvent::Deactivated(ProductStatusChanged {
                    tenant_id: cmd.tenant_id,
                    product_id: cmd.product_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::Reactivate(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
                if self.active {
                    return Err(DomainError::conflict("product is already active"));
                }
                Ok(vec![ProductEvent::Reactivated(ProductStatusChanged {
                    tenant_id: cmd.tenant_id,
                    product_id: cmd.product_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Product {
    fn ensure_existing(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;
    use proptest::prelude::*;

    fn profile() -> ProductProfile {
        ProductProfile {
            name: "Croissant".to_string(),
            description: Some("  ".to_string()),
            kind: ProductKind::Product,
            unit: Some("piece".to_string()),
            sale_price: 120,
            purchase_price: Some(40),
            vat_rate_bps: 550,
            sellable: true,
            purchasable: true,
            track_stock: true,
            barcode: None,
            category_id: None,
        }
    }

    fn create(profile: ProductProfile) -> (Product, Result<Vec<ProductEvent>, DomainError>) {
        let id = ProductId::new(AggregateId::new());
        let mut p = Product::empty(id);
        let res = execute(
            &mut p,
            &ProductCommand::Create(CreateProduct {
                tenant_id: TenantId::new(),
                product_id: id,
                code: "crs-01".to_string(),
                profile,
                occurred_at: Utc::now(),
            }),
        );
        (p, res)
    }

    #[test]
    fn create_normalises_and_activates() {
        let (p, res) = create(profile());
        res.unwrap();
        assert_eq!(p.code(), "CRS-01");
        assert!(p.is_active());
        assert_eq!(p.profile().unwrap().description, None);
    }

    #[test]
    fn services_cannot_track_stock() {
        let mut prof = profile();
        prof.kind = ProductKind::Service;
        let (_, res) = create(prof);
        match res {
            Err(DomainError::Validation(msg)) if msg.contains("stock") => {}
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn vat_above_hundred_percent_is_rejected(vat in (FULL_RATE_BPS + 1)..100_000u32) {
            let mut prof = profile();
            prof.vat_rate_bps = vat;
            let (_, res) = create(prof);
            prop_assert!(matches!(res, Err(DomainError::Validation(_))));
        }

        #[test]
        fn negative_sale_price_is_rejected(price in i64::MIN..0) {
            let mut prof = profile();
            prof.sale_price = price;
            let (_, res) = create(prof);
            prop_assert!(matches!(res, Err(DomainError::Validation(_))));
        }
    }
}
