//! Per-tenant switchable application modules.

use serde::{Deserialize, Serialize};

use atelier_core::TenantId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreModule {
    ThirdParty,
    Contact,
    Proposal,
    Order,
    Invoice,
    Product,
    Agenda,
    Bank,
    Accounting,
    Hr,
    Leave,
    Ged,
    Ticketing,
}

impl CoreModule {
    pub const ALL: [CoreModule; 13] = [
        CoreModule::ThirdParty,
        CoreModule::Contact,
        CoreModule::Proposal,
        CoreModule::Order,
        CoreModule::Invoice,
        CoreModule::Product,
        CoreModule::Agenda,
        CoreModule::Bank,
        CoreModule::Accounting,
        CoreModule::Hr,
        CoreModule::Leave,
        CoreModule::Ged,
        CoreModule::Ticketing,
    ];

    pub fn code(self) -> &'static str {
        match self {
            CoreModule::ThirdParty => "THIRD_PARTY",
            CoreModule::Contact => "CONTACT",
            CoreModule::Proposal => "PROPOSAL",
            CoreModule::Order => "ORDER",
            CoreModule::Invoice => "INVOICE",
            CoreModule::Product => "PRODUCT",
            CoreModule::Agenda => "AGENDA",
            CoreModule::Bank => "BANK",
            CoreModule::Accounting => "ACCOUNTING",
            CoreModule::Hr => "HR",
            CoreModule::Leave => "LEAVE",
            CoreModule::Ged => "GED",
            CoreModule::Ticketing => "TICKETING",
        }
    }

    /// Permission needed to see the module's data.
    pub fn read_permission(self) -> &'static str {
        match self {
            CoreModule::ThirdParty => "parties.read",
            CoreModule::Contact => "contacts.read",
            CoreModule::Proposal => "proposals.read",
            CoreModule::Order => "orders.read",
            CoreModule::Invoice => "invoices.read",
            CoreModule::Product => "products.read",
            CoreModule::Agenda => "agenda.read",
            CoreModule::Bank => "bank.read",
            CoreModule::Accounting => "accounting.read",
            CoreModule::Hr => "hr.read",
            CoreModule::Leave => "leave.read",
            CoreModule::Ged => "ged.read",
            CoreModule::Ticketing => "tickets.read",
        }
    }

    pub fn sort_order(self) -> u32 {
        (Self::ALL.iter().position(|m| *m == self).unwrap_or(0) as u32 + 1) * 10
    }

    /// Case-insensitive lookup; unknown codes are `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_uppercase();
        Self::ALL.into_iter().find(|m| m.code() == code)
    }
}

/// Stored enablement row. A module without a row counts as enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSetting {
    pub tenant_id: TenantId,
    /// A core module code, or `module:<code>` for an activated no-code module.
    pub module_key: String,
    pub enabled: bool,
}

impl ModuleSetting {
    pub fn core(tenant_id: TenantId, module: CoreModule, enabled: bool) -> Self {
        Self {
            tenant_id,
            module_key: module.code().to_string(),
            enabled,
        }
    }

    pub fn nocode(tenant_id: TenantId, module_code: &str) -> Self {
        Self {
            tenant_id,
            module_key: nocode_module_key(module_code),
            enabled: true,
        }
    }
}

pub fn nocode_module_key(module_code: &str) -> String {
    format!("module:{}", module_code.trim().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_and_unknown_is_none() {
        for m in CoreModule::ALL {
            assert_eq!(CoreModule::from_code(&m.code().to_lowercase()), Some(m));
        }
        assert_eq!(CoreModule::from_code("REPORTING"), None);
    }

    #[test]
    fn sort_order_follows_declaration() {
        assert_eq!(CoreModule::ThirdParty.sort_order(), 10);
        assert!(CoreModule::Ged.sort_order() > CoreModule::Invoice.sort_order());
    }

    #[test]
    fn nocode_keys_are_prefixed() {
        assert_eq!(nocode_module_key(" fleet "), "module:FLEET");
    }
}
