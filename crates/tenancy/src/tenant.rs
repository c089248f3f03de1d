//! Tenant records, plans and code allocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{optional_text, required_text};
use atelier_core::{DomainError, DomainResult, TenantId};

/// Longest tenant code accepted in subdomains and path prefixes.
pub const MAX_CODE_LEN: usize = 50;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionPlan {
    Discovery,
    Premium,
    Privilege,
}

impl SubscriptionPlan {
    pub fn code(self) -> &'static str {
        match self {
            SubscriptionPlan::Discovery => "DISCOVERY",
            SubscriptionPlan::Premium => "PREMIUM",
            SubscriptionPlan::Privilege => "PRIVILEGE",
        }
    }

    /// Seat limit; `None` is unlimited.
    pub fn max_users(self) -> Option<u32> {
        match self {
            SubscriptionPlan::Discovery => Some(1),
            SubscriptionPlan::Premium => Some(10),
            SubscriptionPlan::Privilege => None,
        }
    }

    /// Monthly price in cents.
    pub fn monthly_price(self) -> i64 {
        match self {
            SubscriptionPlan::Discovery => 0,
            SubscriptionPlan::Premium => 900,
            SubscriptionPlan::Privilege => 1_900,
        }
    }

    /// Unknown or missing codes fall back to the free plan.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_uppercase()).as_deref() {
            Some("PREMIUM") => SubscriptionPlan::Premium,
            Some("PRIVILEGE") => SubscriptionPlan::Privilege,
            _ => SubscriptionPlan::Discovery,
        }
    }
}

/// A company using Atelier. Everything else is scoped by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub code: String,
    pub name: String,
    pub legal_name: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>,
    pub default_locale: String,
    pub default_currency: String,
    pub fiscal_year_start_month: u8,
    pub timezone: String,
    pub active: bool,
    pub plan: SubscriptionPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sign-up request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTenant {
    /// Preferred code; derived from `name` when absent.
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub default_locale: Option<String>,
    #[serde(default)]
    pub default_currency: Option<String>,
    #[serde(default)]
    pub fiscal_year_start_month: Option<u8>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl RegisterTenant {
    /// Slug the code is allocated from, before uniqueness suffixes.
    pub fn base_code(&self) -> String {
        let source = self
            .code
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.name);
        slugify(source)
    }
}

impl Tenant {
    /// Build an active tenant from a sign-up request and an already allocated code.
    pub fn register(
        id: TenantId,
        cmd: &RegisterTenant,
        code: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Tenant> {
        let name = required_text(&cmd.name, "tenant name")?;
        let month = cmd.fiscal_year_start_month.unwrap_or(1);
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation("fiscal year start month must be 1-12"));
        }
        let currency = optional_text(cmd.default_currency.as_deref())
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| "EUR".to_string());
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation("currency must be a 3-letter ISO code"));
        }
        if code.is_empty() || code.len() > MAX_CODE_LEN {
            return Err(DomainError::validation("tenant code must be 1-50 characters"));
        }

        Ok(Tenant {
            id,
            code,
            name,
            legal_name: optional_text(cmd.legal_name.as_deref()),
            email: optional_text(cmd.email.as_deref()),
            country_code: optional_text(cmd.country_code.as_deref()).map(|c| c.to_uppercase()),
            default_locale: optional_text(cmd.default_locale.as_deref()).unwrap_or_else(|| "en".to_string()),
            default_currency: currency,
            fiscal_year_start_month: month,
            timezone: optional_text(cmd.timezone.as_deref()).unwrap_or_else(|| "UTC".to_string()),
            active: true,
            plan: SubscriptionPlan::from_code(cmd.plan.as_deref()),
            created_at: now,
            updated_at: now,
        })
    }
}

fn fold_accent(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        _ => return None,
    })
}

/// Derive a URL-safe code: lower-case, whitespace to `-`, accents folded,
/// anything outside `[a-z0-9-]` dropped, at most 50 characters.
/// Blank input yields `"company"`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().to_lowercase().chars() {
        if c.is_whitespace() {
            out.push('-');
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            out.push(c);
        } else if let Some(folded) = fold_accent(c) {
            out.push_str(folded);
        }
    }
    out.truncate(MAX_CODE_LEN);
    if out.is_empty() { "company".to_string() } else { out }
}

/// First free code among `base`, `base-1`, `base-2`, ... keeping the length limit.
pub fn unique_code(base: &str, exists: impl Fn(&str) -> bool) -> String {
    if !exists(base) {
        return base.to_string();
    }
    let mut n: u32 = 1;
    loop {
        let suffix = format!("-{n}");
        let keep = MAX_CODE_LEN.saturating_sub(suffix.len()).min(base.len());
        let candidate = format!("{}{}", &base[..keep], suffix);
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn slug_folds_accents_and_spaces() {
        assert_eq!(slugify("Boulangerie Élodie & Fils"), "boulangerie-elodie--fils");
        assert_eq!(slugify("  ACME  "), "acme");
        assert_eq!(slugify("!!!"), "company");
        assert_eq!(slugify("Cœur"), "coeur");
    }

    #[test]
    fn unique_code_appends_counter() {
        let taken: HashSet<&str> = ["acme", "acme-1"].into_iter().collect();
        assert_eq!(unique_code("acme", |c| taken.contains(c)), "acme-2");
        assert_eq!(unique_code("globex", |c| taken.contains(c)), "globex");
    }

    #[test]
    fn unique_code_respects_length_limit() {
        let base = "a".repeat(MAX_CODE_LEN);
        let code = unique_code(&base, |c| c == base);
        assert_eq!(code.len(), MAX_CODE_LEN);
        assert!(code.ends_with("-1"));
    }

    #[test]
    fn register_applies_defaults() {
        let cmd = RegisterTenant {
            name: " Acme SAS ".to_string(),
            plan: Some("premium".to_string()),
            ..Default::default()
        };
        let tenant = Tenant::register(TenantId::new(), &cmd, cmd.base_code(), test_time()).unwrap();
        assert_eq!(tenant.code, "acme-sas");
        assert_eq!(tenant.name, "Acme SAS");
        assert_eq!(tenant.default_currency, "EUR");
        assert_eq!(tenant.fiscal_year_start_month, 1);
        assert_eq!(tenant.plan, SubscriptionPlan::Premium);
        assert!(tenant.active);
    }

    #[test]
    fn register_rejects_bad_month() {
        let cmd = RegisterTenant {
            name: "Acme".to_string(),
            fiscal_year_start_month: Some(13),
            ..Default::default()
        };
        match Tenant::register(TenantId::new(), &cmd, "acme".to_string(), test_time()) {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("month")),
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_plan_is_discovery() {
        assert_eq!(SubscriptionPlan::from_code(Some("gold")), SubscriptionPlan::Discovery);
        assert_eq!(SubscriptionPlan::from_code(None), SubscriptionPlan::Discovery);
        assert_eq!(SubscriptionPlan::Privilege.max_users(), None);
    }

    proptest! {
        #[test]
        fn slugs_are_url_safe(input in "\\PC{0,80}") {
            let slug = slugify(&input);
            prop_assert!(!slug.is_empty());
            prop_assert!(slug.len() <= MAX_CODE_LEN);
            prop_assert!(slug.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'));
        }
    }
}
