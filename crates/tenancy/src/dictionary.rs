//! Tenant dictionaries: small code/label lists (civilities, countries, ...).

use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, required_text};
use atelier_core::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DictionaryType {
    Civility,
    Country,
    Currency,
    LegalForm,
    PaymentMethod,
    ContactThirdPartyLinkType,
}

impl DictionaryType {
    pub const ALL: [DictionaryType; 6] = [
        DictionaryType::Civility,
        DictionaryType::Country,
        DictionaryType::Currency,
        DictionaryType::LegalForm,
        DictionaryType::PaymentMethod,
        DictionaryType::ContactThirdPartyLinkType,
    ];

    pub fn code(self) -> &'static str {
        match self {
            DictionaryType::Civility => "CIVILITY",
            DictionaryType::Country => "COUNTRY",
            DictionaryType::Currency => "CURRENCY",
            DictionaryType::LegalForm => "LEGAL_FORM",
            DictionaryType::PaymentMethod => "PAYMENT_METHOD",
            DictionaryType::ContactThirdPartyLinkType => "CONTACT_THIRD_PARTY_LINK_TYPE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Entries a fresh tenant starts with, as `(code, label)` in display order.
    pub fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            DictionaryType::Civility => &[
                ("M", "Monsieur"),
                ("MME", "Madame"),
                ("MLLE", "Mademoiselle"),
                ("MR", "Mister"),
                ("MRS", "Missus"),
                ("MS", "Miss"),
            ],
            DictionaryType::Country => &[
                ("FR", "France"),
                ("BE", "Belgium"),
                ("CH", "Switzerland"),
                ("DE", "Germany"),
                ("ES", "Spain"),
                ("GB", "United Kingdom"),
                ("US", "United States"),
            ],
            DictionaryType::Currency => &[
                ("EUR", "Euro"),
                ("USD", "US Dollar"),
                ("GBP", "Pound Sterling"),
                ("CHF", "Swiss Franc"),
            ],
            DictionaryType::LegalForm => &[
                ("SARL", "Société à responsabilité limitée"),
                ("SAS", "Société par actions simplifiée"),
                ("SA", "Société anonyme"),
                ("EURL", "Entreprise unipersonnelle à responsabilité limitée"),
                ("EI", "Entreprise individuelle"),
            ],
            DictionaryType::PaymentMethod => &[
                ("BANK", "Bank transfer"),
                ("CHECK", "Check"),
                ("CASH", "Cash"),
                ("CARD", "Card"),
            ],
            DictionaryType::ContactThirdPartyLinkType => &[
                ("SALARIE", "Employee"),
                ("ASSOCIE", "Partner"),
                ("CONSULTANT", "Consultant"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryItem {
    pub dictionary_type: DictionaryType,
    pub code: String,
    pub label: String,
    pub sort_order: i32,
    pub active: bool,
}

/// Create/update payload before normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDictionaryItem {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl DictionaryItem {
    /// Normalise input: code trimmed and upper-cased, label trimmed, both required.
    pub fn new(dictionary_type: DictionaryType, input: &NewDictionaryItem) -> DomainResult<Self> {
        let code = normalize_code(&input.code, "dictionary code")?;
        if code.len() > 64 {
            return Err(DomainError::validation("dictionary code is too long"));
        }
        Ok(Self {
            dictionary_type,
            code,
            label: required_text(&input.label, "dictionary label")?,
            sort_order: input.sort_order.unwrap_or(0),
            active: input.active.unwrap_or(true),
        })
    }

    /// Apply an update to an existing entry; the code is immutable.
    pub fn updated(&self, input: &NewDictionaryItem) -> DomainResult<Self> {
        Ok(Self {
            label: required_text(&input.label, "dictionary label")?,
            sort_order: input.sort_order.unwrap_or(self.sort_order),
            active: input.active.unwrap_or(self.active),
            ..self.clone()
        })
    }

    /// Default entries for one type.
    pub fn seeds(dictionary_type: DictionaryType) -> Vec<DictionaryItem> {
        dictionary_type
            .defaults()
            .iter()
            .enumerate()
            .map(|(i, (code, label))| DictionaryItem {
                dictionary_type,
                code: (*code).to_string(),
                label: (*label).to_string(),
                sort_order: (i as i32 + 1) * 10,
                active: true,
            })
            .collect()
    }
}

/// Display order: sort order, then code.
pub fn sort_items(items: &mut [DictionaryItem]) {
    items.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.code.cmp(&b.code)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_normalises_code_and_label() {
        let item = DictionaryItem::new(
            DictionaryType::Country,
            &NewDictionaryItem {
                code: " it ".to_string(),
                label: " Italy ".to_string(),
                sort_order: None,
                active: None,
            },
        )
        .unwrap();
        assert_eq!(item.code, "IT");
        assert_eq!(item.label, "Italy");
        assert!(item.active);
    }

    #[test]
    fn blank_label_is_rejected() {
        let err = DictionaryItem::new(
            DictionaryType::Civility,
            &NewDictionaryItem {
                code: "DR".to_string(),
                label: "  ".to_string(),
                sort_order: None,
                active: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn seeds_cover_every_type_in_order() {
        for t in DictionaryType::ALL {
            let seeds = DictionaryItem::seeds(t);
            assert!(!seeds.is_empty());
            assert!(seeds.windows(2).all(|w| w[0].sort_order < w[1].sort_order));
        }
        let civilities: Vec<_> = DictionaryItem::seeds(DictionaryType::Civility)
            .into_iter()
            .map(|i| i.code)
            .collect();
        assert_eq!(civilities, ["M", "MME", "MLLE", "MR", "MRS", "MS"]);
    }

    #[test]
    fn type_codes_parse_with_dashes() {
        assert_eq!(DictionaryType::from_code("legal-form"), Some(DictionaryType::LegalForm));
        assert_eq!(DictionaryType::from_code("unknown"), None);
    }
}
