//! Lines and totals shared by proposals, orders and invoices.

use serde::{Deserialize, Serialize};

use atelier_catalog::ProductId;
use atelier_core::error::required_text;
use atelier_core::money::{FULL_RATE_BPS, apply_rate, line_total};
use atelier_core::DomainError;

/// Line as entered by the user, before pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub description: String,
    /// Thousandths of a unit (`1500` = 1.5).
    pub quantity_milli: i64,
    pub unit_price: i64,
    #[serde(default)]
    pub discount_bps: u32,
    #[serde(default)]
    pub vat_rate_bps: u32,
}

/// Priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity_milli: i64,
    pub unit_price: i64,
    pub discount_bps: u32,
    pub vat_rate_bps: u32,
    /// Net amount after the line discount.
    pub total: i64,
    pub vat: i64,
}

impl DocumentLine {
    pub fn price(line_no: u32, input: &LineInput) -> Result<Self, DomainError> {
        let description = required_text(&input.description, "line description")?;
        if input.quantity_milli <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if input.unit_price < 0 {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if input.discount_bps > FULL_RATE_BPS || input.vat_rate_bps > FULL_RATE_BPS {
            return Err(DomainError::validation("rates must be between 0% and 100%"));
        }
        let total = line_total(input.quantity_milli, input.unit_price, input.discount_bps)
            .ok_or_else(|| DomainError::validation("line amount overflow"))?;

        Ok(Self {
            line_no,
            product_id: input.product_id,
            description,
            quantity_milli: input.quantity_milli,
            unit_price: input.unit_price,
            discount_bps: input.discount_bps,
            vat_rate_bps: input.vat_rate_bps,
            total,
            vat: apply_rate(total, input.vat_rate_bps),
        })
    }

    pub fn input(&self) -> LineInput {
        LineInput {
            product_id: self.product_id,
            description: self.description.clone(),
            quantity_milli: self.quantity_milli,
            unit_price: self.unit_price,
            discount_bps: self.discount_bps,
            vat_rate_bps: self.vat_rate_bps,
        }
    }
}

/// Next free line number.
pub fn next_line_no(lines: &[DocumentLine]) -> u32 {
    lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// Sum of line net amounts.
    pub subtotal: i64,
    /// Document-level discount, at most the subtotal.
    pub discount_amount: i64,
    pub vat_amount: i64,
    /// `subtotal - discount_amount + vat_amount`.
    pub total: i64,
}

impl DocumentTotals {
    pub fn compute(lines: &[DocumentLine], discount_amount: i64) -> Result<Self, DomainError> {
        let overflow = || DomainError::validation("document total overflow");
        let mut subtotal: i64 = 0;
        let mut vat_amount: i64 = 0;
        for line in lines {
            subtotal = subtotal.checked_add(line.total).ok_or_else(overflow)?;
            vat_amount = vat_amount.checked_add(line.vat).ok_or_else(overflow)?;
        }
        if discount_amount < 0 {
            return Err(DomainError::validation("discount cannot be negative"));
        }
        if discount_amount > subtotal {
            return Err(DomainError::validation("discount cannot exceed the subtotal"));
        }
        let total = (subtotal - discount_amount).checked_add(vat_amount).ok_or_else(overflow)?;
        Ok(Self {
            subtotal,
            discount_amount,
            vat_amount,
            total,
        })
    }
}

/// Price every input line, numbering from 1.
pub fn price_lines(inputs: &[LineInput]) -> Result<Vec<DocumentLine>, DomainError> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| DocumentLine::price(i as u32 + 1, input))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(qty: i64, price: i64, disc: u32, vat: u32) -> LineInput {
        LineInput {
            product_id: None,
            description: "Consulting".to_string(),
            quantity_milli: qty,
            unit_price: price,
            discount_bps: disc,
            vat_rate_bps: vat,
        }
    }

    #[test]
    fn totals_follow_line_amounts() {
        let lines = price_lines(&[input(2_000, 10_000, 0, 2_000), input(500, 3_333, 1_000, 550)]).unwrap();
        // 20000 + round(0.5 * 3333 * 0.9 = 1499.85) = 1500
        assert_eq!(lines[1].total, 1_500);
        assert_eq!(lines[1].vat, 83); // 82.5 -> 83
        let totals = DocumentTotals::compute(&lines, 1_500).unwrap();
        assert_eq!(totals.subtotal, 21_500);
        assert_eq!(totals.vat_amount, 4_083);
        assert_eq!(totals.total, 21_500 - 1_500 + 4_083);
    }

    #[test]
    fn discount_cannot_exceed_subtotal() {
        let lines = price_lines(&[input(1_000, 100, 0, 0)]).unwrap();
        match DocumentTotals::compute(&lines, 101) {
            Err(DomainError::Validation(msg)) if msg.contains("discount") => {}
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn line_validation() {
        assert!(DocumentLine::price(1, &input(0, 100, 0, 0)).is_err());
        assert!(DocumentLine::price(1, &input(1_000, -1, 0, 0)).is_err());
        assert!(DocumentLine::price(1, &input(1_000, 1, 10_001, 0)).is_err());
        let mut blank = input(1_000, 1, 0, 0);
        blank.description = " ".to_string();
        assert!(DocumentLine::price(1, &blank).is_err());
    }

    #[test]
    fn next_line_no_skips_removed_numbers() {
        let mut lines = price_lines(&[input(1_000, 1, 0, 0), input(1_000, 1, 0, 0)]).unwrap();
        lines.remove(0);
        assert_eq!(next_line_no(&lines), 3);
        assert_eq!(next_line_no(&[]), 1);
    }

    proptest! {
        #[test]
        fn total_is_subtotal_minus_discount_plus_vat(
            lines in proptest::collection::vec((1i64..100_000, 0i64..1_000_000, 0u32..=10_000, 0u32..=3_000), 1..8),
            discount_pct in 0i64..=100,
        ) {
            let inputs: Vec<_> = lines.iter().map(|(q, p, d, v)| input(*q, *p, *d, *v)).collect();
            let priced = price_lines(&inputs).unwrap();
            let subtotal: i64 = priced.iter().map(|l| l.total).sum();
            let discount = subtotal * discount_pct / 100;
            let totals = DocumentTotals::compute(&priced, discount).unwrap();
            prop_assert_eq!(totals.total, totals.subtotal - totals.discount_amount + totals.vat_amount);
            prop_assert!(totals.subtotal >= 0);
            prop_assert!(totals.vat_amount >= 0);
        }
    }
}
