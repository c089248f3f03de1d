//! Lenient readers for Dolibarr JSON, where numbers often arrive as strings.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use atelier_core::money::parse_decimal;

/// Trimmed string (numbers are rendered); blank is `None`.
pub fn get_string(item: &Value, key: &str) -> Option<String> {
    let s = match item.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

pub fn get_i64(item: &Value, key: &str) -> Option<i64> {
    match item.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decimal field scaled to `scale` digits (`2` for money, `3` for quantities).
pub fn get_decimal(item: &Value, key: &str, scale: u32) -> Option<i64> {
    parse_decimal(&get_string(item, key)?, scale)
}

/// ISO date from the first ten characters, or a unix timestamp.
pub fn get_date(item: &Value, key: &str) -> Option<NaiveDate> {
    match item.get(key)? {
        Value::Number(n) => {
            let secs = n.as_i64()?;
            DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive());
            }
            let head = s.get(..10)?;
            NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

pub fn get_bool(item: &Value, key: &str) -> bool {
    match item.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("y")
        }
        _ => false,
    }
}

/// Primary key: `rowid`, else `id`.
pub fn dolibarr_id(item: &Value) -> Option<i64> {
    get_i64(item, "rowid").or_else(|| get_i64(item, "id"))
}

pub fn third_party_code(item: &Value) -> String {
    get_string(item, "code_client")
        .or_else(|| get_string(item, "code_fournisseur"))
        .unwrap_or_else(|| match dolibarr_id(item) {
            Some(id) => format!("DOLI-{id}"),
            None => "DOLI-UNK".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_and_numbers() {
        let item = json!({"name": "  Acme  ", "blank": " ", "n": 12, "s": "34", "bad": "x"});
        assert_eq!(get_string(&item, "name").as_deref(), Some("Acme"));
        assert_eq!(get_string(&item, "blank"), None);
        assert_eq!(get_string(&item, "n").as_deref(), Some("12"));
        assert_eq!(get_i64(&item, "s"), Some(34));
        assert_eq!(get_i64(&item, "bad"), None);
        assert_eq!(get_i64(&item, "missing"), None);
    }

    #[test]
    fn decimals_use_money_scale() {
        let item = json!({"price": "120.50000000", "tva_tx": "20.000", "qty": "1.5"});
        assert_eq!(get_decimal(&item, "price", 2), Some(12_050));
        assert_eq!(get_decimal(&item, "tva_tx", 2), Some(2_000));
        assert_eq!(get_decimal(&item, "qty", 3), Some(1_500));
    }

    #[test]
    fn dates_from_iso_or_timestamp() {
        let item = json!({"iso": "2024-03-15 10:22:00", "ts": 1_710_460_800, "ts_str": "1710460800", "bad": "15/03/2024"});
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(get_date(&item, "iso"), Some(expected));
        assert_eq!(get_date(&item, "ts"), Some(expected));
        assert_eq!(get_date(&item, "ts_str"), Some(expected));
        assert_eq!(get_date(&item, "bad"), None);
    }

    #[test]
    fn booleans() {
        let item = json!({"a": "1", "b": "TRUE", "c": "y", "d": 1, "e": "0", "f": true});
        for k in ["a", "b", "c", "d", "f"] {
            assert!(get_bool(&item, k), "{k}");
        }
        assert!(!get_bool(&item, "e"));
        assert!(!get_bool(&item, "missing"));
    }

    #[test]
    fn codes_fall_back_to_the_id() {
        assert_eq!(third_party_code(&json!({"code_client": "CU01", "id": 3})), "CU01");
        assert_eq!(third_party_code(&json!({"code_fournisseur": "SU01"})), "SU01");
        assert_eq!(third_party_code(&json!({"rowid": "9", "id": 3})), "DOLI-9");
        assert_eq!(third_party_code(&json!({})), "DOLI-UNK");
    }
}
