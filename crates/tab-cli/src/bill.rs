use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tab_settle::{PricedItem, SettlementReport};
use tab_types::{CurrencyCode, ItemDraft, ParticipantId, TipPercent};

/// A bill read from disk: items with their claims, plus tips.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BillFile {
    pub currency: CurrencyCode,
    pub tip_percent: TipPercent,
    pub tips: HashMap<ParticipantId, TipPercent>,
    pub names: HashMap<ParticipantId, String>,
    pub items: Vec<PricedItem>,
}

impl BillFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let bill: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        for item in &bill.items {
            ItemDraft::new(item.name.clone(), item.price, item.quantity)
                .validate()
                .with_context(|| format!("invalid item {:?} in {}", item.name, path.display()))?;
            let claimed = item.claims.total();
            anyhow::ensure!(
                claimed <= u64::from(item.quantity),
                "item {:?} is over-claimed: {claimed} of {}",
                item.name,
                item.quantity
            );
        }
        Ok(bill)
    }

    pub fn settle(&self, tip_override: Option<TipPercent>) -> SettlementReport {
        SettlementReport::compute(
            self.currency.clone(),
            &self.items,
            tip_override.unwrap_or(self.tip_percent),
            &self.tips,
            &self.names,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_bill(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn settles_a_bill_from_disk() {
        let file = write_bill(
            r#"{
                "currency": "eur",
                "tip_percent": 10,
                "tips": { "bob": 20 },
                "items": [
                    { "name": "Pasta", "price": "100", "quantity": 2, "claims": { "alice": 1, "bob": 1 } },
                    { "name": "Salad", "price": "30", "quantity": 1 }
                ]
            }"#,
        );
        let bill = BillFile::load(file.path()).unwrap();
        let report = bill.settle(None);
        assert_eq!(report.currency.as_str(), "EUR");
        assert_eq!(report.share_of(&"alice".into()).unwrap().grand_total, dec!(55));
        assert_eq!(report.share_of(&"bob".into()).unwrap().grand_total, dec!(60));
        assert_eq!(report.unclaimed_items.len(), 1);

        let flat = bill.settle(Some(TipPercent::ZERO));
        assert_eq!(flat.grand_total, dec!(100));
    }

    #[test]
    fn over_claimed_items_are_rejected() {
        let file = write_bill(
            r#"{ "items": [ { "name": "Tea", "price": "5", "quantity": 1, "claims": { "a": 1, "b": 1 } } ] }"#,
        );
        let err = BillFile::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("over-claimed"));
    }

    #[test]
    fn items_are_validated_like_session_items() {
        for (json, reason) in [
            (r#"{ "name": "Tea", "price": "0", "quantity": 1 }"#, "must be positive"),
            (r#"{ "name": "Tea", "price": "-5", "quantity": 1 }"#, "must be positive"),
            (r#"{ "name": "  ", "price": "5", "quantity": 1 }"#, "must not be empty"),
            (r#"{ "name": "Tea", "price": "5", "quantity": 0 }"#, "at least 1"),
            (
                r#"{ "name": "Tea", "price": "79228162514264337593543950335", "quantity": 1 }"#,
                "above the maximum",
            ),
        ] {
            let file = write_bill(&format!(r#"{{ "items": [ {json} ] }}"#));
            let err = BillFile::load(file.path()).unwrap_err();
            assert!(err.to_string().starts_with("invalid item"), "{err}");
            assert!(format!("{err:#}").contains(reason), "{err:#}");
        }
    }

    #[test]
    fn malformed_json_names_the_file() {
        let file = write_bill("{ not json");
        let err = BillFile::load(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("parsing"));
    }
}
