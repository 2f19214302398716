use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tab_store::LedgerSnapshot;
use tab_types::{CurrencyCode, ParticipantId, TipPercent};

use crate::shares::{raw_totals, PricedItem, ShareBreakdown};

/// One participant's line in a settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantShare {
    pub participant: ParticipantId,
    pub display_name: String,
    pub tip_percent: TipPercent,
    pub dishes_total: Decimal,
    pub tip_amount: Decimal,
    pub grand_total: Decimal,
}

/// An item with units left unclaimed at settlement time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclaimedLine {
    pub name: String,
    pub unclaimed_units: u32,
    pub unclaimed_amount: Decimal,
}

/// Full settlement of a bill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub currency: CurrencyCode,
    /// Participants holding claims, ordered by identifier.
    pub shares: Vec<ParticipantShare>,
    /// Sum of every item's price, claimed or not.
    pub items_total: Decimal,
    /// Sum of the participants' unrounded dish totals.
    pub claimed_total: Decimal,
    pub unclaimed_items: Vec<UnclaimedLine>,
    /// Sum of the rounded per-participant totals.
    pub grand_total: Decimal,
    /// `grand_total` minus the exact dishes-plus-tip sum.
    pub rounding_surplus: Decimal,
}

impl SettlementReport {
    /// Settle `items` with a global tip, per-participant overrides and
    /// optional display names (falling back to the participant id).
    pub fn compute(
        currency: CurrencyCode,
        items: &[PricedItem],
        global_tip: TipPercent,
        tips: &HashMap<ParticipantId, TipPercent>,
        names: &HashMap<ParticipantId, String>,
    ) -> Self {
        let mut shares = Vec::new();
        let mut exact_total = Decimal::ZERO;
        for (participant, raw) in raw_totals(items) {
            let tip = tips.get(&participant).copied().unwrap_or(global_tip);
            let breakdown = ShareBreakdown::from_raw(raw, tip);
            exact_total += breakdown.dishes_total + breakdown.tip_amount;
            let display_name = names
                .get(&participant)
                .cloned()
                .unwrap_or_else(|| participant.to_string());
            shares.push(ParticipantShare {
                participant,
                display_name,
                tip_percent: tip,
                dishes_total: breakdown.dishes_total,
                tip_amount: breakdown.tip_amount,
                grand_total: breakdown.grand_total,
            });
        }

        let unclaimed_items = items
            .iter()
            .filter(|item| item.unclaimed_units() > 0)
            .map(|item| UnclaimedLine {
                name: item.name.clone(),
                unclaimed_units: item.unclaimed_units(),
                unclaimed_amount: item.cost_of(item.unclaimed_units()),
            })
            .collect();

        let grand_total: Decimal = shares.iter().map(|s| s.grand_total).sum();
        Self {
            currency,
            items_total: items.iter().map(|item| item.price).sum(),
            claimed_total: shares.iter().map(|s| s.dishes_total).sum(),
            shares,
            unclaimed_items,
            grand_total,
            rounding_surplus: grand_total - exact_total,
        }
    }

    /// Settle a session from a ledger snapshot, using members' tip
    /// overrides and display names.
    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Self {
        let items: Vec<PricedItem> = snapshot.items.iter().map(PricedItem::from).collect();
        let tips = snapshot
            .members
            .iter()
            .filter_map(|m| m.tip_percent.map(|tip| (m.participant.clone(), tip)))
            .collect();
        let names = snapshot
            .members
            .iter()
            .map(|m| (m.participant.clone(), m.display_name.clone()))
            .collect();
        Self::compute(
            snapshot.session.currency.clone(),
            &items,
            snapshot.session.tip_percent,
            &tips,
            &names,
        )
    }

    pub fn share_of(&self, participant: &ParticipantId) -> Option<&ParticipantShare> {
        self.shares.iter().find(|s| &s.participant == participant)
    }

    /// `true` when every unit of every item is claimed.
    pub fn is_fully_claimed(&self) -> bool {
        self.unclaimed_items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tab_store::ItemSnapshot;
    use tab_types::{InviteToken, Item, ItemClaims, ItemDraft, Member, Session};

    fn claims(pairs: &[(&str, u32)]) -> ItemClaims {
        pairs.iter().map(|(p, q)| (ParticipantId::from(*p), *q)).collect()
    }

    #[test]
    fn report_totals_and_surplus() {
        let items = [
            PricedItem::new("Pizza", dec!(100), 3, claims(&[("A", 1), ("B", 1), ("C", 1)])),
            PricedItem::new("Tea", dec!(60), 2, claims(&[("A", 1)])),
        ];
        let report = SettlementReport::compute(
            CurrencyCode::default(),
            &items,
            TipPercent::ZERO,
            &HashMap::new(),
            &HashMap::new(),
        );

        assert_eq!(report.items_total, dec!(160));
        assert_eq!(report.share_of(&"A".into()).unwrap().grand_total, dec!(64));
        assert_eq!(report.grand_total, dec!(132));
        assert_eq!(report.rounding_surplus.round_dp(6), dec!(2));
        assert_eq!(report.claimed_total.round_dp(6), dec!(130));
        assert_eq!(
            report.unclaimed_items,
            vec![UnclaimedLine {
                name: "Tea".into(),
                unclaimed_units: 1,
                unclaimed_amount: dec!(30),
            }]
        );
        assert!(!report.is_fully_claimed());
    }

    #[test]
    fn snapshot_uses_member_tips_and_names() {
        let mut session = Session::new("A".into(), InviteToken::generate(8), CurrencyCode::default());
        session.tip_percent = TipPercent::new(10).unwrap();

        let mut alice = Member::new(session.id, "A".into(), "Alice");
        alice.tip_percent = Some(TipPercent::new(20).unwrap());
        let bob = Member::new(session.id, "B".into(), "Bob");

        let item = Item::from_draft(session.id, ItemDraft::new("Steak", dec!(1000), 2)).unwrap();
        let snapshot = LedgerSnapshot {
            session,
            members: vec![alice, bob],
            items: vec![ItemSnapshot {
                item,
                claims: claims(&[("A", 1), ("B", 1)]),
            }],
        };

        let report = SettlementReport::from_snapshot(&snapshot);
        let alice = report.share_of(&"A".into()).unwrap();
        assert_eq!(alice.display_name, "Alice");
        assert_eq!(alice.tip_percent.value(), 20);
        assert_eq!(alice.grand_total, dec!(600));

        let bob = report.share_of(&"B".into()).unwrap();
        assert_eq!(bob.tip_percent.value(), 10);
        assert_eq!(bob.grand_total, dec!(550));
        assert!(report.is_fully_claimed());
        assert_eq!(report.rounding_surplus, Decimal::ZERO);
    }

    #[test]
    fn report_serializes_amounts_as_strings() {
        let items = [PricedItem::new("Tea", dec!(120.50), 1, claims(&[("A", 1)]))];
        let report = SettlementReport::compute(
            CurrencyCode::default(),
            &items,
            TipPercent::ZERO,
            &HashMap::new(),
            &HashMap::new(),
        );
        let json = serde_json::to_value(&report).unwrap();
        let amount = |value: &serde_json::Value| value.as_str().unwrap().parse::<Decimal>().unwrap();
        assert_eq!(amount(&json["shares"][0]["dishes_total"]), dec!(120.50));
        assert_eq!(amount(&json["grand_total"]), dec!(121));
        assert_eq!(json["currency"], "RUB");
    }
}
