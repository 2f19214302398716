use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tab_store::ItemSnapshot;
use tab_types::{ItemClaims, ParticipantId, TipPercent};

use crate::rounding::round_up;

/// An item as the calculator sees it: total price, unit count, claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    #[serde(default)]
    pub name: String,
    /// Total price for all `quantity` units.
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub claims: ItemClaims,
}

impl PricedItem {
    pub fn new(name: impl Into<String>, price: Decimal, quantity: u32, claims: ItemClaims) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
            claims,
        }
    }

    /// An item split evenly between voters: one unit per voter.
    pub fn shared_equally(
        name: impl Into<String>,
        price: Decimal,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) -> Self {
        let claims: ItemClaims = participants.into_iter().map(|p| (p, 1)).collect();
        let quantity = u32::try_from(claims.len()).unwrap_or(u32::MAX).max(1);
        Self::new(name, price, quantity, claims)
    }

    /// Price of `units` units, multiplied before dividing so that holding
    /// every unit costs exactly `price`.
    pub fn cost_of(&self, units: u32) -> Decimal {
        if self.quantity == 0 {
            return self.price * Decimal::from(units);
        }
        self.price * Decimal::from(units) / Decimal::from(self.quantity)
    }

    /// Units nobody has claimed.
    pub fn unclaimed_units(&self) -> u32 {
        u64::from(self.quantity)
            .saturating_sub(self.claims.total())
            .try_into()
            .unwrap_or(0)
    }
}

impl From<&ItemSnapshot> for PricedItem {
    fn from(snapshot: &ItemSnapshot) -> Self {
        Self::new(
            snapshot.item.name.clone(),
            snapshot.item.price,
            snapshot.item.quantity,
            snapshot.claims.clone(),
        )
    }
}

/// One participant's amounts: exact dish and tip amounts plus the rounded
/// total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareBreakdown {
    pub dishes_total: Decimal,
    pub tip_amount: Decimal,
    pub grand_total: Decimal,
}

impl ShareBreakdown {
    /// Apply `tip` to an unrounded dishes total.
    ///
    /// Both public entry points finish through here, so they always agree.
    pub fn from_raw(dishes_total: Decimal, tip: TipPercent) -> Self {
        let tip_amount = dishes_total * tip.as_decimal() / Decimal::ONE_HUNDRED;
        Self {
            dishes_total,
            tip_amount,
            grand_total: round_up(dishes_total + tip_amount),
        }
    }
}

/// Unrounded pre-tip totals of every participant holding a claim.
pub fn raw_totals(items: &[PricedItem]) -> BTreeMap<ParticipantId, Decimal> {
    let mut raw = BTreeMap::new();
    for item in items.iter().filter(|item| !item.claims.is_empty()) {
        for (participant, units) in item.claims.iter().filter(|(_, q)| *q > 0) {
            *raw.entry(participant.clone()).or_insert(Decimal::ZERO) += item.cost_of(units);
        }
    }
    raw
}

/// Rounded total for every participant with at least one claim.
///
/// `tips` overrides `global_tip` per participant. Participants without
/// claims are absent from the result.
pub fn compute_all_shares(
    items: &[PricedItem],
    global_tip: TipPercent,
    tips: &HashMap<ParticipantId, TipPercent>,
) -> BTreeMap<ParticipantId, Decimal> {
    raw_totals(items)
        .into_iter()
        .map(|(participant, raw)| {
            let tip = tips.get(&participant).copied().unwrap_or(global_tip);
            let total = ShareBreakdown::from_raw(raw, tip).grand_total;
            (participant, total)
        })
        .collect()
}

/// Breakdown for a single participant. All zero when they hold no claims.
pub fn compute_participant_share(
    items: &[PricedItem],
    participant: &ParticipantId,
    tip: TipPercent,
) -> ShareBreakdown {
    let dishes_total = items
        .iter()
        .filter_map(|item| {
            let units = item.claims.get(participant);
            (units > 0).then(|| item.cost_of(units))
        })
        .sum();
    ShareBreakdown::from_raw(dishes_total, tip)
}
