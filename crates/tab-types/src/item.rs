use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{ItemId, ParticipantId, SessionId};

/// Upper bound on an item's display name, in characters.
pub const MAX_ITEM_NAME_LEN: usize = 200;

/// Highest accepted item price (10^12 in the bill's currency).
///
/// With [`MAX_ITEM_QUANTITY`] this keeps `price × units × (100 + tip)` far
/// inside `Decimal`'s range for any realistic number of items.
pub const MAX_ITEM_PRICE: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Highest accepted unit count for a single item.
pub const MAX_ITEM_QUANTITY: u32 = 10_000;

/// A priced, quantity-limited line of the bill.
///
/// `price` is the total for all `quantity` units, not a per-unit price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub session_id: SessionId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Build an item from a validated draft.
    pub fn from_draft(session_id: SessionId, draft: ItemDraft) -> Result<Self, TypeError> {
        draft.validate()?;
        Ok(Self {
            id: ItemId::new(),
            session_id,
            name: draft.name.trim().to_string(),
            price: draft.price,
            quantity: draft.quantity,
            created_at: Utc::now(),
        })
    }

    /// Rename and re-price in place. Quantity is not editable.
    pub fn edit(&mut self, name: &str, price: Decimal) -> Result<(), TypeError> {
        validate_name(name)?;
        validate_price(price)?;
        self.name = name.trim().to_string();
        self.price = price;
        Ok(())
    }
}

/// Caller-supplied description of a new item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub price: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, price: Decimal, quantity: u32) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        validate_name(&self.name)?;
        validate_price(self.price)?;
        if self.quantity < 1 {
            return Err(TypeError::InvalidQuantity(i64::from(self.quantity)));
        }
        if self.quantity > MAX_ITEM_QUANTITY {
            return Err(TypeError::QuantityTooLarge {
                quantity: self.quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), TypeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TypeError::EmptyItemName);
    }
    let len = trimmed.chars().count();
    if len > MAX_ITEM_NAME_LEN {
        return Err(TypeError::ItemNameTooLong {
            len,
            max: MAX_ITEM_NAME_LEN,
        });
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), TypeError> {
    if price <= Decimal::ZERO {
        return Err(TypeError::NonPositivePrice(price));
    }
    if price > MAX_ITEM_PRICE {
        return Err(TypeError::PriceTooLarge {
            price,
            max: MAX_ITEM_PRICE,
        });
    }
    Ok(())
}

/// Claimed units of one item, keyed by participant.
///
/// A zero quantity is never stored: setting a participant to zero removes
/// the entry, so "absent" and "zero" are indistinguishable to readers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemClaims(BTreeMap<ParticipantId, u32>);

impl ItemClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claimed units held by `participant` (zero when absent).
    pub fn get(&self, participant: &ParticipantId) -> u32 {
        self.0.get(participant).copied().unwrap_or(0)
    }

    /// Set an exact quantity; zero removes the entry.
    pub fn set(&mut self, participant: ParticipantId, quantity: u32) {
        if quantity == 0 {
            self.0.remove(&participant);
        } else {
            self.0.insert(participant, quantity);
        }
    }

    /// Sum of claimed units across all participants.
    pub fn total(&self) -> u64 {
        self.0.values().map(|q| u64::from(*q)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, u32)> {
        self.0.iter().map(|(p, q)| (p, *q))
    }

    pub fn holders(&self) -> impl Iterator<Item = &ParticipantId> {
        self.0.keys()
    }
}

impl FromIterator<(ParticipantId, u32)> for ItemClaims {
    fn from_iter<T: IntoIterator<Item = (ParticipantId, u32)>>(iter: T) -> Self {
        let mut claims = Self::new();
        for (participant, quantity) in iter {
            claims.set(participant, quantity);
        }
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn draft_validation_covers_every_field() {
        assert!(ItemDraft::new("Pizza", dec!(500), 2).validate().is_ok());
        assert_eq!(
            ItemDraft::new("  ", dec!(500), 1).validate(),
            Err(TypeError::EmptyItemName)
        );
        assert_eq!(
            ItemDraft::new("Pizza", dec!(0), 1).validate(),
            Err(TypeError::NonPositivePrice(dec!(0)))
        );
        assert_eq!(
            ItemDraft::new("Pizza", dec!(-3.50), 1).validate(),
            Err(TypeError::NonPositivePrice(dec!(-3.50)))
        );
        assert_eq!(
            ItemDraft::new("Pizza", dec!(1), 0).validate(),
            Err(TypeError::InvalidQuantity(0))
        );
    }

    #[test]
    fn price_and_quantity_have_ceilings() {
        assert_eq!(MAX_ITEM_PRICE, dec!(1_000_000_000_000));
        assert!(ItemDraft::new("Yacht", MAX_ITEM_PRICE, MAX_ITEM_QUANTITY)
            .validate()
            .is_ok());
        assert_eq!(
            ItemDraft::new("Yacht", MAX_ITEM_PRICE + dec!(0.01), 1).validate(),
            Err(TypeError::PriceTooLarge {
                price: MAX_ITEM_PRICE + dec!(0.01),
                max: MAX_ITEM_PRICE,
            })
        );
        assert!(matches!(
            ItemDraft::new("Yacht", Decimal::MAX, 1).validate(),
            Err(TypeError::PriceTooLarge { .. })
        ));
        assert_eq!(
            ItemDraft::new("Rice", dec!(1), MAX_ITEM_QUANTITY + 1).validate(),
            Err(TypeError::QuantityTooLarge {
                quantity: MAX_ITEM_QUANTITY + 1,
                max: MAX_ITEM_QUANTITY,
            })
        );

        let mut item =
            Item::from_draft(SessionId::new(), ItemDraft::new("Beer", dec!(300), 3)).unwrap();
        assert!(item.edit("Beer", Decimal::MAX).is_err());
        assert_eq!(item.price, dec!(300));
    }

    #[test]
    fn overly_long_name_is_rejected() {
        let name = "x".repeat(MAX_ITEM_NAME_LEN + 1);
        assert!(matches!(
            ItemDraft::new(name, dec!(1), 1).validate(),
            Err(TypeError::ItemNameTooLong { .. })
        ));
    }

    #[test]
    fn draft_quantity_defaults_to_one() {
        let draft: ItemDraft = serde_json::from_str(r#"{"name":"Tea","price":"120.50"}"#).unwrap();
        assert_eq!(draft.quantity, 1);
        assert_eq!(draft.price, dec!(120.50));
    }

    #[test]
    fn edit_keeps_quantity_and_trims_name() {
        let mut item =
            Item::from_draft(SessionId::new(), ItemDraft::new("Beer", dec!(300), 3)).unwrap();
        item.edit("  Lager ", dec!(330)).unwrap();
        assert_eq!(item.name, "Lager");
        assert_eq!(item.price, dec!(330));
        assert_eq!(item.quantity, 3);
        assert!(item.edit("", dec!(1)).is_err());
    }

    #[test]
    fn zero_claim_is_the_same_as_no_claim() {
        let mut claims = ItemClaims::new();
        claims.set("a".into(), 2);
        claims.set("b".into(), 1);
        assert_eq!(claims.total(), 3);

        claims.set("a".into(), 0);
        assert_eq!(claims.get(&"a".into()), 0);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims, ItemClaims::from_iter([(ParticipantId::from("b"), 1)]));
    }
}
