use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced while constructing or validating foundation types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("tip percent must be between 0 and 100, got {0}")]
    InvalidTipPercent(i64),

    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("item name must not be empty")]
    EmptyItemName,

    #[error("item name too long: {len} characters (max {max})")]
    ItemNameTooLong { len: usize, max: usize },

    #[error("item price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("item price {price} is above the maximum of {max}")]
    PriceTooLarge { price: Decimal, max: Decimal },

    #[error("item quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),

    #[error("item quantity {quantity} is above the maximum of {max}")]
    QuantityTooLarge { quantity: u32, max: u32 },

    #[error("unknown session status: {0}")]
    InvalidStatus(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("participant identifier must not be empty")]
    EmptyParticipant,
}
