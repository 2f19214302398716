use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tab_types::{CurrencyCode, Item};

/// One uploaded receipt photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReceiptImage {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// A line parsed off a receipt. `price` is the line total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedItem {
    pub name: String,
    pub price: Decimal,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

/// Everything a recognizer extracts from a receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedReceipt {
    pub items: Vec<RecognizedItem>,
    /// Grand total printed on the receipt.
    pub total: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Failure reported by a recognizer. Never retried by the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RecognitionError(String);

impl RecognitionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Boundary to the receipt recognition provider.
#[async_trait]
pub trait ReceiptRecognizer: Send + Sync {
    async fn parse_receipt(
        &self,
        images: &[ReceiptImage],
    ) -> Result<RecognizedReceipt, RecognitionError>;
}

/// Returns a fixed receipt, or fails when none is configured.
#[derive(Clone, Debug, Default)]
pub struct StaticRecognizer {
    receipt: Option<RecognizedReceipt>,
}

impl StaticRecognizer {
    pub fn new(receipt: RecognizedReceipt) -> Self {
        Self {
            receipt: Some(receipt),
        }
    }

    /// A recognizer that always fails; the default when no provider is wired.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptRecognizer for StaticRecognizer {
    async fn parse_receipt(
        &self,
        images: &[ReceiptImage],
    ) -> Result<RecognizedReceipt, RecognitionError> {
        if images.is_empty() {
            return Err(RecognitionError::new("no images supplied"));
        }
        self.receipt
            .clone()
            .ok_or_else(|| RecognitionError::new("no recognition provider configured"))
    }
}

/// What [`TabService::ingest_receipt`](crate::TabService::ingest_receipt)
/// stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecognitionSummary {
    pub items: Vec<Item>,
    pub total: Decimal,
    pub currency: CurrencyCode,
    /// Item prices disagree with the printed total by more than 5%.
    pub total_mismatch: bool,
    /// Parsed lines dropped for failing validation.
    pub skipped: usize,
}

/// `true` when the item prices stray more than 5% from the printed total.
/// A zero total never mismatches.
pub fn total_mismatch(prices: impl IntoIterator<Item = Decimal>, total: Decimal) -> bool {
    if total.is_zero() {
        return false;
    }
    let sum: Decimal = prices.into_iter().sum();
    (sum - total).abs() > total * Decimal::new(5, 2)
}
