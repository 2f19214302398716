//! TabSplit service facade.
//!
//! [`TabService`] is the single entry point used by the HTTP server and the
//! CLI. It checks membership and ownership, applies the lifecycle rules,
//! drives the claim engine and the settlement calculator, and announces
//! every change to a [`Notifier`](tab_notify::Notifier).
//!
//! Receipt recognition is pluggable through [`ReceiptRecognizer`]; without
//! one, uploads fail with [`ErrorKind::Recognition`].

pub mod config;
pub mod error;
pub mod recognizer;
pub mod service;
pub mod views;

pub use config::ServiceConfig;
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use recognizer::{
    total_mismatch, ReceiptImage, ReceiptRecognizer, RecognitionError, RecognitionSummary,
    RecognizedItem, RecognizedReceipt, StaticRecognizer,
};
pub use service::TabService;
pub use views::{ClaimUpdate, ItemView, MyShare, SessionView, ShareLine};
