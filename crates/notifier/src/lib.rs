//! Messaging provider adapter.
//!
//! Sends fully-formed template or text requests to the WhatsApp Cloud API and
//! maps the response to a provider message id or an error carrying the raw
//! provider body. Retries are the dispatch worker's job, not this crate's.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ProviderClient, WhatsAppClient};
pub use error::ProviderError;
pub use request::{ProviderReceipt, ProviderRequest};
