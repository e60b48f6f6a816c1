//! Protocol types for x402 payment messages.
//!
//! This module defines the wire format types exchanged between a resource server
//! and a facilitator.
//!
//! # Key Types
//!
//! - [`SupportedPaymentKind`] - Describes a payment method supported by a facilitator
//! - [`SupportedResponse`] - Response from facilitator's `/supported` endpoint
//! - [`VerifyRequest`] / [`VerifyResponse`] - Payment verification messages (raw JSON)
//! - [`SettleRequest`] / [`SettleResponse`] - Payment settlement messages (raw JSON)
//! - [`ErrorReason`] - Failure reasons shared by every payment scheme
//!
//! The typed, version-specific shapes live in [`v2`]. The raw wrappers here are
//! what a hosting runtime passes around before it knows which scheme handles a request.
//!
//! # Wire Format
//!
//! All types serialize to JSON using camelCase field names. The protocol version
//! is indicated by the `x402Version` field.

use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::chain::ChainId;

pub mod util;
pub mod v2;

/// Describes a payment method supported by a facilitator.
///
/// ```json
/// {
///   "x402Version": 2,
///   "scheme": "exact",
///   "network": "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
///   "extra": { "feePayer": "..." }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// The x402 protocol version.
    pub x402_version: u8,
    /// The payment scheme identifier (e.g., "exact").
    pub scheme: String,
    /// The CAIP-2 chain ID.
    pub network: String,
    /// Optional scheme-specific extra data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from a facilitator's `/supported` endpoint.
///
/// Tells clients which payment kinds the facilitator handles and which signer
/// addresses it controls on each chain.
#[serde_as]
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    /// List of supported protocol extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Map of chain IDs to signer addresses for that chain.
    #[serde(default)]
    pub signers: HashMap<ChainId, Vec<String>>,
}

/// Request to verify a payment before settlement.
///
/// Holds the request body as untyped JSON: `{ x402Version, paymentPayload, paymentRequirements }`.
/// A scheme parses it into its own typed [`v2::VerifyRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest(serde_json::Value);

/// Request to settle a verified payment on-chain.
///
/// Same body as [`VerifyRequest`].
pub type SettleRequest = VerifyRequest;

impl From<serde_json::Value> for VerifyRequest {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl VerifyRequest {
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

/// Response from a payment verification request, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse(pub serde_json::Value);

/// Response from a payment settlement request, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleResponse(pub serde_json::Value);

/// Failure reasons that are not specific to a single payment scheme.
///
/// Schemes report their own, finer-grained reasons as plain strings. These are the
/// codes every scheme shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// The payment scheme is not the one the handler implements.
    UnsupportedScheme,
    /// The payment targets a different network than the requirements or the facilitator.
    NetworkMismatch,
    /// Verification failed without a more specific reason.
    VerificationFailed,
    /// The settlement transaction could not be signed, submitted, or confirmed.
    TransactionFailed,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::UnsupportedScheme => "unsupported_scheme",
            ErrorReason::NetworkMismatch => "network_mismatch",
            ErrorReason::VerificationFailed => "verification_failed",
            ErrorReason::TransactionFailed => "transaction_failed",
        }
    }
}

impl Display for ErrorReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorReason> for String {
    fn from(value: ErrorReason) -> Self {
        value.as_str().to_string()
    }
}
