//! Protocol version 2 (V2) types for x402.
//!
//! V2 identifies networks with CAIP-2 chain IDs (e.g. `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`)
//! and embeds the accepted requirements in the payment payload, so a facilitator can check
//! that the buyer signed for the same terms the seller asks for.
//!
//! # Key Types
//!
//! - [`X402Version2`] - Version marker that serializes as `2`
//! - [`PaymentPayload`] - Signed payment with accepted requirements
//! - [`PaymentRequirements`] - Payment terms set by the seller
//! - [`VerifyRequest`] - Typed verification/settlement request body
//! - [`VerifyResponse`] / [`SettleResponse`] - Structured outcomes

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::chain::ChainId;
use crate::proto;
use crate::proto::ErrorReason;

/// Version marker for x402 protocol version 2.
///
/// This type serializes as the integer `2` and is used to identify V2 protocol
/// messages in the wire format.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version2;

impl X402Version2 {
    pub const VALUE: u8 = 2;
}

impl PartialEq<u8> for X402Version2 {
    fn eq(&self, other: &u8) -> bool {
        *other == Self::VALUE
    }
}

impl From<X402Version2> for u8 {
    fn from(_: X402Version2) -> Self {
        X402Version2::VALUE
    }
}

impl Serialize for X402Version2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Metadata about the resource being paid for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
    /// URL of the resource.
    pub url: String,
}

/// Request to verify or settle a V2 payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<TPayload, TRequirements> {
    /// Protocol version (always 2).
    pub x402_version: X402Version2,
    /// The signed payment authorization.
    pub payment_payload: TPayload,
    /// The payment requirements to verify against.
    pub payment_requirements: TRequirements,
}

impl<TPayload, TRequirements> VerifyRequest<TPayload, TRequirements>
where
    Self: DeserializeOwned,
{
    /// Parses the untyped request body into the scheme's typed request.
    pub fn from_proto(request: proto::VerifyRequest) -> Result<Self, serde_json::Error> {
        serde_json::from_value(request.into_json())
    }
}

/// A signed payment authorization from the buyer.
///
/// # Type Parameters
///
/// - `TPaymentRequirements` - The accepted requirements type
/// - `TPayload` - The scheme-specific payload type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TPaymentRequirements, TPayload> {
    /// The payment requirements the buyer accepted.
    pub accepted: TPaymentRequirements,
    /// The scheme-specific signed payload.
    pub payload: TPayload,
    /// Information about the resource being paid for.
    #[serde(default)]
    pub resource: Option<ResourceInfo>,
    /// Protocol version (always 2).
    pub x402_version: X402Version2,
}

/// Payment requirements set by the seller.
///
/// # Type Parameters
///
/// - `TScheme` - The scheme identifier type (default: `String`)
/// - `TAmount` - The amount type (default: `String`)
/// - `TAddress` - The address type (default: `String`)
/// - `TExtra` - Scheme-specific extra data type (default: `Option<serde_json::Value>`)
/// - `TNetwork` - The network type (default: [`ChainId`])
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = Option<serde_json::Value>,
    TNetwork = ChainId,
> {
    /// The payment scheme (e.g., "exact").
    pub scheme: TScheme,
    /// The CAIP-2 chain ID.
    pub network: TNetwork,
    /// The payment amount in the token's smallest unit.
    pub amount: TAmount,
    /// The recipient address for payment.
    pub pay_to: TAddress,
    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,
    /// The token asset address.
    pub asset: TAddress,
    /// Scheme-specific extra data.
    #[serde(default)]
    pub extra: TExtra,
}

/// Outcome of a payment verification.
///
/// A payment problem is never an `Err`: a rejected payment is an [`VerifyResponse::Invalid`]
/// carrying a stable reason code, an optional diagnostic message, and the payer
/// address if it could be determined (empty otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid { payer: String },
    /// The payload failed verification.
    Invalid {
        reason: String,
        message: Option<String>,
        payer: String,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response with the given `payer` address.
    pub fn valid(payer: String) -> Self {
        VerifyResponse::Valid { payer }
    }

    /// Constructs a failed verification response.
    pub fn invalid(payer: Option<String>, reason: String, message: Option<String>) -> Self {
        VerifyResponse::Invalid {
            reason,
            message,
            payer: payer.unwrap_or_default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid { .. })
    }

    pub fn payer(&self) -> &str {
        match self {
            VerifyResponse::Valid { payer } => payer,
            VerifyResponse::Invalid { payer, .. } => payer,
        }
    }

    /// The rejection reason, if the payment was rejected.
    pub fn reason(&self) -> Option<&str> {
        match self {
            VerifyResponse::Valid { .. } => None,
            VerifyResponse::Invalid { reason, .. } => Some(reason),
        }
    }
}

impl From<VerifyResponse> for proto::VerifyResponse {
    fn from(val: VerifyResponse) -> Self {
        proto::VerifyResponse(
            serde_json::to_value(val).expect("VerifyResponse serialization failed"),
        )
    }
}

impl TryFrom<proto::VerifyResponse> for VerifyResponse {
    type Error = serde_json::Error;
    fn try_from(value: proto::VerifyResponse) -> Result<Self, Self::Error> {
        serde_json::from_value(value.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_message: Option<String>,
    #[serde(default)]
    payer: String,
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                invalid_reason: None,
                invalid_message: None,
                payer: payer.clone(),
            },
            VerifyResponse::Invalid {
                reason,
                message,
                payer,
            } => VerifyResponseWire {
                is_valid: false,
                invalid_reason: Some(reason.clone()),
                invalid_message: message.clone(),
                payer: payer.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        match wire.is_valid {
            true => Ok(VerifyResponse::Valid { payer: wire.payer }),
            false => Ok(VerifyResponse::Invalid {
                reason: wire
                    .invalid_reason
                    .unwrap_or_else(|| ErrorReason::VerificationFailed.into()),
                message: wire.invalid_message,
                payer: wire.payer,
            }),
        }
    }
}

/// Outcome of a payment settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// The address that paid.
        payer: String,
        /// The transaction signature.
        transaction: String,
        /// The CAIP-2 chain ID the payment settled on.
        network: String,
    },
    /// Settlement failed, either in verification or on-chain.
    Error {
        /// Stable reason code.
        reason: String,
        /// Diagnostic detail about the failure.
        message: Option<String>,
        /// The payer address if it could be determined, empty otherwise.
        payer: String,
        /// The CAIP-2 chain ID the payment targeted.
        network: String,
    },
}

impl SettleResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, SettleResponse::Success { .. })
    }

    /// The failure reason, if settlement failed.
    pub fn reason(&self) -> Option<&str> {
        match self {
            SettleResponse::Success { .. } => None,
            SettleResponse::Error { reason, .. } => Some(reason),
        }
    }
}

impl From<SettleResponse> for proto::SettleResponse {
    fn from(val: SettleResponse) -> Self {
        proto::SettleResponse(
            serde_json::to_value(val).expect("SettleResponse serialization failed"),
        )
    }
}

impl TryFrom<proto::SettleResponse> for SettleResponse {
    type Error = serde_json::Error;
    // `Self::Error` would be ambiguous with the `SettleResponse::Error` variant.
    fn try_from(value: proto::SettleResponse) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default)]
    payer: String,
    #[serde(default)]
    transaction: String,
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                error_message: None,
                payer: payer.clone(),
                transaction: transaction.clone(),
                network: network.clone(),
            },
            SettleResponse::Error {
                reason,
                message,
                payer,
                network,
            } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                error_message: message.clone(),
                payer: payer.clone(),
                transaction: String::new(),
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        match wire.success {
            true => Ok(SettleResponse::Success {
                payer: wire.payer,
                transaction: wire.transaction,
                network: wire.network,
            }),
            false => Ok(SettleResponse::Error {
                reason: wire
                    .error_reason
                    .unwrap_or_else(|| ErrorReason::TransactionFailed.into()),
                message: wire.error_message,
                payer: wire.payer,
                network: wire.network,
            }),
        }
    }
}
