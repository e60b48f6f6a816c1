//! Wire types and program constants for the V2 Solana "exact" payment scheme.

use serde::{Deserialize, Serialize};
use solana_pubkey::{Pubkey, pubkey};
use x402_types::{lit_str, proto};

use crate::chain::Address;

lit_str!(ExactScheme, "exact");

/// SPL Memo program ID. Wallets use memos to make otherwise identical payments unique.
pub static MEMO_PROGRAM_PUBKEY: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Phantom Lighthouse program ID. Phantom injects assertion instructions from it on mainnet.
pub static PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY: Pubkey =
    pubkey!("L2TExMFKdjpN9kozasaurPirfHy9P8sbXoAN1qA3S95");

pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Position of the token transfer, after the two compute budget instructions.
pub const TRANSFER_INSTRUCTION_INDEX: usize = 2;

/// Highest compute unit price a payment transaction may ask the fee payer to pay.
pub const MAX_COMPUTE_UNIT_PRICE_MICROLAMPORTS: u64 = 5_000_000;

/// `SetComputeUnitLimit` discriminator in compute budget instruction data.
pub const COMPUTE_UNIT_LIMIT_DISCRIMINATOR: u8 = 2;

/// `SetComputeUnitPrice` discriminator in compute budget instruction data.
pub const COMPUTE_UNIT_PRICE_DISCRIMINATOR: u8 = 3;

pub type VerifyRequest = proto::v2::VerifyRequest<PaymentPayload, PaymentRequirements>;
pub type SettleRequest = VerifyRequest;
pub type PaymentPayload = proto::v2::PaymentPayload<PaymentRequirements, ExactSolanaPayload>;

/// Requirements as received.
///
/// Every field stays loosely typed so that a wrong scheme, an unparsable address or amount,
/// or a missing fee payer is reported as a verification failure instead of a malformed request.
pub type PaymentRequirements =
    proto::v2::PaymentRequirements<String, String, String, Option<serde_json::Value>, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// Base64-encoded, bincode-serialized `VersionedTransaction`, partially signed by the client.
    pub transaction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKindExtra {
    pub fee_payer: Address,
}
