//! V2 Solana "exact" payment scheme.
//!
//! A buyer pays with a versioned transaction that performs an SPL Token (or Token-2022)
//! `TransferChecked` to the seller's associated token account. The facilitator sponsors
//! the fees: it co-signs as fee payer, submits, and waits for confirmation.
//!
//! Networks are identified by CAIP-2 chain IDs, e.g. `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`.
//!
//! # Modules
//!
//! - [`instruction`] - transaction decoding and instruction resolution
//! - [`policy`] - instruction layout rules and facilitator configuration
//! - [`verifier`] - custom verifier rules for additional instructions
//! - [`transfer`] - checks on the token transfer itself
//! - [`facilitator`] - the verification and settlement pipelines
//! - [`error`] - failure values and their wire reasons
//!
//! # Usage
//!
//! ```ignore
//! use x402_chain_solana::V2SolanaExact;
//! use x402_types::scheme::X402SchemeFacilitatorBuilder;
//!
//! let facilitator = V2SolanaExact.build(provider, Some(serde_json::json!({
//!     "maxInstructionCount": 5,
//!     "allowAdditionalInstructions": true,
//!     "builtinVerifiers": ["memo", "phantomLighthouse"],
//! })))?;
//! ```

pub mod error;
pub mod facilitator;
pub mod instruction;
pub mod policy;
pub mod transfer;
pub mod types;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::*;
pub use facilitator::*;
pub use policy::*;
pub use types::*;
pub use verifier::*;

use x402_types::scheme::X402SchemeId;

use crate::chain::SOLANA_NAMESPACE;

pub struct V2SolanaExact;

impl X402SchemeId for V2SolanaExact {
    fn namespace(&self) -> &str {
        SOLANA_NAMESPACE
    }

    fn scheme(&self) -> &str {
        ExactScheme.as_ref()
    }
}
