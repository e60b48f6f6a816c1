//! Solana chain support for x402 payments.
//!
//! # Key Types
//!
//! - [`SolanaChainReference`] - A 32-character genesis hash prefix identifying a Solana network
//! - [`SolanaChainProvider`] - RPC-backed provider holding the facilitator's fee payer keypairs
//! - [`SolanaChainProviderLike`] - The signing and RPC capabilities a payment scheme relies on
//! - [`Address`] - A Solana public key (base58-encoded)
//!
//! # Solana Networks
//!
//! Solana networks are identified by the first 32 characters of their genesis block hash:
//! - Mainnet: `5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`
//! - Devnet: `EtWTRABZaYq6iMfeYKouRu166VU2xqa1`

pub mod config;
pub mod provider;
pub mod types;

pub use provider::*;
pub use types::*;
