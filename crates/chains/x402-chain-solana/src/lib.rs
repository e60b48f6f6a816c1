#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana facilitator for the x402 payment protocol.
//!
//! This crate verifies and settles x402 V2 payments made with the "exact" scheme on
//! Solana: a client-signed transaction carrying an SPL Token `TransferChecked`, with the
//! facilitator acting as fee payer.
//!
//! # Architecture
//!
//! - [`chain`] - Solana chain types, configuration, and the RPC-backed provider
//! - [`v2_solana_exact`] - verification policy, transfer checks, and the facilitator
//!
//! # Feature Flags
//!
//! - `telemetry` - `tracing` spans and events for verification and settlement
//!
//! # Usage
//!
//! ```ignore
//! use x402_chain_solana::V2SolanaExact;
//! use x402_chain_solana::chain::SolanaChainProvider;
//! use x402_types::chain::FromConfig;
//! use x402_types::scheme::X402SchemeFacilitatorBuilder;
//!
//! let provider = SolanaChainProvider::from_config(&config).await?;
//! let facilitator = V2SolanaExact.build(provider, None)?;
//!
//! let verify_response = facilitator.verify(&verify_request).await?;
//! let settle_response = facilitator.settle(&settle_request).await?;
//! ```

pub mod chain;
pub mod v2_solana_exact;

mod networks;
pub use networks::*;

pub use v2_solana_exact::V2SolanaExact;
