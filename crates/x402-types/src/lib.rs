#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 payment protocol.
//!
//! This crate provides the chain-agnostic foundation used by the facilitator side of
//! the x402 ecosystem. Chain-specific payment schemes live in separate crates and plug
//! into the traits defined here.
//!
//! # Overview
//!
//! A client that wants to pay for a resource submits a signed payment payload together
//! with the payment requirements it accepted. A facilitator verifies the payload against
//! the requirements and, when asked to, settles it on-chain.
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 chain identifiers and provider abstractions
//! - [`config`] - Environment variable resolution for configuration values
//! - [`proto`] - Wire format types for protocol messages (V2)
//! - [`scheme`] - Traits a payment scheme implements to verify and settle payments
//! - [`util`] - Helper types (base64, string literals)
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod chain;
pub mod config;
pub mod proto;
pub mod scheme;
pub mod util;
