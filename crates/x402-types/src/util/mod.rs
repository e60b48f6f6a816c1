//! Utility types and functions for x402.
//!
//! - [`b64`] - Base64 encoding/decoding utilities
//! - [`lit_str`] - Compile-time string literal types

pub mod b64;
pub mod lit_str;

pub use b64::*;
