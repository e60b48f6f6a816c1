use serde::{Deserialize, Serialize};
use serde_with::{OneOrMany, serde_as};
use std::ops::Deref;
use std::str::FromStr;
use url::Url;
use x402_types::chain::ChainId;
use x402_types::config::LiteralOrEnv;

use crate::chain::SolanaChainReference;

/// Configuration for a Solana chain in the x402 facilitator.
///
/// Combines a chain reference with the chain-specific configuration: RPC
/// endpoints and the fee payer keypairs.
///
/// # Example
///
/// ```ignore
/// use x402_chain_solana::chain::config::{SolanaChainConfig, SolanaChainConfigInner};
///
/// let inner: SolanaChainConfigInner = serde_json::from_value(serde_json::json!({
///     "signers": ["$SOLANA_FEE_PAYER_1", "$SOLANA_FEE_PAYER_2"],
///     "rpc": "https://api.devnet.solana.com",
/// }))?;
/// let config = SolanaChainConfig::new(SolanaChainReference::solana_devnet(), inner);
/// ```
#[derive(Debug, Clone)]
pub struct SolanaChainConfig {
    /// The Solana network identifier (genesis hash prefix).
    pub chain_reference: SolanaChainReference,
    /// Chain-specific configuration details.
    pub inner: SolanaChainConfigInner,
}

impl SolanaChainConfig {
    pub fn new(chain_reference: SolanaChainReference, inner: SolanaChainConfigInner) -> Self {
        Self {
            chain_reference,
            inner,
        }
    }

    /// Returns the fee payer keypairs configured for this chain.
    pub fn signers(&self) -> &[SolanaSignerConfig] {
        &self.inner.signers
    }

    /// Returns the RPC endpoint URL for this chain.
    pub fn rpc(&self) -> &Url {
        &self.inner.rpc
    }

    /// Returns the chain reference (genesis hash prefix).
    pub fn chain_reference(&self) -> SolanaChainReference {
        self.chain_reference
    }

    /// Returns the CAIP-2 chain ID for this configuration.
    pub fn chain_id(&self) -> ChainId {
        self.chain_reference.into()
    }

    /// Returns the optional WebSocket pubsub endpoint URL.
    pub fn pubsub(&self) -> Option<&Url> {
        self.inner.pubsub.as_ref()
    }
}

/// Configuration specific to Solana chains.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaChainConfigInner {
    /// Fee payer keypairs (required, at least one).
    /// Each is a private key (base58 format, 64 bytes) or an env var reference.
    /// A single key may be given as a plain string.
    #[serde(alias = "signer")]
    #[serde_as(as = "OneOrMany<_>")]
    pub signers: Vec<SolanaSignerConfig>,
    /// RPC provider endpoint (required).
    pub rpc: Url,
    /// RPC pubsub provider endpoint (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubsub: Option<Url>,
}

/// A validated Solana private key (64 bytes in standard Solana format).
///
/// - First 32 bytes: the Ed25519 secret key (seed)
/// - Last 32 bytes: the Ed25519 public key
///
/// The key is stored and parsed as a base58-encoded 64-byte array,
/// which is the standard format used by Solana CLI and wallets.
#[derive(Clone, PartialEq, Eq)]
pub struct SolanaPrivateKey([u8; 64]);

impl SolanaPrivateKey {
    /// Parse a base58 string into a private key.
    pub fn from_base58(s: &str) -> Result<Self, String> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("Invalid base58: {}", e))?;
        let bytes: [u8; 64] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            format!(
                "Private key must be 64 bytes (standard Solana format), got {} bytes",
                bytes.len()
            )
        })?;
        Ok(Self(bytes))
    }

    /// Encode the keypair back to base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for SolanaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SolanaPrivateKey(..)")
    }
}

impl Serialize for SolanaPrivateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl FromStr for SolanaPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

/// Fee payer signer configuration.
///
/// Uses `LiteralOrEnv` to support both literal base58 keys and environment variable references.
///
/// ```json
/// {
///   "signers": ["$SOLANA_FEE_PAYER_1", "${SOLANA_FEE_PAYER_2}"]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolanaSignerConfig(LiteralOrEnv<SolanaPrivateKey>);

impl Deref for SolanaSignerConfig {
    type Target = SolanaPrivateKey;

    fn deref(&self) -> &Self::Target {
        self.0.inner()
    }
}
