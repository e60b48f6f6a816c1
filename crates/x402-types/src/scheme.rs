//! Payment scheme system.
//!
//! A payment scheme (e.g. "exact" on Solana) is identified by [`X402SchemeId`] and
//! turned into a running [`X402SchemeFacilitator`] by [`X402SchemeFacilitatorBuilder`],
//! given a chain provider and optional scheme-specific JSON configuration.
//!
//! ```ignore
//! let facilitator = V2SolanaExact.build(provider, Some(config))?;
//! let verify_response = facilitator.verify(&verify_request).await?;
//! let settle_response = facilitator.settle(&settle_request).await?;
//! ```

use crate::proto;

/// Identifies a payment scheme on a chain namespace.
pub trait X402SchemeId {
    /// The x402 protocol version the scheme speaks.
    fn x402_version(&self) -> u8 {
        proto::v2::X402Version2::VALUE
    }
    /// CAIP-2 namespace of the chains the scheme runs on (e.g. `solana`).
    fn namespace(&self) -> &str;
    /// Scheme name (e.g. `exact`).
    fn scheme(&self) -> &str;
    /// `v{version}:{namespace}:{scheme}` slug, used to look a scheme up in configuration.
    fn id(&self) -> String {
        format!(
            "v{}:{}:{}",
            self.x402_version(),
            self.namespace(),
            self.scheme()
        )
    }
}

/// Verification and settlement of one payment scheme on one chain.
///
/// A payment that fails verification is not an error: implementations answer with an
/// invalid [`proto::VerifyResponse`] or a failed [`proto::SettleResponse`]. `Err` is reserved
/// for requests the handler cannot even interpret.
#[async_trait::async_trait]
pub trait X402SchemeFacilitator: Send + Sync {
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<proto::VerifyResponse, X402SchemeFacilitatorError>;
    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<proto::SettleResponse, X402SchemeFacilitatorError>;
    async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError>;
}

/// Builds a scheme facilitator from a chain provider and optional configuration.
pub trait X402SchemeFacilitatorBuilder<P> {
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn X402SchemeFacilitator>, Box<dyn std::error::Error>>;
}

/// Errors a scheme facilitator returns instead of a structured response.
#[derive(Debug, thiserror::Error)]
pub enum X402SchemeFacilitatorError {
    /// The request body does not have the shape the scheme expects.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}
