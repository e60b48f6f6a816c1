use futures_util::stream::StreamExt;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::pubsub_client::PubsubClientError;
use solana_client::rpc_config::{
    RpcSendTransactionConfig, RpcSignatureSubscribeConfig, RpcSimulateTransactionConfig,
};
use solana_client::rpc_response::{RpcSignatureResult, UiTransactionError};
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_signature::Signature;
use solana_signer::{Signer, SignerError};
use solana_transaction::versioned::VersionedTransaction;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use x402_types::chain::{ChainId, ChainProviderOps, FromConfig};

use crate::chain::config::SolanaChainConfig;
use crate::chain::types::{Address, SolanaChainReference};

/// Interval between signature status polls when no pubsub endpoint is configured.
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors that can occur when interacting with a Solana chain provider.
#[derive(thiserror::Error, Debug)]
pub enum SolanaChainProviderError {
    /// Failed to sign a transaction.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The transaction failed simulation or execution.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] UiTransactionError),
    /// RPC transport error.
    #[error(transparent)]
    Transport(Box<ClientErrorKind>),
    /// WebSocket pubsub transport error.
    #[error(transparent)]
    PubsubTransport(#[from] PubsubClientError),
    /// The provider holds no keypair for the address.
    #[error("No keypair for signer {0}")]
    UnknownSigner(Address),
    /// The address is not among the transaction's required signers.
    #[error("Signer {0} is not a required signer of the transaction")]
    SignerNotRequired(Address),
}

impl From<ClientError> for SolanaChainProviderError {
    fn from(value: ClientError) -> Self {
        SolanaChainProviderError::Transport(value.kind)
    }
}

/// Places `signer`'s signature over the transaction message into its slot.
///
/// Required signatures belong to the first `num_required_signatures` static account keys,
/// in order. Other signatures are left untouched.
pub fn sign_transaction<S: Signer + ?Sized>(
    mut tx: VersionedTransaction,
    signer: &S,
) -> Result<VersionedTransaction, SolanaChainProviderError> {
    let signer_pubkey = signer.try_pubkey()?;
    let num_required = tx.message.header().num_required_signatures as usize;
    let pos = tx
        .message
        .static_account_keys()
        .iter()
        .take(num_required)
        .position(|k| *k == signer_pubkey)
        .ok_or(SolanaChainProviderError::SignerNotRequired(Address::new(
            signer_pubkey,
        )))?;
    let msg_bytes = tx.message.serialize();
    let signature = signer.try_sign_message(msg_bytes.as_slice())?;
    if tx.signatures.len() < num_required {
        tx.signatures.resize(num_required, Signature::default());
    }
    tx.signatures[pos] = signature;
    Ok(tx)
}

/// Provider for interacting with a Solana blockchain.
///
/// Holds the fee payer keypairs the facilitator controls on one network, and the RPC
/// clients used to simulate, submit and confirm transactions.
///
/// # Configuration
///
/// The provider requires:
/// - One or more keypairs for co-signing transactions as fee payer
/// - An RPC endpoint URL
/// - Optionally, a WebSocket pubsub URL for faster confirmations
///
/// # Example
///
/// ```ignore
/// use x402_chain_solana::chain::SolanaChainProvider;
/// use x402_types::chain::FromConfig;
///
/// let provider = SolanaChainProvider::from_config(&config).await?;
/// println!("Fee payers: {:?}", provider.fee_payers());
/// ```
pub struct SolanaChainProvider {
    /// The Solana network this provider connects to.
    chain: SolanaChainReference,
    /// Fee payer keypairs, in configuration order.
    keypairs: Vec<Arc<Keypair>>,
    /// The RPC client for sending requests.
    rpc_client: Arc<RpcClient>,
    /// Optional WebSocket client for subscriptions.
    pubsub_client: Option<Arc<PubsubClient>>,
}

impl Debug for SolanaChainProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaChainProvider")
            .field("fee_payers", &self.fee_payers())
            .field("chain", &self.chain)
            .field("rpc_url", &self.rpc_client.url())
            .finish()
    }
}

impl SolanaChainProvider {
    /// Creates a new Solana chain provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket connection fails to establish.
    pub async fn new(
        keypairs: Vec<Keypair>,
        rpc_url: String,
        pubsub_url: Option<String>,
        chain: SolanaChainReference,
    ) -> Result<Self, PubsubClientError> {
        #[cfg(feature = "telemetry")]
        {
            let signer_addresses: Vec<_> = keypairs.iter().map(|k| k.pubkey()).collect();
            let chain_id: ChainId = chain.into();
            tracing::info!(
                chain = %chain_id,
                rpc = rpc_url,
                pubsub = ?pubsub_url,
                signers = ?signer_addresses,
                "Using Solana provider"
            );
        }
        let rpc_client = RpcClient::new(rpc_url);
        let pubsub_client = match pubsub_url {
            Some(pubsub_url) => Some(PubsubClient::new(pubsub_url).await?),
            None => None,
        };
        Ok(Self {
            chain,
            keypairs: keypairs.into_iter().map(Arc::new).collect(),
            rpc_client: Arc::new(rpc_client),
            pubsub_client: pubsub_client.map(Arc::new),
        })
    }

    /// Returns a cloned reference to the RPC client.
    pub fn rpc_client(&self) -> Arc<RpcClient> {
        Arc::clone(&self.rpc_client)
    }

    fn keypair(&self, address: &Address) -> Option<&Keypair> {
        self.keypairs
            .iter()
            .find(|k| *address == k.pubkey())
            .map(|k| k.as_ref())
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        commitment_config: CommitmentConfig,
    ) -> Result<Option<()>, SolanaChainProviderError> {
        let status = self
            .rpc_client
            .get_signature_status_with_commitment(signature, commitment_config)
            .await?;
        match status {
            None => Ok(None),
            Some(Ok(())) => Ok(Some(())),
            Some(Err(e)) => Err(SolanaChainProviderError::InvalidTransaction(e.into())),
        }
    }
}

#[async_trait::async_trait]
impl FromConfig<SolanaChainConfig> for SolanaChainProvider {
    async fn from_config(config: &SolanaChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if config.signers().is_empty() {
            return Err("Solana chain config needs at least one signer".into());
        }
        let keypairs = config
            .signers()
            .iter()
            .map(|signer| {
                Keypair::try_from(signer.as_bytes().as_slice())
                    .map_err(|e| format!("Invalid Solana keypair: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rpc_url = config.rpc().to_string();
        let pubsub_url = config.pubsub().map(|url| url.to_string());
        let provider =
            Self::new(keypairs, rpc_url, pubsub_url, config.chain_reference()).await?;
        Ok(provider)
    }
}

impl ChainProviderOps for SolanaChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        self.fee_payers().iter().map(|a| a.to_string()).collect()
    }

    fn chain_id(&self) -> ChainId {
        self.chain.into()
    }
}

/// Signing and RPC capabilities the "exact" scheme needs from a Solana network.
///
/// A provider is bound to one network. Verification and settlement never talk to the
/// chain except through this trait.
pub trait SolanaChainProviderLike {
    /// Addresses of the fee payer keypairs the provider controls.
    fn fee_payers(&self) -> Vec<Address>;

    /// Co-signs a transaction with the keypair of `fee_payer`.
    fn sign(
        &self,
        tx: VersionedTransaction,
        fee_payer: &Address,
    ) -> Result<VersionedTransaction, SolanaChainProviderError>;

    /// Simulates the transaction. Any execution error is a failure.
    fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send;

    /// Submits a signed transaction without waiting for confirmation.
    fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, SolanaChainProviderError>> + Send;

    /// Waits until the transaction reaches `commitment_config`.
    ///
    /// Fails if the transaction executed with an error. Does not time out on its own.
    fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment_config: CommitmentConfig,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send;
}

impl SolanaChainProviderLike for SolanaChainProvider {
    fn fee_payers(&self) -> Vec<Address> {
        self.keypairs
            .iter()
            .map(|k| Address::new(k.pubkey()))
            .collect()
    }

    fn sign(
        &self,
        tx: VersionedTransaction,
        fee_payer: &Address,
    ) -> Result<VersionedTransaction, SolanaChainProviderError> {
        let keypair = self
            .keypair(fee_payer)
            .ok_or(SolanaChainProviderError::UnknownSigner(*fee_payer))?;
        sign_transaction(tx, keypair)
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<(), SolanaChainProviderError> {
        let cfg = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(CommitmentConfig::confirmed()),
            encoding: None,
            accounts: None,
            inner_instructions: false,
            min_context_slot: None,
        };
        let sim = self
            .rpc_client
            .simulate_transaction_with_config(tx, cfg)
            .await?;
        match sim.value.err {
            None => Ok(()),
            Some(e) => Err(SolanaChainProviderError::InvalidTransaction(e)),
        }
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, SolanaChainProviderError> {
        let signature = self
            .rpc_client
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await?;
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment_config: CommitmentConfig,
    ) -> Result<(), SolanaChainProviderError> {
        if let Some(pubsub_client) = self.pubsub_client.as_ref() {
            let config = RpcSignatureSubscribeConfig {
                commitment: Some(commitment_config),
                enable_received_notification: None,
            };
            let (mut stream, unsubscribe) = pubsub_client
                .signature_subscribe(signature, Some(config))
                .await?;
            // Subscribed after submission: the transaction may already be confirmed.
            match self.signature_status(signature, commitment_config).await {
                Ok(Some(())) => {
                    unsubscribe().await;
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => {
                    unsubscribe().await;
                    return Err(e);
                }
            }
            let response = stream.next().await;
            unsubscribe().await;
            match response {
                Some(response) => {
                    let error = match response.value {
                        RpcSignatureResult::ProcessedSignature(r) => r.err,
                        _ => None,
                    };
                    match error {
                        None => Ok(()),
                        Some(error) => Err(SolanaChainProviderError::InvalidTransaction(error)),
                    }
                }
                None => Err(SolanaChainProviderError::Transport(Box::new(
                    ClientErrorKind::Custom(
                        "Can not get response from signatureSubscribe".to_string(),
                    ),
                ))),
            }
        } else {
            loop {
                if self
                    .signature_status(signature, commitment_config)
                    .await?
                    .is_some()
                {
                    return Ok(());
                }
                tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
            }
        }
    }
}

impl<T: SolanaChainProviderLike + Send + Sync> SolanaChainProviderLike for Arc<T> {
    fn fee_payers(&self) -> Vec<Address> {
        (**self).fee_payers()
    }

    fn sign(
        &self,
        tx: VersionedTransaction,
        fee_payer: &Address,
    ) -> Result<VersionedTransaction, SolanaChainProviderError> {
        (**self).sign(tx, fee_payer)
    }

    fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send {
        (**self).simulate_transaction(tx)
    }

    fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, SolanaChainProviderError>> + Send {
        (**self).send_transaction(tx)
    }

    fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment_config: CommitmentConfig,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send {
        (**self).confirm_transaction(signature, commitment_config)
    }
}
