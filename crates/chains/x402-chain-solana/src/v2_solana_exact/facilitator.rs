//! Verification and settlement of V2 Solana "exact" payments.
//!
//! The client sends a transaction that it has already signed as transfer authority,
//! with one of the facilitator's addresses as fee payer. The facilitator checks it
//! gate by gate and only then adds its own signature:
//!
//! 1. scheme and network match the facilitator
//! 2. `extra.feePayer` names an address the facilitator controls
//! 3. the transaction decodes and its instructions resolve
//! 4. the instruction layout passes the [`VerificationPolicy`]
//! 5. the transfer pays the requirement
//! 6. the co-signed transaction simulates without error
//!
//! Settlement re-runs verification, co-signs again, submits, and waits for confirmation
//! under a deadline.

use rand::seq::IndexedRandom;
use solana_commitment_config::CommitmentConfig;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use x402_types::chain::{ChainId, ChainProviderOps};
use x402_types::proto;
use x402_types::proto::util::U64String;
use x402_types::proto::v2;
use x402_types::scheme::{
    X402SchemeFacilitator, X402SchemeFacilitatorBuilder, X402SchemeFacilitatorError,
};

#[cfg(feature = "telemetry")]
use tracing::instrument;
#[cfg(feature = "telemetry")]
use tracing_core::Level;

use crate::V2SolanaExact;
use crate::chain::{Address, SolanaChainProviderLike};
use crate::v2_solana_exact::error::{RequirementField, SettlementError, SolanaExactError};
use crate::v2_solana_exact::instruction::{
    decode_transaction, decompile_instructions, resolve_payer,
};
use crate::v2_solana_exact::policy::{
    MIN_INSTRUCTION_COUNT, V2SolanaExactFacilitatorConfig, VerificationPolicy,
    validate_instructions,
};
use crate::v2_solana_exact::transfer::{TransferRequirement, verify_transfer_instruction};
use crate::v2_solana_exact::types::{self, ExactScheme, SupportedPaymentKindExtra};
use crate::v2_solana_exact::verifier::CustomVerifierRule;

impl<P> X402SchemeFacilitatorBuilder<P> for V2SolanaExact
where
    P: SolanaChainProviderLike + ChainProviderOps + Send + Sync + 'static,
{
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn X402SchemeFacilitator>, Box<dyn std::error::Error>> {
        let config = config
            .map(serde_json::from_value::<V2SolanaExactFacilitatorConfig>)
            .transpose()?
            .unwrap_or_default();
        Ok(Box::new(V2SolanaExactFacilitator::new(provider, config)))
    }
}

/// Builds a facilitator with custom verifier rules in addition to the configured ones.
///
/// ```ignore
/// let facilitator = V2SolanaExactFacilitatorBuilder::new(config)
///     .with_rule(CustomVerifierRule::new([MEMO_PROGRAM_PUBKEY]).at_positions([3]))
///     .build(provider);
/// ```
#[derive(Debug, Clone, Default)]
pub struct V2SolanaExactFacilitatorBuilder {
    config: V2SolanaExactFacilitatorConfig,
    custom_rules: Vec<CustomVerifierRule>,
}

impl V2SolanaExactFacilitatorBuilder {
    pub fn new(config: V2SolanaExactFacilitatorConfig) -> Self {
        Self {
            config,
            custom_rules: Vec::new(),
        }
    }

    /// Adds a rule. Rules added here are consulted before the configured built-in ones,
    /// in the order they are added.
    pub fn with_rule(mut self, rule: CustomVerifierRule) -> Self {
        self.custom_rules.push(rule);
        self
    }

    pub fn build<P>(self, provider: P) -> V2SolanaExactFacilitator<P> {
        V2SolanaExactFacilitator {
            provider,
            policy: VerificationPolicy::from_config(&self.config, self.custom_rules),
            settlement_timeout: Duration::from_secs(self.config.settlement_timeout_seconds),
        }
    }
}

/// A payment that passed every verification gate.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    /// Authority of the transfer.
    pub payer: Address,
    /// Facilitator address paying the transaction fees.
    pub fee_payer: Address,
    /// The transaction as the client signed it, without the fee payer signature.
    pub transaction: VersionedTransaction,
}

/// A payment that failed verification, with the payer if it was resolved before the failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct VerificationFailure {
    pub error: SolanaExactError,
    pub payer: Option<Address>,
}

impl VerificationFailure {
    fn new(error: SolanaExactError) -> Self {
        Self { error, payer: None }
    }

    fn with_payer(payer: Address) -> impl FnOnce(SolanaExactError) -> Self {
        move |error| Self {
            error,
            payer: Some(payer),
        }
    }
}

impl From<SolanaExactError> for VerificationFailure {
    fn from(error: SolanaExactError) -> Self {
        Self::new(error)
    }
}

impl From<VerificationFailure> for v2::VerifyResponse {
    fn from(failure: VerificationFailure) -> Self {
        v2::VerifyResponse::invalid(
            failure.payer.map(|payer| payer.to_string()),
            failure.error.reason(),
            Some(failure.error.to_string()),
        )
    }
}

pub struct V2SolanaExactFacilitator<P> {
    provider: P,
    policy: VerificationPolicy,
    settlement_timeout: Duration,
}

impl<P> V2SolanaExactFacilitator<P> {
    pub fn new(provider: P, config: V2SolanaExactFacilitatorConfig) -> Self {
        V2SolanaExactFacilitatorBuilder::new(config).build(provider)
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }
}

impl<P> V2SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProviderOps + Send + Sync,
{
    /// Fee payer addresses the facilitator controls on `network`. Empty for other networks.
    pub fn get_signers(&self, network: &ChainId) -> Vec<Address> {
        if *network == self.provider.chain_id() {
            self.provider.fee_payers()
        } else {
            Vec::new()
        }
    }

    /// The `extra` a payment on `network` should carry: one controlled fee payer, picked at random.
    pub fn get_extra(&self, network: &ChainId) -> Option<SupportedPaymentKindExtra> {
        let signers = self.get_signers(network);
        let fee_payer = signers.choose(&mut rand::rng()).copied()?;
        Some(SupportedPaymentKindExtra { fee_payer })
    }

    /// Runs every verification gate in order. The first failing gate ends verification.
    #[cfg_attr(feature = "telemetry", instrument(name = "x402.solana_exact.verify", skip_all, err))]
    pub async fn verify_payment(
        &self,
        request: &types::VerifyRequest,
    ) -> Result<VerifiedPayment, VerificationFailure> {
        let payload = &request.payment_payload;
        let accepted = &payload.accepted;
        let requirements = &request.payment_requirements;

        let scheme = ExactScheme::VALUE;
        for candidate in [&accepted.scheme, &requirements.scheme] {
            if candidate != scheme {
                return Err(SolanaExactError::UnsupportedScheme(candidate.clone()).into());
            }
        }

        if accepted.network != requirements.network {
            return Err(SolanaExactError::NetworkMismatch(format!(
                "accepted {} but requirements target {}",
                accepted.network, requirements.network
            ))
            .into());
        }
        let network = ChainId::from_str(&requirements.network)
            .map_err(|e| SolanaExactError::NetworkMismatch(e.to_string()))?;
        let chain_id = self.provider.chain_id();
        if network != chain_id {
            return Err(SolanaExactError::NetworkMismatch(format!(
                "requirements target {} but facilitator serves {}",
                network, chain_id
            ))
            .into());
        }

        let fee_payer = requirements
            .extra
            .as_ref()
            .and_then(|extra| extra.get("feePayer"))
            .and_then(|fee_payer| fee_payer.as_str())
            .and_then(|fee_payer| Address::from_str(fee_payer).ok())
            .ok_or(SolanaExactError::MissingFeePayer)?;
        let signer_addresses = self.provider.fee_payers();
        if !signer_addresses.contains(&fee_payer) {
            return Err(SolanaExactError::FeePayerNotManaged(fee_payer).into());
        }

        let transaction = decode_transaction(&payload.payload.transaction)?;
        let instructions = decompile_instructions(&transaction)?;
        // Too few instructions is reported as such whatever they contain.
        let payer = match resolve_payer(&instructions) {
            Some(payer) => payer,
            None if instructions.len() < MIN_INSTRUCTION_COUNT => {
                return Err(SolanaExactError::TooFewInstructions(instructions.len()).into());
            }
            None => return Err(SolanaExactError::NoTransferInstruction.into()),
        };
        let failed = VerificationFailure::with_payer;

        let transfer_index = validate_instructions(
            &self.policy,
            &instructions,
            &signer_addresses,
            &fee_payer,
        )
        .await
        .map_err(failed(payer))?;

        let (pay_to, asset, amount) = transfer_terms(requirements).map_err(failed(payer))?;
        let requirement = TransferRequirement {
            pay_to: &pay_to,
            asset: &asset,
            amount,
        };
        let _transfer = verify_transfer_instruction(
            &instructions[transfer_index],
            &requirement,
            &signer_addresses,
        )
        .map_err(failed(payer))?;

        let cosigned = self
            .cosign_for_simulation(transaction.clone(), &fee_payer)
            .map_err(failed(payer))?;
        self.provider
            .simulate_transaction(&cosigned)
            .await
            .map_err(|e| {
                #[cfg(feature = "telemetry")]
                tracing::warn!(payer = %payer, error = %e, "Payment simulation failed");
                failed(payer)(SolanaExactError::Simulation(e))
            })?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            payer = %payer,
            fee_payer = %fee_payer,
            amount = _transfer.amount,
            "Payment verified"
        );
        Ok(VerifiedPayment {
            payer,
            fee_payer,
            transaction,
        })
    }

    /// Verifies, then co-signs, submits and confirms the payment.
    pub async fn settle_payment(&self, request: &types::SettleRequest) -> v2::SettleResponse {
        let network = request.payment_requirements.network.clone();
        let verified = match self.verify_payment(request).await {
            Ok(verified) => verified,
            Err(failure) => {
                return v2::SettleResponse::Error {
                    reason: failure.error.reason(),
                    message: Some(failure.error.to_string()),
                    payer: failure.payer.map(|p| p.to_string()).unwrap_or_default(),
                    network,
                };
            }
        };
        let payer = verified.payer.to_string();
        match self.settle_verified(verified).await {
            Ok(signature) => v2::SettleResponse::Success {
                payer,
                transaction: signature.to_string(),
                network,
            },
            Err(error) => v2::SettleResponse::Error {
                reason: error.reason(),
                message: Some(error.to_string()),
                payer,
                network,
            },
        }
    }

    /// Submits a verified payment. Submission and confirmation share one deadline.
    #[cfg_attr(feature = "telemetry", instrument(name = "x402.solana_exact.settle", skip_all, err))]
    pub async fn settle_verified(
        &self,
        verified: VerifiedPayment,
    ) -> Result<Signature, SettlementError> {
        let tx = self.cosign_for_submission(verified.transaction, &verified.fee_payer)?;
        if !is_fully_signed(&tx) {
            #[cfg(feature = "telemetry")]
            tracing::event!(Level::WARN, status = "failed", payer = %verified.payer, "undersigned transaction");
            return Err(SettlementError::Undersigned);
        }
        let deadline = Instant::now() + self.settlement_timeout;
        let signature = tokio::time::timeout_at(deadline, self.provider.send_transaction(&tx))
            .await
            .map_err(|_| SettlementError::DeadlineExceeded(self.settlement_timeout))?
            .map_err(SettlementError::Submission)?;
        #[cfg(feature = "telemetry")]
        tracing::info!(signature = %signature, payer = %verified.payer, "Transaction submitted");
        tokio::time::timeout_at(
            deadline,
            self.provider
                .confirm_transaction(&signature, CommitmentConfig::confirmed()),
        )
        .await
        .map_err(|_| SettlementError::DeadlineExceeded(self.settlement_timeout))?
        .map_err(SettlementError::Confirmation)?;
        #[cfg(feature = "telemetry")]
        tracing::info!(signature = %signature, "Transaction confirmed");
        Ok(signature)
    }

    /// Adds the fee payer signature so the transaction can be simulated.
    ///
    /// The signed copy is discarded after simulation; [`Self::cosign_for_submission`] signs
    /// again at settlement. Both sign the client's message unchanged, blockhash included,
    /// so the two signatures are identical.
    fn cosign_for_simulation(
        &self,
        tx: VersionedTransaction,
        fee_payer: &Address,
    ) -> Result<VersionedTransaction, SolanaExactError> {
        self.provider
            .sign(tx, fee_payer)
            .map_err(SolanaExactError::Simulation)
    }

    /// Adds the fee payer signature for submission.
    fn cosign_for_submission(
        &self,
        tx: VersionedTransaction,
        fee_payer: &Address,
    ) -> Result<VersionedTransaction, SettlementError> {
        self.provider
            .sign(tx, fee_payer)
            .map_err(SettlementError::Signing)
    }
}

/// Parses the requirement fields the transfer is checked against.
fn transfer_terms(
    requirements: &types::PaymentRequirements,
) -> Result<(Address, Address, u64), SolanaExactError> {
    let invalid = |field, value: &String| SolanaExactError::InvalidRequirement {
        field,
        value: value.clone(),
    };
    let pay_to = Address::from_str(&requirements.pay_to)
        .map_err(|_| invalid(RequirementField::PayTo, &requirements.pay_to))?;
    let asset = Address::from_str(&requirements.asset)
        .map_err(|_| invalid(RequirementField::Asset, &requirements.asset))?;
    let amount = U64String::from_str(&requirements.amount)
        .map_err(|_| invalid(RequirementField::Amount, &requirements.amount))?;
    Ok((pay_to, asset, amount.inner()))
}

/// Every required signature slot holds a non-default signature.
fn is_fully_signed(tx: &VersionedTransaction) -> bool {
    let num_required = tx.message.header().num_required_signatures as usize;
    tx.signatures.len() >= num_required
        && tx
            .signatures
            .iter()
            .take(num_required)
            .all(|signature| *signature != Signature::default())
}

#[async_trait::async_trait]
impl<P> X402SchemeFacilitator for V2SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProviderOps + Send + Sync,
{
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<proto::VerifyResponse, X402SchemeFacilitatorError> {
        let request = types::VerifyRequest::from_proto(request.clone())?;
        let response = match self.verify_payment(&request).await {
            Ok(verified) => v2::VerifyResponse::valid(verified.payer.to_string()),
            Err(failure) => failure.into(),
        };
        Ok(response.into())
    }

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<proto::SettleResponse, X402SchemeFacilitatorError> {
        let request = types::SettleRequest::from_proto(request.clone())?;
        Ok(self.settle_payment(&request).await.into())
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError> {
        let chain_id = self.provider.chain_id();
        let kinds: Vec<proto::SupportedPaymentKind> = self
            .get_extra(&chain_id)
            .map(|extra| proto::SupportedPaymentKind {
                x402_version: v2::X402Version2.into(),
                scheme: ExactScheme.to_string(),
                network: chain_id.to_string(),
                extra: Some(
                    serde_json::to_value(extra).expect("SupportedPaymentKindExtra serialization"),
                ),
            })
            .into_iter()
            .collect();
        let signers = {
            let mut signers = HashMap::with_capacity(1);
            let addresses = self
                .get_signers(&chain_id)
                .iter()
                .map(|address| address.to_string())
                .collect();
            signers.insert(chain_id, addresses);
            signers
        };
        Ok(proto::SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SolanaChainReference;
    use crate::networks::KnownNetworkSolana;
    use crate::v2_solana_exact::error::ErrorKind;
    use crate::v2_solana_exact::test_util::{MockProvider, PaymentFixture, devnet};
    use crate::v2_solana_exact::transfer::associated_token_address;
    use crate::v2_solana_exact::types::{MAX_COMPUTE_UNIT_PRICE_MICROLAMPORTS, MEMO_PROGRAM_PUBKEY};
    use crate::v2_solana_exact::verifier::InstructionVerifierError;
    use serde_json::json;
    use solana_client::rpc_response::TransactionError;
    use solana_compute_budget_interface::ComputeBudgetInstruction;
    use solana_keypair::Keypair;
    use solana_pubkey::Pubkey;
    use solana_signer::Signer;
    use std::sync::Arc;

    fn facilitator(fixture: &PaymentFixture) -> V2SolanaExactFacilitator<Arc<MockProvider>> {
        V2SolanaExactFacilitator::new(
            Arc::new(MockProvider::for_fixture(fixture)),
            V2SolanaExactFacilitatorConfig::default(),
        )
    }

    async fn verify(
        facilitator: &V2SolanaExactFacilitator<Arc<MockProvider>>,
        request: proto::VerifyRequest,
    ) -> v2::VerifyResponse {
        let response = facilitator.verify(&request).await.unwrap();
        v2::VerifyResponse::try_from(response).unwrap()
    }

    async fn settle(
        facilitator: &V2SolanaExactFacilitator<Arc<MockProvider>>,
        request: proto::SettleRequest,
    ) -> v2::SettleResponse {
        let response = facilitator.settle(&request).await.unwrap();
        v2::SettleResponse::try_from(response).unwrap()
    }

    fn client_payer(fixture: &PaymentFixture) -> String {
        fixture.client.pubkey().to_string()
    }

    #[tokio::test]
    async fn test_valid_payment() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let response = verify(&facilitator, fixture.request(fixture.transaction())).await;
        assert_eq!(response, v2::VerifyResponse::valid(client_payer(&fixture)));
    }

    #[tokio::test]
    async fn test_valid_token_2022_payment() {
        let fixture = PaymentFixture::new_token_2022();
        let facilitator = facilitator(&fixture);
        let response = verify(&facilitator, fixture.request(fixture.transaction())).await;
        assert!(response.is_valid());
    }

    #[tokio::test]
    async fn test_unlisted_additional_instruction_is_rejected() {
        let fixture = PaymentFixture::new();
        let provider = Arc::new(MockProvider::for_fixture(&fixture));
        let facilitator = V2SolanaExact
            .build(provider, Some(json!({ "maxInstructionCount": 4 })))
            .unwrap();
        let mut instructions = fixture.instructions();
        instructions.push(fixture.memo(b"hello"));
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = facilitator.verify(&request).await.unwrap();
        let response = v2::VerifyResponse::try_from(response).unwrap();
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_additional_instructions_not_allowed")
        );
        assert_eq!(response.payer(), client_payer(&fixture));
    }

    #[tokio::test]
    async fn test_additional_instruction_with_all_defaults_exceeds_max() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut instructions = fixture.instructions();
        instructions.push(fixture.memo(b"hello"));
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_transaction_instructions_length_exceeds_max_3")
        );
    }

    #[tokio::test]
    async fn test_compute_price_over_ceiling() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut instructions = fixture.instructions();
        instructions[1] = ComputeBudgetInstruction::set_compute_unit_price(
            MAX_COMPUTE_UNIT_PRICE_MICROLAMPORTS * 2,
        );
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some(
                "invalid_exact_svm_payload_transaction_instructions_compute_price_instruction_too_high"
            )
        );
    }

    #[tokio::test]
    async fn test_destination_for_wrong_owner() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut instructions = fixture.instructions();
        instructions[2] = fixture.transfer_to(
            associated_token_address(&Pubkey::new_unique(), &fixture.mint, &spl_token::ID),
            fixture.mint,
            fixture.amount,
        );
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_recipient_mismatch")
        );
        assert_eq!(response.payer(), client_payer(&fixture));
    }

    #[tokio::test]
    async fn test_amount_insufficient() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut instructions = fixture.instructions();
        instructions[2] = fixture.transfer(fixture.amount - 1);
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_amount_insufficient")
        );
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut requirements = fixture.requirements();
        requirements["scheme"] = json!("upto");
        let request = fixture.request_for(fixture.transaction(), requirements);
        let response = verify(&facilitator, request).await;
        assert_eq!(response.reason(), Some("unsupported_scheme"));
        assert_eq!(response.payer(), "");
    }

    #[tokio::test]
    async fn test_accepted_network_differs_from_requirements() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut request = fixture.request(fixture.transaction()).into_json();
        let mainnet: ChainId = SolanaChainReference::solana().into();
        request["paymentPayload"]["accepted"]["network"] = json!(mainnet.to_string());
        let response = verify(&facilitator, request.into()).await;
        assert_eq!(response.reason(), Some("network_mismatch"));
    }

    #[tokio::test]
    async fn test_requirements_for_another_network() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut requirements = fixture.requirements();
        let mainnet: ChainId = SolanaChainReference::solana().into();
        requirements["network"] = json!(mainnet.to_string());
        let request = fixture.request_for(fixture.transaction(), requirements);
        let response = verify(&facilitator, request).await;
        assert_eq!(response.reason(), Some("network_mismatch"));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_fee_payer() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let extras = [
            json!(null),
            json!({}),
            json!({ "feePayer": 42 }),
            json!({ "feePayer": "not-an-address" }),
        ];
        for extra in extras {
            let mut requirements = fixture.requirements();
            requirements["extra"] = extra;
            let request = fixture.request_for(fixture.transaction(), requirements);
            let response = verify(&facilitator, request).await;
            assert_eq!(
                response.reason(),
                Some("invalid_exact_svm_payload_missing_fee_payer")
            );
        }
    }

    #[tokio::test]
    async fn test_fee_payer_not_managed() {
        let fixture = PaymentFixture::new();
        let facilitator = V2SolanaExactFacilitator::new(
            Arc::new(MockProvider::new(vec![Keypair::new()])),
            V2SolanaExactFacilitatorConfig::default(),
        );
        let response = verify(&facilitator, fixture.request(fixture.transaction())).await;
        assert_eq!(
            response.reason(),
            Some("fee_payer_not_managed_by_facilitator")
        );
    }

    #[tokio::test]
    async fn test_undecodable_transaction() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut request = fixture.request(fixture.transaction()).into_json();
        request["paymentPayload"]["payload"]["transaction"] = json!("AQID");
        let response = verify(&facilitator, request.into()).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_transaction_could_not_be_decoded")
        );
    }

    #[tokio::test]
    async fn test_transaction_without_token_instruction() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut instructions = fixture.instructions();
        instructions[2] = fixture.memo(b"no transfer");
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_no_transfer_instruction")
        );
        assert_eq!(response.payer(), "");
    }

    #[tokio::test]
    async fn test_too_few_instructions_whatever_they_contain() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let mut instructions = fixture.instructions();
        instructions.truncate(2);
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_transaction_instructions_length_too_few")
        );
        assert_eq!(response.payer(), "");

        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            fixture.transfer(fixture.amount),
        ];
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_transaction_instructions_length_too_few")
        );
        assert_eq!(response.payer(), fixture.client.pubkey().to_string());
    }

    #[tokio::test]
    async fn test_unparsable_requirement_fields_are_verdicts() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let cases = [
            ("payTo", "not-an-address", "invalid_exact_svm_payload_recipient_mismatch"),
            ("asset", "0xdeadbeef", "invalid_exact_svm_payload_mint_mismatch"),
            ("amount", "1.5", "invalid_exact_svm_payload_amount_insufficient"),
        ];
        for (field, value, reason) in cases {
            let mut requirements = fixture.requirements();
            requirements[field] = json!(value);
            let request = fixture.request_for(fixture.transaction(), requirements);
            let response = verify(&facilitator, request).await;
            assert_eq!(response.reason(), Some(reason), "{field}");
            assert_eq!(response.payer(), fixture.client.pubkey().to_string());
        }

        let mut requirements = fixture.requirements();
        requirements["network"] = json!("solana");
        let request = fixture.request_for(fixture.transaction(), requirements);
        let response = verify(&facilitator, request).await;
        assert_eq!(response.reason(), Some("network_mismatch"));
    }

    #[tokio::test]
    async fn test_simulation_failure_keeps_payer() {
        let fixture = PaymentFixture::new();
        let mut provider = MockProvider::for_fixture(&fixture);
        provider.simulation_error = Some(TransactionError::InsufficientFundsForFee);
        let facilitator = V2SolanaExactFacilitator::new(
            Arc::new(provider),
            V2SolanaExactFacilitatorConfig::default(),
        );
        let request =
            types::VerifyRequest::from_proto(fixture.request(fixture.transaction())).unwrap();
        let failure = facilitator.verify_payment(&request).await.unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::InfrastructureFailure);
        assert_eq!(failure.payer, Some(Address::new(fixture.client.pubkey())));
        let response: v2::VerifyResponse = failure.into();
        assert!(
            response
                .reason()
                .unwrap()
                .starts_with("transaction_simulation_failed: ")
        );
        assert_eq!(response.payer(), client_payer(&fixture));
    }

    #[tokio::test]
    async fn test_custom_rule_from_builder() {
        let fixture = PaymentFixture::new();
        let config = V2SolanaExactFacilitatorConfig {
            max_instruction_count: 4,
            allow_additional_instructions: true,
            allowed_program_ids: vec![Address::new(Pubkey::new_unique())],
            ..V2SolanaExactFacilitatorConfig::default()
        };
        let facilitator = V2SolanaExactFacilitatorBuilder::new(config)
            .with_rule(
                CustomVerifierRule::new([MEMO_PROGRAM_PUBKEY]).with_verifier_fn(
                    |instruction, _context| {
                        if instruction.data.len() > 8 {
                            return Err(InstructionVerifierError::new("memo_too_long"));
                        }
                        Ok(())
                    },
                ),
            )
            .build(Arc::new(MockProvider::for_fixture(&fixture)));

        let mut instructions = fixture.instructions();
        instructions.push(fixture.memo(b"short"));
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert!(response.is_valid());

        let mut instructions = fixture.instructions();
        instructions.push(fixture.memo(b"far too long for this rule"));
        let request = fixture.request(fixture.transaction_with(instructions));
        let response = verify(&facilitator, request).await;
        assert_eq!(response.reason(), Some("memo_too_long"));
    }

    #[tokio::test]
    async fn test_builtin_memo_verifier_from_config() {
        let fixture = PaymentFixture::new();
        let provider = Arc::new(MockProvider::for_fixture(&fixture));
        let facilitator = V2SolanaExact
            .build(
                provider,
                Some(json!({
                    "maxInstructionCount": 4,
                    "allowAdditionalInstructions": true,
                    "allowedProgramIds": [Pubkey::new_unique().to_string()],
                    "builtinVerifiers": ["memo"]
                })),
            )
            .unwrap();
        let mut instructions = fixture.instructions();
        instructions.push(fixture.memo(&[0xff, 0x00, 0xfe]));
        let response = facilitator
            .verify(&fixture.request(fixture.transaction_with(instructions)))
            .await
            .unwrap();
        let response = v2::VerifyResponse::try_from(response).unwrap();
        assert_eq!(
            response.reason(),
            Some("invalid_exact_svm_payload_memo_invalid_utf8")
        );
    }

    #[tokio::test]
    async fn test_malformed_request_is_an_error() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let request: proto::VerifyRequest =
            json!({ "x402Version": 2, "paymentPayload": {} }).into();
        let result = facilitator.verify(&request).await;
        assert!(matches!(
            result,
            Err(X402SchemeFacilitatorError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let fixture = PaymentFixture::new();
        let result = V2SolanaExact.build(
            Arc::new(MockProvider::for_fixture(&fixture)),
            Some(json!({ "maxInstructionCount": "many" })),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_settle_success() {
        let fixture = PaymentFixture::new();
        let provider = Arc::new(MockProvider::for_fixture(&fixture));
        let facilitator = V2SolanaExactFacilitator::new(
            Arc::clone(&provider),
            V2SolanaExactFacilitatorConfig::default(),
        );
        let response = settle(&facilitator, fixture.request(fixture.transaction())).await;
        assert!(response.is_success());
        assert_eq!(provider.submitted_count(), 1);
        let submitted = provider.submitted.lock().unwrap()[0].clone();
        assert!(is_fully_signed(&submitted));
        match response {
            v2::SettleResponse::Success {
                payer,
                transaction,
                network,
            } => {
                assert_eq!(payer, client_payer(&fixture));
                assert_eq!(transaction, submitted.signatures[0].to_string());
                assert_eq!(network, devnet().to_string());
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_settle_after_failed_verification_does_not_submit() {
        let fixture = PaymentFixture::new();
        let provider = Arc::new(MockProvider::for_fixture(&fixture));
        let facilitator = V2SolanaExactFacilitator::new(
            Arc::clone(&provider),
            V2SolanaExactFacilitatorConfig::default(),
        );
        let mut instructions = fixture.instructions();
        instructions[2] = fixture.transfer(1);
        let request = fixture.request(fixture.transaction_with(instructions));
        let verify_response = verify(&facilitator, request.clone()).await;
        let settle_response = settle(&facilitator, request).await;
        assert_eq!(settle_response.reason(), verify_response.reason());
        assert_eq!(provider.submitted_count(), 0);
        match settle_response {
            v2::SettleResponse::Error { payer, network, .. } => {
                assert_eq!(payer, client_payer(&fixture));
                assert_eq!(network, devnet().to_string());
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_settle_reports_confirmation_failure() {
        let fixture = PaymentFixture::new();
        let mut provider = MockProvider::for_fixture(&fixture);
        provider.confirmation_error = Some(TransactionError::AccountNotFound);
        let facilitator = V2SolanaExactFacilitator::new(
            Arc::new(provider),
            V2SolanaExactFacilitatorConfig::default(),
        );
        let response = settle(&facilitator, fixture.request(fixture.transaction())).await;
        assert_eq!(response.reason(), Some("transaction_failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_deadline() {
        let fixture = PaymentFixture::new();
        let mut provider = MockProvider::for_fixture(&fixture);
        provider.confirm_delay = Duration::from_secs(120);
        let provider = Arc::new(provider);
        let config = V2SolanaExactFacilitatorConfig {
            settlement_timeout_seconds: 5,
            ..V2SolanaExactFacilitatorConfig::default()
        };
        let facilitator = V2SolanaExactFacilitator::new(Arc::clone(&provider), config);
        let request =
            types::SettleRequest::from_proto(fixture.request(fixture.transaction())).unwrap();
        let verified = facilitator.verify_payment(&request).await.unwrap();
        let err = facilitator.settle_verified(verified).await.unwrap_err();
        assert!(matches!(err, SettlementError::DeadlineExceeded(d) if d == Duration::from_secs(5)));
        assert_eq!(err.reason(), "transaction_failed");
        assert_eq!(provider.submitted_count(), 1);
    }

    #[test]
    fn test_is_fully_signed() {
        let fixture = PaymentFixture::new();
        let tx = fixture.transaction();
        assert!(!is_fully_signed(&tx));
        let provider = MockProvider::for_fixture(&fixture);
        let tx = provider.sign(tx, &fixture.fee_payer_address()).unwrap();
        assert!(is_fully_signed(&tx));
    }

    #[tokio::test]
    async fn test_random_fee_payer_stays_within_signers() {
        let keypairs: Vec<Keypair> = (0..4).map(|_| Keypair::new()).collect();
        let expected: Vec<Address> = keypairs
            .iter()
            .map(|k| Address::new(k.pubkey()))
            .collect();
        let facilitator = V2SolanaExactFacilitator::new(
            Arc::new(MockProvider::new(keypairs)),
            V2SolanaExactFacilitatorConfig::default(),
        );
        assert_eq!(facilitator.get_signers(&devnet()), expected);
        for _ in 0..32 {
            let extra = facilitator.get_extra(&devnet()).unwrap();
            assert!(expected.contains(&extra.fee_payer));
        }
        let mainnet: ChainId = SolanaChainReference::solana().into();
        assert!(facilitator.get_signers(&mainnet).is_empty());
        assert!(facilitator.get_extra(&mainnet).is_none());
    }

    #[tokio::test]
    async fn test_supported() {
        let fixture = PaymentFixture::new();
        let facilitator = facilitator(&fixture);
        let supported = facilitator.supported().await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
        let kind = &supported.kinds[0];
        assert_eq!(kind.x402_version, 2);
        assert_eq!(kind.scheme, "exact");
        assert_eq!(kind.network, devnet().to_string());
        assert_eq!(
            kind.extra,
            Some(json!({ "feePayer": fixture.fee_payer.pubkey().to_string() }))
        );
        assert_eq!(
            supported.signers.get(&devnet()),
            Some(&vec![fixture.fee_payer.pubkey().to_string()])
        );
    }
}
