//! Payment transactions and a scripted provider for unit tests.

use serde_json::json;
use solana_client::rpc_response::{TransactionError, UiTransactionError};
use solana_commitment_config::CommitmentConfig;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_keypair::Keypair;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use std::sync::Mutex;
use std::time::Duration;
use x402_types::chain::{ChainId, ChainProviderOps};
use x402_types::proto;
use x402_types::util::Base64Bytes;

use crate::chain::{
    Address, SolanaChainProviderError, SolanaChainProviderLike, SolanaChainReference,
    sign_transaction,
};
use crate::networks::KnownNetworkSolana;
use crate::v2_solana_exact::transfer::associated_token_address;
use crate::v2_solana_exact::types::MEMO_PROGRAM_PUBKEY;

/// A client paying `amount` of `mint` to `pay_to`, with `fee_payer` sponsoring fees.
pub struct PaymentFixture {
    pub fee_payer: Keypair,
    pub client: Keypair,
    pub mint: Pubkey,
    pub pay_to: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    pub token_program: Pubkey,
}

impl PaymentFixture {
    pub fn new() -> Self {
        Self::with_token_program(spl_token::ID)
    }

    pub fn new_token_2022() -> Self {
        Self::with_token_program(spl_token_2022::ID)
    }

    fn with_token_program(token_program: Pubkey) -> Self {
        Self {
            fee_payer: Keypair::new(),
            client: Keypair::new(),
            mint: Pubkey::new_unique(),
            pay_to: Pubkey::new_unique(),
            amount: 1_000_000,
            decimals: 6,
            token_program,
        }
    }

    pub fn fee_payer_address(&self) -> Address {
        Address::new(self.fee_payer.pubkey())
    }

    pub fn source(&self) -> Pubkey {
        associated_token_address(&self.client.pubkey(), &self.mint, &self.token_program)
    }

    pub fn destination(&self) -> Pubkey {
        associated_token_address(&self.pay_to, &self.mint, &self.token_program)
    }

    pub fn transfer(&self, amount: u64) -> Instruction {
        self.transfer_to(self.destination(), self.mint, amount)
    }

    pub fn transfer_to(&self, destination: Pubkey, mint: Pubkey, amount: u64) -> Instruction {
        let source = associated_token_address(&self.client.pubkey(), &mint, &self.token_program);
        if self.token_program == spl_token_2022::ID {
            spl_token_2022::instruction::transfer_checked(
                &spl_token_2022::ID,
                &source,
                &mint,
                &destination,
                &self.client.pubkey(),
                &[],
                amount,
                self.decimals,
            )
            .unwrap()
        } else {
            spl_token::instruction::transfer_checked(
                &spl_token::ID,
                &source,
                &mint,
                &destination,
                &self.client.pubkey(),
                &[],
                amount,
                self.decimals,
            )
            .unwrap()
        }
    }

    pub fn memo(&self, text: &[u8]) -> Instruction {
        Instruction::new_with_bytes(MEMO_PROGRAM_PUBKEY, text, vec![])
    }

    /// An instruction of `program` that lists the fee payer as a read-only account.
    pub fn instruction_touching_fee_payer(&self, program: Pubkey) -> Instruction {
        let mut account = self.transfer(self.amount).accounts[1].clone();
        account.pubkey = self.fee_payer.pubkey();
        Instruction::new_with_bytes(program, &[], vec![account])
    }

    /// Compute unit limit, compute unit price and a transfer of the required amount.
    pub fn instructions(&self) -> Vec<Instruction> {
        vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            ComputeBudgetInstruction::set_compute_unit_price(1_000),
            self.transfer(self.amount),
        ]
    }

    /// Compiles `instructions` with the fee payer as payer. The client signs when it is
    /// a required signer; the fee payer slot stays empty.
    pub fn transaction_with(&self, instructions: Vec<Instruction>) -> VersionedTransaction {
        let message = MessageV0::try_compile(
            &self.fee_payer.pubkey(),
            &instructions,
            &[],
            Hash::default(),
        )
        .unwrap();
        let message = VersionedMessage::V0(message);
        let num_required = message.header().num_required_signatures as usize;
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); num_required],
            message,
        };
        sign_transaction(tx.clone(), &self.client).unwrap_or(tx)
    }

    pub fn transaction(&self) -> VersionedTransaction {
        self.transaction_with(self.instructions())
    }

    pub fn encode(&self, tx: VersionedTransaction) -> String {
        Base64Bytes::encode(bincode::serialize(&tx).unwrap()).to_string()
    }

    pub fn requirements(&self) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": devnet().to_string(),
            "amount": self.amount.to_string(),
            "payTo": self.pay_to.to_string(),
            "maxTimeoutSeconds": 60,
            "asset": self.mint.to_string(),
            "extra": { "feePayer": self.fee_payer.pubkey().to_string() }
        })
    }

    /// A request body paying with `tx` against `requirements`, which the client accepted as-is.
    pub fn request_for(
        &self,
        tx: VersionedTransaction,
        requirements: serde_json::Value,
    ) -> proto::VerifyRequest {
        json!({
            "x402Version": 2,
            "paymentPayload": {
                "x402Version": 2,
                "accepted": requirements.clone(),
                "payload": { "transaction": self.encode(tx) },
                "resource": {
                    "description": "Premium weather report",
                    "mimeType": "application/json",
                    "url": "https://example.com/weather"
                }
            },
            "paymentRequirements": requirements
        })
        .into()
    }

    pub fn request(&self, tx: VersionedTransaction) -> proto::VerifyRequest {
        self.request_for(tx, self.requirements())
    }
}

pub fn devnet() -> ChainId {
    SolanaChainReference::solana_devnet().into()
}

/// A provider that signs with real keypairs and scripts the chain's answers.
pub struct MockProvider {
    keypairs: Vec<Keypair>,
    pub simulation_error: Option<TransactionError>,
    pub confirmation_error: Option<TransactionError>,
    pub confirm_delay: Duration,
    pub submitted: Mutex<Vec<VersionedTransaction>>,
}

impl MockProvider {
    pub fn new(keypairs: Vec<Keypair>) -> Self {
        Self {
            keypairs,
            simulation_error: None,
            confirmation_error: None,
            confirm_delay: Duration::ZERO,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn for_fixture(fixture: &PaymentFixture) -> Self {
        Self::new(vec![fixture.fee_payer.insecure_clone()])
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl ChainProviderOps for MockProvider {
    fn signer_addresses(&self) -> Vec<String> {
        self.fee_payers().iter().map(|a| a.to_string()).collect()
    }

    fn chain_id(&self) -> ChainId {
        devnet()
    }
}

impl SolanaChainProviderLike for MockProvider {
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
            .keypairs
            .iter()
            .find(|k| *fee_payer == k.pubkey())
            .ok_or(SolanaChainProviderError::UnknownSigner(*fee_payer))?;
        sign_transaction(tx, keypair)
    }

    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<(), SolanaChainProviderError> {
        match &self.simulation_error {
            None => Ok(()),
            Some(e) => Err(SolanaChainProviderError::InvalidTransaction(
                UiTransactionError::from(e.clone()),
            )),
        }
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, SolanaChainProviderError> {
        self.submitted.lock().unwrap().push(tx.clone());
        Ok(tx.signatures[0])
    }

    async fn confirm_transaction(
        &self,
        _signature: &Signature,
        _commitment_config: CommitmentConfig,
    ) -> Result<(), SolanaChainProviderError> {
        tokio::time::sleep(self.confirm_delay).await;
        match &self.confirmation_error {
            None => Ok(()),
            Some(e) => Err(SolanaChainProviderError::InvalidTransaction(
                UiTransactionError::from(e.clone()),
            )),
        }
    }
}
