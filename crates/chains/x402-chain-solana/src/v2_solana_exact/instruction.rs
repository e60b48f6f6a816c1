//! Decoding of payment transactions into program-level instructions.
//!
//! A payment payload carries a base64-encoded, bincode-serialized [`VersionedTransaction`].
//! Its compiled instructions refer to accounts by index; [`decompile_instructions`] resolves
//! those indexes against the message's static account keys and attaches the role each
//! account plays in the transaction.

use solana_pubkey::Pubkey;
use solana_transaction::versioned::VersionedTransaction;
use x402_types::util::Base64Bytes;

use crate::chain::Address;
use crate::v2_solana_exact::error::SolanaExactError;

/// How an account participates in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRole {
    WritableSigner,
    ReadonlySigner,
    Writable,
    Readonly,
}

impl AccountRole {
    pub fn is_signer(&self) -> bool {
        matches!(self, AccountRole::WritableSigner | AccountRole::ReadonlySigner)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, AccountRole::WritableSigner | AccountRole::Writable)
    }
}

/// An account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Pubkey,
    pub role: AccountRole,
}

/// An instruction with its program and accounts resolved to addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub program_address: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl DecodedInstruction {
    /// Address of the account at `index` in the instruction's account list.
    pub fn account(&self, index: usize) -> Option<&Pubkey> {
        self.accounts.get(index).map(|meta| &meta.address)
    }

    /// Whether `address` is among the instruction's accounts.
    pub fn references(&self, address: &Pubkey) -> bool {
        self.accounts.iter().any(|meta| meta.address == *address)
    }

    pub fn is_token_program(&self) -> bool {
        self.program_address == spl_token::ID || self.program_address == spl_token_2022::ID
    }
}

/// Decodes a base64, bincode-serialized versioned transaction.
pub fn decode_transaction(transaction_b64: &str) -> Result<VersionedTransaction, SolanaExactError> {
    let bytes = Base64Bytes::from(transaction_b64)
        .decode()
        .map_err(|e| SolanaExactError::TransactionDecoding(e.to_string()))?;
    let transaction = bincode::deserialize::<VersionedTransaction>(bytes.as_slice())
        .map_err(|e| SolanaExactError::TransactionDecoding(e.to_string()))?;
    Ok(transaction)
}

/// Resolves every compiled instruction of the transaction.
///
/// Only static account keys are resolved. An index outside of them, such as one pointing
/// into an address lookup table, is a decoding failure.
pub fn decompile_instructions(
    transaction: &VersionedTransaction,
) -> Result<Vec<DecodedInstruction>, SolanaExactError> {
    let message = &transaction.message;
    let keys = message.static_account_keys();
    let header = message.header();
    let num_signers = header.num_required_signatures as usize;
    let num_writable_signers =
        num_signers.saturating_sub(header.num_readonly_signed_accounts as usize);
    let num_writable_unsigned = keys
        .len()
        .saturating_sub(header.num_readonly_unsigned_accounts as usize);
    let role_of = |index: usize| -> AccountRole {
        if index < num_signers {
            if index < num_writable_signers {
                AccountRole::WritableSigner
            } else {
                AccountRole::ReadonlySigner
            }
        } else if index < num_writable_unsigned {
            AccountRole::Writable
        } else {
            AccountRole::Readonly
        }
    };
    let resolve = |index: u8| -> Result<Pubkey, SolanaExactError> {
        keys.get(index as usize).copied().ok_or_else(|| {
            SolanaExactError::TransactionDecoding(format!(
                "account index {index} is out of range of {} static account keys",
                keys.len()
            ))
        })
    };

    message
        .instructions()
        .iter()
        .map(|compiled| {
            let program_address = resolve(compiled.program_id_index)?;
            let accounts = compiled
                .accounts
                .iter()
                .map(|&index| {
                    Ok(AccountMeta {
                        address: resolve(index)?,
                        role: role_of(index as usize),
                    })
                })
                .collect::<Result<Vec<_>, SolanaExactError>>()?;
            Ok(DecodedInstruction {
                program_address,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

/// The paying address: authority of the first token program instruction that has
/// at least the four `TransferChecked` accounts.
pub fn resolve_payer(instructions: &[DecodedInstruction]) -> Option<Address> {
    instructions
        .iter()
        .find(|instruction| instruction.is_token_program() && instruction.accounts.len() >= 4)
        .and_then(|instruction| instruction.account(3))
        .map(|authority| Address::new(*authority))
}
