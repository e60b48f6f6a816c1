//! Economic checks on the token transfer of a payment transaction.

use solana_pubkey::Pubkey;

use crate::chain::Address;
use crate::v2_solana_exact::error::SolanaExactError;
use crate::v2_solana_exact::instruction::DecodedInstruction;
use crate::v2_solana_exact::types::ATA_PROGRAM_PUBKEY;

/// Token programs a payment can transfer through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProgram {
    Token,
    Token2022,
}

impl TokenProgram {
    pub fn from_program_id(program_id: &Pubkey) -> Option<Self> {
        if *program_id == spl_token::ID {
            Some(TokenProgram::Token)
        } else if *program_id == spl_token_2022::ID {
            Some(TokenProgram::Token2022)
        } else {
            None
        }
    }

    pub fn id(&self) -> Pubkey {
        match self {
            TokenProgram::Token => spl_token::ID,
            TokenProgram::Token2022 => spl_token_2022::ID,
        }
    }

    /// Parses instruction data, returning `(amount, decimals)` for a `TransferChecked`.
    fn unpack_transfer_checked(&self, data: &[u8]) -> Option<(u64, u8)> {
        match self {
            TokenProgram::Token => {
                match spl_token::instruction::TokenInstruction::unpack(data).ok()? {
                    spl_token::instruction::TokenInstruction::TransferChecked {
                        amount,
                        decimals,
                    } => Some((amount, decimals)),
                    _ => None,
                }
            }
            TokenProgram::Token2022 => {
                match spl_token_2022::instruction::TokenInstruction::unpack(data).ok()? {
                    spl_token_2022::instruction::TokenInstruction::TransferChecked {
                        amount,
                        decimals,
                    } => Some((amount, decimals)),
                    _ => None,
                }
            }
        }
    }
}

/// A `TransferChecked` instruction, independent of the token program that runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCheckedInstruction {
    pub amount: u64,
    pub decimals: u8,
    pub source: Pubkey,
    pub mint: Pubkey,
    pub destination: Pubkey,
    pub authority: Pubkey,
    pub token_program: TokenProgram,
}

impl TransferCheckedInstruction {
    /// Parses a Token or Token-2022 `TransferChecked`. Any other instruction yields `None`.
    pub fn parse(instruction: &DecodedInstruction) -> Option<Self> {
        let token_program = TokenProgram::from_program_id(&instruction.program_address)?;
        let (amount, decimals) = token_program.unpack_transfer_checked(&instruction.data)?;
        Some(Self {
            amount,
            decimals,
            source: *instruction.account(0)?,
            mint: *instruction.account(1)?,
            destination: *instruction.account(2)?,
            authority: *instruction.account(3)?,
            token_program,
        })
    }
}

/// What the transfer must deliver.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequirement<'a> {
    pub pay_to: &'a Address,
    pub asset: &'a Address,
    pub amount: u64,
}

/// Associated token account of `owner` for `mint` under `token_program`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Checks the transfer pays at least the required amount of the required asset into
/// the recipient's associated token account, and is not authorized by a facilitator signer.
pub fn verify_transfer_instruction(
    instruction: &DecodedInstruction,
    requirement: &TransferRequirement<'_>,
    signer_addresses: &[Address],
) -> Result<TransferCheckedInstruction, SolanaExactError> {
    let transfer = TransferCheckedInstruction::parse(instruction)
        .ok_or(SolanaExactError::NoTransferInstruction)?;

    if let Some(signer) = signer_addresses
        .iter()
        .find(|signer| **signer == transfer.authority)
    {
        return Err(SolanaExactError::FeePayerTransferringFunds(*signer));
    }

    if *requirement.asset != transfer.mint {
        return Err(SolanaExactError::MintMismatch {
            expected: *requirement.asset,
            actual: Address::new(transfer.mint),
        });
    }

    let expected_destination = associated_token_address(
        requirement.pay_to.pubkey(),
        requirement.asset.pubkey(),
        &transfer.token_program.id(),
    );
    if transfer.destination != expected_destination {
        return Err(SolanaExactError::RecipientMismatch {
            expected: expected_destination,
            actual: transfer.destination,
        });
    }

    if transfer.amount < requirement.amount {
        return Err(SolanaExactError::AmountInsufficient {
            required: requirement.amount,
            actual: transfer.amount,
        });
    }

    Ok(transfer)
}
