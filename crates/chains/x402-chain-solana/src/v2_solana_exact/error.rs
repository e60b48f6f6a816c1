//! Failure values for verification and settlement.
//!
//! Every failure carries a stable wire code ([`SolanaExactError::reason`]), a
//! human-readable detail (`Display`), and a category ([`ErrorKind`]).

use solana_pubkey::Pubkey;
use std::time::Duration;
use x402_types::proto::ErrorReason;

use crate::chain::{Address, SolanaChainProviderError};
use crate::v2_solana_exact::types::TRANSFER_INSTRUCTION_INDEX;
use crate::v2_solana_exact::verifier::InstructionVerifierError;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The payment does not target this scheme or network.
    RequirementMismatch,
    /// The payload cannot be decoded or lacks required parts.
    PayloadMalformed,
    /// The instruction layout violates the verification policy.
    PolicyViolation,
    /// The transaction would put the facilitator's funds or signature at risk.
    SecurityViolation,
    /// The transfer does not pay what the requirements ask for.
    EconomicMismatch,
    /// A chain or signer operation failed.
    InfrastructureFailure,
}

/// Reasons a payment fails verification.
#[derive(Debug, thiserror::Error)]
pub enum SolanaExactError {
    #[error("Unsupported scheme {0}")]
    UnsupportedScheme(String),
    #[error("Network mismatch: {0}")]
    NetworkMismatch(String),
    #[error("Missing or invalid feePayer in requirements extra")]
    MissingFeePayer,
    #[error("Fee payer {0} is not managed by this facilitator")]
    FeePayerNotManaged(Address),
    #[error("Can not decode transaction: {0}")]
    TransactionDecoding(String),
    #[error("No transfer instruction found")]
    NoTransferInstruction,
    #[error("Transaction has {0} instructions, at least 3 are required")]
    TooFewInstructions(usize),
    #[error("Transaction has {count} instructions, at most {max} are allowed")]
    InstructionCountExceedsMax { count: usize, max: usize },
    #[error("Fee payer is referenced by instruction {0}")]
    FeePayerIncludedInInstructionAccounts(usize),
    #[error("Instruction 0 is not a valid compute unit limit instruction")]
    InvalidComputeLimitInstruction,
    #[error("Instruction 1 is not a valid compute unit price instruction")]
    InvalidComputePriceInstruction,
    #[error("Compute unit price {price} exceeds maximum {max}")]
    MaxComputeUnitPriceExceeded { price: u64, max: u64 },
    #[error("Instruction {TRANSFER_INSTRUCTION_INDEX} is not a token program instruction")]
    NoTransferInstructionAtIndex,
    #[error("Additional instructions are not allowed")]
    AdditionalInstructionsNotAllowed,
    #[error("Program {0} is blocked")]
    BlockedProgram(Pubkey),
    #[error("Program {program} is not allowed at position {index}")]
    InstructionPosition { program: Pubkey, index: usize },
    #[error("Program {0} is not allowed")]
    ProgramNotAllowed(Pubkey),
    #[error("Instruction {index} rejected by verifier for {program}: {source}")]
    CustomVerifier {
        program: Pubkey,
        index: usize,
        #[source]
        source: InstructionVerifierError,
    },
    #[error("Fee payer {0} is the transfer authority")]
    FeePayerTransferringFunds(Address),
    #[error("Transfer mint {actual} does not match asset {expected}")]
    MintMismatch { expected: Address, actual: Address },
    #[error("Transfer destination {actual} is not the associated token account {expected}")]
    RecipientMismatch { expected: Pubkey, actual: Pubkey },
    #[error("Transfer amount {actual} is less than required {required}")]
    AmountInsufficient { required: u64, actual: u64 },
    /// A requirement field the transfer is checked against does not parse.
    ///
    /// No transfer can pay such a requirement, so it is reported with the code of the
    /// transfer check the field feeds.
    #[error("Requirement {field} is not valid: {value}")]
    InvalidRequirement {
        field: RequirementField,
        value: String,
    },
    #[error("Simulation failed: {0}")]
    Simulation(#[source] SolanaChainProviderError),
}

impl SolanaExactError {
    /// Stable wire code reported as `invalidReason`.
    pub fn reason(&self) -> String {
        const P: &str = "invalid_exact_svm_payload";
        match self {
            SolanaExactError::UnsupportedScheme(_) => ErrorReason::UnsupportedScheme.into(),
            SolanaExactError::NetworkMismatch(_) => ErrorReason::NetworkMismatch.into(),
            SolanaExactError::MissingFeePayer => format!("{P}_missing_fee_payer"),
            SolanaExactError::FeePayerNotManaged(_) => {
                "fee_payer_not_managed_by_facilitator".to_string()
            }
            SolanaExactError::TransactionDecoding(_) => {
                format!("{P}_transaction_could_not_be_decoded")
            }
            SolanaExactError::NoTransferInstruction => format!("{P}_no_transfer_instruction"),
            SolanaExactError::TooFewInstructions(_) => {
                format!("{P}_transaction_instructions_length_too_few")
            }
            SolanaExactError::InstructionCountExceedsMax { max, .. } => {
                format!("{P}_transaction_instructions_length_exceeds_max_{max}")
            }
            SolanaExactError::FeePayerIncludedInInstructionAccounts(_) => {
                format!("{P}_fee_payer_in_instruction_accounts")
            }
            SolanaExactError::InvalidComputeLimitInstruction => {
                format!("{P}_transaction_instructions_compute_limit_instruction")
            }
            SolanaExactError::InvalidComputePriceInstruction => {
                format!("{P}_transaction_instructions_compute_price_instruction")
            }
            SolanaExactError::MaxComputeUnitPriceExceeded { .. } => {
                format!("{P}_transaction_instructions_compute_price_instruction_too_high")
            }
            SolanaExactError::NoTransferInstructionAtIndex => {
                format!("{P}_no_transfer_instruction_at_index_{TRANSFER_INSTRUCTION_INDEX}")
            }
            SolanaExactError::AdditionalInstructionsNotAllowed => {
                format!("{P}_additional_instructions_not_allowed")
            }
            SolanaExactError::BlockedProgram(program) => format!("{P}_blocked_program_{program}"),
            SolanaExactError::InstructionPosition { program, index } => {
                format!("{P}_instruction_position_{program}_at_{index}")
            }
            SolanaExactError::ProgramNotAllowed(program) => {
                format!("{P}_program_not_allowed_{program}")
            }
            SolanaExactError::CustomVerifier { source, .. } => source.reason().to_string(),
            SolanaExactError::FeePayerTransferringFunds(_) => {
                format!("{P}_transaction_fee_payer_transferring_funds")
            }
            SolanaExactError::MintMismatch { .. } => format!("{P}_mint_mismatch"),
            SolanaExactError::RecipientMismatch { .. } => format!("{P}_recipient_mismatch"),
            SolanaExactError::AmountInsufficient { .. } => format!("{P}_amount_insufficient"),
            SolanaExactError::InvalidRequirement { field, .. } => match field {
                RequirementField::Asset => format!("{P}_mint_mismatch"),
                RequirementField::PayTo => format!("{P}_recipient_mismatch"),
                RequirementField::Amount => format!("{P}_amount_insufficient"),
            },
            SolanaExactError::Simulation(source) => {
                format!("transaction_simulation_failed: {source}")
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SolanaExactError::UnsupportedScheme(_)
            | SolanaExactError::NetworkMismatch(_)
            | SolanaExactError::MissingFeePayer
            | SolanaExactError::FeePayerNotManaged(_) => ErrorKind::RequirementMismatch,
            SolanaExactError::TransactionDecoding(_) | SolanaExactError::NoTransferInstruction => {
                ErrorKind::PayloadMalformed
            }
            SolanaExactError::TooFewInstructions(_)
            | SolanaExactError::InstructionCountExceedsMax { .. }
            | SolanaExactError::InvalidComputeLimitInstruction
            | SolanaExactError::InvalidComputePriceInstruction
            | SolanaExactError::MaxComputeUnitPriceExceeded { .. }
            | SolanaExactError::NoTransferInstructionAtIndex
            | SolanaExactError::AdditionalInstructionsNotAllowed
            | SolanaExactError::BlockedProgram(_)
            | SolanaExactError::InstructionPosition { .. }
            | SolanaExactError::ProgramNotAllowed(_)
            | SolanaExactError::CustomVerifier { .. } => ErrorKind::PolicyViolation,
            SolanaExactError::FeePayerIncludedInInstructionAccounts(_)
            | SolanaExactError::FeePayerTransferringFunds(_) => ErrorKind::SecurityViolation,
            SolanaExactError::MintMismatch { .. }
            | SolanaExactError::RecipientMismatch { .. }
            | SolanaExactError::AmountInsufficient { .. }
            | SolanaExactError::InvalidRequirement { .. } => ErrorKind::EconomicMismatch,
            SolanaExactError::Simulation(_) => ErrorKind::InfrastructureFailure,
        }
    }
}

/// Requirement fields parsed at the transfer check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementField {
    Asset,
    PayTo,
    Amount,
}

impl std::fmt::Display for RequirementField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequirementField::Asset => write!(f, "asset"),
            RequirementField::PayTo => write!(f, "payTo"),
            RequirementField::Amount => write!(f, "amount"),
        }
    }
}

/// Reasons a verified payment fails to settle.
///
/// All are reported on the wire as `transaction_failed`; the detail goes to `errorMessage`.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Can not co-sign transaction: {0}")]
    Signing(#[source] SolanaChainProviderError),
    #[error("Transaction is missing signatures after co-signing")]
    Undersigned,
    #[error("Can not submit transaction: {0}")]
    Submission(#[source] SolanaChainProviderError),
    #[error("Transaction failed to confirm: {0}")]
    Confirmation(#[source] SolanaChainProviderError),
    #[error("Settlement deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl SettlementError {
    pub fn reason(&self) -> String {
        ErrorReason::TransactionFailed.into()
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InfrastructureFailure
    }
}
