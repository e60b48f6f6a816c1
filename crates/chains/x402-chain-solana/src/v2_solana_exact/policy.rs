//! Structural validation of payment transactions.
//!
//! A payment transaction has a fixed prefix:
//!
//! | Index | Instruction                                   |
//! |-------|-----------------------------------------------|
//! | 0     | `SetComputeUnitLimit` (compute budget program) |
//! | 1     | `SetComputeUnitPrice` (compute budget program) |
//! | 2     | `TransferChecked` (Token or Token-2022)        |
//! | 3+    | Additional instructions, subject to policy     |
//!
//! [`validate_instructions`] enforces the prefix and the [`VerificationPolicy`] for
//! anything that follows it. The transfer fields themselves are checked by
//! [`crate::v2_solana_exact::transfer`].

use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;

use crate::chain::Address;
use crate::v2_solana_exact::error::SolanaExactError;
use crate::v2_solana_exact::instruction::DecodedInstruction;
use crate::v2_solana_exact::types::{
    COMPUTE_UNIT_LIMIT_DISCRIMINATOR, COMPUTE_UNIT_PRICE_DISCRIMINATOR,
    MAX_COMPUTE_UNIT_PRICE_MICROLAMPORTS, TRANSFER_INSTRUCTION_INDEX,
};
use crate::v2_solana_exact::verifier::{
    CustomVerifierRule, VerifierContext, memo_rule, phantom_lighthouse_rule,
};

/// Smallest valid payment transaction: two compute budget instructions and the transfer.
pub const MIN_INSTRUCTION_COUNT: usize = 3;

/// Ready-made custom verifier rules that can be enabled from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuiltinVerifier {
    /// SPL Memo instructions with UTF-8 data, at any additional position.
    Memo,
    /// Phantom Lighthouse assertions, at any additional position.
    PhantomLighthouse,
}

impl BuiltinVerifier {
    pub fn rule(&self) -> CustomVerifierRule {
        match self {
            BuiltinVerifier::Memo => memo_rule(),
            BuiltinVerifier::PhantomLighthouse => phantom_lighthouse_rule(),
        }
    }
}

/// Configuration for the V2 Solana "exact" facilitator.
///
/// Every field is optional in JSON; missing fields take the defaults below.
///
/// ```json
/// {
///   "maxInstructionCount": 5,
///   "allowAdditionalInstructions": true,
///   "builtinVerifiers": ["memo", "phantomLighthouse"],
///   "blockedProgramIds": ["11111111111111111111111111111111"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct V2SolanaExactFacilitatorConfig {
    /// Maximum number of instructions in a transaction. Default: 3.
    #[serde(default = "default_max_instruction_count")]
    pub max_instruction_count: usize,
    /// Allow instructions after the transfer. Default: false.
    #[serde(default)]
    pub allow_additional_instructions: bool,
    /// Programs additional instructions may call when no custom rule claims them.
    /// An empty list allows any program that is not blocked.
    #[serde(default)]
    pub allowed_program_ids: Vec<Address>,
    /// Programs additional instructions may never call.
    #[serde(default)]
    pub blocked_program_ids: Vec<Address>,
    /// Reject transactions that reference the fee payer in any instruction. Default: true.
    #[serde(default = "default_require_fee_payer_not_in_instructions")]
    pub require_fee_payer_not_in_instructions: bool,
    /// Built-in custom verifier rules to enable. Default: none.
    #[serde(default)]
    pub builtin_verifiers: Vec<BuiltinVerifier>,
    /// Upper bound on submission plus confirmation during settlement. Default: 60.
    #[serde(default = "default_settlement_timeout_seconds")]
    pub settlement_timeout_seconds: u64,
}

fn default_max_instruction_count() -> usize {
    MIN_INSTRUCTION_COUNT
}

fn default_require_fee_payer_not_in_instructions() -> bool {
    true
}

fn default_settlement_timeout_seconds() -> u64 {
    60
}

impl Default for V2SolanaExactFacilitatorConfig {
    fn default() -> Self {
        Self {
            max_instruction_count: default_max_instruction_count(),
            allow_additional_instructions: false,
            allowed_program_ids: Vec::new(),
            blocked_program_ids: Vec::new(),
            require_fee_payer_not_in_instructions: default_require_fee_payer_not_in_instructions(),
            builtin_verifiers: Vec::new(),
            settlement_timeout_seconds: default_settlement_timeout_seconds(),
        }
    }
}

/// The instruction policy a facilitator verifies against. Frozen at construction.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub max_instruction_count: usize,
    pub allow_additional_instructions: bool,
    pub allowed_program_ids: Vec<Pubkey>,
    pub blocked_program_ids: Vec<Pubkey>,
    /// Consulted in order; the first rule matching a program wins.
    pub custom_rules: Vec<CustomVerifierRule>,
    pub require_fee_payer_not_in_instructions: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self::from_config(&V2SolanaExactFacilitatorConfig::default(), Vec::new())
    }
}

impl VerificationPolicy {
    /// Builds the policy from configuration. `custom_rules` take precedence over the
    /// built-in rules enabled in `config`.
    pub fn from_config(
        config: &V2SolanaExactFacilitatorConfig,
        custom_rules: Vec<CustomVerifierRule>,
    ) -> Self {
        let mut rules = custom_rules;
        rules.extend(config.builtin_verifiers.iter().map(BuiltinVerifier::rule));
        Self {
            max_instruction_count: config.max_instruction_count,
            allow_additional_instructions: config.allow_additional_instructions,
            allowed_program_ids: config
                .allowed_program_ids
                .iter()
                .map(|a| *a.pubkey())
                .collect(),
            blocked_program_ids: config
                .blocked_program_ids
                .iter()
                .map(|a| *a.pubkey())
                .collect(),
            custom_rules: rules,
            require_fee_payer_not_in_instructions: config.require_fee_payer_not_in_instructions,
        }
    }

    pub fn is_blocked(&self, program_id: &Pubkey) -> bool {
        self.blocked_program_ids.contains(program_id)
    }

    /// An empty allow-list allows everything.
    pub fn is_allowed(&self, program_id: &Pubkey) -> bool {
        self.allowed_program_ids.is_empty() || self.allowed_program_ids.contains(program_id)
    }

    pub fn custom_rule_for(&self, program_id: &Pubkey) -> Option<&CustomVerifierRule> {
        self.custom_rules.iter().find(|rule| rule.matches(program_id))
    }
}

fn verify_compute_limit_instruction(
    instruction: &DecodedInstruction,
) -> Result<u32, SolanaExactError> {
    let data = instruction.data.as_slice();
    if instruction.program_address != solana_compute_budget_interface::ID
        || data.first() != Some(&COMPUTE_UNIT_LIMIT_DISCRIMINATOR)
        || data.len() != 5
    {
        return Err(SolanaExactError::InvalidComputeLimitInstruction);
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[1..5]);
    Ok(u32::from_le_bytes(buf))
}

fn verify_compute_price_instruction(
    instruction: &DecodedInstruction,
) -> Result<u64, SolanaExactError> {
    let data = instruction.data.as_slice();
    if instruction.program_address != solana_compute_budget_interface::ID
        || data.first() != Some(&COMPUTE_UNIT_PRICE_DISCRIMINATOR)
        || data.len() != 9
    {
        return Err(SolanaExactError::InvalidComputePriceInstruction);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[1..9]);
    let microlamports = u64::from_le_bytes(buf);
    if microlamports > MAX_COMPUTE_UNIT_PRICE_MICROLAMPORTS {
        return Err(SolanaExactError::MaxComputeUnitPriceExceeded {
            price: microlamports,
            max: MAX_COMPUTE_UNIT_PRICE_MICROLAMPORTS,
        });
    }
    Ok(microlamports)
}

/// Validates the instruction layout of a payment transaction against `policy`.
///
/// Returns the index of the transfer instruction. Checks run in a fixed order and the
/// first failure is returned.
pub async fn validate_instructions(
    policy: &VerificationPolicy,
    instructions: &[DecodedInstruction],
    signer_addresses: &[Address],
    fee_payer: &Address,
) -> Result<usize, SolanaExactError> {
    let count = instructions.len();
    if count < MIN_INSTRUCTION_COUNT {
        return Err(SolanaExactError::TooFewInstructions(count));
    }
    if count > policy.max_instruction_count {
        return Err(SolanaExactError::InstructionCountExceedsMax {
            count,
            max: policy.max_instruction_count,
        });
    }

    if policy.require_fee_payer_not_in_instructions {
        let position = instructions
            .iter()
            .position(|instruction| instruction.references(fee_payer.pubkey()));
        if let Some(index) = position {
            return Err(SolanaExactError::FeePayerIncludedInInstructionAccounts(
                index,
            ));
        }
    }

    let _compute_units = verify_compute_limit_instruction(&instructions[0])?;
    let _microlamports = verify_compute_price_instruction(&instructions[1])?;
    #[cfg(feature = "telemetry")]
    tracing::debug!(
        compute_units = _compute_units,
        microlamports = _microlamports,
        "Verified compute budget instructions"
    );

    if !instructions[TRANSFER_INSTRUCTION_INDEX].is_token_program() {
        return Err(SolanaExactError::NoTransferInstructionAtIndex);
    }

    if count > MIN_INSTRUCTION_COUNT {
        if !policy.allow_additional_instructions {
            return Err(SolanaExactError::AdditionalInstructionsNotAllowed);
        }
        for (index, instruction) in instructions.iter().enumerate().skip(MIN_INSTRUCTION_COUNT) {
            let program = instruction.program_address;
            if policy.is_blocked(&program) {
                return Err(SolanaExactError::BlockedProgram(program));
            }
            if let Some(rule) = policy.custom_rule_for(&program) {
                if !rule.allows_position(index) {
                    return Err(SolanaExactError::InstructionPosition { program, index });
                }
                if let Some(verifier) = rule.verifier() {
                    let context = VerifierContext {
                        signer_addresses,
                        fee_payer,
                        instruction_index: index,
                    };
                    verifier
                        .verify(instruction, &context)
                        .await
                        .map_err(|source| SolanaExactError::CustomVerifier {
                            program,
                            index,
                            source,
                        })?;
                }
                continue;
            }
            if !policy.is_allowed(&program) {
                return Err(SolanaExactError::ProgramNotAllowed(program));
            }
        }
    }

    Ok(TRANSFER_INSTRUCTION_INDEX)
}
