//! Custom verification of additional instructions.
//!
//! Wallets append instructions of their own after the token transfer. A
//! [`CustomVerifierRule`] claims a set of programs, optionally restricts the positions
//! their instructions may occupy, and optionally runs an [`InstructionVerifier`] over each
//! matching instruction. A matching rule replaces the allow-list check for that
//! instruction; the block-list still applies first.
//!
//! ```ignore
//! let rule = CustomVerifierRule::new([MEMO_PROGRAM_PUBKEY])
//!     .at_positions([3])
//!     .with_verifier_fn(|instruction, _context| {
//!         if instruction.data.len() > 64 {
//!             return Err(InstructionVerifierError::new("memo_too_long"));
//!         }
//!         Ok(())
//!     });
//! ```

use solana_pubkey::Pubkey;
use std::collections::{BTreeSet, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::chain::Address;
use crate::v2_solana_exact::instruction::DecodedInstruction;
use crate::v2_solana_exact::types::{MEMO_PROGRAM_PUBKEY, PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY};

/// What a verifier knows about the transaction around the instruction it inspects.
#[derive(Debug, Clone, Copy)]
pub struct VerifierContext<'a> {
    /// Addresses the facilitator signs with.
    pub signer_addresses: &'a [Address],
    /// The fee payer chosen for this payment.
    pub fee_payer: &'a Address,
    /// Position of the inspected instruction in the transaction.
    pub instruction_index: usize,
}

/// Rejection from an [`InstructionVerifier`].
///
/// `reason` is reported verbatim as the verification failure reason.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct InstructionVerifierError {
    reason: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl InstructionVerifierError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(
        reason: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Inspects one additional instruction of a payment transaction.
#[async_trait::async_trait]
pub trait InstructionVerifier: Send + Sync {
    async fn verify(
        &self,
        instruction: &DecodedInstruction,
        context: &VerifierContext<'_>,
    ) -> Result<(), InstructionVerifierError>;
}

/// Adapts a plain function into an [`InstructionVerifier`].
pub struct FnVerifier<F>(pub F);

#[async_trait::async_trait]
impl<F> InstructionVerifier for FnVerifier<F>
where
    F: Fn(&DecodedInstruction, &VerifierContext<'_>) -> Result<(), InstructionVerifierError>
        + Send
        + Sync,
{
    async fn verify(
        &self,
        instruction: &DecodedInstruction,
        context: &VerifierContext<'_>,
    ) -> Result<(), InstructionVerifierError> {
        (self.0)(instruction, context)
    }
}

/// A policy rule for instructions of specific programs.
#[derive(Clone)]
pub struct CustomVerifierRule {
    program_ids: HashSet<Pubkey>,
    allowed_positions: Option<BTreeSet<usize>>,
    verifier: Option<Arc<dyn InstructionVerifier>>,
}

impl CustomVerifierRule {
    /// A rule accepting the given programs at any position, with no further checks.
    pub fn new(program_ids: impl IntoIterator<Item = Pubkey>) -> Self {
        Self {
            program_ids: program_ids.into_iter().collect(),
            allowed_positions: None,
            verifier: None,
        }
    }

    /// Restricts matching instructions to the given positions.
    pub fn at_positions(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.allowed_positions = Some(positions.into_iter().collect());
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn InstructionVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_verifier_fn<F>(self, f: F) -> Self
    where
        F: Fn(&DecodedInstruction, &VerifierContext<'_>) -> Result<(), InstructionVerifierError>
            + Send
            + Sync
            + 'static,
    {
        self.with_verifier(Arc::new(FnVerifier(f)))
    }

    pub fn matches(&self, program_id: &Pubkey) -> bool {
        self.program_ids.contains(program_id)
    }

    pub fn allows_position(&self, index: usize) -> bool {
        self.allowed_positions
            .as_ref()
            .is_none_or(|positions| positions.contains(&index))
    }

    pub fn verifier(&self) -> Option<&Arc<dyn InstructionVerifier>> {
        self.verifier.as_ref()
    }
}

impl Debug for CustomVerifierRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomVerifierRule")
            .field("program_ids", &self.program_ids)
            .field("allowed_positions", &self.allowed_positions)
            .field("has_verifier", &self.verifier.is_some())
            .finish()
    }
}

/// Accepts SPL Memo instructions whose data is valid UTF-8.
pub fn memo_rule() -> CustomVerifierRule {
    CustomVerifierRule::new([MEMO_PROGRAM_PUBKEY]).with_verifier_fn(|instruction, _context| {
        std::str::from_utf8(&instruction.data).map_err(|e| {
            InstructionVerifierError::with_source("invalid_exact_svm_payload_memo_invalid_utf8", e)
        })?;
        Ok(())
    })
}

/// Accepts Phantom Lighthouse assertions. They only read accounts and fail the
/// transaction when an assertion does not hold.
pub fn phantom_lighthouse_rule() -> CustomVerifierRule {
    CustomVerifierRule::new([PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(program_address: Pubkey, data: &[u8]) -> DecodedInstruction {
        DecodedInstruction {
            program_address,
            accounts: vec![],
            data: data.to_vec(),
        }
    }

    fn context(fee_payer: &Address) -> VerifierContext<'_> {
        VerifierContext {
            signer_addresses: std::slice::from_ref(fee_payer),
            fee_payer,
            instruction_index: 3,
        }
    }

    #[test]
    fn test_rule_positions() {
        let program = Pubkey::new_unique();
        let rule = CustomVerifierRule::new([program]);
        assert!(rule.matches(&program));
        assert!(!rule.matches(&Pubkey::new_unique()));
        assert!(rule.allows_position(7));
        let rule = rule.at_positions([3, 4]);
        assert!(rule.allows_position(4));
        assert!(!rule.allows_position(5));
    }

    #[tokio::test]
    async fn test_memo_rule_checks_utf8() {
        let fee_payer = Address::new(Pubkey::new_unique());
        let rule = memo_rule();
        let verifier = rule.verifier().unwrap();
        verifier
            .verify(
                &instruction(MEMO_PROGRAM_PUBKEY, b"order #42"),
                &context(&fee_payer),
            )
            .await
            .unwrap();
        let err = verifier
            .verify(
                &instruction(MEMO_PROGRAM_PUBKEY, &[0xff, 0xfe]),
                &context(&fee_payer),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_exact_svm_payload_memo_invalid_utf8");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_fn_verifier_sees_context() {
        let fee_payer = Address::new(Pubkey::new_unique());
        let rule = CustomVerifierRule::new([Pubkey::new_unique()]).with_verifier_fn(
            |_instruction, context| {
                if context.instruction_index == 3 {
                    Err(InstructionVerifierError::new("third_is_rejected"))
                } else {
                    Ok(())
                }
            },
        );
        let err = rule
            .verifier()
            .unwrap()
            .verify(&instruction(Pubkey::new_unique(), &[]), &context(&fee_payer))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "third_is_rejected");
    }

    #[test]
    fn test_phantom_lighthouse_rule_has_no_verifier() {
        let rule = phantom_lighthouse_rule();
        assert!(rule.matches(&PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY));
        assert!(rule.verifier().is_none());
    }
}
