use x402_types::chain::ChainId;

use crate::chain::SolanaChainReference;

/// Trait providing convenient methods to get instances for well-known Solana networks.
///
/// Each method returns `A`, so the trait can be implemented for any type that has
/// a per-network instance: chain identifiers, chain references, or configuration.
///
/// # Examples
///
/// ```
/// use x402_types::chain::ChainId;
/// use x402_chain_solana::KnownNetworkSolana;
///
/// let solana = ChainId::solana();
/// assert_eq!(solana.namespace, "solana");
/// assert_eq!(solana.reference, "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp");
///
/// let devnet = ChainId::solana_devnet();
/// assert_eq!(devnet.reference, "EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
/// ```
pub trait KnownNetworkSolana<A> {
    /// Returns the instance for Solana mainnet (solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp)
    fn solana() -> A;
    /// Returns the instance for Solana devnet (solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1)
    fn solana_devnet() -> A;
}

impl KnownNetworkSolana<ChainId> for ChainId {
    fn solana() -> ChainId {
        SolanaChainReference::solana().into()
    }

    fn solana_devnet() -> ChainId {
        SolanaChainReference::solana_devnet().into()
    }
}
