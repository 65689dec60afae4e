//! Settlement core for Coin Flip
//!
//! Escrowed two-party wagers: one participant opens a wager, a second
//! matches it within tolerance, one fair bit picks the winner and the
//! whole pool is paid out exactly once.
//! This crate is compiled to:
//! - Native, for the in-process engine and its tests
//! - SBF, inside the on-chain program (without `os-entropy`)

mod address;
mod config;
mod custody;
mod engine;
mod entropy;
mod error;
mod random;
mod record;
mod sequence;
mod wager;

pub use address::{
    AddressDeriver, Component, Identity, Locator, RecordKey, COIN_FLIP_SEED, MAX_SEEDS, MAX_SEED_LEN, VENDOR_SEED,
};
pub use config::{AddressingMode, EngineConfig};
pub use custody::{CustodyHandle, FundCustody, InMemoryLedger, Ledger};
pub use engine::{GameEntry, GameRef, OpenRequest, Opened, SettleRequest, Settled, SettlementEngine, SharedEngine};
#[cfg(feature = "os-entropy")]
pub use entropy::OsEntropy;
pub use entropy::{decide, EntropySource, Outcome};
pub use error::FlipError;
pub use random::SeededRng;
pub use record::{discriminator, EscrowRecord, GameStatus, Settlement, ACCOUNT_LEN, DISCRIMINATOR_LEN, RECORD_LEN};
pub use sequence::{SequenceCounter, SEQUENCE_BASE};
pub use wager::{
    check_matching_wager, check_opening_wager, total_pool, wager_bounds, MAX_MATCH_PERCENT, MAX_OPENING_WAGER,
    MIN_MATCH_PERCENT,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_round() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new([1u8; 32]);
        let bob = Identity::new([2u8; 32]);
        ledger.fund(alice, 1_000_000).unwrap();
        ledger.fund(bob, 1_000_000).unwrap();

        let config = EngineConfig::from_json(r#"{"mode": "global_counter"}"#).unwrap();
        let mut engine = SettlementEngine::new(config, ledger, SeededRng::from_u64(11)).unwrap();

        let opened = engine.open(OpenRequest::new(alice, 500_000)).unwrap();
        let settled = engine
            .settle(SettleRequest { counterparty: bob, game: GameRef::Locator(opened.locator), wager: 495_000 })
            .unwrap();

        let winner = settled.settlement.winner;
        assert!(winner == alice || winner == bob);
        assert_eq!(engine.ledger().balance(&winner), 1_000_000 + if winner == alice { 495_000 } else { 500_000 });

        let stored = engine.record(&opened.locator).unwrap();
        assert_eq!(EscrowRecord::decode(&stored.encode()).unwrap(), *stored);
    }
}
