//! Settlement state machine
//!
//! Owns every escrow record, the sequence counter and custody of all
//! escrowed value. `open` and `settle` each either commit completely or
//! fail without touching any record, balance or counter.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::{AddressDeriver, Identity, Locator, RecordKey};
use crate::config::{AddressingMode, EngineConfig};
use crate::custody::{CustodyHandle, FundCustody, Ledger};
use crate::entropy::{decide, EntropySource};
use crate::error::FlipError;
use crate::record::{EscrowRecord, GameStatus, Settlement};
use crate::sequence::SequenceCounter;
use crate::wager::{check_opening_wager, total_pool};

/// Request to open a new wager
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub initiator: Identity,
    pub wager: u64,
    /// Required in nonce mode, rejected in counter mode
    pub nonce: Option<u64>,
    /// Locator the client derived on its own, verified before anything moves
    pub expected_locator: Option<Locator>,
}

impl OpenRequest {
    pub fn new(initiator: Identity, wager: u64) -> Self {
        Self { initiator, wager, nonce: None, expected_locator: None }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn expecting(mut self, locator: Locator) -> Self {
        self.expected_locator = Some(locator);
        self
    }
}

/// How a settle request names its record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameRef {
    Locator(Locator),
    Sequence(u64),
    Nonce { initiator: Identity, nonce: u64 },
}

/// Request to join and settle an open wager
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleRequest {
    pub counterparty: Identity,
    pub game: GameRef,
    pub wager: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opened {
    pub locator: Locator,
    pub identifier: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settled {
    pub locator: Locator,
    pub settlement: Settlement,
}

/// One row of a game listing; `record` is `None` when nothing is stored
/// at the derived locator.
#[derive(Clone, Copy, Debug)]
pub struct GameEntry<'a> {
    pub identifier: u64,
    pub locator: Locator,
    pub record: Option<&'a EscrowRecord>,
}

impl GameEntry<'_> {
    pub fn status(&self) -> Option<GameStatus> {
        self.record.map(EscrowRecord::status)
    }
}

struct Slot {
    record: EscrowRecord,
    /// Present exactly while the record is open
    custody: Option<CustodyHandle>,
}

pub struct SettlementEngine<L: Ledger, E: EntropySource> {
    config: EngineConfig,
    deriver: AddressDeriver,
    counter: SequenceCounter,
    slots: HashMap<Locator, Slot>,
    custody: FundCustody<L>,
    entropy: E,
}

impl<L: Ledger, E: EntropySource> SettlementEngine<L, E> {
    pub fn new(config: EngineConfig, ledger: L, entropy: E) -> Result<Self, FlipError> {
        Self::resume(config, SequenceCounter::new(), ledger, entropy)
    }

    /// Start from a persisted counter value.
    pub fn resume(config: EngineConfig, counter: SequenceCounter, ledger: L, entropy: E) -> Result<Self, FlipError> {
        config.validate()?;
        Ok(Self {
            deriver: AddressDeriver::new(config.owner),
            config,
            counter,
            slots: HashMap::new(),
            custody: FundCustody::new(ledger),
            entropy,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counter(&self) -> &SequenceCounter {
        &self.counter
    }

    pub fn ledger(&self) -> &L {
        self.custody.ledger()
    }

    /// Value held across all open records
    pub fn escrowed(&self) -> u64 {
        self.custody.escrowed()
    }

    pub fn record(&self, locator: &Locator) -> Option<&EscrowRecord> {
        self.slots.get(locator).map(|slot| &slot.record)
    }

    /// Derive the locator for a record key under this engine's namespace.
    pub fn locate(&self, key: &RecordKey) -> Result<Locator, FlipError> {
        key.locate(&self.deriver, &self.config.namespace)
    }

    /// Open a wager, escrowing the initiator's stake.
    pub fn open(&mut self, request: OpenRequest) -> Result<Opened, FlipError> {
        let result = self.try_open(&request);
        match &result {
            Ok(opened) => info!(
                locator = %opened.locator,
                identifier = opened.identifier,
                initiator = %request.initiator,
                wager = request.wager,
                "game opened"
            ),
            Err(err) => debug!(
                initiator = %request.initiator,
                wager = request.wager,
                error = err.kind(),
                "open rejected"
            ),
        }
        result
    }

    fn try_open(&mut self, request: &OpenRequest) -> Result<Opened, FlipError> {
        if request.initiator.is_default() {
            return Err(FlipError::InvalidComponents("initiator identity is unset"));
        }

        let (key, next_count) = match (self.config.mode, request.nonce) {
            (AddressingMode::GlobalCounter, None) => {
                let id = self.counter.peek_next()?;
                (RecordKey::Sequence(id), id)
            }
            (AddressingMode::InitiatorNonce, Some(nonce)) => (
                RecordKey::InitiatorNonce { initiator: request.initiator, nonce },
                // Advisory only in this mode
                self.counter.current().saturating_add(1),
            ),
            (AddressingMode::GlobalCounter, Some(_)) => {
                return Err(FlipError::InvalidComponents("nonce given in global counter mode"));
            }
            (AddressingMode::InitiatorNonce, None) => {
                return Err(FlipError::InvalidComponents("nonce required in initiator nonce mode"));
            }
        };

        let locator = self.locate(&key)?;
        if let Some(supplied) = request.expected_locator {
            if supplied != locator {
                return Err(FlipError::LocatorMismatch { supplied, derived: locator });
            }
        }
        if self.slots.contains_key(&locator) {
            return Err(FlipError::RecordAlreadyExists(locator));
        }
        check_opening_wager(request.wager)?;

        // Last fallible step; everything after it commits
        let handle = self.custody.hold(locator, &request.initiator, request.wager)?;

        let identifier = key.identifier();
        self.slots.insert(
            locator,
            Slot {
                record: EscrowRecord::open(identifier, request.initiator, request.wager),
                custody: Some(handle),
            },
        );
        self.counter = SequenceCounter::resume(next_count);

        Ok(Opened { locator, identifier })
    }

    /// Join an open wager, flip, and pay the whole pool to the winner.
    pub fn settle(&mut self, request: SettleRequest) -> Result<Settled, FlipError> {
        let result = self.try_settle(&request);
        match &result {
            Ok(settled) => info!(
                locator = %settled.locator,
                counterparty = %request.counterparty,
                winner = %settled.settlement.winner,
                total_pool = settled.settlement.total_pool,
                "game settled"
            ),
            Err(err) => debug!(
                counterparty = %request.counterparty,
                wager = request.wager,
                error = err.kind(),
                "settle rejected"
            ),
        }
        result
    }

    fn try_settle(&mut self, request: &SettleRequest) -> Result<Settled, FlipError> {
        let mode = self.config.mode;
        let locator = match request.game {
            GameRef::Locator(locator) => locator,
            GameRef::Sequence(id) => {
                if mode != AddressingMode::GlobalCounter {
                    return Err(FlipError::InvalidComponents("sequence reference in initiator nonce mode"));
                }
                self.locate(&RecordKey::Sequence(id))?
            }
            GameRef::Nonce { initiator, nonce } => {
                if mode != AddressingMode::InitiatorNonce {
                    return Err(FlipError::InvalidComponents("nonce reference in global counter mode"));
                }
                self.locate(&RecordKey::InitiatorNonce { initiator, nonce })?
            }
        };

        let Self { config, deriver, slots, custody, entropy, .. } = self;
        let slot = slots.get_mut(&locator).ok_or(FlipError::RecordNotFound(locator))?;

        // Canonical path: the record's own seeds must lead back here
        let derived = slot.record.key(mode).locate(deriver, &config.namespace)?;
        if derived != locator {
            return Err(FlipError::LocatorMismatch { supplied: locator, derived });
        }

        slot.record.check_join(&request.counterparty, request.wager)?;
        total_pool(slot.record.opening_wager(), request.wager).ok_or(FlipError::Overflow)?;
        let handle = slot.custody.as_mut().ok_or(FlipError::GameAlreadyFinished)?;

        // Last fallible step; everything after it commits
        custody.top_up(handle, &request.counterparty, request.wager)?;

        let outcome = decide(entropy);
        let settlement = slot.record.close(request.counterparty, request.wager, outcome);
        if let Some(handle) = slot.custody.take() {
            custody.release(handle, &settlement.winner);
        }

        Ok(Settled { locator, settlement })
    }

    /// Every game issued by the global counter, `1..=current`, lazily.
    ///
    /// Restartable: each call re-derives from the counter's current value.
    /// Yields nothing in nonce mode, where identifiers are not global.
    pub fn games(&self) -> impl Iterator<Item = GameEntry<'_>> + '_ {
        let ids: RangeInclusive<u64> = match self.config.mode {
            AddressingMode::GlobalCounter => self.counter.issued(),
            #[allow(clippy::reversed_empty_ranges)]
            AddressingMode::InitiatorNonce => 1..=0,
        };
        ids.filter_map(move |id| self.entry(RecordKey::Sequence(id)))
    }

    /// Open games only, in identifier order
    pub fn open_games(&self) -> impl Iterator<Item = GameEntry<'_>> + '_ {
        self.games().filter(|entry| entry.status() == Some(GameStatus::Open))
    }

    /// Games of one initiator over a caller-chosen nonce range, lazily.
    pub fn games_of<'a, I>(&'a self, initiator: Identity, nonces: I) -> impl Iterator<Item = GameEntry<'a>> + 'a
    where
        I: IntoIterator<Item = u64>,
        I::IntoIter: 'a,
    {
        nonces
            .into_iter()
            .filter_map(move |nonce| self.entry(RecordKey::InitiatorNonce { initiator, nonce }))
    }

    fn entry(&self, key: RecordKey) -> Option<GameEntry<'_>> {
        let locator = self.locate(&key).ok()?;
        Some(GameEntry { identifier: key.identifier(), locator, record: self.record(&locator) })
    }
}

/// Cloneable handle serialising every mutation behind one lock
pub struct SharedEngine<L: Ledger, E: EntropySource> {
    inner: Arc<Mutex<SettlementEngine<L, E>>>,
}

impl<L: Ledger, E: EntropySource> Clone for SharedEngine<L, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<L: Ledger, E: EntropySource> SharedEngine<L, E> {
    pub fn new(engine: SettlementEngine<L, E>) -> Self {
        Self { inner: Arc::new(Mutex::new(engine)) }
    }

    pub fn open(&self, request: OpenRequest) -> Result<Opened, FlipError> {
        self.lock().open(request)
    }

    pub fn settle(&self, request: SettleRequest) -> Result<Settled, FlipError> {
        self.lock().settle(request)
    }

    /// Run a read-only query against a consistent snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&SettlementEngine<L, E>) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, SettlementEngine<L, E>> {
        // Every transition commits fully or not at all, so a poisoned
        // lock still guards consistent state
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::InMemoryLedger;
    use crate::entropy::Outcome;
    use crate::random::SeededRng;
    use crate::wager::MAX_OPENING_WAGER;
    use std::thread;

    const SOL: u64 = 1_000_000_000;

    fn id(n: u8) -> Identity {
        Identity::new([n; 32])
    }

    fn alice() -> Identity {
        id(1)
    }

    fn bob() -> Identity {
        id(2)
    }

    fn carol() -> Identity {
        id(3)
    }

    fn ledger() -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        for who in [alice(), bob(), carol()] {
            ledger.fund(who, 10 * SOL).unwrap();
        }
        ledger
    }

    fn engine_with<E: EntropySource>(mode: AddressingMode, entropy: E) -> SettlementEngine<InMemoryLedger, E> {
        let config = EngineConfig::new(mode, id(0xEE));
        SettlementEngine::new(config, ledger(), entropy).unwrap()
    }

    fn counter_engine() -> SettlementEngine<InMemoryLedger, SeededRng> {
        engine_with(AddressingMode::GlobalCounter, SeededRng::from_u64(1))
    }

    fn nonce_engine() -> SettlementEngine<InMemoryLedger, SeededRng> {
        engine_with(AddressingMode::InitiatorNonce, SeededRng::from_u64(1))
    }

    fn join(counterparty: Identity, game: GameRef, wager: u64) -> SettleRequest {
        SettleRequest { counterparty, game, wager }
    }

    fn assert_conserved<E: EntropySource>(engine: &SettlementEngine<InMemoryLedger, E>) {
        assert_eq!(engine.ledger().circulating() + engine.escrowed(), engine.ledger().supply());
    }

    #[test]
    fn test_open_creates_open_record() {
        let mut engine = counter_engine();
        let opened = engine.open(OpenRequest::new(alice(), SOL / 10)).unwrap();

        assert_eq!(opened.identifier, 1);
        assert_eq!(engine.counter().current(), 1);

        let record = engine.record(&opened.locator).unwrap();
        assert!(record.is_open());
        assert_eq!(record.initiator(), alice());
        assert_eq!(record.opening_wager(), SOL / 10);
        assert!(record.counterparty().is_default());
        assert!(record.winner().is_default());
        assert!(record.loser().is_default());

        assert_eq!(engine.ledger().balance(&alice()), 10 * SOL - SOL / 10);
        assert_eq!(engine.escrowed(), SOL / 10);
        assert_conserved(&engine);
    }

    #[test]
    fn test_counter_mode_issues_sequential_ids() {
        let mut engine = counter_engine();
        let first = engine.open(OpenRequest::new(alice(), 100)).unwrap();
        let second = engine.open(OpenRequest::new(alice(), 100)).unwrap();
        let third = engine.open(OpenRequest::new(bob(), 100)).unwrap();

        assert_eq!((first.identifier, second.identifier, third.identifier), (1, 2, 3));
        assert_ne!(first.locator, second.locator);
        assert_eq!(engine.locate(&RecordKey::Sequence(2)).unwrap(), second.locator);
    }

    #[test]
    fn test_settle_twice_is_rejected() {
        let mut engine = counter_engine();
        let opened = engine.open(OpenRequest::new(alice(), SOL)).unwrap();

        let first = engine.settle(join(bob(), GameRef::Sequence(1), SOL)).unwrap();
        let after_first = engine.record(&opened.locator).unwrap().clone();
        let balances = (engine.ledger().balance(&alice()), engine.ledger().balance(&bob()));

        assert_eq!(
            engine.settle(join(carol(), GameRef::Locator(opened.locator), SOL)),
            Err(FlipError::GameAlreadyFinished)
        );
        assert_eq!(
            engine.settle(join(bob(), GameRef::Sequence(1), SOL)),
            Err(FlipError::GameAlreadyFinished)
        );

        let record = engine.record(&opened.locator).unwrap();
        assert_eq!(*record, after_first);
        assert_eq!(record.winner(), first.settlement.winner);
        assert_eq!(record.total_pool(), 2 * SOL);
        assert_eq!(balances, (engine.ledger().balance(&alice()), engine.ledger().balance(&bob())));
        assert_eq!(engine.ledger().balance(&carol()), 10 * SOL);
    }

    #[test]
    fn test_wager_tolerance_boundaries() {
        let mut engine = counter_engine();
        for _ in 0..2 {
            engine.open(OpenRequest::new(alice(), 1_000_000)).unwrap();
        }

        for rejected in [1_020_000, 980_000] {
            assert!(matches!(
                engine.settle(join(bob(), GameRef::Sequence(1), rejected)),
                Err(FlipError::WagerOutOfRange { .. })
            ));
        }
        assert_eq!(engine.ledger().balance(&bob()), 10 * SOL);
        assert!(engine.record(&engine.locate(&RecordKey::Sequence(1)).unwrap()).unwrap().is_open());

        let low = engine.settle(join(bob(), GameRef::Sequence(1), 990_000)).unwrap();
        assert_eq!(low.settlement.total_pool, 1_990_000);
        let high = engine.settle(join(bob(), GameRef::Sequence(2), 1_010_000)).unwrap();
        assert_eq!(high.settlement.total_pool, 2_010_000);
        assert_conserved(&engine);
    }

    #[test]
    fn test_cannot_join_own_game() {
        let mut engine = counter_engine();
        let opened = engine.open(OpenRequest::new(alice(), SOL)).unwrap();

        assert_eq!(
            engine.settle(join(alice(), GameRef::Sequence(1), SOL)),
            Err(FlipError::CannotJoinOwnGame)
        );
        assert!(engine.record(&opened.locator).unwrap().is_open());
        assert_eq!(engine.ledger().balance(&alice()), 9 * SOL);
        assert_eq!(engine.escrowed(), SOL);
    }

    #[test]
    fn test_unknown_record() {
        let mut engine = counter_engine();
        let missing = engine.locate(&RecordKey::Sequence(999)).unwrap();
        assert_eq!(
            engine.settle(join(bob(), GameRef::Sequence(999), SOL)),
            Err(FlipError::RecordNotFound(missing))
        );
        assert_eq!(
            engine.settle(join(bob(), GameRef::Locator(Locator::new([0u8; 32])), SOL)),
            Err(FlipError::RecordNotFound(Locator::new([0u8; 32])))
        );
    }

    #[test]
    fn test_payout_conservation() {
        let mut engine = engine_with(AddressingMode::GlobalCounter, || false);
        engine.open(OpenRequest::new(alice(), SOL)).unwrap();
        let bob_before = engine.ledger().balance(&bob());

        let settled = engine.settle(join(bob(), GameRef::Sequence(1), SOL - 5)).unwrap();
        assert_eq!(settled.settlement.outcome, Outcome::CounterpartyWins);
        assert_eq!(settled.settlement.total_pool, 2 * SOL - 5);

        // Bob staked SOL - 5 and received the whole pool
        assert_eq!(engine.ledger().balance(&bob()), bob_before - (SOL - 5) + (2 * SOL - 5));
        assert_eq!(engine.ledger().balance(&alice()), 9 * SOL);
        assert_eq!(engine.escrowed(), 0);
        assert_conserved(&engine);
    }

    #[test]
    fn test_initiator_can_win() {
        let mut engine = engine_with(AddressingMode::GlobalCounter, || true);
        let opened = engine.open(OpenRequest::new(alice(), SOL)).unwrap();
        engine.settle(join(bob(), GameRef::Locator(opened.locator), SOL)).unwrap();

        let record = engine.record(&opened.locator).unwrap();
        assert_eq!(record.winner(), alice());
        assert_eq!(record.loser(), bob());
        assert_eq!(engine.ledger().balance(&alice()), 11 * SOL);
        assert_eq!(engine.ledger().balance(&bob()), 9 * SOL);
    }

    #[test]
    fn test_minimum_and_maximum_wager() {
        let mut engine = counter_engine();
        engine.open(OpenRequest::new(alice(), 1)).unwrap();
        let settled = engine.settle(join(bob(), GameRef::Sequence(1), 1)).unwrap();
        assert_eq!(settled.settlement.total_pool, 2);

        let mut ledger = InMemoryLedger::new();
        ledger.fund(alice(), MAX_OPENING_WAGER).unwrap();
        ledger.fund(bob(), MAX_OPENING_WAGER).unwrap();
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let mut engine = SettlementEngine::new(config, ledger, SeededRng::from_u64(5)).unwrap();

        engine.open(OpenRequest::new(alice(), MAX_OPENING_WAGER)).unwrap();
        let settled = engine.settle(join(bob(), GameRef::Sequence(1), MAX_OPENING_WAGER)).unwrap();
        assert_eq!(settled.settlement.total_pool, 2 * MAX_OPENING_WAGER);
        assert_eq!(engine.ledger().balance(&settled.settlement.winner), 2 * MAX_OPENING_WAGER);
        assert_conserved(&engine);
    }

    #[test]
    fn test_opening_wager_out_of_range() {
        let mut engine = counter_engine();
        assert!(matches!(
            engine.open(OpenRequest::new(alice(), 0)),
            Err(FlipError::WagerOutOfRange { .. })
        ));
        assert!(matches!(
            engine.open(OpenRequest::new(alice(), MAX_OPENING_WAGER + 1)),
            Err(FlipError::WagerOutOfRange { .. })
        ));
        assert_eq!(engine.counter().current(), 0);
        assert_eq!(engine.games().count(), 0);
    }

    #[test]
    fn test_insufficient_funds_leaves_no_trace() {
        let mut engine = counter_engine();
        assert_eq!(
            engine.open(OpenRequest::new(alice(), 11 * SOL)),
            Err(FlipError::InsufficientFunds { required: 11 * SOL, available: 10 * SOL })
        );
        assert_eq!(engine.counter().current(), 0);
        assert_eq!(engine.ledger().balance(&alice()), 10 * SOL);

        // Open with a wager bob cannot match
        let mut ledger = ledger();
        ledger.fund(alice(), 10 * SOL).unwrap();
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let mut engine = SettlementEngine::new(config, ledger, SeededRng::from_u64(1)).unwrap();
        let opened = engine.open(OpenRequest::new(alice(), 15 * SOL)).unwrap();

        assert!(matches!(
            engine.settle(join(bob(), GameRef::Sequence(1), 15 * SOL)),
            Err(FlipError::InsufficientFunds { .. })
        ));
        let record = engine.record(&opened.locator).unwrap();
        assert!(record.is_open());
        assert!(record.counterparty().is_default());
        assert_eq!(engine.escrowed(), 15 * SOL);
        assert_eq!(engine.ledger().balance(&bob()), 10 * SOL);
        assert_conserved(&engine);
    }

    #[test]
    fn test_minimum_balance_is_kept() {
        let mut ledger = InMemoryLedger::with_minimum_balance(1_000);
        ledger.fund(alice(), 10_000).unwrap();
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let mut engine = SettlementEngine::new(config, ledger, SeededRng::from_u64(1)).unwrap();

        assert!(matches!(
            engine.open(OpenRequest::new(alice(), 9_500)),
            Err(FlipError::InsufficientFunds { required: 10_500, available: 10_000 })
        ));
        assert!(engine.open(OpenRequest::new(alice(), 9_000)).is_ok());
    }

    #[test]
    fn test_expected_locator_is_verified() {
        let mut engine = counter_engine();
        let right = engine.locate(&RecordKey::Sequence(1)).unwrap();
        let wrong = engine.locate(&RecordKey::Sequence(999)).unwrap();

        assert_eq!(
            engine.open(OpenRequest::new(alice(), SOL).expecting(wrong)),
            Err(FlipError::LocatorMismatch { supplied: wrong, derived: right })
        );
        assert_eq!(engine.counter().current(), 0);
        assert_eq!(engine.ledger().balance(&alice()), 10 * SOL);

        let opened = engine.open(OpenRequest::new(alice(), SOL).expecting(right)).unwrap();
        assert_eq!(opened.locator, right);
    }

    #[test]
    fn test_nonce_mode_addressing() {
        let mut engine = nonce_engine();

        let a0 = engine.open(OpenRequest::new(alice(), SOL).with_nonce(0)).unwrap();
        let a1 = engine.open(OpenRequest::new(alice(), SOL).with_nonce(1)).unwrap();
        let b0 = engine.open(OpenRequest::new(bob(), SOL).with_nonce(0)).unwrap();
        assert_ne!(a0.locator, a1.locator);
        assert_ne!(a0.locator, b0.locator);
        assert_eq!(a0.identifier, 0);
        assert_eq!(b0.identifier, 0);

        assert_eq!(
            engine.open(OpenRequest::new(alice(), SOL).with_nonce(0)),
            Err(FlipError::RecordAlreadyExists(a0.locator))
        );
        // Advisory counter still counts every open
        assert_eq!(engine.counter().current(), 3);
        assert_eq!(engine.ledger().balance(&alice()), 8 * SOL);
    }

    #[test]
    fn test_mode_mismatch_is_rejected() {
        let mut engine = nonce_engine();
        assert!(matches!(
            engine.open(OpenRequest::new(alice(), SOL)),
            Err(FlipError::InvalidComponents(_))
        ));
        engine.open(OpenRequest::new(alice(), SOL).with_nonce(7)).unwrap();
        assert!(matches!(
            engine.settle(join(bob(), GameRef::Sequence(7), SOL)),
            Err(FlipError::InvalidComponents(_))
        ));
        engine
            .settle(join(bob(), GameRef::Nonce { initiator: alice(), nonce: 7 }, SOL))
            .unwrap();

        let mut engine = counter_engine();
        assert!(matches!(
            engine.open(OpenRequest::new(alice(), SOL).with_nonce(1)),
            Err(FlipError::InvalidComponents(_))
        ));
        assert!(matches!(
            engine.settle(join(bob(), GameRef::Nonce { initiator: alice(), nonce: 1 }, SOL)),
            Err(FlipError::InvalidComponents(_))
        ));
    }

    #[test]
    fn test_unset_identity_is_rejected() {
        let mut engine = counter_engine();
        assert!(matches!(
            engine.open(OpenRequest::new(Identity::default(), SOL)),
            Err(FlipError::InvalidComponents(_))
        ));
    }

    #[test]
    fn test_unset_counterparty_cannot_settle() {
        let mut unfunded = counter_engine();
        let mut ledger = ledger();
        ledger.fund(Identity::default(), 10 * SOL).unwrap();
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let mut funded = SettlementEngine::new(config, ledger, SeededRng::from_u64(1)).unwrap();

        for engine in [&mut unfunded, &mut funded] {
            let opened = engine.open(OpenRequest::new(alice(), 100)).unwrap();
            assert!(matches!(
                engine.settle(join(Identity::default(), GameRef::Sequence(1), 100)),
                Err(FlipError::InvalidComponents(_))
            ));

            let record = engine.record(&opened.locator).unwrap();
            assert!(record.is_open());
            assert!(record.counterparty().is_default());
            assert!(record.winner().is_default());
            assert_eq!(engine.escrowed(), 100);
        }
        assert_eq!(funded.ledger().balance(&Identity::default()), 10 * SOL);
    }

    #[test]
    fn test_game_listing() {
        let mut engine = counter_engine();
        for who in [alice(), bob(), alice()] {
            engine.open(OpenRequest::new(who, SOL)).unwrap();
        }
        engine.settle(join(carol(), GameRef::Sequence(2), SOL)).unwrap();

        let statuses: Vec<_> = engine.games().map(|g| (g.identifier, g.status())).collect();
        assert_eq!(
            statuses,
            vec![
                (1, Some(GameStatus::Open)),
                (2, Some(GameStatus::Finished)),
                (3, Some(GameStatus::Open)),
            ]
        );

        // Restartable, and driven by the live counter
        let open: Vec<_> = engine.open_games().map(|g| g.identifier).collect();
        assert_eq!(open, vec![1, 3]);
        assert_eq!(engine.open_games().count(), 2);

        engine.open(OpenRequest::new(carol(), SOL)).unwrap();
        assert_eq!(engine.games().count(), 4);
    }

    #[test]
    fn test_nonce_listing() {
        let mut engine = nonce_engine();
        engine.open(OpenRequest::new(alice(), SOL).with_nonce(2)).unwrap();
        engine.open(OpenRequest::new(alice(), SOL).with_nonce(5)).unwrap();

        let found: Vec<_> = engine
            .games_of(alice(), 0..10)
            .filter(|g| g.record.is_some())
            .map(|g| g.identifier)
            .collect();
        assert_eq!(found, vec![2, 5]);
        assert_eq!(engine.games().count(), 0);
        assert_eq!(engine.games_of(bob(), 0..10).filter(|g| g.record.is_some()).count(), 0);
    }

    #[test]
    fn test_fairness_over_many_settles() {
        let mut ledger = InMemoryLedger::new();
        ledger.fund(alice(), 100_000_000).unwrap();
        ledger.fund(bob(), 100_000_000).unwrap();
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let mut engine = SettlementEngine::new(config, ledger, SeededRng::from_u64(2024)).unwrap();

        let rounds = 10_000u64;
        let mut initiator_wins = 0u32;
        let mut alice_wins = 0u32;
        for i in 1..=rounds {
            // Alternate who opens so neither seat is favoured
            let (opener, joiner) = if i % 2 == 0 { (alice(), bob()) } else { (bob(), alice()) };
            engine.open(OpenRequest::new(opener, 1_000)).unwrap();
            let settled = engine.settle(join(joiner, GameRef::Sequence(i), 1_000)).unwrap();
            if settled.settlement.outcome == Outcome::InitiatorWins {
                initiator_wins += 1;
            }
            if settled.settlement.winner == alice() {
                alice_wins += 1;
            }
        }

        // 5 sigma for n = 10_000 is 250
        assert!((4_750..=5_250).contains(&initiator_wins), "initiator won {}", initiator_wins);
        assert!((4_750..=5_250).contains(&alice_wins), "alice won {}", alice_wins);
        assert_conserved(&engine);
    }

    #[test]
    fn test_outcome_ignores_request_inputs() {
        // Same entropy, different participants and wagers: same outcomes
        let mut first = counter_engine();
        let mut second = counter_engine();
        let mut outcomes = (Vec::new(), Vec::new());

        for i in 1..=50u64 {
            first.open(OpenRequest::new(alice(), 1_000)).unwrap();
            let a = first.settle(join(bob(), GameRef::Sequence(i), 1_000)).unwrap();
            outcomes.0.push(a.settlement.outcome);

            second.open(OpenRequest::new(carol(), 5_000)).unwrap();
            let b = second.settle(join(alice(), GameRef::Sequence(i), 4_950)).unwrap();
            outcomes.1.push(b.settlement.outcome);
        }
        assert_eq!(outcomes.0, outcomes.1);
    }

    #[test]
    fn test_concurrent_settles_pay_once() {
        let mut ledger = InMemoryLedger::new();
        let players: Vec<Identity> = (1..=9).map(id).collect();
        for who in &players {
            ledger.fund(*who, 10 * SOL).unwrap();
        }
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let shared = SharedEngine::new(SettlementEngine::new(config, ledger, SeededRng::from_u64(3)).unwrap());
        let opened = shared.open(OpenRequest::new(players[0], SOL)).unwrap();

        let handles: Vec<_> = players[1..]
            .iter()
            .map(|who| {
                let engine = shared.clone();
                let who = *who;
                thread::spawn(move || engine.settle(join(who, GameRef::Sequence(1), SOL)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == FlipError::GameAlreadyFinished));

        shared.read(|engine| {
            let record = engine.record(&opened.locator).unwrap();
            assert!(!record.is_open());
            assert_eq!(engine.escrowed(), 0);
            assert_eq!(engine.ledger().circulating(), 9 * 10 * SOL);
            let winner_balance = engine.ledger().balance(&record.winner());
            assert_eq!(winner_balance, 11 * SOL);
        });
    }

    #[test]
    fn test_resume_continues_sequence() {
        let config = EngineConfig::new(AddressingMode::GlobalCounter, id(0xEE));
        let mut engine =
            SettlementEngine::resume(config, SequenceCounter::resume(41), ledger(), SeededRng::from_u64(1)).unwrap();
        let opened = engine.open(OpenRequest::new(alice(), SOL)).unwrap();
        assert_eq!(opened.identifier, 42);

        // Ids issued before the restart are scanned but hold nothing here
        assert_eq!(engine.games().count(), 42);
        let stored: Vec<_> = engine.games().filter(|g| g.record.is_some()).map(|g| g.identifier).collect();
        assert_eq!(stored, vec![42]);
    }
}
