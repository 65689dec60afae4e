//! Escrow record state and its bit-exact account encoding

use serde::{Deserialize, Serialize};

use crate::address::{Identity, RecordKey};
use crate::config::AddressingMode;
use crate::entropy::Outcome;
use crate::error::FlipError;
use crate::wager::{check_matching_wager, total_pool};

/// Account discriminator length
pub const DISCRIMINATOR_LEN: usize = 8;

/// Encoded record payload length (excludes the discriminator)
pub const RECORD_LEN: usize = 32 + // initiator
    32 +  // counterparty
    8 +   // opening_wager
    8 +   // total_pool
    1 +   // is_open
    32 +  // winner
    32 +  // loser
    8 +   // identifier
    1;    // bump

/// Full account length: discriminator + payload
pub const ACCOUNT_LEN: usize = DISCRIMINATOR_LEN + RECORD_LEN;

/// Discriminator of the `CoinFlip` account: `sha256("account:CoinFlip")[..8]`
pub fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
    let hash = solana_sha256_hasher::hash(b"account:CoinFlip").to_bytes();
    let mut disc = [0u8; DISCRIMINATOR_LEN];
    disc.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    disc
}

/// Listing classification of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Open,
    Finished,
}

/// Result of the one settlement a record ever sees
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub outcome: Outcome,
    pub winner: Identity,
    pub loser: Identity,
    pub total_pool: u64,
}

/// One wager instance.
///
/// Created open by [`EscrowRecord::open`] and closed exactly once by
/// [`EscrowRecord::apply_settlement`]; nothing reopens it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    identifier: u64,
    initiator: Identity,
    counterparty: Identity,
    opening_wager: u64,
    total_pool: u64,
    is_open: bool,
    winner: Identity,
    loser: Identity,
    bump: u8,
}

impl EscrowRecord {
    /// A freshly opened record. The wager is validated by the caller.
    pub fn open(identifier: u64, initiator: Identity, opening_wager: u64) -> Self {
        Self {
            identifier,
            initiator,
            counterparty: Identity::default(),
            opening_wager,
            total_pool: 0,
            is_open: true,
            winner: Identity::default(),
            loser: Identity::default(),
            bump: 0,
        }
    }

    /// Attach the canonical address bump of the on-chain account.
    pub fn with_bump(mut self, bump: u8) -> Self {
        self.bump = bump;
        self
    }

    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    pub fn initiator(&self) -> Identity {
        self.initiator
    }

    pub fn counterparty(&self) -> Identity {
        self.counterparty
    }

    pub fn opening_wager(&self) -> u64 {
        self.opening_wager
    }

    pub fn total_pool(&self) -> u64 {
        self.total_pool
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn winner(&self) -> Identity {
        self.winner
    }

    pub fn loser(&self) -> Identity {
        self.loser
    }

    pub fn bump(&self) -> u8 {
        self.bump
    }

    pub fn status(&self) -> GameStatus {
        if self.is_open {
            GameStatus::Open
        } else {
            GameStatus::Finished
        }
    }

    /// Matched wager, once settled
    pub fn matched_wager(&self) -> Option<u64> {
        if self.is_open {
            None
        } else {
            self.total_pool.checked_sub(self.opening_wager)
        }
    }

    /// Seeds this record was created under, per addressing mode
    pub fn key(&self, mode: AddressingMode) -> RecordKey {
        match mode {
            AddressingMode::GlobalCounter => RecordKey::Sequence(self.identifier),
            AddressingMode::InitiatorNonce => {
                RecordKey::InitiatorNonce { initiator: self.initiator, nonce: self.identifier }
            }
        }
    }

    /// Join preconditions in their fixed order: open, set identity, not
    /// self, in range.
    pub fn check_join(&self, counterparty: &Identity, matching_wager: u64) -> Result<(), FlipError> {
        if !self.is_open {
            return Err(FlipError::GameAlreadyFinished);
        }
        // Unset marks a record nobody has joined yet
        if counterparty.is_default() {
            return Err(FlipError::InvalidComponents("counterparty identity is unset"));
        }
        if *counterparty == self.initiator {
            return Err(FlipError::CannotJoinOwnGame);
        }
        check_matching_wager(self.opening_wager, matching_wager)
    }

    /// Close the record. Re-checks the join preconditions, so a rejected
    /// call leaves every field untouched.
    pub fn apply_settlement(
        &mut self,
        counterparty: Identity,
        matching_wager: u64,
        outcome: Outcome,
    ) -> Result<Settlement, FlipError> {
        self.check_join(&counterparty, matching_wager)?;
        total_pool(self.opening_wager, matching_wager).ok_or(FlipError::Overflow)?;
        Ok(self.close(counterparty, matching_wager, outcome))
    }

    /// Unchecked close. Callers must have passed `check_join` and the
    /// pool sum for exactly these arguments.
    pub(crate) fn close(&mut self, counterparty: Identity, matching_wager: u64, outcome: Outcome) -> Settlement {
        let pool = self.opening_wager.saturating_add(matching_wager);
        let (winner, loser) = match outcome {
            Outcome::InitiatorWins => (self.initiator, counterparty),
            Outcome::CounterpartyWins => (counterparty, self.initiator),
        };

        self.counterparty = counterparty;
        self.total_pool = pool;
        self.winner = winner;
        self.loser = loser;
        self.is_open = false;

        Settlement { outcome, winner, loser, total_pool: pool }
    }

    /// Encode as discriminator followed by the fixed 154-byte payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACCOUNT_LEN);
        out.extend_from_slice(&discriminator());
        out.extend_from_slice(self.initiator.as_bytes());
        out.extend_from_slice(self.counterparty.as_bytes());
        out.extend_from_slice(&self.opening_wager.to_le_bytes());
        out.extend_from_slice(&self.total_pool.to_le_bytes());
        out.push(self.is_open as u8);
        out.extend_from_slice(self.winner.as_bytes());
        out.extend_from_slice(self.loser.as_bytes());
        out.extend_from_slice(&self.identifier.to_le_bytes());
        out.push(self.bump);
        out
    }

    /// Decode an account buffer. Trailing bytes past [`ACCOUNT_LEN`] are
    /// ignored, as on-chain accounts may be over-allocated.
    pub fn decode(data: &[u8]) -> Result<Self, FlipError> {
        if data.len() < ACCOUNT_LEN {
            return Err(FlipError::InvalidRecordData("account too short"));
        }
        let (disc, mut rest) = data.split_at(DISCRIMINATOR_LEN);
        if disc != discriminator() {
            return Err(FlipError::InvalidRecordData("discriminator mismatch"));
        }

        let initiator = take_identity(&mut rest);
        let counterparty = take_identity(&mut rest);
        let opening_wager = take_u64(&mut rest);
        let total_pool = take_u64(&mut rest);
        let is_open = match take_u8(&mut rest) {
            0 => false,
            1 => true,
            _ => return Err(FlipError::InvalidRecordData("is_open is not a bool")),
        };
        let winner = take_identity(&mut rest);
        let loser = take_identity(&mut rest);
        let identifier = take_u64(&mut rest);
        let bump = take_u8(&mut rest);

        Ok(Self {
            identifier,
            initiator,
            counterparty,
            opening_wager,
            total_pool,
            is_open,
            winner,
            loser,
            bump,
        })
    }
}

// Length is checked once in `decode`; these only advance the cursor.

fn take_identity(cursor: &mut &[u8]) -> Identity {
    let (head, tail) = cursor.split_at(32);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(head);
    *cursor = tail;
    Identity::new(bytes)
}

fn take_u64(cursor: &mut &[u8]) -> u64 {
    let (head, tail) = cursor.split_at(8);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(head);
    *cursor = tail;
    u64::from_le_bytes(bytes)
}

fn take_u8(cursor: &mut &[u8]) -> u8 {
    let (head, tail) = cursor.split_at(1);
    *cursor = tail;
    head[0]
}
