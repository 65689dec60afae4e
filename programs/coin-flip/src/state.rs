//! Account state definitions

use anchor_lang::prelude::*;
use flip_logic::{EscrowRecord, Identity};

use crate::error::CoinFlipError;

/// Global counter issuing game ids
#[account]
#[derive(Default)]
pub struct Vendor {
    /// Id of the most recently opened game (0 = none yet)
    pub counter: u64,
    /// PDA bump seed
    pub bump: u8,
}

impl Vendor {
    pub const LEN: usize = 8 + // discriminator
        8 +   // counter
        1;    // bump
}

/// One two-party wager. Field order is the wire layout.
#[account]
#[derive(Default)]
pub struct CoinFlip {
    /// Initiator who opened the wager
    pub bet_starter: Pubkey,
    /// Counterparty, default until settled
    pub bet_ender: Pubkey,
    /// Opening wager (lamports)
    pub starting_wager: u64,
    /// Opening + matching wager, 0 until settled
    pub total_wager: u64,
    pub is_active: bool,
    pub winner: Pubkey,
    pub loser: Pubkey,
    /// Game id (mode a) or client nonce (mode b)
    pub id: u64,
    /// PDA bump seed
    pub bump: u8,
}

impl CoinFlip {
    pub const LEN: usize = 8 + // discriminator
        32 +  // bet_starter
        32 +  // bet_ender
        8 +   // starting_wager
        8 +   // total_wager
        1 +   // is_active
        32 +  // winner
        32 +  // loser
        8 +   // id
        1;    // bump

    /// Decode into the settlement core's record through the shared encoding.
    pub fn to_record(&self) -> Result<EscrowRecord> {
        let mut data = Vec::with_capacity(Self::LEN);
        self.try_serialize(&mut data)?;
        Ok(EscrowRecord::decode(&data).map_err(CoinFlipError::from)?)
    }

    /// Write every field back from a record.
    pub fn store(&mut self, record: &EscrowRecord) {
        self.bet_starter = to_pubkey(record.initiator());
        self.bet_ender = to_pubkey(record.counterparty());
        self.starting_wager = record.opening_wager();
        self.total_wager = record.total_pool();
        self.is_active = record.is_open();
        self.winner = to_pubkey(record.winner());
        self.loser = to_pubkey(record.loser());
        self.id = record.identifier();
        self.bump = record.bump();
    }
}

pub fn to_identity(key: &Pubkey) -> Identity {
    Identity::new(key.to_bytes())
}

pub fn to_pubkey(identity: Identity) -> Pubkey {
    Pubkey::new_from_array(identity.to_bytes())
}
