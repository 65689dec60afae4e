//! Coin Flip - escrowed two-party wagers
//!
//! One player opens a wager, a second matches it within one percent,
//! and a single coin flip sends the whole pool to the winner.

use anchor_lang::prelude::*;

mod state;
mod instructions;
mod error;

use instructions::*;
pub use state::{CoinFlip, Vendor};

declare_id!("8UCfb1sKhqxYQRh3XTX7Un1LHsK4aCLgRULB6PWcMg3a");

#[program]
pub mod coin_flip {
    use super::*;

    /// Create the global game counter (one-time setup)
    pub fn initialize_vendor(ctx: Context<InitializeVendor>) -> Result<()> {
        instructions::vendor::initialize_vendor(ctx)
    }

    /// Open a wager under the next global game id
    pub fn new_coin_flip(ctx: Context<NewCoinFlip>, wager: u64) -> Result<()> {
        instructions::game::new_coin_flip(ctx, wager)
    }

    /// Open a wager under the caller's key and a client nonce
    pub fn new_nonce_coin_flip(
        ctx: Context<NewNonceCoinFlip>,
        client_nonce: u64,
        wager: u64,
    ) -> Result<()> {
        instructions::game::new_nonce_coin_flip(ctx, client_nonce, wager)
    }

    /// Match a wager by game id and settle it
    pub fn end_coin_flip(ctx: Context<EndCoinFlip>, game_id: u64, wager: u64) -> Result<()> {
        instructions::game::end_coin_flip(ctx, game_id, wager)
    }

    /// Match a nonce-addressed wager and settle it
    pub fn end_nonce_coin_flip(ctx: Context<EndNonceCoinFlip>, wager: u64) -> Result<()> {
        instructions::game::end_nonce_coin_flip(ctx, wager)
    }
}
